use crate::compute::{ComputeSession, SessionOptions};
use crate::config::{ColorMode, Config};
use crate::encode::write_png;
use crate::frame::PixelFormat;
use crate::renderer::FrameRenderer;
use crate::viewport::{ImageSpec, Viewport};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub fn validate(cfg: &Config) -> Result<()> {
    image_spec(cfg).validate()?;
    Viewport::new(cfg.x, cfg.y, cfg.scale)?;
    Ok(())
}

pub fn image_spec(cfg: &Config) -> ImageSpec {
    let format = match cfg.color {
        ColorMode::Gray => PixelFormat::GrayF32,
        ColorMode::Palette => PixelFormat::Rgba8,
    };
    ImageSpec::new(cfg.width, cfg.height, cfg.n_iterations).with_format(format)
}

/// `render<unix-seconds>.png` in the working directory.
pub fn default_output_path(now: SystemTime) -> PathBuf {
    let secs = now.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    PathBuf::from(format!("render{secs}.png"))
}

fn session_options(cfg: &Config) -> SessionOptions {
    SessionOptions {
        engine: cfg.engine,
        precision: cfg.precision,
    }
}

pub fn print_probe(cfg: &Config) -> Result<()> {
    let mut session = ComputeSession::new(session_options(cfg));
    session.open().context("open compute session")?;
    let report = session.report();
    println!("{}", report.status_label());
    for note in report.notes() {
        println!("  - {note}");
    }
    Ok(())
}

pub fn run(cfg: Config) -> Result<()> {
    validate(&cfg)?;

    let out = cfg
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(SystemTime::now()));
    let mut parent = out.parent().unwrap_or_else(|| Path::new(""));
    if parent == Path::new("") {
        parent = Path::new(".");
    }
    std::fs::create_dir_all(parent)
        .with_context(|| format!("create output directory {}", parent.display()))?;

    let viewport = Viewport::new(cfg.x, cfg.y, cfg.scale)?;
    let mut renderer = FrameRenderer::new(ComputeSession::new(session_options(&cfg)));
    renderer.configure(image_spec(&cfg))?;

    let started = Instant::now();
    let pixels = renderer.render_viewport(&viewport)?;
    let elapsed = started.elapsed();

    write_png(&out, &pixels).with_context(|| format!("write {}", out.display()))?;

    println!(
        "rendered {}x{} ({} iterations, {}) in {:.1} ms -> {}",
        cfg.width,
        cfg.height,
        cfg.n_iterations,
        renderer.session().report().status_label(),
        elapsed.as_secs_f64() * 1000.0,
        out.display()
    );
    Ok(())
}
