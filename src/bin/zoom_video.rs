use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use brotzoom::compute::{ComputeSession, SessionOptions};
use brotzoom::config::{DEFAULT_HEIGHT, DEFAULT_ITERATIONS, DEFAULT_WIDTH, EngineMode, PrecisionMode};
use brotzoom::encode::{FfmpegEncoder, VideoSettings, ensure_ffmpeg_available};
use brotzoom::frame::{FrameFormat, PixelFormat};
use brotzoom::progress::ProgressMeter;
use brotzoom::{FrameRenderer, ImageSpec, RenderError, Viewport, ZoomPath, ZoomSequencer};
use clap::Parser;

const DEFAULT_OUTPUT: &str = "zoom.mp4";

// Default dive stays centred on this point and only narrows the width.
const TARGET_X: f64 = -0.403;
const TARGET_Y: f64 = 0.595;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "zoom_video",
    version,
    about = "Render a Mandelbrot zoom between two viewports (raw frames -> MP4 via ffmpeg)"
)]
pub(crate) struct Cli {
    #[arg(long, default_value_t = TARGET_X, allow_hyphen_values = true)]
    pub(crate) from_x: f64,

    #[arg(long, default_value_t = TARGET_Y, allow_hyphen_values = true)]
    pub(crate) from_y: f64,

    #[arg(long, default_value_t = 4.0)]
    pub(crate) from_width: f64,

    #[arg(long, default_value_t = TARGET_X, allow_hyphen_values = true)]
    pub(crate) to_x: f64,

    #[arg(long, default_value_t = TARGET_Y, allow_hyphen_values = true)]
    pub(crate) to_y: f64,

    #[arg(long, default_value_t = 2e-5)]
    pub(crate) to_width: f64,

    #[arg(long, default_value_t = 400)]
    pub(crate) frames: u32,

    #[arg(long, default_value_t = 25)]
    pub(crate) fps: u32,

    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    pub(crate) width: u32,

    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    pub(crate) height: u32,

    #[arg(long = "niters", default_value_t = DEFAULT_ITERATIONS)]
    pub(crate) n_iterations: u32,

    #[arg(long, value_name = "MP4", default_value = DEFAULT_OUTPUT)]
    pub(crate) out: PathBuf,

    #[arg(long, value_enum, default_value_t = EngineMode::Metal)]
    pub(crate) engine: EngineMode,

    #[arg(long, value_enum, default_value_t = PrecisionMode::Auto)]
    pub(crate) precision: PrecisionMode,

    /// Encode single-channel frames instead of the colour palette
    #[arg(long, default_value_t = false)]
    pub(crate) gray: bool,

    /// Suppress the per-frame progress line
    #[arg(long, default_value_t = false)]
    pub(crate) quiet: bool,
}

pub(crate) fn validate_args(args: &Cli) -> Result<()> {
    image_spec(args).validate()?;
    zoom_path(args)?;
    if args.fps == 0 {
        bail!("--fps must be >= 1");
    }
    // yuv420p needs even dimensions.
    if args.width % 2 != 0 || args.height % 2 != 0 {
        bail!("--width and --height must be even for yuv420p output");
    }
    Ok(())
}

pub(crate) fn zoom_path(args: &Cli) -> Result<ZoomPath, RenderError> {
    let start = Viewport::new(args.from_x, args.from_y, args.from_width)?;
    let end = Viewport::new(args.to_x, args.to_y, args.to_width)?;
    ZoomPath::new(start, end, args.frames)
}

pub(crate) fn image_spec(args: &Cli) -> ImageSpec {
    let format = if args.gray {
        PixelFormat::GrayF32
    } else {
        PixelFormat::Rgba8
    };
    ImageSpec::new(args.width, args.height, args.n_iterations).with_format(format)
}

pub(crate) fn video_settings(args: &Cli) -> VideoSettings {
    VideoSettings {
        width: args.width,
        height: args.height,
        fps: args.fps,
        format: if args.gray {
            FrameFormat::Gray8
        } else {
            FrameFormat::Rgba8
        },
        out: args.out.clone(),
    }
}

pub(crate) fn video_duration_s(frames: u32, fps: u32) -> f64 {
    frames as f64 / fps.max(1) as f64
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Cli::parse();
    if let Err(err) = run(&args) {
        if let Some(render_err) = err.downcast_ref::<RenderError>() {
            eprintln!("error [{}]", render_err.kind());
        }
        return Err(err);
    }
    Ok(())
}

fn run(args: &Cli) -> Result<()> {
    validate_args(args)?;

    ensure_ffmpeg_available()?;

    let path = zoom_path(args)?;
    let mut renderer = FrameRenderer::new(ComputeSession::new(SessionOptions {
        engine: args.engine,
        precision: args.precision,
    }));
    renderer.configure(image_spec(args))?;
    eprintln!("{}", renderer.session().report().status_label());

    let mut parent = args.out.parent().unwrap_or_else(|| Path::new(""));
    if parent == Path::new("") {
        parent = Path::new(".");
    }
    fs::create_dir_all(parent)
        .with_context(|| format!("create output directory {}", parent.display()))?;

    let mut encoder = FfmpegEncoder::spawn(video_settings(args))?;
    let mut meter = ProgressMeter::new();
    for event in ZoomSequencer::new(&mut renderer, &mut encoder, path) {
        let progress = event.with_context(|| {
            format!("zoom aborted; partial output left at {}", args.out.display())
        })?;
        let line = meter.observe(&progress);
        if !args.quiet {
            println!("{line}");
        }
    }
    let frames = encoder.finish()?;

    println!(
        "exported {} frames @ {} fps (duration {:.3}s) -> {}",
        frames,
        args.fps,
        video_duration_s(args.frames, args.fps),
        args.out.display()
    );
    Ok(())
}
