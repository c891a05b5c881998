use std::time::{Duration, Instant};

use anyhow::Result;
use brotzoom::compute::{ComputeSession, SessionOptions};
use brotzoom::config::{EngineMode, PrecisionMode};
use brotzoom::{FrameRenderer, ImageSpec, PixelFormat, Viewport, ZoomPath};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Cpu,
    Metal,
    Both,
}

struct Args {
    mode: Mode,
    frames: u32,
    w: u32,
    h: u32,
    n_iterations: u32,
    precision: PrecisionMode,
    color: bool,
    ci_smoke: bool,
    quick: bool,
    max_ms: f64,
}

fn parse_args() -> Args {
    let mut args = Args {
        mode: Mode::Cpu,
        frames: 60,
        w: 320,
        h: 180,
        n_iterations: 512,
        precision: PrecisionMode::Auto,
        color: false,
        ci_smoke: false,
        quick: false,
        max_ms: 50.0,
    };

    let argv = std::env::args().skip(1).collect::<Vec<_>>();
    let mut i = 0usize;
    while i < argv.len() {
        let k = argv[i].as_str();
        let v = argv.get(i + 1).map(|s| s.as_str());
        match (k, v) {
            ("--mode", Some("cpu")) => {
                args.mode = Mode::Cpu;
                i += 2;
            }
            ("--mode", Some("metal")) => {
                args.mode = Mode::Metal;
                i += 2;
            }
            ("--mode", Some("both")) => {
                args.mode = Mode::Both;
                i += 2;
            }
            ("--frames", Some(x)) => {
                if let Ok(n) = x.parse::<u32>() {
                    args.frames = n.max(1);
                }
                i += 2;
            }
            ("--w", Some(x)) => {
                if let Ok(n) = x.parse::<u32>() {
                    args.w = n.max(1);
                }
                i += 2;
            }
            ("--h", Some(x)) => {
                if let Ok(n) = x.parse::<u32>() {
                    args.h = n.max(1);
                }
                i += 2;
            }
            ("--niters", Some(x)) => {
                if let Ok(n) = x.parse::<u32>() {
                    args.n_iterations = n.max(1);
                }
                i += 2;
            }
            ("--precision", Some("single")) => {
                args.precision = PrecisionMode::Single;
                i += 2;
            }
            ("--precision", Some("double")) => {
                args.precision = PrecisionMode::Double;
                i += 2;
            }
            ("--precision", Some("auto")) => {
                args.precision = PrecisionMode::Auto;
                i += 2;
            }
            ("--color", Some(x)) if !x.starts_with("--") => {
                args.color = parse_bool(x).unwrap_or(true);
                i += 2;
            }
            ("--color", _) => {
                args.color = true;
                i += 1;
            }
            ("--ci-smoke", Some(x)) if !x.starts_with("--") => {
                args.ci_smoke = parse_bool(x).unwrap_or(true);
                i += 2;
            }
            ("--ci-smoke", _) => {
                args.ci_smoke = true;
                i += 1;
            }
            ("--quick", Some(x)) if !x.starts_with("--") => {
                args.quick = parse_bool(x).unwrap_or(true);
                i += 2;
            }
            ("--quick", _) => {
                args.quick = true;
                i += 1;
            }
            ("--max-ms", Some(x)) => {
                if let Ok(v) = x.parse::<f64>() {
                    args.max_ms = v.max(0.1);
                }
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    if args.quick {
        args.frames = args.frames.min(12);
    }

    args
}

fn parse_bool(s: &str) -> Option<bool> {
    let v = s.trim().to_ascii_lowercase();
    match v.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Shallow-to-moderate dive into the seahorse valley.
fn bench_path(frames: u32) -> Result<ZoomPath> {
    let (x, y) = (-0.743_643_887, 0.131_825_904);
    let start = Viewport::new(x, y, 3.2)?;
    let end = Viewport::new(x, y, 1e-3)?;
    Ok(ZoomPath::new(start, end, frames)?)
}

fn bench_engine(args: &Args, engine: EngineMode) -> Result<()> {
    let format = if args.color {
        PixelFormat::Rgba8
    } else {
        PixelFormat::GrayF32
    };
    let mut renderer = FrameRenderer::new(ComputeSession::new(SessionOptions {
        engine,
        precision: args.precision,
    }));
    renderer.configure(ImageSpec::new(args.w, args.h, args.n_iterations).with_format(format))?;

    let report = renderer.session().report();
    if report.engine != engine {
        anyhow::bail!("{:?} engine unavailable: {}", engine, report.notes().join("; "));
    }
    println!(
        "{:?} benchmark: frames={} size={}x{} niters={} format={} {}",
        engine,
        args.frames,
        args.w,
        args.h,
        args.n_iterations,
        format.name(),
        report.status_label()
    );

    let path = bench_path(args.frames)?;
    let mut total = Duration::ZERO;
    let mut worst_ms = 0.0f64;
    let mut lit = 0u32;
    for vp in path.iter() {
        let start = Instant::now();
        let pixels = renderer.render_viewport(&vp)?;
        let elapsed = start.elapsed();
        total += elapsed;
        worst_ms = worst_ms.max(elapsed.as_secs_f64() * 1000.0);

        let frame = pixels.to_frame();
        if frame.bytes.iter().any(|&b| b != 0 && b != 255) {
            lit += 1;
        }
    }

    let avg_ms = total.as_secs_f64() * 1000.0 / args.frames.max(1) as f64;
    let fps = if avg_ms > 0.0 { 1000.0 / avg_ms } else { 0.0 };
    println!(
        "{:?} summary: {:>8.3} ms/frame avg  {:>8.3} ms worst  {:>7.2} FPS  lit={:>3}/{}",
        engine, avg_ms, worst_ms, fps, lit, args.frames
    );

    if args.ci_smoke {
        if lit == 0 || avg_ms > args.max_ms {
            eprintln!("CI smoke: FAIL");
            if lit == 0 {
                eprintln!("  every frame was blank");
            }
            if avg_ms > args.max_ms {
                eprintln!("  slow: {:.3} ms/frame > {:.3}", avg_ms, args.max_ms);
            }
            anyhow::bail!("ci smoke failed");
        }
        println!("CI smoke: PASS (max_ms={:.3})", args.max_ms);
    }

    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = parse_args();

    match args.mode {
        Mode::Cpu => bench_engine(&args, EngineMode::Cpu),
        Mode::Metal => bench_engine(&args, EngineMode::Metal),
        Mode::Both => {
            bench_engine(&args, EngineMode::Cpu)?;
            bench_engine(&args, EngineMode::Metal)
        }
    }
}
