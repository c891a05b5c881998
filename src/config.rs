use clap::{Parser, ValueEnum};
use std::path::PathBuf;

pub const DEFAULT_ITERATIONS: u32 = 1024;
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;

#[derive(Parser, Debug, Clone)]
#[command(name = "brotzoom", version, about = "Render a Mandelbrot still image on the GPU (Metal) or CPU")]
pub struct Config {
    /// Real part of the center point
    #[arg(short = 'x', long = "x", default_value_t = 0.0, allow_hyphen_values = true)]
    pub x: f64,

    /// Imaginary part of the center point
    #[arg(short = 'y', long = "y", default_value_t = 0.0, allow_hyphen_values = true)]
    pub y: f64,

    /// Width of the view along the real axis
    #[arg(short = 's', long = "scale", default_value_t = 4.0)]
    pub scale: f64,

    /// Maximum number of iterations per pixel
    #[arg(short = 'i', long = "niters", default_value_t = DEFAULT_ITERATIONS)]
    pub n_iterations: u32,

    #[arg(short = 'W', long, default_value_t = DEFAULT_WIDTH)]
    pub width: u32,

    #[arg(short = 'H', long, default_value_t = DEFAULT_HEIGHT)]
    pub height: u32,

    /// Destination PNG (default: render<unix-seconds>.png)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = EngineMode::Metal)]
    pub engine: EngineMode,

    #[arg(long, value_enum, default_value_t = PrecisionMode::Auto)]
    pub precision: PrecisionMode,

    #[arg(long, value_enum, default_value_t = ColorMode::Gray)]
    pub color: ColorMode,

    /// Print the capability report and exit
    #[arg(long, default_value_t = false)]
    pub probe: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineMode {
    Cpu,
    #[value(alias = "gpu")]
    Metal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PrecisionMode {
    /// Double precision when the device supports it, single otherwise
    Auto,
    #[value(alias = "f32", alias = "float")]
    Single,
    #[value(alias = "f64")]
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    #[value(alias = "grey", alias = "mono")]
    Gray,
    #[value(alias = "color", alias = "colour")]
    Palette,
}
