pub mod app;
pub mod capability;
pub mod compute;
pub mod config;
pub mod encode;
pub mod error;
pub mod frame;
pub mod kernel;
pub mod progress;
pub mod renderer;
pub mod viewport;
pub mod zoom;

pub use compute::{ComputeSession, SessionOptions};
pub use error::RenderError;
pub use frame::{Frame, FrameFormat, PixelBuffer, PixelFormat};
pub use renderer::FrameRenderer;
pub use viewport::{BoundingBox, ImageSpec, Viewport};
pub use zoom::{FrameSink, Progress, ZoomPath, ZoomSequencer};
