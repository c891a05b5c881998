use crate::error::RenderError;
use crate::frame::Frame;
use crate::renderer::FrameRenderer;
use crate::viewport::Viewport;
use num_complex::Complex;

/// Per-frame viewports between two endpoints: linear in center, geometric in
/// width, so the perceived zoom rate stays constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomPath {
    start: Viewport,
    end: Viewport,
    n_frames: u32,
    step: Complex<f64>,
    width_ratio: f64,
}

impl ZoomPath {
    pub fn new(start: Viewport, end: Viewport, n_frames: u32) -> Result<Self, RenderError> {
        start.validate()?;
        end.validate()?;
        if n_frames == 0 {
            return Err(RenderError::invalid("frame count must be >= 1"));
        }
        let n = n_frames as f64;
        Ok(Self {
            start,
            end,
            n_frames,
            step: (end.center - start.center) / n,
            width_ratio: (end.width / start.width).powf(1.0 / n),
        })
    }

    pub fn len(&self) -> u32 {
        self.n_frames
    }

    pub fn is_empty(&self) -> bool {
        self.n_frames == 0
    }

    pub fn start(&self) -> Viewport {
        self.start
    }

    pub fn end(&self) -> Viewport {
        self.end
    }

    /// Constant ratio between consecutive frame widths.
    pub fn width_ratio(&self) -> f64 {
        self.width_ratio
    }

    /// Viewport of frame `i` (1-indexed); `i = 0` is the start viewport.
    pub fn viewport(&self, i: u32) -> Viewport {
        Viewport {
            center: self.start.center + self.step * i as f64,
            width: self.start.width * self.width_ratio.powf(i as f64),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Viewport> + '_ {
        (1..=self.n_frames).map(move |i| self.viewport(i))
    }
}

/// Receives frames in order. Implemented by the video encoder.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), RenderError>;
}

impl FrameSink for Vec<Frame> {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), RenderError> {
        self.push(frame.clone());
        Ok(())
    }
}

/// Emitted once per frame that reached the sink.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// 1-indexed.
    pub frame_index: u32,
    pub total_frames: u32,
    pub viewport: Viewport,
}

impl Progress {
    pub fn is_last(&self) -> bool {
        self.frame_index == self.total_frames
    }
}

/// Lazily renders a [`ZoomPath`] into a [`FrameSink`], one frame per `next()`.
///
/// Stops for good after the last frame or the first error; a new run starts
/// from frame 1 with a new sequencer. Dropping it between frames cancels the
/// rest of the run.
pub struct ZoomSequencer<'a, S: FrameSink + ?Sized> {
    renderer: &'a mut FrameRenderer,
    sink: &'a mut S,
    path: ZoomPath,
    next_frame: u32,
    done: bool,
}

impl<'a, S: FrameSink + ?Sized> ZoomSequencer<'a, S> {
    pub fn new(renderer: &'a mut FrameRenderer, sink: &'a mut S, path: ZoomPath) -> Self {
        Self {
            renderer,
            sink,
            path,
            next_frame: 1,
            done: false,
        }
    }

    pub fn path(&self) -> &ZoomPath {
        &self.path
    }

    /// Drive every remaining frame; returns how many frames were written.
    pub fn run_to_end(mut self) -> Result<u32, RenderError> {
        let mut written = 0;
        for event in &mut self {
            event?;
            written += 1;
        }
        Ok(written)
    }

    fn step(&mut self) -> Result<Progress, RenderError> {
        let i = self.next_frame;
        let viewport = self.path.viewport(i);
        let pixels = self.renderer.render_viewport(&viewport)?;
        let frame = pixels.to_frame();
        self.sink.write_frame(&frame).map_err(|err| match err {
            RenderError::EncoderPipe { .. } => err,
            other => RenderError::encoder_pipe(format!("frame {i}: {other}"), ""),
        })?;
        Ok(Progress {
            frame_index: i,
            total_frames: self.path.len(),
            viewport,
        })
    }
}

impl<S: FrameSink + ?Sized> Iterator for ZoomSequencer<'_, S> {
    type Item = Result<Progress, RenderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next_frame > self.path.len() {
            return None;
        }
        let res = self.step();
        match &res {
            Ok(_) => self.next_frame += 1,
            Err(err) => {
                log::warn!("zoom sequence aborted at frame {}: {}", self.next_frame, err.kind());
                self.done = true;
            }
        }
        Some(res)
    }
}
