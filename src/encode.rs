use crate::error::RenderError;
use crate::frame::{Frame, FrameFormat, PixelBuffer, Samples, quantize};
use crate::zoom::FrameSink;
use image::{GrayImage, ImageResult, RgbaImage};
use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;

/// Write a rendered buffer as PNG. Gray samples are quantized to 8-bit luma.
pub fn write_png(path: &Path, pixels: &PixelBuffer) -> ImageResult<()> {
    let (w, h) = (pixels.width(), pixels.height());
    match pixels.samples() {
        Samples::Gray(v) => {
            let bytes = v.iter().map(|&s| quantize(s)).collect::<Vec<_>>();
            let img = GrayImage::from_raw(w, h, bytes).ok_or_else(|| shape_error(w, h))?;
            img.save(path)
        }
        Samples::Rgba(v) => {
            let img = RgbaImage::from_raw(w, h, v.clone()).ok_or_else(|| shape_error(w, h))?;
            img.save(path)
        }
    }
}

fn shape_error(w: u32, h: u32) -> image::ImageError {
    image::ImageError::Parameter(image::error::ParameterError::from_kind(
        image::error::ParameterErrorKind::Generic(format!("pixel data does not match {w}x{h}")),
    ))
}

/// Streams raw frames into any writer, e.g. a pipe or a file.
pub struct RawFrameSink<W: Write> {
    out: W,
    frames: u64,
}

impl<W: Write> RawFrameSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, frames: 0 }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> FrameSink for RawFrameSink<W> {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), RenderError> {
        if frame.bytes.len() != frame.expected_len() {
            return Err(RenderError::encoder_pipe(
                format!(
                    "frame {} has {} bytes, expected {}",
                    self.frames + 1,
                    frame.bytes.len(),
                    frame.expected_len()
                ),
                "",
            ));
        }
        self.out
            .write_all(&frame.bytes)
            .map_err(|e| RenderError::encoder_pipe(format!("write frame {}: {e}", self.frames + 1), ""))?;
        self.frames += 1;
        Ok(())
    }
}

/// Fixed arguments of one encoder invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: FrameFormat,
    pub out: PathBuf,
}

pub fn ffmpeg_args(settings: &VideoSettings) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-y",
        "-f",
        "rawvideo",
        "-pix_fmt",
        settings.format.ffmpeg_pix_fmt(),
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push("-video_size".into());
    args.push(format!("{}x{}", settings.width, settings.height).into());
    args.push("-framerate".into());
    args.push(settings.fps.to_string().into());
    for a in ["-i", "-", "-c:v", "libx264", "-pix_fmt", "yuv420p", "-movflags", "+faststart"] {
        args.push(a.into());
    }
    args.push(settings.out.clone().into_os_string());
    args
}

pub fn ensure_ffmpeg_available() -> anyhow::Result<()> {
    match Command::new("ffmpeg")
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            anyhow::bail!("ffmpeg not found in PATH (install ffmpeg and retry)")
        }
        Err(err) => Err(anyhow::anyhow!("failed to run ffmpeg: {err}")),
    }
}

/// `ffmpeg` subprocess reading rawvideo frames on stdin.
///
/// Stderr is drained on a background thread so the child never blocks on a
/// full pipe; its text is attached to every [`RenderError::EncoderPipe`].
pub struct FfmpegEncoder {
    settings: VideoSettings,
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    frames: u64,
}

impl FfmpegEncoder {
    pub fn spawn(settings: VideoSettings) -> Result<Self, RenderError> {
        Self::spawn_program("ffmpeg", ffmpeg_args(&settings), settings)
    }

    /// Spawn an arbitrary encoder command that reads frames on stdin.
    pub fn spawn_program(
        program: impl AsRef<std::ffi::OsStr>,
        args: Vec<OsString>,
        settings: VideoSettings,
    ) -> Result<Self, RenderError> {
        let program = program.as_ref();
        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                RenderError::encoder_pipe(
                    format!(
                        "spawn {} for output {}: {e}",
                        program.to_string_lossy(),
                        settings.out.display()
                    ),
                    "",
                )
            })?;
        let stdin = child.stdin.take();
        let stderr = child.stderr.take().map(|mut err| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = err.read_to_string(&mut text);
                text
            })
        });
        log::info!(
            "encoder started: {}x{} {} @ {} fps -> {}",
            settings.width,
            settings.height,
            settings.format.ffmpeg_pix_fmt(),
            settings.fps,
            settings.out.display()
        );
        Ok(Self {
            settings,
            child,
            stdin,
            stderr,
            frames: 0,
        })
    }

    pub fn settings(&self) -> &VideoSettings {
        &self.settings
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    /// Close stdin and wait for the encoder; a non-zero exit is an error.
    pub fn finish(mut self) -> Result<u64, RenderError> {
        drop(self.stdin.take());
        let (status, diagnostics) = self.wait_and_collect()?;
        if !status.success() {
            return Err(RenderError::encoder_pipe(
                format!("encoder exited with status {status}"),
                diagnostics,
            ));
        }
        Ok(self.frames)
    }

    fn wait_and_collect(&mut self) -> Result<(ExitStatus, String), RenderError> {
        let status = self
            .child
            .wait()
            .map_err(|e| RenderError::encoder_pipe(format!("wait for encoder: {e}"), ""))?;
        let diagnostics = self
            .stderr
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        Ok((status, diagnostics))
    }
}

impl FrameSink for FfmpegEncoder {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), RenderError> {
        if frame.width != self.settings.width
            || frame.height != self.settings.height
            || frame.format != self.settings.format
            || frame.bytes.len() != frame.expected_len()
        {
            return Err(RenderError::encoder_pipe(
                format!(
                    "frame {}x{} {:?} does not match encoder input {}x{} {:?}",
                    frame.width,
                    frame.height,
                    frame.format,
                    self.settings.width,
                    self.settings.height,
                    self.settings.format
                ),
                "",
            ));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(RenderError::encoder_pipe("encoder input already closed", ""));
        };
        if let Err(err) = stdin.write_all(&frame.bytes) {
            // The encoder went away; reap it to get its side of the story.
            drop(self.stdin.take());
            let diagnostics = self
                .wait_and_collect()
                .map(|(_, text)| text)
                .unwrap_or_default();
            return Err(RenderError::encoder_pipe(
                format!("write frame {} to encoder: {err}", self.frames + 1),
                diagnostics,
            ));
        }
        self.frames += 1;
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        // Let the encoder flush what it has; a partial file is kept.
        drop(self.stdin.take());
        let _ = self.wait_and_collect();
    }
}
