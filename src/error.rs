use std::fmt;

/// Failure kinds surfaced by the renderer and the zoom sequencer.
///
/// None of these are retried: a malformed request, a broken compute context
/// or a dead encoder process will not recover on its own.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// Non-positive image size, iteration cap, frame count or viewport width.
    InvalidDimensions(String),
    /// Compute backend failure (context, compile, allocation, dispatch, readback).
    Device(String),
    /// The video encoder's input closed or the encoder exited with an error.
    EncoderPipe { message: String, diagnostics: String },
}

impl RenderError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidDimensions(msg.into())
    }

    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    pub fn encoder_pipe(message: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self::EncoderPipe {
            message: message.into(),
            diagnostics: diagnostics.into(),
        }
    }

    /// Short name of the failure class, used by the CLI tools when reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidDimensions(_) => "InvalidDimensions",
            Self::Device(_) => "DeviceError",
            Self::EncoderPipe { .. } => "EncoderPipeError",
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimensions(msg) => write!(f, "invalid dimensions: {msg}"),
            Self::Device(msg) => write!(f, "compute device error: {msg}"),
            Self::EncoderPipe {
                message,
                diagnostics,
            } => {
                let diag = diagnostics.trim();
                if diag.is_empty() {
                    write!(f, "encoder pipe error: {message}")
                } else {
                    write!(f, "encoder pipe error: {message}\n{diag}")
                }
            }
        }
    }
}

impl std::error::Error for RenderError {}
