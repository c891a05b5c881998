use crate::error::RenderError;

/// Layout of the device-side output image and of the host [`PixelBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// One f32 sample per pixel: 0.0 for points in the set, `(k+1)/N` otherwise.
    GrayF32,
    /// Palette-shaded 8-bit RGBA.
    Rgba8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            Self::GrayF32 => 1,
            Self::Rgba8 => 4,
        }
    }

    /// Bytes per pixel on the device side. Both formats are 4 bytes wide.
    pub fn bytes_per_pixel(self) -> usize {
        4
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::GrayF32 => "gray-f32",
            Self::Rgba8 => "rgba8",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    Gray(Vec<f32>),
    Rgba(Vec<u8>),
}

/// Host-side copy of one rendered image, row-major with index `y * width + x`.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    samples: Samples,
}

impl PixelBuffer {
    pub fn zeroed(width: u32, height: u32, format: PixelFormat) -> Self {
        let n = width as usize * height as usize;
        let samples = match format {
            PixelFormat::GrayF32 => Samples::Gray(vec![0.0; n]),
            PixelFormat::Rgba8 => Samples::Rgba(vec![0; n * 4]),
        };
        Self {
            width,
            height,
            samples,
        }
    }

    pub fn from_samples(width: u32, height: u32, samples: Samples) -> Result<Self, RenderError> {
        let buf = Self {
            width,
            height,
            samples,
        };
        buf.check_shape(width, height, buf.format())?;
        Ok(buf)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        match self.samples {
            Samples::Gray(_) => PixelFormat::GrayF32,
            Samples::Rgba(_) => PixelFormat::Rgba8,
        }
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut Samples {
        &mut self.samples
    }

    pub fn gray(&self) -> Option<&[f32]> {
        match &self.samples {
            Samples::Gray(v) => Some(v),
            Samples::Rgba(_) => None,
        }
    }

    pub fn rgba(&self) -> Option<&[u8]> {
        match &self.samples {
            Samples::Rgba(v) => Some(v),
            Samples::Gray(_) => None,
        }
    }

    /// Gray sample at `(x, y)`; `None` for colour buffers or out-of-range pixels.
    pub fn sample(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.gray()
            .map(|v| v[y as usize * self.width as usize + x as usize])
    }

    pub fn pixel_rgba(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.rgba()
            .map(|v| [v[i], v[i + 1], v[i + 2], v[i + 3]])
    }

    /// Fails unless the buffer holds exactly `width * height` pixels of `format`.
    pub fn check_shape(&self, width: u32, height: u32, format: PixelFormat) -> Result<(), RenderError> {
        let want = width as usize * height as usize * format.channels();
        let have = match &self.samples {
            Samples::Gray(v) => v.len(),
            Samples::Rgba(v) => v.len(),
        };
        if self.width != width || self.height != height || self.format() != format || have != want {
            return Err(RenderError::device(format!(
                "pixel buffer shape mismatch: have {}x{} {} ({} values), want {}x{} {} ({} values)",
                self.width,
                self.height,
                self.format().name(),
                have,
                width,
                height,
                format.name(),
                want
            )));
        }
        Ok(())
    }

    /// Quantize into the byte layout handed to encoders.
    pub fn to_frame(&self) -> Frame {
        match &self.samples {
            Samples::Gray(v) => Frame {
                width: self.width,
                height: self.height,
                format: FrameFormat::Gray8,
                bytes: v.iter().map(|&s| quantize(s)).collect(),
            },
            Samples::Rgba(v) => Frame {
                width: self.width,
                height: self.height,
                format: FrameFormat::Rgba8,
                bytes: v.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Gray8,
    Rgba8,
}

impl FrameFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Rgba8 => 4,
        }
    }

    /// Name understood by ffmpeg's `-pix_fmt` for raw input.
    pub fn ffmpeg_pix_fmt(self) -> &'static str {
        match self {
            Self::Gray8 => "gray",
            Self::Rgba8 => "rgba",
        }
    }
}

/// Raw fixed-size frame as streamed to the video encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    pub bytes: Vec<u8>,
}

impl Frame {
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// `round(v * 255)` clamped to `[0, 255]`.
#[inline]
pub fn quantize(v: f32) -> u8 {
    if !v.is_finite() {
        return 0;
    }
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Colour for a normalized escape sample; the in-set sentinel (0.0) is black.
pub fn shade(sample: f32) -> [u8; 4] {
    if sample <= 0.0 {
        return [0, 0, 0, 255];
    }
    let [r, g, b] = palette(sample);
    [quantize(r), quantize(g), quantize(b), 255]
}

/// Smooth HSV ramp over `(0, 1]`, channels in `[0, 1]`.
pub fn palette(sample: f32) -> [f32; 3] {
    let v = sample.clamp(0.0, 1.0).sqrt();
    hsv_to_rgb(0.62 + v * 0.9, 0.85, 0.35 + 0.65 * v)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [f32; 3] {
    let h = (h - h.floor()) * 6.0;
    let i = h.floor() as i32;
    let f = h - i as f32;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);
    let (r, g, b) = match i.rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    [r, g, b]
}
