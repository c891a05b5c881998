use crate::error::RenderError;
use crate::frame::PixelFormat;
use num_complex::Complex;

/// Center and real-axis width of the visible region of the complex plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center: Complex<f64>,
    pub width: f64,
}

impl Viewport {
    pub fn new(re: f64, im: f64, width: f64) -> Result<Self, RenderError> {
        let vp = Self {
            center: Complex::new(re, im),
            width,
        };
        vp.validate()?;
        Ok(vp)
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        if !(self.width.is_finite() && self.width > 0.0) {
            return Err(RenderError::invalid(format!(
                "viewport width must be > 0 (got {})",
                self.width
            )));
        }
        if !(self.center.re.is_finite() && self.center.im.is_finite()) {
            return Err(RenderError::invalid(format!(
                "viewport center must be finite (got {})",
                self.center
            )));
        }
        Ok(())
    }

    /// Imaginary-axis extent for an image of the given shape.
    pub fn height_for(&self, image_width: u32, image_height: u32) -> f64 {
        self.width * (image_height as f64 / image_width.max(1) as f64)
    }

    pub fn bounding_box(&self, image_width: u32, image_height: u32) -> BoundingBox {
        let half = Complex::new(
            self.width / 2.0,
            self.height_for(image_width, image_height) / 2.0,
        );
        BoundingBox {
            p1: self.center - half,
            p2: self.center + half,
        }
    }
}

/// Opposite corners of the rendered region; `p1` maps to pixel `(0, 0)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub p1: Complex<f64>,
    pub p2: Complex<f64>,
}

impl BoundingBox {
    pub fn extent(&self) -> Complex<f64> {
        self.p2 - self.p1
    }

    pub fn center(&self) -> Complex<f64> {
        (self.p1 + self.p2) / 2.0
    }

    /// Distance between neighbouring pixel centers along each axis.
    pub fn pixel_step(&self, image_width: u32, image_height: u32) -> Complex<f64> {
        let e = self.extent();
        Complex::new(
            e.re / image_width.max(1) as f64,
            e.im / image_height.max(1) as f64,
        )
    }

    /// Complex coordinate sampled for pixel `(x, y)`.
    ///
    /// Column `x` walks the real axis from `p1.re`, row `y` walks the
    /// imaginary axis from `p1.im`; the last pixel lands one step short of `p2`.
    pub fn pixel_to_complex(&self, x: u32, y: u32, image_width: u32, image_height: u32) -> Complex<f64> {
        let step = self.pixel_step(image_width, image_height);
        Complex::new(
            self.p1.re + x as f64 * step.re,
            self.p1.im + y as f64 * step.im,
        )
    }

    /// Nearest pixel to `c`, or `None` when `c` lies outside the box.
    pub fn complex_to_pixel(&self, c: Complex<f64>, image_width: u32, image_height: u32) -> Option<(u32, u32)> {
        let step = self.pixel_step(image_width, image_height);
        let fx = ((c.re - self.p1.re) / step.re).round();
        let fy = ((c.im - self.p1.im) / step.im).round();
        if !(fx.is_finite() && fy.is_finite()) || fx < 0.0 || fy < 0.0 {
            return None;
        }
        let (x, y) = (fx as u64, fy as u64);
        if x >= image_width as u64 || y >= image_height as u64 {
            return None;
        }
        Some((x as u32, y as u32))
    }
}

/// Output resolution, iteration cap and pixel format of one renderer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageSpec {
    pub width: u32,
    pub height: u32,
    pub n_iterations: u32,
    pub format: PixelFormat,
}

impl ImageSpec {
    /// Single-channel float spec, as used for still images.
    pub fn new(width: u32, height: u32, n_iterations: u32) -> Self {
        Self {
            width,
            height,
            n_iterations,
            format: PixelFormat::GrayF32,
        }
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        if self.width == 0 {
            return Err(RenderError::invalid("image width must be >= 1"));
        }
        if self.height == 0 {
            return Err(RenderError::invalid("image height must be >= 1"));
        }
        if self.n_iterations == 0 {
            return Err(RenderError::invalid("iteration cap must be >= 1"));
        }
        Ok(())
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.height as f64 / self.width.max(1) as f64
    }
}
