use crate::compute::{ComputeSession, KernelHandle, TargetHandle};
use crate::error::RenderError;
use crate::frame::PixelBuffer;
use crate::kernel::KernelArgs;
use crate::viewport::{BoundingBox, ImageSpec, Viewport};
use num_complex::Complex;

struct Configured {
    spec: ImageSpec,
    kernel: KernelHandle,
    target: TargetHandle,
}

/// Renders one viewport at a time into a fresh [`PixelBuffer`].
///
/// The renderer owns its compute session and the device-side output image,
/// which is reused across renders until the [`ImageSpec`] changes. It is not
/// meant to be shared; parallel rendering uses separate renderers.
pub struct FrameRenderer {
    session: ComputeSession,
    configured: Option<Configured>,
}

impl FrameRenderer {
    pub fn new(session: ComputeSession) -> Self {
        Self {
            session,
            configured: None,
        }
    }

    /// Fix the image spec, compiling the kernel and allocating the output
    /// image on first use. An unchanged spec is a no-op.
    pub fn configure(&mut self, spec: ImageSpec) -> Result<(), RenderError> {
        spec.validate()?;
        if let Some(cur) = &self.configured {
            if cur.spec == spec {
                return Ok(());
            }
        }

        let kernel = self.session.kernel(spec.format)?;
        if let Some(old) = self.configured.take() {
            self.session.release_target(old.target);
        }
        let target = self.session.allocate_target(&spec)?;
        self.configured = Some(Configured {
            spec,
            kernel,
            target,
        });
        Ok(())
    }

    /// Single-channel float configuration, as used for still images.
    pub fn configure_dims(&mut self, width: u32, height: u32, n_iterations: u32) -> Result<(), RenderError> {
        self.configure(ImageSpec::new(width, height, n_iterations))
    }

    pub fn spec(&self) -> Option<ImageSpec> {
        self.configured.as_ref().map(|c| c.spec)
    }

    pub fn session(&self) -> &ComputeSession {
        &self.session
    }

    pub fn bounding_box(&self, viewport: &Viewport) -> Result<BoundingBox, RenderError> {
        let spec = self.require_spec()?;
        viewport.validate()?;
        Ok(viewport.bounding_box(spec.width, spec.height))
    }

    pub fn render(&mut self, center: Complex<f64>, width: f64) -> Result<PixelBuffer, RenderError> {
        self.render_viewport(&Viewport { center, width })
    }

    pub fn render_viewport(&mut self, viewport: &Viewport) -> Result<PixelBuffer, RenderError> {
        let bbox = self.bounding_box(viewport)?;
        let Some(cfg) = self.configured.as_ref() else {
            return Err(not_configured());
        };
        let (spec, kernel, target) = (cfg.spec, cfg.kernel, cfg.target);

        let args = KernelArgs::new(&bbox, &spec);
        log::debug!(
            "dispatch {}x{} p1={} p2={} n_iterations={}",
            spec.width,
            spec.height,
            bbox.p1,
            bbox.p2,
            spec.n_iterations
        );
        self.session.dispatch(kernel, target, &args)?;

        let mut out = PixelBuffer::zeroed(spec.width, spec.height, spec.format);
        self.session.read_back(target, &mut out)?;
        out.check_shape(spec.width, spec.height, spec.format)?;
        Ok(out)
    }

    fn require_spec(&self) -> Result<ImageSpec, RenderError> {
        self.spec().ok_or_else(not_configured)
    }

    /// Release the output image and hand the session back.
    pub fn into_session(self) -> ComputeSession {
        let Self {
            mut session,
            configured,
        } = self;
        if let Some(cfg) = configured {
            session.release_target(cfg.target);
        }
        session
    }
}

fn not_configured() -> RenderError {
    RenderError::device("renderer not configured; call configure() first")
}
