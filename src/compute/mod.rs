mod cpu;
#[cfg(target_os = "macos")]
mod metal;

use crate::capability::{probe_runtime, CapabilityReport, DeviceCaps};
use crate::config::{EngineMode, PrecisionMode};
use crate::error::RenderError;
use crate::frame::{PixelBuffer, PixelFormat};
use crate::kernel::{KernelArgs, KernelKey, Precision};
use crate::viewport::ImageSpec;
use std::collections::HashMap;

pub use cpu::CpuBackend;
#[cfg(target_os = "macos")]
pub use metal::MetalBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelHandle(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetHandle(pub(crate) usize);

/// A device able to run the escape-time kernel over an image grid.
///
/// Backends own every device object they hand out; callers refer to kernels
/// and output images through opaque handles.
pub trait ComputeBackend {
    fn name(&self) -> &'static str;
    fn caps(&self) -> DeviceCaps;
    fn compile(&mut self, key: KernelKey) -> Result<KernelHandle, RenderError>;
    fn allocate_target(&mut self, spec: &ImageSpec) -> Result<TargetHandle, RenderError>;
    fn release_target(&mut self, target: TargetHandle);
    /// Run `kernel` over every pixel of `target`. Blocks until the whole grid
    /// is done or the dispatch failed as a unit.
    fn dispatch(
        &mut self,
        kernel: KernelHandle,
        target: TargetHandle,
        args: &KernelArgs,
    ) -> Result<(), RenderError>;
    /// Copy `target` into `out`, which must already have the target's shape.
    fn read_back(&mut self, target: TargetHandle, out: &mut PixelBuffer) -> Result<(), RenderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub engine: EngineMode,
    pub precision: PrecisionMode,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            engine: EngineMode::Metal,
            precision: PrecisionMode::Auto,
        }
    }
}

/// Counters for the expensive session operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub compiles: u32,
    pub allocations: u32,
    pub releases: u32,
    pub dispatches: u64,
}

struct OpenSession {
    backend: Box<dyn ComputeBackend>,
    precision: Precision,
    kernels: HashMap<KernelKey, KernelHandle>,
}

/// Explicitly owned compute context: device, queue and compiled kernels.
///
/// The device is opened on first use and released when the session drops.
pub struct ComputeSession {
    options: SessionOptions,
    report: CapabilityReport,
    open: Option<OpenSession>,
    stats: SessionStats,
}

impl ComputeSession {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            report: probe_runtime(options.engine, options.precision),
            options,
            open: None,
            stats: SessionStats::default(),
        }
    }

    /// Session around an already constructed backend. No platform probe
    /// runs; the backend is taken as the engine that was asked for.
    pub fn with_backend(backend: Box<dyn ComputeBackend>, precision: PrecisionMode) -> Self {
        let engine = match backend.name() {
            "metal" => EngineMode::Metal,
            _ => EngineMode::Cpu,
        };
        let options = SessionOptions { engine, precision };
        let mut session = Self {
            report: CapabilityReport::new(engine, precision),
            options,
            open: None,
            stats: SessionStats::default(),
        };
        session.install(backend);
        session
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn report(&self) -> &CapabilityReport {
        &self.report
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn precision(&self) -> Option<Precision> {
        self.open.as_ref().map(|s| s.precision)
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.open.as_ref().map(|s| s.backend.name())
    }

    /// Open the device now instead of on first render.
    pub fn open(&mut self) -> Result<(), RenderError> {
        if self.open.is_none() {
            let backend = self.open_backend()?;
            self.install(backend);
        }
        Ok(())
    }

    fn install(&mut self, backend: Box<dyn ComputeBackend>) {
        let caps = backend.caps();
        let precision = self.report.resolve_precision(&caps);
        for note in self.report.notes() {
            log::warn!("{note}");
        }
        log::info!(
            "compute session open: backend={} device={} precision={}",
            backend.name(),
            caps.name,
            precision.name()
        );
        self.open = Some(OpenSession {
            backend,
            precision,
            kernels: HashMap::new(),
        });
    }

    fn open_backend(&mut self) -> Result<Box<dyn ComputeBackend>, RenderError> {
        match self.report.engine {
            EngineMode::Cpu => Ok(Box::new(CpuBackend::new())),
            EngineMode::Metal => {
                #[cfg(target_os = "macos")]
                {
                    match MetalBackend::new() {
                        Ok(backend) => Ok(Box::new(backend)),
                        Err(err) => {
                            self.report.record_engine_fallback(
                                EngineMode::Cpu,
                                format!("metal engine unavailable ({err}); falling back to cpu"),
                            );
                            Ok(Box::new(CpuBackend::new()))
                        }
                    }
                }

                #[cfg(not(target_os = "macos"))]
                {
                    self.report.record_engine_fallback(
                        EngineMode::Cpu,
                        "metal engine unsupported on this platform; falling back to cpu engine",
                    );
                    Ok(Box::new(CpuBackend::new()))
                }
            }
        }
    }

    fn state(&mut self) -> Result<&mut OpenSession, RenderError> {
        self.open()?;
        self.open
            .as_mut()
            .ok_or_else(|| RenderError::device("compute session failed to open"))
    }

    /// Compiled kernel for `format` at the session precision, built at most once.
    pub fn kernel(&mut self, format: PixelFormat) -> Result<KernelHandle, RenderError> {
        let state = self.state()?;
        let key = KernelKey {
            precision: state.precision,
            format,
        };
        if let Some(&handle) = state.kernels.get(&key) {
            return Ok(handle);
        }
        let handle = state.backend.compile(key)?;
        state.kernels.insert(key, handle);
        self.stats.compiles += 1;
        log::debug!(
            "compiled escape-time kernel ({}, {})",
            key.precision.name(),
            key.format.name()
        );
        Ok(handle)
    }

    pub fn allocate_target(&mut self, spec: &ImageSpec) -> Result<TargetHandle, RenderError> {
        spec.validate()?;
        let target = self.state()?.backend.allocate_target(spec)?;
        self.stats.allocations += 1;
        log::info!(
            "allocated {}x{} {} output image",
            spec.width,
            spec.height,
            spec.format.name()
        );
        Ok(target)
    }

    pub fn release_target(&mut self, target: TargetHandle) {
        if let Some(state) = self.open.as_mut() {
            state.backend.release_target(target);
            self.stats.releases += 1;
        }
    }

    pub fn dispatch(
        &mut self,
        kernel: KernelHandle,
        target: TargetHandle,
        args: &KernelArgs,
    ) -> Result<(), RenderError> {
        self.state()?.backend.dispatch(kernel, target, args)?;
        self.stats.dispatches += 1;
        Ok(())
    }

    pub fn read_back(&mut self, target: TargetHandle, out: &mut PixelBuffer) -> Result<(), RenderError> {
        self.state()?.backend.read_back(target, out)
    }
}
