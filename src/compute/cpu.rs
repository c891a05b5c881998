use super::{ComputeBackend, KernelHandle, TargetHandle};
use crate::capability::DeviceCaps;
use crate::error::RenderError;
use crate::frame::{shade, PixelBuffer, Samples};
use crate::kernel::{eval_row, KernelArgs, KernelKey, Precision};
use crate::viewport::ImageSpec;
use rayon::prelude::*;

struct CpuTarget {
    spec: ImageSpec,
    pixels: PixelBuffer,
}

/// Row-parallel CPU kernel. Supports both precisions.
pub struct CpuBackend {
    kernels: Vec<KernelKey>,
    targets: Vec<Option<CpuTarget>>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self {
            kernels: Vec::new(),
            targets: Vec::new(),
        }
    }

    fn target_mut(&mut self, target: TargetHandle) -> Result<&mut CpuTarget, RenderError> {
        self.targets
            .get_mut(target.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| RenderError::device(format!("unknown output image handle {}", target.0)))
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn caps(&self) -> DeviceCaps {
        DeviceCaps {
            name: format!("cpu ({} threads)", rayon::current_num_threads()),
            supports_f64: true,
        }
    }

    fn compile(&mut self, key: KernelKey) -> Result<KernelHandle, RenderError> {
        self.kernels.push(key);
        Ok(KernelHandle(self.kernels.len() - 1))
    }

    fn allocate_target(&mut self, spec: &ImageSpec) -> Result<TargetHandle, RenderError> {
        let target = CpuTarget {
            spec: *spec,
            pixels: PixelBuffer::zeroed(spec.width, spec.height, spec.format),
        };
        if let Some(slot) = self.targets.iter().position(Option::is_none) {
            self.targets[slot] = Some(target);
            return Ok(TargetHandle(slot));
        }
        self.targets.push(Some(target));
        Ok(TargetHandle(self.targets.len() - 1))
    }

    fn release_target(&mut self, target: TargetHandle) {
        if let Some(slot) = self.targets.get_mut(target.0) {
            *slot = None;
        }
    }

    fn dispatch(
        &mut self,
        kernel: KernelHandle,
        target: TargetHandle,
        args: &KernelArgs,
    ) -> Result<(), RenderError> {
        let key = *self
            .kernels
            .get(kernel.0)
            .ok_or_else(|| RenderError::device(format!("unknown kernel handle {}", kernel.0)))?;
        let out = self.target_mut(target)?;
        if out.spec.format != key.format {
            return Err(RenderError::device(format!(
                "kernel writes {} but output image is {}",
                key.format.name(),
                out.spec.format.name()
            )));
        }
        if args.width != out.spec.width || args.height != out.spec.height {
            return Err(RenderError::device(format!(
                "dispatch grid {}x{} does not match output image {}x{}",
                args.width, args.height, out.spec.width, out.spec.height
            )));
        }

        let w = out.spec.width as usize;
        let row = |y: usize, samples: &mut [f32]| match key.precision {
            Precision::Single => eval_row::<f32>(args, y as u32, samples),
            Precision::Double => eval_row::<f64>(args, y as u32, samples),
        };

        match out.pixels.samples_mut() {
            Samples::Gray(v) => {
                v.par_chunks_mut(w)
                    .enumerate()
                    .for_each(|(y, samples)| row(y, samples));
            }
            Samples::Rgba(v) => {
                v.par_chunks_mut(w * 4)
                    .enumerate()
                    .for_each_init(
                        || vec![0.0f32; w],
                        |samples, (y, px)| {
                            row(y, samples);
                            for (dst, &s) in px.chunks_exact_mut(4).zip(samples.iter()) {
                                dst.copy_from_slice(&shade(s));
                            }
                        },
                    );
            }
        }
        Ok(())
    }

    fn read_back(&mut self, target: TargetHandle, out: &mut PixelBuffer) -> Result<(), RenderError> {
        let src = self.target_mut(target)?;
        let ImageSpec {
            width,
            height,
            format,
            ..
        } = src.spec;
        src.pixels.check_shape(width, height, format)?;
        out.check_shape(width, height, format)?;
        out.clone_from(&src.pixels);
        out.check_shape(width, height, format)?;
        Ok(())
    }
}

