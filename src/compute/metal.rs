use super::{ComputeBackend, KernelHandle, TargetHandle};
use crate::capability::DeviceCaps;
use crate::error::RenderError;
use crate::frame::{PixelBuffer, PixelFormat, Samples};
use crate::kernel::{metal_source, KernelArgs, KernelKey, Precision};
use crate::viewport::ImageSpec;
use metal::*;
use objc::rc::autoreleasepool;

/// Marshaled kernel arguments; layout mirrors `KernelArgs` in the shader.
#[repr(C)]
#[derive(Clone, Copy)]
struct Uniforms {
    p1: [f32; 2],
    step: [f32; 2],
    size: [u32; 2],
    n_iterations: u32,
    _pad: u32,
}

struct MetalKernel {
    key: KernelKey,
    pipeline: ComputePipelineState,
}

struct MetalTarget {
    spec: ImageSpec,
    texture: Texture,
    readback: Buffer,
    readback_bpr: usize,
}

pub struct MetalBackend {
    device: Device,
    queue: CommandQueue,
    uniforms: Buffer,
    kernels: Vec<MetalKernel>,
    targets: Vec<Option<MetalTarget>>,
}

impl MetalBackend {
    pub fn new() -> Result<Self, RenderError> {
        let device =
            Device::system_default().ok_or_else(|| RenderError::device("no Metal device found"))?;
        let queue = device.new_command_queue();
        let uniforms = device.new_buffer(
            std::mem::size_of::<Uniforms>() as u64,
            MTLResourceOptions::StorageModeShared,
        );
        Ok(Self {
            device,
            queue,
            uniforms,
            kernels: Vec::new(),
            targets: Vec::new(),
        })
    }

    fn target(&self, target: TargetHandle) -> Result<&MetalTarget, RenderError> {
        self.targets
            .get(target.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| RenderError::device(format!("unknown output image handle {}", target.0)))
    }
}

fn mtl_format(format: PixelFormat) -> MTLPixelFormat {
    match format {
        PixelFormat::GrayF32 => MTLPixelFormat::R32Float,
        PixelFormat::Rgba8 => MTLPixelFormat::RGBA8Unorm,
    }
}

impl ComputeBackend for MetalBackend {
    fn name(&self) -> &'static str {
        "metal"
    }

    fn caps(&self) -> DeviceCaps {
        // Metal Shading Language has no 64-bit float type.
        DeviceCaps {
            name: self.device.name().to_string(),
            supports_f64: false,
        }
    }

    fn compile(&mut self, key: KernelKey) -> Result<KernelHandle, RenderError> {
        if key.precision == Precision::Double {
            return Err(RenderError::device(
                "Metal shader compile failed: double precision is not available in MSL",
            ));
        }
        let options = CompileOptions::new();
        let library = self
            .device
            .new_library_with_source(&metal_source(key), &options)
            .map_err(|e| RenderError::device(format!("Metal shader compile failed: {e}")))?;
        let func = library
            .get_function("escape_time", None)
            .map_err(|e| RenderError::device(format!("Metal get_function(escape_time) failed: {e}")))?;
        let pipeline = self
            .device
            .new_compute_pipeline_state_with_function(&func)
            .map_err(|e| RenderError::device(format!("Metal compute pipeline creation failed: {e}")))?;
        self.kernels.push(MetalKernel { key, pipeline });
        Ok(KernelHandle(self.kernels.len() - 1))
    }

    fn allocate_target(&mut self, spec: &ImageSpec) -> Result<TargetHandle, RenderError> {
        let format = mtl_format(spec.format);

        let desc = TextureDescriptor::new();
        desc.set_texture_type(MTLTextureType::D2);
        desc.set_pixel_format(format);
        desc.set_width(spec.width as u64);
        desc.set_height(spec.height as u64);
        desc.set_storage_mode(MTLStorageMode::Private);
        desc.set_usage(MTLTextureUsage::ShaderWrite);
        let texture = self.device.new_texture(&desc);

        let align =
            (self.device.minimum_linear_texture_alignment_for_pixel_format(format) as usize).max(16);
        let row_bytes = (spec.width as usize).saturating_mul(spec.format.bytes_per_pixel());
        let readback_bpr = row_bytes.div_ceil(align) * align;
        let readback_len = readback_bpr.saturating_mul(spec.height as usize);
        let readback = self
            .device
            .new_buffer(readback_len as u64, MTLResourceOptions::StorageModeShared);

        let target = MetalTarget {
            spec: *spec,
            texture,
            readback,
            readback_bpr,
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
        let kernel = self
            .kernels
            .get(kernel.0)
            .ok_or_else(|| RenderError::device(format!("unknown kernel handle {}", kernel.0)))?;
        let out = self.target(target)?;
        if out.spec.format != kernel.key.format {
            return Err(RenderError::device(format!(
                "kernel writes {} but output image is {}",
                kernel.key.format.name(),
                out.spec.format.name()
            )));
        }
        if args.width != out.spec.width || args.height != out.spec.height {
            return Err(RenderError::device(format!(
                "dispatch grid {}x{} does not match output image {}x{}",
                args.width, args.height, out.spec.width, out.spec.height
            )));
        }

        let (p1, step) = args.origin_and_step::<f32>();
        let u = Uniforms {
            p1: [p1.re, p1.im],
            step: [step.re, step.im],
            size: [args.width, args.height],
            n_iterations: args.n_iterations,
            _pad: 0,
        };
        unsafe {
            std::ptr::copy_nonoverlapping(
                (&u as *const Uniforms).cast::<u8>(),
                self.uniforms.contents().cast::<u8>(),
                std::mem::size_of::<Uniforms>(),
            );
        }

        let (w, h) = (out.spec.width as u64, out.spec.height as u64);
        let cmd = autoreleasepool(|| {
            let cmd = self.queue.new_command_buffer();

            let encoder = cmd.new_compute_command_encoder();
            encoder.set_compute_pipeline_state(&kernel.pipeline);
            encoder.set_texture(0, Some(&out.texture));
            encoder.set_buffer(0, Some(&self.uniforms), 0);
            encoder.dispatch_threads(MTLSize::new(w, h, 1), MTLSize::new(16, 16, 1));
            encoder.end_encoding();

            let blit = cmd.new_blit_command_encoder();
            blit.copy_from_texture_to_buffer(
                &out.texture,
                0,
                0,
                MTLOrigin { x: 0, y: 0, z: 0 },
                MTLSize::new(w, h, 1),
                &out.readback,
                0,
                out.readback_bpr as u64,
                (out.readback_bpr as u64).saturating_mul(h),
                MTLBlitOption::None,
            );
            blit.end_encoding();

            // Retain the command buffer so it survives the autoreleasepool.
            let owned = cmd.to_owned();
            owned.commit();
            owned
        });
        cmd.wait_until_completed();

        if matches!(cmd.status(), MTLCommandBufferStatus::Error) {
            return Err(RenderError::device("Metal command buffer failed during dispatch"));
        }
        Ok(())
    }

    fn read_back(&mut self, target: TargetHandle, out: &mut PixelBuffer) -> Result<(), RenderError> {
        let src = self.target(target)?;
        let ImageSpec {
            width,
            height,
            format,
            ..
        } = src.spec;
        out.check_shape(width, height, format)?;

        let (w, h) = (width as usize, height as usize);
        let row_bytes = w * format.bytes_per_pixel();
        let bytes = unsafe {
            std::slice::from_raw_parts(
                src.readback.contents().cast::<u8>(),
                src.readback_bpr.saturating_mul(h),
            )
        };
        match out.samples_mut() {
            Samples::Gray(dst) => {
                for y in 0..h {
                    let src_row = &bytes[y * src.readback_bpr..y * src.readback_bpr + row_bytes];
                    let dst_row = &mut dst[y * w..(y + 1) * w];
                    for (d, s) in dst_row.iter_mut().zip(src_row.chunks_exact(4)) {
                        *d = f32::from_ne_bytes([s[0], s[1], s[2], s[3]]);
                    }
                }
            }
            Samples::Rgba(dst) => {
                for y in 0..h {
                    let src_row = &bytes[y * src.readback_bpr..y * src.readback_bpr + row_bytes];
                    dst[y * row_bytes..(y + 1) * row_bytes].copy_from_slice(src_row);
                }
            }
        }
        out.check_shape(width, height, format)
    }
}
