//! Escape-time evaluation, shared by every compute backend.
//!
//! The host functions here are the reference for the GPU kernel built by
//! [`metal_source`]: both iterate `z <- z^2 + c` from zero and stop once
//! `|z| > 2`, and both map the result through [`escape_sample`].

use crate::frame::PixelFormat;
use crate::viewport::{BoundingBox, ImageSpec};
use num_complex::Complex;
use num_traits::Float;

/// Floating-point width used inside the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    Single,
    Double,
}

impl Precision {
    pub fn name(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Double => "double",
        }
    }

    fn msl_scalar(self) -> &'static str {
        match self {
            Self::Single => "float",
            Self::Double => "double",
        }
    }
}

/// Outcome of iterating one coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    /// `|z|` exceeded 2 on iteration `k` (0-based).
    After(u32),
    /// Still bounded after the full iteration cap.
    Bounded,
}

pub fn escape_time<T: Float>(c: Complex<T>, n_iterations: u32) -> Escape {
    let two = T::one() + T::one();
    let limit = two * two;
    let mut z = Complex::new(T::zero(), T::zero());
    for k in 0..n_iterations {
        z = z * z + c;
        if z.norm_sqr() > limit {
            return Escape::After(k);
        }
    }
    Escape::Bounded
}

/// Normalized sample: `0.0` for bounded points, `(k+1)/N` in `(0, 1]` otherwise.
#[inline]
pub fn escape_sample(escape: Escape, n_iterations: u32) -> f32 {
    match escape {
        Escape::Bounded => 0.0,
        Escape::After(k) => ((k as f64 + 1.0) / n_iterations.max(1) as f64) as f32,
    }
}

/// Identifies one compiled kernel variant within a compute session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelKey {
    pub precision: Precision,
    pub format: PixelFormat,
}

/// Per-dispatch kernel inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelArgs {
    pub p1: Complex<f64>,
    pub p2: Complex<f64>,
    pub width: u32,
    pub height: u32,
    pub n_iterations: u32,
}

impl KernelArgs {
    pub fn new(bbox: &BoundingBox, spec: &ImageSpec) -> Self {
        Self {
            p1: bbox.p1,
            p2: bbox.p2,
            width: spec.width,
            height: spec.height,
            n_iterations: spec.n_iterations,
        }
    }

    pub fn step(&self) -> Complex<f64> {
        Complex::new(
            (self.p2.re - self.p1.re) / self.width.max(1) as f64,
            (self.p2.im - self.p1.im) / self.height.max(1) as f64,
        )
    }

    /// Precision-cast origin and step, so single-precision kernels round
    /// once up front the way the GPU does.
    pub fn origin_and_step<T: Float>(&self) -> (Complex<T>, Complex<T>) {
        let step = self.step();
        let cast = |v: f64| T::from(v).unwrap_or_else(T::zero);
        (
            Complex::new(cast(self.p1.re), cast(self.p1.im)),
            Complex::new(cast(step.re), cast(step.im)),
        )
    }
}

/// Evaluate one row of the grid into `out` (one sample per pixel).
pub fn eval_row<T: Float>(args: &KernelArgs, y: u32, out: &mut [f32]) {
    let (origin, step) = args.origin_and_step::<T>();
    let ci = origin.im + T::from(y).unwrap_or_else(T::zero) * step.im;
    for (x, slot) in out.iter_mut().enumerate() {
        let cr = origin.re + T::from(x).unwrap_or_else(T::zero) * step.re;
        let e = escape_time(Complex::new(cr, ci), args.n_iterations);
        *slot = escape_sample(e, args.n_iterations);
    }
}

/// Metal Shading Language source for one kernel variant.
///
/// The kernel entry point is `escape_time`; it reads a [`KernelArgs`]-shaped
/// struct at `buffer(0)` and writes `texture(0)`.
pub fn metal_source(key: KernelKey) -> String {
    let write = match key.format {
        PixelFormat::GrayF32 => "out.write(float4(s, 0.0, 0.0, 1.0), gid);",
        PixelFormat::Rgba8 => "out.write(shade(s), gid);",
    };
    format!(
        r#"
#include <metal_stdlib>
using namespace metal;

typedef {scalar} real;
typedef {scalar}2 real2;

struct KernelArgs {{
    float2 p1;
    float2 step;
    uint2 size;
    uint n_iterations;
    uint _pad;
}};

static float3 hsv2rgb(float h, float s, float v) {{
    float3 k = fract(float3(h) + float3(1.0, 2.0 / 3.0, 1.0 / 3.0)) * 6.0 - 3.0;
    return v * mix(float3(1.0), clamp(abs(k) - 1.0, 0.0, 1.0), s);
}}

static float4 shade(float s) {{
    if (s <= 0.0) return float4(0.0, 0.0, 0.0, 1.0);
    float v = sqrt(clamp(s, 0.0, 1.0));
    return float4(hsv2rgb(0.62 + v * 0.9, 0.85, 0.35 + 0.65 * v), 1.0);
}}

kernel void escape_time(
    texture2d<float, access::write> out [[texture(0)]],
    constant KernelArgs& args [[buffer(0)]],
    uint2 gid [[thread_position_in_grid]]
) {{
    if (gid.x >= args.size.x || gid.y >= args.size.y) return;

    real2 c = real2(args.p1) + real2(gid) * real2(args.step);
    real2 z = real2(0.0);
    uint k = 0;
    bool escaped = false;
    for (; k < args.n_iterations; ++k) {{
        z = real2(z.x * z.x - z.y * z.y, 2.0 * z.x * z.y) + c;
        if (dot(z, z) > 4.0) {{
            escaped = true;
            break;
        }}
    }}

    float s = escaped ? float(k + 1) / float(args.n_iterations) : 0.0;
    {write}
}}
"#,
        scalar = key.precision.msl_scalar(),
        write = write,
    )
}
