use brotzoom::frame::{quantize, shade};
use brotzoom::kernel::{
    Escape, KernelArgs, KernelKey, Precision, escape_sample, escape_time, eval_row, metal_source,
};
use brotzoom::{ImageSpec, PixelFormat, Viewport};
use num_complex::Complex;

#[test]
fn main_cardioid_never_escapes() {
    for n in [1, 2, 10, 256, 4096] {
        assert_eq!(escape_time(Complex::new(0.0f64, 0.0), n), Escape::Bounded);
        assert_eq!(escape_time(Complex::new(0.0f32, 0.0), n), Escape::Bounded);
    }
    assert_eq!(escape_time(Complex::new(-0.5f64, 0.0), 256), Escape::Bounded);
    assert_eq!(escape_time(Complex::new(-0.1f64, 0.1), 1024), Escape::Bounded);
}

#[test]
fn far_points_escape_immediately() {
    for n in [1, 5, 1024] {
        assert_eq!(escape_time(Complex::new(10.0f64, 10.0), n), Escape::After(0));
        assert_eq!(escape_time(Complex::new(10.0f32, 10.0), n), Escape::After(0));
    }
}

#[test]
fn escape_threshold_is_strict() {
    // c = 2: z1 = 2 (|z| = 2, still bounded), z2 = 6.
    assert_eq!(escape_time(Complex::new(2.0f64, 0.0), 256), Escape::After(1));
    assert_eq!(escape_time(Complex::new(2.0f64, 0.0), 1), Escape::Bounded);
    // c = -2 sits on the boundary forever: -2, 2, 2, ...
    assert_eq!(escape_time(Complex::new(-2.0f64, 0.0), 512), Escape::Bounded);
}

#[test]
fn single_and_double_precision_agree_on_shallow_points() {
    let points = [(-1.0, 0.0), (0.5, 0.5), (1.0, 1.0), (-0.1, 0.1), (0.0, 1.5), (-1.5, 0.5)];
    for (re, im) in points {
        let single = escape_time(Complex::new(re as f32, im as f32), 200);
        let double = escape_time(Complex::new(re, im), 200);
        assert_eq!(single, double, "c = {re}+{im}i");
    }
    assert_eq!(escape_time(Complex::new(1.0f64, 1.0), 200), Escape::After(1));
}

#[test]
fn samples_are_normalized_with_unique_sentinel() {
    assert_eq!(escape_sample(Escape::Bounded, 256), 0.0);
    assert!((escape_sample(Escape::After(0), 256) - 1.0 / 256.0).abs() < 1e-9);
    assert_eq!(escape_sample(Escape::After(255), 256), 1.0);
    for k in 0..64 {
        let s = escape_sample(Escape::After(k), 64);
        assert!(s > 0.0 && s <= 1.0);
    }
}

#[test]
fn row_evaluation_matches_pointwise_mapping() {
    let spec = ImageSpec::new(48, 20, 96);
    let vp = Viewport::new(-0.75, 0.1, 3.0).expect("valid viewport");
    let bbox = vp.bounding_box(spec.width, spec.height);
    let args = KernelArgs::new(&bbox, &spec);

    let mut row = vec![0.0f32; spec.width as usize];
    for y in 0..spec.height {
        eval_row::<f64>(&args, y, &mut row);
        for x in 0..spec.width {
            let c = bbox.pixel_to_complex(x, y, spec.width, spec.height);
            let want = escape_sample(escape_time(c, spec.n_iterations), spec.n_iterations);
            assert_eq!(row[x as usize], want, "pixel ({x}, {y})");
        }
    }
}

#[test]
fn quantization_rounds_and_clamps() {
    assert_eq!(quantize(0.0), 0);
    assert_eq!(quantize(1.0), 255);
    assert_eq!(quantize(0.5), 128);
    assert_eq!(quantize(-0.25), 0);
    assert_eq!(quantize(3.0), 255);
    assert_eq!(quantize(f32::NAN), 0);
}

#[test]
fn shading_keeps_in_set_black_and_opaque() {
    assert_eq!(shade(0.0), [0, 0, 0, 255]);
    for s in [1.0 / 1024.0, 0.1, 0.5, 1.0] {
        let px = shade(s);
        assert_eq!(px[3], 255);
        assert!(px[..3].iter().any(|&c| c > 0), "sample {s} shaded black");
    }
}

#[test]
fn metal_source_is_parameterized_by_precision_and_format() {
    let gray = metal_source(KernelKey {
        precision: Precision::Single,
        format: PixelFormat::GrayF32,
    });
    assert!(gray.contains("kernel void escape_time("));
    assert!(gray.contains("typedef float real;"));
    assert!(gray.contains("out.write(float4(s, 0.0, 0.0, 1.0), gid);"));
    assert!(!gray.contains("out.write(shade(s), gid);"));

    let rgba = metal_source(KernelKey {
        precision: Precision::Double,
        format: PixelFormat::Rgba8,
    });
    assert!(rgba.contains("typedef double real;"));
    assert!(rgba.contains("typedef double2 real2;"));
    assert!(rgba.contains("out.write(shade(s), gid);"));
    assert!(!rgba.contains("float real;"));
}
