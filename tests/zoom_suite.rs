use std::io;
use std::time::{Duration, Instant};

use brotzoom::compute::{ComputeSession, SessionOptions};
use brotzoom::config::{EngineMode, PrecisionMode};
use brotzoom::encode::RawFrameSink;
use brotzoom::progress::ProgressMeter;
use brotzoom::{
    Frame, FrameFormat, FrameRenderer, FrameSink, ImageSpec, PixelFormat, Progress, RenderError,
    Viewport, ZoomPath, ZoomSequencer,
};
use num_complex::Complex;

fn cpu_renderer(w: u32, h: u32, n: u32, format: PixelFormat) -> FrameRenderer {
    let mut renderer = FrameRenderer::new(ComputeSession::new(SessionOptions {
        engine: EngineMode::Cpu,
        precision: PrecisionMode::Auto,
    }));
    renderer
        .configure(ImageSpec::new(w, h, n).with_format(format))
        .expect("configure");
    renderer
}

fn short_path(n: u32) -> ZoomPath {
    ZoomPath::new(
        Viewport::new(-0.5, 0.0, 3.0).expect("start"),
        Viewport::new(-0.75, 0.1, 0.05).expect("end"),
        n,
    )
    .expect("path")
}

/// Accepts frames until `fail_at` (1-indexed), then reports a dead pipe.
struct FailingSink {
    fail_at: u32,
    seen: u32,
    error: RenderError,
}

impl FrameSink for FailingSink {
    fn write_frame(&mut self, _frame: &Frame) -> Result<(), RenderError> {
        self.seen += 1;
        if self.seen == self.fail_at {
            return Err(self.error.clone());
        }
        Ok(())
    }
}

#[test]
fn widths_shrink_geometrically_and_centers_move_linearly() {
    let start = Viewport::new(-0.5, 0.0, 4.0).expect("start");
    let end = Viewport::new(-0.403, 0.595, 2e-5).expect("end");
    let path = ZoomPath::new(start, end, 400).expect("path");

    let frames = path.iter().collect::<Vec<_>>();
    assert_eq!(frames.len(), 400);
    assert_eq!(path.len(), 400);

    let ratio = path.width_ratio();
    let mut prev = start;
    let mut product = 1.0f64;
    let step = (end.center - start.center) / 400.0;
    for vp in &frames {
        let r = vp.width / prev.width;
        assert!((r - ratio).abs() <= 1e-9 * ratio, "ratio {r} vs {ratio}");
        product *= r;

        let d = vp.center - prev.center;
        assert!((d - step).norm() <= 1e-12);
        prev = *vp;
    }
    let want = end.width / start.width;
    assert!((product - want).abs() <= 1e-9 * want, "product {product} vs {want}");

    let last = frames[frames.len() - 1];
    assert!((last.width - end.width).abs() <= 1e-9 * end.width);
    assert!((last.center - end.center).norm() <= 1e-12);
    assert_eq!(path.viewport(0), start);
}

#[test]
fn frame_index_beyond_i32_still_shrinks() {
    let start = Viewport::new(0.0, 0.0, 1.0).expect("start");
    let end = Viewport::new(0.0, 0.0, 0.5).expect("end");
    let path = ZoomPath::new(start, end, u32::MAX).expect("path");

    let last = path.viewport(u32::MAX).width;
    assert!((last - 0.5).abs() <= 1e-5, "last width {last}");
    let past_half = path.viewport(i32::MAX as u32 + 10).width;
    assert!(past_half < 1.0 && past_half > 0.5, "width {past_half}");
}

#[test]
fn zero_frames_is_rejected() {
    let vp = Viewport::new(0.0, 0.0, 1.0).expect("viewport");
    let err = ZoomPath::new(vp, vp, 0).expect_err("empty path");
    assert!(matches!(err, RenderError::InvalidDimensions(_)), "{err:?}");

    let bad = Viewport {
        center: Complex::new(0.0, 0.0),
        width: -1.0,
    };
    let err = ZoomPath::new(vp, bad, 10).expect_err("negative end width");
    assert!(matches!(err, RenderError::InvalidDimensions(_)));
}

#[test]
fn single_frame_lands_on_the_end_viewport() {
    let start = Viewport::new(-0.5, 0.0, 1.0).expect("start");
    let end = Viewport::new(-0.5, 0.0, 0.5).expect("end");
    let path = ZoomPath::new(start, end, 1).expect("path");

    let mut renderer = cpu_renderer(64, 48, 128, PixelFormat::GrayF32);
    let mut frames: Vec<Frame> = Vec::new();
    let events = ZoomSequencer::new(&mut renderer, &mut frames, path)
        .collect::<Result<Vec<_>, _>>()
        .expect("zoom");

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].frame_index, 1);
    assert_eq!(events[0].viewport.width, 0.5);
    assert_eq!(events[0].viewport.center, Complex::new(-0.5, 0.0));
    assert!(events[0].is_last());

    assert_eq!(frames.len(), 1);
    let direct = renderer
        .render(Complex::new(-0.5, 0.0), 0.5)
        .expect("direct render")
        .to_frame();
    assert_eq!(frames[0], direct);
    assert_eq!(frames[0].format, FrameFormat::Gray8);
}

#[test]
fn progress_arrives_in_frame_order() {
    let mut renderer = cpu_renderer(24, 16, 64, PixelFormat::Rgba8);
    let mut frames: Vec<Frame> = Vec::new();
    let path = short_path(5);
    let events = ZoomSequencer::new(&mut renderer, &mut frames, path)
        .collect::<Result<Vec<Progress>, _>>()
        .expect("zoom");

    let indices = events.iter().map(|p| p.frame_index).collect::<Vec<_>>();
    assert_eq!(indices, vec![1, 2, 3, 4, 5]);
    assert!(events.iter().all(|p| p.total_frames == 5));
    assert_eq!(events.iter().filter(|p| p.is_last()).count(), 1);
    for (p, i) in events.iter().zip(1..) {
        assert_eq!(p.viewport, path.viewport(i));
    }

    assert_eq!(frames.len(), 5);
    assert!(frames.iter().all(|f| f.bytes.len() == 24 * 16 * 4));
}

#[test]
fn sink_failure_stops_the_sequence() {
    let mut renderer = cpu_renderer(16, 16, 32, PixelFormat::GrayF32);
    let mut sink = FailingSink {
        fail_at: 3,
        seen: 0,
        error: RenderError::encoder_pipe("write frame 3 to encoder: Broken pipe", "moov atom not found"),
    };

    let mut seq = ZoomSequencer::new(&mut renderer, &mut sink, short_path(10));
    assert!(seq.next().expect("frame 1").is_ok());
    assert!(seq.next().expect("frame 2").is_ok());
    let err = seq
        .next()
        .expect("frame 3 event")
        .expect_err("frame 3 fails");
    assert!(matches!(err, RenderError::EncoderPipe { .. }), "{err:?}");
    assert!(err.to_string().contains("moov atom not found"));
    assert!(seq.next().is_none());
    assert!(seq.next().is_none());
    drop(seq);

    assert_eq!(renderer.session().stats().dispatches, 3);
}

#[test]
fn other_sink_errors_become_encoder_pipe_errors() {
    let mut renderer = cpu_renderer(8, 8, 16, PixelFormat::GrayF32);
    let mut sink = FailingSink {
        fail_at: 1,
        seen: 0,
        error: RenderError::device("disk full"),
    };
    let err = ZoomSequencer::new(&mut renderer, &mut sink, short_path(3))
        .run_to_end()
        .expect_err("sink fails");
    match err {
        RenderError::EncoderPipe { message, .. } => {
            assert!(message.starts_with("frame 1"), "{message}");
            assert!(message.contains("disk full"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn run_to_end_counts_written_frames() {
    let mut renderer = cpu_renderer(12, 8, 32, PixelFormat::GrayF32);
    let mut frames: Vec<Frame> = Vec::new();
    let written = ZoomSequencer::new(&mut renderer, &mut frames, short_path(4))
        .run_to_end()
        .expect("zoom");
    assert_eq!(written, 4);
    assert_eq!(frames.len(), 4);
}

#[test]
fn dropping_the_sequencer_cancels_remaining_frames() {
    let mut renderer = cpu_renderer(12, 8, 32, PixelFormat::GrayF32);
    let mut frames: Vec<Frame> = Vec::new();
    {
        let seq = ZoomSequencer::new(&mut renderer, &mut frames, short_path(50));
        for event in seq.take(2) {
            event.expect("frame");
        }
    }
    assert_eq!(frames.len(), 2);
    assert_eq!(renderer.session().stats().dispatches, 2);
}

#[test]
fn raw_sink_streams_fixed_size_frames() {
    let mut renderer = cpu_renderer(20, 10, 32, PixelFormat::Rgba8);
    let mut sink = RawFrameSink::new(Vec::<u8>::new());
    let written = ZoomSequencer::new(&mut renderer, &mut sink, short_path(3))
        .run_to_end()
        .expect("zoom");
    assert_eq!(written, 3);
    assert_eq!(sink.frames_written(), 3);
    assert_eq!(sink.into_inner().len(), 3 * 20 * 10 * 4);
}

#[test]
fn raw_sink_rejects_short_frames() {
    let mut sink = RawFrameSink::new(Vec::<u8>::new());
    let frame = Frame {
        width: 4,
        height: 4,
        format: FrameFormat::Rgba8,
        bytes: vec![0; 15],
    };
    let err = sink.write_frame(&frame).expect_err("short frame");
    assert!(matches!(err, RenderError::EncoderPipe { .. }));
    assert_eq!(sink.frames_written(), 0);
}

struct ClosedPipe;

impl io::Write for ClosedPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader went away"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn raw_sink_reports_broken_pipe() {
    let mut sink = RawFrameSink::new(ClosedPipe);
    let frame = Frame {
        width: 2,
        height: 2,
        format: FrameFormat::Gray8,
        bytes: vec![7; 4],
    };
    let err = sink.write_frame(&frame).expect_err("closed pipe");
    assert_eq!(err.kind(), "EncoderPipeError");
    assert!(err.to_string().contains("reader went away"));
}

#[test]
fn progress_meter_reports_rate_and_eta() {
    let t0 = Instant::now();
    let mut meter = ProgressMeter::starting_at(t0);
    let vp = Viewport::new(0.0, 0.0, 1.0).expect("viewport");

    let first = meter.observe_at(
        &Progress {
            frame_index: 1,
            total_frames: 10,
            viewport: vp,
        },
        t0 + Duration::from_millis(100),
    );
    assert!((first.fps - 10.0).abs() < 1e-9);
    assert!((first.avg_fps - 10.0).abs() < 1e-9);
    assert!(first.eta.abs_diff(Duration::from_millis(900)) < Duration::from_millis(1));

    let text = first.to_string();
    assert!(text.starts_with("frame     1/10"), "{text}");
    assert!(text.contains("10.0 fps (avg 10.0)"), "{text}");
    assert!(text.contains("eta 00:00"), "{text}");

    let second = meter.observe_at(
        &Progress {
            frame_index: 2,
            total_frames: 10,
            viewport: vp,
        },
        t0 + Duration::from_millis(300),
    );
    assert!((second.fps - 5.0).abs() < 1e-9);
    assert!((second.avg_fps - 2.0 / 0.3).abs() < 1e-9);
    assert!(second.eta.abs_diff(Duration::from_millis(1200)) < Duration::from_millis(1));
}

#[cfg(unix)]
mod encoder_process {
    use super::*;
    use brotzoom::encode::{FfmpegEncoder, VideoSettings};
    use std::ffi::OsString;
    use std::path::PathBuf;

    fn settings(w: u32, h: u32, format: FrameFormat) -> VideoSettings {
        VideoSettings {
            width: w,
            height: h,
            fps: 25,
            format,
            out: PathBuf::from("unused.mp4"),
        }
    }

    fn shell(script: &str) -> Vec<OsString> {
        vec!["-c".into(), script.into()]
    }

    fn frame(w: u32, h: u32, format: FrameFormat) -> Frame {
        Frame {
            width: w,
            height: h,
            format,
            bytes: vec![9; w as usize * h as usize * format.bytes_per_pixel()],
        }
    }

    #[test]
    fn crashed_encoder_surfaces_its_stderr() {
        let mut enc = FfmpegEncoder::spawn_program(
            "sh",
            shell("echo encoder crashed >&2; exit 1"),
            settings(256, 256, FrameFormat::Rgba8),
        )
        .expect("spawn");
        let frame = frame(256, 256, FrameFormat::Rgba8);

        let mut failure = None;
        for _ in 0..64 {
            if let Err(err) = enc.write_frame(&frame) {
                failure = Some(err);
                break;
            }
        }
        let err = failure.expect("writes to a dead encoder must fail");
        match &err {
            RenderError::EncoderPipe { diagnostics, .. } => {
                assert!(diagnostics.contains("encoder crashed"), "{diagnostics:?}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("encoder crashed"));
    }

    #[test]
    fn finish_counts_frames_from_a_healthy_encoder() {
        let mut enc = FfmpegEncoder::spawn_program(
            "sh",
            shell("cat > /dev/null"),
            settings(16, 16, FrameFormat::Gray8),
        )
        .expect("spawn");
        for _ in 0..3 {
            enc.write_frame(&frame(16, 16, FrameFormat::Gray8))
                .expect("write");
        }
        assert_eq!(enc.frames_written(), 3);
        assert_eq!(enc.finish().expect("clean exit"), 3);
    }

    #[test]
    fn finish_reports_non_zero_exit() {
        let mut enc = FfmpegEncoder::spawn_program(
            "sh",
            shell("cat > /dev/null; echo bad settings >&2; exit 3"),
            settings(16, 16, FrameFormat::Gray8),
        )
        .expect("spawn");
        enc.write_frame(&frame(16, 16, FrameFormat::Gray8))
            .expect("write");
        let err = enc.finish().expect_err("non-zero exit");
        match err {
            RenderError::EncoderPipe { diagnostics, .. } => {
                assert!(diagnostics.contains("bad settings"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn mismatched_frame_is_rejected_before_writing() {
        let mut enc = FfmpegEncoder::spawn_program(
            "sh",
            shell("cat > /dev/null"),
            settings(16, 16, FrameFormat::Gray8),
        )
        .expect("spawn");
        let err = enc
            .write_frame(&frame(16, 16, FrameFormat::Rgba8))
            .expect_err("format mismatch");
        assert!(matches!(err, RenderError::EncoderPipe { .. }));
        assert_eq!(enc.finish().expect("clean exit"), 0);
    }

    #[test]
    fn missing_encoder_binary_fails_to_spawn() {
        let err = FfmpegEncoder::spawn_program(
            "/nonexistent/brotzoom-encoder",
            Vec::new(),
            settings(16, 16, FrameFormat::Gray8),
        )
        .err()
        .expect("spawn must fail");
        assert_eq!(err.kind(), "EncoderPipeError");
    }
}
