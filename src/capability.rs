use crate::config::{EngineMode, PrecisionMode};
use crate::kernel::Precision;

/// What a compute device reports about itself once opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCaps {
    pub name: String,
    pub supports_f64: bool,
}

#[derive(Debug, Clone)]
pub struct CapabilityReport {
    pub requested_engine: EngineMode,
    pub requested_precision: PrecisionMode,
    pub engine: EngineMode,
    pub precision: Option<Precision>,
    pub device: Option<String>,
    notes: Vec<String>,
}

impl CapabilityReport {
    /// Report for an engine that is used as requested, before any device is opened.
    pub fn new(requested_engine: EngineMode, requested_precision: PrecisionMode) -> Self {
        Self {
            requested_engine,
            requested_precision,
            engine: requested_engine,
            precision: None,
            device: None,
            notes: Vec::new(),
        }
    }

    pub fn changed(&self) -> bool {
        if self.engine != self.requested_engine {
            return true;
        }
        matches!(
            (self.requested_precision, self.precision),
            (PrecisionMode::Double, Some(Precision::Single))
                | (PrecisionMode::Single, Some(Precision::Double))
        )
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn push_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn record_engine_fallback(&mut self, to: EngineMode, reason: impl Into<String>) {
        self.engine = to;
        self.notes.push(reason.into());
    }

    /// Pick the kernel precision from what the device reports.
    pub fn resolve_precision(&mut self, caps: &DeviceCaps) -> Precision {
        self.device = Some(caps.name.clone());
        let precision = match (self.requested_precision, caps.supports_f64) {
            (PrecisionMode::Single, _) => Precision::Single,
            (PrecisionMode::Auto, true) | (PrecisionMode::Double, true) => Precision::Double,
            (PrecisionMode::Auto, false) => Precision::Single,
            (PrecisionMode::Double, false) => {
                self.push_note(format!(
                    "double precision requested but {} does not support it; falling back to single precision",
                    caps.name
                ));
                Precision::Single
            }
        };
        self.precision = Some(precision);
        precision
    }

    pub fn status_label(&self) -> String {
        let precision = self.precision.map(Precision::name).unwrap_or("unresolved");
        let device = self.device.as_deref().unwrap_or("<not opened>");
        if self.changed() {
            return format!(
                "fallback eng {:?}->{:?}, precision {:?}->{} on {}",
                self.requested_engine, self.engine, self.requested_precision, precision, device
            );
        }
        format!("ok eng={:?}, precision={} on {}", self.engine, precision, device)
    }
}

pub fn probe_runtime(requested_engine: EngineMode, requested_precision: PrecisionMode) -> CapabilityReport {
    #[allow(unused_mut)]
    let mut report = CapabilityReport::new(requested_engine, requested_precision);

    // On macOS the Metal device is only checked when the session opens.
    #[cfg(not(target_os = "macos"))]
    if requested_engine == EngineMode::Metal {
        report.record_engine_fallback(
            EngineMode::Cpu,
            "metal engine unsupported on this platform; falling back to cpu engine",
        );
    }

    report
}
