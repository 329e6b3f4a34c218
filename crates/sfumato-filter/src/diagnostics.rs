//! Per-request diagnostics: timing and sizes for filter computations.
//!
//! Durations use [`std::time::Duration`]. Timestamps come from a
//! [`Clock`], so callers can plug in whatever time source their platform
//! has; [`WebClock`] uses the `web-time` crate, which maps to
//! `performance.now()` on WASM and `std::time::Instant` natively.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sequencer::{Job, SequencerStats};
use crate::types::{Dimensions, FilterConfig, FilterOp, PixelBuffer};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// A monotonic time source.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by `web_time::Instant`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebClock;

impl Clock for WebClock {
    type Instant = web_time::Instant;

    fn now(&self) -> Self::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &Self::Instant) -> Duration {
        since.elapsed()
    }
}

/// Diagnostics for a single filter computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDiagnostics {
    /// The operation that ran.
    pub op: FilterOp,
    /// Image dimensions.
    pub dimensions: Dimensions,
    /// Gaussian sigma, for blurs.
    pub sigma: Option<f32>,
    /// Wall-clock duration of the computation (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// Run `job`, timing it with `clock`.
pub fn run_job_with_diagnostics<C: Clock>(
    job: &Job,
    config: &FilterConfig,
    clock: &C,
) -> (PixelBuffer, FilterDiagnostics) {
    let start = clock.now();
    let output = job.run(config);
    let duration = clock.elapsed(&start);

    let op = job.op();
    let sigma = match op {
        FilterOp::Blur(factor) => Some(factor.sigma(config)),
        FilterOp::EdgeDetect => None,
    };
    let diagnostics = FilterDiagnostics {
        op,
        dimensions: job.base().dimensions(),
        sigma,
        duration,
    };
    (output, diagnostics)
}

/// Diagnostics collected over a sequence of requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionDiagnostics {
    /// One entry per computation, in the order they ran.
    pub computations: Vec<FilterDiagnostics>,
    /// Sequencer counters at the end of the session.
    pub stats: SequencerStats,
}

impl SessionDiagnostics {
    /// Sum of all computation durations.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.computations.iter().map(|d| d.duration).sum()
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Filter Diagnostics Report\n{}", "=".repeat(60)));
        if let Some(first) = self.computations.first() {
            let Dimensions { width, height } = first.dimensions;
            lines.push(format!(
                "Image: {width}x{height} ({} pixels)",
                u64::from(width) * u64::from(height),
            ));
        }
        lines.push(format!(
            "Total compute: {:.3}ms",
            duration_ms(self.total_duration()),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<4} {:<18} {:>10}  {}",
            "#", "Operation", "Duration", "Details"
        ));
        lines.push("-".repeat(60));
        for (i, diag) in self.computations.iter().enumerate() {
            let details = diag
                .sigma
                .map_or_else(String::new, |sigma| format!("sigma={sigma:.2}"));
            lines.push(format!(
                "{:<4} {:<18} {:>8.3}ms  {details}",
                i + 1,
                diag.op.to_string(),
                duration_ms(diag.duration),
            ));
        }

        let SequencerStats {
            accepted,
            computed,
            superseded,
            stale,
            rejected,
        } = self.stats;
        lines.push(String::new());
        lines.push(format!(
            "Requests: {accepted} accepted | {computed} computed | {superseded} superseded | {stale} stale | {rejected} rejected",
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
