//! Logging and step timing for pixelforge
//!
//! This crate provides the observability pieces shared by the engine:
//! - Structured logging with tracing
//! - Per-invocation ids for correlating log lines
//! - Step timing collected into a value owned by one invocation

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

/// Initialize logging with the default configuration
pub fn init() -> anyhow::Result<()> {
    init_with_config(TelemetryConfig::default())
}

/// Initialize logging with a custom configuration
///
/// `RUST_LOG` takes precedence over `config.log_level` when it is set.
pub fn init_with_config(config: TelemetryConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let json_layer = config.json.then(|| {
        fmt::layer()
            .json()
            .with_target(config.show_target)
            .with_thread_ids(config.show_thread_ids)
            .with_file(config.show_file)
            .with_line_number(config.show_line_number)
    });
    let compact_layer = (!config.json).then(|| {
        fmt::layer()
            .with_target(config.show_target)
            .with_thread_ids(config.show_thread_ids)
            .with_file(config.show_file)
            .with_line_number(config.show_line_number)
            .compact()
    });

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(compact_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Telemetry initialized");

    Ok(())
}

/// Generate a fresh id for one pipeline invocation
pub fn invocation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub json: bool,
    pub show_target: bool,
    pub show_thread_ids: bool,
    pub show_file: bool,
    pub show_line_number: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            show_target: false,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
        }
    }
}

/// Durations of the steps of a single invocation, in execution order
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepTimings {
    entries: Vec<StepTiming>,
}

/// One recorded step
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub step: String,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

impl StepTimings {
    /// Create an empty timing record
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished step
    pub fn record(&mut self, step: impl Into<String>, duration: Duration) {
        let step = step.into();
        tracing::debug!(step = %step, duration_ms = duration.as_millis(), "Step completed");
        self.entries.push(StepTiming { step, duration });
    }

    /// Run `f`, recording how long it took under `step`
    pub fn time<T>(&mut self, step: impl Into<String>, f: impl FnOnce() -> T) -> T {
        let timer = Timer::start(step);
        let out = f();
        timer.stop(self);
        out
    }

    /// Recorded steps in execution order
    pub fn entries(&self) -> &[StepTiming] {
        &self.entries
    }

    /// Names of the recorded steps in execution order
    pub fn step_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.step.as_str()).collect()
    }

    /// Sum of all step durations
    pub fn total(&self) -> Duration {
        self.entries.iter().map(|e| e.duration).sum()
    }

    /// Summary statistics over the step durations
    pub fn stats(&self) -> DurationStats {
        let values: Vec<f64> = self
            .entries
            .iter()
            .map(|e| e.duration.as_secs_f64() * 1000.0)
            .collect();
        DurationStats::from_values(&values)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Duration statistics in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
}

impl DurationStats {
    fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                count: 0,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                p50: 0.0,
                p95: 0.0,
            };
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();

        Self {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            mean: sum / count as f64,
            p50: percentile(&sorted, 50.0),
            p95: percentile(&sorted, 95.0),
        }
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Timer for measuring one step
pub struct Timer {
    name: String,
    start: Instant,
}

impl Timer {
    /// Start a new timer
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
        }
    }

    /// Stop the timer and record the duration into `timings`
    pub fn stop(self, timings: &mut StepTimings) -> Duration {
        let duration = self.start.elapsed();
        timings.record(self.name, duration);
        duration
    }
}
