use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::time::Duration;

const METER_NAME: &str = "gateway";

/// Prediction pipeline instruments. Recording is a no-op until a meter
/// provider is installed.
#[derive(Clone)]
pub struct PipelineMetrics {
    duration: Histogram<f64>,
    predictions: Counter<u64>,
    failures: Counter<u64>,
    detections: Counter<u64>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        let meter = global::meter(METER_NAME);
        let latency_buckets = [
            0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 0.75, 1.0, 1.5, 2.0, 3.0, 5.0, 10.0, 30.0, 60.0,
        ];

        Self {
            duration: meter
                .f64_histogram("prediction_duration_seconds")
                .with_description("Time from upload received to prediction persisted")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
            predictions: meter
                .u64_counter("predictions_total")
                .with_description("Total predictions persisted")
                .build(),
            failures: meter
                .u64_counter("prediction_failures_total")
                .with_description("Total prediction requests that failed")
                .build(),
            detections: meter
                .u64_counter("detections_total")
                .with_description("Total detections drawn on predictions")
                .build(),
        }
    }

    pub fn record_success(&self, elapsed: Duration, detections: usize) {
        self.duration.record(elapsed.as_secs_f64(), &[]);
        self.predictions.add(1, &[]);
        self.detections.add(detections as u64, &[]);
    }

    pub fn record_failure(&self, reason: &'static str) {
        self.failures.add(1, &[KeyValue::new("reason", reason)]);
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
