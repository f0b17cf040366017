use crate::format::ResponseFormat;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    ClientError,
    ServerError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::ClientError => "client_error",
            Outcome::ServerError => "server_error",
        }
    }
}

/// Request instruments; no-ops until a meter provider is installed.
pub struct DetectMetrics {
    duration: Histogram<f64>,
    requests: Counter<u64>,
    objects: Counter<u64>,
}

impl DetectMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0, 5.0,
        ];
        let duration = meter
            .f64_histogram("detect_duration_seconds")
            .with_description("Time to serve a detection request (save + decode + infer)")
            .with_unit("s")
            .with_boundaries(latency_buckets.to_vec())
            .build();
        let requests = meter
            .u64_counter("detect_requests_total")
            .with_description("Total detection requests by outcome")
            .build();
        let objects = meter
            .u64_counter("detect_objects_total")
            .with_description("Total objects returned to clients")
            .build();

        Self {
            duration,
            requests,
            objects,
        }
    }

    pub fn record(
        &self,
        format: ResponseFormat,
        outcome: Outcome,
        elapsed: Duration,
        objects: usize,
    ) {
        let attributes = [
            KeyValue::new("format", format.as_str()),
            KeyValue::new("outcome", outcome.as_str()),
        ];
        self.duration.record(elapsed.as_secs_f64(), &attributes);
        self.requests.add(1, &attributes);
        if objects > 0 {
            self.objects
                .add(objects as u64, &[KeyValue::new("format", format.as_str())]);
        }
    }
}

impl Default for DetectMetrics {
    fn default() -> Self {
        Self::new("gateway")
    }
}
