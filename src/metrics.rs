// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the tag engine.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `tag_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: set_with_tags, resolve, invalidate, rename, ...
//! - `status`: success, error

use metrics::{counter, histogram};
use std::time::{Duration, Instant};

/// Record a completed engine operation
pub fn record_operation(operation: &str, status: &str) {
    counter!(
        "tag_cache_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "tag_cache_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record how many candidate tokens a tag resolution produced
pub fn record_resolve_size(count: usize) {
    histogram!("tag_cache_resolve_members").record(count as f64);
}

/// Record tokens registered into tag sets
pub fn record_tag_registrations(count: usize) {
    counter!("tag_cache_tag_registrations_total").increment(count as u64);
}

/// Record stale tokens pruned by a cleanup-mode read
pub fn record_pruned(count: usize) {
    counter!("tag_cache_pruned_tokens_total").increment(count as u64);
}

/// Record entities deleted by tag invalidation
pub fn record_invalidated(count: usize) {
    counter!("tag_cache_invalidated_entities_total").increment(count as u64);
}

/// Record entity deletions that failed during invalidation
pub fn record_invalidation_failures(count: usize) {
    counter!("tag_cache_invalidation_failures_total").increment(count as u64);
}

/// Record a connection/backend error
pub fn record_connection_error(backend: &str) {
    counter!(
        "tag_cache_connection_errors_total",
        "backend" => backend.to_string()
    )
    .increment(1);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}
