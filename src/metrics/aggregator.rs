//! Per-engine completion metrics (§4.7): counters mutated under a single
//! per-engine lock and snapshotted the same way, so a snapshot always
//! reflects one consistent request's worth of updates.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Instant,
};

use dashmap::DashMap;

use crate::models::{common::unix_now, metrics::{CompletionMetricsResponse, EngineMetricsSnapshot}};

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    total_requests: u64,
    completed_requests: u64,
    failed_requests: u64,
    input_tokens_total: u64,
    output_tokens_total: u64,
    sum_turnaround_ms: u64,
    sum_ttft_ms: u64,
    sum_output_gen_ms: u64,
    last_updated: Option<u64>,
}

/// §4.7's derived-field formulas, shared by a single engine's `snapshot` and
/// by the aggregator's summed `totals`.
fn derive_snapshot(c: &Counters, first_request_at: Option<Instant>) -> EngineMetricsSnapshot {
    let success_rate_percent = c.completed_requests as f64 / (c.total_requests.max(1)) as f64 * 100.0;
    let avg_ttft_ms = c.sum_ttft_ms as f64 / (c.completed_requests.max(1)) as f64;

    let turnaround_secs = c.sum_turnaround_ms as f64 / 1000.0;
    let tps = if turnaround_secs > 0.0 {
        (c.input_tokens_total + c.output_tokens_total) as f64 / turnaround_secs
    } else {
        0.0
    };

    let output_gen_secs = c.sum_output_gen_ms as f64 / 1000.0;
    let output_tps = if output_gen_secs > 0.0 {
        c.output_tokens_total as f64 / output_gen_secs
    } else {
        0.0
    };

    let rps = match first_request_at {
        Some(start) => {
            let elapsed = start.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                c.completed_requests as f64 / elapsed
            } else {
                0.0
            }
        }
        None => 0.0,
    };

    EngineMetricsSnapshot {
        total_requests: c.total_requests,
        completed_requests: c.completed_requests,
        failed_requests: c.failed_requests,
        input_tokens_total: c.input_tokens_total,
        output_tokens_total: c.output_tokens_total,
        success_rate_percent,
        avg_ttft_ms,
        tps,
        output_tps,
        rps,
        last_updated: c.last_updated,
    }
}

pub struct EngineMetrics {
    counters: Mutex<Counters>,
    first_request_at: Mutex<Option<Instant>>,
}

impl EngineMetrics {
    fn new() -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            first_request_at: Mutex::new(None),
        }
    }

    pub fn record_request_started(&self) {
        self.first_request_at
            .lock()
            .expect("metrics lock poisoned")
            .get_or_insert_with(Instant::now);
        let mut c = self.counters.lock().expect("metrics lock poisoned");
        c.total_requests += 1;
    }

    pub fn record_ttft(&self, ttft_ms: u64) {
        let mut c = self.counters.lock().expect("metrics lock poisoned");
        c.sum_ttft_ms += ttft_ms;
    }

    pub fn record_completion(
        &self,
        input_tokens: u64,
        output_tokens: u64,
        turnaround_ms: u64,
        output_gen_ms: u64,
    ) {
        let mut c = self.counters.lock().expect("metrics lock poisoned");
        c.completed_requests += 1;
        c.input_tokens_total += input_tokens;
        c.output_tokens_total += output_tokens;
        c.sum_turnaround_ms += turnaround_ms;
        c.sum_output_gen_ms += output_gen_ms;
        c.last_updated = Some(unix_now());
    }

    pub fn record_failure(&self) {
        let mut c = self.counters.lock().expect("metrics lock poisoned");
        c.failed_requests += 1;
        c.last_updated = Some(unix_now());
    }

    pub fn snapshot(&self) -> EngineMetricsSnapshot {
        let c = *self.counters.lock().expect("metrics lock poisoned");
        let first_request_at = *self.first_request_at.lock().expect("metrics lock poisoned");
        derive_snapshot(&c, first_request_at)
    }

    /// Raw counters plus the wall-clock anchor for `rps`, used by the
    /// aggregator to compute totals from summed counters rather than from
    /// already-derived per-engine rates.
    fn raw_state(&self) -> (Counters, Option<Instant>) {
        let c = *self.counters.lock().expect("metrics lock poisoned");
        let first_request_at = *self.first_request_at.lock().expect("metrics lock poisoned");
        (c, first_request_at)
    }
}

/// Registry of per-engine metrics, shared by `Arc` with both the dispatcher
/// and the `/metrics` route — it is not owned by the node manager (see §9's
/// note on the cyclic-reference redesign).
#[derive(Default)]
pub struct MetricsAggregator {
    engines: DashMap<String, Arc<EngineMetrics>>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_engine(&self, id: &str) -> Arc<EngineMetrics> {
        Arc::clone(
            self.engines
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(EngineMetrics::new())),
        )
    }

    pub fn snapshot_all(&self) -> HashMap<String, EngineMetricsSnapshot> {
        self.engines
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }

    /// Sums every engine's raw counters and re-derives the §4.7 rates from
    /// that sum, rather than averaging already-derived per-engine rates.
    pub fn combined_completion(&self) -> CompletionMetricsResponse {
        let engines = self.snapshot_all();

        let mut summed = Counters::default();
        let mut earliest_start: Option<Instant> = None;
        for entry in self.engines.iter() {
            let (c, first_request_at) = entry.value().raw_state();
            summed.total_requests += c.total_requests;
            summed.completed_requests += c.completed_requests;
            summed.failed_requests += c.failed_requests;
            summed.input_tokens_total += c.input_tokens_total;
            summed.output_tokens_total += c.output_tokens_total;
            summed.sum_turnaround_ms += c.sum_turnaround_ms;
            summed.sum_ttft_ms += c.sum_ttft_ms;
            summed.sum_output_gen_ms += c.sum_output_gen_ms;
            summed.last_updated = summed.last_updated.max(c.last_updated);
            earliest_start = match (earliest_start, first_request_at) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (Some(a), None) => Some(a),
                (None, b) => b,
            };
        }

        let totals = derive_snapshot(&summed, earliest_start);
        CompletionMetricsResponse { engines, totals }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_before_any_activity_is_all_zero() {
        let metrics = EngineMetrics::new();
        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 0);
        assert_eq!(snap.success_rate_percent, 0.0);
        assert_eq!(snap.tps, 0.0);
    }

    #[test]
    fn completed_and_failed_sum_to_total() {
        let metrics = EngineMetrics::new();
        metrics.record_request_started();
        metrics.record_request_started();
        metrics.record_request_started();
        metrics.record_completion(10, 20, 500, 400);
        metrics.record_completion(5, 5, 200, 100);
        metrics.record_failure();

        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.completed_requests + snap.failed_requests, snap.total_requests);
        assert_eq!(snap.input_tokens_total, 15);
        assert_eq!(snap.output_tokens_total, 25);
    }

    #[test]
    fn success_rate_is_percentage_of_total() {
        let metrics = EngineMetrics::new();
        metrics.record_request_started();
        metrics.record_request_started();
        metrics.record_completion(1, 1, 100, 100);
        metrics.record_failure();

        let snap = metrics.snapshot();
        assert_eq!(snap.success_rate_percent, 50.0);
    }

    #[test]
    fn aggregator_combined_sums_per_engine_counters() {
        let agg = MetricsAggregator::new();
        agg.for_engine("a").record_request_started();
        agg.for_engine("a").record_completion(1, 1, 100, 100);
        agg.for_engine("b").record_request_started();
        agg.for_engine("b").record_completion(2, 2, 100, 100);

        let combined = agg.combined_completion();
        assert_eq!(combined.totals.total_requests, 2);
        assert_eq!(combined.totals.completed_requests, 2);
        assert_eq!(combined.engines.len(), 2);
    }
}
