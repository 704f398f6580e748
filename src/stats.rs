//! Pipeline counters and latency histograms.
//! Counters are plain atomics; latencies keep the last 1024 samples per metric
//! for p50/p95/p99 reporting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    PassesRun,
    PassesSkipped,
    PassesDiscarded,
    GatewayCalls,
    GatewayFailures,
    CacheHits,
    FetchedTexts,
    DomWrites,
    Restores,
}

const COUNTERS: usize = 9;

impl Counter {
    fn slot(self) -> usize {
        self as usize
    }
}

/// Fixed-capacity ring of latency samples.
struct SampleRing {
    samples: Vec<f64>,
    pos: usize,
    count: usize,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity],
            pos: 0,
            count: 0,
        }
    }

    fn push(&mut self, value: f64) {
        self.samples[self.pos] = value;
        self.pos = (self.pos + 1) % self.samples.len();
        self.count = (self.count + 1).min(self.samples.len());
    }

    fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mut sorted = self.samples[..self.count].to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let idx = ((p / 100.0) * (self.count as f64 - 1.0)).round() as usize;
        sorted[idx.min(self.count - 1)]
    }
}

pub struct PipelineStats {
    counters: [AtomicU64; COUNTERS],
    latencies: Mutex<HashMap<&'static str, SampleRing>>,
    ring_capacity: usize,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            counters: Default::default(),
            latencies: Mutex::new(HashMap::new()),
            ring_capacity: 1024,
        }
    }

    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, n: u64) {
        self.counters[counter.slot()].fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.slot()].load(Ordering::Relaxed)
    }

    /// Record a latency sample in microseconds.
    pub fn record(&self, name: &'static str, value_us: f64) {
        self.latencies
            .lock()
            .entry(name)
            .or_insert_with(|| SampleRing::new(self.ring_capacity))
            .push(value_us);
        tracing::trace!(metric = name, value_us, "latency_recorded");
    }

    pub fn percentile(&self, name: &str, p: f64) -> f64 {
        self.latencies
            .lock()
            .get(name)
            .map(|ring| ring.percentile(p))
            .unwrap_or(0.0)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let latencies = self
            .latencies
            .lock()
            .iter()
            .map(|(&name, ring)| {
                (
                    name.to_string(),
                    LatencySummary {
                        p50_us: ring.percentile(50.0),
                        p95_us: ring.percentile(95.0),
                        p99_us: ring.percentile(99.0),
                        count: ring.count,
                    },
                )
            })
            .collect();

        StatsSnapshot {
            passes_run: self.get(Counter::PassesRun),
            passes_skipped: self.get(Counter::PassesSkipped),
            passes_discarded: self.get(Counter::PassesDiscarded),
            gateway_calls: self.get(Counter::GatewayCalls),
            gateway_failures: self.get(Counter::GatewayFailures),
            cache_hits: self.get(Counter::CacheHits),
            fetched_texts: self.get(Counter::FetchedTexts),
            dom_writes: self.get(Counter::DomWrites),
            restores: self.get(Counter::Restores),
            latencies,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencySummary {
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub passes_run: u64,
    pub passes_skipped: u64,
    pub passes_discarded: u64,
    pub gateway_calls: u64,
    pub gateway_failures: u64,
    pub cache_hits: u64,
    pub fetched_texts: u64,
    pub dom_writes: u64,
    pub restores: u64,
    pub latencies: HashMap<String, LatencySummary>,
}

pub mod metric_names {
    pub const PASS_DONE: &str = "t_pass_done";
    pub const SCAN_DONE: &str = "t_scan_done";
    pub const GATEWAY_CALL: &str = "t_gateway_call";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_over_samples() {
        let stats = PipelineStats::new();
        for v in 1..=100 {
            stats.record(metric_names::PASS_DONE, v as f64);
        }
        assert_eq!(stats.percentile(metric_names::PASS_DONE, 50.0), 51.0);
        assert_eq!(stats.percentile(metric_names::PASS_DONE, 99.0), 99.0);
        assert_eq!(stats.percentile("unknown", 50.0), 0.0);
    }

    #[test]
    fn counters_accumulate() {
        let stats = PipelineStats::new();
        stats.incr(Counter::GatewayCalls);
        stats.add(Counter::DomWrites, 3);
        let snap = stats.snapshot();
        assert_eq!(snap.gateway_calls, 1);
        assert_eq!(snap.dom_writes, 3);
        assert_eq!(snap.passes_run, 0);
    }
}
