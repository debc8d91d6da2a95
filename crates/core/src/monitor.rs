//! Performance monitor: times named operations and records resource deltas.
//!
//! Purely observational. A measured closure or future runs exactly as it
//! would unmeasured and its output is returned untouched.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::debug;

use crate::metrics;
use crate::pool::PoolObserver;

const DEFAULT_HISTORY: usize = 1024;

/// Page size assumed when converting `/proc/self/statm` pages to bytes.
const PAGE_SIZE: u64 = 4096;

/// One measured run.
#[derive(Debug, Clone, Serialize)]
pub struct OperationSample {
    pub name: String,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    /// Change in resident memory; `None` where it cannot be read.
    pub memory_delta_bytes: Option<i64>,
    /// Clients the attached pool created during the run.
    pub clients_created_delta: Option<i64>,
    pub recorded_at: DateTime<Utc>,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

/// Aggregate over every retained sample with one name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSummary {
    pub name: String,
    pub count: usize,
    pub total_ms: f64,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub memory_delta_bytes: i64,
    pub clients_created: i64,
}

struct Baseline {
    started: Instant,
    memory: Option<u64>,
    clients: Option<u64>,
}

/// Bounded history of measured operations.
pub struct PerformanceMonitor {
    history: Mutex<VecDeque<OperationSample>>,
    capacity: usize,
    pool: RwLock<Option<Arc<dyn PoolObserver>>>,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

impl PerformanceMonitor {
    /// Keep at most `capacity` samples; the oldest go first.
    pub fn new(capacity: usize) -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY))),
            capacity: capacity.max(1),
            pool: RwLock::new(None),
        }
    }

    /// Track client creation through `pool`.
    pub fn attach_pool(&self, pool: Arc<dyn PoolObserver>) {
        *self.pool.write() = Some(pool);
    }

    pub fn measure<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        let baseline = self.baseline();
        let output = f();
        self.record(name, baseline);
        output
    }

    pub async fn measure_async<F: Future>(&self, name: &str, fut: F) -> F::Output {
        let baseline = self.baseline();
        let output = fut.await;
        self.record(name, baseline);
        output
    }

    /// Oldest first.
    pub fn samples(&self) -> Vec<OperationSample> {
        self.history.lock().iter().cloned().collect()
    }

    /// Per-name aggregates, ordered by name.
    pub fn summary(&self) -> Vec<OperationSummary> {
        let history = self.history.lock();
        let mut by_name: BTreeMap<&str, Vec<&OperationSample>> = BTreeMap::new();
        for sample in history.iter() {
            by_name.entry(&sample.name).or_default().push(sample);
        }

        by_name
            .into_iter()
            .map(|(name, samples)| {
                let millis: Vec<f64> = samples
                    .iter()
                    .map(|s| s.elapsed.as_secs_f64() * 1000.0)
                    .collect();
                let total_ms: f64 = millis.iter().sum();
                OperationSummary {
                    name: name.to_string(),
                    count: samples.len(),
                    total_ms,
                    mean_ms: total_ms / samples.len() as f64,
                    min_ms: millis.iter().copied().fold(f64::INFINITY, f64::min),
                    max_ms: millis.iter().copied().fold(0.0, f64::max),
                    memory_delta_bytes: samples.iter().filter_map(|s| s.memory_delta_bytes).sum(),
                    clients_created: samples.iter().filter_map(|s| s.clients_created_delta).sum(),
                }
            })
            .collect()
    }

    pub fn clear(&self) {
        self.history.lock().clear();
    }

    fn baseline(&self) -> Baseline {
        Baseline {
            started: Instant::now(),
            memory: resident_memory_bytes(),
            clients: self.created_clients(),
        }
    }

    fn created_clients(&self) -> Option<u64> {
        self.pool.read().as_ref().map(|p| p.pool_stats().clients_created)
    }

    fn record(&self, name: &str, baseline: Baseline) {
        let elapsed = baseline.started.elapsed();
        let memory_delta_bytes = match (baseline.memory, resident_memory_bytes()) {
            (Some(before), Some(after)) => Some(after as i64 - before as i64),
            _ => None,
        };
        let clients_created_delta = match (baseline.clients, self.created_clients()) {
            (Some(before), Some(after)) => Some(after as i64 - before as i64),
            _ => None,
        };

        metrics::OPERATION_DURATION
            .with_label_values(&[name])
            .observe(elapsed.as_secs_f64());
        debug!(
            name,
            elapsed_ms = elapsed.as_millis() as u64,
            ?memory_delta_bytes,
            ?clients_created_delta,
            "Operation measured"
        );

        let mut history = self.history.lock();
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(OperationSample {
            name: name.to_string(),
            elapsed,
            memory_delta_bytes,
            clients_created_delta,
            recorded_at: Utc::now(),
        });
    }
}

/// Resident set size from `/proc/self/statm`; `None` off Linux.
pub fn resident_memory_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolStatistics;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakePool {
        created: AtomicUsize,
    }

    impl PoolObserver for FakePool {
        fn pool_stats(&self) -> PoolStatistics {
            PoolStatistics {
                clients_created: self.created.load(Ordering::SeqCst) as u64,
                ..PoolStatistics::default()
            }
        }
    }

    #[test]
    fn test_measure_returns_output_and_records() {
        let monitor = PerformanceMonitor::new(8);
        let value = monitor.measure("parse", || 41 + 1);
        assert_eq!(value, 42);

        let samples = monitor.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "parse");
        assert_eq!(samples[0].clients_created_delta, None);
    }

    #[test]
    fn test_history_is_bounded() {
        let monitor = PerformanceMonitor::new(3);
        for i in 0..5 {
            monitor.measure(&format!("op{}", i), || ());
        }
        let names: Vec<String> = monitor.samples().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["op2", "op3", "op4"]);
    }

    #[test]
    fn test_clients_created_delta_from_attached_pool() {
        let pool = Arc::new(FakePool {
            created: AtomicUsize::new(1),
        });
        let monitor = PerformanceMonitor::new(8);
        monitor.attach_pool(Arc::clone(&pool) as Arc<dyn PoolObserver>);

        monitor.measure("resolve", || {
            pool.created.fetch_add(2, Ordering::SeqCst);
        });
        monitor.measure("resolve", || ());

        let summary = monitor.summary();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].count, 2);
        assert_eq!(summary[0].clients_created, 2);
        assert!(summary[0].min_ms <= summary[0].max_ms);
    }

    #[tokio::test]
    async fn test_measure_async_passes_errors_through() {
        let monitor = PerformanceMonitor::default();
        let result: Result<(), &str> = monitor.measure_async("fetch", async { Err("boom") }).await;
        assert_eq!(result, Err("boom"));
        assert_eq!(monitor.summary()[0].name, "fetch");
    }

    #[test]
    fn test_summary_groups_by_name() {
        let monitor = PerformanceMonitor::new(16);
        monitor.measure("b", || ());
        monitor.measure("a", || ());
        monitor.measure("b", || ());

        let summary = monitor.summary();
        let counts: Vec<(&str, usize)> = summary.iter().map(|s| (s.name.as_str(), s.count)).collect();
        assert_eq!(counts, vec![("a", 1), ("b", 2)]);

        monitor.clear();
        assert!(monitor.summary().is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_resident_memory_readable_on_linux() {
        assert!(resident_memory_bytes().unwrap_or(0) > 0);
    }
}
