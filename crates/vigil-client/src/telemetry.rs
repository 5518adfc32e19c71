//! Telemetry aggregates for the non-planning event namespaces.
//!
//! Counters and rolling means are updated incrementally per event; nothing
//! here stores the full event stream. Recent-activity logs are bounded
//! ring-style lists, most recent first.

use tokio::sync::watch;
use tracing::debug;

use vigil_core::{IntentClassified, LogRecord, MemoryOpKind, SearchEvent, SystemStatus};

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate types
// ─────────────────────────────────────────────────────────────────────────────

/// Incrementally maintained arithmetic mean.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RollingAverage {
    /// Samples folded in so far.
    pub count: u64,
    /// Current mean; zero until the first sample.
    pub value: f64,
}

impl RollingAverage {
    /// Fold in one sample.
    pub fn record(&mut self, sample: f64) {
        self.count += 1;
        #[allow(clippy::cast_precision_loss)]
        let n = self.count as f64;
        self.value += (sample - self.value) / n;
    }
}

/// One line in a recent-activity list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityLine {
    /// Short event label (`results`, `cache_hit`, `create`, ...).
    pub label: String,
    /// Human-readable detail.
    pub detail: String,
}

/// Search telemetry.
#[derive(Clone, Debug, Default)]
pub struct SearchStats {
    /// Queries issued.
    pub queries: u64,
    /// Queries answered from cache.
    pub cache_hits: u64,
    /// Failed searches.
    pub failures: u64,
    /// Mean search duration in milliseconds, over `results` events.
    pub avg_duration_ms: RollingAverage,
    /// Recent search activity, most recent first, capped.
    pub recent: Vec<ActivityLine>,
}

/// Intent-classification telemetry.
#[derive(Clone, Debug, Default)]
pub struct IntentStats {
    /// Classifications observed.
    pub classified: u64,
    /// Classifications served by the fast path.
    pub fast_path: u64,
    /// Mean classifier confidence.
    pub avg_confidence: RollingAverage,
    /// The most recent classification.
    pub last: Option<IntentClassified>,
}

/// Memory-operation telemetry.
#[derive(Clone, Debug, Default)]
pub struct MemoryStats {
    /// Memories stored.
    pub creates: u64,
    /// Memories retrieved.
    pub reads: u64,
    /// Memories modified.
    pub updates: u64,
    /// Memories removed.
    pub deletes: u64,
    /// Recent memory activity, most recent first, capped.
    pub recent: Vec<ActivityLine>,
}

/// Snapshot of all telemetry state.
#[derive(Clone, Debug, Default)]
pub struct TelemetrySnapshot {
    /// Search aggregates.
    pub search: SearchStats,
    /// Intent aggregates.
    pub intent: IntentStats,
    /// Memory aggregates.
    pub memory: MemoryStats,
    /// Latest `system.status` report.
    pub system: Option<SystemStatus>,
    /// Recent server log lines, most recent first, capped.
    pub log: Vec<LogRecord>,
}

/// Per-list caps for the bounded recent-activity logs.
#[derive(Clone, Copy, Debug)]
pub struct TelemetryLimits {
    /// Cap for [`SearchStats::recent`].
    pub search_log: usize,
    /// Cap for [`MemoryStats::recent`].
    pub memory_log: usize,
    /// Cap for [`TelemetrySnapshot::log`].
    pub system_log: usize,
}

impl Default for TelemetryLimits {
    fn default() -> Self {
        Self {
            search_log: 10,
            memory_log: 20,
            system_log: 100,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Telemetry store
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the telemetry aggregates.
pub struct Telemetry {
    tx: watch::Sender<TelemetrySnapshot>,
    limits: TelemetryLimits,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(TelemetryLimits::default())
    }
}

impl Telemetry {
    #[must_use]
    pub fn new(limits: TelemetryLimits) -> Self {
        let (tx, _) = watch::channel(TelemetrySnapshot::default());
        Self { tx, limits }
    }

    /// Subscribe to telemetry snapshots.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.tx.subscribe()
    }

    /// Fold in a `search.*` event.
    pub fn record_search(&self, event: SearchEvent) {
        let cap = self.limits.search_log;
        self.tx.send_modify(|snapshot| {
            let stats = &mut snapshot.search;
            let line = match &event {
                SearchEvent::Query { query } => {
                    stats.queries += 1;
                    ActivityLine {
                        label: "query".into(),
                        detail: query.clone(),
                    }
                }
                SearchEvent::Results {
                    query,
                    results_count,
                    duration_ms,
                } => {
                    #[allow(clippy::cast_precision_loss)]
                    stats.avg_duration_ms.record(*duration_ms as f64);
                    ActivityLine {
                        label: "results".into(),
                        detail: format!("{query}: {results_count} results in {duration_ms}ms"),
                    }
                }
                SearchEvent::CacheHit { query } => {
                    stats.cache_hits += 1;
                    ActivityLine {
                        label: "cache_hit".into(),
                        detail: query.clone(),
                    }
                }
                SearchEvent::Failed { query, error } => {
                    stats.failures += 1;
                    ActivityLine {
                        label: "failed".into(),
                        detail: format!("{query}: {error}"),
                    }
                }
            };
            stats.recent.insert(0, line);
            stats.recent.truncate(cap);
        });
    }

    /// Fold in an `intent.classified` event.
    pub fn record_intent(&self, event: IntentClassified) {
        self.tx.send_modify(|snapshot| {
            let stats = &mut snapshot.intent;
            stats.classified += 1;
            if event.fast_path_used {
                stats.fast_path += 1;
            }
            stats.avg_confidence.record(event.confidence);
            stats.last = Some(event);
        });
    }

    /// Fold in a `memory.<op>` event.
    pub fn record_memory(&self, op: MemoryOpKind, detail: String) {
        let cap = self.limits.memory_log;
        self.tx.send_modify(|snapshot| {
            let stats = &mut snapshot.memory;
            let label = match op {
                MemoryOpKind::Create => {
                    stats.creates += 1;
                    "create"
                }
                MemoryOpKind::Read => {
                    stats.reads += 1;
                    "read"
                }
                MemoryOpKind::Update => {
                    stats.updates += 1;
                    "update"
                }
                MemoryOpKind::Delete => {
                    stats.deletes += 1;
                    "delete"
                }
            };
            stats.recent.insert(
                0,
                ActivityLine {
                    label: label.into(),
                    detail,
                },
            );
            stats.recent.truncate(cap);
        });
    }

    /// Replace the system status with the latest report.
    pub fn record_system(&self, status: SystemStatus) {
        debug!(state = %status.state, queue = status.queue_size, "system status");
        self.tx.send_modify(|snapshot| snapshot.system = Some(status));
    }

    /// Append a server log line.
    pub fn record_log(&self, record: LogRecord) {
        let cap = self.limits.system_log;
        self.tx.send_modify(|snapshot| {
            snapshot.log.insert(0, record);
            snapshot.log.truncate(cap);
        });
    }

    /// Reset every aggregate. The only thing that zeroes the counters and
    /// running means.
    pub fn clear(&self) {
        self.tx.send_modify(|snapshot| *snapshot = TelemetrySnapshot::default());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rolling_average_matches_batch_mean() {
        let mut avg = RollingAverage::default();
        for duration_ms in [100.0, 200.0, 300.0] {
            avg.record(duration_ms);
        }
        assert_eq!(avg.count, 3);
        assert!((avg.value - 200.0).abs() < 1e-9);
    }

    #[test]
    fn search_counters_split_by_kind() {
        let telemetry = Telemetry::default();
        telemetry.record_search(SearchEvent::parse("query", &json!({"query":"rust"})).unwrap());
        telemetry.record_search(SearchEvent::parse("cache_hit", &json!({"query":"rust"})).unwrap());
        telemetry.record_search(
            SearchEvent::parse(
                "results",
                &json!({"query":"rust","results_count":5,"duration_ms":120}),
            )
            .unwrap(),
        );
        telemetry.record_search(
            SearchEvent::parse("failed", &json!({"query":"rust","error":"offline"})).unwrap(),
        );

        let snapshot = telemetry.watch().borrow().clone();
        assert_eq!(snapshot.search.queries, 1);
        assert_eq!(snapshot.search.cache_hits, 1);
        assert_eq!(snapshot.search.failures, 1);
        assert_eq!(snapshot.search.avg_duration_ms.count, 1);
        assert!((snapshot.search.avg_duration_ms.value - 120.0).abs() < 1e-9);
        assert_eq!(snapshot.search.recent.len(), 4);
        assert_eq!(snapshot.search.recent[0].label, "failed");
    }

    #[test]
    fn search_recent_list_is_capped() {
        let telemetry = Telemetry::new(TelemetryLimits {
            search_log: 2,
            ..TelemetryLimits::default()
        });
        for i in 0..5 {
            telemetry.record_search(
                SearchEvent::parse("query", &json!({"query": format!("q{i}")})).unwrap(),
            );
        }
        let snapshot = telemetry.watch().borrow().clone();
        assert_eq!(snapshot.search.recent.len(), 2);
        assert_eq!(snapshot.search.recent[0].detail, "q4");
    }

    #[test]
    fn intent_confidence_averages_incrementally() {
        let telemetry = Telemetry::default();
        for (confidence, fast) in [(0.9, true), (0.5, false)] {
            telemetry.record_intent(IntentClassified {
                input: "turn on the lights".into(),
                intent: "home_control".into(),
                confidence,
                fast_path_used: fast,
            });
        }
        let snapshot = telemetry.watch().borrow().clone();
        assert_eq!(snapshot.intent.classified, 2);
        assert_eq!(snapshot.intent.fast_path, 1);
        assert!((snapshot.intent.avg_confidence.value - 0.7).abs() < 1e-9);
        assert_eq!(snapshot.intent.last.as_ref().unwrap().confidence, 0.5);
    }

    #[test]
    fn memory_ops_count_per_kind() {
        let telemetry = Telemetry::default();
        telemetry.record_memory(MemoryOpKind::Create, "note".into());
        telemetry.record_memory(MemoryOpKind::Create, "note 2".into());
        telemetry.record_memory(MemoryOpKind::Delete, "note".into());
        let snapshot = telemetry.watch().borrow().clone();
        assert_eq!(snapshot.memory.creates, 2);
        assert_eq!(snapshot.memory.deletes, 1);
        assert_eq!(snapshot.memory.reads, 0);
        assert_eq!(snapshot.memory.recent[0].label, "delete");
    }

    #[test]
    fn system_status_is_latest_wins() {
        let telemetry = Telemetry::default();
        telemetry.record_system(SystemStatus {
            state: "idle".into(),
            queue_size: 0,
            active_plans: 0,
            terminal_count: 1,
        });
        telemetry.record_system(SystemStatus {
            state: "busy".into(),
            queue_size: 3,
            active_plans: 1,
            terminal_count: 1,
        });
        let snapshot = telemetry.watch().borrow().clone();
        assert_eq!(snapshot.system.unwrap().state, "busy");
    }

    #[test]
    fn clear_resets_all_aggregates() {
        let telemetry = Telemetry::default();
        telemetry.record_search(SearchEvent::parse("query", &json!({"query":"q"})).unwrap());
        telemetry.record_memory(MemoryOpKind::Create, "note".into());
        telemetry.clear();
        let snapshot = telemetry.watch().borrow().clone();
        assert_eq!(snapshot.search.queries, 0);
        assert_eq!(snapshot.memory.creates, 0);
        assert!(snapshot.search.recent.is_empty());
    }

    #[test]
    fn log_lines_are_capped() {
        let telemetry = Telemetry::new(TelemetryLimits {
            system_log: 3,
            ..TelemetryLimits::default()
        });
        for i in 0..5 {
            telemetry.record_log(LogRecord {
                level: "INFO".into(),
                category: "GENERAL".into(),
                message: format!("line {i}"),
                interaction_id: None,
            });
        }
        let snapshot = telemetry.watch().borrow().clone();
        assert_eq!(snapshot.log.len(), 3);
        assert_eq!(snapshot.log[0].message, "line 4");
    }
}
