use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Counters describing what the engine has done since start-up
#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub work_orders_created: AtomicU64,
    pub transitions_committed: AtomicU64,
    pub transitions_rejected: AtomicU64,
    pub write_conflicts: AtomicU64,
    pub side_effect_failures: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_work_order_created(&self) {
        self.work_orders_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit(&self) {
        self.transitions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.transitions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_conflict(&self) {
        self.write_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_side_effect_failure(&self) {
        self.side_effect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> EngineStats {
        EngineStats {
            work_orders_created: self.work_orders_created.load(Ordering::Relaxed),
            transitions_committed: self.transitions_committed.load(Ordering::Relaxed),
            transitions_rejected: self.transitions_rejected.load(Ordering::Relaxed),
            write_conflicts: self.write_conflicts.load(Ordering::Relaxed),
            side_effect_failures: self.side_effect_failures.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Engine metrics: work_orders={}, committed={}, rejected={}, conflicts={}, side_effect_failures={}",
            stats.work_orders_created,
            stats.transitions_committed,
            stats.transitions_rejected,
            stats.write_conflicts,
            stats.side_effect_failures
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    pub work_orders_created: u64,
    pub transitions_committed: u64,
    pub transitions_rejected: u64,
    pub write_conflicts: u64,
    pub side_effect_failures: u64,
}

/// Time an operation and log how long it took
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish(self) -> Duration {
        let elapsed = self.elapsed();
        debug!(
            operation = %self.operation,
            duration_ms = elapsed.as_millis() as u64,
            "Operation finished"
        );
        elapsed
    }
}
