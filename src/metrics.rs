use crate::sync::{AtomicU64, Ordering};
use serde::Serialize;

/// Point-in-time view of a monitor.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct HeapPressureSnapshot {
    /// Old-gen occupancy after the most recent cycle, in `[0, 1]`.
    pub old_gen_usage_ratio: f64,
    /// Fraction of the trailing window spent in pauses.
    pub gc_overhead_ratio: f64,
    /// Pause milliseconds currently inside the window.
    pub window_pause_ms: u64,
    pub counters: CounterSnapshot,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSnapshot {
    pub notifications: u64,
    pub pause_cycles: u64,
    pub concurrent_cycles: u64,
    pub ignored_notifications: u64,
    pub ratio_updates: u64,
    pub ratio_updates_skipped: u64,
}

impl std::fmt::Display for HeapPressureSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Heap Pressure:")?;
        writeln!(
            f,
            "  Old Gen After GC:       {:>6.2}%",
            self.old_gen_usage_ratio * 100.0
        )?;
        writeln!(
            f,
            "  GC Overhead:            {:>6.2}% ({} ms paused)",
            self.gc_overhead_ratio * 100.0,
            self.window_pause_ms
        )?;
        write!(f, "{}", self.counters)
    }
}

impl std::fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "  Notifications:          {:>8}", self.notifications)?;
        writeln!(
            f,
            "    pauses: {:>8}, concurrent: {:>8}, ignored: {:>8}",
            self.pause_cycles, self.concurrent_cycles, self.ignored_notifications
        )?;
        writeln!(
            f,
            "  Ratio Updates:          {:>8} (skipped: {})",
            self.ratio_updates, self.ratio_updates_skipped
        )
    }
}

/// Counters maintained by a monitor's notification listener.
///
/// All counters use `Ordering::Relaxed`: they are independent tallies and do
/// not publish any other memory.
#[derive(Debug, Default)]
pub struct MonitorMetrics {
    /// Every notification delivered to the listener
    pub notifications: AtomicU64,
    /// Cycles that stopped the application
    pub pause_cycles: AtomicU64,
    /// Concurrent-phase bookkeeping cycles
    pub concurrent_cycles: AtomicU64,
    /// Notifications of a kind other than garbage collection
    pub ignored_notifications: AtomicU64,
    /// Times the old-gen ratio was replaced
    pub ratio_updates: AtomicU64,
    /// Cycles that carried no usage for the old-gen pool
    pub ratio_updates_skipped: AtomicU64,
}

impl MonitorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_notification(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_pause(&self) {
        self.pause_cycles.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_concurrent_phase(&self) {
        self.concurrent_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored(&self) {
        self.ignored_notifications.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ratio_update(&self) {
        self.ratio_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ratio_skipped(&self) {
        self.ratio_updates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            notifications: self.notifications.load(Ordering::Relaxed),
            pause_cycles: self.pause_cycles.load(Ordering::Relaxed),
            concurrent_cycles: self.concurrent_cycles.load(Ordering::Relaxed),
            ignored_notifications: self.ignored_notifications.load(Ordering::Relaxed),
            ratio_updates: self.ratio_updates.load(Ordering::Relaxed),
            ratio_updates_skipped: self.ratio_updates_skipped.load(Ordering::Relaxed),
        }
    }
}
