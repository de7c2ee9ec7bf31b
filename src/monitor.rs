//! Heap pressure derived from collection notifications.
//!
//! A [`HeapPressureMonitor`] subscribes to every collector of a
//! [`ManagedRuntime`] that can deliver notifications and maintains two
//! signals:
//!
//! - the old-generation occupancy right after the latest cycle, and
//! - the share of the trailing `lookback` window spent in stop-the-world pauses.
//!
//! Both are read lock-free from any thread. The notification listener runs on
//! the collector's own thread, so it does a bounded amount of work and never
//! fails: a cycle without usage data for the old-gen pool simply leaves the
//! last ratio in place.
use crate::{
    clock::{Clock, SystemClock},
    config::MonitorConfig,
    error::{ConfigError, MonitorError},
    metrics::{HeapPressureSnapshot, MonitorMetrics},
    runtime::{
        GcNotification, ManagedRuntime, NotificationEmitter, NotificationKind, PoolClassifier,
        SubscriptionHandle, SuffixClassifier,
    },
    sync::{Arc, AtomicF64, Mutex, Ordering},
    window::WindowedSum,
};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

#[derive(Debug)]
struct OldGenPool {
    name: String,
    /// Bytes; 0 when the pool reports no maximum.
    max: u64,
}

/// State reachable from the listeners. Owned jointly by the monitor and every
/// live subscription, so a callback racing with `close` still sees valid data.
#[derive(Debug)]
struct MonitorState {
    clock: Arc<dyn Clock>,
    lookback: Duration,
    started: Duration,
    pause_sum: WindowedSum,
    old_gen: Option<OldGenPool>,
    last_old_gen_ratio: AtomicF64,
    metrics: MonitorMetrics,
}

impl MonitorState {
    fn on_notification(&self, notification: &GcNotification) {
        self.metrics.record_notification();
        if notification.kind != NotificationKind::GarbageCollection {
            self.metrics.record_ignored();
            return;
        }

        if notification.is_pause() {
            self.pause_sum.add(notification.duration_ms);
            self.metrics.record_pause();
        } else {
            self.metrics.record_concurrent_phase();
        }

        let Some(pool) = &self.old_gen else {
            return;
        };
        let Some(usage) = notification.usage_after.get(&pool.name) else {
            self.metrics.record_ratio_skipped();
            trace!(
                collector = %notification.collector,
                id = notification.id,
                "no old gen usage in notification"
            );
            return;
        };

        let ratio = if pool.max == 0 {
            0.0
        } else {
            usage.used as f64 / pool.max as f64
        };
        self.last_old_gen_ratio.store(ratio, Ordering::Release);
        self.metrics.record_ratio_update();
        trace!(
            collector = %notification.collector,
            id = notification.id,
            cause = %notification.cause,
            duration_ms = notification.duration_ms,
            ratio,
            "gc cycle observed"
        );
    }

    fn overhead(&self, pause_ms: u64) -> f64 {
        let elapsed = self
            .clock
            .now()
            .saturating_sub(self.started)
            .min(self.lookback);
        let window_ms = elapsed.as_secs_f64() * 1e3;
        if window_ms <= 0.0 {
            return 0.0;
        }
        pause_ms as f64 / window_ms
    }
}

struct Subscription {
    collector: String,
    emitter: Arc<dyn NotificationEmitter>,
    handle: SubscriptionHandle,
}

pub struct MonitorBuilder {
    lookback: Duration,
    sample_interval: Duration,
    classifier: Box<dyn PoolClassifier>,
    clock: Arc<dyn Clock>,
}

impl MonitorBuilder {
    /// Use `classifier` instead of the default old-gen name suffixes.
    pub fn classifier(mut self, classifier: impl PoolClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Resolve the old-gen pool and subscribe to `runtime`'s collectors.
    pub fn build(self, runtime: &dyn ManagedRuntime) -> Result<HeapPressureMonitor, MonitorError> {
        let pause_sum =
            WindowedSum::with_clock(self.lookback, self.sample_interval, self.clock.clone())?;

        let old_gen = runtime
            .memory_pools()
            .into_iter()
            .find(|pool| self.classifier.is_old_gen(pool.name(), pool.memory_type()))
            .map(|pool| {
                let max = match pool.usage() {
                    Ok(usage) => usage.max.unwrap_or(0),
                    Err(e) => {
                        warn!(pool = pool.name(), error = %e, "cannot read old gen capacity");
                        0
                    }
                };
                OldGenPool {
                    name: pool.name().to_owned(),
                    max,
                }
            });

        match &old_gen {
            Some(pool) => debug!(pool = %pool.name, max = pool.max, "old gen pool resolved"),
            None => info!("no old gen pool found, old gen usage will read as 0"),
        }

        let state = Arc::new(MonitorState {
            started: self.clock.now(),
            clock: self.clock,
            lookback: self.lookback,
            pause_sum,
            old_gen,
            last_old_gen_ratio: AtomicF64::new(0.0),
            metrics: MonitorMetrics::new(),
        });

        let mut subscriptions = Vec::new();
        for collector in runtime.collectors() {
            let Some(emitter) = collector.emitter else {
                debug!(collector = %collector.name, "collector does not emit notifications");
                continue;
            };
            let listener = Arc::clone(&state);
            let handle = emitter.subscribe(Arc::new(move |n: &GcNotification| {
                listener.on_notification(n)
            }));
            subscriptions.push(Subscription {
                collector: collector.name,
                emitter,
                handle,
            });
        }
        debug!(collectors = subscriptions.len(), "heap pressure monitor subscribed");

        Ok(HeapPressureMonitor {
            state,
            subscriptions: Mutex::new(subscriptions),
        })
    }
}

/// Tracks old-gen occupancy and GC overhead for one runtime.
///
/// The monitor stays subscribed until [`close`](Self::close) is called or it is
/// dropped.
pub struct HeapPressureMonitor {
    state: Arc<MonitorState>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl HeapPressureMonitor {
    /// Monitor `runtime` with a GC overhead window of `lookback`, resolved in
    /// steps of `sample_interval`.
    pub fn new(
        runtime: &dyn ManagedRuntime,
        lookback: Duration,
        sample_interval: Duration,
    ) -> Result<Self, MonitorError> {
        Self::builder(lookback, sample_interval).build(runtime)
    }

    pub fn from_config(
        runtime: &dyn ManagedRuntime,
        config: &MonitorConfig,
    ) -> Result<Self, MonitorError> {
        config.validate().map_err(ConfigError::from)?;
        Self::new(runtime, config.lookback(), config.sample_interval())
    }

    pub fn builder(lookback: Duration, sample_interval: Duration) -> MonitorBuilder {
        MonitorBuilder {
            lookback,
            sample_interval,
            classifier: Box::new(SuffixClassifier::default()),
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Old-gen occupancy after the latest cycle, in `[0, 1]`.
    ///
    /// Reads 0 until a cycle reporting the old-gen pool has been seen, and
    /// always when no old-gen pool was found or its maximum is unknown.
    pub fn old_gen_usage_ratio(&self) -> f64 {
        self.state.last_old_gen_ratio.load(Ordering::Acquire)
    }

    /// Pause time recorded since the last bucket boundary, divided by the
    /// trailing window.
    ///
    /// The window is the shorter of `lookback` and the time since the monitor
    /// was created. The numerator covers at most one `sample_interval`, so once
    /// the monitor has run for a full `lookback` the value reads low by up to a
    /// factor of the bucket count. The result is not clamped: pauses straddling a bucket
    /// boundary can push it slightly above 1.0 under extreme GC load.
    pub fn gc_overhead_ratio(&self) -> f64 {
        self.state.overhead(self.state.pause_sum.total())
    }

    pub fn snapshot(&self) -> HeapPressureSnapshot {
        let window_pause_ms = self.state.pause_sum.total();
        HeapPressureSnapshot {
            old_gen_usage_ratio: self.old_gen_usage_ratio(),
            gc_overhead_ratio: self.state.overhead(window_pause_ms),
            window_pause_ms,
            counters: self.state.metrics.snapshot(),
        }
    }

    pub fn metrics(&self) -> &MonitorMetrics {
        &self.state.metrics
    }

    pub fn old_gen_pool(&self) -> Option<&str> {
        self.state.old_gen.as_ref().map(|pool| pool.name.as_str())
    }

    pub fn old_gen_max(&self) -> u64 {
        self.state.old_gen.as_ref().map_or(0, |pool| pool.max)
    }

    pub fn lookback(&self) -> Duration {
        self.state.lookback
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Remove every listener this monitor registered. Calling it again is a
    /// no-op; listeners already removed by the runtime are ignored.
    pub fn close(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        if subscriptions.is_empty() {
            return;
        }

        for subscription in &subscriptions {
            if let Err(e) = subscription.emitter.unsubscribe(subscription.handle) {
                debug!(collector = %subscription.collector, error = %e, "listener already removed");
            }
        }
        debug!(collectors = subscriptions.len(), "heap pressure monitor closed");
    }
}

impl Drop for HeapPressureMonitor {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for HeapPressureMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapPressureMonitor")
            .field("old_gen_pool", &self.old_gen_pool())
            .field("lookback", &self.state.lookback)
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::WindowError;
    use crate::runtime::synthetic::{SyntheticPool, SyntheticRuntime};
    use crate::runtime::ListenerRegistry;
    use crate::runtime::{MemoryType, MemoryUsage, CONCURRENT_PHASE_CAUSE};

    const MB: u64 = 1024 * 1024;

    struct Fixture {
        monitor: HeapPressureMonitor,
        emitter: Arc<ListenerRegistry>,
        clock: Arc<ManualClock>,
    }

    fn fixture(max: Option<u64>) -> Fixture {
        let emitter = ListenerRegistry::new();
        let clock = Arc::new(ManualClock::new());
        let runtime = SyntheticRuntime::new()
            .with_pool(SyntheticPool::heap("PS Eden Space", Some(64 * MB)))
            .with_pool(SyntheticPool::heap("PS Old Gen", max))
            .with_collector("PS MarkSweep", Some(emitter.clone()));
        let monitor = HeapPressureMonitor::builder(Duration::from_secs(10), Duration::from_secs(2))
            .clock(clock.clone())
            .build(&runtime)
            .unwrap();
        Fixture {
            monitor,
            emitter,
            clock,
        }
    }

    fn old_gen_cycle(cause: &str, duration_ms: u64, used: u64) -> GcNotification {
        GcNotification::new("PS MarkSweep", cause, duration_ms)
            .with_usage_after("PS Old Gen", MemoryUsage::new(used, used, Some(256 * MB)))
    }

    #[test]
    fn test_resolves_old_gen_pool() {
        let f = fixture(Some(256 * MB));
        assert_eq!(f.monitor.old_gen_pool(), Some("PS Old Gen"));
        assert_eq!(f.monitor.old_gen_max(), 256 * MB);
        assert_eq!(f.monitor.subscription_count(), 1);
    }

    #[test]
    fn test_overhead_is_zero_at_start() {
        let f = fixture(Some(256 * MB));
        assert_eq!(f.monitor.gc_overhead_ratio(), 0.0);

        // Even with pauses recorded, no elapsed time means no ratio.
        f.emitter.emit(&old_gen_cycle("Allocation Failure", 50, MB));
        assert_eq!(f.monitor.gc_overhead_ratio(), 0.0);
    }

    #[test]
    fn test_overhead_uses_elapsed_time_during_first_window() {
        let f = fixture(Some(256 * MB));
        f.clock.advance(Duration::from_millis(1000));
        f.emitter.emit(&old_gen_cycle("Allocation Failure", 100, MB));
        assert!((f.monitor.gc_overhead_ratio() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_overhead_uses_lookback_once_elapsed() {
        let f = fixture(Some(256 * MB));
        f.clock.advance(Duration::from_secs(61));
        f.emitter.emit(&old_gen_cycle("Allocation Failure", 500, MB));
        assert!((f.monitor.gc_overhead_ratio() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_concurrent_phase_is_not_counted() {
        let f = fixture(Some(256 * MB));
        f.clock.advance(Duration::from_secs(1));
        f.emitter
            .emit(&old_gen_cycle(CONCURRENT_PHASE_CAUSE, 400, 128 * MB));
        assert_eq!(f.monitor.snapshot().window_pause_ms, 0);
        // The usage is still taken from a concurrent cycle.
        assert_eq!(f.monitor.old_gen_usage_ratio(), 0.5);

        f.emitter.emit(&old_gen_cycle("G1 Evacuation Pause", 30, 128 * MB));
        assert_eq!(f.monitor.snapshot().window_pause_ms, 30);

        let counters = f.monitor.metrics().snapshot();
        assert_eq!(counters.pause_cycles, 1);
        assert_eq!(counters.concurrent_cycles, 1);
    }

    #[test]
    fn test_ratio_is_last_writer_wins() {
        let f = fixture(Some(256 * MB));
        assert_eq!(f.monitor.old_gen_usage_ratio(), 0.0);

        f.emitter.emit(&old_gen_cycle("Allocation Failure", 5, 128 * MB));
        assert_eq!(f.monitor.old_gen_usage_ratio(), 0.5);

        f.emitter.emit(&old_gen_cycle("Allocation Failure", 5, 64 * MB));
        assert_eq!(f.monitor.old_gen_usage_ratio(), 0.25);
    }

    #[test]
    fn test_unknown_max_reports_zero() {
        let f = fixture(None);
        assert_eq!(f.monitor.old_gen_max(), 0);
        f.emitter.emit(&old_gen_cycle("Allocation Failure", 5, 128 * MB));
        assert_eq!(f.monitor.old_gen_usage_ratio(), 0.0);
        assert!(!f.monitor.old_gen_usage_ratio().is_nan());
    }

    #[test]
    fn test_missing_pool_in_notification_keeps_ratio() {
        let f = fixture(Some(256 * MB));
        f.emitter.emit(&old_gen_cycle("Allocation Failure", 5, 128 * MB));

        let young_only = GcNotification::new("PS Scavenge", "Allocation Failure", 2)
            .with_usage_after("PS Eden Space", MemoryUsage::new(0, 0, Some(64 * MB)));
        f.emitter.emit(&young_only);

        assert_eq!(f.monitor.old_gen_usage_ratio(), 0.5);
        assert_eq!(f.monitor.metrics().snapshot().ratio_updates_skipped, 1);
    }

    #[test]
    fn test_non_gc_notifications_are_ignored() {
        let f = fixture(Some(256 * MB));
        f.clock.advance(Duration::from_secs(1));
        let mut other = old_gen_cycle("Allocation Failure", 300, 200 * MB);
        other.kind = NotificationKind::Other("jmx.attribute.change".into());
        f.emitter.emit(&other);

        assert_eq!(f.monitor.gc_overhead_ratio(), 0.0);
        assert_eq!(f.monitor.old_gen_usage_ratio(), 0.0);
        assert_eq!(f.monitor.metrics().snapshot().ignored_notifications, 1);
    }

    #[test]
    fn test_no_old_gen_pool() {
        let emitter = ListenerRegistry::new();
        let runtime = SyntheticRuntime::new()
            .with_pool(SyntheticPool::new(
                "Metaspace",
                MemoryType::NonHeap,
                MemoryUsage::default(),
            ))
            .with_collector("Epsilon", Some(emitter.clone()));
        let monitor =
            HeapPressureMonitor::new(&runtime, Duration::from_secs(10), Duration::from_secs(2))
                .unwrap();

        assert_eq!(monitor.old_gen_pool(), None);
        emitter.emit(
            &GcNotification::new("Epsilon", "Allocation Failure", 1)
                .with_usage_after("Metaspace", MemoryUsage::new(10, 10, None)),
        );
        assert_eq!(monitor.old_gen_usage_ratio(), 0.0);
        assert_eq!(monitor.metrics().snapshot().ratio_updates_skipped, 0);
    }

    #[test]
    fn test_unreadable_pool_capacity_is_zero() {
        let pool = SyntheticPool::heap("Tenured Gen", Some(100));
        pool.set_unavailable();
        let runtime = SyntheticRuntime::new().with_pool(pool);

        let monitor =
            HeapPressureMonitor::new(&runtime, Duration::from_secs(10), Duration::from_secs(2))
                .unwrap();
        assert_eq!(monitor.old_gen_pool(), Some("Tenured Gen"));
        assert_eq!(monitor.old_gen_max(), 0);
    }

    #[test]
    fn test_custom_classifier() {
        let runtime = SyntheticRuntime::new()
            .with_pool(SyntheticPool::heap("PS Old Gen", Some(100)))
            .with_pool(SyntheticPool::heap("Mature", Some(200)));
        let monitor = HeapPressureMonitor::builder(Duration::from_secs(10), Duration::from_secs(2))
            .classifier(|name: &str, _: MemoryType| name == "Mature")
            .build(&runtime)
            .unwrap();
        assert_eq!(monitor.old_gen_pool(), Some("Mature"));
        assert_eq!(monitor.old_gen_max(), 200);
    }

    #[test]
    fn test_invalid_window_is_an_error() {
        let runtime = SyntheticRuntime::new();
        let err = HeapPressureMonitor::new(&runtime, Duration::from_secs(1), Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, MonitorError::Window(_)));
    }

    #[test]
    fn test_oversized_config_is_an_error() {
        let runtime = SyntheticRuntime::new();
        let config = MonitorConfig {
            lookback_ms: u64::MAX,
            sample_interval_ms: 1,
        };
        let err = HeapPressureMonitor::from_config(&runtime, &config).unwrap_err();
        assert!(matches!(
            err,
            MonitorError::Config(ConfigError::Window(WindowError::TooManyBuckets { .. }))
        ));

        let err = HeapPressureMonitor::new(
            &runtime,
            Duration::from_millis(u64::MAX),
            Duration::from_millis(1),
        )
        .unwrap_err();
        assert!(matches!(err, MonitorError::Window(WindowError::TooManyBuckets { .. })));
    }

    #[test]
    fn test_close_is_idempotent() {
        let f = fixture(Some(256 * MB));
        assert_eq!(f.emitter.listener_count(), 1);

        f.monitor.close();
        f.monitor.close();

        assert_eq!(f.emitter.listener_count(), 0);
        assert_eq!(f.monitor.subscription_count(), 0);
    }

    #[test]
    fn test_close_after_external_removal() {
        let f = fixture(Some(256 * MB));
        f.emitter.clear_listeners();
        f.monitor.close();
        assert_eq!(f.monitor.subscription_count(), 0);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let f = fixture(Some(256 * MB));
        let emitter = f.emitter.clone();
        drop(f);
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn test_collectors_without_emitter_are_skipped() {
        let emitter = ListenerRegistry::new();
        let runtime = SyntheticRuntime::new()
            .with_collector("Legacy", None)
            .with_collector("G1 Young Generation", Some(emitter.clone()))
            .with_collector("G1 Old Generation", Some(emitter.clone()));
        let monitor =
            HeapPressureMonitor::new(&runtime, Duration::from_secs(10), Duration::from_secs(2))
                .unwrap();
        assert_eq!(monitor.subscription_count(), 2);
        assert_eq!(emitter.listener_count(), 2);
    }
}
