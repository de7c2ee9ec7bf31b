//! A moving-window sum over a ring of time buckets.
//!
//! The ring is rotated lazily: every [`WindowedSum::add`] and
//! [`WindowedSum::total`] first checks whether one or more bucket periods have
//! passed and, if so, catches the ring up. There is no background timer, so a
//! window driven by a [`ManualClock`](crate::clock::ManualClock) behaves
//! deterministically.
//!
//! Each recorded amount is added to *every* bucket. A bucket is cleared when it
//! becomes the active one, so the active bucket always holds exactly what was
//! recorded since the last rotation boundary, and that is what `total` reports.
use crate::{
    clock::{duration_to_nanos, Clock, SystemClock},
    error::WindowError,
    sync::{Arc, AtomicU64, AtomicUsize, Mutex, Ordering},
};
use std::time::Duration;

#[derive(Debug)]
pub struct WindowedSum {
    clock: Arc<dyn Clock>,
    lookback: Duration,
    bucket_nanos: u64,
    buckets: Box<[AtomicU64]>,
    /// Index of the bucket receiving the authoritative total.
    current: AtomicUsize,
    /// Clock reading (ns) of the last rotation boundary crossed.
    last_rotation: AtomicU64,
    /// Held by the single thread performing a rotation.
    rotation_lock: Mutex<()>,
}

impl WindowedSum {
    /// Create a window covering `lookback`, rotated every `bucket_duration`,
    /// measured against the system clock.
    pub fn new(lookback: Duration, bucket_duration: Duration) -> Result<Self, WindowError> {
        Self::with_clock(lookback, bucket_duration, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(
        lookback: Duration,
        bucket_duration: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, WindowError> {
        let bucket_count = bucket_count(lookback, bucket_duration)?;
        let buckets = (0..bucket_count).map(|_| AtomicU64::new(0)).collect();
        let now = duration_to_nanos(clock.now());

        Ok(Self {
            clock,
            lookback,
            bucket_nanos: duration_to_nanos(bucket_duration),
            buckets,
            current: AtomicUsize::new(0),
            last_rotation: AtomicU64::new(now),
            rotation_lock: Mutex::new(()),
        })
    }

    /// Record `amount` (milliseconds, for pause sums).
    pub fn add(&self, amount: u64) {
        self.rotate();
        for bucket in self.buckets.iter() {
            bucket.fetch_add(amount, Ordering::AcqRel);
        }
    }

    /// Sum recorded within the current window.
    pub fn total(&self) -> u64 {
        self.rotate();
        let current = self.current.load(Ordering::Acquire);
        self.buckets[current].load(Ordering::Acquire)
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn bucket_duration(&self) -> Duration {
        Duration::from_nanos(self.bucket_nanos)
    }

    fn rotate(&self) {
        let now = duration_to_nanos(self.clock.now());
        if now.saturating_sub(self.last_rotation.load(Ordering::Acquire)) < self.bucket_nanos {
            return;
        }

        // Someone else is already rotating; their pass covers us.
        let Some(_guard) = self.rotation_lock.try_lock() else {
            return;
        };

        // Re-read under the lock, the previous holder may have just finished.
        let last = self.last_rotation.load(Ordering::Acquire);
        let periods = now.saturating_sub(last) / self.bucket_nanos;
        if periods == 0 {
            return;
        }

        // Past one full lap every bucket is stale, so one pass is enough.
        let len = self.buckets.len();
        let steps = periods.min(len as u64) as usize;
        let mut current = self.current.load(Ordering::Acquire);
        for _ in 0..steps {
            current = (current + 1) % len;
            self.buckets[current].store(0, Ordering::Release);
            self.current.store(current, Ordering::Release);
        }

        self.last_rotation.store(
            last.saturating_add(periods.saturating_mul(self.bucket_nanos)),
            Ordering::Release,
        );
        tracing::trace!(periods, current, "rotated pause window");
    }
}

/// Upper bound on the ring size, 8 MiB of buckets.
pub const MAX_BUCKETS: usize = 1 << 20;

/// `round(lookback / bucket_duration)`, at least one and at most [`MAX_BUCKETS`].
pub(crate) fn bucket_count(lookback: Duration, bucket_duration: Duration) -> Result<usize, WindowError> {
    if lookback.is_zero() {
        return Err(WindowError::ZeroLookback);
    }
    if bucket_duration.is_zero() {
        return Err(WindowError::ZeroBucket);
    }
    if bucket_duration > lookback {
        return Err(WindowError::BucketExceedsLookback {
            lookback,
            bucket: bucket_duration,
        });
    }

    let lookback = lookback.as_nanos();
    let bucket = bucket_duration.as_nanos();
    let rounded = (lookback + bucket / 2) / bucket;
    if rounded > MAX_BUCKETS as u128 {
        return Err(WindowError::TooManyBuckets {
            count: rounded,
            max: MAX_BUCKETS,
        });
    }
    Ok((rounded as usize).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn window(lookback_secs: u64, bucket_secs: u64) -> (WindowedSum, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let sum = WindowedSum::with_clock(
            Duration::from_secs(lookback_secs),
            Duration::from_secs(bucket_secs),
            clock.clone(),
        )
        .unwrap();
        (sum, clock)
    }

    #[test]
    fn test_bucket_count_rounds() {
        let (sum, _) = window(10, 2);
        assert_eq!(sum.bucket_count(), 5);
        assert_eq!(sum.bucket_duration(), Duration::from_secs(2));
        assert_eq!(sum.lookback(), Duration::from_secs(10));

        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
        let sum = WindowedSum::with_clock(
            Duration::from_millis(1100),
            Duration::from_millis(400),
            clock.clone(),
        )
        .unwrap();
        assert_eq!(sum.bucket_count(), 3);

        let sum =
            WindowedSum::with_clock(Duration::from_secs(1), Duration::from_secs(1), clock).unwrap();
        assert_eq!(sum.bucket_count(), 1);
    }

    #[test]
    fn test_invalid_durations_are_rejected() {
        assert_eq!(
            WindowedSum::new(Duration::ZERO, Duration::from_secs(1)).unwrap_err(),
            WindowError::ZeroLookback
        );
        assert_eq!(
            WindowedSum::new(Duration::from_secs(1), Duration::ZERO).unwrap_err(),
            WindowError::ZeroBucket
        );
        assert!(matches!(
            WindowedSum::new(Duration::from_secs(1), Duration::from_secs(2)),
            Err(WindowError::BucketExceedsLookback { .. })
        ));
        assert_eq!(
            WindowedSum::new(Duration::from_millis(u64::MAX), Duration::from_millis(1))
                .unwrap_err(),
            WindowError::TooManyBuckets {
                count: u64::MAX as u128,
                max: MAX_BUCKETS,
            }
        );
    }

    #[test]
    fn test_total_within_bucket_then_rolls_over() {
        let (sum, clock) = window(10, 2);
        sum.add(100);

        clock.advance(Duration::from_secs(1));
        assert_eq!(sum.total(), 100);

        clock.advance(Duration::from_secs(3));
        assert_eq!(sum.total(), 0);
    }

    #[test]
    fn test_accumulates_linearly_within_bucket() {
        let (sum, clock) = window(10, 2);
        for _ in 0..7 {
            sum.add(10);
            clock.advance(Duration::from_millis(100));
        }
        assert_eq!(sum.total(), 70);
    }

    #[test]
    fn test_idle_window_is_cleared_in_one_pass() {
        let (sum, clock) = window(10, 2);
        sum.add(250);
        clock.advance(Duration::from_secs(60 * 60));
        assert_eq!(sum.total(), 0);
        assert!(sum.buckets.iter().all(|b| b.load(Ordering::Acquire) == 0));
    }

    #[test]
    fn test_phase_is_kept_after_long_idle() {
        let (sum, clock) = window(10, 2);
        // 25s idle: twelve whole periods, 1s into the next one.
        clock.advance(Duration::from_secs(25));
        sum.add(40);

        // Still inside the same bucket period.
        clock.advance(Duration::from_millis(900));
        assert_eq!(sum.total(), 40);

        // Crossing the boundary at 26s clears it.
        clock.advance(Duration::from_millis(200));
        assert_eq!(sum.total(), 0);
    }

    #[test]
    fn test_additions_after_rotation_are_counted() {
        let (sum, clock) = window(10, 2);
        sum.add(5);
        clock.advance(Duration::from_secs(2));
        sum.add(7);
        assert_eq!(sum.total(), 7);
        sum.add(3);
        assert_eq!(sum.total(), 10);
    }

    #[test]
    fn test_concurrent_adds_sum_exactly() {
        use std::thread;

        let (sum, _clock) = window(10, 2);
        let sum = Arc::new(sum);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sum = sum.clone();
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        sum.add(3);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(sum.total(), 8 * 1_000 * 3);
    }

    #[test]
    fn test_concurrent_rotation_and_reads_stay_bounded() {
        use std::thread;

        let (sum, clock) = window(10, 2);
        let sum = Arc::new(sum);

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let sum = sum.clone();
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        assert!(sum.total() <= 1_000 * 2);
                    }
                })
            })
            .collect();

        for _ in 0..1_000 {
            sum.add(2);
            clock.advance(Duration::from_millis(700));
        }

        for reader in readers {
            reader.join().unwrap();
        }

        clock.advance(Duration::from_secs(30));
        assert_eq!(sum.total(), 0);
    }

    #[test]
    fn test_contended_rotation_steps_exactly_once() {
        use std::sync::Barrier;
        use std::thread;

        const THREADS: usize = 8;

        let (sum, clock) = window(10, 2);
        let sum = Arc::new(sum);
        sum.add(5);
        clock.advance(Duration::from_millis(2500));

        // Every thread crosses the same boundary at once, so only one of them
        // may rotate.
        let barrier = Arc::new(Barrier::new(THREADS));
        let readers: Vec<_> = (0..THREADS)
            .map(|_| {
                let sum = sum.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    (0..100).map(|_| sum.total()).collect::<Vec<_>>()
                })
            })
            .collect();

        for reader in readers {
            let seen = reader.join().unwrap();
            assert!(seen.iter().all(|&total| total == 0 || total == 5), "{:?}", seen);
        }

        assert_eq!(sum.current.load(Ordering::Acquire), 1);
        assert_eq!(
            sum.last_rotation.load(Ordering::Acquire),
            duration_to_nanos(Duration::from_secs(2))
        );
        assert_eq!(sum.total(), 0);

        sum.add(3);
        assert_eq!(sum.total(), 3);
        clock.advance(Duration::from_millis(1500));
        assert_eq!(sum.current.load(Ordering::Acquire), 2);
        assert_eq!(sum.total(), 0);
    }
}
