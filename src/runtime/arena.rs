//! A collected heap backed by `gc-arena`, exposed as a [`ManagedRuntime`].
//!
//! The heap has a single old-generation pool with a fixed capacity. Objects are
//! fixed-size chunks kept alive by the arena root; releasing a chunk drops it
//! from the root so the next collection reclaims it. Every [`ArenaRuntime::collect`]
//! is a full stop-the-world cycle, timed and reported to subscribers with the
//! pool usage before and after.
use super::{
    Collector, GcNotification, ListenerRegistry, ManagedRuntime, MemoryPool, MemoryType,
    MemoryUsage, NotificationEmitter,
};
use crate::error::{ArenaError, PoolQueryError};
use crate::sync::{Arc, AtomicU64, Ordering};
use gc_arena::{Arena, Gc, Rootable};
use std::time::{Duration, Instant};
use tracing::debug;

pub const OLD_GEN_POOL: &str = "Arena Old Gen";
pub const COLLECTOR: &str = "Arena MarkSweep";

pub const CHUNK_SIZE: usize = 4096;

type Chunk = [u8; CHUNK_SIZE];
type Heap = Arena<Rootable![Vec<Gc<'_, Chunk>>]>;

#[derive(Debug)]
struct ArenaPool {
    capacity: u64,
    /// Live bytes as of the last collection or allocation.
    used: AtomicU64,
}

impl MemoryPool for ArenaPool {
    fn name(&self) -> &str {
        OLD_GEN_POOL
    }

    fn memory_type(&self) -> MemoryType {
        MemoryType::Heap
    }

    fn usage(&self) -> Result<MemoryUsage, PoolQueryError> {
        let used = self.used.load(Ordering::Acquire);
        Ok(MemoryUsage::new(used, used, Some(self.capacity)))
    }
}

pub struct ArenaRuntime {
    heap: Heap,
    pool: Arc<ArenaPool>,
    emitter: Arc<ListenerRegistry>,
    cycles: u64,
}

impl ArenaRuntime {
    pub fn new(capacity: u64) -> Self {
        Self {
            heap: Heap::new(|_| Vec::new()),
            pool: Arc::new(ArenaPool {
                capacity,
                used: AtomicU64::new(0),
            }),
            emitter: ListenerRegistry::new(),
            cycles: 0,
        }
    }

    pub fn capacity(&self) -> u64 {
        self.pool.capacity
    }

    /// Bytes currently held by the arena, reachable or not.
    pub fn used(&self) -> u64 {
        self.heap.metrics().total_gc_allocation() as u64
    }

    pub fn free(&self) -> u64 {
        self.capacity().saturating_sub(self.used())
    }

    pub fn live_chunks(&self) -> usize {
        self.heap.mutate(|_, root| root.len())
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Allocate and retain at least `bytes`, rounded up to whole chunks.
    ///
    /// Collects first when the allocation would not fit, and fails if it still
    /// does not fit afterwards.
    pub fn allocate(&mut self, bytes: u64) -> Result<(), ArenaError> {
        let chunks = bytes.div_ceil(CHUNK_SIZE as u64);
        let requested = chunks.saturating_mul(CHUNK_SIZE as u64);

        if !self.fits(requested) {
            self.collect("Allocation Failure");
            if !self.fits(requested) {
                return Err(ArenaError::OutOfMemory {
                    requested,
                    used: self.used(),
                    capacity: self.capacity(),
                });
            }
        }

        self.heap.mutate_root(|mc, root| {
            for _ in 0..chunks {
                root.push(Gc::new(mc, [0u8; CHUNK_SIZE]));
            }
        });
        self.pool.used.store(self.used(), Ordering::Release);
        Ok(())
    }

    fn fits(&self, requested: u64) -> bool {
        self.used()
            .checked_add(requested)
            .is_some_and(|total| total <= self.capacity())
    }

    /// Stop retaining the `chunks` oldest chunks.
    pub fn release_oldest(&mut self, chunks: usize) {
        self.heap.mutate_root(|_, root| {
            let n = chunks.min(root.len());
            *root = root.split_off(n);
        });
    }

    pub fn release_all(&mut self) {
        self.heap.mutate_root(|_, root| root.clear());
    }

    /// Run a full collection and notify subscribers. Returns the pause length.
    pub fn collect(&mut self, cause: &str) -> Duration {
        let before = self.used();
        let start = Instant::now();
        self.heap.collect_all();
        let pause = start.elapsed();
        let after = self.used();

        self.pool.used.store(after, Ordering::Release);
        self.cycles += 1;

        let capacity = Some(self.capacity());
        let notification = GcNotification::new(COLLECTOR, cause, pause.as_millis() as u64)
            .with_id(self.cycles)
            .with_action("end of major GC")
            .with_usage_before(OLD_GEN_POOL, MemoryUsage::new(before, before, capacity))
            .with_usage_after(OLD_GEN_POOL, MemoryUsage::new(after, after, capacity));
        debug!(
            id = self.cycles,
            cause,
            before,
            after,
            pause_us = pause.as_micros() as u64,
            "arena collection finished"
        );
        self.emitter.emit(&notification);
        pause
    }
}

impl ManagedRuntime for ArenaRuntime {
    fn memory_pools(&self) -> Vec<Arc<dyn MemoryPool>> {
        vec![self.pool.clone() as Arc<dyn MemoryPool>]
    }

    fn collectors(&self) -> Vec<Collector> {
        vec![Collector {
            name: COLLECTOR.to_owned(),
            emitter: Some(self.emitter.clone() as Arc<dyn NotificationEmitter>),
        }]
    }
}

impl std::fmt::Debug for ArenaRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaRuntime")
            .field("capacity", &self.capacity())
            .field("used", &self.used())
            .field("cycles", &self.cycles)
            .finish()
    }
}
