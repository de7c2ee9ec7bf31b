//! Interfaces to the managed runtime's collection subsystem.
//!
//! The monitor never talks to a concrete garbage collector. It sees a
//! [`ManagedRuntime`] that can enumerate its memory pools and its collectors,
//! and collectors that may expose a [`NotificationEmitter`] delivering one
//! [`GcNotification`] per completed cycle.
//!
//! Two implementations live in this crate:
//! - [`synthetic`]: an in-process source driven directly by test code
//! - [`arena`]: a real collected heap built on `gc-arena`
use crate::error::{PoolQueryError, SubscriptionError};
use crate::sync::Arc;
use serde::Serialize;
use std::collections::HashMap;

pub mod arena;
pub mod classifier;
mod listeners;
pub mod synthetic;

pub use classifier::{PoolClassifier, SuffixClassifier};
pub use listeners::ListenerRegistry;

/// Cause reported for bookkeeping notifications of concurrent phases, which
/// did not stop the application.
pub const CONCURRENT_PHASE_CAUSE: &str = "No GC";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Heap,
    NonHeap,
}

/// Usage of one memory pool at a point in time, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MemoryUsage {
    pub used: u64,
    pub committed: u64,
    /// `None` when the pool has no defined upper bound.
    pub max: Option<u64>,
}

impl MemoryUsage {
    pub fn new(used: u64, committed: u64, max: Option<u64>) -> Self {
        Self {
            used,
            committed,
            max,
        }
    }
}

pub trait MemoryPool: Send + Sync {
    fn name(&self) -> &str;

    fn memory_type(&self) -> MemoryType;

    /// Current usage. May fail transiently; callers treat that as "no data".
    fn usage(&self) -> Result<MemoryUsage, PoolQueryError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    GarbageCollection,
    Other(String),
}

/// One completed collection cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct GcNotification {
    pub kind: NotificationKind,
    /// Sequence number of the cycle within its collector.
    pub id: u64,
    pub collector: String,
    /// Free-form description such as "end of minor GC".
    pub action: String,
    pub cause: String,
    pub duration_ms: u64,
    pub usage_before: HashMap<String, MemoryUsage>,
    pub usage_after: HashMap<String, MemoryUsage>,
}

impl GcNotification {
    /// A garbage-collection notification with no pool usage attached.
    pub fn new(collector: impl Into<String>, cause: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            kind: NotificationKind::GarbageCollection,
            id: 0,
            collector: collector.into(),
            action: String::new(),
            cause: cause.into(),
            duration_ms,
            usage_before: HashMap::new(),
            usage_after: HashMap::new(),
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn with_usage_before(mut self, pool: impl Into<String>, usage: MemoryUsage) -> Self {
        self.usage_before.insert(pool.into(), usage);
        self
    }

    pub fn with_usage_after(mut self, pool: impl Into<String>, usage: MemoryUsage) -> Self {
        self.usage_after.insert(pool.into(), usage);
        self
    }

    /// Whether this cycle stopped the application.
    pub fn is_pause(&self) -> bool {
        self.cause != CONCURRENT_PHASE_CAUSE
    }
}

pub type NotificationHandler = Arc<dyn Fn(&GcNotification) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(pub u64);

pub trait NotificationEmitter: Send + Sync {
    fn subscribe(&self, handler: NotificationHandler) -> SubscriptionHandle;

    /// Fails with [`SubscriptionError::ListenerNotFound`] if `handle` was
    /// never registered or has already been removed.
    fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), SubscriptionError>;
}

#[derive(Clone)]
pub struct Collector {
    pub name: String,
    /// `None` for collectors that cannot deliver notifications.
    pub emitter: Option<Arc<dyn NotificationEmitter>>,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("name", &self.name)
            .field("emits", &self.emitter.is_some())
            .finish()
    }
}

pub trait ManagedRuntime {
    fn memory_pools(&self) -> Vec<Arc<dyn MemoryPool>>;

    fn collectors(&self) -> Vec<Collector>;
}
