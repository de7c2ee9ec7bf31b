//! An in-process [`ManagedRuntime`] whose notifications are raised by hand.
//!
//! Nothing here runs on its own: pools report whatever usage they were last
//! given, and [`ListenerRegistry::emit`] calls every registered handler on the
//! calling thread. Tests use it to drive a monitor without a real collector.
use super::{
    Collector, ListenerRegistry, ManagedRuntime, MemoryPool, MemoryType, MemoryUsage,
    NotificationEmitter,
};
use crate::error::PoolQueryError;
use crate::sync::{Arc, Mutex};

#[derive(Debug)]
pub struct SyntheticPool {
    name: String,
    memory_type: MemoryType,
    /// `None` makes `usage` fail as if the query faulted.
    usage: Mutex<Option<MemoryUsage>>,
}

impl SyntheticPool {
    pub fn new(name: impl Into<String>, memory_type: MemoryType, usage: MemoryUsage) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            memory_type,
            usage: Mutex::new(Some(usage)),
        })
    }

    /// A heap pool with the given maximum and nothing used yet.
    pub fn heap(name: impl Into<String>, max: Option<u64>) -> Arc<Self> {
        Self::new(name, MemoryType::Heap, MemoryUsage::new(0, 0, max))
    }

    pub fn set_usage(&self, usage: MemoryUsage) {
        *self.usage.lock() = Some(usage);
    }

    pub fn set_unavailable(&self) {
        *self.usage.lock() = None;
    }
}

impl MemoryPool for SyntheticPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn memory_type(&self) -> MemoryType {
        self.memory_type
    }

    fn usage(&self) -> Result<MemoryUsage, PoolQueryError> {
        let usage = *self.usage.lock();
        usage.ok_or_else(|| PoolQueryError::Unavailable {
            pool: self.name.clone(),
            reason: "internal error while querying usage".into(),
        })
    }
}

#[derive(Debug, Default)]
pub struct SyntheticRuntime {
    pools: Vec<Arc<SyntheticPool>>,
    collectors: Vec<(String, Option<Arc<ListenerRegistry>>)>,
}

impl SyntheticRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(mut self, pool: Arc<SyntheticPool>) -> Self {
        self.pools.push(pool);
        self
    }

    /// Add a collector; `None` models one that cannot deliver notifications.
    pub fn with_collector(
        mut self,
        name: impl Into<String>,
        emitter: Option<Arc<ListenerRegistry>>,
    ) -> Self {
        self.collectors.push((name.into(), emitter));
        self
    }
}

impl ManagedRuntime for SyntheticRuntime {
    fn memory_pools(&self) -> Vec<Arc<dyn MemoryPool>> {
        self.pools
            .iter()
            .map(|pool| pool.clone() as Arc<dyn MemoryPool>)
            .collect()
    }

    fn collectors(&self) -> Vec<Collector> {
        self.collectors
            .iter()
            .map(|(name, emitter)| Collector {
                name: name.clone(),
                emitter: emitter
                    .as_ref()
                    .map(|e| e.clone() as Arc<dyn NotificationEmitter>),
            })
            .collect()
    }
}
