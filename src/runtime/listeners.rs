//! A set of notification listeners that delivers on the emitting thread.
use super::{GcNotification, NotificationEmitter, NotificationHandler, SubscriptionHandle};
use crate::error::SubscriptionError;
use crate::sync::{Arc, AtomicU64, Mutex, Ordering};

#[derive(Default)]
pub struct ListenerRegistry {
    next_handle: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionHandle, NotificationHandler)>>,
}

impl ListenerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver `notification` to every current listener, on this thread.
    pub fn emit(&self, notification: &GcNotification) {
        // Handlers run outside the lock so they may race with unsubscribe.
        let handlers: Vec<NotificationHandler> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(notification);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Drop every listener behind the subscribers' backs.
    pub fn clear_listeners(&self) {
        self.listeners.lock().clear();
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl NotificationEmitter for ListenerRegistry {
    fn subscribe(&self, handler: NotificationHandler) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((handle, handler));
        handle
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), SubscriptionError> {
        let mut listeners = self.listeners.lock();
        let index = listeners
            .iter()
            .position(|(h, _)| *h == handle)
            .ok_or(SubscriptionError::ListenerNotFound(handle.0))?;
        listeners.remove(index);
        Ok(())
    }
}
