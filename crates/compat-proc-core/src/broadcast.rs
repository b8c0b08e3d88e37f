use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Receives captured output lines from launched processes.
///
/// Called while the broadcaster's lock is held: implementations must return
/// promptly and must not register or remove listeners from inside `on_line`.
pub trait LineListener: Send + Sync {
    fn on_line(&self, line: &str);
}

impl<F> LineListener for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_line(&self, line: &str) {
        self(line)
    }
}

/// Shared handle to a registered listener.
///
/// Identity is the underlying allocation: clones of one handle are the same
/// listener, two handles built from equal closures are not.
#[derive(Clone)]
pub struct ListenerHandle(Arc<dyn LineListener>);

impl ListenerHandle {
    pub fn new(listener: impl LineListener + 'static) -> Self {
        Self(Arc::new(listener))
    }
}

impl PartialEq for ListenerHandle {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl Eq for ListenerHandle {}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ListenerHandle")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Fans captured process output out to registered listeners.
///
/// One instance is shared (through `Arc`) by every launcher that should feed
/// it. Launches only capture output when at least one listener is registered
/// at launch time.
#[derive(Default)]
pub struct DebugStreamBroadcaster {
    listeners: Mutex<Vec<ListenerHandle>>,
}

impl DebugStreamBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<ListenerHandle>> {
        // A panicking listener must not disable broadcasting for everyone else
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener. Returns `false` if it was already registered.
    pub fn add_listener(&self, listener: ListenerHandle) -> bool {
        let mut listeners = self.listeners();
        if listeners.contains(&listener) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Unregister a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, listener: &ListenerHandle) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.len();
        listeners.retain(|registered| registered != listener);
        listeners.len() != before
    }

    pub fn clear_listeners(&self) {
        self.listeners().clear();
    }

    pub fn has_listeners(&self) -> bool {
        !self.listeners().is_empty()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }

    /// Deliver `line` to every listener in registration order.
    pub fn broadcast_line(&self, line: &str) {
        let listeners = self.listeners();
        for listener in listeners.iter() {
            listener.0.on_line(line);
        }
    }
}

impl fmt::Debug for DebugStreamBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugStreamBroadcaster")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
