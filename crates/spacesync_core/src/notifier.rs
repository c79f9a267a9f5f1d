//! Per-space change notification.
//!
//! The notifier is an explicitly constructed service shared behind an
//! `Arc`; there is no process-wide instance. Transports register a listener
//! per connected client and forward each poke so the client pulls again.

use parking_lot::RwLock;
use spacesync_protocol::SpaceId;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error};

type Listener = Arc<dyn Fn() + Send + Sync>;

/// Multicasts zero-payload "re-pull" signals per space.
///
/// Delivery is fire-and-forget and at-most-once per [`poke`](Self::poke);
/// listeners registered after a poke never see it.
#[derive(Default)]
pub struct ChangeNotifier {
    listeners: RwLock<HashMap<SpaceId, Vec<(u64, Listener)>>>,
    next_id: AtomicU64,
}

impl ChangeNotifier {
    /// Creates a notifier with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `space_id`.
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// unsubscribed or dropped.
    pub fn add_listener<F>(self: &Arc<Self>, space_id: &SpaceId, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .entry(space_id.clone())
            .or_default()
            .push((id, Arc::new(listener)));

        Subscription {
            notifier: Arc::downgrade(self),
            space_id: space_id.clone(),
            id,
            active: true,
        }
    }

    /// Invokes every listener currently registered for `space_id` and
    /// returns how many ran without panicking.
    ///
    /// The listener set is snapshotted first, so listeners may subscribe or
    /// unsubscribe (themselves included) while being invoked. A panicking
    /// listener is logged and does not affect the others.
    pub fn poke(&self, space_id: &SpaceId) -> usize {
        let snapshot: Vec<Listener> = match self.listeners.read().get(space_id) {
            Some(listeners) => listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for listener in &snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener())) {
                Ok(()) => delivered += 1,
                Err(_) => error!(space_id = %space_id, "poke listener panicked"),
            }
        }

        debug!(space_id = %space_id, delivered, listeners = snapshot.len(), "poked");
        delivered
    }

    /// Number of listeners registered for `space_id`.
    #[must_use]
    pub fn listener_count(&self, space_id: &SpaceId) -> usize {
        self.listeners.read().get(space_id).map_or(0, Vec::len)
    }

    /// Number of spaces with at least one listener.
    #[must_use]
    pub fn space_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn remove(&self, space_id: &SpaceId, id: u64) {
        let mut listeners = self.listeners.write();
        if let Some(set) = listeners.get_mut(space_id) {
            set.retain(|(listener_id, _)| *listener_id != id);
            if set.is_empty() {
                listeners.remove(space_id);
            }
        }
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("spaces", &self.space_count())
            .finish()
    }
}

/// Handle to a registered listener; unsubscribes when dropped.
#[must_use = "dropping a subscription unsubscribes the listener"]
#[derive(Debug)]
pub struct Subscription {
    notifier: Weak<ChangeNotifier>,
    space_id: SpaceId,
    id: u64,
    active: bool,
}

impl Subscription {
    /// Returns the space the listener is registered for.
    #[must_use]
    pub fn space_id(&self) -> &SpaceId {
        &self.space_id
    }

    /// Removes the listener. Calling it again has no effect.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(notifier) = self.notifier.upgrade() {
            notifier.remove(&self.space_id, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
