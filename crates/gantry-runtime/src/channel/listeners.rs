//! Typed listener registry for channel events.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

use super::{ChannelEvent, ChannelEventKind};

type Callback = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// Handle returned by `on()`, used to unregister the callback.
///
/// Closures are not comparable, so removal goes by id rather than by
/// callback identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callbacks per event kind, kept in registration order.
#[derive(Default)]
pub(crate) struct ListenerSet {
    next_id: AtomicU64,
    slots: Mutex<HashMap<ChannelEventKind, Vec<(ListenerId, Callback)>>>,
}

impl ListenerSet {
    pub(crate) fn on(
        &self,
        kind: ChannelEventKind,
        callback: impl Fn(&ChannelEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.slots
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    pub(crate) fn off(&self, kind: ChannelEventKind, id: ListenerId) -> bool {
        let mut slots = self.slots.lock().unwrap();
        if let Some(list) = slots.get_mut(&kind) {
            let before = list.len();
            list.retain(|(listener_id, _)| *listener_id != id);
            return list.len() != before;
        }
        false
    }

    /// Invoke every callback registered for the event's kind, in
    /// registration order. Callbacks run outside the registry lock; a
    /// panicking callback must not prevent the remaining ones from running.
    pub(crate) fn dispatch(&self, event: &ChannelEvent) {
        let callbacks: Vec<Callback> = {
            let slots = self.slots.lock().unwrap();
            slots
                .get(&event.kind())
                .map(|list| list.iter().map(|(_, callback)| callback.clone()).collect())
                .unwrap_or_default()
        };

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                warn!(kind = ?event.kind(), "listener callback panicked");
            }
        }
    }
}
