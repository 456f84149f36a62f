//! Event handler table
//!
//! Maps each event name to exactly one handler. Registering a second handler
//! for the same name replaces the first. Registration hands back a
//! [`Subscription`] guard that removes the handler when dropped, unless the
//! slot has since been taken over by a newer registration.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::Inbound;

/// Callback invoked for one event name
///
/// Handlers receive the owner's context mutably for the duration of the call.
pub type Handler<S> = Box<dyn FnMut(&mut S, &Inbound<'_>) + Send>;

struct Slot<S> {
    id: u64,
    handler: Handler<S>,
}

pub(crate) struct HandlerTable<S> {
    slots: HashMap<String, Slot<S>>,
    next_id: u64,
}

impl<S> HandlerTable<S> {
    pub(crate) fn new() -> Self {
        Self {
            slots: HashMap::new(),
            next_id: 0,
        }
    }

    /// Install a handler, returning the slot id
    fn insert(&mut self, event: &str, handler: Handler<S>) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.slots.insert(event.to_string(), Slot { id, handler });
        id
    }

    fn remove_if_owned(&mut self, event: &str, id: u64) {
        if self.slots.get(event).is_some_and(|slot| slot.id == id) {
            self.slots.remove(event);
        }
    }

    pub(crate) fn remove(&mut self, event: &str) -> bool {
        self.slots.remove(event).is_some()
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn contains(&self, event: &str) -> bool {
        self.slots.contains_key(event)
    }

    /// Run the handler for `event`, if one is registered
    pub(crate) fn call(&mut self, event: &str, ctx: &mut S, inbound: &Inbound<'_>) -> bool {
        match self.slots.get_mut(event) {
            Some(slot) => {
                (slot.handler)(ctx, inbound);
                true
            }
            None => false,
        }
    }
}

pub(crate) type SharedTable<S> = Arc<Mutex<HandlerTable<S>>>;

pub(crate) fn register<S>(table: &SharedTable<S>, event: &str, handler: Handler<S>) -> Subscription<S> {
    let id = table.lock().insert(event, handler);
    Subscription {
        event: event.to_string(),
        id,
        table: Arc::downgrade(table),
    }
}

/// Disposer for a registered handler
///
/// Dropping the subscription unregisters the handler. A subscription whose
/// handler was already replaced or cleared does nothing.
#[must_use = "dropping a subscription immediately unregisters its handler"]
pub struct Subscription<S> {
    event: String,
    id: u64,
    table: Weak<Mutex<HandlerTable<S>>>,
}

impl<S> Subscription<S> {
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Unregister now
    pub fn dispose(self) {}
}

impl<S> Drop for Subscription<S> {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.lock().remove_if_owned(&self.event, self.id);
        }
    }
}

impl<S> std::fmt::Debug for Subscription<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .finish()
    }
}
