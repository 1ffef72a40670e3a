use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A lifecycle event handler. Invoked synchronously on the publishing
/// thread; a handler that panics or returns an error must not interrupt
/// other handlers or the publisher, so handlers report failures by
/// logging rather than by propagating them.
pub type Handler = Arc<dyn Fn(&str, &BTreeMap<String, Value>) + Send + Sync>;

const WILDCARD: &str = "*";

/// In-process publish/subscribe for board and conductor lifecycle events
/// (`POSTED`, `REMOVAL`, `job_claimed`, `running_start`, `job_consumed`,
/// `job_abandoned`, `job_trashed`, `compilation_failure`, ...).
///
/// Handler lists are copy-on-write (`Arc<Vec<_>>` swapped under a short
/// write lock) so publishing never blocks on a concurrent subscribe.
#[derive(Default)]
pub struct Notifier {
    handlers: RwLock<BTreeMap<String, Arc<Vec<Handler>>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`. Use `"*"` to receive every event.
    pub fn register(&self, event: impl Into<String>, handler: Handler) {
        let event = event.into();
        let mut handlers = self.handlers.write();
        let existing = handlers.get(&event).cloned().unwrap_or_default();
        let mut next: Vec<Handler> = (*existing).clone();
        next.push(handler);
        handlers.insert(event, Arc::new(next));
    }

    /// Remove the first handler registered for `event` that points at the
    /// same closure allocation as `handler`.
    pub fn deregister(&self, event: &str, handler: &Handler) {
        let mut handlers = self.handlers.write();
        if let Some(existing) = handlers.get(event) {
            let next: Vec<Handler> = existing
                .iter()
                .filter(|h| !Arc::ptr_eq(h, handler))
                .cloned()
                .collect();
            handlers.insert(event.to_string(), Arc::new(next));
        }
    }

    /// Publish `event` with `details` to every handler registered for
    /// `event` plus every wildcard handler, in registration order.
    pub fn notify(&self, event: &str, details: &BTreeMap<String, Value>) {
        let (specific, wildcard) = {
            let handlers = self.handlers.read();
            (
                handlers.get(event).cloned(),
                handlers.get(WILDCARD).cloned(),
            )
        };
        if let Some(specific) = specific {
            for handler in specific.iter() {
                handler(event, details);
            }
        }
        if let Some(wildcard) = wildcard {
            for handler in wildcard.iter() {
                handler(event, details);
            }
        }
    }
}
