//! Event capture layer
//!
//! Connects a session to an event source through per-kind listeners, the way
//! a page registers `mousemove`, `keydown`, `click` and friends. [`attach`]
//! returns a [`Subscription`]; disposing it (or dropping it) unregisters every
//! listener.
//!
//! [`EventHub`] is a plain in-process event source. Hosts that bridge real
//! browser events can use it directly, and tests use it as a fake page.

use crate::clock::Clock;
use crate::session::BehaviorSession;
use crate::store::SnapshotStore;
use crate::types::{EventKind, InteractionEvent};
use log::{debug, warn};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

/// Callback invoked for each dispatched event of a subscribed kind
pub type Listener = Rc<dyn Fn(&InteractionEvent)>;

/// Identifier of a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Something that delivers interaction events to registered listeners
pub trait EventSource {
    /// Whether this source can deliver events of `kind` at all.
    ///
    /// Kinds a source cannot produce are never subscribed, so the matching
    /// snapshot features stay at zero.
    fn supports(&self, _kind: EventKind) -> bool {
        true
    }

    fn add_listener(&self, kind: EventKind, listener: Listener) -> ListenerId;

    /// Returns `false` if the listener was not registered
    fn remove_listener(&self, id: ListenerId) -> bool;
}

/// In-process event source with optional capability restrictions
#[derive(Default)]
pub struct EventHub {
    listeners: RefCell<Vec<(ListenerId, EventKind, Listener)>>,
    next_id: Cell<u64>,
    unsupported: HashSet<EventKind>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A hub that cannot produce the given kinds (e.g. no pointer device)
    pub fn without(kinds: &[EventKind]) -> Self {
        Self {
            unsupported: kinds.iter().copied().collect(),
            ..Self::default()
        }
    }

    /// Deliver an event to every listener of its kind, in registration order.
    ///
    /// Returns the number of listeners invoked.
    pub fn dispatch(&self, event: &InteractionEvent) -> usize {
        let kind = event.kind();
        // Collect first so listeners may subscribe or unsubscribe while running
        let targets: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, l)| Rc::clone(l))
            .collect();

        for listener in &targets {
            listener(event);
        }
        targets.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl EventSource for EventHub {
    fn supports(&self, kind: EventKind) -> bool {
        !self.unsupported.contains(&kind)
    }

    fn add_listener(&self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, kind, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _, _)| *lid != id);
        listeners.len() != before
    }
}

/// The set of listeners registered by one [`attach`] call
pub struct Subscription {
    source: Rc<dyn EventSource>,
    ids: Vec<ListenerId>,
}

impl Subscription {
    /// Number of listeners still registered
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Unregister every listener
    pub fn dispose(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        for id in self.ids.drain(..) {
            self.source.remove_listener(id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Start (or resume) the session and route every supported event kind from
/// `source` into it.
///
/// Listeners hold only a weak reference to the session; once the session is
/// dropped they become no-ops.
pub fn attach<C, S, E>(session: &Rc<RefCell<BehaviorSession<C, S>>>, source: &Rc<E>) -> Subscription
where
    C: Clock + 'static,
    S: SnapshotStore + 'static,
    E: EventSource + 'static,
{
    session.borrow_mut().init();

    let source: Rc<dyn EventSource> = source.clone();
    let mut ids = Vec::with_capacity(EventKind::ALL.len());

    for kind in EventKind::ALL {
        if !source.supports(kind) {
            debug!("event source cannot deliver {kind:?}; feature stays at zero");
            continue;
        }
        let weak = Rc::downgrade(session);
        let listener: Listener = Rc::new(move |event: &InteractionEvent| {
            let Some(session) = weak.upgrade() else {
                return;
            };
            match session.try_borrow_mut() {
                Ok(mut session) => session.handle_event(event),
                Err(_) => warn!("dropping {:?} delivered while the session was busy", event.kind()),
            };
        });
        ids.push(source.add_listener(kind, listener));
    }

    Subscription { source, ids }
}
