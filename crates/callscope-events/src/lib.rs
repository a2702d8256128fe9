use callscope_core::{NodeId, ViewMode};
use crossbeam_channel::{Receiver, unbounded};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

pub mod telemetry;

/// Cascades nested deeper than this are reported; they usually mean a handler
/// re-publishes the event that triggered it.
pub const MAX_CASCADE_DEPTH: usize = 32;

/// Event names. Subscriptions are keyed by kind; there are no wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    ThreadChanged,
    NodeSelectionChanged,
    NodeExpansionChanged,
    ChangeCurrentFocusedNode,
    ChangeSingleMethodByIdToClassviz,
    ChangeMultiMethodByIdsToClassviz,
    SwitchTraceMode,
    ViewModeChanged,
    RefreshFlame,
    SearchResultsChanged,
    SwitchStepByStepMode,
    RefreshRegionFocus,
    ChangeLlmServiceProvider,
}

impl EventKind {
    pub const ALL: [EventKind; 13] = [
        EventKind::ThreadChanged,
        EventKind::NodeSelectionChanged,
        EventKind::NodeExpansionChanged,
        EventKind::ChangeCurrentFocusedNode,
        EventKind::ChangeSingleMethodByIdToClassviz,
        EventKind::ChangeMultiMethodByIdsToClassviz,
        EventKind::SwitchTraceMode,
        EventKind::ViewModeChanged,
        EventKind::RefreshFlame,
        EventKind::SearchResultsChanged,
        EventKind::SwitchStepByStepMode,
        EventKind::RefreshRegionFocus,
        EventKind::ChangeLlmServiceProvider,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // ========================================================================
    // DataStore
    // ========================================================================
    ThreadChanged {
        thread_name: String,
    },
    /// Not emitted for the individual steps of a batch operation.
    NodeSelectionChanged {
        node_id: NodeId,
        selected: bool,
        package_name: String,
    },
    NodeExpansionChanged {
        node_id: NodeId,
        expanded: bool,
    },
    ChangeCurrentFocusedNode {
        node_id: NodeId,
    },
    SearchResultsChanged {
        search_results: Vec<NodeId>,
    },
    ViewModeChanged {
        mode: ViewMode,
    },
    /// Views should re-pull everything; sent once after a batch selection.
    RefreshFlame,

    // ========================================================================
    // Class diagram projection
    // ========================================================================
    /// Emitted for every selection flip, batch or not.
    ChangeSingleMethodByIdToClassviz {
        node_id: NodeId,
        selected: bool,
    },
    ChangeMultiMethodByIdsToClassviz {
        node_ids: Vec<NodeId>,
        selected: bool,
    },
    SwitchTraceMode {
        trace_mode: bool,
    },

    // ========================================================================
    // Playback and regions
    // ========================================================================
    SwitchStepByStepMode {
        flag: bool,
    },
    RefreshRegionFocus {
        stop_step_by_step_mode: bool,
    },

    // ========================================================================
    // Explanation service
    // ========================================================================
    ChangeLlmServiceProvider {
        model: String,
        url: String,
        key: String,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ThreadChanged { .. } => EventKind::ThreadChanged,
            Event::NodeSelectionChanged { .. } => EventKind::NodeSelectionChanged,
            Event::NodeExpansionChanged { .. } => EventKind::NodeExpansionChanged,
            Event::ChangeCurrentFocusedNode { .. } => EventKind::ChangeCurrentFocusedNode,
            Event::SearchResultsChanged { .. } => EventKind::SearchResultsChanged,
            Event::ViewModeChanged { .. } => EventKind::ViewModeChanged,
            Event::RefreshFlame => EventKind::RefreshFlame,
            Event::ChangeSingleMethodByIdToClassviz { .. } => {
                EventKind::ChangeSingleMethodByIdToClassviz
            }
            Event::ChangeMultiMethodByIdsToClassviz { .. } => {
                EventKind::ChangeMultiMethodByIdsToClassviz
            }
            Event::SwitchTraceMode { .. } => EventKind::SwitchTraceMode,
            Event::SwitchStepByStepMode { .. } => EventKind::SwitchStepByStepMode,
            Event::RefreshRegionFocus { .. } => EventKind::RefreshRegionFocus,
            Event::ChangeLlmServiceProvider { .. } => EventKind::ChangeLlmServiceProvider,
        }
    }
}

type Handler = Rc<dyn Fn(&Event)>;

#[derive(Default)]
struct BusInner {
    handlers: HashMap<EventKind, Vec<(u64, Handler)>>,
    next_id: u64,
}

/// Synchronous publish/subscribe hub shared by every component of a session.
///
/// Handlers run in subscription order on the publisher's stack. A handler may
/// publish again; the nested dispatch completes before the outer one resumes.
/// Panics inside a handler are not caught.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<BusInner>>,
    depth: Rc<Cell<usize>>,
    max_depth: Rc<Cell<usize>>,
}

/// Handle returned by [`EventBus::subscribe`]. Dropping it keeps the handler
/// registered; call [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<RefCell<BusInner>>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Returns false when the handler was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(bus) = self.bus.upgrade() else {
            return false;
        };
        let mut inner = bus.borrow_mut();
        let Some(handlers) = inner.handlers.get_mut(&self.kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != self.id);
        before != handlers.len()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&Event) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .handlers
            .entry(kind)
            .or_default()
            .push((id, Rc::new(handler)));
        Subscription {
            bus: Rc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    pub fn publish(&self, event: Event) {
        let kind = event.kind();
        // Snapshot so handlers can (un)subscribe while we dispatch.
        let handlers: Vec<Handler> = self
            .inner
            .borrow()
            .handlers
            .get(&kind)
            .map(|list| list.iter().map(|(_, handler)| Rc::clone(handler)).collect())
            .unwrap_or_default();

        let depth = self.depth.get() + 1;
        self.depth.set(depth);
        if depth > self.max_depth.get() {
            self.max_depth.set(depth);
        }
        if depth > MAX_CASCADE_DEPTH {
            tracing::warn!(?kind, depth, "Event cascade exceeds expected depth");
        }
        tracing::trace!(?kind, depth, handlers = handlers.len(), "publish");

        let _guard = DepthGuard(&self.depth);
        for handler in handlers {
            handler(&event);
        }
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.inner
            .borrow()
            .handlers
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Deepest nesting of publish calls seen so far (1 = no cascade).
    pub fn max_dispatch_depth(&self) -> usize {
        self.max_depth.get()
    }

    /// Subscribe a listener to `kinds`. The bus holds it weakly; follow-up
    /// events it returns are published once its borrow has been released.
    pub fn attach<L>(&self, listener: &Rc<RefCell<L>>, kinds: &[EventKind]) -> Vec<Subscription>
    where
        L: EventListener + 'static,
    {
        kinds
            .iter()
            .map(|&kind| {
                let weak = Rc::downgrade(listener);
                let bus = self.clone();
                self.subscribe(kind, move |event| {
                    let Some(listener) = weak.upgrade() else {
                        return;
                    };
                    let follow_ups = listener.borrow_mut().handle_event(event);
                    for follow_up in follow_ups {
                        bus.publish(follow_up);
                    }
                })
            })
            .collect()
    }

    /// Record every event of the given kinds, in publish order.
    pub fn tap(&self, kinds: &[EventKind]) -> Receiver<Event> {
        let (tx, rx) = unbounded();
        for &kind in kinds {
            let tx = tx.clone();
            self.subscribe(kind, move |event| {
                let _ = tx.send(event.clone());
            });
        }
        rx
    }
}

struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// Trait for components that respond to events.
///
/// Returned events are published right after `handle_event` returns, still
/// inside the current dispatch.
pub trait EventListener {
    fn handle_event(&mut self, event: &Event) -> Vec<Event>;
}
