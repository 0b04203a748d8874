//
// notification/broadcast.rs
//
// De-duplicated fan-out of results to registered listeners
//

use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;

use crate::engine::{AnalysisError, HighlightRegion, NavigationRegion, Outline};
use crate::error::ServerError;
use crate::source::Source;

/// Receives analysis results and server errors.
///
/// Callbacks run on the worker thread; implementations should return quickly.
pub trait AnalysisServerListener: Send + Sync {
    fn computed_errors(&self, _context_id: &str, _source: &Source, _errors: &[AnalysisError]) {}

    fn computed_highlights(
        &self,
        _context_id: &str,
        _source: &Source,
        _highlights: &[HighlightRegion],
    ) {
    }

    fn computed_navigation(
        &self,
        _context_id: &str,
        _source: &Source,
        _navigation: &[NavigationRegion],
    ) {
    }

    fn computed_outline(&self, _context_id: &str, _source: &Source, _outline: &Outline) {}

    fn on_server_error(&self, _error: &ServerError) {}
}

/// Identity of a registered listener: the address of its `Arc` allocation.
type ListenerKey = usize;

fn listener_key(listener: &Arc<dyn AnalysisServerListener>) -> ListenerKey {
    Arc::as_ptr(listener) as *const () as usize
}

/// Set of listeners keyed by identity, iterated in registration order.
#[derive(Default)]
pub struct ListenerBroadcast {
    listeners: RwLock<IndexMap<ListenerKey, Arc<dyn AnalysisServerListener>>>,
}

impl ListenerBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener`. Adding a listener that is already registered is a no-op.
    pub fn add_listener(&self, listener: Arc<dyn AnalysisServerListener>) {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        listeners.entry(listener_key(&listener)).or_insert(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn AnalysisServerListener>) {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        listeners.shift_remove(&listener_key(listener));
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current listeners, so callbacks run without the lock held.
    fn snapshot(&self) -> Vec<Arc<dyn AnalysisServerListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn each(&self, f: impl Fn(&dyn AnalysisServerListener)) {
        for listener in self.snapshot() {
            f(listener.as_ref());
        }
    }
}

impl AnalysisServerListener for ListenerBroadcast {
    fn computed_errors(&self, context_id: &str, source: &Source, errors: &[AnalysisError]) {
        self.each(|l| l.computed_errors(context_id, source, errors));
    }

    fn computed_highlights(
        &self,
        context_id: &str,
        source: &Source,
        highlights: &[HighlightRegion],
    ) {
        self.each(|l| l.computed_highlights(context_id, source, highlights));
    }

    fn computed_navigation(
        &self,
        context_id: &str,
        source: &Source,
        navigation: &[NavigationRegion],
    ) {
        self.each(|l| l.computed_navigation(context_id, source, navigation));
    }

    fn computed_outline(&self, context_id: &str, source: &Source, outline: &Outline) {
        self.each(|l| l.computed_outline(context_id, source, outline));
    }

    fn on_server_error(&self, error: &ServerError) {
        self.each(|l| l.on_server_error(error));
    }
}
