//
// server/context.rs
//
// Worker-owned state of one analysis context
//

use std::collections::BTreeMap;

use crate::engine::AnalysisContext;
use crate::notification::{NotificationKind, SourceInventory, SourceSetProvider};

/// Everything the worker tracks for one context.
///
/// Only the worker thread touches this, so none of it is locked.
pub struct ContextState {
    pub name: String,
    pub handle: Box<dyn AnalysisContext>,
    pub inventory: SourceInventory,
    /// Active subscription per notification kind.
    pub notifications: BTreeMap<NotificationKind, SourceSetProvider>,
}

impl ContextState {
    pub fn new(name: String, handle: Box<dyn AnalysisContext>) -> Self {
        Self {
            name,
            handle,
            inventory: SourceInventory::new(),
            notifications: BTreeMap::new(),
        }
    }
}
