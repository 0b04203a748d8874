//
// notification/mod.rs
//
// Subscriptions and result fan-out
//

pub mod broadcast;
pub mod source_set;

#[cfg(test)]
mod property_tests;

use serde::{Deserialize, Serialize};

pub use broadcast::{AnalysisServerListener, ListenerBroadcast};
pub use source_set::{SourceInventory, SourceSet, SourceSetKind, SourceSetProvider};

/// The kinds of per-source results a client can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Errors,
    Highlights,
    Navigation,
    Outline,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 4] = [
        NotificationKind::Errors,
        NotificationKind::Highlights,
        NotificationKind::Navigation,
        NotificationKind::Outline,
    ];
}
