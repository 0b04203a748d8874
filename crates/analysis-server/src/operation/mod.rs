//! Units of scheduled work.
//!
//! An [`Operation`] is created by a command call, lives only inside the
//! [`OperationQueue`], and is consumed exactly once by the worker. Mergeable
//! operations absorb a newer compatible operation instead of queueing a second
//! entry.

pub mod priority;
pub mod queue;


use std::fmt;
use std::path::PathBuf;

use crate::engine::{
    AnalysisContext, AnalysisDelta, AnalysisOptions, ChangeNotice, ChangeSet, PackageMap,
};
use crate::notification::{NotificationKind, SourceSet};
use crate::source::Source;

pub use priority::OperationPriority;
pub use queue::{AddOutcome, OperationQueue};

/// Installs a context whose id and engine handle were allocated eagerly.
pub struct CreateContext {
    pub context_id: String,
    pub name: String,
    pub sdk_path: PathBuf,
    pub package_map: PackageMap,
    pub handle: Box<dyn AnalysisContext>,
}

impl fmt::Debug for CreateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateContext")
            .field("context_id", &self.context_id)
            .field("name", &self.name)
            .field("sdk_path", &self.sdk_path)
            .field("package_map", &self.package_map)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct DeleteContext {
    pub context_id: String,
}

#[derive(Debug)]
pub struct SetContents {
    pub context_id: String,
    pub source: Source,
    pub contents: String,
}

#[derive(Debug)]
pub struct ApplyChanges {
    pub context_id: String,
    pub changes: ChangeSet,
}

#[derive(Debug)]
pub struct ApplyAnalysisDelta {
    pub context_id: String,
    pub delta: AnalysisDelta,
}

#[derive(Debug)]
pub struct SetOptions {
    pub context_id: String,
    pub options: AnalysisOptions,
}

#[derive(Debug)]
pub struct SetPrioritySources {
    pub context_id: String,
    pub sources: Vec<Source>,
}

#[derive(Debug)]
pub struct SetNotificationSources {
    pub context_id: String,
    pub kind: NotificationKind,
    pub sources: SourceSet,
}

/// Delivers one already-computed notice for one notification kind.
#[derive(Debug)]
pub struct SendNotification {
    pub context_id: String,
    pub kind: NotificationKind,
    pub notice: ChangeNotice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformAnalysis {
    pub context_id: String,
    pub has_priority_sources: bool,
    pub continue_pass: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    CreateContext,
    DeleteContext,
    SetContents,
    ApplyChanges,
    ApplyAnalysisDelta,
    SetOptions,
    SetPrioritySources,
    SetNotificationSources,
    SendNotification,
    PerformAnalysis,
    Shutdown,
}

#[derive(Debug)]
pub enum Operation {
    CreateContext(CreateContext),
    DeleteContext(DeleteContext),
    SetContents(SetContents),
    ApplyChanges(ApplyChanges),
    ApplyAnalysisDelta(ApplyAnalysisDelta),
    SetOptions(SetOptions),
    SetPrioritySources(SetPrioritySources),
    SetNotificationSources(SetNotificationSources),
    SendNotification(SendNotification),
    PerformAnalysis(PerformAnalysis),
    Shutdown,
}

impl Operation {
    pub fn perform_analysis(
        context_id: impl Into<String>,
        has_priority_sources: bool,
        continue_pass: bool,
    ) -> Self {
        Operation::PerformAnalysis(PerformAnalysis {
            context_id: context_id.into(),
            has_priority_sources,
            continue_pass,
        })
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::CreateContext(_) => OperationKind::CreateContext,
            Operation::DeleteContext(_) => OperationKind::DeleteContext,
            Operation::SetContents(_) => OperationKind::SetContents,
            Operation::ApplyChanges(_) => OperationKind::ApplyChanges,
            Operation::ApplyAnalysisDelta(_) => OperationKind::ApplyAnalysisDelta,
            Operation::SetOptions(_) => OperationKind::SetOptions,
            Operation::SetPrioritySources(_) => OperationKind::SetPrioritySources,
            Operation::SetNotificationSources(_) => OperationKind::SetNotificationSources,
            Operation::SendNotification(_) => OperationKind::SendNotification,
            Operation::PerformAnalysis(_) => OperationKind::PerformAnalysis,
            Operation::Shutdown => OperationKind::Shutdown,
        }
    }

    pub fn priority(&self) -> OperationPriority {
        match self {
            Operation::Shutdown => OperationPriority::Server,
            Operation::CreateContext(_)
            | Operation::DeleteContext(_)
            | Operation::SetContents(_)
            | Operation::ApplyChanges(_)
            | Operation::ApplyAnalysisDelta(_)
            | Operation::SetOptions(_)
            | Operation::SetPrioritySources(_)
            | Operation::SetNotificationSources(_) => OperationPriority::ContextChange,
            Operation::SendNotification(_) => OperationPriority::ContextNotification,
            Operation::PerformAnalysis(op) => {
                OperationPriority::for_analysis(op.has_priority_sources, op.continue_pass)
            }
        }
    }

    /// Context this operation is scoped to; `None` for server-wide operations.
    pub fn context_id(&self) -> Option<&str> {
        let id = match self {
            Operation::CreateContext(op) => &op.context_id,
            Operation::DeleteContext(op) => &op.context_id,
            Operation::SetContents(op) => &op.context_id,
            Operation::ApplyChanges(op) => &op.context_id,
            Operation::ApplyAnalysisDelta(op) => &op.context_id,
            Operation::SetOptions(op) => &op.context_id,
            Operation::SetPrioritySources(op) => &op.context_id,
            Operation::SetNotificationSources(op) => &op.context_id,
            Operation::SendNotification(op) => &op.context_id,
            Operation::PerformAnalysis(op) => &op.context_id,
            Operation::Shutdown => return None,
        };
        Some(id)
    }

    /// Whether this kind can absorb a newer compatible operation.
    pub fn is_mergeable(&self) -> bool {
        matches!(
            self,
            Operation::SetContents(_)
                | Operation::SetOptions(_)
                | Operation::SetPrioritySources(_)
                | Operation::SetNotificationSources(_)
                | Operation::PerformAnalysis(_)
                | Operation::Shutdown
        )
    }

    /// Absorbs `newer` into `self` when both describe the same pending work.
    ///
    /// Same kind and same context is required everywhere; `SetContents` also
    /// needs the same source and `SetNotificationSources` the same kind. The
    /// newer payload wins. `PerformAnalysis` only merges with an identical pass.
    /// On failure `newer` is handed back untouched.
    pub fn merge_with(&mut self, newer: Operation) -> Result<(), Operation> {
        match (self, newer) {
            (Operation::SetContents(pending), Operation::SetContents(newer))
                if pending.context_id == newer.context_id && pending.source == newer.source =>
            {
                pending.contents = newer.contents;
                Ok(())
            }
            (Operation::SetOptions(pending), Operation::SetOptions(newer))
                if pending.context_id == newer.context_id =>
            {
                pending.options = newer.options;
                Ok(())
            }
            (Operation::SetPrioritySources(pending), Operation::SetPrioritySources(newer))
                if pending.context_id == newer.context_id =>
            {
                pending.sources = newer.sources;
                Ok(())
            }
            (
                Operation::SetNotificationSources(pending),
                Operation::SetNotificationSources(newer),
            ) if pending.context_id == newer.context_id && pending.kind == newer.kind => {
                pending.sources = newer.sources;
                Ok(())
            }
            (Operation::PerformAnalysis(pending), Operation::PerformAnalysis(newer))
                if *pending == newer =>
            {
                Ok(())
            }
            (Operation::Shutdown, Operation::Shutdown) => Ok(()),
            (_, newer) => Err(newer),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.context_id() {
            Some(id) => write!(f, "{:?}({})", self.kind(), id),
            None => write!(f, "{:?}", self.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(name: &str) -> Source {
        Source::parse(&format!("file:///work/{}", name)).unwrap()
    }

    fn set_contents(ctx: &str, source: &str, text: &str) -> Operation {
        Operation::SetContents(SetContents {
            context_id: ctx.to_string(),
            source: src(source),
            contents: text.to_string(),
        })
    }

    #[test]
    fn test_set_contents_last_writer_wins() {
        let mut pending = set_contents("ctx-0", "a", "one");
        assert!(pending.merge_with(set_contents("ctx-0", "a", "two")).is_ok());
        match pending {
            Operation::SetContents(op) => assert_eq!(op.contents, "two"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_set_contents_needs_same_context_and_source() {
        let mut pending = set_contents("ctx-0", "a", "one");
        assert!(pending.merge_with(set_contents("ctx-1", "a", "two")).is_err());
        assert!(pending.merge_with(set_contents("ctx-0", "b", "two")).is_err());
    }

    #[test]
    fn test_different_kinds_never_merge() {
        let mut pending = set_contents("ctx-0", "a", "one");
        let returned = pending
            .merge_with(Operation::SetOptions(SetOptions {
                context_id: "ctx-0".to_string(),
                options: AnalysisOptions::default(),
            }))
            .unwrap_err();
        assert_eq!(returned.kind(), OperationKind::SetOptions);
    }

    #[test]
    fn test_notification_sources_merge_per_kind() {
        let subscribe = |kind, set| {
            Operation::SetNotificationSources(SetNotificationSources {
                context_id: "ctx-0".to_string(),
                kind,
                sources: set,
            })
        };
        let mut pending = subscribe(NotificationKind::Errors, SourceSet::All);
        assert!(pending
            .merge_with(subscribe(NotificationKind::Outline, SourceSet::NonSdk))
            .is_err());
        assert!(pending
            .merge_with(subscribe(NotificationKind::Errors, SourceSet::NonSdk))
            .is_ok());
        match pending {
            Operation::SetNotificationSources(op) => assert_eq!(op.sources, SourceSet::NonSdk),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_perform_analysis_merges_only_identical_passes() {
        let mut pending = Operation::perform_analysis("ctx-0", false, false);
        assert!(pending
            .merge_with(Operation::perform_analysis("ctx-0", true, false))
            .is_err());
        assert!(pending
            .merge_with(Operation::perform_analysis("ctx-0", false, true))
            .is_err());
        assert!(pending
            .merge_with(Operation::perform_analysis("ctx-1", false, false))
            .is_err());
        assert!(pending
            .merge_with(Operation::perform_analysis("ctx-0", false, false))
            .is_ok());
    }

    #[test]
    fn test_priorities_and_scope() {
        assert_eq!(Operation::Shutdown.priority(), OperationPriority::Server);
        assert_eq!(Operation::Shutdown.context_id(), None);
        assert_eq!(
            set_contents("ctx-0", "a", "").priority(),
            OperationPriority::ContextChange
        );
        let notify = Operation::SendNotification(SendNotification {
            context_id: "ctx-0".to_string(),
            kind: NotificationKind::Errors,
            notice: ChangeNotice::new(src("a")),
        });
        assert_eq!(notify.priority(), OperationPriority::ContextNotification);
        assert_eq!(notify.context_id(), Some("ctx-0"));
        assert!(!notify.is_mergeable());
        assert_eq!(
            Operation::perform_analysis("ctx-0", true, true).priority(),
            OperationPriority::ContextAnalysisPriorityContinue
        );
    }

    #[test]
    fn test_compatible_operations_share_a_band() {
        // The queue only scans the incoming operation's own bucket for merges.
        let a = Operation::perform_analysis("ctx-0", true, false);
        let b = Operation::perform_analysis("ctx-0", true, false);
        assert_eq!(a.priority(), b.priority());
        assert_eq!(
            set_contents("ctx-0", "a", "x").priority(),
            set_contents("ctx-0", "a", "y").priority()
        );
    }
}
