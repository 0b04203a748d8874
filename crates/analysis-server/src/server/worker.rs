//
// server/worker.rs
//
// The single worker loop that executes queued operations
//

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::engine::{AnalysisLevel, ChangeNotice};
use crate::error::{ServerError, ServerErrorCode};
use crate::notification::{AnalysisServerListener, NotificationKind, SourceSetProvider};
use crate::operation::{Operation, PerformAnalysis, SendNotification};
use crate::perf::TimingGuard;

use super::context::ContextState;
use super::Shared;

/// Owns the authoritative context map and drains the queue.
pub(super) struct Worker {
    shared: Arc<Shared>,
    contexts: HashMap<String, ContextState>,
    poll_interval: Duration,
    perf_threshold_ms: u64,
}

impl Worker {
    pub(super) fn new(shared: Arc<Shared>, config: &ServerConfig) -> Self {
        Self {
            shared,
            contexts: HashMap::new(),
            poll_interval: config.poll_interval(),
            perf_threshold_ms: config.perf_threshold_ms,
        }
    }

    /// Runs until `Shutdown` is dequeued or the shutdown token is observed.
    pub(super) fn run(mut self) {
        log::info!("Analysis server worker started");

        loop {
            if self.shared.shutdown.is_cancelled() {
                break;
            }
            let Some(operation) = self.shared.queue.take(self.poll_interval) else {
                continue;
            };
            if matches!(operation, Operation::Shutdown) {
                self.shared.queue.mark_last_operation_completed();
                break;
            }
            self.execute_isolated(operation);
            self.shared.queue.mark_last_operation_completed();
        }

        for (context_id, mut context) in self.contexts.drain() {
            log::trace!("Disposing context {} on shutdown", context_id);
            context.handle.dispose();
        }
        log::info!("Analysis server worker stopped");
    }

    /// Executes one operation; failures and panics become server errors.
    fn execute_isolated(&mut self, operation: Operation) {
        let label = operation.to_string();
        let _timer = TimingGuard::with_threshold(label.clone(), self.perf_threshold_ms);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(operation)));
        let error = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => ServerError::from_anyhow(&err),
            Err(payload) => ServerError::new(
                ServerErrorCode::OperationFailed,
                format!("{} panicked: {}", label, panic_message(payload.as_ref())),
            ),
        };

        match error.code {
            ServerErrorCode::InvalidContextId => log::warn!("{} failed: {}", label, error),
            _ => log::error!("{} failed: {}", label, error),
        }
        self.shared.broadcast.on_server_error(&error);
    }

    fn execute(&mut self, operation: Operation) -> anyhow::Result<()> {
        match operation {
            Operation::CreateContext(op) => {
                log::info!("Created context {} ({})", op.context_id, op.sdk_path.display());
                self.contexts
                    .insert(op.context_id.clone(), ContextState::new(op.name, op.handle));
                self.shared.schedule_analysis(&op.context_id, false);
            }
            Operation::DeleteContext(op) => {
                self.shared.queue.remove_with_context_id(&op.context_id);
                self.shared.forget_context(&op.context_id);
                let mut context = self
                    .contexts
                    .remove(&op.context_id)
                    .ok_or_else(|| ServerError::invalid_context_id(&op.context_id))?;
                context.handle.dispose();
                log::info!("Deleted context {} ({})", op.context_id, context.name);
            }
            Operation::SetContents(op) => {
                let context = self.context_mut(&op.context_id)?;
                context.handle.set_contents(&op.source, &op.contents)?;
                context.inventory.added.insert(op.source);
                self.shared.schedule_analysis(&op.context_id, false);
            }
            Operation::ApplyChanges(op) => {
                let context = self.context_mut(&op.context_id)?;
                context
                    .inventory
                    .added
                    .extend(op.changes.added.iter().cloned());
                for source in &op.changes.removed {
                    context.inventory.forget(source);
                }
                context.handle.apply_changes(&op.changes)?;
                self.shared.schedule_analysis(&op.context_id, false);
            }
            Operation::ApplyAnalysisDelta(op) => {
                let context = self.context_mut(&op.context_id)?;
                for (source, level) in &op.delta.levels {
                    if *level == AnalysisLevel::None {
                        context.inventory.added.remove(source);
                    } else {
                        context.inventory.added.insert(source.clone());
                    }
                }
                context.handle.apply_analysis_delta(&op.delta)?;
                self.shared.schedule_analysis(&op.context_id, false);
            }
            Operation::SetOptions(op) => {
                let context = self.context_mut(&op.context_id)?;
                context.handle.set_options(&op.options)?;
                self.shared.schedule_analysis(&op.context_id, false);
            }
            Operation::SetPrioritySources(op) => {
                let context = self.context_mut(&op.context_id)?;
                context.handle.set_priority_sources(&op.sources)?;
                self.shared.schedule_analysis(&op.context_id, false);
            }
            Operation::SetNotificationSources(op) => {
                let broadcast = &self.shared.broadcast;
                let context = self
                    .contexts
                    .get_mut(&op.context_id)
                    .ok_or_else(|| ServerError::invalid_context_id(&op.context_id))?;
                let provider = SourceSetProvider::new(op.sources);
                let new_sources = provider
                    .compute_new_sources(context.notifications.get(&op.kind), &context.inventory);
                log::trace!(
                    "Subscription {:?} for {} covers {} new sources",
                    op.kind,
                    op.context_id,
                    new_sources.len()
                );
                for source in &new_sources {
                    if let Some(notice) = context.handle.computed_notice(source) {
                        announce(broadcast, &op.context_id, op.kind, &notice);
                    }
                }
                context.notifications.insert(op.kind, provider);
            }
            Operation::SendNotification(op) => {
                if !self.contexts.contains_key(&op.context_id) {
                    return Err(ServerError::invalid_context_id(&op.context_id).into());
                }
                announce(&self.shared.broadcast, &op.context_id, op.kind, &op.notice);
            }
            Operation::PerformAnalysis(op) => self.perform_analysis(op)?,
            Operation::Shutdown => {}
        }
        Ok(())
    }

    fn perform_analysis(&mut self, op: PerformAnalysis) -> anyhow::Result<()> {
        let shared = &self.shared;
        let context = self
            .contexts
            .get_mut(&op.context_id)
            .ok_or_else(|| ServerError::invalid_context_id(&op.context_id))?;

        let result = context.handle.perform_analysis_task()?;
        log::trace!(
            "Analyzed {} step (priority={}, continue={}): {} notices, more_work={}",
            op.context_id,
            op.has_priority_sources,
            op.continue_pass,
            result.notices.len(),
            result.more_work
        );

        for notice in &result.notices {
            context.inventory.known.insert(notice.source.clone());
        }
        if result.more_work {
            shared.schedule_analysis(&op.context_id, true);
        }

        for (kind, provider) in &context.notifications {
            for notice in &result.notices {
                if provider.apply(&notice.source, &context.inventory) {
                    shared.queue.add(Operation::SendNotification(SendNotification {
                        context_id: op.context_id.clone(),
                        kind: *kind,
                        notice: notice.clone(),
                    }));
                }
            }
        }
        Ok(())
    }

    fn context_mut(&mut self, context_id: &str) -> anyhow::Result<&mut ContextState> {
        self.contexts
            .get_mut(context_id)
            .ok_or_else(|| ServerError::invalid_context_id(context_id).into())
    }
}

/// Sends the part of `notice` that `kind` subscribes to.
fn announce(
    listener: &dyn AnalysisServerListener,
    context_id: &str,
    kind: NotificationKind,
    notice: &ChangeNotice,
) {
    let source = &notice.source;
    match kind {
        NotificationKind::Errors => listener.computed_errors(context_id, source, &notice.errors),
        NotificationKind::Highlights => {
            if let Some(highlights) = &notice.highlights {
                listener.computed_highlights(context_id, source, highlights);
            }
        }
        NotificationKind::Navigation => {
            if let Some(navigation) = &notice.navigation {
                listener.computed_navigation(context_id, source, navigation);
            }
        }
        NotificationKind::Outline => {
            if let Some(outline) = &notice.outline {
                listener.computed_outline(context_id, source, outline);
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
