//! The analysis server orchestrator.
//!
//! Command calls never execute work themselves: each one is translated into
//! [`Operation`]s and queued. A single worker thread drains the queue, so the
//! context map needs no locking on the worker side. The few facts callers can
//! query synchronously (which context ids exist, which contexts have priority
//! sources) are published into small lock-protected sets.

mod context;
mod worker;


use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::engine::{
    AnalysisDelta, AnalysisEngine, AnalysisOptions, ChangeSet, PackageMap,
};
use crate::notification::{AnalysisServerListener, ListenerBroadcast, NotificationKind, SourceSet};
use crate::operation::{
    ApplyAnalysisDelta, ApplyChanges, CreateContext, DeleteContext, Operation, OperationQueue,
    SetContents, SetNotificationSources, SetOptions, SetPrioritySources,
};
use crate::source::Source;

/// Version reported by [`AnalysisServer::get_version`].
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// State shared between command callers and the worker.
pub(crate) struct Shared {
    queue: OperationQueue,
    broadcast: ListenerBroadcast,
    /// Ids of contexts that exist, published for synchronous queries.
    context_ids: RwLock<HashSet<String>>,
    /// Contexts that currently have priority sources.
    priority_contexts: Mutex<HashSet<String>>,
    shutdown: CancellationToken,
}

impl Shared {
    fn new() -> Self {
        Self {
            queue: OperationQueue::new(),
            broadcast: ListenerBroadcast::new(),
            context_ids: RwLock::new(HashSet::new()),
            priority_contexts: Mutex::new(HashSet::new()),
            shutdown: CancellationToken::new(),
        }
    }

    fn has_priority_sources(&self, context_id: &str) -> bool {
        self.priority_contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(context_id)
    }

    /// Queues an analysis pass, picking the band from the context's priority sources.
    fn schedule_analysis(&self, context_id: &str, continue_pass: bool) {
        let has_priority_sources = self.has_priority_sources(context_id);
        self.queue.add(Operation::perform_analysis(
            context_id,
            has_priority_sources,
            continue_pass,
        ));
    }

    fn publish_context(&self, context_id: &str) {
        self.context_ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(context_id.to_string());
    }

    fn forget_context(&self, context_id: &str) {
        self.context_ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(context_id);
        self.priority_contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(context_id);
    }
}

/// In-process analysis server driven by one worker thread.
pub struct AnalysisServer {
    shared: Arc<Shared>,
    engine: Arc<dyn AnalysisEngine>,
    next_context_id: AtomicUsize,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AnalysisServer {
    /// Starts a server and its worker thread.
    pub fn start(engine: Arc<dyn AnalysisEngine>, config: ServerConfig) -> anyhow::Result<Self> {
        let shared = Arc::new(Shared::new());
        let worker = worker::Worker::new(shared.clone(), &config);
        let handle = thread::Builder::new()
            .name("analysis-server-worker".to_string())
            .spawn(move || worker.run())
            .context("Failed to spawn analysis server worker")?;

        Ok(Self {
            shared,
            engine,
            next_context_id: AtomicUsize::new(0),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Registers a listener. Registering the same `Arc` twice is a no-op.
    pub fn add_analysis_server_listener(&self, listener: Arc<dyn AnalysisServerListener>) {
        self.shared.broadcast.add_listener(listener);
    }

    pub fn remove_analysis_server_listener(&self, listener: &Arc<dyn AnalysisServerListener>) {
        self.shared.broadcast.remove_listener(listener);
    }

    /// Creates a context and returns its id, `<name>-<n>`.
    ///
    /// The engine context is created eagerly so the id is usable right away;
    /// installing it and analyzing its sources happens on the worker. Fails
    /// only if the engine rejects the SDK path.
    pub fn create_context(
        &self,
        name: &str,
        sdk_path: impl AsRef<Path>,
        package_map: PackageMap,
    ) -> anyhow::Result<String> {
        let sdk_path = sdk_path.as_ref();
        let context_id = format!(
            "{}-{}",
            name,
            self.next_context_id.fetch_add(1, Ordering::SeqCst)
        );
        let handle = self
            .engine
            .create_context(sdk_path, &package_map)
            .with_context(|| format!("Failed to create context {}", context_id))?;

        self.shared.publish_context(&context_id);
        self.shared.queue.add(Operation::CreateContext(CreateContext {
            context_id: context_id.clone(),
            name: name.to_string(),
            sdk_path: sdk_path.to_path_buf(),
            package_map,
            handle,
        }));
        Ok(context_id)
    }

    pub fn delete_context(&self, context_id: &str) {
        self.shared.queue.add(Operation::DeleteContext(DeleteContext {
            context_id: context_id.to_string(),
        }));
    }

    pub fn set_contents(&self, context_id: &str, source: Source, contents: impl Into<String>) {
        self.shared.queue.add(Operation::SetContents(SetContents {
            context_id: context_id.to_string(),
            source,
            contents: contents.into(),
        }));
    }

    pub fn apply_changes(&self, context_id: &str, changes: ChangeSet) {
        self.shared.queue.add(Operation::ApplyChanges(ApplyChanges {
            context_id: context_id.to_string(),
            changes,
        }));
    }

    pub fn apply_analysis_delta(&self, context_id: &str, delta: AnalysisDelta) {
        self.shared
            .queue
            .add(Operation::ApplyAnalysisDelta(ApplyAnalysisDelta {
                context_id: context_id.to_string(),
                delta,
            }));
    }

    pub fn set_options(&self, context_id: &str, options: AnalysisOptions) {
        self.shared.queue.add(Operation::SetOptions(SetOptions {
            context_id: context_id.to_string(),
            options,
        }));
    }

    /// Sets the sources to analyze first. A non-empty list moves the context's
    /// analysis into the priority bands from the next scheduled pass on.
    pub fn set_priority_sources(&self, context_id: &str, sources: Vec<Source>) {
        {
            let mut priority = self
                .shared
                .priority_contexts
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !sources.is_empty() && self.has_context(context_id) {
                priority.insert(context_id.to_string());
            } else {
                priority.remove(context_id);
            }
        }
        self.shared
            .queue
            .add(Operation::SetPrioritySources(SetPrioritySources {
                context_id: context_id.to_string(),
                sources,
            }));
    }

    /// Replaces the subscription of each given notification kind.
    pub fn subscribe(
        &self,
        context_id: &str,
        subscriptions: impl IntoIterator<Item = (NotificationKind, SourceSet)>,
    ) {
        for (kind, sources) in subscriptions {
            self.shared
                .queue
                .add(Operation::SetNotificationSources(SetNotificationSources {
                    context_id: context_id.to_string(),
                    kind,
                    sources,
                }));
        }
    }

    /// Answers immediately, independent of queued work.
    pub fn get_version(&self, callback: impl FnOnce(&str)) {
        callback(VERSION);
    }

    /// Whether `context_id` names a live context.
    pub fn has_context(&self, context_id: &str) -> bool {
        self.shared
            .context_ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(context_id)
    }

    /// Blocks until the queue is drained and the worker is idle.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        self.shared.queue.wait_for_idle(timeout)
    }

    /// Stops the worker. Work still queued is dropped; the running operation finishes.
    pub fn shutdown(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };

        log::info!("Shutting down analysis server");
        self.shared.shutdown.cancel();
        self.shared.queue.add(Operation::Shutdown);

        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log::error!("Analysis server worker panicked during shutdown");
        }
    }
}

impl Drop for AnalysisServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
