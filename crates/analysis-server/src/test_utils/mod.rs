//
// test_utils/mod.rs
//
// Recording listener and scripted engine shared by unit tests and benches
//

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::engine::{
    AnalysisContext, AnalysisDelta, AnalysisEngine, AnalysisError, AnalysisOptions,
    AnalysisResult, ChangeNotice, ChangeSet, ErrorSeverity, HighlightRegion, NavigationRegion,
    Outline, OutlineKind, PackageMap,
};
use crate::error::{ServerError, ServerErrorCode};
use crate::notification::AnalysisServerListener;
use crate::source::Source;

/// One callback observed by [`RecordingListener`].
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    Errors {
        context_id: String,
        source: Source,
        errors: Vec<AnalysisError>,
    },
    Highlights {
        context_id: String,
        source: Source,
        highlights: Vec<HighlightRegion>,
    },
    Navigation {
        context_id: String,
        source: Source,
        navigation: Vec<NavigationRegion>,
    },
    Outline {
        context_id: String,
        source: Source,
        outline: Outline,
    },
    ServerError(ServerError),
}

impl ListenerEvent {
    pub fn source(&self) -> Option<&Source> {
        match self {
            ListenerEvent::Errors { source, .. }
            | ListenerEvent::Highlights { source, .. }
            | ListenerEvent::Navigation { source, .. }
            | ListenerEvent::Outline { source, .. } => Some(source),
            ListenerEvent::ServerError(_) => None,
        }
    }
}

/// Listener that keeps every callback in arrival order.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn server_errors(&self) -> Vec<ServerError> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ListenerEvent::ServerError(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    /// Sources that received an errors callback, in arrival order.
    pub fn error_sources(&self) -> Vec<Source> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ListenerEvent::Errors { source, .. } => Some(source),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ListenerEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl AnalysisServerListener for RecordingListener {
    fn computed_errors(&self, context_id: &str, source: &Source, errors: &[AnalysisError]) {
        self.push(ListenerEvent::Errors {
            context_id: context_id.to_string(),
            source: source.clone(),
            errors: errors.to_vec(),
        });
    }

    fn computed_highlights(
        &self,
        context_id: &str,
        source: &Source,
        highlights: &[HighlightRegion],
    ) {
        self.push(ListenerEvent::Highlights {
            context_id: context_id.to_string(),
            source: source.clone(),
            highlights: highlights.to_vec(),
        });
    }

    fn computed_navigation(
        &self,
        context_id: &str,
        source: &Source,
        navigation: &[NavigationRegion],
    ) {
        self.push(ListenerEvent::Navigation {
            context_id: context_id.to_string(),
            source: source.clone(),
            navigation: navigation.to_vec(),
        });
    }

    fn computed_outline(&self, context_id: &str, source: &Source, outline: &Outline) {
        self.push(ListenerEvent::Outline {
            context_id: context_id.to_string(),
            source: source.clone(),
            outline: outline.clone(),
        });
    }

    fn on_server_error(&self, error: &ServerError) {
        self.push(ListenerEvent::ServerError(error.clone()));
    }
}

/// Contents that make [`FakeEngine`] contexts panic in `set_contents`.
pub const PANIC_CONTENTS: &str = "PANIC";
/// Contents that make [`FakeEngine`] contexts fail in `set_contents`.
pub const FAIL_CONTENTS: &str = "FAIL";
/// Contents that park the worker in `set_contents` until [`FakeEngine::release`].
pub const BLOCK_CONTENTS: &str = "BLOCK";

#[derive(Debug, Default)]
struct GateState {
    closed: bool,
    parked: bool,
}

#[derive(Debug, Default)]
struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
}

/// Engine whose contexts log every call and follow scripted contents.
///
/// Each analysis task analyzes one dirty source, FIFO. A source reports one
/// error when its contents contain `error`.
#[derive(Debug, Default, Clone)]
pub struct FakeEngine {
    log: Arc<Mutex<Vec<String>>>,
    gate: Arc<Gate>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls made on any context of this engine, e.g. `set_contents a.src=v1`.
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Position of the first call equal to `call`.
    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    /// Makes the next `BLOCK` contents park the worker.
    pub fn hold(&self) {
        self.gate.state.lock().unwrap().closed = true;
    }

    /// Waits until the worker is parked on the gate.
    pub fn wait_until_parked(&self, timeout: Duration) -> bool {
        let state = self.gate.state.lock().unwrap();
        let (state, _) = self
            .gate
            .changed
            .wait_timeout_while(state, timeout, |s| !s.parked)
            .unwrap();
        state.parked
    }

    pub fn release(&self) {
        self.gate.state.lock().unwrap().closed = false;
        self.gate.changed.notify_all();
    }
}

impl AnalysisEngine for FakeEngine {
    fn create_context(
        &self,
        sdk_path: &Path,
        _package_map: &PackageMap,
    ) -> anyhow::Result<Box<dyn AnalysisContext>> {
        if sdk_path.as_os_str().is_empty() {
            return Err(ServerError::new(ServerErrorCode::InvalidSdkPath, "empty SDK path").into());
        }
        self.log.lock().unwrap().push(format!("create {}", sdk_path.display()));
        Ok(Box::new(FakeContext {
            engine: self.clone(),
            contents: Vec::new(),
            dirty: VecDeque::new(),
            results: Vec::new(),
        }))
    }
}

struct FakeContext {
    engine: FakeEngine,
    contents: Vec<(Source, String)>,
    dirty: VecDeque<Source>,
    results: Vec<ChangeNotice>,
}

impl FakeContext {
    fn record(&self, call: String) {
        self.engine.log.lock().unwrap().push(call);
    }

    fn park(&self) {
        let gate = &self.engine.gate;
        let mut state = gate.state.lock().unwrap();
        state.parked = true;
        gate.changed.notify_all();
        while state.closed {
            state = gate.changed.wait(state).unwrap();
        }
        state.parked = false;
    }

    fn touch(&mut self, source: &Source, text: &str) {
        match self.contents.iter_mut().find(|(s, _)| s == source) {
            Some(entry) => entry.1 = text.to_string(),
            None => self.contents.push((source.clone(), text.to_string())),
        }
        if !self.dirty.contains(source) {
            self.dirty.push_back(source.clone());
        }
    }

    fn notice(&self, source: &Source) -> ChangeNotice {
        let text = self
            .contents
            .iter()
            .find(|(s, _)| s == source)
            .map(|(_, t)| t.as_str())
            .unwrap_or("");
        let mut notice = ChangeNotice::new(source.clone());
        if let Some(offset) = text.find("error") {
            notice.errors.push(AnalysisError {
                source: source.clone(),
                offset,
                length: 5,
                severity: ErrorSeverity::Error,
                message: "scripted error".to_string(),
            });
        }
        notice.highlights = Some(Vec::new());
        notice.navigation = Some(Vec::new());
        notice.outline = Some(Outline {
            kind: OutlineKind::CompilationUnit,
            name: source.short_name().to_string(),
            offset: 0,
            length: text.len(),
            children: Vec::new(),
        });
        notice
    }
}

impl AnalysisContext for FakeContext {
    fn set_contents(&mut self, source: &Source, contents: &str) -> anyhow::Result<()> {
        self.record(format!("set_contents {}={}", source.short_name(), contents));
        match contents {
            PANIC_CONTENTS => panic!("scripted panic for {}", source.short_name()),
            FAIL_CONTENTS => anyhow::bail!("scripted failure for {}", source.short_name()),
            BLOCK_CONTENTS => self.park(),
            _ => {}
        }
        self.touch(source, contents);
        Ok(())
    }

    fn apply_changes(&mut self, changes: &ChangeSet) -> anyhow::Result<()> {
        self.record("apply_changes".to_string());
        for source in &changes.added {
            self.touch(source, "");
        }
        for (source, text) in &changes.changed {
            self.touch(source, text);
        }
        for source in &changes.removed {
            self.contents.retain(|(s, _)| s != source);
            self.dirty.retain(|s| s != source);
            self.results.retain(|n| &n.source != source);
        }
        Ok(())
    }

    fn apply_analysis_delta(&mut self, _delta: &AnalysisDelta) -> anyhow::Result<()> {
        self.record("apply_analysis_delta".to_string());
        Ok(())
    }

    fn set_options(&mut self, options: &AnalysisOptions) -> anyhow::Result<()> {
        self.record(format!("set_options strict={}", options.strict_mode));
        Ok(())
    }

    fn set_priority_sources(&mut self, sources: &[Source]) -> anyhow::Result<()> {
        self.record(format!("set_priority_sources {}", sources.len()));
        Ok(())
    }

    fn perform_analysis_task(&mut self) -> anyhow::Result<AnalysisResult> {
        let Some(source) = self.dirty.pop_front() else {
            return Ok(AnalysisResult::default());
        };
        self.record(format!("analyze {}", source.short_name()));
        let notice = self.notice(&source);
        self.results.retain(|n| n.source != source);
        self.results.push(notice.clone());
        Ok(AnalysisResult {
            notices: vec![notice],
            more_work: !self.dirty.is_empty(),
        })
    }

    fn computed_notice(&self, source: &Source) -> Option<ChangeNotice> {
        self.results.iter().find(|n| &n.source == source).cloned()
    }

    fn dispose(&mut self) {
        self.record("dispose".to_string());
    }
}
