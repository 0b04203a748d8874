//! Boundary to the external analysis engine.
//!
//! The scheduling core never parses or resolves anything itself. Every context owns an
//! opaque [`AnalysisContext`] handle created by an [`AnalysisEngine`]; operations call
//! into it and fan the resulting [`ChangeNotice`]s out to listeners.
//!
//! The data types here are the payloads carried by listener callbacks.

pub mod text_engine;

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::source::Source;

pub use text_engine::TextEngine;

/// Package name to package root directory.
pub type PackageMap = IndexMap<String, PathBuf>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
}

/// A problem reported by the engine for a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisError {
    pub source: Source,
    pub offset: usize,
    pub length: usize,
    pub severity: ErrorSeverity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HighlightKind {
    Keyword,
    ClassName,
    Comment,
    Literal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightRegion {
    pub offset: usize,
    pub length: usize,
    pub kind: HighlightKind,
}

/// Where a navigation region leads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationTarget {
    pub source: Source,
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationRegion {
    pub offset: usize,
    pub length: usize,
    pub targets: Vec<NavigationTarget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutlineKind {
    CompilationUnit,
    Class,
    Function,
}

/// Structural outline of a source: a tree rooted at the compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outline {
    pub kind: OutlineKind,
    pub name: String,
    pub offset: usize,
    pub length: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Outline>,
}

/// Results the engine computed for one source during an analysis step.
///
/// `errors` is always meaningful; the unit-derived payloads are only present
/// once the source has been fully resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotice {
    pub source: Source,
    #[serde(default)]
    pub errors: Vec<AnalysisError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlights: Option<Vec<HighlightRegion>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation: Option<Vec<NavigationRegion>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline: Option<Outline>,
}

impl ChangeNotice {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            errors: Vec::new(),
            highlights: None,
            navigation: None,
            outline: None,
        }
    }
}

/// Outcome of one bounded unit of analysis work.
#[derive(Debug, Clone, Default)]
pub struct AnalysisResult {
    pub notices: Vec<ChangeNotice>,
    /// The context still has work left after this step.
    pub more_work: bool,
}

/// Per-context engine options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisOptions {
    pub hints: bool,
    pub strict_mode: bool,
    pub cache_size: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            hints: true,
            strict_mode: false,
            cache_size: 64,
        }
    }
}

/// Batched changes to the sources of a context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangeSet {
    pub added: Vec<Source>,
    pub changed: IndexMap<Source, String>,
    pub removed: Vec<Source>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, source: Source) -> &mut Self {
        self.added.push(source);
        self
    }

    pub fn change_contents(&mut self, source: Source, contents: impl Into<String>) -> &mut Self {
        self.changed.insert(source, contents.into());
        self
    }

    pub fn remove_source(&mut self, source: Source) -> &mut Self {
        self.removed.push(source);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// How deeply a source should be analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisLevel {
    All,
    Errors,
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisDelta {
    pub levels: IndexMap<Source, AnalysisLevel>,
}

impl AnalysisDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_level(&mut self, source: Source, level: AnalysisLevel) -> &mut Self {
        self.levels.insert(source, level);
        self
    }
}

/// Factory for engine-side analysis contexts.
pub trait AnalysisEngine: Send + Sync {
    /// Creates a context bound to the SDK at `sdk_path`.
    ///
    /// Rejecting the SDK path is the only expected failure; the error should carry a
    /// [`crate::error::ServerError`] with `InvalidSdkPath`.
    fn create_context(
        &self,
        sdk_path: &Path,
        package_map: &PackageMap,
    ) -> anyhow::Result<Box<dyn AnalysisContext>>;
}

/// Opaque engine handle owned by one server context.
///
/// Only ever touched from the worker thread.
pub trait AnalysisContext: Send {
    fn set_contents(&mut self, source: &Source, contents: &str) -> anyhow::Result<()>;

    fn apply_changes(&mut self, changes: &ChangeSet) -> anyhow::Result<()>;

    fn apply_analysis_delta(&mut self, delta: &AnalysisDelta) -> anyhow::Result<()>;

    fn set_options(&mut self, options: &AnalysisOptions) -> anyhow::Result<()>;

    fn set_priority_sources(&mut self, sources: &[Source]) -> anyhow::Result<()>;

    /// Performs one bounded unit of analysis work.
    fn perform_analysis_task(&mut self) -> anyhow::Result<AnalysisResult>;

    /// Results already computed for `source`, if it has been analyzed.
    fn computed_notice(&self, source: &Source) -> Option<ChangeNotice>;

    /// Releases engine resources. Called once when the context is deleted.
    fn dispose(&mut self) {}
}
