//
// engine/text_engine.rs
//
// Minimal keyword-level engine that backs the stdio binary
//

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use indexmap::IndexMap;

use super::{
    AnalysisContext, AnalysisDelta, AnalysisEngine, AnalysisError, AnalysisLevel,
    AnalysisOptions, AnalysisResult, ChangeNotice, ChangeSet, ErrorSeverity, HighlightKind,
    HighlightRegion, NavigationRegion, NavigationTarget, Outline, OutlineKind, PackageMap,
};
use crate::error::{ServerError, ServerErrorCode};
use crate::source::Source;

const KEYWORDS: &[&str] = &["class", "extends", "import"];

/// Engine whose contexts analyze one source per task.
#[derive(Debug, Default, Clone)]
pub struct TextEngine;

impl TextEngine {
    pub fn new() -> Self {
        Self
    }
}

impl AnalysisEngine for TextEngine {
    fn create_context(
        &self,
        sdk_path: &Path,
        package_map: &PackageMap,
    ) -> anyhow::Result<Box<dyn AnalysisContext>> {
        if sdk_path.as_os_str().is_empty() || !sdk_path.is_absolute() {
            return Err(ServerError::new(
                ServerErrorCode::InvalidSdkPath,
                format!("SDK path must be absolute: '{}'", sdk_path.display()),
            )
            .into());
        }
        Ok(Box::new(TextContext::new(
            sdk_path.to_path_buf(),
            package_map.clone(),
        )))
    }
}

/// A context of [`TextEngine`].
#[derive(Debug)]
pub struct TextContext {
    sdk_path: PathBuf,
    package_map: PackageMap,
    contents: IndexMap<Source, String>,
    levels: HashMap<Source, AnalysisLevel>,
    pending: VecDeque<Source>,
    priority: Vec<Source>,
    results: HashMap<Source, ChangeNotice>,
    options: AnalysisOptions,
}

impl TextContext {
    fn new(sdk_path: PathBuf, package_map: PackageMap) -> Self {
        Self {
            sdk_path,
            package_map,
            contents: IndexMap::new(),
            levels: HashMap::new(),
            pending: VecDeque::new(),
            priority: Vec::new(),
            results: HashMap::new(),
            options: AnalysisOptions::default(),
        }
    }

    pub fn sdk_path(&self) -> &Path {
        &self.sdk_path
    }

    pub fn package_map(&self) -> &PackageMap {
        &self.package_map
    }

    fn invalidate(&mut self, source: &Source) {
        self.results.remove(source);
        if !self.pending.contains(source) {
            self.pending.push_back(source.clone());
        }
    }

    fn invalidate_all(&mut self) {
        let sources: Vec<Source> = self.contents.keys().cloned().collect();
        for source in &sources {
            self.invalidate(source);
        }
    }

    fn forget(&mut self, source: &Source) {
        self.contents.shift_remove(source);
        self.levels.remove(source);
        self.results.remove(source);
        self.pending.retain(|s| s != source);
    }

    /// Priority sources go first, then FIFO.
    fn next_pending(&mut self) -> Option<Source> {
        let index = self
            .priority
            .iter()
            .find_map(|p| self.pending.iter().position(|s| s == p))
            .unwrap_or(0);
        self.pending.remove(index)
    }

    fn analyze(&self, source: &Source) -> ChangeNotice {
        let text = self.contents.get(source).map(String::as_str).unwrap_or("");
        let level = self
            .levels
            .get(source)
            .copied()
            .unwrap_or(AnalysisLevel::All);

        let mut notice = ChangeNotice::new(source.clone());
        notice.errors = brace_errors(source, text, self.options.strict_mode);
        if level == AnalysisLevel::Errors {
            return notice;
        }

        let words = words(text);
        let mut highlights = Vec::new();
        let mut navigation = Vec::new();
        let mut classes = Vec::new();
        for (i, &(offset, word)) in words.iter().enumerate() {
            if KEYWORDS.contains(&word) {
                highlights.push(HighlightRegion {
                    offset,
                    length: word.len(),
                    kind: HighlightKind::Keyword,
                });
            }
            let Some(&(name_offset, name)) = words.get(i + 1) else {
                continue;
            };
            match word {
                "class" => {
                    highlights.push(HighlightRegion {
                        offset: name_offset,
                        length: name.len(),
                        kind: HighlightKind::ClassName,
                    });
                    classes.push(Outline {
                        kind: OutlineKind::Class,
                        name: name.to_string(),
                        offset: name_offset,
                        length: name.len(),
                        children: Vec::new(),
                    });
                }
                "extends" => {
                    let targets = self.find_declarations(name);
                    if !targets.is_empty() {
                        navigation.push(NavigationRegion {
                            offset: name_offset,
                            length: name.len(),
                            targets,
                        });
                    }
                }
                _ => {}
            }
        }

        notice.highlights = Some(highlights);
        notice.navigation = Some(navigation);
        notice.outline = Some(Outline {
            kind: OutlineKind::CompilationUnit,
            name: source.short_name().to_string(),
            offset: 0,
            length: text.len(),
            children: classes,
        });
        notice
    }

    fn find_declarations(&self, class_name: &str) -> Vec<NavigationTarget> {
        let mut targets = Vec::new();
        for (source, text) in &self.contents {
            let words = words(text);
            for pair in words.windows(2) {
                if pair[0].1 == "class" && pair[1].1 == class_name {
                    targets.push(NavigationTarget {
                        source: source.clone(),
                        offset: pair[1].0,
                        length: class_name.len(),
                    });
                }
            }
        }
        targets
    }
}

impl AnalysisContext for TextContext {
    fn set_contents(&mut self, source: &Source, contents: &str) -> anyhow::Result<()> {
        self.contents.insert(source.clone(), contents.to_string());
        self.invalidate(source);
        Ok(())
    }

    fn apply_changes(&mut self, changes: &ChangeSet) -> anyhow::Result<()> {
        for source in &changes.added {
            if !self.contents.contains_key(source) {
                let text = read_source(source)?;
                self.contents.insert(source.clone(), text);
            }
            self.invalidate(source);
        }
        for (source, text) in &changes.changed {
            self.contents.insert(source.clone(), text.clone());
            self.invalidate(source);
        }
        for source in &changes.removed {
            self.forget(source);
        }
        Ok(())
    }

    fn apply_analysis_delta(&mut self, delta: &AnalysisDelta) -> anyhow::Result<()> {
        for (source, level) in &delta.levels {
            match level {
                AnalysisLevel::None => self.forget(source),
                level => {
                    if !self.contents.contains_key(source) {
                        let text = read_source(source)?;
                        self.contents.insert(source.clone(), text);
                    }
                    self.levels.insert(source.clone(), *level);
                    self.invalidate(source);
                }
            }
        }
        Ok(())
    }

    fn set_options(&mut self, options: &AnalysisOptions) -> anyhow::Result<()> {
        if *options != self.options {
            self.options = options.clone();
            self.invalidate_all();
        }
        Ok(())
    }

    fn set_priority_sources(&mut self, sources: &[Source]) -> anyhow::Result<()> {
        self.priority = sources.to_vec();
        Ok(())
    }

    fn perform_analysis_task(&mut self) -> anyhow::Result<AnalysisResult> {
        let Some(source) = self.next_pending() else {
            return Ok(AnalysisResult::default());
        };
        let notice = self.analyze(&source);
        self.results.insert(source, notice.clone());
        Ok(AnalysisResult {
            notices: vec![notice],
            more_work: !self.pending.is_empty(),
        })
    }

    fn computed_notice(&self, source: &Source) -> Option<ChangeNotice> {
        self.results.get(source).cloned()
    }

    fn dispose(&mut self) {
        self.contents.clear();
        self.results.clear();
        self.pending.clear();
    }
}

/// Contents of an added source that was never set explicitly.
fn read_source(source: &Source) -> anyhow::Result<String> {
    if source.uri().scheme() != "file" {
        return Ok(String::new());
    }
    let path = source
        .uri()
        .to_file_path()
        .map_err(|_| anyhow::anyhow!("Invalid file path: {}", source))?;
    std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Identifier-like words with their byte offsets.
fn words(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, ch) in text.char_indices() {
        let is_word = ch.is_alphanumeric() || ch == '_';
        match (is_word, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                out.push((s, &text[s..i]));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push((s, &text[s..]));
    }
    out
}

fn brace_errors(source: &Source, text: &str, strict: bool) -> Vec<AnalysisError> {
    let mut errors = Vec::new();
    let mut open = Vec::new();
    for (i, ch) in text.char_indices() {
        match ch {
            '{' => open.push(i),
            '}' => {
                if open.pop().is_none() {
                    errors.push(AnalysisError {
                        source: source.clone(),
                        offset: i,
                        length: 1,
                        severity: ErrorSeverity::Error,
                        message: "Unexpected '}'".to_string(),
                    });
                }
            }
            _ => {}
        }
    }
    for offset in open {
        errors.push(AnalysisError {
            source: source.clone(),
            offset,
            length: 1,
            severity: ErrorSeverity::Error,
            message: "Unclosed '{'".to_string(),
        });
    }
    if strict && text.trim().is_empty() {
        errors.push(AnalysisError {
            source: source.clone(),
            offset: 0,
            length: 0,
            severity: ErrorSeverity::Warning,
            message: "Empty source".to_string(),
        });
    }
    errors.sort_by_key(|e| e.offset);
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(name: &str) -> Source {
        Source::parse(&format!("file:///work/{}", name)).unwrap()
    }

    fn context() -> Box<dyn AnalysisContext> {
        TextEngine::new()
            .create_context(Path::new("/opt/sdk"), &PackageMap::new())
            .unwrap()
    }

    #[test]
    fn test_relative_sdk_path_rejected() {
        let err = TextEngine::new()
            .create_context(Path::new("sdk"), &PackageMap::new())
            .err()
            .unwrap();
        assert_eq!(
            ServerError::from_anyhow(&err).code,
            ServerErrorCode::InvalidSdkPath
        );
    }

    #[test]
    fn test_one_source_per_task() {
        let mut ctx = context();
        ctx.set_contents(&src("a.src"), "class A {}").unwrap();
        ctx.set_contents(&src("b.src"), "class B {}").unwrap();

        let first = ctx.perform_analysis_task().unwrap();
        assert_eq!(first.notices.len(), 1);
        assert_eq!(first.notices[0].source, src("a.src"));
        assert!(first.more_work);

        let second = ctx.perform_analysis_task().unwrap();
        assert_eq!(second.notices[0].source, src("b.src"));
        assert!(!second.more_work);

        let idle = ctx.perform_analysis_task().unwrap();
        assert!(idle.notices.is_empty());
        assert!(!idle.more_work);
    }

    #[test]
    fn test_priority_source_analyzed_first() {
        let mut ctx = context();
        ctx.set_contents(&src("a.src"), "class A {}").unwrap();
        ctx.set_contents(&src("b.src"), "class B {}").unwrap();
        ctx.set_priority_sources(&[src("b.src")]).unwrap();

        let first = ctx.perform_analysis_task().unwrap();
        assert_eq!(first.notices[0].source, src("b.src"));
    }

    #[test]
    fn test_outline_highlights_and_errors() {
        let mut ctx = context();
        ctx.set_contents(&src("a.src"), "class A { class B {}").unwrap();
        let notice = ctx.perform_analysis_task().unwrap().notices.remove(0);

        assert_eq!(notice.errors.len(), 1);
        assert_eq!(notice.errors[0].offset, 8);
        let outline = notice.outline.unwrap();
        let names: Vec<_> = outline.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        let highlights = notice.highlights.unwrap();
        assert_eq!(
            highlights
                .iter()
                .filter(|h| h.kind == HighlightKind::ClassName)
                .count(),
            2
        );
    }

    #[test]
    fn test_navigation_to_declaring_source() {
        let mut ctx = context();
        ctx.set_contents(&src("a.src"), "class A {}").unwrap();
        ctx.set_contents(&src("b.src"), "class B extends A {}").unwrap();
        ctx.perform_analysis_task().unwrap();
        let notice = ctx.perform_analysis_task().unwrap().notices.remove(0);

        let navigation = notice.navigation.unwrap();
        assert_eq!(navigation.len(), 1);
        assert_eq!(navigation[0].targets[0].source, src("a.src"));
        assert_eq!(navigation[0].targets[0].offset, 6);
    }

    #[test]
    fn test_errors_level_skips_unit_payloads() {
        let mut ctx = context();
        ctx.set_contents(&src("a.src"), "class A {}").unwrap();
        let mut delta = AnalysisDelta::new();
        delta.set_level(src("a.src"), AnalysisLevel::Errors);
        ctx.apply_analysis_delta(&delta).unwrap();

        let notice = ctx.perform_analysis_task().unwrap().notices.remove(0);
        assert!(notice.outline.is_none());
        assert!(notice.highlights.is_none());
    }

    #[test]
    fn test_computed_notice_and_removal() {
        let mut ctx = context();
        ctx.set_contents(&src("a.src"), "class A {}").unwrap();
        assert!(ctx.computed_notice(&src("a.src")).is_none());
        ctx.perform_analysis_task().unwrap();
        assert!(ctx.computed_notice(&src("a.src")).is_some());

        let mut changes = ChangeSet::new();
        changes.remove_source(src("a.src"));
        ctx.apply_changes(&changes).unwrap();
        assert!(ctx.computed_notice(&src("a.src")).is_none());
    }
}
