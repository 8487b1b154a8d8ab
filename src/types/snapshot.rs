use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde_yaml::Value;

use crate::error::TagweaveError;
use crate::parse::PromptError;
use crate::region;
use crate::types::{RuleFile, SchemaError, Trace};
use crate::validate;

/// Result of running one prompt pair through a snapshot.
#[derive(Debug, Clone)]
pub struct Transformation {
    pub positive: String,
    pub negative: String,
    pub trace: Trace,
}

/// An immutable, fully validated set of rule files.
///
/// Construction validates everything up front; a snapshot that exists is a
/// snapshot that evaluates. Files are held sorted by name, which fixes the
/// global rule order. Share across threads with `Arc<Snapshot>` or through a
/// [`Pipeline`].
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    files: Vec<RuleFile>,
}

impl Snapshot {
    /// Build a snapshot from already parsed YAML documents.
    pub fn from_nodes(nodes: Vec<(String, Value)>) -> Result<Self, SchemaError> {
        let mut nodes = nodes;
        nodes.sort_by(|a, b| a.0.cmp(&b.0));
        let mut files = Vec::with_capacity(nodes.len());
        for (name, node) in nodes {
            let rules = validate::validate_file(&name, &node)?;
            files.push(RuleFile {
                name,
                rules,
                digest: None,
            });
        }
        Ok(Self { files })
    }

    /// Build a snapshot from named YAML source texts.
    ///
    /// Each source's content digest is retained so [`Snapshot::cache_key`]
    /// reflects rule content, not just file names.
    pub fn from_sources<I, S>(sources: I) -> Result<Self, TagweaveError>
    where
        I: IntoIterator<Item = (String, S)>,
        S: AsRef<str>,
    {
        let mut named: Vec<(String, S)> = sources.into_iter().collect();
        named.sort_by(|a, b| a.0.cmp(&b.0));
        let mut files = Vec::with_capacity(named.len());
        for (name, source) in named {
            let source = source.as_ref();
            let node: Value = serde_yaml::from_str(source)?;
            let rules = validate::validate_file(&name, &node)?;
            files.push(RuleFile {
                name,
                rules,
                digest: Some(*blake3::hash(source.as_bytes()).as_bytes()),
            });
        }
        Ok(Self { files })
    }

    /// Load every `.yml`/`.yaml` file in a directory, sorted by file name.
    pub fn from_dir(path: impl AsRef<Path>) -> Result<Self, TagweaveError> {
        let mut sources = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();
            let is_rule_file = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yml" || e == "yaml");
            if !is_rule_file || !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            sources.push((name, fs::read_to_string(&path)?));
        }
        Self::from_sources(sources)
    }

    #[must_use]
    pub fn files(&self) -> &[RuleFile] {
        &self.files
    }

    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.files.iter().map(|f| f.rules.len()).sum()
    }

    /// Rewrite a positive/negative prompt pair.
    ///
    /// Deterministic: the same snapshot and inputs always produce the same
    /// output and trace.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError`] when either prompt fails to tokenize.
    pub fn transform(&self, positive: &str, negative: &str) -> Result<Transformation, PromptError> {
        region::transform(&self.files, positive, negative)
    }

    /// A stable content key for memoizing transformations.
    ///
    /// Covers the rule file names, their content digests (when the snapshot
    /// was built from sources or a directory), and both prompts. Two equal
    /// keys produce byte-identical output.
    #[must_use]
    pub fn cache_key(&self, positive: &str, negative: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        for file in &self.files {
            hasher.update(file.name.as_bytes());
            hasher.update(&[0]);
            if let Some(digest) = &file.digest {
                hasher.update(digest);
            }
            hasher.update(&[0]);
        }
        hasher.update(positive.as_bytes());
        hasher.update(&[0]);
        hasher.update(negative.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Snapshot({} files, {} rules)",
            self.files.len(),
            self.rule_count()
        )
    }
}

/// Shared handle over the active snapshot, with atomic hot reload.
///
/// Readers clone an `Arc` under a short read lock and evaluate against that
/// snapshot unaffected by concurrent reloads. A reload builds and validates
/// the replacement completely before a single write-lock swap; on failure the
/// previous snapshot keeps serving.
#[derive(Debug, Default)]
pub struct Pipeline {
    current: RwLock<Arc<Snapshot>>,
}

impl Pipeline {
    #[must_use]
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The currently active snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap in an already built snapshot.
    pub fn install(&self, snapshot: Snapshot) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }

    /// Rebuild from named YAML sources and swap on success.
    ///
    /// # Errors
    ///
    /// On any parse or schema error the active snapshot is left untouched.
    pub fn reload_sources<I, S>(&self, sources: I) -> Result<Arc<Snapshot>, TagweaveError>
    where
        I: IntoIterator<Item = (String, S)>,
        S: AsRef<str>,
    {
        let snapshot = Arc::new(Snapshot::from_sources(sources)?);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);
        Ok(snapshot)
    }

    /// Rebuild from a rule directory and swap on success.
    ///
    /// # Errors
    ///
    /// On any I/O, parse, or schema error the active snapshot is left
    /// untouched.
    pub fn reload_dir(&self, path: impl AsRef<Path>) -> Result<Arc<Snapshot>, TagweaveError> {
        let snapshot = Arc::new(Snapshot::from_dir(path)?);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);
        Ok(snapshot)
    }

    /// Transform against the currently active snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError`] when either prompt fails to tokenize.
    pub fn transform(&self, positive: &str, negative: &str) -> Result<Transformation, PromptError> {
        self.snapshot().transform(positive, negative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CELICA: &str = "- name: celica\n  any_of: celica\n  add: black hair\n";

    #[test]
    fn sources_are_sorted_by_file_name() {
        let snapshot = Snapshot::from_sources(vec![
            ("b.yaml".to_owned(), "- add: two\n"),
            ("a.yaml".to_owned(), "- add: one\n"),
        ])
        .unwrap();
        assert_eq!(snapshot.files()[0].name, "a.yaml");
        assert_eq!(snapshot.files()[1].name, "b.yaml");
        assert_eq!(snapshot.to_string(), "Snapshot(2 files, 2 rules)");
    }

    #[test]
    fn invalid_source_fails_construction() {
        let result = Snapshot::from_sources(vec![("a.yaml".to_owned(), "- type: swap\n")]);
        assert!(matches!(result, Err(TagweaveError::Schema(_))));
    }

    #[test]
    fn empty_snapshot_passes_prompts_through() {
        let snapshot = Snapshot::default();
        let out = snapshot.transform("celica, smile", "blurry").unwrap();
        assert_eq!(out.positive, "celica, smile");
        assert_eq!(out.negative, "blurry");
        assert_eq!(out.trace.visited(), 0);
    }

    #[test]
    fn cache_key_tracks_rules_and_prompts() {
        let a = Snapshot::from_sources(vec![("a.yaml".to_owned(), CELICA)]).unwrap();
        let b = Snapshot::from_sources(vec![(
            "a.yaml".to_owned(),
            "- name: celica\n  any_of: celica\n  add: red hair\n",
        )])
        .unwrap();

        let base = a.cache_key("celica", "");
        assert_eq!(base, a.cache_key("celica", ""));
        assert_ne!(base, a.cache_key("celica, smile", ""));
        assert_ne!(base, a.cache_key("", "celica"));
        assert_ne!(base, b.cache_key("celica", ""));
    }

    #[test]
    fn failed_reload_keeps_previous_snapshot() {
        let pipeline = Pipeline::default();
        pipeline
            .reload_sources(vec![("a.yaml".to_owned(), CELICA)])
            .unwrap();
        assert_eq!(pipeline.snapshot().rule_count(), 1);

        let result = pipeline.reload_sources(vec![("a.yaml".to_owned(), "- type: swap\n")]);
        assert!(result.is_err());
        assert_eq!(pipeline.snapshot().rule_count(), 1);

        let out = pipeline.transform("celica", "").unwrap();
        assert_eq!(out.positive, "celica, black hair");
    }
}
