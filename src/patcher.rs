//! Literal search-and-replace over whole documents.
//!
//! The transformation is a pure function, [`apply_rule`], over in-memory
//! content. [`apply_patch`] and [`check_patch`] wrap it with a single
//! [`SourceDocument`] load and (for `apply_patch`) a single persist.
//!
//! Match count is always computed and checked: a rule either matches exactly
//! once, or its [`MatchPolicy`] / [`MissingPolicy`] decides what happens.

use crate::document::{DocumentError, SourceDocument};
use crate::edit::{apply_edits, Edit, EditError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

/// What to do when the search text occurs more than once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Refuse to edit; the rule is ambiguous.
    #[default]
    Reject,
    /// Replace every occurrence.
    All,
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject" => Ok(MatchPolicy::Reject),
            "all" => Ok(MatchPolicy::All),
            other => Err(format!("unknown match policy '{other}' (expected reject or all)")),
        }
    }
}

/// What to do when the search text does not occur at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Fail with [`MatchError::NoMatch`].
    #[default]
    Error,
    /// Leave the content unchanged and log a warning.
    Warn,
    /// Leave the content unchanged.
    Ignore,
}

impl FromStr for MissingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(MissingPolicy::Error),
            "warn" => Ok(MissingPolicy::Warn),
            "ignore" => Ok(MissingPolicy::Ignore),
            other => Err(format!(
                "unknown missing policy '{other}' (expected error, warn or ignore)"
            )),
        }
    }
}

/// One literal substitution: replace `search` with `replacement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRule {
    pub search: String,
    pub replacement: String,
    pub on_multiple: MatchPolicy,
    pub on_missing: MissingPolicy,
    /// Report `AlreadyApplied` instead of consulting `on_missing` when the
    /// search text is absent and the replacement text is present.
    pub detect_applied: bool,
}

impl PatchRule {
    /// Rule with default policies: exactly one match required.
    pub fn new(search: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            search: search.into(),
            replacement: replacement.into(),
            on_multiple: MatchPolicy::default(),
            on_missing: MissingPolicy::default(),
            detect_applied: false,
        }
    }

    pub fn on_multiple(mut self, policy: MatchPolicy) -> Self {
        self.on_multiple = policy;
        self
    }

    pub fn on_missing(mut self, policy: MissingPolicy) -> Self {
        self.on_missing = policy;
        self
    }

    pub fn detect_applied(mut self, enabled: bool) -> Self {
        self.detect_applied = enabled;
        self
    }

    /// The rule that undoes this one.
    pub fn inverse(&self) -> Self {
        Self {
            search: self.replacement.clone(),
            replacement: self.search.clone(),
            ..self.clone()
        }
    }
}

/// Where the search text occurs in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "offsets", rename_all = "snake_case")]
pub enum MatchCount {
    NotFound,
    Single(usize),
    Multiple(Vec<usize>),
}

/// How a rule ended up affecting the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStatus {
    /// At least one span was replaced.
    Applied,
    /// Search text absent but replacement already present.
    AlreadyApplied,
    /// Search text absent and the missing policy allowed it.
    Unmatched,
}

impl fmt::Display for PatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchStatus::Applied => write!(f, "applied"),
            PatchStatus::AlreadyApplied => write!(f, "already applied"),
            PatchStatus::Unmatched => write!(f, "unmatched"),
        }
    }
}

/// Content after a rule ran, plus what happened.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchResult carries the patched content and should be checked"]
pub struct PatchResult {
    pub content: String,
    pub found: bool,
    pub replaced: usize,
    pub matches: MatchCount,
    pub status: PatchStatus,
}

impl PatchResult {
    pub fn changed(&self) -> bool {
        self.replaced > 0
    }
}

/// Failures of the pure transformation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("search text is empty")]
    EmptySearch,

    #[error("search text not found{}", near_miss_suffix(.hint))]
    NoMatch { hint: Option<NearMiss> },

    #[error("search text matched {count} locations, expected exactly 1")]
    AmbiguousMatch { count: usize, offsets: Vec<usize> },

    #[error("edit error: {0}")]
    Edit(#[from] EditError),
}

/// The line of a document most similar to the first line of a search block.
#[derive(Debug, Clone, PartialEq)]
pub struct NearMiss {
    /// 1-based line number
    pub line: usize,
    pub text: String,
    pub similarity: f64,
}

// strsim similarity is always within [0, 1], never NaN.
impl Eq for NearMiss {}

fn near_miss_suffix(hint: &Option<NearMiss>) -> String {
    match hint {
        Some(h) => format!(" (closest line {}: {:?})", h.line, h.text),
        None => String::new(),
    }
}

/// Failures of a rule applied to a file.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("{file}: {source}")]
    Match {
        file: PathBuf,
        #[source]
        source: MatchError,
    },

    #[error("{file}: not written because patch '{failed}' failed on the same file")]
    Aborted { file: PathBuf, failed: String },
}

impl PatchError {
    pub fn file(&self) -> Option<&Path> {
        match self {
            PatchError::Document(
                DocumentError::Read { path, .. }
                | DocumentError::Write { path, .. }
                | DocumentError::Encoding { path, .. }
                | DocumentError::ConcurrentModification { path },
            ) => Some(path.as_path()),
            PatchError::Match { file, .. } | PatchError::Aborted { file, .. } => {
                Some(file.as_path())
            }
        }
    }

    pub fn match_error(&self) -> Option<&MatchError> {
        match self {
            PatchError::Match { source, .. } => Some(source),
            PatchError::Document(_) | PatchError::Aborted { .. } => None,
        }
    }
}

const NEAR_MISS_THRESHOLD: f64 = 0.6;

/// Locate every non-overlapping occurrence of `search`, left to right.
pub fn find_matches(content: &str, search: &str) -> MatchCount {
    if search.is_empty() {
        return MatchCount::NotFound;
    }

    let mut offsets = content.match_indices(search).map(|(offset, _)| offset);
    match (offsets.next(), offsets.next()) {
        (None, _) => MatchCount::NotFound,
        (Some(first), None) => MatchCount::Single(first),
        (Some(first), Some(second)) => {
            let mut all = vec![first, second];
            all.extend(offsets);
            MatchCount::Multiple(all)
        }
    }
}

/// Apply `rule` to `content` without touching storage.
pub fn apply_rule(content: &str, rule: &PatchRule) -> Result<PatchResult, MatchError> {
    if rule.search.is_empty() {
        return Err(MatchError::EmptySearch);
    }

    let matches = find_matches(content, &rule.search);

    let offsets = match &matches {
        MatchCount::NotFound => return unmatched(content, rule),
        MatchCount::Single(offset) => vec![*offset],
        MatchCount::Multiple(offsets) => match rule.on_multiple {
            MatchPolicy::Reject => {
                return Err(MatchError::AmbiguousMatch {
                    count: offsets.len(),
                    offsets: offsets.clone(),
                })
            }
            MatchPolicy::All => offsets.clone(),
        },
    };

    let edits: Vec<Edit> = offsets
        .iter()
        .map(|&start| Edit::new(start, start + rule.search.len(), &rule.replacement, &rule.search))
        .collect();
    let replaced = edits.len();
    let content = apply_edits(content, edits)?;

    Ok(PatchResult {
        content,
        found: true,
        replaced,
        matches,
        status: PatchStatus::Applied,
    })
}

fn unmatched(content: &str, rule: &PatchRule) -> Result<PatchResult, MatchError> {
    let result = |status| PatchResult {
        content: content.to_string(),
        found: false,
        replaced: 0,
        matches: MatchCount::NotFound,
        status,
    };

    if rule.detect_applied && replacement_present(content, rule) {
        return Ok(result(PatchStatus::AlreadyApplied));
    }

    match rule.on_missing {
        MissingPolicy::Error => Err(MatchError::NoMatch {
            hint: near_miss(content, &rule.search),
        }),
        MissingPolicy::Warn => {
            warn!(
                search_len = rule.search.len(),
                "search text not found; content left unchanged"
            );
            Ok(result(PatchStatus::Unmatched))
        }
        MissingPolicy::Ignore => Ok(result(PatchStatus::Unmatched)),
    }
}

/// The replacement occurs as often as a previous run would have left it:
/// exactly once unless the rule replaces every match.
fn replacement_present(content: &str, rule: &PatchRule) -> bool {
    if rule.replacement.is_empty() {
        return false;
    }
    let occurrences = content.matches(rule.replacement.as_str()).count();
    match rule.on_multiple {
        MatchPolicy::Reject => occurrences == 1,
        MatchPolicy::All => occurrences > 0,
    }
}

/// Find the line most similar to the first non-blank line of `search`.
///
/// Diagnostic only: matching itself is always exact.
pub fn near_miss(content: &str, search: &str) -> Option<NearMiss> {
    let needle = search.lines().map(str::trim).find(|l| !l.is_empty())?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| (idx, line, strsim::normalized_levenshtein(line.trim(), needle)))
        .filter(|(_, _, score)| *score >= NEAR_MISS_THRESHOLD)
        .max_by(|a, b| a.2.total_cmp(&b.2))
        .map(|(idx, line, similarity)| NearMiss {
            line: idx + 1,
            text: line.trim().to_string(),
            similarity,
        })
}

/// Apply `rule` to the file at `path`, writing the result back.
///
/// The file is written only when at least one span was replaced.
pub fn apply_patch(path: impl AsRef<Path>, rule: &PatchRule) -> Result<PatchResult, PatchError> {
    let doc = SourceDocument::load(path)?;
    apply_document(&doc, rule)
}

/// Evaluate `rule` against the file at `path` without writing.
pub fn check_patch(path: impl AsRef<Path>, rule: &PatchRule) -> Result<PatchResult, PatchError> {
    let doc = SourceDocument::load(path)?;
    check_document(&doc, rule)
}

/// Apply `rule` to an already loaded document and persist the result.
///
/// `doc.content()` stays the text the rule was evaluated against.
pub fn apply_document(doc: &SourceDocument, rule: &PatchRule) -> Result<PatchResult, PatchError> {
    let result = check_document(doc, rule)?;

    if result.changed() {
        doc.persist(&result.content)?;
        info!(
            file = %doc.path().display(),
            replaced = result.replaced,
            "patch applied"
        );
    }

    Ok(result)
}

pub fn check_document(doc: &SourceDocument, rule: &PatchRule) -> Result<PatchResult, PatchError> {
    apply_rule(doc.content(), rule).map_err(|source| PatchError::Match {
        file: doc.path().to_path_buf(),
        source,
    })
}
