use crate::patcher::{MatchPolicy, MissingPolicy, PatchRule};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchSet {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

impl PatchSet {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        let mut seen = HashSet::new();
        for patch in &self.patches {
            let patch_id = if patch.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: None,
                    field: "id",
                });
                None
            } else {
                if !seen.insert(patch.id.as_str()) {
                    issues.push(ValidationIssue::DuplicateId {
                        patch_id: patch.id.clone(),
                    });
                }
                Some(patch.id.clone())
            };

            if patch.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: patch_id.clone(),
                    field: "file",
                });
            }

            match (&patch.search, &patch.search_file) {
                (Some(search), None) => {
                    if search.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: patch_id.clone(),
                            field: "search",
                        });
                    }
                }
                (None, Some(_)) => {}
                (None, None) => issues.push(ValidationIssue::MissingField {
                    patch_id: patch_id.clone(),
                    field: "search",
                }),
                (Some(_), Some(_)) => issues.push(ValidationIssue::InvalidCombo {
                    patch_id: patch_id.clone(),
                    message: "search and search_file cannot both be set".to_string(),
                }),
            }

            match (&patch.replace, &patch.replace_file) {
                (Some(_), None) | (None, Some(_)) => {}
                (None, None) => issues.push(ValidationIssue::MissingField {
                    patch_id: patch_id.clone(),
                    field: "replace",
                }),
                (Some(_), Some(_)) => issues.push(ValidationIssue::InvalidCombo {
                    patch_id: patch_id.clone(),
                    message: "replace and replace_file cannot both be set".to_string(),
                }),
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Resolve each patch's `file` against the base directory given at apply time.
    #[serde(default)]
    pub workspace_relative: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatchDefinition {
    pub id: String,
    pub file: String,
    /// Exact text to search for
    #[serde(default)]
    pub search: Option<String>,
    /// File holding the exact text to search for
    #[serde(default)]
    pub search_file: Option<PathBuf>,
    #[serde(default)]
    pub replace: Option<String>,
    #[serde(default)]
    pub replace_file: Option<PathBuf>,
    #[serde(default)]
    pub on_missing: MissingPolicy,
    #[serde(default)]
    pub on_multiple: MatchPolicy,
    /// Treat a present replacement as a previous run of this patch.
    #[serde(default)]
    pub detect_applied: bool,
}

impl PatchDefinition {
    /// Build the literal rule for this patch.
    ///
    /// Text files must already have been inlined by the loader.
    pub fn rule(&self) -> PatchRule {
        PatchRule::new(
            self.search.clone().unwrap_or_default(),
            self.replace.clone().unwrap_or_default(),
        )
        .on_missing(self.on_missing)
        .on_multiple(self.on_multiple)
        .detect_applied(self.detect_applied)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatchList,
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    DuplicateId {
        patch_id: String,
    },
    InvalidCombo {
        patch_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "patch set contains no patches"),
            ValidationIssue::MissingField { patch_id, field } => match patch_id {
                Some(id) => write!(f, "patch '{id}' missing required field '{field}'"),
                None => write!(f, "patch missing required field '{field}'"),
            },
            ValidationIssue::DuplicateId { patch_id } => {
                write!(f, "patch id '{patch_id}' is used more than once")
            }
            ValidationIssue::InvalidCombo { patch_id, message } => match patch_id {
                Some(id) => write!(f, "patch '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid patch configuration: {message}"),
            },
        }
    }
}
