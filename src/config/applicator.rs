//! Patch set applicator
//!
//! Applies every patch in a [`PatchSet`]:
//! - Patches are grouped by target file
//! - Each file is read once, its patches applied in declaration order
//! - Each file is written at most once, and only if every patch on it succeeded
//! - Results are reported per patch, in declaration order

use crate::config::schema::{PatchDefinition, PatchSet};
use crate::document::{DocumentError, SourceDocument};
use crate::patcher::{apply_rule, PatchError, PatchResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Outcome for one patch, keyed by its id.
pub type PatchOutcome = (String, Result<PatchResult, PatchError>);

/// Apply a patch set, writing changed files.
///
/// When `meta.workspace_relative` is set, patch files are resolved against
/// `base_dir`; otherwise they are used as given.
pub fn apply_patch_set(set: &PatchSet, base_dir: &Path) -> Vec<PatchOutcome> {
    run_patch_set(set, base_dir, true)
}

/// Evaluate a patch set without writing anything.
///
/// Result semantics match [`apply_patch_set`]: `Applied` means "would apply".
pub fn check_patch_set(set: &PatchSet, base_dir: &Path) -> Vec<PatchOutcome> {
    run_patch_set(set, base_dir, false)
}

/// Resolve the target path of a patch.
pub fn resolve_target(set: &PatchSet, patch: &PatchDefinition, base_dir: &Path) -> PathBuf {
    if set.meta.workspace_relative {
        base_dir.join(&patch.file)
    } else {
        PathBuf::from(&patch.file)
    }
}

fn run_patch_set(set: &PatchSet, base_dir: &Path, write: bool) -> Vec<PatchOutcome> {
    let mut patches_by_file: HashMap<PathBuf, Vec<&PatchDefinition>> = HashMap::new();
    for patch in &set.patches {
        patches_by_file
            .entry(resolve_target(set, patch, base_dir))
            .or_default()
            .push(patch);
    }

    let mut all_results = Vec::with_capacity(set.patches.len());
    for (file_path, patches) in patches_by_file {
        all_results.extend(run_file(&file_path, &patches, write));
    }

    // Restore declaration order; HashMap iteration is unordered.
    let patch_order: HashMap<&str, usize> = set
        .patches
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id.as_str(), i))
        .collect();
    all_results.sort_by_key(|(id, _)| patch_order.get(id.as_str()).copied().unwrap_or(usize::MAX));

    all_results
}

fn run_file(file_path: &Path, patches: &[&PatchDefinition], write: bool) -> Vec<PatchOutcome> {
    let doc = match SourceDocument::load(file_path) {
        Ok(doc) => doc,
        Err(err) => {
            return patches
                .iter()
                .map(|patch| (patch.id.clone(), Err(PatchError::Document(replicate(&err)))))
                .collect();
        }
    };

    let mut content = doc.content().to_string();
    let mut results = Vec::with_capacity(patches.len());
    let mut first_failure: Option<String> = None;

    for patch in patches {
        match apply_rule(&content, &patch.rule()) {
            Ok(result) => {
                debug!(patch = %patch.id, status = %result.status, "patch evaluated");
                content.clone_from(&result.content);
                results.push((patch.id.clone(), Ok(result)));
            }
            Err(source) => {
                first_failure.get_or_insert_with(|| patch.id.clone());
                results.push((
                    patch.id.clone(),
                    Err(PatchError::Match {
                        file: file_path.to_path_buf(),
                        source,
                    }),
                ));
            }
        }
    }

    if let Some(failed) = first_failure {
        // Nothing is written; successful siblings must not claim otherwise.
        return results
            .into_iter()
            .map(|(id, outcome)| match outcome {
                Ok(_) => (
                    id,
                    Err(PatchError::Aborted {
                        file: file_path.to_path_buf(),
                        failed: failed.clone(),
                    }),
                ),
                err => (id, err),
            })
            .collect();
    }

    let changed = results
        .iter()
        .any(|(_, outcome)| matches!(outcome, Ok(result) if result.changed()));

    if write && changed {
        if let Err(err) = doc.persist(&content) {
            return patches
                .iter()
                .map(|patch| (patch.id.clone(), Err(PatchError::Document(replicate(&err)))))
                .collect();
        }
        info!(file = %file_path.display(), patches = patches.len(), "patched file");
    }

    results
}

/// Copy a document error for each patch sharing the failed file.
///
/// `std::io::Error` is not `Clone`, so kind and message are carried over.
fn replicate(err: &DocumentError) -> DocumentError {
    let copy_io = |source: &std::io::Error| std::io::Error::new(source.kind(), source.to_string());
    match err {
        DocumentError::Read { path, source } => DocumentError::Read {
            path: path.clone(),
            source: copy_io(source),
        },
        DocumentError::Write { path, source } => DocumentError::Write {
            path: path.clone(),
            source: copy_io(source),
        },
        DocumentError::Encoding { path, source } => DocumentError::Encoding {
            path: path.clone(),
            source: *source,
        },
        DocumentError::ConcurrentModification { path } => {
            DocumentError::ConcurrentModification { path: path.clone() }
        }
    }
}
