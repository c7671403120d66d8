//! Literal Patcher: literal text patching for source files
//!
//! Replaces an exact block of text in a file with another block, treating the
//! file as opaque UTF-8 text. No syntax is parsed.
//!
//! # Architecture
//!
//! The transformation is a pure function, [`apply_rule`], from content and a
//! [`PatchRule`] to a [`PatchResult`]. Matched spans compile down to [`Edit`]s,
//! verified byte-span replacements. File access is confined to
//! [`SourceDocument`], which reads a file once and writes it once.
//!
//! # Safety
//!
//! - Match count is always checked: zero or several matches never pass silently
//! - Atomic file writes (tempfile + fsync + rename)
//! - Concurrent modification between read and write is detected
//! - UTF-8 validation
//! - Idempotent re-application (`AlreadyApplied`)
//!
//! # Example
//!
//! ```
//! use literal_patcher::{apply_rule, PatchRule, PatchStatus};
//!
//! let rule = PatchRule::new("B", "B2\nB3");
//! let result = apply_rule("A\nB\nC", &rule).unwrap();
//!
//! assert_eq!(result.content, "A\nB2\nB3\nC");
//! assert_eq!(result.status, PatchStatus::Applied);
//! ```

pub mod config;
pub mod document;
pub mod edit;
pub mod patcher;

// Re-exports
pub use config::{
    apply_patch_set, check_patch_set, load_from_path, load_from_str, ConfigError, PatchSet,
};
pub use document::{DocumentError, SourceDocument};
pub use edit::{apply_edits, Edit, EditError, EditVerification};
pub use patcher::{
    apply_document, apply_patch, apply_rule, check_document, check_patch, find_matches,
    MatchCount, MatchError, MatchPolicy, MissingPolicy, NearMiss, PatchError, PatchResult,
    PatchRule, PatchStatus,
};
