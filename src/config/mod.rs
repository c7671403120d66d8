pub mod applicator;
pub mod loader;
pub mod schema;

pub use applicator::{apply_patch_set, check_patch_set, resolve_target, PatchOutcome};
pub use loader::{load_from_path, load_from_str, ConfigError};
pub use schema::{Metadata, PatchDefinition, PatchSet, ValidationError, ValidationIssue};
