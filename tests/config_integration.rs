//! Integration tests for patch sets
//!
//! Loads the bundled contact-rescheduling patch set and applies it to a
//! copy of the Java provider it was written for.

use literal_patcher::config::{apply_patch_set, check_patch_set, load_from_path, load_from_str};
use literal_patcher::{MatchError, PatchStatus};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PROVIDER: &str =
    "src/main/java/pe/unmsm/crm/marketing/campanas/telefonicas/infra/jpa/JpaCampaignDataProvider.java";

fn manifest_path(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(relative)
}

/// Helper to create a workspace holding the unpatched provider
fn setup_java_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join(PROVIDER);
    fs::create_dir_all(target.parent().unwrap()).unwrap();
    fs::copy(
        manifest_path("tests/fixtures/JpaCampaignDataProvider.java"),
        &target,
    )
    .unwrap();
    dir
}

#[test]
fn test_load_bundled_patch_set() {
    let set = load_from_path(manifest_path("patches/contact-rescheduling.toml")).unwrap();

    assert_eq!(set.meta.name, "contact-rescheduling");
    assert!(set.meta.workspace_relative);
    assert_eq!(set.patches.len(), 1);

    let rule = set.patches[0].rule();
    assert!(rule.search.starts_with("                        contacto.setEstadoEnCola"));
    assert!(rule.replacement.contains("REAGENDAR"));
    assert!(rule.replacement.ends_with("colaRepo.save(contacto);"));
}

#[test]
fn test_apply_rescheduling_patch() {
    let workspace = setup_java_workspace();
    let set = load_from_path(manifest_path("patches/contact-rescheduling.toml")).unwrap();
    let original = fs::read_to_string(workspace.path().join(PROVIDER)).unwrap();

    let results = apply_patch_set(&set, workspace.path());
    assert_eq!(results.len(), 1);
    let (id, outcome) = &results[0];
    assert_eq!(id, "reschedule-instead-of-complete");
    let result = outcome.as_ref().unwrap();
    assert_eq!(result.status, PatchStatus::Applied);
    assert_eq!(result.replaced, 1);

    let patched = fs::read_to_string(workspace.path().join(PROVIDER)).unwrap();
    assert!(patched.contains("if (request.getFechaReagendamiento() != null) {"));
    assert!(patched.contains("contacto.setEstadoEnCola(\"PENDIENTE\");"));
    assert!(patched.contains("// Liberar asignación"));

    // Everything outside the block is untouched.
    let rule = set.patches[0].rule();
    let (head, tail) = original.split_once(rule.search.as_str()).unwrap();
    assert!(patched.starts_with(head));
    assert!(patched.ends_with(tail));
}

#[test]
fn test_rescheduling_patch_idempotent() {
    let workspace = setup_java_workspace();
    let set = load_from_path(manifest_path("patches/contact-rescheduling.toml")).unwrap();

    let _ = apply_patch_set(&set, workspace.path());
    let once = fs::read_to_string(workspace.path().join(PROVIDER)).unwrap();

    let results = apply_patch_set(&set, workspace.path());
    assert_eq!(
        results[0].1.as_ref().unwrap().status,
        PatchStatus::AlreadyApplied
    );
    assert_eq!(
        fs::read_to_string(workspace.path().join(PROVIDER)).unwrap(),
        once
    );
}

#[test]
fn test_check_reports_without_writing() {
    let workspace = setup_java_workspace();
    let set = load_from_path(manifest_path("patches/contact-rescheduling.toml")).unwrap();
    let original = fs::read_to_string(workspace.path().join(PROVIDER)).unwrap();

    let results = check_patch_set(&set, workspace.path());

    assert_eq!(results[0].1.as_ref().unwrap().status, PatchStatus::Applied);
    assert_eq!(
        fs::read_to_string(workspace.path().join(PROVIDER)).unwrap(),
        original
    );
}

#[test]
fn test_reformatted_target_is_a_conflict() {
    let workspace = setup_java_workspace();
    let target = workspace.path().join(PROVIDER);
    let reindented = fs::read_to_string(&target)
        .unwrap()
        .replace("                        colaRepo.save", "                colaRepo.save");
    fs::write(&target, &reindented).unwrap();

    let set = load_from_path(manifest_path("patches/contact-rescheduling.toml")).unwrap();
    let results = apply_patch_set(&set, workspace.path());

    let err = results[0].1.as_ref().unwrap_err();
    match err.match_error() {
        Some(MatchError::NoMatch { hint: Some(hint) }) => {
            assert!(hint.text.contains("setEstadoEnCola(\"COMPLETADO\")"));
        }
        other => panic!("expected NoMatch with hint, got {other:?}"),
    }
    assert_eq!(fs::read_to_string(&target).unwrap(), reindented);
}

#[test]
fn test_duplicate_block_rejected_unless_all() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("twice.txt"), "x = 1;\nx = 1;\n").unwrap();

    let strict = load_from_str(
        r#"
[meta]
workspace_relative = true

[[patches]]
id = "strict"
file = "twice.txt"
search = "x = 1;"
replace = "x = 2;"
"#,
    )
    .unwrap();
    let results = apply_patch_set(&strict, dir.path());
    assert!(matches!(
        results[0].1.as_ref().unwrap_err().match_error(),
        Some(MatchError::AmbiguousMatch { count: 2, .. })
    ));

    let all = load_from_str(
        r#"
[meta]
workspace_relative = true

[[patches]]
id = "all"
file = "twice.txt"
search = "x = 1;"
replace = "x = 2;"
on_multiple = "all"
"#,
    )
    .unwrap();
    let results = apply_patch_set(&all, dir.path());
    assert_eq!(results[0].1.as_ref().unwrap().replaced, 2);
    assert_eq!(
        fs::read_to_string(dir.path().join("twice.txt")).unwrap(),
        "x = 2;\nx = 2;\n"
    );
}

#[test]
fn test_rerun_without_detect_applied_is_a_conflict() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.txt"), "alpha\n").unwrap();

    let set = load_from_str(
        r#"
[meta]
workspace_relative = true

[[patches]]
id = "rename"
file = "a.txt"
search = "alpha"
replace = "beta"
"#,
    )
    .unwrap();

    assert!(apply_patch_set(&set, dir.path())[0].1.is_ok());
    let results = apply_patch_set(&set, dir.path());
    assert!(matches!(
        results[0].1.as_ref().unwrap_err().match_error(),
        Some(MatchError::NoMatch { .. })
    ));
}

#[test]
fn test_missing_policy_warn_in_patch_set() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.txt"), "alpha\n").unwrap();

    let set = load_from_str(
        r#"
[meta]
workspace_relative = true

[[patches]]
id = "optional"
file = "a.txt"
search = "gamma"
replace = "delta"
on_missing = "warn"
"#,
    )
    .unwrap();
    let results = apply_patch_set(&set, dir.path());

    let result = results[0].1.as_ref().unwrap();
    assert_eq!(result.status, PatchStatus::Unmatched);
    assert!(!result.found);
    assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "alpha\n");
}
