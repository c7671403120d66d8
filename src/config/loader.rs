use crate::config::schema::{PatchSet, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse patch set TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse patch set TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid patch set ({}): {}", path.display(), source),
                None => write!(f, "invalid patch set: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

/// Parse and validate a patch set.
///
/// `search_file` / `replace_file` entries are resolved against the current
/// directory.
pub fn load_from_str(input: &str) -> Result<PatchSet, ConfigError> {
    parse(input, Path::new("."))
}

/// Read, parse and validate a patch set file.
///
/// `search_file` / `replace_file` entries are resolved against the directory
/// containing `path`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchSet, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text_root = path.parent().unwrap_or_else(|| Path::new("."));
    parse(&contents, text_root).map_err(|error| error.with_path(path))
}

fn parse(input: &str, text_root: &Path) -> Result<PatchSet, ConfigError> {
    let mut set: PatchSet = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    set.validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    inline_text_files(&mut set, text_root)?;
    Ok(set)
}

/// Replace `search_file` / `replace_file` references with their contents.
fn inline_text_files(set: &mut PatchSet, text_root: &Path) -> Result<(), ConfigError> {
    for patch in &mut set.patches {
        if let Some(file) = patch.search_file.take() {
            patch.search = Some(read_text(&text_root.join(file))?);
        }
        if let Some(file) = patch.replace_file.take() {
            patch.replace = Some(read_text(&text_root.join(file))?);
        }
    }
    Ok(())
}

fn read_text(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_inline_rule() {
        let set = load_from_str(
            r#"
[meta]
name = "inline"

[[patches]]
id = "swap"
file = "a.txt"
search = "old"
replace = "new"
on_missing = "warn"
on_multiple = "all"
"#,
        )
        .unwrap();

        assert_eq!(set.meta.name, "inline");
        assert!(!set.meta.workspace_relative);
        let rule = set.patches[0].rule();
        assert_eq!(rule.search, "old");
        assert_eq!(rule.on_missing, crate::patcher::MissingPolicy::Warn);
        assert_eq!(rule.on_multiple, crate::patcher::MatchPolicy::All);
    }

    #[test]
    fn test_text_files_resolved_next_to_patch_set() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.txt"), "old block\n").unwrap();
        fs::write(dir.path().join("new.txt"), "new block\n").unwrap();
        let set_path = dir.path().join("set.toml");
        fs::write(
            &set_path,
            r#"
[[patches]]
id = "from-files"
file = "target.txt"
search_file = "old.txt"
replace_file = "new.txt"
"#,
        )
        .unwrap();

        let set = load_from_path(&set_path).unwrap();
        let patch = &set.patches[0];
        assert_eq!(patch.search.as_deref(), Some("old block\n"));
        assert_eq!(patch.replace.as_deref(), Some("new block\n"));
        assert!(patch.search_file.is_none());
    }

    #[test]
    fn test_missing_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let set_path = dir.path().join("set.toml");
        fs::write(
            &set_path,
            r#"
[[patches]]
id = "from-files"
file = "target.txt"
search_file = "nope.txt"
replace = ""
"#,
        )
        .unwrap();

        let err = load_from_path(&set_path).unwrap_err();
        assert!(matches!(err, ConfigError::Io { ref path, .. } if path.ends_with("nope.txt")));
    }

    #[test]
    fn test_toml_error_carries_path() {
        let dir = tempfile::tempdir().unwrap();
        let set_path = dir.path().join("broken.toml");
        fs::write(&set_path, "[[patches]\nid = ").unwrap();

        let err = load_from_path(&set_path).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { path: Some(_), .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_validation_error() {
        let err = load_from_str("[meta]\nname = \"empty\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { path: None, .. }));
        assert!(err.to_string().contains("no patches"));
    }
}
