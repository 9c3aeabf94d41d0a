//! Command handlers - extracted from main.rs for testability
//!
//! Each handler returns the text to print so tests can check it without
//! capturing stdout.

pub mod baseline;
pub mod render;
pub mod validate;

pub use baseline::{execute_baseline, render_baseline_table};
pub use render::{execute_render, render_result};
pub use validate::{execute_validate, load_options};

use crate::error::{CliError, CliResult};
use serde::de::DeserializeOwned;
use std::path::Path;

/// File formats accepted for options and results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// `.yaml` or `.yml`
    Yaml,
    /// `.json`
    Json,
}

impl FileFormat {
    /// Detect from the file extension
    pub fn from_path(path: &Path) -> CliResult<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("json") => Ok(Self::Json),
            _ => Err(CliError::invalid_argument(format!(
                "{}: expected a .yaml, .yml, or .json file",
                path.display()
            ))),
        }
    }
}

/// Read and deserialize a YAML or JSON file
pub fn load_file<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let format = FileFormat::from_path(path)?;
    let content = std::fs::read_to_string(path)?;
    let display = path.display().to_string();
    match format {
        FileFormat::Yaml => {
            serde_yaml_ng::from_str(&content).map_err(|e| CliError::parse(display, e.to_string()))
        }
        FileFormat::Json => {
            serde_json::from_str(&content).map_err(|e| CliError::parse(display, e.to_string()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    mod format_tests {
        use super::*;

        #[test]
        fn test_detects_by_extension() {
            assert_eq!(FileFormat::from_path(Path::new("a.yaml")).unwrap(), FileFormat::Yaml);
            assert_eq!(FileFormat::from_path(Path::new("a.YML")).unwrap(), FileFormat::Yaml);
            assert_eq!(FileFormat::from_path(Path::new("a.json")).unwrap(), FileFormat::Json);
        }

        #[test]
        fn test_unknown_extension_rejected() {
            let err = FileFormat::from_path(&PathBuf::from("a.toml")).unwrap_err();
            assert!(err.to_string().contains("expected a .yaml"));
            assert!(FileFormat::from_path(Path::new("noext")).is_err());
        }
    }

    mod load_tests {
        use super::*;

        #[test]
        fn test_parse_error_names_file() {
            let tmp = tempfile::tempdir().unwrap();
            let path = tmp.path().join("bad.json");
            std::fs::write(&path, "{ not json").unwrap();
            let err = load_file::<serde_json::Value>(&path).unwrap_err();
            assert!(matches!(err, CliError::Parse { .. }));
            assert!(err.to_string().contains("bad.json"));
        }

        #[test]
        fn test_missing_file_is_io_error() {
            let err = load_file::<serde_json::Value>(Path::new("/nonexistent/x.yaml")).unwrap_err();
            assert!(matches!(err, CliError::Io(_)));
        }
    }
}
