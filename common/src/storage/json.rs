use std::{fs, path::Path};

use anyhow::Context;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::AppError;

/// Reads a whole JSON artifact into memory.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading JSON artifact at {}", path.display()))?;
    let parsed = serde_json::from_str(&raw)
        .with_context(|| format!("parsing JSON artifact at {}", path.display()))?;
    Ok(parsed)
}

/// Writes an artifact as pretty-printed JSON, creating parent directories.
pub fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating parent directory for {}", path.display()))?;
    }
    let serialized = serde_json::to_string_pretty(data)?;
    fs::write(path, serialized)
        .with_context(|| format!("writing JSON artifact to {}", path.display()))?;
    Ok(())
}

/// Deletes an artifact if it exists. Missing files are not an error.
pub fn remove_if_exists(path: &Path) -> Result<(), AppError> {
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("removing JSON artifact at {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        question: String,
        answers: Vec<String>,
    }

    #[test]
    fn round_trips_artifacts_and_creates_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/sample.json");
        let sample = Sample {
            question: "who wrote dracula".into(),
            answers: vec!["Bram Stoker".into()],
        };

        save_json(&path, &sample).expect("save");
        let loaded: Sample = load_json(&path).expect("load");
        assert_eq!(loaded, sample);
    }

    #[test]
    fn remove_if_exists_tolerates_missing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing.json");
        remove_if_exists(&path).expect("missing file is fine");

        std::fs::write(&path, b"[]").expect("write");
        remove_if_exists(&path).expect("removal");
        assert!(!path.exists());
    }
}
