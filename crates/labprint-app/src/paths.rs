// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Config-file location and upload staging.

use std::path::{Path, PathBuf};

use labprint_core::error::{LabprintError, Result};
use uuid::Uuid;

/// Default config file: `$XDG_CONFIG_HOME/labprint/config.json`, falling
/// back to `~/.config`, then the working directory.
pub fn default_config_path() -> PathBuf {
    config_base().join("labprint").join("config.json")
}

fn config_base() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config");
    }
    PathBuf::from(".")
}

/// Copy `file` into `upload_dir` as `<uuid>_<name>`.
///
/// The pipeline deletes its input when a job ends, so the user's file is
/// never handed over directly. Returns the staged path and original name.
pub fn stage_upload(file: &Path, upload_dir: &Path) -> Result<(PathBuf, String)> {
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| LabprintError::InvalidOptions(format!("not a file: {}", file.display())))?
        .to_string();
    std::fs::create_dir_all(upload_dir)?;
    let staged = upload_dir.join(format!("{}_{name}", Uuid::new_v4().simple()));
    std::fs::copy(file, &staged)
        .map_err(|e| LabprintError::InvalidOptions(format!("cannot read {}: {e}", file.display())))?;
    Ok((staged, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_copy_keeps_name_and_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("Lab Report.docx");
        std::fs::write(&source, "x").expect("write");
        let uploads = dir.path().join("uploads");

        let (staged, name) = stage_upload(&source, &uploads).expect("stage");
        assert_eq!(name, "Lab Report.docx");
        assert!(staged.starts_with(&uploads));
        assert!(staged.to_string_lossy().ends_with("_Lab Report.docx"));
        assert_eq!(staged.extension().and_then(|e| e.to_str()), Some("docx"));
        assert!(source.exists());
    }

    #[test]
    fn missing_source_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(stage_upload(&dir.path().join("nope.pdf"), dir.path()).is_err());
    }
}
