// SPDX-License-Identifier: MIT OR Apache-2.0
//! Microcrate for portable executable discovery in `PATH`.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A path search failed to find an executable file.
///
/// This is the sentinel callers match on to tell "the binary does not exist"
/// apart from every other way a process can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("exec: {name:?}: executable file not found in $PATH")]
pub struct NotFoundError {
    /// The name that was looked up.
    pub name: String,
}

impl NotFoundError {
    /// Create the error for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Search for an executable named `name` in the directories listed in `PATH`.
///
/// If `name` contains a path separator it is tried directly and `PATH` is not
/// consulted. Only regular files with an executable bit (on Unix) qualify.
pub fn look_path(name: &str) -> Result<PathBuf, NotFoundError> {
    which(name).ok_or_else(|| NotFoundError::new(name))
}

/// Locate an executable by name, similarly to shell `which`.
///
/// If `bin` contains path separators, it is treated as a direct path.
pub fn which(bin: &str) -> Option<PathBuf> {
    if bin.is_empty() {
        return None;
    }

    let candidate = Path::new(bin);
    if has_path(candidate) {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    search_path(&path, bin)
}

/// Search the directories of a `PATH`-style list. Relative entries, the empty
/// one included, are skipped so a hit is always an absolute path.
fn search_path(path: &OsStr, bin: &str) -> Option<PathBuf> {
    std::env::split_paths(path)
        .filter(|dir| dir.is_absolute())
        .find_map(|dir| resolve_in_dir(&dir, bin))
}

/// Return `true` when an executable can be resolved from PATH or explicit path.
pub fn command_exists(command: &str) -> bool {
    which(command).is_some()
}

fn has_path(candidate: &Path) -> bool {
    candidate.components().count() > 1
}

fn resolve_in_dir(dir: &Path, command: &str) -> Option<PathBuf> {
    let direct = dir.join(command);
    if is_executable(&direct) {
        return Some(direct);
    }

    if !cfg!(windows) {
        return None;
    }

    [".exe", ".cmd", ".bat", ".com"]
        .into_iter()
        .map(|ext| dir.join(format!("{command}{ext}")))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
