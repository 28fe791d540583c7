//! Reading key files and scripts named in configuration.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};

use super::ConfigError;

/// Expands a leading `~/` (or a bare `~`) to the user's home directory.
///
/// When `HOME` is unset the input is returned unchanged.
///
/// # Examples
///
/// ```
/// # use burrow::config::expand_tilde;
/// assert_eq!(expand_tilde("/etc/burrow.toml"), "/etc/burrow.toml");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    let Some(home) = std::env::var_os("HOME") else {
        return path.to_owned();
    };
    if path == "~" {
        return home.to_string_lossy().into_owned();
    }
    path.strip_prefix("~/").map_or_else(
        || path.to_owned(),
        |rest| format!("{}/{rest}", home.to_string_lossy()),
    )
}

/// Reads a UTF-8 file after tilde expansion.
///
/// # Errors
///
/// Returns [`ConfigError::LocalFile`] when the path has no file name or the
/// file cannot be read.
pub fn read_local_file(path: &str) -> Result<String, ConfigError> {
    let expanded = expand_tilde(path);
    let target = Utf8Path::new(&expanded);
    let failure = |message: String| ConfigError::LocalFile {
        path: expanded.clone(),
        message,
    };
    let file_name = target
        .file_name()
        .ok_or_else(|| failure(String::from("path has no file name")))?;
    let parent = target
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| failure(err.to_string()))?;
    dir.read_to_string(file_name)
        .map_err(|err| failure(err.to_string()))
}
