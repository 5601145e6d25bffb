use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HomeDirError {
    #[error("cannot determine the user home directory ({0} is not set)")]
    MissingEnv(&'static str),

    #[error("cannot resolve the current directory: {0}")]
    CurrentDir(#[source] std::io::Error),

    #[error("failed to create home directory '{path}': {source}")]
    Create {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(target_os = "windows")]
const BASE_ENV: &str = "APPDATA";
#[cfg(not(target_os = "windows"))]
const BASE_ENV: &str = "HOME";

/// Resolve the application home directory.
///
/// - `None` selects the platform default: `%APPDATA%/<subdir>` on Windows,
///   `$HOME/<subdir>` elsewhere.
/// - A leading `~` is expanded against the user home.
/// - Relative paths are made absolute against the current directory.
///
/// When `create` is set the directory is created if missing.
pub fn resolve_home_dir(
    configured: Option<String>,
    default_subdir: &str,
    create: bool,
) -> Result<PathBuf, HomeDirError> {
    let path = match configured {
        Some(raw) => expand_tilde(raw.trim())?,
        None => base_dir()?.join(default_subdir),
    };

    let path = if path.is_absolute() {
        path
    } else {
        env::current_dir()
            .map_err(HomeDirError::CurrentDir)?
            .join(path)
    };

    if create {
        std::fs::create_dir_all(&path).map_err(|source| HomeDirError::Create {
            path: path.to_string_lossy().to_string(),
            source,
        })?;
    }

    Ok(path)
}

fn base_dir() -> Result<PathBuf, HomeDirError> {
    env::var_os(BASE_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .ok_or(HomeDirError::MissingEnv(BASE_ENV))
}

fn user_home() -> Result<PathBuf, HomeDirError> {
    #[cfg(target_os = "windows")]
    const HOME_ENV: &str = "USERPROFILE";
    #[cfg(not(target_os = "windows"))]
    const HOME_ENV: &str = "HOME";

    env::var_os(HOME_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .ok_or(HomeDirError::MissingEnv(HOME_ENV))
}

fn expand_tilde(raw: &str) -> Result<PathBuf, HomeDirError> {
    if raw == "~" {
        return user_home();
    }
    match raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\")) {
        Some(rest) => Ok(user_home()?.join(rest)),
        None => Ok(Path::new(raw).to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn absolute_path_is_kept_and_created() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("nested").join("home");

        let resolved =
            resolve_home_dir(Some(target.to_string_lossy().to_string()), ".x", true).unwrap();

        assert_eq!(resolved, target);
        assert!(resolved.is_dir());
    }

    #[test]
    fn relative_path_becomes_absolute() {
        let resolved = resolve_home_dir(Some("relative/home".into()), ".x", false).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("relative/home"));
    }

    #[test]
    fn plain_path_is_not_expanded() {
        assert_eq!(expand_tilde("/srv/carebook").unwrap(), PathBuf::from("/srv/carebook"));
        assert_eq!(expand_tilde("a~b").unwrap(), PathBuf::from("a~b"));
    }
}
