//! File system utilities.

use std::path::{Component, Path, PathBuf};

use directories::{BaseDirs, UserDirs};
use regex::{Captures, Regex};

use crate::error::Result;
use crate::models::{Config, SourceConfig};

/// Ensure a directory exists
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Expand `$VAR` / `${VAR}` from the environment; unknown variables are
/// left untouched.
pub fn expand_env_vars(input: &str) -> String {
    let Ok(pattern) = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
    else {
        return input.to_string();
    };
    pattern
        .replace_all(input, |caps: &Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(input: &str) -> PathBuf {
    let home = || BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
    if input == "~" {
        if let Some(home) = home() {
            return home;
        }
    } else if let Some(rest) = input.strip_prefix("~/") {
        if let Some(home) = home() {
            return home.join(rest);
        }
    }
    PathBuf::from(input)
}

/// Expand `~` and environment variables, resolve relative paths against
/// `base_dir`, and normalize `.` / `..` components lexically.
pub fn expand_path(raw: &str, base_dir: &Path) -> PathBuf {
    let expanded = expand_home(&expand_env_vars(raw.trim()));
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    };
    normalize(&joined)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// The user's Downloads directory, or `~/Downloads` when the platform
/// does not report one.
pub fn default_download_dir() -> PathBuf {
    UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
        .unwrap_or_else(|| expand_home("~/Downloads"))
}

/// Download folders for a source: its own list if set, otherwise the global
/// one. Entries are expanded with [`expand_path`]; blanks are skipped.
pub fn download_folders(config: &Config, source: &SourceConfig) -> Vec<PathBuf> {
    let raw = if source.download_folders.is_empty() {
        &config.download_folders
    } else {
        &source.download_folders
    };
    raw.iter()
        .filter(|folder| !folder.trim().is_empty())
        .map(|folder| expand_path(folder, &config.base_dir))
        .collect()
}

/// Split a comma-separated folder list as typed by a user.
pub fn parse_folder_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_dir_creates_nested() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("a/b/c");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_expand_env_vars_keeps_unknown() {
        assert_eq!(
            expand_env_vars("$ROMSCOUT_SURELY_UNSET/roms"),
            "$ROMSCOUT_SURELY_UNSET/roms"
        );
        let path = std::env::var("PATH").unwrap_or_default();
        assert_eq!(expand_env_vars("${PATH}"), path);
    }

    #[test]
    fn test_expand_path_relative_to_base() {
        let base = Path::new("/etc/romscout");
        assert_eq!(
            expand_path("./roms/../gb", base),
            PathBuf::from("/etc/romscout/gb")
        );
        assert_eq!(expand_path("/abs/roms", base), PathBuf::from("/abs/roms"));
    }

    #[test]
    fn test_download_folders_prefers_source() {
        let mut config = Config::sample();
        config.base_dir = PathBuf::from("/cfg");
        config.download_folders = vec!["global".into()];

        let mut source = config.sources[0].clone();
        source.download_folders = vec!["/roms/gb".into(), " ".into()];
        assert_eq!(
            download_folders(&config, &source),
            vec![PathBuf::from("/roms/gb")]
        );

        source.download_folders.clear();
        assert_eq!(
            download_folders(&config, &source),
            vec![PathBuf::from("/cfg/global")]
        );
    }

    #[test]
    fn test_parse_folder_list() {
        assert_eq!(
            parse_folder_list(" ~/roms , ,/mnt/gb"),
            vec!["~/roms".to_string(), "/mnt/gb".to_string()]
        );
        assert!(parse_folder_list("").is_empty());
    }
}
