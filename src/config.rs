//! Viewer configuration
//!
//! Loaded from a JSON file; every field has a default so a partial (or
//! missing) file is fine.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decode::DEFAULT_THUMBNAIL_DIMENSION;
use crate::error::{CacheError, CacheResult};

/// Directory under the config dir holding `config.json`
const APP_DIR: &str = "texture-cache-viewer";
const CONFIG_FILE: &str = "config.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub thumbnails: ThumbnailConfig,
    pub logging: LoggingConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Index file of the cache. May reference environment variables
    /// (`%NAME%`, `$NAME`, `${NAME}`).
    pub location: String,
    /// List entries whose image is stored entirely in the data file
    pub include_inline: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Cap on the longer side of a thumbnail
    pub max_dimension: u32,
    /// Concurrent decodes; 0 = one per CPU
    pub workers: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter, overridden by `RUST_LOG`
    pub level: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            location: default_location().to_string_lossy().into_owned(),
            include_inline: false,
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_THUMBNAIL_DIMENSION,
            workers: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// `<local data dir>/Catznip64/texturecache/texture.entries`
pub fn default_location() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("Catznip64");
    path.push("texturecache");
    path.push("texture.entries");
    path
}

/// Where the config file is looked for when none is given explicitly
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the per-user config file is
    /// used if present, otherwise defaults.
    pub fn load(explicit: Option<&Path>) -> CacheResult<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => {
                    debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> CacheResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| CacheError::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        let config = Self::from_json(&contents).map_err(|e| CacheError::Config {
            message: format!("{}: {}", path.display(), e),
        })?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str(contents)
    }

    /// Cache location with environment references expanded.
    pub fn cache_location(&self) -> PathBuf {
        PathBuf::from(expand_env(&self.cache.location, |name| env::var(name).ok()))
    }
}

/// Replace `%NAME%`, `$NAME` and `${NAME}` with values from `lookup`.
///
/// References to unknown variables, and unterminated ones, are kept as
/// written.
pub fn expand_env<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find(['%', '$']) {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        let (name, consumed) = if let Some(after) = tail.strip_prefix('%') {
            match after.find('%') {
                Some(end) if end > 0 => (Some(&after[..end]), end + 2),
                _ => (None, 1),
            }
        } else if let Some(after) = tail.strip_prefix("${") {
            match after.find('}') {
                Some(end) if end > 0 => (Some(&after[..end]), end + 3),
                _ => (None, 1),
            }
        } else {
            let after = &tail[1..];
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            if end > 0 {
                (Some(&after[..end]), end + 1)
            } else {
                (None, 1)
            }
        };

        match name.and_then(|n| lookup(n)) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&tail[..consumed]),
        }
        rest = &tail[consumed..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn vars(name: &str) -> Option<String> {
        match name {
            "LOCALAPPDATA" => Some("C:\\Users\\me\\AppData\\Local".to_string()),
            "HOME" => Some("/home/me".to_string()),
            _ => None,
        }
    }

    #[rstest]
    #[case("%LOCALAPPDATA%\\Catznip64", "C:\\Users\\me\\AppData\\Local\\Catznip64")]
    #[case("$HOME/cache", "/home/me/cache")]
    #[case("${HOME}cache", "/home/mecache")]
    #[case("%MISSING%/x", "%MISSING%/x")]
    #[case("$MISSING/x", "$MISSING/x")]
    #[case("100%", "100%")]
    #[case("cost $5", "cost $5")]
    #[case("${unterminated", "${unterminated")]
    #[case("plain/path", "plain/path")]
    fn test_expand_env(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(expand_env(input, vars), expected);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config = Config::from_json(r#"{ "thumbnails": { "workers": 4 } }"#).unwrap();
        assert_eq!(config.thumbnails.workers, 4);
        assert_eq!(config.thumbnails.max_dimension, DEFAULT_THUMBNAIL_DIMENSION);
        assert!(!config.cache.include_inline);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn test_default_location_ends_in_index_file() {
        let location = default_location();
        assert!(location.ends_with("Catznip64/texturecache/texture.entries"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "cache": { "location": "/tmp/cache/texture.entries", "include_inline": true } }"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert!(config.cache.include_inline);
        assert_eq!(config.cache_location(), PathBuf::from("/tmp/cache/texture.entries"));
    }

    #[test]
    fn test_missing_explicit_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.json"))).unwrap_err();
        assert!(matches!(err, CacheError::Config { .. }));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(CacheError::Config { .. })
        ));
    }
}
