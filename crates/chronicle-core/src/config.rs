//! Configuration loading for the hook runtime.
//!
//! Resolution order, lowest to highest priority: built-in defaults → the
//! TOML file at `<install>/chronicle.toml` → a small documented set of
//! process environment variables. The loader never panics; a malformed
//! file or env value is logged and the lower-priority value is kept.

use crate::error::{ChronicleError, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

const CONFIG_FILE_NAME: &str = "chronicle.toml";
const DEFAULT_LOCAL_DB_NAME: &str = "chronicle.db";

/// Returns `<install>`, the Chronicle data/config root (`~/.chronicle`).
pub fn install_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".chronicle"))
}

fn config_file_path() -> Option<PathBuf> {
    install_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    primary: FilePrimary,
    local: FileLocal,
    max_payload_bytes: Option<usize>,
    hook_timeout_ms: Option<u64>,
    sanitize: FileSanitize,
    log: FileLog,
    auto_approve: FileAutoApprove,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FilePrimary {
    url: Option<String>,
    key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileLocal {
    path: Option<PathBuf>,
    enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileSanitize {
    patterns: Option<Vec<String>>,
    path_anon: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileLog {
    level: Option<String>,
    silent: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileAutoApprove {
    allow: Option<Vec<String>>,
    deny: Option<Vec<String>>,
}

/// A read-only typed view over the resolved settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub primary_url: Option<String>,
    pub primary_key: Option<String>,
    pub local_path: PathBuf,
    pub local_enabled: bool,
    pub max_payload_bytes: usize,
    pub hook_timeout_ms: u64,
    pub sanitize_patterns: Vec<String>,
    pub sanitize_path_anon: bool,
    pub log_level: String,
    pub log_silent: bool,
    pub auto_approve_allow: Vec<String>,
    pub auto_approve_deny: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let local_path = install_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("data")
            .join(DEFAULT_LOCAL_DB_NAME);

        Self {
            primary_url: None,
            primary_key: None,
            local_path,
            local_enabled: true,
            max_payload_bytes: 1_048_576,
            hook_timeout_ms: 100,
            sanitize_patterns: Vec::new(),
            sanitize_path_anon: true,
            log_level: "info".to_string(),
            log_silent: false,
            auto_approve_allow: default_auto_approve_allow(),
            auto_approve_deny: default_auto_approve_deny(),
        }
    }
}

fn default_auto_approve_allow() -> Vec<String> {
    vec![
        "Read".to_string(),
        "Grep".to_string(),
        "Glob".to_string(),
        "TodoWrite".to_string(),
    ]
}

fn default_auto_approve_deny() -> Vec<String> {
    Vec::new()
}

impl Config {
    /// Whether the primary backend has a syntactically usable endpoint
    /// configured (non-empty URL; key presence is checked separately so a
    /// public/anon-key deployment doesn't trip validation).
    pub fn primary_configured(&self) -> bool {
        self.primary_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(url) = file.primary.url {
            self.primary_url = Some(url);
        }
        if let Some(key) = file.primary.key {
            self.primary_key = Some(key);
        }
        if let Some(path) = file.local.path {
            self.local_path = path;
        }
        if let Some(enabled) = file.local.enabled {
            self.local_enabled = enabled;
        }
        if let Some(n) = file.max_payload_bytes {
            self.max_payload_bytes = n;
        }
        if let Some(ms) = file.hook_timeout_ms {
            self.hook_timeout_ms = ms;
        }
        if let Some(patterns) = file.sanitize.patterns {
            self.sanitize_patterns = patterns;
        }
        if let Some(anon) = file.sanitize.path_anon {
            self.sanitize_path_anon = anon;
        }
        if let Some(level) = file.log.level {
            self.log_level = level;
        }
        if let Some(silent) = file.log.silent {
            self.log_silent = silent;
        }
        if let Some(allow) = file.auto_approve.allow {
            self.auto_approve_allow = allow;
        }
        if let Some(deny) = file.auto_approve.deny {
            self.auto_approve_deny = deny;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = env::var("CHRONICLE_PRIMARY_URL") {
            self.primary_url = Some(v);
        }
        if let Ok(v) = env::var("CHRONICLE_PRIMARY_KEY") {
            self.primary_key = Some(v);
        }
        if let Ok(v) = env::var("CHRONICLE_LOCAL_PATH") {
            self.local_path = PathBuf::from(v);
        }
        if let Ok(v) = env::var("CHRONICLE_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Ok(v) = env::var("CHRONICLE_SILENT") {
            self.log_silent = matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "YES");
        }
    }

    /// Syntactic validity check for the primary URL, used by `load()` to
    /// decide whether to hard-fail at startup.
    fn primary_url_syntactically_valid(&self) -> bool {
        match &self.primary_url {
            None => true,
            Some(url) => url.starts_with("postgres://") || url.starts_with("postgresql://"),
        }
    }
}

/// Loads config by merging defaults → file → env.
///
/// Returns `Err` only when the remote backend is syntactically misconfigured
/// *and* the local fallback is disabled — every other combination degrades
/// silently to local-only mode.
pub fn load() -> Result<Config> {
    let mut config = Config::default();

    if let Some(path) = config_file_path() {
        match fs_err::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<FileConfig>(&contents) {
                Ok(file) => config.apply_file(file),
                Err(err) => {
                    tracing::warn!(error = %err, path = %path.display(), "Ignoring malformed config file");
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "Failed to read config file");
            }
        }
    }

    config.apply_env();

    if config.primary_configured()
        && !config.primary_url_syntactically_valid()
        && !config.local_enabled
    {
        return Err(ChronicleError::Config(
            "primary.url is syntactically invalid and local fallback is disabled".to_string(),
        ));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_local_only() {
        let config = Config::default();
        assert!(config.primary_url.is_none());
        assert!(config.local_enabled);
        assert_eq!(config.max_payload_bytes, 1_048_576);
        assert_eq!(config.hook_timeout_ms, 100);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut config = Config::default();
        let file: FileConfig = toml::from_str(
            r#"
            max_payload_bytes = 2048
            [primary]
            url = "postgres://example"
            "#,
        )
        .unwrap();
        config.apply_file(file);
        assert_eq!(config.max_payload_bytes, 2048);
        assert_eq!(config.primary_url.as_deref(), Some("postgres://example"));
    }

    #[test]
    fn invalid_primary_with_local_disabled_fails_validation() {
        let mut config = Config::default();
        config.primary_url = Some("not-a-url".to_string());
        config.local_enabled = false;
        assert!(!config.primary_url_syntactically_valid());
    }

    #[test]
    fn invalid_primary_with_local_enabled_is_not_fatal() {
        let mut config = Config::default();
        config.primary_url = Some("not-a-url".to_string());
        assert!(config.local_enabled);
        // load() itself would still succeed here; the field-level check is
        // only escalated to an error when local is disabled too.
    }
}
