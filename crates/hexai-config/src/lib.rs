//! hexai configuration loading
//!
//! Reads `$XDG_CONFIG_HOME/hexai/config.json` (or `~/.config/hexai/config.json`)
//! and merges it over built-in defaults. A missing file yields the defaults; an
//! unreadable or invalid file logs a warning and yields the defaults, so the
//! server always starts. API keys are not configuration: the entrypoints read
//! them from the environment and hand them to the provider factory.

pub mod error;
pub mod types;

use std::path::{Path, PathBuf};

use tracing::warn;

pub use error::{ConfigError, ConfigResult};
pub use types::{AppConfig, DEFAULT_TRIGGER_CHARACTERS};

use types::FileConfig;

/// Resolve the config file path per the XDG Base Directory Specification
pub fn config_path() -> ConfigResult<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg).join("hexai").join("config.json"));
    }
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".config").join("hexai").join("config.json"))
}

/// Load configuration, falling back to defaults on any problem
pub fn load() -> AppConfig {
    let path = match config_path() {
        Ok(path) => path,
        Err(err) => {
            warn!("config: {err}");
            return AppConfig::default();
        }
    };
    match load_from_path(&path) {
        Ok(cfg) => cfg,
        Err(ConfigError::Io { ref source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            AppConfig::default()
        }
        Err(err) => {
            warn!("config: {err}");
            AppConfig::default()
        }
    }
}

/// Load and merge configuration from an explicit path
pub fn load_from_path(path: &Path) -> ConfigResult<AppConfig> {
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let file: FileConfig =
        serde_json::from_str(&data).map_err(|source| ConfigError::Invalid {
            path: path.display().to_string(),
            source,
        })?;
    Ok(AppConfig::default().merge(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.max_tokens, 4000);
        assert_eq!(cfg.context_mode, "always-full");
        assert_eq!(cfg.context_window_lines, 120);
        assert_eq!(cfg.max_context_tokens, 4000);
        assert_eq!(cfg.log_preview_limit, 100);
        assert_eq!(cfg.coding_temperature, Some(0.2));
        assert_eq!(cfg.manual_invoke_min_prefix, 1);
        assert_eq!(
            cfg.trigger_characters,
            vec![".", ":", "/", "_", ")", "{"]
        );
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"max_tokens": 512, "context_mode": "window", "provider": "ollama"}"#,
        )
        .unwrap();
        let cfg = load_from_path(&path).unwrap();
        assert_eq!(cfg.max_tokens, 512);
        assert_eq!(cfg.context_mode, "window");
        assert_eq!(cfg.provider, "ollama");
        // untouched fields keep defaults
        assert_eq!(cfg.context_window_lines, 120);
    }

    #[test]
    fn test_empty_strings_do_not_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"context_mode": "  ", "trigger_characters": []}"#).unwrap();
        let cfg = load_from_path(&path).unwrap();
        assert_eq!(cfg.context_mode, "always-full");
        assert!(!cfg.trigger_characters.is_empty());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_from_path(&path),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
