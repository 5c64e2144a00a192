use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::ViewerError;

pub const DEFAULT_CONFIG_FILE: &str = "github-viewer.json";
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub search_debounce_ms: Option<u64>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub verify_archives: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub search_debounce: Duration,
    pub data_dir: Option<Utf8PathBuf>,
    pub verify_archives: bool,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            search_debounce: Duration::from_millis(1000),
            data_dir: None,
            verify_archives: true,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist; otherwise `github-viewer.json` in the
    /// current directory is read when present, and defaults apply when not.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, ViewerError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| ViewerError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| ViewerError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, ViewerError> {
        let defaults = ResolvedConfig::default();

        let api_base_url = config
            .api_base_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base_url);
        if !(api_base_url.starts_with("http://") || api_base_url.starts_with("https://")) {
            return Err(ViewerError::ConfigParse(format!(
                "api_base_url must be an http(s) URL: {api_base_url}"
            )));
        }

        let request_timeout = match config.request_timeout_secs {
            Some(0) => {
                return Err(ViewerError::ConfigParse(
                    "request_timeout_secs must be positive".to_string(),
                ));
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.request_timeout,
        };

        Ok(ResolvedConfig {
            api_base_url,
            request_timeout,
            search_debounce: config
                .search_debounce_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.search_debounce),
            data_dir: config.data_dir.map(Utf8PathBuf::from),
            verify_archives: config.verify_archives.unwrap_or(defaults.verify_archives),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(resolved.search_debounce, Duration::from_millis(1000));
        assert_eq!(resolved.request_timeout, Duration::from_secs(30));
        assert!(resolved.verify_archives);
        assert!(resolved.data_dir.is_none());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = Config {
            api_base_url: Some("http://localhost:8080/".to_string()),
            ..Config::default()
        };
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.api_base_url, "http://localhost:8080");
    }
}
