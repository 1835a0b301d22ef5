use reqwest::Url;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::live::DEFAULT_WINDOW_CAPACITY;

/// Environment variables are read with this prefix, e.g. `MESHDASH_API_BASE_URL`.
pub const ENV_PREFIX: &str = "MESHDASH_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardConfig {
    pub api_base_url: String,
    pub feed_url: String,
    pub stats_channel: String,
    pub window_capacity: usize,
    pub container_poll_ms: u64,
    pub log_poll_ms: u64,
    pub log_dir: String,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
pub struct PartialDashboardConfig {
    api_base_url: Option<String>,
    feed_url: Option<String>,
    stats_channel: Option<String>,
    window_capacity: Option<usize>,
    container_poll_ms: Option<u64>,
    log_poll_ms: Option<u64>,
    log_dir: Option<String>,
}

fn default_stats_channel() -> String {
    "stats".to_string()
}

fn default_window_capacity() -> usize {
    DEFAULT_WINDOW_CAPACITY
}

fn default_container_poll_ms() -> u64 {
    5_000
}

fn default_log_poll_ms() -> u64 {
    10_000
}

fn default_log_dir() -> String {
    "logs".to_string()
}

/// `http(s)://host/base` becomes `ws(s)://host/base/ws`.
fn default_feed_url(api_base_url: &str) -> Result<String, String> {
    let mut url = Url::parse(api_base_url)
        .map_err(|e| format!("Invalid api_base_url {api_base_url:?}: {e}"))?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => return Err(format!("Unsupported api_base_url scheme {other:?}")),
    };
    url.set_scheme(scheme)
        .map_err(|_| format!("Cannot derive feed URL from {api_base_url:?}"))?;
    let path = format!("{}/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url.to_string())
}

impl DashboardConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config: PartialDashboardConfig = if let Some(path_str) = config_path {
            let path = Path::new(path_str);
            if path.exists() {
                let contents = fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
                toml::from_str(&contents)
                    .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))?
            } else {
                PartialDashboardConfig::default()
            }
        } else {
            PartialDashboardConfig::default()
        };

        // 2. Load from environment variables
        let env_config: PartialDashboardConfig = envy::prefixed(ENV_PREFIX)
            .from_env::<PartialDashboardConfig>()
            .map_err(|e| format!("Failed to load config from environment: {e}"))?;

        Self::resolve(file_config, env_config)
    }

    /// Merges the layers: environment overrides file, file overrides defaults.
    pub fn resolve(
        file_config: PartialDashboardConfig,
        env_config: PartialDashboardConfig,
    ) -> Result<Self, String> {
        let api_base_url = env_config
            .api_base_url
            .or(file_config.api_base_url)
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or("MESHDASH_API_BASE_URL is required")?;
        let feed_url = match env_config.feed_url.or(file_config.feed_url) {
            Some(url) => url,
            None => default_feed_url(&api_base_url)?,
        };

        Ok(DashboardConfig {
            feed_url,
            stats_channel: env_config
                .stats_channel
                .or(file_config.stats_channel)
                .unwrap_or_else(default_stats_channel),
            window_capacity: env_config
                .window_capacity
                .or(file_config.window_capacity)
                .unwrap_or_else(default_window_capacity)
                .max(1),
            container_poll_ms: env_config
                .container_poll_ms
                .or(file_config.container_poll_ms)
                .unwrap_or_else(default_container_poll_ms),
            log_poll_ms: env_config
                .log_poll_ms
                .or(file_config.log_poll_ms)
                .unwrap_or_else(default_log_poll_ms),
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            api_base_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> PartialDashboardConfig {
        envy::prefixed(ENV_PREFIX)
            .from_iter(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
            .unwrap()
    }

    #[test]
    fn test_defaults_and_derived_feed_url() {
        let file: PartialDashboardConfig = toml::from_str(r#"api_base_url = "https://dash.example.net/""#).unwrap();
        let config = DashboardConfig::resolve(file, PartialDashboardConfig::default()).unwrap();

        assert_eq!(config.api_base_url, "https://dash.example.net");
        assert_eq!(config.feed_url, "wss://dash.example.net/ws");
        assert_eq!(config.stats_channel, "stats");
        assert_eq!(config.window_capacity, 60);
        assert_eq!(config.container_poll_ms, 5_000);
        assert_eq!(config.log_poll_ms, 10_000);
        assert_eq!(config.log_dir, "logs");
    }

    #[test]
    fn test_environment_overrides_file() {
        let file: PartialDashboardConfig = toml::from_str(
            r#"
            api_base_url = "http://10.0.0.1:8080"
            stats_channel = "stats"
            container_poll_ms = 2000
            "#,
        )
        .unwrap();
        let env = env(&[
            ("MESHDASH_STATS_CHANNEL", "stats:node-1"),
            ("MESHDASH_WINDOW_CAPACITY", "120"),
            ("UNRELATED", "ignored"),
        ]);
        let config = DashboardConfig::resolve(file, env).unwrap();

        assert_eq!(config.feed_url, "ws://10.0.0.1:8080/ws");
        assert_eq!(config.stats_channel, "stats:node-1");
        assert_eq!(config.window_capacity, 120);
        assert_eq!(config.container_poll_ms, 2_000);
    }

    #[test]
    fn test_missing_base_url_is_an_error() {
        let err = DashboardConfig::resolve(PartialDashboardConfig::default(), PartialDashboardConfig::default())
            .unwrap_err();
        assert!(err.contains("MESHDASH_API_BASE_URL"));
    }

    #[test]
    fn test_explicit_feed_url_is_kept() {
        let env = env(&[
            ("MESHDASH_API_BASE_URL", "https://dash.example.net"),
            ("MESHDASH_FEED_URL", "wss://feed.example.net/live"),
        ]);
        let config = DashboardConfig::resolve(PartialDashboardConfig::default(), env).unwrap();
        assert_eq!(config.feed_url, "wss://feed.example.net/live");
    }

    #[test]
    fn test_load_reads_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api_base_url = \"http://127.0.0.1:3000/api-root\"").unwrap();
        writeln!(file, "log_poll_ms = 15000").unwrap();

        let config = DashboardConfig::load(file.path().to_str()).unwrap();
        assert!(config.api_base_url.starts_with("http"));
        assert!(config.log_poll_ms > 0);
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api_base_url = ").unwrap();
        let err = DashboardConfig::load(file.path().to_str()).unwrap_err();
        assert!(err.contains("Failed to parse TOML"));
    }
}
