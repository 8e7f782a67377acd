use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const ENV_FILE: &str = ".env";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub search: SearchConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

fn default_collection() -> String {
    "Gallery".to_string()
}
fn default_request_timeout() -> u64 { 10_000 }
fn default_reconnect_delay() -> u64 { 2_000 }

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    /// Items per page; the n-th page request asks for the last `n * page_size`.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize { 10 }

impl Default for FeedConfig {
    fn default() -> Self {
        Self { page_size: default_page_size() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
    #[serde(default = "default_min_query_len")]
    pub min_query_len: usize,
    /// Filter the already loaded baseline instead of fetching the whole collection.
    #[serde(default)]
    pub reuse_baseline: bool,
}

fn default_debounce() -> u64 { 2_000 }
fn default_min_query_len() -> usize { 3 }

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce(),
            min_query_len: default_min_query_len(),
            reuse_baseline: false,
        }
    }
}

impl DatabaseConfig {
    /// Limit on opening a live query, including its first snapshot.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl SearchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub upload_url: String,
    pub public_url: String,
    #[serde(default)]
    pub folder: String,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_max_file_bytes() -> u64 { 20_000_000 }

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpg".to_string(),
        "image/jpeg".to_string(),
        "image/png".to_string(),
    ]
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_url: String::new(),
            public_url: String::new(),
            folder: String::new(),
            max_file_bytes: default_max_file_bytes(),
            allowed_types: default_allowed_types(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .with_context(|| "Failed to parse config TOML")?;
        if config.feed.page_size == 0 {
            anyhow::bail!("feed.page_size must be > 0");
        }
        Ok(config)
    }

    /// Load .env file into process environment. Real env vars take precedence.
    pub fn load_env_file() {
        let path = Path::new(ENV_FILE);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return,
        };
        // Strip BOM if present (common on Windows-created files)
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
        for (key, value) in parse_env_lines(content) {
            if std::env::var(key).is_err() {
                std::env::set_var(key, value);
            }
        }
    }

    /// Database auth token, if the collection is not public.
    pub fn database_auth() -> Option<String> {
        non_empty_env("GALLERY_DB_AUTH")
    }

    /// Bearer token sent with uploads, if the bucket requires one.
    pub fn upload_token() -> Option<String> {
        non_empty_env("GALLERY_UPLOAD_TOKEN")
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| sanitize_key(&v))
        .filter(|v| !v.is_empty())
}

fn parse_env_lines(content: &str) -> Vec<(&str, &str)> {
    content
        .lines()
        .map(|line| line.trim().trim_matches('\r'))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim().trim_matches('"').trim_matches('\'')))
        .collect()
}

/// Strip carriage returns, BOM, and other invisible chars from a key value.
fn sanitize_key(raw: &str) -> String {
    raw.replace(['\r', '\u{feff}', '\u{200b}'], "")
        .trim()
        .to_string()
}
