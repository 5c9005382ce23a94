//! Optional config file loading. Search order: ./fxscrape.toml, then
//! $XDG_CONFIG_HOME/fxscrape/config.toml (or ~/.config/fxscrape/config.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};

const LOCAL_FILE: &str = "fxscrape.toml";
const APP_DIR: &str = "fxscrape";

/// Config file contents. All fields optional; command-line flags take precedence.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// CSV output path (default articles.csv).
    pub output: Option<PathBuf>,
    /// Cookie cache path (default cookies.json).
    pub session_cache: Option<PathBuf>,
    /// First listing page to crawl.
    pub listing_url: Option<String>,
    pub user_agent: Option<String>,
    /// Impersonated browser: chrome or firefox.
    pub browser_family: Option<String>,
    /// Impersonated OS: windows, darwin, or linux.
    pub platform: Option<String>,
    pub mobile: Option<bool>,
    /// Delay in seconds between HTTP requests.
    pub request_delay_secs: Option<u64>,
    /// HTTP request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Fetch+extract attempts per article (default 3).
    pub article_attempts: Option<u32>,
    pub article_retry_secs: Option<u64>,
    /// Verification probes per page in the browser (default 3).
    pub challenge_attempts: Option<u32>,
    pub challenge_timeout_secs: Option<u64>,
    /// Pause after a maintenance page (default 300).
    pub maintenance_pause_secs: Option<u64>,
    /// Run Chrome headless (default true).
    pub headless: Option<bool>,
    /// http, browser, or chain.
    pub fetch: Option<String>,
    /// latest or paginate.
    pub mode: Option<String>,
    /// Articles in latest mode.
    pub limit: Option<usize>,
    /// Articles kept from the end of each page in paginate mode.
    pub per_page: Option<usize>,
}

/// Read and parse one config file.
pub fn load_config_from(path: &Path) -> Result<Config, String> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
    toml::from_str(&s).map_err(|e| format!("Invalid config {}: {}", path.display(), e))
}

/// First existing config file in search order. Missing file returns Ok(None); a present
/// file that cannot be read or parsed returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join(LOCAL_FILE)];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join(APP_DIR).join("config.toml"));
    }
    match paths.iter().find(|p| p.exists()) {
        Some(path) => load_config_from(path).map(Some),
        None => Ok(None),
    }
}
