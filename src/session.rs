//! Cookie cache shared between runs. The file is a single JSON object of cookie name to value.

use crate::scraper::ScraperError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Cookies held by the HTTP client, opaque to everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionTokens(BTreeMap<String, String>);

impl SessionTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse a `Cookie` header value (`a=1; b=2`). Pieces without `=` are ignored.
    pub fn from_cookie_header(header: &str) -> Self {
        let mut tokens = Self::new();
        for pair in header.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                let name = name.trim();
                if !name.is_empty() {
                    tokens.insert(name, value.trim());
                }
            }
        }
        tokens
    }
}

/// Load/save [SessionTokens] at a fixed path.
#[derive(Debug, Clone)]
pub struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing, unreadable, or malformed cache all mean "no tokens".
    pub fn load(&self) -> Option<SessionTokens> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no session cache");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read session cache; ignoring");
                return None;
            }
        };
        match serde_json::from_str::<SessionTokens>(&raw) {
            Ok(tokens) => {
                debug!(path = %self.path.display(), count = tokens.len(), "loaded session cache");
                Some(tokens)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "malformed session cache; ignoring");
                None
            }
        }
    }

    /// Overwrite the cache with `tokens`.
    pub fn save(&self, tokens: &SessionTokens) -> Result<(), ScraperError> {
        let json = serde_json::to_string(tokens).map_err(|e| ScraperError::SessionCache {
            path: self.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        std::fs::write(&self.path, json).map_err(|e| ScraperError::SessionCache {
            path: self.path.clone(),
            source: e,
        })?;
        debug!(path = %self.path.display(), count = tokens.len(), "saved session cache");
        Ok(())
    }
}
