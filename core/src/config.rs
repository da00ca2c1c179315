//! Client-wide defaults loaded from JSON.
//!
//! # Design
//! Every field is optional in the JSON document (`#[serde(default)]`), so a
//! config file only names what it changes. Timeouts are given in
//! milliseconds. Per-request settings always override these defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RequestError, Result};
use crate::http::Timeouts;
use crate::request::DEFAULT_MAX_REDIRECTS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
    pub allow_redirects: bool,
    pub max_redirects: u32,
    /// HTTP proxy URL, e.g. `http://proxy:3128`.
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: None,
            read_timeout_ms: None,
            write_timeout_ms: None,
            allow_redirects: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            proxy: None,
            user_agent: None,
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RequestError::Config(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| RequestError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: self.connect_timeout_ms.map(Duration::from_millis),
            read: self.read_timeout_ms.map(Duration::from_millis),
            write: self.write_timeout_ms.map(Duration::from_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ClientConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert!(!config.allow_redirects);
        assert_eq!(config.max_redirects, 3);
        assert!(config.timeouts().is_default());
    }

    #[test]
    fn partial_document_overrides_named_fields() {
        let config = ClientConfig::from_json_str(
            r#"{"read_timeout_ms": 1500, "allow_redirects": true, "user_agent": "probe/1"}"#,
        )
        .unwrap();
        assert_eq!(config.timeouts().read, Some(Duration::from_millis(1500)));
        assert_eq!(config.timeouts().connect, None);
        assert!(config.allow_redirects);
        assert_eq!(config.max_redirects, 3);
        assert_eq!(config.user_agent.as_deref(), Some("probe/1"));
    }

    #[test]
    fn malformed_document_is_a_config_error() {
        let err = ClientConfig::from_json_str("{\"max_redirects\": \"many\"}").unwrap_err();
        assert!(matches!(err, RequestError::Config(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_redirects": 7, "proxy": "http://proxy:3128"}}"#).unwrap();
        let config = ClientConfig::from_path(file.path()).unwrap();
        assert_eq!(config.max_redirects, 7);
        assert_eq!(config.proxy.as_deref(), Some("http://proxy:3128"));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = ClientConfig::from_path("/no/such/config.json").unwrap_err();
        assert!(matches!(err, RequestError::Config(_)));
    }
}
