use log::warn;
use serde::Deserialize;
use std::path::Path;

use crate::{LdpError, LdpResult};

/// Server configuration, loaded from a JSON file.
/// Every field has a default so a partial file is fine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LdpConfig {
    /// Public root URL, e.g. "https://localhost:8443".
    pub root_url: String,
    /// Filesystem directory backing the root URL.
    pub root_path: String,
    /// Multi-host mode: files live under `root_path/<hostname>/`.
    pub include_host: bool,
    pub default_content_type: String,
    pub index_filename: String,
    pub suffix_acl: String,
    pub suffix_meta: String,
    /// When true, `acl:origin` lists are enforced with no same-origin
    /// tolerance for unlisted origins.
    pub strict_origin: bool,
    pub trusted_origins: Vec<String>,
    /// Passed through to the remote graph fetcher. Scoped here on purpose:
    /// there is no process-global TLS toggle anywhere in this codebase.
    pub accept_invalid_tls_certs: bool,
}

impl Default for LdpConfig {
    fn default() -> Self {
        Self {
            root_url: "http://localhost:8443".to_string(),
            root_path: "./data".to_string(),
            include_host: false,
            default_content_type: "application/octet-stream".to_string(),
            index_filename: "index.html".to_string(),
            suffix_acl: ".acl".to_string(),
            suffix_meta: ".meta".to_string(),
            strict_origin: false,
            trusted_origins: Vec::new(),
            accept_invalid_tls_certs: false,
        }
    }
}

impl LdpConfig {
    pub fn load(config_path: &Path) -> LdpResult<Self> {
        if !config_path.exists() {
            warn!(
                "config file {} not found, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(config_path)?;
        let config: LdpConfig = serde_json::from_str(&data).map_err(|e| {
            LdpError::InvalidParam(format!(
                "failed to parse config {}: {}",
                config_path.display(),
                e
            ))
        })?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ldp.json");
        std::fs::write(&path, r#"{"root_url": "https://pod.example", "strict_origin": true}"#)
            .unwrap();

        let config = LdpConfig::load(&path).unwrap();
        assert_eq!(config.root_url, "https://pod.example");
        assert!(config.strict_origin);
        assert_eq!(config.suffix_acl, ".acl");
    }

    #[test]
    fn test_load_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LdpConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.index_filename, "index.html");
        assert!(!config.include_host);
    }

    #[test]
    fn test_load_malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ldp.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(LdpConfig::load(&path).is_err());
    }
}
