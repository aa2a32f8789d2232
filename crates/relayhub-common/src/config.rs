use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid port {0}, expected 1..65535")]
    InvalidPort(i64),
    #[error("vendor {vendor:?} endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        vendor: String,
        endpoint: String,
        reason: String,
    },
}

/// Process-level settings from the config document's `appConfig` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub port: u16,
    /// Shared secret for inbound requests; empty or "-" disables auth.
    pub api_key: String,
    /// Enables retry/rotation on retryable paths.
    pub fallback: bool,
    pub temp_disable_minutes: u64,
    /// Treat upstream 429 as retryable.
    pub retry429: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8790,
            api_key: String::new(),
            fallback: true,
            temp_disable_minutes: 5,
            retry429: false,
        }
    }
}

impl AppConfig {
    /// Auth is off for an empty secret or the literal `-`.
    pub fn auth_secret(&self) -> Option<&str> {
        let secret = self.api_key.trim();
        if secret.is_empty() || secret == "-" {
            None
        } else {
            Some(secret)
        }
    }
}

/// One vendor entry; endpoints inherit its id for stats attribution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VendorConfig {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// The on-disk config document (`<data_dir>/config.json`).
///
/// The UI owns writes; the core only reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(rename = "appConfig", default)]
    pub app_config: AppConfig,
    #[serde(default)]
    pub vendors: Vec<VendorConfig>,
}

impl ConfigDocument {
    pub fn from_json(raw: &[u8]) -> Result<Self, ConfigError> {
        let doc: ConfigDocument = serde_json::from_slice(raw)?;
        if doc.app_config.port == 0 {
            return Err(ConfigError::InvalidPort(0));
        }
        for vendor in &doc.vendors {
            for endpoint in &vendor.endpoints {
                if endpoint.name.trim().is_empty() {
                    return Err(ConfigError::InvalidEndpoint {
                        vendor: vendor.name.clone(),
                        endpoint: endpoint.name.clone(),
                        reason: "missing name".to_string(),
                    });
                }
                if endpoint.api_url.trim().is_empty() {
                    return Err(ConfigError::InvalidEndpoint {
                        vendor: vendor.name.clone(),
                        endpoint: endpoint.name.clone(),
                        reason: "missing api_url".to_string(),
                    });
                }
            }
        }
        Ok(doc)
    }

    /// Flatten vendors into the endpoint list the router loads, stamping each
    /// endpoint with its vendor id.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let mut out = Vec::new();
        for vendor in &self.vendors {
            for endpoint in &vendor.endpoints {
                let mut endpoint = endpoint.clone();
                endpoint.vendor_id = vendor.id;
                out.push(endpoint);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::InterfaceType;

    #[test]
    fn parses_minimal_document() {
        let raw = br#"{
            "appConfig": {"port": 9000, "apiKey": "s3cret", "fallback": true, "tempDisableMinutes": 10},
            "vendors": [
                {"id": 3, "name": "acme", "endpoints": [
                    {"name": "a", "api_url": "https://u.test", "api_key": "k", "interface_type": "claude", "priority": 1}
                ]}
            ]
        }"#;
        let doc = ConfigDocument::from_json(raw).unwrap();
        assert_eq!(doc.app_config.port, 9000);
        assert_eq!(doc.app_config.temp_disable_minutes, 10);
        assert_eq!(doc.app_config.auth_secret(), Some("s3cret"));

        let endpoints = doc.endpoints();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].vendor_id, 3);
        assert_eq!(endpoints[0].interface_type, InterfaceType::Claude);
        assert!(endpoints[0].enabled);
    }

    #[test]
    fn defaults_apply_when_app_config_missing() {
        let doc = ConfigDocument::from_json(br#"{"vendors": []}"#).unwrap();
        assert_eq!(doc.app_config.port, 8790);
        assert!(doc.app_config.fallback);
        assert!(!doc.app_config.retry429);
        assert_eq!(doc.app_config.auth_secret(), None);
    }

    #[test]
    fn dash_secret_disables_auth() {
        let config = AppConfig {
            api_key: "-".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(config.auth_secret(), None);
    }

    #[test]
    fn rejects_endpoint_without_url() {
        let raw = br#"{"vendors": [{"name": "v", "endpoints": [{"name": "a", "api_url": "", "interface_type": "chat"}]}]}"#;
        assert!(ConfigDocument::from_json(raw).is_err());
    }
}
