use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};
use sha2::{Digest, Sha256};

use crate::agent::{AgentConfig, CloudConfigSource};

const CLOUD_CONFIG_KEY: &str = "cloudconfig";
const FRONTED_CLOUD_CONFIG_KEY: &str = "frontedcloudconfig";
const CHAINED_SERVERS_KEY: &str = "chainedservers";

/// The running configuration, owned by the agent daemon
///
/// Cloud payloads are YAML documents merged on top of what is already
/// there. Mappings merge key by key, anything else is replaced.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    cloud_config_url: String,
    fronted_cloud_config_url: String,
    document: Value,
    last_hash: Option<String>,
}

impl LiveConfig {
    pub fn new(cloud_config_url: impl Into<String>, fronted_cloud_config_url: impl Into<String>) -> Self {
        Self {
            cloud_config_url: cloud_config_url.into(),
            fronted_cloud_config_url: fronted_cloud_config_url.into(),
            document: Value::Mapping(Mapping::new()),
            last_hash: None,
        }
    }

    pub fn from_agent_config(config: &AgentConfig) -> Self {
        Self::new(config.cloud.config_url.clone(), config.cloud.fronted_url.clone())
    }

    /// The merged document
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Hash of the last payload merged, if any
    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    /// Render the merged document as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.document).context("Failed to serialize config")
    }

    fn adopt_urls(&mut self) {
        if let Some(url) = self.document.get(CLOUD_CONFIG_KEY).and_then(Value::as_str) {
            if url != self.cloud_config_url {
                tracing::info!("Cloud config URL changed to {}", url);
                self.cloud_config_url = url.to_string();
            }
        }

        if let Some(url) = self.document.get(FRONTED_CLOUD_CONFIG_KEY).and_then(Value::as_str) {
            if url != self.fronted_cloud_config_url {
                tracing::info!("Fronted cloud config URL changed to {}", url);
                self.fronted_cloud_config_url = url.to_string();
            }
        }
    }
}

impl CloudConfigSource for LiveConfig {
    fn cloud_config_url(&self) -> &str {
        &self.cloud_config_url
    }

    fn fronted_cloud_config_url(&self) -> &str {
        &self.fronted_cloud_config_url
    }

    fn update_from_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let hash = compute_hash(bytes);
        if self.last_hash.as_deref() == Some(hash.as_str()) {
            tracing::debug!("Content downloaded but hash unchanged");
            return Ok(());
        }

        let incoming: Value = serde_yaml::from_slice(bytes).context("Failed to parse cloud config YAML")?;
        if !incoming.is_mapping() && !incoming.is_null() {
            anyhow::bail!("Cloud config must be a YAML mapping");
        }

        merge(&mut self.document, incoming);
        self.adopt_urls();

        if let Some(Value::Mapping(servers)) = self.document.get(CHAINED_SERVERS_KEY) {
            tracing::debug!("Adding {} chained servers", servers.len());
        }

        tracing::info!("Merged cloud config (hash: {})", &hash[..19]);
        self.last_hash = Some(hash);
        Ok(())
    }
}

/// Deep-merge `incoming` into `base`
fn merge(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Mapping(base), Value::Mapping(incoming)) => {
            for (key, value) in incoming {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (base, incoming) => *base = incoming,
    }
}

/// Compute SHA-256 hash of a config payload
fn compute_hash(content: &[u8]) -> String {
    let result = Sha256::digest(content);
    let hex: String = result.iter().map(|b| format!("{:02x}", b)).collect();
    format!("sha256:{}", hex)
}
