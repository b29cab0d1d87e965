use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

/// Default primary location of the cloud config
pub const DEFAULT_CLOUD_CONFIG_URL: &str = "http://config.example.org/cloud.yaml.gz";

/// Default fronted location of the cloud config
///
/// This is plain HTTP because the local proxy only supports falling back to
/// domain fronting for HTTP requests.
pub const DEFAULT_FRONTED_CLOUD_CONFIG_URL: &str = "http://d1.cloudfront.example/cloud.yaml.gz";

/// Agent configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub cloud: CloudSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub headers: WireHeaders,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the cloud config lives
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CloudSettings {
    #[serde(default = "default_config_url")]
    pub config_url: String,

    /// Alternate delivery path, raced against `config_url` by the proxy
    #[serde(default = "default_fronted_url")]
    pub fronted_url: String,
}

/// Agent settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentSettings {
    /// Base interval between fetches (seconds), jittered by ±50%
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Never fetch remotely, keep using the local config
    #[serde(default)]
    pub sticky: bool,

    /// HTTP request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

/// Identity sent along with each request
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IdentityConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Header names used on the wire
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WireHeaders {
    /// Response header carrying the cache tag
    pub etag: String,
    /// Request header carrying the last known cache tag
    pub if_none_match: String,
    /// Request header carrying the fronted URL
    pub fronted_url: String,
    pub user_id: String,
    pub token: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_config_url() -> String {
    DEFAULT_CLOUD_CONFIG_URL.to_string()
}

fn default_fronted_url() -> String {
    DEFAULT_FRONTED_CLOUD_CONFIG_URL.to_string()
}

fn default_poll_interval() -> u64 {
    60 // 1 minute
}

fn default_request_timeout() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            config_url: default_config_url(),
            fronted_url: default_fronted_url(),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            sticky: false,
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for WireHeaders {
    fn default() -> Self {
        Self {
            etag: "ETag".to_string(),
            if_none_match: "If-None-Match".to_string(),
            fronted_url: "X-Fronted-URL".to_string(),
            user_id: "X-User-Id".to_string(),
            token: "X-Pro-Token".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cloud: CloudSettings::default(),
            agent: AgentSettings::default(),
            identity: IdentityConfig::default(),
            headers: WireHeaders::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AgentSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

impl AgentConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AgentConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let toml = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        // The token is a credential
        set_owner_only(path)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        // An empty config URL turns remote fetching off
        if !self.cloud.config_url.is_empty() {
            validate_url(&self.cloud.config_url).context("Invalid cloud config URL")?;
        }

        // An empty fronted URL is allowed, it only disables the fallback path
        if !self.cloud.fronted_url.is_empty() {
            validate_url(&self.cloud.fronted_url).context("Invalid fronted config URL")?;
        }

        if self.agent.poll_interval == 0 {
            anyhow::bail!("Poll interval must be at least 1 second");
        }

        if self.agent.request_timeout == 0 {
            anyhow::bail!("Request timeout must be at least 1 second");
        }

        for (name, value) in [
            ("etag", &self.headers.etag),
            ("if_none_match", &self.headers.if_none_match),
            ("fronted_url", &self.headers.fronted_url),
            ("user_id", &self.headers.user_id),
            ("token", &self.headers.token),
        ] {
            reqwest::header::HeaderName::from_bytes(value.as_bytes())
                .with_context(|| format!("Invalid header name for {}: {:?}", name, value))?;
        }

        Ok(())
    }
}

fn validate_url(raw: &str) -> Result<()> {
    let url = url::Url::parse(raw).with_context(|| format!("Not a URL: {}", raw))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => anyhow::bail!("URL must use http or https (got: {})", scheme),
    }
}

fn set_owner_only(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set permissions for: {}", path.display()))?;
    }

    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}

/// Get the platform-specific agent config file path
pub fn get_agent_config_path() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        Ok(PathBuf::from("/etc/cloudconf-agent/agent.toml"))
    }

    #[cfg(target_os = "macos")]
    {
        Ok(PathBuf::from("/Library/Application Support/cloudconf-agent/agent.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let mut path = PathBuf::from(
            std::env::var("ProgramData").unwrap_or_else(|_| "C:\\ProgramData".to_string()),
        );
        path.push("cloudconf-agent");
        path.push("agent.toml");
        Ok(path)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        anyhow::bail!("Unsupported operating system");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_config_defaults_are_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cloud.config_url, DEFAULT_CLOUD_CONFIG_URL);
        assert_eq!(config.cloud.fronted_url, DEFAULT_FRONTED_CLOUD_CONFIG_URL);
    }

    #[test]
    fn agent_settings_default_values() {
        let settings = AgentSettings::default();
        assert_eq!(settings.poll_interval, 60);
        assert_eq!(settings.poll_interval(), Duration::from_secs(60));
        assert!(!settings.sticky);
        assert_eq!(settings.request_timeout, 60);
    }

    #[test]
    fn agent_config_rejects_bad_url() {
        let mut config = AgentConfig::default();
        config.cloud.config_url = "not-a-url".to_string();
        assert!(config.validate().is_err());

        config.cloud.config_url = "ftp://example.com/cloud.yaml.gz".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn agent_config_allows_empty_fronted_url() {
        let mut config = AgentConfig::default();
        config.cloud.fronted_url = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn agent_config_allows_empty_config_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "[cloud]\nconfig_url = \"\"\n").unwrap();

        let config = AgentConfig::load(&path).unwrap();
        assert!(config.cloud.config_url.is_empty());
        assert_eq!(config.cloud.fronted_url, DEFAULT_FRONTED_CLOUD_CONFIG_URL);
    }

    #[test]
    fn agent_config_rejects_zero_interval() {
        let mut config = AgentConfig::default();
        config.agent.poll_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn agent_config_rejects_bad_header_name() {
        let mut config = AgentConfig::default();
        config.headers.if_none_match = "not a header".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn agent_config_parses_partial_toml() {
        let config: AgentConfig = toml::from_str(
            r#"
            [cloud]
            config_url = "https://example.com/cloud.yaml.gz"
            fronted_url = ""

            [agent]
            poll_interval = 120
            sticky = true

            [headers]
            etag = "X-Custom-Etag"
            "#,
        )
        .unwrap();

        assert_eq!(config.cloud.config_url, "https://example.com/cloud.yaml.gz");
        assert_eq!(config.agent.poll_interval, 120);
        assert!(config.agent.sticky);
        assert_eq!(config.agent.request_timeout, 60);
        assert_eq!(config.headers.etag, "X-Custom-Etag");
        assert_eq!(config.headers.if_none_match, "If-None-Match");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn agent_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("agent.toml");

        let mut config = AgentConfig::default();
        config.identity.user_id = Some("1234".to_string());
        config.identity.token = Some("secret".to_string());
        config.save(&path).unwrap();

        let loaded = AgentConfig::load(&path).unwrap();
        assert_eq!(loaded.identity.user_id, Some("1234".to_string()));
        assert_eq!(loaded.identity.token, Some("secret".to_string()));
        assert_eq!(loaded.headers, WireHeaders::default());
    }

    #[test]
    fn agent_config_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AgentConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
