//! Desired-state configuration for one importer node.
//!
//! A `NodeConfig` is the fully-resolved parameter tuple the driver hands to
//! the node model on every trigger. The same type is persisted as the
//! recorded state after a successful apply, so desired and recorded state
//! never drift apart structurally.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::NodeRole;

fn default_importer_binary() -> PathBuf {
    PathBuf::from("/usr/local/bin/pkg-importer")
}

/// Proxy settings injected into managed service environments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub http: Option<String>,
    #[serde(default)]
    pub https: Option<String>,
}

/// Primary-only configuration payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryConfig {
    /// Directory holding the working database.
    pub data_directory: PathBuf,
    /// Directory holding the cloned reference source tree the poller reads.
    pub source_directory: PathBuf,
    /// Git URL of the reference source (allowlist/denylist data).
    pub source_url: String,
}

/// Secondary-only configuration payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryConfig {
    /// Broker endpoint of the fleet's primary, e.g. `tcp://10.0.0.5:1692`.
    pub primary_endpoint: String,
}

/// Role-specific configuration. A secondary carries no directory payload at
/// all, so it cannot be configured with one by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoleConfig {
    Primary(PrimaryConfig),
    Secondary(SecondaryConfig),
}

/// Fully-resolved desired state for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique per machine in the fleet; baked into worker unit names.
    pub node_id: u32,
    pub worker_count: usize,
    /// OS account all managed services run as.
    pub system_user: String,
    /// Whether workers push import results outward.
    pub publish_enabled: bool,
    /// Port the primary's broker listens on.
    pub primary_port: u16,
    #[serde(default = "default_importer_binary")]
    pub importer_binary: PathBuf,
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
    #[serde(default)]
    pub proxy: ProxyConfig,
    pub role: RoleConfig,
}

impl NodeConfig {
    /// Load and validate a desired-state TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: NodeConfig = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn node_role(&self) -> NodeRole {
        match self.role {
            RoleConfig::Primary(_) => NodeRole::Primary,
            RoleConfig::Secondary(_) => NodeRole::Secondary,
        }
    }

    pub fn primary(&self) -> Option<&PrimaryConfig> {
        match &self.role {
            RoleConfig::Primary(primary) => Some(primary),
            RoleConfig::Secondary(_) => None,
        }
    }

    pub fn primary_mut(&mut self) -> Option<&mut PrimaryConfig> {
        match &mut self.role {
            RoleConfig::Primary(primary) => Some(primary),
            RoleConfig::Secondary(_) => None,
        }
    }

    /// Broker endpoint this node's workers report to.
    ///
    /// A primary's workers always talk to the local broker; a secondary uses
    /// the peer-announced address, which may be transiently stale until the
    /// next reconciliation pass.
    pub fn broker_endpoint(&self) -> String {
        match &self.role {
            RoleConfig::Primary(_) => format!("tcp://127.0.0.1:{}", self.primary_port),
            RoleConfig::Secondary(secondary) => secondary.primary_endpoint.clone(),
        }
    }

    /// Proxy URL used for outbound clones, preferring https.
    pub fn clone_proxy(&self) -> Option<&str> {
        self.proxy
            .https
            .as_deref()
            .or(self.proxy.http.as_deref())
            .filter(|proxy| !proxy.is_empty())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !is_valid_system_user(&self.system_user) {
            anyhow::bail!(
                "Invalid system user '{}': only lowercase letters, digits and .-+ are allowed",
                self.system_user
            );
        }
        if self.worker_count == 0 {
            anyhow::bail!("worker_count must be at least 1");
        }
        if self.primary_port == 0 {
            anyhow::bail!("primary_port must be non-zero");
        }
        match &self.role {
            RoleConfig::Primary(primary) => {
                if !primary.data_directory.is_absolute() {
                    anyhow::bail!(
                        "data_directory must be absolute: {}",
                        primary.data_directory.display()
                    );
                }
                if !primary.source_directory.is_absolute() {
                    anyhow::bail!(
                        "source_directory must be absolute: {}",
                        primary.source_directory.display()
                    );
                }
                if primary.source_url.is_empty() {
                    anyhow::bail!("source_url must not be empty");
                }
            }
            RoleConfig::Secondary(secondary) => {
                validate_endpoint(&secondary.primary_endpoint)?;
            }
        }
        Ok(())
    }
}

/// Check an OS account name against the importer's naming rule: lowercase
/// letters, digits, and `.`, `-`, `+` only.
pub fn is_valid_system_user(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
}

fn validate_endpoint(endpoint: &str) -> anyhow::Result<()> {
    let url = Url::parse(endpoint)
        .with_context(|| format!("Invalid primary endpoint '{endpoint}'"))?;
    if url.scheme() != "tcp" {
        anyhow::bail!("primary endpoint must use the tcp scheme, got '{endpoint}'");
    }
    if url.host_str().is_none() || url.port().is_none() {
        anyhow::bail!("primary endpoint must include host and port, got '{endpoint}'");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn primary_config() -> NodeConfig {
        NodeConfig {
            node_id: 0,
            worker_count: 2,
            system_user: "importer".to_string(),
            publish_enabled: true,
            primary_port: 1692,
            importer_binary: default_importer_binary(),
            credentials_file: None,
            proxy: ProxyConfig::default(),
            role: RoleConfig::Primary(PrimaryConfig {
                data_directory: PathBuf::from("/srv/importer/data"),
                source_directory: PathBuf::from("/srv/importer/source"),
                source_url: "https://git.example.com/import-filters.git".to_string(),
            }),
        }
    }

    #[test]
    fn test_valid_primary_config_passes() {
        assert!(primary_config().validate().is_ok());
    }

    #[test]
    fn test_system_user_rule() {
        assert!(is_valid_system_user("importer"));
        assert!(is_valid_system_user("svc.import-01+x"));
        assert!(!is_valid_system_user(""));
        assert!(!is_valid_system_user("Importer"));
        assert!(!is_valid_system_user("imp orter"));
        assert!(!is_valid_system_user("imp_orter"));
    }

    #[test]
    fn test_invalid_system_user_rejected() {
        let mut config = primary_config();
        config.system_user = "Not Valid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = primary_config();
        config.worker_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_data_directory_rejected() {
        let mut config = primary_config();
        config.role = RoleConfig::Primary(PrimaryConfig {
            data_directory: PathBuf::from("relative/data"),
            source_directory: PathBuf::from("/srv/importer/source"),
            source_url: "https://git.example.com/import-filters.git".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secondary_endpoint_validation() {
        let mut config = primary_config();
        config.role = RoleConfig::Secondary(SecondaryConfig {
            primary_endpoint: "tcp://10.0.0.5:1692".to_string(),
        });
        assert!(config.validate().is_ok());

        config.role = RoleConfig::Secondary(SecondaryConfig {
            primary_endpoint: "http://10.0.0.5:1692".to_string(),
        });
        assert!(config.validate().is_err());

        config.role = RoleConfig::Secondary(SecondaryConfig {
            primary_endpoint: "tcp://10.0.0.5".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_broker_endpoint_by_role() {
        let primary = primary_config();
        assert_eq!(primary.broker_endpoint(), "tcp://127.0.0.1:1692");

        let mut secondary = primary_config();
        secondary.role = RoleConfig::Secondary(SecondaryConfig {
            primary_endpoint: "tcp://10.0.0.5:1692".to_string(),
        });
        assert_eq!(secondary.broker_endpoint(), "tcp://10.0.0.5:1692");
    }

    #[test]
    fn test_toml_round_trip() {
        let config = primary_config();
        let text = toml::to_string_pretty(&config).expect("config should serialize");
        let parsed: NodeConfig = toml::from_str(&text).expect("config should parse back");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_parse_minimal_secondary_toml() {
        let text = r#"
node_id = 3
worker_count = 4
system_user = "importer"
publish_enabled = false
primary_port = 1692

[role.secondary]
primary_endpoint = "tcp://10.0.0.5:1692"
"#;
        let config: NodeConfig = toml::from_str(text).expect("toml should parse");
        assert_eq!(config.node_role(), NodeRole::Secondary);
        assert_eq!(config.worker_count, 4);
        assert_eq!(
            config.importer_binary,
            PathBuf::from("/usr/local/bin/pkg-importer")
        );
        assert!(config.validate().is_ok());
    }
}
