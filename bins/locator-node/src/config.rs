//! Configuration types for the locator node daemon.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use locator_core::{AdapterName, Endpoint, ReplicaGroupName};
use locator_discovery::DiscoveryConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading or writing configuration file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error parsing TOML configuration file.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration validation failed.
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main configuration for the locator node daemon.
///
/// Configuration precedence (highest to lowest):
/// 1. Environment variables
/// 2. Config file values
/// 3. Default values
///
/// # Example
///
/// ```
/// use locator_node::config::NodeConfig;
///
/// let config = NodeConfig::default();
/// assert_eq!(config.network.multicast_group, "239.255.0.1");
/// assert_eq!(config.network.multicast_port, 4061);
/// assert_eq!(config.discovery.timeout_ms, 300);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Protocol parameters.
    #[serde(default)]
    pub discovery: DiscoverySettings,
    /// Multicast group and sockets.
    #[serde(default)]
    pub network: NetworkSettings,
    /// Adapters this node announces.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adapters: Vec<AdapterSettings>,
}

impl NodeConfig {
    /// Load configuration from a TOML file, creating it with defaults if it doesn't exist.
    ///
    /// Environment variables are applied on top of the file before validation.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading or creating configuration");

        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            tracing::info!(path = %path.display(), "Configuration file doesn't exist, creating with defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        if !path.exists() {
            config.save(path)?;
            tracing::info!(path = %path.display(), "Created configuration file");
        }

        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading configuration from file");

        let contents = std::fs::read_to_string(path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to read configuration file");
            ConfigError::IoError(e)
        })?;

        let config: Self = toml::from_str(&contents).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to parse TOML configuration");
            ConfigError::ParseError(e)
        })?;

        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to serialize configuration to TOML");
            ConfigError::ValidationError(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, &contents)?;
        tracing::debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Validate configuration values.
    ///
    /// Checks:
    /// - Protocol parameters pass [`DiscoveryConfig`] validation
    /// - Multicast group is an IPv4 multicast address
    /// - Interface and reply bind addresses parse
    /// - Every adapter has a valid name, group and at least one endpoint
    pub fn validate(&self) -> Result<()> {
        tracing::debug!("Validating configuration");

        self.discovery_config()?;
        self.multicast_addr()?;
        self.interface_addr()?;
        self.reply_bind_addr()?;

        for adapter in &self.adapters {
            adapter.validate()?;
        }

        Ok(())
    }

    /// Protocol configuration for the coordinator and query handler.
    pub fn discovery_config(&self) -> Result<DiscoveryConfig> {
        DiscoveryConfig::builder()
            .domain_id(self.discovery.domain_id.clone())
            .timeout(Duration::from_millis(self.discovery.timeout_ms))
            .retry_count(self.discovery.retry_count)
            .latency_multiplier(self.discovery.latency_multiplier)
            .build()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Multicast group and port queries are sent to.
    pub fn multicast_addr(&self) -> Result<SocketAddrV4> {
        let group: Ipv4Addr = self.network.multicast_group.parse().map_err(|e| {
            ConfigError::ValidationError(format!(
                "Invalid multicast group '{}': {}",
                self.network.multicast_group, e
            ))
        })?;
        if !group.is_multicast() {
            return Err(ConfigError::ValidationError(format!(
                "{} is not a multicast address",
                group
            )));
        }
        if self.network.multicast_port == 0 {
            return Err(ConfigError::ValidationError(
                "Multicast port must be non-zero".to_string(),
            ));
        }
        Ok(SocketAddrV4::new(group, self.network.multicast_port))
    }

    /// Interface the multicast group is joined on.
    pub fn interface_addr(&self) -> Result<Ipv4Addr> {
        self.network.interface.parse().map_err(|e| {
            ConfigError::ValidationError(format!(
                "Invalid interface address '{}': {}",
                self.network.interface, e
            ))
        })
    }

    /// Local address of the unicast reply socket.
    pub fn reply_bind_addr(&self) -> Result<SocketAddr> {
        self.network.reply_bind.parse().map_err(|e| {
            ConfigError::ValidationError(format!(
                "Invalid reply bind address '{}': {}",
                self.network.reply_bind, e
            ))
        })
    }

    /// Apply environment variable overrides to configuration.
    ///
    /// Supported environment variables:
    /// - `LOCATOR_DOMAIN_ID` - Overrides discovery.domain_id
    /// - `LOCATOR_TIMEOUT_MS` - Overrides discovery.timeout_ms
    /// - `LOCATOR_RETRY_COUNT` - Overrides discovery.retry_count
    /// - `LOCATOR_MULTICAST_GROUP` - Overrides network.multicast_group
    /// - `LOCATOR_MULTICAST_PORT` - Overrides network.multicast_port
    ///
    /// Unparseable numbers are logged as warnings and the current value is retained.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(domain_id) = std::env::var("LOCATOR_DOMAIN_ID") {
            tracing::debug!(env_var = "LOCATOR_DOMAIN_ID", value = %domain_id, "Applying environment override");
            self.discovery.domain_id = domain_id;
        }

        override_number("LOCATOR_TIMEOUT_MS", &mut self.discovery.timeout_ms);
        override_number("LOCATOR_RETRY_COUNT", &mut self.discovery.retry_count);

        if let Ok(group) = std::env::var("LOCATOR_MULTICAST_GROUP") {
            tracing::debug!(env_var = "LOCATOR_MULTICAST_GROUP", value = %group, "Applying environment override");
            self.network.multicast_group = group;
        }

        override_number("LOCATOR_MULTICAST_PORT", &mut self.network.multicast_port);
    }
}

fn override_number<T>(env_var: &'static str, target: &mut T)
where
    T: std::str::FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let Ok(raw) = std::env::var(env_var) else {
        return;
    };

    match raw.parse::<T>() {
        Ok(value) => {
            tracing::debug!(env_var, value = %value, "Applying environment override");
            *target = value;
        }
        Err(e) => {
            tracing::warn!(
                env_var,
                value = %raw,
                error = %e,
                current = %target,
                "Invalid number in environment variable, keeping current value"
            );
        }
    }
}

/// Discovery protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Discovery domain.
    ///
    /// Environment variable: `LOCATOR_DOMAIN_ID`
    pub domain_id: String,
    /// Per-round reply timeout in milliseconds.
    ///
    /// Environment variable: `LOCATOR_TIMEOUT_MS`
    pub timeout_ms: u64,
    /// Rounds reissued after the first times out.
    ///
    /// Environment variable: `LOCATOR_RETRY_COUNT`
    pub retry_count: u32,
    /// Replica grace window as a percentage of the first reply's round trip.
    pub latency_multiplier: u32,
    /// Timeout for the TCP liveness probe used by object lookups.
    pub probe_timeout_ms: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            domain_id: String::new(),
            timeout_ms: 300,
            retry_count: 3,
            latency_multiplier: 100,
            probe_timeout_ms: 250,
        }
    }
}

/// Multicast and socket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// IPv4 multicast group.
    ///
    /// Environment variable: `LOCATOR_MULTICAST_GROUP`
    pub multicast_group: String,
    /// Multicast port.
    ///
    /// Environment variable: `LOCATOR_MULTICAST_PORT`
    pub multicast_port: u16,
    /// Local interface to join the group on; `0.0.0.0` lets the OS choose.
    pub interface: String,
    /// Bind address of the unicast reply socket.
    pub reply_bind: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            multicast_group: "239.255.0.1".to_string(),
            multicast_port: 4061,
            interface: "0.0.0.0".to_string(),
            reply_bind: "0.0.0.0:0".to_string(),
        }
    }
}

/// An adapter announced by this node.
///
/// ```toml
/// [[adapters]]
/// name = "Printers-1"
/// replica_group = "Printers"
/// endpoints = ["tcp://10.0.0.5:10000"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterSettings {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica_group: Option<String>,
    pub endpoints: Vec<String>,
}

impl AdapterSettings {
    pub fn validate(&self) -> Result<()> {
        self.adapter_name()?;
        self.group_name()?;
        if self.endpoints()?.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Adapter '{}' has no endpoints",
                self.name
            )));
        }
        Ok(())
    }

    pub fn adapter_name(&self) -> Result<AdapterName> {
        AdapterName::parse(&self.name)
            .map_err(|e| ConfigError::ValidationError(format!("Invalid adapter name: {}", e)))
    }

    pub fn group_name(&self) -> Result<Option<ReplicaGroupName>> {
        self.replica_group
            .as_deref()
            .map(ReplicaGroupName::parse)
            .transpose()
            .map_err(|e| {
                ConfigError::ValidationError(format!(
                    "Invalid replica group for adapter '{}': {}",
                    self.name, e
                ))
            })
    }

    pub fn endpoints(&self) -> Result<Vec<Endpoint>> {
        self.endpoints
            .iter()
            .map(|endpoint| {
                Endpoint::parse(endpoint).map_err(|e| {
                    ConfigError::ValidationError(format!(
                        "Invalid endpoint for adapter '{}': {}",
                        self.name, e
                    ))
                })
            })
            .collect()
    }
}
