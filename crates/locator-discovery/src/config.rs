//! Discovery protocol configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Default time to wait for replies before retrying a round.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300);

/// Default number of retries after the initial round.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default replica latency multiplier, in percent of the first reply's RTT.
pub const DEFAULT_LATENCY_MULTIPLIER: u32 = 100;

/// Parameters of the discovery protocol.
///
/// Passed explicitly to the [`RequestCoordinator`] and [`QueryHandler`];
/// nothing in the protocol reads global state.
///
/// Use [`DiscoveryConfig::builder()`] to construct with validation, or
/// [`DiscoveryConfig::default()`] for the standard values.
///
/// [`RequestCoordinator`]: crate::RequestCoordinator
/// [`QueryHandler`]: crate::QueryHandler
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Discovery domain; queries from other domains are ignored.
    domain_id: String,

    /// How long a round waits for replies.
    timeout: Duration,

    /// Rounds reissued after the first one times out.
    retry_count: u32,

    /// Grace window for replica replies, as a percentage of the first
    /// replica reply's round-trip time.
    latency_multiplier: u32,

    /// Log the first channel send failure of each coordinator.
    warn_on_channel_failure: bool,
}

impl DiscoveryConfig {
    /// Create a new configuration builder.
    pub fn builder() -> DiscoveryConfigBuilder {
        DiscoveryConfigBuilder::new()
    }

    pub fn domain_id(&self) -> &str {
        &self.domain_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn latency_multiplier(&self) -> u32 {
        self.latency_multiplier
    }

    pub fn warn_on_channel_failure(&self) -> bool {
        self.warn_on_channel_failure
    }

    /// Deadline granted to sibling replicas once the first replica replied.
    ///
    /// `rtt * latency_multiplier / 100`, never less than one millisecond.
    pub fn replica_window(&self, rtt: Duration) -> Duration {
        let scaled = rtt.saturating_mul(self.latency_multiplier) / 100;
        scaled.max(Duration::from_millis(1))
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            domain_id: String::new(),
            timeout: DEFAULT_TIMEOUT,
            retry_count: DEFAULT_RETRY_COUNT,
            latency_multiplier: DEFAULT_LATENCY_MULTIPLIER,
            warn_on_channel_failure: true,
        }
    }
}

/// Builder for [`DiscoveryConfig`] with validation.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use locator_discovery::DiscoveryConfig;
///
/// let config = DiscoveryConfig::builder()
///     .domain_id("lab")
///     .timeout(Duration::from_millis(500))
///     .retry_count(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.domain_id(), "lab");
/// ```
#[derive(Debug, Clone)]
pub struct DiscoveryConfigBuilder {
    config: DiscoveryConfig,
}

impl DiscoveryConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: DiscoveryConfig::default(),
        }
    }

    pub fn domain_id(mut self, domain_id: impl Into<String>) -> Self {
        self.config.domain_id = domain_id.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.config.retry_count = retry_count;
        self
    }

    /// Set the replica latency multiplier, in percent.
    pub fn latency_multiplier(mut self, percent: u32) -> Self {
        self.config.latency_multiplier = percent;
        self
    }

    pub fn warn_on_channel_failure(mut self, enabled: bool) -> Self {
        self.config.warn_on_channel_failure = enabled;
        self
    }

    /// Build the configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `timeout` is shorter than one millisecond
    /// - `latency_multiplier` is zero
    pub fn build(self) -> Result<DiscoveryConfig, ConfigError> {
        let minimum = Duration::from_millis(1);
        if self.config.timeout < minimum {
            return Err(ConfigError::DurationBelowMinimum {
                field: "timeout",
                minimum,
                provided: self.config.timeout,
            });
        }

        if self.config.latency_multiplier < 1 {
            return Err(ConfigError::BelowMinimum {
                field: "latency_multiplier",
                minimum: 1,
                provided: self.config.latency_multiplier as u64,
            });
        }

        Ok(self.config)
    }
}

impl Default for DiscoveryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
