// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientResult, ConfigError};

// =============================================================================
// Security
// =============================================================================

/// Message security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// No signing or encryption.
    #[default]
    None,
    /// Messages are signed.
    Sign,
    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

impl SecurityMode {
    /// The numeric value used in service requests.
    pub const fn value(self) -> u32 {
        match self {
            Self::None => 1,
            Self::Sign => 2,
            Self::SignAndEncrypt => 3,
        }
    }

    /// Display name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Sign => "Sign",
            Self::SignAndEncrypt => "SignAndEncrypt",
        }
    }
}

/// Security policy selecting the cryptography suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPolicy {
    /// No cryptography.
    #[default]
    None,
    /// SHA-256 based suite.
    Basic256Sha256,
    /// AES-128 with RSA-OAEP.
    Aes128Sha256RsaOaep,
    /// AES-256 with RSA-PSS.
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    /// The policy URI sent on the wire.
    pub const fn uri(self) -> &'static str {
        match self {
            Self::None => "http://opcfoundation.org/UA/SecurityPolicy#None",
            Self::Basic256Sha256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256",
            Self::Aes128Sha256RsaOaep => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep"
            }
            Self::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss"
            }
        }
    }

    /// Display name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Basic256Sha256 => "Basic256Sha256",
            Self::Aes128Sha256RsaOaep => "Aes128Sha256RsaOaep",
            Self::Aes256Sha256RsaPss => "Aes256Sha256RsaPss",
        }
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Monitoring mode for monitored items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringMode {
    /// Sampling and reporting disabled.
    Disabled,
    /// Sampled but not reported.
    Sampling,
    /// Sampled and reported.
    #[default]
    Reporting,
}

impl MonitoringMode {
    /// The numeric value used in service requests.
    pub const fn value(self) -> u32 {
        match self {
            Self::Disabled => 0,
            Self::Sampling => 1,
            Self::Reporting => 2,
        }
    }
}

/// Parameters for a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSettings {
    /// Interval between publish cycles.
    #[serde(with = "humantime_serde")]
    pub publishing_interval: Duration,

    /// Publish cycles the subscription survives without a publish request.
    pub lifetime_count: u32,

    /// Empty publish cycles before a keep-alive is sent.
    pub keepalive_count: u32,

    /// Maximum notifications per publish response; 0 = unlimited.
    pub max_notifications_per_publish: u32,

    /// Relative priority among subscriptions.
    pub priority: u8,

    /// Whether publishing starts enabled.
    pub publishing_enabled: bool,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            publishing_interval: Duration::from_millis(1000),
            lifetime_count: 60,
            keepalive_count: 10,
            max_notifications_per_publish: 65_535,
            priority: 0,
            publishing_enabled: true,
        }
    }
}

impl SubscriptionSettings {
    /// Validates the counts against the protocol rules.
    pub fn validate(&self) -> Result<(), String> {
        if self.publishing_interval.is_zero() {
            return Err("publishing interval must be greater than 0".into());
        }
        if self.lifetime_count < 3 {
            return Err("lifetime count must be at least 3".into());
        }
        if self.keepalive_count == 0 {
            return Err("keep-alive count must be greater than 0".into());
        }
        if self.lifetime_count < self.keepalive_count * 3 {
            return Err("lifetime count must be at least 3x the keep-alive count".into());
        }
        Ok(())
    }
}

/// Parameters for monitored items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemSettings {
    /// How often the server samples the underlying value.
    #[serde(with = "humantime_serde")]
    pub sampling_interval: Duration,

    /// Values buffered per item between publish cycles.
    pub queue_size: u32,

    /// Drop the oldest value when the queue overflows.
    pub discard_oldest: bool,

    /// Monitoring mode for new items.
    pub monitoring_mode: MonitoringMode,
}

impl Default for MonitoredItemSettings {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_millis(250),
            queue_size: 10,
            discard_oldest: true,
            monitoring_mode: MonitoringMode::Reporting,
        }
    }
}

// =============================================================================
// Retry
// =============================================================================

/// How the delay between retries grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Same delay every attempt.
    Fixed,
    /// Delay grows linearly with the attempt number.
    Linear,
    /// Delay doubles each attempt.
    #[default]
    Exponential,
}

impl RetryStrategy {
    /// Delay before attempt `attempt` (1-based), uncapped.
    pub fn delay(self, base: Duration, attempt: u32) -> Duration {
        match self {
            Self::Fixed => base,
            Self::Linear => base.saturating_mul(attempt),
            Self::Exponential => base.saturating_mul(1u32 << (attempt - 1).min(16)),
        }
    }
}

/// Retry behavior for retryable failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts after the first failure; 0 disables retries.
    pub max_retries: u32,

    /// Base delay for the strategy.
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    /// Upper bound on any single delay.
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Growth strategy.
    pub strategy: RetryStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            strategy: RetryStrategy::Exponential,
        }
    }
}

impl RetryConfig {
    /// Capped delay before attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.strategy.delay(self.base_delay, attempt).min(self.max_delay)
    }
}

// =============================================================================
// Client configuration
// =============================================================================

/// Full client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Endpoint url, `opc.tcp://host:port[/path]`.
    pub endpoint_url: String,

    /// Application name announced in CreateSession.
    pub application_name: String,

    /// Application URI announced in CreateSession.
    pub application_uri: String,

    /// Security policy; only `None` is supported on the wire.
    pub security_policy: SecurityPolicy,

    /// Security mode; only `None` is supported on the wire.
    pub security_mode: SecurityMode,

    /// TCP connect and hello deadline.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Per-request deadline.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Session timeout requested from the server.
    #[serde(with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Secure-channel token lifetime requested from the server.
    #[serde(with = "humantime_serde")]
    pub channel_lifetime: Duration,

    /// Largest chunk accepted from the server.
    pub receive_buffer_size: u32,

    /// Largest chunk offered to the server.
    pub send_buffer_size: u32,

    /// Largest reassembled message accepted; 0 = unlimited.
    pub max_message_size: u32,

    /// Most chunks per message accepted; 0 = unlimited.
    pub max_chunk_count: u32,

    /// Retry behavior for retryable failures.
    pub retry: RetryConfig,

    /// Default parameters for new subscriptions.
    pub subscription: SubscriptionSettings,

    /// Default parameters for new monitored items.
    pub monitored_item: MonitoredItemSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            application_name: "uaforge".into(),
            application_uri: "urn:uaforge:client".into(),
            security_policy: SecurityPolicy::None,
            security_mode: SecurityMode::None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            session_timeout: Duration::from_secs(60),
            channel_lifetime: Duration::from_secs(3600),
            receive_buffer_size: 65_536,
            send_buffer_size: 65_536,
            max_message_size: 16 * 1024 * 1024,
            max_chunk_count: 4096,
            retry: RetryConfig::default(),
            subscription: SubscriptionSettings::default(),
            monitored_item: MonitoredItemSettings::default(),
        }
    }
}

impl ClientConfig {
    /// Starts a builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// A validated configuration for `opc.tcp://{host}:{port}`.
    pub fn for_host(host: &str, port: u16) -> ClientResult<Self> {
        Self::builder()
            .endpoint_url(format!("opc.tcp://{host}:{port}"))
            .build()
    }

    /// Checks the configuration against the supported feature set.
    pub fn validate(&self) -> ClientResult<()> {
        if !self.endpoint_url.starts_with("opc.tcp://") {
            return Err(ConfigError::InvalidEndpoint {
                url: self.endpoint_url.clone(),
            }
            .into());
        }
        if self.security_policy != SecurityPolicy::None || self.security_mode != SecurityMode::None
        {
            return Err(ConfigError::UnsupportedSecurity {
                policy: self.security_policy.as_str().into(),
                mode: self.security_mode.as_str().into(),
            }
            .into());
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "connect_timeout",
                reason: "must be greater than 0".into(),
            }
            .into());
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout",
                reason: "must be greater than 0".into(),
            }
            .into());
        }
        if self.session_timeout < Duration::from_secs(1) {
            return Err(ConfigError::InvalidValue {
                field: "session_timeout",
                reason: "must be at least 1s".into(),
            }
            .into());
        }
        if self.channel_lifetime < Duration::from_secs(10) {
            return Err(ConfigError::InvalidValue {
                field: "channel_lifetime",
                reason: "must be at least 10s".into(),
            }
            .into());
        }
        if self.send_buffer_size < 8192 || self.receive_buffer_size < 8192 {
            return Err(ConfigError::InvalidValue {
                field: "buffer sizes",
                reason: "must be at least 8192 bytes".into(),
            }
            .into());
        }
        if let Err(reason) = self.subscription.validate() {
            return Err(ConfigError::InvalidValue {
                field: "subscription",
                reason,
            }
            .into());
        }
        Ok(())
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Sets the endpoint url.
    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint_url = url.into();
        self
    }

    /// Sets the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.config.application_name = name.into();
        self
    }

    /// Sets the application URI.
    pub fn application_uri(mut self, uri: impl Into<String>) -> Self {
        self.config.application_uri = uri.into();
        self
    }

    /// Sets the security policy.
    pub fn security_policy(mut self, policy: SecurityPolicy) -> Self {
        self.config.security_policy = policy;
        self
    }

    /// Sets the security mode.
    pub fn security_mode(mut self, mode: SecurityMode) -> Self {
        self.config.security_mode = mode;
        self
    }

    /// Sets the TCP connect deadline.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the per-request deadline.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Sets the requested session timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.config.session_timeout = timeout;
        self
    }

    /// Sets the requested channel token lifetime.
    pub fn channel_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.channel_lifetime = lifetime;
        self
    }

    /// Sets the retry behavior.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Sets the default subscription settings.
    pub fn subscription(mut self, settings: SubscriptionSettings) -> Self {
        self.config.subscription = settings;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> ClientResult<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;

    #[test]
    fn test_builder_valid() {
        let config = ClientConfig::builder()
            .endpoint_url("opc.tcp://plc.local:4840")
            .application_name("test")
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(config.endpoint_url, "opc.tcp://plc.local:4840");
        assert_eq!(config.application_name, "test");
    }

    #[test]
    fn test_endpoint_scheme_enforced() {
        let err = ClientConfig::builder()
            .endpoint_url("http://plc.local:4840")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Config(ConfigError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_for_host_builds_url() {
        let config = ClientConfig::for_host("10.0.0.5", 4840).unwrap();
        assert_eq!(config.endpoint_url, "opc.tcp://10.0.0.5:4840");
    }

    #[test]
    fn test_secured_policy_rejected() {
        let err = ClientConfig::builder()
            .endpoint_url("opc.tcp://plc:4840")
            .security_policy(SecurityPolicy::Basic256Sha256)
            .security_mode(SecurityMode::SignAndEncrypt)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Config(ConfigError::UnsupportedSecurity { .. })
        ));
    }

    #[test]
    fn test_subscription_settings_validation() {
        let mut settings = SubscriptionSettings::default();
        assert!(settings.validate().is_ok());

        settings.lifetime_count = 2;
        assert!(settings.validate().is_err());

        settings.lifetime_count = 60;
        settings.keepalive_count = 30;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_retry_delays() {
        let retry = RetryConfig {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            strategy: RetryStrategy::Exponential,
        };
        assert_eq!(retry.delay(1), Duration::from_millis(100));
        assert_eq!(retry.delay(2), Duration::from_millis(200));
        assert_eq!(retry.delay(3), Duration::from_millis(350)); // capped

        let fixed = RetryConfig {
            strategy: RetryStrategy::Fixed,
            ..retry.clone()
        };
        assert_eq!(fixed.delay(4), Duration::from_millis(100));

        let linear = RetryConfig {
            strategy: RetryStrategy::Linear,
            ..retry
        };
        assert_eq!(linear.delay(2), Duration::from_millis(200));
        assert_eq!(linear.delay(3), Duration::from_millis(300));
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = ClientConfig::for_host("plc", 4840).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_policy_uris() {
        assert_eq!(
            SecurityPolicy::None.uri(),
            "http://opcfoundation.org/UA/SecurityPolicy#None"
        );
        assert!(SecurityPolicy::Basic256Sha256.uri().ends_with("Basic256Sha256"));
    }
}
