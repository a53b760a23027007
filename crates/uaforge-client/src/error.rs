// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client error hierarchy.
//!
//! Errors are grouped by the layer that raises them:
//!
//! ```text
//! ClientError
//! ├── Connection    TCP connect, hello/acknowledge, socket loss
//! ├── Channel       secure-channel open/renew/close
//! ├── Session       create/activate/close, expiry
//! ├── Service       service faults and bad per-item status codes
//! ├── Subscription  create/publish/republish, engine lifecycle
//! ├── Conversion    typed-value coercion
//! ├── Config        rejected configuration
//! ├── Timeout       elapsed deadlines
//! └── Wire          encoding/decoding/framing (from uaforge-wire)
//! ```
//!
//! [`ClientError::is_retryable`] drives the retry loop in the client:
//! transport-level losses and timeouts are retried, semantic failures such
//! as an unknown node id are not.

use std::time::Duration;

use thiserror::Error;
use uaforge_wire::{NodeId, StatusCode, WireError};

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// How severe an error is for alerting and logging purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Expected during normal operation (reconnects, renewals).
    Info,
    /// Degraded but recoverable.
    Warning,
    /// Operation failed, caller intervention likely.
    Error,
    /// The client cannot continue without reconfiguration.
    Critical,
}

// =============================================================================
// Layer errors
// =============================================================================

/// Errors establishing or keeping the TCP connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// TCP connect failed.
    #[error("connection to {endpoint} failed: {source}")]
    Io {
        /// Endpoint url.
        endpoint: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// The server answered Hello with ERR.
    #[error("server rejected hello ({status}): {reason}")]
    HelloRejected {
        /// Status code from the ERR message.
        status: StatusCode,
        /// Reason text from the ERR message.
        reason: String,
    },

    /// The server sent ERR or closed the socket mid-conversation.
    #[error("connection lost: {reason}")]
    Lost {
        /// What was observed.
        reason: String,
    },

    /// An operation needs a connection that is not there.
    #[error("not connected")]
    NotConnected,

    /// The peer violated the framing rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

/// Errors at the secure-channel layer.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// OpenSecureChannel was rejected.
    #[error("open secure channel failed: {status}")]
    OpenFailed {
        /// Service result.
        status: StatusCode,
    },

    /// Renewal of the channel token was rejected.
    #[error("secure channel renewal failed: {status}")]
    RenewFailed {
        /// Service result.
        status: StatusCode,
    },

    /// The token lifetime elapsed before a renewal landed.
    #[error("secure channel token expired")]
    TokenExpired,

    /// No channel is open.
    #[error("secure channel is not open")]
    NotOpen,
}

/// Errors at the session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// CreateSession was rejected.
    #[error("create session failed: {status}")]
    CreateFailed {
        /// Service result.
        status: StatusCode,
    },

    /// ActivateSession was rejected.
    #[error("activate session failed: {status}")]
    ActivateFailed {
        /// Service result.
        status: StatusCode,
    },

    /// A service call needs an active session.
    #[error("session is not active (state: {state})")]
    NotActive {
        /// The state the session was in.
        state: &'static str,
    },

    /// The server no longer recognizes the session.
    #[error("session expired or invalid: {status}")]
    Invalid {
        /// Service result that revealed it.
        status: StatusCode,
    },
}

/// Service-level failures.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The server answered with a ServiceFault or bad service result.
    #[error("{service} failed: {status}")]
    Fault {
        /// Service name.
        service: &'static str,
        /// Service result.
        status: StatusCode,
    },

    /// The response type id did not match the request.
    #[error("{service}: unexpected response type {actual}")]
    UnexpectedResponse {
        /// Service name.
        service: &'static str,
        /// Type id that arrived.
        actual: NodeId,
    },

    /// The response carried a different number of results than requested.
    #[error("{service}: expected {expected} results, got {actual}")]
    ResultCountMismatch {
        /// Service name.
        service: &'static str,
        /// Number of operations requested.
        expected: usize,
        /// Number of results received.
        actual: usize,
    },

    /// The response echoed a request handle we never sent.
    #[error("{service}: response carries request handle {actual}, expected {expected}")]
    HandleMismatch {
        /// Service name.
        service: &'static str,
        /// The handle sent with the request.
        expected: u32,
        /// The handle the server echoed.
        actual: u32,
    },

    /// A per-item operation came back with a bad status.
    #[error("operation on {node_id} failed: {status}")]
    BadItemStatus {
        /// The node the operation addressed.
        node_id: NodeId,
        /// The per-item status.
        status: StatusCode,
    },
}

/// Subscription and monitored-item failures.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// CreateSubscription was rejected.
    #[error("create subscription failed: {status}")]
    CreateFailed {
        /// Service result.
        status: StatusCode,
    },

    /// The settings were rejected before reaching the server.
    #[error("invalid subscription settings: {reason}")]
    InvalidSettings {
        /// What was wrong.
        reason: String,
    },

    /// No such subscription is tracked by the engine.
    #[error("subscription {id} not found")]
    NotFound {
        /// The missing subscription id.
        id: u32,
    },

    /// A monitored item could not be created.
    #[error("monitored item for {node_id} failed: {status}")]
    MonitoredItemFailed {
        /// The node that was to be monitored.
        node_id: NodeId,
        /// The per-item status.
        status: StatusCode,
    },

    /// A Publish response reported failure.
    #[error("publish failed: {status}")]
    PublishFailed {
        /// Service result.
        status: StatusCode,
    },

    /// The publish pump is no longer running.
    #[error("subscription engine stopped")]
    EngineStopped,
}

/// Typed-value coercion failures.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The variant does not hold the requested type.
    #[error("type mismatch: expected {expected}, value is {actual}")]
    TypeMismatch {
        /// Requested type.
        expected: &'static str,
        /// What the variant actually holds.
        actual: String,
    },

    /// Parsing the rendered value into the target type failed.
    #[error("cannot parse {value:?} as {target}")]
    ParseFailed {
        /// The rendered value.
        value: String,
        /// Target type name.
        target: &'static str,
    },

    /// The value was null where content was required.
    #[error("value is null")]
    NullValue,
}

/// Configuration rejected by validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Endpoint url has the wrong scheme or shape.
    #[error("invalid endpoint url {url:?}: must start with opc.tcp://")]
    InvalidEndpoint {
        /// The offending url.
        url: String,
    },

    /// The security policy/mode combination is not supported on the wire.
    #[error("unsupported security configuration: policy {policy}, mode {mode}")]
    UnsupportedSecurity {
        /// Configured policy name.
        policy: String,
        /// Configured mode name.
        mode: String,
    },

    /// A field failed validation.
    #[error("invalid configuration: {field}: {reason}")]
    InvalidValue {
        /// The field name.
        field: &'static str,
        /// What was wrong.
        reason: String,
    },
}

// =============================================================================
// Top-level error
// =============================================================================

/// Any error this client can produce.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Secure-channel failure.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Session failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Service failure.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Subscription failure.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// Value coercion failure.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Rejected configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Encoding, decoding, or framing failure.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// A deadline elapsed.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// The operation that was abandoned.
        operation: &'static str,
        /// The deadline that elapsed.
        timeout: Duration,
    },
}

impl ClientError {
    /// Shorthand for the timeout variant.
    pub fn timeout(operation: &'static str, timeout: Duration) -> Self {
        Self::Timeout { operation, timeout }
    }

    /// Shorthand for "no connection".
    pub fn not_connected() -> Self {
        Self::Connection(ConnectionError::NotConnected)
    }

    /// Shorthand for a lost connection.
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::Connection(ConnectionError::Lost {
            reason: reason.into(),
        })
    }

    /// Shorthand for a service fault.
    pub fn service_fault(service: &'static str, status: StatusCode) -> Self {
        Self::Service(ServiceError::Fault { service, status })
    }

    /// Shorthand for a bad per-item status.
    pub fn bad_item_status(node_id: NodeId, status: StatusCode) -> Self {
        Self::Service(ServiceError::BadItemStatus { node_id, status })
    }

    /// Returns `true` when retrying the operation on a fresh connection has
    /// a reasonable chance of success.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => !matches!(e, ConnectionError::ProtocolViolation(_)),
            Self::Channel(e) => matches!(e, ChannelError::TokenExpired | ChannelError::NotOpen),
            Self::Session(e) => matches!(e, SessionError::Invalid { .. }),
            Self::Service(ServiceError::Fault { status, .. }) => {
                matches!(
                    *status,
                    StatusCode::BAD_TIMEOUT
                        | StatusCode::BAD_SESSION_ID_INVALID
                        | StatusCode::BAD_SECURE_CHANNEL_ID_INVALID
                        | StatusCode::BAD_SECURE_CHANNEL_TOKEN_UNKNOWN
                        | StatusCode::BAD_COMMUNICATION_ERROR
                        | StatusCode::BAD_TOO_MANY_PUBLISH_REQUESTS
                )
            }
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Coarse layer name used in log fields.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Channel(_) => "channel",
            Self::Session(_) => "session",
            Self::Service(_) => "service",
            Self::Subscription(_) => "subscription",
            Self::Conversion(_) => "conversion",
            Self::Config(_) => "config",
            Self::Wire(_) => "wire",
            Self::Timeout { .. } => "timeout",
        }
    }

    /// Severity for alerting.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Config(_) => ErrorSeverity::Critical,
            Self::Connection(ConnectionError::ProtocolViolation(_)) => ErrorSeverity::Critical,
            Self::Channel(ChannelError::TokenExpired) => ErrorSeverity::Info,
            Self::Connection(_) | Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::Conversion(_) => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Logs the error at a level matching its severity.
    pub fn log(&self) {
        match self.severity() {
            ErrorSeverity::Info => tracing::info!(category = self.category(), error = %self),
            ErrorSeverity::Warning => tracing::warn!(category = self.category(), error = %self),
            ErrorSeverity::Error | ErrorSeverity::Critical => {
                tracing::error!(category = self.category(), error = %self)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ClientError::not_connected().is_retryable());
        assert!(ClientError::connection_lost("eof").is_retryable());
        assert!(ClientError::timeout("read", Duration::from_secs(5)).is_retryable());
        assert!(ClientError::from(ChannelError::TokenExpired).is_retryable());
        assert!(
            ClientError::service_fault("Read", StatusCode::BAD_SESSION_ID_INVALID).is_retryable()
        );

        assert!(!ClientError::service_fault("Read", StatusCode::BAD_NODE_ID_UNKNOWN).is_retryable());
        assert!(!ClientError::from(ConversionError::NullValue).is_retryable());
        assert!(!ClientError::from(ConfigError::InvalidEndpoint {
            url: "http://x".into()
        })
        .is_retryable());
        assert!(!ClientError::from(ConnectionError::ProtocolViolation("bad header".into()))
            .is_retryable());
    }

    #[test]
    fn test_category_and_severity() {
        let err = ClientError::from(ConfigError::InvalidEndpoint {
            url: "http://x".into(),
        });
        assert_eq!(err.category(), "config");
        assert_eq!(err.severity(), ErrorSeverity::Critical);

        let err = ClientError::from(ChannelError::TokenExpired);
        assert_eq!(err.severity(), ErrorSeverity::Info);

        let err = ClientError::bad_item_status(NodeId::string(2, "T"), StatusCode::BAD_NODE_ID_UNKNOWN);
        assert_eq!(err.category(), "service");
        assert_eq!(err.severity(), ErrorSeverity::Error);
    }

    #[test]
    fn test_display_carries_context() {
        let err = ClientError::bad_item_status(
            NodeId::string(2, "Temperature"),
            StatusCode::BAD_NODE_ID_UNKNOWN,
        );
        let text = err.to_string();
        assert!(text.contains("ns=2;s=Temperature"));
        assert!(text.contains("BadNodeIdUnknown"));
    }

    #[test]
    fn test_wire_error_propagates() {
        let wire = WireError::UnsupportedVariantType(22);
        let err = ClientError::from(wire);
        assert_eq!(err.category(), "wire");
        assert!(!err.is_retryable());
    }
}
