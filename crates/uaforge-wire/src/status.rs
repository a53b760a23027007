// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA status codes.
//!
//! A status code is a 32-bit value whose top two bits carry the severity:
//! `00` good, `01` uncertain, `10` bad. The remaining bits identify the
//! condition. Only the codes this client produces or reacts to are named;
//! everything else is carried through opaquely.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 32-bit OPC UA status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// The operation succeeded.
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);
    /// The operation timed out.
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800A_0000);
    /// An unexpected error occurred.
    pub const BAD_UNEXPECTED_ERROR: StatusCode = StatusCode(0x8001_0000);
    /// An internal error occurred.
    pub const BAD_INTERNAL_ERROR: StatusCode = StatusCode(0x8002_0000);
    /// The connection was closed by the peer.
    pub const BAD_CONNECTION_CLOSED: StatusCode = StatusCode(0x80AE_0000);
    /// The secure channel id is not known to the server.
    pub const BAD_SECURE_CHANNEL_ID_INVALID: StatusCode = StatusCode(0x8022_0000);
    /// The secure channel token has expired.
    pub const BAD_SECURE_CHANNEL_TOKEN_UNKNOWN: StatusCode = StatusCode(0x8086_0000);
    /// The session id is not valid.
    pub const BAD_SESSION_ID_INVALID: StatusCode = StatusCode(0x8025_0000);
    /// The session was closed by the client.
    pub const BAD_SESSION_CLOSED: StatusCode = StatusCode(0x8026_0000);
    /// The session cannot be used because activation failed or never happened.
    pub const BAD_SESSION_NOT_ACTIVATED: StatusCode = StatusCode(0x8027_0000);
    /// The node id refers to a node that does not exist.
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8034_0000);
    /// The value supplied for the attribute has the wrong type.
    pub const BAD_TYPE_MISMATCH: StatusCode = StatusCode(0x8074_0000);
    /// The attribute is not supported for the node.
    pub const BAD_ATTRIBUTE_ID_INVALID: StatusCode = StatusCode(0x8035_0000);
    /// There was nothing to do because the request contained no work.
    pub const BAD_NOTHING_TO_DO: StatusCode = StatusCode(0x800F_0000);
    /// The requested operation is not supported.
    pub const BAD_SERVICE_UNSUPPORTED: StatusCode = StatusCode(0x800B_0000);
    /// The subscription id is not valid.
    pub const BAD_SUBSCRIPTION_ID_INVALID: StatusCode = StatusCode(0x8028_0000);
    /// The monitored item id is not valid.
    pub const BAD_MONITORED_ITEM_ID_INVALID: StatusCode = StatusCode(0x8042_0000);
    /// The requested retransmit sequence number is not available.
    pub const BAD_SEQUENCE_NUMBER_UNKNOWN: StatusCode = StatusCode(0x807A_0000);
    /// Too many publish requests are queued.
    pub const BAD_TOO_MANY_PUBLISH_REQUESTS: StatusCode = StatusCode(0x806D_0000);
    /// The server does not recognize the protocol version.
    pub const BAD_PROTOCOL_VERSION_UNSUPPORTED: StatusCode = StatusCode(0x80BE_0000);
    /// A low-level connection was rejected by the server.
    pub const BAD_TCP_MESSAGE_TYPE_INVALID: StatusCode = StatusCode(0x807E_0000);
    /// A message exceeded the negotiated limits.
    pub const BAD_TCP_MESSAGE_TOO_LARGE: StatusCode = StatusCode(0x8080_0000);
    /// The communication channel failed.
    pub const BAD_COMMUNICATION_ERROR: StatusCode = StatusCode(0x8005_0000);
    /// The identity token is not valid.
    pub const BAD_IDENTITY_TOKEN_INVALID: StatusCode = StatusCode(0x8020_0000);
    /// The requested security policy is not accepted.
    pub const BAD_SECURITY_POLICY_REJECTED: StatusCode = StatusCode(0x8055_0000);
    /// The value is uncertain because the last usable value has gone stale.
    pub const UNCERTAIN_LAST_USABLE_VALUE: StatusCode = StatusCode(0x408A_0000);

    const SEVERITY_MASK: u32 = 0xC000_0000;
    const SEVERITY_UNCERTAIN: u32 = 0x4000_0000;
    const SEVERITY_BAD: u32 = 0x8000_0000;

    /// Returns `true` when the severity bits indicate success.
    #[inline]
    pub const fn is_good(self) -> bool {
        self.0 & Self::SEVERITY_MASK == 0
    }

    /// Returns `true` when the severity bits indicate an uncertain value.
    #[inline]
    pub const fn is_uncertain(self) -> bool {
        self.0 & Self::SEVERITY_MASK == Self::SEVERITY_UNCERTAIN
    }

    /// Returns `true` when the severity bits indicate failure.
    #[inline]
    pub const fn is_bad(self) -> bool {
        self.0 & Self::SEVERITY_MASK == Self::SEVERITY_BAD
    }

    /// Raw numeric value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Symbolic name for the codes this crate defines, if any.
    pub const fn name(self) -> Option<&'static str> {
        match self {
            Self::GOOD => Some("Good"),
            Self::BAD_TIMEOUT => Some("BadTimeout"),
            Self::BAD_UNEXPECTED_ERROR => Some("BadUnexpectedError"),
            Self::BAD_INTERNAL_ERROR => Some("BadInternalError"),
            Self::BAD_CONNECTION_CLOSED => Some("BadConnectionClosed"),
            Self::BAD_SECURE_CHANNEL_ID_INVALID => Some("BadSecureChannelIdInvalid"),
            Self::BAD_SECURE_CHANNEL_TOKEN_UNKNOWN => Some("BadSecureChannelTokenUnknown"),
            Self::BAD_SESSION_ID_INVALID => Some("BadSessionIdInvalid"),
            Self::BAD_SESSION_CLOSED => Some("BadSessionClosed"),
            Self::BAD_SESSION_NOT_ACTIVATED => Some("BadSessionNotActivated"),
            Self::BAD_NODE_ID_UNKNOWN => Some("BadNodeIdUnknown"),
            Self::BAD_TYPE_MISMATCH => Some("BadTypeMismatch"),
            Self::BAD_ATTRIBUTE_ID_INVALID => Some("BadAttributeIdInvalid"),
            Self::BAD_NOTHING_TO_DO => Some("BadNothingToDo"),
            Self::BAD_SERVICE_UNSUPPORTED => Some("BadServiceUnsupported"),
            Self::BAD_SUBSCRIPTION_ID_INVALID => Some("BadSubscriptionIdInvalid"),
            Self::BAD_MONITORED_ITEM_ID_INVALID => Some("BadMonitoredItemIdInvalid"),
            Self::BAD_SEQUENCE_NUMBER_UNKNOWN => Some("BadSequenceNumberUnknown"),
            Self::BAD_TOO_MANY_PUBLISH_REQUESTS => Some("BadTooManyPublishRequests"),
            Self::BAD_PROTOCOL_VERSION_UNSUPPORTED => Some("BadProtocolVersionUnsupported"),
            Self::BAD_TCP_MESSAGE_TYPE_INVALID => Some("BadTcpMessageTypeInvalid"),
            Self::BAD_TCP_MESSAGE_TOO_LARGE => Some("BadTcpMessageTooLarge"),
            Self::BAD_COMMUNICATION_ERROR => Some("BadCommunicationError"),
            Self::BAD_IDENTITY_TOKEN_INVALID => Some("BadIdentityTokenInvalid"),
            Self::BAD_SECURITY_POLICY_REJECTED => Some("BadSecurityPolicyRejected"),
            Self::UNCERTAIN_LAST_USABLE_VALUE => Some("UncertainLastUsableValue"),
            _ => None,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{:#010x}", self.0),
        }
    }
}

impl From<u32> for StatusCode {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<StatusCode> for u32 {
    fn from(code: StatusCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_bits() {
        assert!(StatusCode::GOOD.is_good());
        assert!(!StatusCode::GOOD.is_bad());
        assert!(!StatusCode::GOOD.is_uncertain());

        assert!(StatusCode::BAD_TIMEOUT.is_bad());
        assert!(!StatusCode::BAD_TIMEOUT.is_good());

        assert!(StatusCode::UNCERTAIN_LAST_USABLE_VALUE.is_uncertain());
        assert!(!StatusCode::UNCERTAIN_LAST_USABLE_VALUE.is_bad());
        assert!(!StatusCode::UNCERTAIN_LAST_USABLE_VALUE.is_good());
    }

    #[test]
    fn test_display() {
        assert_eq!(StatusCode::GOOD.to_string(), "Good");
        assert_eq!(StatusCode::BAD_NODE_ID_UNKNOWN.to_string(), "BadNodeIdUnknown");
        assert_eq!(StatusCode(0x8123_0000).to_string(), "0x81230000");
    }

    #[test]
    fn test_raw_round_trip() {
        let code = StatusCode::from(0x800A_0000);
        assert_eq!(code, StatusCode::BAD_TIMEOUT);
        assert_eq!(u32::from(code), 0x800A_0000);
    }
}
