// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Secure channel lifecycle: open, lazy renewal, close.
//!
//! Under security policy None the channel carries no cryptography, but the
//! full OpenSecureChannel conversation still runs and the granted token ids
//! must ride on every subsequent chunk. Renewal is lazy: callers invoke
//! [`SecureChannel::ensure_fresh`] before a service call and the channel
//! renews once 75% of the token lifetime has elapsed.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use uaforge_wire::framing::PROTOCOL_VERSION;
use uaforge_wire::NodeId;

use crate::error::{ChannelError, ClientError, ClientResult, ServiceError};
use crate::service::{
    decode_response, encode_message, CloseSecureChannelRequest, OpenSecureChannelRequest,
    OpenSecureChannelResponse, RequestHeader, TokenRequestType,
};
use crate::transport::Transport;
use crate::types::{ClientConfig, SecurityMode, SecurityPolicy};

/// The fraction of the token lifetime after which a renewal is due.
const RENEW_AT: f64 = 0.75;

/// A granted channel security token.
#[derive(Debug, Clone, Copy)]
pub struct ChannelToken {
    /// Server-assigned secure channel id.
    pub channel_id: u32,
    /// Token id carried on MSG chunks.
    pub token_id: u32,
    /// When the token was received.
    pub issued_at: Instant,
    /// Granted lifetime.
    pub lifetime: Duration,
}

impl ChannelToken {
    /// `true` once 75% of the lifetime has elapsed.
    pub fn should_renew(&self) -> bool {
        self.issued_at.elapsed() >= self.lifetime.mul_f64(RENEW_AT)
    }

    /// `true` once the full lifetime has elapsed.
    pub fn is_expired(&self) -> bool {
        self.issued_at.elapsed() >= self.lifetime
    }
}

/// Client side of one secure channel over a connected transport.
pub struct SecureChannel {
    transport: Transport,
    policy: SecurityPolicy,
    mode: SecurityMode,
    requested_lifetime: Duration,
    request_timeout: Duration,
    token: Mutex<Option<ChannelToken>>,
    request_handle: AtomicU32,
}

impl SecureChannel {
    /// Wraps `transport` with the channel settings from `config`.
    pub fn new(transport: Transport, config: &ClientConfig) -> Self {
        Self {
            transport,
            policy: config.security_policy,
            mode: config.security_mode,
            requested_lifetime: config.channel_lifetime,
            request_timeout: config.request_timeout,
            token: Mutex::new(None),
            request_handle: AtomicU32::new(0),
        }
    }

    /// The transport this channel runs over.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Allocates the next request handle for a request header.
    pub fn next_handle(&self) -> u32 {
        self.request_handle.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Builds a request header carrying `authentication_token`.
    pub fn request_header(&self, authentication_token: NodeId) -> RequestHeader {
        RequestHeader::new(
            authentication_token,
            self.next_handle(),
            self.request_timeout.as_millis() as u32,
        )
    }

    /// The current token, if the channel is open.
    pub fn token(&self) -> Option<ChannelToken> {
        self.token.lock().ok().and_then(|slot| *slot)
    }

    /// `true` when a token is held and the transport is up.
    pub fn is_open(&self) -> bool {
        self.transport.is_alive() && self.token().is_some()
    }

    /// Opens the channel by issuing the first security token.
    pub async fn open(&self) -> ClientResult<()> {
        self.exchange(TokenRequestType::Issue).await
    }

    /// Renews the security token on the open channel.
    pub async fn renew(&self) -> ClientResult<()> {
        self.exchange(TokenRequestType::Renew).await
    }

    /// Renews the token if 75% of its lifetime has elapsed. An expired
    /// token is still offered for renewal; the server decides its fate.
    pub async fn ensure_fresh(&self) -> ClientResult<()> {
        let token = self.token().ok_or(ChannelError::NotOpen)?;
        if !token.should_renew() {
            return Ok(());
        }
        if token.is_expired() {
            warn!(
                channel_id = token.channel_id,
                "token expired before renewal, attempting renew anyway"
            );
        }
        self.renew().await
    }

    /// Sends CloseSecureChannel and forgets the token. The server closes
    /// the socket after processing, so no response is awaited.
    pub async fn close(&self) -> ClientResult<()> {
        let token = self.token().ok_or(ChannelError::NotOpen)?;
        let request = CloseSecureChannelRequest {
            header: self.request_header(NodeId::NULL),
        };
        let payload = encode_message(&request)?;
        let result = self.transport.send_close(&payload).await;
        if let Ok(mut slot) = self.token.lock() {
            *slot = None;
        }
        debug!(channel_id = token.channel_id, "secure channel closed");
        result
    }

    async fn exchange(&self, request_type: TokenRequestType) -> ClientResult<()> {
        let channel_id = match request_type {
            TokenRequestType::Issue => 0,
            TokenRequestType::Renew => self.token().ok_or(ChannelError::NotOpen)?.channel_id,
        };
        let request = OpenSecureChannelRequest {
            header: self.request_header(NodeId::NULL),
            client_protocol_version: PROTOCOL_VERSION,
            request_type,
            security_mode: self.mode.value(),
            client_nonce: None,
            requested_lifetime: self.requested_lifetime.as_millis() as u32,
        };
        let payload = encode_message(&request)?;
        let raw = self
            .transport
            .open_channel_request(channel_id, self.policy.uri(), &payload, self.request_timeout)
            .await?;
        let response: OpenSecureChannelResponse =
            decode_response(&raw).map_err(|e| remap_fault(e, request_type))?;

        let token = ChannelToken {
            channel_id: response.token.channel_id,
            token_id: response.token.token_id,
            issued_at: Instant::now(),
            lifetime: Duration::from_millis(u64::from(response.token.revised_lifetime)),
        };
        self.transport.set_security(token.channel_id, token.token_id);
        if let Ok(mut slot) = self.token.lock() {
            *slot = Some(token);
        }
        match request_type {
            TokenRequestType::Issue => info!(
                channel_id = token.channel_id,
                token_id = token.token_id,
                lifetime_ms = token.lifetime.as_millis() as u64,
                "secure channel opened"
            ),
            TokenRequestType::Renew => debug!(
                channel_id = token.channel_id,
                token_id = token.token_id,
                "secure channel token renewed"
            ),
        }
        Ok(())
    }
}

fn remap_fault(error: ClientError, request_type: TokenRequestType) -> ClientError {
    match error {
        ClientError::Service(ServiceError::Fault { status, .. }) => match request_type {
            TokenRequestType::Issue => ChannelError::OpenFailed { status }.into(),
            TokenRequestType::Renew => ChannelError::RenewFailed { status }.into(),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_renewal_thresholds() {
        let fresh = ChannelToken {
            channel_id: 1,
            token_id: 1,
            issued_at: Instant::now(),
            lifetime: Duration::from_secs(600),
        };
        assert!(!fresh.should_renew());
        assert!(!fresh.is_expired());

        let aging = ChannelToken {
            issued_at: Instant::now() - Duration::from_secs(480),
            ..fresh
        };
        assert!(aging.should_renew()); // past 75% of 600s
        assert!(!aging.is_expired());

        let dead = ChannelToken {
            issued_at: Instant::now() - Duration::from_secs(601),
            ..fresh
        };
        assert!(dead.should_renew());
        assert!(dead.is_expired());
    }

    #[test]
    fn test_fault_remap() {
        let fault = ClientError::service_fault(
            "OpenSecureChannel",
            uaforge_wire::StatusCode::BAD_SECURITY_POLICY_REJECTED,
        );
        assert!(matches!(
            remap_fault(fault, TokenRequestType::Issue),
            ClientError::Channel(ChannelError::OpenFailed { .. })
        ));

        let fault = ClientError::service_fault(
            "OpenSecureChannel",
            uaforge_wire::StatusCode::BAD_SECURITY_POLICY_REJECTED,
        );
        assert!(matches!(
            remap_fault(fault, TokenRequestType::Renew),
            ClientError::Channel(ChannelError::RenewFailed { .. })
        ));

        let timeout = ClientError::timeout("OpenSecureChannel", Duration::from_secs(1));
        assert!(matches!(
            remap_fault(timeout, TokenRequestType::Issue),
            ClientError::Timeout { .. }
        ));
    }
}
