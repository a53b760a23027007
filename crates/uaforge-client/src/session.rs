// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session establishment and the service-call path.
//!
//! A session is created and activated over an open secure channel; the
//! authentication token handed back by CreateSession rides in the request
//! header of every subsequent service call. All service invocations funnel
//! through [`Session::call`], which refreshes the channel token first and
//! downgrades the session when the server stops recognizing it.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use uaforge_wire::{Encode, NodeId, StatusCode};

use crate::channel::SecureChannel;
use crate::error::{ClientError, ClientResult, ServiceError, SessionError};
use crate::service::{
    decode_response, encode_message, ActivateSessionRequest, ActivateSessionResponse,
    ApplicationDescription, CloseSessionRequest, CloseSessionResponse, CreateSessionRequest,
    CreateSessionResponse, ReadRequest, ReadResponse, ReadValueId, RequestHeader, ResponseMessage,
    ServiceMessage, TIMESTAMPS_BOTH,
};
use crate::types::ClientConfig;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session exists on the server.
    Closed,
    /// CreateSession succeeded but ActivateSession has not.
    Created,
    /// The session accepts service calls.
    Active,
}

impl SessionState {
    /// Display name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Created => "created",
            Self::Active => "active",
        }
    }
}

#[derive(Debug, Clone)]
struct SessionInfo {
    state: SessionState,
    session_id: NodeId,
    authentication_token: NodeId,
    revised_timeout: Duration,
    last_activity: Option<Instant>,
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self {
            state: SessionState::Closed,
            session_id: NodeId::NULL,
            authentication_token: NodeId::NULL,
            revised_timeout: Duration::ZERO,
            last_activity: None,
        }
    }
}

/// A client session over one secure channel.
pub struct Session {
    channel: Arc<SecureChannel>,
    endpoint_url: String,
    application_name: String,
    application_uri: String,
    session_timeout: Duration,
    request_timeout: Duration,
    info: Mutex<SessionInfo>,
}

impl Session {
    /// Binds a session to `channel` with the settings from `config`.
    pub fn new(channel: Arc<SecureChannel>, config: &ClientConfig) -> Self {
        Self {
            channel,
            endpoint_url: config.endpoint_url.clone(),
            application_name: config.application_name.clone(),
            application_uri: config.application_uri.clone(),
            session_timeout: config.session_timeout,
            request_timeout: config.request_timeout,
            info: Mutex::new(SessionInfo::default()),
        }
    }

    /// The channel this session runs over.
    pub fn channel(&self) -> &Arc<SecureChannel> {
        &self.channel
    }

    /// The current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.info
            .lock()
            .map(|info| info.state)
            .unwrap_or(SessionState::Closed)
    }

    /// `true` when service calls are accepted.
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// The server-assigned session id, null when closed.
    pub fn session_id(&self) -> NodeId {
        self.info
            .lock()
            .map(|info| info.session_id.clone())
            .unwrap_or(NodeId::NULL)
    }

    /// The session timeout granted by the server.
    pub fn revised_timeout(&self) -> Duration {
        self.info
            .lock()
            .map(|info| info.revised_timeout)
            .unwrap_or(Duration::ZERO)
    }

    /// `true` once 75% of the revised timeout has elapsed without a
    /// service call, meaning the session needs a keep-alive soon.
    pub fn is_expiring(&self) -> bool {
        let Ok(info) = self.info.lock() else {
            return false;
        };
        if info.state != SessionState::Active || info.revised_timeout.is_zero() {
            return false;
        }
        match info.last_activity {
            Some(at) => at.elapsed() >= info.revised_timeout.mul_f64(0.75),
            None => false,
        }
    }

    fn touch(&self) {
        if let Ok(mut info) = self.info.lock() {
            info.last_activity = Some(Instant::now());
        }
    }

    fn authentication_token(&self) -> ClientResult<NodeId> {
        let info = self
            .info
            .lock()
            .map_err(|_| ClientError::connection_lost("session state poisoned"))?;
        if info.state != SessionState::Active {
            return Err(SessionError::NotActive {
                state: info.state.as_str(),
            }
            .into());
        }
        Ok(info.authentication_token.clone())
    }

    /// Creates and activates the session.
    pub async fn open(&self) -> ClientResult<()> {
        let created = self.create().await?;
        self.activate(&created).await?;

        if let Ok(mut info) = self.info.lock() {
            info.state = SessionState::Active;
            info.session_id = created.session_id.clone();
            info.authentication_token = created.authentication_token.clone();
            info.revised_timeout =
                Duration::from_millis(created.revised_session_timeout.max(0.0) as u64);
            info.last_activity = Some(Instant::now());
        }
        info!(
            session_id = %created.session_id,
            timeout_ms = created.revised_session_timeout,
            "session active"
        );
        Ok(())
    }

    async fn create(&self) -> ClientResult<CreateSessionResponse> {
        self.channel.ensure_fresh().await?;
        let request = CreateSessionRequest {
            header: self.channel.request_header(NodeId::NULL),
            client_description: ApplicationDescription {
                application_uri: self.application_uri.clone(),
                product_uri: self.application_uri.clone(),
                application_name: uaforge_wire::LocalizedText::new(&*self.application_name),
                application_type: 1, // client
                gateway_server_uri: None,
                discovery_profile_uri: None,
                discovery_urls: Vec::new(),
            },
            server_uri: None,
            endpoint_url: self.endpoint_url.clone(),
            session_name: format!("{}-session", self.application_name),
            client_nonce: Some(session_nonce()),
            client_certificate: None,
            requested_session_timeout: self.session_timeout.as_millis() as f64,
            max_response_message_size: 0,
        };
        let payload = encode_message(&request)?;
        let raw = self
            .channel
            .transport()
            .request(CreateSessionRequest::NAME, &payload, self.request_timeout)
            .await?;
        decode_response::<CreateSessionResponse>(&raw).map_err(|e| match e {
            ClientError::Service(ServiceError::Fault { status, .. }) => {
                SessionError::CreateFailed { status }.into()
            }
            other => other,
        })
    }

    async fn activate(&self, created: &CreateSessionResponse) -> ClientResult<()> {
        let policy_id = anonymous_policy_id(created);
        debug!(policy_id = %policy_id, "activating session with anonymous identity");
        let request = ActivateSessionRequest {
            header: self
                .channel
                .request_header(created.authentication_token.clone()),
            user_identity_token: ActivateSessionRequest::anonymous_token(&policy_id)?,
            locale_ids: vec!["en".to_string()],
        };
        let payload = encode_message(&request)?;
        let raw = self
            .channel
            .transport()
            .request(ActivateSessionRequest::NAME, &payload, self.request_timeout)
            .await?;
        decode_response::<ActivateSessionResponse>(&raw)
            .map(|_| ())
            .map_err(|e| match e {
                ClientError::Service(ServiceError::Fault { status, .. }) => {
                    SessionError::ActivateFailed { status }.into()
                }
                other => other,
            })
    }

    /// Closes the session on the server. Safe to call when not active.
    pub async fn close(&self, delete_subscriptions: bool) -> ClientResult<()> {
        let token = match self.authentication_token() {
            Ok(token) => token,
            Err(_) => return Ok(()),
        };
        let request = CloseSessionRequest {
            header: self.channel.request_header(token),
            delete_subscriptions,
        };
        let payload = encode_message(&request)?;
        let result = self
            .channel
            .transport()
            .request(CloseSessionRequest::NAME, &payload, self.request_timeout)
            .await
            .and_then(|raw| decode_response::<CloseSessionResponse>(&raw).map(|_| ()));
        if let Ok(mut info) = self.info.lock() {
            *info = SessionInfo::default();
        }
        match result {
            Ok(()) => debug!("session closed"),
            Err(ref e) => warn!(error = %e, "close session failed"),
        }
        result
    }

    /// Invokes a service with the configured request timeout.
    pub async fn call<Q, R>(&self, build: impl FnOnce(RequestHeader) -> Q) -> ClientResult<R>
    where
        Q: ServiceMessage + Encode,
        R: ResponseMessage,
    {
        self.call_with_timeout(self.request_timeout, build).await
    }

    /// Invokes a service with an explicit timeout. Publish requests sit on
    /// the server for up to a full publishing cycle and need more room than
    /// the ordinary request timeout.
    pub async fn call_with_timeout<Q, R>(
        &self,
        timeout: Duration,
        build: impl FnOnce(RequestHeader) -> Q,
    ) -> ClientResult<R>
    where
        Q: ServiceMessage + Encode,
        R: ResponseMessage,
    {
        let token = self.authentication_token()?;
        self.channel.ensure_fresh().await?;
        let header = self.channel.request_header(token);
        let request_handle = header.request_handle;
        let request = build(header);
        let payload = encode_message(&request)?;
        let raw = self
            .channel
            .transport()
            .request(Q::NAME, &payload, timeout)
            .await?;
        match decode_response::<R>(&raw) {
            Ok(response) => {
                let echoed = response.header().request_handle;
                if echoed != request_handle {
                    return Err(ServiceError::HandleMismatch {
                        service: Q::NAME,
                        expected: request_handle,
                        actual: echoed,
                    }
                    .into());
                }
                self.touch();
                Ok(response)
            }
            Err(ClientError::Service(ServiceError::Fault { status, .. }))
                if is_session_invalid(status) =>
            {
                if let Ok(mut info) = self.info.lock() {
                    *info = SessionInfo::default();
                }
                warn!(%status, "server no longer recognizes the session");
                Err(SessionError::Invalid { status }.into())
            }
            other => other,
        }
    }

    /// Reads `Server_ServerStatus_State` to keep the session alive.
    pub async fn keep_alive(&self) -> ClientResult<()> {
        let response: ReadResponse = self
            .call(|header| ReadRequest {
                header,
                max_age: 0.0,
                timestamps_to_return: TIMESTAMPS_BOTH,
                nodes_to_read: vec![ReadValueId::value_of(NodeId::SERVER_STATUS_STATE)],
            })
            .await?;
        match response.results.first() {
            Some(value) if !value.status().is_bad() => Ok(()),
            Some(value) => Err(ClientError::bad_item_status(
                NodeId::SERVER_STATUS_STATE,
                value.status(),
            )),
            None => Err(ServiceError::ResultCountMismatch {
                service: "Read",
                expected: 1,
                actual: 0,
            }
            .into()),
        }
    }
}

/// 32 bytes of nonce material.
fn session_nonce() -> Vec<u8> {
    let mut nonce = Vec::with_capacity(32);
    nonce.extend_from_slice(Uuid::new_v4().as_bytes());
    nonce.extend_from_slice(Uuid::new_v4().as_bytes());
    nonce
}

/// Picks the anonymous user token policy id from the server's endpoints,
/// preferring the endpoint that matches the url we connected to.
fn anonymous_policy_id(created: &CreateSessionResponse) -> String {
    let mut fallback = None;
    for endpoint in &created.server_endpoints {
        if let Some(policy_id) = endpoint.anonymous_policy_id() {
            if endpoint.security_policy_uri.ends_with("#None") {
                return policy_id.to_string();
            }
            fallback.get_or_insert_with(|| policy_id.to_string());
        }
    }
    fallback.unwrap_or_else(|| "anonymous".to_string())
}

fn is_session_invalid(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_SESSION_ID_INVALID
            | StatusCode::BAD_SESSION_CLOSED
            | StatusCode::BAD_SESSION_NOT_ACTIVATED
    )
}
