// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Typed service request and response messages.
//!
//! Every service payload is the node id of the message's DefaultBinary
//! encoding followed by the message body. Both directions are implemented
//! for every message so the test harness can speak the server side of the
//! conversation.

use bytes::{Buf, BufMut};
use chrono::{DateTime, Utc};

use uaforge_wire::codec::{
    read_array, read_byte_string, read_date_time, read_expanded_node_id, read_string, write_array,
    write_expanded_node_id,
    write_byte_string, write_date_time, write_string,
};
use uaforge_wire::{
    DataValue, Decode, DiagnosticInfo, Encode, ExtensionObject, LocalizedText, NodeId,
    QualifiedName, StatusCode, WireError, WireResult,
};

use crate::error::{ClientError, ClientResult, ServiceError};

/// The Value attribute id.
pub const ATTRIBUTE_VALUE: u32 = 13;

/// TimestampsToReturn: both source and server timestamps.
pub const TIMESTAMPS_BOTH: u32 = 2;

/// DefaultBinary encoding id of the DataChangeNotification structure.
pub const DATA_CHANGE_NOTIFICATION_TYPE: u32 = 811;

/// DefaultBinary encoding id of the AnonymousIdentityToken structure.
pub const ANONYMOUS_IDENTITY_TOKEN_TYPE: u32 = 321;

/// A service message with a fixed DefaultBinary encoding id.
pub trait ServiceMessage {
    /// Numeric node id (namespace 0) of the DefaultBinary encoding.
    const TYPE_ID: u32;

    /// Service name used in errors and logs.
    const NAME: &'static str;
}

/// Encodes a service message as `type id + body`.
pub fn encode_message<M: ServiceMessage + Encode>(message: &M) -> WireResult<Vec<u8>> {
    let mut buf = Vec::new();
    NodeId::numeric(0, M::TYPE_ID).encode(&mut buf)?;
    message.encode(&mut buf)?;
    Ok(buf)
}

/// Decodes the leading type id of a service payload.
pub fn decode_type_id<B: Buf>(buf: &mut B) -> WireResult<NodeId> {
    NodeId::decode(buf)
}

/// A response message whose header can be inspected generically.
pub trait ResponseMessage: ServiceMessage + Decode {
    /// The response header.
    fn header(&self) -> &ResponseHeader;
}

macro_rules! response_message {
    ($($ty:ty),* $(,)?) => {$(
        impl ResponseMessage for $ty {
            fn header(&self) -> &ResponseHeader {
                &self.header
            }
        }
    )*};
}

response_message!(
    OpenSecureChannelResponse,
    CreateSessionResponse,
    ActivateSessionResponse,
    CloseSessionResponse,
    ReadResponse,
    WriteResponse,
    BrowseResponse,
    BrowseNextResponse,
    CreateSubscriptionResponse,
    CreateMonitoredItemsResponse,
    DeleteMonitoredItemsResponse,
    DeleteSubscriptionsResponse,
    PublishResponse,
    RepublishResponse,
);

/// Decodes a service response payload, turning ServiceFault, mismatched
/// type ids, and bad service results into errors.
pub fn decode_response<M: ResponseMessage>(payload: &[u8]) -> ClientResult<M> {
    let mut slice = payload;
    let type_id = decode_type_id(&mut slice)?;
    if type_id == NodeId::numeric(0, ServiceFault::TYPE_ID) {
        let fault = ServiceFault::decode(&mut slice)?;
        return Err(ClientError::service_fault(
            M::NAME,
            fault.header.service_result,
        ));
    }
    if type_id != NodeId::numeric(0, M::TYPE_ID) {
        return Err(ServiceError::UnexpectedResponse {
            service: M::NAME,
            actual: type_id,
        }
        .into());
    }
    let message = M::decode(&mut slice)?;
    if message.header().service_result.is_bad() {
        return Err(ClientError::service_fault(
            M::NAME,
            message.header().service_result,
        ));
    }
    Ok(message)
}

fn write_string_array<B: BufMut>(buf: &mut B, items: &[String]) -> WireResult<()> {
    let len = i32::try_from(items.len()).map_err(|_| WireError::InvalidLength {
        length: items.len() as i64,
        remaining: 0,
    })?;
    buf.put_i32_le(len);
    for item in items {
        write_string(buf, Some(item))?;
    }
    Ok(())
}

fn read_string_array<B: Buf>(buf: &mut B) -> WireResult<Vec<String>> {
    let len = i32::decode(buf)?;
    if len <= 0 {
        return Ok(Vec::new());
    }
    if len as usize > buf.remaining() {
        return Err(WireError::InvalidLength {
            length: i64::from(len),
            remaining: buf.remaining(),
        });
    }
    let mut items = Vec::with_capacity(len as usize);
    for _ in 0..len {
        items.push(read_string(buf)?.unwrap_or_default());
    }
    Ok(items)
}

// =============================================================================
// Request / response headers
// =============================================================================

/// Header carried by every service request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestHeader {
    /// Session authentication token; null before a session exists.
    pub authentication_token: NodeId,
    /// Time the request was issued.
    pub timestamp: Option<DateTime<Utc>>,
    /// Client-assigned handle echoed in the response.
    pub request_handle: u32,
    /// Diagnostics mask; this client always sends 0.
    pub return_diagnostics: u32,
    /// Audit entry id; unused.
    pub audit_entry_id: Option<String>,
    /// Hint for the server-side timeout in milliseconds.
    pub timeout_hint: u32,
}

impl RequestHeader {
    /// A header for the given token and handle.
    pub fn new(authentication_token: NodeId, request_handle: u32, timeout_hint: u32) -> Self {
        Self {
            authentication_token,
            timestamp: Some(Utc::now()),
            request_handle,
            return_diagnostics: 0,
            audit_entry_id: None,
            timeout_hint,
        }
    }
}

impl Encode for RequestHeader {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.authentication_token.encode(buf)?;
        write_date_time(buf, self.timestamp)?;
        self.request_handle.encode(buf)?;
        self.return_diagnostics.encode(buf)?;
        write_string(buf, self.audit_entry_id.as_deref())?;
        self.timeout_hint.encode(buf)?;
        ExtensionObject::null().encode(buf)
    }
}

impl Decode for RequestHeader {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let header = Self {
            authentication_token: NodeId::decode(buf)?,
            timestamp: read_date_time(buf)?,
            request_handle: u32::decode(buf)?,
            return_diagnostics: u32::decode(buf)?,
            audit_entry_id: read_string(buf)?,
            timeout_hint: u32::decode(buf)?,
        };
        let _ = ExtensionObject::decode(buf)?;
        Ok(header)
    }
}

/// Header carried by every service response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHeader {
    /// Server time the response was produced.
    pub timestamp: Option<DateTime<Utc>>,
    /// Echo of the request handle.
    pub request_handle: u32,
    /// Overall service result.
    pub service_result: StatusCode,
}

impl ResponseHeader {
    /// A Good response header echoing `request_handle`.
    pub fn good(request_handle: u32) -> Self {
        Self {
            timestamp: Some(Utc::now()),
            request_handle,
            service_result: StatusCode::GOOD,
        }
    }

    /// A failed response header.
    pub fn bad(request_handle: u32, status: StatusCode) -> Self {
        Self {
            timestamp: Some(Utc::now()),
            request_handle,
            service_result: status,
        }
    }
}

impl Encode for ResponseHeader {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        write_date_time(buf, self.timestamp)?;
        self.request_handle.encode(buf)?;
        self.service_result.encode(buf)?;
        DiagnosticInfo.encode(buf)?;
        write_string_array(buf, &[])?;
        ExtensionObject::null().encode(buf)
    }
}

impl Decode for ResponseHeader {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let header = Self {
            timestamp: read_date_time(buf)?,
            request_handle: u32::decode(buf)?,
            service_result: StatusCode::decode(buf)?,
        };
        let _ = DiagnosticInfo::decode(buf)?;
        let _ = read_string_array(buf)?;
        let _ = ExtensionObject::decode(buf)?;
        Ok(header)
    }
}

/// A ServiceFault response: a response header is the whole body.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceFault {
    /// The response header carrying the failure.
    pub header: ResponseHeader,
}

impl ServiceMessage for ServiceFault {
    const TYPE_ID: u32 = 397;
    const NAME: &'static str = "ServiceFault";
}

impl Encode for ServiceFault {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)
    }
}

impl Decode for ServiceFault {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            header: ResponseHeader::decode(buf)?,
        })
    }
}

// =============================================================================
// Secure channel services
// =============================================================================

/// Whether an OpenSecureChannel issues a new token or renews one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRequestType {
    /// First token on a new channel.
    Issue,
    /// Replacement token on an existing channel.
    Renew,
}

/// OpenSecureChannel request.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenSecureChannelRequest {
    /// Request header.
    pub header: RequestHeader,
    /// Client protocol version.
    pub client_protocol_version: u32,
    /// Issue or renew.
    pub request_type: TokenRequestType,
    /// Requested message security mode value.
    pub security_mode: u32,
    /// Client nonce; empty under policy None.
    pub client_nonce: Option<Vec<u8>>,
    /// Requested token lifetime in milliseconds.
    pub requested_lifetime: u32,
}

impl ServiceMessage for OpenSecureChannelRequest {
    const TYPE_ID: u32 = 446;
    const NAME: &'static str = "OpenSecureChannel";
}

impl Encode for OpenSecureChannelRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        self.client_protocol_version.encode(buf)?;
        let request_type: u32 = match self.request_type {
            TokenRequestType::Issue => 0,
            TokenRequestType::Renew => 1,
        };
        request_type.encode(buf)?;
        self.security_mode.encode(buf)?;
        write_byte_string(buf, self.client_nonce.as_deref())?;
        self.requested_lifetime.encode(buf)
    }
}

impl Decode for OpenSecureChannelRequest {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let header = RequestHeader::decode(buf)?;
        let client_protocol_version = u32::decode(buf)?;
        let request_type = match u32::decode(buf)? {
            0 => TokenRequestType::Issue,
            1 => TokenRequestType::Renew,
            other => {
                return Err(WireError::InvalidValue {
                    what: "token request type",
                    value: u64::from(other),
                })
            }
        };
        Ok(Self {
            header,
            client_protocol_version,
            request_type,
            security_mode: u32::decode(buf)?,
            client_nonce: read_byte_string(buf)?,
            requested_lifetime: u32::decode(buf)?,
        })
    }
}

/// The security token granted by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSecurityToken {
    /// Server-assigned channel id.
    pub channel_id: u32,
    /// Token id to put in symmetric security headers.
    pub token_id: u32,
    /// Server time the token was created.
    pub created_at: Option<DateTime<Utc>>,
    /// Granted lifetime in milliseconds.
    pub revised_lifetime: u32,
}

impl Encode for ChannelSecurityToken {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.channel_id.encode(buf)?;
        self.token_id.encode(buf)?;
        write_date_time(buf, self.created_at)?;
        self.revised_lifetime.encode(buf)
    }
}

impl Decode for ChannelSecurityToken {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            channel_id: u32::decode(buf)?,
            token_id: u32::decode(buf)?,
            created_at: read_date_time(buf)?,
            revised_lifetime: u32::decode(buf)?,
        })
    }
}

/// OpenSecureChannel response.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenSecureChannelResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// Server protocol version.
    pub server_protocol_version: u32,
    /// The granted token.
    pub token: ChannelSecurityToken,
    /// Server nonce; empty under policy None.
    pub server_nonce: Option<Vec<u8>>,
}

impl ServiceMessage for OpenSecureChannelResponse {
    const TYPE_ID: u32 = 449;
    const NAME: &'static str = "OpenSecureChannel";
}

impl Encode for OpenSecureChannelResponse {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        self.server_protocol_version.encode(buf)?;
        self.token.encode(buf)?;
        write_byte_string(buf, self.server_nonce.as_deref())
    }
}

impl Decode for OpenSecureChannelResponse {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            header: ResponseHeader::decode(buf)?,
            server_protocol_version: u32::decode(buf)?,
            token: ChannelSecurityToken::decode(buf)?,
            server_nonce: read_byte_string(buf)?,
        })
    }
}

/// CloseSecureChannel request. No response is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseSecureChannelRequest {
    /// Request header.
    pub header: RequestHeader,
}

impl ServiceMessage for CloseSecureChannelRequest {
    const TYPE_ID: u32 = 452;
    const NAME: &'static str = "CloseSecureChannel";
}

impl Encode for CloseSecureChannelRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)
    }
}

impl Decode for CloseSecureChannelRequest {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            header: RequestHeader::decode(buf)?,
        })
    }
}

// =============================================================================
// Session services
// =============================================================================

/// Description of an application in discovery and session services.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApplicationDescription {
    /// Globally unique application URI.
    pub application_uri: String,
    /// Product URI.
    pub product_uri: String,
    /// Human-readable name.
    pub application_name: LocalizedText,
    /// Application type; 1 = client.
    pub application_type: u32,
    /// Gateway server URI, unused here.
    pub gateway_server_uri: Option<String>,
    /// Discovery profile URI, unused here.
    pub discovery_profile_uri: Option<String>,
    /// Discovery urls.
    pub discovery_urls: Vec<String>,
}

impl Encode for ApplicationDescription {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        write_string(buf, Some(&self.application_uri))?;
        write_string(buf, Some(&self.product_uri))?;
        self.application_name.encode(buf)?;
        self.application_type.encode(buf)?;
        write_string(buf, self.gateway_server_uri.as_deref())?;
        write_string(buf, self.discovery_profile_uri.as_deref())?;
        write_string_array(buf, &self.discovery_urls)
    }
}

impl Decode for ApplicationDescription {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            application_uri: read_string(buf)?.unwrap_or_default(),
            product_uri: read_string(buf)?.unwrap_or_default(),
            application_name: LocalizedText::decode(buf)?,
            application_type: u32::decode(buf)?,
            gateway_server_uri: read_string(buf)?,
            discovery_profile_uri: read_string(buf)?,
            discovery_urls: read_string_array(buf)?,
        })
    }
}

/// A user token policy advertised by an endpoint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserTokenPolicy {
    /// Server-assigned policy id, echoed in identity tokens.
    pub policy_id: String,
    /// Token type; 0 = anonymous.
    pub token_type: u32,
    /// Issued token type URI.
    pub issued_token_type: Option<String>,
    /// Issuer endpoint url.
    pub issuer_endpoint_url: Option<String>,
    /// Security policy for the token.
    pub security_policy_uri: Option<String>,
}

impl UserTokenPolicy {
    /// Token type value for anonymous tokens.
    pub const ANONYMOUS: u32 = 0;
}

impl Encode for UserTokenPolicy {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        write_string(buf, Some(&self.policy_id))?;
        self.token_type.encode(buf)?;
        write_string(buf, self.issued_token_type.as_deref())?;
        write_string(buf, self.issuer_endpoint_url.as_deref())?;
        write_string(buf, self.security_policy_uri.as_deref())
    }
}

impl Decode for UserTokenPolicy {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            policy_id: read_string(buf)?.unwrap_or_default(),
            token_type: u32::decode(buf)?,
            issued_token_type: read_string(buf)?,
            issuer_endpoint_url: read_string(buf)?,
            security_policy_uri: read_string(buf)?,
        })
    }
}

/// An endpoint advertised by the server.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EndpointDescription {
    /// Endpoint url.
    pub endpoint_url: String,
    /// The server behind the endpoint.
    pub server: ApplicationDescription,
    /// Server certificate; null for unsecured endpoints.
    pub server_certificate: Option<Vec<u8>>,
    /// Security mode value.
    pub security_mode: u32,
    /// Security policy URI.
    pub security_policy_uri: String,
    /// Accepted user token policies.
    pub user_identity_tokens: Vec<UserTokenPolicy>,
    /// Transport profile URI.
    pub transport_profile_uri: Option<String>,
    /// Relative security level.
    pub security_level: u8,
}

impl EndpointDescription {
    /// Finds the policy id for anonymous authentication, if offered.
    pub fn anonymous_policy_id(&self) -> Option<&str> {
        self.user_identity_tokens
            .iter()
            .find(|policy| policy.token_type == UserTokenPolicy::ANONYMOUS)
            .map(|policy| policy.policy_id.as_str())
    }
}

impl Encode for EndpointDescription {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        write_string(buf, Some(&self.endpoint_url))?;
        self.server.encode(buf)?;
        write_byte_string(buf, self.server_certificate.as_deref())?;
        self.security_mode.encode(buf)?;
        write_string(buf, Some(&self.security_policy_uri))?;
        write_array(buf, &self.user_identity_tokens)?;
        write_string(buf, self.transport_profile_uri.as_deref())?;
        self.security_level.encode(buf)
    }
}

impl Decode for EndpointDescription {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            endpoint_url: read_string(buf)?.unwrap_or_default(),
            server: ApplicationDescription::decode(buf)?,
            server_certificate: read_byte_string(buf)?,
            security_mode: u32::decode(buf)?,
            security_policy_uri: read_string(buf)?.unwrap_or_default(),
            user_identity_tokens: read_array(buf)?,
            transport_profile_uri: read_string(buf)?,
            security_level: u8::decode(buf)?,
        })
    }
}

/// CreateSession request.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateSessionRequest {
    /// Request header.
    pub header: RequestHeader,
    /// The client application.
    pub client_description: ApplicationDescription,
    /// Server URI; empty when unknown.
    pub server_uri: Option<String>,
    /// The endpoint url being connected to.
    pub endpoint_url: String,
    /// Human-readable session name.
    pub session_name: String,
    /// Client nonce, at least 32 bytes.
    pub client_nonce: Option<Vec<u8>>,
    /// Client certificate; null under policy None.
    pub client_certificate: Option<Vec<u8>>,
    /// Requested session timeout in milliseconds.
    pub requested_session_timeout: f64,
    /// Largest response the client accepts; 0 = unlimited.
    pub max_response_message_size: u32,
}

impl ServiceMessage for CreateSessionRequest {
    const TYPE_ID: u32 = 461;
    const NAME: &'static str = "CreateSession";
}

impl Encode for CreateSessionRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        self.client_description.encode(buf)?;
        write_string(buf, self.server_uri.as_deref())?;
        write_string(buf, Some(&self.endpoint_url))?;
        write_string(buf, Some(&self.session_name))?;
        write_byte_string(buf, self.client_nonce.as_deref())?;
        write_byte_string(buf, self.client_certificate.as_deref())?;
        self.requested_session_timeout.encode(buf)?;
        self.max_response_message_size.encode(buf)
    }
}

impl Decode for CreateSessionRequest {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            header: RequestHeader::decode(buf)?,
            client_description: ApplicationDescription::decode(buf)?,
            server_uri: read_string(buf)?,
            endpoint_url: read_string(buf)?.unwrap_or_default(),
            session_name: read_string(buf)?.unwrap_or_default(),
            client_nonce: read_byte_string(buf)?,
            client_certificate: read_byte_string(buf)?,
            requested_session_timeout: f64::decode(buf)?,
            max_response_message_size: u32::decode(buf)?,
        })
    }
}

/// CreateSession response.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateSessionResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// Server-assigned session id.
    pub session_id: NodeId,
    /// Token to put in subsequent request headers.
    pub authentication_token: NodeId,
    /// Granted session timeout in milliseconds.
    pub revised_session_timeout: f64,
    /// Server nonce for activation.
    pub server_nonce: Option<Vec<u8>>,
    /// Server certificate.
    pub server_certificate: Option<Vec<u8>>,
    /// The server's endpoints, for identity-policy lookup.
    pub server_endpoints: Vec<EndpointDescription>,
    /// Largest request the server accepts; 0 = unlimited.
    pub max_request_message_size: u32,
}

impl ServiceMessage for CreateSessionResponse {
    const TYPE_ID: u32 = 464;
    const NAME: &'static str = "CreateSession";
}

impl Encode for CreateSessionResponse {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        self.session_id.encode(buf)?;
        self.authentication_token.encode(buf)?;
        self.revised_session_timeout.encode(buf)?;
        write_byte_string(buf, self.server_nonce.as_deref())?;
        write_byte_string(buf, self.server_certificate.as_deref())?;
        write_array(buf, &self.server_endpoints)?;
        // Deprecated software-certificates array.
        buf.put_i32_le(-1);
        // Server signature; null under policy None.
        write_string(buf, None)?;
        write_byte_string(buf, None)?;
        self.max_request_message_size.encode(buf)
    }
}

impl Decode for CreateSessionResponse {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let header = ResponseHeader::decode(buf)?;
        let session_id = NodeId::decode(buf)?;
        let authentication_token = NodeId::decode(buf)?;
        let revised_session_timeout = f64::decode(buf)?;
        let server_nonce = read_byte_string(buf)?;
        let server_certificate = read_byte_string(buf)?;
        let server_endpoints = read_array(buf)?;
        // Deprecated software-certificates array: count only.
        let _ = i32::decode(buf)?;
        // Server signature (SignatureData): algorithm + signature.
        let _ = read_string(buf)?;
        let _ = read_byte_string(buf)?;
        Ok(Self {
            header,
            session_id,
            authentication_token,
            revised_session_timeout,
            server_nonce,
            server_certificate,
            server_endpoints,
            max_request_message_size: u32::decode(buf)?,
        })
    }
}

/// ActivateSession request with an anonymous identity token.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivateSessionRequest {
    /// Request header; carries the authentication token.
    pub header: RequestHeader,
    /// The identity token, normally anonymous.
    pub user_identity_token: ExtensionObject,
    /// Preferred locales.
    pub locale_ids: Vec<String>,
}

impl ActivateSessionRequest {
    /// Builds the anonymous identity token for `policy_id`.
    pub fn anonymous_token(policy_id: &str) -> WireResult<ExtensionObject> {
        let mut body = Vec::new();
        write_string(&mut body, Some(policy_id))?;
        Ok(ExtensionObject::new(
            NodeId::numeric(0, ANONYMOUS_IDENTITY_TOKEN_TYPE),
            body,
        ))
    }
}

impl ServiceMessage for ActivateSessionRequest {
    const TYPE_ID: u32 = 467;
    const NAME: &'static str = "ActivateSession";
}

impl Encode for ActivateSessionRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        // Client signature (SignatureData); null under policy None.
        write_string(buf, None)?;
        write_byte_string(buf, None)?;
        // Client software certificates.
        buf.put_i32_le(-1);
        write_string_array(buf, &self.locale_ids)?;
        self.user_identity_token.encode(buf)?;
        // User token signature; null.
        write_string(buf, None)?;
        write_byte_string(buf, None)
    }
}

impl Decode for ActivateSessionRequest {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let header = RequestHeader::decode(buf)?;
        let _ = read_string(buf)?;
        let _ = read_byte_string(buf)?;
        let _ = i32::decode(buf)?;
        let locale_ids = read_string_array(buf)?;
        let user_identity_token = ExtensionObject::decode(buf)?;
        let _ = read_string(buf)?;
        let _ = read_byte_string(buf)?;
        Ok(Self {
            header,
            user_identity_token,
            locale_ids,
        })
    }
}

/// ActivateSession response.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivateSessionResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// Fresh server nonce.
    pub server_nonce: Option<Vec<u8>>,
}

impl ServiceMessage for ActivateSessionResponse {
    const TYPE_ID: u32 = 470;
    const NAME: &'static str = "ActivateSession";
}

impl Encode for ActivateSessionResponse {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        write_byte_string(buf, self.server_nonce.as_deref())?;
        write_array::<_, StatusCode>(buf, &[])?;
        write_array::<_, DiagnosticInfo>(buf, &[])
    }
}

impl Decode for ActivateSessionResponse {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let header = ResponseHeader::decode(buf)?;
        let server_nonce = read_byte_string(buf)?;
        let _: Vec<StatusCode> = read_array(buf)?;
        let _: Vec<DiagnosticInfo> = read_array(buf)?;
        Ok(Self {
            header,
            server_nonce,
        })
    }
}

/// CloseSession request.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseSessionRequest {
    /// Request header.
    pub header: RequestHeader,
    /// Also delete the session's subscriptions.
    pub delete_subscriptions: bool,
}

impl ServiceMessage for CloseSessionRequest {
    const TYPE_ID: u32 = 473;
    const NAME: &'static str = "CloseSession";
}

impl Encode for CloseSessionRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        self.delete_subscriptions.encode(buf)
    }
}

impl Decode for CloseSessionRequest {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            header: RequestHeader::decode(buf)?,
            delete_subscriptions: bool::decode(buf)?,
        })
    }
}

/// CloseSession response.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseSessionResponse {
    /// Response header.
    pub header: ResponseHeader,
}

impl ServiceMessage for CloseSessionResponse {
    const TYPE_ID: u32 = 476;
    const NAME: &'static str = "CloseSession";
}

impl Encode for CloseSessionResponse {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)
    }
}

impl Decode for CloseSessionResponse {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            header: ResponseHeader::decode(buf)?,
        })
    }
}

// =============================================================================
// Read / Write
// =============================================================================

/// One node-attribute pair to read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadValueId {
    /// The node to read.
    pub node_id: NodeId,
    /// Attribute id; [`ATTRIBUTE_VALUE`] for values.
    pub attribute_id: u32,
}

impl ReadValueId {
    /// Reads the Value attribute of `node_id`.
    pub fn value_of(node_id: NodeId) -> Self {
        Self {
            node_id,
            attribute_id: ATTRIBUTE_VALUE,
        }
    }
}

impl Encode for ReadValueId {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.node_id.encode(buf)?;
        self.attribute_id.encode(buf)?;
        write_string(buf, None)?; // index range
        QualifiedName::default().encode(buf) // data encoding
    }
}

impl Decode for ReadValueId {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let node_id = NodeId::decode(buf)?;
        let attribute_id = u32::decode(buf)?;
        let _ = read_string(buf)?;
        let _ = QualifiedName::decode(buf)?;
        Ok(Self {
            node_id,
            attribute_id,
        })
    }
}

/// Read request.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRequest {
    /// Request header.
    pub header: RequestHeader,
    /// Oldest acceptable cached value age in milliseconds.
    pub max_age: f64,
    /// Which timestamps to return.
    pub timestamps_to_return: u32,
    /// The reads to perform.
    pub nodes_to_read: Vec<ReadValueId>,
}

impl ServiceMessage for ReadRequest {
    const TYPE_ID: u32 = 631;
    const NAME: &'static str = "Read";
}

impl Encode for ReadRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        self.max_age.encode(buf)?;
        self.timestamps_to_return.encode(buf)?;
        write_array(buf, &self.nodes_to_read)
    }
}

impl Decode for ReadRequest {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            header: RequestHeader::decode(buf)?,
            max_age: f64::decode(buf)?,
            timestamps_to_return: u32::decode(buf)?,
            nodes_to_read: read_array(buf)?,
        })
    }
}

/// Read response.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// One data value per requested read, in order.
    pub results: Vec<DataValue>,
}

impl ServiceMessage for ReadResponse {
    const TYPE_ID: u32 = 634;
    const NAME: &'static str = "Read";
}

impl Encode for ReadResponse {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        write_array(buf, &self.results)?;
        write_array::<_, DiagnosticInfo>(buf, &[])
    }
}

impl Decode for ReadResponse {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let header = ResponseHeader::decode(buf)?;
        let results = read_array(buf)?;
        let _: Vec<DiagnosticInfo> = read_array(buf)?;
        Ok(Self { header, results })
    }
}

/// One node-attribute-value triple to write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteValue {
    /// The node to write.
    pub node_id: NodeId,
    /// Attribute id; [`ATTRIBUTE_VALUE`] for values.
    pub attribute_id: u32,
    /// The value to write.
    pub value: DataValue,
}

impl WriteValue {
    /// Writes `value` to the Value attribute of `node_id`.
    pub fn value_of(node_id: NodeId, value: DataValue) -> Self {
        Self {
            node_id,
            attribute_id: ATTRIBUTE_VALUE,
            value,
        }
    }
}

impl Encode for WriteValue {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.node_id.encode(buf)?;
        self.attribute_id.encode(buf)?;
        write_string(buf, None)?; // index range
        self.value.encode(buf)
    }
}

impl Decode for WriteValue {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let node_id = NodeId::decode(buf)?;
        let attribute_id = u32::decode(buf)?;
        let _ = read_string(buf)?;
        let value = DataValue::decode(buf)?;
        Ok(Self {
            node_id,
            attribute_id,
            value,
        })
    }
}

/// Write request.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    /// Request header.
    pub header: RequestHeader,
    /// The writes to perform.
    pub nodes_to_write: Vec<WriteValue>,
}

impl ServiceMessage for WriteRequest {
    const TYPE_ID: u32 = 673;
    const NAME: &'static str = "Write";
}

impl Encode for WriteRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        write_array(buf, &self.nodes_to_write)
    }
}

impl Decode for WriteRequest {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            header: RequestHeader::decode(buf)?,
            nodes_to_write: read_array(buf)?,
        })
    }
}

/// Write response.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// One status per requested write, in order.
    pub results: Vec<StatusCode>,
}

impl ServiceMessage for WriteResponse {
    const TYPE_ID: u32 = 676;
    const NAME: &'static str = "Write";
}

impl Encode for WriteResponse {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        write_array(buf, &self.results)?;
        write_array::<_, DiagnosticInfo>(buf, &[])
    }
}

impl Decode for WriteResponse {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let header = ResponseHeader::decode(buf)?;
        let results = read_array(buf)?;
        let _: Vec<DiagnosticInfo> = read_array(buf)?;
        Ok(Self { header, results })
    }
}

// =============================================================================
// Browse
// =============================================================================

/// Browse direction values.
pub mod browse_direction {
    /// Follow references forward.
    pub const FORWARD: u32 = 0;
    /// Follow references backward.
    pub const INVERSE: u32 = 1;
    /// Follow references both ways.
    pub const BOTH: u32 = 2;
}

/// HierarchicalReferences reference type, the default browse filter.
pub const HIERARCHICAL_REFERENCES: u32 = 33;

/// All fields of a reference description.
pub const RESULT_MASK_ALL: u32 = 63;

/// What to browse from one node.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseDescription {
    /// Starting node.
    pub node_id: NodeId,
    /// Direction to follow.
    pub browse_direction: u32,
    /// Reference type filter; null for all.
    pub reference_type_id: NodeId,
    /// Also follow subtypes of the reference type.
    pub include_subtypes: bool,
    /// Node class filter; 0 for all.
    pub node_class_mask: u32,
    /// Which result fields to return.
    pub result_mask: u32,
}

impl BrowseDescription {
    /// Forward hierarchical browse returning all fields.
    pub fn hierarchical(node_id: NodeId) -> Self {
        Self {
            node_id,
            browse_direction: browse_direction::FORWARD,
            reference_type_id: NodeId::numeric(0, HIERARCHICAL_REFERENCES),
            include_subtypes: true,
            node_class_mask: 0,
            result_mask: RESULT_MASK_ALL,
        }
    }
}

impl Encode for BrowseDescription {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.node_id.encode(buf)?;
        self.browse_direction.encode(buf)?;
        self.reference_type_id.encode(buf)?;
        self.include_subtypes.encode(buf)?;
        self.node_class_mask.encode(buf)?;
        self.result_mask.encode(buf)
    }
}

impl Decode for BrowseDescription {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            node_id: NodeId::decode(buf)?,
            browse_direction: u32::decode(buf)?,
            reference_type_id: NodeId::decode(buf)?,
            include_subtypes: bool::decode(buf)?,
            node_class_mask: u32::decode(buf)?,
            result_mask: u32::decode(buf)?,
        })
    }
}

/// Browse request.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseRequest {
    /// Request header.
    pub header: RequestHeader,
    /// Most references per starting node; 0 = server decides.
    pub requested_max_references: u32,
    /// The starting nodes.
    pub nodes_to_browse: Vec<BrowseDescription>,
}

impl ServiceMessage for BrowseRequest {
    const TYPE_ID: u32 = 527;
    const NAME: &'static str = "Browse";
}

impl Encode for BrowseRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        // View description: null view id, no timestamp, version 0.
        NodeId::NULL.encode(buf)?;
        write_date_time(buf, None)?;
        0u32.encode(buf)?;
        self.requested_max_references.encode(buf)?;
        write_array(buf, &self.nodes_to_browse)
    }
}

impl Decode for BrowseRequest {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let header = RequestHeader::decode(buf)?;
        let _ = NodeId::decode(buf)?;
        let _ = read_date_time(buf)?;
        let _ = u32::decode(buf)?;
        Ok(Self {
            header,
            requested_max_references: u32::decode(buf)?,
            nodes_to_browse: read_array(buf)?,
        })
    }
}

/// One reference found while browsing.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceDescription {
    /// The reference type.
    pub reference_type_id: NodeId,
    /// `true` when the reference points away from the browsed node.
    pub is_forward: bool,
    /// The target node.
    pub node_id: NodeId,
    /// Browse name of the target.
    pub browse_name: QualifiedName,
    /// Display name of the target.
    pub display_name: LocalizedText,
    /// Node class of the target.
    pub node_class: u32,
    /// Type definition of the target.
    pub type_definition: NodeId,
}

impl Encode for ReferenceDescription {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.reference_type_id.encode(buf)?;
        self.is_forward.encode(buf)?;
        write_expanded_node_id(buf, &self.node_id)?;
        self.browse_name.encode(buf)?;
        self.display_name.encode(buf)?;
        self.node_class.encode(buf)?;
        write_expanded_node_id(buf, &self.type_definition)
    }
}

impl Decode for ReferenceDescription {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            reference_type_id: NodeId::decode(buf)?,
            is_forward: bool::decode(buf)?,
            node_id: read_expanded_node_id(buf)?,
            browse_name: QualifiedName::decode(buf)?,
            display_name: LocalizedText::decode(buf)?,
            node_class: u32::decode(buf)?,
            type_definition: read_expanded_node_id(buf)?,
        })
    }
}

/// Result for one browsed starting node.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseResult {
    /// Status for this starting node.
    pub status: StatusCode,
    /// Continuation point when the result was truncated.
    pub continuation_point: Option<Vec<u8>>,
    /// The references found.
    pub references: Vec<ReferenceDescription>,
}

impl Encode for BrowseResult {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.status.encode(buf)?;
        write_byte_string(buf, self.continuation_point.as_deref())?;
        write_array(buf, &self.references)
    }
}

impl Decode for BrowseResult {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            status: StatusCode::decode(buf)?,
            continuation_point: read_byte_string(buf)?,
            references: read_array(buf)?,
        })
    }
}

/// Browse response.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// One result per starting node, in order.
    pub results: Vec<BrowseResult>,
}

impl ServiceMessage for BrowseResponse {
    const TYPE_ID: u32 = 530;
    const NAME: &'static str = "Browse";
}

impl Encode for BrowseResponse {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        write_array(buf, &self.results)?;
        write_array::<_, DiagnosticInfo>(buf, &[])
    }
}

impl Decode for BrowseResponse {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let header = ResponseHeader::decode(buf)?;
        let results = read_array(buf)?;
        let _: Vec<DiagnosticInfo> = read_array(buf)?;
        Ok(Self { header, results })
    }
}

/// BrowseNext request; used only to release continuation points.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseNextRequest {
    /// Request header.
    pub header: RequestHeader,
    /// Release instead of continue.
    pub release_continuation_points: bool,
    /// The continuation points.
    pub continuation_points: Vec<Vec<u8>>,
}

impl ServiceMessage for BrowseNextRequest {
    const TYPE_ID: u32 = 533;
    const NAME: &'static str = "BrowseNext";
}

impl Encode for BrowseNextRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        self.release_continuation_points.encode(buf)?;
        let len = i32::try_from(self.continuation_points.len()).map_err(|_| {
            WireError::InvalidLength {
                length: self.continuation_points.len() as i64,
                remaining: 0,
            }
        })?;
        buf.put_i32_le(len);
        for point in &self.continuation_points {
            write_byte_string(buf, Some(point))?;
        }
        Ok(())
    }
}

impl Decode for BrowseNextRequest {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let header = RequestHeader::decode(buf)?;
        let release_continuation_points = bool::decode(buf)?;
        let len = i32::decode(buf)?;
        let mut continuation_points = Vec::new();
        for _ in 0..len.max(0) {
            continuation_points.push(read_byte_string(buf)?.unwrap_or_default());
        }
        Ok(Self {
            header,
            release_continuation_points,
            continuation_points,
        })
    }
}

/// BrowseNext response.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseNextResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// One result per continuation point.
    pub results: Vec<BrowseResult>,
}

impl ServiceMessage for BrowseNextResponse {
    const TYPE_ID: u32 = 536;
    const NAME: &'static str = "BrowseNext";
}

impl Encode for BrowseNextResponse {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        write_array(buf, &self.results)?;
        write_array::<_, DiagnosticInfo>(buf, &[])
    }
}

impl Decode for BrowseNextResponse {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let header = ResponseHeader::decode(buf)?;
        let results = read_array(buf)?;
        let _: Vec<DiagnosticInfo> = read_array(buf)?;
        Ok(Self { header, results })
    }
}

// =============================================================================
// Subscription services
// =============================================================================

/// CreateSubscription request.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateSubscriptionRequest {
    /// Request header.
    pub header: RequestHeader,
    /// Requested publishing interval in milliseconds.
    pub requested_publishing_interval: f64,
    /// Requested lifetime count.
    pub requested_lifetime_count: u32,
    /// Requested keep-alive count.
    pub requested_max_keep_alive_count: u32,
    /// Maximum notifications per publish; 0 = unlimited.
    pub max_notifications_per_publish: u32,
    /// Whether publishing starts enabled.
    pub publishing_enabled: bool,
    /// Relative priority.
    pub priority: u8,
}

impl ServiceMessage for CreateSubscriptionRequest {
    const TYPE_ID: u32 = 787;
    const NAME: &'static str = "CreateSubscription";
}

impl Encode for CreateSubscriptionRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        self.requested_publishing_interval.encode(buf)?;
        self.requested_lifetime_count.encode(buf)?;
        self.requested_max_keep_alive_count.encode(buf)?;
        self.max_notifications_per_publish.encode(buf)?;
        self.publishing_enabled.encode(buf)?;
        self.priority.encode(buf)
    }
}

impl Decode for CreateSubscriptionRequest {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            header: RequestHeader::decode(buf)?,
            requested_publishing_interval: f64::decode(buf)?,
            requested_lifetime_count: u32::decode(buf)?,
            requested_max_keep_alive_count: u32::decode(buf)?,
            max_notifications_per_publish: u32::decode(buf)?,
            publishing_enabled: bool::decode(buf)?,
            priority: u8::decode(buf)?,
        })
    }
}

/// CreateSubscription response.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateSubscriptionResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// Server-assigned subscription id.
    pub subscription_id: u32,
    /// Granted publishing interval in milliseconds.
    pub revised_publishing_interval: f64,
    /// Granted lifetime count.
    pub revised_lifetime_count: u32,
    /// Granted keep-alive count.
    pub revised_max_keep_alive_count: u32,
}

impl ServiceMessage for CreateSubscriptionResponse {
    const TYPE_ID: u32 = 790;
    const NAME: &'static str = "CreateSubscription";
}

impl Encode for CreateSubscriptionResponse {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        self.subscription_id.encode(buf)?;
        self.revised_publishing_interval.encode(buf)?;
        self.revised_lifetime_count.encode(buf)?;
        self.revised_max_keep_alive_count.encode(buf)
    }
}

impl Decode for CreateSubscriptionResponse {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            header: ResponseHeader::decode(buf)?,
            subscription_id: u32::decode(buf)?,
            revised_publishing_interval: f64::decode(buf)?,
            revised_lifetime_count: u32::decode(buf)?,
            revised_max_keep_alive_count: u32::decode(buf)?,
        })
    }
}

/// Parameters for one monitored item.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringParameters {
    /// Client handle echoed in notifications.
    pub client_handle: u32,
    /// Sampling interval in milliseconds; -1 = publishing interval.
    pub sampling_interval: f64,
    /// Queue depth between publishes.
    pub queue_size: u32,
    /// Drop oldest on overflow.
    pub discard_oldest: bool,
}

impl Encode for MonitoringParameters {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.client_handle.encode(buf)?;
        self.sampling_interval.encode(buf)?;
        ExtensionObject::null().encode(buf)?; // filter
        self.queue_size.encode(buf)?;
        self.discard_oldest.encode(buf)
    }
}

impl Decode for MonitoringParameters {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let client_handle = u32::decode(buf)?;
        let sampling_interval = f64::decode(buf)?;
        let _ = ExtensionObject::decode(buf)?;
        Ok(Self {
            client_handle,
            sampling_interval,
            queue_size: u32::decode(buf)?,
            discard_oldest: bool::decode(buf)?,
        })
    }
}

/// One monitored item to create.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemCreateRequest {
    /// What to monitor.
    pub item_to_monitor: ReadValueId,
    /// Monitoring mode value.
    pub monitoring_mode: u32,
    /// Item parameters.
    pub requested_parameters: MonitoringParameters,
}

impl Encode for MonitoredItemCreateRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.item_to_monitor.encode(buf)?;
        self.monitoring_mode.encode(buf)?;
        self.requested_parameters.encode(buf)
    }
}

impl Decode for MonitoredItemCreateRequest {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            item_to_monitor: ReadValueId::decode(buf)?,
            monitoring_mode: u32::decode(buf)?,
            requested_parameters: MonitoringParameters::decode(buf)?,
        })
    }
}

/// CreateMonitoredItems request.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateMonitoredItemsRequest {
    /// Request header.
    pub header: RequestHeader,
    /// Target subscription.
    pub subscription_id: u32,
    /// Which timestamps to return in notifications.
    pub timestamps_to_return: u32,
    /// The items to create.
    pub items_to_create: Vec<MonitoredItemCreateRequest>,
}

impl ServiceMessage for CreateMonitoredItemsRequest {
    const TYPE_ID: u32 = 751;
    const NAME: &'static str = "CreateMonitoredItems";
}

impl Encode for CreateMonitoredItemsRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        self.subscription_id.encode(buf)?;
        self.timestamps_to_return.encode(buf)?;
        write_array(buf, &self.items_to_create)
    }
}

impl Decode for CreateMonitoredItemsRequest {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            header: RequestHeader::decode(buf)?,
            subscription_id: u32::decode(buf)?,
            timestamps_to_return: u32::decode(buf)?,
            items_to_create: read_array(buf)?,
        })
    }
}

/// Result for one created monitored item.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemCreateResult {
    /// Status for this item.
    pub status: StatusCode,
    /// Server-assigned monitored item id.
    pub monitored_item_id: u32,
    /// Granted sampling interval.
    pub revised_sampling_interval: f64,
    /// Granted queue size.
    pub revised_queue_size: u32,
}

impl Encode for MonitoredItemCreateResult {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.status.encode(buf)?;
        self.monitored_item_id.encode(buf)?;
        self.revised_sampling_interval.encode(buf)?;
        self.revised_queue_size.encode(buf)?;
        ExtensionObject::null().encode(buf) // filter result
    }
}

impl Decode for MonitoredItemCreateResult {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let result = Self {
            status: StatusCode::decode(buf)?,
            monitored_item_id: u32::decode(buf)?,
            revised_sampling_interval: f64::decode(buf)?,
            revised_queue_size: u32::decode(buf)?,
        };
        let _ = ExtensionObject::decode(buf)?;
        Ok(result)
    }
}

/// CreateMonitoredItems response.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateMonitoredItemsResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// One result per requested item, in order.
    pub results: Vec<MonitoredItemCreateResult>,
}

impl ServiceMessage for CreateMonitoredItemsResponse {
    const TYPE_ID: u32 = 754;
    const NAME: &'static str = "CreateMonitoredItems";
}

impl Encode for CreateMonitoredItemsResponse {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        write_array(buf, &self.results)?;
        write_array::<_, DiagnosticInfo>(buf, &[])
    }
}

impl Decode for CreateMonitoredItemsResponse {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let header = ResponseHeader::decode(buf)?;
        let results = read_array(buf)?;
        let _: Vec<DiagnosticInfo> = read_array(buf)?;
        Ok(Self { header, results })
    }
}

/// DeleteMonitoredItems request.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteMonitoredItemsRequest {
    /// Request header.
    pub header: RequestHeader,
    /// Target subscription.
    pub subscription_id: u32,
    /// The monitored item ids to delete.
    pub monitored_item_ids: Vec<u32>,
}

impl ServiceMessage for DeleteMonitoredItemsRequest {
    const TYPE_ID: u32 = 781;
    const NAME: &'static str = "DeleteMonitoredItems";
}

impl Encode for DeleteMonitoredItemsRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        self.subscription_id.encode(buf)?;
        write_array(buf, &self.monitored_item_ids)
    }
}

impl Decode for DeleteMonitoredItemsRequest {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            header: RequestHeader::decode(buf)?,
            subscription_id: u32::decode(buf)?,
            monitored_item_ids: read_array(buf)?,
        })
    }
}

/// DeleteMonitoredItems response.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteMonitoredItemsResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// One status per deleted item, in order.
    pub results: Vec<StatusCode>,
}

impl ServiceMessage for DeleteMonitoredItemsResponse {
    const TYPE_ID: u32 = 784;
    const NAME: &'static str = "DeleteMonitoredItems";
}

impl Encode for DeleteMonitoredItemsResponse {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        write_array(buf, &self.results)?;
        write_array::<_, DiagnosticInfo>(buf, &[])
    }
}

impl Decode for DeleteMonitoredItemsResponse {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let header = ResponseHeader::decode(buf)?;
        let results = read_array(buf)?;
        let _: Vec<DiagnosticInfo> = read_array(buf)?;
        Ok(Self { header, results })
    }
}

/// DeleteSubscriptions request.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteSubscriptionsRequest {
    /// Request header.
    pub header: RequestHeader,
    /// The subscription ids to delete.
    pub subscription_ids: Vec<u32>,
}

impl ServiceMessage for DeleteSubscriptionsRequest {
    const TYPE_ID: u32 = 847;
    const NAME: &'static str = "DeleteSubscriptions";
}

impl Encode for DeleteSubscriptionsRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        write_array(buf, &self.subscription_ids)
    }
}

impl Decode for DeleteSubscriptionsRequest {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            header: RequestHeader::decode(buf)?,
            subscription_ids: read_array(buf)?,
        })
    }
}

/// DeleteSubscriptions response.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteSubscriptionsResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// One status per deleted subscription, in order.
    pub results: Vec<StatusCode>,
}

impl ServiceMessage for DeleteSubscriptionsResponse {
    const TYPE_ID: u32 = 850;
    const NAME: &'static str = "DeleteSubscriptions";
}

impl Encode for DeleteSubscriptionsResponse {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        write_array(buf, &self.results)?;
        write_array::<_, DiagnosticInfo>(buf, &[])
    }
}

impl Decode for DeleteSubscriptionsResponse {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let header = ResponseHeader::decode(buf)?;
        let results = read_array(buf)?;
        let _: Vec<DiagnosticInfo> = read_array(buf)?;
        Ok(Self { header, results })
    }
}

// =============================================================================
// Publish / Republish
// =============================================================================

/// Acknowledgement for a received notification message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionAcknowledgement {
    /// The subscription the sequence number belongs to.
    pub subscription_id: u32,
    /// The acknowledged sequence number.
    pub sequence_number: u32,
}

impl Encode for SubscriptionAcknowledgement {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.subscription_id.encode(buf)?;
        self.sequence_number.encode(buf)
    }
}

impl Decode for SubscriptionAcknowledgement {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            subscription_id: u32::decode(buf)?,
            sequence_number: u32::decode(buf)?,
        })
    }
}

/// Publish request.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    /// Request header.
    pub header: RequestHeader,
    /// Acknowledgements for previously delivered messages.
    pub subscription_acknowledgements: Vec<SubscriptionAcknowledgement>,
}

impl ServiceMessage for PublishRequest {
    const TYPE_ID: u32 = 826;
    const NAME: &'static str = "Publish";
}

impl Encode for PublishRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        write_array(buf, &self.subscription_acknowledgements)
    }
}

impl Decode for PublishRequest {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            header: RequestHeader::decode(buf)?,
            subscription_acknowledgements: read_array(buf)?,
        })
    }
}

/// A notification message delivered by Publish or Republish.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMessage {
    /// Sequence number of this message within its subscription.
    pub sequence_number: u32,
    /// Server time the message was published.
    pub publish_time: Option<DateTime<Utc>>,
    /// The notification payloads; data changes are type id 811.
    pub notification_data: Vec<ExtensionObject>,
}

impl NotificationMessage {
    /// `true` when the message carries no notifications (a keep-alive).
    pub fn is_keep_alive(&self) -> bool {
        self.notification_data.is_empty()
    }
}

impl Encode for NotificationMessage {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.sequence_number.encode(buf)?;
        write_date_time(buf, self.publish_time)?;
        write_array(buf, &self.notification_data)
    }
}

impl Decode for NotificationMessage {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            sequence_number: u32::decode(buf)?,
            publish_time: read_date_time(buf)?,
            notification_data: read_array(buf)?,
        })
    }
}

/// Publish response.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// The subscription this response belongs to.
    pub subscription_id: u32,
    /// Sequence numbers available for republishing.
    pub available_sequence_numbers: Vec<u32>,
    /// More notifications are queued beyond this message.
    pub more_notifications: bool,
    /// The notification message.
    pub notification_message: NotificationMessage,
    /// Results for the acknowledgements sent with the request.
    pub results: Vec<StatusCode>,
}

impl ServiceMessage for PublishResponse {
    const TYPE_ID: u32 = 829;
    const NAME: &'static str = "Publish";
}

impl Encode for PublishResponse {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        self.subscription_id.encode(buf)?;
        write_array(buf, &self.available_sequence_numbers)?;
        self.more_notifications.encode(buf)?;
        self.notification_message.encode(buf)?;
        write_array(buf, &self.results)?;
        write_array::<_, DiagnosticInfo>(buf, &[])
    }
}

impl Decode for PublishResponse {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let header = ResponseHeader::decode(buf)?;
        let subscription_id = u32::decode(buf)?;
        let available_sequence_numbers = read_array(buf)?;
        let more_notifications = bool::decode(buf)?;
        let notification_message = NotificationMessage::decode(buf)?;
        let results = read_array(buf)?;
        let _: Vec<DiagnosticInfo> = read_array(buf)?;
        Ok(Self {
            header,
            subscription_id,
            available_sequence_numbers,
            more_notifications,
            notification_message,
            results,
        })
    }
}

/// Republish request for a missed notification message.
#[derive(Debug, Clone, PartialEq)]
pub struct RepublishRequest {
    /// Request header.
    pub header: RequestHeader,
    /// The subscription that lost a message.
    pub subscription_id: u32,
    /// The sequence number to retransmit.
    pub retransmit_sequence_number: u32,
}

impl ServiceMessage for RepublishRequest {
    const TYPE_ID: u32 = 832;
    const NAME: &'static str = "Republish";
}

impl Encode for RepublishRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        self.subscription_id.encode(buf)?;
        self.retransmit_sequence_number.encode(buf)
    }
}

impl Decode for RepublishRequest {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            header: RequestHeader::decode(buf)?,
            subscription_id: u32::decode(buf)?,
            retransmit_sequence_number: u32::decode(buf)?,
        })
    }
}

/// Republish response.
#[derive(Debug, Clone, PartialEq)]
pub struct RepublishResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// The retransmitted notification message.
    pub notification_message: NotificationMessage,
}

impl ServiceMessage for RepublishResponse {
    const TYPE_ID: u32 = 835;
    const NAME: &'static str = "Republish";
}

impl Encode for RepublishResponse {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.header.encode(buf)?;
        self.notification_message.encode(buf)
    }
}

impl Decode for RepublishResponse {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            header: ResponseHeader::decode(buf)?,
            notification_message: NotificationMessage::decode(buf)?,
        })
    }
}

// =============================================================================
// Data change notifications
// =============================================================================

/// One monitored item's new value inside a data change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemNotification {
    /// The client handle assigned at item creation.
    pub client_handle: u32,
    /// The new value.
    pub value: DataValue,
}

impl Encode for MonitoredItemNotification {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.client_handle.encode(buf)?;
        self.value.encode(buf)
    }
}

impl Decode for MonitoredItemNotification {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            client_handle: u32::decode(buf)?,
            value: DataValue::decode(buf)?,
        })
    }
}

/// The body of a DataChangeNotification extension object.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChangeNotification {
    /// The changed items.
    pub monitored_items: Vec<MonitoredItemNotification>,
}

impl DataChangeNotification {
    /// Wraps the notification in its extension object.
    pub fn to_extension_object(&self) -> WireResult<ExtensionObject> {
        let mut body = Vec::new();
        write_array(&mut body, &self.monitored_items)?;
        write_array::<_, DiagnosticInfo>(&mut body, &[])?;
        Ok(ExtensionObject::new(
            NodeId::numeric(0, DATA_CHANGE_NOTIFICATION_TYPE),
            body,
        ))
    }

    /// Unwraps a data change notification from an extension object, or
    /// `None` when the object carries a different notification type.
    pub fn from_extension_object(object: &ExtensionObject) -> WireResult<Option<Self>> {
        if object.type_id != NodeId::numeric(0, DATA_CHANGE_NOTIFICATION_TYPE) {
            return Ok(None);
        }
        let body = object.body.as_deref().unwrap_or_default();
        let mut slice = body;
        let monitored_items = read_array(&mut slice)?;
        Ok(Some(Self { monitored_items }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uaforge_wire::Variant;

    fn round_trip<M>(message: M)
    where
        M: ServiceMessage + Encode + Decode + PartialEq + std::fmt::Debug,
    {
        let payload = encode_message(&message).unwrap();
        let mut slice = payload.as_slice();
        let type_id = decode_type_id(&mut slice).unwrap();
        assert_eq!(type_id, NodeId::numeric(0, M::TYPE_ID));
        let back = M::decode(&mut slice).unwrap();
        assert_eq!(slice.len(), 0, "{} left trailing bytes", M::NAME);
        assert_eq!(back, message);
    }

    // Timestamps are None so tick truncation cannot break equality.
    fn header(handle: u32) -> RequestHeader {
        RequestHeader {
            timestamp: None,
            ..RequestHeader::new(NodeId::NULL, handle, 30_000)
        }
    }

    fn good(handle: u32) -> ResponseHeader {
        ResponseHeader {
            timestamp: None,
            ..ResponseHeader::good(handle)
        }
    }

    #[test]
    fn test_open_secure_channel_round_trip() {
        round_trip(OpenSecureChannelRequest {
            header: header(1),
            client_protocol_version: 0,
            request_type: TokenRequestType::Issue,
            security_mode: 1,
            client_nonce: None,
            requested_lifetime: 3_600_000,
        });
        round_trip(OpenSecureChannelResponse {
            header: good(1),
            server_protocol_version: 0,
            token: ChannelSecurityToken {
                channel_id: 7,
                token_id: 1,
                created_at: None,
                revised_lifetime: 600_000,
            },
            server_nonce: Some(vec![1]),
        });
    }

    #[test]
    fn test_session_round_trips() {
        round_trip(CreateSessionRequest {
            header: header(2),
            client_description: ApplicationDescription {
                application_uri: "urn:uaforge:client".into(),
                product_uri: "urn:uaforge".into(),
                application_name: LocalizedText::new("uaforge"),
                application_type: 1,
                gateway_server_uri: None,
                discovery_profile_uri: None,
                discovery_urls: Vec::new(),
            },
            server_uri: None,
            endpoint_url: "opc.tcp://plc:4840".into(),
            session_name: "uaforge-session".into(),
            client_nonce: Some(vec![0; 32]),
            client_certificate: None,
            requested_session_timeout: 60_000.0,
            max_response_message_size: 0,
        });

        round_trip(CreateSessionResponse {
            header: good(2),
            session_id: NodeId::numeric(1, 42),
            authentication_token: NodeId::opaque(0, vec![9; 16]),
            revised_session_timeout: 30_000.0,
            server_nonce: Some(vec![1; 32]),
            server_certificate: None,
            server_endpoints: vec![EndpointDescription {
                endpoint_url: "opc.tcp://plc:4840".into(),
                security_policy_uri: "http://opcfoundation.org/UA/SecurityPolicy#None".into(),
                user_identity_tokens: vec![UserTokenPolicy {
                    policy_id: "anonymous".into(),
                    token_type: UserTokenPolicy::ANONYMOUS,
                    ..Default::default()
                }],
                ..Default::default()
            }],
            max_request_message_size: 0,
        });

        round_trip(ActivateSessionRequest {
            header: header(3),
            user_identity_token: ActivateSessionRequest::anonymous_token("anonymous").unwrap(),
            locale_ids: vec!["en".into()],
        });
        round_trip(ActivateSessionResponse {
            header: good(3),
            server_nonce: None,
        });
        round_trip(CloseSessionRequest {
            header: header(4),
            delete_subscriptions: true,
        });
    }

    #[test]
    fn test_anonymous_policy_lookup() {
        let endpoint = EndpointDescription {
            user_identity_tokens: vec![
                UserTokenPolicy {
                    policy_id: "username".into(),
                    token_type: 1,
                    ..Default::default()
                },
                UserTokenPolicy {
                    policy_id: "anon0".into(),
                    token_type: UserTokenPolicy::ANONYMOUS,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(endpoint.anonymous_policy_id(), Some("anon0"));
        assert_eq!(EndpointDescription::default().anonymous_policy_id(), None);
    }

    #[test]
    fn test_read_write_round_trips() {
        round_trip(ReadRequest {
            header: header(5),
            max_age: 0.0,
            timestamps_to_return: TIMESTAMPS_BOTH,
            nodes_to_read: vec![
                ReadValueId::value_of(NodeId::string(2, "Temperature")),
                ReadValueId::value_of(NodeId::numeric(2, 1001)),
            ],
        });
        round_trip(ReadResponse {
            header: good(5),
            results: vec![
                DataValue::new(Variant::String("42".into())),
                DataValue {
                    status: Some(StatusCode::BAD_NODE_ID_UNKNOWN),
                    ..Default::default()
                },
            ],
        });

        round_trip(WriteRequest {
            header: header(6),
            nodes_to_write: vec![WriteValue::value_of(
                NodeId::string(2, "Setpoint"),
                DataValue::new(Variant::Double(21.5)),
            )],
        });
        round_trip(WriteResponse {
            header: good(6),
            results: vec![StatusCode::GOOD],
        });
    }

    #[test]
    fn test_browse_round_trips() {
        round_trip(BrowseRequest {
            header: header(7),
            requested_max_references: 0,
            nodes_to_browse: vec![BrowseDescription::hierarchical(NodeId::OBJECTS_FOLDER)],
        });
        round_trip(BrowseResponse {
            header: good(7),
            results: vec![BrowseResult {
                status: StatusCode::GOOD,
                continuation_point: None,
                references: vec![ReferenceDescription {
                    reference_type_id: NodeId::numeric(0, 35),
                    is_forward: true,
                    node_id: NodeId::string(2, "Boiler"),
                    browse_name: QualifiedName::new(2, "Boiler"),
                    display_name: LocalizedText::new("Boiler"),
                    node_class: 1,
                    type_definition: NodeId::numeric(0, 61),
                }],
            }],
        });
        round_trip(BrowseNextRequest {
            header: header(8),
            release_continuation_points: true,
            continuation_points: vec![vec![1, 2, 3]],
        });
    }

    #[test]
    fn test_subscription_round_trips() {
        round_trip(CreateSubscriptionRequest {
            header: header(9),
            requested_publishing_interval: 1000.0,
            requested_lifetime_count: 60,
            requested_max_keep_alive_count: 10,
            max_notifications_per_publish: 65_535,
            publishing_enabled: true,
            priority: 0,
        });
        round_trip(CreateSubscriptionResponse {
            header: good(9),
            subscription_id: 11,
            revised_publishing_interval: 500.0,
            revised_lifetime_count: 120,
            revised_max_keep_alive_count: 10,
        });
        round_trip(CreateMonitoredItemsRequest {
            header: header(10),
            subscription_id: 11,
            timestamps_to_return: TIMESTAMPS_BOTH,
            items_to_create: vec![MonitoredItemCreateRequest {
                item_to_monitor: ReadValueId::value_of(NodeId::string(2, "Flow")),
                monitoring_mode: 2,
                requested_parameters: MonitoringParameters {
                    client_handle: 1,
                    sampling_interval: 250.0,
                    queue_size: 10,
                    discard_oldest: true,
                },
            }],
        });
        round_trip(DeleteMonitoredItemsRequest {
            header: header(11),
            subscription_id: 11,
            monitored_item_ids: vec![1, 2],
        });
        round_trip(DeleteSubscriptionsRequest {
            header: header(12),
            subscription_ids: vec![11],
        });
    }

    #[test]
    fn test_publish_round_trips() {
        let data_change = DataChangeNotification {
            monitored_items: vec![MonitoredItemNotification {
                client_handle: 1,
                value: DataValue::new(Variant::Int32(7)),
            }],
        };
        round_trip(PublishRequest {
            header: header(13),
            subscription_acknowledgements: vec![SubscriptionAcknowledgement {
                subscription_id: 11,
                sequence_number: 4,
            }],
        });
        round_trip(PublishResponse {
            header: good(13),
            subscription_id: 11,
            available_sequence_numbers: vec![5],
            more_notifications: false,
            notification_message: NotificationMessage {
                sequence_number: 5,
                publish_time: None,
                notification_data: vec![data_change.to_extension_object().unwrap()],
            },
            results: vec![StatusCode::GOOD],
        });
        round_trip(RepublishRequest {
            header: header(14),
            subscription_id: 11,
            retransmit_sequence_number: 4,
        });
    }

    #[test]
    fn test_data_change_unwrap() {
        let notification = DataChangeNotification {
            monitored_items: vec![MonitoredItemNotification {
                client_handle: 42,
                value: DataValue::new(Variant::Boolean(true)),
            }],
        };
        let object = notification.to_extension_object().unwrap();
        let back = DataChangeNotification::from_extension_object(&object)
            .unwrap()
            .expect("type id matches");
        assert_eq!(back, notification);

        // A different notification type is skipped, not an error.
        let other = ExtensionObject::new(NodeId::numeric(0, 916), vec![0; 4]);
        assert_eq!(
            DataChangeNotification::from_extension_object(&other).unwrap(),
            None
        );
    }

    #[test]
    fn test_decode_response_paths() {
        let response = WriteResponse {
            header: good(1),
            results: vec![StatusCode::GOOD],
        };
        let payload = encode_message(&response).unwrap();
        let back: WriteResponse = decode_response(&payload).unwrap();
        assert_eq!(back, response);

        // A ServiceFault surfaces as a fault naming the expected service.
        let fault = ServiceFault {
            header: ResponseHeader::bad(2, StatusCode::BAD_TIMEOUT),
        };
        let payload = encode_message(&fault).unwrap();
        let err = decode_response::<WriteResponse>(&payload).unwrap_err();
        match err {
            crate::error::ClientError::Service(ServiceError::Fault { service, status }) => {
                assert_eq!(service, "Write");
                assert_eq!(status, StatusCode::BAD_TIMEOUT);
            }
            other => panic!("unexpected error: {other}"),
        }

        // A response of the wrong type is rejected.
        let read = ReadResponse {
            header: good(3),
            results: vec![],
        };
        let payload = encode_message(&read).unwrap();
        let err = decode_response::<WriteResponse>(&payload).unwrap_err();
        assert!(matches!(
            err,
            crate::error::ClientError::Service(ServiceError::UnexpectedResponse { .. })
        ));

        // A bad service result inside a well-typed response is a fault.
        let rejected = WriteResponse {
            header: ResponseHeader::bad(4, StatusCode::BAD_SESSION_ID_INVALID),
            results: vec![],
        };
        let payload = encode_message(&rejected).unwrap();
        let err = decode_response::<WriteResponse>(&payload).unwrap_err();
        assert!(matches!(
            err,
            crate::error::ClientError::Service(ServiceError::Fault { .. })
        ));
    }

    #[test]
    fn test_service_fault_round_trip() {
        round_trip(ServiceFault {
            header: ResponseHeader {
                timestamp: None,
                ..ResponseHeader::bad(15, StatusCode::BAD_SESSION_ID_INVALID)
            },
        });
    }
}
