// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connection-protocol message framing.
//!
//! Every message on the wire starts with an 8-byte header: a 3-byte type
//! code, a chunk marker, and the total chunk size. Service payloads travel
//! in MSG chunks carrying the secure-channel id, a symmetric security
//! header, and a sequence header; large payloads are split across chunks and
//! reassembled under the negotiated limits.
//!
//! ```text
//! +-----+---+----------+   +-----------+---------+-----------+----------+
//! | MSG | F | size u32 |   | channel   | token   | seq, req  | body ... |
//! +-----+---+----------+   +-----------+---------+-----------+----------+
//!    message header              u32        u32      u32 u32
//! ```

use bytes::{Buf, BufMut};

use crate::codec::{read_byte_string, read_string, write_byte_string, write_string, Decode, Encode};
use crate::error::{WireError, WireResult};

/// Size of the fixed message header in bytes.
pub const MESSAGE_HEADER_SIZE: usize = 8;

/// Protocol version sent in Hello.
pub const PROTOCOL_VERSION: u32 = 0;

/// Per-chunk overhead of a MSG chunk: header + channel id + token id + sequence header.
pub const MSG_CHUNK_OVERHEAD: usize = MESSAGE_HEADER_SIZE + 4 + 4 + 8;

// =============================================================================
// Message and chunk types
// =============================================================================

/// The 3-byte message type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Client hello.
    Hello,
    /// Server acknowledge.
    Acknowledge,
    /// Fatal transport error.
    Error,
    /// Server-initiated reverse hello.
    ReverseHello,
    /// Open-secure-channel envelope.
    OpenChannel,
    /// Close-secure-channel envelope.
    CloseChannel,
    /// Service message envelope.
    Message,
}

impl MessageType {
    /// The wire code for this type.
    pub const fn code(self) -> [u8; 3] {
        match self {
            Self::Hello => *b"HEL",
            Self::Acknowledge => *b"ACK",
            Self::Error => *b"ERR",
            Self::ReverseHello => *b"RHE",
            Self::OpenChannel => *b"OPN",
            Self::CloseChannel => *b"CLO",
            Self::Message => *b"MSG",
        }
    }

    /// Maps a wire code back to the type.
    pub fn from_code(code: [u8; 3]) -> WireResult<Self> {
        Ok(match &code {
            b"HEL" => Self::Hello,
            b"ACK" => Self::Acknowledge,
            b"ERR" => Self::Error,
            b"RHE" => Self::ReverseHello,
            b"OPN" => Self::OpenChannel,
            b"CLO" => Self::CloseChannel,
            b"MSG" => Self::Message,
            _ => return Err(WireError::UnknownMessageType(code)),
        })
    }
}

/// Position of a chunk within a chunked message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// More chunks follow.
    Intermediate,
    /// Last chunk of the message.
    Final,
    /// The sender abandoned the message.
    Abort,
}

impl ChunkKind {
    /// The wire marker byte.
    pub const fn marker(self) -> u8 {
        match self {
            Self::Intermediate => b'C',
            Self::Final => b'F',
            Self::Abort => b'A',
        }
    }

    /// Maps a marker byte back to the kind.
    pub fn from_marker(marker: u8) -> WireResult<Self> {
        Ok(match marker {
            b'C' => Self::Intermediate,
            b'F' => Self::Final,
            b'A' => Self::Abort,
            other => {
                return Err(WireError::InvalidValue {
                    what: "chunk kind",
                    value: u64::from(other),
                })
            }
        })
    }
}

/// The fixed 8-byte message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Message type code.
    pub message_type: MessageType,
    /// Chunk marker; always `Final` for non-MSG messages.
    pub chunk_kind: ChunkKind,
    /// Total size of the chunk including this header.
    pub size: u32,
}

impl MessageHeader {
    /// Builds a header for a single-chunk message of `size` total bytes.
    pub const fn single(message_type: MessageType, size: u32) -> Self {
        Self {
            message_type,
            chunk_kind: ChunkKind::Final,
            size,
        }
    }
}

impl Encode for MessageHeader {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        buf.put_slice(&self.message_type.code());
        buf.put_u8(self.chunk_kind.marker());
        buf.put_u32_le(self.size);
        Ok(())
    }
}

impl Decode for MessageHeader {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        crate::codec::ensure(buf, MESSAGE_HEADER_SIZE)?;
        let mut code = [0u8; 3];
        buf.copy_to_slice(&mut code);
        let message_type = MessageType::from_code(code)?;
        let chunk_kind = ChunkKind::from_marker(buf.get_u8())?;
        let size = buf.get_u32_le();
        if (size as usize) < MESSAGE_HEADER_SIZE {
            return Err(WireError::InvalidValue {
                what: "message size",
                value: u64::from(size),
            });
        }
        Ok(Self {
            message_type,
            chunk_kind,
            size,
        })
    }
}

// =============================================================================
// Hello / Acknowledge / Error
// =============================================================================

/// Client hello: proposes buffer limits and names the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    /// Transport protocol version.
    pub protocol_version: u32,
    /// Largest chunk the sender is willing to receive.
    pub receive_buffer_size: u32,
    /// Largest chunk the sender intends to send.
    pub send_buffer_size: u32,
    /// Largest reassembled message the sender accepts; 0 = no limit.
    pub max_message_size: u32,
    /// Most chunks per message the sender accepts; 0 = no limit.
    pub max_chunk_count: u32,
    /// The endpoint url this connection is for.
    pub endpoint_url: String,
}

impl Encode for Hello {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.protocol_version.encode(buf)?;
        self.receive_buffer_size.encode(buf)?;
        self.send_buffer_size.encode(buf)?;
        self.max_message_size.encode(buf)?;
        self.max_chunk_count.encode(buf)?;
        write_string(buf, Some(&self.endpoint_url))
    }
}

impl Decode for Hello {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            protocol_version: u32::decode(buf)?,
            receive_buffer_size: u32::decode(buf)?,
            send_buffer_size: u32::decode(buf)?,
            max_message_size: u32::decode(buf)?,
            max_chunk_count: u32::decode(buf)?,
            endpoint_url: read_string(buf)?.unwrap_or_default(),
        })
    }
}

/// Server acknowledge: the revised limits both sides must honor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledge {
    /// Transport protocol version.
    pub protocol_version: u32,
    /// Largest chunk the server is willing to receive.
    pub receive_buffer_size: u32,
    /// Largest chunk the server intends to send.
    pub send_buffer_size: u32,
    /// Largest reassembled message the server accepts; 0 = no limit.
    pub max_message_size: u32,
    /// Most chunks per message the server accepts; 0 = no limit.
    pub max_chunk_count: u32,
}

impl Encode for Acknowledge {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.protocol_version.encode(buf)?;
        self.receive_buffer_size.encode(buf)?;
        self.send_buffer_size.encode(buf)?;
        self.max_message_size.encode(buf)?;
        self.max_chunk_count.encode(buf)?;
        Ok(())
    }
}

impl Decode for Acknowledge {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            protocol_version: u32::decode(buf)?,
            receive_buffer_size: u32::decode(buf)?,
            send_buffer_size: u32::decode(buf)?,
            max_message_size: u32::decode(buf)?,
            max_chunk_count: u32::decode(buf)?,
        })
    }
}

/// Fatal transport error sent before the peer closes the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    /// Status code describing the failure.
    pub error: u32,
    /// Human-readable reason, may be empty.
    pub reason: String,
}

impl Encode for ErrorMessage {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.error.encode(buf)?;
        write_string(buf, Some(&self.reason))
    }
}

impl Decode for ErrorMessage {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            error: u32::decode(buf)?,
            reason: read_string(buf)?.unwrap_or_default(),
        })
    }
}

// =============================================================================
// Security and sequence headers
// =============================================================================

/// Asymmetric security header used on OPN chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsymmetricSecurityHeader {
    /// URI of the security policy in force.
    pub security_policy_uri: String,
    /// DER certificate of the sender; null under policy None.
    pub sender_certificate: Option<Vec<u8>>,
    /// SHA-1 thumbprint of the receiver certificate; null under policy None.
    pub receiver_certificate_thumbprint: Option<Vec<u8>>,
}

impl AsymmetricSecurityHeader {
    /// Header for an unsecured channel.
    pub fn none(policy_uri: impl Into<String>) -> Self {
        Self {
            security_policy_uri: policy_uri.into(),
            sender_certificate: None,
            receiver_certificate_thumbprint: None,
        }
    }
}

impl Encode for AsymmetricSecurityHeader {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        write_string(buf, Some(&self.security_policy_uri))?;
        write_byte_string(buf, self.sender_certificate.as_deref())?;
        write_byte_string(buf, self.receiver_certificate_thumbprint.as_deref())
    }
}

impl Decode for AsymmetricSecurityHeader {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            security_policy_uri: read_string(buf)?.unwrap_or_default(),
            sender_certificate: read_byte_string(buf)?,
            receiver_certificate_thumbprint: read_byte_string(buf)?,
        })
    }
}

/// Sequence header present on every secured chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceHeader {
    /// Monotonically increasing per direction.
    pub sequence_number: u32,
    /// Correlates chunks and responses with their request.
    pub request_id: u32,
}

impl Encode for SequenceHeader {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.sequence_number.encode(buf)?;
        self.request_id.encode(buf)
    }
}

impl Decode for SequenceHeader {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            sequence_number: u32::decode(buf)?,
            request_id: u32::decode(buf)?,
        })
    }
}

// =============================================================================
// Transport limits
// =============================================================================

/// Negotiated transport limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportLimits {
    /// Largest chunk we accept.
    pub receive_buffer_size: u32,
    /// Largest chunk we may send.
    pub send_buffer_size: u32,
    /// Largest reassembled message we accept; 0 = unlimited.
    pub max_message_size: u32,
    /// Most chunks per message we accept; 0 = unlimited.
    pub max_chunk_count: u32,
}

impl Default for TransportLimits {
    fn default() -> Self {
        Self {
            receive_buffer_size: 65_536,
            send_buffer_size: 65_536,
            max_message_size: 16 * 1024 * 1024,
            max_chunk_count: 4096,
        }
    }
}

impl TransportLimits {
    /// Minimum chunk size the protocol allows.
    pub const MIN_CHUNK_SIZE: u32 = 8192;

    /// The Hello this side sends for these limits.
    pub fn to_hello(self, endpoint_url: impl Into<String>) -> Hello {
        Hello {
            protocol_version: PROTOCOL_VERSION,
            receive_buffer_size: self.receive_buffer_size,
            send_buffer_size: self.send_buffer_size,
            max_message_size: self.max_message_size,
            max_chunk_count: self.max_chunk_count,
            endpoint_url: endpoint_url.into(),
        }
    }

    /// Applies the server's acknowledge. The revised values bind: our send
    /// buffer shrinks to the server's receive buffer and vice versa.
    pub fn revise(self, ack: &Acknowledge) -> Self {
        Self {
            receive_buffer_size: self.receive_buffer_size.min(ack.send_buffer_size),
            send_buffer_size: self.send_buffer_size.min(ack.receive_buffer_size),
            max_message_size: non_zero_min(self.max_message_size, ack.max_message_size),
            max_chunk_count: non_zero_min(self.max_chunk_count, ack.max_chunk_count),
        }
    }

    /// Largest MSG chunk body that fits in the negotiated send buffer.
    pub fn max_chunk_body(&self) -> usize {
        (self.send_buffer_size as usize).saturating_sub(MSG_CHUNK_OVERHEAD)
    }
}

fn non_zero_min(a: u32, b: u32) -> u32 {
    match (a, b) {
        (0, b) => b,
        (a, 0) => a,
        (a, b) => a.min(b),
    }
}

// =============================================================================
// Chunk envelope
// =============================================================================

/// A parsed MSG or CLO chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEnvelope {
    /// `Message` or `CloseChannel`.
    pub message_type: MessageType,
    /// Chunk position marker.
    pub chunk_kind: ChunkKind,
    /// Secure channel id.
    pub channel_id: u32,
    /// Security token id in force for this chunk.
    pub token_id: u32,
    /// Sequence header.
    pub sequence: SequenceHeader,
    /// The chunk body (service payload fragment, or abort detail).
    pub body: Vec<u8>,
}

impl ChunkEnvelope {
    /// Parses the payload that follows a MSG/CLO message header.
    pub fn parse(header: MessageHeader, mut payload: &[u8]) -> WireResult<Self> {
        let channel_id = u32::decode(&mut payload)?;
        let token_id = u32::decode(&mut payload)?;
        let sequence = SequenceHeader::decode(&mut payload)?;
        Ok(Self {
            message_type: header.message_type,
            chunk_kind: header.chunk_kind,
            channel_id,
            token_id,
            sequence,
            body: payload.to_vec(),
        })
    }

    /// Serializes the chunk including its message header.
    pub fn to_bytes(&self) -> WireResult<Vec<u8>> {
        let size = (MSG_CHUNK_OVERHEAD + self.body.len()) as u32;
        let mut buf = Vec::with_capacity(size as usize);
        MessageHeader {
            message_type: self.message_type,
            chunk_kind: self.chunk_kind,
            size,
        }
        .encode(&mut buf)?;
        buf.put_u32_le(self.channel_id);
        buf.put_u32_le(self.token_id);
        self.sequence.encode(&mut buf)?;
        buf.extend_from_slice(&self.body);
        Ok(buf)
    }
}

// =============================================================================
// Chunker / Assembler
// =============================================================================

/// Splits a service payload into MSG chunks under the negotiated limits.
pub struct Chunker;

impl Chunker {
    /// Produces the wire chunks for one request payload. `next_sequence` is
    /// called once per chunk so sequence numbers stay monotonic across
    /// messages.
    pub fn split(
        message_type: MessageType,
        channel_id: u32,
        token_id: u32,
        request_id: u32,
        payload: &[u8],
        limits: &TransportLimits,
        mut next_sequence: impl FnMut() -> u32,
    ) -> WireResult<Vec<Vec<u8>>> {
        let max_body = limits.max_chunk_body();
        if max_body == 0 {
            return Err(WireError::MessageTooLarge {
                size: payload.len(),
                limit: limits.send_buffer_size as usize,
            });
        }
        let chunk_count = payload.len().div_ceil(max_body).max(1);
        if limits.max_chunk_count != 0 && chunk_count as u32 > limits.max_chunk_count {
            return Err(WireError::TooManyChunks {
                count: chunk_count as u32,
                limit: limits.max_chunk_count,
            });
        }

        let mut chunks = Vec::with_capacity(chunk_count);
        for (index, body) in split_slices(payload, max_body).enumerate() {
            let chunk_kind = if index + 1 == chunk_count {
                ChunkKind::Final
            } else {
                ChunkKind::Intermediate
            };
            let envelope = ChunkEnvelope {
                message_type,
                chunk_kind,
                channel_id,
                token_id,
                sequence: SequenceHeader {
                    sequence_number: next_sequence(),
                    request_id,
                },
                body: body.to_vec(),
            };
            chunks.push(envelope.to_bytes()?);
        }
        Ok(chunks)
    }
}

/// Iterates `max_len`-sized slices, yielding one empty slice for empty input.
fn split_slices(data: &[u8], max_len: usize) -> impl Iterator<Item = &[u8]> {
    let count = data.len().div_ceil(max_len).max(1);
    (0..count).map(move |i| {
        let start = i * max_len;
        let end = ((i + 1) * max_len).min(data.len());
        &data[start..end]
    })
}

/// A fully reassembled inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    /// Request id the message answers.
    pub request_id: u32,
    /// Token id the final chunk was secured with.
    pub token_id: u32,
    /// The complete service payload.
    pub payload: Vec<u8>,
}

struct PartialMessage {
    request_id: u32,
    chunk_count: u32,
    payload: Vec<u8>,
}

/// Reassembles chunked inbound messages and polices the limits.
pub struct Assembler {
    limits: TransportLimits,
    partial: Option<PartialMessage>,
    last_sequence: Option<u32>,
}

impl Assembler {
    /// Creates an assembler for the given negotiated limits.
    pub fn new(limits: TransportLimits) -> Self {
        Self {
            limits,
            partial: None,
            last_sequence: None,
        }
    }

    /// Feeds one inbound chunk. Returns the completed message when the
    /// final chunk arrives.
    pub fn feed(&mut self, chunk: ChunkEnvelope) -> WireResult<Option<AssembledMessage>> {
        self.check_sequence(chunk.sequence.sequence_number)?;

        if chunk.chunk_kind == ChunkKind::Abort {
            self.partial = None;
            let mut body = chunk.body.as_slice();
            let status = u32::decode(&mut body).unwrap_or(0);
            let reason = read_string(&mut body).ok().flatten().unwrap_or_default();
            return Err(WireError::MessageAborted { status, reason });
        }

        let request_id = chunk.sequence.request_id;
        if let Some(partial) = &self.partial {
            if partial.request_id != request_id {
                let expected = partial.request_id;
                self.partial = None;
                return Err(WireError::InterleavedChunks {
                    expected,
                    actual: request_id,
                });
            }
        }
        let partial = self.partial.get_or_insert_with(|| PartialMessage {
            request_id,
            chunk_count: 0,
            payload: Vec::new(),
        });

        partial.chunk_count += 1;
        if self.limits.max_chunk_count != 0 && partial.chunk_count > self.limits.max_chunk_count {
            let count = partial.chunk_count;
            self.partial = None;
            return Err(WireError::TooManyChunks {
                count,
                limit: self.limits.max_chunk_count,
            });
        }

        partial.payload.extend_from_slice(&chunk.body);
        if self.limits.max_message_size != 0
            && partial.payload.len() > self.limits.max_message_size as usize
        {
            let size = partial.payload.len();
            self.partial = None;
            return Err(WireError::MessageTooLarge {
                size,
                limit: self.limits.max_message_size as usize,
            });
        }

        if chunk.chunk_kind == ChunkKind::Final {
            if let Some(done) = self.partial.take() {
                return Ok(Some(AssembledMessage {
                    request_id: done.request_id,
                    token_id: chunk.token_id,
                    payload: done.payload,
                }));
            }
        }
        Ok(None)
    }

    fn check_sequence(&mut self, sequence: u32) -> WireResult<()> {
        if let Some(last) = self.last_sequence {
            // Wrap-around is tolerated near the top of the range.
            let wrapped = last > u32::MAX - 1024 && sequence < 1024;
            if sequence <= last && !wrapped {
                return Err(WireError::InvalidValue {
                    what: "sequence number",
                    value: u64::from(sequence),
                });
            }
        }
        self.last_sequence = Some(sequence);
        Ok(())
    }
}
