// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! TCP transport: socket lifecycle, Hello negotiation, and request
//! multiplexing.
//!
//! After the handshake a background reader owns the receive half of the
//! socket. Requests register a oneshot sender keyed by request id, write
//! their chunks, and await the reader delivering the matching response.
//! The reader correlates responses by the request id in the sequence
//! header, which lets a long-running Publish sit outstanding while reads
//! and writes flow past it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use uaforge_wire::framing::{
    Acknowledge, AsymmetricSecurityHeader, Assembler, ChunkEnvelope, Chunker, ErrorMessage,
    MessageHeader, MessageType, SequenceHeader, TransportLimits, MESSAGE_HEADER_SIZE,
};
use uaforge_wire::{Decode, Encode, StatusCode, WireError};

use crate::error::{ClientError, ClientResult, ConnectionError};

/// Extracts the `host:port` authority from an `opc.tcp://` url.
pub(crate) fn endpoint_authority(endpoint_url: &str) -> ClientResult<String> {
    let rest = endpoint_url
        .strip_prefix("opc.tcp://")
        .ok_or_else(|| crate::error::ConfigError::InvalidEndpoint {
            url: endpoint_url.to_string(),
        })?;
    let authority = rest.split('/').next().unwrap_or(rest);
    if authority.is_empty() {
        return Err(crate::error::ConfigError::InvalidEndpoint {
            url: endpoint_url.to_string(),
        }
        .into());
    }
    // Default port when the url omits it.
    if authority.contains(':') {
        Ok(authority.to_string())
    } else {
        Ok(format!("{authority}:4840"))
    }
}

struct TransportInner {
    endpoint: String,
    limits: TransportLimits,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    channel_id: AtomicU32,
    token_id: AtomicU32,
    sequence: AtomicU32,
    request_id: AtomicU32,
    pending: Mutex<HashMap<u32, oneshot::Sender<ClientResult<Vec<u8>>>>>,
    closed: AtomicBool,
    close_reason: Mutex<Option<String>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl TransportInner {
    fn complete(&self, request_id: u32, result: ClientResult<Vec<u8>>) {
        let sender = self
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(&request_id));
        match sender {
            Some(sender) => {
                let _ = sender.send(result);
            }
            None => warn!(request_id, "response for unknown request dropped"),
        }
    }

    fn die(&self, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(endpoint = %self.endpoint, reason, "transport closed");
        if let Ok(mut slot) = self.close_reason.lock() {
            *slot = Some(reason.to_string());
        }
        let drained: Vec<_> = match self.pending.lock() {
            Ok(mut pending) => pending.drain().collect(),
            Err(_) => Vec::new(),
        };
        for (_, sender) in drained {
            let _ = sender.send(Err(ClientError::connection_lost(reason)));
        }
    }

    fn lost_error(&self) -> ClientError {
        let reason = self
            .close_reason
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_else(|| "connection closed".to_string());
        ClientError::connection_lost(reason)
    }
}

/// A connected UACP transport. Cheap to clone; all clones share the socket.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

impl Transport {
    /// Connects, performs the Hello/Acknowledge handshake, and starts the
    /// background reader.
    pub async fn connect(
        endpoint_url: &str,
        limits: TransportLimits,
        connect_timeout: Duration,
    ) -> ClientResult<Self> {
        let authority = endpoint_authority(endpoint_url)?;
        debug!(endpoint = %endpoint_url, %authority, "connecting");

        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&authority))
            .await
            .map_err(|_| ClientError::timeout("connect", connect_timeout))?
            .map_err(|source| ConnectionError::Io {
                endpoint: endpoint_url.to_string(),
                source,
            })?;
        stream.set_nodelay(true).map_err(|source| ConnectionError::Io {
            endpoint: endpoint_url.to_string(),
            source,
        })?;

        let mut stream = stream;
        let revised = tokio::time::timeout(
            connect_timeout,
            handshake(&mut stream, endpoint_url, limits),
        )
        .await
        .map_err(|_| ClientError::timeout("hello", connect_timeout))??;
        debug!(
            endpoint = %endpoint_url,
            send_buffer = revised.send_buffer_size,
            receive_buffer = revised.receive_buffer_size,
            max_message = revised.max_message_size,
            max_chunks = revised.max_chunk_count,
            "transport limits negotiated"
        );

        let (read_half, write_half) = stream.into_split();
        let inner = Arc::new(TransportInner {
            endpoint: endpoint_url.to_string(),
            limits: revised,
            writer: tokio::sync::Mutex::new(write_half),
            channel_id: AtomicU32::new(0),
            token_id: AtomicU32::new(0),
            sequence: AtomicU32::new(0),
            request_id: AtomicU32::new(0),
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            close_reason: Mutex::new(None),
            reader: Mutex::new(None),
        });

        let handle = tokio::spawn(reader_loop(Arc::clone(&inner), read_half));
        if let Ok(mut slot) = inner.reader.lock() {
            *slot = Some(handle);
        }
        Ok(Self { inner })
    }

    /// The limits negotiated in the handshake.
    pub fn limits(&self) -> TransportLimits {
        self.inner.limits
    }

    /// `true` until the socket fails or [`Self::shutdown`] runs.
    pub fn is_alive(&self) -> bool {
        !self.inner.closed.load(Ordering::SeqCst)
    }

    /// Records the secure channel and token ids used on MSG chunks.
    pub fn set_security(&self, channel_id: u32, token_id: u32) {
        self.inner.channel_id.store(channel_id, Ordering::SeqCst);
        self.inner.token_id.store(token_id, Ordering::SeqCst);
    }

    /// Allocates the next request id.
    fn next_request_id(&self) -> u32 {
        self.inner.request_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Sends a service request in MSG chunks and awaits the response payload.
    pub async fn request(
        &self,
        operation: &'static str,
        payload: &[u8],
        timeout: Duration,
    ) -> ClientResult<Vec<u8>> {
        if !self.is_alive() {
            return Err(self.inner.lost_error());
        }
        let request_id = self.next_request_id();
        let rx = self.register(request_id)?;

        let write = async {
            let inner = &self.inner;
            let mut writer = inner.writer.lock().await;
            // Sequence numbers are allocated under the writer lock so they
            // stay monotonic in send order.
            let chunks = Chunker::split(
                MessageType::Message,
                inner.channel_id.load(Ordering::SeqCst),
                inner.token_id.load(Ordering::SeqCst),
                request_id,
                payload,
                &inner.limits,
                || inner.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            )?;
            trace!(request_id, chunks = chunks.len(), operation, "request sent");
            for chunk in &chunks {
                writer.write_all(chunk).await.map_err(|source| {
                    ClientError::from(ConnectionError::Io {
                        endpoint: inner.endpoint.clone(),
                        source,
                    })
                })?;
            }
            writer.flush().await.map_err(|source| {
                ClientError::from(ConnectionError::Io {
                    endpoint: inner.endpoint.clone(),
                    source,
                })
            })
        };
        if let Err(e) = write.await {
            self.discard(request_id);
            self.inner.die("write failed");
            return Err(e);
        }

        self.await_response(operation, request_id, rx, timeout).await
    }

    /// Sends an OpenSecureChannel request in a single OPN chunk and awaits
    /// the response payload. `channel_id` is 0 on the first open.
    pub async fn open_channel_request(
        &self,
        channel_id: u32,
        policy_uri: &str,
        payload: &[u8],
        timeout: Duration,
    ) -> ClientResult<Vec<u8>> {
        if !self.is_alive() {
            return Err(self.inner.lost_error());
        }
        let request_id = self.next_request_id();
        let rx = self.register(request_id)?;

        let write = async {
            let inner = &self.inner;
            let mut writer = inner.writer.lock().await;
            let chunk = encode_open_chunk(
                channel_id,
                policy_uri,
                SequenceHeader {
                    sequence_number: inner.sequence.fetch_add(1, Ordering::SeqCst) + 1,
                    request_id,
                },
                payload,
            )?;
            writer.write_all(&chunk).await.map_err(|source| {
                ClientError::from(ConnectionError::Io {
                    endpoint: inner.endpoint.clone(),
                    source,
                })
            })?;
            writer.flush().await.map_err(|source| {
                ClientError::from(ConnectionError::Io {
                    endpoint: inner.endpoint.clone(),
                    source,
                })
            })
        };
        if let Err(e) = write.await {
            self.discard(request_id);
            self.inner.die("write failed");
            return Err(e);
        }

        self.await_response("OpenSecureChannel", request_id, rx, timeout)
            .await
    }

    /// Sends a CloseSecureChannel request. No response is awaited; the
    /// server closes the socket after processing it.
    pub async fn send_close(&self, payload: &[u8]) -> ClientResult<()> {
        if !self.is_alive() {
            return Err(self.inner.lost_error());
        }
        let inner = &self.inner;
        let request_id = self.next_request_id();
        let mut writer = inner.writer.lock().await;
        let chunks = Chunker::split(
            MessageType::CloseChannel,
            inner.channel_id.load(Ordering::SeqCst),
            inner.token_id.load(Ordering::SeqCst),
            request_id,
            payload,
            &inner.limits,
            || inner.sequence.fetch_add(1, Ordering::SeqCst) + 1,
        )?;
        for chunk in &chunks {
            writer
                .write_all(chunk)
                .await
                .map_err(|source| ConnectionError::Io {
                    endpoint: inner.endpoint.clone(),
                    source,
                })?;
        }
        writer.flush().await.map_err(|source| {
            ClientError::from(ConnectionError::Io {
                endpoint: inner.endpoint.clone(),
                source,
            })
        })
    }

    /// Stops the reader and closes the socket. Idempotent.
    pub async fn shutdown(&self) {
        self.inner.die("shutdown");
        let handle = self.inner.reader.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            handle.abort();
        }
        let mut writer = self.inner.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    fn register(&self, request_id: u32) -> ClientResult<oneshot::Receiver<ClientResult<Vec<u8>>>> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self
            .inner
            .pending
            .lock()
            .map_err(|_| ClientError::connection_lost("transport state poisoned"))?;
        pending.insert(request_id, tx);
        Ok(rx)
    }

    fn discard(&self, request_id: u32) {
        if let Ok(mut pending) = self.inner.pending.lock() {
            pending.remove(&request_id);
        }
    }

    async fn await_response(
        &self,
        operation: &'static str,
        request_id: u32,
        rx: oneshot::Receiver<ClientResult<Vec<u8>>>,
        timeout: Duration,
    ) -> ClientResult<Vec<u8>> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(self.inner.lost_error()),
            Err(_) => {
                self.discard(request_id);
                Err(ClientError::timeout(operation, timeout))
            }
        }
    }
}

/// Sends Hello and waits for Acknowledge or ERR on the fresh socket.
async fn handshake(
    stream: &mut TcpStream,
    endpoint_url: &str,
    limits: TransportLimits,
) -> ClientResult<TransportLimits> {
    let hello = limits.to_hello(endpoint_url);
    let body = hello.encode_to_vec()?;
    let mut frame = Vec::with_capacity(MESSAGE_HEADER_SIZE + body.len());
    MessageHeader::single(
        MessageType::Hello,
        (MESSAGE_HEADER_SIZE + body.len()) as u32,
    )
    .encode(&mut frame)?;
    frame.extend_from_slice(&body);
    let io_err = |source| {
        ClientError::from(ConnectionError::Io {
            endpoint: endpoint_url.to_string(),
            source,
        })
    };
    stream.write_all(&frame).await.map_err(io_err)?;

    let (header, payload) = read_frame(stream, limits.receive_buffer_size)
        .await
        .map_err(|e| match e {
            ReadFrameError::Io(source) => io_err(source),
            ReadFrameError::Wire(e) => e.into(),
            ReadFrameError::Oversize(size) => {
                ConnectionError::ProtocolViolation(format!("oversized frame: {size} bytes")).into()
            }
        })?;
    match header.message_type {
        MessageType::Acknowledge => {
            let ack = Acknowledge::decode(&mut payload.as_slice())?;
            Ok(limits.revise(&ack))
        }
        MessageType::Error => {
            let error = ErrorMessage::decode(&mut payload.as_slice())?;
            Err(ConnectionError::HelloRejected {
                status: StatusCode(error.error),
                reason: error.reason,
            }
            .into())
        }
        other => Err(ConnectionError::ProtocolViolation(format!(
            "expected ACK, got {:?}",
            other
        ))
        .into()),
    }
}

enum ReadFrameError {
    Io(std::io::Error),
    Wire(WireError),
    Oversize(u32),
}

impl From<std::io::Error> for ReadFrameError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<WireError> for ReadFrameError {
    fn from(e: WireError) -> Self {
        Self::Wire(e)
    }
}

/// Reads one framed message: the fixed header plus its payload.
async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    max_frame: u32,
) -> Result<(MessageHeader, Vec<u8>), ReadFrameError> {
    let mut head = [0u8; MESSAGE_HEADER_SIZE];
    reader.read_exact(&mut head).await?;
    let header = MessageHeader::decode(&mut head.as_slice())?;
    if max_frame != 0 && header.size > max_frame {
        return Err(ReadFrameError::Oversize(header.size));
    }
    let mut payload = vec![0u8; header.size as usize - MESSAGE_HEADER_SIZE];
    reader.read_exact(&mut payload).await?;
    Ok((header, payload))
}

/// Builds the single OPN chunk: header, channel id, asymmetric security
/// header, sequence header, payload.
fn encode_open_chunk(
    channel_id: u32,
    policy_uri: &str,
    sequence: SequenceHeader,
    payload: &[u8],
) -> ClientResult<Vec<u8>> {
    let mut body = Vec::new();
    body.extend_from_slice(&channel_id.to_le_bytes());
    AsymmetricSecurityHeader::none(policy_uri).encode(&mut body)?;
    sequence.encode(&mut body)?;
    body.extend_from_slice(payload);

    let mut frame = Vec::with_capacity(MESSAGE_HEADER_SIZE + body.len());
    MessageHeader::single(
        MessageType::OpenChannel,
        (MESSAGE_HEADER_SIZE + body.len()) as u32,
    )
    .encode(&mut frame)?;
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Parses an inbound OPN chunk down to its sequence header and payload.
fn parse_open_chunk(mut payload: &[u8]) -> Result<(SequenceHeader, Vec<u8>), WireError> {
    let _channel_id = u32::decode(&mut payload)?;
    let _security = AsymmetricSecurityHeader::decode(&mut payload)?;
    let sequence = SequenceHeader::decode(&mut payload)?;
    Ok((sequence, payload.to_vec()))
}

async fn reader_loop(inner: Arc<TransportInner>, mut read_half: OwnedReadHalf) {
    let mut assembler = Assembler::new(inner.limits);
    loop {
        let (header, payload) =
            match read_frame(&mut read_half, inner.limits.receive_buffer_size).await {
                Ok(frame) => frame,
                Err(ReadFrameError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    inner.die("server closed the connection");
                    return;
                }
                Err(ReadFrameError::Io(e)) => {
                    inner.die(&format!("read failed: {e}"));
                    return;
                }
                Err(ReadFrameError::Wire(e)) => {
                    inner.die(&format!("framing error: {e}"));
                    return;
                }
                Err(ReadFrameError::Oversize(size)) => {
                    inner.die(&format!("oversized frame: {size} bytes"));
                    return;
                }
            };

        match header.message_type {
            MessageType::Message | MessageType::CloseChannel => {
                let envelope = match ChunkEnvelope::parse(header, &payload) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        inner.die(&format!("bad chunk: {e}"));
                        return;
                    }
                };
                let request_id = envelope.sequence.request_id;
                match assembler.feed(envelope) {
                    Ok(Some(message)) => {
                        trace!(request_id = message.request_id, "response assembled");
                        inner.complete(message.request_id, Ok(message.payload));
                    }
                    Ok(None) => {}
                    // An abort kills one message, not the connection.
                    Err(e @ WireError::MessageAborted { .. }) => {
                        inner.complete(request_id, Err(e.into()));
                    }
                    Err(e) => {
                        inner.die(&format!("reassembly failed: {e}"));
                        return;
                    }
                }
            }
            MessageType::OpenChannel => match parse_open_chunk(&payload) {
                Ok((sequence, body)) => inner.complete(sequence.request_id, Ok(body)),
                Err(e) => {
                    inner.die(&format!("bad OPN chunk: {e}"));
                    return;
                }
            },
            MessageType::Error => {
                let detail = ErrorMessage::decode(&mut payload.as_slice())
                    .map(|e| format!("server error {}: {}", StatusCode(e.error), e.reason))
                    .unwrap_or_else(|_| "server error".to_string());
                inner.die(&detail);
                return;
            }
            other => {
                inner.die(&format!("unexpected message type {other:?}"));
                return;
            }
        }
    }
}
