// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Wire-level error types.

use thiserror::Error;

/// Result alias for wire operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised while encoding or decoding OPC UA binary data.
#[derive(Debug, Error)]
pub enum WireError {
    /// The buffer ended before the expected data.
    #[error("buffer too short: needed {needed} more bytes, {remaining} remaining")]
    BufferTooShort {
        /// Bytes still required.
        needed: usize,
        /// Bytes actually available.
        remaining: usize,
    },

    /// A length prefix was negative (other than the -1 null marker) or
    /// exceeded the remaining buffer.
    #[error("invalid length prefix {length} with {remaining} bytes remaining")]
    InvalidLength {
        /// The declared length.
        length: i64,
        /// Bytes actually available.
        remaining: usize,
    },

    /// A string field did not contain valid UTF-8.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    /// An enum discriminant or encoding byte had no defined meaning.
    #[error("invalid {what} value {value:#x}")]
    InvalidValue {
        /// Field being decoded.
        what: &'static str,
        /// The offending raw value.
        value: u64,
    },

    /// A variant carried a type id this implementation does not handle.
    #[error("unsupported variant type id {0}")]
    UnsupportedVariantType(u8),

    /// A message header carried an unknown 3-byte type code.
    #[error("unknown message type {0:?}")]
    UnknownMessageType([u8; 3]),

    /// A complete message exceeded the negotiated maximum size.
    #[error("message size {size} exceeds limit {limit}")]
    MessageTooLarge {
        /// Observed size in bytes.
        size: usize,
        /// Negotiated limit.
        limit: usize,
    },

    /// A chunked message exceeded the negotiated chunk count.
    #[error("chunk count {count} exceeds limit {limit}")]
    TooManyChunks {
        /// Observed chunk count.
        count: u32,
        /// Negotiated limit.
        limit: u32,
    },

    /// Chunks for two different requests were interleaved in one message.
    #[error("interleaved chunks: message for request {expected} interrupted by request {actual}")]
    InterleavedChunks {
        /// Request id of the partial message.
        expected: u32,
        /// Request id of the offending chunk.
        actual: u32,
    },

    /// The peer aborted a chunked message.
    #[error("message aborted by peer: status {status:#010x}: {reason}")]
    MessageAborted {
        /// Abort status code.
        status: u32,
        /// Human-readable reason, may be empty.
        reason: String,
    },

    /// A node id text form could not be parsed.
    #[error("invalid node id text form: {0}")]
    InvalidNodeIdText(String),
}

impl WireError {
    pub(crate) fn too_short(needed: usize, remaining: usize) -> Self {
        Self::BufferTooShort { needed, remaining }
    }
}
