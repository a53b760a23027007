// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA binary encoding and connection-protocol framing.
//!
//! This crate is the pure codec layer of uaforge: no I/O, no async, just
//! `bytes` buffers in and out. It covers:
//!
//! - The built-in type system: [`NodeId`], [`Variant`], [`DataValue`],
//!   [`StatusCode`], qualified names and localized text.
//! - The binary [`Encode`]/[`Decode`] traits and their primitive impls.
//! - Connection-protocol framing: message headers, Hello/Acknowledge/Error,
//!   security and sequence headers, and chunk splitting/reassembly under
//!   negotiated [`TransportLimits`].
//!
//! # Layering
//!
//! ```text
//! ┌───────────────────────────────┐
//! │  uaforge-client               │  sessions, services, subscriptions
//! ├───────────────────────────────┤
//! │  uaforge-wire (this crate)    │  types · codec · framing
//! └───────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod error;
pub mod framing;
pub mod status;
pub mod types;
pub mod variant;

pub use codec::{Decode, Encode};
pub use error::{WireError, WireResult};
pub use framing::{
    Acknowledge, AssembledMessage, Assembler, AsymmetricSecurityHeader, ChunkEnvelope, ChunkKind,
    Chunker, ErrorMessage, Hello, MessageHeader, MessageType, SequenceHeader, TransportLimits,
    MESSAGE_HEADER_SIZE, PROTOCOL_VERSION,
};
pub use status::StatusCode;
pub use types::{DataTypeId, Identifier, LocalizedText, NodeId, QualifiedName};
pub use variant::{DataValue, DiagnosticInfo, ExtensionObject, Variant};
