// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Binary encoding primitives.
//!
//! Everything on the wire is little-endian. Strings and byte strings carry
//! an `i32` length prefix where `-1` means null. Decoders validate every
//! length against the remaining buffer and never panic on truncated input.

use bytes::{Buf, BufMut};
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::error::{WireError, WireResult};
use crate::status::StatusCode;
use crate::types::{Identifier, LocalizedText, NodeId, QualifiedName};

/// Offset from 1601-01-01 (the OPC UA epoch) to 1970-01-01 in seconds.
const EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

/// Types that can be written to a binary stream.
pub trait Encode {
    /// Appends the binary form of `self` to `buf`.
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()>;

    /// Convenience: encodes into a fresh vector.
    fn encode_to_vec(&self) -> WireResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }
}

/// Types that can be read from a binary stream.
pub trait Decode: Sized {
    /// Consumes the binary form of `Self` from `buf`.
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self>;
}

/// Fails with [`WireError::BufferTooShort`] unless `n` bytes remain.
#[inline]
pub fn ensure<B: Buf>(buf: &B, n: usize) -> WireResult<()> {
    let remaining = buf.remaining();
    if remaining < n {
        return Err(WireError::too_short(n - remaining, remaining));
    }
    Ok(())
}

// =============================================================================
// Primitives
// =============================================================================

macro_rules! primitive_codec {
    ($ty:ty, $put:ident, $get:ident, $size:expr) => {
        impl Encode for $ty {
            fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
                buf.$put(*self);
                Ok(())
            }
        }

        impl Decode for $ty {
            fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
                ensure(buf, $size)?;
                Ok(buf.$get())
            }
        }
    };
}

primitive_codec!(u8, put_u8, get_u8, 1);
primitive_codec!(i8, put_i8, get_i8, 1);
primitive_codec!(u16, put_u16_le, get_u16_le, 2);
primitive_codec!(i16, put_i16_le, get_i16_le, 2);
primitive_codec!(u32, put_u32_le, get_u32_le, 4);
primitive_codec!(i32, put_i32_le, get_i32_le, 4);
primitive_codec!(u64, put_u64_le, get_u64_le, 8);
primitive_codec!(i64, put_i64_le, get_i64_le, 8);
primitive_codec!(f32, put_f32_le, get_f32_le, 4);
primitive_codec!(f64, put_f64_le, get_f64_le, 8);

impl Encode for bool {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        buf.put_u8(u8::from(*self));
        Ok(())
    }
}

impl Decode for bool {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        ensure(buf, 1)?;
        // Any non-zero byte reads as true.
        Ok(buf.get_u8() != 0)
    }
}

impl Encode for StatusCode {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.0.encode(buf)
    }
}

impl Decode for StatusCode {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(StatusCode(u32::decode(buf)?))
    }
}

// =============================================================================
// Length-prefixed byte sequences and strings
// =============================================================================

/// Writes a byte string; `None` encodes as length -1.
pub fn write_byte_string<B: BufMut>(buf: &mut B, value: Option<&[u8]>) -> WireResult<()> {
    match value {
        Some(bytes) => {
            let len = i32::try_from(bytes.len()).map_err(|_| WireError::InvalidLength {
                length: bytes.len() as i64,
                remaining: 0,
            })?;
            buf.put_i32_le(len);
            buf.put_slice(bytes);
        }
        None => buf.put_i32_le(-1),
    }
    Ok(())
}

/// Reads a byte string; length -1 decodes as `None`.
pub fn read_byte_string<B: Buf>(buf: &mut B) -> WireResult<Option<Vec<u8>>> {
    let len = i32::decode(buf)?;
    if len < 0 {
        return Ok(None);
    }
    let len = len as usize;
    if len > buf.remaining() {
        return Err(WireError::InvalidLength {
            length: len as i64,
            remaining: buf.remaining(),
        });
    }
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    Ok(Some(bytes))
}

/// Writes a UTF-8 string; `None` encodes as length -1.
pub fn write_string<B: BufMut>(buf: &mut B, value: Option<&str>) -> WireResult<()> {
    write_byte_string(buf, value.map(str::as_bytes))
}

/// Reads a UTF-8 string; length -1 decodes as `None`.
pub fn read_string<B: Buf>(buf: &mut B) -> WireResult<Option<String>> {
    match read_byte_string(buf)? {
        Some(bytes) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| WireError::InvalidUtf8),
        None => Ok(None),
    }
}

// =============================================================================
// DateTime
// =============================================================================

/// Writes a timestamp as 100 ns ticks since 1601; `None` encodes as 0.
pub fn write_date_time<B: BufMut>(buf: &mut B, value: Option<DateTime<Utc>>) -> WireResult<()> {
    let ticks = value.map_or(0, date_time_to_ticks);
    buf.put_i64_le(ticks);
    Ok(())
}

/// Reads a timestamp; 0 and out-of-range values decode as `None`.
pub fn read_date_time<B: Buf>(buf: &mut B) -> WireResult<Option<DateTime<Utc>>> {
    let ticks = i64::decode(buf)?;
    Ok(ticks_to_date_time(ticks))
}

/// Converts a UTC timestamp to 100 ns ticks since 1601-01-01.
pub fn date_time_to_ticks(value: DateTime<Utc>) -> i64 {
    let unix_secs = value.timestamp();
    let sub_ticks = i64::from(value.timestamp_subsec_nanos() / 100);
    (unix_secs + EPOCH_OFFSET_SECS)
        .saturating_mul(10_000_000)
        .saturating_add(sub_ticks)
}

/// Converts 100 ns ticks since 1601-01-01 to a UTC timestamp.
pub fn ticks_to_date_time(ticks: i64) -> Option<DateTime<Utc>> {
    if ticks <= 0 {
        return None;
    }
    let unix_secs = ticks / 10_000_000 - EPOCH_OFFSET_SECS;
    let nanos = (ticks % 10_000_000) as u32 * 100;
    Utc.timestamp_opt(unix_secs, nanos).single()
}

// =============================================================================
// Guid
// =============================================================================

/// Writes a GUID in its mixed-endian wire layout.
pub fn write_guid<B: BufMut>(buf: &mut B, value: &Uuid) -> WireResult<()> {
    let (d1, d2, d3, d4) = value.as_fields();
    buf.put_u32_le(d1);
    buf.put_u16_le(d2);
    buf.put_u16_le(d3);
    buf.put_slice(d4);
    Ok(())
}

/// Reads a GUID from its mixed-endian wire layout.
pub fn read_guid<B: Buf>(buf: &mut B) -> WireResult<Uuid> {
    ensure(buf, 16)?;
    let d1 = buf.get_u32_le();
    let d2 = buf.get_u16_le();
    let d3 = buf.get_u16_le();
    let mut d4 = [0u8; 8];
    buf.copy_to_slice(&mut d4);
    Ok(Uuid::from_fields(d1, d2, d3, &d4))
}

// =============================================================================
// NodeId
// =============================================================================

const NODE_ID_TWO_BYTE: u8 = 0x00;
const NODE_ID_FOUR_BYTE: u8 = 0x01;
const NODE_ID_NUMERIC: u8 = 0x02;
const NODE_ID_STRING: u8 = 0x03;
const NODE_ID_GUID: u8 = 0x04;
const NODE_ID_OPAQUE: u8 = 0x05;

/// ExpandedNodeId flag: a namespace URI string follows.
const EXPANDED_NAMESPACE_URI: u8 = 0x80;
/// ExpandedNodeId flag: a server index follows.
const EXPANDED_SERVER_INDEX: u8 = 0x40;

impl Encode for NodeId {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        match &self.identifier {
            Identifier::Numeric(v) if self.namespace == 0 && *v <= 0xFF => {
                buf.put_u8(NODE_ID_TWO_BYTE);
                buf.put_u8(*v as u8);
            }
            Identifier::Numeric(v) if self.namespace <= 0xFF && *v <= 0xFFFF => {
                buf.put_u8(NODE_ID_FOUR_BYTE);
                buf.put_u8(self.namespace as u8);
                buf.put_u16_le(*v as u16);
            }
            Identifier::Numeric(v) => {
                buf.put_u8(NODE_ID_NUMERIC);
                buf.put_u16_le(self.namespace);
                buf.put_u32_le(*v);
            }
            Identifier::String(v) => {
                buf.put_u8(NODE_ID_STRING);
                buf.put_u16_le(self.namespace);
                write_string(buf, Some(v))?;
            }
            Identifier::Guid(v) => {
                buf.put_u8(NODE_ID_GUID);
                buf.put_u16_le(self.namespace);
                write_guid(buf, v)?;
            }
            Identifier::Opaque(v) => {
                buf.put_u8(NODE_ID_OPAQUE);
                buf.put_u16_le(self.namespace);
                write_byte_string(buf, Some(v))?;
            }
        }
        Ok(())
    }
}

impl Decode for NodeId {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let encoding = u8::decode(buf)?;
        if encoding & (EXPANDED_NAMESPACE_URI | EXPANDED_SERVER_INDEX) != 0 {
            return Err(WireError::InvalidValue {
                what: "node id encoding",
                value: u64::from(encoding),
            });
        }
        decode_node_id_body(buf, encoding)
    }
}

fn decode_node_id_body<B: Buf>(buf: &mut B, encoding: u8) -> WireResult<NodeId> {
    Ok(match encoding {
        NODE_ID_TWO_BYTE => NodeId::numeric(0, u32::from(u8::decode(buf)?)),
        NODE_ID_FOUR_BYTE => {
            let ns = u16::from(u8::decode(buf)?);
            let value = u32::from(u16::decode(buf)?);
            NodeId::numeric(ns, value)
        }
        NODE_ID_NUMERIC => {
            let ns = u16::decode(buf)?;
            NodeId::numeric(ns, u32::decode(buf)?)
        }
        NODE_ID_STRING => {
            let ns = u16::decode(buf)?;
            NodeId::string(ns, read_string(buf)?.unwrap_or_default())
        }
        NODE_ID_GUID => {
            let ns = u16::decode(buf)?;
            NodeId::guid(ns, read_guid(buf)?)
        }
        NODE_ID_OPAQUE => {
            let ns = u16::decode(buf)?;
            NodeId::opaque(ns, read_byte_string(buf)?.unwrap_or_default())
        }
        other => {
            return Err(WireError::InvalidValue {
                what: "node id encoding",
                value: u64::from(other),
            })
        }
    })
}

/// Reads an ExpandedNodeId, discarding the namespace URI and server index.
pub fn read_expanded_node_id<B: Buf>(buf: &mut B) -> WireResult<NodeId> {
    let encoding = u8::decode(buf)?;
    let node_id = decode_node_id_body(buf, encoding & 0x0F)?;
    if encoding & EXPANDED_NAMESPACE_URI != 0 {
        let _ = read_string(buf)?;
    }
    if encoding & EXPANDED_SERVER_INDEX != 0 {
        let _ = u32::decode(buf)?;
    }
    Ok(node_id)
}

/// Writes an ExpandedNodeId with neither URI nor server index.
pub fn write_expanded_node_id<B: BufMut>(buf: &mut B, node_id: &NodeId) -> WireResult<()> {
    node_id.encode(buf)
}

// =============================================================================
// QualifiedName / LocalizedText
// =============================================================================

impl Encode for QualifiedName {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.namespace.encode(buf)?;
        write_string(buf, self.name.as_deref())
    }
}

impl Decode for QualifiedName {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        Ok(Self {
            namespace: u16::decode(buf)?,
            name: read_string(buf)?,
        })
    }
}

const LOCALIZED_HAS_LOCALE: u8 = 0x01;
const LOCALIZED_HAS_TEXT: u8 = 0x02;

impl Encode for LocalizedText {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        let mut mask = 0u8;
        if self.locale.is_some() {
            mask |= LOCALIZED_HAS_LOCALE;
        }
        if self.text.is_some() {
            mask |= LOCALIZED_HAS_TEXT;
        }
        buf.put_u8(mask);
        if let Some(locale) = &self.locale {
            write_string(buf, Some(locale))?;
        }
        if let Some(text) = &self.text {
            write_string(buf, Some(text))?;
        }
        Ok(())
    }
}

impl Decode for LocalizedText {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let mask = u8::decode(buf)?;
        let locale = if mask & LOCALIZED_HAS_LOCALE != 0 {
            read_string(buf)?
        } else {
            None
        };
        let text = if mask & LOCALIZED_HAS_TEXT != 0 {
            read_string(buf)?
        } else {
            None
        };
        Ok(Self { locale, text })
    }
}

// =============================================================================
// Arrays of encodable values
// =============================================================================

/// Writes a length-prefixed array.
pub fn write_array<B: BufMut, T: Encode>(buf: &mut B, items: &[T]) -> WireResult<()> {
    let len = i32::try_from(items.len()).map_err(|_| WireError::InvalidLength {
        length: items.len() as i64,
        remaining: 0,
    })?;
    buf.put_i32_le(len);
    for item in items {
        item.encode(buf)?;
    }
    Ok(())
}

/// Reads a length-prefixed array; length -1 decodes as an empty vector.
pub fn read_array<B: Buf, T: Decode>(buf: &mut B) -> WireResult<Vec<T>> {
    let len = i32::decode(buf)?;
    if len <= 0 {
        return Ok(Vec::new());
    }
    // Each element takes at least one byte, so the prefix bounds allocation.
    if len as usize > buf.remaining() {
        return Err(WireError::InvalidLength {
            length: i64::from(len),
            remaining: buf.remaining(),
        });
    }
    let mut items = Vec::with_capacity(len as usize);
    for _ in 0..len {
        items.push(T::decode(buf)?);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: Encode + Decode + PartialEq + std::fmt::Debug>(value: T) {
        let bytes = value.encode_to_vec().unwrap();
        let mut buf = bytes.as_slice();
        let back = T::decode(&mut buf).unwrap();
        assert_eq!(back, value);
        assert_eq!(buf.remaining(), 0, "trailing bytes after decode");
    }

    #[test]
    fn test_primitive_layout() {
        let mut buf = Vec::new();
        0x1234_5678u32.encode(&mut buf).unwrap();
        assert_eq!(buf, [0x78, 0x56, 0x34, 0x12]);

        let mut buf = Vec::new();
        (-2i16).encode(&mut buf).unwrap();
        assert_eq!(buf, [0xFE, 0xFF]);
    }

    #[test]
    fn test_truncated_primitive() {
        let mut buf: &[u8] = &[0x01, 0x02];
        let err = u32::decode(&mut buf).unwrap_err();
        assert!(matches!(err, WireError::BufferTooShort { needed: 2, .. }));
    }

    #[test]
    fn test_string_null_and_empty() {
        let mut buf = Vec::new();
        write_string(&mut buf, None).unwrap();
        assert_eq!(buf, [0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(read_string(&mut buf.as_slice()).unwrap(), None);

        let mut buf = Vec::new();
        write_string(&mut buf, Some("")).unwrap();
        assert_eq!(buf, [0x00, 0x00, 0x00, 0x00]);
        assert_eq!(read_string(&mut buf.as_slice()).unwrap(), Some(String::new()));
    }

    #[test]
    fn test_string_length_exceeds_buffer() {
        // Declares 100 bytes but carries 2.
        let raw: &[u8] = &[100, 0, 0, 0, b'h', b'i'];
        let err = read_string(&mut &*raw).unwrap_err();
        assert!(matches!(err, WireError::InvalidLength { length: 100, .. }));
    }

    #[test]
    fn test_date_time_ticks() {
        // 1601-01-01 itself is tick 0, which reads back as null.
        assert_eq!(ticks_to_date_time(0), None);
        assert_eq!(ticks_to_date_time(-5), None);

        let ts = Utc.with_ymd_and_hms(2024, 5, 17, 12, 30, 45).unwrap();
        let ticks = date_time_to_ticks(ts);
        assert_eq!(ticks_to_date_time(ticks), Some(ts));
    }

    #[test]
    fn test_guid_layout() {
        let uuid: Uuid = "72962b91-fa75-4ae6-8d28-b404dc7daf63".parse().unwrap();
        let mut buf = Vec::new();
        write_guid(&mut buf, &uuid).unwrap();
        // First three groups little-endian, last eight bytes verbatim.
        assert_eq!(
            buf,
            [
                0x91, 0x2B, 0x96, 0x72, 0x75, 0xFA, 0xE6, 0x4A, 0x8D, 0x28, 0xB4, 0x04, 0xDC,
                0x7D, 0xAF, 0x63
            ]
        );
        assert_eq!(read_guid(&mut buf.as_slice()).unwrap(), uuid);
    }

    #[test]
    fn test_node_id_compact_forms() {
        // ns=0;i=84 fits the two-byte form.
        let bytes = NodeId::numeric(0, 84).encode_to_vec().unwrap();
        assert_eq!(bytes, [0x00, 84]);

        // ns=0;i=631 needs the four-byte form.
        let bytes = NodeId::numeric(0, 631).encode_to_vec().unwrap();
        assert_eq!(bytes, [0x01, 0x00, 0x77, 0x02]);

        round_trip(NodeId::numeric(300, 0x0012_3456));
        round_trip(NodeId::string(2, "Temperature"));
        round_trip(NodeId::guid(1, Uuid::from_u128(0x1234_5678_9ABC_DEF0)));
        round_trip(NodeId::opaque(7, vec![1, 2, 3]));
    }

    #[test]
    fn test_expanded_node_id_discards_extras() {
        let mut buf = Vec::new();
        buf.put_u8(0x83); // string form + namespace uri flag
        buf.put_u16_le(2);
        write_string(&mut buf, Some("Flow")).unwrap();
        write_string(&mut buf, Some("urn:example")).unwrap();

        let mut slice = buf.as_slice();
        let id = read_expanded_node_id(&mut slice).unwrap();
        assert_eq!(id, NodeId::string(2, "Flow"));
        assert_eq!(slice.remaining(), 0);
    }

    #[test]
    fn test_localized_text_mask() {
        round_trip(LocalizedText::default());
        round_trip(LocalizedText::new("Boiler"));
        round_trip(LocalizedText {
            locale: Some("en-US".into()),
            text: Some("Boiler".into()),
        });
    }

    #[test]
    fn test_qualified_name_round_trip() {
        round_trip(QualifiedName::new(2, "Pump"));
        round_trip(QualifiedName::default());
    }

    #[test]
    fn test_array_round_trip() {
        let mut buf = Vec::new();
        write_array(&mut buf, &[1u32, 2, 3]).unwrap();
        let back: Vec<u32> = read_array(&mut buf.as_slice()).unwrap();
        assert_eq!(back, vec![1, 2, 3]);

        // Null array (-1) reads as empty.
        let raw: &[u8] = &[0xFF, 0xFF, 0xFF, 0xFF];
        let back: Vec<u32> = read_array(&mut &*raw).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn test_array_length_bound() {
        // Claims a million elements with 4 bytes of payload.
        let raw: &[u8] = &[0x40, 0x42, 0x0F, 0x00, 1, 2, 3, 4];
        let err = read_array::<_, u32>(&mut &*raw).unwrap_err();
        assert!(matches!(err, WireError::InvalidLength { .. }));
    }
}
