// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Variant values, data values, and extension objects.
//!
//! A [`Variant`] is the union type every attribute value travels in. This
//! implementation covers the scalar built-in types an automation client
//! meets in practice plus single-dimension arrays of them; multi-dimensional
//! arrays and the structure types are rejected with a typed error.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::{Buf, BufMut};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::codec::{
    read_byte_string, read_date_time, read_guid, read_string, write_byte_string, write_date_time,
    write_guid, write_string, Decode, Encode,
};
use crate::error::{WireError, WireResult};
use crate::status::StatusCode;
use crate::types::{DataTypeId, NodeId};

/// Encoding-byte flag: the value is a single-dimension array.
const VARIANT_ARRAY: u8 = 0x80;
/// Encoding-byte flag: array dimensions follow (not supported).
const VARIANT_DIMENSIONS: u8 = 0x40;

// =============================================================================
// Variant
// =============================================================================

/// A dynamically typed OPC UA value.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    /// No value.
    Null,
    /// Two-state logical value.
    Boolean(bool),
    /// Signed 8-bit integer.
    SByte(i8),
    /// Unsigned 8-bit integer.
    Byte(u8),
    /// Signed 16-bit integer.
    Int16(i16),
    /// Unsigned 16-bit integer.
    UInt16(u16),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 64-bit integer.
    UInt64(u64),
    /// IEEE 754 single precision.
    Float(f32),
    /// IEEE 754 double precision.
    Double(f64),
    /// UTF-8 string. A null wire string decodes as the empty string.
    String(String),
    /// UTC timestamp.
    DateTime(DateTime<Utc>),
    /// 16-byte GUID.
    Guid(Uuid),
    /// Raw byte sequence.
    ByteString(Vec<u8>),
    /// Status code value.
    StatusCode(StatusCode),
    /// Single-dimension array of one scalar type.
    Array {
        /// Element type of the array.
        element: DataTypeId,
        /// The elements; every entry must match `element`.
        values: Vec<Variant>,
    },
}

impl Variant {
    /// Returns the built-in type id, or `None` for the null variant.
    pub fn type_id(&self) -> Option<DataTypeId> {
        Some(match self {
            Self::Null => return None,
            Self::Boolean(_) => DataTypeId::Boolean,
            Self::SByte(_) => DataTypeId::SByte,
            Self::Byte(_) => DataTypeId::Byte,
            Self::Int16(_) => DataTypeId::Int16,
            Self::UInt16(_) => DataTypeId::UInt16,
            Self::Int32(_) => DataTypeId::Int32,
            Self::UInt32(_) => DataTypeId::UInt32,
            Self::Int64(_) => DataTypeId::Int64,
            Self::UInt64(_) => DataTypeId::UInt64,
            Self::Float(_) => DataTypeId::Float,
            Self::Double(_) => DataTypeId::Double,
            Self::String(_) => DataTypeId::String,
            Self::DateTime(_) => DataTypeId::DateTime,
            Self::Guid(_) => DataTypeId::Guid,
            Self::ByteString(_) => DataTypeId::ByteString,
            Self::StatusCode(_) => DataTypeId::StatusCode,
            Self::Array { element, .. } => *element,
        })
    }

    /// Returns `true` for the null variant.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Boolean view: booleans directly, integers as `!= 0`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => self.as_i64().map(|v| v != 0),
        }
    }

    /// Signed integer view of the integral types.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::SByte(v) => Some(i64::from(*v)),
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Int16(v) => Some(i64::from(*v)),
            Self::UInt16(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::UInt32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            Self::UInt64(v) => i64::try_from(*v).ok(),
            Self::Boolean(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Floating-point view of the numeric types.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    /// String view, only for string variants.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::SByte(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::UInt16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v}"),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Guid(v) => write!(f, "{v}"),
            Self::ByteString(v) => write!(f, "{}", BASE64.encode(v)),
            Self::StatusCode(v) => write!(f, "{v}"),
            Self::Array { values, .. } => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
        }
    }
}

macro_rules! variant_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Variant {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

variant_from!(
    bool => Boolean,
    i8 => SByte,
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    String => String,
    DateTime<Utc> => DateTime,
    Uuid => Guid,
    StatusCode => StatusCode,
);

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

fn encode_scalar_body<B: BufMut>(value: &Variant, buf: &mut B) -> WireResult<()> {
    match value {
        Variant::Null | Variant::Array { .. } => Err(WireError::InvalidValue {
            what: "array element",
            value: 0,
        }),
        Variant::Boolean(v) => v.encode(buf),
        Variant::SByte(v) => v.encode(buf),
        Variant::Byte(v) => v.encode(buf),
        Variant::Int16(v) => v.encode(buf),
        Variant::UInt16(v) => v.encode(buf),
        Variant::Int32(v) => v.encode(buf),
        Variant::UInt32(v) => v.encode(buf),
        Variant::Int64(v) => v.encode(buf),
        Variant::UInt64(v) => v.encode(buf),
        Variant::Float(v) => v.encode(buf),
        Variant::Double(v) => v.encode(buf),
        Variant::String(v) => write_string(buf, Some(v)),
        Variant::DateTime(v) => write_date_time(buf, Some(*v)),
        Variant::Guid(v) => write_guid(buf, v),
        Variant::ByteString(v) => write_byte_string(buf, Some(v)),
        Variant::StatusCode(v) => v.encode(buf),
    }
}

fn decode_scalar_body<B: Buf>(element: DataTypeId, buf: &mut B) -> WireResult<Variant> {
    Ok(match element {
        DataTypeId::Boolean => Variant::Boolean(bool::decode(buf)?),
        DataTypeId::SByte => Variant::SByte(i8::decode(buf)?),
        DataTypeId::Byte => Variant::Byte(u8::decode(buf)?),
        DataTypeId::Int16 => Variant::Int16(i16::decode(buf)?),
        DataTypeId::UInt16 => Variant::UInt16(u16::decode(buf)?),
        DataTypeId::Int32 => Variant::Int32(i32::decode(buf)?),
        DataTypeId::UInt32 => Variant::UInt32(u32::decode(buf)?),
        DataTypeId::Int64 => Variant::Int64(i64::decode(buf)?),
        DataTypeId::UInt64 => Variant::UInt64(u64::decode(buf)?),
        DataTypeId::Float => Variant::Float(f32::decode(buf)?),
        DataTypeId::Double => Variant::Double(f64::decode(buf)?),
        DataTypeId::String => Variant::String(read_string(buf)?.unwrap_or_default()),
        DataTypeId::DateTime => match read_date_time(buf)? {
            Some(ts) => Variant::DateTime(ts),
            None => Variant::Null,
        },
        DataTypeId::Guid => Variant::Guid(read_guid(buf)?),
        DataTypeId::ByteString => Variant::ByteString(read_byte_string(buf)?.unwrap_or_default()),
        DataTypeId::StatusCode => Variant::StatusCode(StatusCode::decode(buf)?),
    })
}

impl Encode for Variant {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        match self {
            Self::Null => {
                buf.put_u8(0);
                Ok(())
            }
            Self::Array { element, values } => {
                buf.put_u8(*element as u8 | VARIANT_ARRAY);
                let len = i32::try_from(values.len()).map_err(|_| WireError::InvalidLength {
                    length: values.len() as i64,
                    remaining: 0,
                })?;
                buf.put_i32_le(len);
                for value in values {
                    if value.type_id() != Some(*element) {
                        return Err(WireError::InvalidValue {
                            what: "array element type",
                            value: value.type_id().map_or(0, |t| t as u64),
                        });
                    }
                    encode_scalar_body(value, buf)?;
                }
                Ok(())
            }
            scalar => {
                // type_id is always Some for non-null scalars
                let id = scalar.type_id().map_or(0, |t| t as u8);
                buf.put_u8(id);
                encode_scalar_body(scalar, buf)
            }
        }
    }
}

impl Decode for Variant {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let encoding = u8::decode(buf)?;
        if encoding == 0 {
            return Ok(Self::Null);
        }
        if encoding & VARIANT_DIMENSIONS != 0 {
            return Err(WireError::InvalidValue {
                what: "variant dimensions flag",
                value: u64::from(encoding),
            });
        }
        let type_id = encoding & !VARIANT_ARRAY;
        let element =
            DataTypeId::from_id(type_id).ok_or(WireError::UnsupportedVariantType(type_id))?;

        if encoding & VARIANT_ARRAY == 0 {
            return decode_scalar_body(element, buf);
        }

        let len = i32::decode(buf)?;
        if len < 0 {
            return Ok(Self::Array {
                element,
                values: Vec::new(),
            });
        }
        if len as usize > buf.remaining() {
            return Err(WireError::InvalidLength {
                length: i64::from(len),
                remaining: buf.remaining(),
            });
        }
        let mut values = Vec::with_capacity(len as usize);
        for _ in 0..len {
            values.push(decode_scalar_body(element, buf)?);
        }
        Ok(Self::Array { element, values })
    }
}

// =============================================================================
// DataValue
// =============================================================================

const DV_HAS_VALUE: u8 = 0x01;
const DV_HAS_STATUS: u8 = 0x02;
const DV_HAS_SOURCE_TS: u8 = 0x04;
const DV_HAS_SERVER_TS: u8 = 0x08;
const DV_HAS_SOURCE_PICO: u8 = 0x10;
const DV_HAS_SERVER_PICO: u8 = 0x20;

/// A value together with its status and timestamps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    /// The value, absent when the server sent none.
    pub value: Option<Variant>,
    /// Status code; absent means Good.
    pub status: Option<StatusCode>,
    /// Timestamp assigned by the data source.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Timestamp assigned by the server.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// A data value carrying only a variant.
    pub fn new(value: Variant) -> Self {
        Self {
            value: Some(value),
            ..Default::default()
        }
    }

    /// The effective status: explicit code or Good.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::GOOD)
    }
}

impl Encode for DataValue {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        let mut mask = 0u8;
        if self.value.is_some() {
            mask |= DV_HAS_VALUE;
        }
        if self.status.is_some() {
            mask |= DV_HAS_STATUS;
        }
        if self.source_timestamp.is_some() {
            mask |= DV_HAS_SOURCE_TS;
        }
        if self.server_timestamp.is_some() {
            mask |= DV_HAS_SERVER_TS;
        }
        buf.put_u8(mask);
        if let Some(value) = &self.value {
            value.encode(buf)?;
        }
        if let Some(status) = &self.status {
            status.encode(buf)?;
        }
        if let Some(ts) = self.source_timestamp {
            write_date_time(buf, Some(ts))?;
        }
        if let Some(ts) = self.server_timestamp {
            write_date_time(buf, Some(ts))?;
        }
        Ok(())
    }
}

impl Decode for DataValue {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let mask = u8::decode(buf)?;
        let value = if mask & DV_HAS_VALUE != 0 {
            Some(Variant::decode(buf)?)
        } else {
            None
        };
        let status = if mask & DV_HAS_STATUS != 0 {
            Some(StatusCode::decode(buf)?)
        } else {
            None
        };
        let source_timestamp = if mask & DV_HAS_SOURCE_TS != 0 {
            read_date_time(buf)?
        } else {
            None
        };
        let server_timestamp = if mask & DV_HAS_SERVER_TS != 0 {
            read_date_time(buf)?
        } else {
            None
        };
        // Picosecond precision is decoded for alignment and discarded.
        if mask & DV_HAS_SOURCE_PICO != 0 {
            let _ = u16::decode(buf)?;
        }
        if mask & DV_HAS_SERVER_PICO != 0 {
            let _ = u16::decode(buf)?;
        }
        Ok(Self {
            value,
            status,
            source_timestamp,
            server_timestamp,
        })
    }
}

// =============================================================================
// ExtensionObject
// =============================================================================

/// A structure wrapped with its encoding node id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtensionObject {
    /// Node id of the DefaultBinary encoding of the wrapped type.
    pub type_id: NodeId,
    /// Raw encoded body; `None` when the object carries no body.
    pub body: Option<Vec<u8>>,
}

impl ExtensionObject {
    /// Wraps an already-encoded body under `type_id`.
    pub fn new(type_id: NodeId, body: Vec<u8>) -> Self {
        Self {
            type_id,
            body: Some(body),
        }
    }

    /// An extension object with no body (the null object).
    pub fn null() -> Self {
        Self::default()
    }
}

impl Encode for ExtensionObject {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        self.type_id.encode(buf)?;
        match &self.body {
            Some(body) => {
                buf.put_u8(0x01);
                write_byte_string(buf, Some(body))
            }
            None => {
                buf.put_u8(0x00);
                Ok(())
            }
        }
    }
}

impl Decode for ExtensionObject {
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let type_id = NodeId::decode(buf)?;
        let encoding = u8::decode(buf)?;
        let body = match encoding {
            0x00 => None,
            // XML bodies (0x02) are length-prefixed the same way; carried raw.
            0x01 | 0x02 => read_byte_string(buf)?,
            other => {
                return Err(WireError::InvalidValue {
                    what: "extension object encoding",
                    value: u64::from(other),
                })
            }
        };
        Ok(Self { type_id, body })
    }
}

// =============================================================================
// DiagnosticInfo
// =============================================================================

const DI_HAS_SYMBOLIC_ID: u8 = 0x01;
const DI_HAS_NAMESPACE: u8 = 0x02;
const DI_HAS_LOCALIZED_TEXT: u8 = 0x04;
const DI_HAS_LOCALE: u8 = 0x08;
const DI_HAS_ADDITIONAL_INFO: u8 = 0x10;
const DI_HAS_INNER_STATUS: u8 = 0x20;
const DI_HAS_INNER_INFO: u8 = 0x40;

/// Server diagnostic detail.
///
/// This client never requests diagnostics, but servers may still send them;
/// all fields are consumed so the stream stays aligned, and nothing is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiagnosticInfo;

impl Encode for DiagnosticInfo {
    fn encode<B: BufMut>(&self, buf: &mut B) -> WireResult<()> {
        buf.put_u8(0);
        Ok(())
    }
}

impl Decode for DiagnosticInfo {
    // Inner infos nest to arbitrary depth on the wire, so the chain is
    // walked iteratively; recursing here would let a peer exhaust the stack.
    fn decode<B: Buf>(buf: &mut B) -> WireResult<Self> {
        let mut mask = u8::decode(buf)?;
        loop {
            if mask & DI_HAS_SYMBOLIC_ID != 0 {
                let _ = i32::decode(buf)?;
            }
            if mask & DI_HAS_NAMESPACE != 0 {
                let _ = i32::decode(buf)?;
            }
            if mask & DI_HAS_LOCALE != 0 {
                let _ = i32::decode(buf)?;
            }
            if mask & DI_HAS_LOCALIZED_TEXT != 0 {
                let _ = i32::decode(buf)?;
            }
            if mask & DI_HAS_ADDITIONAL_INFO != 0 {
                let _ = read_string(buf)?;
            }
            if mask & DI_HAS_INNER_STATUS != 0 {
                let _ = StatusCode::decode(buf)?;
            }
            if mask & DI_HAS_INNER_INFO == 0 {
                return Ok(Self);
            }
            mask = u8::decode(buf)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn round_trip(value: Variant) {
        let bytes = value.encode_to_vec().unwrap();
        let mut slice = bytes.as_slice();
        assert_eq!(Variant::decode(&mut slice).unwrap(), value);
        assert_eq!(slice.remaining(), 0);
    }

    #[test]
    fn test_variant_scalars() {
        round_trip(Variant::Boolean(true));
        round_trip(Variant::Int32(-42));
        round_trip(Variant::UInt64(u64::MAX));
        round_trip(Variant::Double(3.25));
        round_trip(Variant::String("hello".into()));
        round_trip(Variant::ByteString(vec![0, 1, 2]));
        round_trip(Variant::StatusCode(StatusCode::BAD_TIMEOUT));
        round_trip(Variant::Null);
    }

    #[test]
    fn test_variant_null_encoding_byte() {
        assert_eq!(Variant::Null.encode_to_vec().unwrap(), [0x00]);
    }

    #[test]
    fn test_variant_array() {
        round_trip(Variant::Array {
            element: DataTypeId::Int32,
            values: vec![Variant::Int32(1), Variant::Int32(2), Variant::Int32(3)],
        });
    }

    #[test]
    fn test_variant_array_rejects_mixed_elements() {
        let bad = Variant::Array {
            element: DataTypeId::Int32,
            values: vec![Variant::Int32(1), Variant::Double(2.0)],
        };
        assert!(bad.encode_to_vec().is_err());
    }

    #[test]
    fn test_variant_unsupported_type_id() {
        // Type id 22 (Variant-in-variant) is not handled.
        let raw: &[u8] = &[22, 0, 0, 0, 0];
        let err = Variant::decode(&mut &*raw).unwrap_err();
        assert!(matches!(err, WireError::UnsupportedVariantType(22)));
    }

    #[test]
    fn test_variant_accessors() {
        assert_eq!(Variant::Boolean(true).as_bool(), Some(true));
        assert_eq!(Variant::Int16(1).as_bool(), Some(true));
        assert_eq!(Variant::Int16(0).as_bool(), Some(false));
        assert_eq!(Variant::UInt32(7).as_i64(), Some(7));
        assert_eq!(Variant::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(Variant::Int32(3).as_f64(), Some(3.0));
        assert_eq!(Variant::String("x".into()).as_str(), Some("x"));
        assert_eq!(Variant::Double(1.0).as_str(), None);
    }

    #[test]
    fn test_variant_display() {
        assert_eq!(Variant::Int32(42).to_string(), "42");
        assert_eq!(Variant::String("abc".into()).to_string(), "abc");
        assert_eq!(Variant::Null.to_string(), "null");
        let arr = Variant::Array {
            element: DataTypeId::Byte,
            values: vec![Variant::Byte(1), Variant::Byte(2)],
        };
        assert_eq!(arr.to_string(), "[1, 2]");
    }

    #[test]
    fn test_data_value_mask() {
        let mut dv = DataValue::new(Variant::Double(21.5));
        dv.status = Some(StatusCode::GOOD);
        dv.source_timestamp = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).single();

        let bytes = dv.encode_to_vec().unwrap();
        assert_eq!(bytes[0], 0x07); // value + status + source ts
        let back = DataValue::decode(&mut bytes.as_slice()).unwrap();
        assert_eq!(back, dv);
    }

    #[test]
    fn test_data_value_empty() {
        let dv = DataValue::default();
        let bytes = dv.encode_to_vec().unwrap();
        assert_eq!(bytes, [0x00]);
        let back = DataValue::decode(&mut bytes.as_slice()).unwrap();
        assert_eq!(back.status(), StatusCode::GOOD);
        assert!(back.value.is_none());
    }

    #[test]
    fn test_data_value_discards_picoseconds() {
        let mut bytes = vec![DV_HAS_STATUS | DV_HAS_SOURCE_PICO];
        bytes.extend_from_slice(&0x8034_0000u32.to_le_bytes());
        bytes.extend_from_slice(&[0x10, 0x00]); // picoseconds
        let back = DataValue::decode(&mut bytes.as_slice()).unwrap();
        assert_eq!(back.status(), StatusCode::BAD_NODE_ID_UNKNOWN);
    }

    #[test]
    fn test_extension_object() {
        let obj = ExtensionObject::new(NodeId::numeric(0, 321), vec![0xAA, 0xBB]);
        let bytes = obj.encode_to_vec().unwrap();
        let back = ExtensionObject::decode(&mut bytes.as_slice()).unwrap();
        assert_eq!(back, obj);

        let null = ExtensionObject::null();
        let bytes = null.encode_to_vec().unwrap();
        assert_eq!(bytes, [0x00, 0x00, 0x00]); // two-byte null node id + no body
        assert_eq!(ExtensionObject::decode(&mut bytes.as_slice()).unwrap(), null);
    }

    #[test]
    fn test_diagnostic_info_skips_fields() {
        let mut bytes = vec![DI_HAS_SYMBOLIC_ID | DI_HAS_ADDITIONAL_INFO | DI_HAS_INNER_INFO];
        bytes.extend_from_slice(&7i32.to_le_bytes());
        bytes.extend_from_slice(&2i32.to_le_bytes());
        bytes.extend_from_slice(b"hi");
        bytes.push(0x00); // empty inner info
        bytes.push(0xEE); // trailing byte that must survive

        let mut slice = bytes.as_slice();
        DiagnosticInfo::decode(&mut slice).unwrap();
        assert_eq!(slice, [0xEE]);
    }

    #[test]
    fn test_diagnostic_info_deep_inner_chain() {
        // A long run of inner-info masks must not exhaust the stack.
        let mut bytes = vec![DI_HAS_INNER_INFO; 200_000];
        bytes.push(0x00);
        let mut slice = bytes.as_slice();
        DiagnosticInfo::decode(&mut slice).unwrap();
        assert_eq!(slice.remaining(), 0);

        // An unterminated chain runs off the buffer and errors cleanly.
        let bytes = vec![DI_HAS_INNER_INFO; 16];
        assert!(DiagnosticInfo::decode(&mut bytes.as_slice()).is_err());
    }
}
