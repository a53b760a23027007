// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Typed views over server values.
//!
//! Read results arrive as loosely typed [`DataValue`]s. [`TypedValue`] pairs
//! the variant with a [`Quality`] derived from the status code and offers
//! strict accessors plus a string-mediated [`TypedValue::coerce`] for process
//! variables that are published as strings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use uaforge_wire::{DataValue, StatusCode, Variant};

use crate::error::ConversionError;

// =====
// Quality
// =====

/// Value quality derived from the status code severity bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    /// The value is trustworthy.
    Good,
    /// The value may be stale or interpolated.
    Uncertain,
    /// The value is unusable; the code says why.
    Bad(StatusCode),
}

impl Quality {
    /// Derives the quality from a raw status code.
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_bad() {
            Self::Bad(status)
        } else if status.is_uncertain() {
            Self::Uncertain
        } else {
            Self::Good
        }
    }

    /// Returns `true` for [`Quality::Good`].
    pub fn is_good(self) -> bool {
        matches!(self, Self::Good)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => write!(f, "good"),
            Self::Uncertain => write!(f, "uncertain"),
            Self::Bad(status) => write!(f, "bad ({status})"),
        }
    }
}

// =====
// TypedValue
// =====

/// A server value with its quality and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    /// The raw variant; [`Variant::Null`] when the server sent none.
    pub value: Variant,
    /// Quality derived from the per-item status code.
    pub quality: Quality,
    /// Timestamp assigned by the data source.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Timestamp assigned by the server.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl TypedValue {
    /// Converts a wire-level data value into its typed view.
    pub fn from_data_value(data_value: DataValue) -> Self {
        let quality = Quality::from_status(data_value.status());
        Self {
            value: data_value.value.unwrap_or(Variant::Null),
            quality,
            source_timestamp: data_value.source_timestamp,
            server_timestamp: data_value.server_timestamp,
        }
    }

    /// The boolean content, if the variant holds one.
    pub fn as_bool(&self) -> Result<bool, ConversionError> {
        match &self.value {
            Variant::Boolean(v) => Ok(*v),
            other => Err(type_mismatch("Boolean", other)),
        }
    }

    /// The value widened to `i64`. Accepts every integer variant that fits.
    pub fn as_i64(&self) -> Result<i64, ConversionError> {
        match &self.value {
            Variant::SByte(v) => Ok(i64::from(*v)),
            Variant::Byte(v) => Ok(i64::from(*v)),
            Variant::Int16(v) => Ok(i64::from(*v)),
            Variant::UInt16(v) => Ok(i64::from(*v)),
            Variant::Int32(v) => Ok(i64::from(*v)),
            Variant::UInt32(v) => Ok(i64::from(*v)),
            Variant::Int64(v) => Ok(*v),
            Variant::UInt64(v) => {
                i64::try_from(*v).map_err(|_| type_mismatch("Int64", &self.value))
            }
            other => Err(type_mismatch("integer", other)),
        }
    }

    /// The value widened to `f64`. Accepts floats and every integer variant.
    pub fn as_f64(&self) -> Result<f64, ConversionError> {
        match &self.value {
            Variant::Float(v) => Ok(f64::from(*v)),
            Variant::Double(v) => Ok(*v),
            _ => self
                .as_i64()
                .map(|v| v as f64)
                .map_err(|_| type_mismatch("number", &self.value)),
        }
    }

    /// The string content, if the variant holds one.
    pub fn as_str(&self) -> Result<&str, ConversionError> {
        match &self.value {
            Variant::String(v) => Ok(v.as_str()),
            other => Err(type_mismatch("String", other)),
        }
    }

    /// Renders the variant to its display string and parses it as `T`.
    ///
    /// A null variant is a [`ConversionError::NullValue`]; a parse failure
    /// carries the rendered text and the target type name.
    pub fn coerce<T: FromStr>(&self) -> Result<T, ConversionError> {
        let rendered = render(&self.value)?;
        rendered
            .parse()
            .map_err(|_| ConversionError::ParseFailed {
                value: rendered,
                target: std::any::type_name::<T>(),
            })
    }
}

impl Default for TypedValue {
    fn default() -> Self {
        Self {
            value: Variant::Null,
            quality: Quality::Good,
            source_timestamp: None,
            server_timestamp: None,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.value, self.quality)
    }
}

// =====
// Helpers
// =====

/// Total boolean reading used by string-typed process variables:
/// case-insensitive `"true"` or `"1"` is true, everything else false.
pub fn truthy(text: &str) -> bool {
    text.eq_ignore_ascii_case("true") || text == "1"
}

fn render(value: &Variant) -> Result<String, ConversionError> {
    if matches!(value, Variant::Null) {
        return Err(ConversionError::NullValue);
    }
    Ok(value.to_string())
}

fn type_mismatch(expected: &'static str, actual: &Variant) -> ConversionError {
    ConversionError::TypeMismatch {
        expected,
        actual: match actual.type_id() {
            Some(id) => format!("{id:?}"),
            None => "Null".to_string(),
        },
    }
}

// =====
// Tests
// =====

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(value: Variant) -> TypedValue {
        TypedValue {
            value,
            ..Default::default()
        }
    }

    #[test]
    fn test_quality_from_status() {
        assert_eq!(Quality::from_status(StatusCode::GOOD), Quality::Good);
        assert_eq!(
            Quality::from_status(StatusCode(0x4000_0000)),
            Quality::Uncertain
        );
        assert_eq!(
            Quality::from_status(StatusCode::BAD_NODE_ID_UNKNOWN),
            Quality::Bad(StatusCode::BAD_NODE_ID_UNKNOWN)
        );
    }

    #[test]
    fn test_from_data_value() {
        let typed = TypedValue::from_data_value(DataValue::new(Variant::Int32(7)));
        assert_eq!(typed.value, Variant::Int32(7));
        assert!(typed.quality.is_good());

        let empty = TypedValue::from_data_value(DataValue::default());
        assert_eq!(empty.value, Variant::Null);
    }

    #[test]
    fn test_strict_accessors() {
        assert_eq!(typed(Variant::Boolean(true)).as_bool().unwrap(), true);
        assert!(typed(Variant::Int32(1)).as_bool().is_err());

        assert_eq!(typed(Variant::Byte(200)).as_i64().unwrap(), 200);
        assert_eq!(typed(Variant::Int64(-5)).as_i64().unwrap(), -5);
        assert_eq!(typed(Variant::UInt64(9)).as_i64().unwrap(), 9);
        assert!(typed(Variant::UInt64(u64::MAX)).as_i64().is_err());
        assert!(typed(Variant::String("9".into())).as_i64().is_err());

        assert_eq!(typed(Variant::Double(1.5)).as_f64().unwrap(), 1.5);
        assert_eq!(typed(Variant::Int16(-3)).as_f64().unwrap(), -3.0);
        assert!(typed(Variant::String("1.5".into())).as_f64().is_err());

        assert_eq!(typed(Variant::String("hi".into())).as_str().unwrap(), "hi");
        assert!(typed(Variant::Null).as_str().is_err());
    }

    #[test]
    fn test_coerce_parses_rendered_string() {
        assert_eq!(typed(Variant::String("42".into())).coerce::<i32>().unwrap(), 42);
        assert_eq!(typed(Variant::Int32(42)).coerce::<i64>().unwrap(), 42);
        assert_eq!(typed(Variant::Double(2.5)).coerce::<f64>().unwrap(), 2.5);
    }

    #[test]
    fn test_coerce_failures() {
        match typed(Variant::String("abc".into())).coerce::<i32>() {
            Err(ConversionError::ParseFailed { value, .. }) => assert_eq!(value, "abc"),
            other => panic!("expected parse failure, got {other:?}"),
        }
        assert!(matches!(
            typed(Variant::Null).coerce::<i32>(),
            Err(ConversionError::NullValue)
        ));
    }

    #[test]
    fn test_truthy_table() {
        assert!(truthy("true"));
        assert!(truthy("TRUE"));
        assert!(truthy("True"));
        assert!(truthy("1"));
        assert!(!truthy("0"));
        assert!(!truthy("yes"));
        assert!(!truthy("false"));
        assert!(!truthy(""));
    }
}
