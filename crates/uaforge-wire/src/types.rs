// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core address-space types: node ids, qualified names, localized text.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::WireError;

// =============================================================================
// NodeId
// =============================================================================

/// The identifier part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// Numeric identifier (`i=`).
    Numeric(u32),
    /// String identifier (`s=`).
    String(String),
    /// GUID identifier (`g=`).
    Guid(Uuid),
    /// Opaque byte-string identifier (`b=`, base64 in text form).
    Opaque(Vec<u8>),
}

/// A node id: namespace index plus identifier.
///
/// The canonical text form is `ns=<index>;<kind>=<id>`, with `ns=0;` elided:
///
/// ```
/// use uaforge_wire::NodeId;
///
/// let id: NodeId = "ns=2;s=Temperature".parse().unwrap();
/// assert_eq!(id.to_string(), "ns=2;s=Temperature");
/// assert_eq!("i=84".parse::<NodeId>().unwrap(), NodeId::ROOT_FOLDER);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    /// Namespace table index.
    pub namespace: u16,
    /// The identifier within the namespace.
    pub identifier: Identifier,
}

impl NodeId {
    /// The standard Root folder node.
    pub const ROOT_FOLDER: NodeId = NodeId::numeric(0, 84);
    /// The standard Objects folder node.
    pub const OBJECTS_FOLDER: NodeId = NodeId::numeric(0, 85);
    /// The standard Server object node.
    pub const SERVER: NodeId = NodeId::numeric(0, 2253);
    /// Server_ServerStatus_State, used for session keep-alive reads.
    pub const SERVER_STATUS_STATE: NodeId = NodeId::numeric(0, 2259);

    /// The null node id (`ns=0;i=0`).
    pub const NULL: NodeId = NodeId::numeric(0, 0);

    /// Creates a numeric node id.
    pub const fn numeric(namespace: u16, value: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(value),
        }
    }

    /// Creates a string node id.
    pub fn string(namespace: u16, value: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(value.into()),
        }
    }

    /// Creates a GUID node id.
    pub const fn guid(namespace: u16, value: Uuid) -> Self {
        Self {
            namespace,
            identifier: Identifier::Guid(value),
        }
    }

    /// Creates an opaque node id.
    pub fn opaque(namespace: u16, value: impl Into<Vec<u8>>) -> Self {
        Self {
            namespace,
            identifier: Identifier::Opaque(value.into()),
        }
    }

    /// Returns `true` for `ns=0;i=0`.
    pub fn is_null(&self) -> bool {
        self.namespace == 0 && matches!(self.identifier, Identifier::Numeric(0))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace != 0 {
            write!(f, "ns={};", self.namespace)?;
        }
        match &self.identifier {
            Identifier::Numeric(v) => write!(f, "i={v}"),
            Identifier::String(v) => write!(f, "s={v}"),
            Identifier::Guid(v) => write!(f, "g={v}"),
            Identifier::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

impl FromStr for NodeId {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WireError::InvalidNodeIdText(s.to_string());

        let (namespace, rest) = match s.strip_prefix("ns=") {
            Some(tail) => {
                let (ns, rest) = tail.split_once(';').ok_or_else(invalid)?;
                (ns.parse::<u16>().map_err(|_| invalid())?, rest)
            }
            None => (0, s),
        };

        let (kind, value) = rest.split_once('=').ok_or_else(invalid)?;
        let identifier = match kind {
            "i" => Identifier::Numeric(value.parse().map_err(|_| invalid())?),
            "s" => Identifier::String(value.to_string()),
            "g" => Identifier::Guid(value.parse().map_err(|_| invalid())?),
            "b" => Identifier::Opaque(BASE64.decode(value).map_err(|_| invalid())?),
            _ => return Err(invalid()),
        };

        Ok(Self {
            namespace,
            identifier,
        })
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// QualifiedName / LocalizedText
// =============================================================================

/// A name qualified by a namespace index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct QualifiedName {
    /// Namespace table index.
    pub namespace: u16,
    /// The name, `None` for the null name.
    pub name: Option<String>,
}

impl QualifiedName {
    /// Creates a qualified name.
    pub fn new(namespace: u16, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: Some(name.into()),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) if self.namespace != 0 => write!(f, "{}:{}", self.namespace, name),
            Some(name) => write!(f, "{name}"),
            None => Ok(()),
        }
    }
}

/// Human-readable text with an optional locale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LocalizedText {
    /// Locale id such as `en-US`, if present.
    pub locale: Option<String>,
    /// The text itself, if present.
    pub text: Option<String>,
}

impl LocalizedText {
    /// Creates a localized text without a locale.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            locale: None,
            text: Some(text.into()),
        }
    }
}

impl fmt::Display for LocalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text.as_deref().unwrap_or(""))
    }
}

// =============================================================================
// Built-in data type ids
// =============================================================================

/// Built-in data type ids used in variant encoding bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataTypeId {
    /// Two-state logical value.
    Boolean = 1,
    /// Signed 8-bit integer.
    SByte = 2,
    /// Unsigned 8-bit integer.
    Byte = 3,
    /// Signed 16-bit integer.
    Int16 = 4,
    /// Unsigned 16-bit integer.
    UInt16 = 5,
    /// Signed 32-bit integer.
    Int32 = 6,
    /// Unsigned 32-bit integer.
    UInt32 = 7,
    /// Signed 64-bit integer.
    Int64 = 8,
    /// Unsigned 64-bit integer.
    UInt64 = 9,
    /// IEEE 754 single precision.
    Float = 10,
    /// IEEE 754 double precision.
    Double = 11,
    /// UTF-8 string.
    String = 12,
    /// 100 ns ticks since 1601-01-01 UTC.
    DateTime = 13,
    /// 16-byte GUID.
    Guid = 14,
    /// Raw byte sequence.
    ByteString = 15,
    /// Status code.
    StatusCode = 19,
}

impl DataTypeId {
    /// Maps an encoding-byte type id back to the enum.
    pub const fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            1 => Self::Boolean,
            2 => Self::SByte,
            3 => Self::Byte,
            4 => Self::Int16,
            5 => Self::UInt16,
            6 => Self::Int32,
            7 => Self::UInt32,
            8 => Self::Int64,
            9 => Self::UInt64,
            10 => Self::Float,
            11 => Self::Double,
            12 => Self::String,
            13 => Self::DateTime,
            14 => Self::Guid,
            15 => Self::ByteString,
            19 => Self::StatusCode,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_text_round_trip() {
        let cases = [
            "i=84",
            "ns=2;s=Temperature",
            "ns=1;i=1001",
            "ns=3;g=72962b91-fa75-4ae6-8d28-b404dc7daf63",
        ];
        for case in cases {
            let id: NodeId = case.parse().unwrap();
            assert_eq!(id.to_string(), case);
        }
    }

    #[test]
    fn test_node_id_opaque_base64() {
        let id = NodeId::opaque(4, vec![0xDE, 0xAD, 0xBE, 0xEF]);
        let text = id.to_string();
        assert_eq!(text, "ns=4;b=3q2+7w==");
        assert_eq!(text.parse::<NodeId>().unwrap(), id);
    }

    #[test]
    fn test_node_id_parse_rejects_garbage() {
        assert!("".parse::<NodeId>().is_err());
        assert!("Temperature".parse::<NodeId>().is_err());
        assert!("ns=2;x=1".parse::<NodeId>().is_err());
        assert!("ns=bad;i=1".parse::<NodeId>().is_err());
        assert!("ns=2;i=notanumber".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_node_id_serde_as_text() {
        let id = NodeId::string(2, "Pressure");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ns=2;s=Pressure\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_well_known_ids() {
        assert_eq!(NodeId::ROOT_FOLDER.to_string(), "i=84");
        assert_eq!(NodeId::OBJECTS_FOLDER.to_string(), "i=85");
        assert!(NodeId::NULL.is_null());
        assert!(!NodeId::SERVER.is_null());
    }

    #[test]
    fn test_qualified_name_display() {
        assert_eq!(QualifiedName::new(0, "Objects").to_string(), "Objects");
        assert_eq!(QualifiedName::new(2, "Pump").to_string(), "2:Pump");
        assert_eq!(QualifiedName::default().to_string(), "");
    }

    #[test]
    fn test_data_type_id_mapping() {
        assert_eq!(DataTypeId::from_id(1), Some(DataTypeId::Boolean));
        assert_eq!(DataTypeId::from_id(11), Some(DataTypeId::Double));
        assert_eq!(DataTypeId::from_id(19), Some(DataTypeId::StatusCode));
        assert_eq!(DataTypeId::from_id(16), None);
        assert_eq!(DataTypeId::from_id(200), None);
    }
}
