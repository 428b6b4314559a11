//! Decoded account values.
//!
//! Decoders normalise every account into an [`AccountValue`] tree so that
//! consumers never deal with raw layouts.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fmt;

use crate::address::Address;

/// A decoded account field or whole account.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountValue {
    Bool(bool),
    /// Unsigned integers up to 128 bits.
    Uint(u128),
    /// Signed integers up to 128 bits.
    Int(i128),
    Float(f64),
    Bytes(Vec<u8>),
    Str(String),
    Pubkey(Address),
    /// Fixed arrays and vectors.
    Array(Vec<AccountValue>),
    /// Struct fields in declaration order.
    Struct(Vec<(String, AccountValue)>),
    /// Enum variant with its (possibly empty) named or positional fields.
    Enum {
        variant: String,
        fields: Vec<(String, AccountValue)>,
    },
    /// `Option::None`.
    Null,
}

impl AccountValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Look up a struct field by name.
    pub fn field(&self, name: &str) -> Option<&AccountValue> {
        match self {
            Self::Struct(fields) | Self::Enum { fields, .. } => {
                fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    pub fn as_u128(&self) -> Option<u128> {
        match self {
            Self::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_pubkey(&self) -> Option<&Address> {
        match self {
            Self::Pubkey(a) => Some(a),
            _ => None,
        }
    }
}

/// Structs serialise as JSON objects, enums as `{"Variant": {..fields}}`,
/// bytes as an array of numbers.
impl Serialize for AccountValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Uint(v) => serializer.serialize_u128(*v),
            Self::Int(v) => serializer.serialize_i128(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::Bytes(b) => {
                let mut seq = serializer.serialize_seq(Some(b.len()))?;
                for byte in b {
                    seq.serialize_element(byte)?;
                }
                seq.end()
            }
            Self::Str(s) => serializer.serialize_str(s),
            Self::Pubkey(a) => a.serialize(serializer),
            Self::Array(items) => items.serialize(serializer),
            Self::Struct(fields) => serialize_fields(fields, serializer),
            Self::Enum { variant, fields } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(variant, &FieldsRef(fields))?;
                map.end()
            }
            Self::Null => serializer.serialize_none(),
        }
    }
}

struct FieldsRef<'a>(&'a [(String, AccountValue)]);

impl Serialize for FieldsRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_fields(self.0, serializer)
    }
}

fn serialize_fields<S: Serializer>(
    fields: &[(String, AccountValue)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(fields.len()))?;
    for (k, v) in fields {
        map.serialize_entry(k, v)?;
    }
    map.end()
}

impl fmt::Display for AccountValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Self::Str(s) => write!(f, "{s}"),
            Self::Pubkey(a) => write!(f, "{a}"),
            Self::Array(v) => {
                let parts: Vec<_> = v.iter().map(|x| x.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Self::Struct(fields) => {
                let parts: Vec<_> = fields.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Self::Enum { variant, fields } if fields.is_empty() => write!(f, "{variant}"),
            Self::Enum { variant, fields } => {
                let parts: Vec<_> = fields.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{variant} {{{}}}", parts.join(", "))
            }
            Self::Null => write!(f, "null"),
        }
    }
}
