//! Schema types: the in-memory representation of an Anchor IDL.
//!
//! Only the parts needed to lay out accounts are modelled: the `accounts`
//! and `types` sections. Instructions, events, errors and metadata are
//! accepted in the JSON and ignored.

use serde::{Deserialize, Serialize};

use crate::discriminator::DISCRIMINATOR_SIZE;

/// Nesting limit when resolving `defined` types; guards self-referential
/// layouts.
const MAX_TYPE_DEPTH: usize = 64;

/// A parsed program IDL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Idl {
    #[serde(default)]
    pub version: String,
    pub name: String,
    /// Account layouts, in declaration order.
    #[serde(default)]
    pub accounts: Vec<IdlTypeDef>,
    /// Shared user-defined types referenced through `{"defined": ..}`.
    #[serde(default)]
    pub types: Vec<IdlTypeDef>,
}

/// A named type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdlTypeDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: IdlTypeDefTy,
}

/// The body of a type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IdlTypeDefTy {
    Struct { fields: Vec<IdlField> },
    Enum { variants: Vec<IdlEnumVariant> },
}

/// A named struct field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdlField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: IdlType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdlEnumVariant {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<IdlEnumFields>,
}

/// Enum variant payload: struct-like or tuple-like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdlEnumFields {
    Named(Vec<IdlField>),
    Tuple(Vec<IdlType>),
}

/// A field type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IdlTypeRepr", into = "IdlTypeRepr")]
pub enum IdlType {
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    U128,
    I128,
    F32,
    F64,
    Bytes,
    String,
    PublicKey,
    Vec(Box<IdlType>),
    Option(Box<IdlType>),
    Array(Box<IdlType>, usize),
    Defined(String),
}

/// JSON shape of an [`IdlType`]: a primitive name or a single-key object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum IdlTypeRepr {
    Primitive(String),
    Vec { vec: Box<IdlType> },
    Option { option: Box<IdlType> },
    Array { array: (Box<IdlType>, usize) },
    Defined { defined: String },
}

impl TryFrom<IdlTypeRepr> for IdlType {
    type Error = String;

    fn try_from(repr: IdlTypeRepr) -> Result<Self, Self::Error> {
        Ok(match repr {
            IdlTypeRepr::Primitive(name) => match name.as_str() {
                "bool" => Self::Bool,
                "u8" => Self::U8,
                "i8" => Self::I8,
                "u16" => Self::U16,
                "i16" => Self::I16,
                "u32" => Self::U32,
                "i32" => Self::I32,
                "u64" => Self::U64,
                "i64" => Self::I64,
                "u128" => Self::U128,
                "i128" => Self::I128,
                "f32" => Self::F32,
                "f64" => Self::F64,
                "bytes" => Self::Bytes,
                "string" => Self::String,
                "publicKey" | "pubkey" => Self::PublicKey,
                other => return Err(format!("unsupported IDL type '{other}'")),
            },
            IdlTypeRepr::Vec { vec } => Self::Vec(vec),
            IdlTypeRepr::Option { option } => Self::Option(option),
            IdlTypeRepr::Array { array: (elem, len) } => Self::Array(elem, len),
            IdlTypeRepr::Defined { defined } => Self::Defined(defined),
        })
    }
}

impl From<IdlType> for IdlTypeRepr {
    fn from(ty: IdlType) -> Self {
        let prim = |s: &str| IdlTypeRepr::Primitive(s.to_string());
        match ty {
            IdlType::Bool => prim("bool"),
            IdlType::U8 => prim("u8"),
            IdlType::I8 => prim("i8"),
            IdlType::U16 => prim("u16"),
            IdlType::I16 => prim("i16"),
            IdlType::U32 => prim("u32"),
            IdlType::I32 => prim("i32"),
            IdlType::U64 => prim("u64"),
            IdlType::I64 => prim("i64"),
            IdlType::U128 => prim("u128"),
            IdlType::I128 => prim("i128"),
            IdlType::F32 => prim("f32"),
            IdlType::F64 => prim("f64"),
            IdlType::Bytes => prim("bytes"),
            IdlType::String => prim("string"),
            IdlType::PublicKey => prim("publicKey"),
            IdlType::Vec(vec) => IdlTypeRepr::Vec { vec },
            IdlType::Option(option) => IdlTypeRepr::Option { option },
            IdlType::Array(elem, len) => IdlTypeRepr::Array { array: (elem, len) },
            IdlType::Defined(defined) => IdlTypeRepr::Defined { defined },
        }
    }
}

impl Idl {
    /// Parse an IDL from its JSON text.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Look up an account definition by its declared name.
    pub fn account(&self, name: &str) -> Option<&IdlTypeDef> {
        self.accounts.iter().find(|a| a.name == name)
    }

    /// Look up a type by name, searching accounts first, then shared types.
    pub fn type_def(&self, name: &str) -> Option<&IdlTypeDef> {
        self.account(name)
            .or_else(|| self.types.iter().find(|t| t.name == name))
    }

    /// Serialized payload size of a type definition, excluding the
    /// discriminator. `None` when the layout contains variable-size data
    /// (`bytes`, `string`, `vec`) or references an unknown type.
    pub fn type_def_size(&self, def: &IdlTypeDef) -> Option<usize> {
        self.def_size(def, 0)
    }

    /// Serialized size of a single field type, `None` when variable.
    pub fn type_size(&self, ty: &IdlType) -> Option<usize> {
        self.ty_size(ty, 0)
    }

    /// Full on-chain size of an account: discriminator plus payload. A
    /// variable-size payload counts as zero.
    pub fn account_size(&self, def: &IdlTypeDef) -> usize {
        DISCRIMINATOR_SIZE + self.type_def_size(def).unwrap_or(0)
    }

    fn def_size(&self, def: &IdlTypeDef, depth: usize) -> Option<usize> {
        if depth > MAX_TYPE_DEPTH {
            return None;
        }
        match &def.ty {
            IdlTypeDefTy::Struct { fields } => fields
                .iter()
                .map(|f| self.ty_size(&f.ty, depth + 1))
                .sum(),
            IdlTypeDefTy::Enum { variants } => {
                let mut largest = 0usize;
                for variant in variants {
                    let size = match &variant.fields {
                        None => 0,
                        Some(IdlEnumFields::Named(fields)) => fields
                            .iter()
                            .map(|f| self.ty_size(&f.ty, depth + 1))
                            .sum::<Option<usize>>()?,
                        Some(IdlEnumFields::Tuple(types)) => types
                            .iter()
                            .map(|t| self.ty_size(t, depth + 1))
                            .sum::<Option<usize>>()?,
                    };
                    largest = largest.max(size);
                }
                Some(1 + largest)
            }
        }
    }

    fn ty_size(&self, ty: &IdlType, depth: usize) -> Option<usize> {
        if depth > MAX_TYPE_DEPTH {
            return None;
        }
        match ty {
            IdlType::Bool | IdlType::U8 | IdlType::I8 => Some(1),
            IdlType::U16 | IdlType::I16 => Some(2),
            IdlType::U32 | IdlType::I32 | IdlType::F32 => Some(4),
            IdlType::U64 | IdlType::I64 | IdlType::F64 => Some(8),
            IdlType::U128 | IdlType::I128 => Some(16),
            IdlType::PublicKey => Some(32),
            IdlType::Bytes | IdlType::String | IdlType::Vec(_) => None,
            IdlType::Option(inner) => Some(1 + self.ty_size(inner, depth + 1)?),
            IdlType::Array(elem, len) => Some(self.ty_size(elem, depth + 1)? * len),
            IdlType::Defined(name) => self.def_size(self.type_def(name)?, depth + 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDL: &str = r#"{
        "version": "0.1.0",
        "name": "vaults",
        "instructions": [{"name": "initialize", "accounts": [], "args": []}],
        "accounts": [
            {
                "name": "Vault",
                "type": {
                    "kind": "struct",
                    "fields": [
                        {"name": "authority", "type": "publicKey"},
                        {"name": "amount", "type": "u64"}
                    ]
                }
            },
            {
                "name": "Registry",
                "type": {
                    "kind": "struct",
                    "fields": [
                        {"name": "label", "type": "string"},
                        {"name": "entries", "type": {"vec": "publicKey"}}
                    ]
                }
            },
            {
                "name": "Pool",
                "type": {
                    "kind": "struct",
                    "fields": [
                        {"name": "fees", "type": {"array": ["u16", 4]}},
                        {"name": "delegate", "type": {"option": "publicKey"}},
                        {"name": "status", "type": {"defined": "PoolStatus"}}
                    ]
                }
            }
        ],
        "types": [
            {
                "name": "PoolStatus",
                "type": {
                    "kind": "enum",
                    "variants": [
                        {"name": "Open"},
                        {"name": "Frozen", "fields": [{"name": "until", "type": "i64"}]},
                        {"name": "Migrated", "fields": ["publicKey", "u8"]}
                    ]
                }
            }
        ]
    }"#;

    #[test]
    fn parse_anchor_idl() {
        let idl = Idl::from_json(IDL).unwrap();
        assert_eq!(idl.name, "vaults");
        assert_eq!(idl.accounts.len(), 3);
        let pool = idl.account("Pool").unwrap();
        let IdlTypeDefTy::Struct { fields } = &pool.ty else {
            panic!("Pool should be a struct");
        };
        assert_eq!(fields[0].ty, IdlType::Array(Box::new(IdlType::U16), 4));
        assert_eq!(fields[2].ty, IdlType::Defined("PoolStatus".into()));
        assert!(idl.account("PoolStatus").is_none());
        assert!(idl.type_def("PoolStatus").is_some());
    }

    #[test]
    fn fixed_account_sizes() {
        let idl = Idl::from_json(IDL).unwrap();
        let vault = idl.account("Vault").unwrap();
        assert_eq!(idl.type_def_size(vault), Some(40));
        assert_eq!(idl.account_size(vault), 48);

        // 4*2 + (1+32) + (1 + max(0, 8, 33))
        let pool = idl.account("Pool").unwrap();
        assert_eq!(idl.type_def_size(pool), Some(8 + 33 + 34));
    }

    #[test]
    fn variable_account_size_counts_as_zero() {
        let idl = Idl::from_json(IDL).unwrap();
        let registry = idl.account("Registry").unwrap();
        assert_eq!(idl.type_def_size(registry), None);
        assert_eq!(idl.account_size(registry), 8);
    }

    #[test]
    fn unsupported_primitive_is_rejected() {
        let json = r#"{"name": "x", "accounts": [{"name": "A", "type": {"kind": "struct",
            "fields": [{"name": "f", "type": "u256"}]}}]}"#;
        assert!(Idl::from_json(json).is_err());
    }

    #[test]
    fn types_serialize_back_to_anchor_shape() {
        let ty = IdlType::Vec(Box::new(IdlType::PublicKey));
        assert_eq!(serde_json::to_value(&ty).unwrap(), serde_json::json!({"vec": "publicKey"}));
    }
}
