//! `BorshAccountDecoder`: concrete `AccountDecoder` for Anchor IDLs.

use std::sync::Arc;

use borsh::BorshDeserialize;
use chainaccount_core::{
    address::{Address, ADDRESS_BYTES},
    decoder::AccountDecoder,
    discriminator::DISCRIMINATOR_SIZE,
    error::DecodeError,
    idl::{Idl, IdlEnumFields, IdlField, IdlType, IdlTypeDef, IdlTypeDefTy},
    value::AccountValue,
};

/// Same nesting guard as the size computation in the IDL model.
const MAX_DEPTH: usize = 64;

/// Cap on vec lengths whose elements occupy no bytes, since the buffer
/// length cannot bound them.
const MAX_ZERO_SIZED_VEC_LEN: usize = 65_536;

/// Decodes accounts of any type declared in one IDL.
#[derive(Debug, Clone)]
pub struct BorshAccountDecoder {
    idl: Arc<Idl>,
}

impl BorshAccountDecoder {
    pub fn new(idl: Arc<Idl>) -> Self {
        Self { idl }
    }

    pub fn idl(&self) -> &Idl {
        &self.idl
    }

    /// Decode a payload (discriminator already stripped) with layout `def`.
    pub fn decode_payload(&self, def: &IdlTypeDef, payload: &[u8]) -> Result<AccountValue, DecodeError> {
        let mut buf = payload;
        let value = self.decode_def(def, &mut buf, 0)?;
        if !buf.is_empty() {
            tracing::trace!(
                account = %def.name,
                trailing = buf.len(),
                "ignoring trailing account bytes"
            );
        }
        Ok(value)
    }

    fn decode_def(
        &self,
        def: &IdlTypeDef,
        buf: &mut &[u8],
        depth: usize,
    ) -> Result<AccountValue, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::InvalidValue {
                reason: format!("type '{}' nests deeper than {MAX_DEPTH} levels", def.name),
            });
        }
        match &def.ty {
            IdlTypeDefTy::Struct { fields } => {
                Ok(AccountValue::Struct(self.decode_fields(fields, buf, depth)?))
            }
            IdlTypeDefTy::Enum { variants } => {
                let tag = read::<u8>(buf, 1, &def.name)? as usize;
                let variant = variants.get(tag).ok_or_else(|| DecodeError::InvalidValue {
                    reason: format!("enum '{}' has no variant {tag}", def.name),
                })?;
                let fields: Vec<(String, AccountValue)> = match &variant.fields {
                    None => Vec::new(),
                    Some(IdlEnumFields::Named(fields)) => self.decode_fields(fields, buf, depth)?,
                    Some(IdlEnumFields::Tuple(types)) => types
                        .iter()
                        .enumerate()
                        .map(|(i, ty)| Ok((i.to_string(), self.decode_ty(ty, buf, depth + 1)?)))
                        .collect::<Result<_, DecodeError>>()?,
                };
                Ok(AccountValue::Enum {
                    variant: variant.name.clone(),
                    fields,
                })
            }
        }
    }

    fn decode_fields(
        &self,
        fields: &[IdlField],
        buf: &mut &[u8],
        depth: usize,
    ) -> Result<Vec<(String, AccountValue)>, DecodeError> {
        fields
            .iter()
            .map(|f| Ok((f.name.clone(), self.decode_ty(&f.ty, buf, depth + 1)?)))
            .collect()
    }

    fn decode_ty(
        &self,
        ty: &IdlType,
        buf: &mut &[u8],
        depth: usize,
    ) -> Result<AccountValue, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::InvalidValue {
                reason: format!("layout nests deeper than {MAX_DEPTH} levels"),
            });
        }
        let value = match ty {
            IdlType::Bool => AccountValue::Bool(read::<bool>(buf, 1, "bool")?),
            IdlType::U8 => AccountValue::Uint(read::<u8>(buf, 1, "u8")?.into()),
            IdlType::I8 => AccountValue::Int(read::<i8>(buf, 1, "i8")?.into()),
            IdlType::U16 => AccountValue::Uint(read::<u16>(buf, 2, "u16")?.into()),
            IdlType::I16 => AccountValue::Int(read::<i16>(buf, 2, "i16")?.into()),
            IdlType::U32 => AccountValue::Uint(read::<u32>(buf, 4, "u32")?.into()),
            IdlType::I32 => AccountValue::Int(read::<i32>(buf, 4, "i32")?.into()),
            IdlType::U64 => AccountValue::Uint(read::<u64>(buf, 8, "u64")?.into()),
            IdlType::I64 => AccountValue::Int(read::<i64>(buf, 8, "i64")?.into()),
            IdlType::U128 => AccountValue::Uint(read::<u128>(buf, 16, "u128")?),
            IdlType::I128 => AccountValue::Int(read::<i128>(buf, 16, "i128")?),
            IdlType::F32 => AccountValue::Float(read::<f32>(buf, 4, "f32")?.into()),
            IdlType::F64 => AccountValue::Float(read::<f64>(buf, 8, "f64")?),
            IdlType::Bytes => AccountValue::Bytes(take(buf, "bytes")?.to_vec()),
            IdlType::String => {
                let raw = take(buf, "string")?;
                let s = std::str::from_utf8(raw).map_err(|e| DecodeError::InvalidValue {
                    reason: format!("string is not valid UTF-8: {e}"),
                })?;
                AccountValue::Str(s.to_string())
            }
            IdlType::PublicKey => {
                let raw = split(buf, ADDRESS_BYTES, "publicKey")?;
                AccountValue::Pubkey(Address::try_from_slice(raw)?)
            }
            IdlType::Option(inner) => match read::<u8>(buf, 1, "option tag")? {
                0 => AccountValue::Null,
                1 => self.decode_ty(inner, buf, depth + 1)?,
                tag => {
                    return Err(DecodeError::InvalidValue {
                        reason: format!("invalid option tag {tag}"),
                    })
                }
            },
            IdlType::Vec(elem) => {
                let len = read::<u32>(buf, 4, "vec length")? as usize;
                if self.idl.type_size(elem) == Some(0) {
                    if len > MAX_ZERO_SIZED_VEC_LEN {
                        return Err(DecodeError::InvalidValue {
                            reason: format!(
                                "vec of {len} zero-sized elements exceeds {MAX_ZERO_SIZED_VEC_LEN}"
                            ),
                        });
                    }
                } else if len > buf.len() {
                    // Each element takes at least one byte; reject lengths the
                    // buffer cannot possibly hold before allocating.
                    return Err(DecodeError::UnexpectedEof {
                        context: format!("vec of {len} elements"),
                    });
                }
                let items = (0..len)
                    .map(|_| self.decode_ty(elem, buf, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                AccountValue::Array(items)
            }
            IdlType::Array(elem, len) => {
                if **elem == IdlType::U8 {
                    AccountValue::Bytes(split(buf, *len, "byte array")?.to_vec())
                } else {
                    let items = (0..*len)
                        .map(|_| self.decode_ty(elem, buf, depth + 1))
                        .collect::<Result<Vec<_>, _>>()?;
                    AccountValue::Array(items)
                }
            }
            IdlType::Defined(name) => {
                let def = self
                    .idl
                    .type_def(name)
                    .ok_or_else(|| DecodeError::UnknownType { name: name.clone() })?;
                self.decode_def(def, buf, depth + 1)?
            }
        };
        Ok(value)
    }
}

impl AccountDecoder for BorshAccountDecoder {
    fn decode(&self, type_name: &str, data: &[u8]) -> Result<AccountValue, DecodeError> {
        let def = self
            .idl
            .account(type_name)
            .ok_or_else(|| DecodeError::UnknownType { name: type_name.to_string() })?;
        let payload = data
            .get(DISCRIMINATOR_SIZE..)
            .ok_or_else(|| DecodeError::UnexpectedEof {
                context: format!("discriminator of '{type_name}'"),
            })?;
        self.decode_payload(def, payload)
    }

    fn size(&self, def: &IdlTypeDef) -> Option<usize> {
        self.idl.type_def_size(def)
    }
}

/// Split `n` bytes off the front of `buf`.
fn split<'a>(buf: &mut &'a [u8], n: usize, context: &str) -> Result<&'a [u8], DecodeError> {
    if buf.len() < n {
        return Err(DecodeError::UnexpectedEof {
            context: context.to_string(),
        });
    }
    let (head, rest) = buf.split_at(n);
    *buf = rest;
    Ok(head)
}

/// Read a u32 length prefix followed by that many bytes.
fn take<'a>(buf: &mut &'a [u8], context: &str) -> Result<&'a [u8], DecodeError> {
    let len = read::<u32>(buf, 4, context)? as usize;
    split(buf, len, context)
}

/// Read a fixed-width Borsh primitive of `width` bytes.
fn read<T: BorshDeserialize>(buf: &mut &[u8], width: usize, context: &str) -> Result<T, DecodeError> {
    let mut head = split(buf, width, context)?;
    T::deserialize(&mut head).map_err(|e| DecodeError::InvalidValue {
        reason: format!("{context}: {e}"),
    })
}
