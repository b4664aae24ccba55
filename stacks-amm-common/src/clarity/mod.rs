//! # Clarity values
//!
//! Typed values exchanged with Clarity contracts and their consensus binary encoding, as
//! used for read-only call arguments and results (`0x`-prefixed hex on the wire).
pub mod principal;

use std::{collections::BTreeMap, fmt};

use thiserror::Error;

use crate::c32::{AddressError, HASH160_LENGTH};
use principal::{ContractPrincipal, Principal, StandardPrincipal};

/// Nesting limit for decoded values.
pub const MAX_VALUE_DEPTH: usize = 32;

/// Longest Clarity name allowed as a tuple key.
pub const MAX_TUPLE_KEY_LENGTH: usize = 128;

mod prefix {
    pub const INT: u8 = 0x00;
    pub const UINT: u8 = 0x01;
    pub const BUFFER: u8 = 0x02;
    pub const BOOL_TRUE: u8 = 0x03;
    pub const BOOL_FALSE: u8 = 0x04;
    pub const PRINCIPAL_STANDARD: u8 = 0x05;
    pub const PRINCIPAL_CONTRACT: u8 = 0x06;
    pub const RESPONSE_OK: u8 = 0x07;
    pub const RESPONSE_ERR: u8 = 0x08;
    pub const OPTIONAL_NONE: u8 = 0x09;
    pub const OPTIONAL_SOME: u8 = 0x0a;
    pub const LIST: u8 = 0x0b;
    pub const TUPLE: u8 = 0x0c;
    pub const STRING_ASCII: u8 = 0x0d;
    pub const STRING_UTF8: u8 = 0x0e;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClarityError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Unexpected end of input at offset {0}")]
    UnexpectedEof(usize),

    #[error("Unknown type prefix {0:#04x} at offset {1}")]
    UnknownTypePrefix(u8, usize),

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    #[error("Invalid string content: {0}")]
    InvalidString(String),

    #[error("Invalid tuple key: {0:?}")]
    InvalidTupleKey(String),

    #[error("Value nesting exceeds {MAX_VALUE_DEPTH} levels")]
    DepthExceeded,

    #[error("Length {0} does not fit its length prefix")]
    LengthOverflow(usize),

    #[error(transparent)]
    Address(#[from] AddressError),
}

/// A Clarity value.
///
/// Tuples keep their entries ordered by key, which is also the order of their serialized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClarityValue {
    Int(i128),
    UInt(u128),
    Bool(bool),
    Buffer(Vec<u8>),
    Principal(Principal),
    ResponseOk(Box<ClarityValue>),
    ResponseErr(Box<ClarityValue>),
    OptionalNone,
    OptionalSome(Box<ClarityValue>),
    List(Vec<ClarityValue>),
    Tuple(BTreeMap<String, ClarityValue>),
    StringAscii(String),
    StringUtf8(String),
}

impl ClarityValue {
    pub fn ok(value: ClarityValue) -> Self {
        ClarityValue::ResponseOk(Box::new(value))
    }

    pub fn err(value: ClarityValue) -> Self {
        ClarityValue::ResponseErr(Box::new(value))
    }

    pub fn some(value: ClarityValue) -> Self {
        ClarityValue::OptionalSome(Box::new(value))
    }

    pub fn tuple<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, ClarityValue)>,
    {
        ClarityValue::Tuple(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        )
    }

    /// The type tag of this value, as reported by Clarity tooling.
    pub fn type_name(&self) -> &'static str {
        match self {
            ClarityValue::Int(_) => "int",
            ClarityValue::UInt(_) => "uint",
            ClarityValue::Bool(true) => "true",
            ClarityValue::Bool(false) => "false",
            ClarityValue::Buffer(_) => "buffer",
            ClarityValue::Principal(Principal::Standard(_)) => "address",
            ClarityValue::Principal(Principal::Contract(_)) => "contract",
            ClarityValue::ResponseOk(_) => "ok",
            ClarityValue::ResponseErr(_) => "err",
            ClarityValue::OptionalNone => "none",
            ClarityValue::OptionalSome(_) => "some",
            ClarityValue::List(_) => "list",
            ClarityValue::Tuple(_) => "tuple",
            ClarityValue::StringAscii(_) => "ascii",
            ClarityValue::StringUtf8(_) => "utf8",
        }
    }

    /// Serializes the value into its consensus binary form.
    ///
    /// Fails if a tuple key is not a valid name or a length does not fit its prefix.
    pub fn serialize(&self) -> Result<Vec<u8>, ClarityError> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Serializes the value into `0x`-prefixed hex.
    pub fn to_hex(&self) -> Result<String, ClarityError> {
        Ok(format!("0x{}", hex::encode(self.serialize()?)))
    }

    fn write_to(&self, out: &mut Vec<u8>) -> Result<(), ClarityError> {
        match self {
            ClarityValue::Int(v) => {
                out.push(prefix::INT);
                out.extend_from_slice(&v.to_be_bytes());
            }
            ClarityValue::UInt(v) => {
                out.push(prefix::UINT);
                out.extend_from_slice(&v.to_be_bytes());
            }
            ClarityValue::Bool(true) => out.push(prefix::BOOL_TRUE),
            ClarityValue::Bool(false) => out.push(prefix::BOOL_FALSE),
            ClarityValue::Buffer(bytes) => {
                out.push(prefix::BUFFER);
                write_len_prefixed(out, bytes)?;
            }
            ClarityValue::Principal(Principal::Standard(p)) => {
                out.push(prefix::PRINCIPAL_STANDARD);
                write_standard_principal(out, p);
            }
            ClarityValue::Principal(Principal::Contract(p)) => {
                out.push(prefix::PRINCIPAL_CONTRACT);
                write_standard_principal(out, p.issuer());
                write_name(out, p.name())?;
            }
            ClarityValue::ResponseOk(inner) => {
                out.push(prefix::RESPONSE_OK);
                inner.write_to(out)?;
            }
            ClarityValue::ResponseErr(inner) => {
                out.push(prefix::RESPONSE_ERR);
                inner.write_to(out)?;
            }
            ClarityValue::OptionalNone => out.push(prefix::OPTIONAL_NONE),
            ClarityValue::OptionalSome(inner) => {
                out.push(prefix::OPTIONAL_SOME);
                inner.write_to(out)?;
            }
            ClarityValue::List(items) => {
                out.push(prefix::LIST);
                write_len(out, items.len())?;
                for item in items {
                    item.write_to(out)?;
                }
            }
            ClarityValue::Tuple(entries) => {
                out.push(prefix::TUPLE);
                write_len(out, entries.len())?;
                for (key, value) in entries {
                    if key.is_empty() || key.len() > MAX_TUPLE_KEY_LENGTH {
                        return Err(ClarityError::InvalidTupleKey(key.clone()));
                    }
                    write_name(out, key)?;
                    value.write_to(out)?;
                }
            }
            ClarityValue::StringAscii(s) => {
                out.push(prefix::STRING_ASCII);
                write_len_prefixed(out, s.as_bytes())?;
            }
            ClarityValue::StringUtf8(s) => {
                out.push(prefix::STRING_UTF8);
                write_len_prefixed(out, s.as_bytes())?;
            }
        }
        Ok(())
    }

    /// Decodes a single value from its consensus binary form.
    ///
    /// The whole input must be consumed.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, ClarityError> {
        let mut reader = Reader { bytes, pos: 0 };
        let value = reader.read_value(0)?;
        let remaining = bytes.len() - reader.pos;
        if remaining > 0 {
            return Err(ClarityError::TrailingBytes(remaining));
        }
        Ok(value)
    }

    /// Decodes a value from hex, with or without the `0x` prefix.
    pub fn from_hex(hex_str: &str) -> Result<Self, ClarityError> {
        let stripped = hex_str
            .strip_prefix("0x")
            .unwrap_or(hex_str);
        let bytes = hex::decode(stripped).map_err(|e| ClarityError::InvalidHex(e.to_string()))?;
        Self::deserialize(&bytes)
    }
}

impl From<u128> for ClarityValue {
    fn from(value: u128) -> Self {
        ClarityValue::UInt(value)
    }
}

impl From<i128> for ClarityValue {
    fn from(value: i128) -> Self {
        ClarityValue::Int(value)
    }
}

impl From<bool> for ClarityValue {
    fn from(value: bool) -> Self {
        ClarityValue::Bool(value)
    }
}

impl From<Principal> for ClarityValue {
    fn from(value: Principal) -> Self {
        ClarityValue::Principal(value)
    }
}

/// Renders values in Clarity literal syntax, e.g. `(ok (tuple (fee-amount u5)))`.
impl fmt::Display for ClarityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClarityValue::Int(v) => write!(f, "{v}"),
            ClarityValue::UInt(v) => write!(f, "u{v}"),
            ClarityValue::Bool(v) => write!(f, "{v}"),
            ClarityValue::Buffer(bytes) => write!(f, "0x{}", hex::encode(bytes)),
            ClarityValue::Principal(p) => write!(f, "'{p}"),
            ClarityValue::ResponseOk(inner) => write!(f, "(ok {inner})"),
            ClarityValue::ResponseErr(inner) => write!(f, "(err {inner})"),
            ClarityValue::OptionalNone => write!(f, "none"),
            ClarityValue::OptionalSome(inner) => write!(f, "(some {inner})"),
            ClarityValue::List(items) => {
                write!(f, "(list")?;
                for item in items {
                    write!(f, " {item}")?;
                }
                write!(f, ")")
            }
            ClarityValue::Tuple(entries) => {
                write!(f, "(tuple")?;
                for (key, value) in entries {
                    write!(f, " ({key} {value})")?;
                }
                write!(f, ")")
            }
            ClarityValue::StringAscii(s) => write!(f, "{s:?}"),
            ClarityValue::StringUtf8(s) => write!(f, "u{s:?}"),
        }
    }
}

fn write_len(out: &mut Vec<u8>, len: usize) -> Result<(), ClarityError> {
    let len = u32::try_from(len).map_err(|_| ClarityError::LengthOverflow(len))?;
    out.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

fn write_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) -> Result<(), ClarityError> {
    write_len(out, bytes.len())?;
    out.extend_from_slice(bytes);
    Ok(())
}

fn write_standard_principal(out: &mut Vec<u8>, principal: &StandardPrincipal) {
    out.push(principal.version());
    out.extend_from_slice(principal.hash160());
}

fn write_name(out: &mut Vec<u8>, name: &str) -> Result<(), ClarityError> {
    let len = u8::try_from(name.len()).map_err(|_| ClarityError::LengthOverflow(name.len()))?;
    out.push(len);
    out.extend_from_slice(name.as_bytes());
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], ClarityError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(ClarityError::UnexpectedEof(self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, ClarityError> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, ClarityError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(buf))
    }

    fn read_16(&mut self) -> Result<[u8; 16], ClarityError> {
        let mut buf = [0u8; 16];
        buf.copy_from_slice(self.take(16)?);
        Ok(buf)
    }

    fn read_len_prefixed(&mut self) -> Result<&'a [u8], ClarityError> {
        let len = self.read_u32()? as usize;
        self.take(len)
    }

    fn read_name(&mut self) -> Result<String, ClarityError> {
        let len = self.read_u8()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|e| ClarityError::InvalidString(e.to_string()))
    }

    fn read_standard_principal(&mut self) -> Result<StandardPrincipal, ClarityError> {
        let version = self.read_u8()?;
        let mut hash160 = [0u8; HASH160_LENGTH];
        hash160.copy_from_slice(self.take(HASH160_LENGTH)?);
        Ok(StandardPrincipal::new(version, hash160)?)
    }

    fn read_value(&mut self, depth: usize) -> Result<ClarityValue, ClarityError> {
        if depth > MAX_VALUE_DEPTH {
            return Err(ClarityError::DepthExceeded);
        }
        let offset = self.pos;
        let value = match self.read_u8()? {
            prefix::INT => ClarityValue::Int(i128::from_be_bytes(self.read_16()?)),
            prefix::UINT => ClarityValue::UInt(u128::from_be_bytes(self.read_16()?)),
            prefix::BUFFER => ClarityValue::Buffer(self.read_len_prefixed()?.to_vec()),
            prefix::BOOL_TRUE => ClarityValue::Bool(true),
            prefix::BOOL_FALSE => ClarityValue::Bool(false),
            prefix::PRINCIPAL_STANDARD => {
                ClarityValue::Principal(Principal::Standard(self.read_standard_principal()?))
            }
            prefix::PRINCIPAL_CONTRACT => {
                let issuer = self.read_standard_principal()?;
                let name = self.read_name()?;
                ClarityValue::Principal(Principal::Contract(ContractPrincipal::new(issuer, &name)?))
            }
            prefix::RESPONSE_OK => ClarityValue::ok(self.read_value(depth + 1)?),
            prefix::RESPONSE_ERR => ClarityValue::err(self.read_value(depth + 1)?),
            prefix::OPTIONAL_NONE => ClarityValue::OptionalNone,
            prefix::OPTIONAL_SOME => ClarityValue::some(self.read_value(depth + 1)?),
            prefix::LIST => {
                let len = self.read_u32()? as usize;
                // every item takes at least one byte
                let mut items = Vec::with_capacity(len.min(self.bytes.len() - self.pos));
                for _ in 0..len {
                    items.push(self.read_value(depth + 1)?);
                }
                ClarityValue::List(items)
            }
            prefix::TUPLE => {
                let len = self.read_u32()? as usize;
                let mut entries = BTreeMap::new();
                for _ in 0..len {
                    let key = self.read_name()?;
                    if key.is_empty() ||
                        key.len() > MAX_TUPLE_KEY_LENGTH ||
                        entries.contains_key(&key)
                    {
                        return Err(ClarityError::InvalidTupleKey(key));
                    }
                    let value = self.read_value(depth + 1)?;
                    entries.insert(key, value);
                }
                ClarityValue::Tuple(entries)
            }
            prefix::STRING_ASCII => {
                let raw = self.read_len_prefixed()?;
                if !raw.is_ascii() {
                    return Err(ClarityError::InvalidString("non-ascii byte".to_string()));
                }
                ClarityValue::StringAscii(
                    String::from_utf8(raw.to_vec())
                        .map_err(|e| ClarityError::InvalidString(e.to_string()))?,
                )
            }
            prefix::STRING_UTF8 => {
                let raw = self.read_len_prefixed()?;
                ClarityValue::StringUtf8(
                    String::from_utf8(raw.to_vec())
                        .map_err(|e| ClarityError::InvalidString(e.to_string()))?,
                )
            }
            other => return Err(ClarityError::UnknownTypePrefix(other, offset)),
        };
        Ok(value)
    }
}
