//! Native-side value representations
//!
//! [`LuaArg`] is what the marshaller can push; [`LuaValue`] is what the
//! decoder produces from a stack slot. [`FromLua`] projects a decoded value
//! onto the typed result a facade operation promises.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{LuaCallError, Result};
use crate::lua::stack::{HostHandle, SlotType};

/// A decoded stack slot.
///
/// Decoding is total: anything without a native equivalent becomes
/// [`LuaValue::Unsupported`], and anything cut off by the decode limits
/// becomes [`LuaValue::Truncated`].
#[derive(Debug, Clone, PartialEq)]
pub enum LuaValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Table whose keys are exactly the dense run `1..=N`
    List(Vec<LuaValue>),
    /// Any other table, keys converted to strings
    Map(BTreeMap<String, LuaValue>),
    /// Placeholder for data beyond the entry or depth ceiling
    Truncated,
    /// Host object (class instance or light userdata)
    Handle(HostHandle),
    /// Function, thread or unreadable userdata
    Unsupported(SlotType),
}

impl LuaValue {
    /// Type name as used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            LuaValue::Nil => "nil",
            LuaValue::Bool(_) => "boolean",
            LuaValue::Int(_) => "integer",
            LuaValue::Float(_) => "number",
            LuaValue::Text(_) => "string",
            LuaValue::List(_) => "list",
            LuaValue::Map(_) => "table",
            LuaValue::Truncated => "truncated",
            LuaValue::Handle(_) => "object",
            LuaValue::Unsupported(tag) => tag.name(),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, LuaValue::Nil)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            LuaValue::Int(n) => Some(*n),
            LuaValue::Float(n) if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n <= i64::MAX as f64 => {
                Some(*n as i64)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            LuaValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Field of a map-shaped value
    pub fn get(&self, key: &str) -> Option<&LuaValue> {
        match self {
            LuaValue::Map(map) => map.get(key),
            _ => None,
        }
    }
}

impl fmt::Display for LuaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaValue::Nil => write!(f, "nil"),
            LuaValue::Bool(b) => write!(f, "{}", b),
            LuaValue::Int(n) => write!(f, "{}", n),
            LuaValue::Float(n) => write!(f, "{}", n),
            LuaValue::Text(s) => write!(f, "{}", s),
            LuaValue::List(items) => write!(f, "<list of {}>", items.len()),
            LuaValue::Map(map) => write!(f, "<table of {}>", map.len()),
            LuaValue::Truncated => write!(f, "<truncated>"),
            LuaValue::Handle(h) => write!(f, "<object {}>", h),
            LuaValue::Unsupported(tag) => write!(f, "<{}>", tag),
        }
    }
}

/// Target address: either absolute, or an expression the host resolves
/// (`"game.exe+1F00"`, `"[[player]+10]"`, a registered symbol, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Absolute(u64),
    Symbolic(String),
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Address::Absolute(value)
    }
}

impl From<usize> for Address {
    fn from(value: usize) -> Self {
        Address::Absolute(value as u64)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Address::Symbolic(value.to_string())
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Address::Symbolic(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Absolute(a) => write!(f, "{:#x}", a),
            Address::Symbolic(s) => write!(f, "{}", s),
        }
    }
}

/// A value the marshaller can push
#[derive(Debug, Clone, PartialEq)]
pub enum LuaArg {
    Nil,
    Bool(bool),
    Int(i64),
    /// Unsigned source value; rejected at validation if it does not fit the
    /// VM integer
    Unsigned(u64),
    Float(f64),
    Text(String),
    /// Raw bytes, pushed as a 1-indexed table of integers
    Buffer(Vec<u8>),
    Handle(HostHandle),
    Address(Address),
}

impl LuaArg {
    /// Check that this value can be pushed without touching the stack
    pub fn validate(&self) -> Result<()> {
        match self {
            LuaArg::Unsigned(n) if *n > i64::MAX as u64 => Err(LuaCallError::Marshalling(format!(
                "unsigned value {} does not fit a Lua integer",
                n
            ))),
            LuaArg::Address(Address::Symbolic(expr)) if expr.trim().is_empty() => Err(
                LuaCallError::Marshalling("address expression is empty".to_string()),
            ),
            LuaArg::Address(Address::Symbolic(expr)) if expr.contains('\0') => Err(
                LuaCallError::Marshalling(format!("address expression {:?} contains NUL", expr)),
            ),
            _ => Ok(()),
        }
    }

    /// Stack slots this value needs while it is being pushed
    pub(crate) fn slots_needed(&self) -> i32 {
        match self {
            // table + value being stored
            LuaArg::Buffer(_) => 2,
            _ => 1,
        }
    }
}

macro_rules! lua_arg_from {
    ($variant:ident: $($ty:ty),*) => {
        $(
            impl From<$ty> for LuaArg {
                fn from(value: $ty) -> Self {
                    LuaArg::$variant(value.into())
                }
            }
        )*
    };
}

lua_arg_from!(Int: i8, i16, i32, i64, u8, u16, u32);
lua_arg_from!(Unsigned: u64);
lua_arg_from!(Float: f32, f64);
lua_arg_from!(Bool: bool);
lua_arg_from!(Text: String, &str);
lua_arg_from!(Handle: HostHandle);
lua_arg_from!(Address: Address);

impl From<isize> for LuaArg {
    fn from(value: isize) -> Self {
        LuaArg::Int(value as i64)
    }
}

impl From<usize> for LuaArg {
    fn from(value: usize) -> Self {
        LuaArg::Unsigned(value as u64)
    }
}

impl From<&[u8]> for LuaArg {
    fn from(value: &[u8]) -> Self {
        LuaArg::Buffer(value.to_vec())
    }
}

impl From<Vec<u8>> for LuaArg {
    fn from(value: Vec<u8>) -> Self {
        LuaArg::Buffer(value)
    }
}

/// Typed projection of a decoded result
pub trait FromLua: Sized {
    fn from_lua(value: LuaValue) -> Result<Self>;
}

fn mismatch(expected: &str, got: &LuaValue) -> LuaCallError {
    LuaCallError::Marshalling(format!("expected {}, got {}", expected, got.type_name()))
}

impl FromLua for LuaValue {
    fn from_lua(value: LuaValue) -> Result<Self> {
        Ok(value)
    }
}

impl FromLua for () {
    fn from_lua(_: LuaValue) -> Result<Self> {
        Ok(())
    }
}

impl FromLua for bool {
    fn from_lua(value: LuaValue) -> Result<Self> {
        match value {
            LuaValue::Bool(b) => Ok(b),
            other => Err(mismatch("boolean", &other)),
        }
    }
}

impl FromLua for i64 {
    fn from_lua(value: LuaValue) -> Result<Self> {
        value.as_int().ok_or_else(|| mismatch("integer", &value))
    }
}

macro_rules! from_lua_narrow {
    ($($ty:ty),*) => {
        $(
            impl FromLua for $ty {
                fn from_lua(value: LuaValue) -> Result<Self> {
                    let n = i64::from_lua(value)?;
                    <$ty>::try_from(n).map_err(|_| {
                        LuaCallError::Marshalling(format!(
                            "integer {} out of range for {}",
                            n,
                            stringify!($ty)
                        ))
                    })
                }
            }
        )*
    };
}

from_lua_narrow!(i8, i16, i32, u8, u16, u32, usize);

impl FromLua for u64 {
    /// Addresses come back as the VM's signed integer; the bit pattern is
    /// reinterpreted so high user-space and kernel addresses survive.
    fn from_lua(value: LuaValue) -> Result<Self> {
        match value {
            LuaValue::Int(n) => Ok(n as u64),
            LuaValue::Text(ref s) => parse_address_text(s),
            other => other
                .as_int()
                .map(|n| n as u64)
                .ok_or_else(|| mismatch("address", &other)),
        }
    }
}

impl FromLua for f64 {
    fn from_lua(value: LuaValue) -> Result<Self> {
        match value {
            LuaValue::Float(n) => Ok(n),
            LuaValue::Int(n) => Ok(n as f64),
            other => Err(mismatch("number", &other)),
        }
    }
}

impl FromLua for f32 {
    fn from_lua(value: LuaValue) -> Result<Self> {
        f64::from_lua(value).map(|n| n as f32)
    }
}

impl FromLua for String {
    fn from_lua(value: LuaValue) -> Result<Self> {
        match value {
            LuaValue::Text(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl FromLua for HostHandle {
    fn from_lua(value: LuaValue) -> Result<Self> {
        match value {
            LuaValue::Handle(h) if !h.is_null() => Ok(h),
            other => Err(mismatch("host object", &other)),
        }
    }
}

impl<T: FromLua> FromLua for Option<T> {
    fn from_lua(value: LuaValue) -> Result<Self> {
        match value {
            LuaValue::Nil => Ok(None),
            other => T::from_lua(other).map(Some),
        }
    }
}

impl<T: FromLua> FromLua for Vec<T> {
    fn from_lua(value: LuaValue) -> Result<Self> {
        match value {
            LuaValue::List(items) => items.into_iter().map(T::from_lua).collect(),
            LuaValue::Truncated => Err(LuaCallError::Marshalling(
                "result exceeded the table decode limits".to_string(),
            )),
            other => Err(mismatch("list", &other)),
        }
    }
}

/// Parse an address the host rendered as text (`"7FF6A0001000"`, `"0x1000"`)
pub fn parse_address_text(text: &str) -> Result<u64> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .or_else(|| trimmed.strip_prefix('$'))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(LuaCallError::Marshalling(format!("malformed address {:?}", text)));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|_| LuaCallError::Marshalling(format!("malformed address {:?}", text)))
}
