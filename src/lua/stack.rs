//! The interpreter stack seam
//!
//! Everything above this module talks to the host's Lua state only through
//! [`LuaStack`]. The production implementation is [`HostLua`](crate::lua::host::HostLua),
//! which forwards to the Lua 5.3 C API; tests use
//! [`SimLua`](crate::lua::simulated::SimLua).
//!
//! Indices follow the C API: positive indices count from the bottom of the
//! current frame (1-based), negative indices count down from the top.

use std::fmt;

use crate::lua::ffi;

/// Pointer-sized identifier of a host-owned object (memscan, found list,
/// memory record, ...). The wrapper never owns what it points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostHandle(pub usize);

impl HostHandle {
    /// Raw pointer value
    pub fn as_usize(self) -> usize {
        self.0
    }

    /// Whether this is the null object
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for HostHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Type tag of a stack slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotType {
    /// Not a valid index
    None,
    Nil,
    Boolean,
    LightUserdata,
    Number,
    String,
    Table,
    Function,
    Userdata,
    Thread,
}

impl SlotType {
    /// Map a raw `lua_type` result
    pub fn from_raw(tag: i32) -> Self {
        match tag {
            ffi::LUA_TNIL => SlotType::Nil,
            ffi::LUA_TBOOLEAN => SlotType::Boolean,
            ffi::LUA_TLIGHTUSERDATA => SlotType::LightUserdata,
            ffi::LUA_TNUMBER => SlotType::Number,
            ffi::LUA_TSTRING => SlotType::String,
            ffi::LUA_TTABLE => SlotType::Table,
            ffi::LUA_TFUNCTION => SlotType::Function,
            ffi::LUA_TUSERDATA => SlotType::Userdata,
            ffi::LUA_TTHREAD => SlotType::Thread,
            _ => SlotType::None,
        }
    }

    /// Lua's own name for the type
    pub fn name(self) -> &'static str {
        match self {
            SlotType::None => "no value",
            SlotType::Nil => "nil",
            SlotType::Boolean => "boolean",
            SlotType::LightUserdata | SlotType::Userdata => "userdata",
            SlotType::Number => "number",
            SlotType::String => "string",
            SlotType::Table => "table",
            SlotType::Function => "function",
            SlotType::Thread => "thread",
        }
    }

    /// Nil or an invalid index
    pub fn is_none_or_nil(self) -> bool {
        matches!(self, SlotType::None | SlotType::Nil)
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a protected call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Ok,
    /// Runtime error raised by the callee
    Runtime,
    /// Memory allocation failure
    Memory,
    /// Error while running a `__gc` metamethod
    GcMetamethod,
    /// Error while running the message handler
    Handler,
    /// Any status the wrapper does not know about
    Other(i32),
}

impl CallStatus {
    /// Map a raw `lua_pcall` result
    pub fn from_raw(status: i32) -> Self {
        match status {
            ffi::LUA_OK => CallStatus::Ok,
            ffi::LUA_ERRRUN => CallStatus::Runtime,
            ffi::LUA_ERRMEM => CallStatus::Memory,
            ffi::LUA_ERRGCMM => CallStatus::GcMetamethod,
            ffi::LUA_ERRERR => CallStatus::Handler,
            other => CallStatus::Other(other),
        }
    }

    /// Whether the call completed normally
    pub fn is_ok(self) -> bool {
        self == CallStatus::Ok
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Ok => write!(f, "ok"),
            CallStatus::Runtime => write!(f, "runtime error"),
            CallStatus::Memory => write!(f, "memory error"),
            CallStatus::GcMetamethod => write!(f, "error in __gc metamethod"),
            CallStatus::Handler => write!(f, "error in message handler"),
            CallStatus::Other(code) => write!(f, "status {}", code),
        }
    }
}

/// Result count requested from a protected call; mirrors `LUA_MULTRET`
pub const MULTRET: i32 = ffi::LUA_MULTRET;

/// Operand stack of a Lua state.
///
/// Implementations must behave like the Lua 5.3 C API functions named in each
/// method's documentation. None of these methods may unwind across the
/// interpreter boundary; errors raised by the callee surface only through
/// [`LuaStack::pcall`].
pub trait LuaStack {
    /// `lua_gettop`
    fn top(&self) -> i32;

    /// `lua_settop`; also used to pop (`set_top(top - n)`)
    fn set_top(&mut self, top: i32);

    /// `lua_checkstack`
    fn check_stack(&mut self, extra: i32) -> bool;

    /// `lua_absindex`
    fn abs_index(&self, idx: i32) -> i32 {
        if idx > 0 || idx <= ffi::LUA_REGISTRYINDEX {
            idx
        } else {
            self.top() + idx + 1
        }
    }

    /// `lua_getglobal`: pushes the global and returns its type
    fn get_global(&mut self, name: &str) -> SlotType;

    /// `lua_pushnil`
    fn push_nil(&mut self);

    /// `lua_pushboolean`
    fn push_boolean(&mut self, value: bool);

    /// `lua_pushinteger`
    fn push_integer(&mut self, value: i64);

    /// `lua_pushnumber`
    fn push_number(&mut self, value: f64);

    /// `lua_pushlstring`
    fn push_bytes(&mut self, value: &[u8]);

    /// Box a host object the way the host's own API would
    fn push_handle(&mut self, handle: HostHandle);

    /// `lua_pushvalue`
    fn push_value(&mut self, idx: i32);

    /// `lua_createtable`
    fn create_table(&mut self, array_hint: i32, record_hint: i32);

    /// `lua_rawseti`: `t[n] = v` where `v` is popped from the top
    fn raw_set_index(&mut self, table: i32, n: i64);

    /// `lua_type`
    fn slot_type(&self, idx: i32) -> SlotType;

    /// `lua_isinteger`
    fn is_integer(&self, idx: i32) -> bool;

    /// `lua_toboolean`
    fn to_boolean(&self, idx: i32) -> bool;

    /// `lua_tointegerx`
    fn to_integer(&self, idx: i32) -> Option<i64>;

    /// `lua_tonumberx`
    fn to_number(&self, idx: i32) -> Option<f64>;

    /// `lua_tolstring`, copied out. Only called on string slots so the
    /// in-place number conversion of the C API never happens.
    fn to_bytes(&self, idx: i32) -> Option<Vec<u8>>;

    /// Unbox a host object or light userdata
    fn to_handle(&self, idx: i32) -> Option<HostHandle>;

    /// `lua_next`: pops a key, pushes the next key/value pair
    fn next(&mut self, table: i32) -> bool;

    /// `lua_pcall` with no message handler
    fn pcall(&mut self, nargs: i32, nresults: i32) -> CallStatus;
}
