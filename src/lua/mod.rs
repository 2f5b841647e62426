//! Bridge to Cheat Engine's embedded Lua 5.3 interpreter
//!
//! This module provides the typed call path into the host's scripting
//! surface:
//! - Value marshalling between native types and stack slots
//! - Named invocation under a protected call with stack balance on every path
//! - A closed registry of host capabilities and their argument schemas
//! - Session and lock types that serialize access to the single host state

pub mod capability;
pub mod ffi;
pub mod gil;
pub mod host;
pub mod invoker;
pub mod marshal;
pub mod session;
pub mod simulated;
pub mod stack;
pub mod value;

pub use capability::Capability;
pub use gil::{InterpreterLock, WaitError};
pub use host::HostLua;
pub use invoker::{Args, Returns};
pub use session::{HostObject, InterpreterSession, Ownership};
pub use simulated::{SimLua, SimValue};
pub use stack::{CallStatus, HostHandle, LuaStack, SlotType};
pub use value::{Address, FromLua, LuaArg, LuaValue};

/// Ceilings applied when decoding tables into native values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Maximum entries read from one table (default: 100)
    pub max_table_entries: usize,

    /// Maximum nesting depth; the top-level table is depth 0 (default: 5)
    pub max_table_depth: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        DecodeLimits {
            max_table_entries: 100,
            max_table_depth: 5,
        }
    }
}

impl DecodeLimits {
    /// These limits, raised to read at least `entries` entries per table
    pub fn with_entries(self, entries: usize) -> Self {
        DecodeLimits {
            max_table_entries: self.max_table_entries.max(entries),
            ..self
        }
    }
}
