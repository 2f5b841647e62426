//! celua library
//!
//! Typed access to Cheat Engine's embedded Lua engine for native plugins.
//! Calls go through [`lua::InterpreterSession`], which pushes arguments,
//! invokes a host global under a protected call and decodes the results.
//! The [`facade`] views turn that into one method per host capability.

pub mod config;
pub mod error;
pub mod facade;
pub mod logging;
pub mod lua;
pub mod plugin;

// Re-export commonly used types
pub use config::{LogConfig, PluginConfig};
pub use error::{
    AssemblyError, DebugError, DisassemblyError, DomainError, LuaCallError, MemoryError, ProcessError, RecordError,
    ScanError, SymbolError,
};
pub use lua::{
    Address, Args, Capability, DecodeLimits, HostHandle, HostLua, InterpreterLock, InterpreterSession, LuaStack,
    LuaValue, Returns, SimLua,
};
pub use plugin::{Plugin, PluginError, PluginHost, PluginRuntime};

#[doc(hidden)]
pub use lazy_static::lazy_static as __lazy_static;
