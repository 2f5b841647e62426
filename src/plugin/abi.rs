//! Structures exchanged with the host across the plugin boundary
//!
//! Layouts and calling conventions are fixed by the host. Every callback is
//! `stdcall` on 32-bit Windows, which is what `extern "system"` selects.

use std::ffi::c_void;
use std::mem;
use std::os::raw::c_char;

use crate::lua::ffi::{lua_CFunction, lua_State};

/// Plugin interface version written into [`PluginInfo`]
pub const PLUGIN_SDK_VERSION: i32 = 6;

pub type GetLuaStateFn = unsafe extern "system" fn() -> *mut lua_State;
pub type LuaRegisterFn = unsafe extern "system" fn(state: *mut lua_State, name: *const c_char, function: lua_CFunction);
pub type LuaPushClassInstanceFn = unsafe extern "system" fn(state: *mut lua_State, instance: *mut c_void);
pub type ProcessMessagesFn = unsafe extern "system" fn();
pub type CheckSynchronizeFn = unsafe extern "system" fn(timeout_ms: i32) -> i32;

pub type GetVersionFn = unsafe extern "system" fn(version: *mut PluginVersion, size: i32) -> i32;
pub type EnablePluginFn = unsafe extern "system" fn(functions: *const ExportedFunctions, plugin_id: i32) -> i32;
pub type DisablePluginFn = unsafe extern "system" fn() -> i32;

/// Function table the host passes to `EnablePlugin`.
///
/// The host may append fields in later versions; `size` is the size of the
/// table it actually filled in.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ExportedFunctions {
    pub size: i32,
    pub get_lua_state: Option<GetLuaStateFn>,
    pub lua_register: Option<LuaRegisterFn>,
    pub lua_push_class_instance: Option<LuaPushClassInstanceFn>,
    pub process_messages: Option<ProcessMessagesFn>,
    pub check_synchronize: Option<CheckSynchronizeFn>,
}

/// What is wrong with a host's function table
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("function table is {got} bytes, expected at least {expected}")]
    TooSmall { got: i32, expected: i32 },

    #[error("function table lacks {0}")]
    Missing(&'static str),
}

impl ExportedFunctions {
    /// Size this crate expects the host to fill in
    pub const EXPECTED_SIZE: i32 = mem::size_of::<ExportedFunctions>() as i32;

    /// Check the size field and the pointers every plugin needs
    pub fn validate(&self) -> Result<(), TableError> {
        if self.size < Self::EXPECTED_SIZE {
            return Err(TableError::TooSmall {
                got: self.size,
                expected: Self::EXPECTED_SIZE,
            });
        }
        if self.get_lua_state.is_none() {
            return Err(TableError::Missing("GetLuaState"));
        }
        if self.lua_register.is_none() {
            return Err(TableError::Missing("LuaRegister"));
        }
        Ok(())
    }
}

/// Answer to the host's `GetVersion`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PluginVersion {
    pub version: u32,
    /// NUL-terminated display name, owned by the plugin
    pub name: *const c_char,
}

/// Written by the exported initialization function into the host's buffer
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PluginInfo {
    pub name: *const c_char,
    pub get_version: GetVersionFn,
    pub enable: EnablePluginFn,
    pub disable: DisablePluginFn,
    pub version: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "system" fn no_state() -> *mut lua_State {
        std::ptr::null_mut()
    }

    unsafe extern "system" fn no_register(_: *mut lua_State, _: *const c_char, _: lua_CFunction) {}

    fn table() -> ExportedFunctions {
        ExportedFunctions {
            size: ExportedFunctions::EXPECTED_SIZE,
            get_lua_state: Some(no_state),
            lua_register: Some(no_register),
            lua_push_class_instance: None,
            process_messages: None,
            check_synchronize: None,
        }
    }

    #[test]
    fn test_layout() {
        let ptr = mem::size_of::<usize>();
        // size field padded to pointer alignment, then five pointers
        assert_eq!(mem::size_of::<ExportedFunctions>(), ptr * 6);
        assert_eq!(mem::size_of::<Option<GetLuaStateFn>>(), ptr);
    }

    #[test]
    fn test_validate() {
        assert_eq!(table().validate(), Ok(()));

        let small = ExportedFunctions { size: 8, ..table() };
        assert!(matches!(small.validate(), Err(TableError::TooSmall { got: 8, .. })));

        let missing = ExportedFunctions {
            lua_register: None,
            ..table()
        };
        assert_eq!(missing.validate(), Err(TableError::Missing("LuaRegister")));
    }
}
