//! Cheat Engine plugin boundary
//!
//! A plugin implements [`Plugin`] and exports itself with
//! [`declare_plugin!`](crate::declare_plugin) (feature `host`):
//!
//! ```ignore
//! struct SpeedHack;
//!
//! impl celua::Plugin for SpeedHack {
//!     fn name(&self) -> &str {
//!         "Speed Hack"
//!     }
//!
//!     fn enable(&mut self, host: &celua::PluginHost) -> Result<(), celua::PluginError> {
//!         let session = host.session(celua::lua::ffi::LuaApi::linked())?;
//!         log::info!("attached to pid {}", session.process().opened_pid()?);
//!         Ok(())
//!     }
//! }
//!
//! celua::declare_plugin!(SpeedHack, SpeedHack);
//! ```

pub mod abi;
pub mod runtime;

pub use abi::{ExportedFunctions, PluginInfo, PluginVersion, TableError, PLUGIN_SDK_VERSION};
pub use runtime::PluginRuntime;

use std::ffi::CString;
use std::time::Duration;

use crate::config::{ConfigParseError, PluginConfig};
use crate::error::LuaCallError;
use crate::logging::LoggingError;
use crate::lua::ffi::{lua_CFunction, lua_State, LuaApi};
use crate::lua::host::HostLua;
use crate::lua::session::InterpreterSession;

/// Failure at the plugin boundary
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("incompatible host: {0}")]
    IncompatibleHost(#[from] TableError),

    #[error("host has no Lua state")]
    MissingInterpreter,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigParseError),

    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),

    /// A facade call made by the plugin failed
    #[error("{family}: {operation}: {source}")]
    Call {
        family: &'static str,
        operation: &'static str,
        #[source]
        source: LuaCallError,
    },

    #[error("{0}")]
    Plugin(String),
}

impl PluginError {
    /// Plugin-defined failure
    pub fn plugin(message: impl Into<String>) -> Self {
        PluginError::Plugin(message.into())
    }

    /// The interpreter-level failure behind a facade error, if any
    pub fn call_error(&self) -> Option<&LuaCallError> {
        match self {
            PluginError::Call { source, .. } => Some(source),
            _ => None,
        }
    }
}

macro_rules! plugin_error_from_domain {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for PluginError {
                fn from(err: $ty) -> Self {
                    PluginError::Call {
                        family: <$ty>::FAMILY,
                        operation: err.operation,
                        source: err.source,
                    }
                }
            }
        )*
    };
}

plugin_error_from_domain!(
    crate::error::MemoryError,
    crate::error::ProcessError,
    crate::error::SymbolError,
    crate::error::DisassemblyError,
    crate::error::AssemblyError,
    crate::error::ScanError,
    crate::error::DebugError,
    crate::error::RecordError
);

/// A native plugin driven by the host
pub trait Plugin: Send + 'static {
    /// Display name shown in the host's plugin list
    fn name(&self) -> &str;

    /// Configuration applied before [`Plugin::enable`]
    fn config(&self) -> Result<PluginConfig, PluginError> {
        Ok(PluginConfig::default())
    }

    /// Called when the user enables the plugin
    fn enable(&mut self, host: &PluginHost) -> Result<(), PluginError>;

    /// Called when the user disables the plugin or the host exits
    fn disable(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// The host as seen from an enabled plugin
#[derive(Debug, Clone)]
pub struct PluginHost {
    functions: ExportedFunctions,
    plugin_id: i32,
    config: PluginConfig,
}

impl PluginHost {
    /// Wrap a function table that already passed
    /// [`ExportedFunctions::validate`]
    pub fn new(functions: ExportedFunctions, plugin_id: i32, config: PluginConfig) -> Self {
        PluginHost {
            functions,
            plugin_id,
            config,
        }
    }

    /// Id the host assigned to this plugin
    pub fn plugin_id(&self) -> i32 {
        self.plugin_id
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn functions(&self) -> &ExportedFunctions {
        &self.functions
    }

    /// The host's main Lua state
    pub fn lua_state(&self) -> Result<*mut lua_State, PluginError> {
        let get_lua_state = self
            .functions
            .get_lua_state
            .ok_or(PluginError::IncompatibleHost(TableError::Missing("GetLuaState")))?;
        let state = unsafe { get_lua_state() };
        if state.is_null() {
            return Err(PluginError::MissingInterpreter);
        }
        Ok(state)
    }

    /// Session over the host's main Lua state.
    ///
    /// Only use it on the thread the host called the plugin on, or behind an
    /// [`InterpreterLock`](crate::lua::InterpreterLock).
    pub fn session(&self, api: LuaApi) -> Result<InterpreterSession<HostLua>, PluginError> {
        let state = self.lua_state()?;
        // The host keeps its main state alive for as long as plugins are loaded
        let stack = unsafe { HostLua::from_raw(api, state) }
            .with_instance_pusher(self.functions.lua_push_class_instance);
        Ok(InterpreterSession::with_limits(stack, self.config.limits))
    }

    /// Expose a native function to Lua scripts as a global
    pub fn register_function(&self, name: &str, function: lua_CFunction) -> Result<(), PluginError> {
        let register = self
            .functions
            .lua_register
            .ok_or(PluginError::IncompatibleHost(TableError::Missing("LuaRegister")))?;
        let name = CString::new(name)
            .map_err(|_| PluginError::plugin(format!("function name {:?} contains NUL", name)))?;
        let state = self.lua_state()?;
        unsafe { register(state, name.as_ptr(), function) };
        log::debug!("registered Lua function {:?}", name);
        Ok(())
    }

    /// Pump the host's UI message queue; returns false when the host lacks it
    pub fn process_messages(&self) -> bool {
        match self.functions.process_messages {
            Some(process_messages) => {
                unsafe { process_messages() };
                true
            }
            None => false,
        }
    }

    /// Run calls queued for the host's main thread, waiting up to `timeout`.
    /// Returns whether anything ran.
    pub fn check_synchronize(&self, timeout: Duration) -> bool {
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        match self.functions.check_synchronize {
            Some(check_synchronize) => unsafe { check_synchronize(millis) != 0 },
            None => false,
        }
    }
}

/// Export a [`Plugin`] to the host.
///
/// Emits `CEPlugin_Initialize` plus the version, enable and disable callbacks
/// it hands out. `$init` runs once, on first use.
#[cfg(feature = "host")]
#[macro_export]
macro_rules! declare_plugin {
    ($plugin:ty, $init:expr) => {
        $crate::__lazy_static! {
            static ref CELUA_RUNTIME: $crate::plugin::PluginRuntime<$plugin> =
                $crate::plugin::PluginRuntime::new($init);
        }

        unsafe extern "system" fn celua_get_version(
            version: *mut $crate::plugin::PluginVersion,
            size: i32,
        ) -> i32 {
            CELUA_RUNTIME.get_version(version, size) as i32
        }

        unsafe extern "system" fn celua_enable_plugin(
            functions: *const $crate::plugin::ExportedFunctions,
            plugin_id: i32,
        ) -> i32 {
            CELUA_RUNTIME.enable(functions, plugin_id) as i32
        }

        unsafe extern "system" fn celua_disable_plugin() -> i32 {
            CELUA_RUNTIME.disable() as i32
        }

        #[no_mangle]
        pub unsafe extern "system" fn CEPlugin_Initialize(destination: *mut ::std::ffi::c_void) -> i32 {
            CELUA_RUNTIME.write_info(
                destination as *mut $crate::plugin::PluginInfo,
                celua_get_version,
                celua_enable_plugin,
                celua_disable_plugin,
            ) as i32
        }
    };
}
