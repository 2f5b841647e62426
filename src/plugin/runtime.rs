//! Host-facing lifecycle of one plugin
//!
//! The host calls through raw `extern "system"` pointers, so nothing here may
//! unwind into it. Every callback runs under `catch_unwind` and reports
//! failure as `FALSE` after logging the cause.

use std::any::Any;
use std::ffi::CString;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{error, info};

use crate::logging;
use crate::plugin::abi::{
    DisablePluginFn, EnablePluginFn, ExportedFunctions, GetVersionFn, PluginInfo, PluginVersion, TableError,
    PLUGIN_SDK_VERSION,
};
use crate::plugin::{Plugin, PluginError, PluginHost};

/// A plugin plus the host state it was enabled with
pub struct PluginRuntime<P: Plugin> {
    plugin: Mutex<P>,
    host: Mutex<Option<PluginHost>>,
    name: CString,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

impl<P: Plugin> PluginRuntime<P> {
    pub fn new(plugin: P) -> Self {
        let name = plugin.name().replace('\0', "");
        PluginRuntime {
            name: CString::new(name).unwrap_or_default(),
            plugin: Mutex::new(plugin),
            host: Mutex::new(None),
        }
    }

    /// NUL-terminated plugin name, valid for the runtime's lifetime
    pub fn name(&self) -> &CString {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.host).is_some()
    }

    /// Run `f` with the plugin and its host while enabled.
    ///
    /// Locks `host` before `plugin`; nothing else holds both at once.
    pub fn with_plugin<R>(&self, f: impl FnOnce(&mut P, &PluginHost) -> R) -> Option<R> {
        let host = lock(&self.host);
        let host = host.as_ref()?;
        let mut plugin = lock(&self.plugin);
        Some(f(&mut plugin, host))
    }

    /// Fill the host's buffer for the exported initialization function
    ///
    /// # Safety
    ///
    /// `destination` must be null or point to writable memory for a
    /// [`PluginInfo`].
    pub unsafe fn write_info(
        &self,
        destination: *mut PluginInfo,
        get_version: GetVersionFn,
        enable: EnablePluginFn,
        disable: DisablePluginFn,
    ) -> bool {
        if destination.is_null() {
            return false;
        }
        ptr::write_unaligned(
            destination,
            PluginInfo {
                name: self.name.as_ptr(),
                get_version,
                enable,
                disable,
                version: PLUGIN_SDK_VERSION,
            },
        );
        true
    }

    /// `GetVersion` callback
    ///
    /// # Safety
    ///
    /// `version` must be null or point to `size` writable bytes.
    pub unsafe fn get_version(&self, version: *mut PluginVersion, size: i32) -> bool {
        if version.is_null() || size < mem::size_of::<PluginVersion>() as i32 {
            return false;
        }
        ptr::write_unaligned(
            version,
            PluginVersion {
                version: PLUGIN_SDK_VERSION as u32,
                name: self.name.as_ptr(),
            },
        );
        true
    }

    /// `EnablePlugin` callback
    ///
    /// # Safety
    ///
    /// `functions` must be null or point to a host function table whose
    /// leading `size` field tells how many bytes are readable.
    pub unsafe fn enable(&self, functions: *const ExportedFunctions, plugin_id: i32) -> bool {
        if functions.is_null() {
            error!("EnablePlugin called without a function table");
            return false;
        }
        // Older hosts hand out shorter tables; check before reading the rest
        let size = ptr::read_unaligned(functions as *const i32);
        if size < ExportedFunctions::EXPECTED_SIZE {
            error!(
                "EnablePlugin failed: {}",
                TableError::TooSmall {
                    got: size,
                    expected: ExportedFunctions::EXPECTED_SIZE
                }
            );
            return false;
        }
        let table = ptr::read_unaligned(functions);
        self.guard("EnablePlugin", || self.enable_with(table, plugin_id))
    }

    /// Enable from an already copied function table
    pub fn enable_with(&self, functions: ExportedFunctions, plugin_id: i32) -> Result<(), PluginError> {
        functions.validate()?;
        let host = {
            let mut plugin = lock(&self.plugin);
            let config = plugin.config()?;
            logging::init(plugin.name(), &config.log)?;

            let host = PluginHost::new(functions, plugin_id, config);
            plugin.enable(&host)?;
            info!("{} enabled as plugin {}", plugin.name(), plugin_id);
            host
        };
        // `plugin` is released first: `with_plugin` nests `host` then `plugin`
        *lock(&self.host) = Some(host);
        Ok(())
    }

    /// `DisablePlugin` callback. Disabling a plugin that is not enabled
    /// succeeds without calling it.
    pub fn disable(&self) -> bool {
        self.guard("DisablePlugin", || {
            let host = lock(&self.host).take();
            let Some(host) = host else {
                return Ok(());
            };
            let mut plugin = lock(&self.plugin);
            plugin.disable()?;
            info!("{} disabled (plugin {})", plugin.name(), host.plugin_id());
            Ok(())
        })
    }

    fn guard(&self, callback: &str, f: impl FnOnce() -> Result<(), PluginError>) -> bool {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("{} failed for {:?}: {}", callback, self.name, e);
                false
            }
            Err(payload) => {
                error!(
                    "{} panicked for {:?}: {}",
                    callback,
                    self.name,
                    panic_message(payload.as_ref())
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginConfig;
    use crate::lua::ffi::{lua_CFunction, lua_State};
    use std::ffi::CStr;
    use std::os::raw::c_char;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    unsafe extern "system" fn fake_state() -> *mut lua_State {
        0x1000 as *mut lua_State
    }

    unsafe extern "system" fn ignore_register(_: *mut lua_State, _: *const c_char, _: lua_CFunction) {}

    unsafe extern "system" fn version_stub(_: *mut PluginVersion, _: i32) -> i32 {
        1
    }

    unsafe extern "system" fn enable_stub(_: *const ExportedFunctions, _: i32) -> i32 {
        1
    }

    unsafe extern "system" fn disable_stub() -> i32 {
        1
    }

    fn table() -> ExportedFunctions {
        ExportedFunctions {
            size: ExportedFunctions::EXPECTED_SIZE,
            get_lua_state: Some(fake_state),
            lua_register: Some(ignore_register),
            lua_push_class_instance: None,
            process_messages: None,
            check_synchronize: None,
        }
    }

    #[derive(Default)]
    struct Counting {
        enabled: Arc<AtomicUsize>,
        disabled: Arc<AtomicUsize>,
        panic_on_enable: bool,
        log_dir: Option<std::path::PathBuf>,
    }

    impl Plugin for Counting {
        fn name(&self) -> &str {
            "Counting Plugin"
        }

        fn config(&self) -> Result<PluginConfig, PluginError> {
            let mut config = PluginConfig::default();
            config.log.file = self.log_dir.as_ref().map(|d| d.join("counting.log"));
            Ok(config)
        }

        fn enable(&mut self, host: &PluginHost) -> Result<(), PluginError> {
            if self.panic_on_enable {
                panic!("enable exploded");
            }
            host.lua_state()?;
            self.enabled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn disable(&mut self) -> Result<(), PluginError> {
            self.disabled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counting(log_dir: &tempfile::TempDir) -> Counting {
        Counting {
            log_dir: Some(log_dir.path().to_path_buf()),
            ..Counting::default()
        }
    }

    #[test]
    fn test_write_info() {
        let runtime = PluginRuntime::new(Counting::default());
        let mut info = mem::MaybeUninit::<PluginInfo>::uninit();

        unsafe {
            assert!(runtime.write_info(info.as_mut_ptr(), version_stub, enable_stub, disable_stub));
            let info = info.assume_init();
            assert_eq!(info.version, PLUGIN_SDK_VERSION);
            assert_eq!(CStr::from_ptr(info.name).to_str(), Ok("Counting Plugin"));
            assert!(!runtime.write_info(ptr::null_mut(), version_stub, enable_stub, disable_stub));
        }
    }

    #[test]
    fn test_get_version() {
        let runtime = PluginRuntime::new(Counting::default());
        let mut version = PluginVersion {
            version: 0,
            name: ptr::null(),
        };
        let size = mem::size_of::<PluginVersion>() as i32;

        unsafe {
            assert!(runtime.get_version(&mut version, size));
            assert!(!runtime.get_version(&mut version, size - 1));
            assert!(!runtime.get_version(ptr::null_mut(), size));
        }
        assert_eq!(version.version, PLUGIN_SDK_VERSION as u32);
        assert_eq!(version.name, runtime.name().as_ptr());
    }

    #[test]
    fn test_enable_disable_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = counting(&dir);
        let (enabled, disabled) = (plugin.enabled.clone(), plugin.disabled.clone());
        let runtime = PluginRuntime::new(plugin);
        let functions = table();

        assert!(unsafe { runtime.enable(&functions, 3) });
        assert!(runtime.is_enabled());
        assert_eq!(runtime.with_plugin(|_, host| host.plugin_id()), Some(3));

        assert!(runtime.disable());
        assert!(!runtime.is_enabled());
        // Second disable is a no-op
        assert!(runtime.disable());
        assert_eq!(enabled.load(Ordering::SeqCst), 1);
        assert_eq!(disabled.load(Ordering::SeqCst), 1);
        assert!(logging::log_file().is_some());
    }

    #[test]
    fn test_short_table_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = PluginRuntime::new(counting(&dir));
        let functions = ExportedFunctions { size: 4, ..table() };

        assert!(!unsafe { runtime.enable(&functions, 1) });
        assert!(!unsafe { runtime.enable(ptr::null(), 1) });
        assert!(!runtime.is_enabled());
    }

    #[test]
    fn test_panic_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = Counting {
            panic_on_enable: true,
            ..counting(&dir)
        };
        let runtime = PluginRuntime::new(plugin);

        assert!(!unsafe { runtime.enable(&table(), 1) });
        assert!(!runtime.is_enabled());
        // The runtime is still usable after the panic
        assert!(runtime.disable());
    }

    /// Blocks in `config` until released, so enabling can be held open
    struct Gated {
        entered: Mutex<mpsc::Sender<()>>,
        gate: Mutex<mpsc::Receiver<()>>,
        log_dir: std::path::PathBuf,
    }

    impl Plugin for Gated {
        fn name(&self) -> &str {
            "Gated Plugin"
        }

        fn config(&self) -> Result<PluginConfig, PluginError> {
            let _ = lock(&self.entered).send(());
            let _ = lock(&self.gate).recv();
            let mut config = PluginConfig::default();
            config.log.file = Some(self.log_dir.join("gated.log"));
            Ok(config)
        }

        fn enable(&mut self, _: &PluginHost) -> Result<(), PluginError> {
            Ok(())
        }
    }

    #[test]
    fn test_reenable_while_plugin_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let (entered_tx, entered_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel();
        let runtime = Arc::new(PluginRuntime::new(Gated {
            entered: Mutex::new(entered_tx),
            gate: Mutex::new(gate_rx),
            log_dir: dir.path().to_path_buf(),
        }));

        gate_tx.send(()).unwrap();
        runtime.enable_with(table(), 1).unwrap();
        entered_rx.recv().unwrap();

        // The host re-enables while `config` holds the plugin lock
        let enabling = {
            let runtime = runtime.clone();
            thread::spawn(move || runtime.enable_with(table(), 2))
        };
        entered_rx.recv().unwrap();

        // Meanwhile another thread takes `host` and waits for `plugin`
        let (done_tx, done_rx) = mpsc::channel();
        let user = {
            let runtime = runtime.clone();
            thread::spawn(move || {
                let id = runtime.with_plugin(|_, host| host.plugin_id());
                let _ = done_tx.send(id);
            })
        };
        thread::sleep(Duration::from_millis(50));
        gate_tx.send(()).unwrap();

        let id = done_rx.recv_timeout(Duration::from_secs(5)).expect("with_plugin deadlocked");
        assert!(id.is_some());
        user.join().unwrap();
        enabling.join().unwrap().unwrap();
        assert_eq!(runtime.with_plugin(|_, host| host.plugin_id()), Some(2));
    }
}
