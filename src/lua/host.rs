//! [`LuaStack`] over the host's real `lua_State`

use std::ffi::{c_void, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::lua::ffi::{lua_State, LuaApi};
use crate::lua::stack::{CallStatus, HostHandle, LuaStack, SlotType};

/// Host callback that boxes an object pointer as a class instance userdata
pub type PushInstanceFn = unsafe extern "system" fn(state: *mut lua_State, instance: *mut c_void);

/// The host interpreter's stack.
///
/// Holds the raw state pointer handed out by the host plus the function
/// table used to drive it. The host owns the state; dropping a `HostLua`
/// does nothing.
#[derive(Debug)]
pub struct HostLua {
    api: LuaApi,
    state: *mut lua_State,
    push_instance: Option<PushInstanceFn>,
}

// The state is only ever touched by one caller at a time: either the host's
// main thread, or a thread holding an `InterpreterLock`.
unsafe impl Send for HostLua {}

impl HostLua {
    /// Wrap a state pointer obtained from the host.
    ///
    /// # Safety
    ///
    /// `state` must be a live Lua 5.3 state that outlives the returned value,
    /// and `api` must drive that same runtime.
    pub unsafe fn from_raw(api: LuaApi, state: *mut lua_State) -> Self {
        HostLua {
            api,
            state,
            push_instance: None,
        }
    }

    /// Use the host's class-instance boxing for [`LuaStack::push_handle`]
    pub fn with_instance_pusher(mut self, push_instance: Option<PushInstanceFn>) -> Self {
        self.push_instance = push_instance;
        self
    }

    /// Raw state pointer
    pub fn as_ptr(&self) -> *mut lua_State {
        self.state
    }
}

impl LuaStack for HostLua {
    fn top(&self) -> i32 {
        unsafe { (self.api.gettop)(self.state) }
    }

    fn set_top(&mut self, top: i32) {
        unsafe { (self.api.settop)(self.state, top) }
    }

    fn check_stack(&mut self, extra: i32) -> bool {
        unsafe { (self.api.checkstack)(self.state, extra) != 0 }
    }

    fn abs_index(&self, idx: i32) -> i32 {
        unsafe { (self.api.absindex)(self.state, idx) }
    }

    fn get_global(&mut self, name: &str) -> SlotType {
        match CString::new(name) {
            Ok(name) => SlotType::from_raw(unsafe { (self.api.getglobal)(self.state, name.as_ptr()) }),
            Err(_) => {
                // Interior NUL: no global can have this name
                self.push_nil();
                SlotType::Nil
            }
        }
    }

    fn push_nil(&mut self) {
        unsafe { (self.api.pushnil)(self.state) }
    }

    fn push_boolean(&mut self, value: bool) {
        unsafe { (self.api.pushboolean)(self.state, value as i32) }
    }

    fn push_integer(&mut self, value: i64) {
        unsafe { (self.api.pushinteger)(self.state, value) }
    }

    fn push_number(&mut self, value: f64) {
        unsafe { (self.api.pushnumber)(self.state, value) }
    }

    fn push_bytes(&mut self, value: &[u8]) {
        unsafe {
            (self.api.pushlstring)(self.state, value.as_ptr() as *const c_char, value.len());
        }
    }

    fn push_handle(&mut self, handle: HostHandle) {
        let ptr = handle.as_usize() as *mut c_void;
        match self.push_instance {
            Some(push_instance) => unsafe { push_instance(self.state, ptr) },
            None => unsafe { (self.api.pushlightuserdata)(self.state, ptr) },
        }
    }

    fn push_value(&mut self, idx: i32) {
        unsafe { (self.api.pushvalue)(self.state, idx) }
    }

    fn create_table(&mut self, array_hint: i32, record_hint: i32) {
        unsafe { (self.api.createtable)(self.state, array_hint, record_hint) }
    }

    fn raw_set_index(&mut self, table: i32, n: i64) {
        unsafe { (self.api.rawseti)(self.state, table, n) }
    }

    fn slot_type(&self, idx: i32) -> SlotType {
        SlotType::from_raw(unsafe { (self.api.type_)(self.state, idx) })
    }

    fn is_integer(&self, idx: i32) -> bool {
        unsafe { (self.api.isinteger)(self.state, idx) != 0 }
    }

    fn to_boolean(&self, idx: i32) -> bool {
        unsafe { (self.api.toboolean)(self.state, idx) != 0 }
    }

    fn to_integer(&self, idx: i32) -> Option<i64> {
        let mut isnum = 0;
        let value = unsafe { (self.api.tointegerx)(self.state, idx, &mut isnum) };
        (isnum != 0).then_some(value)
    }

    fn to_number(&self, idx: i32) -> Option<f64> {
        let mut isnum = 0;
        let value = unsafe { (self.api.tonumberx)(self.state, idx, &mut isnum) };
        (isnum != 0).then_some(value)
    }

    fn to_bytes(&self, idx: i32) -> Option<Vec<u8>> {
        let mut len = 0usize;
        let data = unsafe { (self.api.tolstring)(self.state, idx, &mut len) };
        if data.is_null() {
            return None;
        }
        let bytes = unsafe { std::slice::from_raw_parts(data as *const u8, len) };
        Some(bytes.to_vec())
    }

    fn to_handle(&self, idx: i32) -> Option<HostHandle> {
        match self.slot_type(idx) {
            SlotType::LightUserdata => {
                let ptr = unsafe { (self.api.touserdata)(self.state, idx) };
                Some(HostHandle(ptr as usize))
            }
            SlotType::Userdata => {
                // Class instances are boxed as a userdata block whose first
                // field is the object pointer
                let block = unsafe { (self.api.touserdata)(self.state, idx) } as *const *mut c_void;
                if block.is_null() {
                    return None;
                }
                let ptr = unsafe { ptr::read(block) };
                Some(HostHandle(ptr as usize))
            }
            _ => None,
        }
    }

    fn next(&mut self, table: i32) -> bool {
        unsafe { (self.api.next)(self.state, table) != 0 }
    }

    fn pcall(&mut self, nargs: i32, nresults: i32) -> CallStatus {
        let status = unsafe { (self.api.pcallk)(self.state, nargs, nresults, 0, 0, None) };
        CallStatus::from_raw(status)
    }
}
