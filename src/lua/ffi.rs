//! Raw Lua 5.3 C API surface used by the bridge
//!
//! Cheat Engine ships Lua 5.3 as `lua53-64.dll` (`lua53-32.dll` on 32-bit
//! builds). The bridge never calls these symbols directly; it goes through a
//! [`LuaApi`] table of function pointers so the rest of the crate compiles
//! and tests without the host's runtime. With the `host` feature,
//! [`LuaApi::linked`] fills the table from the linked library.

#![allow(non_camel_case_types)]

use std::ffi::c_void;
use std::os::raw::{c_char, c_int};

/// Opaque interpreter state
#[repr(C)]
pub struct lua_State {
    _private: [u8; 0],
}

pub type lua_Integer = i64;
pub type lua_Number = f64;
pub type lua_KContext = isize;
pub type lua_CFunction = unsafe extern "C" fn(state: *mut lua_State) -> c_int;
pub type lua_KFunction =
    unsafe extern "C" fn(state: *mut lua_State, status: c_int, ctx: lua_KContext) -> c_int;

pub const LUA_OK: c_int = 0;
pub const LUA_YIELD: c_int = 1;
pub const LUA_ERRRUN: c_int = 2;
pub const LUA_ERRSYNTAX: c_int = 3;
pub const LUA_ERRMEM: c_int = 4;
pub const LUA_ERRGCMM: c_int = 5;
pub const LUA_ERRERR: c_int = 6;

pub const LUA_TNONE: c_int = -1;
pub const LUA_TNIL: c_int = 0;
pub const LUA_TBOOLEAN: c_int = 1;
pub const LUA_TLIGHTUSERDATA: c_int = 2;
pub const LUA_TNUMBER: c_int = 3;
pub const LUA_TSTRING: c_int = 4;
pub const LUA_TTABLE: c_int = 5;
pub const LUA_TFUNCTION: c_int = 6;
pub const LUA_TUSERDATA: c_int = 7;
pub const LUA_TTHREAD: c_int = 8;

pub const LUA_MULTRET: c_int = -1;
pub const LUAI_MAXSTACK: c_int = 1_000_000;
pub const LUA_REGISTRYINDEX: c_int = -LUAI_MAXSTACK - 1000;
pub const LUA_MINSTACK: c_int = 20;

/// Function table over the subset of the C API the bridge needs
#[derive(Clone, Copy)]
pub struct LuaApi {
    pub gettop: unsafe extern "C" fn(*mut lua_State) -> c_int,
    pub settop: unsafe extern "C" fn(*mut lua_State, c_int),
    pub checkstack: unsafe extern "C" fn(*mut lua_State, c_int) -> c_int,
    pub absindex: unsafe extern "C" fn(*mut lua_State, c_int) -> c_int,
    pub getglobal: unsafe extern "C" fn(*mut lua_State, *const c_char) -> c_int,
    pub pushnil: unsafe extern "C" fn(*mut lua_State),
    pub pushboolean: unsafe extern "C" fn(*mut lua_State, c_int),
    pub pushinteger: unsafe extern "C" fn(*mut lua_State, lua_Integer),
    pub pushnumber: unsafe extern "C" fn(*mut lua_State, lua_Number),
    pub pushlstring: unsafe extern "C" fn(*mut lua_State, *const c_char, usize) -> *const c_char,
    pub pushlightuserdata: unsafe extern "C" fn(*mut lua_State, *mut c_void),
    pub pushvalue: unsafe extern "C" fn(*mut lua_State, c_int),
    pub createtable: unsafe extern "C" fn(*mut lua_State, c_int, c_int),
    pub rawseti: unsafe extern "C" fn(*mut lua_State, c_int, lua_Integer),
    pub type_: unsafe extern "C" fn(*mut lua_State, c_int) -> c_int,
    pub isinteger: unsafe extern "C" fn(*mut lua_State, c_int) -> c_int,
    pub toboolean: unsafe extern "C" fn(*mut lua_State, c_int) -> c_int,
    pub tointegerx: unsafe extern "C" fn(*mut lua_State, c_int, *mut c_int) -> lua_Integer,
    pub tonumberx: unsafe extern "C" fn(*mut lua_State, c_int, *mut c_int) -> lua_Number,
    pub tolstring: unsafe extern "C" fn(*mut lua_State, c_int, *mut usize) -> *const c_char,
    pub touserdata: unsafe extern "C" fn(*mut lua_State, c_int) -> *mut c_void,
    pub next: unsafe extern "C" fn(*mut lua_State, c_int) -> c_int,
    pub pcallk: unsafe extern "C" fn(
        *mut lua_State,
        c_int,
        c_int,
        c_int,
        lua_KContext,
        Option<lua_KFunction>,
    ) -> c_int,
}

impl std::fmt::Debug for LuaApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LuaApi").finish_non_exhaustive()
    }
}

#[cfg(feature = "host")]
mod linked {
    use super::*;

    #[cfg_attr(all(windows, target_pointer_width = "64"), link(name = "lua53-64"))]
    #[cfg_attr(all(windows, target_pointer_width = "32"), link(name = "lua53-32"))]
    #[cfg_attr(not(windows), link(name = "lua5.3"))]
    extern "C" {
        pub fn lua_gettop(state: *mut lua_State) -> c_int;
        pub fn lua_settop(state: *mut lua_State, idx: c_int);
        pub fn lua_checkstack(state: *mut lua_State, n: c_int) -> c_int;
        pub fn lua_absindex(state: *mut lua_State, idx: c_int) -> c_int;
        pub fn lua_getglobal(state: *mut lua_State, name: *const c_char) -> c_int;
        pub fn lua_pushnil(state: *mut lua_State);
        pub fn lua_pushboolean(state: *mut lua_State, b: c_int);
        pub fn lua_pushinteger(state: *mut lua_State, n: lua_Integer);
        pub fn lua_pushnumber(state: *mut lua_State, n: lua_Number);
        pub fn lua_pushlstring(state: *mut lua_State, s: *const c_char, len: usize) -> *const c_char;
        pub fn lua_pushlightuserdata(state: *mut lua_State, p: *mut c_void);
        pub fn lua_pushvalue(state: *mut lua_State, idx: c_int);
        pub fn lua_createtable(state: *mut lua_State, narr: c_int, nrec: c_int);
        pub fn lua_rawseti(state: *mut lua_State, idx: c_int, n: lua_Integer);
        pub fn lua_type(state: *mut lua_State, idx: c_int) -> c_int;
        pub fn lua_isinteger(state: *mut lua_State, idx: c_int) -> c_int;
        pub fn lua_toboolean(state: *mut lua_State, idx: c_int) -> c_int;
        pub fn lua_tointegerx(state: *mut lua_State, idx: c_int, isnum: *mut c_int) -> lua_Integer;
        pub fn lua_tonumberx(state: *mut lua_State, idx: c_int, isnum: *mut c_int) -> lua_Number;
        pub fn lua_tolstring(state: *mut lua_State, idx: c_int, len: *mut usize) -> *const c_char;
        pub fn lua_touserdata(state: *mut lua_State, idx: c_int) -> *mut c_void;
        pub fn lua_next(state: *mut lua_State, idx: c_int) -> c_int;
        pub fn lua_pcallk(
            state: *mut lua_State,
            nargs: c_int,
            nresults: c_int,
            errfunc: c_int,
            ctx: lua_KContext,
            k: Option<lua_KFunction>,
        ) -> c_int;
    }
}

#[cfg(feature = "host")]
impl LuaApi {
    /// Table over the Lua runtime this crate was linked against
    pub fn linked() -> Self {
        LuaApi {
            gettop: linked::lua_gettop,
            settop: linked::lua_settop,
            checkstack: linked::lua_checkstack,
            absindex: linked::lua_absindex,
            getglobal: linked::lua_getglobal,
            pushnil: linked::lua_pushnil,
            pushboolean: linked::lua_pushboolean,
            pushinteger: linked::lua_pushinteger,
            pushnumber: linked::lua_pushnumber,
            pushlstring: linked::lua_pushlstring,
            pushlightuserdata: linked::lua_pushlightuserdata,
            pushvalue: linked::lua_pushvalue,
            createtable: linked::lua_createtable,
            rawseti: linked::lua_rawseti,
            type_: linked::lua_type,
            isinteger: linked::lua_isinteger,
            toboolean: linked::lua_toboolean,
            tointegerx: linked::lua_tointegerx,
            tonumberx: linked::lua_tonumberx,
            tolstring: linked::lua_tolstring,
            touserdata: linked::lua_touserdata,
            next: linked::lua_next,
            pcallk: linked::lua_pcallk,
        }
    }
}
