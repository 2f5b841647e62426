//! Typed facade over the host's scripting API
//!
//! Each capability family is a lightweight view borrowed from an
//! [`InterpreterSession`]: `session.memory().read_i32(0x1000)`. Every method
//! is one invocation (occasionally two) plus a projection of the result, and
//! every failure comes back as that family's domain error.

/// Push fieldless enums that mirror host constants as their integer value
macro_rules! host_constant {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for crate::lua::value::LuaArg {
                fn from(value: $ty) -> Self {
                    crate::lua::value::LuaArg::Int(value as i64)
                }
            }
        )*
    };
}

pub mod assembler;
pub mod debugger;
pub mod disassembler;
pub mod memory;
pub mod process;
pub mod records;
pub mod scan;
pub mod symbols;

pub use assembler::{Assembler, ScriptCheck};
pub use debugger::{BreakpointTrigger, ContinueOption, Debugger, DebuggerInterface};
pub use disassembler::{Disassembler, Instruction};
pub use memory::Memory;
pub use process::{Process, ProcessTarget};
pub use records::{AddressList, MemoryRecord};
pub use scan::{
    wait_for_scan, Alignment, AobOptions, FoundList, FoundListState, MemScan, Rounding, ScanOption,
    ScanParams, Scanner, VarType,
};
pub use symbols::{ModuleInfo, NameOptions, Symbols};

use std::marker::PhantomData;

use crate::error::{DomainError, LuaCallError};
use crate::lua::capability::Capability;
use crate::lua::invoker::{Args, Returns};
use crate::lua::session::InterpreterSession;
use crate::lua::stack::LuaStack;
use crate::lua::value::{FromLua, LuaValue};

impl<S: LuaStack> InterpreterSession<S> {
    pub fn memory(&self) -> Memory<'_, S> {
        Memory::new(self)
    }

    pub fn process(&self) -> Process<'_, S> {
        Process::new(self)
    }

    pub fn symbols(&self) -> Symbols<'_, S> {
        Symbols::new(self)
    }

    pub fn disassembler(&self) -> Disassembler<'_, S> {
        Disassembler::new(self)
    }

    pub fn assembler(&self) -> Assembler<'_, S> {
        Assembler::new(self)
    }

    pub fn scanner(&self) -> Scanner<'_, S> {
        Scanner::new(self)
    }

    pub fn debugger(&self) -> Debugger<'_, S> {
        Debugger::new(self)
    }

    pub fn address_list(&self) -> std::result::Result<AddressList<'_, S>, crate::error::RecordError> {
        AddressList::current(self)
    }
}

/// Entry allowance for host enumerations that are only useful whole
pub(crate) const WHOLE_TABLE: usize = usize::MAX;

/// Invocation helpers bound to one family error `E`
pub(crate) struct Calls<'s, S: LuaStack, E> {
    session: &'s InterpreterSession<S>,
    family: PhantomData<fn() -> E>,
}

impl<S: LuaStack, E> Clone for Calls<'_, S, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: LuaStack, E> Copy for Calls<'_, S, E> {}

impl<'s, S: LuaStack, E: DomainError> Calls<'s, S, E> {
    pub(crate) fn new(session: &'s InterpreterSession<S>) -> Self {
        Calls {
            session,
            family: PhantomData,
        }
    }

    pub(crate) fn session(&self) -> &'s InterpreterSession<S> {
        self.session
    }

    /// Call and project the first result
    pub(crate) fn one<T: FromLua>(&self, capability: Capability, args: Args) -> Result<T, E> {
        self.session
            .call_one(capability, args)
            .map_err(|e| E::wrap(capability.name(), e))
    }

    /// Call and project the first result, decoding tables of up to
    /// `entries` entries even when the session's ceiling is lower
    pub(crate) fn one_sized<T: FromLua>(&self, capability: Capability, args: Args, entries: usize) -> Result<T, E> {
        let limits = self.session.limits().with_entries(entries);
        self.session
            .call_one_with_limits(capability, args, limits)
            .map_err(|e| E::wrap(capability.name(), e))
    }

    /// Call for effect only
    pub(crate) fn none(&self, capability: Capability, args: Args) -> Result<(), E> {
        self.session
            .call_none(capability, args)
            .map_err(|e| E::wrap(capability.name(), e))
    }

    /// Call and keep every requested result
    pub(crate) fn many(&self, capability: Capability, args: Args, returns: Returns) -> Result<Vec<LuaValue>, E> {
        self.session
            .call(capability, args, returns)
            .map_err(|e| E::wrap(capability.name(), e))
    }

    /// Call a function that reports failure by returning `nil`
    pub(crate) fn required<T: FromLua>(
        &self,
        capability: Capability,
        args: Args,
        detail: impl FnOnce() -> String,
    ) -> Result<T, E> {
        self.required_sized(capability, args, 0, detail)
    }

    /// [`Calls::required`] with room for `entries` table entries
    pub(crate) fn required_sized<T: FromLua>(
        &self,
        capability: Capability,
        args: Args,
        entries: usize,
        detail: impl FnOnce() -> String,
    ) -> Result<T, E> {
        match self.one_sized::<Option<T>>(capability, args, entries)? {
            Some(value) => Ok(value),
            None => Err(self.refused(capability, detail())),
        }
    }

    /// Call a function that reports failure by returning `false`
    pub(crate) fn checked(&self, capability: Capability, args: Args, detail: impl FnOnce() -> String) -> Result<(), E> {
        match self.one::<LuaValue>(capability, args)? {
            LuaValue::Bool(false) | LuaValue::Nil => Err(self.refused(capability, detail())),
            _ => Ok(()),
        }
    }

    /// Project an already decoded value
    pub(crate) fn project<T>(&self, capability: Capability, result: crate::error::Result<T>) -> Result<T, E> {
        result.map_err(|e| E::wrap(capability.name(), e))
    }

    pub(crate) fn refused(&self, capability: Capability, detail: String) -> E {
        E::wrap(
            capability.name(),
            LuaCallError::Refused {
                function: capability.name(),
                detail,
            },
        )
    }

    pub(crate) fn usage(&self, operation: &'static str, message: impl Into<String>) -> E {
        E::wrap(operation, LuaCallError::Usage(message.into()))
    }

    pub(crate) fn stale(&self, operation: &'static str, message: impl Into<String>) -> E {
        E::wrap(operation, LuaCallError::StaleHandle(message.into()))
    }
}
