//! Debugger attachment and breakpoints

use crate::error::DebugError;
use crate::facade::{Calls, WHOLE_TABLE};
use crate::lua::capability::Capability;
use crate::lua::invoker::Args;
use crate::lua::session::InterpreterSession;
use crate::lua::stack::LuaStack;
use crate::lua::value::Address;

type Result<T> = std::result::Result<T, DebugError>;

/// Debugger backend the host should attach with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerInterface {
    Windows = 1,
    VectoredExceptionHandler = 2,
    Kernel = 3,
}

/// Access that fires a breakpoint (`bptExecute`, `bptAccess`, `bptWrite`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointTrigger {
    Execute = 0,
    Access = 1,
    Write = 2,
}

/// How to resume from a breakpoint (`co_run`, `co_stepinto`, `co_stepover`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueOption {
    Run = 0,
    StepInto = 1,
    StepOver = 2,
}

host_constant!(DebuggerInterface, BreakpointTrigger, ContinueOption);

pub struct Debugger<'s, S: LuaStack> {
    calls: Calls<'s, S, DebugError>,
}

impl<'s, S: LuaStack> Debugger<'s, S> {
    pub fn new(session: &'s InterpreterSession<S>) -> Self {
        Debugger {
            calls: Calls::new(session),
        }
    }

    /// Attach the debugger, with the host's preferred interface unless one is
    /// given
    pub fn attach(&self, interface: Option<DebuggerInterface>) -> Result<()> {
        self.calls.none(Capability::DebugProcess, Args::new().opt(interface))
    }

    pub fn is_debugging(&self) -> Result<bool> {
        self.calls.one(Capability::DebugIsDebugging, Args::new())
    }

    /// Whether the target is stopped on a breakpoint
    pub fn is_broken(&self) -> Result<bool> {
        self.calls.one(Capability::DebugIsBroken, Args::new())
    }

    /// Set a breakpoint. Size and trigger fall back to the host defaults
    /// (1 byte, execute).
    pub fn set_breakpoint(
        &self,
        address: impl Into<Address>,
        size: Option<usize>,
        trigger: Option<BreakpointTrigger>,
    ) -> Result<()> {
        if size == Some(0) {
            return Err(self
                .calls
                .usage(Capability::DebugSetBreakpoint.name(), "breakpoint size must be non-zero"));
        }
        let address = address.into();
        // The trigger is positional after the size
        let size = size.or(trigger.map(|_| 1));
        let args = Args::new().arg(address).opt(size).opt(trigger);
        self.calls.none(Capability::DebugSetBreakpoint, args)
    }

    pub fn remove_breakpoint(&self, address: impl Into<Address>) -> Result<()> {
        self.calls.none(Capability::DebugRemoveBreakpoint, Args::new().arg(address.into()))
    }

    pub fn continue_from_breakpoint(&self, option: ContinueOption) -> Result<()> {
        self.calls.none(Capability::DebugContinueFromBreakpoint, Args::new().arg(option))
    }

    /// Addresses with an active breakpoint
    pub fn breakpoints(&self) -> Result<Vec<u64>> {
        let list: Option<Vec<u64>> = self
            .calls
            .one_sized(Capability::DebugGetBreakpointList, Args::new(), WHOLE_TABLE)?;
        Ok(list.unwrap_or_default())
    }
}
