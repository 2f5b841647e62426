//! Auto assembler scripts

use crate::error::AssemblyError;
use crate::facade::Calls;
use crate::lua::capability::Capability;
use crate::lua::invoker::{Args, Returns};
use crate::lua::session::InterpreterSession;
use crate::lua::stack::LuaStack;
use crate::lua::value::LuaValue;

type Result<T> = std::result::Result<T, AssemblyError>;

/// Outcome of a syntax check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptCheck {
    Valid,
    /// Diagnostics reported by the host
    Invalid(String),
}

impl ScriptCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, ScriptCheck::Valid)
    }
}

pub struct Assembler<'s, S: LuaStack> {
    calls: Calls<'s, S, AssemblyError>,
}

impl<'s, S: LuaStack> Assembler<'s, S> {
    pub fn new(session: &'s InterpreterSession<S>) -> Self {
        Assembler {
            calls: Calls::new(session),
        }
    }

    /// Run a script against the target
    pub fn run(&self, script: &str) -> Result<()> {
        self.run_in(script, false)
    }

    /// Run a script against Cheat Engine's own process
    pub fn run_local(&self, script: &str) -> Result<()> {
        self.run_in(script, true)
    }

    fn run_in(&self, script: &str, target_self: bool) -> Result<()> {
        if script.trim().is_empty() {
            return Err(self.calls.usage(Capability::AutoAssemble.name(), "script is empty"));
        }
        let args = Args::new().arg(script).arg(target_self);
        self.calls.checked(Capability::AutoAssemble, args, || {
            "script did not assemble".to_string()
        })
    }

    /// Check the `[ENABLE]` (or `[DISABLE]`) section without running it
    pub fn check(&self, script: &str, enable: bool) -> Result<ScriptCheck> {
        let args = Args::new().arg(script).arg(enable);
        let results = self.calls.many(Capability::AutoAssembleCheck, args, Returns::Exactly(2))?;
        let mut results = results.into_iter();
        let ok = matches!(results.next(), Some(LuaValue::Bool(true)));
        if ok {
            return Ok(ScriptCheck::Valid);
        }
        let message = match results.next() {
            Some(LuaValue::Text(text)) => text,
            _ => "script check failed".to_string(),
        };
        Ok(ScriptCheck::Invalid(message))
    }
}
