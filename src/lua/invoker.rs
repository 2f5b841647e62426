//! Named invocation of host functions
//!
//! One call is: resolve the global, push the arguments, run it under a
//! protected call, decode the results. Whatever happens, the stack is back at
//! its starting depth when [`invoke`] returns.

use std::ops::{Deref, DerefMut};

use log::{debug, trace};

use crate::error::{LuaCallError, Result};
use crate::lua::marshal::{decode, push_arg};
use crate::lua::stack::{LuaStack, SlotType, MULTRET};
use crate::lua::value::{LuaArg, LuaValue};
use crate::lua::DecodeLimits;

/// Results requested from a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returns {
    /// Exactly `n` results; missing ones read as nil, extra ones are dropped
    Exactly(u16),
    /// Every result the function produced
    All,
}

impl Returns {
    pub const NONE: Returns = Returns::Exactly(0);
    pub const ONE: Returns = Returns::Exactly(1);

    fn nresults(self) -> i32 {
        match self {
            Returns::Exactly(n) => i32::from(n),
            Returns::All => MULTRET,
        }
    }

    fn reserve(self) -> i32 {
        match self {
            Returns::Exactly(n) => i32::from(n),
            Returns::All => 0,
        }
    }
}

/// Positional argument list.
///
/// Required arguments come first. Optional trailing arguments are added with
/// [`Args::opt`]; the first `None` closes the list and later optional values
/// are not pushed, so the host sees its own defaults instead of nils.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: Vec<LuaArg>,
    closed: bool,
    misordered: Option<usize>,
}

impl Args {
    pub fn new() -> Self {
        Args::default()
    }

    /// Append a required argument
    pub fn arg(mut self, value: impl Into<LuaArg>) -> Self {
        if self.closed {
            if self.misordered.is_none() {
                self.misordered = Some(self.values.len());
            }
            return self;
        }
        self.values.push(value.into());
        self
    }

    /// Append an optional trailing argument
    pub fn opt<T: Into<LuaArg>>(mut self, value: Option<T>) -> Self {
        match value {
            Some(value) if !self.closed => self.values.push(value.into()),
            Some(_) => {}
            None => self.closed = true,
        }
        self
    }

    /// Arguments that will be pushed, in order
    pub fn values(&self) -> &[LuaArg] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check every argument without touching the stack
    pub fn validate(&self) -> Result<()> {
        if let Some(position) = self.misordered {
            return Err(LuaCallError::Marshalling(format!(
                "required argument {} follows an omitted optional argument",
                position + 1
            )));
        }
        self.values.iter().try_for_each(LuaArg::validate)
    }

    fn slots_needed(&self) -> i32 {
        self.values.iter().map(LuaArg::slots_needed).sum()
    }
}

/// Restores the stack to the depth it had on creation
pub struct StackGuard<'a, S: LuaStack + ?Sized> {
    stack: &'a mut S,
    base: i32,
}

impl<'a, S: LuaStack + ?Sized> StackGuard<'a, S> {
    pub fn new(stack: &'a mut S) -> Self {
        let base = stack.top();
        StackGuard { stack, base }
    }

    /// Depth the stack will be restored to
    pub fn base(&self) -> i32 {
        self.base
    }
}

impl<S: LuaStack + ?Sized> Deref for StackGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.stack
    }
}

impl<S: LuaStack + ?Sized> DerefMut for StackGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.stack
    }
}

impl<S: LuaStack + ?Sized> Drop for StackGuard<'_, S> {
    fn drop(&mut self) {
        if self.stack.top() != self.base {
            self.stack.set_top(self.base);
        }
    }
}

/// Invoke the global `function` with `args`.
///
/// Arguments are validated before anything is pushed. A missing or
/// non-callable global is reported as [`LuaCallError::CapabilityUnavailable`]
/// without pushing any argument.
pub fn invoke<S: LuaStack + ?Sized>(
    stack: &mut S,
    function: &'static str,
    args: &Args,
    returns: Returns,
    limits: &DecodeLimits,
) -> Result<Vec<LuaValue>> {
    args.validate()?;

    let mut guard = StackGuard::new(stack);
    let base = guard.base();

    let reserve = 1 + args.slots_needed() + returns.reserve();
    if !guard.check_stack(reserve) {
        return Err(LuaCallError::Marshalling(format!(
            "cannot reserve {} stack slots for {}",
            reserve, function
        )));
    }

    let kind = guard.get_global(function);
    if kind != SlotType::Function {
        trace!("{} resolved to {}, treating as unavailable", function, kind);
        return Err(LuaCallError::CapabilityUnavailable { function });
    }

    for arg in args.values() {
        push_arg(&mut *guard, arg)?;
    }

    trace!("calling {} with {} argument(s)", function, args.len());
    let status = guard.pcall(args.len() as i32, returns.nresults());
    if !status.is_ok() {
        let message = error_message(&*guard, -1);
        debug!("{} failed ({}): {}", function, status, message);
        return Err(LuaCallError::InvocationFailed {
            function,
            status,
            message,
        });
    }

    let count = guard.top() - base;
    let results: Vec<LuaValue> = (1..=count)
        .map(|i| decode(&mut *guard, base + i, limits))
        .collect();
    Ok(results)
}

/// Text of the error object at `idx`
fn error_message<S: LuaStack + ?Sized>(stack: &S, idx: i32) -> String {
    match stack.slot_type(idx) {
        SlotType::String | SlotType::Number => stack
            .to_bytes(idx)
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default(),
        other => format!("(error object is a {} value)", other),
    }
}
