//! Interpreter sessions and host object ownership

use std::cell::{Ref, RefCell};
use std::fmt;

use log::{trace, warn};

use crate::error::{LuaCallError, Result};
use crate::lua::capability::Capability;
use crate::lua::invoker::{invoke, Args, Returns, StackGuard};
use crate::lua::stack::{HostHandle, LuaStack, SlotType};
use crate::lua::value::{FromLua, LuaValue};
use crate::lua::DecodeLimits;

/// Exclusive access to one interpreter state.
///
/// Every facade borrows a session; nothing in the crate reaches the host's
/// interpreter any other way. A session is not `Sync`: callers on several
/// threads share it through [`InterpreterLock`](crate::lua::gil::InterpreterLock).
pub struct InterpreterSession<S: LuaStack> {
    stack: RefCell<S>,
    limits: DecodeLimits,
}

impl<S: LuaStack> InterpreterSession<S> {
    pub fn new(stack: S) -> Self {
        Self::with_limits(stack, DecodeLimits::default())
    }

    pub fn with_limits(stack: S, limits: DecodeLimits) -> Self {
        InterpreterSession {
            stack: RefCell::new(stack),
            limits,
        }
    }

    pub fn limits(&self) -> DecodeLimits {
        self.limits
    }

    pub fn set_limits(&mut self, limits: DecodeLimits) {
        self.limits = limits;
    }

    /// Call a host function and decode its results.
    ///
    /// The argument count is checked against the capability's schema before
    /// anything is pushed.
    pub fn call(&self, capability: Capability, args: Args, returns: Returns) -> Result<Vec<LuaValue>> {
        self.call_with_limits(capability, args, returns, self.limits)
    }

    /// [`InterpreterSession::call`] decoding under `limits` instead of the
    /// session's own
    pub fn call_with_limits(
        &self,
        capability: Capability,
        args: Args,
        returns: Returns,
        limits: DecodeLimits,
    ) -> Result<Vec<LuaValue>> {
        let schema = capability.schema();
        if !schema.accepts(args.len()) {
            return Err(LuaCallError::Usage(format!(
                "{} takes {}, got {}",
                capability,
                schema,
                args.len()
            )));
        }
        let mut stack = self.stack.try_borrow_mut().map_err(|_| LuaCallError::Busy)?;
        invoke(&mut *stack, capability.name(), &args, returns, &limits)
    }

    /// Call and project the first result
    pub fn call_one<T: FromLua>(&self, capability: Capability, args: Args) -> Result<T> {
        self.call_one_with_limits(capability, args, self.limits)
    }

    pub fn call_one_with_limits<T: FromLua>(&self, capability: Capability, args: Args, limits: DecodeLimits) -> Result<T> {
        let mut results = self.call_with_limits(capability, args, Returns::ONE, limits)?;
        T::from_lua(results.pop().unwrap_or(LuaValue::Nil))
    }

    /// Call for effect only
    pub fn call_none(&self, capability: Capability, args: Args) -> Result<()> {
        self.call(capability, args, Returns::NONE).map(|_| ())
    }

    /// Whether the attached host exposes `capability`. Leaves the stack as it
    /// was.
    pub fn is_available(&self, capability: Capability) -> bool {
        let Ok(mut stack) = self.stack.try_borrow_mut() else {
            return false;
        };
        let mut guard = StackGuard::new(&mut *stack);
        if !guard.check_stack(1) {
            return false;
        }
        let available = guard.get_global(capability.name()) == SlotType::Function;
        trace!("{} available: {}", capability, available);
        available
    }

    /// Borrow the underlying stack
    ///
    /// # Panics
    ///
    /// Panics if called from inside a host call on this session.
    pub fn stack(&self) -> Ref<'_, S> {
        self.stack.borrow()
    }

    pub fn stack_mut(&mut self) -> &mut S {
        self.stack.get_mut()
    }

    pub fn into_inner(self) -> S {
        self.stack.into_inner()
    }
}

impl<S: LuaStack + fmt::Debug> fmt::Debug for InterpreterSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpreterSession")
            .field("stack", &self.stack)
            .field("limits", &self.limits)
            .finish()
    }
}

/// Who destroys a host object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Created on our behalf; destroyed when the wrapper drops
    Owned,
    /// Aliases something the host keeps alive (GUI singletons such as the
    /// main memscan or the address list); never destroyed
    Borrowed,
}

/// Scoped handle to a host object.
///
/// Owned objects are released through `object_destroy` when dropped. The
/// release is best effort: a failure is logged and otherwise ignored. Use
/// [`HostObject::release`] to observe the outcome.
pub struct HostObject<'s, S: LuaStack> {
    session: &'s InterpreterSession<S>,
    handle: HostHandle,
    ownership: Ownership,
    kind: &'static str,
}

impl<'s, S: LuaStack> HostObject<'s, S> {
    /// Take ownership of an object created for us
    pub fn owned(session: &'s InterpreterSession<S>, handle: HostHandle, kind: &'static str) -> Self {
        HostObject {
            session,
            handle,
            ownership: Ownership::Owned,
            kind,
        }
    }

    /// Refer to an object the host owns
    pub fn borrowed(session: &'s InterpreterSession<S>, handle: HostHandle, kind: &'static str) -> Self {
        HostObject {
            session,
            handle,
            ownership: Ownership::Borrowed,
            kind,
        }
    }

    pub fn handle(&self) -> HostHandle {
        self.handle
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Short description of the object type, for diagnostics
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn session(&self) -> &'s InterpreterSession<S> {
        self.session
    }

    /// Stop this wrapper from destroying the object
    pub fn suppress_destroy(&mut self) {
        self.ownership = Ownership::Borrowed;
    }

    /// Give up the object without destroying it
    pub fn leak(mut self) -> HostHandle {
        self.suppress_destroy();
        self.handle
    }

    /// Destroy now and report the outcome. Borrowed objects are left alone.
    pub fn release(mut self) -> Result<()> {
        let owned = self.ownership == Ownership::Owned;
        self.suppress_destroy();
        if owned {
            destroy(self.session, self.handle)
        } else {
            Ok(())
        }
    }
}

fn destroy<S: LuaStack>(session: &InterpreterSession<S>, handle: HostHandle) -> Result<()> {
    session.call_none(Capability::ObjectDestroy, Args::new().arg(handle))
}

impl<S: LuaStack> Drop for HostObject<'_, S> {
    fn drop(&mut self) {
        if self.ownership != Ownership::Owned {
            return;
        }
        if let Err(e) = destroy(self.session, self.handle) {
            warn!("failed to destroy {} {}: {}", self.kind, self.handle, e);
        }
    }
}

impl<S: LuaStack> fmt::Debug for HostObject<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObject")
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .field("ownership", &self.ownership)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua::simulated::{SimLua, SimValue};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn session_with_destroy() -> (InterpreterSession<SimLua>, Arc<AtomicUsize>) {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let counter = destroyed.clone();
        let mut sim = SimLua::new();
        sim.register("object_destroy", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        });
        (InterpreterSession::new(sim), destroyed)
    }

    #[test]
    fn test_schema_mismatch_is_usage_error() {
        let session = InterpreterSession::new(SimLua::new());
        let err = session.call(Capability::ReadInteger, Args::new(), Returns::ONE).unwrap_err();
        assert!(matches!(err, LuaCallError::Usage(_)));
        assert_eq!(session.stack().push_count(), 0);
    }

    #[test]
    fn test_call_limits_do_not_stick() {
        let mut sim = SimLua::new();
        sim.register("readBytes", |heap, _| {
            let bytes = (0..40).map(SimValue::Int).collect();
            Ok(vec![heap.new_list(bytes)])
        });
        let limits = DecodeLimits {
            max_table_entries: 8,
            ..DecodeLimits::default()
        };
        let session = InterpreterSession::with_limits(sim, limits);
        let args = || Args::new().arg(0x1000u64).arg(40usize).arg(true);

        let bytes: Vec<u8> = session
            .call_one_with_limits(Capability::ReadBytes, args(), limits.with_entries(40))
            .unwrap();
        assert_eq!(bytes.len(), 40);
        assert!(session.call_one::<Vec<u8>>(Capability::ReadBytes, args()).is_err());
        assert_eq!(session.limits().max_table_entries, 8);
        assert_eq!(session.stack().top(), 0);
    }

    #[test]
    fn test_is_available_leaves_stack_alone() {
        let mut sim = SimLua::new();
        sim.register("pause", |_, _| Ok(vec![]));
        let session = InterpreterSession::new(sim);

        assert!(session.is_available(Capability::Pause));
        assert!(!session.is_available(Capability::Unpause));
        assert_eq!(session.stack().top(), 0);
    }

    #[test]
    fn test_owned_object_destroyed_on_drop() {
        let (session, destroyed) = session_with_destroy();
        {
            let _obj = HostObject::owned(&session, HostHandle(0x10), "memscan");
        }
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        let calls = session.stack().calls_to("object_destroy").len();
        assert_eq!(calls, 1);
        assert_eq!(
            session.stack().calls()[0].args,
            vec![SimValue::Userdata(HostHandle(0x10))]
        );
    }

    #[test]
    fn test_borrowed_object_never_destroyed() {
        let (session, destroyed) = session_with_destroy();
        drop(HostObject::borrowed(&session, HostHandle(0x20), "address list"));
        let leaked = HostObject::owned(&session, HostHandle(0x30), "memscan").leak();
        assert_eq!(leaked, HostHandle(0x30));
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_release_reports_failure_once() {
        let mut sim = SimLua::new();
        sim.register("object_destroy", |_, _| Err("object in use".to_string()));
        let session = InterpreterSession::new(sim);

        let obj = HostObject::owned(&session, HostHandle(0x40), "found list");
        let err = obj.release().unwrap_err();
        assert_eq!(err.host_message(), Some("object in use"));
        assert_eq!(session.stack().calls().len(), 1);
    }

    #[test]
    fn test_failed_drop_is_swallowed() {
        let session = InterpreterSession::new(SimLua::new());
        drop(HostObject::owned(&session, HostHandle(0x50), "memscan"));
        assert_eq!(session.stack().top(), 0);
    }
}
