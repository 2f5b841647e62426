//! Global interpreter lock
//!
//! The host's interpreter is single threaded. Threads other than the one the
//! host calls us on share a session through one [`InterpreterLock`], which
//! serializes whole facade operations. The async helper moves a blocking host
//! call onto a worker and bounds only the wait; the host-side work keeps
//! running until it finishes.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::lua::session::InterpreterSession;
use crate::lua::stack::LuaStack;

/// Failure of a timed wait on the interpreter
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("timed out after {0:?} waiting for the interpreter")]
    TimedOut(Duration),

    #[error("interpreter worker failed: {0}")]
    Worker(String),
}

/// Shared, mutex-protected session
pub struct InterpreterLock<S: LuaStack> {
    session: Arc<Mutex<InterpreterSession<S>>>,
}

impl<S: LuaStack> Clone for InterpreterLock<S> {
    fn clone(&self) -> Self {
        InterpreterLock {
            session: Arc::clone(&self.session),
        }
    }
}

impl<S: LuaStack> InterpreterLock<S> {
    pub fn new(session: InterpreterSession<S>) -> Self {
        InterpreterLock {
            session: Arc::new(Mutex::new(session)),
        }
    }

    /// Run `f` with exclusive access to the session.
    ///
    /// A panic in an earlier holder does not poison the lock: the session's
    /// stack guards have already restored it.
    pub fn with<R>(&self, f: impl FnOnce(&InterpreterSession<S>) -> R) -> R {
        let guard = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }
}

impl<S: LuaStack + Send + 'static> InterpreterLock<S> {
    /// Run `f` under the lock on a blocking worker, waiting at most `timeout`.
    ///
    /// On timeout the returned error only means we stopped waiting; `f`
    /// still runs to completion and its result is discarded.
    pub async fn run_blocking<R, F>(&self, timeout: Duration, f: F) -> Result<R, WaitError>
    where
        F: FnOnce(&InterpreterSession<S>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let lock = self.clone();
        let task = tokio::task::spawn_blocking(move || lock.with(f));
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(WaitError::Worker(e.to_string())),
            Err(_) => Err(WaitError::TimedOut(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua::capability::Capability;
    use crate::lua::invoker::Args;
    use crate::lua::simulated::{SimLua, SimValue};
    use std::thread;

    fn counting_session() -> InterpreterSession<SimLua> {
        let mut sim = SimLua::new();
        let mut count = 0i64;
        sim.register("getOpenedProcessID", move |_, _| {
            count += 1;
            Ok(vec![SimValue::Int(count)])
        });
        InterpreterSession::new(sim)
    }

    #[test]
    fn test_threads_are_serialized() {
        let lock = InterpreterLock::new(counting_session());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        lock.with(|s| s.call_one::<i64>(Capability::GetOpenedProcessId, Args::new()))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let last = lock
            .with(|s| s.call_one::<i64>(Capability::GetOpenedProcessId, Args::new()))
            .unwrap();
        assert_eq!(last, 101);
        lock.with(|s| assert_eq!(s.stack().top(), 0));
    }

    #[tokio::test]
    async fn test_run_blocking_returns_value() {
        let lock = InterpreterLock::new(counting_session());
        let pid = lock
            .run_blocking(Duration::from_secs(5), |s| {
                s.call_one::<i64>(Capability::GetOpenedProcessId, Args::new())
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pid, 1);
    }

    #[tokio::test]
    async fn test_run_blocking_times_out_wait_only() {
        let lock = InterpreterLock::new(counting_session());
        let result = lock
            .run_blocking(Duration::from_millis(10), |s| {
                thread::sleep(Duration::from_millis(200));
                s.call_one::<i64>(Capability::GetOpenedProcessId, Args::new())
            })
            .await;
        assert!(matches!(result, Err(WaitError::TimedOut(_))));

        // The abandoned call still completes before the next one gets the lock
        let pid = lock
            .run_blocking(Duration::from_secs(5), |s| {
                s.call_one::<i64>(Capability::GetOpenedProcessId, Args::new())
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pid, 2);
    }
}
