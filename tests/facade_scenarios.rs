//! End-to-end scenarios for the typed facade
//!
//! Every test drives the public API against `SimLua` and checks both the
//! native result and what reached the interpreter.

use std::error::Error as StdError;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use celua::facade::AobOptions;
use celua::lua::{CallStatus, SimValue};
use celua::{Capability, InterpreterSession, LuaCallError, LuaStack, SimLua};

fn read_integer_sim() -> SimLua {
    let mut sim = SimLua::new();
    sim.register("readInteger", |_, args| match args[0].as_int() {
        Some(0x1000) => Ok(vec![SimValue::Int(42)]),
        _ => Err("bad pointer".to_string()),
    });
    sim
}

/// Integer read of 0x1000 returns the slot the VM produced
#[test]
fn test_integer_read() {
    let session = InterpreterSession::new(read_integer_sim());

    assert_eq!(session.memory().read_i32(0x1000u64), Ok(42));

    let stack = session.stack();
    let calls = stack.calls_to("readInteger");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].args[0], SimValue::Int(0x1000));
    assert_eq!(stack.top(), 0);
}

/// A raised error surfaces as the family error with the host text kept
#[test]
fn test_failed_call_keeps_host_message() {
    let session = InterpreterSession::new(read_integer_sim());

    let err = session.memory().read_i32(0xDEAD_0000u64).unwrap_err();
    assert!(err.to_string().contains("bad pointer"));
    match &err.source {
        LuaCallError::InvocationFailed { function, status, message } => {
            assert_eq!(*function, "readInteger");
            assert_eq!(*status, CallStatus::Runtime);
            assert_eq!(message, "bad pointer");
        }
        other => panic!("unexpected cause: {:?}", other),
    }
    let source = err.source().map(|s| s.to_string()).unwrap_or_default();
    assert!(source.contains("bad pointer"));
    assert_eq!(session.stack().top(), 0);
}

/// Optional trailing arguments are omitted, never padded
#[test]
fn test_aob_scan_optional_arguments() {
    let mut sim = SimLua::new();
    sim.register("AOBScan", |_, _| Ok(vec![SimValue::Nil]));
    let session = InterpreterSession::new(sim);
    let scanner = session.scanner();

    scanner.aob_scan("48 8B 05", &AobOptions::default()).unwrap();
    scanner
        .aob_scan("48 8B 05", &AobOptions::default().protection("+X"))
        .unwrap();

    let stack = session.stack();
    let calls = stack.calls_to("AOBScan");
    assert_eq!(calls[0].args, vec![SimValue::from("48 8B 05")]);
    assert_eq!(calls[1].args, vec![SimValue::from("48 8B 05"), SimValue::from("+X")]);
}

/// AOB results come back through a string list that is always destroyed
#[test]
fn test_aob_scan_reads_and_releases_list() {
    let mut sim = SimLua::new();
    sim.register("AOBScan", |_, _| Ok(vec![SimValue::from(celua::HostHandle(0x5150))]));
    sim.register("strings_getCount", |_, _| Ok(vec![SimValue::Int(2)]));
    sim.register("strings_getString", |_, args| match args[1].as_int() {
        Some(0) => Ok(vec![SimValue::from("7FF6A0001000")]),
        _ => Ok(vec![SimValue::from("7FF6A0002000")]),
    });
    sim.register("object_destroy", |_, _| Ok(vec![]));
    let session = InterpreterSession::new(sim);

    let found = session.scanner().aob_scan("90 90 C3", &AobOptions::default()).unwrap();
    assert_eq!(found, vec![0x7FF6_A000_1000, 0x7FF6_A000_2000]);

    let stack = session.stack();
    let destroyed = stack.calls_to("object_destroy");
    assert_eq!(destroyed.len(), 1);
    assert_eq!(destroyed[0].args[0].as_handle(), Some(celua::HostHandle(0x5150)));
}

/// A capability missing from the host is a typed, recoverable condition
#[test]
fn test_unavailable_capability_pushes_nothing() {
    let session = InterpreterSession::new(SimLua::new());

    let err = session.memory().read_i32(0x1000u64).unwrap_err();
    assert!(err.is_unavailable());
    assert_eq!(
        err.source,
        LuaCallError::CapabilityUnavailable { function: "readInteger" }
    );

    let stack = session.stack();
    assert_eq!(stack.push_count(), 0);
    assert_eq!(stack.top(), 0);
    assert!(stack.calls().is_empty());
}

#[test]
fn test_feature_detection() {
    let session = InterpreterSession::new(read_integer_sim());
    assert!(session.is_available(Capability::ReadInteger));
    assert!(!session.is_available(Capability::DebugProcess));
    assert_eq!(session.stack().top(), 0);
}

/// `nil` from a host function that signals failure that way is a refusal
#[test]
fn test_unreadable_address_is_refused() {
    let mut sim = SimLua::new();
    sim.register("readQword", |_, _| Ok(vec![SimValue::Nil]));
    let session = InterpreterSession::new(sim);

    let err = session.memory().read_i64(0x10u64).unwrap_err();
    assert!(matches!(err.source, LuaCallError::Refused { function: "readQword", .. }));
}

/// Opening a process is two host calls; pid 0 afterwards means it failed
#[test]
fn test_open_process_by_name() {
    let opened = Arc::new(AtomicI64::new(0));
    let mut sim = SimLua::new();
    let o = opened.clone();
    sim.register("openProcess", move |_, args| {
        if args[0].as_str() == Some("game.exe") {
            o.store(4242, Ordering::SeqCst);
        }
        Ok(vec![])
    });
    let o = opened.clone();
    sim.register("getOpenedProcessID", move |_, _| Ok(vec![SimValue::Int(o.load(Ordering::SeqCst))]));
    let session = InterpreterSession::new(sim);

    let err = session.process().open("missing.exe").unwrap_err();
    assert!(matches!(err.source, LuaCallError::Refused { function: "openProcess", .. }));

    assert_eq!(session.process().open("game.exe"), Ok(4242));
    assert_eq!(session.stack().calls().len(), 4);
}
