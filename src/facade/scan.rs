//! Memory scans, AOB scans and found lists
//!
//! A [`MemScan`] produces results that are read through an independent
//! [`FoundList`]. The list must be initialized before indexed reads and is
//! invalidated whenever its memscan starts another scan:
//!
//! ```text
//! Uninitialized --initialize--> Readable --deinitialize--> Uninitialized
//! Readable --first_scan/next_scan on the memscan--> Invalid
//! ```
//!
//! Reads outside `Readable` fail without a host call. A found list borrows its
//! memscan, so the memscan cannot be destroyed while a list is alive.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::time::Duration;

use log::{debug, warn};

use crate::error::ScanError;
use crate::facade::Calls;
use crate::lua::capability::Capability;
use crate::lua::gil::{InterpreterLock, WaitError};
use crate::lua::invoker::Args;
use crate::lua::session::{HostObject, InterpreterSession};
use crate::lua::stack::{HostHandle, LuaStack};
use crate::lua::value::{parse_address_text, Address};

type Result<T> = std::result::Result<T, ScanError>;

/// Scan comparison (`soUnknownValue` .. `soUnchanged`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOption {
    UnknownValue = 0,
    ExactValue = 1,
    ValueBetween = 2,
    BiggerThan = 3,
    SmallerThan = 4,
    IncreasedValue = 5,
    IncreasedValueBy = 6,
    DecreasedValue = 7,
    DecreasedValueBy = 8,
    Changed = 9,
    Unchanged = 10,
}

/// Value type scanned for (`vtByte` .. `vtGrouped`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Byte = 0,
    Word = 1,
    Dword = 2,
    Qword = 3,
    Single = 4,
    Double = 5,
    String = 6,
    UnicodeString = 7,
    ByteArray = 8,
    Binary = 9,
    All = 10,
    AutoAssembler = 11,
    Pointer = 12,
    Custom = 13,
    Grouped = 14,
}

/// Float comparison mode (`rtRounded`, `rtExtremerounded`, `rtTruncated`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Rounded = 0,
    ExtremeRounded = 1,
    Truncated = 2,
}

/// Result alignment (`fsmNotAligned`, `fsmAligned`, `fsmLastDigits`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    NotAligned = 0,
    Aligned = 1,
    LastDigits = 2,
}

host_constant!(ScanOption, VarType, Rounding, Alignment);

impl ScanOption {
    /// Whether the comparison needs `input1`
    pub fn needs_input(self) -> bool {
        !matches!(
            self,
            ScanOption::UnknownValue
                | ScanOption::IncreasedValue
                | ScanOption::DecreasedValue
                | ScanOption::Changed
                | ScanOption::Unchanged
        )
    }

    /// Whether the option compares against an earlier scan
    pub fn is_relative(self) -> bool {
        matches!(
            self,
            ScanOption::IncreasedValue
                | ScanOption::IncreasedValueBy
                | ScanOption::DecreasedValue
                | ScanOption::DecreasedValueBy
                | ScanOption::Changed
                | ScanOption::Unchanged
        )
    }
}

/// Parameters of a first or next scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanParams {
    pub option: ScanOption,
    pub var_type: VarType,
    pub rounding: Rounding,
    pub input1: String,
    /// Upper bound for [`ScanOption::ValueBetween`]
    pub input2: String,
    pub start: u64,
    pub stop: u64,
    /// Protection filter, e.g. `"+W*X-C"`
    pub protection: String,
    pub alignment: Alignment,
    pub alignment_param: String,
    pub hexadecimal: bool,
    pub not_binary_string: bool,
    pub unicode: bool,
    pub case_sensitive: bool,
    /// Next scans only: inputs are percentages
    pub percentage: bool,
    /// Next scans only: compare against a named saved result
    pub saved_result: Option<String>,
}

impl Default for ScanParams {
    fn default() -> Self {
        ScanParams {
            option: ScanOption::ExactValue,
            var_type: VarType::Dword,
            rounding: Rounding::Rounded,
            input1: String::new(),
            input2: String::new(),
            start: 0,
            stop: 0x7FFF_FFFF_FFFF_FFFF,
            protection: "+W*X-C".to_string(),
            alignment: Alignment::Aligned,
            alignment_param: "4".to_string(),
            hexadecimal: false,
            not_binary_string: true,
            unicode: false,
            case_sensitive: false,
            percentage: false,
            saved_result: None,
        }
    }
}

impl ScanParams {
    /// Exact-value scan
    pub fn exact(var_type: VarType, value: impl fmt::Display) -> Self {
        ScanParams {
            option: ScanOption::ExactValue,
            var_type,
            input1: value.to_string(),
            ..ScanParams::default()
        }
    }

    /// Inclusive range scan
    pub fn between(var_type: VarType, low: impl fmt::Display, high: impl fmt::Display) -> Self {
        ScanParams {
            option: ScanOption::ValueBetween,
            var_type,
            input1: low.to_string(),
            input2: high.to_string(),
            ..ScanParams::default()
        }
    }

    /// Comparison without an input value (unknown initial value, changed, ...)
    pub fn compare(option: ScanOption, var_type: VarType) -> Self {
        ScanParams {
            option,
            var_type,
            ..ScanParams::default()
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.option.needs_input() && self.input1.trim().is_empty() {
            return Err(format!("{:?} needs an input value", self.option));
        }
        if self.option == ScanOption::ValueBetween && self.input2.trim().is_empty() {
            return Err("value-between scans need an upper bound".to_string());
        }
        if self.start > self.stop {
            return Err(format!("start {:#x} is above stop {:#x}", self.start, self.stop));
        }
        Ok(())
    }
}

/// Optional arguments of the AOB scan family
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AobOptions {
    pub protection: Option<String>,
    pub alignment: Option<Alignment>,
    pub alignment_param: Option<String>,
}

impl AobOptions {
    pub fn protection(mut self, flags: &str) -> Self {
        self.protection = Some(flags.to_string());
        self
    }

    pub fn aligned(mut self, alignment: Alignment, param: &str) -> Self {
        self.alignment = Some(alignment);
        self.alignment_param = Some(param.to_string());
        self
    }

    fn push(&self, args: Args) -> Args {
        // Alignment is positional after the protection flags
        let protection = self
            .protection
            .clone()
            .or_else(|| self.alignment.map(|_| "*X*C*W".to_string()));
        args.opt(protection)
            .opt(self.alignment)
            .opt(self.alignment_param.clone())
    }
}

fn check_pattern(pattern: &str) -> std::result::Result<(), String> {
    let tokens: Vec<&str> = pattern.split_whitespace().collect();
    if tokens.is_empty() {
        return Err("AOB pattern is empty".to_string());
    }
    for token in tokens {
        let valid = token.len() <= 2
            && !token.is_empty()
            && token.chars().all(|c| c.is_ascii_hexdigit() || c == '?' || c == '*');
        if !valid {
            return Err(format!("invalid AOB token {:?}", token));
        }
    }
    Ok(())
}

/// Entry point to the scan family
pub struct Scanner<'s, S: LuaStack> {
    calls: Calls<'s, S, ScanError>,
}

impl<'s, S: LuaStack> Scanner<'s, S> {
    pub fn new(session: &'s InterpreterSession<S>) -> Self {
        Scanner {
            calls: Calls::new(session),
        }
    }

    /// Every address matching an AOB pattern such as `"48 8B ?? 05"`
    pub fn aob_scan(&self, pattern: &str, options: &AobOptions) -> Result<Vec<u64>> {
        let operation = Capability::AobScan;
        check_pattern(pattern).map_err(|m| self.calls.usage(operation.name(), m))?;

        let args = options.push(Args::new().arg(pattern));
        let list: Option<HostHandle> = self.calls.one(operation, args)?;
        let Some(list) = list else {
            return Ok(Vec::new());
        };
        let list = HostObject::owned(self.calls.session(), list, "string list");

        let count: usize = self.calls.one(Capability::StringsGetCount, Args::new().arg(list.handle()))?;
        let mut addresses = Vec::with_capacity(count);
        for i in 0..count {
            let text: String = self
                .calls
                .one(Capability::StringsGetString, Args::new().arg(list.handle()).arg(i))?;
            let address = self.calls.project(operation, parse_address_text(&text))?;
            addresses.push(address);
        }
        Ok(addresses)
    }

    /// The single match of a pattern, or `None`
    pub fn aob_scan_unique(&self, pattern: &str, options: &AobOptions) -> Result<Option<u64>> {
        check_pattern(pattern).map_err(|m| self.calls.usage(Capability::AobScanUnique.name(), m))?;
        let args = options.push(Args::new().arg(pattern));
        self.calls.one(Capability::AobScanUnique, args)
    }

    /// The single match of a pattern inside one module
    pub fn aob_scan_module_unique(&self, module: &str, pattern: &str, protection: Option<&str>) -> Result<Option<u64>> {
        let operation = Capability::AobScanModuleUnique;
        check_pattern(pattern).map_err(|m| self.calls.usage(operation.name(), m))?;
        let args = Args::new().arg(module).arg(pattern).opt(protection);
        self.calls.one(operation, args)
    }

    /// A new memscan, destroyed when dropped
    pub fn create_memscan(&self) -> Result<MemScan<'s, S>> {
        let handle: HostHandle = self.calls.one(Capability::CreateMemScan, Args::new())?;
        Ok(MemScan::new(
            self.calls,
            HostObject::owned(self.calls.session(), handle, "memscan"),
        ))
    }

    /// The memscan behind the main window. Owned by the host.
    pub fn current_memscan(&self) -> Result<MemScan<'s, S>> {
        let handle: HostHandle = self.calls.one(Capability::GetCurrentMemscan, Args::new())?;
        Ok(MemScan::new(
            self.calls,
            HostObject::borrowed(self.calls.session(), handle, "memscan"),
        ))
    }
}

/// A scan session in the host
pub struct MemScan<'s, S: LuaStack> {
    calls: Calls<'s, S, ScanError>,
    object: HostObject<'s, S>,
    generation: Cell<u64>,
    scanned: Cell<bool>,
    /// Found lists currently initialized against this memscan
    readable: RefCell<Vec<HostHandle>>,
}

impl<'s, S: LuaStack> MemScan<'s, S> {
    fn new(calls: Calls<'s, S, ScanError>, object: HostObject<'s, S>) -> Self {
        MemScan {
            calls,
            object,
            generation: Cell::new(0),
            scanned: Cell::new(false),
            readable: RefCell::new(Vec::new()),
        }
    }

    pub fn handle(&self) -> HostHandle {
        self.object.handle()
    }

    /// Number of scans started so far
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Start a new scan, discarding previous results
    pub fn first_scan(&self, params: &ScanParams) -> Result<()> {
        let operation = Capability::MemscanFirstScan;
        params.validate().map_err(|m| self.calls.usage(operation.name(), m))?;
        self.invalidate_lists();

        let args = Args::new()
            .arg(self.handle())
            .arg(params.option)
            .arg(params.var_type)
            .arg(params.rounding)
            .arg(params.input1.as_str())
            .arg(params.input2.as_str())
            .arg(Address::Absolute(params.start))
            .arg(Address::Absolute(params.stop))
            .arg(params.protection.as_str())
            .arg(params.alignment)
            .arg(params.alignment_param.as_str())
            .arg(params.hexadecimal)
            .arg(params.not_binary_string)
            .arg(params.unicode)
            .arg(params.case_sensitive);
        self.calls.none(operation, args)?;
        self.scanned.set(true);
        Ok(())
    }

    /// Refine the previous scan's results
    pub fn next_scan(&self, params: &ScanParams) -> Result<()> {
        let operation = Capability::MemscanNextScan;
        if !self.scanned.get() {
            return Err(self.calls.usage(operation.name(), "next scan before a first scan"));
        }
        params.validate().map_err(|m| self.calls.usage(operation.name(), m))?;
        self.invalidate_lists();

        let args = Args::new()
            .arg(self.handle())
            .arg(params.option)
            .arg(params.rounding)
            .arg(params.input1.as_str())
            .arg(params.input2.as_str())
            .arg(params.hexadecimal)
            .arg(params.not_binary_string)
            .arg(params.unicode)
            .arg(params.case_sensitive)
            .arg(params.percentage)
            .opt(params.saved_result.as_deref());
        self.calls.none(operation, args)
    }

    /// Block until the running scan finishes
    pub fn wait(&self) -> Result<()> {
        self.calls.none(Capability::MemscanWaitTillDone, Args::new().arg(self.handle()))
    }

    /// A new result list over this memscan, destroyed when dropped
    pub fn found_list(&self) -> Result<FoundList<'_, 's, S>> {
        let handle: HostHandle = self.calls.one(Capability::CreateFoundList, Args::new().arg(self.handle()))?;
        Ok(FoundList::new(
            self,
            HostObject::owned(self.calls.session(), handle, "found list"),
        ))
    }

    /// The list the memscan's own GUI reads from. It is shared with the host
    /// and never destroyed from here.
    #[deprecated(note = "aliases the memscan's own list; use found_list")]
    #[allow(deprecated)]
    pub fn attached_found_list(&self) -> Result<FoundList<'_, 's, S>> {
        let handle: HostHandle = self
            .calls
            .one(Capability::MemscanGetAttachedFoundlist, Args::new().arg(self.handle()))?;
        Ok(FoundList::new(
            self,
            HostObject::borrowed(self.calls.session(), handle, "found list"),
        ))
    }

    /// Deinitialize every readable list and start a new generation
    fn invalidate_lists(&self) {
        let lists: Vec<HostHandle> = self.readable.borrow_mut().drain(..).collect();
        for list in lists {
            if let Err(e) = self
                .calls
                .none(Capability::FoundlistDeinitialize, Args::new().arg(list))
            {
                warn!("failed to deinitialize found list {} before rescan: {}", list, e);
            }
        }
        self.generation.set(self.generation.get() + 1);
        debug!("memscan {} now at generation {}", self.handle(), self.generation.get());
    }

    fn register_readable(&self, list: HostHandle) {
        let mut readable = self.readable.borrow_mut();
        if !readable.contains(&list) {
            readable.push(list);
        }
    }

    fn unregister_readable(&self, list: HostHandle) {
        self.readable.borrow_mut().retain(|h| *h != list);
    }
}

/// Observable state of a [`FoundList`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoundListState {
    Uninitialized,
    Readable,
    /// The memscan started another scan after this list was initialized
    Invalid,
}

#[derive(Debug, Clone, Copy)]
enum ListState {
    Uninitialized,
    Readable { generation: u64, count: usize },
}

/// Results of a [`MemScan`]
pub struct FoundList<'m, 's, S: LuaStack> {
    scan: &'m MemScan<'s, S>,
    object: HostObject<'s, S>,
    state: ListState,
}

impl<'m, 's, S: LuaStack> FoundList<'m, 's, S> {
    fn new(scan: &'m MemScan<'s, S>, object: HostObject<'s, S>) -> Self {
        FoundList {
            scan,
            object,
            state: ListState::Uninitialized,
        }
    }

    pub fn handle(&self) -> HostHandle {
        self.object.handle()
    }

    pub fn state(&self) -> FoundListState {
        match self.state {
            ListState::Uninitialized => FoundListState::Uninitialized,
            ListState::Readable { generation, .. } if generation == self.scan.generation() => {
                FoundListState::Readable
            }
            ListState::Readable { .. } => FoundListState::Invalid,
        }
    }

    /// Load the memscan's current results; returns the result count
    pub fn initialize(&mut self) -> Result<usize> {
        if let (FoundListState::Readable, ListState::Readable { count, .. }) = (self.state(), self.state) {
            return Ok(count);
        }
        let calls = self.scan.calls;
        calls.none(Capability::FoundlistInitialize, Args::new().arg(self.handle()))?;
        self.scan.register_readable(self.handle());

        let count = match calls.one(Capability::FoundlistGetCount, Args::new().arg(self.handle())) {
            Ok(count) => count,
            Err(e) => {
                self.release_host_list();
                return Err(e);
            }
        };
        self.state = ListState::Readable {
            generation: self.scan.generation(),
            count,
        };
        Ok(count)
    }

    /// Release the loaded results. Safe to call in any state.
    pub fn deinitialize(&mut self) -> Result<()> {
        match self.state() {
            FoundListState::Uninitialized => Ok(()),
            // The memscan already deinitialized it before rescanning
            FoundListState::Invalid => {
                self.state = ListState::Uninitialized;
                Ok(())
            }
            FoundListState::Readable => {
                self.scan.unregister_readable(self.handle());
                self.state = ListState::Uninitialized;
                self.scan
                    .calls
                    .none(Capability::FoundlistDeinitialize, Args::new().arg(self.handle()))
            }
        }
    }

    fn readable_count(&self, operation: Capability) -> Result<usize> {
        match (self.state(), self.state) {
            (FoundListState::Readable, ListState::Readable { count, .. }) => Ok(count),
            (FoundListState::Invalid, _) => Err(self.scan.calls.stale(
                operation.name(),
                format!("found list {} was invalidated by a later scan", self.handle()),
            )),
            _ => Err(self.scan.calls.usage(
                operation.name(),
                format!("found list {} is not initialized", self.handle()),
            )),
        }
    }

    /// Result count as of [`FoundList::initialize`]
    pub fn count(&self) -> Result<usize> {
        self.readable_count(Capability::FoundlistGetCount)
    }

    fn check_index(&self, operation: Capability, index: usize) -> Result<()> {
        let count = self.readable_count(operation)?;
        if index >= count {
            return Err(self.scan.calls.usage(
                operation.name(),
                format!("index {} out of range ({} results)", index, count),
            ));
        }
        Ok(())
    }

    pub fn address(&self, index: usize) -> Result<u64> {
        let operation = Capability::FoundlistGetAddress;
        self.check_index(operation, index)?;
        self.scan.calls.one(operation, Args::new().arg(self.handle()).arg(index))
    }

    /// Value at the time of the scan, as the host renders it
    pub fn value(&self, index: usize) -> Result<String> {
        let operation = Capability::FoundlistGetValue;
        self.check_index(operation, index)?;
        self.scan.calls.one(operation, Args::new().arg(self.handle()).arg(index))
    }

    /// Every (address, value) pair
    pub fn entries(&self) -> Result<Vec<(u64, String)>> {
        let count = self.count()?;
        (0..count)
            .map(|i| Ok((self.address(i)?, self.value(i)?)))
            .collect()
    }

    fn release_host_list(&mut self) {
        self.scan.unregister_readable(self.handle());
        self.state = ListState::Uninitialized;
        if let Err(e) = self
            .scan
            .calls
            .none(Capability::FoundlistDeinitialize, Args::new().arg(self.handle()))
        {
            warn!("failed to deinitialize found list {}: {}", self.handle(), e);
        }
    }
}

impl<S: LuaStack> Drop for FoundList<'_, '_, S> {
    fn drop(&mut self) {
        if self.state() == FoundListState::Readable {
            self.release_host_list();
        }
    }
}

/// Wait for a memscan running on the host, giving up after `timeout`.
///
/// The outer result is the wait; the inner one is the host's answer. Timing
/// out leaves the scan running.
pub async fn wait_for_scan<S>(
    lock: &InterpreterLock<S>,
    memscan: HostHandle,
    timeout: Duration,
) -> std::result::Result<Result<()>, WaitError>
where
    S: LuaStack + Send + 'static,
{
    lock.run_blocking(timeout, move |session| {
        Calls::<S, ScanError>::new(session).none(Capability::MemscanWaitTillDone, Args::new().arg(memscan))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua::simulated::{SimLua, SimValue};

    #[test]
    fn test_pattern_validation() {
        assert!(check_pattern("48 8B ?? 05 *").is_ok());
        assert!(check_pattern("   ").is_err());
        assert!(check_pattern("48 8BX").is_err());
    }

    #[test]
    fn test_scan_option_inputs() {
        assert!(ScanOption::ExactValue.needs_input());
        assert!(!ScanOption::Changed.needs_input());
        assert!(ScanOption::IncreasedValueBy.is_relative());
        assert!(!ScanOption::BiggerThan.is_relative());
    }

    #[test]
    fn test_aob_alignment_fills_protection() {
        let options = AobOptions::default().aligned(Alignment::Aligned, "4");
        let args = options.push(Args::new().arg("90"));
        assert_eq!(args.len(), 4);
    }

    #[test]
    fn test_params_validation() {
        assert!(ScanParams::exact(VarType::Dword, 100).validate().is_ok());
        assert!(ScanParams::exact(VarType::Dword, "").validate().is_err());
        assert!(ScanParams::between(VarType::Single, 1.5, "").validate().is_err());
        assert!(ScanParams::compare(ScanOption::UnknownValue, VarType::Byte).validate().is_ok());
    }

    #[test]
    fn test_aob_scan_without_results() {
        let mut sim = SimLua::new();
        sim.register("AOBScan", |_, _| Ok(vec![SimValue::Nil]));
        let session = InterpreterSession::new(sim);

        assert_eq!(session.scanner().aob_scan("90 90", &AobOptions::default()), Ok(vec![]));
        assert_eq!(session.stack().calls().len(), 1);
    }

    #[test]
    fn test_current_memscan_is_not_destroyed() {
        let mut sim = SimLua::new();
        sim.register("getCurrentMemscan", |_, _| Ok(vec![SimValue::from(HostHandle(0x77))]));
        sim.register("object_destroy", |_, _| Ok(vec![]));
        let session = InterpreterSession::new(sim);

        drop(session.scanner().current_memscan().unwrap());
        assert!(session.stack().calls_to("object_destroy").is_empty());
    }
}
