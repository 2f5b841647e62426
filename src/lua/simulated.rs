//! Instrumented stand-in for the host interpreter
//!
//! [`SimLua`] implements [`LuaStack`] over an in-memory value stack. Host
//! functions are registered as Rust closures; every protected call is
//! recorded with its argument slots so tests can assert exactly what was
//! pushed. Failures can be injected through error values returned by the
//! closures or by limiting how many `check_stack` requests succeed.

use std::collections::HashMap;
use std::fmt;

use crate::lua::stack::{CallStatus, HostHandle, LuaStack, SlotType, MULTRET};

/// Index of a table in a [`SimHeap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(usize);

/// Index of a registered function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(usize);

/// A value held by the simulated interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum SimValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Vec<u8>),
    Table(TableId),
    Function(FunctionId),
    /// Boxed class instance
    Userdata(HostHandle),
    LightUserdata(HostHandle),
    Thread,
}

impl SimValue {
    pub fn slot_type(&self) -> SlotType {
        match self {
            SimValue::Nil => SlotType::Nil,
            SimValue::Bool(_) => SlotType::Boolean,
            SimValue::Int(_) | SimValue::Float(_) => SlotType::Number,
            SimValue::Str(_) => SlotType::String,
            SimValue::Table(_) => SlotType::Table,
            SimValue::Function(_) => SlotType::Function,
            SimValue::Userdata(_) => SlotType::Userdata,
            SimValue::LightUserdata(_) => SlotType::LightUserdata,
            SimValue::Thread => SlotType::Thread,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, SimValue::Nil)
    }

    /// Lua truthiness
    pub fn truthy(&self) -> bool {
        !matches!(self, SimValue::Nil | SimValue::Bool(false))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SimValue::Int(n) => Some(*n),
            SimValue::Float(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            SimValue::Int(n) => Some(*n as f64),
            SimValue::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SimValue::Str(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SimValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<HostHandle> {
        match self {
            SimValue::Userdata(h) | SimValue::LightUserdata(h) => Some(*h),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<TableId> {
        match self {
            SimValue::Table(id) => Some(*id),
            _ => None,
        }
    }

    /// Integral floats are stored under their integer key, as Lua does
    fn normalize_key(self) -> SimValue {
        match self {
            SimValue::Float(n) if n.fract() == 0.0 => SimValue::Int(n as i64),
            other => other,
        }
    }
}

impl From<bool> for SimValue {
    fn from(value: bool) -> Self {
        SimValue::Bool(value)
    }
}

impl From<i64> for SimValue {
    fn from(value: i64) -> Self {
        SimValue::Int(value)
    }
}

impl From<i32> for SimValue {
    fn from(value: i32) -> Self {
        SimValue::Int(value.into())
    }
}

impl From<f64> for SimValue {
    fn from(value: f64) -> Self {
        SimValue::Float(value)
    }
}

impl From<&str> for SimValue {
    fn from(value: &str) -> Self {
        SimValue::Str(value.as_bytes().to_vec())
    }
}

impl From<String> for SimValue {
    fn from(value: String) -> Self {
        SimValue::Str(value.into_bytes())
    }
}

impl From<HostHandle> for SimValue {
    fn from(value: HostHandle) -> Self {
        SimValue::Userdata(value)
    }
}

/// Table storage; insertion order is iteration order
#[derive(Debug, Default)]
pub struct SimHeap {
    tables: Vec<Vec<(SimValue, SimValue)>>,
}

impl SimHeap {
    /// Allocate a table with the given entries
    pub fn new_table(&mut self, entries: Vec<(SimValue, SimValue)>) -> SimValue {
        let id = TableId(self.tables.len());
        self.tables.push(Vec::new());
        for (key, value) in entries {
            self.set(id, key, value);
        }
        SimValue::Table(id)
    }

    /// Allocate a sequence `{v1, v2, ...}`
    pub fn new_list(&mut self, items: Vec<SimValue>) -> SimValue {
        let entries = items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (SimValue::Int(i as i64 + 1), v))
            .collect();
        self.new_table(entries)
    }

    /// `t[key]`, nil when absent
    pub fn get(&self, table: TableId, key: &SimValue) -> SimValue {
        let key = key.clone().normalize_key();
        self.tables
            .get(table.0)
            .and_then(|entries| entries.iter().find(|(k, _)| *k == key))
            .map(|(_, v)| v.clone())
            .unwrap_or(SimValue::Nil)
    }

    /// `t[key] = value`; assigning nil removes the entry
    pub fn set(&mut self, table: TableId, key: SimValue, value: SimValue) {
        let key = key.normalize_key();
        let Some(entries) = self.tables.get_mut(table.0) else {
            return;
        };
        let existing = entries.iter().position(|(k, _)| *k == key);
        match (existing, value.is_nil()) {
            (Some(pos), true) => {
                entries.remove(pos);
            }
            (Some(pos), false) => entries[pos].1 = value,
            (None, false) => entries.push((key, value)),
            (None, true) => {}
        }
    }

    /// Entries in iteration order
    pub fn entries(&self, table: TableId) -> &[(SimValue, SimValue)] {
        self.tables.get(table.0).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sequence part `t[1..n]`
    pub fn list(&self, table: TableId) -> Vec<SimValue> {
        let mut items = Vec::new();
        loop {
            let value = self.get(table, &SimValue::Int(items.len() as i64 + 1));
            if value.is_nil() {
                return items;
            }
            items.push(value);
        }
    }

    /// Key after `key` in iteration order (nil starts the traversal)
    fn next_entry(&self, table: TableId, key: &SimValue) -> Option<(SimValue, SimValue)> {
        let entries = self.tables.get(table.0)?;
        let start = if key.is_nil() {
            0
        } else {
            entries.iter().position(|(k, _)| k == key)? + 1
        };
        entries.get(start).cloned()
    }
}

/// Closure standing in for a host function
pub type SimFunction =
    Box<dyn FnMut(&mut SimHeap, &[SimValue]) -> Result<Vec<SimValue>, SimValue> + Send>;

/// One recorded protected call
#[derive(Debug, Clone, PartialEq)]
pub struct SimCall {
    /// Global name the function was registered under
    pub name: String,
    /// Argument slots exactly as pushed
    pub args: Vec<SimValue>,
}

/// Fake interpreter state
pub struct SimLua {
    stack: Vec<SimValue>,
    globals: HashMap<String, SimValue>,
    functions: Vec<(String, SimFunction)>,
    heap: SimHeap,
    calls: Vec<SimCall>,
    pushes: usize,
    stack_limit: usize,
    check_stack_budget: Option<usize>,
}

impl fmt::Debug for SimLua {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimLua")
            .field("stack", &self.stack)
            .field("globals", &self.globals.len())
            .field("calls", &self.calls.len())
            .finish()
    }
}

impl Default for SimLua {
    fn default() -> Self {
        SimLua::new()
    }
}

impl SimLua {
    /// Default stack ceiling, matching `LUAI_MAXSTACK`
    pub const DEFAULT_STACK_LIMIT: usize = 1_000_000;

    pub fn new() -> Self {
        SimLua {
            stack: Vec::new(),
            globals: HashMap::new(),
            functions: Vec::new(),
            heap: SimHeap::default(),
            calls: Vec::new(),
            pushes: 0,
            stack_limit: Self::DEFAULT_STACK_LIMIT,
            check_stack_budget: None,
        }
    }

    /// Register a host function whose failures are plain messages
    pub fn register<F>(&mut self, name: &str, mut f: F)
    where
        F: FnMut(&mut SimHeap, &[SimValue]) -> Result<Vec<SimValue>, String> + Send + 'static,
    {
        self.register_raw(name, move |heap, args| f(heap, args).map_err(SimValue::from));
    }

    /// Register a host function that may raise any error object
    pub fn register_raw<F>(&mut self, name: &str, f: F)
    where
        F: FnMut(&mut SimHeap, &[SimValue]) -> Result<Vec<SimValue>, SimValue> + Send + 'static,
    {
        let id = FunctionId(self.functions.len());
        self.functions.push((name.to_string(), Box::new(f)));
        self.globals.insert(name.to_string(), SimValue::Function(id));
    }

    pub fn set_global(&mut self, name: &str, value: SimValue) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn remove_global(&mut self, name: &str) {
        self.globals.remove(name);
    }

    pub fn heap(&self) -> &SimHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut SimHeap {
        &mut self.heap
    }

    /// Allocate a table on the heap
    pub fn new_table(&mut self, entries: Vec<(SimValue, SimValue)>) -> SimValue {
        self.heap.new_table(entries)
    }

    /// Push a value directly, bypassing the push counter
    pub fn push_sim(&mut self, value: SimValue) {
        self.stack.push(value);
    }

    /// Slot at a stack index
    pub fn value_at(&self, idx: i32) -> Option<&SimValue> {
        self.slot_pos(idx).map(|pos| &self.stack[pos])
    }

    /// Every protected call made so far
    pub fn calls(&self) -> &[SimCall] {
        &self.calls
    }

    /// Calls made to one function
    pub fn calls_to(&self, name: &str) -> Vec<&SimCall> {
        self.calls.iter().filter(|c| c.name == name).collect()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Number of values pushed through [`LuaStack`] push operations
    pub fn push_count(&self) -> usize {
        self.pushes
    }

    pub fn set_stack_limit(&mut self, limit: usize) {
        self.stack_limit = limit;
    }

    /// Let the next `successes` `check_stack` requests succeed, then refuse
    /// every later one
    pub fn fail_check_stack_after(&mut self, successes: usize) {
        self.check_stack_budget = Some(successes);
    }

    fn slot_pos(&self, idx: i32) -> Option<usize> {
        let len = self.stack.len() as i32;
        let pos = if idx > 0 {
            idx - 1
        } else if idx < 0 && -idx <= len {
            len + idx
        } else {
            return None;
        };
        (pos < len).then_some(pos as usize)
    }

    fn slot(&self, idx: i32) -> &SimValue {
        const NONE: &SimValue = &SimValue::Nil;
        self.slot_pos(idx).map(|pos| &self.stack[pos]).unwrap_or(NONE)
    }

    fn push(&mut self, value: SimValue) {
        self.pushes += 1;
        self.stack.push(value);
    }
}

impl LuaStack for SimLua {
    fn top(&self) -> i32 {
        self.stack.len() as i32
    }

    fn set_top(&mut self, top: i32) {
        let new_len = if top >= 0 {
            top as usize
        } else {
            (self.stack.len() as i32 + top + 1).max(0) as usize
        };
        self.stack.resize(new_len, SimValue::Nil);
    }

    fn check_stack(&mut self, extra: i32) -> bool {
        if let Some(budget) = self.check_stack_budget.as_mut() {
            if *budget == 0 {
                return false;
            }
            *budget -= 1;
        }
        self.stack.len() + extra.max(0) as usize <= self.stack_limit
    }

    fn get_global(&mut self, name: &str) -> SlotType {
        let value = self.globals.get(name).cloned().unwrap_or(SimValue::Nil);
        let kind = value.slot_type();
        self.stack.push(value);
        kind
    }

    fn push_nil(&mut self) {
        self.push(SimValue::Nil);
    }

    fn push_boolean(&mut self, value: bool) {
        self.push(SimValue::Bool(value));
    }

    fn push_integer(&mut self, value: i64) {
        self.push(SimValue::Int(value));
    }

    fn push_number(&mut self, value: f64) {
        self.push(SimValue::Float(value));
    }

    fn push_bytes(&mut self, value: &[u8]) {
        self.push(SimValue::Str(value.to_vec()));
    }

    fn push_handle(&mut self, handle: HostHandle) {
        self.push(SimValue::Userdata(handle));
    }

    fn push_value(&mut self, idx: i32) {
        let value = self.slot(idx).clone();
        self.push(value);
    }

    fn create_table(&mut self, _array_hint: i32, _record_hint: i32) {
        let table = self.heap.new_table(Vec::new());
        self.push(table);
    }

    fn raw_set_index(&mut self, table: i32, n: i64) {
        let target = self.slot(table).as_table();
        let value = self.stack.pop().unwrap_or(SimValue::Nil);
        if let Some(id) = target {
            self.heap.set(id, SimValue::Int(n), value);
        }
    }

    fn slot_type(&self, idx: i32) -> SlotType {
        match self.slot_pos(idx) {
            Some(pos) => self.stack[pos].slot_type(),
            None => SlotType::None,
        }
    }

    fn is_integer(&self, idx: i32) -> bool {
        matches!(self.slot(idx), SimValue::Int(_))
    }

    fn to_boolean(&self, idx: i32) -> bool {
        self.slot(idx).truthy()
    }

    fn to_integer(&self, idx: i32) -> Option<i64> {
        self.slot(idx).as_int()
    }

    fn to_number(&self, idx: i32) -> Option<f64> {
        self.slot(idx).as_float()
    }

    fn to_bytes(&self, idx: i32) -> Option<Vec<u8>> {
        match self.slot(idx) {
            SimValue::Str(bytes) => Some(bytes.clone()),
            SimValue::Int(n) => Some(n.to_string().into_bytes()),
            SimValue::Float(n) => Some(n.to_string().into_bytes()),
            _ => None,
        }
    }

    fn to_handle(&self, idx: i32) -> Option<HostHandle> {
        self.slot(idx).as_handle()
    }

    fn next(&mut self, table: i32) -> bool {
        let target = self.slot(table).as_table();
        let key = self.stack.pop().unwrap_or(SimValue::Nil);
        let entry = target.and_then(|id| self.heap.next_entry(id, &key));
        match entry {
            Some((k, v)) => {
                self.stack.push(k);
                self.stack.push(v);
                true
            }
            None => false,
        }
    }

    fn pcall(&mut self, nargs: i32, nresults: i32) -> CallStatus {
        let nargs = nargs.max(0) as usize;
        if self.stack.len() < nargs + 1 {
            self.stack.push(SimValue::from("attempt to call a nil value"));
            return CallStatus::Runtime;
        }
        let args = self.stack.split_off(self.stack.len() - nargs);
        let callee = self.stack.pop().unwrap_or(SimValue::Nil);

        let SimValue::Function(FunctionId(id)) = callee else {
            let message = format!("attempt to call a {} value", callee.slot_type());
            self.stack.push(SimValue::from(message));
            return CallStatus::Runtime;
        };

        let (name, function) = &mut self.functions[id];
        self.calls.push(SimCall {
            name: name.clone(),
            args: args.clone(),
        });

        match function(&mut self.heap, &args) {
            Ok(mut results) => {
                if nresults != MULTRET {
                    results.resize(nresults.max(0) as usize, SimValue::Nil);
                }
                self.stack.extend(results);
                CallStatus::Ok
            }
            Err(error) => {
                self.stack.push(error);
                CallStatus::Runtime
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcall_records_arguments() {
        let mut sim = SimLua::new();
        sim.register("add", |_, args| {
            let sum = args.iter().filter_map(SimValue::as_int).sum::<i64>();
            Ok(vec![SimValue::Int(sum)])
        });

        sim.get_global("add");
        sim.push_integer(2);
        sim.push_integer(3);
        assert!(sim.pcall(2, 1).is_ok());

        assert_eq!(sim.top(), 1);
        assert_eq!(sim.value_at(-1), Some(&SimValue::Int(5)));
        assert_eq!(sim.calls()[0].name, "add");
        assert_eq!(sim.calls()[0].args, vec![SimValue::Int(2), SimValue::Int(3)]);
        assert_eq!(sim.push_count(), 2);
    }

    #[test]
    fn test_pcall_pads_and_truncates_results() {
        let mut sim = SimLua::new();
        sim.register("two", |_, _| Ok(vec![SimValue::Int(1), SimValue::Int(2)]));

        sim.get_global("two");
        sim.pcall(0, 3);
        assert_eq!(sim.top(), 3);
        assert_eq!(sim.value_at(3), Some(&SimValue::Nil));

        sim.set_top(0);
        sim.get_global("two");
        sim.pcall(0, 1);
        assert_eq!(sim.top(), 1);
    }

    #[test]
    fn test_calling_a_non_function() {
        let mut sim = SimLua::new();
        sim.push_nil();
        assert_eq!(sim.pcall(0, 0), CallStatus::Runtime);
        assert_eq!(sim.to_bytes(-1), Some(b"attempt to call a nil value".to_vec()));
    }

    #[test]
    fn test_next_walks_in_insertion_order() {
        let mut sim = SimLua::new();
        let t = sim.new_table(vec![
            (SimValue::from("b"), SimValue::Int(2)),
            (SimValue::from("a"), SimValue::Int(1)),
        ]);
        sim.push_sim(t);

        let mut keys = Vec::new();
        sim.push_nil();
        while sim.next(1) {
            keys.push(sim.value_at(-2).and_then(SimValue::as_str).map(str::to_string));
            sim.set_top(-2);
        }
        assert_eq!(keys, vec![Some("b".to_string()), Some("a".to_string())]);
        assert_eq!(sim.top(), 1);
    }

    #[test]
    fn test_heap_assignment() {
        let mut heap = SimHeap::default();
        let t = heap.new_list(vec![SimValue::Int(10), SimValue::Int(20)]);
        let id = t.as_table().unwrap();

        heap.set(id, SimValue::Float(3.0), SimValue::Int(30));
        assert_eq!(heap.list(id).len(), 3);

        heap.set(id, SimValue::Int(2), SimValue::Nil);
        assert_eq!(heap.list(id), vec![SimValue::Int(10)]);
        assert_eq!(heap.get(id, &SimValue::Int(3)), SimValue::Int(30));
    }

    #[test]
    fn test_check_stack_budget() {
        let mut sim = SimLua::new();
        sim.fail_check_stack_after(1);
        assert!(sim.check_stack(1));
        assert!(!sim.check_stack(1));

        let mut sim = SimLua::new();
        sim.set_stack_limit(2);
        assert!(sim.check_stack(2));
        assert!(!sim.check_stack(3));
    }
}
