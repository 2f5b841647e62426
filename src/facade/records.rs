//! Cheat table records
//!
//! The address list is a GUI singleton owned by the host, and so is every
//! record in it. Neither is ever destroyed from here.

use crate::error::RecordError;
use crate::facade::Calls;
use crate::lua::capability::Capability;
use crate::lua::invoker::Args;
use crate::lua::session::{HostObject, InterpreterSession};
use crate::lua::stack::{HostHandle, LuaStack};
use crate::lua::value::Address;

type Result<T> = std::result::Result<T, RecordError>;

/// The host's address list
pub struct AddressList<'s, S: LuaStack> {
    calls: Calls<'s, S, RecordError>,
    object: HostObject<'s, S>,
}

impl<'s, S: LuaStack> AddressList<'s, S> {
    /// The list shown in the main window
    pub fn current(session: &'s InterpreterSession<S>) -> Result<Self> {
        let calls = Calls::new(session);
        let handle: HostHandle = calls.one(Capability::GetAddressList, Args::new())?;
        Ok(AddressList {
            calls,
            object: HostObject::borrowed(session, handle, "address list"),
        })
    }

    pub fn handle(&self) -> HostHandle {
        self.object.handle()
    }

    pub fn count(&self) -> Result<usize> {
        self.calls.one(Capability::AddresslistGetCount, Args::new().arg(self.handle()))
    }

    /// Record at a 0-based index
    pub fn record(&self, index: usize) -> Result<MemoryRecord<'s, S>> {
        let count = self.count()?;
        if index >= count {
            return Err(self.calls.usage(
                Capability::AddresslistGetMemoryRecord.name(),
                format!("record index {} out of range ({} records)", index, count),
            ));
        }
        self.record_unchecked(index)
    }

    fn record_unchecked(&self, index: usize) -> Result<MemoryRecord<'s, S>> {
        let args = Args::new().arg(self.handle()).arg(index);
        let handle = self.calls.required(Capability::AddresslistGetMemoryRecord, args, || {
            format!("no record at index {}", index)
        })?;
        Ok(MemoryRecord::new(self.calls, handle))
    }

    /// First record with this description
    pub fn find(&self, description: &str) -> Result<Option<MemoryRecord<'s, S>>> {
        let args = Args::new().arg(self.handle()).arg(description);
        let handle: Option<HostHandle> = self
            .calls
            .one(Capability::AddresslistGetMemoryRecordByDescription, args)?;
        Ok(handle.map(|h| MemoryRecord::new(self.calls, h)))
    }

    /// Append a new, empty record
    pub fn create(&self) -> Result<MemoryRecord<'s, S>> {
        let handle = self.calls.required(
            Capability::AddresslistCreateMemoryRecord,
            Args::new().arg(self.handle()),
            || "record was not created".to_string(),
        )?;
        Ok(MemoryRecord::new(self.calls, handle))
    }

    /// Every record, in list order
    pub fn records(&self) -> Result<Vec<MemoryRecord<'s, S>>> {
        (0..self.count()?).map(|i| self.record_unchecked(i)).collect()
    }
}

/// One entry of the address list
pub struct MemoryRecord<'s, S: LuaStack> {
    calls: Calls<'s, S, RecordError>,
    handle: HostHandle,
}

impl<'s, S: LuaStack> MemoryRecord<'s, S> {
    fn new(calls: Calls<'s, S, RecordError>, handle: HostHandle) -> Self {
        MemoryRecord { calls, handle }
    }

    pub fn handle(&self) -> HostHandle {
        self.handle
    }

    fn args(&self) -> Args {
        Args::new().arg(self.handle)
    }

    pub fn description(&self) -> Result<String> {
        self.calls.one(Capability::MemoryrecordGetDescription, self.args())
    }

    pub fn set_description(&self, description: &str) -> Result<()> {
        self.calls
            .none(Capability::MemoryrecordSetDescription, self.args().arg(description))
    }

    /// Resolved address of the record
    pub fn address(&self) -> Result<u64> {
        self.calls.one(Capability::MemoryrecordGetAddress, self.args())
    }

    /// Set the address; symbolic expressions are kept as written
    pub fn set_address(&self, address: impl Into<Address>) -> Result<()> {
        let text = match address.into() {
            Address::Absolute(a) => format!("{:X}", a),
            Address::Symbolic(expr) => expr,
        };
        self.calls.none(Capability::MemoryrecordSetAddress, self.args().arg(text))
    }

    /// Current value as the host renders it
    pub fn value(&self) -> Result<String> {
        self.calls.one(Capability::MemoryrecordGetValue, self.args())
    }

    pub fn set_value(&self, value: &str) -> Result<()> {
        self.calls.none(Capability::MemoryrecordSetValue, self.args().arg(value))
    }

    pub fn is_active(&self) -> Result<bool> {
        self.calls.one(Capability::MemoryrecordIsActive, self.args())
    }

    pub fn freeze(&self) -> Result<()> {
        self.calls.none(Capability::MemoryrecordFreeze, self.args())
    }

    pub fn unfreeze(&self) -> Result<()> {
        self.calls.none(Capability::MemoryrecordUnfreeze, self.args())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua::simulated::{SimLua, SimValue};
    use std::sync::{Arc, Mutex};

    const LIST: HostHandle = HostHandle(0xA000);

    /// Address list with records at handles 0xB000, 0xB001, ...
    fn records_sim(descriptions: &[&str]) -> SimLua {
        let records: Arc<Mutex<Vec<String>>> =
            Arc::new(Mutex::new(descriptions.iter().map(|d| d.to_string()).collect()));
        let mut sim = SimLua::new();
        sim.register("getAddressList", |_, _| Ok(vec![SimValue::from(LIST)]));

        let r = records.clone();
        sim.register("addresslist_getCount", move |_, _| {
            Ok(vec![SimValue::Int(r.lock().unwrap().len() as i64)])
        });
        sim.register("addresslist_getMemoryRecord", |_, args| {
            let i = args[1].as_int().ok_or("bad index")?;
            Ok(vec![SimValue::from(HostHandle(0xB000 + i as usize))])
        });
        let r = records.clone();
        sim.register("addresslist_getMemoryRecordByDescription", move |_, args| {
            let wanted = args[1].as_str().unwrap_or_default();
            let pos = r.lock().unwrap().iter().position(|d| d == wanted);
            Ok(vec![pos
                .map(|i| SimValue::from(HostHandle(0xB000 + i)))
                .unwrap_or(SimValue::Nil)])
        });
        let r = records.clone();
        sim.register("memoryrecord_getDescription", move |_, args| {
            let i = args[0].as_handle().ok_or("bad record")?.as_usize() - 0xB000;
            Ok(vec![SimValue::from(r.lock().unwrap()[i].clone())])
        });
        sim.register("memoryrecord_setAddress", |_, _| Ok(vec![]));
        sim.register("object_destroy", |_, _| Err("address list must not be destroyed".to_string()));
        sim
    }

    #[test]
    fn test_records_in_order() {
        let session = InterpreterSession::new(records_sim(&["health", "ammo"]));
        let list = session.address_list().unwrap();

        let descriptions: Vec<String> = list
            .records()
            .unwrap()
            .iter()
            .map(|r| r.description().unwrap())
            .collect();
        assert_eq!(descriptions, vec!["health", "ammo"]);
        // One count for the whole listing
        assert_eq!(session.stack().calls_to("addresslist_getCount").len(), 1);
    }

    #[test]
    fn test_index_out_of_range() {
        let session = InterpreterSession::new(records_sim(&["health"]));
        let list = session.address_list().unwrap();
        let err = list.record(3).err().unwrap();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_find_by_description() {
        let session = InterpreterSession::new(records_sim(&["health", "ammo"]));
        let list = session.address_list().unwrap();
        assert_eq!(list.find("ammo").unwrap().map(|r| r.handle()), Some(HostHandle(0xB001)));
        assert!(list.find("gold").unwrap().is_none());
    }

    #[test]
    fn test_set_address_renders_hex() {
        let session = InterpreterSession::new(records_sim(&["health"]));
        {
            let list = session.address_list().unwrap();
            list.record(0).unwrap().set_address(0x1234ABu64).unwrap();
        }
        let stack = session.stack();
        assert_eq!(stack.calls_to("memoryrecord_setAddress")[0].args[1], SimValue::from("1234AB"));
        // The list is borrowed from the host and never destroyed
        assert!(stack.calls_to("object_destroy").is_empty());
    }
}
