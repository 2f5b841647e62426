//! Target memory access

use crate::error::MemoryError;
use crate::facade::Calls;
use crate::lua::capability::Capability;
use crate::lua::invoker::Args;
use crate::lua::session::InterpreterSession;
use crate::lua::stack::LuaStack;
use crate::lua::value::{Address, FromLua, LuaArg};

type Result<T> = std::result::Result<T, MemoryError>;

/// Reads, writes and allocations in the opened process
pub struct Memory<'s, S: LuaStack> {
    calls: Calls<'s, S, MemoryError>,
}

impl<'s, S: LuaStack> Memory<'s, S> {
    pub fn new(session: &'s InterpreterSession<S>) -> Self {
        Memory {
            calls: Calls::new(session),
        }
    }

    fn read<T: FromLua>(&self, capability: Capability, address: Address, args: Args) -> Result<T> {
        self.calls.required(capability, args, || format!("{} is not readable", address))
    }

    /// Read `count` bytes. The byte table is decoded whole regardless of the
    /// session's entry ceiling.
    pub fn read_bytes(&self, address: impl Into<Address>, count: usize) -> Result<Vec<u8>> {
        let address = address.into();
        let args = Args::new().arg(address.clone()).arg(count).arg(true);
        self.calls
            .required_sized(Capability::ReadBytes, args, count, || format!("{} is not readable", address))
    }

    pub fn read_i16(&self, address: impl Into<Address>) -> Result<i16> {
        let address = address.into();
        let args = Args::new().arg(address.clone()).arg(true);
        self.read(Capability::ReadSmallInteger, address, args)
    }

    pub fn read_u16(&self, address: impl Into<Address>) -> Result<u16> {
        let address = address.into();
        let args = Args::new().arg(address.clone());
        self.read(Capability::ReadSmallInteger, address, args)
    }

    pub fn read_i32(&self, address: impl Into<Address>) -> Result<i32> {
        let address = address.into();
        let args = Args::new().arg(address.clone()).arg(true);
        self.read(Capability::ReadInteger, address, args)
    }

    pub fn read_u32(&self, address: impl Into<Address>) -> Result<u32> {
        let address = address.into();
        let args = Args::new().arg(address.clone());
        self.read(Capability::ReadInteger, address, args)
    }

    pub fn read_i64(&self, address: impl Into<Address>) -> Result<i64> {
        let address = address.into();
        let args = Args::new().arg(address.clone());
        self.read(Capability::ReadQword, address, args)
    }

    pub fn read_u64(&self, address: impl Into<Address>) -> Result<u64> {
        let address = address.into();
        let args = Args::new().arg(address.clone());
        self.read(Capability::ReadQword, address, args)
    }

    /// Pointer-sized read; 4 bytes on 32-bit targets
    pub fn read_pointer(&self, address: impl Into<Address>) -> Result<u64> {
        let address = address.into();
        let args = Args::new().arg(address.clone());
        self.read(Capability::ReadPointer, address, args)
    }

    pub fn read_f32(&self, address: impl Into<Address>) -> Result<f32> {
        let address = address.into();
        let args = Args::new().arg(address.clone());
        self.read(Capability::ReadFloat, address, args)
    }

    pub fn read_f64(&self, address: impl Into<Address>) -> Result<f64> {
        let address = address.into();
        let args = Args::new().arg(address.clone());
        self.read(Capability::ReadDouble, address, args)
    }

    /// Zero-terminated string of at most `max_len` characters
    pub fn read_string(&self, address: impl Into<Address>, max_len: usize) -> Result<String> {
        let address = address.into();
        let args = Args::new().arg(address.clone()).arg(max_len);
        self.read(Capability::ReadString, address, args)
    }

    /// UTF-16 variant of [`Memory::read_string`]
    pub fn read_wide_string(&self, address: impl Into<Address>, max_len: usize) -> Result<String> {
        let address = address.into();
        let args = Args::new().arg(address.clone()).arg(max_len).arg(true);
        self.read(Capability::ReadString, address, args)
    }

    fn write(&self, capability: Capability, address: Address, value: impl Into<LuaArg>) -> Result<()> {
        let args = Args::new().arg(address.clone()).arg(value);
        self.calls.checked(capability, args, || format!("{} is not writable", address))
    }

    pub fn write_bytes(&self, address: impl Into<Address>, bytes: &[u8]) -> Result<()> {
        self.write(Capability::WriteBytes, address.into(), bytes)
    }

    pub fn write_i16(&self, address: impl Into<Address>, value: i16) -> Result<()> {
        self.write(Capability::WriteSmallInteger, address.into(), value)
    }

    pub fn write_i32(&self, address: impl Into<Address>, value: i32) -> Result<()> {
        self.write(Capability::WriteInteger, address.into(), value)
    }

    pub fn write_i64(&self, address: impl Into<Address>, value: i64) -> Result<()> {
        self.write(Capability::WriteQword, address.into(), value)
    }

    pub fn write_f32(&self, address: impl Into<Address>, value: f32) -> Result<()> {
        self.write(Capability::WriteFloat, address.into(), value)
    }

    pub fn write_f64(&self, address: impl Into<Address>, value: f64) -> Result<()> {
        self.write(Capability::WriteDouble, address.into(), value)
    }

    pub fn write_string(&self, address: impl Into<Address>, text: &str) -> Result<()> {
        self.write(Capability::WriteString, address.into(), text)
    }

    pub fn write_wide_string(&self, address: impl Into<Address>, text: &str) -> Result<()> {
        let address = address.into();
        let args = Args::new().arg(address.clone()).arg(text).arg(true);
        self.calls.checked(Capability::WriteString, args, || {
            format!("{} is not writable", address)
        })
    }

    /// Allocate `size` bytes in the target, optionally near `base`
    pub fn allocate(&self, size: usize, base: Option<Address>) -> Result<u64> {
        let args = Args::new().arg(size).opt(base);
        self.calls.required(Capability::AllocateMemory, args, || {
            format!("could not allocate {} bytes", size)
        })
    }

    /// Free memory returned by [`Memory::allocate`]
    pub fn free(&self, address: impl Into<Address>) -> Result<()> {
        self.calls.none(Capability::DeAlloc, Args::new().arg(address.into()))
    }
}
