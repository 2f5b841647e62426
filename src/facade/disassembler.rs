//! Disassembly of target code

use crate::error::{DisassemblyError, LuaCallError};
use crate::facade::Calls;
use crate::lua::capability::Capability;
use crate::lua::invoker::{Args, Returns};
use crate::lua::session::InterpreterSession;
use crate::lua::stack::LuaStack;
use crate::lua::value::{parse_address_text, Address, FromLua, LuaValue};

type Result<T> = std::result::Result<T, DisassemblyError>;

/// One decoded instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub address: u64,
    pub bytes: Vec<u8>,
    /// Mnemonic and operands, e.g. `mov eax,[rbx+10]`
    pub opcode: String,
    /// Comment field the host appends (referenced values, symbols)
    pub extra: String,
    /// The line exactly as the host rendered it
    pub text: String,
}

impl Instruction {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub struct Disassembler<'s, S: LuaStack> {
    calls: Calls<'s, S, DisassemblyError>,
}

impl<'s, S: LuaStack> Disassembler<'s, S> {
    pub fn new(session: &'s InterpreterSession<S>) -> Self {
        Disassembler {
            calls: Calls::new(session),
        }
    }

    /// Host-rendered line: `address - bytes - opcode : extra`
    pub fn disassemble(&self, address: impl Into<Address>) -> Result<String> {
        self.calls.one(Capability::Disassemble, Args::new().arg(address.into()))
    }

    /// Split a rendered line into (address, bytes, opcode, extra)
    pub fn split(&self, line: &str) -> Result<(String, String, String, String)> {
        let capability = Capability::SplitDisassembledString;
        let parts: Vec<LuaValue> = self.calls.many(capability, Args::new().arg(line), Returns::Exactly(4))?;
        let mut parts = parts.into_iter().map(|v| Option::<String>::from_lua(v).map(Option::unwrap_or_default));
        let mut next = || self.calls.project(capability, parts.next().unwrap_or(Ok(String::new())));
        Ok((next()?, next()?, next()?, next()?))
    }

    pub fn instruction_size(&self, address: impl Into<Address>) -> Result<usize> {
        let address = address.into();
        self.calls.required(Capability::GetInstructionSize, Args::new().arg(address.clone()), || {
            format!("no instruction at {}", address)
        })
    }

    /// Start of the instruction that ends right before `address`
    pub fn previous_instruction(&self, address: impl Into<Address>) -> Result<u64> {
        let address = address.into();
        self.calls.required(Capability::GetPreviousOpcode, Args::new().arg(address.clone()), || {
            format!("no instruction before {}", address)
        })
    }

    /// Disassemble and split into a typed [`Instruction`]
    pub fn instruction(&self, address: u64) -> Result<Instruction> {
        let text = self.disassemble(address)?;
        let (addr, bytes, opcode, extra) = self.split(&text)?;
        // The address column may be symbolic (`game.exe+1F00`)
        let parsed = parse_address_text(&addr).unwrap_or(address);
        let bytes = self
            .calls
            .project(Capability::SplitDisassembledString, parse_byte_column(&bytes))?;
        Ok(Instruction {
            address: parsed,
            bytes,
            opcode,
            extra,
            text,
        })
    }
}

/// `"48 8B 05 10"` to bytes
fn parse_byte_column(column: &str) -> crate::error::Result<Vec<u8>> {
    column
        .split_whitespace()
        .map(|b| {
            u8::from_str_radix(b, 16)
                .map_err(|_| LuaCallError::Marshalling(format!("malformed byte {:?} in {:?}", b, column)))
        })
        .collect()
}
