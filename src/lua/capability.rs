//! Closed registry of host functions the facade may call
//!
//! Every entry carries the host global name and its positional schema. The
//! invoker refuses argument lists that do not fit the schema before touching
//! the stack.

use std::fmt;

/// Positional argument schema of a host function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    /// Arguments that must always be pushed
    pub required: usize,
    /// Trailing arguments that may be omitted
    pub optional: usize,
}

impl Schema {
    /// Whether `count` pushed arguments fit this schema
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.required && count <= self.required + self.optional
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional == 0 {
            write!(f, "{} argument(s)", self.required)
        } else {
            write!(f, "{} to {} argument(s)", self.required, self.required + self.optional)
        }
    }
}

macro_rules! capabilities {
    ($($(#[$meta:meta])* $variant:ident => $name:literal ($req:expr, $opt:expr),)*) => {
        /// A host global known to the facade
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Capability {
            $($(#[$meta])* $variant,)*
        }

        #[allow(deprecated)]
        impl Capability {
            /// Every registered capability
            pub const ALL: &'static [Capability] = &[$(Capability::$variant,)*];

            /// Global name in the host's interpreter
            pub fn name(self) -> &'static str {
                match self {
                    $(Capability::$variant => $name,)*
                }
            }

            /// Positional argument schema
            pub fn schema(self) -> Schema {
                match self {
                    $(Capability::$variant => Schema { required: $req, optional: $opt },)*
                }
            }

            /// Look a capability up by its global name
            pub fn from_name(name: &str) -> Option<Capability> {
                match name {
                    $($name => Some(Capability::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

capabilities! {
    // Memory
    ReadBytes => "readBytes" (1, 2),
    ReadSmallInteger => "readSmallInteger" (1, 1),
    ReadInteger => "readInteger" (1, 1),
    ReadQword => "readQword" (1, 0),
    ReadPointer => "readPointer" (1, 0),
    ReadFloat => "readFloat" (1, 0),
    ReadDouble => "readDouble" (1, 0),
    ReadString => "readString" (1, 2),
    WriteBytes => "writeBytes" (2, 0),
    WriteSmallInteger => "writeSmallInteger" (2, 0),
    WriteInteger => "writeInteger" (2, 0),
    WriteQword => "writeQword" (2, 0),
    WriteFloat => "writeFloat" (2, 0),
    WriteDouble => "writeDouble" (2, 0),
    WriteString => "writeString" (2, 1),
    AllocateMemory => "allocateMemory" (1, 2),
    DeAlloc => "deAlloc" (1, 1),

    // Process
    OpenProcess => "openProcess" (1, 0),
    GetOpenedProcessId => "getOpenedProcessID" (0, 0),
    GetProcessIdFromProcessName => "getProcessIDFromProcessName" (1, 0),
    GetProcessList => "getProcessList" (0, 0),
    Pause => "pause" (0, 0),
    Unpause => "unpause" (0, 0),
    TargetIs64Bit => "targetIs64Bit" (0, 0),
    GetCeVersion => "getCEVersion" (0, 0),
    GetCheatEngineDir => "getCheatEngineDir" (0, 0),
    ShowMessage => "showMessage" (1, 0),

    // Symbols
    GetAddress => "getAddress" (1, 1),
    GetAddressSafe => "getAddressSafe" (1, 1),
    GetNameFromAddress => "getNameFromAddress" (1, 3),
    RegisterSymbol => "registerSymbol" (2, 1),
    UnregisterSymbol => "unregisterSymbol" (1, 0),
    ReinitializeSymbolhandler => "reinitializeSymbolhandler" (0, 1),
    InModule => "inModule" (1, 0),
    GetModuleSize => "getModuleSize" (1, 0),
    EnumModules => "enumModules" (0, 1),

    // Disassembler
    Disassemble => "disassemble" (1, 0),
    SplitDisassembledString => "splitDisassembledString" (1, 0),
    GetInstructionSize => "getInstructionSize" (1, 0),
    GetPreviousOpcode => "getPreviousOpcode" (1, 0),

    // Assembler
    AutoAssemble => "autoAssemble" (1, 1),
    AutoAssembleCheck => "autoAssembleCheck" (1, 2),

    // Scans
    AobScan => "AOBScan" (1, 3),
    AobScanUnique => "AOBScanUnique" (1, 3),
    AobScanModuleUnique => "AOBScanModuleUnique" (2, 1),
    CreateMemScan => "createMemScan" (0, 0),
    GetCurrentMemscan => "getCurrentMemscan" (0, 0),
    MemscanFirstScan => "memscan_firstScan" (15, 0),
    MemscanNextScan => "memscan_nextScan" (10, 1),
    MemscanWaitTillDone => "memscan_waitTillDone" (1, 0),
    /// Aliases the scan's own result list; use [`Capability::CreateFoundList`]
    #[deprecated(note = "the attached list aliases the memscan; use CreateFoundList")]
    MemscanGetAttachedFoundlist => "memscan_getAttachedFoundlist" (1, 0),
    CreateFoundList => "createFoundList" (1, 0),
    FoundlistInitialize => "foundlist_initialize" (1, 0),
    FoundlistDeinitialize => "foundlist_deinitialize" (1, 0),
    FoundlistGetCount => "foundlist_getCount" (1, 0),
    FoundlistGetAddress => "foundlist_getAddress" (2, 0),
    FoundlistGetValue => "foundlist_getValue" (2, 0),
    StringsGetCount => "strings_getCount" (1, 0),
    StringsGetString => "strings_getString" (2, 0),

    // Debugger
    DebugProcess => "debugProcess" (0, 1),
    DebugIsDebugging => "debug_isDebugging" (0, 0),
    DebugIsBroken => "debug_isBroken" (0, 0),
    DebugSetBreakpoint => "debug_setBreakpoint" (1, 2),
    DebugRemoveBreakpoint => "debug_removeBreakpoint" (1, 0),
    DebugContinueFromBreakpoint => "debug_continueFromBreakpoint" (1, 0),
    DebugGetBreakpointList => "debug_getBreakpointList" (0, 0),

    // Address list
    GetAddressList => "getAddressList" (0, 0),
    AddresslistGetCount => "addresslist_getCount" (1, 0),
    AddresslistGetMemoryRecord => "addresslist_getMemoryRecord" (2, 0),
    AddresslistGetMemoryRecordByDescription => "addresslist_getMemoryRecordByDescription" (2, 0),
    AddresslistCreateMemoryRecord => "addresslist_createMemoryRecord" (1, 0),
    MemoryrecordGetDescription => "memoryrecord_getDescription" (1, 0),
    MemoryrecordSetDescription => "memoryrecord_setDescription" (2, 0),
    MemoryrecordGetAddress => "memoryrecord_getAddress" (1, 0),
    MemoryrecordSetAddress => "memoryrecord_setAddress" (2, 0),
    MemoryrecordGetValue => "memoryrecord_getValue" (1, 0),
    MemoryrecordSetValue => "memoryrecord_setValue" (2, 0),
    MemoryrecordIsActive => "memoryrecord_isActive" (1, 0),
    MemoryrecordFreeze => "memoryrecord_freeze" (1, 1),
    MemoryrecordUnfreeze => "memoryrecord_unfreeze" (1, 0),

    // Lifecycle
    ObjectDestroy => "object_destroy" (1, 0),
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
