//! Error types for celua
//!
//! Two layers. [`LuaCallError`] is raised by the invoker and the marshaller
//! and covers every way a call into the host's interpreter can go wrong.
//! Each facade family then wraps it in its own domain error
//! ([`MemoryError`], [`ScanError`], ...) so callers can tell a scan failure
//! from a disassembly failure without inspecting message text. The original
//! error is always kept as the `source`.

use crate::lua::stack::CallStatus;

/// Failure of a single call through the interpreter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LuaCallError {
    /// The named global does not exist (or is not callable) in the attached
    /// host version. Callers should feature-detect instead of crashing.
    #[error("host function '{function}' is not available in this Cheat Engine version")]
    CapabilityUnavailable { function: &'static str },

    /// The function ran and the protected call reported a failure
    #[error("{function} failed ({status}): {message}")]
    InvocationFailed {
        function: &'static str,
        status: CallStatus,
        message: String,
    },

    /// The function ran but signalled failure through its result (`nil` or
    /// `false`) instead of raising an error
    #[error("{function} was refused by the host: {detail}")]
    Refused {
        function: &'static str,
        detail: String,
    },

    /// An argument or result could not be converted
    #[error("marshalling error: {0}")]
    Marshalling(String),

    /// Wrong lifecycle state or a precondition on caller-supplied values
    #[error("usage error: {0}")]
    Usage(String),

    /// A host object was used after the state it depends on went away
    #[error("stale host object: {0}")]
    StaleHandle(String),

    /// Re-entrant use of a session that is already inside a call
    #[error("interpreter session is busy with another call")]
    Busy,
}

impl LuaCallError {
    /// Whether this signals a host version that lacks the capability
    pub fn is_unavailable(&self) -> bool {
        matches!(self, LuaCallError::CapabilityUnavailable { .. })
    }

    /// Diagnostic text produced by the interpreter itself, if any
    pub fn host_message(&self) -> Option<&str> {
        match self {
            LuaCallError::InvocationFailed { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Result type for interpreter calls
pub type Result<T> = std::result::Result<T, LuaCallError>;

/// Shape shared by the per-family facade errors
pub trait DomainError: std::error::Error + Sized {
    /// Wrap an interpreter-level failure of `operation`
    fn wrap(operation: &'static str, source: LuaCallError) -> Self;

    /// The wrapped interpreter-level error
    fn cause(&self) -> &LuaCallError;
}

macro_rules! domain_errors {
    ($($(#[$meta:meta])* $name:ident => $family:literal,)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq, thiserror::Error)]
            #[error("{}: {operation}: {source}", $family)]
            pub struct $name {
                /// Facade operation that failed
                pub operation: &'static str,
                /// Lower-level failure
                #[source]
                pub source: LuaCallError,
            }

            impl $name {
                /// Capability family label used in messages
                pub const FAMILY: &'static str = $family;

                pub fn new(operation: &'static str, source: LuaCallError) -> Self {
                    $name { operation, source }
                }

                /// The wrapped interpreter-level error
                pub fn cause(&self) -> &LuaCallError {
                    &self.source
                }

                /// See [`LuaCallError::is_unavailable`]
                pub fn is_unavailable(&self) -> bool {
                    self.source.is_unavailable()
                }
            }

            impl DomainError for $name {
                fn wrap(operation: &'static str, source: LuaCallError) -> Self {
                    $name::new(operation, source)
                }

                fn cause(&self) -> &LuaCallError {
                    &self.source
                }
            }
        )*
    };
}

domain_errors! {
    /// Reading, writing or allocating target memory failed
    MemoryError => "memory",
    /// Opening, pausing or querying the target process failed
    ProcessError => "process",
    /// Symbol resolution or registration failed
    SymbolError => "symbols",
    /// Disassembling target code failed
    DisassemblyError => "disassembler",
    /// Auto assembler scripts were rejected or failed
    AssemblyError => "assembler",
    /// Memory scans, AOB scans or found lists failed
    ScanError => "scan",
    /// Debugger attachment or breakpoints failed
    DebugError => "debugger",
    /// Cheat table (address list) records failed
    RecordError => "records",
}
