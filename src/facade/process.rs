//! Process attachment and host information

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{LuaCallError, ProcessError};
use crate::facade::{Calls, WHOLE_TABLE};
use crate::lua::capability::Capability;
use crate::lua::invoker::Args;
use crate::lua::marshal::TRUNCATED_KEY;
use crate::lua::session::InterpreterSession;
use crate::lua::stack::LuaStack;
use crate::lua::value::{FromLua, LuaArg, LuaValue};

type Result<T> = std::result::Result<T, ProcessError>;

/// Process to attach to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessTarget {
    Pid(u32),
    /// Executable name, e.g. `"game.exe"`
    Name(String),
}

impl From<u32> for ProcessTarget {
    fn from(pid: u32) -> Self {
        ProcessTarget::Pid(pid)
    }
}

impl From<&str> for ProcessTarget {
    fn from(name: &str) -> Self {
        ProcessTarget::Name(name.to_string())
    }
}

impl fmt::Display for ProcessTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessTarget::Pid(pid) => write!(f, "pid {}", pid),
            ProcessTarget::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<ProcessTarget> for LuaArg {
    fn from(target: ProcessTarget) -> Self {
        match target {
            ProcessTarget::Pid(pid) => LuaArg::from(pid),
            ProcessTarget::Name(name) => LuaArg::from(name),
        }
    }
}

pub struct Process<'s, S: LuaStack> {
    calls: Calls<'s, S, ProcessError>,
}

impl<'s, S: LuaStack> Process<'s, S> {
    pub fn new(session: &'s InterpreterSession<S>) -> Self {
        Process {
            calls: Calls::new(session),
        }
    }

    /// Open a process and return the pid the host attached to
    pub fn open(&self, target: impl Into<ProcessTarget>) -> Result<u32> {
        let target = target.into();
        self.calls.none(Capability::OpenProcess, Args::new().arg(target.clone()))?;
        match self.opened_pid()? {
            0 => Err(self.calls.refused(Capability::OpenProcess, format!("could not open {}", target))),
            pid => Ok(pid),
        }
    }

    /// Pid of the opened process, 0 when none
    pub fn opened_pid(&self) -> Result<u32> {
        self.calls.one(Capability::GetOpenedProcessId, Args::new())
    }

    /// Pid of a running process by executable name
    pub fn pid_of(&self, name: &str) -> Result<Option<u32>> {
        self.calls.one(Capability::GetProcessIdFromProcessName, Args::new().arg(name))
    }

    /// Running processes, pid to executable name
    pub fn list(&self) -> Result<BTreeMap<u32, String>> {
        let value: LuaValue = self
            .calls
            .one_sized(Capability::GetProcessList, Args::new(), WHOLE_TABLE)?;
        self.calls.project(Capability::GetProcessList, process_table(value))
    }

    pub fn pause(&self) -> Result<()> {
        self.calls.none(Capability::Pause, Args::new())
    }

    pub fn unpause(&self) -> Result<()> {
        self.calls.none(Capability::Unpause, Args::new())
    }

    pub fn is_64bit(&self) -> Result<bool> {
        self.calls.one(Capability::TargetIs64Bit, Args::new())
    }

    /// Host version, e.g. `7.5`
    pub fn host_version(&self) -> Result<f64> {
        self.calls.one(Capability::GetCeVersion, Args::new())
    }

    pub fn host_directory(&self) -> Result<String> {
        self.calls.one(Capability::GetCheatEngineDir, Args::new())
    }

    /// Modal message box in the host
    pub fn show_message(&self, text: &str) -> Result<()> {
        self.calls.none(Capability::ShowMessage, Args::new().arg(text))
    }
}

fn truncated_list() -> LuaCallError {
    LuaCallError::Marshalling("process list was truncated".to_string())
}

/// `{[pid] = name}` decodes as a map, or as a list when pids happen to be
/// dense from 1. A partial list is an error.
fn process_table(value: LuaValue) -> crate::error::Result<BTreeMap<u32, String>> {
    let mut processes = BTreeMap::new();
    match value {
        LuaValue::Map(map) => {
            for (key, name) in map {
                if key == TRUNCATED_KEY && name == LuaValue::Truncated {
                    return Err(truncated_list());
                }
                let Ok(pid) = key.parse::<u32>() else {
                    continue;
                };
                processes.insert(pid, String::from_lua(name)?);
            }
        }
        LuaValue::List(items) => {
            for (i, name) in items.into_iter().enumerate() {
                if name == LuaValue::Truncated {
                    return Err(truncated_list());
                }
                processes.insert(i as u32 + 1, String::from_lua(name)?);
            }
        }
        LuaValue::Nil => {}
        other => {
            return Err(LuaCallError::Marshalling(format!(
                "expected process table, got {}",
                other.type_name()
            )))
        }
    }
    Ok(processes)
}
