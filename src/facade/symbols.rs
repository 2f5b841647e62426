//! Symbol resolution and module enumeration

use crate::error::SymbolError;
use crate::facade::{Calls, WHOLE_TABLE};
use crate::lua::capability::Capability;
use crate::lua::invoker::Args;
use crate::lua::session::InterpreterSession;
use crate::lua::stack::LuaStack;
use crate::lua::value::{Address, FromLua, LuaValue};

type Result<T> = std::result::Result<T, SymbolError>;

/// A loaded module of the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub address: u64,
    pub is_64bit: bool,
    pub path: String,
}

impl FromLua for ModuleInfo {
    fn from_lua(value: LuaValue) -> crate::error::Result<Self> {
        let field = |key: &str| value.get(key).cloned().unwrap_or(LuaValue::Nil);
        Ok(ModuleInfo {
            name: String::from_lua(field("Name"))?,
            address: u64::from_lua(field("Address"))?,
            is_64bit: Option::<bool>::from_lua(field("Is64Bit"))?.unwrap_or(false),
            path: Option::<String>::from_lua(field("PathToFile"))?.unwrap_or_default(),
        })
    }
}

/// What [`Symbols::name_of`] may use to describe an address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameOptions {
    pub modules: bool,
    pub symbols: bool,
    pub sections: bool,
}

impl Default for NameOptions {
    fn default() -> Self {
        NameOptions {
            modules: true,
            symbols: true,
            sections: false,
        }
    }
}

pub struct Symbols<'s, S: LuaStack> {
    calls: Calls<'s, S, SymbolError>,
}

impl<'s, S: LuaStack> Symbols<'s, S> {
    pub fn new(session: &'s InterpreterSession<S>) -> Self {
        Symbols {
            calls: Calls::new(session),
        }
    }

    /// Resolve an address expression; the host raises when it cannot
    pub fn resolve(&self, expression: &str) -> Result<u64> {
        self.calls.one(Capability::GetAddress, Args::new().arg(Address::from(expression)))
    }

    /// Resolve against Cheat Engine's own process instead of the target
    pub fn resolve_local(&self, expression: &str) -> Result<u64> {
        let args = Args::new().arg(Address::from(expression)).arg(true);
        self.calls.one(Capability::GetAddress, args)
    }

    /// Resolve, or `None` when the expression does not resolve
    pub fn try_resolve(&self, expression: &str) -> Result<Option<u64>> {
        self.calls.one(Capability::GetAddressSafe, Args::new().arg(Address::from(expression)))
    }

    /// Describe an address as `module+offset` or a symbol name
    pub fn name_of(&self, address: impl Into<Address>, options: NameOptions) -> Result<String> {
        let args = Args::new()
            .arg(address.into())
            .arg(options.modules)
            .arg(options.symbols)
            .arg(options.sections);
        self.calls.one(Capability::GetNameFromAddress, args)
    }

    /// Register a user symbol; `persist` keeps it in the saved table
    pub fn register(&self, name: &str, address: impl Into<Address>, persist: bool) -> Result<()> {
        if name.is_empty() {
            return Err(self.calls.usage(Capability::RegisterSymbol.name(), "symbol name is empty"));
        }
        let args = Args::new().arg(name).arg(address.into()).arg(!persist);
        self.calls.none(Capability::RegisterSymbol, args)
    }

    pub fn unregister(&self, name: &str) -> Result<()> {
        self.calls.none(Capability::UnregisterSymbol, Args::new().arg(name))
    }

    /// Reload symbols, optionally waiting until they are loaded
    pub fn reinitialize(&self, wait: bool) -> Result<()> {
        self.calls.none(Capability::ReinitializeSymbolhandler, Args::new().arg(wait))
    }

    /// Whether an address lies inside a loaded module
    pub fn in_module(&self, address: impl Into<Address>) -> Result<bool> {
        let value: Option<bool> = self.calls.one(Capability::InModule, Args::new().arg(address.into()))?;
        Ok(value.unwrap_or(false))
    }

    pub fn module_size(&self, name: &str) -> Result<u64> {
        self.calls.required(Capability::GetModuleSize, Args::new().arg(name), || {
            format!("module {} is not loaded", name)
        })
    }

    /// Modules of the opened process
    pub fn modules(&self) -> Result<Vec<ModuleInfo>> {
        let modules: Option<Vec<ModuleInfo>> =
            self.calls.one_sized(Capability::EnumModules, Args::new(), WHOLE_TABLE)?;
        Ok(modules.unwrap_or_default())
    }

    /// Modules of another process
    pub fn modules_of(&self, pid: u32) -> Result<Vec<ModuleInfo>> {
        let modules: Option<Vec<ModuleInfo>> =
            self.calls.one_sized(Capability::EnumModules, Args::new().arg(pid), WHOLE_TABLE)?;
        Ok(modules.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LuaCallError;
    use crate::lua::simulated::{SimHeap, SimLua, SimValue};

    fn module(heap: &mut SimHeap, name: &str, base: i64) -> SimValue {
        heap.new_table(vec![
            (SimValue::from("Name"), SimValue::from(name)),
            (SimValue::from("Address"), SimValue::Int(base)),
            (SimValue::from("Is64Bit"), SimValue::Bool(true)),
            (SimValue::from("PathToFile"), SimValue::from(format!("C:\\game\\{}", name))),
        ])
    }

    #[test]
    fn test_enum_modules() {
        let mut sim = SimLua::new();
        sim.register("enumModules", |heap, _| {
            let a = module(heap, "game.exe", 0x1_4000_0000);
            let b = module(heap, "kernel32.dll", 0x7FF8_0000_0000);
            Ok(vec![heap.new_list(vec![a, b])])
        });
        let session = InterpreterSession::new(sim);

        let modules = session.symbols().modules().unwrap();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].name, "game.exe");
        assert_eq!(modules[1].address, 0x7FF8_0000_0000);
        assert!(modules[1].is_64bit);
        assert_eq!(session.stack().calls()[0].args.len(), 0);
    }

    #[test]
    fn test_enum_many_modules() {
        let mut sim = SimLua::new();
        sim.register("enumModules", |heap, _| {
            let modules = (0..180)
                .map(|i| module(heap, &format!("lib{}.dll", i), 0x7FF8_0000_0000 + i * 0x10_0000))
                .collect();
            Ok(vec![heap.new_list(modules)])
        });
        let session = InterpreterSession::new(sim);

        let modules = session.symbols().modules().unwrap();
        assert_eq!(modules.len(), 180);
        assert_eq!(modules[179].name, "lib179.dll");
    }

    #[test]
    fn test_high_addresses_keep_bit_pattern() {
        const KERNEL: u64 = 0xFFFF_F800_0000_0010;
        let mut sim = SimLua::new();
        sim.register("getNameFromAddress", |_, args| match args[0].as_int() {
            Some(n) if n as u64 == KERNEL => Ok(vec![SimValue::from("ntoskrnl.exe+10")]),
            _ => Ok(vec![SimValue::from("?")]),
        });
        sim.register("inModule", |_, args| Ok(vec![SimValue::Bool(args[0].as_int().is_some())]));
        let session = InterpreterSession::new(sim);

        let name = session.symbols().name_of(KERNEL, NameOptions::default());
        assert_eq!(name, Ok("ntoskrnl.exe+10".to_string()));
        assert_eq!(session.symbols().in_module(KERNEL), Ok(true));
    }

    #[test]
    fn test_try_resolve_nil() {
        let mut sim = SimLua::new();
        sim.register("getAddressSafe", |_, args| match args[0].as_str() {
            Some("game.exe") => Ok(vec![SimValue::Int(0x400000)]),
            _ => Ok(vec![SimValue::Nil]),
        });
        let session = InterpreterSession::new(sim);

        assert_eq!(session.symbols().try_resolve("game.exe"), Ok(Some(0x400000)));
        assert_eq!(session.symbols().try_resolve("nope.dll"), Ok(None));
    }

    #[test]
    fn test_register_rejects_empty_name() {
        let session = InterpreterSession::new(SimLua::new());
        let err = session.symbols().register("", 0x1000u64, false).unwrap_err();
        assert!(matches!(err.source, LuaCallError::Usage(_)));
    }
}
