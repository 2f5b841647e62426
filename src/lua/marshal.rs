//! Value marshalling between native values and stack slots

use std::collections::BTreeMap;

use crate::error::{LuaCallError, Result};
use crate::lua::stack::{LuaStack, SlotType};
use crate::lua::value::{Address, LuaArg, LuaValue};
use crate::lua::DecodeLimits;

/// Map key used when a non-list table was cut off at the entry ceiling
pub const TRUNCATED_KEY: &str = "...";

/// Push one argument.
///
/// The value must already have passed [`LuaArg::validate`]. On error the
/// stack may hold a partially built value; the caller restores its baseline.
pub fn push_arg<S: LuaStack + ?Sized>(stack: &mut S, arg: &LuaArg) -> Result<()> {
    match arg {
        LuaArg::Nil => stack.push_nil(),
        LuaArg::Bool(b) => stack.push_boolean(*b),
        LuaArg::Int(n) => stack.push_integer(*n),
        LuaArg::Unsigned(n) => {
            let n = i64::try_from(*n).map_err(|_| {
                LuaCallError::Marshalling(format!("unsigned value {} does not fit a Lua integer", n))
            })?;
            stack.push_integer(n);
        }
        LuaArg::Float(n) => stack.push_number(*n),
        LuaArg::Text(s) => stack.push_bytes(s.as_bytes()),
        LuaArg::Buffer(bytes) => push_buffer(stack, bytes)?,
        LuaArg::Handle(h) => stack.push_handle(*h),
        // Addresses are pointer-sized; the bit pattern is kept
        LuaArg::Address(Address::Absolute(a)) => stack.push_integer(*a as i64),
        LuaArg::Address(Address::Symbolic(expr)) => stack.push_bytes(expr.as_bytes()),
    }
    Ok(())
}

fn push_buffer<S: LuaStack + ?Sized>(stack: &mut S, bytes: &[u8]) -> Result<()> {
    if !stack.check_stack(2) {
        return Err(LuaCallError::Marshalling(format!(
            "no stack space for a {} byte buffer",
            bytes.len()
        )));
    }
    let hint = i32::try_from(bytes.len()).unwrap_or(i32::MAX);
    stack.create_table(hint, 0);
    let table = stack.top();
    for (i, byte) in bytes.iter().enumerate() {
        stack.push_integer(i64::from(*byte));
        stack.raw_set_index(table, i as i64 + 1);
    }
    Ok(())
}

/// Decode the slot at `idx`. Never fails and leaves the stack as it found it.
pub fn decode<S: LuaStack + ?Sized>(stack: &mut S, idx: i32, limits: &DecodeLimits) -> LuaValue {
    let idx = stack.abs_index(idx);
    decode_at(stack, idx, 0, limits)
}

fn decode_at<S: LuaStack + ?Sized>(stack: &mut S, idx: i32, depth: usize, limits: &DecodeLimits) -> LuaValue {
    match stack.slot_type(idx) {
        SlotType::None | SlotType::Nil => LuaValue::Nil,
        SlotType::Boolean => LuaValue::Bool(stack.to_boolean(idx)),
        SlotType::Number => {
            if stack.is_integer(idx) {
                stack.to_integer(idx).map(LuaValue::Int).unwrap_or(LuaValue::Nil)
            } else {
                stack.to_number(idx).map(LuaValue::Float).unwrap_or(LuaValue::Nil)
            }
        }
        SlotType::String => match stack.to_bytes(idx) {
            Some(bytes) => LuaValue::Text(String::from_utf8_lossy(&bytes).into_owned()),
            None => LuaValue::Nil,
        },
        SlotType::Table => decode_table(stack, idx, depth, limits),
        tag @ (SlotType::Userdata | SlotType::LightUserdata) => match stack.to_handle(idx) {
            Some(handle) => LuaValue::Handle(handle),
            None => LuaValue::Unsupported(tag),
        },
        tag @ (SlotType::Function | SlotType::Thread) => LuaValue::Unsupported(tag),
    }
}

/// Table key after decoding
#[derive(Debug)]
enum Key {
    Index(i64),
    Name(String),
}

impl Key {
    fn into_name(self) -> String {
        match self {
            Key::Index(n) => n.to_string(),
            Key::Name(s) => s,
        }
    }
}

fn decode_key<S: LuaStack + ?Sized>(stack: &S, idx: i32) -> Key {
    match stack.slot_type(idx) {
        SlotType::Number if stack.is_integer(idx) => match stack.to_integer(idx) {
            Some(n) => Key::Index(n),
            None => Key::Name("?".to_string()),
        },
        SlotType::Number => Key::Name(stack.to_number(idx).map(|n| n.to_string()).unwrap_or_default()),
        SlotType::String => Key::Name(
            stack
                .to_bytes(idx)
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .unwrap_or_default(),
        ),
        SlotType::Boolean => Key::Name(stack.to_boolean(idx).to_string()),
        other => Key::Name(format!("<{}>", other)),
    }
}

fn decode_table<S: LuaStack + ?Sized>(stack: &mut S, idx: i32, depth: usize, limits: &DecodeLimits) -> LuaValue {
    if depth >= limits.max_table_depth {
        return LuaValue::Truncated;
    }
    // key + value + one level of scratch for nested values
    if !stack.check_stack(3) {
        return LuaValue::Truncated;
    }

    let base = stack.top();
    let mut entries: Vec<(Key, LuaValue)> = Vec::new();
    let mut truncated = false;

    stack.push_nil();
    while stack.next(idx) {
        if entries.len() >= limits.max_table_entries {
            truncated = true;
            break;
        }
        let key = decode_key(stack, -2);
        let value_idx = stack.top();
        let value = decode_at(stack, value_idx, depth + 1, limits);
        entries.push((key, value));
        // Pop the value, keep the key for the next iteration
        stack.set_top(value_idx - 1);
    }
    stack.set_top(base);

    into_aggregate(entries, truncated)
}

fn into_aggregate(mut entries: Vec<(Key, LuaValue)>, truncated: bool) -> LuaValue {
    let is_list = entries.iter().all(|(k, _)| matches!(k, Key::Index(_))) && {
        entries.sort_by_key(|(k, _)| match k {
            Key::Index(n) => *n,
            Key::Name(_) => 0,
        });
        entries
            .iter()
            .enumerate()
            .all(|(i, (k, _))| matches!(k, Key::Index(n) if *n == i as i64 + 1))
    };

    if is_list {
        let mut items: Vec<LuaValue> = entries.into_iter().map(|(_, v)| v).collect();
        if truncated {
            items.push(LuaValue::Truncated);
        }
        LuaValue::List(items)
    } else {
        let mut map: BTreeMap<String, LuaValue> =
            entries.into_iter().map(|(k, v)| (k.into_name(), v)).collect();
        if truncated {
            map.insert(TRUNCATED_KEY.to_string(), LuaValue::Truncated);
        }
        LuaValue::Map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua::simulated::{SimLua, SimValue};
    use crate::lua::stack::HostHandle;

    fn roundtrip(arg: LuaArg) -> LuaValue {
        let mut sim = SimLua::new();
        push_arg(&mut sim, &arg).unwrap();
        let value = decode(&mut sim, -1, &DecodeLimits::default());
        assert_eq!(sim.top(), 1, "decode must not move the stack");
        value
    }

    #[test]
    fn test_scalar_roundtrip() {
        let cases = vec![
            (LuaArg::Bool(true), LuaValue::Bool(true)),
            (LuaArg::from(0i32), LuaValue::Int(0)),
            (LuaArg::from(-1i8), LuaValue::Int(-1)),
            (LuaArg::from(i16::MIN), LuaValue::Int(i16::MIN as i64)),
            (LuaArg::from(i64::MAX), LuaValue::Int(i64::MAX)),
            (LuaArg::from(i64::MIN), LuaValue::Int(i64::MIN)),
            (LuaArg::from(u32::MAX), LuaValue::Int(u32::MAX as i64)),
            (LuaArg::from(1.5f64), LuaValue::Float(1.5)),
            (LuaArg::from(""), LuaValue::Text(String::new())),
            (LuaArg::from("héllo"), LuaValue::Text("héllo".to_string())),
            (LuaArg::from(HostHandle(0xdead)), LuaValue::Handle(HostHandle(0xdead))),
            (LuaArg::Nil, LuaValue::Nil),
        ];
        for (arg, expected) in cases {
            assert_eq!(roundtrip(arg.clone()), expected, "argument {:?}", arg);
        }
    }

    #[test]
    fn test_buffer_roundtrip() {
        assert_eq!(roundtrip(LuaArg::from(Vec::<u8>::new())), LuaValue::List(vec![]));
        assert_eq!(
            roundtrip(LuaArg::from(&[0u8, 0x7f, 0xff][..])),
            LuaValue::List(vec![LuaValue::Int(0), LuaValue::Int(0x7f), LuaValue::Int(0xff)])
        );
    }

    #[test]
    fn test_absolute_address_keeps_bit_pattern() {
        let value = roundtrip(LuaArg::from(Address::Absolute(0xFFFF_F800_0000_0000)));
        assert_eq!(value, LuaValue::Int(0xFFFF_F800_0000_0000u64 as i64));
    }

    #[test]
    fn test_dense_keys_decode_to_list() {
        let mut sim = SimLua::new();
        let t = sim.new_table(vec![
            (SimValue::Int(3), SimValue::from("c")),
            (SimValue::Int(1), SimValue::from("a")),
            (SimValue::Int(2), SimValue::from("b")),
        ]);
        sim.push_sim(t);
        let value = decode(&mut sim, -1, &DecodeLimits::default());
        assert_eq!(
            value,
            LuaValue::List(vec![
                LuaValue::Text("a".into()),
                LuaValue::Text("b".into()),
                LuaValue::Text("c".into()),
            ])
        );
    }

    #[test]
    fn test_mixed_keys_decode_to_map() {
        let mut sim = SimLua::new();
        let t = sim.new_table(vec![
            (SimValue::Int(1), SimValue::Int(10)),
            (SimValue::Int(2), SimValue::Int(20)),
            (SimValue::from("x"), SimValue::Bool(true)),
        ]);
        sim.push_sim(t);
        let value = decode(&mut sim, -1, &DecodeLimits::default());
        let LuaValue::Map(map) = value else {
            panic!("expected a map, got {:?}", value);
        };
        assert_eq!(map.len(), 3);
        assert_eq!(map["1"], LuaValue::Int(10));
        assert_eq!(map["2"], LuaValue::Int(20));
        assert_eq!(map["x"], LuaValue::Bool(true));
    }

    #[test]
    fn test_sparse_integer_keys_decode_to_map() {
        let mut sim = SimLua::new();
        let t = sim.new_table(vec![
            (SimValue::Int(1), SimValue::Int(1)),
            (SimValue::Int(3), SimValue::Int(3)),
        ]);
        sim.push_sim(t);
        assert!(matches!(decode(&mut sim, -1, &DecodeLimits::default()), LuaValue::Map(_)));
    }

    #[test]
    fn test_depth_ceiling_yields_placeholder() {
        let mut sim = SimLua::new();
        let mut inner = sim.new_table(vec![(SimValue::Int(1), SimValue::Int(7))]);
        for _ in 0..7 {
            inner = sim.new_table(vec![(SimValue::Int(1), inner)]);
        }
        sim.push_sim(inner);

        let limits = DecodeLimits::default();
        let mut value = decode(&mut sim, -1, &limits);
        for level in 0..limits.max_table_depth {
            value = match value {
                LuaValue::List(mut items) => items.remove(0),
                other => panic!("level {} should still be a list, got {:?}", level, other),
            };
        }
        assert_eq!(value, LuaValue::Truncated);
        assert_eq!(sim.top(), 1);
    }

    #[test]
    fn test_entry_ceiling_yields_marker() {
        let mut sim = SimLua::new();
        let entries = (1..=150).map(|i| (SimValue::Int(i), SimValue::Int(i * 2))).collect();
        let t = sim.new_table(entries);
        sim.push_sim(t);

        let limits = DecodeLimits {
            max_table_entries: 100,
            ..DecodeLimits::default()
        };
        let LuaValue::List(items) = decode(&mut sim, -1, &limits) else {
            panic!("expected a list");
        };
        assert_eq!(items.len(), 101);
        assert_eq!(items[0], LuaValue::Int(2));
        assert_eq!(items[99], LuaValue::Int(200));
        assert_eq!(items[100], LuaValue::Truncated);
    }

    #[test]
    fn test_map_entry_ceiling_yields_marker_key() {
        let mut sim = SimLua::new();
        sim.push_sim(SimValue::from("below"));
        let entries = (0..40)
            .map(|i| (SimValue::from(format!("key{:02}", i)), SimValue::Int(i)))
            .collect();
        let t = sim.new_table(entries);
        sim.push_sim(t);

        let limits = DecodeLimits {
            max_table_entries: 10,
            ..DecodeLimits::default()
        };
        let LuaValue::Map(map) = decode(&mut sim, -1, &limits) else {
            panic!("expected a map");
        };
        assert_eq!(map.len(), 11);
        assert_eq!(map.get(TRUNCATED_KEY), Some(&LuaValue::Truncated));
        assert_eq!(map.values().filter(|v| matches!(v, LuaValue::Int(_))).count(), 10);
        assert_eq!(sim.top(), 2);
    }

    #[test]
    fn test_functions_decode_to_placeholder() {
        let mut sim = SimLua::new();
        sim.register("noop", |_, _| Ok(vec![]));
        sim.get_global("noop");
        assert_eq!(
            decode(&mut sim, -1, &DecodeLimits::default()),
            LuaValue::Unsupported(SlotType::Function)
        );
    }
}
