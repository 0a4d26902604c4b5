//! String, array, and bit-twiddling built-ins.
//!
//! Strings are indexed by character, not byte; the legacy runtime's
//! scripts are full of Shift-JIS-era double-width text and expect
//! character semantics.  Arrays are the language's only collection:
//! lists of integers held in ordinary variables.

use super::{int_arg, str_arg};
use crate::engine::EngineState;
use crate::vm::opcode::Opcode;
use crate::vm::value::Value;

// ── Strings ────────────────────────────────────────────────────

pub fn str_len(vals: &[Value]) -> Value {
    Value::Int(str_arg(vals, 0).chars().count() as i64)
}

/// `sub_str(s, start, len)` — character-based, clamped to the string.
pub fn sub_str(vals: &[Value]) -> Value {
    let s = str_arg(vals, 0);
    let start = int_arg(vals, 1).max(0) as usize;
    let len = int_arg(vals, 2).max(0) as usize;
    Value::Str(s.chars().skip(start).take(len).collect())
}

/// Character index of the first occurrence, −1 when absent.
pub fn str_find(vals: &[Value]) -> Value {
    let hay = str_arg(vals, 0);
    let needle = str_arg(vals, 1);
    if needle.is_empty() {
        return Value::Int(0);
    }
    match hay.find(&needle) {
        Some(byte_idx) => Value::Int(hay[..byte_idx].chars().count() as i64),
        None => Value::Int(-1),
    }
}

/// Code of the first character, 0 for the empty string.
pub fn char_code(vals: &[Value]) -> Value {
    Value::Int(str_arg(vals, 0).chars().next().map(|c| c as i64).unwrap_or(0))
}

/// The single-character string for a code, empty when invalid.
pub fn str_code(vals: &[Value]) -> Value {
    let code = int_arg(vals, 0);
    let s = u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(String::from)
        .unwrap_or_default();
    Value::Str(s)
}

pub fn str_up(vals: &[Value]) -> Value {
    Value::Str(str_arg(vals, 0).to_uppercase())
}

pub fn str_low(vals: &[Value]) -> Value {
    Value::Str(str_arg(vals, 0).to_lowercase())
}

/// `str_print(fmt, ...)` with the legacy specifiers: `%s`, `%ld`
/// (decimal), `%lx` (hex), `%%`.
pub fn str_print(vals: &[Value]) -> Value {
    let fmt = str_arg(vals, 0);
    let mut out = String::new();
    let mut next = 1usize;
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some('s') => {
                chars.next();
                out.push_str(&str_arg(vals, next));
                next += 1;
            }
            Some('l') => {
                chars.next();
                match chars.next() {
                    Some('d') => {
                        out.push_str(&int_arg(vals, next).to_string());
                        next += 1;
                    }
                    Some('x') => {
                        out.push_str(&format!("{:x}", int_arg(vals, next)));
                        next += 1;
                    }
                    other => {
                        out.push('%');
                        out.push('l');
                        if let Some(o) = other {
                            out.push(o);
                        }
                    }
                }
            }
            _ => out.push('%'),
        }
    }
    Value::Str(out)
}

// ── Arrays ─────────────────────────────────────────────────────

fn list_arg(vals: &[Value], i: usize) -> Vec<i64> {
    match vals.get(i) {
        Some(Value::IntList(v)) => v.clone(),
        _ => Vec::new(),
    }
}

/// Write a mutated list back to the variable it came from, when the
/// argument was a plain variable reference.
fn write_back(state: &mut EngineState, seq: i64, arg_ops: &[Opcode], list: Vec<i64>) -> Value {
    if let Some(Opcode::Variable(name)) = arg_ops.first() {
        state.seqs.set_var(seq, name, Value::IntList(list.clone()));
    }
    Value::IntList(list)
}

pub fn array_size(vals: &[Value]) -> Value {
    Value::Int(list_arg(vals, 0).len() as i64)
}

/// `ins_array_at(arr, index, value)` — insert, index clamped to the
/// ends.  A non-array first argument starts a fresh list.
pub fn ins_array_at(
    state: &mut EngineState,
    seq: i64,
    vals: &[Value],
    arg_ops: &[Opcode],
) -> Value {
    let mut list = list_arg(vals, 0);
    let at = (int_arg(vals, 1).max(0) as usize).min(list.len());
    list.insert(at, int_arg(vals, 2));
    write_back(state, seq, arg_ops, list)
}

/// `del_array_at(arr, index)` — remove one element; out of range is a
/// no-op.
pub fn del_array_at(
    state: &mut EngineState,
    seq: i64,
    vals: &[Value],
    arg_ops: &[Opcode],
) -> Value {
    let mut list = list_arg(vals, 0);
    let at = int_arg(vals, 1);
    if at >= 0 && (at as usize) < list.len() {
        list.remove(at as usize);
    }
    write_back(state, seq, arg_ops, list)
}

pub fn del_array_all(state: &mut EngineState, seq: i64, arg_ops: &[Opcode]) -> Value {
    write_back(state, seq, arg_ops, Vec::new())
}

// ── Bits ───────────────────────────────────────────────────────

pub fn make_long(vals: &[Value]) -> Value {
    let lo = int_arg(vals, 0) & 0xFFFF;
    let hi = int_arg(vals, 1) & 0xFFFF;
    Value::Int((hi << 16) | lo)
}

pub fn get_hi_word(vals: &[Value]) -> Value {
    Value::Int((int_arg(vals, 0) >> 16) & 0xFFFF)
}

pub fn get_low_word(vals: &[Value]) -> Value {
    Value::Int(int_arg(vals, 0) & 0xFFFF)
}
