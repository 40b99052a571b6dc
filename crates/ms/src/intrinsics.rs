//! Built-in intrinsic library.
//!
//! Each entry is a plain Rust function taking already-resolved `Value`
//! arguments (`args[0]` is the bound receiver for dot-style calls, e.g.
//! `list.push(x)` calls `push` with `args = [list, x]`) and returning a
//! `Value` or an `MsError`. `wait` and `yield` are resumable/cooperative and
//! are special-cased in `vm.rs` rather than living here, since they need
//! direct access to the VM's clock and scheduling flag.
//!
//! Container intrinsics (`push`, `indexOf`, `hasIndex`, ...) dispatch on the
//! runtime type of `args[0]` rather than being split into `string.xxx` /
//! `list.xxx` / `map.xxx` entries, so a single definition covers both the
//! bare-call form (`indexOf(x, v)`) and the dot-call form (`x.indexOf(v)`),
//! the latter routed here by `builtin_method_name`.

use std::rc::Rc;

use crate::error::{MsError, MsResult};
use crate::value::{equality_number, hash_value, values_equal, MapObj, Value, ValueKey};
use crate::vm::Vm;

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Null)
}

fn need_number(v: &Value, who: &str) -> MsResult<f64> {
    match v {
        Value::Number(n) => Ok(*n),
        _ => Err(MsError::type_error(format!("{who}: expected number, got {}", v.type_name()))),
    }
}

fn need_str(v: &Value, who: &str) -> MsResult<Rc<str>> {
    match v {
        Value::Str(s) => Ok(s.clone()),
        _ => Err(MsError::type_error(format!("{who}: expected string, got {}", v.type_name()))),
    }
}

/// Normalizes a possibly-negative index against `len`: negative indices
/// count from the end.
pub fn normalize_index(i: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let n = if i < 0 { i + len } else { i };
    if n < 0 || n >= len {
        None
    } else {
        Some(n as usize)
    }
}

pub fn call(vm: &mut Vm, name: &str, args: &[Value]) -> MsResult<Value> {
    match name {
        // ---- core ----
        "print" => {
            let s = arg(args, 0).to_display_string();
            match args.get(1) {
                None | Some(Value::Null) => (vm.print_sink)(&s),
                Some(delim) => (vm.print_sink)(&format!("{s}{}", delim.to_display_string())),
            }
            Ok(Value::Null)
        }
        "time" => Ok(Value::Number(vm.elapsed_secs())),
        "version" => Ok(Value::str("MS 1.0")),
        "str" => Ok(Value::str(arg(args, 0).to_display_string())),
        "val" => Ok(Value::Number(arg(args, 0).double_value())),
        "typeof" => Ok(Value::str(arg(args, 0).type_name())),
        "range" => intrinsic_range(args),
        "char" => {
            let n = if args.is_empty() { 65 } else { need_number(&arg(args, 0), "char")? as u32 };
            let c = char::from_u32(n).unwrap_or('\u{FFFD}');
            Ok(Value::str(c.to_string()))
        }
        "code" => {
            let s = need_str(&arg(args, 0), "code")?;
            Ok(Value::Number(s.chars().next().map(|c| c as u32).unwrap_or(0) as f64))
        }
        "rnd" => Ok(Value::Number(vm.rng_next())),
        "hash" => Ok(Value::Number(hash_value(&arg(args, 0)) as f64)),
        "slice" => intrinsic_slice(&arg(args, 0), &arg(args, 1), &arg(args, 2)),
        "refEquals" => Ok(bool_value(ref_equals(&arg(args, 0), &arg(args, 1)))),
        "stackTrace" => Ok(Value::new_list(
            vm.contexts
                .iter()
                .rev()
                .map(|ctx| {
                    let line = ctx.proto.code.get(ctx.pc.saturating_sub(1)).map(|i| i.line).unwrap_or(0);
                    Value::str(format!("line {line}"))
                })
                .collect(),
        )),

        // ---- math ----
        "abs" => Ok(Value::Number(need_number(&arg(args, 0), "abs")?.abs())),
        "sign" => Ok(Value::Number(need_number(&arg(args, 0), "sign")?.signum())),
        "floor" => Ok(Value::Number(need_number(&arg(args, 0), "floor")?.floor())),
        "ceil" => Ok(Value::Number(need_number(&arg(args, 0), "ceil")?.ceil())),
        "round" => {
            let n = need_number(&arg(args, 0), "round")?;
            let places = args.get(1).map(|v| v.double_value()).unwrap_or(0.0);
            let factor = 10f64.powf(places);
            Ok(Value::Number((n * factor).round() / factor))
        }
        "sqrt" => Ok(Value::Number(need_number(&arg(args, 0), "sqrt")?.sqrt())),
        "sin" => Ok(Value::Number(need_number(&arg(args, 0), "sin")?.sin())),
        "cos" => Ok(Value::Number(need_number(&arg(args, 0), "cos")?.cos())),
        "tan" => Ok(Value::Number(need_number(&arg(args, 0), "tan")?.tan())),
        "asin" => Ok(Value::Number(need_number(&arg(args, 0), "asin")?.asin())),
        "acos" => Ok(Value::Number(need_number(&arg(args, 0), "acos")?.acos())),
        "atan" => {
            let y = need_number(&arg(args, 0), "atan")?;
            let x = args.get(1).map(|v| v.double_value()).unwrap_or(1.0);
            Ok(Value::Number(y.atan2(x)))
        }
        "log" => {
            let n = need_number(&arg(args, 0), "log")?;
            let base = args.get(1).map(|v| v.double_value()).unwrap_or(std::f64::consts::E);
            Ok(Value::Number(n.log(base)))
        }
        "pi" => Ok(Value::Number(std::f64::consts::PI)),
        "bitAnd" => Ok(Value::Number((bit_operand(args, 0) & bit_operand(args, 1)) as f64)),
        "bitOr" => Ok(Value::Number((bit_operand(args, 0) | bit_operand(args, 1)) as f64)),
        "bitXor" => Ok(Value::Number((bit_operand(args, 0) ^ bit_operand(args, 1)) as f64)),

        // ---- string-only ----
        "upper" => Ok(Value::str(need_str(&arg(args, 0), "upper")?.to_uppercase())),
        "lower" => Ok(Value::str(need_str(&arg(args, 0), "lower")?.to_lowercase())),
        "trim" => Ok(Value::str(need_str(&arg(args, 0), "trim")?.trim().to_string())),

        // ---- type-generic container intrinsics ----
        "len" => generic_len(&arg(args, 0)),
        "hasIndex" => generic_has_index(&arg(args, 0), &arg(args, 1)),
        "indexOf" => generic_index_of(&arg(args, 0), &arg(args, 1), args.get(2)),
        "indexes" => generic_indexes(&arg(args, 0)),
        "values" => generic_values(&arg(args, 0)),
        "insert" => generic_insert(&arg(args, 0), &arg(args, 1), &arg(args, 2)),
        "remove" => generic_remove(&arg(args, 0), &arg(args, 1)),
        "replace" => generic_replace(&arg(args, 0), &arg(args, 1), &arg(args, 2), args.get(3)),
        "push" => generic_push(&arg(args, 0), &arg(args, 1)),
        "pop" => generic_pop(&arg(args, 0)),
        "pull" => generic_pull(&arg(args, 0)),
        "split" => generic_split(&arg(args, 0), args.get(1), args.get(2)),
        "sum" => generic_sum(&arg(args, 0)),
        "join" => generic_join(&arg(args, 0), args.get(1)),
        "sort" => generic_sort(&arg(args, 0), args.get(1), args.get(2)),
        "shuffle" => generic_shuffle(vm, &arg(args, 0)),
        "shallowCopy" => generic_shallow_copy(&arg(args, 0)),

        "intrinsics" => {
            let mut m = MapObj::new();
            for n in ALL_NAMES {
                m.insert(
                    Value::str(*n),
                    Value::Function(Rc::new(crate::function::FuncVal::new(crate::function::FunctionProto::native(n), None))),
                );
            }
            // Read-only: assigning into `intrinsics` is a no-op rather than a
            // silent mutation of the live dispatch table.
            m.assign_override = Some(Rc::new(|_k: &Value, _v: &Value| true));
            Ok(Value::new_map(m))
        }

        _ => Err(MsError::undefined_identifier(format!("unknown intrinsic '{name}'"))),
    }
}

fn bool_value(b: bool) -> Value {
    Value::Number(if b { 1.0 } else { 0.0 })
}

fn bit_operand(args: &[Value], i: usize) -> i64 {
    args.get(i).map(|v| v.double_value() as i64).unwrap_or(0)
}

fn ref_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
        (Value::Map(x), Value::Map(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        _ => values_equal(a, b),
    }
}

fn generic_len(v: &Value) -> MsResult<Value> {
    match v {
        Value::Str(s) => Ok(Value::Number(s.chars().count() as f64)),
        Value::List(l) => Ok(Value::Number(l.borrow().len() as f64)),
        Value::Map(m) => Ok(Value::Number(m.borrow().entries.len() as f64)),
        _ => Err(MsError::type_error(format!("len: can't take the length of a {}", v.type_name()))),
    }
}

fn generic_has_index(v: &Value, key: &Value) -> MsResult<Value> {
    match v {
        Value::Str(s) => {
            let len = s.chars().count();
            let i = need_number(key, "hasIndex")? as i64;
            Ok(bool_value(normalize_index(i, len).is_some()))
        }
        Value::List(l) => {
            let len = l.borrow().len();
            let i = need_number(key, "hasIndex")? as i64;
            Ok(bool_value(normalize_index(i, len).is_some()))
        }
        Value::Map(m) => Ok(bool_value(m.borrow().get(key).is_some())),
        _ => Err(MsError::type_error(format!("hasIndex: expected string, list, or map, got {}", v.type_name()))),
    }
}

fn generic_index_of(v: &Value, needle: &Value, after: Option<&Value>) -> MsResult<Value> {
    match v {
        Value::Str(s) => {
            let needle = need_str(needle, "indexOf")?;
            let chars: Vec<char> = s.chars().collect();
            let start = after
                .filter(|a| !a.is_null())
                .map(|a| (a.double_value() as i64 + 1).max(0) as usize)
                .unwrap_or(0);
            let hay: String = chars.get(start..).unwrap_or(&[]).iter().collect();
            match hay.find(&*needle) {
                Some(byte_idx) => Ok(Value::Number((start + hay[..byte_idx].chars().count()) as f64)),
                None => Ok(Value::Null),
            }
        }
        Value::List(l) => {
            let b = l.borrow();
            let start = after
                .filter(|a| !a.is_null())
                .map(|a| (a.double_value() as i64 + 1).max(0) as usize)
                .unwrap_or(0);
            for (i, item) in b.iter().enumerate().skip(start) {
                if values_equal(item, needle) {
                    return Ok(Value::Number(i as f64));
                }
            }
            Ok(Value::Null)
        }
        Value::Map(m) => {
            for (k, val) in m.borrow().entries.iter() {
                if values_equal(val, needle) {
                    return Ok(k.0.clone());
                }
            }
            Ok(Value::Null)
        }
        _ => Err(MsError::type_error(format!("indexOf: expected string, list, or map, got {}", v.type_name()))),
    }
}

fn generic_indexes(v: &Value) -> MsResult<Value> {
    match v {
        Value::Str(s) => Ok(Value::new_list((0..s.chars().count()).map(|i| Value::Number(i as f64)).collect())),
        Value::List(l) => Ok(Value::new_list((0..l.borrow().len()).map(|i| Value::Number(i as f64)).collect())),
        Value::Map(m) => Ok(Value::new_list(m.borrow().entries.keys().map(|k| k.0.clone()).collect())),
        _ => Err(MsError::type_error(format!("indexes: expected string, list, or map, got {}", v.type_name()))),
    }
}

fn generic_values(v: &Value) -> MsResult<Value> {
    match v {
        Value::Str(s) => Ok(Value::new_list(s.chars().map(|c| Value::str(c.to_string())).collect())),
        Value::List(l) => Ok(Value::new_list(l.borrow().clone())),
        Value::Map(m) => Ok(Value::new_list(m.borrow().entries.values().cloned().collect())),
        _ => Err(MsError::type_error(format!("values: expected string, list, or map, got {}", v.type_name()))),
    }
}

fn generic_insert(v: &Value, index: &Value, value: &Value) -> MsResult<Value> {
    match v {
        Value::List(l) => {
            let mut b = l.borrow_mut();
            let i = need_number(index, "insert")? as i64;
            let idx = normalize_index(i, b.len() + 1).unwrap_or(b.len());
            b.insert(idx, value.clone());
            drop(b);
            Ok(v.clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = need_number(index, "insert")? as i64;
            let idx = normalize_index(i, chars.len() + 1).unwrap_or(chars.len());
            let inserted = value.to_display_string();
            let mut out: String = chars[..idx].iter().collect();
            out.push_str(&inserted);
            out.extend(&chars[idx..]);
            Ok(Value::str(out))
        }
        _ => Err(MsError::type_error(format!("insert: expected list or string, got {}", v.type_name()))),
    }
}

fn generic_remove(v: &Value, key: &Value) -> MsResult<Value> {
    match v {
        Value::List(l) => {
            let mut b = l.borrow_mut();
            let i = need_number(key, "remove")? as i64;
            let idx = normalize_index(i, b.len()).ok_or_else(|| MsError::index("remove: index out of range"))?;
            Ok(b.remove(idx))
        }
        Value::Map(m) => {
            let mut b = m.borrow_mut();
            let existed = b.entries.shift_remove(&ValueKey(key.clone()));
            existed.ok_or_else(|| MsError::key_not_found("remove: key not found"))
        }
        Value::Str(s) => {
            let needle = need_str(key, "remove")?;
            Ok(Value::str(s.replace(&*needle, "")))
        }
        _ => Err(MsError::type_error(format!("remove: expected list, map, or string, got {}", v.type_name()))),
    }
}

fn generic_replace(v: &Value, old: &Value, new: &Value, max_count: Option<&Value>) -> MsResult<Value> {
    match v {
        Value::Str(s) => {
            let from = old.to_display_string();
            let to = new.to_display_string();
            match max_count.filter(|m| !m.is_null()) {
                Some(m) => Ok(Value::str(s.replacen(from.as_str(), &to, m.double_value().max(0.0) as usize))),
                None => Ok(Value::str(s.replace(from.as_str(), &to))),
            }
        }
        Value::Map(m) => {
            let key_exists = m.borrow().get(old).is_some();
            if key_exists {
                m.borrow_mut().insert(old.clone(), new.clone());
            }
            Ok(v.clone())
        }
        Value::List(l) => {
            let limit = max_count.filter(|m| !m.is_null()).map(|m| m.double_value() as i64).unwrap_or(-1);
            let mut b = l.borrow_mut();
            let mut replaced = 0i64;
            for item in b.iter_mut() {
                if (limit < 0 || replaced < limit) && values_equal(item, old) {
                    *item = new.clone();
                    replaced += 1;
                }
            }
            drop(b);
            Ok(v.clone())
        }
        _ => Err(MsError::type_error(format!("replace: expected string, list, or map, got {}", v.type_name()))),
    }
}

fn generic_push(v: &Value, value: &Value) -> MsResult<Value> {
    match v {
        Value::List(l) => {
            l.borrow_mut().push(value.clone());
            Ok(v.clone())
        }
        Value::Map(m) => {
            m.borrow_mut().insert(value.clone(), bool_value(true));
            Ok(v.clone())
        }
        _ => Err(MsError::type_error(format!("push: expected list or map, got {}", v.type_name()))),
    }
}

fn generic_pop(v: &Value) -> MsResult<Value> {
    match v {
        Value::List(l) => Ok(l.borrow_mut().pop().unwrap_or(Value::Null)),
        Value::Map(m) => {
            let mut b = m.borrow_mut();
            let last_key = b.entries.keys().next_back().cloned();
            match last_key {
                Some(k) => Ok(b.entries.shift_remove(&k).unwrap_or(Value::Null)),
                None => Ok(Value::Null),
            }
        }
        _ => Err(MsError::type_error(format!("pop: expected list or map, got {}", v.type_name()))),
    }
}

fn generic_pull(v: &Value) -> MsResult<Value> {
    match v {
        Value::List(l) => {
            let mut b = l.borrow_mut();
            if b.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(b.remove(0))
            }
        }
        Value::Map(m) => {
            let mut b = m.borrow_mut();
            let first_key = b.entries.keys().next().cloned();
            match first_key {
                Some(k) => Ok(b.entries.shift_remove(&k).unwrap_or(Value::Null)),
                None => Ok(Value::Null),
            }
        }
        _ => Err(MsError::type_error(format!("pull: expected list or map, got {}", v.type_name()))),
    }
}

fn generic_split(v: &Value, delim: Option<&Value>, max_count: Option<&Value>) -> MsResult<Value> {
    let s = need_str(v, "split")?;
    let delim = delim.filter(|d| !d.is_null()).map(|d| d.to_display_string()).unwrap_or_else(|| " ".to_string());
    let limit = max_count.filter(|m| !m.is_null()).map(|m| m.double_value() as i64).unwrap_or(-1);
    let parts: Vec<Value> = if delim.is_empty() {
        s.chars().map(|c| Value::str(c.to_string())).collect()
    } else if limit < 0 {
        s.split(delim.as_str()).map(Value::str).collect()
    } else {
        s.splitn(limit.max(1) as usize, delim.as_str()).map(Value::str).collect()
    };
    Ok(Value::new_list(parts))
}

fn generic_sum(v: &Value) -> MsResult<Value> {
    match v {
        Value::List(l) => Ok(Value::Number(l.borrow().iter().map(|x| x.double_value()).sum())),
        Value::Map(m) => Ok(Value::Number(m.borrow().entries.values().map(|x| x.double_value()).sum())),
        _ => Err(MsError::type_error(format!("sum: expected list or map, got {}", v.type_name()))),
    }
}

fn generic_join(v: &Value, delim: Option<&Value>) -> MsResult<Value> {
    let l = v.as_list().ok_or_else(|| MsError::type_error(format!("join: expected list, got {}", v.type_name())))?;
    let delim = delim.map(|d| d.to_display_string()).unwrap_or_default();
    let s = l.borrow().iter().map(|x| x.to_display_string()).collect::<Vec<_>>().join(&delim);
    Ok(Value::str(s))
}

/// `byKey`: when given, each element is first mapped through `m[byKey]`
/// (for list-of-maps) before comparison; `ascending`: falsy reverses order.
fn generic_sort(v: &Value, by_key: Option<&Value>, ascending: Option<&Value>) -> MsResult<Value> {
    let l = v.as_list().ok_or_else(|| MsError::type_error(format!("sort: expected list, got {}", v.type_name())))?;
    let ascending = ascending.map(|a| a.bool_value()).unwrap_or(true);
    let key_of = |item: &Value| -> Value {
        match by_key.filter(|k| !k.is_null()) {
            Some(key) => match item {
                Value::Map(m) => m.borrow().get(key).unwrap_or(Value::Null),
                _ => item.clone(),
            },
            None => item.clone(),
        }
    };
    let mut b = l.borrow_mut();
    b.sort_by(|a, b| {
        let ord = key_of(a)
            .double_value()
            .partial_cmp(&key_of(b).double_value())
            .unwrap_or(std::cmp::Ordering::Equal);
        if ascending { ord } else { ord.reverse() }
    });
    drop(b);
    Ok(v.clone())
}

fn generic_shuffle(vm: &mut Vm, v: &Value) -> MsResult<Value> {
    match v {
        Value::List(l) => {
            let mut b = l.borrow_mut();
            let n = b.len();
            for i in (1..n).rev() {
                let j = (vm.rng_next() * (i as f64 + 1.0)) as usize;
                b.swap(i, j.min(i));
            }
            drop(b);
            Ok(v.clone())
        }
        Value::Map(m) => {
            let mut entries: Vec<(ValueKey, Value)> = m.borrow().entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let n = entries.len();
            for i in (1..n).rev() {
                let j = (vm.rng_next() * (i as f64 + 1.0)) as usize;
                entries.swap(i, j.min(i));
            }
            let mut b = m.borrow_mut();
            b.entries.clear();
            for (k, val) in entries {
                b.entries.insert(k, val);
            }
            drop(b);
            Ok(v.clone())
        }
        _ => Err(MsError::type_error(format!("shuffle: expected list or map, got {}", v.type_name()))),
    }
}

fn generic_shallow_copy(v: &Value) -> MsResult<Value> {
    match v {
        Value::Map(m) => {
            let mut fresh = MapObj::new();
            for (k, val) in m.borrow().entries.iter() {
                fresh.entries.insert(k.clone(), val.clone());
            }
            Ok(Value::new_map(fresh))
        }
        Value::List(l) => Ok(Value::new_list(l.borrow().clone())),
        _ => Err(MsError::type_error(format!("shallowCopy: expected list or map, got {}", v.type_name()))),
    }
}

fn intrinsic_range(args: &[Value]) -> MsResult<Value> {
    let from = need_number(&arg(args, 0), "range")?;
    let (to, step) = if args.len() >= 3 {
        (need_number(&arg(args, 1), "range")?, need_number(&arg(args, 2), "range")?)
    } else if args.len() == 2 {
        let to = need_number(&arg(args, 1), "range")?;
        (to, if to >= from { 1.0 } else { -1.0 })
    } else {
        (from, 1.0)
    };
    if step == 0.0 {
        return Err(MsError::runtime("range: step must not be zero"));
    }
    let mut out = Vec::new();
    let mut x = from;
    let mut guard = 0u32;
    while (step > 0.0 && x <= to) || (step < 0.0 && x >= to) {
        out.push(Value::Number(x));
        x += step;
        guard += 1;
        if guard > 10_000_000 {
            break;
        }
    }
    Ok(Value::new_list(out))
}

fn intrinsic_slice(seq: &Value, from: &Value, to: &Value) -> MsResult<Value> {
    match seq {
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (a, b) = slice_bounds(chars.len(), from, to);
            Ok(Value::str(chars[a..b].iter().collect::<String>()))
        }
        Value::List(l) => {
            let b = l.borrow();
            let (a, z) = slice_bounds(b.len(), from, to);
            Ok(Value::new_list(b[a..z].to_vec()))
        }
        _ => Err(MsError::type_error(format!("slice: can't slice a {}", seq.type_name()))),
    }
}

fn slice_bounds(len: usize, from: &Value, to: &Value) -> (usize, usize) {
    let len_i = len as i64;
    let a = if from.is_null() { 0 } else { from.double_value() as i64 };
    let b = if to.is_null() { len_i } else { to.double_value() as i64 };
    let a = if a < 0 { (a + len_i).max(0) } else { a.min(len_i) };
    let b = if b < 0 { (b + len_i).max(0) } else { b.min(len_i) };
    if b < a {
        (a as usize, a as usize)
    } else {
        (a as usize, b as usize)
    }
}

pub const ALL_NAMES: &[&str] = &[
    "print", "time", "version", "str", "val", "typeof", "range", "char", "code", "rnd", "hash", "slice", "refEquals",
    "stackTrace", "abs", "sign", "floor", "ceil", "round", "sqrt", "sin", "cos", "tan", "asin", "acos", "atan", "log",
    "pi", "bitAnd", "bitOr", "bitXor", "upper", "lower", "trim", "len", "hasIndex", "indexOf", "indexes", "values",
    "insert", "remove", "replace", "push", "pop", "pull", "split", "sum", "join", "sort", "shuffle", "shallowCopy",
    "wait", "yield", "funcRef",
];

/// Maps a `(type, dot-method name)` pair to the intrinsic dispatch name used
/// above, for the VM's index-get fallback when a key is absent from a
/// container's own entries. Most entries are type-generic; this table only
/// needs to say which methods apply to which receiver type.
pub fn builtin_method_name(type_name: &str, method: &str) -> Option<&'static str> {
    let table: &[&str] = match type_name {
        "string" => &[
            "len", "upper", "lower", "trim", "indexOf", "hasIndex", "indexes", "values", "insert", "remove",
            "replace", "split", "slice",
        ],
        "list" => &[
            "len", "push", "pop", "pull", "insert", "remove", "indexOf", "hasIndex", "indexes", "values", "sum",
            "join", "sort", "shuffle", "slice", "replace", "shallowCopy",
        ],
        "map" => &[
            "len", "hasIndex", "indexes", "values", "remove", "shallowCopy", "push", "pop", "pull", "indexOf", "sum",
            "shuffle", "replace",
        ],
        _ => &[],
    };
    table.iter().find(|m| **m == method).copied()
}

pub fn equality(a: &Value, b: &Value) -> f64 {
    equality_number(a, b)
}
