//! Runtime and compile-time value representation.
//!
//! `Value` does double duty: fully-resolved
//! runtime values (`Null`, `Number`, `Str`, `List`, `Map`, `Function`) and
//! the three compile-time-only operand kinds (`Temp`, `Var`, `SeqElem`)
//! share one enum. The invariant that keeps this safe is that `Temp`/`Var`/
//! `SeqElem` never end up stored *inside* a `List`/`Map` at runtime — they
//! are resolved away by `eval`/`deep_eval` before anything is stored.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use ahash::{AHashSet, AHasher};
use indexmap::IndexMap;

use crate::error::MsError;
use crate::function::FuncVal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarMode {
    Normal,
    WarnLocalOnly,
    StrictLocalOnly,
    /// `@name`: suppresses the parser's auto-invoke ("full evaluation") of
    /// a bare function reference.
    NoInvoke,
}

pub type AssignOverride = Rc<dyn Fn(&Value, &Value) -> bool>;
pub type EvalOverride = Rc<dyn Fn(&Value) -> Option<Value>>;

/// A map's backing store: insertion-order-preserving, with two optional
/// hooks for host-controlled read/write interception.
pub struct MapObj {
    pub entries: IndexMap<ValueKey, Value>,
    pub assign_override: Option<AssignOverride>,
    pub eval_override: Option<EvalOverride>,
}

impl MapObj {
    pub fn new() -> Self {
        Self { entries: IndexMap::new(), assign_override: None, eval_override: None }
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.entries.get(&ValueKey(key.clone())).cloned()
    }

    /// Inserts, honoring `assign_override` if present. Returns false if the
    /// override suppressed the write.
    pub fn insert(&mut self, key: Value, value: Value) -> bool {
        if let Some(ov) = self.assign_override.clone() {
            if ov(&key, &value) {
                return false;
            }
        }
        self.entries.insert(ValueKey(key), value);
        true
    }

    pub fn isa(&self) -> Option<Value> {
        self.get(&Value::str("__isa"))
    }
}

impl Default for MapObj {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MapObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapObj").field("entries", &self.entries).finish()
    }
}

/// Wraps a `Value` for use as an `IndexMap` key, implementing
/// content-equality and cycle-safe hashing.
#[derive(Debug, Clone)]
pub struct ValueKey(pub Value);

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        values_equal(&self.0, &other.0)
    }
}
impl Eq for ValueKey {}

impl Hash for ValueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(hash_value(&self.0));
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(_) => write!(f, "List(..)"),
            Value::Map(_) => write!(f, "Map(..)"),
            Value::Function(_) => write!(f, "Function(..)"),
            Value::Temp(n) => write!(f, "Temp({n})"),
            Value::Var(name, mode) => write!(f, "Var({name}, {mode:?})"),
            Value::SeqElem(seq, idx, ni) => write!(f, "SeqElem({seq:?}, {idx:?}, {ni})"),
        }
    }
}

pub enum Value {
    Null,
    Number(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Map(Rc<RefCell<MapObj>>),
    Function(Rc<FuncVal>),
    /// Compile-time only: slot `n` in the enclosing frame's temp array.
    Temp(u32),
    /// Compile-time only: identifier, resolved local -> outer -> global -> intrinsic.
    Var(Rc<str>, VarMode),
    /// Compile-time only: `seq[index]`; `no_invoke` is the address-of marker.
    SeqElem(Box<Value>, Box<Value>, bool),
}

impl Clone for Value {
    fn clone(&self) -> Self {
        match self {
            Value::Null => Value::Null,
            Value::Number(n) => Value::Number(*n),
            Value::Str(s) => Value::Str(s.clone()),
            Value::List(l) => Value::List(l.clone()),
            Value::Map(m) => Value::Map(m.clone()),
            Value::Function(fv) => Value::Function(fv.clone()),
            Value::Temp(n) => Value::Temp(*n),
            Value::Var(name, mode) => Value::Var(name.clone(), *mode),
            Value::SeqElem(seq, idx, ni) => Value::SeqElem(seq.clone(), idx.clone(), *ni),
        }
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(Rc::from(s.into().into_boxed_str()))
    }

    pub fn new_list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn new_map(obj: MapObj) -> Self {
        Value::Map(Rc::new(RefCell::new(obj)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Function(_) => "function",
            Value::Temp(_) | Value::Var(..) | Value::SeqElem(..) => "operand",
        }
    }

    /// Truthiness: `0`, `""`, `[]`, `{}`, and `null` are false; everything
    /// else (including NaN and non-empty containers)
    /// is true.
    pub fn bool_value(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Map(m) => !m.borrow().entries.is_empty(),
            Value::Function(_) => true,
            Value::Temp(_) | Value::Var(..) | Value::SeqElem(..) => false,
        }
    }

    pub fn double_value(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Str(s) => s.trim().parse().unwrap_or(0.0),
            _ if self.bool_value() => 1.0,
            _ => 0.0,
        }
    }

    pub fn int_value(&self) -> i64 {
        self.double_value().trunc() as i64
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&Rc<str>> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Rc<RefCell<Vec<Value>>>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Rc<RefCell<MapObj>>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Renders the value for `print`/string concatenation. `quoted` controls
    /// whether strings are wrapped in quotes, which is how nested strings
    /// are shown inside list/map renderings but not at top level.
    pub fn to_display_string(&self) -> String {
        let mut visited = AHashSet::new();
        render(self, false, &mut visited)
    }

    fn to_nested_string(&self, visited: &mut AHashSet<usize>) -> String {
        render(self, true, visited)
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        // Locale-invariant, shortest round-tripping decimal form.
        let mut s = format!("{n}");
        if !s.contains('.') && !s.contains('e') && !s.contains("inf") && !s.contains("NaN") {
            s.push_str(".0");
        }
        s
    }
}

fn render(v: &Value, quoted: bool, visited: &mut AHashSet<usize>) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Number(n) => format_number(*n),
        Value::Str(s) => {
            if quoted {
                format!("\"{}\"", s.replace('"', "\"\""))
            } else {
                s.to_string()
            }
        }
        Value::List(l) => {
            let ptr = Rc::as_ptr(l) as usize;
            if !visited.insert(ptr) {
                return "[...]".to_string();
            }
            let inner = l
                .borrow()
                .iter()
                .map(|e| e.to_nested_string(visited))
                .collect::<Vec<_>>()
                .join(", ");
            visited.remove(&ptr);
            format!("[{inner}]")
        }
        Value::Map(m) => {
            let ptr = Rc::as_ptr(m) as usize;
            if !visited.insert(ptr) {
                return "{...}".to_string();
            }
            let inner = m
                .borrow()
                .entries
                .iter()
                .map(|(k, val)| format!("{}: {}", k.0.to_nested_string(visited), val.to_nested_string(visited)))
                .collect::<Vec<_>>()
                .join(", ");
            visited.remove(&ptr);
            format!("{{{inner}}}")
        }
        Value::Function(_) => "function".to_string(),
        Value::Temp(n) => format!("<temp {n}>"),
        Value::Var(name, _) => format!("<var {name}>"),
        Value::SeqElem(..) => "<seqelem>".to_string(),
    }
}

/// Structural, cycle-safe equality: same variant and either
/// same reference or pairwise-equal contents; different variants are
/// always unequal.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    let mut visited = AHashSet::new();
    equal_inner(a, b, &mut visited)
}

fn equal_inner(a: &Value, b: &Value, visited: &mut AHashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let key = (Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize);
            if !visited.insert(key) {
                return true;
            }
            let xb = x.borrow();
            let yb = y.borrow();
            xb.len() == yb.len() && xb.iter().zip(yb.iter()).all(|(p, q)| equal_inner(p, q, visited))
        }
        (Value::Map(x), Value::Map(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let key = (Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize);
            if !visited.insert(key) {
                return true;
            }
            let xb = x.borrow();
            let yb = y.borrow();
            if xb.entries.len() != yb.entries.len() {
                return false;
            }
            xb.entries.iter().all(|(k, v)| match yb.entries.get(k) {
                Some(v2) => equal_inner(v, v2, visited),
                None => false,
            })
        }
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// Cycle-safe, order-dependent-for-lists / order-independent-for-maps hash,
/// consistent with `values_equal`.
pub fn hash_value(v: &Value) -> u64 {
    let mut visited = AHashSet::new();
    hash_inner(v, &mut visited)
}

fn mix(h: u64, x: u64) -> u64 {
    h.rotate_left(5) ^ x
}

fn hash_inner(v: &Value, visited: &mut AHashSet<usize>) -> u64 {
    use std::hash::BuildHasher;
    let build = ahash::RandomState::with_seeds(0, 0, 0, 0);
    match v {
        Value::Null => 0,
        Value::Number(n) => {
            let mut hasher = build.build_hasher();
            n.to_bits().hash(&mut hasher);
            hasher.finish()
        }
        Value::Str(s) => {
            let mut hasher = build.build_hasher();
            s.as_bytes().hash(&mut hasher);
            hasher.finish()
        }
        Value::List(l) => {
            let ptr = Rc::as_ptr(l) as usize;
            if !visited.insert(ptr) {
                return 0x9E37_79B9_7F4A_7C15;
            }
            let h = l.borrow().iter().fold(0x1234_5678_u64, |acc, e| mix(acc, hash_inner(e, visited)));
            h
        }
        Value::Map(m) => {
            let ptr = Rc::as_ptr(m) as usize;
            if !visited.insert(ptr) {
                return 0x9E37_79B9_7F4A_7C15;
            }
            // XOR fold: map equality is order-independent, so the hash must be too.
            m.borrow()
                .entries
                .iter()
                .fold(0u64, |acc, (k, val)| acc ^ mix(hash_inner(&k.0, visited), hash_inner(val, visited)))
        }
        Value::Function(f) => Rc::as_ptr(f) as usize as u64,
        Value::Temp(n) => u64::from(*n) | (1 << 62),
        Value::Var(name, _) => {
            let mut hasher = AHasher::default();
            name.as_bytes().hash(&mut hasher);
            hasher.finish()
        }
        Value::SeqElem(..) => 0xDEAD_BEEF,
    }
}

/// Equality result as a boolean-flavored `f64` (`0`/`1`).
pub fn equality_number(a: &Value, b: &Value) -> f64 {
    if values_equal(a, b) {
        1.0
    } else {
        0.0
    }
}

pub fn type_error_for_index(seq: &Value) -> MsError {
    MsError::type_error(format!("can't index into a {}", seq.type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_equality() {
        assert!(values_equal(&Value::Number(1.0), &Value::Number(1.0)));
        assert!(!values_equal(&Value::Number(1.0), &Value::str("1")));
    }

    #[test]
    fn list_equality_by_content() {
        let a = Value::new_list(vec![Value::Number(1.0)]);
        let b = Value::new_list(vec![Value::Number(1.0)]);
        assert!(values_equal(&a, &b));
        assert_eq!(hash_value(&a), hash_value(&b));
    }

    #[test]
    fn cyclic_list_equality_terminates() {
        let a = Value::new_list(vec![]);
        if let Value::List(l) = &a {
            l.borrow_mut().push(a.clone());
        }
        assert!(values_equal(&a, &a));
        let _ = hash_value(&a);
    }

    #[test]
    fn bool_value_rules() {
        assert!(!Value::Number(0.0).bool_value());
        assert!(!Value::str("").bool_value());
        assert!(!Value::new_list(vec![]).bool_value());
        assert!(!Value::new_map(MapObj::new()).bool_value());
        assert!(!Value::Null.bool_value());
        assert!(Value::Number(0.5).bool_value());
    }
}
