//! Call frame: one per active function invocation, or the
//! program entry point at the bottom of the VM's context stack.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::function::{FunctionProto, Locals};
use crate::value::Value;

/// State a resumable (coroutine-like) intrinsic stashes across `step()`
/// calls. `wait` is the only built-in that needs this; it stores the
/// wall-clock deadline rather than re-reading its argument on resume.
#[derive(Debug, Clone, Copy)]
pub enum PartialResult {
    WaitUntil(f64),
}

pub struct Context {
    pub proto: Rc<FunctionProto>,
    pub pc: usize,
    pub locals: Locals,
    pub outer_vars: Option<Locals>,
    pub self_value: Option<Value>,
    /// What the reserved identifier `super` resolves to inside this call:
    /// the `__isa` of the map the callee was actually found in (which may
    /// differ from `self_value.__isa` once inheritance is more than one
    /// level deep).
    pub super_value: Value,
    /// Values queued by `PushParam`, consumed in order by the next call.
    pub arg_stack: Vec<Value>,
    /// Destination in the *parent* context's temp/lvalue slot that a
    /// `ReturnA` (or implicit fall-off-the-end) writes into.
    pub result_dest: Option<Value>,
    pub temps: Vec<Value>,
    /// Non-`None` while a resumable intrinsic (currently only `wait`) is
    /// waiting to be re-entered; the VM rewinds `pc` by one instruction so
    /// the same `CallFunctionA` (dispatched to the native function by name
    /// in `do_call`) runs again on the next `step()`.
    pub partial_result: Option<PartialResult>,
    /// Number of implicit (non-assigned) expression-statement results seen,
    /// used by the REPL to report "no value produced" distinctly from null.
    pub implicit_count: u32,
}

impl Context {
    pub fn new(proto: Rc<FunctionProto>, outer_vars: Option<Locals>, self_value: Option<Value>) -> Self {
        Self {
            proto,
            pc: 0,
            locals: Rc::new(RefCell::new(HashMap::new())),
            outer_vars,
            self_value,
            super_value: Value::Null,
            arg_stack: Vec::new(),
            result_dest: None,
            temps: Vec::new(),
            partial_result: None,
            implicit_count: 0,
        }
    }

    pub fn temp(&self, n: u32) -> Value {
        self.temps.get(n as usize).cloned().unwrap_or(Value::Null)
    }

    pub fn set_temp(&mut self, n: u32, v: Value) {
        let idx = n as usize;
        if idx >= self.temps.len() {
            self.temps.resize(idx + 1, Value::Null);
        }
        self.temps[idx] = v;
    }
}
