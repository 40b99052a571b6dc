//! Stack-based, cooperatively-resumable virtual machine.
//!
//! `step()` executes exactly one TAC instruction (or, at a function
//! boundary, performs the implicit `return null` that falls off the end of
//! a body). `run_until_done` drives `step()` in a loop, observing the
//! elapsed-time budget and the `yielding` flag so a host can share a thread
//! across many scripts.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::context::{Context, PartialResult};
use crate::error::{MsError, MsResult, SourceLoc};
use crate::function::{FuncVal, FunctionProto, Locals};
use crate::intrinsics;
use crate::limits::{LimitedTracker, Limits, ResourceTracker};
use crate::tac::{Instruction, Opcode};
use crate::tracer::{NoopTracer, Tracer};
use crate::value::{equality_number, type_error_for_index, MapObj, Value, VarMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The instruction ran; more work may remain.
    Continue,
    /// The program (root context) has finished.
    Done,
    /// A `yield` call suspended execution for this step.
    Yielded,
}

pub type PrintSink = Box<dyn FnMut(&str)>;

pub struct Vm {
    pub(crate) contexts: Vec<Context>,
    pub(crate) limits: Limits,
    pub print_sink: PrintSink,
    pub last_implicit: Option<Value>,
    start: Instant,
    rng: ChaCha8Rng,
    string_proto: Rc<RefCell<MapObj>>,
    list_proto: Rc<RefCell<MapObj>>,
    map_proto: Rc<RefCell<MapObj>>,
    number_proto: Rc<RefCell<MapObj>>,
    function_proto: Rc<RefCell<MapObj>>,
    tracer: Box<dyn Tracer>,
    /// Opaque host-owned data (`Interpreter::host_data`), reachable from
    /// intrinsics that need to call back into the embedding host.
    pub host_data: Option<Rc<dyn Any>>,
    tracker: Box<dyn ResourceTracker>,
}

impl Vm {
    pub fn new(entry: Rc<FunctionProto>, limits: Limits, print_sink: PrintSink) -> Self {
        let root = Context::new(entry, None, None);
        let mut vm = Self {
            contexts: vec![root],
            limits,
            print_sink,
            last_implicit: None,
            start: Instant::now(),
            rng: ChaCha8Rng::seed_from_u64(0x4d53_3130), // "MS10"
            string_proto: Rc::new(RefCell::new(MapObj::new())),
            list_proto: Rc::new(RefCell::new(MapObj::new())),
            map_proto: Rc::new(RefCell::new(MapObj::new())),
            number_proto: Rc::new(RefCell::new(MapObj::new())),
            function_proto: Rc::new(RefCell::new(MapObj::new())),
            tracer: Box::new(NoopTracer),
            host_data: None,
            tracker: Box::new(LimitedTracker::new(limits)),
        };
        vm.install_globals();
        vm
    }

    pub fn set_tracer(&mut self, tracer: Box<dyn Tracer>) {
        self.tracer = tracer;
    }

    fn install_globals(&mut self) {
        let intrinsics_table = intrinsics::call(self, "intrinsics", &[]).expect("building the intrinsics table cannot fail");
        let globals = self.contexts[0].locals.clone();
        let mut g = globals.borrow_mut();
        g.insert(Rc::from("string"), Value::Map(self.string_proto.clone()));
        g.insert(Rc::from("list"), Value::Map(self.list_proto.clone()));
        g.insert(Rc::from("map"), Value::Map(self.map_proto.clone()));
        g.insert(Rc::from("number"), Value::Map(self.number_proto.clone()));
        g.insert(Rc::from("funcRef"), Value::Map(self.function_proto.clone()));
        g.insert(Rc::from("intrinsics"), intrinsics_table);
    }

    /// Rough size, in the same units as `Limits::max_heap_bytes`, of a
    /// freshly-built value. Only the container shapes the VM itself
    /// allocates (list/map literals, concatenation, repetition) charge
    /// against the budget; scalars are free.
    fn value_size_estimate(v: &Value) -> u64 {
        match v {
            Value::Str(s) => s.len() as u64,
            Value::List(items) => items.borrow().len() as u64 * 8,
            Value::Map(m) => m.borrow().entries.len() as u64 * 16,
            _ => 0,
        }
    }

    /// Charges a freshly-allocated value against the heap budget.
    pub(crate) fn note_alloc(&mut self, v: &Value) -> MsResult<()> {
        self.tracker.note_alloc(Self::value_size_estimate(v))
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn rng_next(&mut self) -> f64 {
        (self.rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    pub fn globals(&self) -> crate::function::Locals {
        self.contexts[0].locals.clone()
    }

    /// Re-enters the root context with a freshly compiled entry point,
    /// keeping the existing global locals — used by the REPL to run each
    /// new line against the same accumulated state.
    pub fn reenter(&mut self, entry: Rc<FunctionProto>) {
        let locals = self.contexts[0].locals.clone();
        self.contexts.truncate(1);
        let mut ctx = Context::new(entry, None, None);
        ctx.locals = locals;
        self.contexts[0] = ctx;
    }

    /// Rewinds the root context's PC to the top and drops every call frame
    /// above it, without discarding the compiled entry point or the global
    /// locals map — the `Interpreter::restart` contract (keep code and
    /// globals, reset PC and stack).
    pub fn restart(&mut self) {
        let proto = self.contexts[0].proto.clone();
        self.reenter(proto);
    }

    fn depth(&self) -> usize {
        self.contexts.len() - 1
    }

    fn err_here(&self, e: MsError) -> MsError {
        let label = if self.contexts.len() > 1 { "function" } else { "<main>" };
        let line = self.contexts[self.depth()].proto.code.get(self.contexts[self.depth()].pc.saturating_sub(1)).map(|i| i.line).unwrap_or(0);
        e.with_loc(SourceLoc::new(label, line))
    }

    /// Runs one instruction (or one implicit-return-at-end-of-body step).
    pub fn step(&mut self) -> MsResult<StepOutcome> {
        loop {
            let depth = self.depth();
            let pc = self.contexts[depth].pc;
            let len = self.contexts[depth].proto.code.len();
            if pc >= len {
                if depth == 0 {
                    return Ok(StepOutcome::Done);
                }
                self.do_return(Value::Null, depth)?;
                continue;
            }
            break;
        }
        let depth = self.depth();
        let instr = self.contexts[depth].proto.code[self.contexts[depth].pc].clone();
        self.tracer.on_step(self.contexts[depth].pc, &instr);
        self.contexts[depth].pc += 1;
        match self.execute(&instr, depth) {
            Ok(yielded) => Ok(if yielded { StepOutcome::Yielded } else { StepOutcome::Continue }),
            Err(e) => {
                let e = self.err_here(e);
                self.tracer.on_error(&e.message);
                Err(e)
            }
        }
    }

    /// Drives `step()` until the program finishes, yields, hits a pending
    /// resumable intrinsic with `return_early`, or the time slice elapses.
    pub fn run_until_done(&mut self, time_limit: f64, return_early: bool) -> MsResult<StepOutcome> {
        let deadline = self.elapsed_secs() + time_limit;
        loop {
            match self.step()? {
                StepOutcome::Done => return Ok(StepOutcome::Done),
                StepOutcome::Yielded => return Ok(StepOutcome::Yielded),
                StepOutcome::Continue => {
                    if return_early && self.contexts[self.depth()].partial_result.is_some() {
                        return Ok(StepOutcome::Continue);
                    }
                    if self.elapsed_secs() >= deadline {
                        return Ok(StepOutcome::Continue);
                    }
                }
            }
        }
    }

    fn execute(&mut self, instr: &Instruction, depth: usize) -> MsResult<bool> {
        use Opcode::*;
        match instr.op {
            AssignA | CopyA => {
                let v = self.resolve(&instr.a, depth)?;
                self.store(&instr.lhs, v, depth)?;
            }
            AssignImplicit => {
                let v = self.resolve(&instr.a, depth)?;
                self.contexts[depth].implicit_count += 1;
                self.last_implicit = Some(v);
            }
            NewA => {
                let proto_val = self.resolve(&instr.a, depth)?;
                let Value::Map(proto_map) = &proto_val else {
                    return Err(MsError::type_error(format!(
                        "'new' requires a map, got {}",
                        proto_val.type_name()
                    )));
                };
                if Rc::ptr_eq(proto_map, &self.string_proto)
                    || Rc::ptr_eq(proto_map, &self.list_proto)
                    || Rc::ptr_eq(proto_map, &self.map_proto)
                    || Rc::ptr_eq(proto_map, &self.number_proto)
                    || Rc::ptr_eq(proto_map, &self.function_proto)
                {
                    return Err(MsError::type_error("'new' cannot be applied to a built-in type prototype"));
                }
                let mut m = MapObj::new();
                m.insert(Value::str("__isa"), proto_val);
                let v = Value::new_map(m);
                self.note_alloc(&v)?;
                self.store(&instr.lhs, v, depth)?;
            }
            BindAssignA => {
                if let Value::Function(fv) = &instr.a {
                    let bound = FuncVal::new(fv.proto.clone(), Some(self.contexts[depth].locals.clone()));
                    self.store(&instr.lhs, Value::Function(Rc::new(bound)), depth)?;
                } else {
                    return Err(MsError::runtime("BindAssignA requires a function literal operand"));
                }
            }
            APlusB => {
                let (a, b) = (self.resolve(&instr.a, depth)?, self.resolve(&instr.b, depth)?);
                let v = add(&a, &b)?;
                self.note_alloc(&v)?;
                self.store(&instr.lhs, v, depth)?;
            }
            AMinusB => {
                let (a, b) = (self.resolve(&instr.a, depth)?, self.resolve(&instr.b, depth)?);
                self.store(&instr.lhs, Value::Number(a.double_value() - b.double_value()), depth)?;
            }
            ATimesB => {
                let (a, b) = (self.resolve(&instr.a, depth)?, self.resolve(&instr.b, depth)?);
                let v = multiply(&a, &b)?;
                self.note_alloc(&v)?;
                self.store(&instr.lhs, v, depth)?;
            }
            ADividedByB => {
                let (a, b) = (self.resolve(&instr.a, depth)?, self.resolve(&instr.b, depth)?);
                let v = divide(&a, &b)?;
                self.note_alloc(&v)?;
                self.store(&instr.lhs, v, depth)?;
            }
            AModB => {
                let (a, b) = (self.resolve(&instr.a, depth)?, self.resolve(&instr.b, depth)?);
                self.store(&instr.lhs, Value::Number(a.double_value().rem_euclid(b.double_value())), depth)?;
            }
            APowB => {
                let (a, b) = (self.resolve(&instr.a, depth)?, self.resolve(&instr.b, depth)?);
                self.store(&instr.lhs, Value::Number(a.double_value().powf(b.double_value())), depth)?;
            }
            AEqualB => {
                let (a, b) = (self.resolve(&instr.a, depth)?, self.resolve(&instr.b, depth)?);
                self.store(&instr.lhs, Value::Number(equality_number(&a, &b)), depth)?;
            }
            ANotEqualB => {
                let (a, b) = (self.resolve(&instr.a, depth)?, self.resolve(&instr.b, depth)?);
                self.store(&instr.lhs, Value::Number(1.0 - equality_number(&a, &b)), depth)?;
            }
            AGreaterThanB => {
                let (a, b) = (self.resolve(&instr.a, depth)?, self.resolve(&instr.b, depth)?);
                self.store(&instr.lhs, Value::Number(bool_num(compare(&a, &b)? == std::cmp::Ordering::Greater)), depth)?;
            }
            AGreatOrEqualB => {
                let (a, b) = (self.resolve(&instr.a, depth)?, self.resolve(&instr.b, depth)?);
                self.store(&instr.lhs, Value::Number(bool_num(compare(&a, &b)? != std::cmp::Ordering::Less)), depth)?;
            }
            ALessThanB => {
                let (a, b) = (self.resolve(&instr.a, depth)?, self.resolve(&instr.b, depth)?);
                self.store(&instr.lhs, Value::Number(bool_num(compare(&a, &b)? == std::cmp::Ordering::Less)), depth)?;
            }
            ALessOrEqualB => {
                let (a, b) = (self.resolve(&instr.a, depth)?, self.resolve(&instr.b, depth)?);
                self.store(&instr.lhs, Value::Number(bool_num(compare(&a, &b)? != std::cmp::Ordering::Greater)), depth)?;
            }
            AisaB => {
                let (a, b) = (self.resolve(&instr.a, depth)?, self.resolve(&instr.b, depth)?);
                let v = self.isa_check(&a, &b)?;
                self.store(&instr.lhs, Value::Number(v), depth)?;
            }
            AAndB => {
                let (a, b) = (self.resolve(&instr.a, depth)?, self.resolve(&instr.b, depth)?);
                let x = a.double_value().abs().min(1.0);
                let y = b.double_value().abs().min(1.0);
                self.store(&instr.lhs, Value::Number(x * y), depth)?;
            }
            AOrB => {
                let (a, b) = (self.resolve(&instr.a, depth)?, self.resolve(&instr.b, depth)?);
                let x = a.double_value().abs().min(1.0);
                let y = b.double_value().abs().min(1.0);
                self.store(&instr.lhs, Value::Number(x + y - x * y), depth)?;
            }
            NotA => {
                let a = self.resolve(&instr.a, depth)?;
                self.store(&instr.lhs, Value::Number(if a.bool_value() { 0.0 } else { 1.0 }), depth)?;
            }
            GotoA => {
                self.contexts[depth].pc = instr.target as usize;
            }
            GotoAifB => {
                let a = self.resolve(&instr.a, depth)?;
                if a.bool_value() {
                    self.contexts[depth].pc = instr.target as usize;
                }
            }
            GotoAifNotB => {
                let a = self.resolve(&instr.a, depth)?;
                if !a.bool_value() {
                    self.contexts[depth].pc = instr.target as usize;
                }
            }
            GotoAifTrulyB => {
                let a = self.resolve(&instr.a, depth)?;
                if a.int_value() != 0 {
                    self.contexts[depth].pc = instr.target as usize;
                }
            }
            PushParam => {
                let v = self.resolve(&instr.a, depth)?;
                self.contexts[depth].arg_stack.push(v);
            }
            CallFunctionA => {
                return self.do_call(instr, depth);
            }
            ReturnA => {
                let v = self.resolve(&instr.a, depth)?;
                self.do_return(v, depth)?;
            }
            ElemBofA | ElemBofIterA => {
                let seq = self.resolve(&instr.a, depth)?;
                let key = self.resolve(&instr.b, depth)?;
                let v = self.index_get(&seq, &key)?;
                self.store(&instr.lhs, v, depth)?;
            }
            LengthOfA => {
                let seq = self.resolve(&instr.a, depth)?;
                let v = self.length_of(&seq)?;
                self.store(&instr.lhs, Value::Number(v as f64), depth)?;
            }
        }
        Ok(false)
    }

    // ---- operand resolution ----

    /// `outer`, `locals`, and `globals` are reserved names bound directly to
    /// a context's backing variable dictionaries (spec: "outer variables as
    /// a map, not a frame"), so `outer.x = v` mutates the closed-over scope
    /// rather than shadowing it with a new local.
    fn reserved_scope(&self, name: &str, depth: usize) -> Option<Locals> {
        match name {
            "outer" => self.contexts[depth].outer_vars.clone(),
            "locals" => Some(self.contexts[depth].locals.clone()),
            "globals" => Some(self.contexts[0].locals.clone()),
            _ => None,
        }
    }

    fn resolve(&mut self, op: &Value, depth: usize) -> MsResult<Value> {
        match op {
            Value::Temp(n) => Ok(self.contexts[depth].temp(*n)),
            Value::Var(name, mode) => {
                if let Some(scope) = self.reserved_scope(name, depth) {
                    let mut m = MapObj::new();
                    for (k, v) in scope.borrow().iter() {
                        m.insert(Value::str(k.as_ref()), v.clone());
                    }
                    return Ok(Value::new_map(m));
                }
                self.lookup_var(name, *mode, depth)
            }
            Value::SeqElem(seq, idx, _) => {
                if let Value::Var(name, _) = seq.as_ref() {
                    if let Some(scope) = self.reserved_scope(name, depth) {
                        let key = self.resolve(idx, depth)?;
                        let key_name = key
                            .as_str()
                            .ok_or_else(|| MsError::type_error("outer/locals/globals keys must be strings"))?;
                        return Ok(scope.borrow().get(key_name.as_ref()).cloned().unwrap_or(Value::Null));
                    }
                }
                let base = self.resolve(seq, depth)?;
                let key = self.resolve(idx, depth)?;
                self.index_get(&base, &key)
            }
            Value::List(items) => {
                let resolved: Vec<Value> =
                    items.borrow().iter().map(|e| self.resolve(e, depth)).collect::<Result<_, _>>()?;
                let v = Value::new_list(resolved);
                self.note_alloc(&v)?;
                Ok(v)
            }
            Value::Map(entries) => {
                let mut fresh = MapObj::new();
                let src = entries.borrow();
                let pairs: Vec<(Value, Value)> = src.entries.iter().map(|(k, v)| (k.0.clone(), v.clone())).collect();
                drop(src);
                for (k, v) in pairs {
                    let k = self.resolve(&k, depth)?;
                    let v = self.resolve(&v, depth)?;
                    fresh.insert(k, v);
                }
                let v = Value::new_map(fresh);
                self.note_alloc(&v)?;
                Ok(v)
            }
            other => Ok(other.clone()),
        }
    }

    fn lookup_var(&mut self, name: &Rc<str>, mode: VarMode, depth: usize) -> MsResult<Value> {
        if &**name == "self" {
            return Ok(self.contexts[depth].self_value.clone().unwrap_or(Value::Null));
        }
        if &**name == "super" {
            return Ok(self.contexts[depth].super_value.clone());
        }
        if let Some(v) = self.contexts[depth].locals.borrow().get(name).cloned() {
            return Ok(v);
        }
        if matches!(mode, VarMode::StrictLocalOnly) {
            return Err(MsError::undefined_local(format!("'{name}' is not a local variable")));
        }
        if let Some(outer) = self.contexts[depth].outer_vars.clone() {
            if let Some(v) = outer.borrow().get(name).cloned() {
                return Ok(v);
            }
        }
        if depth > 0 {
            if let Some(v) = self.contexts[0].locals.borrow().get(name).cloned() {
                return Ok(v);
            }
        }
        if intrinsics::ALL_NAMES.contains(&name.as_ref()) {
            return Ok(native_function(name));
        }
        Err(MsError::undefined_identifier(format!("'{name}' is not defined")))
    }

    fn store(&mut self, target: &Value, value: Value, depth: usize) -> MsResult<()> {
        match target {
            Value::Null => Ok(()),
            Value::Temp(n) => {
                self.contexts[depth].set_temp(*n, value);
                Ok(())
            }
            Value::Var(name, _) => match name.as_ref() {
                "globals" | "locals" => Err(MsError::compile(format!("cannot assign to reserved name '{name}'"))),
                "self" => {
                    self.contexts[depth].self_value = Some(value);
                    Ok(())
                }
                _ => {
                    self.contexts[depth].locals.borrow_mut().insert(name.clone(), value);
                    Ok(())
                }
            },
            Value::SeqElem(seq, idx, _) => {
                if let Value::Var(name, _) = seq.as_ref() {
                    if let Some(scope) = self.reserved_scope(name, depth) {
                        let key = self.resolve(idx, depth)?;
                        let key_name = key
                            .as_str()
                            .ok_or_else(|| MsError::type_error("outer/locals/globals keys must be strings"))?;
                        scope.borrow_mut().insert(key_name.clone(), value);
                        return Ok(());
                    }
                }
                let base = self.resolve(seq, depth)?;
                let key = self.resolve(idx, depth)?;
                self.index_set(&base, &key, value)
            }
            _ => Err(MsError::runtime("invalid assignment target")),
        }
    }

    // ---- indexing ----

    fn index_get(&mut self, seq: &Value, key: &Value) -> MsResult<Value> {
        match seq {
            Value::Map(m) => {
                if let Some(v) = m.borrow().get(key) {
                    return Ok(v);
                }
                let mut depth_guard = 0u32;
                let mut cur = m.borrow().isa();
                while let Some(Value::Map(parent)) = cur {
                    depth_guard += 1;
                    if depth_guard > self.limits.max_isa_depth {
                        return Err(MsError::limit_exceeded("__isa chain too deep"));
                    }
                    if let Some(v) = parent.borrow().get(key) {
                        return Ok(v);
                    }
                    cur = parent.borrow().isa();
                }
                if let Some(name) = key.as_str() {
                    if let Some(full) = intrinsics::builtin_method_name("map", name) {
                        return Ok(native_function_named(full));
                    }
                }
                Err(MsError::key_not_found(format!("key '{}' not found in map", key.to_display_string())))
            }
            Value::List(l) => match key {
                Value::Number(n) => {
                    let b = l.borrow();
                    let idx = intrinsics::normalize_index(*n as i64, b.len())
                        .ok_or_else(|| MsError::index("list index out of range"))?;
                    Ok(b[idx].clone())
                }
                Value::Str(name) => intrinsics::builtin_method_name("list", name)
                    .map(native_function_named)
                    .ok_or_else(|| MsError::undefined_identifier(format!("list has no method '{name}'"))),
                _ => Err(MsError::type_error("list index must be a number")),
            },
            Value::Str(s) => match key {
                Value::Number(n) => {
                    let chars: Vec<char> = s.chars().collect();
                    let idx = intrinsics::normalize_index(*n as i64, chars.len())
                        .ok_or_else(|| MsError::index("string index out of range"))?;
                    Ok(Value::str(chars[idx].to_string()))
                }
                Value::Str(name) => intrinsics::builtin_method_name("string", name)
                    .map(native_function_named)
                    .ok_or_else(|| MsError::undefined_identifier(format!("string has no method '{name}'"))),
                _ => Err(MsError::type_error("string index must be a number")),
            },
            Value::Number(_) => match key.as_str() {
                Some(name) if intrinsics::ALL_NAMES.contains(&name.as_ref()) => Ok(native_function(name)),
                _ => Err(type_error_for_index(seq)),
            },
            _ => Err(type_error_for_index(seq)),
        }
    }

    /// Like `index_get`, but for a map receiver also reports which map in
    /// the `__isa` chain the key was actually found in, so `do_call` can
    /// bind `super` to *that* map's parent rather than the receiver's.
    fn index_get_with_origin(&mut self, seq: &Value, key: &Value) -> MsResult<(Value, Option<Rc<RefCell<MapObj>>>)> {
        if let Value::Map(m) = seq {
            if let Some(v) = m.borrow().get(key) {
                return Ok((v, Some(m.clone())));
            }
            let mut depth_guard = 0u32;
            let mut cur = m.borrow().isa();
            while let Some(Value::Map(parent)) = cur {
                depth_guard += 1;
                if depth_guard > self.limits.max_isa_depth {
                    return Err(MsError::limit_exceeded("__isa chain too deep"));
                }
                if let Some(v) = parent.borrow().get(key) {
                    return Ok((v, Some(parent.clone())));
                }
                cur = parent.borrow().isa();
            }
        }
        Ok((self.index_get(seq, key)?, None))
    }

    fn index_set(&mut self, seq: &Value, key: &Value, value: Value) -> MsResult<()> {
        match seq {
            Value::List(l) => match key {
                Value::Number(n) => {
                    let mut b = l.borrow_mut();
                    let idx = intrinsics::normalize_index(*n as i64, b.len())
                        .ok_or_else(|| MsError::index("list index out of range"))?;
                    b[idx] = value;
                    Ok(())
                }
                _ => Err(MsError::type_error("list index must be a number")),
            },
            Value::Map(m) => {
                m.borrow_mut().insert(key.clone(), value);
                Ok(())
            }
            _ => Err(type_error_for_index(seq)),
        }
    }

    fn length_of(&self, v: &Value) -> MsResult<usize> {
        match v {
            Value::Str(s) => Ok(s.chars().count()),
            Value::List(l) => Ok(l.borrow().len()),
            Value::Map(m) => Ok(m.borrow().entries.len()),
            _ => Err(MsError::type_error(format!("can't take length of a {}", v.type_name()))),
        }
    }

    fn isa_check(&self, a: &Value, b: &Value) -> MsResult<f64> {
        let Value::Map(target) = b else {
            return Ok(0.0);
        };
        // Primitive operands (number/string/list/function) aren't Maps
        // themselves; they report membership in the matching built-in
        // type prototype instead of walking an __isa chain.
        let cur = match a {
            Value::Map(m) => m.clone(),
            Value::Number(_) => return Ok(bool_num(Rc::ptr_eq(&self.number_proto, target))),
            Value::Str(_) => return Ok(bool_num(Rc::ptr_eq(&self.string_proto, target))),
            Value::List(_) => return Ok(bool_num(Rc::ptr_eq(&self.list_proto, target))),
            Value::Function(_) => return Ok(bool_num(Rc::ptr_eq(&self.function_proto, target))),
            _ => return Ok(0.0),
        };
        let mut cur = cur;
        let mut depth_guard = 0u32;
        loop {
            if Rc::ptr_eq(&cur, target) {
                return Ok(1.0);
            }
            depth_guard += 1;
            if depth_guard > self.limits.max_isa_depth {
                return Err(MsError::limit_exceeded("__isa chain too deep"));
            }
            let next = cur.borrow().isa();
            match next {
                Some(Value::Map(parent)) => cur = parent,
                _ => return Ok(0.0),
            }
        }
    }

    // ---- calls ----

    fn do_call(&mut self, instr: &Instruction, depth: usize) -> MsResult<bool> {
        if let Some(PartialResult::WaitUntil(deadline)) = self.contexts[depth].partial_result {
            if self.elapsed_secs() >= deadline {
                self.contexts[depth].partial_result = None;
                self.store(&instr.lhs, Value::Null, depth)?;
            } else {
                self.contexts[depth].pc -= 1;
            }
            return Ok(false);
        }

        let n = instr.argc as usize;
        let mut super_val = Value::Null;
        let (callee, self_for_call) = match &instr.a {
            Value::SeqElem(seq, idx, _) => {
                let base = self.resolve(seq, depth)?;
                let key = self.resolve(idx, depth)?;
                let (callee, origin) = self.index_get_with_origin(&base, &key)?;
                super_val = origin.and_then(|m| m.borrow().isa()).unwrap_or(Value::Null);
                (callee, Some(base))
            }
            Value::Var(name, mode) => (self.lookup_var(name, *mode, depth)?, None),
            other => (self.resolve(other, depth)?, None),
        };
        let start = self.contexts[depth].arg_stack.len().saturating_sub(n);
        let args: Vec<Value> = self.contexts[depth].arg_stack.drain(start..).collect();

        match callee {
            Value::Function(fv) => {
                if let Some(name) = fv.proto.native {
                    if name == "yield" {
                        self.store(&instr.lhs, Value::Null, depth)?;
                        return Ok(true);
                    }
                    if name == "wait" {
                        let seconds = args.first().map(|v| v.double_value()).unwrap_or(1.0);
                        self.contexts[depth].partial_result = Some(PartialResult::WaitUntil(self.elapsed_secs() + seconds));
                        self.contexts[depth].pc -= 1;
                        return Ok(false);
                    }
                    let mut full_args = Vec::with_capacity(args.len() + 1);
                    if let Some(s) = self_for_call {
                        full_args.push(s);
                    }
                    full_args.extend(args);
                    let v = intrinsics::call(self, name, &full_args)?;
                    self.store(&instr.lhs, v, depth)?;
                } else {
                    if args.len() > self.limits.max_call_args as usize {
                        return Err(MsError::too_many_arguments("too many arguments in call"));
                    }
                    // A dot-call whose first declared parameter is literally
                    // named `self` binds the receiver to that parameter's
                    // slot via `self_value` (as `lookup_var` always resolves
                    // `self` there first) rather than double-counting it as
                    // a positional argument.
                    let skip_self_param =
                        self_for_call.is_some() && fv.proto.params.first().is_some_and(|p| &*p.name == "self");
                    let params = if skip_self_param { &fv.proto.params[1..] } else { &fv.proto.params[..] };
                    if args.len() > params.len() {
                        return Err(MsError::too_many_arguments(format!(
                            "function takes {} argument(s), {} given",
                            params.len(),
                            args.len()
                        )));
                    }
                    let mut new_ctx = Context::new(fv.proto.clone(), fv.outer_vars.clone(), self_for_call);
                    new_ctx.super_value = super_val;
                    for (i, p) in params.iter().enumerate() {
                        let v = match args.get(i) {
                            Some(v) => v.clone(),
                            None => p
                                .default
                                .clone()
                                .ok_or_else(|| MsError::runtime(format!("missing required argument '{}'", p.name)))?,
                        };
                        new_ctx.locals.borrow_mut().insert(p.name.clone(), v);
                    }
                    new_ctx.result_dest = Some(instr.lhs.clone());
                    self.contexts.push(new_ctx);
                }
            }
            other => {
                if n > 0 {
                    return Err(MsError::too_many_arguments("called a non-function value with arguments"));
                }
                self.store(&instr.lhs, other, depth)?;
            }
        }
        Ok(false)
    }

    fn do_return(&mut self, value: Value, depth: usize) -> MsResult<()> {
        if depth == 0 {
            self.contexts[0].pc = self.contexts[0].proto.code.len();
            self.last_implicit = Some(value);
            return Ok(());
        }
        let finished = self.contexts.pop().expect("depth > 0 implies at least two contexts");
        if let Some(dest) = finished.result_dest {
            let parent_depth = self.contexts.len() - 1;
            self.store(&dest, value, parent_depth)?;
        }
        Ok(())
    }
}

fn native_function(name: &str) -> Value {
    let leaked: &'static str = intrinsics::ALL_NAMES.iter().find(|n| **n == name).copied().unwrap_or("print");
    native_function_named(leaked)
}

fn native_function_named(name: &'static str) -> Value {
    Value::Function(Rc::new(FuncVal::new(FunctionProto::native(name), None)))
}

fn bool_num(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

fn add(a: &Value, b: &Value) -> MsResult<Value> {
    match (a, b) {
        (Value::Str(x), _) => Ok(Value::str(format!("{x}{}", b.to_display_string()))),
        (_, Value::Str(y)) => Ok(Value::str(format!("{}{y}", a.to_display_string()))),
        (Value::List(x), Value::List(y)) => {
            let mut out = x.borrow().clone();
            out.extend(y.borrow().iter().cloned());
            Ok(Value::new_list(out))
        }
        (Value::Map(x), Value::Map(y)) => {
            // Merge: start from a's entries, then overlay b's (later keys win).
            let mut fresh = MapObj::new();
            for (k, v) in x.borrow().entries.iter() {
                fresh.entries.insert(k.clone(), v.clone());
            }
            for (k, v) in y.borrow().entries.iter() {
                fresh.entries.insert(k.clone(), v.clone());
            }
            Ok(Value::new_map(fresh))
        }
        _ => Ok(Value::Number(a.double_value() + b.double_value())),
    }
}

/// True for factors that should collapse a repetition op to `null` rather
/// than attempting to interpret them as a repeat count.
fn is_degenerate_factor(n: f64) -> bool {
    n.is_nan() || n.is_infinite()
}

fn repeat_string(s: &str, n: f64) -> Value {
    if n <= 0.0 {
        return Value::str("");
    }
    let chars: Vec<char> = s.chars().collect();
    let whole = n.floor() as usize;
    let frac = n - n.floor();
    let mut out = String::with_capacity(chars.len() * whole.min(1 << 20));
    for _ in 0..whole {
        out.extend(chars.iter());
    }
    if frac > 0.0 {
        let extra = ((chars.len() as f64) * frac).round() as usize;
        out.extend(chars.iter().take(extra));
    }
    Value::str(out)
}

fn repeat_list(items: &[Value], n: f64) -> Value {
    if n <= 0.0 {
        return Value::new_list(Vec::new());
    }
    let whole = n.floor() as usize;
    let frac = n - n.floor();
    let mut out = Vec::with_capacity(items.len() * whole.min(1 << 20));
    for _ in 0..whole {
        out.extend(items.iter().cloned());
    }
    if frac > 0.0 {
        let extra = ((items.len() as f64) * frac).round() as usize;
        out.extend(items.iter().take(extra).cloned());
    }
    Value::new_list(out)
}

/// `*`: numeric multiplication, string/list repetition.
fn multiply(a: &Value, b: &Value) -> MsResult<Value> {
    match (a, b) {
        (Value::Str(s), Value::Number(n)) | (Value::Number(n), Value::Str(s)) => {
            if is_degenerate_factor(*n) {
                return Ok(Value::Null);
            }
            Ok(repeat_string(s, *n))
        }
        (Value::List(l), Value::Number(n)) | (Value::Number(n), Value::List(l)) => {
            if is_degenerate_factor(*n) {
                return Ok(Value::Null);
            }
            Ok(repeat_list(&l.borrow(), *n))
        }
        _ => Ok(Value::Number(a.double_value() * b.double_value())),
    }
}

/// `/`: numeric division; `string / n` is `string * (1/n)`.
fn divide(a: &Value, b: &Value) -> MsResult<Value> {
    match (a, b) {
        (Value::Str(s), Value::Number(n)) => {
            if is_degenerate_factor(*n) || *n == 0.0 {
                return Ok(Value::Null);
            }
            Ok(repeat_string(s, 1.0 / n))
        }
        _ => Ok(Value::Number(a.double_value() / b.double_value())),
    }
}

/// Ordering used by `<`, `<=`, `>`, `>=`: numeric for numbers, lexicographic
/// for strings, otherwise by numeric coercion.
fn compare(a: &Value, b: &Value) -> MsResult<std::cmp::Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => a
            .double_value()
            .partial_cmp(&b.double_value())
            .ok_or_else(|| MsError::type_error("can't compare NaN")),
    }
}
