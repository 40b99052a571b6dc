//! Embedding façade: the single entry point a host program
//! uses to compile, run, and introspect a script, so callers never touch
//! `Compiler`/`Vm` directly.

use std::rc::Rc;

use crate::compiler::Compiler;
use crate::error::{ErrorKind, MsError, MsResult};
use crate::limits::Limits;
use crate::tracer::Tracer;
use crate::value::Value;
use crate::vm::{PrintSink, StepOutcome, Vm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Nothing compiled yet, or `reset` was called.
    NotStarted,
    Running,
    Done,
}

/// Drives a single script: compiles it once, then runs via cooperative
/// `step()`/`run_until_done()` calls the host interleaves with its own loop.
pub struct Interpreter {
    source: String,
    limits: Limits,
    vm: Option<Vm>,
    state: RunState,
    /// Set whenever the most recent `compile`/`repl` call failed because the
    /// parser ran off the end of the source mid-construct (an unterminated
    /// `if`/`while`/`for`/`function` block), rather than on a genuine syntax
    /// error. Drives `need_more_input`.
    incomplete: bool,
}

/// Every parser error site that runs off the end of the token stream
/// formats the offending token with `TokenKind::Eof`'s derived `Debug`
/// form (`expect_keyword`/`expect_op`/`expect_identifier` produce `"...,
/// found Eof"`; `parse_primary` produces `"unexpected token Eof ..."`), so
/// the literal substring `"Eof"` is the only signal available without
/// threading a richer "ran off the end" variant through every call site.
fn is_unexpected_eof(e: &MsError) -> bool {
    e.kind == ErrorKind::CompileError && e.message.contains("Eof")
}

impl Interpreter {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into(), limits: Limits::default(), vm: None, state: RunState::NotStarted, incomplete: false }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Compiles the source and prepares a fresh VM. Must be called (directly
    /// or via `run_until_done`/`step`) before execution begins.
    pub fn compile(&mut self, print_sink: PrintSink) -> MsResult<()> {
        let proto = match Compiler::compile(&self.source) {
            Ok(proto) => proto,
            Err(e) => {
                self.incomplete = is_unexpected_eof(&e);
                return Err(e);
            }
        };
        self.incomplete = false;
        self.vm = Some(Vm::new(Rc::new(proto), self.limits, print_sink));
        self.state = RunState::Running;
        Ok(())
    }

    pub fn set_tracer(&mut self, tracer: Box<dyn Tracer>) {
        if let Some(vm) = &mut self.vm {
            vm.set_tracer(tracer);
        }
    }

    pub fn step(&mut self) -> MsResult<StepOutcome> {
        let vm = self.vm.as_mut().expect("compile() must run before step()");
        let outcome = vm.step()?;
        if outcome == StepOutcome::Done {
            self.state = RunState::Done;
        }
        Ok(outcome)
    }

    /// Runs until the program finishes, yields, a `wait` is pending (when
    /// `return_early` is set), or `time_limit` seconds of wall-clock elapse.
    pub fn run_until_done(&mut self, time_limit: f64, return_early: bool) -> MsResult<StepOutcome> {
        let vm = self.vm.as_mut().expect("compile() must run before run_until_done()");
        let outcome = vm.run_until_done(time_limit, return_early)?;
        if outcome == StepOutcome::Done {
            self.state = RunState::Done;
        }
        Ok(outcome)
    }

    /// Compiles and appends `line` to the running program as a REPL would,
    /// re-using the current global scope. Returns the value of the last
    /// bare expression statement, if any.
    pub fn repl(&mut self, line: &str, time_limit: f64) -> MsResult<Option<Value>> {
        if self.vm.is_none() {
            self.source = line.to_string();
            self.compile(Box::new(|_| {}))?;
        } else {
            let proto = match Compiler::compile(line) {
                Ok(proto) => proto,
                Err(e) => {
                    self.incomplete = is_unexpected_eof(&e);
                    return Err(e);
                }
            };
            self.incomplete = false;
            let vm = self.vm.as_mut().unwrap();
            vm.reenter(Rc::new(proto));
        }
        self.state = RunState::Running;
        let vm = self.vm.as_mut().unwrap();
        vm.last_implicit = None;
        let outcome = vm.run_until_done(time_limit, false)?;
        if outcome == StepOutcome::Done {
            self.state = RunState::Done;
        }
        Ok(vm.last_implicit.clone())
    }

    /// Recompiles with a new source string, starting fresh.
    pub fn reset(&mut self, source: impl Into<String>) {
        self.source = source.into();
        self.vm = None;
        self.state = RunState::NotStarted;
    }

    /// Restarts the current source from the top: PC and call stack reset,
    /// but the compiled code and global variables survive, per the
    /// `compile`/`restart` split a host uses to re-run a script without
    /// re-parsing it.
    pub fn restart(&mut self) {
        match &mut self.vm {
            Some(vm) => {
                vm.restart();
                self.state = RunState::Running;
            }
            None => self.state = RunState::NotStarted,
        }
    }

    /// Forces the program to report itself done, without running further.
    pub fn stop(&mut self) {
        self.state = RunState::Done;
    }

    pub fn done(&self) -> bool {
        self.state == RunState::Done
    }

    pub fn running(&self) -> bool {
        self.state == RunState::Running
    }

    /// True after a `compile`/`repl` call failed because the source ended
    /// in the middle of an open block (`if`/`while`/`for`/`function` with no
    /// matching `end ...`), so a REPL host should prompt for another line
    /// and retry rather than surfacing the error to the user.
    pub fn need_more_input(&self) -> bool {
        self.incomplete
    }

    pub fn get_global_value(&self, name: &str) -> Option<Value> {
        self.vm.as_ref()?.globals().borrow().get(name).cloned()
    }

    pub fn set_global_value(&mut self, name: &str, value: Value) {
        if let Some(vm) = &self.vm {
            vm.globals().borrow_mut().insert(Rc::from(name), value);
        }
    }
}
