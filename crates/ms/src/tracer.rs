//! VM instrumentation hook: a zero-cost trait with a no-op default so
//! tracing costs nothing when the embedder doesn't care, plus a
//! `tracing`-crate-backed impl for hosts that do.

use crate::tac::Instruction;

/// Observes VM execution one instruction at a time. All methods have empty
/// default bodies so implementing only the ones you need costs nothing.
pub trait Tracer {
    fn on_step(&mut self, _pc: usize, _instr: &Instruction) {}
    fn on_call(&mut self, _depth: usize) {}
    fn on_return(&mut self, _depth: usize) {}
    fn on_error(&mut self, _message: &str) {}
}

#[derive(Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}

/// Emits `tracing` events; enable with `RUST_LOG=ms=trace`.
#[derive(Default)]
pub struct TracingTracer;

impl Tracer for TracingTracer {
    fn on_step(&mut self, pc: usize, instr: &Instruction) {
        tracing::trace!(pc, op = ?instr.op, line = instr.line, "step");
    }

    fn on_call(&mut self, depth: usize) {
        tracing::debug!(depth, "call");
    }

    fn on_return(&mut self, depth: usize) {
        tracing::debug!(depth, "return");
    }

    fn on_error(&mut self, message: &str) {
        tracing::warn!(message, "script error");
    }
}
