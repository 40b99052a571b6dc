mod compiler;
mod context;
mod error;
mod function;
mod intrinsics;
mod interpreter;
mod lexer;
mod limits;
mod tac;
mod tracer;
mod value;
mod vm;

pub use crate::{
    compiler::Compiler,
    error::{ErrorKind, MsError, MsResult, SourceLoc},
    function::{FuncVal, FunctionProto, Locals, Param},
    interpreter::{Interpreter, RunState},
    lexer::{ends_with_line_continuation, Lexer, Op, Token, TokenKind},
    limits::{LimitedTracker, Limits, NoLimitTracker, ResourceTracker},
    tac::{Instruction, Opcode},
    tracer::{NoopTracer, Tracer, TracingTracer},
    value::{MapObj, Value, ValueKey, VarMode},
    vm::{PrintSink, StepOutcome, Vm},
};
