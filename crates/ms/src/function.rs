//! `FunctionProto` and the closure value that pairs a proto with
//! captured outer variables.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::tac::Instruction;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Param {
    pub name: Rc<str>,
    /// Default-value literal, evaluated fresh at bind time if the caller
    /// omitted this argument.
    pub default: Option<Value>,
}

/// Compiled body of a function literal: parameters (with optional
/// defaults) and its TAC instruction sequence. Carries no name — MS
/// functions are anonymous values bound to variables by assignment.
#[derive(Debug)]
pub struct FunctionProto {
    pub params: Vec<Param>,
    pub code: Vec<Instruction>,
    /// Set for functions that wrap a built-in intrinsic (e.g. the bound
    /// `push` obtained from `list.push`) instead of compiled TAC. `code` is
    /// empty in that case.
    pub native: Option<&'static str>,
}

impl FunctionProto {
    pub fn compiled(params: Vec<Param>, code: Vec<Instruction>) -> Self {
        Self { params, code, native: None }
    }

    pub fn native(name: &'static str) -> Rc<Self> {
        Rc::new(Self { params: Vec::new(), code: Vec::new(), native: Some(name) })
    }
}

pub type Locals = Rc<RefCell<HashMap<Rc<str>, Value>>>;

/// A function value: a `FunctionProto` reference plus the outer-scope
/// locals map captured at definition time (`None` for functions that
/// close over nothing, e.g. the program entry point).
#[derive(Debug)]
pub struct FuncVal {
    pub proto: Rc<FunctionProto>,
    pub outer_vars: Option<Locals>,
}

impl FuncVal {
    pub fn new(proto: Rc<FunctionProto>, outer_vars: Option<Locals>) -> Self {
        Self { proto, outer_vars }
    }
}
