//! Recursive-descent parser and single-pass TAC emitter.
//!
//! The parser emits directly into an [`EmitCtx`] rather than building an
//! intermediate AST. Nested `function ... end function` literals push a
//! fresh `EmitCtx` and are parsed recursively; because parsing is still a
//! single linear pass over the token stream, this produces the same TAC a
//! deferred push/pop of the context stack would, without needing a pending-
//! context flag that survives across statement boundaries.

use std::rc::Rc;

use crate::error::{MsError, MsResult, SourceLoc};
use crate::function::{FunctionProto, FuncVal, Param};
use crate::lexer::{Lexer, Op, Token, TokenKind};
use crate::tac::{Instruction, Opcode};
use crate::value::{MapObj, Value, VarMode};

/// A not-yet-resolved jump instruction, tagged with the block keyword that
/// will eventually resolve it (`"break"`, `"end while"`, `"end for"`).
struct Backpatch {
    pc: usize,
    keyword: &'static str,
}

/// A recorded loop-head position, used by `continue` and by the trailing
/// back-edge at `end while` / `end for`.
#[derive(Clone, Copy)]
struct JumpPoint {
    pc: usize,
}

struct EmitCtx {
    code: Vec<Instruction>,
    backpatches: Vec<Backpatch>,
    jump_points: Vec<JumpPoint>,
    next_temp: u32,
    label: String,
    for_counter: u32,
}

impl EmitCtx {
    fn new(label: impl Into<String>) -> Self {
        Self {
            code: Vec::new(),
            backpatches: Vec::new(),
            jump_points: Vec::new(),
            next_temp: 0,
            label: label.into(),
            for_counter: 0,
        }
    }

    fn new_temp(&mut self) -> Value {
        let t = self.next_temp;
        self.next_temp += 1;
        Value::Temp(t)
    }

    fn emit(&mut self, instr: Instruction) -> usize {
        self.code.push(instr);
        self.code.len() - 1
    }

    fn here(&self) -> i32 {
        self.code.len() as i32
    }

    fn push_backpatch(&mut self, pc: usize, keyword: &'static str) {
        self.backpatches.push(Backpatch { pc, keyword });
    }

    /// Pops and resolves every backpatch matching `keyword` (or `"break"`
    /// too, when `also_break`) from the top of the stack, stopping at the
    /// first non-matching entry — by construction of single-pass nested
    /// parsing, any remaining entries belong to an enclosing, still-open
    /// block.
    fn patch(&mut self, keyword: &'static str, also_break: bool, target: i32) {
        while let Some(bp) = self.backpatches.last() {
            if bp.keyword == keyword || (also_break && bp.keyword == "break") {
                let bp = self.backpatches.pop().expect("just peeked");
                self.code[bp.pc].target = target;
            } else {
                break;
            }
        }
    }
}

pub struct Compiler {
    lexer: Lexer,
    contexts: Vec<EmitCtx>,
}

fn starts_expression(tok: &Token) -> bool {
    match &tok.kind {
        TokenKind::Number(_) | TokenKind::Str(_) | TokenKind::Identifier(_) => true,
        TokenKind::Keyword(w) => matches!(
            w.as_str(),
            "true" | "false" | "null" | "not" | "new" | "function" | "self" | "super"
        ),
        TokenKind::Op(op) => matches!(op, Op::Minus | Op::LParen | Op::LBracket | Op::LBrace | Op::At),
        _ => false,
    }
}

impl Compiler {
    pub fn new(source: &str) -> Self {
        Self { lexer: Lexer::new(source), contexts: vec![EmitCtx::new("<main>")] }
    }

    /// Compiles `source` into the program's entry-point `FunctionProto`.
    pub fn compile(source: &str) -> MsResult<FunctionProto> {
        let mut c = Compiler::new(source);
        c.parse_block(&[])?;
        if !matches!(c.lexer.peek()?.kind, TokenKind::Eof) {
            let tok = c.lexer.peek()?.clone();
            return Err(c.err(MsError::compile(format!("unexpected token near line {}", tok.line))));
        }
        let ctx = c.contexts.pop().expect("main context");
        Ok(FunctionProto::compiled(Vec::new(), ctx.code))
    }

    fn ctx(&mut self) -> &mut EmitCtx {
        self.contexts.last_mut().expect("at least one context")
    }

    fn label(&self) -> String {
        self.contexts.last().expect("ctx").label.clone()
    }

    fn err(&self, e: MsError) -> MsError {
        e.with_loc(SourceLoc::new(self.label(), self.lexer.current_line()))
    }

    fn emit(&mut self, instr: Instruction) -> usize {
        self.ctx().emit(instr)
    }

    fn line(&self) -> u32 {
        self.lexer.current_line()
    }

    // ---- token helpers ----

    fn skip_eols(&mut self) -> MsResult<()> {
        while matches!(self.lexer.peek()?.kind, TokenKind::Eol) {
            self.lexer.next()?;
        }
        Ok(())
    }

    fn peek_is_keyword(&mut self, word: &str) -> MsResult<bool> {
        Ok(self.lexer.peek()?.kind.is_keyword(word))
    }

    fn peek_is_one_of(&mut self, words: &[&str]) -> MsResult<bool> {
        let tok = self.lexer.peek()?;
        Ok(matches!(&tok.kind, TokenKind::Keyword(w) if words.contains(&w.as_str())))
    }

    fn peek_op(&mut self, op: Op) -> MsResult<bool> {
        Ok(self.lexer.peek()?.kind == TokenKind::Op(op))
    }

    fn expect_keyword(&mut self, word: &str) -> MsResult<()> {
        let tok = self.lexer.next()?;
        if tok.kind.is_keyword(word) {
            Ok(())
        } else {
            Err(self.err(MsError::compile(format!("expected '{word}', found {:?}", tok.kind))))
        }
    }

    fn expect_op(&mut self, op: Op) -> MsResult<()> {
        let tok = self.lexer.next()?;
        if tok.kind == TokenKind::Op(op) {
            Ok(())
        } else {
            Err(self.err(MsError::compile(format!("expected {op:?}, found {:?}", tok.kind))))
        }
    }

    fn expect_identifier(&mut self) -> MsResult<String> {
        let tok = self.lexer.next()?;
        match tok.kind {
            TokenKind::Identifier(name) => Ok(name),
            other => Err(self.err(MsError::compile(format!("expected identifier, found {other:?}")))),
        }
    }

    // ---- statements ----

    fn parse_block(&mut self, terminators: &[&str]) -> MsResult<()> {
        loop {
            self.skip_eols()?;
            if matches!(self.lexer.peek()?.kind, TokenKind::Eof) {
                break;
            }
            if self.peek_is_one_of(terminators)? {
                break;
            }
            self.parse_statement()?;
        }
        Ok(())
    }

    fn parse_statement(&mut self) -> MsResult<()> {
        if self.peek_is_keyword("return")? {
            self.lexer.next()?;
            let line = self.line();
            let value = if matches!(self.lexer.peek()?.kind, TokenKind::Eol | TokenKind::Eof) {
                Value::Null
            } else {
                self.parse_expr()?
            };
            self.emit(Instruction::new(Opcode::ReturnA, Value::Null, value, Value::Null, line));
            return self.end_statement();
        }
        if self.peek_is_keyword("if")? {
            return self.parse_if();
        }
        if self.peek_is_keyword("while")? {
            return self.parse_while();
        }
        if self.peek_is_keyword("for")? {
            return self.parse_for();
        }
        if self.peek_is_keyword("break")? {
            self.lexer.next()?;
            let line = self.line();
            let pc = self.emit(Instruction::new(Opcode::GotoA, Value::Null, Value::Null, Value::Null, line));
            if self.ctx().jump_points.is_empty() {
                return Err(self.err(MsError::compile("'break' outside a loop")));
            }
            self.ctx().push_backpatch(pc, "break");
            return self.end_statement();
        }
        if self.peek_is_keyword("continue")? {
            self.lexer.next()?;
            let line = self.line();
            let Some(jp) = self.ctx().jump_points.last().copied() else {
                return Err(self.err(MsError::compile("'continue' outside a loop")));
            };
            self.emit(Instruction::new(Opcode::GotoA, Value::Null, Value::Null, Value::Null, line).with_target(jp.pc as i32));
            return self.end_statement();
        }

        self.parse_assignment_or_expr_statement()
    }

    fn end_statement(&mut self) -> MsResult<()> {
        match self.lexer.peek()?.kind {
            TokenKind::Eol | TokenKind::Eof => Ok(()),
            _ => {
                if self.peek_is_one_of(&["else if", "else", "end if", "end while", "end for", "end function"])? {
                    Ok(())
                } else {
                    let tok = self.lexer.peek()?.clone();
                    Err(self.err(MsError::compile(format!("unexpected token after statement: {:?}", tok.kind))))
                }
            }
        }
    }

    fn parse_assignment_or_expr_statement(&mut self) -> MsResult<()> {
        let line = self.line();
        let target = self.parse_postfix()?;

        // Command-call syntax: a bare identifier immediately followed (with
        // a preceding space, no operator) by something that starts a value.
        // A `-` only counts as starting a command-call argument (unary minus)
        // when it is itself not followed by a space; `a - 5` (space on both
        // sides) is binary subtraction, while `a -5` is `a(-5)`.
        if let Value::Var(name, VarMode::Normal) = &target {
            let next_starts_value = {
                let tok = self.lexer.peek()?.clone();
                if !tok.preceded_by_space || !starts_expression(&tok) {
                    false
                } else if matches!(tok.kind, TokenKind::Op(Op::Minus)) {
                    !self.lexer.peek2()?.preceded_by_space
                } else {
                    true
                }
            };
            if next_starts_value {
                let callee = Value::Var(name.clone(), VarMode::Normal);
                return self.finish_command_call(callee, line);
            }
        }

        if self.peek_op(Op::Assign)? {
            self.lexer.next()?;
            let rhs = self.parse_expr()?;
            self.emit_assign(target, rhs, line);
            return self.end_statement();
        }

        if let TokenKind::Op(op) = self.lexer.peek()?.kind {
            if let Some(base) = op.compound_base() {
                self.lexer.next()?;
                let rhs = self.parse_expr()?;
                self.emit_compound_assign(target, base, rhs, line)?;
                return self.end_statement();
            }
        }

        // Bare expression statement: implicit result.
        let value = self.full_eval(target);
        self.emit(Instruction::new(Opcode::AssignImplicit, Value::Null, value, Value::Null, line));
        self.end_statement()
    }

    fn finish_command_call(&mut self, callee: Value, line: u32) -> MsResult<()> {
        let mut argc: u16 = 0;
        loop {
            let arg = self.parse_expr_full()?;
            self.emit(Instruction::new(Opcode::PushParam, Value::Null, arg, Value::Null, line));
            argc += 1;
            if self.peek_op(Op::Comma)? {
                self.lexer.next()?;
                continue;
            }
            break;
        }
        let dest = self.ctx().new_temp();
        self.emit(
            Instruction::new(Opcode::CallFunctionA, dest.clone(), callee, Value::Null, line).with_argc(argc),
        );
        self.emit(Instruction::new(Opcode::AssignImplicit, Value::Null, dest, Value::Null, line));
        self.end_statement()
    }

    fn emit_assign(&mut self, target: Value, rhs: Value, line: u32) {
        let op = if is_literal_container(&rhs) { Opcode::AssignA } else { Opcode::AssignA };
        // Peephole: if the RHS is exactly the temp the last instruction just
        // produced, retarget that instruction's destination instead of
        // emitting a separate AssignA.
        if let Value::Temp(t) = &rhs {
            if let Some(last) = self.ctx().code.last_mut() {
                if matches!(&last.lhs, Value::Temp(lt) if lt == t) {
                    last.lhs = target;
                    return;
                }
            }
        }
        self.emit(Instruction::new(op, target, rhs, Value::Null, line));
    }

    fn emit_compound_assign(&mut self, target: Value, op: Op, rhs_expr_op: Value, line: u32) -> MsResult<()> {
        let strict_target = match &target {
            Value::Var(name, _) => Value::Var(name.clone(), VarMode::StrictLocalOnly),
            other => other.clone(),
        };
        let arith_op = arith_opcode(op);
        let dest = self.ctx().new_temp();
        self.emit(Instruction::new(arith_op, dest.clone(), strict_target, rhs_expr_op, line));
        self.emit_assign(target, dest, line);
        Ok(())
    }

    fn parse_if(&mut self) -> MsResult<()> {
        self.expect_keyword("if")?;
        loop {
            let cond = self.parse_expr()?;
            self.expect_keyword("then")?;
            let line = self.line();
            let false_pc = self.emit(Instruction::new(Opcode::GotoAifNotB, Value::Null, cond, Value::Null, line));

            self.parse_block(&["else if", "else", "end if"])?;

            if self.peek_is_keyword("else if")? {
                self.lexer.next()?;
                let jpc = self.emit(Instruction::new(Opcode::GotoA, Value::Null, Value::Null, Value::Null, line));
                self.ctx().push_backpatch(jpc, "end if");
                self.ctx().code[false_pc].target = self.ctx().here();
                continue;
            }
            if self.peek_is_keyword("else")? {
                self.lexer.next()?;
                let jpc = self.emit(Instruction::new(Opcode::GotoA, Value::Null, Value::Null, Value::Null, line));
                self.ctx().push_backpatch(jpc, "end if");
                self.ctx().code[false_pc].target = self.ctx().here();
                self.parse_block(&["end if"])?;
                self.expect_keyword("end if")?;
                let end = self.ctx().here();
                self.ctx().patch("end if", false, end);
                return self.end_statement();
            }
            // plain "end if"
            self.expect_keyword("end if")?;
            let end = self.ctx().here();
            self.ctx().code[false_pc].target = end;
            self.ctx().patch("end if", false, end);
            return self.end_statement();
        }
    }

    fn parse_while(&mut self) -> MsResult<()> {
        self.expect_keyword("while")?;
        let line = self.line();
        let head = self.ctx().here();
        self.ctx().jump_points.push(JumpPoint { pc: head as usize });
        let cond = self.parse_expr()?;
        let false_pc = self.emit(Instruction::new(Opcode::GotoAifNotB, Value::Null, cond, Value::Null, line));
        self.ctx().push_backpatch(false_pc, "end while");
        self.parse_block(&["end while"])?;
        self.expect_keyword("end while")?;
        self.emit(
            Instruction::new(Opcode::GotoA, Value::Null, Value::Null, Value::Null, self.line()).with_target(head),
        );
        let end = self.ctx().here();
        self.ctx().patch("end while", true, end);
        self.ctx().jump_points.pop();
        self.end_statement()
    }

    fn parse_for(&mut self) -> MsResult<()> {
        self.expect_keyword("for")?;
        let var_name = self.expect_identifier()?;
        self.expect_keyword("in")?;
        let seq = self.parse_expr()?;
        let line = self.line();

        let n = self.ctx().for_counter;
        self.ctx().for_counter += 1;
        let idx_name: Rc<str> = Rc::from(format!("__for_idx_{n}"));
        let seq_name: Rc<str> = Rc::from(format!("__for_seq_{n}"));

        self.emit(Instruction::new(
            Opcode::AssignA,
            Value::Var(seq_name.clone(), VarMode::Normal),
            seq,
            Value::Null,
            line,
        ));
        self.emit(Instruction::new(
            Opcode::AssignA,
            Value::Var(idx_name.clone(), VarMode::Normal),
            Value::Number(-1.0),
            Value::Null,
            line,
        ));

        let head = self.ctx().here();
        self.ctx().jump_points.push(JumpPoint { pc: head as usize });

        let idx_var = Value::Var(idx_name.clone(), VarMode::Normal);
        let bumped = self.ctx().new_temp();
        self.emit(Instruction::new(
            Opcode::APlusB,
            bumped.clone(),
            idx_var.clone(),
            Value::Number(1.0),
            line,
        ));
        self.emit_assign(idx_var.clone(), bumped, line);

        let seq_var = Value::Var(seq_name.clone(), VarMode::Normal);
        let len_t = self.ctx().new_temp();
        self.emit(Instruction::new(Opcode::LengthOfA, len_t.clone(), seq_var.clone(), Value::Null, line));
        let cmp_t = self.ctx().new_temp();
        self.emit(Instruction::new(Opcode::ALessThanB, cmp_t.clone(), idx_var.clone(), len_t, line));
        let false_pc = self.emit(Instruction::new(Opcode::GotoAifNotB, Value::Null, cmp_t, Value::Null, line));
        self.ctx().push_backpatch(false_pc, "end for");

        self.emit(Instruction::new(
            Opcode::ElemBofIterA,
            Value::Var(Rc::from(var_name.as_str()), VarMode::Normal),
            seq_var,
            idx_var,
            line,
        ));

        self.parse_block(&["end for"])?;
        self.expect_keyword("end for")?;
        self.emit(
            Instruction::new(Opcode::GotoA, Value::Null, Value::Null, Value::Null, self.line()).with_target(head),
        );
        let end = self.ctx().here();
        self.ctx().patch("end for", true, end);
        self.ctx().jump_points.pop();
        self.end_statement()
    }

    // ---- expressions ----

    pub fn parse_expr(&mut self) -> MsResult<Value> {
        self.parse_or()
    }

    /// Like `parse_expr` but guarantees the result is fully evaluated (a
    /// bare function reference would already be invoked).
    fn parse_expr_full(&mut self) -> MsResult<Value> {
        let v = self.parse_expr()?;
        Ok(self.full_eval(v))
    }

    fn parse_or(&mut self) -> MsResult<Value> {
        let mut acc = self.parse_and()?;
        while self.peek_is_keyword("or")? {
            self.lexer.next()?;
            let line = self.line();
            acc = self.full_eval(acc);
            let end_pc = self.emit(Instruction::new(Opcode::GotoAifTrulyB, Value::Null, acc.clone(), Value::Null, line));
            let rhs = self.parse_and()?;
            let rhs = self.full_eval(rhs);
            let combined = self.ctx().new_temp();
            self.emit(Instruction::new(Opcode::AOrB, combined.clone(), acc, rhs, line));
            let end = self.ctx().here();
            self.ctx().code[end_pc].target = end;
            acc = combined;
        }
        Ok(acc)
    }

    fn parse_and(&mut self) -> MsResult<Value> {
        let mut acc = self.parse_not()?;
        while self.peek_is_keyword("and")? {
            self.lexer.next()?;
            let line = self.line();
            acc = self.full_eval(acc);
            let end_pc = self.emit(Instruction::new(Opcode::GotoAifNotB, Value::Null, acc.clone(), Value::Null, line));
            let rhs = self.parse_not()?;
            let rhs = self.full_eval(rhs);
            let combined = self.ctx().new_temp();
            self.emit(Instruction::new(Opcode::AAndB, combined.clone(), acc, rhs, line));
            let end = self.ctx().here();
            self.ctx().code[end_pc].target = end;
            acc = combined;
        }
        Ok(acc)
    }

    fn parse_not(&mut self) -> MsResult<Value> {
        if self.peek_is_keyword("not")? {
            self.lexer.next()?;
            let line = self.line();
            let operand = self.parse_not()?;
            let operand = self.full_eval(operand);
            let dest = self.ctx().new_temp();
            self.emit(Instruction::new(Opcode::NotA, dest.clone(), operand, Value::Null, line));
            return Ok(dest);
        }
        self.parse_isa()
    }

    fn parse_isa(&mut self) -> MsResult<Value> {
        let mut left = self.parse_comparison()?;
        while self.peek_is_keyword("isa")? {
            self.lexer.next()?;
            let line = self.line();
            left = self.full_eval(left);
            let rhs = self.parse_comparison()?;
            let rhs = self.full_eval(rhs);
            let dest = self.ctx().new_temp();
            self.emit(Instruction::new(Opcode::AisaB, dest.clone(), left, rhs, line));
            left = dest;
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> MsResult<Value> {
        let mut left = self.parse_additive()?;
        let mut acc: Option<Value> = None;
        loop {
            let cmp_op = match self.lexer.peek()?.kind {
                TokenKind::Op(op @ (Op::Eq | Op::NotEq | Op::Lt | Op::LtEq | Op::Gt | Op::GtEq)) => op,
                _ => break,
            };
            self.lexer.next()?;
            let line = self.line();
            let left_eval = self.full_eval(left);
            let right = self.parse_additive()?;
            let right_eval = self.full_eval(right);
            let dest = self.ctx().new_temp();
            let opcode = match cmp_op {
                Op::Eq => Opcode::AEqualB,
                Op::NotEq => Opcode::ANotEqualB,
                Op::Lt => Opcode::ALessThanB,
                Op::LtEq => Opcode::ALessOrEqualB,
                Op::Gt => Opcode::AGreaterThanB,
                Op::GtEq => Opcode::AGreatOrEqualB,
                _ => unreachable!(),
            };
            self.emit(Instruction::new(opcode, dest.clone(), left_eval, right_eval.clone(), line));
            acc = Some(match acc {
                None => dest,
                Some(prev) => {
                    let combined = self.ctx().new_temp();
                    self.emit(Instruction::new(Opcode::AAndB, combined.clone(), prev, dest, line));
                    combined
                }
            });
            left = right_eval;
        }
        Ok(acc.unwrap_or(left))
    }

    fn parse_additive(&mut self) -> MsResult<Value> {
        let mut acc = self.parse_multiplicative()?;
        loop {
            let op = match self.lexer.peek()?.kind {
                TokenKind::Op(op @ (Op::Plus | Op::Minus)) => op,
                _ => break,
            };
            self.lexer.next()?;
            let line = self.line();
            let left = self.full_eval(acc);
            let right = self.parse_multiplicative()?;
            let right = self.full_eval(right);
            let dest = self.ctx().new_temp();
            let opcode = if op == Op::Plus { Opcode::APlusB } else { Opcode::AMinusB };
            self.emit(Instruction::new(opcode, dest.clone(), left, right, line));
            acc = dest;
        }
        Ok(acc)
    }

    fn parse_multiplicative(&mut self) -> MsResult<Value> {
        let mut acc = self.parse_unary_minus()?;
        loop {
            let op = match self.lexer.peek()?.kind {
                TokenKind::Op(op @ (Op::Star | Op::Slash | Op::Percent)) => op,
                _ => break,
            };
            self.lexer.next()?;
            let line = self.line();
            let left = self.full_eval(acc);
            let right = self.parse_unary_minus()?;
            let right = self.full_eval(right);
            let dest = self.ctx().new_temp();
            let opcode = match op {
                Op::Star => Opcode::ATimesB,
                Op::Slash => Opcode::ADividedByB,
                Op::Percent => Opcode::AModB,
                _ => unreachable!(),
            };
            self.emit(Instruction::new(opcode, dest.clone(), left, right, line));
            acc = dest;
        }
        Ok(acc)
    }

    fn parse_unary_minus(&mut self) -> MsResult<Value> {
        if self.peek_op(Op::Minus)? {
            self.lexer.next()?;
            let line = self.line();
            let operand = self.parse_unary_minus()?;
            // Literal-fold into the numeric constant when possible.
            if let Value::Number(n) = operand {
                return Ok(Value::Number(-n));
            }
            let operand = self.full_eval(operand);
            let dest = self.ctx().new_temp();
            self.emit(Instruction::new(Opcode::AMinusB, dest.clone(), Value::Number(0.0), operand, line));
            return Ok(dest);
        }
        self.parse_new()
    }

    fn parse_new(&mut self) -> MsResult<Value> {
        if self.peek_is_keyword("new")? {
            self.lexer.next()?;
            let line = self.line();
            let operand = self.parse_pow()?;
            let operand = self.full_eval(operand);
            let dest = self.ctx().new_temp();
            self.emit(Instruction::new(Opcode::NewA, dest.clone(), operand, Value::Null, line));
            return Ok(dest);
        }
        self.parse_pow()
    }

    fn parse_pow(&mut self) -> MsResult<Value> {
        let base = self.parse_addressof()?;
        if self.peek_op(Op::Caret)? {
            self.lexer.next()?;
            let line = self.line();
            let base = self.full_eval(base);
            let exp = self.parse_pow()?; // right-associative
            let exp = self.full_eval(exp);
            let dest = self.ctx().new_temp();
            self.emit(Instruction::new(Opcode::APowB, dest.clone(), base, exp, line));
            return Ok(dest);
        }
        Ok(base)
    }

    fn parse_addressof(&mut self) -> MsResult<Value> {
        if self.peek_op(Op::At)? {
            self.lexer.next()?;
            let mut operand = self.parse_postfix()?;
            set_no_invoke(&mut operand);
            return Ok(operand);
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> MsResult<Value> {
        let mut acc = self.parse_primary()?;
        loop {
            if self.peek_op(Op::Dot)? {
                self.lexer.next()?;
                let name = self.expect_identifier()?;
                acc = Value::SeqElem(Box::new(acc), Box::new(Value::str(name)), false);
                continue;
            }
            if self.peek_op(Op::LBracket)? {
                self.lexer.next()?;
                if self.peek_op(Op::Colon)? {
                    // [:to]
                    self.lexer.next()?;
                    let to = if self.peek_op(Op::RBracket)? { Value::Null } else { self.parse_expr_full()? };
                    self.expect_op(Op::RBracket)?;
                    acc = self.emit_slice_call(acc, Value::Number(0.0), to);
                    continue;
                }
                let from = self.parse_expr_full()?;
                if self.peek_op(Op::Colon)? {
                    self.lexer.next()?;
                    let to = if self.peek_op(Op::RBracket)? { Value::Null } else { self.parse_expr_full()? };
                    self.expect_op(Op::RBracket)?;
                    acc = self.emit_slice_call(acc, from, to);
                    continue;
                }
                self.expect_op(Op::RBracket)?;
                acc = Value::SeqElem(Box::new(acc), Box::new(from), false);
                continue;
            }
            if self.peek_op(Op::LParen)? {
                self.lexer.next()?;
                let line = self.line();
                let mut argc: u16 = 0;
                if !self.peek_op(Op::RParen)? {
                    loop {
                        let arg = self.parse_expr_full()?;
                        self.emit(Instruction::new(Opcode::PushParam, Value::Null, arg, Value::Null, line));
                        argc += 1;
                        if self.peek_op(Op::Comma)? {
                            self.lexer.next()?;
                            continue;
                        }
                        break;
                    }
                }
                self.expect_op(Op::RParen)?;
                let dest = self.ctx().new_temp();
                self.emit(
                    Instruction::new(Opcode::CallFunctionA, dest.clone(), acc, Value::Null, line).with_argc(argc),
                );
                acc = dest;
                continue;
            }
            break;
        }
        Ok(acc)
    }

    fn emit_slice_call(&mut self, seq: Value, from: Value, to: Value) -> Value {
        let line = self.line();
        let seq = self.full_eval(seq);
        self.emit(Instruction::new(Opcode::PushParam, Value::Null, seq, Value::Null, line));
        self.emit(Instruction::new(Opcode::PushParam, Value::Null, from, Value::Null, line));
        self.emit(Instruction::new(Opcode::PushParam, Value::Null, to, Value::Null, line));
        let dest = self.ctx().new_temp();
        self.emit(
            Instruction::new(
                Opcode::CallFunctionA,
                dest.clone(),
                Value::Var(Rc::from("slice"), VarMode::Normal),
                Value::Null,
                line,
            )
            .with_argc(3),
        );
        dest
    }

    fn parse_primary(&mut self) -> MsResult<Value> {
        let tok = self.lexer.peek()?.clone();
        match tok.kind {
            TokenKind::Number(n) => {
                self.lexer.next()?;
                Ok(Value::Number(n))
            }
            TokenKind::Str(s) => {
                self.lexer.next()?;
                Ok(Value::str(s))
            }
            TokenKind::Identifier(name) => {
                self.lexer.next()?;
                Ok(Value::Var(Rc::from(name.as_str()), VarMode::Normal))
            }
            TokenKind::Keyword(ref w) if w == "true" => {
                self.lexer.next()?;
                Ok(Value::Number(1.0))
            }
            TokenKind::Keyword(ref w) if w == "false" => {
                self.lexer.next()?;
                Ok(Value::Number(0.0))
            }
            TokenKind::Keyword(ref w) if w == "null" => {
                self.lexer.next()?;
                Ok(Value::Null)
            }
            TokenKind::Keyword(ref w) if w == "self" => {
                self.lexer.next()?;
                Ok(Value::Var(Rc::from("self"), VarMode::Normal))
            }
            TokenKind::Keyword(ref w) if w == "super" => {
                self.lexer.next()?;
                Ok(Value::Var(Rc::from("super"), VarMode::Normal))
            }
            TokenKind::Keyword(ref w) if w == "function" => self.parse_function_literal(),
            TokenKind::Op(Op::LBrace) => self.parse_map_literal(),
            TokenKind::Op(Op::LBracket) => self.parse_list_literal(),
            TokenKind::Op(Op::LParen) => {
                self.lexer.next()?;
                let inner = self.parse_expr()?;
                self.expect_op(Op::RParen)?;
                Ok(inner)
            }
            other => Err(self.err(MsError::compile(format!("unexpected token {other:?} (line {})", tok.line)))),
        }
    }

    fn parse_list_literal(&mut self) -> MsResult<Value> {
        self.expect_op(Op::LBracket)?;
        let mut items = Vec::new();
        self.skip_eols()?;
        if !self.peek_op(Op::RBracket)? {
            loop {
                self.skip_eols()?;
                items.push(self.parse_expr_full()?);
                self.skip_eols()?;
                if self.peek_op(Op::Comma)? {
                    self.lexer.next()?;
                    continue;
                }
                break;
            }
        }
        self.skip_eols()?;
        self.expect_op(Op::RBracket)?;
        let line = self.line();
        let template = Value::new_list(items);
        let dest = self.ctx().new_temp();
        self.emit(Instruction::new(Opcode::CopyA, dest.clone(), template, Value::Null, line));
        Ok(dest)
    }

    fn parse_map_literal(&mut self) -> MsResult<Value> {
        self.expect_op(Op::LBrace)?;
        let mut pairs = Vec::new();
        self.skip_eols()?;
        if !self.peek_op(Op::RBrace)? {
            loop {
                self.skip_eols()?;
                let key = self.parse_expr_full()?;
                self.expect_op(Op::Colon)?;
                let value = self.parse_expr_full()?;
                pairs.push((key, value));
                self.skip_eols()?;
                if self.peek_op(Op::Comma)? {
                    self.lexer.next()?;
                    continue;
                }
                break;
            }
        }
        self.skip_eols()?;
        self.expect_op(Op::RBrace)?;
        let line = self.line();
        let mut map = MapObj::new();
        // These are already fully-evaluated operands; no ordering hazard in
        // grouping them into the template map here.
        for (k, v) in pairs {
            map.insert(k, v);
        }
        let dest = self.ctx().new_temp();
        self.emit(Instruction::new(Opcode::CopyA, dest.clone(), Value::new_map(map), Value::Null, line));
        Ok(dest)
    }

    fn parse_function_literal(&mut self) -> MsResult<Value> {
        self.expect_keyword("function")?;
        let mut params = Vec::new();
        if self.peek_op(Op::LParen)? {
            self.lexer.next()?;
            if !self.peek_op(Op::RParen)? {
                loop {
                    let name = self.expect_identifier()?;
                    let default = if self.peek_op(Op::Assign)? {
                        self.lexer.next()?;
                        Some(self.parse_default_literal()?)
                    } else {
                        None
                    };
                    params.push(Param { name: Rc::from(name.as_str()), default });
                    if self.peek_op(Op::Comma)? {
                        self.lexer.next()?;
                        continue;
                    }
                    break;
                }
            }
            self.expect_op(Op::RParen)?;
        }
        self.skip_eols()?;
        self.contexts.push(EmitCtx::new("function"));
        self.parse_block(&["end function"])?;
        self.expect_keyword("end function")?;
        let inner = self.contexts.pop().expect("pushed above");
        let proto = Rc::new(FunctionProto::compiled(params, inner.code));
        let line = self.line();
        let dest = self.ctx().new_temp();
        self.emit(Instruction::new(
            Opcode::BindAssignA,
            dest.clone(),
            Value::Function(Rc::new(FuncVal::new(proto, None))),
            Value::Null,
            line,
        ));
        Ok(dest)
    }

    fn parse_default_literal(&mut self) -> MsResult<Value> {
        if self.peek_op(Op::Minus)? {
            self.lexer.next()?;
            let tok = self.lexer.next()?;
            if let TokenKind::Number(n) = tok.kind {
                return Ok(Value::Number(-n));
            }
            return Err(self.err(MsError::compile("expected numeric literal after '-' in default value")));
        }
        let tok = self.lexer.next()?;
        match tok.kind {
            TokenKind::Number(n) => Ok(Value::Number(n)),
            TokenKind::Str(s) => Ok(Value::str(s)),
            TokenKind::Keyword(w) if w == "true" => Ok(Value::Number(1.0)),
            TokenKind::Keyword(w) if w == "false" => Ok(Value::Number(0.0)),
            TokenKind::Keyword(w) if w == "null" => Ok(Value::Null),
            other => Err(self.err(MsError::compile(format!("unsupported default-value literal {other:?}")))),
        }
    }

    /// "Full evaluation": wraps a bare `Var`/`SeqElem` (not under `@`) with
    /// a zero-argument `CallFunctionA`, except for `self`/`super`, which are
    /// never auto-invoked.
    fn full_eval(&mut self, value: Value) -> Value {
        match &value {
            Value::Var(name, VarMode::Normal) if &**name != "self" && &**name != "super" => {
                let line = self.line();
                let dest = self.ctx().new_temp();
                self.emit(Instruction::new(Opcode::CallFunctionA, dest.clone(), value, Value::Null, line).with_argc(0));
                dest
            }
            Value::SeqElem(_, _, false) => {
                let line = self.line();
                let dest = self.ctx().new_temp();
                self.emit(Instruction::new(Opcode::CallFunctionA, dest.clone(), value, Value::Null, line).with_argc(0));
                dest
            }
            _ => value,
        }
    }
}

fn set_no_invoke(value: &mut Value) {
    match value {
        Value::SeqElem(_, _, no_invoke) => *no_invoke = true,
        Value::Var(_, mode) => *mode = VarMode::NoInvoke,
        _ => {}
    }
}

fn is_literal_container(v: &Value) -> bool {
    matches!(v, Value::List(_) | Value::Map(_))
}

fn arith_opcode(op: Op) -> Opcode {
    match op {
        Op::Plus => Opcode::APlusB,
        Op::Minus => Opcode::AMinusB,
        Op::Star => Opcode::ATimesB,
        Op::Slash => Opcode::ADividedByB,
        Op::Percent => Opcode::AModB,
        Op::Caret => Opcode::APowB,
        _ => unreachable!("not a compound-assign base op"),
    }
}
