//! Fault-scenario coverage driven through the `Interpreter` façade: each
//! test matches a row of the error-kind / message-substring table a host
//! would rely on to distinguish script bugs from host bugs.

use ms::{ErrorKind, Interpreter, MsError};

fn run(source: &str) -> Result<(), MsError> {
    let mut interp = Interpreter::new(source);
    interp.compile(Box::new(|_| {}))?;
    interp.run_until_done(5.0, false)?;
    Ok(())
}

fn run_err(source: &str) -> MsError {
    run(source).expect_err("expected this script to fail")
}

#[test]
fn list_index_out_of_range() {
    let e = run_err("x = [1,2,3]\nprint x[10]");
    assert_eq!(e.kind, ErrorKind::IndexError);
    assert!(e.message.contains("out of range"), "message was: {}", e.message);
}

#[test]
fn map_key_not_found() {
    let e = run_err("m = {}\nprint m[\"absent\"]");
    assert_eq!(e.kind, ErrorKind::KeyNotFound);
    assert!(e.message.contains("absent"), "message was: {}", e.message);
}

#[test]
fn string_plus_number_coerces_instead_of_erroring() {
    assert!(run("x = \"a\" + 1").is_ok());
}

#[test]
fn new_on_non_map_is_a_type_error() {
    let e = run_err("new 42");
    assert_eq!(e.kind, ErrorKind::TypeError);
    assert!(e.message.contains("new"), "message was: {}", e.message);
}

#[test]
fn new_on_builtin_prototype_is_rejected() {
    let e = run_err("new list");
    assert_eq!(e.kind, ErrorKind::TypeError);
}

#[test]
fn calling_non_function_with_arguments_errors() {
    let e = run_err("x = 5\ny = x(1, 2)");
    assert_eq!(e.kind, ErrorKind::TooManyArguments);
}

#[test]
fn undefined_identifier() {
    let e = run_err("print thisNameDoesNotExist");
    assert_eq!(e.kind, ErrorKind::UndefinedIdentifier);
}

#[test]
fn break_outside_loop_is_a_compile_error() {
    let e = run_err("break");
    assert_eq!(e.kind, ErrorKind::CompileError);
}

#[test]
fn continue_outside_loop_is_a_compile_error() {
    let e = run_err("continue");
    assert_eq!(e.kind, ErrorKind::CompileError);
}

#[test]
fn assigning_to_globals_is_rejected() {
    let e = run_err("globals = 5");
    assert_eq!(e.kind, ErrorKind::CompileError);
}

#[test]
fn unterminated_string_is_a_lex_error() {
    let mut interp = Interpreter::new("x = \"abc");
    let e = interp.compile(Box::new(|_| {})).unwrap_err();
    assert_eq!(e.kind, ErrorKind::LexError);
}

#[test]
fn dangling_end_is_a_lex_error() {
    let mut interp = Interpreter::new("end");
    let e = interp.compile(Box::new(|_| {})).unwrap_err();
    assert_eq!(e.kind, ErrorKind::LexError);
}

#[test]
fn isa_depth_limit_is_enforced() {
    let mut src = String::from("base = {}\n");
    for i in 0..300 {
        src.push_str(&format!("m{i} = new {}\n", if i == 0 { "base".to_string() } else { format!("m{}", i - 1) }));
    }
    src.push_str(&format!("print m299 isa base"));
    let e = run_err(&src);
    assert_eq!(e.kind, ErrorKind::LimitExceeded);
}

#[test]
fn need_more_input_on_open_if_block() {
    let mut interp = Interpreter::new("");
    let _ = interp.repl("if x then", 1.0);
    assert!(interp.need_more_input());
}

#[test]
fn need_more_input_on_trailing_operator() {
    let mut interp = Interpreter::new("");
    let _ = interp.repl("x = 1 +", 1.0);
    assert!(interp.need_more_input());
}

#[test]
fn error_reports_source_line() {
    let e = run_err("x = 1\nx = 2\nprint undefinedThing\n");
    assert!(e.to_string().contains("line 3"), "message was: {e}");
}
