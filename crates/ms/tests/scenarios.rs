//! End-to-end scenarios driven entirely through the `Interpreter` façade,
//! one script per behavior. These exercise the full pipeline: lexer,
//! compiler, and VM together.

use std::cell::RefCell;
use std::rc::Rc;

use ms::{Interpreter, MsError};

fn run(source: &str) -> Result<Vec<String>, MsError> {
    let output = Rc::new(RefCell::new(Vec::new()));
    let sink = output.clone();
    let mut interp = Interpreter::new(source);
    interp.compile(Box::new(move |line| sink.borrow_mut().push(line.to_string())))?;
    interp.run_until_done(5.0, false)?;
    let lines = output.borrow().clone();
    drop(interp);
    Ok(lines)
}

fn run_ok(source: &str) -> Vec<String> {
    run(source).unwrap_or_else(|e| panic!("unexpected error: {e}\nsource:\n{source}"))
}

// =============================================================================
// Arithmetic and strings
// =============================================================================

#[test]
fn arithmetic_precedence() {
    let out = run_ok("print 2 + 3 * 4\nprint (2 + 3) * 4\nprint 2 ^ 3 ^ 2");
    assert_eq!(out, vec!["14", "20", "512"]);
}

#[test]
fn string_concatenation_and_coercion() {
    let out = run_ok("print \"n=\" + 5\nprint 5 + \"=n\"");
    assert_eq!(out, vec!["n=5", "5=n"]);
}

#[test]
fn modulo_and_negative_unary() {
    let out = run_ok("print 7 % 3\nprint -5 + 2");
    assert_eq!(out, vec!["1", "-3"]);
}

// =============================================================================
// Control flow
// =============================================================================

#[test]
fn if_elseif_else_chain() {
    let src = r#"
x = 2
if x == 1 then
    print "one"
else if x == 2 then
    print "two"
else
    print "other"
end if
"#;
    assert_eq!(run_ok(src), vec!["two"]);
}

#[test]
fn while_loop_with_break_and_continue() {
    let src = r#"
i = 0
total = 0
while i < 10
    i = i + 1
    if i == 3 then continue
    if i == 7 then break
    total = total + i
end while
print total
"#;
    // 1+2+4+5+6 = 18 (3 skipped by continue, loop stops before adding 7)
    assert_eq!(run_ok(src), vec!["18"]);
}

#[test]
fn for_loop_over_range_and_list() {
    let src = r#"
sum = 0
for n in range(1, 5)
    sum = sum + n
end for
print sum
names = ["a", "b", "c"]
for name in names
    print name
end for
"#;
    assert_eq!(run_ok(src), vec!["15", "a", "b", "c"]);
}

// =============================================================================
// Functions and closures
// =============================================================================

#[test]
fn function_with_default_param() {
    let src = r#"
greet = function(name, greeting = "hello")
    return greeting + ", " + name
end function
print greet("Ada")
print greet("Lin", "hi")
"#;
    assert_eq!(run_ok(src), vec!["hello, Ada", "hi, Lin"]);
}

#[test]
fn closures_mutate_outer_scope_via_outer() {
    // MiniScript-style closures: a plain `n = n + 1` inside the inner
    // function would create a *new* local, not update the enclosing one.
    // Reaching the enclosing frame requires the reserved `outer` map.
    let src = r#"
counter = function()
    n = 0
    return function()
        outer.n = outer.n + 1
        return outer.n
    end function
end function
f = counter()
print f()
print f()
print f()
"#;
    assert_eq!(run_ok(src), vec!["1", "2", "3"]);
}

#[test]
fn command_call_syntax() {
    assert_eq!(run_ok("print \"hi there\""), vec!["hi there"]);
}

#[test]
fn minus_with_space_on_both_sides_is_subtraction_not_a_command_call() {
    // Before the fix, a bare `a - count` statement (space on both sides of
    // the minus) was mis-parsed as the command call `a(-count)`, which
    // throws at runtime because `a` holds a number, not a function.
    let src = r#"
a = 10
count = 4
a - count
print "reached the end"
"#;
    assert_eq!(run_ok(src), vec!["reached the end"]);

    let src_via_print = r#"
a = 10
count = 4
print a - count
"#;
    assert_eq!(run_ok(src_via_print), vec!["6"]);
}

#[test]
fn minus_immediately_before_operand_starts_a_command_call() {
    let src = r#"
collected = []
add = function(x)
    collected.push(x)
end function
add -5
print collected[0]
"#;
    assert_eq!(run_ok(src), vec!["-5"]);
}

// =============================================================================
// Lists and maps
// =============================================================================

#[test]
fn list_builtin_methods() {
    let src = r#"
l = [3, 1, 2]
l.push(4)
l.sort
print l
print l.indexOf(1)
print l.len
"#;
    assert_eq!(run_ok(src), vec!["[1, 2, 3, 4]", "0", "4"]);
}

#[test]
fn map_prototype_inheritance_with_isa() {
    let src = r#"
Animal = {}
Animal.speak = function()
    return "..."
end function
Dog = new Animal
Dog.speak = function()
    return "Woof"
end function
rex = new Dog
print rex.speak
print rex isa Dog
print rex isa Animal
"#;
    assert_eq!(run_ok(src), vec!["Woof", "1", "1"]);
}

#[test]
fn map_literal_and_hasindex() {
    let src = r#"
m = {"a": 1, "b": 2}
print m.hasIndex("a")
print m.hasIndex("z")
print m.len
"#;
    assert_eq!(run_ok(src), vec!["1", "0", "2"]);
}

// =============================================================================
// Logical and comparison operators
// =============================================================================

#[test]
fn and_or_short_circuit_results() {
    let src = r#"
print true and false
print true or false
print 1 < 2 and 2 < 3
"#;
    assert_eq!(run_ok(src), vec!["0", "1", "1"]);
}

#[test]
fn chained_comparison() {
    assert_eq!(run_ok("print 1 < 2 < 3\nprint 3 < 2 < 1"), vec!["1", "0"]);
}

// =============================================================================
// `@` address-of and `wait`
// =============================================================================

#[test]
fn addressof_suppresses_auto_invoke() {
    let src = r#"
triple = function(x)
    return x * 3
end function
ref = @triple
print ref(4)
"#;
    assert_eq!(run_ok(src), vec!["12"]);
}

#[test]
fn wait_resumes_within_time_budget() {
    let src = r#"
wait(0)
print "done"
"#;
    assert_eq!(run_ok(src), vec!["done"]);
}

// =============================================================================
// `intrinsics` reflection table
// =============================================================================

#[test]
fn intrinsics_table_exposes_builtin_functions_by_name() {
    let src = r#"
absFn = @intrinsics["abs"]
print absFn(-5)
print intrinsics.hasIndex("sqrt")
"#;
    assert_eq!(run_ok(src), vec!["5", "1"]);
}

#[test]
fn intrinsics_table_is_read_only() {
    let src = r#"
intrinsics["abs"] = "broken"
absFn = @intrinsics["abs"]
print absFn(-9)
"#;
    assert_eq!(run_ok(src), vec!["9"]);
}
