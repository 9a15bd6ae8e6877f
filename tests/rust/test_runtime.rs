//! Runtime tests — evaluation, operators, arrays, scopes, calls, errors

use phype::ast::{Node, Operation};
use phype::driver::{interpret, interpret_partial, run_source};
use phype::runtime::{Flow, Interpreter, RuntimeError, Value, ValueKind, GLOBAL_SCOPE};
use phype::Error;
use pretty_assertions::assert_eq;

fn run(script: &str) -> String {
    interpret(&format!("<? {}", script)).unwrap()
}

fn run_err(script: &str) -> RuntimeError {
    match interpret(&format!("<? {}", script)).unwrap_err() {
        Error::Runtime(e) => e,
        other => panic!("expected runtime error, got {}", other),
    }
}

// ── Scenarios ───────────────────────────────────────────────

#[test]
fn while_loop_counts() {
    assert_eq!(run("$i = 0; while ($i < 3) { echo $i; $i = $i+1; }"), "012");
}

#[test]
fn nested_arrays_copy_on_assign() {
    assert_eq!(
        run("$a[0]['d'] = 'x'; $b = $a; $b[0]['d'] = 'y'; echo $a[0]['d']; echo $b[0]['d'];"),
        "xy"
    );
}

#[test]
fn function_redeclared_before_output() {
    let (output, err) = interpret_partial("<? echo 'a'; function f() {} function f() {}");
    assert_eq!(output, "");
    assert_eq!(
        err.unwrap().runtime(),
        Some(&RuntimeError::FunctionRedeclared { name: "f".into() })
    );
}

#[test]
fn undeclared_function() {
    assert_eq!(run_err("nope();"), RuntimeError::FunctionNotFound { name: "nope".into() });
}

#[test]
fn self_reference_reads_prior_value() {
    assert_eq!(run("$a = 1; $a = $a + 1; echo $a;"), "2");
}

// ── Output ──────────────────────────────────────────────────

#[test]
fn inline_text_is_echoed() {
    assert_eq!(interpret("Hello <? echo 'World'; ?>!").unwrap(), "Hello World!");
}

#[test]
fn inline_text_inside_block() {
    assert_eq!(interpret("<? if (1) { ?>yes<? } else { ?>no<? } ?>").unwrap(), "yes");
}

#[test]
fn echo_kinds() {
    assert_eq!(run("echo 1, 'a', 2.5;"), "1a2.5");
    assert_eq!(run("$a[0] = 1; echo $a;"), "Array");
}

#[test]
fn float_literal_without_fraction_prints_as_integer() {
    assert_eq!(run("echo 2.0;"), "2");
}

// ── Operators ───────────────────────────────────────────────

#[test]
fn addition_keeps_integers() {
    assert_eq!(run("echo 1 + 2;"), "3");
    assert_eq!(run("echo '3' + 4;"), "7");
    assert_eq!(run("echo 1 + 1.5;"), "2.5");
}

#[test]
fn other_arithmetic() {
    assert_eq!(run("echo 10 - 15;"), "-5");
    assert_eq!(run("echo 7 / 2;"), "3.5");
    assert_eq!(run("echo 6 / 3;"), "2");
    assert_eq!(run("echo -3 * 2;"), "-6");
    assert_eq!(run("echo 2 + 3 * 4;"), "14");
}

#[test]
fn division_by_zero() {
    assert_eq!(run("echo 1 / 0, ' ', -1 / 0, ' ', 0 / 0;"), "INF -INF NAN");
}

#[test]
fn arithmetic_on_array() {
    assert_eq!(
        run_err("$a[0] = 1; echo $a + 1;"),
        RuntimeError::UnsupportedOperand { op: "+".into(), found: ValueKind::Array }
    );
}

#[test]
fn comparisons() {
    assert_eq!(run("echo 2 > 1, 1 > 2;"), "10");
    assert_eq!(run("echo 2 >= 2, 2 <= 1;"), "10");
    assert_eq!(run("echo '10' < '9';"), "0");
    assert_eq!(run("echo 1.5 > 1;"), "1");
}

#[test]
fn equality_compares_representation() {
    assert_eq!(run("echo 1 == '1';"), "1");
    assert_eq!(run("echo 1 == 1.0;"), "1");
    assert_eq!(run("echo '1' == '01';"), "0");
    assert_eq!(run("echo 'abc' != 'ABC';"), "1");
}

#[test]
fn concatenation() {
    assert_eq!(run("echo 'a' . 1 . 2.5;"), "a12.5");
    assert_eq!(run("$x = 'n=' . 1 + 2; echo $x;"), "n=3");
}

#[test]
fn truthiness() {
    assert_eq!(run("if ('0') echo 'y'; else echo 'n';"), "n");
    assert_eq!(run("if ('') echo 'y'; else echo 'n';"), "n");
    assert_eq!(run("if ('a') echo 'y'; else echo 'n';"), "y");
    assert_eq!(run("if (0.0) echo 'y'; else echo 'n';"), "n");
}

// ── Control flow ────────────────────────────────────────────

#[test]
fn do_while_runs_once() {
    assert_eq!(run("$i = 5; do { echo $i; $i = $i + 1; } while ($i < 3);"), "5");
}

#[test]
fn top_level_return_ends_script() {
    assert_eq!(run("echo 1; return; echo 2;"), "1");
}

#[test]
fn return_from_inside_loop() {
    assert_eq!(
        run("function f() { $i = 0; while (1) { if ($i == 3) { return $i; } $i = $i + 1; } } echo f();"),
        "3"
    );
}

#[test]
fn function_without_return_yields_empty() {
    assert_eq!(run("function f() { } echo 'a' . f() . 'b';"), "ab");
}

#[test]
fn execute_reports_return_flow() {
    let mut interp = Interpreter::new();
    let flow = interp
        .execute(&Node::op(Operation::Return(Some(Node::Integer(3)))))
        .unwrap();
    assert_eq!(flow, Flow::Return(Value::Int(3)));
}

// ── Functions ───────────────────────────────────────────────

#[test]
fn recursion() {
    assert_eq!(
        run("function fact($n) { if ($n < 2) return 1; return $n * fact($n - 1); } echo fact(5);"),
        "120"
    );
    assert_eq!(
        run("function fib($n) { if ($n < 2) return $n; return fib($n-1) + fib($n-2); } echo fib(10);"),
        "55"
    );
}

#[test]
fn recursion_keeps_locals_per_activation() {
    assert_eq!(
        run("function f($n) { $local = $n; if ($n > 0) f($n - 1); echo $local; } f(2);"),
        "012"
    );
}

#[test]
fn arguments_are_evaluated_in_caller_scope() {
    assert_eq!(
        run("function f($n) { if ($n > 0) { $m = $n - 1; return f($m) . $n; } return ''; } echo f(3);"),
        "123"
    );
}

#[test]
fn function_locals_do_not_leak() {
    assert_eq!(
        run_err("function f() { $x = 5; } f(); echo $x;"),
        RuntimeError::VariableNotFound { name: "x".into() }
    );
}

#[test]
fn function_writes_stay_local() {
    assert_eq!(run("$g = 1; function f() { $g = 2; return $g; } echo f(); echo $g;"), "21");
}

#[test]
fn function_reads_fall_back_to_global() {
    assert_eq!(run("$g = 7; function f() { return $g; } echo f();"), "7");
}

#[test]
fn surplus_arguments_are_bound_by_position() {
    assert_eq!(run("function f($a) { return $a; } echo f(1, 2);"), "1");
    assert_eq!(run("function f($a) { $n = '.arg1'; return $$n; } echo f(1, 2);"), "2");
}

#[test]
fn missing_arguments() {
    let err = run_err("function f($a, $b) {} f(1);");
    assert_eq!(
        err,
        RuntimeError::ArgumentCountMismatch { function: "f".into(), expected: 2, found: 1 }
    );
    assert_eq!(err.to_string(), "Function f( ) expecting 2 arguments, but only found 1.");
}

#[test]
fn array_arguments_are_copied() {
    assert_eq!(
        run("function f($x) { $x[0] = 9; return $x[0]; } $a[0] = 1; echo f($a); echo $a[0];"),
        "91"
    );
}

#[test]
fn dynamic_call() {
    assert_eq!(run("function hi() { return 'hi'; } $f = 'hi'; echo $f();"), "hi");
    assert_eq!(
        run_err("$f = 5; $f();"),
        RuntimeError::FunctionNameMustBeString { found: ValueKind::Int }
    );
}

#[test]
fn functions_declared_after_use() {
    assert_eq!(run("echo twice(4); function twice($n) { return $n + $n; }"), "8");
}

// ── Variables ───────────────────────────────────────────────

#[test]
fn undefined_variable() {
    let err = run_err("echo $x;");
    assert_eq!(err.to_string(), "Variable not found: x");
}

#[test]
fn variable_variables() {
    assert_eq!(run("$name = 'x'; $$name = 3; echo $x;"), "3");
    assert_eq!(run("$a = 'b'; $b = 'c'; $c = 'd'; echo $$$a;"), "d");
}

#[test]
fn variable_variable_must_name_a_scalar() {
    assert_eq!(
        run_err("$n[0] = 1; echo $$n;"),
        RuntimeError::VariableNameMustBeString { found: ValueKind::Array }
    );
}

#[test]
fn self_referential_assignment_starts_at_zero() {
    assert_eq!(run("$i = $i + 1; echo $i;"), "1");
    assert_eq!(run("$s = $s . 'a'; echo $s;"), "0a");
}

#[test]
fn assignment_from_other_missing_variable_fails() {
    assert_eq!(run_err("$a = $b;"), RuntimeError::VariableNotFound { name: "b".into() });
}

#[test]
fn cannot_assign_this() {
    assert_eq!(run_err("$this = 1;"), RuntimeError::ThisRedeclaration);
}

#[test]
fn scalar_copy_law() {
    assert_eq!(run("$a = 1; $b = $a; $b = 2; echo $a;"), "1");
    assert_eq!(run("$a[0] = 1; $b = $a; $b[0] = 2; echo $a[0];"), "1");
}

// ── Arrays ──────────────────────────────────────────────────

#[test]
fn nested_array_construction() {
    assert_eq!(run("$a[0][1] = 'v'; echo $a[0][1]; echo $a[0];"), "vArray");
}

#[test]
fn missing_cell_reads_empty() {
    assert_eq!(run("$a[0] = 1; echo 'x' . $a[5] . 'y';"), "xy");
    assert_eq!(run("$a[0][0] = 1; echo 'x' . $a[1][2] . 'y';"), "xy");
}

#[test]
fn keys_are_textual() {
    assert_eq!(run("$a[1] = 'x'; echo $a['1'];"), "x");
}

#[test]
fn fetch_from_scalar() {
    assert_eq!(
        run_err("$s = 1; echo $s[0];"),
        RuntimeError::ExpectedArrayNotFound { name: "s".into() }
    );
}

#[test]
fn fetch_through_scalar_cell() {
    assert_eq!(
        run_err("$a[0] = 'str'; echo $a[0][1];"),
        RuntimeError::ExpectedArrayNotFound { name: "a[0]".into() }
    );
}

#[test]
fn array_write_replaces_scalars() {
    assert_eq!(run("$s = 1; $s[0] = 2; echo $s[0];"), "2");
    assert_eq!(run("$a[0] = 'str'; $a[0][1] = 'x'; echo $a[0][1];"), "x");
}

#[test]
fn invalid_key() {
    assert_eq!(
        run_err("$k[0] = 1; $a[$k] = 2;"),
        RuntimeError::InvalidArrayKey { found: ValueKind::Array }
    );
}

#[test]
fn dynamic_array_name() {
    assert_eq!(run("$n = 'list'; $$n[0] = 'z'; echo $list[0];"), "z");
}

// ── Interpreter state ───────────────────────────────────────

#[test]
fn state_persists_between_runs() {
    let mut interp = Interpreter::new();
    run_source(&mut interp, "<? $a = 1;", "one.php").unwrap();
    run_source(&mut interp, "<? echo $a;", "two.php").unwrap();
    assert_eq!(interp.output(), "1");
}

#[test]
fn reset_clears_everything() {
    let mut interp = Interpreter::new();
    run_source(&mut interp, "<? $a = 1; function f() {} echo 'x';", "one.php").unwrap();
    interp.reset();
    assert_eq!(interp.output(), "");
    assert!(interp.state().resolve("a", Some(GLOBAL_SCOPE)).is_err());
    run_source(&mut interp, "<? function f() {} echo 'ok';", "two.php").unwrap();
    assert_eq!(interp.output(), "ok");
}

#[test]
fn failure_keeps_earlier_output() {
    let (output, err) = interpret_partial("<? echo 'a'; nope(); echo 'b';");
    assert_eq!(output, "a");
    assert!(matches!(err, Some(Error::Runtime(RuntimeError::FunctionNotFound { .. }))));
}

#[test]
fn parse_errors_are_distinguished() {
    assert!(matches!(interpret("<? echo ;"), Err(Error::Parse(_))));
    assert!(matches!(interpret("<? 'open"), Err(Error::Lex(_))));
}
