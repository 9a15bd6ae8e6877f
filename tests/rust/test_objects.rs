//! Object tests — instantiation, constructors, visibility, reference counting

use phype::driver::{interpret, run_source};
use phype::runtime::{Interpreter, ObjectId, RuntimeError, Value, ValueKind, GLOBAL_SCOPE};
use phype::Error;
use pretty_assertions::assert_eq;

const COUNTER: &str = "class Counter {
    public $n = 1;
    function inc() { $this->n = $this->n + 1; echo $this->n; }
}";

const BOX: &str = "class Box { public $v = 0; public $child; }";

fn run(script: &str) -> String {
    interpret(&format!("<? {}", script)).unwrap()
}

fn run_err(script: &str) -> RuntimeError {
    match interpret(&format!("<? {}", script)).unwrap_err() {
        Error::Runtime(e) => e,
        other => panic!("expected runtime error, got {}", other),
    }
}

fn interp_after(script: &str) -> Interpreter {
    let mut interp = Interpreter::new();
    run_source(&mut interp, &format!("<? {}", script), "test.php").unwrap();
    interp
}

fn object(interp: &Interpreter, name: &str) -> ObjectId {
    match interp.state().resolve(name, Some(GLOBAL_SCOPE)).unwrap() {
        Value::Object(id) => id,
        other => panic!("${} is not an object: {:?}", name, other),
    }
}

// ── Instances ───────────────────────────────────────────────

#[test]
fn instances_are_independent() {
    let script = format!(
        "{} $a = new Counter(); $b = new Counter(); $a->inc(); $a->inc(); $b->inc(); echo $a->n;",
        COUNTER
    );
    assert_eq!(run(&script), "2323");
}

#[test]
fn echo_object() {
    assert_eq!(run(&format!("{} $b = new Box(); echo $b;", BOX)), "Object");
}

#[test]
fn attribute_initializers() {
    assert_eq!(
        run("class A { public $x = 2 * 3; public $s = 'a' . 'b'; public $e; } $a = new A(); echo $a->x, $a->s, '[', $a->e, ']';"),
        "6ab[]"
    );
}

#[test]
fn non_constant_initializer() {
    assert_eq!(
        run_err("$y = 1; class A { public $x = $y; } new A();"),
        RuntimeError::NonConstantAttributeInit { attribute: "x".into(), class: "A".into() }
    );
}

#[test]
fn unknown_class() {
    assert_eq!(run_err("new Nope();"), RuntimeError::ClassDefinitionNotFound { name: "Nope".into() });
}

#[test]
fn dynamic_class_and_method_names() {
    assert_eq!(
        run("class C { function get() { return 'got'; } } $c = 'C'; $o = new $c; $m = 'get'; echo $o->$m();"),
        "got"
    );
}

#[test]
fn class_redeclared() {
    assert_eq!(run_err("class A {} class A {}"), RuntimeError::ClassRedeclared { name: "A".into() });
}

#[test]
fn method_redeclared() {
    assert_eq!(
        run_err("class A { function m() {} function m() {} }"),
        RuntimeError::FunctionRedeclared { name: "A::m".into() }
    );
}

// ── Constructors ────────────────────────────────────────────

#[test]
fn construct_receives_arguments() {
    assert_eq!(
        run("class P { public $x; function __construct($x) { $this->x = $x; } } $p = new P(4); echo $p->x;"),
        "4"
    );
}

#[test]
fn class_named_constructor() {
    assert_eq!(
        run("class Q { public $v; function Q() { $this->v = 'q'; } } $q = new Q(); echo $q->v;"),
        "q"
    );
}

#[test]
fn construct_wins_over_class_named_method() {
    assert_eq!(
        run("class R { public $v; function R() { $this->v = 'old'; } function __construct() { $this->v = 'new'; } } $r = new R(); echo $r->v;"),
        "new"
    );
}

#[test]
fn constructor_arity() {
    assert_eq!(
        run_err("class P { function __construct($x) {} } $p = new P();"),
        RuntimeError::ArgumentCountMismatch { function: "P::__construct".into(), expected: 1, found: 0 }
    );
}

#[test]
fn constructor_passing_this_keeps_object_alive() {
    let interp = interp_after(
        "function touch($o) { return 1; }
         class T { public $v = 'alive'; function __construct() { touch($this); } }
         $t = new T();",
    );
    let t = object(&interp, "t");
    assert_eq!(interp.state().references(t), Some(1));
    assert_eq!(interp.state().read_attribute(t, "v").unwrap(), Value::str("alive"));
}

// ── Methods ─────────────────────────────────────────────────

#[test]
fn method_chaining_through_this() {
    let script = "class B { public $n = 0; function add($k) { $this->n = $this->n + $k; return $this; } }
                  $b = new B(); echo $b->add(2)->add(3)->n;";
    assert_eq!(run(script), "5");
    let interp = interp_after(script);
    assert_eq!(interp.state().references(object(&interp, "b")), Some(1));
}

#[test]
fn free_call_inside_method_finds_free_function() {
    assert_eq!(
        run("function helper() { return 'h'; } class A { function helper() { return 'm'; } function go() { return helper(); } } $a = new A(); echo $a->go();"),
        "h"
    );
}

#[test]
fn method_not_found() {
    assert_eq!(
        run_err("class A {} $a = new A(); $a->nope();"),
        RuntimeError::MethodNotFound { class: "A".into(), name: "nope".into() }
    );
}

#[test]
fn invocation_on_non_object() {
    assert_eq!(
        run_err("$x = 1; $x->m();"),
        RuntimeError::InvocationTargetInvalid { found: "Int".into() }
    );
    assert!(matches!(run_err("$this->m();"), RuntimeError::InvocationTargetInvalid { .. }));
}

#[test]
fn fetch_on_non_object() {
    assert_eq!(run_err("$x = 'a'; echo $x->v;"), RuntimeError::FetchTargetInvalid);
    assert_eq!(run_err("echo $this->v;"), RuntimeError::FetchTargetInvalid);
}

#[test]
fn this_cannot_be_reassigned_in_method() {
    assert_eq!(
        run_err("class A { function m() { $this = 1; } } $a = new A(); $a->m();"),
        RuntimeError::ThisRedeclaration
    );
}

#[test]
fn method_locals_are_isolated() {
    assert_eq!(
        run_err("class A { function m() { $tmp = 1; } } $a = new A(); $a->m(); echo $tmp;"),
        RuntimeError::VariableNotFound { name: "tmp".into() }
    );
}

// ── Visibility ──────────────────────────────────────────────

#[test]
fn private_attribute_outside_class() {
    assert_eq!(
        run_err("class A { private $s = 1; } $a = new A(); echo $a->s;"),
        RuntimeError::MemberNotVisible { member: "s".into() }
    );
}

#[test]
fn private_attribute_inside_class() {
    assert_eq!(
        run("class A { private $s = 1; function get() { return $this->s; } } $a = new A(); echo $a->get();"),
        "1"
    );
}

#[test]
fn private_member_of_other_instance_same_class() {
    assert_eq!(
        run("class A { private $s = 7; function peek($other) { return $other->s; } } $a = new A(); $b = new A(); echo $a->peek($b);"),
        "7"
    );
}

#[test]
fn private_method_outside_class() {
    assert_eq!(
        run_err("class A { private function hidden() {} } $a = new A(); $a->hidden();"),
        RuntimeError::MemberNotVisible { member: "hidden".into() }
    );
}

#[test]
fn private_member_from_other_class() {
    assert_eq!(
        run_err("class A { private $s = 1; } class B { function poke($a) { return $a->s; } } $b = new B(); echo $b->poke(new A());"),
        RuntimeError::MemberNotVisible { member: "s".into() }
    );
}

#[test]
fn protected_member_from_outside() {
    assert_eq!(
        run_err("class A { protected $p = 1; } $a = new A(); echo $a->p;"),
        RuntimeError::InheritanceUnsupported {
            invoker: GLOBAL_SCOPE.into(),
            class: "A".into(),
            member: "p".into(),
        }
    );
}

#[test]
fn protected_member_from_other_class() {
    let expected = RuntimeError::InheritanceUnsupported {
        invoker: "B".into(),
        class: "A".into(),
        member: "p".into(),
    };
    assert_eq!(
        run_err("class A { protected $p = 1; } class B { function peek($a) { return $a->p; } } $b = new B(); echo $b->peek(new A());"),
        expected
    );
    assert_eq!(
        run_err("class A { protected function p() {} } class B { function poke($a) { return $a->p(); } } $b = new B(); $b->poke(new A());"),
        expected
    );
}

#[test]
fn protected_member_from_same_class() {
    assert_eq!(
        run("class A { protected $p = 'p'; function get() { return $this->p; } } $a = new A(); echo $a->get();"),
        "p"
    );
}

#[test]
fn undeclared_attribute() {
    assert_eq!(
        run_err("class A {} $a = new A(); $a->x = 1;"),
        RuntimeError::MemberNotVisible { member: "x".into() }
    );
}

// ── Reference counting ──────────────────────────────────────

#[test]
fn shared_handle_sees_mutations() {
    assert_eq!(run(&format!("{} $a = new Box(); $b = $a; $b->v = 5; echo $a->v;", BOX)), "5");
}

#[test]
fn count_matches_bindings() {
    let interp = interp_after(&format!("{} $a = new Box(); $b = $a; $c = $b;", BOX));
    assert_eq!(interp.state().references(object(&interp, "a")), Some(3));
}

#[test]
fn self_assignment_keeps_count() {
    let interp = interp_after(&format!("{} $a = new Box(); $a = $a;", BOX));
    assert_eq!(interp.state().references(object(&interp, "a")), Some(1));
    assert_eq!(interp.state().live_objects(), 1);
}

#[test]
fn reassigning_last_binding_reclaims_object() {
    let interp = interp_after(&format!("{} $a = new Box(); $a = 1;", BOX));
    assert_eq!(interp.state().live_objects(), 0);
    // Only $a itself is left in storage; the attribute slots are gone.
    assert_eq!(interp.state().stored_values(), 1);
}

#[test]
fn leaving_scope_reclaims_object() {
    let interp = interp_after(&format!("{} function f() {{ $o = new Box(); }} f();", BOX));
    assert_eq!(interp.state().live_objects(), 0);
}

#[test]
fn returned_object_survives_call() {
    let script = format!(
        "{} function make() {{ $o = new Box(); $o->v = 3; return $o; }} $x = make(); echo $x->v;",
        BOX
    );
    assert_eq!(run(&script), "3");
    let interp = interp_after(&script);
    assert_eq!(interp.state().references(object(&interp, "x")), Some(1));
    assert_eq!(interp.state().live_objects(), 1);
}

#[test]
fn unused_temporaries_are_reclaimed() {
    let interp = interp_after(&format!(
        "{} function make() {{ return new Box(); }} make(); new Box(); echo new Box(); echo make()->v;",
        BOX
    ));
    assert_eq!(interp.state().live_objects(), 0);
    assert_eq!(interp.output(), "Object0");
}

#[test]
fn temporaries_in_conditions_are_reclaimed() {
    let interp = interp_after(&format!(
        "{} function make() {{ return new Box(); }}
         if (make()) {{ echo 'y'; }}
         if (make()) {{ echo 'y'; }} else {{ echo 'n'; }}
         $i = 0; while (make()) {{ $i = $i + 1; if ($i == 2) return; }}",
        BOX
    ));
    assert_eq!(interp.state().live_objects(), 0);
    assert_eq!(interp.output(), "yy");
}

#[test]
fn temporaries_in_operators_are_reclaimed() {
    let interp = interp_after(&format!(
        "{} function make() {{ return new Box(); }}
         echo 'a' . make(); echo make() == make(); $s = make() . '!';",
        BOX
    ));
    assert_eq!(interp.state().live_objects(), 0);
    assert_eq!(interp.output(), "aObject0");
    assert_eq!(
        run_err("function make() { return new Box(); } class Box {} $n = 1 + make();"),
        RuntimeError::UnsupportedOperand { op: "+".into(), found: ValueKind::Object }
    );
}

#[test]
fn write_through_temporary_receiver() {
    let interp = interp_after(&format!("{} (new Box())->v = 1;", BOX));
    assert_eq!(interp.state().live_objects(), 0);

    let interp = interp_after(&format!("{} $c = new Box(); (new Box())->child = $c;", BOX));
    assert_eq!(interp.state().live_objects(), 1);
    assert_eq!(interp.state().references(object(&interp, "c")), Some(1));
}

#[test]
fn failed_argument_releases_earlier_arguments() {
    let interp = interp_after(&format!(
        "{} function f($o, $n) {{ return $n; }} $x = f(new Box(), $x); echo $x;",
        BOX
    ));
    assert_eq!(interp.state().live_objects(), 0);
    assert_eq!(interp.output(), "0");
}

#[test]
fn failed_construction_is_reclaimed() {
    let interp = interp_after(
        "class P { public $v; function __construct($v) { $this->v = $v; } } $x = new P($x); echo $x->v;",
    );
    assert_eq!(interp.state().live_objects(), 1);
    assert_eq!(interp.state().references(object(&interp, "x")), Some(1));
    assert_eq!(interp.output(), "0");
}

#[test]
fn top_level_return_value_is_reclaimed() {
    let interp = interp_after(&format!("{} return new Box();", BOX));
    assert_eq!(interp.state().live_objects(), 0);
}

#[test]
fn attribute_release_cascades() {
    let interp = interp_after(&format!("{} $a = new Box(); $a->child = new Box(); $a = 0;", BOX));
    assert_eq!(interp.state().live_objects(), 0);
}

#[test]
fn shared_child_outlives_parent() {
    let interp = interp_after(&format!(
        "{} $c = new Box(); $a = new Box(); $a->child = $c; $a = 0;",
        BOX
    ));
    assert_eq!(interp.state().live_objects(), 1);
    assert_eq!(interp.state().references(object(&interp, "c")), Some(1));
}

#[test]
fn array_cells_hold_references() {
    let interp = interp_after(&format!("{} $o = new Box(); $arr[0] = $o; $copy = $arr;", BOX));
    assert_eq!(interp.state().references(object(&interp, "o")), Some(3));

    let interp = interp_after(&format!("{} $o = new Box(); $arr[0] = $o; $arr[0] = 1; $o = 1;", BOX));
    assert_eq!(interp.state().live_objects(), 0);
}

#[test]
fn parameters_release_on_return() {
    let interp = interp_after(&format!("{} function keep($o) {{ $also = $o; }} $b = new Box(); keep($b);", BOX));
    assert_eq!(interp.state().references(object(&interp, "b")), Some(1));
}

#[test]
fn cycles_are_not_collected() {
    let interp = interp_after(&format!("{} $a = new Box(); $a->child = $a; $a = 0;", BOX));
    assert_eq!(interp.state().live_objects(), 1);
}
