use std::rc::Rc;

use aap::{displayable, run_source, Error, Interpreter, Number, RuntimeError, Value};

fn run(src: &str) -> Value {
    run_source(src).unwrap_or_else(|e| panic!("{} failed: {}", src, e))
}

/// Value of the last top-level statement of a multi-statement program.
fn last(src: &str) -> Value {
    run(src)
        .items()
        .and_then(|items| items.last().cloned())
        .unwrap_or_else(|| panic!("{} did not yield several values", src))
}

fn runtime_err(src: &str) -> RuntimeError {
    match run_source(src) {
        Err(Error::Runtime { source }) => source,
        Err(other) => panic!("expected a runtime error, got {}", other),
        Ok(value) => panic!("expected a runtime error, got {}", value),
    }
}

/// Negative numbers are written as a subtraction.
fn lit(n: i64) -> String {
    if n < 0 {
        format!("( 0 - {} )", -n)
    } else {
        n.to_string()
    }
}

#[test]
fn integer_arithmetic_matches_native() {
    let pairs = [(7, 3), (-4, 9), (12, -5), (0, 6), (-20, -6)];
    for (a, b) in pairs {
        let (x, y) = (lit(a), lit(b));
        assert_eq!(run(&format!("{} + {}", x, y)), Value::int(a + b));
        assert_eq!(run(&format!("{} - {}", x, y)), Value::int(a - b));
        assert_eq!(run(&format!("{} * {}", x, y)), Value::int(a * b));
        assert_eq!(run(&format!("{} / {}", x, y)), Value::int(a / b));
    }
}

#[test]
fn precedence_and_parentheses() {
    assert_eq!(run("1 + 2 * 3 - 4 / 2"), Value::int(5));
    assert_eq!(run("( 1 + 2 ) * 3"), Value::int(9));
}

#[test]
fn floats_promote() {
    assert_eq!(run("1 + 0.5"), Value::Number(Number::Float(1.5)));
    assert_eq!(run("7.0 / 2"), Value::Number(Number::Float(3.5)));
}

#[test]
fn comparisons_and_logic_give_zero_or_one() {
    assert_eq!(run("3 > 2"), Value::int(1));
    assert_eq!(run("3 <= 2"), Value::int(0));
    assert_eq!(run("3 > 2 and 0 or 1"), Value::int(1));
    assert_eq!(run("5 and 0"), Value::int(0));
}

#[test]
fn logic_evaluates_both_sides() {
    let boom = "fn boom ( ) -> 1 / 0\n";
    assert!(matches!(
        runtime_err(&format!("{}0 and run boom ( )", boom)),
        RuntimeError::DivisionByZero
    ));
    assert!(matches!(
        runtime_err(&format!("{}1 or run boom ( )", boom)),
        RuntimeError::DivisionByZero
    ));
}

#[test]
fn assignment_yields_its_value() {
    assert_eq!(run("let x = 4 * 4"), Value::int(16));
}

#[test]
fn call_scope_does_not_leak_into_the_caller() {
    let src = r#"
let x = 1
fn f ( )
    let x = 2
    return x
end
run f ( )
x
"#;
    let result = displayable(run(src));
    assert_eq!(result, Value::list(vec![Value::int(1), Value::int(2), Value::int(1)]));
}

#[test]
fn escaping_closure_keeps_its_parameter() {
    let src = r#"
fn adder ( n ) -> fn ( x ) -> x + n
let add5 = run adder ( 5 )
run add5 ( 10 )
"#;
    assert_eq!(last(src), Value::int(15));
    assert_eq!(
        last("fn adder ( n ) -> fn ( x ) -> x + n\nrun run adder ( 2 ) ( 3 )"),
        Value::int(5)
    );
}

#[test]
fn closures_see_later_changes_to_their_scope() {
    let src = r#"
let base = 1
fn get ( ) -> base
let base = 10
run get ( )
"#;
    assert_eq!(last(src), Value::int(10));
}

#[test]
fn recursive_factorial() {
    let src = r#"
fn fact ( n ) -> if n <= 1 then 1 else n * run fact ( n - 1 )
run fact ( 10 )
"#;
    assert_eq!(last(src), Value::int(3_628_800));
}

#[test]
fn recursive_block_function_with_returns() {
    let src = r#"
fn fib ( n )
    if n < 2 then
        return n
    else
        return run fib ( n - 1 ) + run fib ( n - 2 )
    end
end
run fib ( 15 )
"#;
    assert_eq!(last(src), Value::int(610));
}

#[test]
fn arity_errors_name_both_counts() {
    let def = "fn add ( a , b ) -> a + b\n";

    let err = runtime_err(&format!("{}run add ( 1 )", def));
    assert!(matches!(
        err,
        RuntimeError::TooFewArguments { expected: 2, got: 1, .. }
    ));
    assert_eq!(
        err.to_string(),
        "too few arguments given for add: expected 2, got 1"
    );

    let err = runtime_err(&format!("{}run add ( 1 , 2 , 3 )", def));
    assert!(matches!(
        err,
        RuntimeError::TooManyArguments { expected: 2, got: 3, .. }
    ));
    assert!(err.to_string().contains("expected 2, got 3"));

    assert_eq!(last(&format!("{}run add ( 1 , 2 )", def)), Value::int(3));
}

#[test]
fn single_statement_block_collapses_to_its_value() {
    let src = r#"
fn one ( )
    42
end
run one ( )
"#;
    assert_eq!(last(src), Value::int(42));
}

#[test]
fn multi_statement_block_yields_every_value() {
    let src = r#"
fn two ( )
    1
    2
end
run two ( )
"#;
    assert_eq!(last(src), Value::list(vec![Value::int(1), Value::int(2)]));
}

#[test]
fn top_level_return_picks_the_block_value() {
    let src = r#"
fn pick ( a )
    let doubled = a * 2
    return doubled
    999
end
run pick ( 4 )
"#;
    assert_eq!(last(src), Value::int(8));
}

#[test]
fn return_inside_nested_conditionals() {
    let src = r#"
fn sign ( x )
    if x < 0 then
        return 0 - 1
    elif x == 0 then
        return 0
    else
        return 1
    end
end
"#;
    assert_eq!(last(&format!("{}run sign ( 0 - 5 )", src)), Value::int(-1));
    assert_eq!(last(&format!("{}run sign ( 0 )", src)), Value::int(0));
    assert_eq!(last(&format!("{}run sign ( 3 )", src)), Value::int(1));
}

#[test]
fn return_only_unwinds_its_own_block() {
    let src = r#"
fn early ( x )
    if x > 0 then
        return 1
    end
    2
end
"#;
    assert_eq!(
        last(&format!("{}run early ( 5 )", src)),
        Value::list(vec![Value::int(1), Value::int(2)])
    );
    // An unmatched conditional contributes nothing.
    assert_eq!(last(&format!("{}run early ( 0 )", src)), Value::int(2));
}

#[test]
fn unmatched_if_is_null() {
    assert_eq!(run("if 0 then 1"), Value::Null);
    assert_eq!(run("if 0 then 1 elif 0 then 2 else 3"), Value::int(3));
}

#[test]
fn while_collects_each_iteration() {
    let src = r#"
let i = 0
while i < 3 then let i = i + 1
"#;
    assert_eq!(
        last(src),
        Value::list(vec![Value::int(1), Value::int(2), Value::int(3)])
    );
    assert_eq!(last("let i = 5\nwhile i < 3 then i"), Value::list(vec![]));
}

#[test]
fn undefined_name() {
    let err = runtime_err("y + 1");
    assert!(matches!(err, RuntimeError::UndefinedName { ref name } if name == "y"));
    assert_eq!(err.to_string(), "no value found for 'y'");
}

#[test]
fn division_by_zero_is_reported() {
    assert!(matches!(runtime_err("1 / 0"), RuntimeError::DivisionByZero));
    assert!(matches!(runtime_err("1.5 / 0.0"), RuntimeError::DivisionByZero));
}

#[test]
fn only_functions_can_be_called() {
    assert!(matches!(
        runtime_err("run 5 ( )"),
        RuntimeError::NotCallable { found: "integer" }
    ));
}

#[test]
fn operators_need_numbers() {
    let err = runtime_err("fn f ( ) -> 1\nf + 1");
    assert!(matches!(
        err,
        RuntimeError::UnsupportedOperation { op: "+", left: "function", right: "integer" }
    ));
}

#[test]
fn syntax_errors_surface_through_the_pipeline() {
    assert!(matches!(run_source("if 1 2"), Err(Error::Parse { .. })));
}

#[test]
fn session_keeps_its_root_scope() {
    let mut interp = Interpreter::new();
    interp.run_source("let x = 41").expect("first line");
    interp.run_source("fn inc ( v ) -> v + 1").expect("second line");
    assert_eq!(
        interp.run_source("run inc ( x )").expect("third line"),
        Value::int(42)
    );
}

#[test]
fn display_drops_function_values() {
    assert_eq!(displayable(run("fn f ( ) -> 1\n2")), Value::int(2));
    assert_eq!(
        displayable(run("fn f ( ) -> 1\n2\n3")),
        Value::list(vec![Value::int(2), Value::int(3)])
    );
    assert_eq!(run("fn f ( ) -> 1").to_string(), "<fn f>");
    assert_eq!(run("1\n2.5").to_string(), "[1, 2.5]");
}

#[test]
fn named_function_binds_itself_in_its_defining_scope() {
    let mut interp = Interpreter::new();
    let value = interp.run_source("fn f ( ) -> 1").expect("definition");
    let Value::Function(function) = &value else {
        panic!("not a function: {}", value);
    };
    assert!(Rc::ptr_eq(&function.env, &interp.env));
    assert_eq!(function.env.borrow().get("f"), Some(value.clone()));
}
