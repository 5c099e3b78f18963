use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use stanza_eval::{Context, Expr, Registry, StaticScope, Type, Value};

fn empty_context() -> Context {
    Context::new(Arc::new(StaticScope::new(HashMap::new())))
}

#[test]
fn function_table_is_built_once_and_cached() {
    let ctx = empty_context();
    let first: *const Registry = ctx.functions();
    let second: *const Registry = ctx.functions();
    assert_eq!(first, second);
}

#[test]
fn concurrent_first_use_builds_one_table() {
    let ctx = Arc::new(empty_context());
    let mut handles = Vec::new();
    for _ in 0..16 {
        let ctx = Arc::clone(&ctx);
        handles.push(thread::spawn(move || ctx.functions() as *const Registry as usize));
    }
    let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(addrs.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn pure_only_context_yields_unknown_for_impure_calls() {
    let ctx = Context::new(Arc::new(StaticScope::new(HashMap::new()))).with_pure_only(true);
    let expr = Expr::call("timestamp", vec![]);
    let (val, diags) = ctx.eval_expr(&expr, &Type::Number);
    assert!(!diags.has_errors());
    assert_eq!(val, Value::Unknown(Type::Number));
}

#[test]
fn impure_calls_run_outside_pure_only_mode() {
    let ctx = empty_context();
    let expr = Expr::call("timestamp", vec![]);
    let (val, diags) = ctx.eval_expr(&expr, &Type::Number);
    assert!(!diags.has_errors());
    assert!(matches!(val, Value::Number(secs) if secs > 0.0));
}

#[test]
fn file_function_reads_relative_to_base_dir() {
    let dir = std::env::temp_dir().join(format!("stanza-eval-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("greeting.txt"), "hi from disk").unwrap();

    let ctx = Context::new(Arc::new(StaticScope::new(HashMap::new()))).with_base_dir(&dir);
    let expr = Expr::call("file", vec![Expr::string("greeting.txt")]);
    let (val, diags) = ctx.eval_expr(&expr, &Type::String);
    assert!(!diags.has_errors());
    assert_eq!(val, Value::String("hi from disk".into()));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn unknown_argument_short_circuits_the_call() {
    let ctx = empty_context();
    let expr = Expr::call(
        "upper",
        vec![Expr::literal(Value::Unknown(Type::String))],
    );
    let (val, diags) = ctx.eval_expr(&expr, &Type::String);
    assert!(!diags.has_errors());
    assert_eq!(val, Value::Unknown(Type::String));
}
