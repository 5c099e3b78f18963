use clap::Parser;
use serde_json::json;
use std::sync::Arc;

use stanza_eval::{Context, Expr, StaticScope, Type};

/// Evaluation harness: evaluate one Stanza expression (as a JSON-encoded
/// AST) against a JSON document of variables.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON object mapping root names to values, e.g. '{"var":{"name":"x"}}'
    vars: String,
    /// Expression to evaluate, as a JSON-encoded AST
    expr: String,
    /// Type to convert the result to: any, string, number or bool
    #[arg(long, default_value = "any")]
    want: String,
    /// Base directory for filesystem functions
    #[arg(long, default_value = ".")]
    base_dir: String,
    /// Make impure functions yield unknown results
    #[arg(long)]
    pure: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let vars: serde_json::Value = match serde_json::from_str(&args.vars) {
        Ok(doc) => doc,
        Err(err) => {
            eprintln!("Invalid variables JSON: {err}");
            std::process::exit(1);
        }
    };
    let Some(scope) = StaticScope::from_json(&vars) else {
        eprintln!("Variables must be a JSON object keyed by root name");
        std::process::exit(1);
    };

    let expr: Expr = match serde_json::from_str(&args.expr) {
        Ok(expr) => expr,
        Err(err) => {
            eprintln!("Invalid expression AST: {err}");
            std::process::exit(1);
        }
    };

    let want = match args.want.as_str() {
        "any" => Type::Any,
        "string" => Type::String,
        "number" => Type::Number,
        "bool" => Type::Bool,
        other => {
            eprintln!("Unsupported --want type: {other}");
            std::process::exit(1);
        }
    };

    let ctx = Context::new(Arc::new(scope))
        .with_base_dir(args.base_dir)
        .with_pure_only(args.pure);
    let (val, diags) = ctx.eval_expr(&expr, &want);

    let out = json!({
        "value": val.to_json(),
        "unknown": val.is_unknown(),
        "diagnostics": &diags,
    });
    match serde_json::to_string_pretty(&out) {
        Ok(text) => println!("{text}"),
        Err(err) => {
            eprintln!("Cannot render result: {err}");
            std::process::exit(1);
        }
    }

    if diags.has_errors() {
        std::process::exit(2);
    }
}
