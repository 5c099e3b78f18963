use pretty_assertions::assert_eq;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use stanza_eval::{
    Block, Body, Context, Expr, Nesting, Schema, StaticScope, Traversal, Type, Value,
};

fn context() -> Context {
    let mut obj = BTreeMap::new();
    obj.insert("region".to_string(), Value::String("eu-west-1".into()));
    obj.insert("port".to_string(), Value::Number(443.0));
    let mut vars = HashMap::new();
    vars.insert("var".to_string(), Value::Object(obj));
    Context::new(Arc::new(StaticScope::new(vars)))
}

fn service_schema() -> Schema {
    Schema::new()
        .attribute("region", Type::String, true)
        .attribute("replicas", Type::Number, false)
        .block_type(
            "listener",
            Nesting::List,
            Schema::new().attribute("port", Type::Number, true),
        )
}

fn service_body() -> Body {
    Body::new()
        .attr("region", Expr::reference(Traversal::root("var").attr("region")))
        .attr("replicas", Expr::number(3.0))
        .block(Block::new("listener").body(Body::new().attr(
            "port",
            Expr::reference(Traversal::root("var").attr("port")),
        )))
}

#[test]
fn decodes_to_the_implied_object_type() {
    let ctx = context();
    let schema = service_schema();
    let (val, diags) = ctx.eval_block(&service_body(), &schema);
    assert!(!diags.has_errors());
    assert_eq!(val.type_of(), schema.decoder_spec().implied_type());
}

#[test]
fn decoded_values_are_substituted() {
    let ctx = context();
    let (val, diags) = ctx.eval_block(&service_body(), &service_schema());
    assert!(diags.is_empty());

    let Value::Object(fields) = val else {
        panic!("block must decode to an object");
    };
    assert_eq!(fields.get("region"), Some(&Value::String("eu-west-1".into())));
    assert_eq!(fields.get("replicas"), Some(&Value::Number(3.0)));
    let Some(Value::List(listeners)) = fields.get("listener") else {
        panic!("listener must decode to a list");
    };
    assert_eq!(
        listeners[0],
        Value::Object(
            [("port".to_string(), Value::Number(443.0))]
                .into_iter()
                .collect()
        )
    );
}

#[test]
fn error_cases_keep_the_object_shape() {
    let ctx = context();
    let schema = service_schema();
    // Required attribute missing, plus an attribute the schema rejects.
    let body = Body::new().attr("bogus", Expr::string("x"));
    let (val, diags) = ctx.eval_block(&body, &schema);
    assert!(diags.has_errors());

    let Value::Object(fields) = val else {
        panic!("block must decode to an object even on error");
    };
    let mut names: Vec<&str> = fields.keys().map(String::as_str).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["listener", "region", "replicas"]);
    assert_eq!(fields.get("region"), Some(&Value::Null));
}

#[test]
fn mistyped_attribute_becomes_unknown_of_declared_type() {
    let ctx = context();
    let schema = Schema::new().attribute("count", Type::Number, true);
    let body = Body::new().attr("count", Expr::string("not-a-number"));
    let (val, diags) = ctx.eval_block(&body, &schema);
    assert!(diags.has_errors());
    let Value::Object(fields) = val else {
        panic!("block must decode to an object");
    };
    assert_eq!(fields.get("count"), Some(&Value::Unknown(Type::Number)));
}

#[test]
fn unexpanded_dynamic_block_is_a_schema_mismatch() {
    let ctx = context();
    let schema = service_schema();
    let body = service_body().block(
        Block::new("dynamic")
            .label("listener")
            .body(Body::new().attr("for_each", Expr::literal(Value::List(vec![])))),
    );
    let (_, diags) = ctx.eval_block(&body, &schema);
    assert!(diags.has_errors());
    assert!(diags
        .iter()
        .any(|d| d.summary == "Unsupported block type"));
}

#[test]
fn resolution_diagnostics_come_first() {
    // One undefined root plus one missing required attribute: the scope's
    // diagnostic must precede the decoder's.
    let ctx = Context::new(Arc::new(StaticScope::default()));
    let schema = Schema::new()
        .attribute("region", Type::String, true)
        .attribute("name", Type::String, true);
    let body = Body::new().attr("name", Expr::reference(Traversal::root("var").attr("name")));
    let (_, diags) = ctx.eval_block(&body, &schema);
    let summaries: Vec<&str> = diags.iter().map(|d| d.summary.as_str()).collect();
    assert_eq!(
        summaries,
        vec!["Reference to undefined value", "Missing required attribute"]
    );
}
