use crate::body::{Block, Body};
use crate::decode::Spec;
use crate::diags::{Diagnostic, Diagnostics};
use crate::expr::{EvalEnv, Expr, ExprKind};
use crate::traversal::Traversal;
use crate::value::Value;
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Block type that marks a dynamically generated block.
pub const DYNAMIC_BLOCK_TYPE: &str = "dynamic";
/// Nested block holding the template for each generated block.
const CONTENT_BLOCK_TYPE: &str = "content";
/// Attribute naming the collection to iterate.
const FOR_EACH_ATTR: &str = "for_each";
/// Optional attribute overriding the iteration variable name.
const ITERATOR_ATTR: &str = "iterator";

/// The traversals referenced by `for_each`/`iterator` expressions of
/// dynamic blocks anywhere under `body`, excluding references to enclosing
/// iterator variables. This is the restricted extraction the expansion
/// pipeline resolves before expanding; it deliberately ignores all other
/// expressions in the body.
pub fn for_each_variables(body: &Body, spec: Spec<'_>) -> Vec<Traversal> {
    let mut out = Vec::new();
    let mut bound = HashSet::new();
    collect_for_each(body, Some(spec), &mut bound, &mut out);
    out
}

fn collect_for_each(
    body: &Body,
    spec: Option<Spec<'_>>,
    bound: &mut HashSet<String>,
    out: &mut Vec<Traversal>,
) {
    for block in &body.blocks {
        if block.type_name != DYNAMIC_BLOCK_TYPE {
            let child = spec.and_then(|s| s.block_spec(&block.type_name));
            if let Some(child) = child {
                collect_for_each(&block.body, Some(child), bound, out);
            }
            continue;
        }

        if let Some(expr) = block.body.attributes.get(FOR_EACH_ATTR) {
            out.extend(
                expr.variables()
                    .into_iter()
                    .filter(|trav| !bound.contains(trav.root_name())),
            );
        }

        // Nested dynamic blocks inside the content template iterate under
        // this block's iterator variable; references rooted there are not
        // resolvable through the scope.
        let iter_name = iterator_name(block);
        if let Some(content) = content_block(block) {
            let label = block.labels.first().map(String::as_str).unwrap_or_default();
            let child = spec.and_then(|s| s.block_spec(label));
            let newly_bound = bound.insert(iter_name.clone());
            collect_for_each(&content.body, child, bound, out);
            if newly_bound {
                bound.remove(&iter_name);
            }
        }
    }
}

/// Expand every dynamic block under `body` into its generated blocks,
/// evaluating `for_each` collections in `env`. Non-dynamic content passes
/// through unchanged. Returns a best-effort body in all cases; malformed or
/// unresolvable dynamic blocks are dropped and reported through the
/// returned diagnostics.
pub fn expand(body: &Body, env: &EvalEnv<'_>) -> (Body, Diagnostics) {
    let mut diags = Diagnostics::new();
    let expanded = expand_body(body, env, &mut diags);
    (expanded, diags)
}

fn expand_body(body: &Body, env: &EvalEnv<'_>, diags: &mut Diagnostics) -> Body {
    let mut out = Body {
        attributes: body.attributes.clone(),
        blocks: Vec::new(),
    };
    for block in &body.blocks {
        if block.type_name == DYNAMIC_BLOCK_TYPE {
            expand_dynamic(block, env, diags, &mut out.blocks);
        } else {
            out.blocks.push(Block {
                type_name: block.type_name.clone(),
                labels: block.labels.clone(),
                body: expand_body(&block.body, env, diags),
            });
        }
    }
    out
}

fn expand_dynamic(
    block: &Block,
    env: &EvalEnv<'_>,
    diags: &mut Diagnostics,
    out: &mut Vec<Block>,
) {
    let Some(type_name) = block.labels.first() else {
        diags.push(Diagnostic::error(
            "Invalid dynamic block",
            "A dynamic block requires one label naming the block type to generate.",
        ));
        return;
    };
    let Some(for_each) = block.body.attributes.get(FOR_EACH_ATTR) else {
        diags.push(Diagnostic::error(
            "Invalid dynamic block",
            format!("The dynamic {type_name:?} block has no \"for_each\" attribute."),
        ));
        return;
    };
    let Some(content) = content_block(block) else {
        diags.push(Diagnostic::error(
            "Invalid dynamic block",
            format!("The dynamic {type_name:?} block has no \"content\" block."),
        ));
        return;
    };
    let iter_name = iterator_name(block);

    let (coll, coll_diags) = for_each.value(env);
    diags.extend(coll_diags);

    let entries: Vec<(Value, Value)> = match coll {
        Value::Unknown(_) => {
            diags.push(
                Diagnostic::error(
                    "Invalid for_each value",
                    "The for_each collection is not yet known, so the dynamic block cannot be expanded.",
                )
                .with_subject(for_each.range),
            );
            return;
        }
        Value::List(items) => items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| (Value::Number(idx as f64), item))
            .collect(),
        Value::Object(attrs) => attrs
            .into_iter()
            .map(|(key, item)| (Value::String(key), item))
            .collect(),
        other => {
            diags.push(
                Diagnostic::error(
                    "Invalid for_each value",
                    format!(
                        "The for_each expression must produce a list or map, not {}.",
                        other.type_of()
                    ),
                )
                .with_subject(for_each.range),
            );
            return;
        }
    };

    trace!(block = %type_name, count = entries.len(), "expanding dynamic block");
    for (key, item) in entries {
        let mut entry = std::collections::BTreeMap::new();
        entry.insert("key".to_string(), key);
        entry.insert("value".to_string(), item);
        let mut bindings = HashMap::new();
        bindings.insert(iter_name.clone(), Value::Object(entry));

        // Inner dynamic blocks expand under the iterator binding, then the
        // whole generated body is bound so later decoding sees it too.
        let inner = expand_body(&content.body, &env.child(&bindings), diags);
        out.push(Block {
            type_name: type_name.clone(),
            labels: Vec::new(),
            body: bind_body(inner, &bindings),
        });
    }
}

fn content_block(block: &Block) -> Option<&Block> {
    block
        .body
        .blocks
        .iter()
        .find(|b| b.type_name == CONTENT_BLOCK_TYPE)
}

/// The iteration variable name: the `iterator` attribute when it is a
/// literal string, otherwise the generated block type.
fn iterator_name(block: &Block) -> String {
    if let Some(expr) = block.body.attributes.get(ITERATOR_ATTR) {
        if let ExprKind::Literal(Value::String(name)) = &expr.kind {
            return name.clone();
        }
    }
    block.labels.first().cloned().unwrap_or_default()
}

fn bind_body(body: Body, bindings: &HashMap<String, Value>) -> Body {
    Body {
        attributes: body
            .attributes
            .into_iter()
            .map(|(name, expr)| (name, Expr::bound(bindings.clone(), expr)))
            .collect(),
        blocks: body
            .blocks
            .into_iter()
            .map(|block| Block {
                type_name: block.type_name,
                labels: block.labels,
                body: bind_body(block.body, bindings),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::Registry;
    use crate::schema::{Nesting, Schema};
    use crate::value::Type;
    use std::path::Path;

    fn dynamic_server_body() -> Body {
        Body::new().block(
            Block::new(DYNAMIC_BLOCK_TYPE).label("server").body(
                Body::new()
                    .attr("for_each", Expr::reference(Traversal::root("var").attr("servers")))
                    .block(Block::new(CONTENT_BLOCK_TYPE).body(Body::new().attr(
                        "name",
                        Expr::reference(Traversal::root("server").attr("value")),
                    ))),
            ),
        )
    }

    #[test]
    fn for_each_variables_sees_only_iteration_exprs() {
        let schema = Schema::new().block_type(
            "server",
            Nesting::List,
            Schema::new().attribute("name", Type::String, true),
        );
        let body = dynamic_server_body();
        let vars = for_each_variables(&body, schema.decoder_spec());
        assert_eq!(vars, vec![Traversal::root("var").attr("servers")]);
    }

    #[test]
    fn iterator_rooted_refs_are_not_collected() {
        // A nested dynamic block whose for_each references the outer
        // iterator variable.
        let inner = Block::new(DYNAMIC_BLOCK_TYPE).label("port").body(
            Body::new()
                .attr(
                    "for_each",
                    Expr::reference(Traversal::root("server").attr("value").attr("ports")),
                )
                .block(Block::new(CONTENT_BLOCK_TYPE).body(Body::new().attr(
                    "number",
                    Expr::reference(Traversal::root("port").attr("value")),
                ))),
        );
        let body = Body::new().block(
            Block::new(DYNAMIC_BLOCK_TYPE).label("server").body(
                Body::new()
                    .attr("for_each", Expr::reference(Traversal::root("var").attr("servers")))
                    .block(Block::new(CONTENT_BLOCK_TYPE).body(Body::new().block(inner))),
            ),
        );
        let schema = Schema::new().block_type(
            "server",
            Nesting::List,
            Schema::new().block_type("port", Nesting::List, Schema::new()),
        );
        let vars = for_each_variables(&body, schema.decoder_spec());
        assert_eq!(vars, vec![Traversal::root("var").attr("servers")]);
    }

    #[test]
    fn unknown_for_each_reports_and_generates_nothing() {
        let reg = Registry::build(Path::new("."), false);
        let mut variables = HashMap::new();
        variables.insert("var".to_string(), Value::Unknown(Type::Any));
        let env = EvalEnv::new(variables, &reg);
        let (expanded, diags) = expand(&dynamic_server_body(), &env);
        assert!(diags.has_errors());
        assert!(expanded.blocks.is_empty());
    }
}
