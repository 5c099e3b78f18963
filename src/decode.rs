use crate::body::{Block, Body};
use crate::convert::convert;
use crate::diags::{Diagnostic, Diagnostics};
use crate::expr::EvalEnv;
use crate::schema::{Nesting, Schema};
use crate::traversal::Traversal;
use crate::value::{Type, Value};
use std::collections::BTreeMap;

/// A decoding specification derived from a [`Schema`]. Knows how to report
/// the traversals a body references and how to decode the body into a value
/// of the schema's implied object type.
#[derive(Debug, Clone, Copy)]
pub struct Spec<'a> {
    schema: &'a Schema,
}

impl<'a> Spec<'a> {
    pub(crate) fn new(schema: &'a Schema) -> Spec<'a> {
        Spec { schema }
    }

    /// The spec for one nested block type, if the schema declares it.
    pub fn block_spec(&self, type_name: &str) -> Option<Spec<'a>> {
        self.schema
            .block_types
            .get(type_name)
            .map(|nested| Spec::new(&nested.schema))
    }

    /// The object type every successful or failed decode of this spec
    /// produces.
    pub fn implied_type(&self) -> Type {
        let mut fields = BTreeMap::new();
        for (name, attr) in &self.schema.attributes {
            fields.insert(name.clone(), attr.ty.clone());
        }
        for (name, nested) in &self.schema.block_types {
            let inner = Spec::new(&nested.schema).implied_type();
            let ty = match nested.nesting {
                Nesting::Single => inner,
                Nesting::List => Type::list_of(inner),
                Nesting::Map => Type::map_of(inner),
            };
            fields.insert(name.clone(), ty);
        }
        Type::Object(fields)
    }

    /// All traversals referenced by schema-declared attributes of `body`,
    /// recursing into declared nested blocks.
    pub fn variables(&self, body: &Body) -> Vec<Traversal> {
        let mut out = Vec::new();
        self.collect_variables(body, &mut out);
        out
    }

    fn collect_variables(&self, body: &Body, out: &mut Vec<Traversal>) {
        for (name, expr) in &body.attributes {
            if self.schema.attributes.contains_key(name) {
                out.extend(expr.variables());
            }
        }
        for block in &body.blocks {
            if let Some(spec) = self.block_spec(&block.type_name) {
                spec.collect_variables(&block.body, out);
            }
        }
    }

    /// Decode `body` against this spec, evaluating attribute expressions in
    /// `env`. The result is always of [`Spec::implied_type`]'s shape;
    /// attributes that fail to evaluate or convert decode to unknown or
    /// null leaves beside error diagnostics.
    pub fn decode(&self, body: &Body, env: &EvalEnv<'_>) -> (Value, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut fields = BTreeMap::new();

        for (name, attr) in &self.schema.attributes {
            let val = match body.attributes.get(name) {
                Some(expr) => {
                    let (val, expr_diags) = expr.value(env);
                    diags.extend(expr_diags);
                    match convert(val, &attr.ty) {
                        Ok(val) => val,
                        Err(err) => {
                            diags.push(
                                Diagnostic::error(
                                    "Incorrect attribute value type",
                                    format!("Invalid value for attribute {name:?}: {err}."),
                                )
                                .with_subject(expr.range),
                            );
                            Value::Unknown(attr.ty.clone())
                        }
                    }
                }
                None if attr.required => {
                    diags.push(Diagnostic::error(
                        "Missing required attribute",
                        format!("The attribute {name:?} is required."),
                    ));
                    Value::Null
                }
                None => Value::Null,
            };
            fields.insert(name.clone(), val);
        }

        for (name, expr) in &body.attributes {
            if !self.schema.attributes.contains_key(name) {
                diags.push(
                    Diagnostic::error(
                        "Unsupported attribute",
                        format!("An attribute named {name:?} is not expected here."),
                    )
                    .with_subject(expr.range),
                );
            }
        }

        for (name, nested) in &self.schema.block_types {
            let spec = Spec::new(&nested.schema);
            let matching: Vec<&Block> = body
                .blocks
                .iter()
                .filter(|block| block.type_name == *name)
                .collect();
            let val = match nested.nesting {
                Nesting::Single => {
                    if matching.len() > 1 {
                        diags.push(Diagnostic::error(
                            "Duplicate block",
                            format!("Only one {name:?} block is allowed."),
                        ));
                    }
                    match matching.first() {
                        Some(block) => {
                            let (val, block_diags) = spec.decode(&block.body, env);
                            diags.extend(block_diags);
                            val
                        }
                        None => Value::Null,
                    }
                }
                Nesting::List => {
                    let mut items = Vec::new();
                    for block in &matching {
                        let (val, block_diags) = spec.decode(&block.body, env);
                        diags.extend(block_diags);
                        items.push(val);
                    }
                    Value::List(items)
                }
                Nesting::Map => {
                    let mut entries = BTreeMap::new();
                    for block in &matching {
                        let Some(label) = block.labels.first() else {
                            diags.push(Diagnostic::error(
                                "Missing block label",
                                format!("A {name:?} block requires one label."),
                            ));
                            continue;
                        };
                        let (val, block_diags) = spec.decode(&block.body, env);
                        diags.extend(block_diags);
                        entries.insert(label.clone(), val);
                    }
                    Value::Object(entries)
                }
            };
            fields.insert(name.clone(), val);
        }

        for block in &body.blocks {
            if !self.schema.block_types.contains_key(&block.type_name) {
                diags.push(Diagnostic::error(
                    "Unsupported block type",
                    format!("Blocks of type {:?} are not expected here.", block.type_name),
                ));
            }
        }

        (Value::Object(fields), diags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::functions::Registry;
    use std::collections::HashMap;
    use std::path::Path;

    fn empty_env(reg: &Registry) -> EvalEnv<'_> {
        EvalEnv::new(HashMap::new(), reg)
    }

    fn server_schema() -> Schema {
        Schema::new()
            .attribute("name", Type::String, true)
            .attribute("port", Type::Number, false)
    }

    #[test]
    fn implied_type_includes_blocks() {
        let schema = Schema::new()
            .attribute("region", Type::String, true)
            .block_type("server", Nesting::List, server_schema());
        let ty = schema.decoder_spec().implied_type();
        let Type::Object(fields) = ty else {
            panic!("implied type must be an object");
        };
        assert_eq!(fields.get("region"), Some(&Type::String));
        assert!(matches!(fields.get("server"), Some(Type::List(_))));
    }

    #[test]
    fn missing_required_attribute_decodes_to_null_leaf() {
        let reg = Registry::build(Path::new("."), false);
        let env = empty_env(&reg);
        let schema = server_schema();
        let (val, diags) = schema.decoder_spec().decode(&Body::new(), &env);
        assert!(diags.has_errors());
        let Value::Object(fields) = val else {
            panic!("decode must produce an object");
        };
        assert_eq!(fields.get("name"), Some(&Value::Null));
        assert_eq!(fields.get("port"), Some(&Value::Null));
    }

    #[test]
    fn unsupported_attribute_is_flagged() {
        let reg = Registry::build(Path::new("."), false);
        let env = empty_env(&reg);
        let schema = Schema::new();
        let body = Body::new().attr("bogus", Expr::string("x"));
        let (_, diags) = schema.decoder_spec().decode(&body, &env);
        assert!(diags.has_errors());
    }

    #[test]
    fn map_nesting_keys_by_label() {
        let reg = Registry::build(Path::new("."), false);
        let env = empty_env(&reg);
        let schema = Schema::new().block_type(
            "endpoint",
            Nesting::Map,
            Schema::new().attribute("path", Type::String, true),
        );
        let body = Body::new()
            .block(
                Block::new("endpoint")
                    .label("health")
                    .body(Body::new().attr("path", Expr::string("/healthz"))),
            )
            .block(
                Block::new("endpoint")
                    .label("metrics")
                    .body(Body::new().attr("path", Expr::string("/metrics"))),
            );
        let (val, diags) = schema.decoder_spec().decode(&body, &env);
        assert!(!diags.has_errors());
        let Value::Object(fields) = val else {
            panic!("decode must produce an object");
        };
        let Some(Value::Object(endpoints)) = fields.get("endpoint") else {
            panic!("endpoint must decode to a map");
        };
        assert_eq!(endpoints.len(), 2);
        assert!(endpoints.contains_key("health"));
    }
}
