use crate::diags::{Diagnostic, Diagnostics};
use crate::traversal::Traversal;
use crate::value::Value;
use itertools::Itertools;
use std::collections::HashMap;

/// A `Scope` provides values for references that appear within expressions.
///
/// Given a set of traversals, an implementation must produce a map covering
/// at least the root name of each of them. Unknown placeholders stand in for
/// values that cannot be resolved yet (or at all); unresolvable references
/// are reported through the returned diagnostics, never by omitting the map
/// entry. The map may contain additional entries not directly requested,
/// for example when several traversals share a root object that was resolved
/// as a whole. Callers must not rely on those extras.
///
/// An implementation must behave as a pure function for the lifetime of the
/// [`Context`](crate::context::Context) that holds it: two calls with the
/// same traversal set, with no external change in between, must produce
/// equivalent results. Evaluation results are reused across pipeline calls
/// on that assumption.
pub trait Scope: Send + Sync {
    fn ref_values(&self, refs: &[Traversal]) -> (HashMap<String, Value>, Diagnostics);
}

/// Map-backed resolver over a fixed table of root values.
///
/// Suitable for tests and for the CLI harness, where all variables are known
/// up front. Unresolvable roots yield an unknown placeholder plus one error
/// diagnostic per distinct root.
#[derive(Debug, Clone, Default)]
pub struct StaticScope {
    vars: HashMap<String, Value>,
}

impl StaticScope {
    pub fn new(vars: HashMap<String, Value>) -> StaticScope {
        StaticScope { vars }
    }

    /// Build a scope from a JSON object document, one root per key.
    pub fn from_json(doc: &serde_json::Value) -> Option<StaticScope> {
        let map = doc.as_object()?;
        let vars = map
            .iter()
            .map(|(name, val)| (name.clone(), Value::from_json(val)))
            .collect();
        Some(StaticScope { vars })
    }
}

impl Scope for StaticScope {
    fn ref_values(&self, refs: &[Traversal]) -> (HashMap<String, Value>, Diagnostics) {
        let mut vals = HashMap::new();
        let mut diags = Diagnostics::new();
        for trav in refs.iter().unique_by(|t| t.root_name().to_string()) {
            let root = trav.root_name();
            match self.vars.get(root) {
                Some(val) => {
                    vals.insert(root.to_string(), val.clone());
                }
                None => {
                    vals.insert(root.to_string(), Value::unknown_any());
                    diags.push(Diagnostic::error(
                        "Reference to undefined value",
                        format!("There is no value named {root:?} in this scope."),
                    ));
                }
            }
        }
        (vals, diags)
    }
}
