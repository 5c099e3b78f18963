use crate::body::Body;
use crate::convert::convert;
use crate::diags::{Diagnostic, Diagnostics};
use crate::dynblock;
use crate::expr::{EvalEnv, Expr};
use crate::functions::Registry;
use crate::schema::Schema;
use crate::scope::Scope;
use crate::traversal::Traversal;
use crate::value::{Type, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

/// The main type in this crate, allowing dynamic evaluation of blocks and
/// expressions based on contextual information that informs which variables
/// and functions will be available.
///
/// A context is built once around a [`Scope`] and reused for any number of
/// evaluations, concurrently if desired. Its function table is built lazily
/// on first use and cached for the context's lifetime.
pub struct Context {
    scope: Arc<dyn Scope>,

    /// Base directory for interpolation functions that accept filesystem
    /// paths as arguments.
    base_dir: PathBuf,

    /// When set, non-pure functions produce unknown results rather than
    /// executing, so speculative evaluation is safe to repeat.
    pure_only: bool,

    functions: OnceLock<Registry>,
}

impl Context {
    pub fn new(scope: Arc<dyn Scope>) -> Context {
        Context {
            scope,
            base_dir: PathBuf::from("."),
            pure_only: false,
            functions: OnceLock::new(),
        }
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Context {
        self.base_dir = base_dir.into();
        self
    }

    pub fn with_pure_only(mut self, pure_only: bool) -> Context {
        self.pure_only = pure_only;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn is_pure_only(&self) -> bool {
        self.pure_only
    }

    /// The context's function table, built on first access and cached.
    /// Concurrent first-time callers all observe the same table; the build
    /// runs at most once per context.
    pub fn functions(&self) -> &Registry {
        self.functions
            .get_or_init(|| Registry::build(&self.base_dir, self.pure_only))
    }

    /// Resolve `refs` through the scope and assemble the evaluation
    /// environment every pipeline evaluates in.
    fn eval_env(&self, refs: &[Traversal]) -> (EvalEnv<'_>, Diagnostics) {
        trace!(refs = refs.len(), "resolving references");
        let (variables, diags) = self.scope.ref_values(refs);
        (EvalEnv::new(variables, self.functions()), diags)
    }

    /// Expand any dynamic blocks present in `body`. The result is a body
    /// with those blocks expanded, ready to be evaluated with
    /// [`Context::eval_block`].
    ///
    /// If the returned diagnostics contain errors then the result may be
    /// incomplete or invalid, but it is always usable.
    pub fn expand_block(&self, body: &Body, schema: &Schema) -> (Body, Diagnostics) {
        let spec = schema.decoder_spec();
        let refs = dynblock::for_each_variables(body, spec);
        let (env, mut diags) = self.eval_env(&refs);
        let (expanded, expand_diags) = dynblock::expand(body, &env);
        diags.extend(expand_diags);
        (expanded, diags)
    }

    /// Evaluate `body` against `schema` and return an object value
    /// representing its contents. The type of the result is the implied
    /// object type of the schema, regardless of errors.
    ///
    /// This method does not expand dynamic blocks within the body. If that
    /// is desired, first call [`Context::expand_block`] and pass the
    /// expanded body here.
    pub fn eval_block(&self, body: &Body, schema: &Schema) -> (Value, Diagnostics) {
        let spec = schema.decoder_spec();
        let refs = spec.variables(body);
        let (env, mut diags) = self.eval_env(&refs);
        let (val, decode_diags) = spec.decode(body, &env);
        diags.extend(decode_diags);
        (val, diags)
    }

    /// Evaluate a single expression and convert the result to `want`.
    ///
    /// Pass [`Type::Any`] to skip conversion and obtain the raw value. On
    /// conversion failure the result is an unknown value of exactly `want`
    /// beside one error diagnostic, so callers may rely on the result's
    /// type matching the request even when the diagnostics contain errors.
    pub fn eval_expr(&self, expr: &Expr, want: &Type) -> (Value, Diagnostics) {
        let refs = expr.variables();
        let (env, mut diags) = self.eval_env(&refs);
        let (mut val, eval_diags) = expr.value(&env);
        diags.extend(eval_diags);

        if !want.is_any() {
            match convert(val, want) {
                Ok(converted) => val = converted,
                Err(err) => {
                    debug!(%err, "expression value failed conversion");
                    val = Value::Unknown(want.clone());
                    diags.push(
                        Diagnostic::error(
                            "Incorrect value type",
                            format!("Invalid expression value: {err}."),
                        )
                        .with_subject(expr.range),
                    );
                }
            }
        }

        (val, diags)
    }
}
