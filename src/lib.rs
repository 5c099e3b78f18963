//! Reference resolution and expression evaluation core for the Stanza
//! configuration language.
//!
//! The syntax layer hands this crate parsed expressions and block bodies
//! together with a schema; the crate resolves the symbolic references they
//! contain through a pluggable [`Scope`], evaluates against the resolved
//! values plus a built-in function table, and returns typed values beside
//! accumulated [`Diagnostics`]. Values may be unknown placeholders during
//! speculative evaluation (e.g. a planning phase), and every pipeline
//! returns a best-effort result rather than aborting on errors.
//!
//! The entry point is [`Context`], with its three operations:
//! [`Context::expand_block`] for dynamic-block expansion,
//! [`Context::eval_block`] for schema-driven block decoding, and
//! [`Context::eval_expr`] for single expressions.

pub mod body;
pub mod context;
pub mod convert;
pub mod decode;
pub mod diags;
pub mod dynblock;
pub mod errors;
pub mod expr;
pub mod functions; // plugin model
pub mod schema;
pub mod scope;
pub mod traversal;
pub mod value;

pub use body::{Block, Body};
pub use context::Context;
pub use convert::convert;
pub use decode::Spec;
pub use diags::{Diagnostic, Diagnostics, Pos, Severity, SrcRange};
pub use expr::{BinOp, EvalEnv, Expr, ExprKind, TemplatePart};
pub use functions::{Function, Registry};
pub use schema::{AttrSchema, NestedBlock, Nesting, Schema};
pub use scope::{Scope, StaticScope};
pub use traversal::{TravStep, Traversal};
pub use value::{Type, Value};
