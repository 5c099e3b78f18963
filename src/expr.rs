use crate::convert::convert;
use crate::diags::{Diagnostic, Diagnostics, SrcRange};
use crate::functions::Registry;
use crate::traversal::Traversal;
use crate::value::{Type, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ephemeral evaluation environment, assembled per pipeline call from the
/// scope's resolved variables plus the context's function table.
pub struct EvalEnv<'a> {
    pub variables: HashMap<String, Value>,
    pub functions: &'a Registry,
}

impl<'a> EvalEnv<'a> {
    pub fn new(variables: HashMap<String, Value>, functions: &'a Registry) -> EvalEnv<'a> {
        EvalEnv {
            variables,
            functions,
        }
    }

    /// Layer extra bindings over this environment. Bindings shadow existing
    /// variables of the same name.
    pub fn child(&self, bindings: &HashMap<String, Value>) -> EvalEnv<'a> {
        let mut variables = self.variables.clone();
        for (name, val) in bindings {
            variables.insert(name.clone(), val.clone());
        }
        EvalEnv {
            variables,
            functions: self.functions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
}

/// One piece of a string template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplatePart {
    Lit(String),
    Interp(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// A constant value.
    Literal(Value),
    /// A symbolic reference, resolved through the scope.
    Ref(Traversal),
    /// A string template with interpolated sub-expressions.
    Template(Vec<TemplatePart>),
    /// A call into the context's function table.
    Call { name: String, args: Vec<Expr> },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// An expression carrying evaluation-time bindings that shadow the
    /// scope's variables. Produced by dynamic-block expansion so generated
    /// blocks see their iterator variable.
    Bound {
        vars: HashMap<String, Value>,
        inner: Box<Expr>,
    },
}

/// An expression handed over by the syntax layer: an AST node plus the
/// source range it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    #[serde(default)]
    pub range: SrcRange,
}

impl Expr {
    pub fn literal(val: Value) -> Expr {
        ExprKind::Literal(val).into()
    }

    pub fn string(text: impl Into<String>) -> Expr {
        Expr::literal(Value::String(text.into()))
    }

    pub fn number(num: f64) -> Expr {
        Expr::literal(Value::Number(num))
    }

    pub fn reference(trav: Traversal) -> Expr {
        ExprKind::Ref(trav).into()
    }

    pub fn template(parts: Vec<TemplatePart>) -> Expr {
        ExprKind::Template(parts).into()
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        ExprKind::Call {
            name: name.into(),
            args,
        }
        .into()
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
        .into()
    }

    pub fn bound(vars: HashMap<String, Value>, inner: Expr) -> Expr {
        ExprKind::Bound {
            vars,
            inner: Box::new(inner),
        }
        .into()
    }

    pub fn with_range(mut self, range: SrcRange) -> Expr {
        self.range = range;
        self
    }

    /// The traversals this expression references, without evaluating it.
    /// This is what the pipelines hand to the scope for resolution.
    pub fn variables(&self) -> Vec<Traversal> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<Traversal>) {
        match &self.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Ref(trav) => out.push(trav.clone()),
            ExprKind::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Interp(expr) = part {
                        expr.collect_variables(out);
                    }
                }
            }
            ExprKind::Call { args, .. } => {
                for arg in args {
                    arg.collect_variables(out);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
            ExprKind::Bound { vars, inner } => {
                let mut inner_vars = Vec::new();
                inner.collect_variables(&mut inner_vars);
                inner_vars.retain(|trav| !vars.contains_key(trav.root_name()));
                out.extend(inner_vars);
            }
        }
    }

    /// Evaluate the expression in `env`, best effort. Errors are reported
    /// as diagnostics beside an unknown placeholder, never by aborting.
    pub fn value(&self, env: &EvalEnv<'_>) -> (Value, Diagnostics) {
        let mut diags = Diagnostics::new();
        let val = self.eval(env, &mut diags);
        (val, diags)
    }

    fn eval(&self, env: &EvalEnv<'_>, diags: &mut Diagnostics) -> Value {
        match &self.kind {
            ExprKind::Literal(val) => val.clone(),

            ExprKind::Ref(trav) => {
                let Some(root) = env.variables.get(trav.root_name()) else {
                    diags.push(
                        Diagnostic::error(
                            "Reference to undefined value",
                            format!("There is no value named {:?} in this scope.", trav.root_name()),
                        )
                        .with_subject(self.range),
                    );
                    return Value::unknown_any();
                };
                match trav.apply(root) {
                    Ok(val) => val,
                    Err(err) => {
                        diags.push(
                            Diagnostic::error(
                                "Invalid reference",
                                format!("Cannot resolve {trav}: {err}."),
                            )
                            .with_subject(self.range),
                        );
                        Value::unknown_any()
                    }
                }
            }

            ExprKind::Template(parts) => self.eval_template(parts, env, diags),

            ExprKind::Call { name, args } => {
                let arg_vals: Vec<Value> =
                    args.iter().map(|arg| arg.eval(env, diags)).collect();
                match env.functions.call(name, &arg_vals) {
                    Ok(val) => val,
                    Err(err) => {
                        diags.push(
                            Diagnostic::error("Error in function call", format!("{err}."))
                                .with_subject(self.range),
                        );
                        Value::unknown_any()
                    }
                }
            }

            ExprKind::Binary { op, lhs, rhs } => {
                let lhs_val = lhs.eval(env, diags);
                let rhs_val = rhs.eval(env, diags);
                self.eval_binary(*op, lhs_val, rhs_val, diags)
            }

            ExprKind::Bound { vars, inner } => {
                let child = env.child(vars);
                inner.eval(&child, diags)
            }
        }
    }

    fn eval_template(
        &self,
        parts: &[TemplatePart],
        env: &EvalEnv<'_>,
        diags: &mut Diagnostics,
    ) -> Value {
        let mut out = String::new();
        let mut unknown = false;
        for part in parts {
            match part {
                TemplatePart::Lit(text) => out.push_str(text),
                TemplatePart::Interp(expr) => {
                    let val = expr.eval(env, diags);
                    if val.is_unknown() {
                        unknown = true;
                        continue;
                    }
                    if val.is_null() {
                        diags.push(
                            Diagnostic::error(
                                "Invalid template interpolation value",
                                "Cannot include a null value in a string template.",
                            )
                            .with_subject(expr.range),
                        );
                        continue;
                    }
                    match convert(val, &Type::String) {
                        Ok(Value::String(text)) => out.push_str(&text),
                        Ok(_) | Err(_) => {
                            diags.push(
                                Diagnostic::error(
                                    "Invalid template interpolation value",
                                    "The interpolated value cannot be rendered as a string.",
                                )
                                .with_subject(expr.range),
                            );
                        }
                    }
                }
            }
        }
        if unknown {
            Value::Unknown(Type::String)
        } else {
            Value::String(out)
        }
    }

    fn eval_binary(
        &self,
        op: BinOp,
        lhs: Value,
        rhs: Value,
        diags: &mut Diagnostics,
    ) -> Value {
        match op {
            BinOp::Eq | BinOp::NotEq => {
                if lhs.is_unknown() || rhs.is_unknown() {
                    return Value::Unknown(Type::Bool);
                }
                let equal = lhs == rhs;
                Value::Bool(if op == BinOp::Eq { equal } else { !equal })
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                let lhs_num = self.numeric_operand(lhs, diags);
                let rhs_num = self.numeric_operand(rhs, diags);
                let (Some(a), Some(b)) = (lhs_num, rhs_num) else {
                    // An operand was unknown or invalid; either way the
                    // result is an unknown number.
                    return Value::Unknown(Type::Number);
                };
                match op {
                    BinOp::Add => Value::Number(a + b),
                    BinOp::Sub => Value::Number(a - b),
                    BinOp::Mul => Value::Number(a * b),
                    BinOp::Div => {
                        if b == 0.0 {
                            diags.push(
                                Diagnostic::error("Division by zero", "Cannot divide by zero.")
                                    .with_subject(self.range),
                            );
                            Value::Unknown(Type::Number)
                        } else {
                            Value::Number(a / b)
                        }
                    }
                    BinOp::Eq | BinOp::NotEq => unreachable!(),
                }
            }
        }
    }

    fn numeric_operand(&self, val: Value, diags: &mut Diagnostics) -> Option<f64> {
        match convert(val, &Type::Number) {
            Ok(Value::Number(num)) => Some(num),
            Ok(Value::Null) => {
                diags.push(
                    Diagnostic::error("Invalid operand", "Arithmetic on a null value.")
                        .with_subject(self.range),
                );
                None
            }
            Ok(_) => None, // unknown operand
            Err(err) => {
                diags.push(
                    Diagnostic::error("Invalid operand", format!("{err}."))
                        .with_subject(self.range),
                );
                None
            }
        }
    }
}

impl From<ExprKind> for Expr {
    fn from(kind: ExprKind) -> Expr {
        Expr {
            kind,
            range: SrcRange::default(),
        }
    }
}
