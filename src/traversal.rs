use crate::value::{Type, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One step of a reference path: attribute access or list indexing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TravStep {
    Attr(String),
    Index(usize),
}

/// A symbolic reference path appearing in an expression, e.g.
/// `var.foo.bar[0]`. Traversals are what the evaluation pipelines extract
/// from expressions and hand to a [`Scope`](crate::scope::Scope) for
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Traversal {
    pub root: String,
    pub steps: Vec<TravStep>,
}

#[derive(Debug, Error)]
#[error("invalid reference syntax: {0}")]
pub struct RefParseError(String);

/// Failure while walking a traversal into a concrete value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TraverseError {
    #[error("object has no attribute {0:?}")]
    NoAttr(String),

    #[error("index {0} is out of range")]
    IndexOutOfRange(usize),

    #[error("cannot descend into a value of type {0}")]
    NotTraversable(Type),

    #[error("attempt to traverse a null value")]
    NullValue,
}

impl Traversal {
    pub fn root(name: impl Into<String>) -> Traversal {
        Traversal {
            root: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>) -> Traversal {
        self.steps.push(TravStep::Attr(name.into()));
        self
    }

    pub fn index(mut self, idx: usize) -> Traversal {
        self.steps.push(TravStep::Index(idx));
        self
    }

    /// Root symbol of the path. Scope result maps are keyed by this name.
    pub fn root_name(&self) -> &str {
        &self.root
    }

    /// Parse the dotted/indexed reference syntax, e.g. `var.foo.bar[0]`.
    pub fn parse(input: &str) -> Result<Traversal, RefParseError> {
        let mut p = RefParser { s: input, i: 0 };
        let root = p.parse_identifier()?;
        let mut trav = Traversal::root(root);
        while !p.eof() {
            if p.consume_char('.') {
                trav.steps.push(TravStep::Attr(p.parse_identifier()?));
                continue;
            }
            if p.consume_char('[') {
                let idx = p.parse_index()?;
                p.expect(']')?;
                trav.steps.push(TravStep::Index(idx));
                continue;
            }
            return Err(RefParseError(format!(
                "unexpected character at offset {}",
                p.i
            )));
        }
        Ok(trav)
    }

    /// Walk this traversal's steps into `root`, which must be the value the
    /// root name resolved to. Stepping into an unknown value yields an
    /// unknown result rather than an error.
    pub fn apply(&self, root: &Value) -> Result<Value, TraverseError> {
        let mut current = root;
        for step in &self.steps {
            if current.is_unknown() {
                return Ok(Value::Unknown(Type::Any));
            }
            current = match (step, current) {
                (TravStep::Attr(name), Value::Object(attrs)) => attrs
                    .get(name)
                    .ok_or_else(|| TraverseError::NoAttr(name.clone()))?,
                (TravStep::Index(idx), Value::List(items)) => items
                    .get(*idx)
                    .ok_or(TraverseError::IndexOutOfRange(*idx))?,
                (_, Value::Null) => return Err(TraverseError::NullValue),
                (_, other) => return Err(TraverseError::NotTraversable(other.type_of())),
            };
        }
        Ok(current.clone())
    }
}

impl fmt::Display for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for step in &self.steps {
            match step {
                TravStep::Attr(name) => write!(f, ".{name}")?,
                TravStep::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

struct RefParser<'a> {
    s: &'a str,
    i: usize,
}

impl<'a> RefParser<'a> {
    fn parse_identifier(&mut self) -> Result<String, RefParseError> {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if c == '_' || c == '-' || c.is_ascii_alphanumeric() {
                self.i += 1;
            } else {
                break;
            }
        }
        if self.i == start {
            return Err(RefParseError("identifier expected".into()));
        }
        Ok(self.s[start..self.i].to_string())
    }

    fn parse_index(&mut self) -> Result<usize, RefParseError> {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.i += 1;
            } else {
                break;
            }
        }
        if self.i == start {
            return Err(RefParseError("index expected".into()));
        }
        self.s[start..self.i]
            .parse::<usize>()
            .map_err(|_| RefParseError("bad index".into()))
    }

    fn expect(&mut self, c: char) -> Result<(), RefParseError> {
        if self.consume_char(c) {
            Ok(())
        } else {
            Err(RefParseError(format!("expected '{c}'")))
        }
    }

    fn consume_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.i += 1;
            true
        } else {
            false
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }

    fn eof(&self) -> bool {
        self.i >= self.s.len()
    }
}
