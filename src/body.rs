use crate::expr::Expr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The contents of a configuration block as handed over by the syntax
/// layer: named attribute expressions plus nested blocks, unvalidated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    #[serde(default)]
    pub attributes: BTreeMap<String, Expr>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

/// A nested block: a type name, optional labels, and a child body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub type_name: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub body: Body,
}

impl Body {
    pub fn new() -> Body {
        Body::default()
    }

    pub fn attr(mut self, name: impl Into<String>, expr: Expr) -> Body {
        self.attributes.insert(name.into(), expr);
        self
    }

    pub fn block(mut self, block: Block) -> Body {
        self.blocks.push(block);
        self
    }
}

impl Block {
    pub fn new(type_name: impl Into<String>) -> Block {
        Block {
            type_name: type_name.into(),
            labels: Vec::new(),
            body: Body::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Block {
        self.labels.push(label.into());
        self
    }

    pub fn body(mut self, body: Body) -> Block {
        self.body = body;
        self
    }
}
