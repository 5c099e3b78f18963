use crate::decode::Spec;
use crate::value::Type;
use std::collections::BTreeMap;

/// Schema for one attribute of a block.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrSchema {
    pub ty: Type,
    pub required: bool,
}

/// How repeated nested blocks of one type map into the decoded object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nesting {
    /// At most one block; decodes to the nested object or null.
    Single,
    /// Any number of blocks; decodes to a list of nested objects.
    List,
    /// Any number of single-labeled blocks; decodes to a map keyed by label.
    Map,
}

/// Schema for nested blocks of one type.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedBlock {
    pub nesting: Nesting,
    pub schema: Schema,
}

/// Schema of a block body: its attributes and the nested block types it
/// accepts. Produced by the syntax layer; this crate only consumes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub attributes: BTreeMap<String, AttrSchema>,
    pub block_types: BTreeMap<String, NestedBlock>,
}

impl Schema {
    pub fn new() -> Schema {
        Schema::default()
    }

    pub fn attribute(mut self, name: impl Into<String>, ty: Type, required: bool) -> Schema {
        self.attributes
            .insert(name.into(), AttrSchema { ty, required });
        self
    }

    pub fn block_type(
        mut self,
        name: impl Into<String>,
        nesting: Nesting,
        schema: Schema,
    ) -> Schema {
        self.block_types
            .insert(name.into(), NestedBlock { nesting, schema });
        self
    }

    /// Derive the decoding specification used by the evaluation pipelines.
    pub fn decoder_spec(&self) -> Spec<'_> {
        Spec::new(self)
    }
}
