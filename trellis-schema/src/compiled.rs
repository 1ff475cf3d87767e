// Compiled schemas
//
// Compilation checks the schema once and precomputes regexes and key
// indexes, so decoding, validation and encoding are cheap per call.

use crate::{Explanation, Schema, SchemaError};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) enum Node {
    Any,
    Nil,
    Boolean,
    Int { min: Option<i64>, max: Option<i64> },
    Double { min: Option<f64>, max: Option<f64> },
    Str { min_len: Option<usize>, max_len: Option<usize> },
    NonBlank,
    Uuid,
    Email,
    Re { regex: Regex, pattern: String },
    Enum(Vec<Value>),
    Maybe(Box<Node>),
    Seq(Box<Node>),
    Map {
        entries: Vec<NodeEntry>,
        index: HashMap<String, usize>,
        closed: bool,
    },
    MapOf(Box<Node>),
    And(Vec<Node>),
    Or(Vec<Node>),
}

pub(crate) struct NodeEntry {
    pub key: String,
    pub optional: bool,
    pub default: Option<Value>,
    pub node: Node,
}

impl Node {
    fn compile(schema: &Schema) -> Result<Node, SchemaError> {
        Ok(match schema {
            Schema::Any => Node::Any,
            Schema::Nil => Node::Nil,
            Schema::Boolean => Node::Boolean,
            Schema::Int { min, max } => Node::Int {
                min: *min,
                max: *max,
            },
            Schema::Double { min, max } => Node::Double {
                min: *min,
                max: *max,
            },
            Schema::String { min_len, max_len } => Node::Str {
                min_len: *min_len,
                max_len: *max_len,
            },
            Schema::NonBlankString => Node::NonBlank,
            Schema::Uuid => Node::Uuid,
            Schema::Email => Node::Email,
            Schema::Re { pattern } => Node::Re {
                regex: Regex::new(pattern).map_err(|source| SchemaError::InvalidPattern {
                    path: "$".to_string(),
                    pattern: pattern.clone(),
                    source,
                })?,
                pattern: pattern.clone(),
            },
            Schema::Enum { values } => Node::Enum(values.clone()),
            Schema::Maybe { schema } => Node::Maybe(Box::new(Node::compile(schema)?)),
            Schema::Sequential { items } => Node::Seq(Box::new(Node::compile(items)?)),
            Schema::Map { entries, closed } => {
                let entries = entries
                    .iter()
                    .map(|e| {
                        Ok(NodeEntry {
                            key: e.key.clone(),
                            optional: e.optional,
                            default: e.default.clone(),
                            node: Node::compile(&e.schema)?,
                        })
                    })
                    .collect::<Result<Vec<_>, SchemaError>>()?;
                let index = entries
                    .iter()
                    .enumerate()
                    .map(|(i, e)| (e.key.clone(), i))
                    .collect();
                Node::Map {
                    entries,
                    index,
                    closed: *closed,
                }
            }
            Schema::MapOf { values } => Node::MapOf(Box::new(Node::compile(values)?)),
            Schema::And { schemas } => {
                Node::And(schemas.iter().map(Node::compile).collect::<Result<_, _>>()?)
            }
            Schema::Or { schemas } => {
                Node::Or(schemas.iter().map(Node::compile).collect::<Result<_, _>>()?)
            }
        })
    }
}

/// A checked, precompiled schema.
///
/// Cloning is cheap; the compiled tree is shared.
#[derive(Clone)]
pub struct CompiledSchema {
    schema: Arc<Schema>,
    root: Arc<Node>,
}

impl CompiledSchema {
    /// Check and compile a schema.
    pub fn compile(schema: &Schema) -> Result<Self, SchemaError> {
        Self::compile_shared(Arc::new(schema.clone()))
    }

    pub fn compile_shared(schema: Arc<Schema>) -> Result<Self, SchemaError> {
        schema.check()?;
        let root = Arc::new(Node::compile(&schema)?);
        Ok(Self { schema, root })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Coerce a value towards the schema (string parsing, defaults, wrapping).
    pub fn decode(&self, value: Value) -> Value {
        self.root.decode(value)
    }

    pub fn validate(&self, value: &Value) -> bool {
        self.root.is_valid(value)
    }

    /// `None` when the value is valid.
    pub fn explain(&self, value: &Value) -> Option<Explanation> {
        let mut errors = Vec::new();
        self.root.explain(value, &mut Vec::new(), &mut errors);
        if errors.is_empty() {
            None
        } else {
            Some(Explanation {
                value: value.clone(),
                errors,
            })
        }
    }

    /// Project a value onto the schema's shape. Independent of validation.
    pub fn encode(&self, value: Value) -> Value {
        self.root.encode(value)
    }
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("schema", &self.schema)
            .finish()
    }
}
