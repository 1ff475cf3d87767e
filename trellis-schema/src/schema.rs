// Schema values

use crate::SchemaError;
use crate::validators::UUID_PATTERN;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// A structural description of a JSON value.
///
/// Schemas are plain data: they can be built in code with the constructor
/// helpers below or deserialized from JSON/TOML (`{"type": "int", "min": 1}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schema {
    /// Accepts anything.
    Any,
    /// Only `null`.
    Nil,
    Boolean,
    Int {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
    Double {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    String {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_len: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_len: Option<usize>,
    },
    NonBlankString,
    Uuid,
    Email,
    /// A string matching a regular expression (unanchored search).
    Re { pattern: String },
    Enum { values: Vec<Value> },
    /// `null` or the inner schema.
    Maybe { schema: Box<Schema> },
    Sequential { items: Box<Schema> },
    Map {
        entries: Vec<MapEntry>,
        #[serde(default)]
        closed: bool,
    },
    /// A map with arbitrary keys whose values share one schema.
    MapOf { values: Box<Schema> },
    And { schemas: Vec<Schema> },
    Or { schemas: Vec<Schema> },
}

/// One declared key of a map schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub key: String,
    #[serde(default)]
    pub optional: bool,
    pub schema: Schema,
    /// Filled in by the decoder when the key is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Explicit path-segment pattern used when this key is a route placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MapEntry {
    pub fn new(key: impl Into<String>, schema: Schema) -> Self {
        Self {
            key: key.into(),
            optional: false,
            schema,
            default: None,
            route_pattern: None,
            description: None,
        }
    }

    /// Mark the key as optional
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Set the decode-time default (implies optional)
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.optional = true;
        self.default = Some(value.into());
        self
    }

    /// Set an explicit route pattern hint
    pub fn with_route_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.route_pattern = Some(pattern.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Shorthand for [`MapEntry::new`].
pub fn entry(key: impl Into<String>, schema: Schema) -> MapEntry {
    MapEntry::new(key, schema)
}

/// Where a route placeholder's pattern came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteHint {
    /// Declared on the map entry via `route_pattern`.
    Explicit(String),
    /// Derived from the entry's schema type.
    Derived(String),
    Unresolved,
}

impl RouteHint {
    pub fn pattern(&self) -> Option<&str> {
        match self {
            RouteHint::Explicit(p) | RouteHint::Derived(p) => Some(p),
            RouteHint::Unresolved => None,
        }
    }
}

impl Schema {
    pub fn int() -> Self {
        Schema::Int {
            min: None,
            max: None,
        }
    }

    /// Integers greater than zero
    pub fn positive_int() -> Self {
        Schema::Int {
            min: Some(1),
            max: None,
        }
    }

    pub fn double() -> Self {
        Schema::Double {
            min: None,
            max: None,
        }
    }

    pub fn string() -> Self {
        Schema::String {
            min_len: None,
            max_len: None,
        }
    }

    pub fn non_blank_string() -> Self {
        Schema::NonBlankString
    }

    pub fn re(pattern: impl Into<String>) -> Self {
        Schema::Re {
            pattern: pattern.into(),
        }
    }

    pub fn enumeration<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Schema::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn maybe(schema: Schema) -> Self {
        Schema::Maybe {
            schema: Box::new(schema),
        }
    }

    pub fn sequential(items: Schema) -> Self {
        Schema::Sequential {
            items: Box::new(items),
        }
    }

    /// An open map: undeclared keys are allowed and kept.
    pub fn map(entries: impl IntoIterator<Item = MapEntry>) -> Self {
        Schema::Map {
            entries: entries.into_iter().collect(),
            closed: false,
        }
    }

    /// A closed map: undeclared keys fail validation and are dropped by encoding.
    pub fn closed_map(entries: impl IntoIterator<Item = MapEntry>) -> Self {
        Schema::Map {
            entries: entries.into_iter().collect(),
            closed: true,
        }
    }

    pub fn map_of(values: Schema) -> Self {
        Schema::MapOf {
            values: Box::new(values),
        }
    }

    pub fn and(schemas: impl IntoIterator<Item = Schema>) -> Self {
        Schema::And {
            schemas: schemas.into_iter().collect(),
        }
    }

    pub fn or(schemas: impl IntoIterator<Item = Schema>) -> Self {
        Schema::Or {
            schemas: schemas.into_iter().collect(),
        }
    }

    /// Short name of the schema kind, used in explanations
    pub fn kind(&self) -> &'static str {
        match self {
            Schema::Any => "any",
            Schema::Nil => "nil",
            Schema::Boolean => "boolean",
            Schema::Int { .. } => "int",
            Schema::Double { .. } => "double",
            Schema::String { .. } => "string",
            Schema::NonBlankString => "non_blank_string",
            Schema::Uuid => "uuid",
            Schema::Email => "email",
            Schema::Re { .. } => "re",
            Schema::Enum { .. } => "enum",
            Schema::Maybe { .. } => "maybe",
            Schema::Sequential { .. } => "sequential",
            Schema::Map { .. } => "map",
            Schema::MapOf { .. } => "map_of",
            Schema::And { .. } => "and",
            Schema::Or { .. } => "or",
        }
    }

    /// Check that the schema is well formed.
    ///
    /// Every regex must compile, bounds must be ordered, map keys unique,
    /// `enum`/`and`/`or` non-empty, and map defaults must satisfy their own
    /// entry schema.
    pub fn check(&self) -> Result<(), SchemaError> {
        self.check_at("$")
    }

    fn check_at(&self, path: &str) -> Result<(), SchemaError> {
        match self {
            Schema::Int {
                min: Some(min),
                max: Some(max),
            } if min > max => Err(SchemaError::InvalidBounds {
                path: path.to_string(),
                message: format!("min {} is greater than max {}", min, max),
            }),
            Schema::Double {
                min: Some(min),
                max: Some(max),
            } if min > max => Err(SchemaError::InvalidBounds {
                path: path.to_string(),
                message: format!("min {} is greater than max {}", min, max),
            }),
            Schema::String {
                min_len: Some(min),
                max_len: Some(max),
            } if min > max => Err(SchemaError::InvalidBounds {
                path: path.to_string(),
                message: format!("min_len {} is greater than max_len {}", min, max),
            }),
            Schema::Re { pattern } => regex::Regex::new(pattern).map(|_| ()).map_err(|source| {
                SchemaError::InvalidPattern {
                    path: path.to_string(),
                    pattern: pattern.clone(),
                    source,
                }
            }),
            Schema::Enum { values } if values.is_empty() => Err(SchemaError::Empty {
                path: path.to_string(),
                kind: "enum",
            }),
            Schema::And { schemas } | Schema::Or { schemas } => {
                if schemas.is_empty() {
                    return Err(SchemaError::Empty {
                        path: path.to_string(),
                        kind: self.kind(),
                    });
                }
                for (i, schema) in schemas.iter().enumerate() {
                    schema.check_at(&format!("{}[{}]", path, i))?;
                }
                Ok(())
            }
            Schema::Maybe { schema } => schema.check_at(path),
            Schema::Sequential { items } => items.check_at(&format!("{}[]", path)),
            Schema::MapOf { values } => values.check_at(&format!("{}.*", path)),
            Schema::Map { entries, .. } => {
                let mut seen = HashSet::new();
                for entry in entries {
                    let entry_path = format!("{}.{}", path, entry.key);
                    if !seen.insert(entry.key.as_str()) {
                        return Err(SchemaError::DuplicateKey {
                            path: path.to_string(),
                            key: entry.key.clone(),
                        });
                    }
                    entry.schema.check_at(&entry_path)?;
                    if let Some(pattern) = &entry.route_pattern {
                        regex::Regex::new(pattern).map_err(|source| {
                            SchemaError::InvalidPattern {
                                path: entry_path.clone(),
                                pattern: pattern.clone(),
                                source,
                            }
                        })?;
                    }
                    if let Some(default) = &entry.default {
                        let compiled = crate::CompiledSchema::compile(&entry.schema)?;
                        if let Some(explanation) = compiled.explain(default) {
                            return Err(SchemaError::InvalidDefault {
                                path: path.to_string(),
                                key: entry.key.clone(),
                                message: explanation.to_string(),
                            });
                        }
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Find the declared entry for `key`, looking through `and`/`maybe` wrappers.
    pub fn find_entry(&self, key: &str) -> Option<&MapEntry> {
        match self {
            Schema::Map { entries, .. } => entries.iter().find(|e| e.key == key),
            Schema::Maybe { schema } => schema.find_entry(key),
            Schema::And { schemas } => schemas.iter().find_map(|s| s.find_entry(key)),
            _ => None,
        }
    }

    /// Resolve the path pattern for a route placeholder named `key`.
    pub fn route_hint(&self, key: &str) -> RouteHint {
        let Some(entry) = self.find_entry(key) else {
            return RouteHint::Unresolved;
        };
        if let Some(pattern) = &entry.route_pattern {
            return RouteHint::Explicit(pattern.clone());
        }
        entry
            .schema
            .default_route_pattern()
            .map(RouteHint::Derived)
            .unwrap_or(RouteHint::Unresolved)
    }

    /// Default path-segment pattern for values of this schema, if one exists.
    pub fn default_route_pattern(&self) -> Option<String> {
        match self {
            Schema::Int { .. } => Some("[0-9]+".to_string()),
            Schema::Uuid => Some(UUID_PATTERN.to_string()),
            Schema::Re { pattern } => {
                let pattern = pattern.strip_prefix('^').unwrap_or(pattern);
                let pattern = pattern.strip_suffix('$').unwrap_or(pattern);
                Some(pattern.to_string())
            }
            Schema::Enum { values } => {
                let alternatives: Option<Vec<String>> = values
                    .iter()
                    .map(|v| v.as_str().map(regex::escape))
                    .collect();
                alternatives.map(|alts| alts.join("|"))
            }
            Schema::Maybe { schema } => schema.default_route_pattern(),
            Schema::And { schemas } => schemas.iter().find_map(Schema::default_route_pattern),
            _ => None,
        }
    }
}
