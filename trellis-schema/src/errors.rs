// Schema errors and value explanations

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// A schema that is not well formed.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("invalid regex {pattern:?} at {path}: {source}")]
    InvalidPattern {
        path: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid bounds at {path}: {message}")]
    InvalidBounds { path: String, message: String },

    #[error("duplicate key {key:?} in map at {path}")]
    DuplicateKey { path: String, key: String },

    #[error("{kind} at {path} needs at least one member")]
    Empty { path: String, kind: &'static str },

    #[error("default for key {key:?} in map at {path} does not satisfy its schema: {message}")]
    InvalidDefault {
        path: String,
        key: String,
        message: String,
    },
}

/// One step into a JSON value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, ".{}", key),
            PathSegment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// Why a value failed its schema
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    MissingKey,
    ExtraKey,
    InvalidType { expected: &'static str },
    TooSmall { min: String },
    TooLarge { max: String },
    TooShort { min: usize },
    TooLong { max: usize },
    Blank,
    PatternMismatch { pattern: String },
    NotInEnum { values: Vec<Value> },
    InvalidUuid,
    InvalidEmail,
    NoMatchingBranch,
}

impl ErrorKind {
    /// Human sentence for this error
    pub fn describe(&self) -> String {
        match self {
            ErrorKind::MissingKey => "missing required key".to_string(),
            ErrorKind::ExtraKey => "disallowed key".to_string(),
            ErrorKind::InvalidType { expected } => format!("should be {}", expected),
            ErrorKind::TooSmall { min } => format!("should be at least {}", min),
            ErrorKind::TooLarge { max } => format!("should be at most {}", max),
            ErrorKind::TooShort { min } => {
                format!("should be at least {} characters", min)
            }
            ErrorKind::TooLong { max } => format!("should be at most {} characters", max),
            ErrorKind::Blank => "should be a non-blank string".to_string(),
            ErrorKind::PatternMismatch { pattern } => {
                format!("should match regex {}", pattern)
            }
            ErrorKind::NotInEnum { values } => {
                let rendered: Vec<String> = values.iter().map(Value::to_string).collect();
                format!("should be one of: {}", rendered.join(", "))
            }
            ErrorKind::InvalidUuid => "should be a valid UUID".to_string(),
            ErrorKind::InvalidEmail => "should be a valid email address".to_string(),
            ErrorKind::NoMatchingBranch => "should match one of the allowed shapes".to_string(),
        }
    }
}

/// A single failure found while explaining a value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueError {
    pub path: Vec<PathSegment>,
    #[serde(flatten)]
    pub kind: ErrorKind,
    /// Schema kind that rejected the value
    pub schema: &'static str,
    pub value: Value,
}

impl ValueError {
    /// Dotted path such as `$.address.zip`
    pub fn path_string(&self) -> String {
        let mut out = String::from("$");
        for segment in &self.path {
            out.push_str(&segment.to_string());
        }
        out
    }

    /// First path key, the "field" a parameter error belongs to
    pub fn field(&self) -> Option<&str> {
        match self.path.first() {
            Some(PathSegment::Key(key)) => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path_string(), self.kind.describe())
    }
}

/// Structured result of explaining an invalid value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub value: Value,
    pub errors: Vec<ValueError>,
}

impl Explanation {
    pub fn errors_for_field(&self, field: &str) -> Vec<&ValueError> {
        self.errors
            .iter()
            .filter(|e| e.field() == Some(field))
            .collect()
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_error_display() {
        let error = ValueError {
            path: vec![PathSegment::Key("items".into()), PathSegment::Index(2)],
            kind: ErrorKind::InvalidType {
                expected: "an integer",
            },
            schema: "int",
            value: json!("x"),
        };
        assert_eq!(error.to_string(), "$.items[2]: should be an integer");
        assert_eq!(error.field(), Some("items"));
    }

    #[test]
    fn test_value_error_serializes_flat() {
        let error = ValueError {
            path: vec![PathSegment::Key("name".into())],
            kind: ErrorKind::MissingKey,
            schema: "map",
            value: Value::Null,
        };
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"path": ["name"], "kind": "missing_key", "schema": "map", "value": null})
        );
    }
}
