// Error types for the Trellis engine

use crate::definition::ParamType;
use serde_json::{Value, json};
use thiserror::Error;
use trellis_schema::{SchemaError, ValueError};

/// Load-time and registration-time failures.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Definition parse error: {0}")]
    DefinitionParse(#[from] DefinitionParseError),

    #[error("Schema compile error in {context}: {source}")]
    SchemaCompile {
        context: String,
        #[source]
        source: SchemaError,
    },

    #[error("Unknown HTTP method: {0}")]
    UnknownMethod(String),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A definition whose tokens do not follow the endpoint grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expected {expected} at token {position}, found {found}\n  {definition}")]
pub struct DefinitionParseError {
    /// Index of the offending token.
    pub position: usize,
    pub expected: String,
    pub found: String,
    /// The definition rendered with the offending token marked.
    pub definition: String,
}

/// Per-request failures, delivered through `raise`.
#[derive(Error, Debug, Clone)]
pub enum EndpointError {
    #[error("Invalid {param_type} parameters: {}", summarize(.field_errors))]
    ParamValidation {
        param_type: ParamType,
        field_errors: Vec<ValueError>,
        human_descriptions: Value,
    },

    #[error("Invalid response: {}", summarize(.field_errors))]
    ResponseValidation {
        field_errors: Vec<ValueError>,
        human_descriptions: Value,
    },

    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Expected between {min} and {max} arguments, got {actual}")]
    Arity { min: usize, max: usize, actual: usize },

    #[error("Invalid multipart body: {0}")]
    Multipart(String),

    #[error("Endpoint panicked: {0}")]
    Panicked(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn summarize(errors: &[ValueError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl EndpointError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        EndpointError::Status {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::status(400, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::status(401, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::status(403, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(404, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::status(409, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::status(422, message)
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            EndpointError::ParamValidation { .. } => 400,
            EndpointError::ResponseValidation { .. } => 400,
            EndpointError::Status { status, .. } => *status,
            EndpointError::Multipart(_) => 400,
            EndpointError::Arity { .. } => 500,
            EndpointError::Panicked(_) => 500,
            EndpointError::Internal(_) => 500,
        }
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            EndpointError::ParamValidation { .. } => "param_validation",
            EndpointError::ResponseValidation { .. } => "response_validation",
            EndpointError::Status { .. } => "status",
            EndpointError::Arity { .. } => "arity",
            EndpointError::Multipart(_) => "multipart",
            EndpointError::Panicked(_) => "panicked",
            EndpointError::Internal(_) => "internal",
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Client-facing error body.
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "status": self.status_code(),
            "error": self.kind(),
            "message": self.to_string(),
        });
        match self {
            EndpointError::ParamValidation {
                param_type,
                field_errors,
                human_descriptions,
            } => {
                body["param_type"] = json!(param_type);
                body["field_errors"] = json!(field_errors);
                body["human_descriptions"] = human_descriptions.clone();
            }
            EndpointError::ResponseValidation {
                field_errors,
                human_descriptions,
            } => {
                body["field_errors"] = json!(field_errors);
                body["human_descriptions"] = human_descriptions.clone();
            }
            _ => {}
        }
        body
    }
}
