//! Structural schemas for Trellis
//!
//! Schemas describe the JSON shape of endpoint parameters and responses.
//! A [`Schema`] is checked and compiled once into a [`CompiledSchema`],
//! which then decodes, validates, explains and encodes values cheaply.
//!
//! # Examples
//!
//! ```
//! use trellis_schema::{CompiledSchema, HumanizeOptions, Schema, entry, humanize};
//! use serde_json::json;
//!
//! let schema = CompiledSchema::compile(&Schema::map([
//!     entry("id", Schema::positive_int()),
//!     entry("name", Schema::non_blank_string()),
//! ]))
//! .unwrap();
//!
//! // query strings arrive as text; decoding parses them
//! let decoded = schema.decode(json!({"id": "42", "name": "Ada"}));
//! assert_eq!(decoded, json!({"id": 42, "name": "Ada"}));
//! assert!(schema.validate(&decoded));
//!
//! let explanation = schema.explain(&json!({"id": 0})).unwrap();
//! assert_eq!(
//!     humanize(&explanation, HumanizeOptions::default()),
//!     json!({"id": "should be at least 1", "name": "missing required key"})
//! );
//! ```

mod compiled;
mod errors;
mod explain;
mod humanize;
mod schema;
mod transform;
pub mod validators;

pub use compiled::CompiledSchema;
pub use errors::*;
pub use humanize::{HumanizeOptions, humanize};
pub use schema::*;
