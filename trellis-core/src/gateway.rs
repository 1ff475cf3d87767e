//! Schema gateway
//!
//! Compiled schemas are memoized per schema identity (the address of the
//! shared `Arc<Schema>`). The cache is filled lazily: a miss compiles
//! outside any lock and inserts the result, so two threads racing on the
//! same schema both compute an equivalent value and the last insert wins.
//! Cached entries hold the schema alive, so an address is never reused
//! while its entry exists.

use crate::definition::ParamType;
use crate::error::EndpointError;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use std::sync::Arc;
use trellis_config::Settings;
use trellis_schema::{CompiledSchema, Explanation, HumanizeOptions, Schema, SchemaError};

static CACHE: Lazy<DashMap<usize, CompiledSchema>> = Lazy::new(DashMap::new);

/// Compiled form of `schema`, built on first use.
pub fn compiled(schema: &Arc<Schema>) -> Result<CompiledSchema, SchemaError> {
    let id = Arc::as_ptr(schema) as usize;
    if let Some(hit) = CACHE.get(&id) {
        return Ok(hit.clone());
    }
    let compiled = CompiledSchema::compile_shared(Arc::clone(schema))?;
    CACHE.insert(id, compiled.clone());
    Ok(compiled)
}

pub fn decode(schema: &Arc<Schema>, value: Value) -> Result<Value, SchemaError> {
    Ok(compiled(schema)?.decode(value))
}

pub fn validate(schema: &Arc<Schema>, value: &Value) -> Result<bool, SchemaError> {
    Ok(compiled(schema)?.validate(value))
}

pub fn explain(schema: &Arc<Schema>, value: &Value) -> Result<Option<Explanation>, SchemaError> {
    Ok(compiled(schema)?.explain(value))
}

pub fn encode(schema: &Arc<Schema>, value: Value) -> Result<Value, SchemaError> {
    Ok(compiled(schema)?.encode(value))
}

/// Human descriptions, spell-checked when enabled in settings.
pub fn humanize(explanation: &Explanation) -> Value {
    trellis_schema::humanize(
        explanation,
        HumanizeOptions {
            spell_check: Settings::global().spell_check,
        },
    )
}

/// Decode a parameter group and validate the result.
///
/// A missing group is treated as an empty mapping.
pub fn decode_and_validate_params(
    param_type: ParamType,
    schema: &CompiledSchema,
    raw: Value,
) -> Result<Value, EndpointError> {
    let raw = match raw {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    let decoded = schema.decode(raw);
    match schema.explain(&decoded) {
        None => Ok(decoded),
        Some(explanation) => Err(EndpointError::ParamValidation {
            param_type,
            human_descriptions: humanize(&explanation),
            field_errors: explanation.errors,
        }),
    }
}

/// Validate a response when `validate` is set and always encode it.
pub fn validate_and_encode_response(
    schema: &CompiledSchema,
    value: Value,
    validate: bool,
) -> Result<Value, EndpointError> {
    if validate {
        if let Some(explanation) = schema.explain(&value) {
            return Err(EndpointError::ResponseValidation {
                human_descriptions: humanize(&explanation),
                field_errors: explanation.errors,
            });
        }
    }
    Ok(schema.encode(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_schema::entry;

    fn user_schema() -> CompiledSchema {
        CompiledSchema::compile(&Schema::closed_map([
            entry("id", Schema::positive_int()),
            entry("name", Schema::non_blank_string()),
        ]))
        .unwrap()
    }

    #[test]
    fn test_cache_is_keyed_by_identity() {
        let schema = Arc::new(Schema::int());
        let twin = Arc::new(Schema::int());
        let key = |s: &Arc<Schema>| Arc::as_ptr(s) as usize;

        compiled(&schema).unwrap();
        assert!(CACHE.contains_key(&key(&schema)));
        assert!(!CACHE.contains_key(&key(&twin)));

        compiled(&twin).unwrap();
        assert!(CACHE.contains_key(&key(&twin)));
    }

    #[test]
    fn test_invalid_schema_is_not_cached() {
        let schema = Arc::new(Schema::re("("));
        assert!(compiled(&schema).is_err());
        assert!(!CACHE.contains_key(&(Arc::as_ptr(&schema) as usize)));
        assert!(decode(&schema, json!("x")).is_err());
    }

    #[test]
    fn test_missing_params_are_an_empty_mapping() {
        let schema = CompiledSchema::compile(&Schema::map([
            entry("page", Schema::int()).with_default(1),
        ]))
        .unwrap();
        let decoded = decode_and_validate_params(ParamType::Query, &schema, Value::Null).unwrap();
        assert_eq!(decoded, json!({"page": 1}));
    }

    #[test]
    fn test_decode_and_validate_is_idempotent() {
        let schema = user_schema();
        let once =
            decode_and_validate_params(ParamType::Route, &schema, json!({"id": "7", "name": "a"}))
                .unwrap();
        let twice = decode_and_validate_params(ParamType::Route, &schema, once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_param_validation_error() {
        let err = decode_and_validate_params(ParamType::Body, &user_schema(), json!({"id": "0"}))
            .unwrap_err();
        match &err {
            EndpointError::ParamValidation {
                param_type,
                field_errors,
                human_descriptions,
            } => {
                assert_eq!(*param_type, ParamType::Body);
                assert_eq!(field_errors.len(), 2);
                assert_eq!(human_descriptions["name"], "missing required key");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_response_validation_can_be_disabled() {
        let schema = user_schema();
        let bad = json!({"id": 0, "secret": "x"});

        assert!(matches!(
            validate_and_encode_response(&schema, bad.clone(), true),
            Err(EndpointError::ResponseValidation { .. })
        ));

        // encoding still drops undeclared keys
        assert_eq!(
            validate_and_encode_response(&schema, bad, false).unwrap(),
            json!({"id": 0})
        );
    }
}
