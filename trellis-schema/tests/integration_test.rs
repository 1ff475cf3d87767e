//! Integration tests for trellis-schema

use serde_json::json;
use trellis_schema::*;

fn user_schema() -> Schema {
    Schema::closed_map([
        entry("id", Schema::positive_int()),
        entry("email", Schema::Email),
        entry("name", Schema::non_blank_string()),
        entry("roles", Schema::sequential(Schema::enumeration(["admin", "viewer"]))).with_default(json!([])),
        entry("manager_id", Schema::maybe(Schema::Uuid)).optional(),
    ])
}

#[test]
fn test_decode_then_validate_form_input() {
    let schema = CompiledSchema::compile(&user_schema()).unwrap();
    let decoded = schema.decode(json!({
        "id": "7",
        "email": "ada@example.com",
        "name": "Ada",
        "roles": "admin"
    }));

    assert_eq!(
        decoded,
        json!({"id": 7, "email": "ada@example.com", "name": "Ada", "roles": ["admin"]})
    );
    assert!(schema.validate(&decoded));
}

#[test]
fn test_explanation_lists_every_failure() {
    let schema = CompiledSchema::compile(&user_schema()).unwrap();
    let explanation = schema
        .explain(&json!({"id": -1, "email": "nope", "roles": ["root"], "nmae": "x"}))
        .unwrap();

    let paths: Vec<String> = explanation.errors.iter().map(|e| e.path_string()).collect();
    assert_eq!(paths, vec!["$.id", "$.email", "$.name", "$.roles[0]", "$.nmae"]);
    assert_eq!(explanation.errors_for_field("roles").len(), 1);
}

#[test]
fn test_humanized_errors_with_spell_checking() {
    let schema = CompiledSchema::compile(&user_schema()).unwrap();
    let explanation = schema
        .explain(&json!({"id": 1, "email": "a@b.co", "nmae": "Ada"}))
        .unwrap();

    assert_eq!(
        humanize(&explanation, HumanizeOptions { spell_check: true }),
        json!({"name": "missing required key", "nmae": "should be spelled name"})
    );
}

#[test]
fn test_encode_is_independent_of_validation() {
    let schema = CompiledSchema::compile(&user_schema()).unwrap();
    // invalid (blank name) but still projected
    let encoded = schema.encode(json!({"id": 1, "name": " ", "password": "hunter2"}));
    assert_eq!(encoded, json!({"id": 1, "name": " "}));
}

#[test]
fn test_schema_roundtrips_through_toml_friendly_json() {
    let schema = user_schema();
    let text = serde_json::to_string(&schema).unwrap();
    let back: Schema = serde_json::from_str(&text).unwrap();
    assert_eq!(back, schema);
}

#[test]
fn test_invalid_schema_is_rejected_at_compile() {
    let err = CompiledSchema::compile(&Schema::map([entry("q", Schema::re("(unclosed"))])).unwrap_err();
    assert!(err.to_string().contains("$.q"));
}
