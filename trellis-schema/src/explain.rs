// Validation and explanation

use crate::compiled::Node;
use crate::validators::{is_email, is_non_blank, is_uuid};
use crate::{ErrorKind, PathSegment, ValueError};
use serde_json::Value;

impl Node {
    fn kind(&self) -> &'static str {
        match self {
            Node::Any => "any",
            Node::Nil => "nil",
            Node::Boolean => "boolean",
            Node::Int { .. } => "int",
            Node::Double { .. } => "double",
            Node::Str { .. } => "string",
            Node::NonBlank => "non_blank_string",
            Node::Uuid => "uuid",
            Node::Email => "email",
            Node::Re { .. } => "re",
            Node::Enum(_) => "enum",
            Node::Maybe(_) => "maybe",
            Node::Seq(_) => "sequential",
            Node::Map { .. } => "map",
            Node::MapOf(_) => "map_of",
            Node::And(_) => "and",
            Node::Or(_) => "or",
        }
    }

    /// Check a scalar, returning the first failure.
    fn check_leaf(&self, value: &Value) -> Option<ErrorKind> {
        match self {
            Node::Any => None,
            Node::Nil => (!value.is_null()).then_some(ErrorKind::InvalidType { expected: "nil" }),
            Node::Boolean => (!value.is_boolean()).then_some(ErrorKind::InvalidType {
                expected: "a boolean",
            }),
            Node::Int { min, max } => match value.as_i64() {
                None => Some(ErrorKind::InvalidType {
                    expected: "an integer",
                }),
                Some(n) if min.is_some_and(|m| n < m) => Some(ErrorKind::TooSmall {
                    min: min.unwrap_or_default().to_string(),
                }),
                Some(n) if max.is_some_and(|m| n > m) => Some(ErrorKind::TooLarge {
                    max: max.unwrap_or_default().to_string(),
                }),
                Some(_) => None,
            },
            Node::Double { min, max } => match value.as_f64() {
                None => Some(ErrorKind::InvalidType {
                    expected: "a number",
                }),
                Some(n) if min.is_some_and(|m| n < m) => Some(ErrorKind::TooSmall {
                    min: min.unwrap_or_default().to_string(),
                }),
                Some(n) if max.is_some_and(|m| n > m) => Some(ErrorKind::TooLarge {
                    max: max.unwrap_or_default().to_string(),
                }),
                Some(_) => None,
            },
            Node::Str { min_len, max_len } => match value.as_str() {
                None => Some(ErrorKind::InvalidType {
                    expected: "a string",
                }),
                Some(s) => {
                    let len = s.chars().count();
                    match (min_len, max_len) {
                        (Some(min), _) if len < *min => Some(ErrorKind::TooShort { min: *min }),
                        (_, Some(max)) if len > *max => Some(ErrorKind::TooLong { max: *max }),
                        _ => None,
                    }
                }
            },
            Node::NonBlank => match value.as_str() {
                None => Some(ErrorKind::InvalidType {
                    expected: "a non-blank string",
                }),
                Some(s) => (!is_non_blank(s)).then_some(ErrorKind::Blank),
            },
            Node::Uuid => match value.as_str() {
                Some(s) if is_uuid(s) => None,
                _ => Some(ErrorKind::InvalidUuid),
            },
            Node::Email => match value.as_str() {
                Some(s) if is_email(s) => None,
                _ => Some(ErrorKind::InvalidEmail),
            },
            Node::Re { regex, pattern } => match value.as_str() {
                Some(s) if regex.is_match(s) => None,
                Some(_) => Some(ErrorKind::PatternMismatch {
                    pattern: pattern.clone(),
                }),
                None => Some(ErrorKind::InvalidType {
                    expected: "a string",
                }),
            },
            Node::Enum(values) => (!values.contains(value)).then(|| ErrorKind::NotInEnum {
                values: values.clone(),
            }),
            _ => None,
        }
    }

    pub(crate) fn is_valid(&self, value: &Value) -> bool {
        match self {
            Node::Maybe(inner) => value.is_null() || inner.is_valid(value),
            Node::Seq(items) => value
                .as_array()
                .is_some_and(|values| values.iter().all(|v| items.is_valid(v))),
            Node::Map {
                entries,
                index,
                closed,
            } => {
                let Some(map) = value.as_object() else {
                    return false;
                };
                let declared_ok = entries.iter().all(|entry| match map.get(&entry.key) {
                    Some(v) => entry.node.is_valid(v),
                    None => entry.optional,
                });
                declared_ok && (!*closed || map.keys().all(|k| index.contains_key(k)))
            }
            Node::MapOf(values) => value
                .as_object()
                .is_some_and(|map| map.values().all(|v| values.is_valid(v))),
            Node::And(nodes) => nodes.iter().all(|n| n.is_valid(value)),
            Node::Or(nodes) => nodes.iter().any(|n| n.is_valid(value)),
            leaf => leaf.check_leaf(value).is_none(),
        }
    }

    pub(crate) fn explain(
        &self,
        value: &Value,
        path: &mut Vec<PathSegment>,
        errors: &mut Vec<ValueError>,
    ) {
        match self {
            Node::Maybe(inner) => {
                if !value.is_null() {
                    inner.explain(value, path, errors);
                }
            }
            Node::Seq(items) => match value.as_array() {
                Some(values) => {
                    for (i, v) in values.iter().enumerate() {
                        path.push(PathSegment::Index(i));
                        items.explain(v, path, errors);
                        path.pop();
                    }
                }
                None => errors.push(self.error(path, value, ErrorKind::InvalidType {
                    expected: "a sequence",
                })),
            },
            Node::Map {
                entries,
                index,
                closed,
            } => {
                let Some(map) = value.as_object() else {
                    errors.push(self.error(path, value, ErrorKind::InvalidType {
                        expected: "a map",
                    }));
                    return;
                };
                for entry in entries {
                    path.push(PathSegment::Key(entry.key.clone()));
                    match map.get(&entry.key) {
                        Some(v) => entry.node.explain(v, path, errors),
                        None if !entry.optional => {
                            errors.push(self.error(path, &Value::Null, ErrorKind::MissingKey));
                        }
                        None => {}
                    }
                    path.pop();
                }
                if *closed {
                    for (key, v) in map {
                        if !index.contains_key(key) {
                            path.push(PathSegment::Key(key.clone()));
                            errors.push(self.error(path, v, ErrorKind::ExtraKey));
                            path.pop();
                        }
                    }
                }
            }
            Node::MapOf(values) => match value.as_object() {
                Some(map) => {
                    for (key, v) in map {
                        path.push(PathSegment::Key(key.clone()));
                        values.explain(v, path, errors);
                        path.pop();
                    }
                }
                None => errors.push(self.error(path, value, ErrorKind::InvalidType {
                    expected: "a map",
                })),
            },
            Node::And(nodes) => {
                // report the first failing branch only
                for node in nodes {
                    let before = errors.len();
                    node.explain(value, path, errors);
                    if errors.len() > before {
                        return;
                    }
                }
            }
            Node::Or(nodes) => {
                if !nodes.iter().any(|n| n.is_valid(value)) {
                    errors.push(self.error(path, value, ErrorKind::NoMatchingBranch));
                }
            }
            leaf => {
                if let Some(kind) = leaf.check_leaf(value) {
                    errors.push(leaf.error(path, value, kind));
                }
            }
        }
    }

    fn error(&self, path: &[PathSegment], value: &Value, kind: ErrorKind) -> ValueError {
        ValueError {
            path: path.to_vec(),
            kind,
            schema: self.kind(),
            value: value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{CompiledSchema, ErrorKind, PathSegment, Schema, entry};
    use serde_json::json;

    fn compile(schema: Schema) -> CompiledSchema {
        CompiledSchema::compile(&schema).unwrap()
    }

    #[test]
    fn test_missing_key_is_reported_at_its_path() {
        let schema = compile(Schema::map([entry("name", Schema::non_blank_string())]));
        let explanation = schema.explain(&json!({})).unwrap();
        assert_eq!(explanation.errors.len(), 1);
        assert_eq!(explanation.errors[0].path, vec![PathSegment::Key("name".into())]);
        assert_eq!(explanation.errors[0].kind, ErrorKind::MissingKey);
    }

    #[test]
    fn test_blank_string_is_rejected() {
        let schema = compile(Schema::map([entry("name", Schema::non_blank_string())]));
        let explanation = schema.explain(&json!({"name": "  "})).unwrap();
        assert_eq!(explanation.errors[0].kind, ErrorKind::Blank);
    }

    #[test]
    fn test_closed_map_reports_extra_keys() {
        let schema = compile(Schema::closed_map([entry("id", Schema::int())]));
        let explanation = schema.explain(&json!({"id": 1, "nope": 2})).unwrap();
        assert_eq!(explanation.errors[0].kind, ErrorKind::ExtraKey);
        assert_eq!(explanation.errors[0].path_string(), "$.nope");
    }

    #[test]
    fn test_nested_sequence_errors_carry_indexes() {
        let schema = compile(Schema::map([entry("ids", Schema::sequential(Schema::positive_int()))]));
        let explanation = schema.explain(&json!({"ids": [1, 0, 3]})).unwrap();
        assert_eq!(explanation.errors.len(), 1);
        assert_eq!(explanation.errors[0].path_string(), "$.ids[1]");
        assert_eq!(explanation.errors[0].kind, ErrorKind::TooSmall { min: "1".into() });
    }

    #[test]
    fn test_maybe_and_or() {
        let schema = compile(Schema::map([
            entry("note", Schema::maybe(Schema::string())),
            entry("id", Schema::or([Schema::int(), Schema::Uuid])),
        ]));
        assert!(schema.validate(&json!({"note": null, "id": 3})));
        assert!(schema.validate(&json!({"note": "x", "id": "550e8400-e29b-41d4-a716-446655440000"})));
        let explanation = schema.explain(&json!({"note": 1, "id": true})).unwrap();
        assert_eq!(explanation.errors.len(), 2);
        assert_eq!(explanation.errors[1].kind, ErrorKind::NoMatchingBranch);
    }

    #[test]
    fn test_string_length_bounds() {
        let schema = compile(Schema::String {
            min_len: Some(2),
            max_len: Some(4),
        });
        assert!(schema.validate(&json!("abc")));
        assert_eq!(
            schema.explain(&json!("a")).unwrap().errors[0].kind,
            ErrorKind::TooShort { min: 2 }
        );
        assert_eq!(
            schema.explain(&json!("abcde")).unwrap().errors[0].kind,
            ErrorKind::TooLong { max: 4 }
        );
    }
}
