// Decoding (coercion) and encoding (projection)

use crate::compiled::Node;
use serde_json::{Map, Number, Value};

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn parse_int(s: &str) -> Option<Value> {
    s.trim().parse::<i64>().ok().map(Value::from)
}

fn parse_double(s: &str) -> Option<Value> {
    s.trim()
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

impl Node {
    pub(crate) fn decode(&self, value: Value) -> Value {
        match (self, value) {
            (Node::Boolean, Value::String(s)) => match parse_bool(&s) {
                Some(b) => Value::Bool(b),
                None => Value::String(s),
            },
            (Node::Int { .. }, Value::String(s)) => parse_int(&s).unwrap_or(Value::String(s)),
            (Node::Int { .. }, Value::Number(n)) => match n.as_f64() {
                // 3.0 -> 3
                Some(f) if !n.is_i64() && !n.is_u64() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                    Value::from(f as i64)
                }
                _ => Value::Number(n),
            },
            (Node::Double { .. }, Value::String(s)) => {
                parse_double(&s).unwrap_or(Value::String(s))
            }
            (Node::Uuid, Value::String(s)) => Value::String(s.trim().to_string()),
            (Node::Enum(values), Value::String(s)) => {
                let trimmed = s.trim();
                values
                    .iter()
                    .find(|candidate| match candidate {
                        Value::String(c) => c == &s,
                        Value::Number(_) | Value::Bool(_) => candidate.to_string() == trimmed,
                        _ => false,
                    })
                    .cloned()
                    .unwrap_or(Value::String(s))
            }
            (Node::Maybe(_), Value::Null) => Value::Null,
            (Node::Maybe(inner), value) => inner.decode(value),
            (Node::Seq(items), Value::Array(values)) => {
                Value::Array(values.into_iter().map(|v| items.decode(v)).collect())
            }
            (Node::Seq(_), value @ (Value::Null | Value::Object(_))) => value,
            // a single query parameter stands for a one-element list
            (Node::Seq(items), scalar) => Value::Array(vec![items.decode(scalar)]),
            (Node::Map { entries, .. }, Value::Object(mut map)) => {
                for entry in entries {
                    match map.remove(&entry.key) {
                        Some(v) => {
                            map.insert(entry.key.clone(), entry.node.decode(v));
                        }
                        None => {
                            if let Some(default) = &entry.default {
                                map.insert(entry.key.clone(), default.clone());
                            }
                        }
                    }
                }
                Value::Object(map)
            }
            (Node::MapOf(values), Value::Object(map)) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, values.decode(v)))
                    .collect::<Map<String, Value>>(),
            ),
            (Node::And(nodes), value) => nodes.iter().fold(value, |v, node| node.decode(v)),
            (Node::Or(nodes), value) => {
                for node in nodes {
                    let decoded = node.decode(value.clone());
                    if node.is_valid(&decoded) {
                        return decoded;
                    }
                }
                value
            }
            (_, value) => value,
        }
    }

    pub(crate) fn encode(&self, value: Value) -> Value {
        match (self, value) {
            (Node::Double { .. }, Value::Number(n)) if n.is_i64() || n.is_u64() => n
                .as_f64()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Number(n)),
            (Node::Maybe(_), Value::Null) => Value::Null,
            (Node::Maybe(inner), value) => inner.encode(value),
            (Node::Seq(items), Value::Array(values)) => {
                Value::Array(values.into_iter().map(|v| items.encode(v)).collect())
            }
            (
                Node::Map {
                    entries,
                    index,
                    closed,
                },
                Value::Object(map),
            ) => {
                let mut out = Map::new();
                for (key, v) in map {
                    match index.get(&key) {
                        Some(&i) => {
                            out.insert(key, entries[i].node.encode(v));
                        }
                        None if !*closed => {
                            out.insert(key, v);
                        }
                        None => {}
                    }
                }
                Value::Object(out)
            }
            (Node::MapOf(values), Value::Object(map)) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, values.encode(v)))
                    .collect::<Map<String, Value>>(),
            ),
            (Node::And(nodes), value) => nodes.iter().fold(value, |v, node| node.encode(v)),
            (Node::Or(nodes), value) => match nodes.iter().find(|n| n.is_valid(&value)) {
                Some(node) => node.encode(value),
                None => value,
            },
            (_, value) => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{CompiledSchema, Schema, entry};
    use serde_json::json;

    fn compile(schema: Schema) -> CompiledSchema {
        CompiledSchema::compile(&schema).unwrap()
    }

    #[test]
    fn test_decode_parses_query_strings() {
        let schema = compile(Schema::map([
            entry("id", Schema::positive_int()),
            entry("archived", Schema::Boolean).optional(),
            entry("ratio", Schema::double()).optional(),
        ]));
        assert_eq!(
            schema.decode(json!({"id": " 12 ", "archived": "true", "ratio": "0.5"})),
            json!({"id": 12, "archived": true, "ratio": 0.5})
        );
    }

    #[test]
    fn test_decode_leaves_unparseable_values() {
        let schema = compile(Schema::map([entry("id", Schema::int())]));
        assert_eq!(schema.decode(json!({"id": "abc"})), json!({"id": "abc"}));
    }

    #[test]
    fn test_decode_fills_defaults() {
        let schema = compile(Schema::map([
            entry("limit", Schema::int()).with_default(50),
            entry("offset", Schema::int()).optional(),
        ]));
        assert_eq!(schema.decode(json!({})), json!({"limit": 50}));
        assert_eq!(schema.decode(json!({"limit": "5"})), json!({"limit": 5}));
    }

    #[test]
    fn test_decode_wraps_single_value_into_sequence() {
        let schema = compile(Schema::map([entry("ids", Schema::sequential(Schema::int()))]));
        assert_eq!(schema.decode(json!({"ids": "3"})), json!({"ids": [3]}));
        assert_eq!(schema.decode(json!({"ids": ["3", "4"]})), json!({"ids": [3, 4]}));
    }

    #[test]
    fn test_decode_enum_and_or() {
        let schema = compile(Schema::map([
            entry("level", Schema::enumeration([1, 2, 3])),
            entry("id", Schema::or([Schema::int(), Schema::string()])),
        ]));
        assert_eq!(
            schema.decode(json!({"level": "2", "id": "7"})),
            json!({"level": 2, "id": 7})
        );
        assert_eq!(
            schema.decode(json!({"level": 3, "id": "seven"})),
            json!({"level": 3, "id": "seven"})
        );
    }

    #[test]
    fn test_decode_is_idempotent() {
        let schema = compile(Schema::map([
            entry("ids", Schema::sequential(Schema::int())),
            entry("limit", Schema::int()).with_default(10),
            entry("q", Schema::maybe(Schema::string())),
        ]));
        let once = schema.decode(json!({"ids": "1", "q": null}));
        assert_eq!(schema.decode(once.clone()), once);
    }

    #[test]
    fn test_encode_drops_undeclared_keys_of_closed_maps() {
        let schema = compile(Schema::closed_map([
            entry("id", Schema::int()),
            entry("tags", Schema::sequential(Schema::closed_map([entry("name", Schema::string())]))),
        ]));
        assert_eq!(
            schema.encode(json!({"id": 1, "secret": "x", "tags": [{"name": "a", "internal": true}]})),
            json!({"id": 1, "tags": [{"name": "a"}]})
        );
    }

    #[test]
    fn test_encode_keeps_open_map_keys() {
        let schema = compile(Schema::map([entry("score", Schema::double())]));
        assert_eq!(
            schema.encode(json!({"score": 3, "extra": 1})),
            json!({"score": 3.0, "extra": 1})
        );
    }
}
