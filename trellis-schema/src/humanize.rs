// Human-readable error descriptions

use crate::validators::edit_distance;
use crate::{ErrorKind, Explanation, PathSegment, ValueError};
use serde_json::{Map, Value};

/// Largest edit distance at which an undeclared key counts as a misspelling.
const MAX_SPELLING_DISTANCE: usize = 2;

/// Options for [`humanize`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HumanizeOptions {
    /// Suggest the intended key for mistyped keys of closed maps.
    pub spell_check: bool,
}

/// Fold an explanation into a nested mapping of field → description.
///
/// Errors at the root become a plain string. Several errors at the same
/// path are joined with `", "`.
pub fn humanize(explanation: &Explanation, options: HumanizeOptions) -> Value {
    let mut out = Value::Null;
    for error in &explanation.errors {
        let message = match (&error.kind, options.spell_check) {
            (ErrorKind::ExtraKey, true) => spelling_suggestion(error, &explanation.errors)
                .map(|key| format!("should be spelled {}", key))
                .unwrap_or_else(|| error.kind.describe()),
            _ => error.kind.describe(),
        };
        insert_at(&mut out, &error.path, message);
    }
    out
}

/// The missing sibling key closest to a mistyped extra key.
fn spelling_suggestion<'a>(extra: &ValueError, errors: &'a [ValueError]) -> Option<&'a str> {
    let (PathSegment::Key(typed), parent) = extra.path.split_last()? else {
        return None;
    };
    errors
        .iter()
        .filter(|e| e.kind == ErrorKind::MissingKey)
        .filter_map(|e| match e.path.split_last() {
            Some((PathSegment::Key(missing), missing_parent)) if missing_parent == parent => {
                Some(missing.as_str())
            }
            _ => None,
        })
        .map(|missing| (edit_distance(typed, missing), missing))
        .filter(|(distance, missing)| {
            *distance <= MAX_SPELLING_DISTANCE && *distance < missing.chars().count()
        })
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, missing)| missing)
}

fn insert_at(node: &mut Value, path: &[PathSegment], message: String) {
    let Some((head, rest)) = path.split_first() else {
        if node.is_null() {
            *node = Value::String(message);
        } else if let Value::String(existing) = node {
            existing.push_str(", ");
            existing.push_str(&message);
        }
        // otherwise a deeper error already claimed this slot
        return;
    };

    match head {
        PathSegment::Key(key) => {
            if node.is_null() {
                *node = Value::Object(Map::new());
            }
            if let Value::Object(map) = node {
                let child = map.entry(key.clone()).or_insert(Value::Null);
                insert_at(child, rest, message);
            }
        }
        PathSegment::Index(i) => {
            if node.is_null() {
                *node = Value::Array(Vec::new());
            }
            if let Value::Array(items) = node {
                if items.len() <= *i {
                    items.resize(i + 1, Value::Null);
                }
                insert_at(&mut items[*i], rest, message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompiledSchema, Schema, entry};
    use serde_json::json;

    fn explain(schema: Schema, value: Value) -> Explanation {
        CompiledSchema::compile(&schema)
            .unwrap()
            .explain(&value)
            .unwrap()
    }

    #[test]
    fn test_humanize_nested_fields() {
        let explanation = explain(
            Schema::map([
                entry("name", Schema::non_blank_string()),
                entry(
                    "address",
                    Schema::map([entry("zip", Schema::re("^[0-9]{5}$"))]),
                ),
            ]),
            json!({"address": {"zip": "abc"}}),
        );
        assert_eq!(
            humanize(&explanation, HumanizeOptions::default()),
            json!({
                "name": "missing required key",
                "address": {"zip": "should match regex ^[0-9]{5}$"}
            })
        );
    }

    #[test]
    fn test_humanize_root_error_is_a_string() {
        let explanation = explain(Schema::int(), json!("x"));
        assert_eq!(
            humanize(&explanation, HumanizeOptions::default()),
            json!("should be an integer")
        );
    }

    #[test]
    fn test_humanize_sequence_positions() {
        let explanation = explain(Schema::sequential(Schema::int()), json!([1, "b"]));
        assert_eq!(
            humanize(&explanation, HumanizeOptions::default()),
            json!([null, "should be an integer"])
        );
    }

    #[test]
    fn test_spell_checking_suggests_declared_key() {
        let schema = Schema::closed_map([entry("name", Schema::string())]);
        let explanation = explain(schema, json!({"nmae": "x"}));

        assert_eq!(
            humanize(&explanation, HumanizeOptions::default())["nmae"],
            json!("disallowed key")
        );
        assert_eq!(
            humanize(&explanation, HumanizeOptions { spell_check: true })["nmae"],
            json!("should be spelled name")
        );
    }

    #[test]
    fn test_spell_checking_ignores_distant_keys() {
        let schema = Schema::closed_map([entry("name", Schema::string())]);
        let explanation = explain(schema, json!({"description": "x"}));
        assert_eq!(
            humanize(&explanation, HumanizeOptions { spell_check: true })["description"],
            json!("disallowed key")
        );
    }
}
