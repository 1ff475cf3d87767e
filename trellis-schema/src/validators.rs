// Built-in string checks shared by the schema kinds

use once_cell::sync::Lazy;
use regex::Regex;

/// Canonical 8-4-4-4-12 UUID, usable inside a larger pattern.
pub const UUID_PATTERN: &str =
    "[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}";

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$").unwrap()
});

static UUID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^{}$", UUID_PATTERN)).unwrap());

pub fn is_non_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

pub fn is_email(value: &str) -> bool {
    EMAIL_REGEX.is_match(value)
}

pub fn is_uuid(value: &str) -> bool {
    UUID_REGEX.is_match(value)
}

/// Levenshtein distance, used to suggest spellings for mistyped keys.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_blank() {
        assert!(is_non_blank("a"));
        assert!(!is_non_blank("   "));
        assert!(!is_non_blank(""));
    }

    #[test]
    fn test_email() {
        assert!(is_email("user@example.com"));
        assert!(!is_email("@example.com"));
    }

    #[test]
    fn test_uuid() {
        assert!(is_uuid("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!is_uuid("550e8400"));
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("name", "name"), 0);
        assert_eq!(edit_distance("nmae", "name"), 2);
        assert_eq!(edit_distance("nam", "name"), 1);
        assert_eq!(edit_distance("", "abc"), 3);
    }
}
