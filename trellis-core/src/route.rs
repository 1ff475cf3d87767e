//! Route descriptors and path matching
//!
//! A path template uses `:name` placeholders, which may sit anywhere in a
//! segment (`/files/:id.json`), and `*` for "the rest of the path".

use crate::http::Method;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;
use trellis_schema::{RouteHint, Schema};

/// Name under which a `*` wildcard is captured.
pub const WILDCARD: &str = "*";

/// Constraint for placeholders without a pattern.
const DEFAULT_SEGMENT: &str = "[^/,;?]+";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r":([A-Za-z_][A-Za-z0-9_-]*)|\*").expect("placeholder regex is valid")
});

/// Placeholder names in template order, `*` for wildcards.
pub fn placeholders(path: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(path)
        .map(|caps| match caps.get(1) {
            Some(name) => name.as_str().to_string(),
            None => WILDCARD.to_string(),
        })
        .collect()
}

/// `user-id` → `user_id`
pub fn normalize_name(name: &str) -> String {
    name.replace('-', "_")
}

fn strip_anchors(pattern: &str) -> &str {
    let pattern = pattern.strip_prefix('^').unwrap_or(pattern);
    pattern.strip_suffix('$').unwrap_or(pattern)
}

/// An immutable path template plus per-placeholder patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDescriptor {
    path: String,
    regexes: BTreeMap<String, String>,
}

impl RouteDescriptor {
    /// Template with explicitly given `(placeholder, pattern)` pairs.
    pub fn explicit<I, K, P>(path: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, P)>,
        K: Into<String>,
        P: Into<String>,
    {
        Self {
            path: path.into(),
            regexes: pairs
                .into_iter()
                .map(|(k, p)| (k.into(), p.into()))
                .collect(),
        }
    }

    /// Template whose patterns are inferred from the route parameter schema.
    ///
    /// Placeholders the schema cannot constrain are left open and logged.
    pub fn infer(path: impl Into<String>, schema: Option<&Schema>, context: &RouteContext<'_>) -> Self {
        let path = path.into();
        let mut regexes = BTreeMap::new();
        for name in placeholders(&path) {
            if name == WILDCARD {
                continue;
            }
            let hint = schema
                .map(|s| match s.route_hint(&name) {
                    RouteHint::Unresolved => s.route_hint(&normalize_name(&name)),
                    hint => hint,
                })
                .unwrap_or(RouteHint::Unresolved);
            match hint.pattern() {
                Some(pattern) => {
                    regexes.insert(name, pattern.to_string());
                }
                None => warn!(
                    module = context.module,
                    method = %context.method,
                    path = %path,
                    placeholder = %name,
                    "no pattern for route placeholder, matching any segment"
                ),
            }
        }
        Self { path, regexes }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Placeholder name → stringified pattern
    pub fn regexes(&self) -> &BTreeMap<String, String> {
        &self.regexes
    }

    pub fn matcher(&self) -> Result<PathMatcher, regex::Error> {
        PathMatcher::compile(self)
    }
}

/// Where a route is being declared, for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct RouteContext<'a> {
    pub module: &'a str,
    pub method: Method,
}

/// A compiled, anchored matcher for one route.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    template: String,
    regex: Regex,
    /// Param key for capture group `p{i}`
    keys: Vec<String>,
}

impl PathMatcher {
    pub fn compile(route: &RouteDescriptor) -> Result<Self, regex::Error> {
        let template = route.path();
        let mut pattern = String::from("^");
        let mut keys = Vec::new();
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(template) {
            let Some(whole) = caps.get(0) else { continue };
            pattern.push_str(&regex::escape(&template[last..whole.start()]));
            last = whole.end();

            let group = format!("p{}", keys.len());
            match caps.get(1) {
                Some(name) => {
                    let constraint = route
                        .regexes()
                        .get(name.as_str())
                        .map(|p| strip_anchors(p))
                        .unwrap_or(DEFAULT_SEGMENT);
                    pattern.push_str(&format!("(?P<{}>(?:{}))", group, constraint));
                    keys.push(normalize_name(name.as_str()));
                }
                None => {
                    pattern.push_str(&format!("(?P<{}>.*)", group));
                    keys.push(WILDCARD.to_string());
                }
            }
        }
        pattern.push_str(&regex::escape(&template[last..]));
        pattern.push('$');

        Ok(Self {
            template: template.to_string(),
            regex: Regex::new(&pattern)?,
            keys,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Percent-decoded placeholder values if `path` matches.
    ///
    /// Anything after `?` is ignored.
    pub fn matches(&self, path: &str) -> Option<Map<String, Value>> {
        let path = path.split('?').next().unwrap_or(path);
        let caps = self.regex.captures(path)?;
        let mut params = Map::new();
        for (i, key) in self.keys.iter().enumerate() {
            if let Some(m) = caps.name(&format!("p{}", i)) {
                params.insert(key.clone(), Value::String(percent_decode(m.as_str())));
            }
        }
        Some(params)
    }
}

fn percent_decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_schema::entry;

    const CONTEXT: RouteContext<'static> = RouteContext {
        module: "tests",
        method: Method::Get,
    };

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders("/users/:id/posts/:post-id"), vec!["id", "post-id"]);
        assert_eq!(placeholders("/files/:name.json"), vec!["name"]);
        assert_eq!(placeholders("/static/*"), vec!["*"]);
        assert!(placeholders("/health").is_empty());
    }

    #[test]
    fn test_infer_from_schema() {
        let schema = Schema::map([
            entry("id", Schema::int()),
            entry("slug", Schema::string()).with_route_pattern("[a-z-]+"),
            entry("kind", Schema::enumeration(["a.b", "c"])),
        ]);
        let route = RouteDescriptor::infer("/:id/:slug/:kind/:free", Some(&schema), &CONTEXT);
        assert_eq!(route.regexes()["id"], "[0-9]+");
        assert_eq!(route.regexes()["slug"], "[a-z-]+");
        assert_eq!(route.regexes()["kind"], r"a\.b|c");
        assert!(!route.regexes().contains_key("free"));
    }

    #[test]
    fn test_infer_uses_normalized_names() {
        let schema = Schema::map([entry("user_id", Schema::int())]);
        let route = RouteDescriptor::infer("/:user-id", Some(&schema), &CONTEXT);
        assert_eq!(route.regexes()["user-id"], "[0-9]+");
    }

    #[test]
    fn test_matcher_respects_constraints() {
        let route = RouteDescriptor::explicit("/:id", [("id", "[0-9]+")]);
        let matcher = route.matcher().unwrap();
        assert_eq!(matcher.matches("/42"), Some(json!({"id": "42"}).as_object().unwrap().clone()));
        assert!(matcher.matches("/abc").is_none());
        assert!(matcher.matches("/42/extra").is_none());
    }

    #[test]
    fn test_matcher_default_segment() {
        let matcher = RouteDescriptor::explicit("/users/:name/posts", Vec::<(String, String)>::new())
            .matcher()
            .unwrap();
        let params = matcher.matches("/users/ada%20l/posts?x=1").unwrap();
        assert_eq!(params["name"], "ada l");
        assert!(matcher.matches("/users/a/b/posts").is_none());
    }

    #[test]
    fn test_matcher_mid_segment_and_wildcard() {
        let matcher = RouteDescriptor::explicit("/files/:file-id.json", [("file-id", "^[0-9]+$")])
            .matcher()
            .unwrap();
        assert_eq!(matcher.matches("/files/12.json").unwrap()["file_id"], "12");
        assert!(matcher.matches("/files/12xjson").is_none());

        let wildcard = RouteDescriptor::explicit("/static/*", Vec::<(String, String)>::new())
            .matcher()
            .unwrap();
        assert_eq!(wildcard.matches("/static/css/app.css").unwrap()["*"], "css/app.css");
    }

    #[test]
    fn test_invalid_percent_encoding_is_kept() {
        let matcher = RouteDescriptor::explicit("/:v", Vec::<(String, String)>::new())
            .matcher()
            .unwrap();
        assert_eq!(matcher.matches("/%FF").unwrap()["v"], "%FF");
    }

    #[test]
    fn test_invalid_constraint_fails_to_compile() {
        assert!(RouteDescriptor::explicit("/:id", [("id", "(")]).matcher().is_err());
    }
}
