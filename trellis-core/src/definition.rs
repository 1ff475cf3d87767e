//! Endpoint definitions
//!
//! A definition is an ordered token sequence:
//!
//! ```text
//! method route [:- response-schema] [docstring] [metadata]
//!        [route-clause] [query-clause] [body-clause] [request-clause]
//!      | respond raise [route-clause] ... [request-clause]
//!        body...
//! ```
//!
//! A clause is `binding` or `binding :- schema`. The parser turns the
//! tokens into an immutable [`EndpointDescriptor`].

use crate::core_fn::Scope;
use crate::error::{DefinitionParseError, EndpointError};
use crate::http::{Method, Reply};
use crate::route::{RouteContext, RouteDescriptor, placeholders};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use trellis_schema::Schema;

/// One expression of an endpoint's implementation.
pub type Body = Arc<dyn Fn(&Scope<'_>) -> Result<Reply, EndpointError> + Send + Sync>;

/// Binding that ignores its group.
pub const WILDCARD_BINDING: &str = "_";

/// A token of a raw endpoint definition.
#[derive(Clone)]
pub enum Token {
    Method(Method),
    Str(String),
    /// `[path, placeholder, pattern, placeholder, pattern, ...]`
    Vector(Vec<String>),
    /// `:-`
    Arrow,
    Schema(Arc<Schema>),
    Metadata(Map<String, Value>),
    Ident(String),
    Body(Body),
}

impl Token {
    pub fn str(s: impl Into<String>) -> Self {
        Token::Str(s.into())
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Token::Ident(name.into())
    }

    pub fn schema(schema: Schema) -> Self {
        Token::Schema(Arc::new(schema))
    }

    pub fn vector<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Token::Vector(items.into_iter().map(Into::into).collect())
    }

    pub fn body<F>(f: F) -> Self
    where
        F: Fn(&Scope<'_>) -> Result<Reply, EndpointError> + Send + Sync + 'static,
    {
        Token::Body(Arc::new(f))
    }

    /// Short rendering for diagnostics
    fn describe(&self) -> String {
        match self {
            Token::Method(method) => method.to_string(),
            Token::Str(s) => format!("{:?}", s),
            Token::Vector(items) => format!("{:?}", items),
            Token::Arrow => ":-".to_string(),
            Token::Schema(schema) => format!("<{} schema>", schema.kind()),
            Token::Metadata(map) => Value::Object(map.clone()).to_string(),
            Token::Ident(name) => name.clone(),
            Token::Body(_) => "<body>".to_string(),
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Kinds of parameter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Route,
    Query,
    Body,
    Request,
    Respond,
    Raise,
}

impl ParamType {
    /// Positional groups, in clause order
    pub const GROUPS: [ParamType; 4] = [
        ParamType::Route,
        ParamType::Query,
        ParamType::Body,
        ParamType::Request,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Route => "route",
            ParamType::Query => "query",
            ParamType::Body => "body",
            ParamType::Request => "request",
            ParamType::Respond => "respond",
            ParamType::Raise => "raise",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parameter clause: binding plus optional schema.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub binding: String,
    pub schema: Option<Arc<Schema>>,
}

impl ParamSpec {
    pub fn is_wildcard(&self) -> bool {
        self.binding == WILDCARD_BINDING
    }
}

/// Structured, immutable form of an endpoint definition.
#[derive(Clone)]
pub struct EndpointDescriptor {
    pub method: Method,
    pub route: RouteDescriptor,
    pub params: BTreeMap<ParamType, ParamSpec>,
    pub response_schema: Option<Arc<Schema>>,
    pub docstring: Option<String>,
    pub metadata: Map<String, Value>,
    pub body: Vec<Body>,
}

impl EndpointDescriptor {
    /// Declared with `respond`/`raise` callbacks.
    pub fn is_async(&self) -> bool {
        self.params.contains_key(&ParamType::Respond)
    }

    pub fn param(&self, param_type: ParamType) -> Option<&ParamSpec> {
        self.params.get(&param_type)
    }

    pub fn multipart(&self) -> bool {
        self.metadata
            .get("multipart")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

impl fmt::Debug for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointDescriptor")
            .field("method", &self.method)
            .field("route", &self.route)
            .field("params", &self.params)
            .field("response_schema", &self.response_schema)
            .field("docstring", &self.docstring)
            .field("metadata", &self.metadata)
            .field("body", &format_args!("[{} expressions]", self.body.len()))
            .finish()
    }
}

enum RouteToken {
    Path(String),
    Explicit(String, Vec<(String, String)>),
}

struct Clause {
    binding: String,
    schema: Option<Arc<Schema>>,
    position: usize,
}

/// Parses definition tokens into an [`EndpointDescriptor`].
pub struct DefinitionParser<'a> {
    module: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> DefinitionParser<'a> {
    pub fn new(module: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            module,
            tokens,
            pos: 0,
        }
    }

    pub fn parse(mut self) -> Result<EndpointDescriptor, DefinitionParseError> {
        let method = match self.peek() {
            Some(Token::Method(method)) => *method,
            _ => return Err(self.error(self.pos, "an HTTP method")),
        };
        self.pos += 1;

        let route_position = self.pos;
        let route = self.parse_route()?;

        let mut response_schema = None;
        if let Some(Token::Arrow) = self.peek() {
            self.pos += 1;
            response_schema = Some(self.expect_schema()?);
        }

        let mut docstring = None;
        if let Some(Token::Str(doc)) = self.peek() {
            docstring = Some(doc.clone());
            self.pos += 1;
        }

        let mut metadata = Map::new();
        if let Some(Token::Metadata(map)) = self.peek() {
            if map.get("multipart").is_some_and(|v| !v.is_boolean()) {
                return Err(self.error(self.pos, "a boolean multipart flag"));
            }
            metadata = map.clone();
            self.pos += 1;
        }

        let clauses = self.parse_clauses()?;
        let params = self.assign_clauses(clauses)?;

        let mut body = Vec::new();
        while let Some(token) = self.peek() {
            match token {
                Token::Body(expr) => {
                    body.push(Arc::clone(expr));
                    self.pos += 1;
                }
                _ => return Err(self.error(self.pos, "an implementation body")),
            }
        }

        let route = match route {
            RouteToken::Path(path) => {
                let schema = params
                    .get(&ParamType::Route)
                    .and_then(|spec| spec.schema.as_deref());
                let context = RouteContext {
                    module: self.module,
                    method,
                };
                RouteDescriptor::infer(path, schema, &context)
            }
            RouteToken::Explicit(path, pairs) => RouteDescriptor::explicit(path, pairs),
        };
        if route.matcher().is_err() {
            return Err(self.error(route_position, "a route whose patterns compile"));
        }

        Ok(EndpointDescriptor {
            method,
            route,
            params,
            response_schema,
            docstring,
            metadata,
            body,
        })
    }

    fn parse_route(&mut self) -> Result<RouteToken, DefinitionParseError> {
        let route = match self.peek() {
            Some(Token::Str(path)) => RouteToken::Path(path.clone()),
            Some(Token::Vector(items)) if items.len() % 2 == 1 => {
                let path = items[0].clone();
                let pairs: Vec<(String, String)> = items[1..]
                    .chunks(2)
                    .map(|pair| (pair[0].clone(), pair[1].clone()))
                    .collect();
                let declared = placeholders(&path);
                if pairs.iter().any(|(name, _)| !declared.contains(name)) {
                    return Err(self.error(self.pos, "placeholders that appear in the path"));
                }
                RouteToken::Explicit(path, pairs)
            }
            Some(Token::Vector(_)) => {
                return Err(self.error(self.pos, "[path, placeholder, pattern, ...]"));
            }
            _ => return Err(self.error(self.pos, "a route string or vector")),
        };
        self.pos += 1;
        Ok(route)
    }

    fn parse_clauses(&mut self) -> Result<Vec<Clause>, DefinitionParseError> {
        let mut clauses = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Ident(binding)) => {
                    if binding.is_empty() {
                        return Err(self.error(self.pos, "a non-empty binding"));
                    }
                    let clause_binding = binding.clone();
                    let position = self.pos;
                    self.pos += 1;
                    let schema = match self.peek() {
                        Some(Token::Arrow) => {
                            self.pos += 1;
                            Some(self.expect_schema()?)
                        }
                        _ => None,
                    };
                    clauses.push(Clause {
                        binding: clause_binding,
                        schema,
                        position,
                    });
                }
                Some(Token::Schema(_)) => {
                    return Err(self.error(self.pos, ":- before a schema"));
                }
                _ => return Ok(clauses),
            }
        }
    }

    fn assign_clauses(
        &self,
        clauses: Vec<Clause>,
    ) -> Result<BTreeMap<ParamType, ParamSpec>, DefinitionParseError> {
        let mut params = BTreeMap::new();
        let is_async = clauses.len() >= 2
            && clauses[0].binding == "respond"
            && clauses[1].binding == "raise";

        let mut positional = clauses.into_iter();
        if is_async {
            for param_type in [ParamType::Respond, ParamType::Raise] {
                if let Some(clause) = positional.next() {
                    if clause.schema.is_some() {
                        return Err(self.error(clause.position + 1, "no schema on a callback"));
                    }
                    params.insert(
                        param_type,
                        ParamSpec {
                            binding: clause.binding,
                            schema: None,
                        },
                    );
                }
            }
        }

        for (i, clause) in positional.enumerate() {
            let Some(param_type) = ParamType::GROUPS.get(i) else {
                return Err(self.error(clause.position, "at most four parameter clauses"));
            };
            params.insert(
                *param_type,
                ParamSpec {
                    binding: clause.binding,
                    schema: clause.schema,
                },
            );
        }
        Ok(params)
    }

    fn expect_schema(&mut self) -> Result<Arc<Schema>, DefinitionParseError> {
        match self.peek() {
            Some(Token::Schema(schema)) => {
                let schema = Arc::clone(schema);
                self.pos += 1;
                Ok(schema)
            }
            _ => Err(self.error(self.pos, "a schema after :-")),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn error(&self, position: usize, expected: &str) -> DefinitionParseError {
        let found = self
            .tokens
            .get(position)
            .map(Token::describe)
            .unwrap_or_else(|| "end of definition".to_string());
        let mut rendered: Vec<String> = self.tokens.iter().map(Token::describe).collect();
        match rendered.get_mut(position) {
            Some(token) => *token = format!(">>> {} <<<", token),
            None => rendered.push(">>> <<<".to_string()),
        }
        DefinitionParseError {
            position,
            expected: expected.to_string(),
            found,
            definition: rendered.join(" "),
        }
    }
}
