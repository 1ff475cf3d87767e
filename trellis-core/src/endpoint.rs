//! Endpoint definition facade
//!
//! `defendpoint` runs the whole pipeline for one definition: parse the
//! tokens, build the core function, compose the handler and register the
//! result under its [`UniqueKey`].
//!
//! ```
//! use serde_json::json;
//! use trellis_core::{EndpointDef, EndpointRegistry, Method};
//! use trellis_schema::{Schema, entry};
//!
//! let registry = EndpointRegistry::new();
//! EndpointDef::new(Method::Get, "/:id")
//!     .clause_with("route", Schema::map([entry("id", Schema::positive_int())]))
//!     .body(|scope| Ok(json!({"id": scope.get("route")["id"]}).into()))
//!     .register(&registry, "users")
//!     .unwrap();
//!
//! assert_eq!(registry.list_endpoints("users", None, None).len(), 1);
//! ```

use crate::core_fn::{CoreFn, Scope};
use crate::definition::{DefinitionParser, Token};
use crate::error::{EndpointError, Result};
use crate::handler;
use crate::http::{Method, Reply};
use crate::middleware::Middleware;
use crate::registry::{EndpointInfo, EndpointRegistry, UniqueKey};
use serde_json::{Map, Value};
use std::sync::Arc;
use trellis_schema::Schema;

/// Parse and build an endpoint without registering it.
pub fn build_endpoint(
    module: &str,
    tokens: Vec<Token>,
    middleware: &[Middleware],
) -> Result<(UniqueKey, EndpointInfo)> {
    let descriptor = DefinitionParser::new(module, tokens).parse()?;
    let core_fn = CoreFn::build(&descriptor)?;
    let handler = handler::compose(&descriptor, &core_fn, middleware);
    let key = UniqueKey::of(&descriptor);
    Ok((
        key,
        EndpointInfo {
            core_fn,
            handler,
            descriptor: Arc::new(descriptor),
        },
    ))
}

/// Define an endpoint and register it in `module`.
pub fn defendpoint(registry: &EndpointRegistry, module: &str, tokens: Vec<Token>) -> Result<UniqueKey> {
    defendpoint_with(registry, module, tokens, &[])
}

/// Like [`defendpoint`], with extra middleware wrapped around the handler.
pub fn defendpoint_with(
    registry: &EndpointRegistry,
    module: &str,
    tokens: Vec<Token>,
    middleware: &[Middleware],
) -> Result<UniqueKey> {
    let (key, info) = build_endpoint(module, tokens, middleware)?;
    registry.update_endpoint(module, key.clone(), info);
    Ok(key)
}

/// Typed builder for definition tokens.
#[derive(Clone)]
pub struct EndpointDef {
    method: Method,
    path: String,
    patterns: Vec<(String, String)>,
    response: Option<Arc<Schema>>,
    docstring: Option<String>,
    metadata: Map<String, Value>,
    callbacks: bool,
    clauses: Vec<(String, Option<Arc<Schema>>)>,
    body: Vec<Token>,
    middleware: Vec<Middleware>,
}

impl EndpointDef {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            patterns: Vec::new(),
            response: None,
            docstring: None,
            metadata: Map::new(),
            callbacks: false,
            clauses: Vec::new(),
            body: Vec::new(),
            middleware: Vec::new(),
        }
    }

    /// Explicit pattern for a placeholder; switches to the vector route form.
    pub fn pattern(mut self, placeholder: impl Into<String>, regex: impl Into<String>) -> Self {
        self.patterns.push((placeholder.into(), regex.into()));
        self
    }

    pub fn returns(mut self, schema: Schema) -> Self {
        self.response = Some(Arc::new(schema));
        self
    }

    pub fn doc(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn multipart(self) -> Self {
        self.metadata("multipart", true)
    }

    /// Take `respond`/`raise` ahead of the parameter clauses.
    pub fn callbacks(mut self) -> Self {
        self.callbacks = true;
        self
    }

    /// Next positional clause (route, query, body, request).
    pub fn clause(mut self, binding: impl Into<String>) -> Self {
        self.clauses.push((binding.into(), None));
        self
    }

    pub fn clause_with(mut self, binding: impl Into<String>, schema: Schema) -> Self {
        self.clauses.push((binding.into(), Some(Arc::new(schema))));
        self
    }

    pub fn body<F>(mut self, f: F) -> Self
    where
        F: Fn(&Scope<'_>) -> std::result::Result<Reply, EndpointError> + Send + Sync + 'static,
    {
        self.body.push(Token::body(f));
        self
    }

    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// The definition as raw tokens.
    pub fn tokens(&self) -> Vec<Token> {
        let mut tokens = vec![Token::Method(self.method)];
        if self.patterns.is_empty() {
            tokens.push(Token::str(self.path.as_str()));
        } else {
            let mut items = vec![self.path.clone()];
            for (placeholder, regex) in &self.patterns {
                items.push(placeholder.clone());
                items.push(regex.clone());
            }
            tokens.push(Token::Vector(items));
        }
        if let Some(schema) = &self.response {
            tokens.push(Token::Arrow);
            tokens.push(Token::Schema(Arc::clone(schema)));
        }
        if let Some(doc) = &self.docstring {
            tokens.push(Token::str(doc.as_str()));
        }
        if !self.metadata.is_empty() {
            tokens.push(Token::Metadata(self.metadata.clone()));
        }
        if self.callbacks {
            tokens.push(Token::ident("respond"));
            tokens.push(Token::ident("raise"));
        }
        for (binding, schema) in &self.clauses {
            tokens.push(Token::ident(binding.as_str()));
            if let Some(schema) = schema {
                tokens.push(Token::Arrow);
                tokens.push(Token::Schema(Arc::clone(schema)));
            }
        }
        tokens.extend(self.body.iter().cloned());
        tokens
    }

    pub fn build(&self, module: &str) -> Result<(UniqueKey, EndpointInfo)> {
        build_endpoint(module, self.tokens(), &self.middleware)
    }

    pub fn register(&self, registry: &EndpointRegistry, module: &str) -> Result<UniqueKey> {
        defendpoint_with(registry, module, self.tokens(), &self.middleware)
    }
}

impl std::fmt::Debug for EndpointDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tokens()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ParamType;
    use crate::error::Error;
    use serde_json::json;
    use trellis_schema::entry;

    #[test]
    fn test_builder_tokens_parse() {
        let def = EndpointDef::new(Method::Get, "/:id")
            .pattern("id", "[0-9]+")
            .returns(Schema::map([entry("id", Schema::int())]))
            .doc("Fetch one")
            .metadata("tag", "users")
            .clause("r")
            .clause_with("q", Schema::map([entry("page", Schema::int()).optional()]))
            .body(|_| Ok(Reply::null()));

        let (key, info) = def.build("tests").unwrap();
        assert_eq!(key.path, "/:id");
        assert_eq!(key.regexes.get("id").map(String::as_str), Some("[0-9]+"));
        assert_eq!(info.descriptor.docstring.as_deref(), Some("Fetch one"));
        assert_eq!(info.descriptor.metadata["tag"], json!("users"));
        assert!(info.descriptor.param(ParamType::Query).unwrap().schema.is_some());
        assert!(!info.core_fn.is_async());
    }

    #[test]
    fn test_rebuilding_a_def_shares_its_schemas() {
        let def = EndpointDef::new(Method::Post, "/users")
            .returns(Schema::map([entry("id", Schema::int())]))
            .clause("_")
            .clause("_")
            .clause_with("b", Schema::map([entry("name", Schema::string())]))
            .body(|_| Ok(Reply::null()));

        let (_, first) = def.build("tests").unwrap();
        let (_, second) = def.build("tests").unwrap();
        let response = |info: &EndpointInfo| info.descriptor.response_schema.clone().unwrap();
        let body = |info: &EndpointInfo| {
            info.descriptor.param(ParamType::Body).unwrap().schema.clone().unwrap()
        };
        assert!(Arc::ptr_eq(&response(&first), &response(&second)));
        assert!(Arc::ptr_eq(&body(&first), &body(&second)));
    }

    #[test]
    fn test_callbacks_make_async_endpoint() {
        let (_, info) = EndpointDef::new(Method::Post, "/jobs")
            .callbacks()
            .clause("_")
            .clause("_")
            .clause("body")
            .build("tests")
            .unwrap();
        assert!(info.core_fn.is_async());
        assert_eq!(info.descriptor.param(ParamType::Respond).unwrap().binding, "respond");
        assert_eq!(info.descriptor.param(ParamType::Body).unwrap().binding, "body");
    }

    #[test]
    fn test_defendpoint_registers() {
        let registry = EndpointRegistry::new();
        let key = defendpoint(
            &registry,
            "tests",
            vec![Token::Method(Method::Delete), Token::str("/items/:id")],
        )
        .unwrap();
        assert_eq!(key.method, Method::Delete);
        assert!(registry.get_info("tests", Method::Delete, "/items/:id").is_some());
    }

    #[test]
    fn test_parse_failure_registers_nothing() {
        let registry = EndpointRegistry::new();
        let result = defendpoint(&registry, "tests", vec![Token::str("/")]);
        assert!(matches!(result, Err(Error::DefinitionParse(_))));
        assert!(registry.list_endpoints("tests", None, None).is_empty());
    }

    #[test]
    fn test_invalid_schema_fails_registration() {
        let registry = EndpointRegistry::new();
        let result = EndpointDef::new(Method::Post, "/")
            .clause("_")
            .clause("_")
            .clause_with("b", Schema::re("("))
            .register(&registry, "tests");
        assert!(matches!(result, Err(Error::SchemaCompile { .. })));
        assert!(registry.modules().is_empty());
    }
}
