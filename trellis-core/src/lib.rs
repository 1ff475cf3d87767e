//! # Trellis Core
//!
//! Endpoint registration and dispatch engine.
//!
//! An endpoint is defined declaratively as a token sequence (method,
//! route, optional response schema, docstring, metadata, parameter
//! clauses, body). Registering a definition:
//!
//! 1. parses it into an [`EndpointDescriptor`],
//! 2. builds a [`CoreFn`] that decodes and validates each parameter
//!    group against its schema before running the body,
//! 3. composes a [`Handler`] with the `(request, respond, raise)` ABI,
//!    wrapped by its middleware,
//! 4. stores it in the module's ordered registry and recompiles the
//!    module's [`Dispatcher`].
//!
//! ## Example
//!
//! ```
//! use parking_lot::Mutex;
//! use serde_json::json;
//! use std::sync::Arc;
//! use trellis_core::{Completion, EndpointDef, EndpointRegistry, Method, Request};
//! use trellis_schema::{Schema, entry};
//!
//! let registry = EndpointRegistry::new();
//! EndpointDef::new(Method::Get, "/:id")
//!     .pattern("id", "[0-9]+")
//!     .clause("route")
//!     .body(|scope| Ok(json!({"id": scope.get("route")["id"]}).into()))
//!     .register(&registry, "items")
//!     .unwrap();
//!
//! let status = Arc::new(Mutex::new(None));
//! let seen = Arc::clone(&status);
//! let (respond, raise) = Completion::new(
//!     move |response| *seen.lock() = response.map(|r: trellis_core::Response| r.status),
//!     |_| {},
//! );
//! registry.dispatch("items", Request::get("/42"), respond, raise).unwrap();
//! assert_eq!(*status.lock(), Some(200));
//! ```

pub mod callbacks;
pub mod core_fn;
pub mod definition;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod registry;
pub mod route;

pub use callbacks::{Completion, Raise, Respond};
pub use core_fn::{AsyncCoreFn, CoreFn, Responder, Scope, SyncCoreFn};
pub use definition::{
    Body, DefinitionParser, EndpointDescriptor, ParamSpec, ParamType, Token, WILDCARD_BINDING,
};
pub use dispatcher::Dispatcher;
pub use endpoint::{EndpointDef, build_endpoint, defendpoint, defendpoint_with};
pub use error::{DefinitionParseError, EndpointError, Error, Result};
pub use handler::{Handler, bare_handler, compose, handler};
pub use http::{Method, Reply, Request, Response, ResponseBody, UploadedFile};
pub use middleware::{Middleware, middleware, multipart};
pub use registry::{EndpointDoc, EndpointInfo, EndpointRegistry, OrderedEndpoints, UniqueKey};
pub use route::{PathMatcher, RouteContext, RouteDescriptor};
