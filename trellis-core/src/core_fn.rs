//! Core functions
//!
//! A core function is the business logic of an endpoint, callable without
//! any HTTP plumbing. Its full call takes four positional groups,
//! `(route, query, body, request)`, preceded in async mode by the
//! `respond`/`raise` callbacks. Every shorter prefix is accepted too, with
//! the missing trailing groups passed as `null`.

use crate::callbacks::{Raise, Respond};
use crate::definition::{Body, EndpointDescriptor, ParamType, WILDCARD_BINDING};
use crate::error::{EndpointError, Error, Result};
use crate::gateway;
use crate::http::{Reply, Request, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use trellis_config::response_validation_enabled;
use trellis_schema::CompiledSchema;

static NULL: Value = Value::Null;

/// Number of positional parameter groups in a full call.
pub const GROUP_COUNT: usize = 4;

type Groups = [Value; GROUP_COUNT];

/// Bindings visible to an endpoint body.
pub struct Scope<'a> {
    bindings: HashMap<String, Value>,
    request: Option<&'a Request>,
    callbacks: Option<(Responder, Raise)>,
}

impl<'a> Scope<'a> {
    /// Bound value, `null` when unbound.
    pub fn get(&self, binding: &str) -> &Value {
        self.bindings.get(binding).unwrap_or(&NULL)
    }

    /// Deserialize a bound value.
    pub fn param<T: DeserializeOwned>(&self, binding: &str) -> std::result::Result<T, EndpointError> {
        serde_json::from_value(self.get(binding).clone()).map_err(|e| {
            EndpointError::Internal(format!("cannot read binding {}: {}", binding, e))
        })
    }

    pub fn bindings(&self) -> &HashMap<String, Value> {
        &self.bindings
    }

    /// The live request; `None` when called directly.
    pub fn request(&self) -> Option<&'a Request> {
        self.request
    }

    /// `respond` callback of an async endpoint.
    pub fn respond(&self) -> Option<&Responder> {
        self.callbacks.as_ref().map(|(responder, _)| responder)
    }

    /// `raise` callback of an async endpoint.
    pub fn raise(&self) -> Option<&Raise> {
        self.callbacks.as_ref().map(|(_, raise)| raise)
    }
}

/// The `respond` handed to async bodies.
///
/// Replies are validated and encoded against the response schema, then
/// rendered before reaching the caller's `respond`. A reply that fails
/// validation is delivered through `raise` instead.
#[derive(Clone)]
pub struct Responder {
    respond: Respond,
    raise: Raise,
    schema: Option<CompiledSchema>,
    validate: bool,
}

impl Responder {
    pub fn send(&self, reply: impl Into<Reply>) {
        match finish_reply(self.schema.as_ref(), reply.into(), self.validate) {
            Ok(reply) => self.respond.call(Some(reply.render())),
            Err(error) => self.raise.call(error),
        }
    }
}

fn finish_reply(
    schema: Option<&CompiledSchema>,
    reply: Reply,
    validate: bool,
) -> std::result::Result<Reply, EndpointError> {
    match (schema, reply) {
        (Some(schema), Reply::Value(value)) => {
            gateway::validate_and_encode_response(schema, value, validate).map(Reply::Value)
        }
        (_, reply) => Ok(reply),
    }
}

struct Group {
    param_type: ParamType,
    slot: usize,
    binding: String,
    schema: Option<CompiledSchema>,
}

struct Compiled {
    groups: Vec<Group>,
    response: Option<CompiledSchema>,
    body: Vec<Body>,
}

impl Compiled {
    fn build(descriptor: &EndpointDescriptor) -> Result<Self> {
        let context = |what: &str| {
            format!(
                "{} {} {}",
                descriptor.method,
                descriptor.route.path(),
                what
            )
        };

        let mut groups = Vec::new();
        for (slot, param_type) in ParamType::GROUPS.iter().enumerate() {
            let Some(spec) = descriptor.param(*param_type) else {
                continue;
            };
            let schema = spec
                .schema
                .as_ref()
                .map(gateway::compiled)
                .transpose()
                .map_err(|source| Error::SchemaCompile {
                    context: context(&format!("{} parameters", param_type)),
                    source,
                })?;
            groups.push(Group {
                param_type: *param_type,
                slot,
                binding: spec.binding.clone(),
                schema,
            });
        }

        let response = descriptor
            .response_schema
            .as_ref()
            .map(gateway::compiled)
            .transpose()
            .map_err(|source| Error::SchemaCompile {
                context: context("response"),
                source,
            })?;

        Ok(Self {
            groups,
            response,
            body: descriptor.body.clone(),
        })
    }

    fn bind(&self, mut args: Groups) -> std::result::Result<HashMap<String, Value>, EndpointError> {
        let mut bindings = HashMap::new();
        for group in &self.groups {
            let raw = args[group.slot].take();
            let value = match &group.schema {
                Some(schema) => gateway::decode_and_validate_params(group.param_type, schema, raw)?,
                None => raw,
            };
            if group.binding != WILDCARD_BINDING {
                bindings.insert(group.binding.clone(), value);
            }
        }
        Ok(bindings)
    }

    /// Run the body; the last expression is the result.
    fn evaluate(&self, scope: &Scope<'_>) -> std::result::Result<Reply, EndpointError> {
        let mut reply = Reply::null();
        for expr in &self.body {
            reply = expr(scope)?;
        }
        Ok(reply)
    }
}

fn pad(args: Vec<Value>, range: RangeInclusive<usize>, offset: usize) -> std::result::Result<Groups, EndpointError> {
    let actual = args.len() + offset;
    if !range.contains(&actual) {
        return Err(EndpointError::Arity {
            min: *range.start(),
            max: *range.end(),
            actual,
        });
    }
    let mut groups = Groups::default();
    for (slot, value) in args.into_iter().enumerate() {
        groups[slot] = value;
    }
    Ok(groups)
}

/// Core function of a synchronous endpoint.
#[derive(Clone)]
pub struct SyncCoreFn {
    inner: Arc<Compiled>,
}

impl SyncCoreFn {
    pub const ARITY: RangeInclusive<usize> = 0..=GROUP_COUNT;

    fn run(&self, args: Groups, request: Option<&Request>) -> std::result::Result<Reply, EndpointError> {
        let scope = Scope {
            bindings: self.inner.bind(args)?,
            request,
            callbacks: None,
        };
        let reply = self.inner.evaluate(&scope)?;
        finish_reply(
            self.inner.response.as_ref(),
            reply,
            response_validation_enabled(),
        )
    }

    pub fn call0(&self) -> std::result::Result<Reply, EndpointError> {
        self.run(Groups::default(), None)
    }

    pub fn call1(&self, route: Value) -> std::result::Result<Reply, EndpointError> {
        self.run([route, Value::Null, Value::Null, Value::Null], None)
    }

    pub fn call2(&self, route: Value, query: Value) -> std::result::Result<Reply, EndpointError> {
        self.run([route, query, Value::Null, Value::Null], None)
    }

    pub fn call3(
        &self,
        route: Value,
        query: Value,
        body: Value,
    ) -> std::result::Result<Reply, EndpointError> {
        self.run([route, query, body, Value::Null], None)
    }

    /// Full call; the result is rendered.
    pub fn call4(
        &self,
        route: Value,
        query: Value,
        body: Value,
        request: Value,
    ) -> std::result::Result<Response, EndpointError> {
        self.run([route, query, body, request], None)
            .map(Reply::render)
    }

    /// Call with any accepted number of groups.
    pub fn invoke(&self, args: Vec<Value>) -> std::result::Result<Reply, EndpointError> {
        let full = args.len() == GROUP_COUNT;
        let groups = pad(args, Self::ARITY, 0)?;
        let reply = self.run(groups, None)?;
        Ok(if full {
            Reply::Response(reply.render())
        } else {
            reply
        })
    }

    pub(crate) fn call_request(
        &self,
        args: Groups,
        request: &Request,
    ) -> std::result::Result<Response, EndpointError> {
        self.run(args, Some(request)).map(Reply::render)
    }
}

/// Core function of an endpoint declared with `respond`/`raise`.
///
/// The body owns the callbacks and settles the request itself, possibly
/// later and from another thread. Errors returned by the body are passed
/// back to the caller, not to `raise`.
#[derive(Clone)]
pub struct AsyncCoreFn {
    inner: Arc<Compiled>,
}

impl AsyncCoreFn {
    pub const ARITY: RangeInclusive<usize> = 2..=GROUP_COUNT + 2;

    fn run(
        &self,
        respond: Respond,
        raise: Raise,
        args: Groups,
        request: Option<&Request>,
    ) -> std::result::Result<(), EndpointError> {
        let bindings = match self.inner.bind(args) {
            Ok(bindings) => bindings,
            Err(error) => {
                // parameters are checked before the body takes over
                raise.call(error);
                return Ok(());
            }
        };
        let responder = Responder {
            respond,
            raise: raise.clone(),
            schema: self.inner.response.clone(),
            // fixed on the dispatching thread; `send` may run elsewhere
            validate: response_validation_enabled(),
        };
        let scope = Scope {
            bindings,
            request,
            callbacks: Some((responder, raise)),
        };
        self.inner.evaluate(&scope).map(|_| ())
    }

    pub fn call2(&self, respond: Respond, raise: Raise) -> std::result::Result<(), EndpointError> {
        self.run(respond, raise, Groups::default(), None)
    }

    pub fn call3(
        &self,
        respond: Respond,
        raise: Raise,
        route: Value,
    ) -> std::result::Result<(), EndpointError> {
        self.run(respond, raise, [route, Value::Null, Value::Null, Value::Null], None)
    }

    pub fn call4(
        &self,
        respond: Respond,
        raise: Raise,
        route: Value,
        query: Value,
    ) -> std::result::Result<(), EndpointError> {
        self.run(respond, raise, [route, query, Value::Null, Value::Null], None)
    }

    pub fn call5(
        &self,
        respond: Respond,
        raise: Raise,
        route: Value,
        query: Value,
        body: Value,
    ) -> std::result::Result<(), EndpointError> {
        self.run(respond, raise, [route, query, body, Value::Null], None)
    }

    pub fn call6(
        &self,
        respond: Respond,
        raise: Raise,
        route: Value,
        query: Value,
        body: Value,
        request: Value,
    ) -> std::result::Result<(), EndpointError> {
        self.run(respond, raise, [route, query, body, request], None)
    }

    /// Call with the callbacks plus any accepted number of groups.
    pub fn invoke(
        &self,
        respond: Respond,
        raise: Raise,
        args: Vec<Value>,
    ) -> std::result::Result<(), EndpointError> {
        let groups = pad(args, Self::ARITY, 2)?;
        self.run(respond, raise, groups, None)
    }

    pub(crate) fn call_request(
        &self,
        respond: Respond,
        raise: Raise,
        args: Groups,
        request: &Request,
    ) -> std::result::Result<(), EndpointError> {
        self.run(respond, raise, args, Some(request))
    }
}

/// The business function of an endpoint.
#[derive(Clone)]
pub enum CoreFn {
    Sync(SyncCoreFn),
    Async(AsyncCoreFn),
}

impl CoreFn {
    /// Compile every schema once and close over the results.
    ///
    /// Malformed schemas fail here rather than on first use.
    pub fn build(descriptor: &EndpointDescriptor) -> Result<Self> {
        let inner = Arc::new(Compiled::build(descriptor)?);
        Ok(if descriptor.is_async() {
            CoreFn::Async(AsyncCoreFn { inner })
        } else {
            CoreFn::Sync(SyncCoreFn { inner })
        })
    }

    pub fn is_async(&self) -> bool {
        matches!(self, CoreFn::Async(_))
    }

    pub fn arity(&self) -> RangeInclusive<usize> {
        match self {
            CoreFn::Sync(_) => SyncCoreFn::ARITY,
            CoreFn::Async(_) => AsyncCoreFn::ARITY,
        }
    }

    pub fn as_sync(&self) -> Option<&SyncCoreFn> {
        match self {
            CoreFn::Sync(f) => Some(f),
            CoreFn::Async(_) => None,
        }
    }

    pub fn as_async(&self) -> Option<&AsyncCoreFn> {
        match self {
            CoreFn::Async(f) => Some(f),
            CoreFn::Sync(_) => None,
        }
    }
}

impl std::fmt::Debug for CoreFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreFn::Sync(_) => write!(f, "CoreFn::Sync"),
            CoreFn::Async(_) => write!(f, "CoreFn::Async"),
        }
    }
}
