//! Handler composition
//!
//! A handler takes a request plus its `respond`/`raise` callbacks. Sync
//! handlers always settle the request before returning: failures and
//! panics of the body are turned into a `raise`. Async handlers leave
//! settlement to the endpoint body and return its errors to the caller.

use crate::callbacks::{Raise, Respond};
use crate::core_fn::CoreFn;
use crate::definition::EndpointDescriptor;
use crate::error::EndpointError;
use crate::http::Request;
use crate::middleware::{self, Middleware};
use crate::route::normalize_name;
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// `(request, respond, raise)`
pub type Handler = Arc<dyn Fn(Request, Respond, Raise) -> Result<(), EndpointError> + Send + Sync>;

/// Build a handler from a closure
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(Request, Respond, Raise) -> Result<(), EndpointError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn normalize_keys(params: &Map<String, Value>) -> Value {
    Value::Object(
        params
            .iter()
            .map(|(k, v)| (normalize_name(k), v.clone()))
            .collect(),
    )
}

/// Positional groups taken from a request.
fn extract(request: &Request) -> [Value; 4] {
    [
        normalize_keys(&request.route_params),
        normalize_keys(&request.query_params),
        request.body.clone(),
        request.to_value(),
    ]
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// The handler for a core function, without middleware.
pub fn bare_handler(core: &CoreFn) -> Handler {
    match core.clone() {
        CoreFn::Sync(core) => handler(move |request, respond, raise| {
            let args = extract(&request);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| core.call_request(args, &request)));
            match outcome {
                Ok(Ok(response)) => respond.call(Some(response)),
                Ok(Err(err)) => {
                    debug!(method = %request.method, path = %request.path, error = %err, "endpoint failed");
                    raise.call(err)
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(method = %request.method, path = %request.path, panic = %message, "endpoint panicked");
                    raise.call(EndpointError::Panicked(message))
                }
            }
            Ok(())
        }),
        CoreFn::Async(core) => handler(move |request, respond, raise| {
            let args = extract(&request);
            core.call_request(respond, raise, args, &request)
        }),
    }
}

/// Compose the full handler of an endpoint.
///
/// `multipart: true` metadata puts the multipart middleware first, so it
/// sits closest to the bare handler; `extra` wraps around it in order.
pub fn compose(descriptor: &EndpointDescriptor, core: &CoreFn, extra: &[Middleware]) -> Handler {
    let mut chain = Vec::with_capacity(extra.len() + 1);
    if descriptor.multipart() {
        chain.push(middleware::multipart());
    }
    chain.extend(extra.iter().cloned());
    middleware::apply(bare_handler(core), &chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::Completion;
    use crate::definition::{DefinitionParser, Token};
    use crate::http::{Method, Reply, Response};
    use parking_lot::Mutex;
    use serde_json::json;
    use trellis_schema::{Schema, entry};

    #[derive(Debug, Default)]
    struct Outcome {
        responses: Vec<Option<u16>>,
        errors: Vec<EndpointError>,
        bodies: Vec<Option<Value>>,
    }

    fn recorder() -> (Arc<Mutex<Outcome>>, Respond, Raise) {
        let outcome = Arc::new(Mutex::new(Outcome::default()));
        let respond = {
            let outcome = Arc::clone(&outcome);
            Respond::new(move |response: Option<Response>| {
                let mut outcome = outcome.lock();
                outcome.responses.push(response.as_ref().map(|r| r.status));
                outcome.bodies.push(response.and_then(|r| r.json_body()));
            })
        };
        let raise = {
            let outcome = Arc::clone(&outcome);
            Raise::new(move |error| outcome.lock().errors.push(error))
        };
        (outcome, respond, raise)
    }

    fn compose_tokens(tokens: Vec<Token>, extra: &[Middleware]) -> Handler {
        let descriptor = DefinitionParser::new("tests", tokens).parse().unwrap();
        let core = CoreFn::build(&descriptor).unwrap();
        compose(&descriptor, &core, extra)
    }

    #[test]
    fn test_sync_success_responds() {
        let handler = compose_tokens(
            vec![
                Token::Method(Method::Get),
                Token::str("/:user-id"),
                Token::ident("r"),
                Token::ident("q"),
                Token::body(|scope| Ok(json!({"r": scope.get("r"), "q": scope.get("q")}).into())),
            ],
            &[],
        );
        let mut request = Request::get("/7?page-size=10");
        request.route_params.insert("user-id".into(), json!("7"));

        let (outcome, respond, raise) = recorder();
        handler(request, respond, raise).unwrap();
        let outcome = outcome.lock();
        assert_eq!(outcome.responses, vec![Some(200)]);
        assert!(outcome.errors.is_empty());
        assert_eq!(
            outcome.bodies[0],
            Some(json!({"r": {"user_id": "7"}, "q": {"page_size": "10"}}))
        );
    }

    #[test]
    fn test_sync_failure_raises_once() {
        let handler = compose_tokens(
            vec![
                Token::Method(Method::Post),
                Token::str("/"),
                Token::ident("_"),
                Token::ident("_"),
                Token::ident("b"),
                Token::Arrow,
                Token::schema(Schema::map([entry("name", Schema::non_blank_string())])),
            ],
            &[],
        );
        let (outcome, respond, raise) = recorder();
        handler(Request::post("/").with_json(json!({})), respond, raise).unwrap();
        let outcome = outcome.lock();
        assert!(outcome.responses.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].status_code(), 400);
    }

    #[test]
    fn test_sync_panic_raises() {
        let handler = compose_tokens(
            vec![
                Token::Method(Method::Get),
                Token::str("/"),
                Token::body(|_| panic!("kaboom")),
            ],
            &[],
        );
        let (outcome, respond, raise) = recorder();
        handler(Request::get("/"), respond, raise).unwrap();
        let outcome = outcome.lock();
        assert!(matches!(&outcome.errors[..], [EndpointError::Panicked(m)] if m == "kaboom"));
    }

    #[test]
    fn test_async_errors_are_not_caught() {
        let handler = compose_tokens(
            vec![
                Token::Method(Method::Get),
                Token::str("/"),
                Token::ident("respond"),
                Token::ident("raise"),
                Token::body(|_| Err(EndpointError::Internal("after taking over".into()))),
            ],
            &[],
        );
        let (outcome, respond, raise) = recorder();
        let err = handler(Request::get("/"), respond, raise).unwrap_err();
        assert_eq!(err.kind(), "internal");
        let outcome = outcome.lock();
        assert!(outcome.responses.is_empty());
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_middleware_folds_outward_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let tag = |name: &'static str| {
            let order = Arc::clone(&order);
            middleware::middleware(move |next: Handler| -> Handler {
                let order = Arc::clone(&order);
                handler(move |request, respond, raise| {
                    order.lock().push(name);
                    next(request, respond, raise)
                })
            })
        };
        let handler = compose_tokens(
            vec![
                Token::Method(Method::Get),
                Token::str("/"),
                Token::body(|_| Ok(Reply::null())),
            ],
            &[tag("inner"), tag("outer")],
        );
        let (respond, raise) = Completion::new(|_| {}, |_| {});
        handler(Request::get("/"), respond, raise).unwrap();
        assert_eq!(*order.lock(), vec!["outer", "inner"]);
    }
}
