//! Per-module request dispatch

use crate::callbacks::{Raise, Respond};
use crate::error::EndpointError;
use crate::handler::Handler;
use crate::http::{Method, Request};
use crate::registry::OrderedEndpoints;
use crate::route::PathMatcher;
use std::collections::HashMap;
use tracing::{error, trace};

struct Candidate {
    matcher: PathMatcher,
    handler: Handler,
}

/// Handlers grouped by method, in registration order.
#[derive(Default)]
pub struct Dispatcher {
    routes: HashMap<Method, Vec<Candidate>>,
}

impl Dispatcher {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile the matchers of every registered endpoint.
    pub fn compile(endpoints: &OrderedEndpoints) -> Self {
        let mut routes: HashMap<Method, Vec<Candidate>> = HashMap::new();
        for (key, info) in endpoints.iter() {
            match info.descriptor.route.matcher() {
                Ok(matcher) => routes.entry(key.method).or_default().push(Candidate {
                    matcher,
                    handler: info.handler.clone(),
                }),
                // checked when the endpoint was defined
                Err(err) => error!(path = %key.path, error = %err, "skipping route that does not compile"),
            }
        }
        Self { routes }
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Route a request to the first matching handler.
    ///
    /// Without a match `respond(None)` is called; `raise` never is.
    pub fn dispatch(
        &self,
        mut request: Request,
        respond: Respond,
        raise: Raise,
    ) -> Result<(), EndpointError> {
        let candidates = self.routes.get(&request.method).map(Vec::as_slice).unwrap_or_default();
        for candidate in candidates {
            trace!(path = %request.path, template = candidate.matcher.template(), "trying route");
            if let Some(params) = candidate.matcher.matches(&request.path) {
                request.route_params.extend(params);
                return (candidate.handler)(request, respond, raise);
            }
        }
        trace!(method = %request.method, path = %request.path, "no route matched");
        respond.call(None);
        Ok(())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut routes: Vec<(Method, Vec<&str>)> = self
            .routes
            .iter()
            .map(|(method, candidates)| {
                (*method, candidates.iter().map(|c| c.matcher.template()).collect())
            })
            .collect();
        routes.sort_by_key(|(method, _)| *method);
        f.debug_struct("Dispatcher").field("routes", &routes).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::Completion;
    use crate::endpoint::EndpointDef;
    use crate::http::Response;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn compile(defs: Vec<(Method, &str, &'static str)>) -> Dispatcher {
        let mut endpoints = OrderedEndpoints::new();
        for (method, path, tag) in defs {
            let (key, info) = EndpointDef::new(method, path)
                .body(move |_| Ok(json!(tag).into()))
                .build("tests")
                .unwrap();
            endpoints.insert(key, info);
        }
        Dispatcher::compile(&endpoints)
    }

    /// `Some(None)` when `respond(None)` was called.
    fn run(dispatcher: &Dispatcher, method: Method, path: &str) -> Option<Option<Value>> {
        let seen = Arc::new(Mutex::new(None));
        let (respond, raise) = {
            let seen = Arc::clone(&seen);
            Completion::new(
                move |response: Option<Response>| {
                    *seen.lock() = Some(response.and_then(|r| r.json_body()))
                },
                |error| panic!("unexpected raise: {}", error),
            )
        };
        dispatcher
            .dispatch(Request::new(method, path), respond, raise)
            .unwrap();
        let outcome = seen.lock().take();
        outcome
    }

    #[test]
    fn test_first_registered_match_wins_per_method() {
        let dispatcher = compile(vec![
            (Method::Get, "/items/:id", "get-by-id"),
            (Method::Get, "/items/new", "get-new"),
            (Method::Post, "/items/new", "post-new"),
            (Method::Post, "/items/:id", "post-by-id"),
        ]);
        assert_eq!(dispatcher.len(), 4);

        assert_eq!(run(&dispatcher, Method::Get, "/items/new"), Some(Some(json!("get-by-id"))));
        assert_eq!(run(&dispatcher, Method::Post, "/items/new"), Some(Some(json!("post-new"))));
        assert_eq!(run(&dispatcher, Method::Post, "/items/7"), Some(Some(json!("post-by-id"))));
    }

    #[test]
    fn test_no_match_responds_with_none() {
        let dispatcher = compile(vec![(Method::Get, "/items/:id", "get-by-id")]);

        assert_eq!(run(&dispatcher, Method::Delete, "/items/7"), Some(None));
        assert_eq!(run(&dispatcher, Method::Get, "/other"), Some(None));
        assert_eq!(run(&Dispatcher::empty(), Method::Get, "/"), Some(None));
        assert!(Dispatcher::empty().is_empty());
    }
}
