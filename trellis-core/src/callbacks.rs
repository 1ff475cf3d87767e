//! `respond` / `raise` callback handles
//!
//! Every request is settled by exactly one call to either callback.
//! [`Completion`] creates a pair that enforces this: once one of them has
//! fired, further calls are dropped with a warning.

use crate::error::EndpointError;
use crate::http::Response;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

type RespondFn = dyn Fn(Option<Response>) + Send + Sync;
type RaiseFn = dyn Fn(EndpointError) + Send + Sync;

/// Success callback. `None` means no endpoint matched.
#[derive(Clone)]
pub struct Respond(Arc<RespondFn>);

impl Respond {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<Response>) + Send + Sync + 'static,
    {
        Respond(Arc::new(f))
    }

    pub fn call(&self, response: Option<Response>) {
        (self.0)(response)
    }
}

impl fmt::Debug for Respond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Respond")
    }
}

/// Failure callback.
#[derive(Clone)]
pub struct Raise(Arc<RaiseFn>);

impl Raise {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(EndpointError) + Send + Sync + 'static,
    {
        Raise(Arc::new(f))
    }

    pub fn call(&self, error: EndpointError) {
        (self.0)(error)
    }
}

impl fmt::Debug for Raise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Raise")
    }
}

/// Builds a `respond`/`raise` pair sharing one settled flag.
pub struct Completion;

impl Completion {
    pub fn new<R, E>(on_respond: R, on_raise: E) -> (Respond, Raise)
    where
        R: Fn(Option<Response>) + Send + Sync + 'static,
        E: Fn(EndpointError) + Send + Sync + 'static,
    {
        let settled = Arc::new(AtomicBool::new(false));

        let respond = {
            let settled = Arc::clone(&settled);
            Respond::new(move |response| {
                if settled.swap(true, Ordering::AcqRel) {
                    warn!("request already settled, dropping response");
                    return;
                }
                on_respond(response)
            })
        };

        let raise = Raise::new(move |error| {
            if settled.swap(true, Ordering::AcqRel) {
                warn!(error = %error, "request already settled, dropping error");
                return;
            }
            on_raise(error)
        });

        (respond, raise)
    }
}
