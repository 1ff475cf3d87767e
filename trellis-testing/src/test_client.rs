// In-process test client

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use trellis_core::{Completion, EndpointError, EndpointRegistry, Method, Request, Response};

/// How long a request may stay unsettled before it counts as pending.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

enum Settlement {
    Respond(Option<Response>),
    Raise(EndpointError),
}

/// Drives one module's dispatcher without a server.
pub struct TestClient {
    registry: Arc<EndpointRegistry>,
    module: String,
    timeout: Duration,
}

impl TestClient {
    pub fn new(registry: Arc<EndpointRegistry>, module: impl Into<String>) -> Self {
        Self {
            registry,
            module: module.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub async fn get(&self, path: &str) -> TestOutcome {
        self.send(Request::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestOutcome {
        self.send(Request::post(path).with_json(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> TestOutcome {
        self.send(Request::new(Method::Put, path).with_json(body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> TestOutcome {
        self.send(Request::new(Method::Patch, path).with_json(body)).await
    }

    pub async fn delete(&self, path: &str) -> TestOutcome {
        self.send(Request::new(Method::Delete, path)).await
    }

    /// Dispatch a request and wait for it to settle.
    pub async fn send(&self, request: Request) -> TestOutcome {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let settle = move |settlement: Settlement| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(settlement);
            }
        };
        let on_raise = settle.clone();
        let (respond, raise) = Completion::new(
            move |response| settle(Settlement::Respond(response)),
            move |error| on_raise(Settlement::Raise(error)),
        );

        if let Err(error) = self.registry.dispatch(&self.module, request, respond, raise) {
            return TestOutcome::Failed(error);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Settlement::Respond(Some(response)))) => TestOutcome::Responded(response),
            Ok(Ok(Settlement::Respond(None))) => TestOutcome::Unmatched,
            Ok(Ok(Settlement::Raise(error))) => TestOutcome::Raised(error),
            // callbacks dropped unsettled, or still held past the timeout
            Ok(Err(_)) | Err(_) => TestOutcome::Pending,
        }
    }
}

/// Builder for test requests
#[derive(Debug, Clone)]
pub struct TestRequestBuilder {
    method: Method,
    path: String,
    headers: HashMap<String, String>,
    query: Vec<(String, Value)>,
    body: Option<Value>,
    raw: Option<(String, Vec<u8>)>,
}

impl TestRequestBuilder {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: HashMap::new(),
            query: Vec::new(),
            body: None,
            raw: None,
        }
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    pub fn query(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    /// Set a JSON body
    pub fn json<T: serde::Serialize>(mut self, data: &T) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_value(data)?);
        Ok(self)
    }

    /// Set a raw body, e.g. `multipart/form-data`
    pub fn raw(mut self, content_type: &str, body: Vec<u8>) -> Self {
        self.raw = Some((content_type.to_string(), body));
        self
    }

    pub fn build(self) -> Request {
        let mut request = Request::new(self.method, self.path);
        if let Some(body) = self.body {
            request = request.with_json(body);
        }
        if let Some((content_type, raw)) = self.raw {
            request = request.with_raw_body(&content_type, raw);
        }
        for (key, value) in self.headers {
            request = request.with_header(key, value);
        }
        for (key, value) in self.query {
            request = request.with_query(key, value);
        }
        request
    }
}

/// How a test request settled.
#[derive(Debug)]
pub enum TestOutcome {
    /// `respond` with a response
    Responded(Response),
    /// `respond(None)`: no route matched
    Unmatched,
    Raised(EndpointError),
    /// The handler returned an error instead of settling.
    Failed(EndpointError),
    /// Neither callback fired before the timeout.
    Pending,
}

impl TestOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            TestOutcome::Responded(response) => Some(response),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&EndpointError> {
        match self {
            TestOutcome::Raised(error) | TestOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Status of the response, or of the error it settled with.
    pub fn status(&self) -> Option<u16> {
        match self {
            TestOutcome::Responded(response) => Some(response.status),
            TestOutcome::Raised(error) | TestOutcome::Failed(error) => Some(error.status_code()),
            TestOutcome::Unmatched | TestOutcome::Pending => None,
        }
    }

    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, String> {
        let response = self
            .response()
            .ok_or_else(|| format!("no response: {:?}", self))?;
        let bytes = response
            .body_bytes()
            .ok_or_else(|| "streaming body".to_string())?;
        serde_json::from_slice(bytes).map_err(|e| format!("Serialization error: {}", e))
    }

    pub fn body_string(&self) -> Option<String> {
        self.response()
            .and_then(Response::body_bytes)
            .and_then(|bytes| String::from_utf8(bytes.to_vec()).ok())
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.response().and_then(|response| response.header(key))
    }

    pub fn is_unmatched(&self) -> bool {
        matches!(self, TestOutcome::Unmatched)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, TestOutcome::Pending)
    }
}
