//! Testing utilities for Trellis endpoints.
//!
//! [`TestClient`] dispatches requests through a module's dispatcher in
//! process and waits for the request to settle, reporting the result as
//! a [`TestOutcome`].
//!
//! ## Quick Start
//!
//! ```
//! use serde_json::json;
//! use std::sync::Arc;
//! use trellis_core::{EndpointDef, EndpointRegistry, Method};
//! use trellis_testing::*;
//!
//! # tokio_test::block_on(async {
//! let registry = Arc::new(EndpointRegistry::new());
//! EndpointDef::new(Method::Get, "/hello")
//!     .body(|_| Ok(json!({"greeting": "hello"}).into()))
//!     .register(&registry, "app")
//!     .unwrap();
//!
//! let client = TestClient::new(registry, "app");
//! let outcome = client.get("/hello").await;
//! assert_status(&outcome, 200);
//! assert_json(&outcome, &json!({"greeting": "hello"}));
//! assert_unmatched(&client.get("/bye").await);
//! # });
//! ```

pub mod assertions;
pub mod test_client;

pub use assertions::*;
pub use test_client::*;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use trellis_core::{EndpointDef, EndpointError, EndpointRegistry, Method, Reply};
    use trellis_schema::{Schema, entry};

    fn client(build: impl FnOnce(&EndpointRegistry)) -> TestClient {
        let registry = Arc::new(EndpointRegistry::new());
        build(&registry);
        TestClient::new(registry, "app").with_timeout(Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_responded() {
        let client = client(|registry| {
            EndpointDef::new(Method::Put, "/items/:id")
                .clause("route")
                .clause("_")
                .clause("body")
                .body(|scope| Ok(json!({"id": scope.get("route")["id"], "body": scope.get("body")}).into()))
                .register(registry, "app")
                .unwrap();
        });
        let outcome = client.put("/items/3", json!({"n": 1})).await;
        assert_status(&outcome, 200);
        assert_success(&outcome);
        assert_json_content_type(&outcome);
        assert_json(&outcome, &json!({"id": "3", "body": {"n": 1}}));
    }

    #[tokio::test]
    async fn test_raised() {
        let client = client(|registry| {
            EndpointDef::new(Method::Post, "/users")
                .clause("_")
                .clause("_")
                .clause_with("body", Schema::map([entry("name", Schema::non_blank_string())]))
                .register(registry, "app")
                .unwrap();
        });
        let outcome = client.post("/users", json!({})).await;
        assert_raised_status(&outcome, 400);
        assert_eq!(outcome.status(), Some(400));
    }

    #[tokio::test]
    async fn test_async_endpoint_left_pending() {
        let client = client(|registry| {
            EndpointDef::new(Method::Get, "/never")
                .callbacks()
                .body(|scope| {
                    // hold on to the callbacks without settling
                    let respond = scope.respond().cloned();
                    std::thread::spawn(move || {
                        std::thread::sleep(Duration::from_millis(500));
                        drop(respond);
                    });
                    Ok(Reply::null())
                })
                .register(registry, "app")
                .unwrap();
        });
        assert_pending(&client.get("/never").await);
    }

    #[tokio::test]
    async fn test_failed() {
        let client = client(|registry| {
            EndpointDef::new(Method::Delete, "/")
                .callbacks()
                .body(|_| Err(EndpointError::conflict("busy")))
                .register(registry, "app")
                .unwrap();
        });
        let outcome = client.delete("/").await;
        assert!(matches!(outcome, TestOutcome::Failed(_)));
        assert_eq!(outcome.status(), Some(409));
    }

    #[tokio::test]
    async fn test_request_builder() {
        let client = client(|registry| {
            EndpointDef::new(Method::Patch, "/search")
                .clause("_")
                .clause("query")
                .clause("_")
                .clause("request")
                .body(|scope| {
                    Ok(json!({
                        "query": scope.get("query"),
                        "token": scope.get("request")["headers"]["x-token"],
                    })
                    .into())
                })
                .register(registry, "app")
                .unwrap();
        });
        let request = TestRequestBuilder::new(Method::Patch, "/search")
            .header("X-Token", "abc")
            .query("q", "rust")
            .json(&json!({"ignored": true}))
            .unwrap()
            .build();
        let outcome = client.send(request).await;
        assert_json(&outcome, &json!({"query": {"q": "rust"}, "token": "abc"}));
    }
}
