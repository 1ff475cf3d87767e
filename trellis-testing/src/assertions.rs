// Assertions over test outcomes

use crate::TestOutcome;
use serde_json::Value;

/// Assert the request was answered with `expected`.
pub fn assert_status(outcome: &TestOutcome, expected: u16) {
    let actual = outcome.response().map(|r| r.status);
    assert_eq!(
        actual,
        Some(expected),
        "Expected response status {}, got {:?}",
        expected,
        outcome
    );
}

/// Assert the response body equals `expected`.
pub fn assert_json(outcome: &TestOutcome, expected: &Value) {
    let actual: Value = outcome
        .body_json()
        .unwrap_or_else(|e| panic!("Expected a JSON body: {}", e));
    assert_eq!(actual, *expected, "JSON bodies do not match");
}

pub fn assert_header(outcome: &TestOutcome, key: &str, expected: &str) {
    let actual = outcome.header(key);
    assert_eq!(
        actual,
        Some(expected),
        "Expected header '{}' to be '{}', got {:?}",
        key,
        expected,
        actual
    );
}

/// Assert the request was settled through `raise` with `expected`.
pub fn assert_raised_status(outcome: &TestOutcome, expected: u16) {
    match outcome {
        TestOutcome::Raised(error) => assert_eq!(
            error.status_code(),
            expected,
            "Expected raised status {}, got {}",
            expected,
            error
        ),
        other => panic!("Expected a raised error, got {:?}", other),
    }
}

pub fn assert_unmatched(outcome: &TestOutcome) {
    assert!(outcome.is_unmatched(), "Expected no route to match, got {:?}", outcome);
}

pub fn assert_pending(outcome: &TestOutcome) {
    assert!(outcome.is_pending(), "Expected the request to stay pending, got {:?}", outcome);
}

/// Assert a 2xx response
pub fn assert_success(outcome: &TestOutcome) {
    let status = outcome.response().map(|r| r.status).unwrap_or(0);
    assert!(
        (200..300).contains(&status),
        "Expected successful status (2xx), got {:?}",
        outcome
    );
}

pub fn assert_json_content_type(outcome: &TestOutcome) {
    let content_type = outcome.header("content-type");
    assert!(
        content_type.is_some_and(|ct| ct.contains("application/json")),
        "Expected JSON content type, got {:?}",
        content_type
    );
}
