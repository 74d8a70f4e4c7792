// Router tests
// Drive the axum router in-process with tower's oneshot

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use squery_core::{ErrorDetail, Operation, QueryResult, Violation};
use squery_server::{init_test_logging, HandlerOptions, RouteHandler};
use tower::ServiceExt;

#[derive(Deserialize)]
struct Lookup {
    id: u32,
}

fn require_id(input: &Value) -> Result<Value, Vec<Violation>> {
    if input.get("id").and_then(Value::as_u64).is_some() {
        Ok(input.clone())
    } else {
        Err(vec![Violation::new("invalid_type", "Required")])
    }
}

fn router() -> axum::Router {
    init_test_logging();

    let operations = vec![
        Operation::query_with("user", require_id, |input: Lookup| async move {
            if input.id == 0 {
                return Ok(QueryResult::err(
                    ErrorDetail::new().with_code("not_found").with_title("No such user"),
                ));
            }
            Ok(QueryResult::ok(json!({"id": input.id, "name": "Ada"})))
        }),
        Operation::mutation_with("rename", require_id, |input: Lookup| async move {
            Ok(QueryResult::ok(input.id))
        }),
    ];

    RouteHandler::new(operations, HandlerOptions::default())
        .unwrap()
        .router("/query")
}

async fn send(request: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let response = router().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ============================================================================
// QUERIES
// ============================================================================

#[tokio::test]
async fn test_get_query_with_encoded_payload() {
    let (status, content_type, body) = send(get("/query/user?payload=%7B%22id%22%3A7%7D")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    assert_eq!(body, json!({"ok": true, "err": false, "val": {"id": 7, "name": "Ada"}}));
}

#[tokio::test]
async fn test_operation_error_is_a_200_result() {
    let (status, _, body) = send(get("/query/user?payload=%7B%22id%22%3A0%7D")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], false);
    assert_eq!(body["val"][0]["code"], "not_found");
}

#[tokio::test]
async fn test_query_without_payload_takes_validation_path() {
    let (status, _, body) = send(get("/query/user")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["err"], true);
    assert_eq!(body["val"][0]["code"], "validation_failed");
}

// ============================================================================
// ROUTING ERRORS
// ============================================================================

#[tokio::test]
async fn test_unknown_id_is_bare_not_found() {
    let (status, _, body) = send(get("/query/unknown-id")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "404");
    assert_eq!(body["title"], "Not Found");
    assert!(body.get("ok").is_none());
}

#[tokio::test]
async fn test_get_on_mutation_is_405() {
    let (status, _, body) = send(get("/query/rename")).await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["title"], "Method Not Allowed");
}

#[tokio::test]
async fn test_base_path_alone_resolves_its_own_segment() {
    let (status, _, body) = send(get("/query")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "No matching query found for ID: query");
}

// ============================================================================
// MUTATIONS
// ============================================================================

#[tokio::test]
async fn test_post_mutation_with_json_body() {
    let (status, _, body) = send(post("/query/rename", r#"{"id":3}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true, "err": false, "val": 3}));
}

#[tokio::test]
async fn test_post_empty_body_takes_validation_path() {
    let (status, _, body) = send(post("/query/rename", "")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["val"][0]["code"], "validation_failed");
}

#[tokio::test]
async fn test_post_malformed_body_is_500() {
    let (status, _, body) = send(post("/query/rename", "{")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "500");
}
