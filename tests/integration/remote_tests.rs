//! Engine client tests against a mock engine.
//!
//! | Method | Path | Test |
//! |--------|------|------|
//! | POST | `/requests/{request_id}` | `test_get_*` |
//! | POST | `/images` | `test_get_image_*` |
//! | POST | `/reset` | `test_reset_*` |

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{json, Map, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_json as body_json_matcher, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use physrisk_gateway::{
    ComputeError, ImageRequest, RemoteRequester, RequestKind, Requester, TileCoord,
};

use super::test_utils::{body_bytes, body_json, get, post_json, test_router, PNG_BYTES};

fn engine_client(server: &MockServer) -> RemoteRequester {
    RemoteRequester::new(server.uri().parse().unwrap(), Duration::from_secs(5)).unwrap()
}

fn request_body(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(fields) => fields,
        other => panic!("expected object, got {}", other),
    }
}

// =============================================================================
// JSON Requests
// =============================================================================

#[tokio::test]
async fn test_get_posts_to_request_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/requests/get_hazard_data_availability"))
        .and(body_json_matcher(json!({"group_ids": ["osc"]})))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"models": []}"#))
        .expect(1)
        .mount(&server)
        .await;

    let raw = engine_client(&server)
        .get(
            RequestKind::HazardDataAvailability,
            request_body(json!({"group_ids": ["osc"]})),
        )
        .await
        .unwrap();

    assert_eq!(raw, r#"{"models": []}"#);
}

#[tokio::test]
async fn test_get_server_error_is_transient_upstream() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/requests/get_asset_impact"))
        .respond_with(ResponseTemplate::new(503).set_body_string("engine overloaded"))
        .mount(&server)
        .await;

    let err = engine_client(&server)
        .get(RequestKind::AssetImpact, Map::new())
        .await
        .unwrap_err();

    match &err {
        ComputeError::Upstream { status, message } => {
            assert_eq!(*status, 503);
            assert_eq!(message, "engine overloaded");
        }
        other => panic!("expected Upstream, got {:?}", other),
    }
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_get_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/requests/get_asset_exposure"))
        .respond_with(ResponseTemplate::new(404).set_body_string("unknown request"))
        .mount(&server)
        .await;

    let err = engine_client(&server)
        .get(RequestKind::AssetExposure, Map::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ComputeError::NotFound(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_long_error_body_truncated() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/requests/get_hazard_data"))
        .respond_with(ResponseTemplate::new(400).set_body_string("é".repeat(1000)))
        .mount(&server)
        .await;

    let err = engine_client(&server)
        .get(RequestKind::HazardData, Map::new())
        .await
        .unwrap_err();

    match err {
        ComputeError::Upstream { status, message } => {
            assert_eq!(status, 400);
            assert!(message.len() <= 512);
            assert!(message.chars().all(|c| c == 'é'));
        }
        other => panic!("expected Upstream, got {:?}", other),
    }
}

#[tokio::test]
async fn test_connection_refused() {
    // Nothing listens on port 1
    let requester =
        RemoteRequester::new("http://127.0.0.1:1".parse().unwrap(), Duration::from_secs(2))
            .unwrap();

    let err = requester
        .get(RequestKind::HazardData, Map::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ComputeError::Connection(_)));
    assert!(err.is_transient());
}

// =============================================================================
// Images and Reset
// =============================================================================

#[tokio::test]
async fn test_get_image_posts_image_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/images"))
        .and(body_partial_json(json!({
            "resource": "flood_depth",
            "tile": [3, 5, 4],
            "year": 2050,
            "group_ids": ["public"],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_BYTES.to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let request = ImageRequest::new("flood_depth", 2050, "public")
        .with_tile(Some(TileCoord::new(3, 5, 4)));
    let image = engine_client(&server).get_image(&request).await.unwrap();

    assert_eq!(&image[..], PNG_BYTES);
}

#[tokio::test]
async fn test_reset_posts_to_reset_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/reset"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    engine_client(&server).reset().await.unwrap();
}

#[tokio::test]
async fn test_reset_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/reset"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = engine_client(&server).reset().await.unwrap_err();
    assert!(matches!(err, ComputeError::Upstream { status: 500, .. }));
}

#[tokio::test]
async fn test_base_path_preserved() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/physrisk/requests/get_hazard_data"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let base = format!("{}/physrisk", server.uri());
    let requester = RemoteRequester::new(base.parse().unwrap(), Duration::from_secs(5)).unwrap();

    requester
        .get(RequestKind::HazardData, Map::new())
        .await
        .unwrap();
}

// =============================================================================
// Through the Router
// =============================================================================

#[tokio::test]
async fn test_router_against_engine() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/requests/get_hazard_data"))
        .and(body_partial_json(json!({"group_ids": ["public"]})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"items": [{"intensities": [0.1, 0.4]}]}"#),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/images"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_BYTES.to_vec()))
        .mount(&server)
        .await;

    let router = test_router(engine_client(&server));

    let response = router
        .clone()
        .oneshot(post_json("/api/get_hazard_data", r#"{"items": []}"#, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"items": [{"intensities": [0.1, 0.4]}]})
    );

    let response = router
        .oneshot(get("/api/tiles/flood/4/3/5.png?year=2050", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&body_bytes(response).await[..], PNG_BYTES);
}

#[tokio::test]
async fn test_router_engine_failure_maps_to_bad_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/requests/get_asset_impact"))
        .respond_with(ResponseTemplate::new(500).set_body_string("KeyError: 'assets'"))
        .mount(&server)
        .await;

    let router = test_router(engine_client(&server));

    let response = router
        .oneshot(post_json("/api/get_asset_impact", "{}", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(!body.to_string().contains("KeyError"));
}
