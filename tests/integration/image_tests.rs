//! Image and tile integration tests.
//!
//! Tests verify:
//! - Query parameters and path coordinates reach the engine intact
//! - Incomplete or zero tile coordinates render the whole array
//! - Missing or invalid parameters answer 400, render failures 500
//! - Rendered images are cached until reset

use axum::http::{header, StatusCode};
use tower::ServiceExt;

use physrisk_gateway::{CachingRequester, ComputeError, TileCoord};

use super::test_utils::{
    body_bytes, body_json, get, long_lived_token, test_router, MockRequester, RecordedCall,
    PNG_BYTES,
};

// =============================================================================
// Whole-Array Images
// =============================================================================

#[tokio::test]
async fn test_image_returns_png() {
    let requester = MockRequester::new();
    let router = test_router(requester.clone());

    let response = router
        .oneshot(get("/api/images/days_above_35c.png?year=2050", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/png"
    );
    assert_eq!(&body_bytes(response).await[..], PNG_BYTES);

    let request = requester.only_image().await;
    assert_eq!(request.resource, "days_above_35c");
    assert_eq!(request.year, 2050);
    assert_eq!(request.tile, None);
    assert_eq!(request.group_ids, vec!["public".to_string()]);
    assert_eq!(request.min_value, None);
    assert_eq!(request.max_value, None);
}

#[tokio::test]
async fn test_image_query_parameters_forwarded() {
    let requester = MockRequester::new();
    let router = test_router(requester.clone());

    let response = router
        .oneshot(get(
            "/api/images/flood_depth.png?minValue=0.5&maxValue=3&colormap=flare&scenarioId=ssp585&year=2080",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = requester.only_image().await;
    assert_eq!(request.min_value, Some(0.5));
    assert_eq!(request.max_value, Some(3.0));
    assert_eq!(request.colormap.as_deref(), Some("flare"));
    assert_eq!(request.scenario_id.as_deref(), Some("ssp585"));
    assert_eq!(request.year, 2080);
}

#[tokio::test]
async fn test_image_with_token_uses_token_tier() {
    let requester = MockRequester::new();
    let router = test_router(requester.clone());
    let token = long_lived_token("osc");

    let response = router
        .oneshot(get("/api/images/flood.png?year=2030", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = requester.only_image().await;
    assert_eq!(request.group_ids, vec!["osc".to_string()]);
}

#[tokio::test]
async fn test_image_with_bad_token_still_renders() {
    let requester = MockRequester::new();
    let router = test_router(requester.clone());

    let response = router
        .oneshot(get("/api/images/flood.png?year=2030", Some("garbage")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = requester.only_image().await;
    assert_eq!(request.group_ids, vec!["public".to_string()]);
}

#[tokio::test]
async fn test_image_format_extension_ignored() {
    let requester = MockRequester::new();
    let router = test_router(requester.clone());

    let response = router
        .oneshot(get("/api/images/flood.jpeg?year=2030", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/png"
    );
    assert_eq!(requester.only_image().await.resource, "flood");
}

// =============================================================================
// Tiles
// =============================================================================

#[tokio::test]
async fn test_tile_coordinates_forwarded() {
    let requester = MockRequester::new();
    let router = test_router(requester.clone());

    // Path order is z/x/y
    let response = router
        .oneshot(get("/api/tiles/flood_depth/4/3/5.png?year=2050", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/png"
    );

    let request = requester.only_image().await;
    assert_eq!(request.resource, "flood_depth");
    assert_eq!(request.tile, Some(TileCoord::new(3, 5, 4)));
}

#[tokio::test]
async fn test_tile_with_zero_coordinate_is_whole_array() {
    for uri in [
        "/api/tiles/flood/0/3/5.png?year=2050",
        "/api/tiles/flood/4/0/5.png?year=2050",
        "/api/tiles/flood/4/3/0.png?year=2050",
    ] {
        let requester = MockRequester::new();
        let router = test_router(requester.clone());

        let response = router.oneshot(get(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);

        let request = requester.only_image().await;
        assert_eq!(request.tile, None, "{}", uri);
    }
}

#[tokio::test]
async fn test_tile_with_non_integer_coordinate_is_bad_request() {
    for uri in [
        "/api/tiles/flood/four/3/5.png?year=2050",
        "/api/tiles/flood/4/-3/5.png?year=2050",
        "/api/tiles/flood/4/3/five.png?year=2050",
    ] {
        let requester = MockRequester::new();
        let router = test_router(requester.clone());

        let response = router.oneshot(get(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(requester.call_count().await, 0);
    }
}

// =============================================================================
// Parameter Errors
// =============================================================================

#[tokio::test]
async fn test_missing_year_is_bad_request() {
    let requester = MockRequester::new();
    let router = test_router(requester.clone());

    let response = router
        .oneshot(get("/api/images/flood.png?colormap=flare", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "missing_parameter");
    assert!(body["message"].as_str().unwrap().contains("year"));

    assert_eq!(requester.call_count().await, 0);
}

#[tokio::test]
async fn test_invalid_year_is_bad_request() {
    let requester = MockRequester::new();
    let router = test_router(requester.clone());

    let response = router
        .oneshot(get("/api/tiles/flood/4/3/5.png?year=soon", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_parameter");
    assert_eq!(requester.call_count().await, 0);
}

#[tokio::test]
async fn test_invalid_value_bound_is_bad_request() {
    let requester = MockRequester::new();
    let router = test_router(requester.clone());

    let response = router
        .oneshot(get("/api/images/flood.png?year=2050&minValue=low", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("minValue"));
}

// =============================================================================
// Render Failures
// =============================================================================

#[tokio::test]
async fn test_render_failure_is_server_error() {
    let requester = MockRequester::new().with_image_error(ComputeError::Upstream {
        status: 500,
        message: "no pyramid for inundation/secret/path".to_string(),
    });
    let router = test_router(requester);

    let response = router
        .oneshot(get("/api/tiles/flood/4/3/5.png?year=2050", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "render_error");
    assert!(!body.to_string().contains("secret"));
}

#[tokio::test]
async fn test_missing_resource_is_server_error() {
    let requester =
        MockRequester::new().with_image_error(ComputeError::NotFound("flood".to_string()));
    let router = test_router(requester);

    let response = router
        .oneshot(get("/api/images/flood.png?year=2050", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// =============================================================================
// Caching
// =============================================================================

#[tokio::test]
async fn test_repeated_image_served_from_cache() {
    let requester = MockRequester::new();
    let router = test_router(CachingRequester::new(requester.clone()));

    for _ in 0..3 {
        let response = router
            .clone()
            .oneshot(get("/api/images/flood.png?year=2050", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&body_bytes(response).await[..], PNG_BYTES);
    }

    assert_eq!(requester.call_count().await, 1);
}

#[tokio::test]
async fn test_cache_distinguishes_access_tiers() {
    let requester = MockRequester::new();
    let router = test_router(CachingRequester::new(requester.clone()));
    let token = long_lived_token("osc");

    let response = router
        .clone()
        .oneshot(get("/api/images/flood.png?year=2050", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(get("/api/images/flood.png?year=2050", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let calls = requester.calls().await;
    assert_eq!(calls.len(), 2);
    let tiers: Vec<_> = calls
        .iter()
        .map(|call| match call {
            RecordedCall::Image(request) => request.group_ids.clone(),
            other => panic!("unexpected call {:?}", other),
        })
        .collect();
    assert_eq!(tiers, vec![vec!["public".to_string()], vec!["osc".to_string()]]);
}

#[tokio::test]
async fn test_reset_clears_image_cache() {
    let requester = MockRequester::new();
    let router = test_router(CachingRequester::new(requester.clone()));

    for uri in [
        "/api/images/flood.png?year=2050",
        "/api/reset",
        "/api/images/flood.png?year=2050",
    ] {
        let response = router.clone().oneshot(get(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
    }

    let calls = requester.calls().await;
    assert_eq!(calls.len(), 3);
    assert!(matches!(calls[0], RecordedCall::Image(_)));
    assert_eq!(calls[1], RecordedCall::Reset);
    assert!(matches!(calls[2], RecordedCall::Image(_)));
}
