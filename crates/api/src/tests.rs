use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use ember_domain::board::BoardCategory;
use ember_infra::config::AppConfig;
use futures_util::StreamExt;
use serde_json::json;
use tower_util::ServiceExt;

use crate::routes;
use crate::state::AppState;

fn test_config() -> AppConfig {
    AppConfig {
        app_env: "test".to_string(),
        port: 0,
        log_level: "info".to_string(),
        data_backend: "memory".to_string(),
        redis_url: "redis://127.0.0.1:6379".to_string(),
        surreal_endpoint: "ws://127.0.0.1:8000".to_string(),
        surreal_ns: "ember".to_string(),
        surreal_db: "boards".to_string(),
        surreal_user: "root".to_string(),
        surreal_pass: "root".to_string(),
        feed_url: "http://127.0.0.1:9100/trends".to_string(),
        feed_timeout_ms: 1_000,
        poll_interval_ms: 10_000,
        rank_top_n: 10,
        board_initial_ttl_seconds: 1_800,
        board_poll_extension_seconds: 15,
        like_small_extension_seconds: 600,
        like_large_extension_seconds: 3_600,
        lock_wait_ms: 3_000,
        lock_lease_ms: 5_000,
        reconcile_interval_ms: 60_000,
    }
}

fn test_state() -> AppState {
    AppState::with_memory_backend(test_config())
}

fn test_state_router() -> (AppState, axum::Router) {
    let state = test_state();
    let app = routes::router(state.clone());
    (state, app)
}

/// Provisions a live board the way a poll cycle would.
async fn seed_board(state: &AppState, name: &str, ttl_seconds: u64, score: f64) -> i64 {
    let board = state
        .boards
        .find_or_create(name, BoardCategory::Realtime)
        .await
        .expect("board");
    let key = ember_domain::board::rank_key(&board.name, board.id);
    state.ranks.upsert(&key, score).await.expect("upsert");
    state
        .ranks
        .ensure_ttl(&key, Duration::from_secs(ttl_seconds))
        .await
        .expect("ttl");
    board.id
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&body).expect("json")
}

#[tokio::test]
async fn health_reports_ok() {
    let (_, app) = test_state_router();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["environment"], "test");
}

#[tokio::test]
async fn boards_list_orders_by_remaining_lifetime() {
    let (state, app) = test_state_router();
    seed_board(&state, "fading", 60, 1.0).await;
    let fresh_id = seed_board(&state, "fresh", 900, 5.0).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/boards?page=0&size=10")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["totalCount"], 2);
    assert_eq!(body["totalPages"], 1);
    let boards = body["boards"].as_array().expect("boards");
    assert_eq!(boards[0]["name"], "fresh");
    assert_eq!(boards[0]["id"], fresh_id);
    assert!(boards[0]["liveTimeSeconds"].as_i64().expect("ttl") > 100);
    assert_eq!(boards[1]["name"], "fading");
}

#[tokio::test]
async fn boards_list_rejects_zero_page_size() {
    let (_, app) = test_state_router();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/boards?size=0")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn like_toggle_flips_state_and_count() {
    let (state, app) = test_state_router();
    let board_id = seed_board(&state, "rust", 600, 1.0).await;

    let like = |app: axum::Router| async move {
        app.oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/v1/boards/rust/{board_id}/posts/7/likes"))
                .header("content-type", "application/json")
                .body(Body::from(json!({"actorId": "alice"}).to_string()))
                .expect("request"),
        )
        .await
        .expect("response")
    };

    let response = like(app.clone()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["liked"], true);
    assert_eq!(body["likeCount"], 1);

    let response = like(app.clone()).await;
    let body = body_json(response).await;
    assert_eq!(body["liked"], false);
    assert_eq!(body["likeCount"], 0);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/v1/boards/rust/{board_id}/posts/7/likes"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["likeCount"], 0);
}

#[tokio::test]
async fn like_on_unknown_board_is_not_found() {
    let (_, app) = test_state_router();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/boards/ghost/99/posts/1/likes")
                .header("content-type", "application/json")
                .body(Body::from(json!({"actorId": "alice"}).to_string()))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn like_with_wrong_board_name_is_not_found() {
    let (state, app) = test_state_router();
    let board_id = seed_board(&state, "rust", 600, 1.0).await;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/v1/boards/golang/{board_id}/posts/1/likes"))
                .header("content-type", "application/json")
                .body(Body::from(json!({"actorId": "alice"}).to_string()))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn blank_actor_id_is_rejected() {
    let (state, app) = test_state_router();
    let board_id = seed_board(&state, "rust", 600, 1.0).await;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/v1/boards/rust/{board_id}/posts/1/likes"))
                .header("content-type", "application/json")
                .body(Body::from(json!({"actorId": ""}).to_string()))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn views_count_monotonically() {
    let (state, app) = test_state_router();
    let board_id = seed_board(&state, "rust", 600, 1.0).await;

    for expected in 1..=2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/v1/boards/rust/{board_id}/posts/3/views"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["viewCount"], expected);
    }
}

#[tokio::test]
async fn subscribe_rejects_malformed_connection_ids() {
    let (_, app) = test_state_router();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/boards/subscribe/bad%20id")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn subscribe_registers_the_connection_and_greets() {
    let (state, app) = test_state_router();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/boards/subscribe/conn-1")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok()),
        Some("text/event-stream")
    );

    let known = state.bus.known_connections().await.expect("known");
    assert_eq!(known, vec!["conn-1".to_string()]);

    let mut stream = response.into_body().into_data_stream();
    let first = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("first frame")
        .expect("some frame")
        .expect("frame bytes");
    let text = String::from_utf8_lossy(&first);
    assert!(text.contains("event: connected"));
    assert!(text.contains("conn-1"));
}

#[tokio::test]
async fn targeted_events_reach_the_subscribed_stream() {
    let (state, app) = test_state_router();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/boards/subscribe/conn-2")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let mut stream = response.into_body().into_data_stream();

    // Skip the greeting frame.
    let _ = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("greeting");

    let event = ember_domain::events::BoardEvent::BoardExpired {
        board_id: 11,
        name: "rust".into(),
    };
    let published = ember_domain::events::fan_out(state.bus.as_ref(), &event)
        .await
        .expect("fan out");
    assert_eq!(published, 1);

    let frame = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("event frame")
        .expect("some frame")
        .expect("frame bytes");
    let text = String::from_utf8_lossy(&frame);
    assert!(text.contains("event: boardExpired"));
    assert!(text.contains("\"boardId\":11"));
}

#[tokio::test]
async fn dropped_stream_deregisters_the_connection() {
    let (state, app) = test_state_router();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/boards/subscribe/conn-3")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    let mut stream = response.into_body().into_data_stream();
    let _ = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("greeting");
    assert_eq!(
        state.bus.known_connections().await.expect("known"),
        vec!["conn-3".to_string()]
    );

    // Client goes away; the next delivery attempt fails and tears down
    // both the local map entry and the cross-process registration.
    drop(stream);
    let event = ember_domain::events::BoardEvent::BoardExpired {
        board_id: 12,
        name: "go".into(),
    };
    ember_domain::events::fan_out(state.bus.as_ref(), &event)
        .await
        .expect("fan out");

    let mut cleaned = false;
    for _ in 0..100 {
        if state.bus.known_connections().await.expect("known").is_empty() {
            cleaned = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(cleaned, "connection id was not deregistered after disconnect");
    assert_eq!(state.registry.held_count().await, 0);
}

#[tokio::test]
async fn metrics_endpoint_renders_after_init() {
    crate::observability::init_metrics().expect("metrics recorder");
    let (_, app) = test_state_router();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}
