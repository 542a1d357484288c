use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use ember_domain::board::{parse_rank_key, Board};
use ember_domain::engagement::LikeToggle;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tokio_stream::wrappers::UnboundedReceiverStream;
use validator::Validate;

use crate::middleware as app_middleware;
use crate::{error::ApiError, observability, state::AppState, validation};

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;
const SSE_HEARTBEAT: Duration = Duration::from_secs(15);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/v1/boards", get(list_boards))
        .route(
            "/v1/boards/:name/:board_id/posts/:post_id/likes",
            post(toggle_like).get(like_count),
        )
        .route(
            "/v1/boards/:name/:board_id/posts/:post_id/views",
            post(record_view),
        )
        .route("/v1/boards/subscribe/:connection_id", get(subscribe))
        .layer(middleware::from_fn(app_middleware::metrics_layer))
        .layer(app_middleware::timeout_layer())
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
    })
}

async fn metrics() -> Response {
    match observability::render_metrics() {
        Some(body) => body.into_response(),
        None => ApiError::Unavailable.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct BoardsQuery {
    page: Option<u64>,
    size: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BoardItem {
    id: i64,
    name: String,
    live_time_seconds: i64,
    score: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BoardsResponse {
    total_count: u64,
    total_pages: u64,
    page: u64,
    size: u64,
    boards: Vec<BoardItem>,
}

/// Live boards ordered by remaining lifetime, freshest first.
async fn list_boards(
    State(state): State<AppState>,
    Query(query): Query<BoardsQuery>,
) -> Result<Json<BoardsResponse>, ApiError> {
    let page = query.page.unwrap_or(0);
    let size = query.size.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);

    let board_page = state.ranks.page_by_recency(page, size).await?;
    let mut boards = Vec::with_capacity(board_page.entries.len());
    for entry in board_page.entries {
        let Some((name, id)) = parse_rank_key(&entry.key) else {
            tracing::warn!(key = %entry.key, "skipping unparseable leaderboard member");
            continue;
        };
        boards.push(BoardItem {
            id,
            name,
            live_time_seconds: entry.ttl_seconds,
            score: entry.score,
        });
    }

    Ok(Json(BoardsResponse {
        total_count: board_page.total_count,
        total_pages: board_page.total_pages,
        page,
        size,
        boards,
    }))
}

async fn resolve_board(state: &AppState, name: &str, board_id: i64) -> Result<Board, ApiError> {
    let board = state
        .boards
        .find_by_id(board_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if board.name != name || !board.active {
        return Err(ApiError::NotFound);
    }
    Ok(board)
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct LikeRequest {
    #[validate(length(min = 1, max = 128))]
    actor_id: String,
}

async fn toggle_like(
    State(state): State<AppState>,
    Path((name, board_id, post_id)): Path<(String, i64, i64)>,
    Json(payload): Json<LikeRequest>,
) -> Result<Json<LikeToggle>, ApiError> {
    validation::validate(&payload)?;
    let board = resolve_board(&state, &name, board_id).await?;
    let toggle = state
        .engagement
        .toggle_like(&board, post_id, &payload.actor_id)
        .await?;
    observability::register_like_toggle(toggle.liked);
    Ok(Json(toggle))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LikeCountResponse {
    like_count: u64,
}

async fn like_count(
    State(state): State<AppState>,
    Path((name, board_id, post_id)): Path<(String, i64, i64)>,
) -> Result<Json<LikeCountResponse>, ApiError> {
    resolve_board(&state, &name, board_id).await?;
    let like_count = state.engagement.like_count(board_id, post_id).await?;
    Ok(Json(LikeCountResponse { like_count }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ViewResponse {
    view_count: u64,
}

async fn record_view(
    State(state): State<AppState>,
    Path((name, board_id, post_id)): Path<(String, i64, i64)>,
) -> Result<Json<ViewResponse>, ApiError> {
    resolve_board(&state, &name, board_id).await?;
    let view_count = state.engagement.record_view(board_id, post_id).await?;
    Ok(Json(ViewResponse { view_count }))
}

/// Live event stream. The client picks its connection id and reuses it on
/// reconnect; an attach under an existing id supersedes the old stream.
async fn subscribe(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
) -> Result<Response, ApiError> {
    if !validation::valid_connection_id(&connection_id) {
        return Err(ApiError::Validation("invalid connection id".into()));
    }

    let mut events = state.registry.attach(&connection_id).await;
    if let Err(err) = state.bus.register_connection(&connection_id).await {
        state.registry.detach(&connection_id).await;
        return Err(err.into());
    }

    let (tx, rx) = mpsc::unbounded_channel::<Result<Event, Infallible>>();
    let _ = tx.send(Ok(Event::default()
        .event("connected")
        .data(connection_id.clone())));

    let state_clone = state.clone();
    tokio::spawn(async move {
        // First tick after one full period; the greeting already went out.
        let mut heartbeat = interval_at(Instant::now() + SSE_HEARTBEAT, SSE_HEARTBEAT);
        let mut superseded = false;
        loop {
            tokio::select! {
                maybe = events.recv() => {
                    match maybe {
                        Some(event) => {
                            let payload = match serde_json::to_string(&event) {
                                Ok(payload) => payload,
                                Err(err) => {
                                    tracing::warn!(error = %err, "unserializable event; skipping");
                                    continue;
                                }
                            };
                            if tx
                                .send(Ok(Event::default().event(event.kind()).data(payload)))
                                .is_err()
                            {
                                break;
                            }
                        }
                        // A newer attach under the same id took over.
                        None => {
                            superseded = true;
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if tx
                        .send(Ok(Event::default().event("ping").data("keep-alive")))
                        .is_err()
                    {
                        break;
                    }
                    // The liveness ping doubles as the registration refresh,
                    // keeping the cross-process id from aging out.
                    if let Err(err) = state_clone.bus.register_connection(&connection_id).await {
                        tracing::warn!(
                            connection_id = %connection_id,
                            error = %err,
                            "connection registration refresh failed"
                        );
                    }
                }
            }
        }

        if !superseded {
            state_clone.registry.detach(&connection_id).await;
            if let Err(err) = state_clone.bus.deregister_connection(&connection_id).await {
                tracing::warn!(
                    connection_id = %connection_id,
                    error = %err,
                    "connection deregistration failed"
                );
            }
        }
    });

    Ok(Sse::new(UnboundedReceiverStream::new(rx))
        .keep_alive(KeepAlive::new().interval(SSE_HEARTBEAT))
        .into_response())
}
