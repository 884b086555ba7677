use std::{collections::HashSet, net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde_json::Value;
use server_api::{parse_id, CollectionStore};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{ClientFrame, MutationResponse, Page, ServerFrame, StatusResponse},
    query::QueryParams,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::load_settings;

#[derive(Clone)]
struct AppState {
    store: CollectionStore,
    events: broadcast::Sender<ServerFrame>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = load_settings();
    let store = if settings.seed_demo_data {
        CollectionStore::with_demo_data()
            .await
            .map_err(|error| anyhow::anyhow!("failed to seed demo data: {}", error.message))?
    } else {
        CollectionStore::new()
    };
    let (events, _) = broadcast::channel(settings.event_buffer.max(1));

    let app = build_router(Arc::new(AppState { store, events }));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, seed_demo_data = settings.seed_demo_data, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/:collection", get(list_rows).post(create_row))
        .route("/api/:collection/:id", put(update_row).delete(delete_row))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

fn status_of(error: &ApiError) -> StatusCode {
    StatusCode::from_u16(error.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn publish(state: &AppState, collection: &str, entity: &Value) {
    let frame = ServerFrame::EntityChanged {
        room: collection.to_string(),
        entity: entity.clone(),
    };
    if state.events.send(frame).is_err() {
        debug!(collection, "no websocket clients for entity change");
    }
}

async fn list_rows(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Page<Value>>, (StatusCode, Json<ApiError>)> {
    let params = QueryParams::from_query_pairs(pairs).map_err(|e| {
        let error = ApiError::from(e);
        (status_of(&error), Json(error))
    })?;
    let page = state
        .store
        .list(&collection, &params)
        .await
        .map_err(|e| (status_of(&e), Json(e)))?;
    Ok(Json(page))
}

async fn create_row(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    Json(draft): Json<Value>,
) -> Response {
    match state.store.create(&collection, draft).await {
        Ok(entity) => {
            publish(&state, &collection, &entity);
            Json(MutationResponse::ok(entity)).into_response()
        }
        Err(error) => mutation_failure(error),
    }
}

async fn update_row(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
    Json(entity): Json<Value>,
) -> Response {
    match state.store.update(&collection, &parse_id(&id), entity).await {
        Ok(entity) => {
            publish(&state, &collection, &entity);
            Json(MutationResponse::ok(entity)).into_response()
        }
        Err(error) => mutation_failure(error),
    }
}

fn mutation_failure(error: ApiError) -> Response {
    let status = status_of(&error);
    let body = MutationResponse::<Value>::failed(status.as_u16(), error.message);
    (status, Json(body)).into_response()
}

async fn delete_row(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
) -> Response {
    match state.store.delete(&collection, &parse_id(&id)).await {
        Ok(()) => Json(StatusResponse::ok()).into_response(),
        Err(error) => {
            let status = status_of(&error);
            let body = StatusResponse::failed(status.as_u16(), error.message);
            (status, Json(body)).into_response()
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: &ServerFrame) -> bool {
    let text = match serde_json::to_string(frame) {
        Ok(v) => v,
        Err(_) => return true,
    };
    sender.send(Message::Text(text)).await.is_ok()
}

/// Forwards entity changes for the rooms this socket has joined.
async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.events.subscribe());
    let mut rooms: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(ClientFrame::JoinRoom { room }) => {
                        debug!(%room, "ws: joined room");
                        rooms.insert(room);
                    }
                    Ok(ClientFrame::LeaveRoom { room }) => {
                        debug!(%room, "ws: left room");
                        rooms.remove(&room);
                    }
                    Err(error) => {
                        let frame = ServerFrame::Error(ApiError::new(
                            ErrorCode::Validation,
                            format!("invalid client frame: {error}"),
                        ));
                        if !send_frame(&mut sender, &frame).await {
                            break;
                        }
                    }
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            event = events.next() => match event {
                Some(Ok(frame)) => {
                    let joined = match &frame {
                        ServerFrame::EntityChanged { room, .. } => rooms.contains(room),
                        ServerFrame::Error(_) => true,
                    };
                    if joined && !send_frame(&mut sender, &frame).await {
                        break;
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(skipped, "ws: client fell behind entity changes");
                }
                None => break,
            },
        }
    }
    debug!(rooms = rooms.len(), "ws: connection closed");
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
