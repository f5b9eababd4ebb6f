use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

use super::{DashboardState, WsFrame};

/// Serve the dashboard surface: a websocket pushing state/activity
/// frames plus a couple of plain JSON endpoints. The HTML front end
/// itself lives outside this process.
pub async fn start_dashboard_server(dashboard: DashboardState, port: u16) -> Result<()> {
    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/state", get(get_state))
        .route("/api/activity", get(get_activity))
        .route("/ws", get(websocket_handler))
        .layer(CorsLayer::permissive())
        .with_state(dashboard);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Dashboard state server listening on port {port}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn get_state(State(dashboard): State<DashboardState>) -> impl IntoResponse {
    Json(dashboard.latest().await)
}

async fn get_activity(State(dashboard): State<DashboardState>) -> impl IntoResponse {
    Json(dashboard.recent_activity(50).await)
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(dashboard): State<DashboardState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_websocket(socket, dashboard))
}

async fn handle_websocket(socket: WebSocket, dashboard: DashboardState) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = dashboard.tx.subscribe();

    info!("Dashboard client connected");

    // Snapshot first so the client renders immediately.
    let initial = WsFrame::State(Box::new(dashboard.latest().await));
    if let Ok(text) = serde_json::to_string(&initial) {
        let _ = sender.send(Message::Text(text)).await;
    }

    let send_task = tokio::spawn(async move {
        while let Ok(frame) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&frame) {
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Ping(_)) => debug!("Dashboard client ping"),
            Ok(Message::Close(_)) => {
                info!("Dashboard client disconnected");
                break;
            }
            Err(e) => {
                error!("Dashboard websocket error: {e}");
                break;
            }
            _ => {}
        }
    }

    send_task.abort();
}
