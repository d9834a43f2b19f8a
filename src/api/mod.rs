//! Read-only telemetry API.
//!
//! A small HTTP surface over the harness's persisted state plus a WebSocket
//! push channel fed by the event bus. Nothing here mutates the backlog; the
//! only writes are the alert read/dismiss operations.

mod projections;
mod routes;
mod timeline;
mod ws;

pub use projections::compute_projections;
pub use timeline::compute_timeline;

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use axum::routing::{get, post};
use axum::Router;
use tokio::task::JoinHandle;
use tracing::info;

use crate::alerts::AlertStore;
use crate::backlog::BacklogStore;
use crate::events::{EventBus, StatusSnapshot};
use crate::logging::SessionHistory;
use crate::progress::ProgressLog;

/// Shared state behind every handler. Cloning is cheap; the heavyweight
/// members are paths or `Arc`s.
#[derive(Clone)]
pub struct ApiState {
    pub backlog_store: BacklogStore,
    pub history: SessionHistory,
    pub progress: ProgressLog,
    pub alerts: Arc<AlertStore>,
    pub status: Arc<RwLock<StatusSnapshot>>,
    pub bus: EventBus,
}

/// Build the full router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/backlog", get(routes::get_backlog))
        .route("/api/backlog/:id", get(routes::get_feature))
        .route("/api/sessions", get(routes::get_sessions))
        .route("/api/sessions/costs", get(routes::get_costs))
        .route("/api/sessions/:id", get(routes::get_session))
        .route("/api/progress", get(routes::get_progress))
        .route("/api/progress/full", get(routes::get_progress_full))
        .route("/api/projections", get(routes::get_projections))
        .route("/api/timeline", get(routes::get_timeline))
        .route("/api/alerts", get(routes::get_alerts))
        .route("/api/alerts/unread/count", get(routes::get_unread_count))
        .route("/api/alerts/:id/read", post(routes::mark_alert_read))
        .route("/api/alerts/read-all", post(routes::mark_all_alerts_read))
        .route("/api/alerts/:id/dismiss", post(routes::dismiss_alert))
        .route("/ws/events", get(ws::ws_handler))
        .with_state(state)
}

/// Maximum ports probed past the configured one.
const MAX_PORT_ATTEMPTS: u16 = 50;

/// Bind the first free port at or after `port` and serve in a background
/// task. Returns the bound address.
pub async fn serve(
    state: ApiState,
    host: &str,
    port: u16,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let ip: std::net::IpAddr = host
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{e}")))?;

    let mut bound = None;
    for offset in 0..MAX_PORT_ATTEMPTS {
        let addr = SocketAddr::from((ip, port.saturating_add(offset)));
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                bound = Some(listener);
                break;
            }
            Err(_) => continue,
        }
    }
    let listener = bound.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            format!("no free port in {port}..{}", port + MAX_PORT_ATTEMPTS),
        )
    })?;

    let addr = listener.local_addr()?;
    info!(%addr, "telemetry API listening");
    let app = router(state);
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((addr, handle))
}
