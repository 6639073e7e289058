//! Query server.
//!
//! Handlers only read the store; each read runs in its own redb read
//! transaction on the blocking pool, so a slow or failing query never
//! touches the ingestion writer.

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use binocular_common::error::{BinocularError, Result};
use binocular_store::EventStore;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Shared state for the handlers.
#[derive(Clone)]
struct AppState {
    store: EventStore,
}

/// Builds the router over `store`.
pub fn router(store: EventStore) -> Router {
    Router::new()
        .route("/logs", get(logs_handler))
        .route("/health", get(health_handler))
        .fallback(fallback_handler)
        .with_state(AppState { store })
}

/// A bound query server.
#[derive(Debug)]
pub struct QueryServer {
    listener: TcpListener,
    store: EventStore,
}

impl QueryServer {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns an error if `addr` is invalid or cannot be bound.
    pub async fn bind(addr: &str, store: EventStore) -> Result<Self> {
        let addr: SocketAddr = addr.parse().map_err(|e| BinocularError::Config {
            message: format!("invalid listen address '{addr}': {e}"),
        })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BinocularError::Io {
                path: addr.to_string().into(),
                source: e,
            })?;
        Ok(Self { listener, store })
    }

    /// Returns the bound address (useful when binding port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(|e| BinocularError::Io {
            path: "listener".into(),
            source: e,
        })
    }

    /// Serves until `shutdown` becomes `true` (or its sender is dropped),
    /// then drains in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the accept loop fails.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr = self.local_addr()?;
        info!(%addr, "query server listening");

        axum::serve(self.listener, router(self.store))
            .with_graceful_shutdown(async move {
                loop {
                    if *shutdown.borrow_and_update() {
                        break;
                    }
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
                info!("query server shutting down");
            })
            .await
            .map_err(|e| BinocularError::Io {
                path: addr.to_string().into(),
                source: e,
            })
    }
}

/// Handler for `/logs`: the full stored event set.
async fn logs_handler(State(state): State<AppState>) -> Response {
    let store = state.store.clone();
    match tokio::task::spawn_blocking(move || store.list_all()).await {
        Ok(Ok(events)) => (StatusCode::OK, Json(events)).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "listing events failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            error!(error = %e, "listing task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "listing task failed").into_response()
        }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    events: u64,
}

/// Handler for `/health`.
async fn health_handler(State(state): State<AppState>) -> Response {
    let store = state.store.clone();
    match tokio::task::spawn_blocking(move || store.len()).await {
        Ok(Ok(events)) => (
            StatusCode::OK,
            Json(Health {
                status: "ok",
                events,
            }),
        )
            .into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "counting events failed");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
        Err(e) => {
            error!(error = %e, "health task failed");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

async fn fallback_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

#[cfg(test)]
mod tests {
    use binocular_common::constants::EVENTS_TABLE;
    use binocular_core::event::TrafficEvent;
    use chrono::{DateTime, Utc};

    use super::*;

    fn event(path: &str) -> TrafficEvent {
        TrafficEvent {
            time: DateTime::<Utc>::default(),
            from: "b".into(),
            to: "a".into(),
            src: "10.0.0.5".into(),
            dst: "10.0.0.6".into(),
            way: ">".into(),
            method: "GET".into(),
            host: "svc:8080".into(),
            path: path.into(),
            code: 200,
            status: "OK".into(),
        }
    }

    fn state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = EventStore::open(&dir.path().join("binocular.db")).expect("open");
        (dir, AppState { store })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn empty_store_lists_empty_array() {
        let (_dir, state) = state();
        let response = logs_handler(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn logs_returns_events_in_write_order() {
        let (_dir, state) = state();
        let _ = state.store.append(&event("/first")).unwrap();
        let _ = state.store.append(&event("/second")).unwrap();

        let response = logs_handler(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned();
        assert!(content_type.contains("application/json"));

        let json = body_json(response).await;
        assert_eq!(json[0]["path"], "/first");
        assert_eq!(json[1]["path"], "/second");
        assert_eq!(json[0]["from"], "b");
        assert_eq!(json[0]["code"], 200);
    }

    #[tokio::test]
    async fn unreadable_value_is_a_server_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("binocular.db");
        {
            let db = redb::Database::create(&path).unwrap();
            let txn = db.begin_write().unwrap();
            {
                let table = redb::TableDefinition::<&str, &[u8]>::new(EVENTS_TABLE);
                let mut table = txn.open_table(table).unwrap();
                let _ = table
                    .insert("01ARZ3NDEKTSV4RRFFQ69G5FAV", b"not json".as_slice())
                    .unwrap();
            }
            txn.commit().unwrap();
        }

        let store = EventStore::open(&path).expect("open");
        let response = logs_handler(State(AppState { store })).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn health_reports_event_count() {
        let (_dir, state) = state();
        let _ = state.store.append(&event("/")).unwrap();

        let response = health_handler(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["events"], 1);
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let response = fallback_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
