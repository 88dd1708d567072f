mod handlers;
mod signal_ws;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use filedrop_core::SessionStore;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

pub use handlers::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    /// Lifetime given to newly created Files Records
    pub files_ttl: Duration,
    /// Outbound websocket frames buffered per connection
    pub outbound_buffer: usize,
}

pub struct FiledropServer {
    state: AppState,
    addr: String,
    reap_interval: Option<Duration>,
}

impl FiledropServer {
    pub fn new(store: Arc<dyn SessionStore>, addr: String) -> Self {
        Self {
            state: AppState {
                store,
                files_ttl: Duration::from_secs(24 * 60 * 60),
                outbound_buffer: 64,
            },
            addr,
            reap_interval: None,
        }
    }

    pub fn with_files_ttl(mut self, ttl: Duration) -> Self {
        self.state.files_ttl = ttl;
        self
    }

    pub fn with_outbound_buffer(mut self, frames: usize) -> Self {
        self.state.outbound_buffer = frames.max(1);
        self
    }

    /// Purge expired Files Records on this period while serving
    pub fn with_reap_interval(mut self, every: Option<Duration>) -> Self {
        self.reap_interval = every;
        self
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("Failed to bind to {}", self.addr))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let reaper = self
            .reap_interval
            .map(|every| spawn_reaper(Arc::clone(&self.state.store), every));

        info!("Listening on {}", listener.local_addr()?);
        let result = axum::serve(listener, router(self.state))
            .await
            .context("Server error");

        if let Some(reaper) = reaper {
            reaper.abort();
        }
        result
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

/// All routes live under `/api`
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/files/new", post(handlers::new_files))
        .route("/files/add", post(handlers::add_files))
        .route("/files/remove", post(handlers::remove_files))
        .route("/files/:id", get(handlers::get_files))
        .route("/signaling/new", post(handlers::new_signaling))
        .route("/ws/host/:id", get(signal_ws::host_ws_handler))
        .route("/ws/conn/:id", get(signal_ws::conn_ws_handler))
        .route("/ping", get(handlers::ping));

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Periodically drop expired Files Records
pub fn spawn_reaper(store: Arc<dyn SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.purge_expired(SystemTime::now()).await {
                Ok(0) => debug!("Reaper: nothing expired"),
                Ok(n) => info!("Reaped {} expired files records", n),
                Err(e) => warn!("Reaper failed: {}", e),
            }
        }
    })
}
