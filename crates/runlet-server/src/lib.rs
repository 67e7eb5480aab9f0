//! HTTP and WebSocket surface for the Runlet code execution service.
//!
//! This crate is thin glue over `runlet-core`: a route table, JSON body
//! parsing, and startup/directory bootstrap. All execution semantics —
//! staging, cleanup, failure classification — live in the core crate; the
//! handlers here only translate pipeline outcomes into the response codes
//! and frame formats the protocol promises.

pub mod ws;

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json as AxumJson, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::{middleware, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use runlet_core::{ArtifactStore, ExecError, Language};

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

/// Configuration for the Runlet server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Scratch directory for transient source/binary artifacts
    pub work_dir: PathBuf,
    /// Enable CORS (permissive)
    pub enable_cors: bool,
    /// Enable request logging
    pub enable_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3001".parse().expect("valid default bind address"),
            work_dir: PathBuf::from("./code"),
            enable_cors: true,
            enable_logging: true,
        }
    }
}

impl ServerConfig {
    /// Create a new server configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the artifact working directory.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// Enable or disable CORS.
    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    /// Enable or disable request logging.
    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: ArtifactStore,
    pub config: ServerConfig,
}

/// Body of `POST /execute/{language}`.
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub program: Option<String>,
}

/// Static usage text for the informational routes.
fn usage_text() -> String {
    let languages = Language::ALL
        .iter()
        .map(|l| l.id())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "To run code, POST {{\"program\": \"...\"}} to /execute/<language> \
         where <language> is one of: {languages}. For interactive programs, \
         connect a websocket to /io/<language> and send PROGRAM:<source> \
         followed by at most one INPUT:<text>."
    )
}

/// Handler for `POST /execute/{language}`.
///
/// A completed run is always 200, whatever the program's exit code; the
/// pipeline's own stage failures map to the fixed 4xx/5xx messages of the
/// protocol.
async fn execute_handler(
    State(state): State<AppState>,
    Path(language): Path<String>,
    body: std::result::Result<AxumJson<ExecuteRequest>, JsonRejection>,
) -> std::result::Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let language: Language = language.parse().map_err(|err| {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("{err}") })),
        )
    })?;

    // A missing or malformed body and a body without a program collapse to
    // the same caller mistake.
    let program = body.ok().and_then(|AxumJson(req)| req.program);
    let program = match program {
        Some(p) if !p.is_empty() => p,
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "No program provided." })),
            ))
        }
    };

    log::info!("executing {} program ({} bytes)", language, program.len());

    match runlet_core::execute(&state.store, language.descriptor(), &program).await {
        Ok(result) => Ok(Json(json!({
            "output": result.output,
            "error": result.error,
        }))),
        Err(err) => {
            log::error!("{} pipeline failed: {}", language, err);
            let message = match err {
                ExecError::Persist(_) => "Error writing the file.".to_string(),
                ExecError::Compile {
                    diagnostics: Some(diagnostics),
                } => format!("Error compiling the program:\n{diagnostics}"),
                ExecError::Compile { diagnostics: None } => {
                    "Error compiling the program.".to_string()
                }
                ExecError::RunInvocation { .. } => "Error executing the program.".to_string(),
            };
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message })),
            ))
        }
    }
}

/// The Runlet server.
pub struct RunletServer {
    config: ServerConfig,
}

impl RunletServer {
    /// Create a new server with default configuration.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Create a new server with custom configuration.
    pub fn with_config(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            store: ArtifactStore::new(self.config.work_dir.clone()),
            config: self.config.clone(),
        };

        let mut router = Router::new()
            .route("/", get(|| async { usage_text() }))
            .route("/execute/", get(|| async { usage_text() }))
            .route("/help/", get(|| async { usage_text() }))
            .route(
                "/health",
                get(|| async {
                    Json(HealthResponse {
                        status: "healthy".to_string(),
                        timestamp: chrono::Utc::now(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    })
                }),
            )
            .route("/execute/{language}", post(execute_handler))
            .route("/io/{language}", get(ws::io_handler))
            .with_state(state);

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(
                |request: axum::http::Request<axum::body::Body>,
                 next: axum::middleware::Next| async {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let method = request.method().clone();
                    let uri = request.uri().clone();
                    log::info!("Request {} {} {}", request_id, method, uri);

                    let start = std::time::Instant::now();
                    let response = next.run(request).await;
                    log::info!(
                        "Response {} completed in {:?}",
                        request_id,
                        start.elapsed()
                    );

                    response
                },
            ));
        }

        router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(CorsLayer::permissive());
        }

        router
    }

    /// Start the server and listen for connections until shut down.
    pub async fn serve(self) -> anyhow::Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the server with graceful shutdown support.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        // Directory bootstrap: the working directory is scratch space and
        // safe to be empty at rest, it just has to exist.
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        log::info!(
            "artifact working directory: {}",
            self.config.work_dir.display()
        );

        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr).await.map_err(|e| {
            anyhow::anyhow!("failed to bind to {}: {}", self.config.bind_addr, e)
        })?;

        log::info!("runlet server listening on {}", self.config.bind_addr);
        log::info!("usage: http://{}/help/", self.config.bind_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        log::info!("runlet server shut down gracefully");
        Ok(())
    }
}

impl Default for RunletServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Utility function to create a shutdown signal from Ctrl+C / SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}
