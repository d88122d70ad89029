//! bibgraph query server.
//!
//! Serves an ingested data directory over HTTP:
//!
//! - `POST /query` `{query}`: author works, or keyword and full-title matches
//! - `POST /hexkeylist2entry` `{keylist}`: short entries for hex keys
//! - `POST /fullentry` `{query}`: the full record behind one hex key
//! - `POST /feature`: corpus features
//! - `POST /colab` `{query}`: coauthor graph around an author (depth 2)
//! - `GET  /health`: server status
//!
//! Build and run: `cargo run --features server --bin bibgraphd`

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use bibgraph::coauthor::Vertex;
use bibgraph::config::{BibConfig, CONFIG_FILE};
use bibgraph::error::{QueryError, QueryResult};
use bibgraph::query::{EntrySummary, FeatureSummary, FullEntry, QueryResponse, QueryService};
use bibgraph::store::DurableStore;

// ── Server state ──────────────────────────────────────────────────────────

struct ServerState {
    service: QueryService<DurableStore>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn query_error(e: QueryError) -> (StatusCode, String) {
    match e {
        QueryError::InvalidKey { .. } => (StatusCode::BAD_REQUEST, format!("{e}")),
        QueryError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{e}")),
    }
}

/// Run a store-bound query off the async executor.
async fn blocking<T, F>(state: &Arc<ServerState>, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&QueryService<DurableStore>) -> QueryResult<T> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&state.service))
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("query task failed: {e}"),
            )
        })?
        .map(Json)
        .map_err(query_error)
}

// ── Request / response types ──────────────────────────────────────────────

#[derive(Deserialize)]
struct TextRequest {
    #[serde(default)]
    query: Option<String>,
}

#[derive(Deserialize)]
struct KeyListRequest {
    #[serde(default)]
    keylist: Option<Vec<String>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum KeyListResponse {
    Entries { result: Vec<EntrySummary> },
    Empty {},
}

#[derive(Serialize)]
struct ColabResponse {
    verticies: Vec<Vertex>,
    edges: Vec<(String, String)>,
    truncated: bool,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

fn required(text: Option<String>) -> Result<String, (StatusCode, String)> {
    text.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            "missing \"query\" field".to_string(),
        )
    })
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn query(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<TextRequest>,
) -> ApiResult<QueryResponse> {
    let text = required(req.query)?;
    blocking(&state, move |svc| svc.query(&text)).await
}

async fn hex_key_list_to_entry(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<KeyListRequest>,
) -> ApiResult<KeyListResponse> {
    let Some(keys) = req.keylist else {
        return Ok(Json(KeyListResponse::Empty {}));
    };
    blocking(&state, move |svc| {
        svc.entry_summaries(&keys)
            .map(|result| KeyListResponse::Entries { result })
    })
    .await
}

async fn full_entry(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<TextRequest>,
) -> ApiResult<Vec<FullEntry>> {
    let key = required(req.query)?;
    blocking(&state, move |svc| {
        Ok(svc.full_entry(&key)?.into_iter().collect())
    })
    .await
}

async fn feature(State(state): State<Arc<ServerState>>) -> ApiResult<FeatureSummary> {
    blocking(&state, |svc| svc.features()).await
}

async fn colab(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<TextRequest>,
) -> ApiResult<ColabResponse> {
    let name = required(req.query)?;
    blocking(&state, move |svc| {
        let graph = svc.coauthor_graph(&name)?;
        Ok(ColabResponse {
            verticies: graph.vertices,
            edges: graph.edges,
            truncated: graph.truncated,
        })
    })
    .await
}

// ── Main ──────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::var("BIBGRAPH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(CONFIG_FILE));
    let mut config = BibConfig::load_or_default(&config_path).unwrap_or_else(|e| {
        tracing::error!("failed to load {}: {e}", config_path.display());
        std::process::exit(1);
    });
    if let Ok(bind) = std::env::var("BIBGRAPH_BIND") {
        config.server.bind = bind;
    }
    if let Ok(port) = std::env::var("BIBGRAPH_PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(e) => {
                tracing::error!("invalid BIBGRAPH_PORT \"{port}\": {e}");
                std::process::exit(1);
            }
        }
    }
    let addr = format!("{}:{}", config.server.bind, config.server.port);

    let store = DurableStore::open(&config.data_dir).unwrap_or_else(|e| {
        tracing::error!("failed to open store: {e}");
        std::process::exit(1);
    });
    match store.len() {
        Ok(0) => tracing::warn!(
            path = %store.path().display(),
            "store is empty; run `bibgraph ingest` first"
        ),
        Ok(records) => tracing::info!(records, "store opened"),
        Err(e) => tracing::warn!("could not count records: {e}"),
    }

    let state = Arc::new(ServerState {
        service: QueryService::new(store, config.graph),
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/query", post(query))
        .route("/hexkeylist2entry", post(hex_key_list_to_entry))
        .route("/fullentry", post(full_entry))
        .route("/feature", post(feature))
        .route("/colab", post(colab))
        .layer(CorsLayer::permissive())
        .with_state(state);

    tracing::info!("bibgraph server listening on {addr}");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}
