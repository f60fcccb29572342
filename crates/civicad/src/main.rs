//! Civica daemon.
//!
//! Wires the core together: config, database, LLM / retrieval / gateway
//! clients, the session sweeper, and a thin inbound HTTP surface. All turn
//! logic lives in `civica_common`.

use anyhow::Result;
use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use civica_common::classifier::RuleBasedClassifier;
use civica_common::gateway::{HttpGateway, InboundMessage, OutboundSender};
use civica_common::llm_client::HttpChatModel;
use civica_common::orchestrator::SYSTEM_PROMPT;
use civica_common::retrieval::HttpRetrievalIndex;
use civica_common::{CivicDb, CivicaConfig, Orchestrator, SessionStore, TurnInput};

#[derive(Parser, Debug)]
#[command(name = "civicad", about = "Civic-service assistant daemon")]
struct Args {
    /// Path to the config file
    #[arg(long, default_value = "/etc/civica/config.toml")]
    config: PathBuf,
}

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
    gateway: Arc<dyn OutboundSender>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("civicad v{} starting", env!("CARGO_PKG_VERSION"));

    let config = CivicaConfig::load(&args.config)?;

    let db = Arc::new(CivicDb::open_at(&config.database.path)?);
    let model = Arc::new(HttpChatModel::new(config.llm.clone())?);
    let retrieval = Arc::new(HttpRetrievalIndex::new(config.retrieval.clone())?);
    let gateway: Arc<dyn OutboundSender> = Arc::new(HttpGateway::new(config.gateway.clone())?);

    let sessions = SessionStore::new(SYSTEM_PROMPT);
    sessions.spawn_sweeper(
        std::time::Duration::from_secs(config.sessions.sweep_secs),
        chrono::Duration::seconds(config.sessions.idle_secs as i64),
    );

    let orchestrator = Arc::new(Orchestrator::new(
        model,
        retrieval,
        gateway.clone(),
        db,
        sessions,
        Arc::new(RuleBasedClassifier),
    ));

    let state = AppState {
        orchestrator,
        gateway,
    };

    let app = Router::new()
        .route("/inbound", post(handle_inbound))
        .route("/sessions/:phone", delete(clear_session))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state);

    info!(bind = %config.server.bind, "civicad ready");
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// One gateway message event becomes one turn; the reply goes back out
/// through the gateway's send endpoint.
async fn handle_inbound(
    State(state): State<AppState>,
    Json(event): Json<InboundMessage>,
) -> Json<serde_json::Value> {
    let from = event.from.clone();
    let input = TurnInput {
        user_id: event.from,
        text: event.message,
        location: event.location,
        media: event.media,
    };

    let reply = state.orchestrator.handle_turn(input).await;
    if let Err(e) = state.gateway.send(&from, &reply).await {
        warn!(user = %from, error = %e, "Failed to deliver reply");
        return Json(json!({"status": "delivery_failed"}));
    }
    Json(json!({"status": "ok"}))
}

/// Administrative session clear; reports whether one existed.
async fn clear_session(
    State(state): State<AppState>,
    Path(phone): Path<String>,
) -> Json<serde_json::Value> {
    let existed = state.orchestrator.sessions().clear(&phone).await;
    info!(user = %phone, existed, "Session clear requested");
    Json(json!({"cleared": existed}))
}
