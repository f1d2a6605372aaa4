//! Gateway HTTP + WebSocket server (single port) and the query pipeline.
//!
//! Each socket event is handled by an independent task: `joinChat` subscribes
//! the connection, `sendMessage` echoes the user's text to the channel and
//! spawns the classify -> resolve -> reply pipeline, disconnect unsubscribes
//! everywhere. Replies to back-to-back queries on one channel may resolve out
//! of submission order; the echo always precedes its own reply.

use crate::classifier::{self, Category};
use crate::config::{self, Config};
use crate::gateway::protocol::{ClientEvent, OutboundMessage};
use crate::llm::{GeminiClient, TextGenerator};
use crate::records;
use crate::registry::ChannelRegistry;
use crate::resolver::{self, QueryResolver, ResolverClient};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

const SHUTDOWN_FRAME: &str = r#"{"event":"shutdown","payload":{}}"#;

/// Shared state for the relay (config, registry, collaborators).
#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<Config>,
    /// When Some, the WebSocket upgrade must provide `?token=` matching this.
    pub required_token: Option<String>,
    /// Channel -> subscriber routing; the only shared mutable state.
    pub registry: Arc<ChannelRegistry>,
    /// Text-generation collaborator (classifier verdicts, knowledge answers).
    pub generator: Arc<dyn TextGenerator>,
    /// Resolver backend (RAG context and data rows).
    pub resolver: Arc<dyn QueryResolver>,
    /// Broadcasts control frames to connected clients (e.g. shutdown).
    pub event_tx: broadcast::Sender<String>,
}

impl RelayState {
    pub fn new(
        config: Config,
        generator: Arc<dyn TextGenerator>,
        resolver: Arc<dyn QueryResolver>,
    ) -> Self {
        let required_token = if config.gateway.auth.mode == config::GatewayAuthMode::Token {
            config::resolve_gateway_token(&config)
        } else {
            None
        };
        let (event_tx, _) = broadcast::channel(64);
        Self {
            config: Arc::new(config),
            required_token,
            registry: Arc::new(ChannelRegistry::new()),
            generator,
            resolver,
            event_tx,
        }
    }
}

/// Build the router: health on `/`, WebSocket upgrade on `/ws`.
pub fn app(state: RelayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Run the relay server; binds to config.gateway.bind:config.gateway.port.
/// When bind is not loopback, a gateway token must be configured or startup
/// fails. Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        let token = config::resolve_gateway_token(&config);
        if token.is_none() || config.gateway.auth.mode != config::GatewayAuthMode::Token {
            anyhow::bail!(
                "refusing to bind gateway to {} without auth (set gateway.auth.mode to \"token\" and gateway.auth.token or FLOATRELAY_GATEWAY_TOKEN)",
                bind
            );
        }
    }

    let timeout = Duration::from_secs(config.resolver.timeout_secs);
    let generator = Arc::new(GeminiClient::new(
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config::resolve_gemini_api_key(&config),
        timeout,
    ));
    let resolver = Arc::new(ResolverClient::new(&config.resolver.base_url, timeout));
    let port = config.gateway.port;
    let state = RelayState::new(config, generator, resolver);
    let event_tx = state.event_tx.clone();

    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("relay listening on {}", bind_addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal(event_tx))
        .await
        .context("relay server exited")?;
    log::info!("relay stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Broadcasts a shutdown frame to connected clients first.
async fn shutdown_signal(event_tx: broadcast::Sender<String>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
    let _ = event_tx.send(SHUTDOWN_FRAME.to_string());
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<RelayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct ConnectQuery {
    token: Option<String>,
}

/// GET /ws upgrades to WebSocket, checking the gateway token when configured.
async fn ws_handler(
    State(state): State<RelayState>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Some(ref required) = state.required_token {
        let provided = query.token.as_deref().unwrap_or("").trim();
        if provided != required {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: RelayState) {
    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let mut event_rx = state.event_tx.subscribe();
    log::debug!("ws client connected: {}", connection_id);

    loop {
        tokio::select! {
            biased;

            frame = rx.recv() => {
                // Queue closes only when the registry entry and this task are both gone.
                let Some(frame) = frame else { break };
                if socket.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(frame) => {
                        let is_shutdown = frame == SHUTDOWN_FRAME;
                        let _ = socket.send(Message::Text(frame)).await;
                        if is_shutdown {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::debug!("ws client lagged {} control frames", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                let Message::Text(text) = msg else { continue };
                let Ok(event) = serde_json::from_str::<ClientEvent>(&text) else {
                    log::debug!("ignoring unrecognized frame from {}", connection_id);
                    continue;
                };
                match event {
                    ClientEvent::JoinChat(chat_id) => {
                        log::info!("connection {} joined chat {}", connection_id, chat_id);
                        state.registry.subscribe(&chat_id, connection_id, tx.clone()).await;
                    }
                    ClientEvent::SendMessage(params) => {
                        // Echo synchronously so it always precedes this query's reply.
                        let echo = OutboundMessage::user_echo(&params.chat_id, &params.message);
                        state.registry.broadcast(&params.chat_id, &echo).await;
                        let task_state = state.clone();
                        tokio::spawn(async move {
                            process_query(task_state, params.chat_id, params.message).await;
                        });
                    }
                }
            }
        }
    }

    state.registry.unsubscribe_all(connection_id).await;
    log::debug!("ws client disconnected: {}", connection_id);
}

/// Run the full pipeline for one query and broadcast exactly one assistant
/// message to the channel: a typed reply on success, the fixed degraded
/// message on any collaborator failure.
async fn process_query(state: RelayState, chat_id: String, text: String) {
    let message = match resolve_reply(&state, &chat_id, &text).await {
        Ok(message) => message,
        Err(e) => {
            log::warn!("query pipeline failed on {}: {:#}", chat_id, e);
            OutboundMessage::degraded(&chat_id)
        }
    };
    let delivered = state.registry.broadcast(&chat_id, &message).await;
    if delivered == 0 {
        log::debug!("no subscribers left on {}, reply dropped", chat_id);
    }
}

/// classify -> resolve -> (data: parse rows; knowledge: generate answer).
async fn resolve_reply(
    state: &RelayState,
    chat_id: &str,
    text: &str,
) -> Result<OutboundMessage> {
    let classification = classifier::classify(state.generator.as_ref(), text)
        .await
        .context("classifying query")?;
    log::info!(
        "classified query on {} as {:?}: {}",
        chat_id,
        classification.category,
        classification.reasoning
    );

    let reply = state
        .resolver
        .fetch_context(text, classification.category)
        .await
        .context("querying resolver")?;
    let context = reply.context.as_deref().unwrap_or("");

    match classification.category {
        Category::Data => {
            let rows = records::parse(context);
            log::debug!("parsed {} data record(s) for {}", rows.len(), chat_id);
            Ok(OutboundMessage::data_reply(chat_id, rows))
        }
        Category::Knowledge => {
            let answer = resolver::answer_with_context(state.generator.as_ref(), text, context)
                .await
                .context("generating answer")?;
            Ok(OutboundMessage::knowledge_reply(chat_id, answer))
        }
    }
}
