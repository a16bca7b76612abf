use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::AppState;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::llm::ChatModel;
use crate::session::SessionStore;

/// Build the application router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ask", get(api_ask))
        .route("/ping", get(api_ping))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Axum server with the provided configuration and model client.
pub async fn start_server(config: Arc<AppConfig>, model: Arc<dyn ChatModel>) -> anyhow::Result<()> {
    let state = AppState {
        model,
        sessions: SessionStore::with_history_capacity(config.session.history_capacity),
    };
    let app = router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Response from the ask endpoint.
#[derive(Debug, Serialize)]
pub struct AskResponse {
    /// Model reply.
    pub response: String,
}

/// Response from the ping endpoint.
#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub status: &'static str,
}

/// GET /ask - Forward a query to the model within the user's session.
///
/// Parameters are read as raw pairs so repeated keys never reject the
/// request; the first occurrence of `q` and `id` wins.
async fn api_ask(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<AskResponse>, AppError> {
    handle_ask(&state, first_param(&params, "q"), first_param(&params, "id"))
        .await
        .map(Json)
}

fn first_param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// GET /ping - Constant liveness payload.
async fn api_ping() -> Json<PingResponse> {
    Json(PingResponse { status: "alive" })
}

/// Run one conversational turn for `user_id`.
///
/// The user message is recorded before the upstream call so the history
/// reflects the attempt even when the call fails. The bot reply is recorded
/// only on success.
pub async fn handle_ask(
    state: &AppState,
    query: Option<&str>,
    user_id: Option<&str>,
) -> Result<AskResponse, AppError> {
    let (Some(query), Some(user_id)) = (
        query.filter(|q| !q.is_empty()),
        user_id.filter(|id| !id.is_empty()),
    ) else {
        tracing::warn!("Missing query or id parameters");
        return Err(AppError::BadRequest);
    };

    let request_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(
        request_id = %request_id,
        user_id = %user_id,
        query_length = query.len(),
        "Received ask request"
    );

    let session = state.sessions.get_or_create(user_id);
    let mut turn = session.lock().await;
    turn.record_user_message(query);

    match state.model.send_message(turn.conversation_mut(), query).await {
        Ok(reply) => {
            turn.record_bot_message(&reply);
            tracing::debug!(
                request_id = %request_id,
                user_id = %user_id,
                history_len = turn.history().len(),
                reply_length = reply.len(),
                "Ask request completed"
            );
            Ok(AskResponse { response: reply })
        }
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                user_id = %user_id,
                error = %e,
                "Error processing query"
            );
            Err(AppError::Upstream(e))
        }
    }
}
