//! The webhook server: validates each inbound update through the gateway, drives the
//! dialogue against the state store and replies through the messenger. Mirrors the
//! flow update → gateway → dialogue → store → send; once an update is accepted the
//! endpoint always answers 200, delivery faults are logged only.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::dialogue::{self, process_step};
use crate::gateway::{GatewayError, GatewayPolicy};
use crate::lang::Language;
use crate::state::StateStore;
use crate::telegram::{Message, Messenger};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StateStore>,
    pub messenger: Arc<dyn Messenger>,
    pub policy: GatewayPolicy,
}

pub fn router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.policy.max_body_bytes);
    Router::new()
        .route("/webhook", post(webhook))
        .layer(body_limit)
        .with_state(state)
}

/// Binds the configured address and serves until the process stops.
pub async fn serve(config: &AppConfig, state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {addr}");
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn webhook(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let forwarded_for = header_str(&headers, "x-forwarded-for");
    let secret_token = header_str(&headers, "x-telegram-bot-api-secret-token");
    let declared_len = header_str(&headers, "content-length").and_then(|v| v.parse().ok());
    let update = match state
        .policy
        .validate(peer.ip(), forwarded_for, secret_token, declared_len, &body)
    {
        Ok(update) => update,
        Err(err) => return rejection_status(&err),
    };
    // The gateway guarantees the message is present.
    if let Some(message) = update.message {
        handle_message(&state, message).await;
    }
    StatusCode::OK
}

fn rejection_status(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::ForbiddenIp(_) => StatusCode::FORBIDDEN,
        GatewayError::InvalidToken => StatusCode::UNAUTHORIZED,
        GatewayError::OversizedBody(_) => StatusCode::PAYLOAD_TOO_LARGE,
        GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn is_start_command(text: &str) -> bool {
    text.strip_prefix("/start")
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

async fn handle_message(state: &AppState, message: Message) {
    let chat_id = message.chat.id;
    let (user_id, lang) = match &message.from {
        Some(from) => (from.id, Language::from_code(from.language_code.as_deref())),
        // Channel-style messages carry no sender; key the dialogue on the chat.
        None => (chat_id, Language::default()),
    };

    if message.text.as_deref().is_some_and(is_start_command) {
        if let Err(err) = state.store.init_state(user_id) {
            error!("failed to initialize state for user {user_id}: {err}");
            send(state, chat_id, dialogue::server_error(lang)).await;
            return;
        }
        info!("dialogue started: user {user_id}, language {lang}, chat {chat_id}");
        send(state, chat_id, dialogue::start_prompt(lang)).await;
        return;
    }

    let user_state = match state.store.get_state(user_id) {
        Ok(user_state) => user_state,
        Err(err) => {
            error!("failed to read state for user {user_id}: {err}");
            send(state, chat_id, dialogue::server_error(lang)).await;
            return;
        }
    };
    let Some(user_state) = user_state else {
        send(state, chat_id, dialogue::restart_prompt(lang)).await;
        return;
    };

    let Some(text) = message.text.as_deref() else {
        send(state, chat_id, dialogue::text_required(lang)).await;
        return;
    };

    let step = user_state.step;
    let outcome = process_step(step, text, user_state.data, lang);
    let persisted = if outcome.completed {
        state.store.save_result(user_id, &outcome.data, &outcome.reply)
    } else if outcome.next == 0 {
        // Fit failure or lost dialogue; either way the walk starts over.
        state.store.clear_state(user_id)
    } else {
        state.store.save_state(user_id, outcome.next, &outcome.data)
    };
    if let Err(err) = persisted {
        error!("failed to persist state for user {user_id} at step {step}: {err}");
        send(state, chat_id, dialogue::server_error(lang)).await;
        return;
    }

    send(state, chat_id, &outcome.reply).await;
}

async fn send(state: &AppState, chat_id: i64, text: &str) {
    if let Err(err) = state.messenger.send(chat_id, text).await {
        warn!("failed to send reply to chat {chat_id}: {err}");
    }
}
