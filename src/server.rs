//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `POST` | `/chat/poll` | none | Answer new mentions in the experience's channel |
//! | `POST` | `/chat/webhook` | signature | Queue a pushed message, acknowledge at once |
//! | `POST` | `/chat/test` | none | Generate (and try to post) a reply, with diagnostics |
//! | `POST` | `/training` | admin | Multipart upload of text or a file, optional `doc_id` to replace |
//! | `GET` | `/training` | admin | List training documents |
//! | `DELETE` | `/training` | admin | Delete a document and its embeddings |
//! | `GET` | `/config` | admin | Bot configuration, or defaults |
//! | `POST` | `/config` | admin | Save bot configuration |
//! | `GET` | `/channels` | admin | Chat channels the bot can be attached to |
//! | `POST` | `/webhooks/setup` | admin | Register `{public_url}/chat/webhook` with the platform |
//! | `POST` | `/upload/avatar` | admin | Upload a bot avatar image |
//! | `GET` | `/health` | none | Health check (returns version) |
//!
//! Admin routes expect the caller's platform token in `x-whop-user-token`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "experience_id is required" } }
//! ```
//!
//! See [`BotError`] for the status code of each error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

use coachbot_core::mention::extract_question;
use coachbot_core::models::{now_ts, BotConfig, Personality, TrainingDocument, DEFAULT_BOT_NAME};

use crate::avatar::{upload_avatar, AvatarUpload};
use crate::config::PollConfig;
use crate::dispatch::{Dispatcher, DEFAULT_QUEUE_CAPACITY};
use crate::error::{BotError, Result};
use crate::platform::{authorize_admin, Channel, USER_TOKEN_HEADER};
use crate::reconcile::{PollOutcome, Reconciler};
use crate::services::Services;
use crate::signature::{SignedHeaders, HEADER_ID, HEADER_SIGNATURE, HEADER_TIMESTAMP};
use crate::training::TrainingUpload;
use crate::webhook::{parse_delivery, WebhookEvent};

/// Request bodies above this size are rejected before reaching a handler.
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Shared state passed to every handler.
#[derive(Clone)]
pub struct AppState {
    services: Arc<Services>,
    dispatcher: Dispatcher,
}

/// Build the router. Jobs queued by the webhook go to `dispatcher`.
pub fn router(services: Arc<Services>, dispatcher: Dispatcher) -> Router {
    let state = AppState {
        services,
        dispatcher,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat/poll", post(handle_poll))
        .route("/chat/webhook", post(handle_webhook))
        .route("/chat/test", post(handle_test))
        .route(
            "/training",
            post(handle_training_upload)
                .get(handle_training_list)
                .delete(handle_training_delete),
        )
        .route("/config", get(handle_get_config).post(handle_save_config))
        .route("/channels", get(handle_channels))
        .route("/webhooks/setup", post(handle_webhook_setup))
        .route("/upload/avatar", post(handle_avatar_upload))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Serve on `[server].bind` until Ctrl-C or SIGTERM.
pub async fn run_server(services: Arc<Services>) -> anyhow::Result<()> {
    let bind_addr = services.config.server.bind.clone();
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("CoachBot listening on http://{}", bind_addr);
    serve(services, listener, shutdown_signal()).await
}

/// Serve on `listener` until `shutdown` resolves, then stop the scheduled
/// poller and drain background jobs.
pub async fn serve<S>(services: Arc<Services>, listener: TcpListener, shutdown: S) -> anyhow::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let (dispatcher, worker) = Dispatcher::start(DEFAULT_QUEUE_CAPACITY);
    let (stop_tx, stop_rx) = watch::channel(false);

    let poller = if services.config.poll.is_enabled() {
        info!(
            interval_secs = services.config.poll.interval_secs,
            experiences = services.config.poll.experience_ids.len(),
            "scheduled polling enabled"
        );
        Some(tokio::spawn(run_scheduled_polls(
            services.reconciler.clone(),
            services.config.poll.clone(),
            stop_rx,
        )))
    } else {
        None
    };

    let app = router(services, dispatcher);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    let _ = stop_tx.send(true);
    if let Some(poller) = poller {
        if let Err(e) = poller.await {
            error!(error = %e, "scheduled poller crashed");
        }
    }
    worker.shutdown().await;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received; draining");
}

// ============ Scheduled polling ============

async fn run_scheduled_polls(
    reconciler: Arc<Reconciler>,
    poll: PollConfig,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(poll.interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }
        for experience_id in &poll.experience_ids {
            match reconciler.poll(experience_id).await {
                Ok(outcome) => debug!(experience_id = %experience_id, processed = outcome.processed, "scheduled poll"),
                Err(e) => warn!(experience_id = %experience_id, error = %e, "scheduled poll failed"),
            }
        }
    }
}

// ============ Helpers ============

#[derive(Debug, Default, Deserialize)]
struct ExperienceQuery {
    experience_id: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn require(value: Option<String>, name: &str) -> Result<String> {
    non_empty(value).ok_or_else(|| BotError::Validation(format!("{} is required", name)))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn require_admin(state: &AppState, headers: &HeaderMap, experience_id: &str) -> Result<String> {
    authorize_admin(
        state.services.access.as_ref(),
        header_str(headers, USER_TOKEN_HEADER),
        experience_id,
    )
    .await
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> BotError {
    BotError::Validation(format!("invalid multipart body: {}", e))
}

/// Text fields and at most one file from a multipart form.
#[derive(Default)]
struct FormData {
    fields: std::collections::HashMap<String, String>,
    file: Option<UploadedFile>,
}

struct UploadedFile {
    name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

impl FormData {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = FormData::default();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                form.file = Some(UploadedFile {
                    name: file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            } else {
                let text = field.text().await.map_err(multipart_error)?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    fn take(&mut self, name: &str) -> Option<String> {
        non_empty(self.fields.remove(name))
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat/poll ============

/// `experience_id` comes from the JSON body, else the query string.
async fn handle_poll(
    State(state): State<AppState>,
    Query(query): Query<ExperienceQuery>,
    body: Bytes,
) -> Result<Json<PollOutcome>> {
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<ExperienceQuery>(&body)
            .ok()
            .and_then(|b| b.experience_id)
    };
    let experience_id = require(non_empty(from_body).or(query.experience_id), "experience_id")?;

    let outcome = state.services.reconciler.poll(&experience_id).await?;
    Ok(Json(outcome))
}

// ============ POST /chat/webhook ============

async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signed = SignedHeaders {
        id: header_str(&headers, HEADER_ID),
        timestamp: header_str(&headers, HEADER_TIMESTAMP),
        signature: header_str(&headers, HEADER_SIGNATURE),
    };
    let event = parse_delivery(
        state.services.secrets.webhook_secret.as_deref(),
        signed,
        &body,
        now_ts(),
    )?;

    match event {
        WebhookEvent::Message(inbound) => {
            let reconciler = state.services.reconciler.clone();
            let job = format!("webhook message {}", inbound.message.id);
            state.dispatcher.submit(job, async move {
                let outcome = reconciler.process_inbound(&inbound).await?;
                debug!(message_id = %inbound.message.id, ?outcome, "webhook message handled");
                Ok::<(), BotError>(())
            });
        }
        WebhookEvent::Ignored { event_type } => {
            debug!(event_type = %event_type, "ignoring non-message webhook event");
        }
        WebhookEvent::Unroutable { event_type, reason } => {
            info!(event_type = %event_type, reason = %reason, "dropping webhook message");
        }
    }

    Ok(Json(json!({ "received": true })))
}

// ============ POST /chat/test ============

#[derive(Debug, Deserialize)]
struct TestRequest {
    experience_id: Option<String>,
    channel_id: Option<String>,
    message: Option<String>,
    bot_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct TestConfigSummary {
    personality: Personality,
    channel_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct TestResponse {
    success: bool,
    response: String,
    question: String,
    bot_name: String,
    sent_to_chat: bool,
    send_method: &'static str,
    send_error: Option<String>,
    config: TestConfigSummary,
    note: &'static str,
}

/// Run the answer pipeline for an ad-hoc message. Nothing is logged to
/// the message history, so the same message can be tested repeatedly.
async fn handle_test(
    State(state): State<AppState>,
    Json(req): Json<TestRequest>,
) -> Result<Json<TestResponse>> {
    let (experience_id, channel_id, message) = match (
        non_empty(req.experience_id),
        non_empty(req.channel_id),
        non_empty(req.message),
    ) {
        (Some(e), Some(c), Some(m)) => (e, c, m),
        _ => {
            return Err(BotError::Validation(
                "experience_id, channel_id, and message are required".into(),
            ))
        }
    };

    let config = state
        .services
        .store
        .get_bot_config(&experience_id)
        .await
        .map_err(BotError::persistence)?
        .ok_or_else(|| {
            BotError::NotFound(format!(
                "bot configuration for {} (save one via POST /config first)",
                experience_id
            ))
        })?;

    let bot_name = non_empty(req.bot_name).unwrap_or_else(|| config.bot_name.clone());
    let mut question = extract_question(&message, &bot_name);
    if question.is_empty() {
        question = message.clone();
    }

    let response = state
        .services
        .generator
        .generate(&question, &experience_id, config.personality, &bot_name)
        .await?;

    let send_error = state
        .services
        .platform
        .send_message(&channel_id, &response)
        .await
        .err()
        .map(|e| e.to_string());
    let sent = send_error.is_none();

    Ok(Json(TestResponse {
        success: true,
        response,
        question,
        bot_name,
        sent_to_chat: sent,
        send_method: if sent { "messages.create" } else { "none" },
        send_error,
        config: TestConfigSummary {
            personality: config.personality,
            channel_id: config.channel_id,
        },
        note: if sent {
            "Response posted to the channel"
        } else {
            "Response generated but not posted; see send_error"
        },
    }))
}

// ============ /training ============

#[derive(Debug, Serialize)]
struct TrainingSaved {
    success: bool,
    doc_id: String,
    chunks: usize,
    message: &'static str,
}

async fn handle_training_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<TrainingSaved>> {
    let mut form = FormData::read(multipart).await?;
    let experience_id = require(form.take("experience_id"), "experience_id")?;
    require_admin(&state, &headers, &experience_id).await?;

    let upload = match (form.take("text_content"), form.file.take()) {
        (Some(text), _) => TrainingUpload::Text(text),
        (None, Some(file)) => TrainingUpload::File {
            name: file.name,
            content_type: file.content_type,
            bytes: file.bytes,
        },
        (None, None) => {
            return Err(BotError::Validation(
                "Either text_content or file is required".into(),
            ))
        }
    };
    let doc_id = form.take("doc_id");

    let saved = state
        .services
        .training
        .save(&experience_id, upload, doc_id.as_deref())
        .await?;

    Ok(Json(TrainingSaved {
        success: true,
        doc_id: saved.doc_id,
        chunks: saved.chunks,
        message: if saved.replaced {
            "Training data updated successfully"
        } else {
            "Training data processed successfully"
        },
    }))
}

#[derive(Debug, Serialize)]
struct DocumentList {
    documents: Vec<TrainingDocument>,
}

async fn handle_training_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ExperienceQuery>,
) -> Result<Json<DocumentList>> {
    let experience_id = require(query.experience_id, "experience_id")?;
    require_admin(&state, &headers, &experience_id).await?;

    let documents = state.services.training.list(&experience_id).await?;
    Ok(Json(DocumentList { documents }))
}

#[derive(Debug, Deserialize)]
struct DeleteQuery {
    experience_id: Option<String>,
    doc_id: Option<String>,
}

async fn handle_training_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<Value>> {
    let experience_id = require(query.experience_id, "experience_id")?;
    let doc_id = require(query.doc_id, "doc_id")?;
    require_admin(&state, &headers, &experience_id).await?;

    state.services.training.delete(&experience_id, &doc_id).await?;
    Ok(Json(json!({ "success": true, "message": "Document deleted" })))
}

// ============ /config ============

#[derive(Debug, Serialize)]
struct ConfigView {
    experience_id: String,
    bot_name: String,
    bot_avatar_url: Option<String>,
    personality: Personality,
    channel_id: Option<String>,
}

impl From<BotConfig> for ConfigView {
    fn from(c: BotConfig) -> Self {
        Self {
            experience_id: c.experience_id,
            bot_name: c.bot_name,
            bot_avatar_url: c.bot_avatar_url,
            personality: c.personality,
            channel_id: c.channel_id,
        }
    }
}

async fn handle_get_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ExperienceQuery>,
) -> Result<Json<ConfigView>> {
    let experience_id = require(query.experience_id, "experience_id")?;
    require_admin(&state, &headers, &experience_id).await?;

    let config = state
        .services
        .store
        .get_bot_config(&experience_id)
        .await
        .map_err(BotError::persistence)?
        .unwrap_or_else(|| BotConfig::defaults_for(&experience_id));
    Ok(Json(config.into()))
}

#[derive(Debug, Deserialize)]
struct SaveConfigRequest {
    experience_id: Option<String>,
    bot_name: Option<String>,
    bot_avatar_url: Option<String>,
    personality: Option<String>,
    channel_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConfigSaved {
    success: bool,
    config: ConfigView,
}

/// Fields left out of the request keep their stored (or default) value.
async fn handle_save_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SaveConfigRequest>,
) -> Result<Json<ConfigSaved>> {
    let experience_id = require(req.experience_id, "experience_id")?;
    require_admin(&state, &headers, &experience_id).await?;

    let personality = match non_empty(req.personality) {
        Some(p) => Some(
            p.parse::<Personality>()
                .map_err(|e| BotError::Validation(e.to_string()))?,
        ),
        None => None,
    };

    let now = now_ts();
    let mut config = state
        .services
        .store
        .get_bot_config(&experience_id)
        .await
        .map_err(BotError::persistence)?
        .unwrap_or_else(|| BotConfig {
            created_at: now,
            ..BotConfig::defaults_for(&experience_id)
        });

    if let Some(name) = non_empty(req.bot_name) {
        config.bot_name = name;
    }
    if config.bot_name.is_empty() {
        config.bot_name = DEFAULT_BOT_NAME.to_string();
    }
    if let Some(url) = req.bot_avatar_url {
        config.bot_avatar_url = non_empty(Some(url));
    }
    if let Some(p) = personality {
        config.personality = p;
    }
    if let Some(channel) = req.channel_id {
        config.channel_id = non_empty(Some(channel));
    }
    config.updated_at = now;

    let stored = state
        .services
        .store
        .upsert_bot_config(&config)
        .await
        .map_err(BotError::persistence)?;
    info!(experience_id = %experience_id, personality = %stored.personality, "saved bot configuration");

    Ok(Json(ConfigSaved {
        success: true,
        config: stored.into(),
    }))
}

// ============ GET /channels ============

#[derive(Debug, Serialize)]
struct ChannelList {
    channels: Vec<Channel>,
}

async fn handle_channels(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ExperienceQuery>,
) -> Result<Json<ChannelList>> {
    let experience_id = require(query.experience_id, "experience_id")?;
    require_admin(&state, &headers, &experience_id).await?;

    let channels = state
        .services
        .platform
        .list_channels(&experience_id)
        .await
        .map_err(BotError::Platform)?;
    Ok(Json(ChannelList { channels }))
}

// ============ POST /webhooks/setup ============

const WEBHOOK_PATH: &str = "/chat/webhook";

#[derive(Debug, Serialize)]
struct WebhookSetup {
    success: bool,
    webhook_registered: bool,
    webhook_url: String,
    note: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
}

/// `{public_url}/chat/webhook`; a bare host gets `https://`.
fn public_webhook_url(public_url: &str) -> Option<String> {
    let base = public_url.trim().trim_end_matches('/');
    if base.is_empty() {
        return None;
    }
    Some(if base.starts_with("http://") || base.starts_with("https://") {
        format!("{}{}", base, WEBHOOK_PATH)
    } else {
        format!("https://{}{}", base, WEBHOOK_PATH)
    })
}

async fn handle_webhook_setup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ExperienceQuery>,
    body: Bytes,
) -> Result<Json<WebhookSetup>> {
    let from_body = serde_json::from_slice::<ExperienceQuery>(&body)
        .ok()
        .and_then(|b| b.experience_id);
    let experience_id = require(non_empty(from_body).or(query.experience_id), "experience_id")?;
    require_admin(&state, &headers, &experience_id).await?;

    let public_url = state.services.config.server.public_url.as_deref();
    let Some(webhook_url) = public_url.and_then(public_webhook_url) else {
        return Ok(Json(WebhookSetup {
            success: false,
            webhook_registered: false,
            webhook_url: WEBHOOK_PATH.to_string(),
            note: "Webhook URL not configured. Set [server].public_url in the config file.".into(),
            instructions: Some(format!(
                "Configure the webhook URL in your Whop app settings: {}",
                WEBHOOK_PATH
            )),
        }));
    };

    let registered = match state
        .services
        .platform
        .register_webhook(&experience_id, &webhook_url)
        .await
    {
        Ok(()) => {
            info!(experience_id = %experience_id, url = %webhook_url, "registered chat webhook");
            true
        }
        Err(e) => {
            warn!(experience_id = %experience_id, error = %e, "webhook registration failed; manual setup needed");
            false
        }
    };

    Ok(Json(if registered {
        WebhookSetup {
            success: true,
            webhook_registered: true,
            webhook_url,
            note: "Webhook registered successfully!".into(),
            instructions: None,
        }
    } else {
        WebhookSetup {
            success: true,
            webhook_registered: false,
            note: "Webhook URL generated. Please configure it in your Whop app dashboard under Webhooks.".into(),
            instructions: Some(format!(
                "Go to your Whop developer dashboard, open your app's Webhooks section and add: {}",
                webhook_url
            )),
            webhook_url,
        }
    }))
}

// ============ POST /upload/avatar ============

async fn handle_avatar_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<AvatarUpload>> {
    let mut form = FormData::read(multipart).await?;
    let experience_id = require(form.take("experience_id"), "experience_id")?;
    require_admin(&state, &headers, &experience_id).await?;

    let file = form
        .file
        .take()
        .ok_or_else(|| BotError::Validation("file is required".into()))?;
    let content_type = file.content_type.as_deref().unwrap_or_default();

    let upload = upload_avatar(
        state.services.avatars.as_deref(),
        &experience_id,
        file.name.as_deref(),
        content_type,
        &file.bytes,
    )
    .await?;
    Ok(Json(upload))
}
