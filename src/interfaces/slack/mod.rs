//! Slack webhook receiver: events, button interactions and slash commands.

pub mod api;
pub mod blocks;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::{NaiveDate, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::bot::CheckInBot;
use crate::core::ledger::CheckInStatus;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::reminder::ResponseOutcome;
pub use api::SlackMessenger;

/// Requests older than this are rejected as replays.
const MAX_REQUEST_AGE_SECS: u64 = 300;

#[derive(Clone)]
pub struct SlackState {
    pub bot: Arc<CheckInBot>,
    pub slack: Arc<SlackMessenger>,
    pub signing_secret: String,
}

#[derive(serde::Deserialize, Debug)]
struct SlackEventPayload {
    #[serde(rename = "type")]
    event_type: String,
    challenge: Option<String>,
    event: Option<SlackEventDetails>,
}

#[derive(serde::Deserialize, Debug)]
struct SlackEventDetails {
    #[serde(rename = "type")]
    inner_type: String,
    text: Option<String>,
    user: Option<String>,
    channel: Option<String>,
    bot_id: Option<String>,
}

#[derive(serde::Deserialize, Debug)]
struct InteractionPayload {
    user: InteractionUser,
    #[serde(default)]
    actions: Vec<BlockAction>,
    #[serde(default)]
    response_url: String,
}

#[derive(serde::Deserialize, Debug)]
struct InteractionUser {
    id: String,
}

#[derive(serde::Deserialize, Debug)]
struct BlockAction {
    action_id: String,
    value: Option<String>,
}

/// Verify a Slack request signature (`v0=` HMAC-SHA256 over `v0:{ts}:{body}`).
fn verify_slack_signature(
    headers: &HeaderMap,
    body: &[u8],
    signing_secret: &str,
    now_secs: u64,
) -> bool {
    use hmac::Mac;
    use sha2::Sha256;
    type HmacSha256 = hmac::Hmac<Sha256>;

    let timestamp = match headers
        .get("x-slack-request-timestamp")
        .and_then(|v| v.to_str().ok())
    {
        Some(ts) => ts,
        None => return false,
    };
    match timestamp.parse::<u64>() {
        Ok(ts) if now_secs.abs_diff(ts) <= MAX_REQUEST_AGE_SECS => {}
        _ => return false,
    }

    let sig = match headers
        .get("x-slack-signature")
        .and_then(|v| v.to_str().ok())
    {
        Some(s) => s,
        None => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(signing_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(format!("v0:{}:", timestamp).as_bytes());
    mac.update(body);
    let expected = format!("v0={}", hex::encode(mac.finalize().into_bytes()));

    // Constant-time comparison
    if sig.len() != expected.len() {
        return false;
    }
    sig.as_bytes()
        .iter()
        .zip(expected.as_bytes().iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn reject_unsigned(state: &SlackState, headers: &HeaderMap, body: &[u8]) -> Option<Response> {
    if state.signing_secret.is_empty()
        || verify_slack_signature(headers, body, &state.signing_secret, unix_now())
    {
        return None;
    }
    warn!("Rejected Slack request with an invalid signature");
    Some(
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid signature" })),
        )
            .into_response(),
    )
}

fn bad_request(msg: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
}

fn form_fields(body: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(body).into_owned().collect()
}

pub fn router(state: SlackState) -> Router {
    Router::new()
        .route("/slack/events", post(slack_events))
        .route("/slack/interactions", post(slack_interactions))
        .route("/slack/commands", post(slack_commands))
        .route("/health", get(health))
        .with_state(state)
}

async fn health(State(state): State<SlackState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "active_prompts": state.bot.reminders().active_count().await,
        "channel": state.bot.channel().await,
    }))
}

async fn slack_events(State(state): State<SlackState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(rejection) = reject_unsigned(&state, &headers, &body) {
        return rejection;
    }

    let payload: SlackEventPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(_) => return bad_request("Invalid JSON"),
    };

    if payload.event_type == "url_verification"
        && let Some(challenge) = payload.challenge
    {
        return Json(json!({ "challenge": challenge })).into_response();
    }

    if payload.event_type == "event_callback"
        && let Some(event) = payload.event
    {
        if event.bot_id.is_some() {
            return Json(json!({ "status": "ignored_bot" })).into_response();
        }

        if event.inner_type == "app_mention"
            && let (Some(text), Some(user), Some(channel)) = (event.text, event.user, event.channel)
        {
            info!("Mention from {} in {}: {}", user, channel, text);
            // Acknowledge now; Slack retries anything slower than 3 seconds.
            tokio::spawn(async move {
                if let Err(e) = answer_mention(&state, &channel, &text).await {
                    error!("Failed to answer mention in {}: {}", channel, e);
                }
            });
        }
    }

    Json(json!({ "status": "ok" })).into_response()
}

async fn answer_mention(state: &SlackState, channel: &str, text: &str) -> Result<()> {
    let text = text.to_lowercase();
    if text.contains("report") || text.contains("daily") {
        let date = state.bot.today();
        let summaries = state.bot.daily_report(None, date).await?;
        let blocks = state.slack.report_blocks(date, &summaries).await;
        state
            .slack
            .post_message(channel, "Daily Report", Some(blocks))
            .await?;
    } else if text.contains("help") {
        state
            .slack
            .post_message(channel, "Time Tracking Bot Commands", Some(blocks::help_blocks()))
            .await?;
    } else {
        state
            .slack
            .post_message(
                channel,
                "Hi! I'm your time tracking bot. Use `@bot report` to see daily reports or `@bot help` for commands.",
                None,
            )
            .await?;
    }
    Ok(())
}

async fn slack_interactions(
    State(state): State<SlackState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(rejection) = reject_unsigned(&state, &headers, &body) {
        return rejection;
    }
    let arrival = Utc::now();

    let payload: InteractionPayload = match form_fields(&body)
        .get("payload")
        .and_then(|raw| serde_json::from_str(raw).ok())
    {
        Some(p) => p,
        None => return bad_request("Invalid interaction payload"),
    };

    let clicks: Vec<(Uuid, CheckInStatus)> = payload
        .actions
        .iter()
        .filter_map(|action| {
            let status = blocks::parse_action_id(&action.action_id)?;
            let prompt_id = action.value.as_deref()?.parse::<Uuid>().ok()?;
            Some((prompt_id, status))
        })
        .collect();

    for (prompt_id, status) in clicks {
        let state = state.clone();
        let subject = payload.user.id.clone();
        let response_url = payload.response_url.clone();
        tokio::spawn(async move {
            handle_click(&state, prompt_id, &subject, status, arrival, &response_url).await;
        });
    }

    StatusCode::OK.into_response()
}

/// Apply one button click and tell the clicker what happened when it was not accepted.
async fn handle_click(
    state: &SlackState,
    prompt_id: Uuid,
    subject: &str,
    status: CheckInStatus,
    arrival: chrono::DateTime<Utc>,
    response_url: &str,
) {
    let reply = match state
        .bot
        .handle_response(prompt_id, subject, status, arrival)
        .await
    {
        Ok(ResponseOutcome::Accepted(change)) => {
            info!(
                "Check-in recorded: {} - {} at {}",
                change.subject,
                change.status,
                state.bot.zone().format_time(change.at)
            );
            None
        }
        Ok(ResponseOutcome::AlreadyResponded) => {
            Some("You have already checked in for this reminder.".to_string())
        }
        Ok(ResponseOutcome::Expired) => {
            Some("⌛ This check-in has closed. Please wait for the next reminder.".to_string())
        }
        Err(e) => {
            error!("Check-in from {} failed: {}", subject, e);
            Some("❌ Error recording check-in. Please try again.".to_string())
        }
    };

    if let Some(text) = reply {
        let body = json!({
            "response_type": "ephemeral",
            "replace_original": false,
            "text": text,
        });
        if let Err(e) = state.slack.respond(response_url, &body).await {
            warn!("Failed to reply to {}: {}", subject, e);
        }
    }
}

async fn slack_commands(
    State(state): State<SlackState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(rejection) = reject_unsigned(&state, &headers, &body) {
        return rejection;
    }

    let fields = form_fields(&body);
    let command = fields.get("command").map(String::as_str).unwrap_or_default();
    let channel_id = fields.get("channel_id").cloned().unwrap_or_default();
    let text = fields.get("text").map(|t| t.trim().to_string()).unwrap_or_default();
    let response_url = fields.get("response_url").cloned().unwrap_or_default();

    match command {
        "/set-channel" => {
            if channel_id.is_empty() {
                return bad_request("Missing channel_id");
            }
            state.bot.set_channel(&channel_id).await;
            Json(json!({
                "response_type": "ephemeral",
                "text": format!("✅ Channel set to: <#{}>", channel_id),
            }))
            .into_response()
        }
        "/daily-report" => {
            let date = if text.is_empty() {
                state.bot.today()
            } else {
                match NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
                    Ok(d) => d,
                    Err(_) => {
                        return Json(json!({
                            "response_type": "ephemeral",
                            "text": format!("Invalid date '{}'. Use YYYY-MM-DD.", text),
                        }))
                        .into_response();
                    }
                }
            };
            tokio::spawn(async move {
                let body = match state.bot.daily_report(None, date).await {
                    Ok(summaries) => json!({
                        "response_type": "ephemeral",
                        "blocks": state.slack.report_blocks(date, &summaries).await,
                    }),
                    Err(e) => {
                        error!("Error generating report for {}: {}", date, e);
                        json!({
                            "response_type": "ephemeral",
                            "text": "❌ Error generating report. Please try again.",
                        })
                    }
                };
                if let Err(e) = state.slack.respond(&response_url, &body).await {
                    warn!("Failed to deliver /daily-report: {}", e);
                }
            });
            Json(json!({
                "response_type": "ephemeral",
                "text": format!("Generating report for {}...", date),
            }))
            .into_response()
        }
        other => Json(json!({
            "response_type": "ephemeral",
            "text": format!("Unknown command {}", other),
        }))
        .into_response(),
    }
}

/// HTTP listener for the Slack webhooks.
pub struct SlackServer {
    addr: String,
    state: SlackState,
    handle: Option<JoinHandle<()>>,
}

impl SlackServer {
    pub fn new(host: &str, port: u16, state: SlackState) -> Self {
        Self {
            addr: format!("{}:{}", host, port),
            state,
            handle: None,
        }
    }
}

#[async_trait]
impl LifecycleComponent for SlackServer {
    async fn on_init(&mut self) -> Result<()> {
        if self.state.signing_secret.is_empty() {
            warn!(
                "No Slack signing secret configured. Webhook requests will NOT be verified. \
                 Set SLACK_SIGNING_SECRET for security."
            );
        }
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!("Slack webhooks listening at http://{}/slack/events", self.addr);
        let app = router(self.state.clone());
        self.handle = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Slack webhook server crashed: {}", e);
            }
        }));
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            info!("Slack webhook server stopped");
        }
        Ok(())
    }
}
