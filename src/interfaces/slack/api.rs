use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use super::blocks::{self, NamedSummary};
use crate::core::messenger::{ChatMessenger, MessageRef, StatusChange};
use crate::core::worktime::DailySummary;
use crate::core::zone::ReferenceZone;

pub const SLACK_API_BASE: &str = "https://slack.com/api";

#[derive(Deserialize, Debug)]
struct ApiResponse {
    ok: bool,
    error: Option<String>,
    channel: Option<String>,
    ts: Option<String>,
    user: Option<UserInfo>,
}

#[derive(Deserialize, Debug)]
struct UserInfo {
    name: Option<String>,
    real_name: Option<String>,
    profile: Option<UserProfile>,
}

#[derive(Deserialize, Debug)]
struct UserProfile {
    display_name: Option<String>,
    real_name: Option<String>,
}

impl UserInfo {
    fn best_name(self) -> Option<String> {
        let profile = self.profile;
        [
            self.real_name,
            profile.as_ref().and_then(|p| p.real_name.clone()),
            profile.and_then(|p| p.display_name),
            self.name,
        ]
        .into_iter()
        .flatten()
        .find(|n| !n.trim().is_empty())
    }
}

/// Slack Web API client used for every outbound message.
pub struct SlackMessenger {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    zone: ReferenceZone,
    history_limit: usize,
    names: RwLock<HashMap<String, String>>,
}

impl SlackMessenger {
    pub fn new(bot_token: &str, zone: ReferenceZone, history_limit: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: SLACK_API_BASE.to_string(),
            bot_token: bot_token.to_string(),
            zone,
            history_limit,
            names: RwLock::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    fn check(method: &str, parsed: ApiResponse) -> Result<ApiResponse> {
        if !parsed.ok {
            bail!(
                "Slack API {} failed: {}",
                method,
                parsed.error.as_deref().unwrap_or("unknown_error")
            );
        }
        Ok(parsed)
    }

    async fn call(&self, method: &str, body: &Value) -> Result<ApiResponse> {
        let res = self
            .client
            .post(format!("{}/{}", self.api_base, method))
            .bearer_auth(&self.bot_token)
            .json(body)
            .send()
            .await?;
        if !res.status().is_success() {
            bail!("Slack API {} returned HTTP {}", method, res.status());
        }
        Self::check(method, res.json().await?)
    }

    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        blocks: Option<Value>,
    ) -> Result<MessageRef> {
        let mut body = json!({ "channel": channel, "text": text });
        if let Some(blocks) = blocks {
            body["blocks"] = blocks;
        }
        let res = self.call("chat.postMessage", &body).await?;
        let ts = res
            .ts
            .ok_or_else(|| anyhow!("chat.postMessage returned no ts"))?;
        Ok(MessageRef {
            channel: res.channel.unwrap_or_else(|| channel.to_string()),
            ts,
        })
    }

    pub async fn update_message(
        &self,
        message: &MessageRef,
        text: &str,
        blocks: Value,
    ) -> Result<()> {
        let body = json!({
            "channel": message.channel,
            "ts": message.ts,
            "text": text,
            "blocks": blocks,
        });
        self.call("chat.update", &body).await.map(|_| ())
    }

    /// Display name for a user id, cached. Falls back to the id on any failure.
    pub async fn display_name(&self, user_id: &str) -> String {
        if let Some(name) = self.names.read().await.get(user_id) {
            return name.clone();
        }
        if self.bot_token.is_empty() {
            return user_id.to_string();
        }

        let res = self
            .client
            .get(format!("{}/users.info", self.api_base))
            .bearer_auth(&self.bot_token)
            .query(&[("user", user_id)])
            .send()
            .await;
        let name = match res {
            Ok(r) => match r.json::<ApiResponse>().await {
                Ok(parsed) => Self::check("users.info", parsed)
                    .ok()
                    .and_then(|p| p.user)
                    .and_then(UserInfo::best_name),
                Err(e) => {
                    debug!("users.info for {} unreadable: {}", user_id, e);
                    None
                }
            },
            Err(e) => {
                warn!("users.info for {} failed: {}", user_id, e);
                None
            }
        };

        match name {
            Some(name) => {
                self.names
                    .write()
                    .await
                    .insert(user_id.to_string(), name.clone());
                name
            }
            None => user_id.to_string(),
        }
    }

    /// Reply through an interaction's `response_url`. Empty urls are skipped.
    pub async fn respond(&self, response_url: &str, body: &Value) -> Result<()> {
        if response_url.is_empty() {
            return Ok(());
        }
        let res = self.client.post(response_url).json(body).send().await?;
        if !res.status().is_success() {
            bail!("response_url returned HTTP {}", res.status());
        }
        Ok(())
    }

    pub async fn report_blocks(&self, date: NaiveDate, summaries: &[DailySummary]) -> Value {
        let mut entries = Vec::with_capacity(summaries.len());
        for summary in summaries {
            entries.push(NamedSummary {
                name: self.display_name(&summary.subject).await,
                summary,
            });
        }
        blocks::report_blocks(date, &entries, self.zone, self.history_limit)
    }
}

#[async_trait]
impl ChatMessenger for SlackMessenger {
    async fn post_reminder(
        &self,
        channel: &str,
        prompt_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<MessageRef> {
        let blocks = blocks::reminder_blocks(prompt_id, &self.zone.format_time(sent_at));
        self.post_message(channel, blocks::REMINDER_TEXT, Some(blocks))
            .await
    }

    async fn close_reminder(
        &self,
        message: &MessageRef,
        _prompt_id: Uuid,
        closed_at: DateTime<Utc>,
    ) -> Result<()> {
        let sent_at = message
            .ts
            .split('.')
            .next()
            .and_then(|secs| secs.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|at| self.zone.format_time(at))
            .unwrap_or_else(|| "-".to_string());
        let blocks =
            blocks::closed_reminder_blocks(&sent_at, &self.zone.format_time(closed_at));
        self.update_message(message, blocks::REMINDER_TEXT, blocks)
            .await
    }

    async fn post_status_change(&self, change: &StatusChange) -> Result<()> {
        let name = self.display_name(&change.subject).await;
        let text = blocks::status_change_text(&name, change.status);
        self.post_message(&change.channel, &text, None).await?;
        Ok(())
    }

    async fn post_report(
        &self,
        channel: &str,
        date: NaiveDate,
        summaries: &[DailySummary],
    ) -> Result<()> {
        let blocks = self.report_blocks(date, summaries).await;
        self.post_message(channel, "Daily Report", Some(blocks))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_name_prefers_real_name() {
        let info: UserInfo = serde_json::from_value(json!({
            "name": "ada",
            "real_name": "Ada Lovelace",
            "profile": { "display_name": "ada.l", "real_name": "" }
        }))
        .unwrap();
        assert_eq!(info.best_name().as_deref(), Some("Ada Lovelace"));

        let info: UserInfo = serde_json::from_value(json!({
            "name": "grace",
            "profile": { "display_name": "", "real_name": "  " }
        }))
        .unwrap();
        assert_eq!(info.best_name().as_deref(), Some("grace"));
    }

    #[test]
    fn api_errors_surface_the_slack_code() {
        let parsed: ApiResponse =
            serde_json::from_value(json!({ "ok": false, "error": "channel_not_found" }))
                .unwrap();
        let err = SlackMessenger::check("chat.postMessage", parsed).unwrap_err();
        assert!(err.to_string().contains("channel_not_found"));
    }

    #[tokio::test]
    async fn names_fall_back_to_ids_without_a_token() {
        let messenger = SlackMessenger::new("", ReferenceZone::default(), 10);
        assert_eq!(messenger.display_name("U123").await, "U123");
        messenger.respond("", &json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_api_fails_the_post() {
        let messenger = SlackMessenger::new("xoxb-test", ReferenceZone::default(), 10)
            .with_api_base("http://127.0.0.1:9");
        assert!(
            messenger
                .post_message("C1", "hi", None)
                .await
                .is_err()
        );
        assert_eq!(messenger.display_name("U9").await, "U9");
    }
}
