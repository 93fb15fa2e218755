//! Discord delivery for chat notifications
//!
//! Direct messages go through the bot API, announcements through the
//! channel webhook. Requests run on the tokio runtime in the background;
//! the calling operation never waits on Discord.

use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::json;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use bicanh_core::{Error, Notifier, Result};

use crate::config::DiscordConfig;

#[derive(Deserialize)]
struct DmChannel {
    id: String,
}

/// [`Notifier`] backed by the Discord HTTP API
pub struct DiscordNotifier {
    client: reqwest::Client,
    runtime: Handle,
    api_base: String,
    bot_token: Option<String>,
    webhook_url: Option<String>,
    app_url: Option<String>,
}

impl DiscordNotifier {
    pub fn new(config: &DiscordConfig, runtime: Handle) -> Self {
        Self {
            client: reqwest::Client::new(),
            runtime,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            webhook_url: config.webhook_url.clone(),
            app_url: config.app_url.clone(),
        }
    }

    pub fn has_direct_messages(&self) -> bool {
        self.bot_token.is_some()
    }

    pub fn has_announcements(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Webhook content: body, mentions, then the app link
    fn announcement_content(&self, chat_ids: &[String], body: &str) -> String {
        let mentions = chat_ids
            .iter()
            .map(|id| format!("<@{}>", id))
            .collect::<Vec<_>>()
            .join(" ");

        let mut content = format!("{} {}", body, mentions);
        if let Some(url) = &self.app_url {
            content.push('\n');
            content.push_str(url);
        }
        content
    }
}

async fn send_dm(
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
    body: String,
) -> std::result::Result<(), reqwest::Error> {
    let auth = format!("Bot {}", bot_token);

    let channel: DmChannel = client
        .post(format!("{}/users/@me/channels", api_base))
        .header(AUTHORIZATION, &auth)
        .json(&json!({ "recipient_id": chat_id }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    client
        .post(format!("{}/channels/{}/messages", api_base, channel.id))
        .header(AUTHORIZATION, &auth)
        .json(&json!({ "content": body }))
        .send()
        .await?
        .error_for_status()?;

    Ok(())
}

async fn send_webhook(
    client: reqwest::Client,
    webhook_url: String,
    content: String,
) -> std::result::Result<(), reqwest::Error> {
    client
        .post(webhook_url)
        .json(&json!({ "content": content }))
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

impl Notifier for DiscordNotifier {
    fn notify(&self, chat_id: &str, body: &str) -> Result<()> {
        let bot_token = self
            .bot_token
            .clone()
            .ok_or_else(|| Error::DependencyFailure("Discord bot token not configured".into()))?;

        let chat_id = chat_id.to_string();
        let task = send_dm(
            self.client.clone(),
            self.api_base.clone(),
            bot_token,
            chat_id.clone(),
            body.to_string(),
        );
        self.runtime.spawn(async move {
            match task.await {
                Ok(()) => debug!(chat_id = %chat_id, "Direct message delivered"),
                Err(e) => warn!(chat_id = %chat_id, error = %e, "Direct message failed"),
            }
        });
        Ok(())
    }

    fn announce(&self, chat_ids: &[String], body: &str) -> Result<()> {
        let webhook_url = self
            .webhook_url
            .clone()
            .ok_or_else(|| Error::DependencyFailure("Discord webhook not configured".into()))?;

        let targets = chat_ids.len();
        let task = send_webhook(
            self.client.clone(),
            webhook_url,
            self.announcement_content(chat_ids, body),
        );
        self.runtime.spawn(async move {
            match task.await {
                Ok(()) => debug!(targets, "Announcement delivered"),
                Err(e) => warn!(targets, error = %e, "Announcement failed"),
            }
        });
        Ok(())
    }
}
