//! Telegram Bot API notifier.

use super::{Alerter, AlertMessage};
use crate::config::TelegramConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

pub struct TelegramAlerter {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramAlerter {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
        }
    }
}

#[async_trait]
impl Alerter for TelegramAlerter {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, alert: &AlertMessage) -> Result<()> {
        let text = format!(
            "Credential found\nCrawl: {}\nRule: {} ({})\nSeverity: {}\nFile: {}",
            alert.crawl, alert.rule_name, alert.rule_id, alert.severity, alert.path_virtual
        );

        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await
            .context("telegram request failed")?;

        if !response.status().is_success() {
            bail!("telegram responded {}", response.status());
        }
        Ok(())
    }
}
