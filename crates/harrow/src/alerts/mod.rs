//! Alerting: surface high-severity findings to external notifiers, at most
//! once per finding per crawl.

mod telegram;

pub use telegram::TelegramAlerter;

use crate::config::AlertsConfig;
use async_trait::async_trait;
use harrow_db::CrawlDb;
use harrow_rules::RuleFindings;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One finding worth surfacing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AlertMessage {
    pub crawl: String,
    pub path_virtual: String,
    pub rule_id: String,
    pub rule_name: String,
    pub matched: String,
    pub severity: u8,
}

#[async_trait]
pub trait Alerter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, alert: &AlertMessage) -> anyhow::Result<()>;
}

/// The configured notifiers plus the severity gate. Built once from config;
/// notifier failures are logged and never fail the crawl.
pub struct AlerterSet {
    alerters: Vec<Box<dyn Alerter>>,
    min_severity: u8,
}

impl AlerterSet {
    pub fn from_config(config: &AlertsConfig) -> Self {
        let mut alerters: Vec<Box<dyn Alerter>> = Vec::new();
        if let Some(telegram) = &config.telegram {
            alerters.push(Box::new(TelegramAlerter::new(telegram)));
        }
        Self {
            alerters,
            min_severity: config.min_severity,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.alerters.is_empty()
    }

    /// Record each qualifying finding in the alert registry and notify on
    /// first sight. The `(crawl, finding fingerprint)` uniqueness in the
    /// ledger is what makes alerts fire once.
    pub async fn dispatch(
        &self,
        db: &CrawlDb,
        crawl_id: i64,
        crawl_name: &str,
        file_fingerprint: &str,
        path_virtual: &str,
        findings: &BTreeMap<String, RuleFindings>,
    ) {
        if self.alerters.is_empty() {
            return;
        }

        for (rule_id, rule_findings) in findings {
            for finding in &rule_findings.findings {
                if finding.severity < self.min_severity {
                    continue;
                }

                let message = AlertMessage {
                    crawl: crawl_name.to_string(),
                    path_virtual: path_virtual.to_string(),
                    rule_id: rule_id.clone(),
                    rule_name: rule_findings.name.clone(),
                    matched: finding.matched.clone(),
                    severity: finding.severity,
                };
                let payload = serde_json::to_string(&message).ok();

                let (alert, inserted) = match db
                    .insert_or_get_alert(
                        crawl_id,
                        file_fingerprint,
                        &finding.fingerprint,
                        payload.as_deref(),
                    )
                    .await
                {
                    Ok(result) => result,
                    Err(err) => {
                        warn!(error = %err, rule = %rule_id, "cannot record alert");
                        continue;
                    }
                };
                if !inserted {
                    debug!(rule = %rule_id, "finding already alerted");
                    continue;
                }

                let mut all_sent = true;
                for alerter in &self.alerters {
                    if let Err(err) = alerter.send(&message).await {
                        warn!(alerter = alerter.name(), error = %format!("{err:#}"), "alert failed");
                        all_sent = false;
                    }
                }
                if all_sent {
                    if let Err(err) = db.mark_alert_sent(alert.id).await {
                        warn!(error = %err, "cannot mark alert sent");
                    }
                }
            }
        }
    }
}
