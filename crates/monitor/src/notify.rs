//! Fan-out of alert emails to a contract's subscribers.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use contract_watch_domain::config::MailRelayConfig;
use contract_watch_domain::model::{ContractRecord, Threat};
use contract_watch_domain::storage::AlertEmailStore;

pub const ALERT_SUBJECT: &str = "Contract Security Alert";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("mail relay request failed: {0}")]
    Transport(String),
    #[error("mail relay rejected message with status {status}")]
    Rejected { status: u16 },
}

impl From<reqwest::Error> for NotificationError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

#[async_trait]
pub trait AlertTransport: Send + Sync {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), NotificationError>;
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Posts each message as JSON to an HTTP mail relay.
pub struct HttpMailRelay {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    sender: String,
}

impl HttpMailRelay {
    pub fn new(
        url: impl Into<String>,
        token: Option<String>,
        sender: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            token,
            sender: sender.into(),
        })
    }
}

#[async_trait]
impl AlertTransport for HttpMailRelay {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), NotificationError> {
        let payload = RelayPayload {
            from: &self.sender,
            to: &message.to,
            subject: &message.subject,
            text: &message.body,
        };
        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Used when no relay is configured: alerts only reach the log.
pub struct LogTransport;

#[async_trait]
impl AlertTransport for LogTransport {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), NotificationError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "mail relay not configured; alert logged only"
        );
        Ok(())
    }
}

pub fn transport_from_config(
    config: &MailRelayConfig,
    timeout: Duration,
) -> Result<Arc<dyn AlertTransport>, NotificationError> {
    match config.url() {
        Some(url) => {
            let relay = HttpMailRelay::new(
                url,
                config.token().map(str::to_string),
                config.sender(),
                timeout,
            )?;
            Ok(Arc::new(relay))
        }
        None => {
            warn!("ALERT_MAIL_RELAY_URL not set; alert emails will only be logged");
            Ok(Arc::new(LogTransport))
        }
    }
}

pub fn compose_alert_body(address: &str, threats: &[Threat]) -> String {
    let lines: Vec<String> = threats
        .iter()
        .map(|threat| format!("- {}: {}", threat.kind, threat.description))
        .collect();
    format!(
        "Security threats detected for contract {address}:\n\n{}",
        lines.join("\n")
    )
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
}

pub struct NotificationDispatcher {
    subscribers: Arc<dyn AlertEmailStore>,
    transport: Arc<dyn AlertTransport>,
}

impl NotificationDispatcher {
    pub fn new(subscribers: Arc<dyn AlertEmailStore>, transport: Arc<dyn AlertTransport>) -> Self {
        Self {
            subscribers,
            transport,
        }
    }

    /// Sends one message per subscriber. Failures are counted and logged,
    /// never returned, so one bad recipient cannot block the rest.
    pub async fn notify(&self, contract: &ContractRecord, threats: &[Threat]) -> DispatchReport {
        let mut report = DispatchReport::default();
        if threats.is_empty() {
            return report;
        }

        let recipients = match self.subscribers.subscribers(contract.id).await {
            Ok(recipients) => recipients,
            Err(err) => {
                error!(contract_id = %contract.id, %err, "error loading alert subscribers");
                return report;
            }
        };
        if recipients.is_empty() {
            info!(contract_id = %contract.id, "no alert subscribers configured");
            return report;
        }

        let body = compose_alert_body(&contract.address, threats);
        for recipient in recipients {
            let message = OutboundMessage {
                to: recipient.email,
                subject: ALERT_SUBJECT.to_string(),
                body: body.clone(),
            };
            match self.transport.deliver(&message).await {
                Ok(()) => {
                    counter!("monitor_alert_emails_total", "result" => "sent").increment(1);
                    info!(email = %message.to, "sent alert email");
                    report.sent += 1;
                }
                Err(err) => {
                    counter!("monitor_alert_emails_total", "result" => "failed").increment(1);
                    error!(email = %message.to, %err, "error sending alert email");
                    report.failed += 1;
                }
            }
        }
        report
    }
}
