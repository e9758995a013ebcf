use crate::alert::DispatchRequest;
use crate::notify::Notifier;
use anyhow::{Context, Result};
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::{Deserialize, Serialize};
use std::env;

pub const SMTP_USER_ENV: &str = "CROWDWATCH_SMTP_USER";
pub const SMTP_PASSWORD_ENV: &str = "CROWDWATCH_SMTP_PASSWORD";

/// Outbound mail settings. Credentials are never part of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub sender: String,
    pub recipient: String,
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

/// SMTP login read from the environment
#[derive(Clone)]
pub struct SmtpCredentials {
    pub username: String,
    pub password: String,
}

impl SmtpCredentials {
    /// `None` when no password is configured. The username falls back to the sender address.
    pub fn from_env(sender: &str) -> Option<Self> {
        let password = env::var(SMTP_PASSWORD_ENV).ok().filter(|p| !p.is_empty())?;
        let username = env::var(SMTP_USER_ENV)
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| sender.to_string());
        Some(Self { username, password })
    }
}

pub fn alert_subject(request: &DispatchRequest) -> String {
    format!("⚠️ {} Overcrowding Alert!", request.zone_name)
}

pub fn alert_body(request: &DispatchRequest) -> String {
    format!(
        "{} has {} people detected.\nPlease take immediate action.",
        request.zone_name, request.count
    )
}

/// Sends one email per alert to the operator address over SMTP with STARTTLS
pub struct EmailNotifier {
    from: Mailbox,
    to: Mailbox,
    transport: SmtpTransport,
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig, credentials: SmtpCredentials) -> Result<Self> {
        let from: Mailbox = config
            .sender
            .parse()
            .with_context(|| format!("Invalid sender address {}", config.sender))?;
        let to: Mailbox = config
            .recipient
            .parse()
            .with_context(|| format!("Invalid recipient address {}", config.recipient))?;
        let transport = SmtpTransport::starttls_relay(&config.smtp_host)
            .with_context(|| format!("Failed to set up SMTP relay {}", config.smtp_host))?
            .port(config.smtp_port)
            .credentials(Credentials::new(credentials.username, credentials.password))
            .build();
        Ok(Self { from, to, transport })
    }

    pub fn compose(&self, request: &DispatchRequest) -> Result<Message> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(alert_subject(request))
            .header(ContentType::TEXT_PLAIN)
            .body(alert_body(request))
            .context("Failed to build alert email")
    }
}

impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    fn notify(&self, request: &DispatchRequest) -> Result<()> {
        let message = self.compose(request)?;
        self.transport
            .send(&message)
            .with_context(|| format!("Failed to send alert email to {}", self.to))?;
        tracing::info!(zone = %request.zone_name, to = %self.to, "alert email sent");
        Ok(())
    }
}
