//! Operator alert delivery via SMTP.
//!
//! [`EmailDelivery`] wraps the `lettre` async SMTP transport to send plain-text
//! alert emails. Configuration is loaded from environment variables; if
//! `SMTP_HOST` or `ALERT_EMAIL` is not set, [`EmailConfig::from_env`] returns
//! `None` and alerts are only logged.

use crate::bus::PlatformEvent;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for email delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "noreply@hostwright.local";

/// Configuration for the SMTP alert channel.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    /// Operator mailbox receiving every alert.
    pub alert_to: String,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable        | Required | Default                    |
    /// |-----------------|----------|----------------------------|
    /// | `SMTP_HOST`     | yes      |                            |
    /// | `ALERT_EMAIL`   | yes      |                            |
    /// | `SMTP_PORT`     | no       | `587`                      |
    /// | `SMTP_FROM`     | no       | `noreply@hostwright.local` |
    /// | `SMTP_USER`     | no       |                            |
    /// | `SMTP_PASSWORD` | no       |                            |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        let alert_to = std::env::var("ALERT_EMAIL").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
            alert_to,
        })
    }
}

// ---------------------------------------------------------------------------
// Message rendering
// ---------------------------------------------------------------------------

/// Subject line for an alert email.
pub fn subject_for(event: &PlatformEvent) -> String {
    match event.payload.get("domain").and_then(|d| d.as_str()) {
        Some(domain) => format!("[Hostwright] {} ({domain})", event.event_type),
        None => format!("[Hostwright] {}", event.event_type),
    }
}

/// Plain-text body for an alert email.
pub fn body_for(event: &PlatformEvent) -> String {
    let mut body = format!("Event: {}\nTime: {}\n", event.event_type, event.timestamp);
    if let (Some(kind), Some(id)) = (&event.source_entity_type, event.source_entity_id) {
        body.push_str(&format!("Source: {kind} #{id}\n"));
    }
    body.push_str(&format!(
        "Details: {}",
        serde_json::to_string_pretty(&event.payload).unwrap_or_default()
    ));
    body
}

// ---------------------------------------------------------------------------
// EmailDelivery
// ---------------------------------------------------------------------------

/// Sends alert emails for platform events via SMTP.
pub struct EmailDelivery {
    config: EmailConfig,
}

impl EmailDelivery {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Send an alert email for `event` to the configured operator mailbox.
    pub async fn deliver(&self, event: &PlatformEvent) -> Result<(), EmailError> {
        use lettre::{
            message::header::ContentType, transport::smtp::authentication::Credentials,
            AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
        };

        let email = Message::builder()
            .from(self.config.from_address.parse()?)
            .to(self.config.alert_to.parse()?)
            .subject(subject_for(event))
            .header(ContentType::TEXT_PLAIN)
            .body(body_for(event))
            .map_err(|e| EmailError::Build(e.to_string()))?;

        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?
                .port(self.config.smtp_port);

        if let (Some(user), Some(pass)) = (&self.config.smtp_user, &self.config.smtp_password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let mailer = transport_builder.build();
        mailer.send(email).await?;

        tracing::info!(
            to = %self.config.alert_to,
            event_type = %event.event_type,
            "Alert email sent"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_includes_domain_when_present() {
        let event = PlatformEvent::new("ssl.expiring")
            .with_payload(serde_json::json!({"domain": "example.com"}));
        assert_eq!(subject_for(&event), "[Hostwright] ssl.expiring (example.com)");
        assert_eq!(
            subject_for(&PlatformEvent::new("cron.failed")),
            "[Hostwright] cron.failed"
        );
    }

    #[test]
    fn body_names_the_source_entity() {
        let event = PlatformEvent::new("backup.failed")
            .with_source("website", 7)
            .with_payload(serde_json::json!({"error": "disk full"}));
        let body = body_for(&event);
        assert!(body.starts_with("Event: backup.failed\n"));
        assert!(body.contains("Source: website #7"));
        assert!(body.contains("disk full"));
    }

    #[test]
    fn email_error_display_build() {
        let err = EmailError::Build("missing body".to_string());
        assert_eq!(err.to_string(), "Email build error: missing body");
    }

    #[test]
    fn email_error_display_address() {
        let addr_err: Result<lettre::Address, _> = "not-an-email".parse();
        let err = EmailError::Address(addr_err.unwrap_err());
        assert!(err.to_string().contains("Email address parse error"));
    }
}
