//! Forwards alert-worthy events to the operator.
//!
//! The [`AlertRouter`] subscribes to the [`EventBus`](crate::EventBus) and,
//! for every event whose type is in [`ALERT_EVENTS`], logs a warning and
//! emails the operator when SMTP is configured.

use tokio::sync::broadcast;

use crate::bus::{self, PlatformEvent};
use crate::delivery::email::EmailDelivery;

/// Event types that page the operator.
pub const ALERT_EVENTS: &[&str] = &[
    bus::SITE_PROVISION_FAILED,
    bus::SSL_FAILED,
    bus::SSL_EXPIRING,
    bus::BACKUP_FAILED,
    bus::RESTORE_FAILED,
    bus::DEPLOY_FAILED,
    bus::CRON_FAILED,
    bus::SERVER_UNHEALTHY,
];

pub fn is_alert(event_type: &str) -> bool {
    ALERT_EVENTS.contains(&event_type)
}

/// Routes alert events to the operator mailbox.
pub struct AlertRouter {
    email: Option<EmailDelivery>,
}

impl AlertRouter {
    pub fn new(email: Option<EmailDelivery>) -> Self {
        Self { email }
    }

    /// Run the routing loop until the event bus closes.
    pub async fn run(self, mut receiver: broadcast::Receiver<PlatformEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.route_event(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Alert router lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, alert router shutting down");
                    break;
                }
            }
        }
    }

    async fn route_event(&self, event: &PlatformEvent) {
        if !is_alert(&event.event_type) {
            return;
        }

        tracing::warn!(
            event_type = %event.event_type,
            entity_type = ?event.source_entity_type,
            entity_id = ?event.source_entity_id,
            payload = %event.payload,
            "Operator alert"
        );

        if let Some(email) = &self.email {
            if let Err(e) = email.deliver(event).await {
                tracing::error!(
                    error = %e,
                    event_type = %event.event_type,
                    "Failed to deliver alert email"
                );
            }
        }
    }
}
