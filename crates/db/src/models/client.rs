//! Client (customer account) models.

use hostwright_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `clients` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Client {
    pub id: DbId,
    pub name: String,
    pub email: String,
    pub max_websites: i32,
    /// JSON array of entitlement names granted by the client's plan.
    pub plan_features: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Client {
    /// Whether the plan grants `feature`.
    pub fn has_feature(&self, feature: &str) -> bool {
        self.plan_features
            .as_array()
            .is_some_and(|features| features.iter().any(|f| f.as_str() == Some(feature)))
    }
}

/// DTO for creating a client.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateClient {
    pub name: String,
    pub email: String,
    pub max_websites: Option<i32>,
    pub plan_features: Option<Vec<String>>,
}
