//! Repository for the `clients` table.

use sqlx::PgPool;
use hostwright_core::types::DbId;

use crate::models::client::{Client, CreateClient};

/// Column list for `clients` queries.
const COLUMNS: &str = "id, name, email, max_websites, plan_features, created_at, updated_at";

/// Provides CRUD operations for clients.
pub struct ClientRepo;

impl ClientRepo {
    pub async fn create(pool: &PgPool, input: &CreateClient) -> Result<Client, sqlx::Error> {
        let query = format!(
            "INSERT INTO clients (name, email, max_websites, plan_features) \
             VALUES ($1, $2, COALESCE($3, 10), $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Client>(&query)
            .bind(&input.name)
            .bind(&input.email)
            .bind(input.max_websites)
            .bind(serde_json::json!(input.plan_features.clone().unwrap_or_default()))
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Client>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM clients WHERE id = $1");
        sqlx::query_as::<_, Client>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Client>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM clients ORDER BY name");
        sqlx::query_as::<_, Client>(&query).fetch_all(pool).await
    }

    /// Number of websites owned by a client.
    pub async fn count_websites(pool: &PgPool, id: DbId) -> Result<i64, sqlx::Error> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM websites WHERE client_id = $1")
            .bind(id)
            .fetch_one(pool)
            .await?;
        Ok(n)
    }
}
