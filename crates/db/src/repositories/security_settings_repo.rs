//! Repository for the `security_settings` singleton.

use sqlx::PgPool;

use crate::models::backup::{NewKeyPair, SecuritySettings};

/// Column list for `security_settings` queries.
const COLUMNS: &str = "\
    id, public_key_pem, sealed_private_key, key_fingerprint, key_generated_at, \
    private_key_downloaded_at, created_at, updated_at";

/// Reads and writes the backup key pair.
pub struct SecuritySettingsRepo;

impl SecuritySettingsRepo {
    pub async fn get(pool: &PgPool) -> Result<SecuritySettings, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM security_settings WHERE id = 1");
        sqlx::query_as::<_, SecuritySettings>(&query).fetch_one(pool).await
    }

    /// Replace the key pair. Resets the one-time download marker.
    pub async fn store_key_pair(pool: &PgPool, key: &NewKeyPair) -> Result<SecuritySettings, sqlx::Error> {
        let query = format!(
            "UPDATE security_settings SET \
                 public_key_pem = $1, sealed_private_key = $2, key_fingerprint = $3, \
                 key_generated_at = NOW(), private_key_downloaded_at = NULL \
             WHERE id = 1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SecuritySettings>(&query)
            .bind(&key.public_key_pem)
            .bind(&key.sealed_private_key)
            .bind(&key.key_fingerprint)
            .fetch_one(pool)
            .await
    }

    /// Record the one-time private key download. Returns `false` if it
    /// was already downloaded or no key exists.
    pub async fn claim_private_key_download(pool: &PgPool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE security_settings SET private_key_downloaded_at = NOW() \
             WHERE id = 1 AND private_key_downloaded_at IS NULL AND sealed_private_key IS NOT NULL",
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
