//! Safe points at which a running operation notices a cancel request.

use std::sync::Arc;

use hostwright_core::error::CoreError;
use hostwright_core::types::DbId;

use crate::store::{OperationStore, Store};

/// Handle a long-running operation polls between steps.
///
/// Remote commands are never killed mid-flight; the operation checks in
/// before each step and stops there when its job was cancelled.
#[derive(Clone, Default)]
pub struct Checkpoint {
    job: Option<(Arc<dyn Store>, DbId)>,
}

impl Checkpoint {
    /// A checkpoint that never cancels (direct calls, tests).
    pub fn none() -> Self {
        Self::default()
    }

    pub fn for_job(store: Arc<dyn Store>, job_id: DbId) -> Self {
        Self {
            job: Some((store, job_id)),
        }
    }

    pub fn job_id(&self) -> Option<DbId> {
        self.job.as_ref().map(|(_, id)| *id)
    }

    /// Fail with [`CoreError::Cancelled`] if cancellation was requested.
    pub async fn check(&self, stage: &str) -> Result<(), CoreError> {
        let Some((store, job_id)) = &self.job else {
            return Ok(());
        };
        if store.is_cancel_requested(*job_id).await? {
            tracing::info!(job_id, stage, "Operation cancelled at checkpoint");
            return Err(CoreError::Cancelled(format!("Cancelled before {stage}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use hostwright_db::models::operation::NewOperation;

    use super::*;
    use crate::store::{MemoryStore, OperationStore};

    #[tokio::test]
    async fn stops_only_after_cancel_request() {
        let store = Arc::new(MemoryStore::new());
        let job = store
            .enqueue_operation(&NewOperation {
                kind: "provision_site".into(),
                resource_key: "site:1".into(),
                params: serde_json::json!({}),
            })
            .await
            .unwrap();
        store.claim_next_operation().await.unwrap();

        let checkpoint = Checkpoint::for_job(store.clone(), job.id);
        checkpoint.check("create_directories").await.unwrap();

        store.cancel_operation(job.id).await.unwrap();
        assert_matches!(
            checkpoint.check("write_server_block").await,
            Err(CoreError::Cancelled(msg)) if msg.contains("write_server_block")
        );
        Checkpoint::none().check("anything").await.unwrap();
    }
}
