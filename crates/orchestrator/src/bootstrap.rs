//! Wiring shared by the API and worker binaries.

use std::sync::Arc;

use hostwright_cloud::{
    CloudConfig, CloudflareProvider, DnsProvider, DnsResolver, DohResolver, ObjectStorage,
    S3Storage,
};
use hostwright_core::error::CoreError;
use hostwright_core::remote::{RemoteClient, RetryPolicy, SshConfig};
use hostwright_events::EventBus;

use crate::config::OrchestratorConfig;
use crate::context::Context;
use crate::executor::HostExecutor;
use crate::operations::Orchestrator;
use crate::store::Store;

/// External adapters, present only when configured.
pub struct Adapters {
    pub dns_provider: Option<Arc<dyn DnsProvider>>,
    pub resolvers: Vec<Box<dyn DnsResolver>>,
    pub storage: Option<Arc<dyn ObjectStorage>>,
}

impl Adapters {
    pub async fn from_config(cloud: &CloudConfig) -> Result<Self, CoreError> {
        let dns_provider = match &cloud.cloudflare_api_token {
            Some(token) => Some(Arc::new(CloudflareProvider::new(token.clone())?) as Arc<dyn DnsProvider>),
            None => {
                tracing::info!("CLOUDFLARE_API_TOKEN not set, DNS sync disabled");
                None
            }
        };

        let storage = match &cloud.s3_bucket {
            Some(bucket) => {
                let s3 = S3Storage::new(bucket.clone(), cloud.s3_prefix.clone(), cloud.s3_endpoint.clone()).await;
                tracing::info!(bucket = %bucket, prefix = %cloud.s3_prefix, "Cloud backup storage enabled");
                Some(Arc::new(s3) as Arc<dyn ObjectStorage>)
            }
            None => None,
        };

        Ok(Self {
            dns_provider,
            resolvers: DohResolver::from_urls(&cloud.dns_resolvers)?,
            storage,
        })
    }
}

/// Remote client over ssh (or the local shell for loopback servers),
/// configured from the environment.
pub fn remote_client_from_env() -> RemoteClient {
    RemoteClient::new(
        Arc::new(HostExecutor::new(SshConfig::from_env())),
        RetryPolicy::from_env(),
    )
}

/// Build the full [`Orchestrator`] from environment configuration.
pub async fn orchestrator_from_env(store: Arc<dyn Store>, events: Arc<EventBus>) -> Result<Orchestrator, CoreError> {
    let config = Arc::new(OrchestratorConfig::from_env());
    let adapters = Adapters::from_config(&CloudConfig::from_env()).await?;
    let ctx = Context::new(store, remote_client_from_env(), config, events);
    Ok(Orchestrator::new(
        ctx,
        adapters.dns_provider,
        adapters.resolvers,
        adapters.storage,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_cloud_yields_no_adapters() {
        let cloud = CloudConfig {
            dns_resolvers: vec!["https://dns.google/resolve".into()],
            ..Default::default()
        };
        let adapters = Adapters::from_config(&cloud).await.unwrap();
        assert!(adapters.dns_provider.is_none());
        assert!(adapters.storage.is_none());
        assert_eq!(adapters.resolvers.len(), 1);
    }
}
