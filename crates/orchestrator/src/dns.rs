//! Zone reconciliation against the DNS provider and propagation checks.

use std::sync::Arc;

use hostwright_cloud::resolver::{self, DnsResolver};
use hostwright_cloud::DnsProvider;
use hostwright_core::dns::{self, DnsRecord, PropagationReport, RecordType, SyncPlan};
use hostwright_core::error::CoreError;
use hostwright_core::types::DbId;
use hostwright_db::models::dns::DnsZone;
use hostwright_events::bus::DNS_SYNCED;
use hostwright_events::PlatformEvent;

use crate::context::Context;
use crate::store::DnsStore;

#[derive(Clone)]
pub struct DnsSynchronizer {
    ctx: Context,
    provider: Option<Arc<dyn DnsProvider>>,
    resolvers: Arc<Vec<Box<dyn DnsResolver>>>,
}

impl DnsSynchronizer {
    pub fn new(
        ctx: Context,
        provider: Option<Arc<dyn DnsProvider>>,
        resolvers: Vec<Box<dyn DnsResolver>>,
    ) -> Self {
        Self {
            ctx,
            provider,
            resolvers: Arc::new(resolvers),
        }
    }

    async fn zone(&self, zone_id: DbId) -> Result<DnsZone, CoreError> {
        self.ctx
            .store
            .find_zone(zone_id)
            .await?
            .ok_or(CoreError::NotFound { entity: "DnsZone", id: zone_id })
    }

    fn provider(&self) -> Result<&Arc<dyn DnsProvider>, CoreError> {
        self.provider
            .as_ref()
            .ok_or_else(|| CoreError::external("dns provider", "no DNS provider is configured"))
    }

    /// Local records of a zone, validated.
    async fn local_records(&self, zone_id: DbId) -> Result<Vec<DnsRecord>, CoreError> {
        let rows = self.ctx.store.list_zone_records(zone_id).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let record = row.to_record()?;
            dns::validate_record(&record)?;
            records.push(record);
        }
        Ok(records)
    }

    /// Make the provider's records match the local ones. Local state wins.
    ///
    /// Returns the changes that were applied; a second call with no local
    /// changes in between returns an empty plan.
    pub async fn sync(&self, zone_id: DbId) -> Result<SyncPlan, CoreError> {
        let zone = self.zone(zone_id).await?;
        if !zone.sync_enabled {
            return Err(CoreError::Validation(format!("Sync is disabled for zone {}", zone.zone_name)));
        }

        match self.apply(&zone).await {
            Ok(plan) => {
                self.ctx.store.record_zone_sync(zone.id, None).await?;
                tracing::info!(
                    zone = %zone.zone_name,
                    added = plan.added.len(),
                    updated = plan.updated.len(),
                    removed = plan.removed.len(),
                    "Zone synchronized",
                );
                self.ctx.publish(
                    PlatformEvent::new(DNS_SYNCED)
                        .with_source("dns_zone", zone.id)
                        .with_payload(serde_json::json!({
                            "zone": zone.zone_name,
                            "added": plan.added.len(),
                            "updated": plan.updated.len(),
                            "removed": plan.removed.len(),
                        })),
                );
                Ok(plan)
            }
            Err(e) => {
                tracing::error!(zone = %zone.zone_name, error = %e, "Zone sync failed");
                self.ctx.store.record_zone_sync(zone.id, Some(&e.to_string())).await?;
                Err(e)
            }
        }
    }

    async fn apply(&self, zone: &DnsZone) -> Result<SyncPlan, CoreError> {
        let provider = self.provider()?;
        let local = self.local_records(zone.id).await?;

        let provider_zone_id = match &zone.provider_zone_id {
            Some(id) => id.clone(),
            None => {
                let id = provider.find_zone_id(&zone.zone_name).await?.ok_or_else(|| {
                    CoreError::external(
                        provider.name(),
                        format!("zone {} is not hosted by the provider", zone.zone_name),
                    )
                })?;
                self.ctx.store.set_provider_zone_id(zone.id, &id).await?;
                id
            }
        };

        let remote = provider.list_records(&provider_zone_id).await?;
        let plan = dns::plan_sync(&zone.zone_name, &local, &remote);

        for update in &plan.updated {
            provider.update_record(&provider_zone_id, &update.id, &update.to).await?;
        }
        for record in &plan.added {
            provider.create_record(&provider_zone_id, record).await?;
        }
        for stale in &plan.removed {
            provider.delete_record(&provider_zone_id, &stale.id).await?;
        }
        Ok(plan)
    }

    /// Whether a quorum of public resolvers sees the locally configured
    /// value(s) for `domain`.
    pub async fn check_propagation(&self, domain: &str, record_type: RecordType) -> Result<PropagationReport, CoreError> {
        if self.resolvers.is_empty() {
            return Err(CoreError::Validation("No resolvers are configured".into()));
        }
        let domain = dns::qualify_name(domain, domain);
        let zone = self.zone_for(&domain).await?;

        let expected: Vec<String> = self
            .local_records(zone.id)
            .await?
            .into_iter()
            .filter(|r| r.record_type == record_type && dns::qualify_name(&r.name, &zone.zone_name) == domain)
            .map(|r| r.value)
            .collect();
        if expected.is_empty() {
            return Err(CoreError::Validation(format!(
                "Zone {} has no {} record for {domain}",
                zone.zone_name,
                record_type.as_str()
            )));
        }

        let answers = resolver::query_all(&self.resolvers, &domain, record_type).await;
        let report = dns::evaluate_quorum(record_type, &expected, answers);
        tracing::info!(
            domain = %domain,
            record_type = record_type.as_str(),
            propagated = report.propagated,
            agreeing = report.agreeing,
            responding = report.responding,
            "Propagation checked",
        );
        Ok(report)
    }

    /// The managed zone `domain` belongs to (longest matching suffix).
    async fn zone_for(&self, domain: &str) -> Result<DnsZone, CoreError> {
        let mut candidate = domain;
        loop {
            if let Some(zone) = self.ctx.store.find_zone_by_name(candidate).await? {
                return Ok(zone);
            }
            match candidate.split_once('.') {
                Some((_, parent)) if parent.contains('.') => candidate = parent,
                _ => return Err(CoreError::Validation(format!("No managed zone contains {domain}"))),
            }
        }
    }

    /// Add the apex A, `www` CNAME and MX records, skipping any
    /// `(type, name)` the zone already has. Returns what was added.
    pub async fn add_common_records(&self, zone_id: DbId, ipv4: &str) -> Result<Vec<DnsRecord>, CoreError> {
        let zone = self.zone(zone_id).await?;
        let existing = self.ctx.store.list_zone_records(zone.id).await?;

        let mut added = Vec::new();
        for record in dns::common_records(&zone.zone_name, ipv4) {
            dns::validate_record(&record)?;
            let present = existing.iter().any(|row| {
                row.record_type.eq_ignore_ascii_case(record.record_type.as_str())
                    && dns::qualify_name(&row.name, &zone.zone_name) == record.name
            });
            if present {
                continue;
            }
            self.ctx.store.add_zone_record(zone.id, &record).await?;
            added.push(record);
        }
        tracing::info!(zone = %zone.zone_name, added = added.len(), "Common records added");
        Ok(added)
    }
}
