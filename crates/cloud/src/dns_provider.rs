//! Authoritative DNS provider API.

use std::time::Duration;

use async_trait::async_trait;
use hostwright_core::dns::{DnsRecord, ProviderRecord, RecordType, AUTO_TTL};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::CloudError;

/// Record CRUD against the provider hosting a zone.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Provider id of `zone_name`, if the provider hosts it.
    async fn find_zone_id(&self, zone_name: &str) -> Result<Option<String>, CloudError>;

    async fn list_records(&self, zone_id: &str) -> Result<Vec<ProviderRecord>, CloudError>;

    async fn create_record(&self, zone_id: &str, record: &DnsRecord) -> Result<ProviderRecord, CloudError>;

    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &DnsRecord,
    ) -> Result<(), CloudError>;

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), CloudError>;
}

// ---------------------------------------------------------------------------
// Cloudflare
// ---------------------------------------------------------------------------

const CLOUDFLARE_API: &str = "https://api.cloudflare.com/client/v4";
const PROVIDER: &str = "cloudflare";
const PAGE_SIZE: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cloudflare v4 API client authenticated with an API token.
pub struct CloudflareProvider {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

/// The `{ success, errors, result, result_info }` envelope of every response.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct ZoneEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RecordEntry {
    id: String,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    #[serde(default)]
    content: String,
    ttl: i32,
    priority: Option<i32>,
    data: Option<Value>,
}

impl CloudflareProvider {
    pub fn new(token: String) -> Result<Self, CloudError> {
        Self::with_base_url(token, CLOUDFLARE_API.to_string())
    }

    /// Point the client at a different API root.
    pub fn with_base_url(token: String, base_url: String) -> Result<Self, CloudError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(Option<T>, Option<ResultInfo>), CloudError> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        let envelope = parse_envelope::<T>(status, &body)?;
        Ok((envelope.result, envelope.result_info))
    }
}

fn parse_envelope<T: serde::de::DeserializeOwned>(status: u16, body: &str) -> Result<Envelope<T>, CloudError> {
    let envelope: Envelope<T> = serde_json::from_str(body).map_err(|e| CloudError::Api {
        provider: PROVIDER,
        status,
        message: format!("unreadable response ({e}): {}", truncate(body, 200)),
    })?;
    if !envelope.success || !(200..300).contains(&status) {
        let message = if envelope.errors.is_empty() {
            "request failed".to_string()
        } else {
            envelope
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ")
        };
        return Err(CloudError::Api { provider: PROVIDER, status, message });
    }
    Ok(envelope)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// JSON body for a create or update call.
///
/// SRV values are `weight port target` and CAA values `flags tag value`;
/// Cloudflare takes both as structured `data`.
fn record_body(record: &DnsRecord) -> Result<Value, CloudError> {
    let mut body = json!({
        "type": record.record_type.as_str(),
        "name": record.name,
        "ttl": record.ttl,
    });
    match record.record_type {
        RecordType::Srv => {
            let parts: Vec<&str> = record.value.split_whitespace().collect();
            let [weight, port, target] = parts.as_slice() else {
                return Err(CloudError::Malformed(format!("SRV value '{}'", record.value)));
            };
            body["data"] = json!({
                "priority": record.priority.unwrap_or(0),
                "weight": weight.parse::<u16>().map_err(|_| CloudError::Malformed(format!("SRV weight '{weight}'")))?,
                "port": port.parse::<u16>().map_err(|_| CloudError::Malformed(format!("SRV port '{port}'")))?,
                "target": target.trim_end_matches('.'),
            });
        }
        RecordType::Caa => {
            let mut parts = record.value.splitn(3, char::is_whitespace);
            let (Some(flags), Some(tag), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
                return Err(CloudError::Malformed(format!("CAA value '{}'", record.value)));
            };
            body["data"] = json!({
                "flags": flags.parse::<u8>().map_err(|_| CloudError::Malformed(format!("CAA flags '{flags}'")))?,
                "tag": tag,
                "value": value.trim().trim_matches('"'),
            });
        }
        _ => {
            body["content"] = json!(record.value);
            if let Some(priority) = record.priority {
                body["priority"] = json!(priority);
            }
        }
    }
    Ok(body)
}

fn to_provider_record(entry: RecordEntry) -> Option<ProviderRecord> {
    let record_type = RecordType::parse(&entry.record_type).ok()?;
    let data = entry.data.unwrap_or(Value::Null);
    let (value, priority) = match record_type {
        RecordType::Srv => (
            format!(
                "{} {} {}",
                data["weight"].as_u64().unwrap_or(0),
                data["port"].as_u64().unwrap_or(0),
                data["target"].as_str().unwrap_or_default()
            ),
            data["priority"].as_i64().map(|p| p as i32).or(entry.priority),
        ),
        RecordType::Caa if data.is_object() => (
            format!(
                "{} {} \"{}\"",
                data["flags"].as_u64().unwrap_or(0),
                data["tag"].as_str().unwrap_or_default(),
                data["value"].as_str().unwrap_or_default()
            ),
            None,
        ),
        _ => (entry.content, entry.priority),
    };
    Some(ProviderRecord {
        id: entry.id,
        record: DnsRecord {
            record_type,
            name: entry.name,
            value,
            ttl: if entry.ttl <= 0 { AUTO_TTL } else { entry.ttl },
            priority: if record_type.requires_priority() { priority } else { None },
        },
    })
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn find_zone_id(&self, zone_name: &str) -> Result<Option<String>, CloudError> {
        let request = self
            .client
            .get(format!("{}/zones", self.base_url))
            .query(&[("name", zone_name)]);
        let (zones, _) = self.send::<Vec<ZoneEntry>>(request).await?;
        Ok(zones.unwrap_or_default().into_iter().next().map(|z| z.id))
    }

    async fn list_records(&self, zone_id: &str) -> Result<Vec<ProviderRecord>, CloudError> {
        let mut records = Vec::new();
        let mut page = 1u32;
        loop {
            let request = self
                .client
                .get(format!("{}/zones/{zone_id}/dns_records", self.base_url))
                .query(&[("page", page), ("per_page", PAGE_SIZE)]);
            let (entries, info) = self.send::<Vec<RecordEntry>>(request).await?;
            let entries = entries.unwrap_or_default();
            let fetched = entries.len();
            records.extend(entries.into_iter().filter_map(to_provider_record));

            let total_pages = info.map(|i| i.total_pages).unwrap_or(1);
            if page >= total_pages || fetched == 0 {
                break;
            }
            page += 1;
        }
        Ok(records)
    }

    async fn create_record(&self, zone_id: &str, record: &DnsRecord) -> Result<ProviderRecord, CloudError> {
        let request = self
            .client
            .post(format!("{}/zones/{zone_id}/dns_records", self.base_url))
            .json(&record_body(record)?);
        let (entry, _) = self.send::<RecordEntry>(request).await?;
        let entry = entry.ok_or_else(|| CloudError::Malformed("create returned no record".into()))?;
        tracing::info!(zone_id, record_id = %entry.id, name = %record.name, "DNS record created");
        Ok(ProviderRecord { id: entry.id, record: record.clone() })
    }

    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &DnsRecord,
    ) -> Result<(), CloudError> {
        let request = self
            .client
            .put(format!("{}/zones/{zone_id}/dns_records/{record_id}", self.base_url))
            .json(&record_body(record)?);
        self.send::<Value>(request).await?;
        tracing::info!(zone_id, record_id, name = %record.name, "DNS record updated");
        Ok(())
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), CloudError> {
        let request = self
            .client
            .delete(format!("{}/zones/{zone_id}/dns_records/{record_id}", self.base_url));
        self.send::<Value>(request).await?;
        tracing::info!(zone_id, record_id, "DNS record deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn record(t: RecordType, value: &str, priority: Option<i32>) -> DnsRecord {
        DnsRecord {
            record_type: t,
            name: "example.com".into(),
            value: value.into(),
            ttl: 3600,
            priority,
        }
    }

    #[test]
    fn api_errors_carry_provider_messages() {
        let body = r#"{"success":false,"errors":[{"code":9109,"message":"Invalid access token"}],"result":null}"#;
        let err = parse_envelope::<Value>(403, body).unwrap_err();
        assert_matches!(err, CloudError::Api { status: 403, ref message, .. }
            if message == "Invalid access token (9109)");

        assert_matches!(
            parse_envelope::<Value>(502, "<html>bad gateway</html>"),
            Err(CloudError::Api { status: 502, .. })
        );
    }

    #[test]
    fn mx_body_carries_priority() {
        let body = record_body(&record(RecordType::Mx, "mail.example.com", Some(10))).unwrap();
        assert_eq!(body["type"], "MX");
        assert_eq!(body["content"], "mail.example.com");
        assert_eq!(body["priority"], 10);
    }

    #[test]
    fn srv_uses_structured_data() {
        let body = record_body(&record(RecordType::Srv, "5 5060 sip.example.com.", Some(10))).unwrap();
        assert_eq!(body["data"]["port"], 5060);
        assert_eq!(body["data"]["target"], "sip.example.com");
        assert!(record_body(&record(RecordType::Srv, "5060", Some(1))).is_err());
    }

    #[test]
    fn listed_records_map_back_to_local_shape() {
        let body = r#"{"success":true,"errors":[],"result":[
            {"id":"r1","type":"A","name":"example.com","content":"1.2.3.4","ttl":1},
            {"id":"r2","type":"MX","name":"example.com","content":"mail.example.com","ttl":3600,"priority":10},
            {"id":"r3","type":"PTR","name":"x","content":"y","ttl":60}
        ],"result_info":{"total_pages":1}}"#;
        let envelope = parse_envelope::<Vec<RecordEntry>>(200, body).unwrap();
        let records: Vec<ProviderRecord> = envelope
            .result
            .unwrap()
            .into_iter()
            .filter_map(to_provider_record)
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record.ttl, AUTO_TTL);
        assert_eq!(records[1].record.priority, Some(10));
    }
}
