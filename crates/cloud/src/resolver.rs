//! Public resolvers queried over DNS-over-HTTPS (JSON API).

use std::time::Duration;

use async_trait::async_trait;
use hostwright_core::dns::{RecordType, ResolverAnswer};
use serde::Deserialize;

use crate::error::CloudError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// NXDOMAIN rcode.
const RCODE_NXDOMAIN: u32 = 3;

#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Identifies the resolver in reports.
    fn label(&self) -> &str;

    /// Values of `name`/`record_type` as seen by this resolver.
    /// A name that does not exist yields an empty list.
    async fn lookup(&self, name: &str, record_type: RecordType) -> Result<Vec<String>, CloudError>;
}

/// Query every resolver concurrently.
pub async fn query_all(
    resolvers: &[Box<dyn DnsResolver>],
    name: &str,
    record_type: RecordType,
) -> Vec<ResolverAnswer> {
    let lookups = resolvers.iter().map(|resolver| async move {
        let result = resolver
            .lookup(name, record_type)
            .await
            .map_err(|e| e.to_string());
        if let Err(error) = &result {
            tracing::debug!(resolver = resolver.label(), name, error = %error, "Resolver lookup failed");
        }
        ResolverAnswer {
            resolver: resolver.label().to_string(),
            result,
        }
    });
    futures::future::join_all(lookups).await
}

// ---------------------------------------------------------------------------
// DoH JSON
// ---------------------------------------------------------------------------

/// A resolver speaking the `application/dns-json` dialect served by
/// Cloudflare, Google and Quad9.
pub struct DohResolver {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

impl DohResolver {
    pub fn new(url: impl Into<String>) -> Result<Self, CloudError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, url: url.into() })
    }

    /// One resolver per configured endpoint.
    pub fn from_urls(urls: &[String]) -> Result<Vec<Box<dyn DnsResolver>>, CloudError> {
        urls.iter()
            .map(|url| Ok(Box::new(DohResolver::new(url.clone())?) as Box<dyn DnsResolver>))
            .collect()
    }
}

/// Wire type number of a record type.
pub fn type_code(record_type: RecordType) -> u16 {
    match record_type {
        RecordType::A => 1,
        RecordType::Ns => 2,
        RecordType::Cname => 5,
        RecordType::Mx => 15,
        RecordType::Txt => 16,
        RecordType::Aaaa => 28,
        RecordType::Srv => 33,
        RecordType::Caa => 257,
    }
}

/// Extract the answer values for `record_type`, dropping CNAME chain hops
/// and the leading priority of MX/SRV data.
fn answer_values(body: &str, record_type: RecordType) -> Result<Vec<String>, CloudError> {
    let response: DohResponse = serde_json::from_str(body)
        .map_err(|e| CloudError::Malformed(format!("DoH response: {e}")))?;
    match response.status {
        0 => {}
        RCODE_NXDOMAIN => return Ok(Vec::new()),
        rcode => return Err(CloudError::Malformed(format!("resolver answered rcode {rcode}"))),
    }
    let code = type_code(record_type);
    Ok(response
        .answer
        .into_iter()
        .filter(|a| a.record_type == code)
        .map(|a| match record_type {
            RecordType::Mx | RecordType::Srv => a
                .data
                .split_once(' ')
                .map(|(_, rest)| rest.to_string())
                .unwrap_or(a.data),
            _ => a.data,
        })
        .collect())
}

#[async_trait]
impl DnsResolver for DohResolver {
    fn label(&self) -> &str {
        &self.url
    }

    async fn lookup(&self, name: &str, record_type: RecordType) -> Result<Vec<String>, CloudError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("name", name), ("type", record_type.as_str())])
            .header(reqwest::header::ACCEPT, "application/dns-json")
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(CloudError::Api {
                provider: "dns resolver",
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }
        answer_values(&body, record_type)
    }
}
