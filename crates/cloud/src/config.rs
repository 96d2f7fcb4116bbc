/// Default public DoH resolvers used for propagation checks.
pub const DEFAULT_RESOLVERS: &[&str] = &[
    "https://cloudflare-dns.com/dns-query",
    "https://dns.google/resolve",
    "https://dns.quad9.net:5053/dns-query",
];

/// External provider configuration.
#[derive(Debug, Clone, Default)]
pub struct CloudConfig {
    pub cloudflare_api_token: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_prefix: String,
    pub s3_endpoint: Option<String>,
    pub dns_resolvers: Vec<String>,
}

impl CloudConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable               | Default                      |
    /// |------------------------|------------------------------|
    /// | `CLOUDFLARE_API_TOKEN` | unset (no DNS provider)      |
    /// | `S3_BUCKET`            | unset (no cloud storage)     |
    /// | `S3_PREFIX`            | `backups`                    |
    /// | `S3_ENDPOINT`          | AWS default endpoint         |
    /// | `DNS_RESOLVERS`        | Cloudflare, Google, Quad9    |
    ///
    /// `DNS_RESOLVERS` is a comma-separated list of DoH JSON endpoints.
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let dns_resolvers = non_empty("DNS_RESOLVERS")
            .map(|raw| parse_list(&raw))
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| DEFAULT_RESOLVERS.iter().map(|s| s.to_string()).collect());

        Self {
            cloudflare_api_token: non_empty("CLOUDFLARE_API_TOKEN"),
            s3_bucket: non_empty("S3_BUCKET"),
            s3_prefix: non_empty("S3_PREFIX").unwrap_or_else(|| "backups".to_string()),
            s3_endpoint: non_empty("S3_ENDPOINT"),
            dns_resolvers,
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_list_is_trimmed() {
        assert_eq!(
            parse_list(" https://a/dns-query, ,https://b/resolve "),
            vec!["https://a/dns-query", "https://b/resolve"]
        );
    }
}
