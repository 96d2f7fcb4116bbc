//! Certificate commands and expiry arithmetic.
//!
//! Issuance uses certbot's webroot mode so the site keeps serving while the
//! ACME challenge is answered from its document root.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::CoreError;
use crate::nginx::TlsPaths;
use crate::shell::quote;
use crate::types::Timestamp;

/// Renew when fewer days than this remain (default).
pub const DEFAULT_RENEWAL_THRESHOLD_DAYS: i64 = 30;

/// Alert when fewer days than this remain (default).
pub const DEFAULT_ALERT_DAYS: i64 = 7;

/// `certbot certonly` for `domain` and its `www.` alias.
pub fn issue_command(domain: &str, document_root: &str, email: Option<&str>) -> String {
    let account = match email {
        Some(email) => format!("-m {}", quote(email)),
        None => "--register-unsafely-without-email".to_string(),
    };
    format!(
        "certbot certonly --webroot -w {} -d {domain} -d www.{domain} --non-interactive --agree-tos {account} --keep-until-expiring",
        quote(document_root),
    )
}

/// Force renewal of an existing certificate lineage.
pub fn renew_command(domain: &str) -> String {
    format!("certbot renew --cert-name {domain} --force-renewal --non-interactive")
}

/// Print the certificate's `notAfter=` line, or nothing when absent.
pub fn enddate_command(domain: &str) -> String {
    let cert = TlsPaths::letsencrypt(domain).certificate;
    format!(
        "if [ -f {0} ]; then openssl x509 -enddate -noout -in {0}; fi",
        quote(&cert)
    )
}

/// Parse `openssl x509 -enddate` output. Empty output means no certificate.
pub fn parse_enddate(output: &str) -> Result<Option<Timestamp>, CoreError> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty());
    let Some(line) = line else {
        return Ok(None);
    };
    let raw = line.strip_prefix("notAfter=").unwrap_or(line);
    // "Mar  5 12:00:00 2025 GMT": collapse the padded day.
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&normalized, "%b %d %H:%M:%S %Y GMT")
        .map(|naive| Some(naive.and_utc()))
        .map_err(|e| {
            CoreError::external("certificate authority", format!("unparseable expiry '{raw}': {e}"))
        })
}

/// Whole days until `expires_at` (negative once expired).
pub fn days_remaining(expires_at: Timestamp, now: Timestamp) -> i64 {
    (expires_at - now).num_days()
}

/// Whether a certificate is inside the renewal window.
pub fn needs_renewal(expires_at: Timestamp, now: Timestamp, threshold_days: i64) -> bool {
    days_remaining(expires_at, now) < threshold_days
}

/// Certificate metadata reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateInfo {
    pub domain: String,
    pub expires_at: Timestamp,
    pub days_remaining: i64,
}

impl CertificateInfo {
    pub fn new(domain: &str, expires_at: Timestamp, now: Timestamp) -> Self {
        Self {
            domain: domain.to_string(),
            expires_at,
            days_remaining: days_remaining(expires_at, now),
        }
    }
}
