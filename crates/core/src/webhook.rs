//! Git webhook secrets and HMAC-SHA256 signature verification.

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

/// Length of a generated webhook secret (URL-safe characters).
pub const SECRET_LENGTH: usize = 43;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Header naming the delivery's event type.
pub const EVENT_HEADER: &str = "x-github-event";

const SIGNATURE_PREFIX: &str = "sha256=";

const URL_SAFE_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

type HmacSha256 = Hmac<Sha256>;

/// Generate a new random URL-safe secret (~256 bits of entropy).
pub fn generate_secret() -> String {
    let mut rng = rand::rng();
    (0..SECRET_LENGTH)
        .map(|_| URL_SAFE_ALPHABET[rng.random_range(0..URL_SAFE_ALPHABET.len())] as char)
        .collect()
}

/// Compute the `sha256=<hex>` signature for a payload.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    format!(
        "{SIGNATURE_PREFIX}{}",
        crate::hex::encode(mac.finalize().into_bytes())
    )
}

/// Verify a signature header value against `payload` in constant time.
pub fn verify(secret: &str, payload: &[u8], header_value: &str) -> bool {
    let Some(hex_sig) = header_value.trim().strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Some(expected) = crate::hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Branch name from a push payload's `ref` (`refs/heads/main` -> `main`).
pub fn pushed_branch(payload: &serde_json::Value) -> Option<&str> {
    payload.get("ref")?.as_str()?.strip_prefix("refs/heads/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_url_safe_and_unique() {
        let a = generate_secret();
        let b = generate_secret();
        assert_eq!(a.len(), SECRET_LENGTH);
        assert_ne!(a, b);
        assert!(a.bytes().all(|c| URL_SAFE_ALPHABET.contains(&c)));
    }

    #[test]
    fn known_vector() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        assert_eq!(
            sign("key", b"The quick brown fox jumps over the lazy dog"),
            "sha256=f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn verify_accepts_matching_signature() {
        let body = br#"{"ref":"refs/heads/main"}"#;
        let header = sign("s3cret", body);
        assert!(verify("s3cret", body, &header));
    }

    #[test]
    fn verify_rejects_wrong_secret_body_or_format() {
        let body = b"payload";
        let header = sign("s3cret", body);
        assert!(!verify("other", body, &header));
        assert!(!verify("s3cret", b"payload2", &header));
        assert!(!verify("s3cret", body, header.trim_start_matches("sha256=")));
        assert!(!verify("s3cret", body, "sha256=nothex"));
        assert!(!verify("s3cret", body, "sha1=abcd"));
    }

    #[test]
    fn branch_is_extracted_from_ref() {
        let payload = serde_json::json!({"ref": "refs/heads/release/2.0"});
        assert_eq!(pushed_branch(&payload), Some("release/2.0"));
        assert_eq!(pushed_branch(&serde_json::json!({"ref": "refs/tags/v1"})), None);
        assert_eq!(pushed_branch(&serde_json::json!({})), None);
    }
}
