//! Lowercase hex encoding (no extra dep).

/// Encode bytes as a lowercase hex string.
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
}

/// Decode a hex string. Returns `None` on odd length or a non-hex digit.
pub fn decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode() {
        let bytes = [0u8, 1, 0xab, 0xff];
        assert_eq!(encode(bytes), "0001abff");
        assert_eq!(decode("0001ABff").unwrap(), bytes);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(decode("abc").is_none());
        assert!(decode("zz").is_none());
        assert!(decode("é1").is_none());
    }
}
