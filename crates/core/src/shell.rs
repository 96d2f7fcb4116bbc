//! POSIX shell quoting for commands assembled from untrusted values.

/// Quote `value` as a single shell word.
///
/// Wraps in single quotes and escapes embedded single quotes, so the result
/// is safe to splice into an `sh -c` script.
pub fn quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}
