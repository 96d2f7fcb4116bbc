use hostwright_core::error::CoreError;

/// Errors from external provider calls.
#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider answered with a non-2xx status or `success: false`.
    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    /// Object storage failure.
    #[error("Object storage error: {0}")]
    Storage(String),

    /// Local file I/O while streaming an object.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The provider is not configured in this deployment.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// A provider response could not be interpreted.
    #[error("Unexpected response: {0}")]
    Malformed(String),
}

impl CloudError {
    fn service(&self) -> &'static str {
        match self {
            CloudError::Api { provider, .. } => provider,
            CloudError::Storage(_) | CloudError::Io(_) => "cloud storage",
            CloudError::NotConfigured(service) => service,
            CloudError::Request(_) | CloudError::Malformed(_) => "external provider",
        }
    }
}

impl From<CloudError> for CoreError {
    fn from(err: CloudError) -> Self {
        CoreError::external(err.service(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn converts_to_external_service_error() {
        let err: CoreError = CloudError::Api {
            provider: "cloudflare",
            status: 403,
            message: "Authentication error".into(),
        }
        .into();
        assert_matches!(err, CoreError::ExternalService { service: "cloudflare", ref message }
            if message.contains("403"));
    }
}
