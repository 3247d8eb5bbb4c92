//! Per-request correlation

use uuid::Uuid;

/// Version tag echoed in every webhook response and log span
pub const WEBHOOK_VERSION: &str = concat!("webhook-v", env!("CARGO_PKG_VERSION"));

/// Correlation data for one webhook invocation
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub version: &'static str,
}

impl RequestContext {
    /// Fresh context with a short random id (8 hex chars)
    pub fn generate() -> Self {
        let mut request_id = Uuid::new_v4().simple().to_string();
        request_id.truncate(8);
        Self {
            request_id,
            version: WEBHOOK_VERSION,
        }
    }

    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "webhook",
            request_id = %self.request_id,
            version = self.version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_short_and_distinct() {
        let a = RequestContext::generate();
        let b = RequestContext::generate();
        assert_eq!(a.request_id.len(), 8);
        assert!(a.request_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.request_id, b.request_id);
        assert!(a.version.starts_with("webhook-v"));
    }
}
