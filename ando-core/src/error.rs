use thiserror::Error;

/// Unified error type for Ando CE.
#[derive(Error, Debug)]
pub enum AndoError {
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Upstream not found: {0}")]
    UpstreamNotFound(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Consumer not found: {0}")]
    ConsumerNotFound(String),

    #[error("Plugin error: {0}")]
    PluginError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Auth failed: {0}")]
    AuthFailed(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("IP denied: {0}")]
    IpDenied(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Request queue full: {0}")]
    QueueFull(String),

    #[error("Request timed out waiting for admission: {0}")]
    QueueTimeout(String),

    #[error("Tunnel denied: {0}")]
    TunnelDenied(String),

    #[error("Token budget exceeded: {0}")]
    TokenBudgetExceeded(String),

    #[error("Blocked by guard: {0}")]
    GuardBlocked(String),

    #[error("Field encryption error: {0}")]
    EncryptionError(String),

    #[error("Aggregate backend error: {0}")]
    AggregateError(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Read error: {0}")]
    ReadError(String),

    #[error("Prompt blocked: {0}")]
    PromptBlocked(String),

    #[error("Prompt too long: {0}")]
    PromptTooLong(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider parse error: {0}")]
    ProviderParseError(String),

    #[error("Provider auth error: {0}")]
    ProviderAuthError(String),

    #[error("Gateway timeout: {0}")]
    GatewayTimeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Internal: {0}")]
    Internal(String),
}

impl AndoError {
    /// Map to HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            AndoError::RouteNotFound(_) => 404,
            AndoError::UpstreamNotFound(_) => 502,
            AndoError::ServiceNotFound(_) => 503,
            AndoError::ConsumerNotFound(_) => 401,
            AndoError::AuthFailed(_) => 401,
            AndoError::RateLimited => 429,
            AndoError::IpDenied(_) => 403,
            AndoError::PluginError(_) => 500,
            AndoError::QueueFull(_) => 429,
            AndoError::QueueTimeout(_) => 429,
            AndoError::TunnelDenied(_) => 403,
            AndoError::TokenBudgetExceeded(_) => 429,
            AndoError::GuardBlocked(_) => 400,
            AndoError::EncryptionError(_) => 500,
            AndoError::AggregateError(_) => 502,
            AndoError::UnsupportedMediaType(_) => 415,
            AndoError::ParseError(_) => 400,
            AndoError::ReadError(_) => 400,
            AndoError::PromptBlocked(_) => 400,
            AndoError::PromptTooLong(_) => 400,
            AndoError::ProviderError(_) => 502,
            AndoError::ProviderParseError(_) => 502,
            AndoError::ProviderAuthError(_) => 502,
            AndoError::GatewayTimeout(_) => 504,
            _ => 500,
        }
    }

    /// Stable machine-readable tag for this error family, used in the
    /// nested error envelope and in log/metric labels.
    pub fn taxonomy_tag(&self) -> &'static str {
        match self {
            AndoError::RouteNotFound(_) => "route_not_found",
            AndoError::UpstreamNotFound(_) => "upstream_not_found",
            AndoError::ServiceNotFound(_) => "service_not_found",
            AndoError::ConsumerNotFound(_) => "consumer_not_found",
            AndoError::PluginError(_) => "plugin_error",
            AndoError::ConfigError(_) => "config_error",
            AndoError::AuthFailed(_) => "auth_failed",
            AndoError::RateLimited => "rate_limited",
            AndoError::IpDenied(_) => "ip_denied",
            AndoError::StoreError(_) => "store_error",
            AndoError::QueueFull(_) => "queue_full",
            AndoError::QueueTimeout(_) => "queue_timeout",
            AndoError::TunnelDenied(_) => "tunnel_denied",
            AndoError::TokenBudgetExceeded(_) => "token_budget_exceeded",
            AndoError::GuardBlocked(_) => "guard_blocked",
            AndoError::EncryptionError(_) => "encryption_error",
            AndoError::AggregateError(_) => "aggregate_error",
            AndoError::UnsupportedMediaType(_) => "unsupported_media_type",
            AndoError::ParseError(_) => "parse_error",
            AndoError::ReadError(_) => "read_error",
            AndoError::PromptBlocked(_) => "prompt_blocked",
            AndoError::PromptTooLong(_) => "prompt_too_long",
            AndoError::ProviderError(_) => "provider_error",
            AndoError::ProviderParseError(_) => "provider_parse_error",
            AndoError::ProviderAuthError(_) => "provider_auth_error",
            AndoError::GatewayTimeout(_) => "gateway_timeout",
            AndoError::Io(_) => "io_error",
            AndoError::Serde(_) => "serialization_error",
            AndoError::Internal(_) => "internal_error",
        }
    }

    /// Flat JSON error body (`{"error":"...","status":N}`) — used for the
    /// pre-built, zero-allocation static responses on the hottest error paths.
    pub fn to_json_body(&self) -> Vec<u8> {
        let status = self.status_code();
        let msg = self.to_string();
        format!(r#"{{"error":"{}","status":{}}}"#, msg, status).into_bytes()
    }

    /// Nested error envelope: `{"error":{"type","message","provider"}}`.
    /// `provider` is populated by callers proxying to a named upstream (the
    /// AI provider a route targets); it is `null` for gateway-local errors.
    pub fn to_json_envelope(&self, provider: Option<&str>) -> Vec<u8> {
        serde_json::json!({
            "error": {
                "type": self.taxonomy_tag(),
                "message": self.to_string(),
                "provider": provider,
            }
        })
        .to_string()
        .into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AndoError::RouteNotFound("x".into()).status_code(), 404);
        assert_eq!(AndoError::UpstreamNotFound("x".into()).status_code(), 502);
        assert_eq!(AndoError::ServiceNotFound("x".into()).status_code(), 503);
        assert_eq!(AndoError::ConsumerNotFound("x".into()).status_code(), 401);
        assert_eq!(AndoError::AuthFailed("x".into()).status_code(), 401);
        assert_eq!(AndoError::RateLimited.status_code(), 429);
        assert_eq!(AndoError::IpDenied("x".into()).status_code(), 403);
        assert_eq!(AndoError::PluginError("x".into()).status_code(), 500);
        assert_eq!(AndoError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn test_json_body_is_valid_json() {
        let err = AndoError::AuthFailed("bad key".into());
        let body = err.to_json_body();
        let parsed: serde_json::Value =
            serde_json::from_slice(&body).expect("to_json_body must produce valid JSON");
        assert_eq!(parsed["status"], 401);
        assert!(parsed["error"].as_str().is_some());
    }

    #[test]
    fn test_json_body_contains_status_and_message() {
        let err = AndoError::RouteNotFound("r1".into());
        let text = String::from_utf8(err.to_json_body()).unwrap();
        assert!(text.contains("404"), "body must contain status code");
        assert!(text.contains("r1"), "body must contain the route id");
    }

    #[test]
    fn test_rate_limited_body() {
        let err = AndoError::RateLimited;
        let parsed: serde_json::Value =
            serde_json::from_slice(&err.to_json_body()).unwrap();
        assert_eq!(parsed["status"], 429);
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(AndoError::AuthFailed("invalid key".into()).to_string(), "Auth failed: invalid key");
        assert_eq!(AndoError::RouteNotFound("route1".into()).to_string(), "Route not found: route1");
        assert_eq!(AndoError::RateLimited.to_string(), "Rate limited");
        assert_eq!(AndoError::IpDenied("1.2.3.4".into()).to_string(), "IP denied: 1.2.3.4");
        assert_eq!(AndoError::UpstreamNotFound("us1".into()).to_string(), "Upstream not found: us1");
    }

    #[test]
    fn test_nested_envelope_shape() {
        let err = AndoError::TokenBudgetExceeded("route r1 over minute budget".into());
        let parsed: serde_json::Value =
            serde_json::from_slice(&err.to_json_envelope(Some("openai"))).unwrap();
        assert_eq!(parsed["error"]["type"], "token_budget_exceeded");
        assert_eq!(parsed["error"]["provider"], "openai");
        assert!(parsed["error"]["message"].as_str().unwrap().contains("r1"));
    }

    #[test]
    fn test_nested_envelope_no_provider() {
        let err = AndoError::QueueFull("route r2".into());
        let parsed: serde_json::Value =
            serde_json::from_slice(&err.to_json_envelope(None)).unwrap();
        assert!(parsed["error"]["provider"].is_null());
        assert_eq!(parsed["error"]["type"], "queue_full");
    }

    #[test]
    fn test_ip_denied_is_403() {
        let err = AndoError::IpDenied("192.168.1.1".into());
        assert_eq!(err.status_code(), 403);
        let body = String::from_utf8(err.to_json_body()).unwrap();
        assert!(body.contains("403"));
        assert!(body.contains("192.168.1.1"));
    }
}
