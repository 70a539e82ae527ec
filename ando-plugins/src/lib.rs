pub mod auth;
pub mod traffic;

use ando_plugin::registry::PluginRegistry;
use std::sync::Arc;

/// Register every built-in plugin: the HTTP-surface plugins implemented
/// in this crate (auth, traffic shaping) plus the core policy primitives
/// that `ando-plugin` implements directly against the shared phase
/// pipeline (transform, crypto, guard/decorator, token budget, response
/// rules).
pub fn register_all(registry: &mut PluginRegistry) {
    registry.register(Arc::new(auth::key_auth::KeyAuthPlugin));
    registry.register(Arc::new(auth::basic_auth::BasicAuthPlugin));
    registry.register(Arc::new(auth::jwt_auth::JwtAuthPlugin));

    registry.register(Arc::new(traffic::cors::CorsPlugin));
    registry.register(Arc::new(traffic::ip_restriction::IpRestrictionPlugin));
    registry.register(Arc::new(traffic::limit_count::LimitCountPlugin));
    registry.register(Arc::new(traffic::rate_limiting::RateLimitingPlugin));
    registry.register(Arc::new(traffic::security_headers::SecurityHeadersPlugin));

    registry.register(Arc::new(ando_plugin::transform::JsonTransformPlugin));
    registry.register(Arc::new(ando_plugin::crypto::FieldEncryptionPlugin));
    registry.register(Arc::new(ando_plugin::guard::PromptGuardPlugin));
    registry.register(Arc::new(ando_plugin::decorator::PromptDecoratorPlugin));
    registry.register(Arc::new(ando_plugin::token_limiter::TokenLimiterPlugin));
    registry.register(Arc::new(ando_plugin::response_rules::EdgeCacheRulesPlugin));
    registry.register(Arc::new(ando_plugin::response_rules::StatusMapPlugin));
    registry.register(Arc::new(ando_plugin::response_rules::ErrorReformatPlugin));
}
