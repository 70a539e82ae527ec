use crate::plugin::{Phase, Plugin, PluginContext, PluginInstance, PluginResult};
use crate::transform;
use crate::tunnel::CompiledGlob;
use serde::Deserialize;
use serde_json::Value;
use std::ops::RangeInclusive;

/// Shared matcher for the three response-shaping modules below: a rule
/// applies only when every populated field matches the current
/// response.
pub struct ResponseMatcher {
    pub status: Option<RangeInclusive<u16>>,
    pub content_type: Option<String>,
    pub path: Option<CompiledGlob>,
}

impl ResponseMatcher {
    pub fn matches(&self, status: u16, content_type: Option<&str>, path: &str) -> bool {
        if let Some(range) = &self.status {
            if !range.contains(&status) {
                return false;
            }
        }
        if let Some(ct) = &self.content_type {
            match content_type {
                Some(actual) if actual.starts_with(ct.as_str()) => {}
                _ => return false,
            }
        }
        if let Some(glob) = &self.path {
            if !glob.matches(path) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Deserialize)]
struct MatcherConfig {
    #[serde(default)]
    status_min: Option<u16>,
    #[serde(default)]
    status_max: Option<u16>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    path_glob: Option<String>,
}

impl MatcherConfig {
    fn compile(&self) -> anyhow::Result<ResponseMatcher> {
        let status = match (self.status_min, self.status_max) {
            (Some(min), Some(max)) => Some(min..=max),
            (Some(min), None) => Some(min..=599),
            (None, Some(max)) => Some(100..=max),
            (None, None) => None,
        };
        let path = self.path_glob.as_deref().map(CompiledGlob::compile).transpose()?;
        Ok(ResponseMatcher { status, content_type: self.content_type.clone(), path })
    }
}

// ---------------------------------------------------------------- edge-cache-rules

#[derive(Debug, Deserialize)]
struct EdgeCacheConfig {
    #[serde(flatten)]
    matcher: MatcherConfig,
    cache_control: String,
    #[serde(default)]
    vary: Option<String>,
}

pub struct EdgeCacheRulesPlugin;

impl Plugin for EdgeCacheRulesPlugin {
    fn name(&self) -> &str {
        "edge-cache-rules"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn phases(&self) -> &[Phase] {
        &[Phase::HeaderFilter]
    }

    fn configure(&self, config: &Value) -> anyhow::Result<Box<dyn PluginInstance>> {
        let cfg: EdgeCacheConfig =
            serde_json::from_value(config.clone()).map_err(|e| anyhow::anyhow!("edge-cache-rules config error: {e}"))?;
        let matcher = cfg.matcher.compile()?;
        Ok(Box::new(EdgeCacheRulesInstance { matcher, cache_control: cfg.cache_control, vary: cfg.vary }))
    }
}

struct EdgeCacheRulesInstance {
    matcher: ResponseMatcher,
    cache_control: String,
    vary: Option<String>,
}

impl PluginInstance for EdgeCacheRulesInstance {
    fn name(&self) -> &str {
        "edge-cache-rules"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn header_filter(&self, ctx: &mut PluginContext) -> PluginResult {
        let status = ctx.response_status.unwrap_or(200);
        let ct = ctx.response_headers.get("content-type").cloned();
        if self.matcher.matches(status, ct.as_deref(), &ctx.path) {
            ctx.set_response_header("cache-control".to_string(), self.cache_control.clone());
            if let Some(vary) = &self.vary {
                ctx.set_response_header("vary".to_string(), vary.clone());
            }
        }
        PluginResult::Continue
    }
}

// ---------------------------------------------------------------- status-map

#[derive(Debug, Deserialize)]
struct StatusMapConfig {
    #[serde(flatten)]
    matcher: MatcherConfig,
    map_to: u16,
}

pub struct StatusMapPlugin;

impl Plugin for StatusMapPlugin {
    fn name(&self) -> &str {
        "status-map"
    }

    fn priority(&self) -> i32 {
        110
    }

    fn phases(&self) -> &[Phase] {
        &[Phase::HeaderFilter]
    }

    fn configure(&self, config: &Value) -> anyhow::Result<Box<dyn PluginInstance>> {
        let cfg: StatusMapConfig =
            serde_json::from_value(config.clone()).map_err(|e| anyhow::anyhow!("status-map config error: {e}"))?;
        let matcher = cfg.matcher.compile()?;
        Ok(Box::new(StatusMapInstance { matcher, map_to: cfg.map_to }))
    }
}

struct StatusMapInstance {
    matcher: ResponseMatcher,
    map_to: u16,
}

impl PluginInstance for StatusMapInstance {
    fn name(&self) -> &str {
        "status-map"
    }

    fn priority(&self) -> i32 {
        110
    }

    fn header_filter(&self, ctx: &mut PluginContext) -> PluginResult {
        let status = ctx.response_status.unwrap_or(200);
        let ct = ctx.response_headers.get("content-type").cloned();
        if self.matcher.matches(status, ct.as_deref(), &ctx.path) {
            ctx.response_status = Some(self.map_to);
        }
        PluginResult::Continue
    }
}

// ---------------------------------------------------------------- error-reformat

#[derive(Debug, Deserialize)]
struct ErrorReformatConfig {
    #[serde(flatten)]
    matcher: MatcherConfig,
    /// Transform rules applied to the upstream's non-gateway-shaped
    /// error body to reshape it into the standard envelope, reusing
    /// the JSON field transformer primitive rather than a bespoke
    /// reshaper.
    #[serde(default)]
    message_path: Option<String>,
}

pub struct ErrorReformatPlugin;

impl Plugin for ErrorReformatPlugin {
    fn name(&self) -> &str {
        "error-reformat"
    }

    fn priority(&self) -> i32 {
        90
    }

    fn phases(&self) -> &[Phase] {
        &[Phase::BodyFilter]
    }

    fn configure(&self, config: &Value) -> anyhow::Result<Box<dyn PluginInstance>> {
        let cfg: ErrorReformatConfig =
            serde_json::from_value(config.clone()).map_err(|e| anyhow::anyhow!("error-reformat config error: {e}"))?;
        let matcher = cfg.matcher.compile()?;
        let message_path = cfg.message_path.map(|p| transform::parse_path(&p));
        Ok(Box::new(ErrorReformatInstance { matcher, message_path }))
    }
}

struct ErrorReformatInstance {
    matcher: ResponseMatcher,
    message_path: Option<Vec<transform::PathSeg>>,
}

impl PluginInstance for ErrorReformatInstance {
    fn name(&self) -> &str {
        "error-reformat"
    }

    fn priority(&self) -> i32 {
        90
    }

    fn body_filter(&self, ctx: &mut PluginContext) -> PluginResult {
        let status = ctx.response_status.unwrap_or(200);
        let ct = ctx.response_headers.get("content-type").cloned();
        if !self.matcher.matches(status, ct.as_deref(), &ctx.path) {
            return PluginResult::Continue;
        }
        let Some(body) = ctx.response_body.take() else {
            return PluginResult::Continue;
        };
        let Ok(parsed) = serde_json::from_slice::<Value>(&body) else {
            ctx.response_body = Some(body);
            return PluginResult::Continue;
        };

        let message = self
            .message_path
            .as_ref()
            .and_then(|path| extract_message(&parsed, path))
            .unwrap_or_else(|| "upstream error".to_string());

        let envelope = serde_json::json!({
            "error": { "type": "provider_error", "message": message, "provider": ctx.upstream_addr }
        });
        ctx.response_body = serde_json::to_vec(&envelope).ok();
        PluginResult::Continue
    }
}

fn extract_message(value: &Value, path: &[transform::PathSeg]) -> Option<String> {
    let mut current = value;
    for seg in path {
        current = match (seg, current) {
            (transform::PathSeg::Key(k), Value::Object(map)) => map.get(k)?,
            (transform::PathSeg::Index(i), Value::Array(arr)) => arr.get(*i)?,
            _ => return None,
        };
    }
    current.as_str().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn make_ctx(status: u16, content_type: &str, path: &str) -> PluginContext {
        let mut ctx = PluginContext::new("r1".into(), "1.1.1.1".into(), "GET".into(), path.into(), HashMap::new());
        ctx.response_status = Some(status);
        ctx.response_headers.insert("content-type".to_string(), content_type.to_string());
        ctx
    }

    #[test]
    fn edge_cache_sets_headers_on_match() {
        let inst = EdgeCacheRulesPlugin
            .configure(&serde_json::json!({"status_min": 200, "status_max": 299, "cache_control": "max-age=60", "vary": "Accept"}))
            .unwrap();
        let mut ctx = make_ctx(200, "application/json", "/x");
        inst.header_filter(&mut ctx);
        assert_eq!(ctx.response_headers.get("cache-control"), Some(&"max-age=60".to_string()));
        assert_eq!(ctx.response_headers.get("vary"), Some(&"Accept".to_string()));
    }

    #[test]
    fn edge_cache_skips_on_status_mismatch() {
        let inst = EdgeCacheRulesPlugin
            .configure(&serde_json::json!({"status_min": 200, "status_max": 299, "cache_control": "max-age=60"}))
            .unwrap();
        let mut ctx = make_ctx(404, "application/json", "/x");
        inst.header_filter(&mut ctx);
        assert!(!ctx.response_headers.contains_key("cache-control"));
    }

    #[test]
    fn status_map_rewrites_status_on_match() {
        let inst = StatusMapPlugin.configure(&serde_json::json!({"status_min": 500, "status_max": 599, "map_to": 502})).unwrap();
        let mut ctx = make_ctx(503, "application/json", "/x");
        inst.header_filter(&mut ctx);
        assert_eq!(ctx.response_status, Some(502));
    }

    #[test]
    fn error_reformat_rewrites_body_into_envelope() {
        let inst = ErrorReformatPlugin
            .configure(&serde_json::json!({"status_min": 400, "status_max": 599, "message_path": "detail"}))
            .unwrap();
        let mut ctx = make_ctx(502, "application/json", "/x");
        ctx.response_body = Some(br#"{"detail":"upstream broke"}"#.to_vec());
        inst.body_filter(&mut ctx);
        let body: Value = serde_json::from_slice(&ctx.response_body.unwrap()).unwrap();
        assert_eq!(body["error"]["type"], "provider_error");
        assert_eq!(body["error"]["message"], "upstream broke");
    }

    #[test]
    fn error_reformat_skips_non_matching_status() {
        let inst = ErrorReformatPlugin.configure(&serde_json::json!({"status_min": 500, "status_max": 599})).unwrap();
        let mut ctx = make_ctx(200, "application/json", "/x");
        ctx.response_body = Some(br#"{"ok":true}"#.to_vec());
        inst.body_filter(&mut ctx);
        let body: Value = serde_json::from_slice(&ctx.response_body.unwrap()).unwrap();
        assert_eq!(body["ok"], true);
    }
}
