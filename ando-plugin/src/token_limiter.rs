use crate::plugin::{Phase, Plugin, PluginContext, PluginInstance, PluginResult};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-consumer rolling counters for one route's token budget.
#[derive(Debug, Clone, Copy)]
struct TokenWindow {
    minute_tokens: u64,
    minute_start: Instant,
    day_tokens: u64,
    day_start: Instant,
}

impl TokenWindow {
    fn fresh(now: Instant) -> Self {
        Self { minute_tokens: 0, minute_start: now, day_tokens: 0, day_start: now }
    }
}

const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(86_400);

/// `ceil(word_count * 1.3)` — a cheap, provider-agnostic stand-in for a
/// real tokenizer, used only to pre-deduct before the request is sent;
/// the post-hoc correction in the Log phase replaces the estimate with
/// the real usage count once known.
pub fn estimate_tokens(prompt: &str) -> u64 {
    let words = prompt.split_whitespace().count() as f64;
    (words * 1.3).ceil() as u64
}

#[derive(Debug, Deserialize, Clone)]
struct TokenLimiterConfig {
    #[serde(default = "default_per_minute")]
    tokens_per_minute: u64,
    #[serde(default = "default_per_day")]
    tokens_per_day: u64,
}

fn default_per_minute() -> u64 {
    60_000
}
fn default_per_day() -> u64 {
    2_000_000
}

pub struct TokenLimiterPlugin;

impl Plugin for TokenLimiterPlugin {
    fn name(&self) -> &str {
        "token-limiter"
    }

    fn priority(&self) -> i32 {
        1001
    }

    fn phases(&self) -> &[Phase] {
        &[Phase::Access, Phase::Log]
    }

    fn configure(&self, config: &Value) -> anyhow::Result<Box<dyn PluginInstance>> {
        let cfg: TokenLimiterConfig =
            serde_json::from_value(config.clone()).map_err(|e| anyhow::anyhow!("token-limiter config error: {e}"))?;
        Ok(Box::new(TokenLimiterInstance {
            per_minute: cfg.tokens_per_minute,
            per_day: cfg.tokens_per_day,
            windows: Mutex::new(HashMap::new()),
        }))
    }
}

/// `vars` key the upstream call site fills with the real
/// `usage.total_tokens` once the response is parsed (or the SSE
/// translator's captured terminal usage event). Read back by the
/// Log-phase correction below.
pub const ACTUAL_TOKENS_VAR: &str = "token_limiter.actual_tokens";

struct TokenLimiterInstance {
    per_minute: u64,
    per_day: u64,
    /// One lock per route instance, keyed by consumer/client identity.
    /// A single mutex is adequate here: windows are only touched on the
    /// Access and Log phases of requests already routed to this plugin
    /// instance, never on the hot proxy loop itself.
    windows: Mutex<HashMap<String, TokenWindow>>,
}

impl TokenLimiterInstance {
    fn key_for(ctx: &PluginContext) -> String {
        ctx.consumer.clone().unwrap_or_else(|| ctx.client_ip.clone())
    }

    fn reject(&self, retry_after: u64) -> PluginResult {
        PluginResult::Response {
            status: 429,
            headers: vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("retry-after".to_string(), retry_after.to_string()),
            ],
            body: Some(
                serde_json::json!({"error": {"type": "token_rate_limit", "message": "token budget exceeded", "provider": null}})
                    .to_string()
                    .into_bytes(),
            ),
        }
    }
}

impl PluginInstance for TokenLimiterInstance {
    fn name(&self) -> &str {
        "token-limiter"
    }

    fn priority(&self) -> i32 {
        1001
    }

    fn access(&self, ctx: &mut PluginContext) -> PluginResult {
        let prompt = ctx
            .request_body
            .as_deref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default();
        let estimate = estimate_tokens(&prompt);

        let key = Self::key_for(ctx);
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("token window lock poisoned");
        let window = windows.entry(key).or_insert_with(|| TokenWindow::fresh(now));

        if now.duration_since(window.minute_start) >= MINUTE {
            window.minute_tokens = 0;
            window.minute_start = now;
        }
        if now.duration_since(window.day_start) >= DAY {
            window.day_tokens = 0;
            window.day_start = now;
        }

        if window.minute_tokens + estimate > self.per_minute {
            return self.reject(60);
        }
        if window.day_tokens + estimate > self.per_day {
            return self.reject(86_400);
        }

        window.minute_tokens += estimate;
        window.day_tokens += estimate;
        drop(windows);

        ctx.set_var("token_limiter.estimate".to_string(), Value::from(estimate));
        PluginResult::Continue
    }

    fn log(&self, ctx: &mut PluginContext) {
        let Some(estimate) = ctx.get_var("token_limiter.estimate").and_then(|v| v.as_u64()) else {
            return;
        };
        let Some(actual) = ctx.get_var(ACTUAL_TOKENS_VAR).and_then(|v| v.as_u64()) else {
            return;
        };
        if actual == estimate {
            return;
        }
        let key = Self::key_for(ctx);
        let diff = actual as i64 - estimate as i64;
        let mut windows = self.windows.lock().expect("token window lock poisoned");
        if let Some(window) = windows.get_mut(&key) {
            window.minute_tokens = (window.minute_tokens as i64 + diff).max(0) as u64;
            window.day_tokens = (window.day_tokens as i64 + diff).max(0) as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn make_ctx() -> PluginContext {
        let mut ctx = PluginContext::new("r1".into(), "1.1.1.1".into(), "POST".into(), "/chat".into(), Map::new());
        ctx.request_body = Some(b"hello world this is a prompt".to_vec());
        ctx
    }

    #[test]
    fn estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens("one two three"), 4);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn allows_under_budget() {
        let inst = TokenLimiterPlugin
            .configure(&serde_json::json!({"tokens_per_minute": 1000, "tokens_per_day": 100000}))
            .unwrap();
        let mut ctx = make_ctx();
        assert!(matches!(inst.access(&mut ctx), PluginResult::Continue));
    }

    #[test]
    fn rejects_when_minute_budget_exceeded() {
        let inst = TokenLimiterPlugin.configure(&serde_json::json!({"tokens_per_minute": 2, "tokens_per_day": 100000})).unwrap();
        let mut ctx = make_ctx();
        assert!(matches!(inst.access(&mut ctx), PluginResult::Response { status: 429, .. }));
    }

    #[test]
    fn log_phase_corrects_window_with_actual_usage() {
        let inst_box = TokenLimiterPlugin.configure(&serde_json::json!({"tokens_per_minute": 1000, "tokens_per_day": 100000})).unwrap();
        let mut ctx = make_ctx();
        assert!(matches!(inst_box.access(&mut ctx), PluginResult::Continue));
        ctx.set_var(ACTUAL_TOKENS_VAR.to_string(), Value::from(2u64));
        inst_box.log(&mut ctx);
    }

    #[test]
    fn different_consumers_tracked_independently() {
        let inst = TokenLimiterPlugin.configure(&serde_json::json!({"tokens_per_minute": 6, "tokens_per_day": 100000})).unwrap();
        let mut ctx_a = make_ctx();
        ctx_a.consumer = Some("alice".into());
        let mut ctx_b = make_ctx();
        ctx_b.consumer = Some("bob".into());
        assert!(matches!(inst.access(&mut ctx_a), PluginResult::Continue));
        assert!(matches!(inst.access(&mut ctx_b), PluginResult::Continue));
    }
}
