use ando_plugin::plugin::{Phase, Plugin, PluginContext, PluginInstance, PluginResult};
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Rate limiting plugin using a fixed-window counter.
///
/// Configuration:
/// ```json
/// {
///   "count": 100,
///   "time_window": 60,
///   "key": "remote_addr",
///   "rejected_code": 429,
///   "rejected_msg": "Too many requests"
/// }
/// ```
pub struct LimitCountPlugin;

#[derive(Debug, Deserialize, Clone)]
struct LimitCountConfig {
    #[serde(default = "default_count")]
    count: u64,
    #[serde(default = "default_window")]
    time_window: u64,
    #[serde(default = "default_key")]
    key: String,
    #[serde(default = "default_rejected_code")]
    rejected_code: u16,
    #[serde(default = "default_rejected_msg")]
    rejected_msg: String,
}

fn default_count() -> u64 {
    100
}
fn default_window() -> u64 {
    60
}
fn default_key() -> String {
    "remote_addr".to_string()
}
fn default_rejected_code() -> u16 {
    429
}
fn default_rejected_msg() -> String {
    "Too many requests".to_string()
}

impl Plugin for LimitCountPlugin {
    fn name(&self) -> &str {
        "limit-count"
    }

    fn priority(&self) -> i32 {
        1002
    }

    fn phases(&self) -> &[Phase] {
        &[Phase::Access]
    }

    fn configure(&self, config: &serde_json::Value) -> anyhow::Result<Box<dyn PluginInstance>> {
        let cfg: LimitCountConfig = serde_json::from_value(config.clone())
            .map_err(|e| anyhow::anyhow!("limit-count config error: {e}"))?;
        Ok(Box::new(LimitCountInstance {
            count_limit: cfg.count,
            window: Duration::from_secs(cfg.time_window),
            time_window: cfg.time_window,
            key_type: cfg.key,
            rejected_code: cfg.rejected_code,
            rejected_msg: cfg.rejected_msg,
            counters: Arc::new(DashMap::new()),
        }))
    }
}

struct LimitCountInstance {
    count_limit: u64,
    window: Duration,
    time_window: u64,
    key_type: String,
    rejected_code: u16,
    rejected_msg: String,
    /// Counters: key -> (count, window_start)
    counters: Arc<DashMap<String, (u64, Instant)>>,
}

impl PluginInstance for LimitCountInstance {
    fn name(&self) -> &str {
        "limit-count"
    }

    fn priority(&self) -> i32 {
        1002
    }

    fn access(&self, ctx: &mut PluginContext) -> PluginResult {
        let key = match self.key_type.as_str() {
            "consumer" => {
                let consumer = ctx.consumer.as_deref().unwrap_or("anonymous");
                format!("limit:{}:{}", ctx.route_id, consumer)
            }
            _ => format!("limit:{}:{}", ctx.route_id, ctx.client_ip),
        };

        let now = Instant::now();
        let mut entry = self.counters.entry(key).or_insert((0, now));
        let (count, window_start) = &mut *entry;

        if now.duration_since(*window_start) >= self.window {
            *count = 0;
            *window_start = now;
        }

        *count += 1;
        let current_count = *count;
        let remaining = self.count_limit.saturating_sub(current_count);

        ctx.set_response_header("x-ratelimit-limit".to_string(), self.count_limit.to_string());
        ctx.set_response_header("x-ratelimit-remaining".to_string(), remaining.to_string());

        if current_count > self.count_limit {
            return PluginResult::Response {
                status: self.rejected_code,
                headers: vec![
                    ("content-type".to_string(), "application/json".to_string()),
                    ("x-ratelimit-limit".to_string(), self.count_limit.to_string()),
                    ("x-ratelimit-remaining".to_string(), "0".to_string()),
                    ("retry-after".to_string(), self.time_window.to_string()),
                ],
                body: Some(
                    format!(
                        r#"{{"error":"{}","status":{}}}"#,
                        self.rejected_msg, self.rejected_code
                    )
                    .into_bytes(),
                ),
            };
        }

        PluginResult::Continue
    }
}
