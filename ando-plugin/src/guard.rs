use crate::plugin::{Phase, Plugin, PluginContext, PluginInstance, PluginResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatBody {
    pub messages: Vec<ChatMessage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyAction {
    /// Reject the request outright with a guard-blocked error.
    Block,
    /// Let the request through but record the match for observability —
    /// used while tuning a new rule before enforcing it.
    LogAndPass,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuardRule {
    /// Substring or regex-free literal match against message content,
    /// case-insensitive.
    pub contains: String,
    #[serde(default)]
    pub deny_action: Option<DenyAction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuardConfig {
    #[serde(default)]
    pub deny: Vec<GuardRule>,
    #[serde(default)]
    pub allow: Vec<GuardRule>,
    #[serde(default = "default_deny_action")]
    pub default_deny_action: DenyAction,
}

fn default_deny_action() -> DenyAction {
    DenyAction::Block
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    Allow,
    Block(String),
    /// Matched a deny rule configured as `log_and_pass`: request
    /// continues, caller should log `reason` but not reject.
    LogAndPass(String),
}

/// Evaluate every message's content against `cfg`. Allow rules take
/// precedence over deny rules: if any allow rule matches, the request
/// is allowed regardless of how many deny rules also match (the
/// "allow-overrides-deny" rule).
pub fn check(body: &ChatBody, cfg: &GuardConfig) -> GuardVerdict {
    let haystacks: Vec<String> = body.messages.iter().map(|m| m.content.to_lowercase()).collect();

    for rule in &cfg.allow {
        let needle = rule.contains.to_lowercase();
        if haystacks.iter().any(|h| h.contains(&needle)) {
            return GuardVerdict::Allow;
        }
    }

    for rule in &cfg.deny {
        let needle = rule.contains.to_lowercase();
        if haystacks.iter().any(|h| h.contains(&needle)) {
            let reason = format!("matched deny rule: {}", rule.contains);
            let action = rule.deny_action.unwrap_or(cfg.default_deny_action);
            return match action {
                DenyAction::Block => GuardVerdict::Block(reason),
                DenyAction::LogAndPass => GuardVerdict::LogAndPass(reason),
            };
        }
    }

    GuardVerdict::Allow
}

/// Key under which the parsed chat body is stashed in
/// `PluginContext::vars` so downstream modules (the decorator, scripted
/// hooks) don't reparse the request body.
pub const PARSED_BODY_VAR: &str = "guard.parsed_body";

pub struct PromptGuardPlugin;

impl Plugin for PromptGuardPlugin {
    fn name(&self) -> &str {
        "prompt-guard"
    }

    fn priority(&self) -> i32 {
        900
    }

    fn phases(&self) -> &[Phase] {
        &[Phase::Access]
    }

    fn configure(&self, config: &Value) -> anyhow::Result<Box<dyn PluginInstance>> {
        let cfg: GuardConfig =
            serde_json::from_value(config.clone()).map_err(|e| anyhow::anyhow!("prompt-guard config error: {e}"))?;
        Ok(Box::new(PromptGuardInstance { cfg }))
    }
}

struct PromptGuardInstance {
    cfg: GuardConfig,
}

impl PluginInstance for PromptGuardInstance {
    fn name(&self) -> &str {
        "prompt-guard"
    }

    fn priority(&self) -> i32 {
        900
    }

    fn access(&self, ctx: &mut PluginContext) -> PluginResult {
        let Some(raw) = ctx.request_body.as_deref() else {
            return PluginResult::Continue;
        };
        let Ok(body) = serde_json::from_slice::<ChatBody>(raw) else {
            return PluginResult::Continue;
        };

        let verdict = check(&body, &self.cfg);
        if let Ok(json) = serde_json::to_value(&body) {
            ctx.set_var(PARSED_BODY_VAR.to_string(), json);
        }

        match verdict {
            GuardVerdict::Allow => PluginResult::Continue,
            GuardVerdict::LogAndPass(reason) => {
                ctx.set_var("guard.log_and_pass_reason".to_string(), Value::String(reason));
                PluginResult::Continue
            }
            GuardVerdict::Block(reason) => PluginResult::Response {
                status: 400,
                headers: vec![("content-type".to_string(), "application/json".to_string())],
                body: Some(
                    serde_json::json!({"error": {"type": "prompt_blocked", "message": reason, "provider": null}})
                        .to_string()
                        .into_bytes(),
                ),
            },
        }
    }
}
