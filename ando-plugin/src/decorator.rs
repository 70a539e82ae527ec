use crate::guard::{ChatBody, ChatMessage, PARSED_BODY_VAR};
use crate::plugin::{Phase, Plugin, PluginContext, PluginInstance, PluginResult};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertPosition {
    Prepend,
    Append,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecoratorConfig {
    pub role: String,
    pub content: String,
    #[serde(default = "default_position")]
    pub position: InsertPosition,
}

fn default_position() -> InsertPosition {
    InsertPosition::Prepend
}

/// Insert a system/context message into the chat body. If `Rewrite`
/// already parsed and stashed the body (via the guard), reuse it
/// instead of reparsing the raw bytes.
pub fn decorate(body: &mut ChatBody, cfg: &DecoratorConfig) {
    let msg = ChatMessage { role: cfg.role.clone(), content: cfg.content.clone() };
    match cfg.position {
        InsertPosition::Prepend => body.messages.insert(0, msg),
        InsertPosition::Append => body.messages.push(msg),
    }
}

pub struct PromptDecoratorPlugin;

impl Plugin for PromptDecoratorPlugin {
    fn name(&self) -> &str {
        "prompt-decorator"
    }

    fn priority(&self) -> i32 {
        890
    }

    fn phases(&self) -> &[Phase] {
        &[Phase::Rewrite]
    }

    fn configure(&self, config: &Value) -> anyhow::Result<Box<dyn PluginInstance>> {
        let cfg: DecoratorConfig = serde_json::from_value(config.clone())
            .map_err(|e| anyhow::anyhow!("prompt-decorator config error: {e}"))?;
        Ok(Box::new(PromptDecoratorInstance { cfg }))
    }
}

struct PromptDecoratorInstance {
    cfg: DecoratorConfig,
}

impl PluginInstance for PromptDecoratorInstance {
    fn name(&self) -> &str {
        "prompt-decorator"
    }

    fn priority(&self) -> i32 {
        890
    }

    fn rewrite(&self, ctx: &mut PluginContext) -> PluginResult {
        let mut body: ChatBody = if let Some(cached) = ctx.get_var(PARSED_BODY_VAR) {
            match serde_json::from_value(cached.clone()) {
                Ok(b) => b,
                Err(_) => return PluginResult::Continue,
            }
        } else {
            let Some(raw) = ctx.request_body.as_deref() else {
                return PluginResult::Continue;
            };
            match serde_json::from_slice(raw) {
                Ok(b) => b,
                Err(_) => return PluginResult::Continue,
            }
        };

        decorate(&mut body, &self.cfg);

        if let Ok(bytes) = serde_json::to_vec(&body) {
            ctx.request_body = Some(bytes);
        }
        if let Ok(json) = serde_json::to_value(&body) {
            ctx.set_var(PARSED_BODY_VAR.to_string(), json);
        }
        PluginResult::Continue
    }
}
