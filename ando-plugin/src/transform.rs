use crate::plugin::{Phase, Plugin, PluginContext, PluginInstance, PluginResult};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

/// One segment of a dotted JSON path: `"a.b[2].c"` -> `[Key("a"), Key("b"), Index(2), Key("c")]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSeg {
    Key(String),
    Index(usize),
}

pub fn parse_path(path: &str) -> Vec<PathSeg> {
    let mut segs = Vec::new();
    for part in path.split('.') {
        let mut rest = part;
        while let Some(start) = rest.find('[') {
            let key = &rest[..start];
            if !key.is_empty() {
                segs.push(PathSeg::Key(key.to_string()));
            }
            let end = rest[start..].find(']').map(|i| i + start).unwrap_or(rest.len());
            if let Ok(idx) = rest[start + 1..end].parse::<usize>() {
                segs.push(PathSeg::Index(idx));
            }
            rest = &rest[end.saturating_add(1).min(rest.len())..];
        }
        if !rest.is_empty() {
            segs.push(PathSeg::Key(rest.to_string()));
        }
    }
    segs
}

#[derive(Debug, Clone)]
pub enum TransformOp {
    Regexp { re: Regex, replacement: String },
    Literal { from: String, to: String },
    Upper,
    Lower,
    Trim(Option<String>),
}

#[derive(Debug, Clone)]
pub struct TransformRule {
    pub path: Vec<PathSeg>,
    pub op: TransformOp,
}

pub(crate) fn navigate_mut<'a>(value: &'a mut Value, path: &[PathSeg]) -> Option<&'a mut Value> {
    let mut current = value;
    for seg in path {
        current = match (seg, current) {
            (PathSeg::Key(k), Value::Object(map)) => map.get_mut(k)?,
            (PathSeg::Index(i), Value::Array(arr)) => arr.get_mut(*i)?,
            _ => return None,
        };
    }
    Some(current)
}

fn apply_op(v: &mut Value, op: &TransformOp) -> bool {
    let Value::String(s) = v else { return false };
    let new_val = match op {
        TransformOp::Regexp { re, replacement } => re.replace_all(s, replacement.as_str()).into_owned(),
        TransformOp::Literal { from, to } => {
            if s == from {
                to.clone()
            } else {
                s.clone()
            }
        }
        TransformOp::Upper => s.to_uppercase(),
        TransformOp::Lower => s.to_lowercase(),
        TransformOp::Trim(chars) => match chars {
            Some(c) => s.trim_matches(|ch| c.contains(ch)).to_string(),
            None => s.trim().to_string(),
        },
    };
    if &new_val != s {
        *s = new_val;
        true
    } else {
        false
    }
}

/// Apply every rule in order, mutating `body` in place. Returns whether
/// any rule actually changed a value, so callers can skip
/// re-serialization when nothing moved.
pub fn apply_rules(body: &mut Value, rules: &[TransformRule]) -> bool {
    let mut changed = false;
    for rule in rules {
        if let Some(target) = navigate_mut(body, &rule.path) {
            if apply_op(target, &rule.op) {
                changed = true;
            }
        }
    }
    changed
}

#[derive(Debug, Deserialize)]
struct RawRule {
    path: String,
    #[serde(flatten)]
    op: RawOp,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawOp {
    Regexp { pattern: String, replacement: String },
    Literal { from: String, to: String },
    Upper,
    Lower,
    Trim { chars: Option<String> },
}

#[derive(Debug, Deserialize)]
struct TransformConfig {
    rules: Vec<RawRule>,
}

fn compile_rules(cfg: &TransformConfig) -> anyhow::Result<Vec<TransformRule>> {
    cfg.rules
        .iter()
        .map(|r| {
            let op = match &r.op {
                RawOp::Regexp { pattern, replacement } => TransformOp::Regexp {
                    re: Regex::new(pattern).map_err(|e| anyhow::anyhow!("bad regexp {pattern}: {e}"))?,
                    replacement: replacement.clone(),
                },
                RawOp::Literal { from, to } => TransformOp::Literal { from: from.clone(), to: to.clone() },
                RawOp::Upper => TransformOp::Upper,
                RawOp::Lower => TransformOp::Lower,
                RawOp::Trim { chars } => TransformOp::Trim(chars.clone()),
            };
            Ok(TransformRule { path: parse_path(&r.path), op })
        })
        .collect()
}

pub struct JsonTransformPlugin;

impl Plugin for JsonTransformPlugin {
    fn name(&self) -> &str {
        "json-transform"
    }

    fn priority(&self) -> i32 {
        500
    }

    fn phases(&self) -> &[Phase] {
        &[Phase::BodyFilter]
    }

    fn configure(&self, config: &Value) -> anyhow::Result<Box<dyn PluginInstance>> {
        let cfg: TransformConfig =
            serde_json::from_value(config.clone()).map_err(|e| anyhow::anyhow!("json-transform config error: {e}"))?;
        let rules = compile_rules(&cfg)?;
        Ok(Box::new(JsonTransformInstance { rules }))
    }
}

struct JsonTransformInstance {
    rules: Vec<TransformRule>,
}

impl PluginInstance for JsonTransformInstance {
    fn name(&self) -> &str {
        "json-transform"
    }

    fn priority(&self) -> i32 {
        500
    }

    fn body_filter(&self, ctx: &mut PluginContext) -> PluginResult {
        let is_json = ctx
            .response_headers
            .get("content-type")
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false);
        if !is_json {
            return PluginResult::Continue;
        }
        let Some(body) = ctx.response_body.take() else {
            return PluginResult::Continue;
        };
        let Ok(mut parsed) = serde_json::from_slice::<Value>(&body) else {
            ctx.response_body = Some(body);
            return PluginResult::Continue;
        };
        if apply_rules(&mut parsed, &self.rules) {
            ctx.response_body = serde_json::to_vec(&parsed).ok().or(Some(body));
        } else {
            ctx.response_body = Some(body);
        }
        PluginResult::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_path_handles_keys_and_indices() {
        assert_eq!(
            parse_path("user.tags[0].name"),
            vec![
                PathSeg::Key("user".into()),
                PathSeg::Key("tags".into()),
                PathSeg::Index(0),
                PathSeg::Key("name".into()),
            ]
        );
    }

    #[test]
    fn upper_rule_mutates_target_string() {
        let mut body = json!({"user": {"name": "alice"}});
        let rules = vec![TransformRule { path: parse_path("user.name"), op: TransformOp::Upper }];
        assert!(apply_rules(&mut body, &rules));
        assert_eq!(body["user"]["name"], "ALICE");
    }

    #[test]
    fn no_change_returns_false() {
        let mut body = json!({"x": "ALREADY"});
        let rules = vec![TransformRule { path: parse_path("x"), op: TransformOp::Upper }];
        assert!(!apply_rules(&mut body, &rules));
    }

    #[test]
    fn regexp_rule_redacts_value() {
        let mut body = json!({"email": "a@b.com"});
        let rules = vec![TransformRule {
            path: parse_path("email"),
            op: TransformOp::Regexp { re: Regex::new("@.*").unwrap(), replacement: "@redacted".into() },
        }];
        assert!(apply_rules(&mut body, &rules));
        assert_eq!(body["email"], "a@redacted");
    }

    #[test]
    fn missing_path_is_a_noop_not_an_error() {
        let mut body = json!({"a": 1});
        let rules = vec![TransformRule { path: parse_path("b.c"), op: TransformOp::Upper }];
        assert!(!apply_rules(&mut body, &rules));
    }

    #[test]
    fn indexed_array_element_is_reachable() {
        let mut body = json!({"tags": ["x", "y"]});
        let rules = vec![TransformRule { path: parse_path("tags[1]"), op: TransformOp::Upper }];
        assert!(apply_rules(&mut body, &rules));
        assert_eq!(body["tags"][1], "Y");
    }
}
