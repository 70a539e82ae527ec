use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Service definition — APISIX-compatible.
/// A service is a reusable bundle of upstream + plugins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Upstream reference.
    #[serde(default)]
    pub upstream_id: Option<String>,

    /// Inline upstream.
    #[serde(default)]
    pub upstream: Option<crate::upstream::Upstream>,

    /// Plugins applied to routes using this service.
    #[serde(default)]
    pub plugins: HashMap<String, serde_json::Value>,

    /// Enable/disable without deleting.
    #[serde(default = "default_enable")]
    pub enable: bool,

    /// Labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,

    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,

    #[serde(default)]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_enable() -> bool {
    true
}
