use crate::persist;
use crate::server::AdminState;
use ando_core::plugin_config::PluginConfig;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::{Value, json};
use std::sync::Arc;

/// PUT /apisix/admin/plugin_configs/:id
pub async fn put_plugin_config(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
    Json(mut body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    body["id"] = json!(id);

    let config: PluginConfig = match serde_json::from_value(body) {
        Ok(c) => c,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()})));
        }
    };

    state.cache.plugin_configs.insert(config.id.clone(), config.clone());
    persist::save_state(&state);

    (StatusCode::OK, Json(json!({"id": config.id, "status": "created"})))
}

/// GET /apisix/admin/plugin_configs/:id
pub async fn get_plugin_config(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.cache.plugin_configs.get(&id) {
        Some(c) => (StatusCode::OK, Json(json!(c.value().clone()))),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "Plugin config not found"}))),
    }
}

/// DELETE /apisix/admin/plugin_configs/:id
pub async fn delete_plugin_config(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    state.cache.plugin_configs.remove(&id);
    persist::save_state(&state);
    (StatusCode::OK, Json(json!({"deleted": true})))
}

/// GET /apisix/admin/plugin_configs
pub async fn list_plugin_configs(State(state): State<Arc<AdminState>>) -> Json<Value> {
    let configs: Vec<PluginConfig> =
        state.cache.plugin_configs.iter().map(|c| c.value().clone()).collect();
    Json(json!({"list": configs, "total": configs.len()}))
}
