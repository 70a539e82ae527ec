use crate::handlers;
use ando_core::config::AdminConfig;
use ando_core::router::Router;
use ando_plugin::registry::PluginRegistry;
use ando_store::cache::ConfigCache;
use arc_swap::ArcSwap;
use axum::{Router as AxumRouter, routing::get};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

/// Shared state for the Admin API.
///
/// `router_swap` is the same `ArcSwap<Router>` the proxy workers read from
/// (via `ando_proxy::worker::SharedState::router`) — a PUT/DELETE here
/// rebuilds the router and swaps it in, and every worker picks up the new
/// version on its next `maybe_update_router` check.
pub struct AdminState {
    pub cache: ConfigCache,
    pub router_swap: Arc<ArcSwap<Router>>,
    pub plugin_registry: Arc<PluginRegistry>,
    /// Notified whenever a route/service/upstream mutation rebuilds the router.
    pub config_changed: Arc<Notify>,
    /// Where to persist state on every mutation. `None` disables persistence
    /// (used by tests that only care about in-memory behavior).
    pub state_file: Option<PathBuf>,
}

/// Build the Axum router with every admin route wired to `state`.
///
/// Split out from `start_admin` so integration tests can exercise the
/// router directly with `tower::ServiceExt::oneshot`, without binding a
/// real TCP listener.
pub fn build_admin_router(state: Arc<AdminState>) -> AxumRouter {
    let admin_api = AxumRouter::new()
        // Health
        .route("/health", get(handlers::health::health_check))
        // Routes
        .route("/routes", get(handlers::routes::list_routes))
        .route(
            "/routes/{id}",
            get(handlers::routes::get_route)
                .put(handlers::routes::put_route)
                .delete(handlers::routes::delete_route),
        )
        // Services
        .route("/services", get(handlers::services::list_services))
        .route(
            "/services/{id}",
            get(handlers::services::get_service)
                .put(handlers::services::put_service)
                .delete(handlers::services::delete_service),
        )
        // Upstreams
        .route("/upstreams", get(handlers::upstreams::list_upstreams))
        .route(
            "/upstreams/{id}",
            get(handlers::upstreams::get_upstream)
                .put(handlers::upstreams::put_upstream)
                .delete(handlers::upstreams::delete_upstream),
        )
        // Consumers
        .route("/consumers", get(handlers::consumers::list_consumers))
        .route(
            "/consumers/{id}",
            get(handlers::consumers::get_consumer)
                .put(handlers::consumers::put_consumer)
                .delete(handlers::consumers::delete_consumer),
        )
        // SSL certificates
        .route("/ssls", get(handlers::ssl::list_ssl))
        .route(
            "/ssls/{id}",
            get(handlers::ssl::get_ssl)
                .put(handlers::ssl::put_ssl)
                .delete(handlers::ssl::delete_ssl),
        )
        // Reusable plugin configs
        .route("/plugin_configs", get(handlers::plugin_config::list_plugin_configs))
        .route(
            "/plugin_configs/{id}",
            get(handlers::plugin_config::get_plugin_config)
                .put(handlers::plugin_config::put_plugin_config)
                .delete(handlers::plugin_config::delete_plugin_config),
        )
        // Plugins
        .route("/plugins/list", get(handlers::plugins::list_plugins));

    AxumRouter::new()
        .nest("/apisix/admin", admin_api)
        .route("/dashboard", get(handlers::dashboard::dashboard_index))
        .route("/dashboard/{*path}", get(handlers::dashboard::dashboard_assets))
        .with_state(state)
}

/// Start the admin API server. Binds `config.addr` and serves until the
/// process exits or the listener errors.
pub async fn start_admin(config: AdminConfig, state: Arc<AdminState>) -> anyhow::Result<()> {
    if !config.enabled {
        info!("Admin API disabled");
        return Ok(());
    }

    let app = build_admin_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "Admin API listening");
    axum::serve(listener, app).await?;
    Ok(())
}
