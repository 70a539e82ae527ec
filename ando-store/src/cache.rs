use ando_core::consumer::Consumer;
use ando_core::plugin_config::PluginConfig;
use ando_core::route::Route;
use ando_core::service::Service;
use ando_core::ssl::SslCertificate;
use ando_core::upstream::Upstream;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// In-memory configuration cache for zero-latency lookups.
///
/// The cache is populated from etcd (or a persisted state file) on
/// startup and kept in sync via the ConfigWatcher or the Admin API.
/// All proxy decisions read from this cache rather than hitting etcd
/// or the admin store on every request.
#[derive(Clone)]
pub struct ConfigCache {
    pub routes: Arc<DashMap<String, Route>>,
    pub services: Arc<DashMap<String, Service>>,
    pub upstreams: Arc<DashMap<String, Upstream>>,
    pub consumers: Arc<DashMap<String, Consumer>>,
    pub ssl_certs: Arc<DashMap<String, SslCertificate>>,
    pub plugin_configs: Arc<DashMap<String, PluginConfig>>,

    /// Derived index: key-auth/basic-auth credential value -> consumer username.
    /// Rebuilt wholesale via `rebuild_consumer_key_index` whenever consumers change,
    /// since credentials live inside each consumer's `plugins` blob rather than as
    /// a dedicated column.
    pub consumer_key_index: Arc<DashMap<String, String>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self {
            routes: Arc::new(DashMap::new()),
            services: Arc::new(DashMap::new()),
            upstreams: Arc::new(DashMap::new()),
            consumers: Arc::new(DashMap::new()),
            ssl_certs: Arc::new(DashMap::new()),
            plugin_configs: Arc::new(DashMap::new()),
            consumer_key_index: Arc::new(DashMap::new()),
        }
    }

    /// Snapshot of all routes, for router rebuilds.
    pub fn all_routes(&self) -> Vec<Route> {
        self.routes.iter().map(|e| e.value().clone()).collect()
    }

    /// Rebuild the credential -> username index from the current consumer set.
    /// Looks at each consumer's `key-auth.key` and `basic-auth.key` plugin config,
    /// the two credential shapes `ando-plugins::auth` already understands.
    pub fn rebuild_consumer_key_index(&self) {
        self.consumer_key_index.clear();
        for entry in self.consumers.iter() {
            let username = entry.key().clone();
            let consumer = entry.value();
            if let Some(key_auth) = consumer.plugins.get("key-auth") {
                if let Some(key) = key_auth.get("key").and_then(|v| v.as_str()) {
                    self.consumer_key_index.insert(key.to_string(), username.clone());
                }
            }
            if let Some(basic_auth) = consumer.plugins.get("basic-auth") {
                if let Some(key) = basic_auth.get("key").and_then(|v| v.as_str()) {
                    self.consumer_key_index.insert(key.to_string(), username.clone());
                }
            }
        }
    }

    /// Look up the consumer username owning a given credential value.
    pub fn find_consumer_by_key(&self, key: &str) -> Option<String> {
        self.consumer_key_index.get(key).map(|v| v.clone())
    }

    /// Apply a change event from etcd.
    pub fn apply_change(&self, resource_type: &str, id: &str, value: Option<&str>) {
        match resource_type {
            "routes" => {
                if let Some(val) = value {
                    match serde_json::from_str::<Route>(val) {
                        Ok(route) => {
                            self.routes.insert(id.to_string(), route);
                            debug!(resource = "route", id = id, "Cache updated");
                        }
                        Err(e) => tracing::error!(error = %e, "Failed to deserialize route"),
                    }
                } else {
                    self.routes.remove(id);
                    debug!(resource = "route", id = id, "Cache removed");
                }
            }
            "services" => {
                if let Some(val) = value {
                    if let Ok(service) = serde_json::from_str::<Service>(val) {
                        self.services.insert(id.to_string(), service);
                    }
                } else {
                    self.services.remove(id);
                }
            }
            "upstreams" => {
                if let Some(val) = value {
                    if let Ok(upstream) = serde_json::from_str::<Upstream>(val) {
                        self.upstreams.insert(id.to_string(), upstream);
                    }
                } else {
                    self.upstreams.remove(id);
                }
            }
            "consumers" => {
                if let Some(val) = value {
                    if let Ok(consumer) = serde_json::from_str::<Consumer>(val) {
                        self.consumers.insert(id.to_string(), consumer);
                    }
                } else {
                    self.consumers.remove(id);
                }
                self.rebuild_consumer_key_index();
            }
            "ssl" => {
                if let Some(val) = value {
                    if let Ok(cert) = serde_json::from_str::<SslCertificate>(val) {
                        self.ssl_certs.insert(id.to_string(), cert);
                    }
                } else {
                    self.ssl_certs.remove(id);
                }
            }
            "plugin_configs" => {
                if let Some(val) = value {
                    if let Ok(config) = serde_json::from_str::<PluginConfig>(val) {
                        self.plugin_configs.insert(id.to_string(), config);
                    }
                } else {
                    self.plugin_configs.remove(id);
                }
            }
            _ => {
                tracing::warn!(resource_type = resource_type, "Unknown resource type in cache");
            }
        }
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            routes: self.routes.len(),
            services: self.services.len(),
            upstreams: self.upstreams.len(),
            consumers: self.consumers.len(),
            ssl_certs: self.ssl_certs.len(),
            plugin_configs: self.plugin_configs.len(),
        }
    }
}

impl Default for ConfigCache {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct CacheStats {
    pub routes: usize,
    pub services: usize,
    pub upstreams: usize,
    pub consumers: usize,
    pub ssl_certs: usize,
    pub plugin_configs: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "routes={}, services={}, upstreams={}, consumers={}, ssl={}, plugin_configs={}",
            self.routes, self.services, self.upstreams, self.consumers, self.ssl_certs, self.plugin_configs
        )
    }
}
