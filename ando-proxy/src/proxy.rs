use ando_core::config::AndoConfig;
use ando_core::manager::RouteManager;
use ando_core::route::Route;
use ando_core::router::Router;
use ando_core::service::Service;
use ando_core::upstream::Upstream;
use ando_plugin::pipeline::PluginPipeline;
use ando_plugin::plugin::{Phase, PluginContext, PluginInstance, PluginResult};
use ando_plugin::registry::PluginRegistry;
use ando_store::cache::ConfigCache;
use monoio::net::TcpStream;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

// ── Pre-built static error responses (zero heap alloc) ────────

pub const RESP_404: &[u8] =
    b"HTTP/1.1 404 Not Found\r\ncontent-type: application/json\r\ncontent-length: 41\r\nconnection: keep-alive\r\n\r\n{\"error\":\"no route matched\",\"status\":404}";

pub const RESP_401_INVALID: &[u8] =
    b"HTTP/1.1 401 Unauthorized\r\ncontent-type: application/json\r\ncontent-length: 40\r\nconnection: keep-alive\r\n\r\n{\"error\":\"Invalid API key\",\"status\":401}";

pub const RESP_502: &[u8] =
    b"HTTP/1.1 502 Bad Gateway\r\ncontent-type: application/json\r\ncontent-length: 39\r\nconnection: keep-alive\r\n\r\n{\"error\":\"upstream error\",\"status\":502}";

// ── ProxyWorker ───────────────────────────────────────────────

/// Per-worker proxy state. Created ONCE per thread, reused across
/// all connections via Rc<RefCell<ProxyWorker>>.
///
/// All caches are plain HashMaps — zero atomics on hot path.
/// DashMap is only touched during config rebuild (cold path).
pub struct ProxyWorker {
    /// Current frozen router.
    router: Arc<Router>,
    /// Router version for cache invalidation.
    router_version: u64,

    // ── Thread-local caches (rebuilt on version change) ──
    // Shares the route-keyed registry abstraction the rest of the
    // per-route feature modules use, so the hot-path lookup and the
    // cold-path rebuild/invalidate story is the same everywhere.
    pipeline_cache: RouteManager<PluginPipeline>,

    // ── Snapshots from DashMap (cold path only) ──
    upstreams: HashMap<String, Upstream>,
    services: HashMap<String, Service>,
    consumer_keys: HashMap<String, String>,

    // ── Shared immutable ──
    plugin_registry: Arc<PluginRegistry>,
    config_cache: ConfigCache,
    #[allow(dead_code)]
    config: Arc<AndoConfig>,
}

impl ProxyWorker {
    pub fn new(
        router: Arc<Router>,
        plugin_registry: Arc<PluginRegistry>,
        config_cache: ConfigCache,
        config: Arc<AndoConfig>,
    ) -> Self {
        let mut worker = Self {
            router_version: router.version(),
            router,
            pipeline_cache: RouteManager::new(),
            upstreams: HashMap::new(),
            services: HashMap::new(),
            consumer_keys: HashMap::new(),
            plugin_registry,
            config_cache,
            config,
        };
        worker.snapshot_from_cache();
        worker
    }

    /// Check for config updates. Called once per accept loop iteration.
    #[inline]
    pub fn maybe_update_router(&mut self, new_router: Arc<Router>) {
        let v = new_router.version();
        if v != self.router_version {
            self.router = new_router;
            self.router_version = v;
            self.pipeline_cache.clear();
            self.snapshot_from_cache();
        }
    }

    /// Cold path: copy DashMap state into thread-local HashMaps.
    fn snapshot_from_cache(&mut self) {
        self.upstreams.clear();
        for entry in self.config_cache.upstreams.iter() {
            self.upstreams.insert(entry.key().clone(), entry.value().clone());
        }
        self.services.clear();
        for entry in self.config_cache.services.iter() {
            self.services.insert(entry.key().clone(), entry.value().clone());
        }
        self.consumer_keys.clear();
        for entry in self.config_cache.consumer_key_index.iter() {
            self.consumer_keys.insert(entry.key().clone(), entry.value().clone());
        }
    }

    /// Collect all unique upstream addresses from config (for pool pre-warming).
    pub fn upstream_addresses(&self) -> Vec<String> {
        let mut addrs = Vec::new();
        for ups in self.upstreams.values() {
            for addr in ups.nodes.keys() {
                if !addrs.contains(addr) {
                    addrs.push(addr.clone());
                }
            }
        }
        // Also check routes with inline upstreams
        for route in self.router.routes().values() {
            if let Some(ref ups) = route.upstream {
                for addr in ups.nodes.keys() {
                    if !addrs.contains(addr) {
                        addrs.push(addr.clone());
                    }
                }
            }
        }
        addrs
    }

    /// Hot path: process request. Returns what to do next.
    ///
    /// Takes &str header references (zero-copy from read buffer).
    /// No DashMap access. No unnecessary allocations.
    #[inline]
    pub fn handle_request(
        &mut self,
        method: &str,
        path: &str,
        host: Option<&str>,
        headers: &[(&str, &str)],
        client_ip: &str,
    ) -> RequestResult {
        // ── Route match — extract data immediately, release borrow ──
        let (route_id, has_plugins, upstream_addr) = {
            let route = match self.router.match_route(method, path, host) {
                Some(r) => r,
                None => return RequestResult::Static(RESP_404),
            };

            let id = route.id.clone();
            let has_plugins = !route.plugins.is_empty()
                || route.plugin_config_id.is_some()
                || route.service_id.is_some();
            let addr = self.resolve_upstream(route);
            (id, has_plugins, addr)
        };
        // immutable borrow of self.router is now released

        // ── FAST PATH: no plugins → proxy directly ──
        if !has_plugins {
            return RequestResult::Proxy { upstream_addr, response_ctx: None };
        }

        // ── SLOW PATH: plugin pipeline ──
        let pipeline = self.get_or_build_pipeline(&route_id);

        // Build PluginContext (only for routes WITH plugins)
        let header_map: HashMap<String, String> = headers
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.to_string()))
            .collect();

        let mut ctx = PluginContext::new(
            route_id.clone(),
            client_ip.to_string(),
            method.to_string(),
            path.to_string(),
            header_map,
        );

        // Execute Rewrite + Access phases
        for phase in &[Phase::Rewrite, Phase::Access] {
            match pipeline.execute_phase(*phase, &mut ctx) {
                PluginResult::Continue => {}
                PluginResult::Response { status, headers, body } => {
                    return RequestResult::PluginResponse {
                        status,
                        headers,
                        body: body.unwrap_or_default(),
                    };
                }
            }
        }

        // Consumer validation (key-auth)
        if pipeline.has_auth_plugins()
            && let Some(key) = ctx.vars.get("_key_auth_key").and_then(|v| v.as_str())
        {
            match self.consumer_keys.get(key) {
                Some(username) => ctx.consumer = Some(username.clone()),
                None => return RequestResult::Static(RESP_401_INVALID),
            }
        }

        // Before proxy phase
        match pipeline.execute_phase(Phase::BeforeProxy, &mut ctx) {
            PluginResult::Continue => {}
            PluginResult::Response { status, headers, body } => {
                return RequestResult::PluginResponse {
                    status,
                    headers,
                    body: body.unwrap_or_default(),
                };
            }
        }

        // Only carry the pipeline + context past the upstream hop when
        // something actually wants to see the response (HeaderFilter,
        // BodyFilter or Log) — otherwise drop both here.
        let response_ctx = if pipeline.has_response_or_log_phases() {
            Some((pipeline, ctx))
        } else {
            None
        };

        RequestResult::Proxy { upstream_addr, response_ctx }
    }

    /// Resolve upstream address from local snapshot (never DashMap).
    fn resolve_upstream(&self, route: &Route) -> String {
        if let Some(ref ups) = route.upstream
            && let Some(addr) = ups.first_node()
        {
            return addr.to_string();
        }
        if let Some(ref id) = route.upstream_id
            && let Some(ups) = self.upstreams.get(id)
            && let Some(addr) = ups.first_node()
        {
            return addr.to_string();
        }
        if let Some(ref svc_id) = route.service_id
            && let Some(svc) = self.services.get(svc_id)
        {
            if let Some(ref ups) = svc.upstream
                && let Some(addr) = ups.first_node()
            {
                return addr.to_string();
            }
            if let Some(ref ups_id) = svc.upstream_id
                && let Some(ups) = self.upstreams.get(ups_id)
                && let Some(addr) = ups.first_node()
            {
                return addr.to_string();
            }
        }
        "127.0.0.1:80".to_string()
    }

    fn get_or_build_pipeline(&mut self, route_id: &str) -> Arc<PluginPipeline> {
        if let Some(cached) = self.pipeline_cache.lookup(route_id) {
            return cached;
        }

        let route = self.router.get_route(route_id);
        let mut merged: HashMap<String, serde_json::Value> = HashMap::new();

        if let Some(route) = route {
            if let Some(ref svc_id) = route.service_id
                && let Some(svc) = self.services.get(svc_id)
            {
                for (name, config) in &svc.plugins {
                    merged.insert(name.clone(), config.clone());
                }
            }
            for (name, config) in &route.plugins {
                merged.insert(name.clone(), config.clone());
            }
        }

        let mut instances: Vec<(Box<dyn PluginInstance>, Vec<Phase>)> = Vec::new();
        for (name, config) in &merged {
            if let Some(factory) = self.plugin_registry.get(name)
                && let Ok(inst) = factory.configure(config)
            {
                instances.push((inst, factory.phases().to_vec()));
            }
        }

        let pipeline = PluginPipeline::new(instances);
        self.pipeline_cache.add(route_id, pipeline);
        self.pipeline_cache.lookup(route_id).expect("just inserted")
    }
}

// ── Request result ────────────────────────────────────────────

pub enum RequestResult {
    /// Proxy to upstream at this address.
    Proxy {
        upstream_addr: String,
        /// Set only when the route's pipeline has at least one
        /// HeaderFilter/BodyFilter/Log plugin. Carries the same
        /// request-scoped `PluginContext` forward so the connection
        /// handler can populate the upstream response into it and run
        /// `execute_response_phases`/`execute_log_phase` against real
        /// traffic instead of silently skipping them.
        response_ctx: Option<(Arc<PluginPipeline>, PluginContext)>,
    },
    /// Send a pre-built static response (zero alloc).
    Static(&'static [u8]),
    /// Send a plugin-generated response.
    PluginResponse {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
}

impl std::fmt::Debug for RequestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestResult::Proxy { upstream_addr, response_ctx } => f
                .debug_struct("Proxy")
                .field("upstream_addr", upstream_addr)
                .field("has_response_ctx", &response_ctx.is_some())
                .finish(),
            RequestResult::Static(_) => write!(f, "Static(..)"),
            RequestResult::PluginResponse { status, .. } => {
                f.debug_struct("PluginResponse").field("status", status).finish()
            }
        }
    }
}

// ── Connection pool ───────────────────────────────────────────

/// Thread-local upstream connection pool.
/// Avoids TCP handshake on every request (saves ~0.5-2ms RTT).
///
/// Pre-warmed at startup: each worker opens N connections to every
/// known upstream before accepting any traffic.
pub struct ConnPool {
    pools: HashMap<String, VecDeque<TcpStream>>,
    max_idle: usize,
}

impl ConnPool {
    pub fn new(max_idle_per_host: usize) -> Self {
        Self {
            pools: HashMap::with_capacity(16),
            max_idle: max_idle_per_host,
        }
    }

    #[inline]
    pub fn take(&mut self, addr: &str) -> Option<TcpStream> {
        self.pools.get_mut(addr).and_then(|q| q.pop_front())
    }

    #[inline]
    pub fn put(&mut self, addr: String, stream: TcpStream) {
        let queue = self.pools.entry(addr).or_insert_with(|| VecDeque::with_capacity(self.max_idle));
        if queue.len() < self.max_idle {
            queue.push_back(stream);
        }
        // else: drop stream (closes fd)
    }

    /// Pre-warm connection pool: open `count` connections to each addr.
    /// Called once at worker startup, before accepting any traffic.
    pub async fn warm(&mut self, addrs: &[String], count: usize) {
        for addr in addrs {
            let target = count.min(self.max_idle);
            let queue = self.pools.entry(addr.clone()).or_insert_with(|| VecDeque::with_capacity(target));
            for _ in 0..target {
                match TcpStream::connect(addr.as_str()).await {
                    Ok(stream) => {
                        // Set TCP_NODELAY on pooled connections
                        let _ = stream.set_nodelay(true);
                        queue.push_back(stream);
                    }
                    Err(e) => {
                        tracing::warn!(addr = %addr, error = %e, "Pool pre-warm connect failed");
                        break; // upstream not yet up — stop trying this addr
                    }
                }
            }
            if !queue.is_empty() {
                tracing::info!(addr = %addr, conns = queue.len(), "Pool pre-warmed");
            }
        }
    }
}

// ── Response building helpers ─────────────────────────────────

/// Build HTTP response into a buffer (no format! overhead).
pub fn build_response(buf: &mut Vec<u8>, status: u16, headers: &[(String, String)], body: &[u8]) {
    buf.clear();
    buf.extend_from_slice(b"HTTP/1.1 ");
    let mut itoa_buf = itoa::Buffer::new();
    buf.extend_from_slice(itoa_buf.format(status).as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(status_text(status).as_bytes());
    buf.extend_from_slice(b"\r\ncontent-length: ");
    buf.extend_from_slice(itoa_buf.format(body.len()).as_bytes());
    buf.extend_from_slice(b"\r\nconnection: keep-alive\r\n");
    for (k, v) in headers {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(body);
}

/// Build upstream HTTP request into a buffer. Zero-copy from &str refs.
pub fn build_upstream_request(
    buf: &mut Vec<u8>,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) {
    buf.clear();
    buf.extend_from_slice(method.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(path.as_bytes());
    buf.extend_from_slice(b" HTTP/1.1\r\n");
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("connection")
            || name.eq_ignore_ascii_case("keep-alive")
            || name.eq_ignore_ascii_case("transfer-encoding")
            || name.eq_ignore_ascii_case("upgrade")
        {
            continue;
        }
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"connection: keep-alive\r\n");
    if !body.is_empty() {
        buf.extend_from_slice(b"content-length: ");
        let mut itoa_buf = itoa::Buffer::new();
        buf.extend_from_slice(itoa_buf.format(body.len()).as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"\r\n");
    if !body.is_empty() {
        buf.extend_from_slice(body);
    }
}

pub fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}
