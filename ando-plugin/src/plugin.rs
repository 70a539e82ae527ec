use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;

/// Plugin execution phases, matching APISIX's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Modify request before routing takes place
    Rewrite = 0,
    /// Authentication, authorization, rate limiting
    Access = 1,
    /// Just before proxying to upstream
    BeforeProxy = 2,
    /// Modify response headers from upstream
    HeaderFilter = 3,
    /// Modify response body from upstream
    BodyFilter = 4,
    /// Post-response logging (non-blocking)
    Log = 5,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Rewrite => "rewrite",
            Phase::Access => "access",
            Phase::BeforeProxy => "before_proxy",
            Phase::HeaderFilter => "header_filter",
            Phase::BodyFilter => "body_filter",
            Phase::Log => "log",
        }
    }

    pub fn all() -> &'static [Phase] {
        &[
            Phase::Rewrite,
            Phase::Access,
            Phase::BeforeProxy,
            Phase::HeaderFilter,
            Phase::BodyFilter,
            Phase::Log,
        ]
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of plugin execution.
#[derive(Debug)]
pub enum PluginResult {
    /// Continue to the next plugin / phase
    Continue,

    /// Short-circuit with a response (e.g., 401, 403, 429)
    Response {
        status: u16,
        headers: Vec<(String, String)>,
        body: Option<Vec<u8>>,
    },

    /// Error during plugin execution
    Error(String),
}

/// The authenticated principal for a request, set by at most one
/// authenticator plugin and read-only thereafter.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub client_id: String,
    pub auth_type: String,
    pub claims: HashMap<String, Value>,
}

/// Mutable context passed through the plugin pipeline for each request.
///
/// This is the per-request "variable context": a bag of identity, timing,
/// routing, and scratch data that every plugin reads and writes. It is the
/// Rust-side representation of the request/response data that the Lua PDK
/// also exposes.
pub struct PluginContext {
    /// Assigned once on entry; mirrored to the `X-Request-ID` header.
    /// Non-empty and immutable after assignment.
    pub request_id: String,

    // --- Request data ---
    pub method: String,
    pub path: String,
    pub query: String,
    pub request_headers: HashMap<String, String>,
    pub request_body: Option<Vec<u8>>,

    /// Path parameters from router matching.
    pub path_params: HashMap<String, String>,

    /// Client IP address
    pub client_ip: String,

    // --- Response data (populated after upstream response) ---
    pub response_status: Option<u16>,
    pub response_headers: HashMap<String, String>,
    pub response_body: Option<Vec<u8>>,
    pub body_bytes_sent: u64,

    // --- Plugin data ---
    /// Shared scratch bag between plugins. Modules append; by convention keys
    /// are prefixed with the owning module's name to avoid collisions.
    /// Modules must not delete another module's keys.
    pub vars: HashMap<String, Value>,

    /// Consumer/client id identified by an auth plugin (back-compat alias of
    /// `identity.client_id`, kept because most auth plugins set it directly).
    pub consumer: Option<String>,

    /// Full authenticated identity. Set by at most one authenticator plugin
    /// and read-only thereafter.
    pub identity: Option<Identity>,

    /// Tenant the request belongs to, if resolved.
    pub tenant_id: Option<String>,

    /// Route matched for this request.
    pub route_id: String,

    /// Service ID (if any)
    pub service_id: Option<String>,

    /// Upstream address actually dialed for this request.
    pub upstream_addr: Option<String>,

    // --- Timing ---
    pub request_start: Instant,
}

impl PluginContext {
    pub fn new(
        route_id: String,
        client_ip: String,
        method: String,
        path: String,
        headers: HashMap<String, String>,
    ) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            method,
            path,
            query: String::new(),
            request_headers: headers,
            request_body: None,
            path_params: HashMap::new(),
            client_ip,
            response_status: None,
            response_headers: HashMap::new(),
            response_body: None,
            body_bytes_sent: 0,
            vars: HashMap::new(),
            consumer: None,
            identity: None,
            tenant_id: None,
            route_id,
            service_id: None,
            upstream_addr: None,
            request_start: Instant::now(),
        }
    }

    /// Get a request header (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        let lower = name.to_lowercase();
        self.request_headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == lower)
            .map(|(_, v)| v.as_str())
    }

    /// Set a request header.
    pub fn set_header(&mut self, name: String, value: String) {
        self.request_headers.insert(name, value);
    }

    /// Remove a request header.
    pub fn remove_header(&mut self, name: &str) {
        let lower = name.to_lowercase();
        self.request_headers
            .retain(|k, _| k.to_lowercase() != lower);
    }

    /// Set a response header.
    pub fn set_response_header(&mut self, name: String, value: String) {
        self.response_headers.insert(name, value);
    }

    /// Get elapsed time since request start.
    pub fn elapsed_ms(&self) -> f64 {
        self.request_start.elapsed().as_secs_f64() * 1000.0
    }

    /// Set a context variable (shared between plugins).
    pub fn set_var(&mut self, key: String, value: Value) {
        self.vars.insert(key, value);
    }

    /// Get a context variable.
    pub fn get_var(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Record the authenticated identity. Only the first authenticator to
    /// call this wins in practice, since plugin ordering places at most one
    /// auth plugin before anything that would read `identity`.
    pub fn set_identity(&mut self, client_id: String, auth_type: &str, claims: HashMap<String, Value>) {
        self.consumer = Some(client_id.clone());
        self.identity = Some(Identity {
            client_id,
            auth_type: auth_type.to_string(),
            claims,
        });
    }
}

/// A plugin factory: validates and compiles its own config into a
/// `PluginInstance`. Implementations are stateless; all per-route state
/// lives in the returned instance.
pub trait Plugin: Send + Sync {
    /// Plugin name (must be unique)
    fn name(&self) -> &str;

    /// Plugin priority (higher = executed first within a phase)
    fn priority(&self) -> i32 {
        0
    }

    /// Which phases this plugin participates in.
    fn phases(&self) -> &[Phase] {
        &[Phase::Access]
    }

    /// Validate and compile plugin configuration into a route-bound instance.
    fn configure(&self, config: &Value) -> anyhow::Result<Box<dyn PluginInstance>>;
}

/// A plugin compiled against one route's configuration. Every hook has a
/// no-op default so a plugin only needs to implement the phases it
/// declared via `Plugin::phases`.
pub trait PluginInstance: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    fn rewrite(&self, ctx: &mut PluginContext) -> PluginResult {
        let _ = ctx;
        PluginResult::Continue
    }

    fn access(&self, ctx: &mut PluginContext) -> PluginResult {
        let _ = ctx;
        PluginResult::Continue
    }

    fn before_proxy(&self, ctx: &mut PluginContext) -> PluginResult {
        let _ = ctx;
        PluginResult::Continue
    }

    fn header_filter(&self, ctx: &mut PluginContext) -> PluginResult {
        let _ = ctx;
        PluginResult::Continue
    }

    fn body_filter(&self, ctx: &mut PluginContext) -> PluginResult {
        let _ = ctx;
        PluginResult::Continue
    }

    /// Always runs, after the response has been written. Errors are logged,
    /// never surfaced to the client.
    fn log(&self, ctx: &mut PluginContext) {
        let _ = ctx;
    }
}
