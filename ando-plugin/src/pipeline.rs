use crate::plugin::{Phase, PluginContext, PluginInstance, PluginResult};
use tracing::{debug, error};

/// One plugin compiled against its route-level configuration, kept
/// alongside the phases it actually participates in (sorted by priority,
/// highest first) so the pipeline doesn't need to re-consult the plugin
/// each time.
struct Compiled {
    instance: Box<dyn PluginInstance>,
    phases: Vec<Phase>,
}

/// The plugin execution pipeline for a single route.
///
/// Built once per route (and rebuilt on config reload), then shared
/// read-only across every request that route handles. Plugins run in
/// priority order within a phase and short-circuit on the first
/// `Response` or `Error`.
pub struct PluginPipeline {
    compiled: Vec<Compiled>,
}

impl PluginPipeline {
    /// Build a pipeline from `(instance, phases)` pairs, already sorted by
    /// the caller's configured priority (highest first).
    pub fn new(mut instances: Vec<(Box<dyn PluginInstance>, Vec<Phase>)>) -> Self {
        instances.sort_by(|a, b| b.0.priority().cmp(&a.0.priority()));
        let compiled = instances
            .into_iter()
            .map(|(instance, phases)| Compiled { instance, phases })
            .collect();
        Self { compiled }
    }

    fn run_phase(&self, phase: Phase, ctx: &mut PluginContext) -> PluginResult {
        for c in &self.compiled {
            if !c.phases.contains(&phase) {
                continue;
            }
            debug!(plugin = %c.instance.name(), phase = %phase, "Executing plugin");
            let result = match phase {
                Phase::Rewrite => c.instance.rewrite(ctx),
                Phase::Access => c.instance.access(ctx),
                Phase::BeforeProxy => c.instance.before_proxy(ctx),
                Phase::HeaderFilter => c.instance.header_filter(ctx),
                Phase::BodyFilter => c.instance.body_filter(ctx),
                Phase::Log => {
                    c.instance.log(ctx);
                    PluginResult::Continue
                }
            };
            match result {
                PluginResult::Continue => {}
                PluginResult::Response { status, headers, body } => {
                    debug!(plugin = %c.instance.name(), phase = %phase, status, "Plugin short-circuited with response");
                    return PluginResult::Response { status, headers, body };
                }
                PluginResult::Error(msg) => {
                    error!(plugin = %c.instance.name(), phase = %phase, error = %msg, "Plugin execution error");
                    return PluginResult::Error(msg);
                }
            }
        }
        PluginResult::Continue
    }

    /// Run a single phase. Lets callers interleave their own logic
    /// between phases that `execute_request_phases` would otherwise run
    /// back-to-back (e.g. the proxy layer's consumer-key lookup, which
    /// has to happen after Access but before BeforeProxy).
    pub fn execute_phase(&self, phase: Phase, ctx: &mut PluginContext) -> PluginResult {
        self.run_phase(phase, ctx)
    }

    /// Whether this pipeline has a plugin that authenticates the
    /// consumer (and so is expected to have stashed a raw key into
    /// `ctx.vars` for the proxy layer to resolve against the consumer
    /// store).
    pub fn has_auth_plugins(&self) -> bool {
        self.compiled
            .iter()
            .any(|c| matches!(c.instance.name(), "key-auth" | "jwt-auth" | "basic-auth"))
    }

    /// Execute all pre-proxy phases in order: Rewrite -> Access -> BeforeProxy.
    pub fn execute_request_phases(&self, ctx: &mut PluginContext) -> PluginResult {
        for phase in &[Phase::Rewrite, Phase::Access, Phase::BeforeProxy] {
            match self.run_phase(*phase, ctx) {
                PluginResult::Continue => {}
                other => return other,
            }
        }
        PluginResult::Continue
    }

    /// Execute response phases: HeaderFilter -> BodyFilter.
    pub fn execute_response_phases(&self, ctx: &mut PluginContext) -> PluginResult {
        for phase in &[Phase::HeaderFilter, Phase::BodyFilter] {
            match self.run_phase(*phase, ctx) {
                PluginResult::Continue => {}
                other => return other,
            }
        }
        PluginResult::Continue
    }

    /// Execute the log phase. Always runs; errors are logged, not returned.
    pub fn execute_log_phase(&self, ctx: &mut PluginContext) {
        for c in &self.compiled {
            if c.phases.contains(&Phase::Log) {
                c.instance.log(ctx);
            }
        }
    }

    /// Number of plugin instances in this pipeline.
    pub fn plugin_count(&self) -> usize {
        self.compiled.len()
    }

    /// Whether any plugin in this pipeline participates in a
    /// response-side phase (HeaderFilter, BodyFilter or Log). Callers
    /// use this to skip populating response data into the context
    /// entirely when nothing would read it.
    pub fn has_response_or_log_phases(&self) -> bool {
        self.compiled.iter().any(|c| {
            c.phases.contains(&Phase::HeaderFilter)
                || c.phases.contains(&Phase::BodyFilter)
                || c.phases.contains(&Phase::Log)
        })
    }
}
