pub mod aggregate;
pub mod buffer;
pub mod chain;
pub mod crypto;
pub mod decorator;
pub mod guard;
pub mod local_notify;
pub mod pipeline;
pub mod plugin;
pub mod queue;
pub mod registry;
pub mod response_rules;
pub mod scripting;
pub mod sse;
pub mod token_limiter;
pub mod transform;
pub mod tunnel;

pub use pipeline::PluginPipeline;
pub use plugin::{Phase, Plugin, PluginContext, PluginInstance, PluginResult};
pub use registry::PluginRegistry;
