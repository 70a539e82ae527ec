pub mod config;
pub mod consumer;
pub mod error;
pub mod manager;
pub mod plugin_config;
pub mod route;
pub mod router;
pub mod service;
pub mod ssl;
pub mod upstream;

pub use config::AndoConfig;
pub use error::AndoError;
pub use manager::RouteManager;
pub use route::Route;
pub use router::Router;
pub use service::Service;
pub use upstream::Upstream;
