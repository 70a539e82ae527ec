pub mod cache;

#[cfg(feature = "etcd")]
pub mod etcd;

#[cfg(feature = "etcd")]
pub mod schema;

#[cfg(feature = "etcd")]
pub mod watcher;
