use dashmap::DashMap;
use std::sync::Arc;

/// Generic keyed registry `routeID -> T`, used uniformly by every
/// per-route feature (queues, tunnels, token-limiter windows, pipelines,
/// ...). One abstraction instead of one bespoke map per module.
///
/// Backed by `DashMap`: read-mostly in steady state, concurrent-safe
/// writes during config (re)load. `Lookup` is the hot path; `Add` runs
/// during startup/hot-reload.
pub struct RouteManager<T> {
    entries: DashMap<String, Arc<T>>,
}

impl<T> RouteManager<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Install or replace the value for a route. Called during
    /// configuration load/hot-reload.
    pub fn add(&self, route_id: impl Into<String>, value: T) {
        self.entries.insert(route_id.into(), Arc::new(value));
    }

    /// Hot-path lookup. Returns a cheap `Arc` clone and a found flag.
    pub fn lookup(&self, route_id: &str) -> Option<Arc<T>> {
        self.entries.get(route_id).map(|e| Arc::clone(e.value()))
    }

    /// Remove a route's entry (e.g. on route deletion during reload).
    pub fn remove(&self, route_id: &str) -> Option<Arc<T>> {
        self.entries.remove(route_id).map(|(_, v)| v)
    }

    /// Snapshot of every registered route ID.
    pub fn route_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Visit each `(route_id, value)` pair.
    pub fn for_each(&self, mut f: impl FnMut(&str, &T)) {
        for entry in self.entries.iter() {
            f(entry.key(), entry.value());
        }
    }

    /// Apply a projection to every entry, returning a `route_id -> stat`
    /// snapshot. Used by admin/observability surfaces to expose
    /// per-route counters without holding a lock across the whole scan.
    pub fn collect_stats<S>(&self, mut project: impl FnMut(&T) -> S) -> std::collections::HashMap<String, S> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), project(e.value())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry. Used when a router reload invalidates all
    /// per-route state built against the previous config generation.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl<T> Default for RouteManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_lookup_finds_value() {
        let m: RouteManager<u32> = RouteManager::new();
        m.add("r1", 42);
        assert_eq!(*m.lookup("r1").unwrap(), 42);
        assert!(m.lookup("missing").is_none());
    }

    #[test]
    fn add_replaces_existing_entry() {
        let m: RouteManager<u32> = RouteManager::new();
        m.add("r1", 1);
        m.add("r1", 2);
        assert_eq!(*m.lookup("r1").unwrap(), 2);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn route_ids_and_collect_stats() {
        let m: RouteManager<u32> = RouteManager::new();
        m.add("r1", 10);
        m.add("r2", 20);
        let mut ids = m.route_ids();
        ids.sort();
        assert_eq!(ids, vec!["r1".to_string(), "r2".to_string()]);

        let stats = m.collect_stats(|v| v * 2);
        assert_eq!(stats.get("r1"), Some(&20));
        assert_eq!(stats.get("r2"), Some(&40));
    }

    #[test]
    fn remove_drops_entry() {
        let m: RouteManager<u32> = RouteManager::new();
        m.add("r1", 1);
        assert!(m.remove("r1").is_some());
        assert!(m.lookup("r1").is_none());
    }
}
