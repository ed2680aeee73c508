//! Registry of job names currently in flight.
//!
//! Presence is keyed by name only. Two live submissions sharing a name hold
//! one entry, and it disappears as soon as either of them finishes.

use std::sync::Arc;

use dashmap::DashSet;

/// Concurrent set of in-flight job names, cheap to clone and share.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    /// Names currently in flight
    names: Arc<DashSet<String>>,
}

impl InFlightRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a name in flight and return a guard that clears it on drop
    pub fn track(&self, name: &str) -> InFlightGuard {
        self.names.insert(name.to_string());
        InFlightGuard {
            registry: self.clone(),
            name: name.to_string(),
        }
    }

    /// Whether the name is currently in flight
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of distinct names in flight
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether nothing is in flight
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Sorted copy of the names in flight
    pub fn snapshot(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.iter().map(|n| n.key().clone()).collect();
        names.sort();
        names
    }
}

/// Removes its name from the registry exactly once, when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: InFlightRegistry,
    name: String,
}

impl InFlightGuard {
    /// The tracked name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.names.remove(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_removes_on_drop() {
        let registry = InFlightRegistry::new();
        let guard = registry.track("j1");
        assert!(registry.contains("j1"));
        assert_eq!(guard.name(), "j1");

        drop(guard);
        assert!(!registry.contains("j1"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let registry = InFlightRegistry::new();
        let _b = registry.track("b");
        let _a = registry.track("a");
        let _c = registry.track("c");
        assert_eq!(registry.snapshot(), vec!["a", "b", "c"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_same_name_cleared_by_first_finisher() {
        let registry = InFlightRegistry::new();
        let first = registry.track("dup");
        let second = registry.track("dup");
        assert_eq!(registry.len(), 1);

        drop(first);
        assert!(!registry.contains("dup"));

        drop(second);
        assert!(registry.is_empty());
    }
}
