//! # Component liveness snapshot.
//!
//! The router marks every component as started when it is spawned and as
//! stopped when its `run` returns. When the shutdown grace period expires,
//! the snapshot names the components that are still stuck.

use std::collections::HashMap;

use tokio::sync::RwLock;

/// Thread-safe record of which components are currently running.
pub(crate) struct Roster {
    state: RwLock<HashMap<String, bool>>,
}

impl Roster {
    /// Creates an empty roster.
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
        }
    }

    /// Marks a component as running.
    pub(crate) async fn mark_started(&self, name: &str) {
        self.state.write().await.insert(name.to_string(), true);
    }

    /// Marks a component as stopped.
    pub(crate) async fn mark_stopped(&self, name: &str) {
        self.state.write().await.insert(name.to_string(), false);
    }

    /// Returns the sorted names of components still running.
    pub(crate) async fn snapshot(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut running: Vec<String> = state
            .iter()
            .filter(|(_, alive)| **alive)
            .map(|(name, _)| name.clone())
            .collect();
        running.sort_unstable();
        running
    }

    /// Returns true if the named component is currently running.
    #[cfg(test)]
    pub(crate) async fn is_running(&self, name: &str) -> bool {
        self.state
            .read()
            .await
            .get(name)
            .copied()
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_snapshot_lists_only_running_sorted() {
        let roster = Roster::new();
        roster.mark_started("motor").await;
        roster.mark_started("adc").await;
        roster.mark_started("calc").await;
        roster.mark_stopped("calc").await;

        assert_eq!(roster.snapshot().await, vec!["adc", "motor"]);
        assert!(roster.is_running("adc").await);
        assert!(!roster.is_running("calc").await);
        assert!(!roster.is_running("panel").await);
    }
}
