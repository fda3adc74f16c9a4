//! Shared application state for the Axum server (§6).
//!
//! The REST/WS router is a thin translation layer over the core
//! components — it never owns state itself, only clones of the handles
//! the daemon's bootstrap already built.

use std::sync::Arc;

use crate::config::ConfigHandle;
use crate::deploy_history::DeployHistory;
use crate::notifications::NotificationBus;
use crate::registry::DeviceRegistry;
use crate::task_executor::TaskExecutorHandle;

/// Shared application state, wrapped for Axum handler extraction.
#[derive(Clone)]
pub struct AppState {
    pub registry: DeviceRegistry,
    pub config: ConfigHandle,
    pub executor: TaskExecutorHandle,
    pub history: Arc<DeployHistory>,
    pub notifications: NotificationBus,
}

/// Builds an in-memory `AppState` with no configured devices. Used by every
/// route module's test suite so each can stand up a router without a real
/// config file or MQTT broker.
#[cfg(test)]
pub fn test_state() -> AppState {
    use crate::config::{GlobalConfiguration, InMemory};
    use crate::task_executor;

    let notifications = NotificationBus::new();
    let history = Arc::new(DeployHistory::new());
    let (executor, _join) = task_executor::spawn(history.clone(), notifications.clone());
    AppState {
        registry: DeviceRegistry::new(),
        config: ConfigHandle::new(GlobalConfiguration::default(), Arc::new(InMemory::new())),
        executor,
        history,
        notifications,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn state_clones_share_the_same_registry() {
        let state = test_state();
        let other = state.clone();
        assert!(other.registry.list().await.is_empty());
    }
}
