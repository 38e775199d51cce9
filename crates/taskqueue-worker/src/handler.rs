use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use taskqueue_core::TaskPayload;

/// A handler's outcome: the result payload, or a stringified error. Never a
/// panic — unregistered names and handler errors alike become a task
/// failure in the worker loop, not a propagated exception.
pub type HandlerResult = Result<TaskPayload, String>;

/// Business logic for one task name. Registered statically at worker
/// construction (see `HandlerRegistry`) rather than discovered by
/// filesystem walk — the re-architecture SPEC_FULL.md §4.3 calls for.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn execute(&self, payload: TaskPayload) -> HandlerResult;
}

/// Maps task names to handlers. A single `register` entry point collapses
/// the original's decorator/`add_handler` dual registration styles — see
/// DESIGN.md.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry::default()
    }

    pub fn register<H: TaskHandler + 'static>(&self, name: impl Into<String>, handler: H) {
        self.handlers.write().insert(name.into(), Arc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }
}

/// Echoes its payload back unchanged. A template/demo handler, not a
/// spec-mandated component — per-task business handlers are an external
/// collaborator (spec.md §1's Non-goals).
pub struct EchoHandler;

#[async_trait]
impl TaskHandler for EchoHandler {
    async fn execute(&self, payload: TaskPayload) -> HandlerResult {
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[tokio::test]
    async fn echo_handler_returns_input() {
        let mut payload = Map::new();
        payload.insert("v".to_string(), json!(42));
        let result = EchoHandler.execute(payload.clone()).await.unwrap();
        assert_eq!(result, payload);
    }

    #[test]
    fn registry_looks_up_by_name() {
        let registry = HandlerRegistry::new();
        registry.register("echo", EchoHandler);

        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["echo".to_string()]);
    }
}
