//! Per-scope controller registry.

use crate::config::PenaltyConfig;
use crate::controller::PenaltyController;
use rungate_core::clock::Clock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Lazily creates and shares one [`PenaltyController`] per scope.
///
/// A scope is typically `provider/model`; unscoped callers share the
/// `"default"` scope.
pub struct PenaltyRegistry {
    config: PenaltyConfig,
    clock: Arc<dyn Clock>,
    controllers: Mutex<HashMap<String, Arc<PenaltyController>>>,
}

impl PenaltyRegistry {
    /// Creates a registry; every controller shares `config` and `clock`.
    pub fn new(config: PenaltyConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            controllers: Mutex::new(HashMap::new()),
        }
    }

    /// Canonical scope string for a provider/model pair.
    pub fn scope_for(provider: Option<&str>, model: Option<&str>) -> String {
        match (provider, model) {
            (Some(p), Some(m)) => format!("{p}/{m}"),
            (Some(p), None) => p.to_string(),
            (None, Some(m)) => m.to_string(),
            (None, None) => "default".to_string(),
        }
    }

    /// The controller for `scope`, creating it on first use.
    pub fn controller(&self, scope: &str) -> Arc<PenaltyController> {
        let mut controllers = self.controllers.lock().expect("registry poisoned");
        Arc::clone(controllers.entry(scope.to_string()).or_insert_with(|| {
            Arc::new(PenaltyController::new(
                self.config.clone(),
                Arc::clone(&self.clock),
            ))
        }))
    }

    /// Scopes that currently have a controller.
    pub fn scopes(&self) -> Vec<String> {
        let controllers = self.controllers.lock().expect("registry poisoned");
        let mut scopes: Vec<String> = controllers.keys().cloned().collect();
        scopes.sort();
        scopes
    }
}

impl std::fmt::Debug for PenaltyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PenaltyRegistry")
            .field("stable", &self.config.stable)
            .field("scopes", &self.scopes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::PenaltyReason;
    use rungate_core::clock::ManualClock;

    #[test]
    fn scope_naming() {
        assert_eq!(
            PenaltyRegistry::scope_for(Some("acme"), Some("m-1")),
            "acme/m-1"
        );
        assert_eq!(PenaltyRegistry::scope_for(Some("acme"), None), "acme");
        assert_eq!(PenaltyRegistry::scope_for(None, None), "default");
    }

    #[test]
    fn controllers_are_shared_per_scope() {
        let clock = ManualClock::shared(0);
        let config = PenaltyConfig::builder()
            .stable(false)
            .max_penalty(5.0)
            .build();
        let registry = PenaltyRegistry::new(config, clock);

        registry.controller("a/m").raise(PenaltyReason::RateLimit);
        assert_eq!(registry.controller("a/m").penalty(), 2.0);
        // a different scope is untouched
        assert_eq!(registry.controller("b/m").penalty(), 0.0);
        assert_eq!(registry.scopes(), vec!["a/m".to_string(), "b/m".to_string()]);
    }
}
