//! Model routing for subagents
//!
//! Picks the model a task runs on. Explicit choices always win; otherwise
//! exploration subagents go to a cheap model and everything else inherits
//! the parent's model. Resolution reads configuration and never mutates it.

use serde::{Deserialize, Serialize};
use sidecar_foundation::{RoutingSettings, SidecarConfig};
use std::sync::Arc;
use tracing::debug;

/// Why a model was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    /// Caller named a model
    ExplicitOverride,

    /// Top-level tasks are never auto-routed
    TopLevelSession,

    /// Routing switched off in configuration
    RoutingDisabled,

    /// Exploration role sent to the low-cost model
    RoutedExplore,

    /// Parent's model reused
    #[default]
    InheritedParent,
}

impl RouteReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExplicitOverride => "explicit_override",
            Self::TopLevelSession => "top_level_session",
            Self::RoutingDisabled => "routing_disabled",
            Self::RoutedExplore => "routed_explore",
            Self::InheritedParent => "inherited_parent",
        }
    }
}

impl std::fmt::Display for RouteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`ModelRouter::resolve`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDecision {
    pub model: String,
    pub was_routed: bool,
    pub reason: RouteReason,
}

/// Source of routing settings
pub trait RoutingConfigProvider: Send + Sync {
    fn routing(&self) -> RoutingSettings;
}

impl RoutingConfigProvider for SidecarConfig {
    fn routing(&self) -> RoutingSettings {
        self.routing.clone()
    }
}

impl RoutingConfigProvider for RoutingSettings {
    fn routing(&self) -> RoutingSettings {
        self.clone()
    }
}

/// Resolves which model a task runs on
#[derive(Clone)]
pub struct ModelRouter {
    config: Arc<dyn RoutingConfigProvider>,
}

impl ModelRouter {
    pub fn new(config: Arc<dyn RoutingConfigProvider>) -> Self {
        Self { config }
    }

    /// Router with default routing settings
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(RoutingSettings::default()))
    }

    /// Decide the model for a task
    ///
    /// Priority: explicit model, top-level task, routing disabled, explore
    /// role, inherited parent model.
    pub fn resolve(
        &self,
        agent_type: &str,
        explicit_model: Option<&str>,
        parent_model: &str,
        is_subagent: bool,
    ) -> RouteDecision {
        let settings = self.config.routing();

        let decision = if let Some(model) = explicit_model.map(str::trim).filter(|m| !m.is_empty())
        {
            RouteDecision {
                model: expand_alias(&settings, model),
                was_routed: false,
                reason: RouteReason::ExplicitOverride,
            }
        } else if !is_subagent {
            inherit(parent_model, RouteReason::TopLevelSession)
        } else if !settings.enabled {
            inherit(parent_model, RouteReason::RoutingDisabled)
        } else if agent_type
            .trim()
            .eq_ignore_ascii_case(settings.explore_agent.trim())
        {
            RouteDecision {
                model: settings.explore_model.clone(),
                was_routed: true,
                reason: RouteReason::RoutedExplore,
            }
        } else {
            inherit(parent_model, RouteReason::InheritedParent)
        };

        debug!(
            agent_type,
            model = %decision.model,
            reason = %decision.reason,
            "Resolved model"
        );
        decision
    }

    /// Expand a short model name through the configured aliases
    pub fn expand(&self, model: &str) -> String {
        expand_alias(&self.config.routing(), model)
    }
}

fn inherit(parent_model: &str, reason: RouteReason) -> RouteDecision {
    RouteDecision {
        model: parent_model.to_string(),
        was_routed: false,
        reason,
    }
}

fn expand_alias(settings: &RoutingSettings, model: &str) -> String {
    settings
        .aliases
        .get(&model.to_ascii_lowercase())
        .cloned()
        .unwrap_or_else(|| model.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> ModelRouter {
        ModelRouter::with_defaults()
    }

    #[test]
    fn test_explore_routed() {
        let d = router().resolve("Explore", None, "A", true);
        assert!(d.was_routed);
        assert_eq!(d.reason, RouteReason::RoutedExplore);
        assert_eq!(d.model, RoutingSettings::default().explore_model);
    }

    #[test]
    fn test_explore_case_insensitive() {
        let d = router().resolve("explore", None, "A", true);
        assert_eq!(d.reason, RouteReason::RoutedExplore);
    }

    #[test]
    fn test_plan_inherits() {
        let d = router().resolve("Plan", None, "A", true);
        assert_eq!(
            d,
            RouteDecision {
                model: "A".into(),
                was_routed: false,
                reason: RouteReason::InheritedParent,
            }
        );
    }

    #[test]
    fn test_explicit_wins() {
        let d = router().resolve("Explore", Some("X"), "A", true);
        assert_eq!(d.model, "X");
        assert!(!d.was_routed);
        assert_eq!(d.reason, RouteReason::ExplicitOverride);
    }

    #[test]
    fn test_blank_explicit_ignored() {
        let d = router().resolve("Explore", Some("  "), "A", true);
        assert_eq!(d.reason, RouteReason::RoutedExplore);
    }

    #[test]
    fn test_explicit_alias_expanded() {
        let mut settings = RoutingSettings::default();
        settings
            .aliases
            .insert("fast".into(), "openrouter/vendor/fast-1".into());
        let router = ModelRouter::new(Arc::new(settings));

        let d = router.resolve("General", Some("fast"), "A", true);
        assert_eq!(d.model, "openrouter/vendor/fast-1");
        assert_eq!(router.expand("unknown/model"), "unknown/model");
    }

    #[test]
    fn test_top_level_never_routed() {
        let d = router().resolve("Explore", None, "A", false);
        assert_eq!(d.model, "A");
        assert_eq!(d.reason, RouteReason::TopLevelSession);
    }

    #[test]
    fn test_routing_disabled() {
        let settings = RoutingSettings {
            enabled: false,
            ..Default::default()
        };
        let d = ModelRouter::new(Arc::new(settings)).resolve("Explore", None, "A", true);
        assert_eq!(d.model, "A");
        assert_eq!(d.reason, RouteReason::RoutingDisabled);
    }

    #[test]
    fn test_custom_agent_inherits() {
        let d = router().resolve("reviewer", None, "A", true);
        assert_eq!(d.reason, RouteReason::InheritedParent);
    }

    #[test]
    fn test_idempotent() {
        let r = router();
        assert_eq!(
            r.resolve("Explore", None, "A", true),
            r.resolve("Explore", None, "A", true)
        );
    }

    #[test]
    fn test_reason_serialization() {
        let json = serde_json::to_string(&RouteReason::RoutedExplore).unwrap();
        assert_eq!(json, "\"routed_explore\"");
    }
}
