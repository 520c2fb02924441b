//! Declarative engine configuration.
//!
//! An [`EngineConfig`] is a materialized snapshot, usually deserialized from
//! JSON, that builds the provider registry, the transition table, the risk
//! policy and the trigger set. Loading and watching the document is the
//! embedding application's concern.
//!
//! ```json
//! {
//!   "providers": [{"id": "mfa-duo", "rank": 1}, {"id": "mfa-gauth", "rank": 2}],
//!   "risk": {"reject_browsers": "(?i)msie"},
//!   "triggers": {
//!     "composition": "ranked",
//!     "principal_attribute": {"name": "memberOf", "pattern": "admins", "provider": "mfa-duo"},
//!     "scripted": {"failure_mode": "fail_closed", "rules": {"rules": []}}
//!   }
//! }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;

use crate::engine::ResolutionChain;
use crate::error::ConfigError;
use crate::event::TransitionTable;
use crate::hooks::HookDispatcher;
use crate::provider::{Provider, ProviderRegistry, ProviderSelector, RankedProviderSelector};
use crate::registry::{ServiceRegistry, TicketRegistry};
use crate::resolver::{
    InitialAuthenticationResolver, MultifactorEventResolver, ServiceTicketRequestResolver,
};
use crate::risk::{AdaptivePolicy, AllowAll, DefaultAdaptivePolicy, GeoLocator, NoGeoLocator};
use crate::script::{ReloadablePolicy, RulePolicy, ScriptFailureMode, ScriptedTrigger};
use crate::trigger::{
    CompositeTrigger, CompositionMode, GlobalTrigger, PrincipalAttributeTrigger,
    RegisteredServiceTrigger, RequestParameterTrigger, DEFAULT_AUTHN_METHOD_PARAMETER,
};

/// Root configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Known multifactor providers
    pub providers: Vec<Provider>,
    /// Risk gate rules
    pub risk: RiskConfig,
    /// Multifactor trigger set
    pub triggers: TriggerConfig,
}

/// Rules of the default adaptive policy. With no rule the gate admits
/// everything.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RiskConfig {
    /// User agents matching this pattern are denied
    pub reject_browsers: Option<String>,
    /// Locations whose resolved address matches this pattern are denied
    pub reject_locations: Option<String>,
}

/// The triggers to compose, evaluated in this order: global, principal
/// attribute, registered service, request parameter, scripted.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TriggerConfig {
    /// How activated triggers are combined
    pub composition: CompositionMode,
    /// Provider required for every login
    pub global_provider: Option<String>,
    /// Provider required when a principal attribute matches
    pub principal_attribute: Option<PrincipalAttributeRule>,
    /// Honor the providers listed on registered services
    pub registered_service: bool,
    /// Request parameter naming a provider; `null` disables it
    pub request_parameter: Option<String>,
    /// Header consulted when the parameter is absent
    pub request_header: Option<String>,
    /// Scripted rule policy
    pub scripted: Option<ScriptedConfig>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            composition: CompositionMode::default(),
            global_provider: None,
            principal_attribute: None,
            registered_service: true,
            request_parameter: Some(DEFAULT_AUTHN_METHOD_PARAMETER.to_string()),
            request_header: None,
            scripted: None,
        }
    }
}

/// Principal attribute rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrincipalAttributeRule {
    /// Attribute name
    pub name: String,
    /// Pattern any value must match
    pub pattern: String,
    /// Provider to activate
    pub provider: String,
}

/// Scripted policy settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptedConfig {
    /// Handling of evaluation faults
    #[serde(default)]
    pub failure_mode: ScriptFailureMode,
    /// Initial rule document
    pub rules: serde_json::Value,
}

/// Runtime collaborators a configuration is wired to.
pub struct Collaborators {
    services: Arc<dyn ServiceRegistry>,
    tickets: Option<Arc<dyn TicketRegistry>>,
    locator: Arc<dyn GeoLocator>,
    selector: Arc<dyn ProviderSelector>,
    hooks: HookDispatcher,
}

impl Collaborators {
    /// Starts from a service registry; no ticket registry, no geolocator,
    /// ranked selection and no listeners.
    pub fn new(services: Arc<dyn ServiceRegistry>) -> Self {
        Self {
            services,
            tickets: None,
            locator: Arc::new(NoGeoLocator),
            selector: Arc::new(RankedProviderSelector),
            hooks: HookDispatcher::new(),
        }
    }

    /// Enables the service-ticket short-circuit against `tickets`.
    pub fn tickets(mut self, tickets: Arc<dyn TicketRegistry>) -> Self {
        self.tickets = Some(tickets);
        self
    }

    /// Sets the geolocator used by location rules.
    pub fn locator(mut self, locator: Arc<dyn GeoLocator>) -> Self {
        self.locator = locator;
        self
    }

    /// Sets the provider selector.
    pub fn selector(mut self, selector: Arc<dyn ProviderSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Sets the hook dispatcher.
    pub fn hooks(mut self, hooks: HookDispatcher) -> Self {
        self.hooks = hooks;
        self
    }
}

/// A chain built from configuration.
#[derive(Debug)]
pub struct ConfiguredChain {
    /// The resolution chain
    pub chain: ResolutionChain,
    /// Handle for hot-reloading the scripted policy, if one is configured
    pub scripted_policy: Option<Arc<ReloadablePolicy>>,
}

impl EngineConfig {
    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed documents.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(document)?)
    }

    /// Builds the provider registry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for blank or duplicate provider ids,
    /// and for ids that collide with a built-in transition.
    pub fn provider_registry(&self) -> Result<ProviderRegistry, ConfigError> {
        let mut seen = BTreeSet::new();
        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                return Err(ConfigError::Invalid("provider id must not be blank".to_string()));
            }
            if TransitionTable::is_builtin(&provider.id) {
                return Err(ConfigError::Invalid(format!(
                    "provider [{}] collides with a built-in transition",
                    provider.id
                )));
            }
            if !seen.insert(provider.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "provider [{}] is declared more than once",
                    provider.id
                )));
            }
        }
        Ok(ProviderRegistry::new(self.providers.iter().cloned()))
    }

    /// Builds the transition table holding every provider id.
    ///
    /// # Errors
    ///
    /// See [`provider_registry`](EngineConfig::provider_registry).
    pub fn transitions(&self) -> Result<TransitionTable, ConfigError> {
        Ok(TransitionTable::for_providers(&self.provider_registry()?))
    }

    /// Builds the risk gate policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Pattern`] for invalid patterns.
    pub fn adaptive_policy(
        &self,
        locator: Arc<dyn GeoLocator>,
    ) -> Result<Arc<dyn AdaptivePolicy>, ConfigError> {
        let risk = &self.risk;
        if risk.reject_browsers.is_none() && risk.reject_locations.is_none() {
            return Ok(Arc::new(AllowAll));
        }

        let mut policy = DefaultAdaptivePolicy::new(locator);
        if let Some(pattern) = &risk.reject_browsers {
            policy = policy.reject_browsers(pattern)?;
        }
        if let Some(pattern) = &risk.reject_locations {
            policy = policy.reject_locations(pattern)?;
        }
        Ok(Arc::new(policy))
    }

    /// Builds the composite trigger and, when configured, the reloadable
    /// scripted policy backing it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for invalid patterns or rule documents, and
    /// [`ConfigError::Invalid`] when a trigger names an unregistered provider.
    pub fn trigger(
        &self,
        registry: Arc<ProviderRegistry>,
        selector: Arc<dyn ProviderSelector>,
    ) -> Result<(CompositeTrigger, Option<Arc<ReloadablePolicy>>), ConfigError> {
        let triggers = &self.triggers;
        let mut composite = CompositeTrigger::new(triggers.composition, selector.clone());

        if let Some(id) = &triggers.global_provider {
            let provider = registered(&registry, "global_provider", id)?;
            composite.push(Box::new(GlobalTrigger::new(provider)));
        }
        if let Some(rule) = &triggers.principal_attribute {
            composite.push(Box::new(PrincipalAttributeTrigger::new(
                rule.name.clone(),
                &rule.pattern,
                registered(&registry, "principal_attribute.provider", &rule.provider)?,
            )?));
        }
        if triggers.registered_service {
            composite.push(Box::new(RegisteredServiceTrigger::new(registry.clone(), selector)));
        }
        if let Some(parameter) = &triggers.request_parameter {
            let mut trigger = RequestParameterTrigger::new(registry.clone()).with_parameter(parameter.clone());
            if let Some(header) = &triggers.request_header {
                trigger = trigger.with_header(header.clone());
            }
            composite.push(Box::new(trigger));
        }

        let mut scripted_policy = None;
        if let Some(scripted) = &triggers.scripted {
            let rules = RulePolicy::from_value(scripted.rules.clone(), (*registry).clone())?;
            let policy = Arc::new(ReloadablePolicy::new(rules));
            composite.push(Box::new(ScriptedTrigger::new(policy.clone(), scripted.failure_mode)));
            scripted_policy = Some(policy);
        }

        Ok((composite, scripted_policy))
    }

    /// Wires a complete resolution chain.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any part of the configuration is invalid.
    pub fn build_chain(&self, collaborators: Collaborators) -> Result<ConfiguredChain, ConfigError> {
        let registry = Arc::new(self.provider_registry()?);
        let transitions = Arc::new(TransitionTable::for_providers(&registry));
        let adaptive_policy = self.adaptive_policy(collaborators.locator)?;
        let (trigger, scripted_policy) = self.trigger(registry, collaborators.selector)?;

        let mut initial = InitialAuthenticationResolver::new(collaborators.services.clone());
        if !trigger.is_empty() {
            tracing::debug!(triggers = ?trigger.trigger_names(), "multifactor triggers configured");
            initial = initial.with_resolver(Arc::new(MultifactorEventResolver::new(
                collaborators.services,
                Arc::new(trigger),
                transitions,
            )));
        }

        let mut builder = ResolutionChain::builder(initial)
            .adaptive_policy(adaptive_policy)
            .hooks(collaborators.hooks);
        if let Some(tickets) = collaborators.tickets {
            builder = builder.short_circuit(Arc::new(ServiceTicketRequestResolver::new(tickets)));
        }

        Ok(ConfiguredChain {
            chain: builder.build(),
            scripted_policy,
        })
    }
}

fn registered(registry: &ProviderRegistry, field: &str, id: &str) -> Result<Provider, ConfigError> {
    registry.get(id).cloned().ok_or_else(|| {
        ConfigError::Invalid(format!("{field} names unregistered provider [{id}]"))
    })
}
