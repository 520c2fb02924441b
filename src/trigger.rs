//! Multifactor triggers: predicates that may require a second factor.
//!
//! Triggers are independent and stateless. A [`CompositeTrigger`] runs them in
//! configured order; that order decides which factor is offered when a user
//! qualifies for more than one, so it must stay stable across deployments.

use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;

use crate::error::{ConfigError, TriggerError};
use crate::event::TransitionTable;
use crate::provider::{Provider, ProviderRegistry, ProviderSelector};
use crate::request::{Authentication, RegisteredService, RequestContext, Service};

/// Default request parameter naming a requested provider.
pub const DEFAULT_AUTHN_METHOD_PARAMETER: &str = "authn_method";

/// Everything a trigger may inspect.
#[derive(Debug, Clone, Copy)]
pub struct TriggerInput<'a> {
    /// Current authentication
    pub authentication: &'a Authentication,
    /// Registered service the login is for
    pub registered_service: &'a RegisteredService,
    /// The raw request
    pub request: &'a RequestContext,
    /// Target service as requested
    pub service: &'a Service,
    /// Provider transitions the flow accepts
    pub transitions: &'a TransitionTable,
}

/// A predicate that may activate a secondary-factor provider.
pub trait MultifactorTrigger: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Returns the provider to activate, or `None` to stay out of the way.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::Denied`] when the trigger rejects the request
    /// outright, and [`TriggerError::UnknownProvider`] when it names a
    /// provider that is not registered.
    fn is_activated(&self, input: &TriggerInput<'_>) -> Result<Option<Provider>, TriggerError>;
}

/// Activates one provider for every request.
#[derive(Debug, Clone)]
pub struct GlobalTrigger {
    provider: Provider,
}

impl GlobalTrigger {
    /// Creates a trigger that always activates `provider`.
    pub fn new(provider: Provider) -> Self {
        Self { provider }
    }
}

impl MultifactorTrigger for GlobalTrigger {
    fn name(&self) -> &str {
        "global"
    }

    fn is_activated(&self, _input: &TriggerInput<'_>) -> Result<Option<Provider>, TriggerError> {
        Ok(Some(self.provider.clone()))
    }
}

/// Activates a provider when a principal attribute value matches a pattern.
#[derive(Debug, Clone)]
pub struct PrincipalAttributeTrigger {
    attribute: String,
    pattern: Regex,
    provider: Provider,
}

impl PrincipalAttributeTrigger {
    /// Creates the trigger.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Pattern`] if `pattern` does not compile.
    pub fn new(
        attribute: impl Into<String>,
        pattern: &str,
        provider: Provider,
    ) -> Result<Self, ConfigError> {
        let pattern =
            Regex::new(pattern).map_err(|e| ConfigError::pattern("principal_attribute.pattern", e))?;
        Ok(Self {
            attribute: attribute.into(),
            pattern,
            provider,
        })
    }
}

impl MultifactorTrigger for PrincipalAttributeTrigger {
    fn name(&self) -> &str {
        "principal-attribute"
    }

    fn is_activated(&self, input: &TriggerInput<'_>) -> Result<Option<Provider>, TriggerError> {
        let principal = &input.authentication.principal;
        let matched = principal
            .attribute(&self.attribute)
            .is_some_and(|values| values.iter().any(|v| self.pattern.is_match(v)));

        if matched {
            tracing::debug!(
                principal = %principal.id,
                attribute = %self.attribute,
                provider = %self.provider.id,
                "principal attribute activated provider"
            );
            Ok(Some(self.provider.clone()))
        } else {
            Ok(None)
        }
    }
}

/// Activates the providers a registered service requires.
///
/// When a service lists several providers the selector picks one. Every listed
/// id must be registered, even if a registered sibling would win selection.
pub struct RegisteredServiceTrigger {
    registry: Arc<ProviderRegistry>,
    selector: Arc<dyn ProviderSelector>,
}

impl RegisteredServiceTrigger {
    /// Creates the trigger.
    pub fn new(registry: Arc<ProviderRegistry>, selector: Arc<dyn ProviderSelector>) -> Self {
        Self { registry, selector }
    }
}

impl MultifactorTrigger for RegisteredServiceTrigger {
    fn name(&self) -> &str {
        "registered-service"
    }

    fn is_activated(&self, input: &TriggerInput<'_>) -> Result<Option<Provider>, TriggerError> {
        let service = input.registered_service;
        let providers = service
            .multifactor_providers
            .iter()
            .map(|id| {
                self.registry
                    .get(id)
                    .cloned()
                    .ok_or_else(|| TriggerError::unknown_provider(self.name(), id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.selector.select(&providers, Some(service)))
    }
}

/// Activates the provider named by a request parameter or header.
pub struct RequestParameterTrigger {
    registry: Arc<ProviderRegistry>,
    parameter: String,
    header: Option<String>,
}

impl RequestParameterTrigger {
    /// Creates a trigger reading the `authn_method` parameter.
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            parameter: DEFAULT_AUTHN_METHOD_PARAMETER.to_string(),
            header: None,
        }
    }

    /// Reads a different parameter.
    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameter = parameter.into();
        self
    }

    /// Falls back to a request header when the parameter is absent.
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }
}

impl MultifactorTrigger for RequestParameterTrigger {
    fn name(&self) -> &str {
        "request-parameter"
    }

    fn is_activated(&self, input: &TriggerInput<'_>) -> Result<Option<Provider>, TriggerError> {
        let request = input.request;
        let requested = request
            .parameter(&self.parameter)
            .or_else(|| self.header.as_deref().and_then(|h| request.header(h)))
            .map(str::trim)
            .filter(|id| !id.is_empty());

        requested
            .map(|id| {
                self.registry
                    .get(id)
                    .cloned()
                    .ok_or_else(|| TriggerError::unknown_provider(self.name(), id))
            })
            .transpose()
    }
}

/// How a [`CompositeTrigger`] combines its members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionMode {
    /// The first activating trigger in configured order wins
    #[default]
    FirstMatch,
    /// Every trigger runs; the selector picks among all activated providers
    Ranked,
}

/// Ordered OR-composition of triggers.
///
/// Every provider a member activates is checked against the flow's
/// transitions before selection, so an unknown id fails the composite even
/// when a registered provider would otherwise win.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use outcome_core::{
///     Authentication, CompositeTrigger, CompositionMode, GlobalTrigger, MultifactorTrigger,
///     Principal, Provider, ProviderRegistry, RankedProviderSelector, RegisteredService,
///     RequestContext, Service, TransitionTable, TriggerInput,
/// };
///
/// let trigger = CompositeTrigger::new(CompositionMode::Ranked, Arc::new(RankedProviderSelector))
///     .with_trigger(GlobalTrigger::new(Provider::new("mfa-gauth", 2)))
///     .with_trigger(GlobalTrigger::new(Provider::new("mfa-duo", 1)));
///
/// let authn = Authentication::new(Principal::new("casuser"));
/// let registered = RegisteredService::new(1, "app", ".*");
/// let service = Service::new("https://app.example.org");
/// let request = RequestContext::builder("req-1").build();
/// let transitions = TransitionTable::for_providers(&ProviderRegistry::new(vec![
///     Provider::new("mfa-duo", 1),
///     Provider::new("mfa-gauth", 2),
/// ]));
/// let input = TriggerInput {
///     authentication: &authn,
///     registered_service: &registered,
///     request: &request,
///     service: &service,
///     transitions: &transitions,
/// };
///
/// let provider = trigger.is_activated(&input).unwrap().unwrap();
/// assert_eq!(provider.id, "mfa-duo");
/// ```
pub struct CompositeTrigger {
    mode: CompositionMode,
    selector: Arc<dyn ProviderSelector>,
    triggers: Vec<Box<dyn MultifactorTrigger>>,
}

impl CompositeTrigger {
    /// Creates an empty composite.
    pub fn new(mode: CompositionMode, selector: Arc<dyn ProviderSelector>) -> Self {
        Self {
            mode,
            selector,
            triggers: Vec::new(),
        }
    }

    /// Appends a trigger; triggers run in the order they were added.
    pub fn with_trigger(mut self, trigger: impl MultifactorTrigger + 'static) -> Self {
        self.triggers.push(Box::new(trigger));
        self
    }

    /// Appends an already boxed trigger.
    pub fn push(&mut self, trigger: Box<dyn MultifactorTrigger>) {
        self.triggers.push(trigger);
    }

    /// Returns the member trigger names in evaluation order.
    pub fn trigger_names(&self) -> Vec<&str> {
        self.triggers.iter().map(|t| t.name()).collect()
    }

    /// Returns true if no trigger is configured.
    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}

impl MultifactorTrigger for CompositeTrigger {
    fn name(&self) -> &str {
        "composite"
    }

    fn is_activated(&self, input: &TriggerInput<'_>) -> Result<Option<Provider>, TriggerError> {
        let mut activated = Vec::new();

        for trigger in &self.triggers {
            if let Some(provider) = trigger.is_activated(input)? {
                tracing::debug!(trigger = trigger.name(), provider = %provider.id, "trigger activated");
                if !input.transitions.has_provider(&provider.id) {
                    return Err(TriggerError::unknown_provider(trigger.name(), &provider.id));
                }
                if self.mode == CompositionMode::FirstMatch {
                    return Ok(Some(provider));
                }
                activated.push(provider);
            }
        }

        if activated.len() > 1 {
            tracing::debug!(count = activated.len(), "multiple providers activated; selecting one");
        }
        Ok(self.selector.select(&activated, Some(input.registered_service)))
    }
}
