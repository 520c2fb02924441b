//! Outcome events and the transitions a flow accepts.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::error::{AuthenticationException, ResolutionError};
use crate::provider::{Provider, ProviderRegistry};
use crate::request::{Authentication, Principal, RegisteredService};

/// Transition ids understood by every login flow.
pub mod transition {
    /// Login completed
    pub const SUCCESS: &str = "success";
    /// Login completed but the user should be warned before redirecting
    pub const WARN: &str = "warn";
    /// Resolution could not proceed
    pub const ERROR: &str = "error";
    /// Credentials or policy rejected the request
    pub const AUTHENTICATION_FAILURE: &str = "authenticationFailure";
}

/// Attribute keys attached to outcome events.
pub mod attribute {
    /// The resolved [`Principal`](crate::Principal)
    pub const PRINCIPAL: &str = "principal";
    /// The matched [`RegisteredService`](crate::RegisteredService)
    pub const REGISTERED_SERVICE: &str = "registeredService";
    /// The activated [`Provider`](crate::Provider)
    pub const PROVIDER: &str = "provider";
    /// An existing [`Authentication`](crate::Authentication)
    pub const AUTHENTICATION: &str = "authentication";
    /// The [`AuthenticationException`](crate::AuthenticationException) behind a failure
    pub const ERROR: &str = "error";
}

/// A value attached to an outcome event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    /// A principal
    Principal(Principal),
    /// A registered service
    RegisteredService(RegisteredService),
    /// A multifactor provider
    Provider(Provider),
    /// An authentication
    Authentication(Authentication),
    /// A failure explanation
    Error(AuthenticationException),
    /// Free-form text
    Text(String),
}

/// The single decision produced by one resolution call.
///
/// Callers dispatch on [`id`](OutcomeEvent::id) to drive their own flow:
/// render a second-factor prompt, finalize the session, or show an error.
///
/// # Examples
///
/// ```
/// use outcome_core::{OutcomeEvent, AttributeValue, transition};
///
/// let event = OutcomeEvent::new(transition::SUCCESS)
///     .with_attribute("note", AttributeValue::Text("fresh login".to_string()));
///
/// assert!(event.is(transition::SUCCESS));
/// assert!(event.attribute("note").is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeEvent {
    id: String,
    attributes: BTreeMap<String, AttributeValue>,
}

impl OutcomeEvent {
    /// Creates an event without attributes.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Creates a `success` event.
    pub fn success() -> Self {
        Self::new(transition::SUCCESS)
    }

    /// Creates an `authenticationFailure` event carrying the given cause.
    pub fn failure(error: AuthenticationException) -> Self {
        Self::new(transition::AUTHENTICATION_FAILURE)
            .with_attribute(attribute::ERROR, AttributeValue::Error(error))
    }

    /// Creates an `error` event carrying the given cause.
    pub fn error(error: AuthenticationException) -> Self {
        Self::new(transition::ERROR).with_attribute(attribute::ERROR, AttributeValue::Error(error))
    }

    /// Attaches an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Returns the transition id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns true if the event has the given id.
    pub fn is(&self, id: &str) -> bool {
        self.id == id
    }

    /// Returns all attributes.
    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    /// Returns one attribute.
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Returns the attached failure explanation, if any.
    pub fn error_attribute(&self) -> Option<&AuthenticationException> {
        match self.attributes.get(attribute::ERROR) {
            Some(AttributeValue::Error(e)) => Some(e),
            _ => None,
        }
    }

    /// Returns the attached provider, if any.
    pub fn provider_attribute(&self) -> Option<&Provider> {
        match self.attributes.get(attribute::PROVIDER) {
            Some(AttributeValue::Provider(p)) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for OutcomeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutcomeEvent[id={}", self.id)?;
        if !self.attributes.is_empty() {
            let keys: Vec<&str> = self.attributes.keys().map(String::as_str).collect();
            write!(f, ", attributes={}", keys.join(","))?;
        }
        write!(f, "]")
    }
}

/// The provider transitions the surrounding flow accepts.
///
/// Built-in ids (`success`, `warn`, `error`, `authenticationFailure`) are
/// always understood by the flow but are never legal provider ids: a provider
/// activating under one of those names would be indistinguishable from a
/// plain outcome. Any provider id outside the table aborts resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionTable {
    providers: BTreeSet<String>,
}

impl TransitionTable {
    /// Creates a table with no provider transitions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table with one transition per registered provider.
    pub fn for_providers(registry: &ProviderRegistry) -> Self {
        registry
            .providers()
            .fold(Self::new(), |table, provider| table.with_transition(provider.id.clone()))
    }

    /// Adds a provider transition id.
    ///
    /// Built-in ids are ignored; they can never name a provider.
    pub fn with_transition(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !Self::is_builtin(&id) {
            self.providers.insert(id);
        }
        self
    }

    /// Returns true if `id` is one of the built-in transitions.
    pub fn is_builtin(id: &str) -> bool {
        [
            transition::SUCCESS,
            transition::WARN,
            transition::ERROR,
            transition::AUTHENTICATION_FAILURE,
        ]
        .contains(&id)
    }

    /// Returns true if the flow accepts `id`, built-in or provider.
    pub fn contains(&self, id: &str) -> bool {
        Self::is_builtin(id) || self.providers.contains(id)
    }

    /// Returns true if `id` is a provider transition.
    pub fn has_provider(&self, id: &str) -> bool {
        self.providers.contains(id)
    }

    /// Checks that a provider id is a legal provider transition.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::MisconfiguredTransition`] for ids that are
    /// not registered provider transitions, built-in ids included.
    pub fn validate(&self, provider_id: &str) -> Result<(), ResolutionError> {
        if self.has_provider(provider_id) {
            Ok(())
        } else {
            Err(ResolutionError::MisconfiguredTransition {
                provider_id: provider_id.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_event_carries_error_attribute() {
        let event = OutcomeEvent::failure(AuthenticationException::of_kind("Bad", "bad"));
        assert!(event.is(transition::AUTHENTICATION_FAILURE));
        assert_eq!(event.error_attribute().unwrap().message(), "bad");
    }

    #[test]
    fn display_lists_attribute_keys() {
        let event = OutcomeEvent::success()
            .with_attribute(attribute::PRINCIPAL, AttributeValue::Principal(Principal::new("u")));
        assert_eq!(event.to_string(), "OutcomeEvent[id=success, attributes=principal]");
    }

    #[test]
    fn table_rejects_unknown_provider() {
        let table = TransitionTable::new().with_transition("mfa-duo");
        assert!(table.validate("mfa-duo").is_ok());
        assert!(matches!(
            table.validate("mfa-nope"),
            Err(ResolutionError::MisconfiguredTransition { provider_id }) if provider_id == "mfa-nope"
        ));
    }

    #[test]
    fn table_for_providers_accepts_builtins_but_not_as_providers() {
        let registry = ProviderRegistry::new(vec![Provider::new("mfa-gauth", 2)]);
        let table = TransitionTable::for_providers(&registry);
        assert!(table.contains(transition::SUCCESS));
        assert!(table.contains("mfa-gauth"));
        assert!(table.validate("mfa-gauth").is_ok());

        for builtin in [transition::SUCCESS, transition::WARN, transition::ERROR] {
            assert!(matches!(
                table.validate(builtin),
                Err(ResolutionError::MisconfiguredTransition { provider_id }) if provider_id == builtin
            ));
        }
    }

    #[test]
    fn builtin_ids_never_become_provider_transitions() {
        let registry = ProviderRegistry::new(vec![Provider::new(transition::SUCCESS, 1)]);
        let table = TransitionTable::for_providers(&registry).with_transition(transition::WARN);
        assert!(!table.has_provider(transition::SUCCESS));
        assert!(!table.has_provider(transition::WARN));
        assert!(table.validate(transition::SUCCESS).is_err());
    }

    #[test]
    fn event_serializes_to_json() {
        let event = OutcomeEvent::new("mfa-duo")
            .with_attribute(attribute::PROVIDER, AttributeValue::Provider(Provider::new("mfa-duo", 1)));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["id"], "mfa-duo");
        assert_eq!(json["attributes"]["provider"]["type"], "provider");
        assert_eq!(json["attributes"]["provider"]["value"]["rank"], 1);
    }
}
