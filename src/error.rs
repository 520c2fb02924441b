use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

/// Errors that abort an outcome resolution.
///
/// Authentication failures and policy denials are *not* errors: they are
/// reported as failure [`OutcomeEvent`](crate::OutcomeEvent)s. Only
/// configuration mistakes and collaborator faults the engine cannot map to
/// an outcome surface through this type.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// A trigger activated a provider whose id is not a legal transition in
    /// the current flow. This always indicates deployment misconfiguration.
    #[error("provider '{provider_id}' does not match any transition in the current flow")]
    MisconfiguredTransition {
        /// The provider id that could not be matched
        provider_id: String,
    },

    /// An outcome listener failed while handling the resolved event.
    #[error(transparent)]
    Hook(#[from] HookError),

    /// A resolver collaborator failed.
    #[error("resolver '{resolver}' failed: {message}")]
    Resolver {
        /// Name of the failing resolver
        resolver: String,
        /// Failure description
        message: String,
    },
}

/// Failure raised by an outcome listener.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("listener '{listener}' failed on '{event_id}': {message}")]
pub struct HookError {
    /// Name of the listener that failed
    pub listener: String,
    /// The event id being dispatched
    pub event_id: String,
    /// Failure description
    pub message: String,
}

impl HookError {
    /// Creates a new hook error.
    pub fn new(
        listener: impl Into<String>,
        event_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            listener: listener.into(),
            event_id: event_id.into(),
            message: message.into(),
        }
    }
}

/// A fault raised while evaluating a scripted multifactor policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("policy evaluation failed: {0}")]
pub struct PolicyFault(pub String);

/// Errors a [`MultifactorTrigger`](crate::MultifactorTrigger) may report
/// instead of an activation decision.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TriggerError {
    /// The trigger refuses the request outright.
    #[error("trigger '{trigger}' denied the request: {reason}")]
    Denied {
        /// Name of the denying trigger
        trigger: String,
        /// Why the request was denied
        reason: String,
    },

    /// A policy the trigger depends on could not be evaluated and the
    /// trigger is configured to fail closed.
    #[error("trigger '{trigger}' could not evaluate its policy: {fault}")]
    Unevaluable {
        /// Name of the trigger
        trigger: String,
        /// The evaluation fault
        fault: PolicyFault,
    },

    /// The trigger activated a provider id the flow has no transition for.
    ///
    /// Resolvers surface this as [`ResolutionError::MisconfiguredTransition`]
    /// rather than as a failure outcome.
    #[error("trigger '{trigger}' activated unknown provider '{provider_id}'")]
    UnknownProvider {
        /// Name of the trigger
        trigger: String,
        /// The unregistered provider id
        provider_id: String,
    },
}

impl TriggerError {
    pub(crate) fn unknown_provider(trigger: &str, provider_id: &str) -> Self {
        TriggerError::UnknownProvider {
            trigger: trigger.to_string(),
            provider_id: provider_id.to_string(),
        }
    }

    /// Converts the error into the exception attached to a failure outcome.
    pub fn into_exception(self) -> AuthenticationException {
        let message = self.to_string();
        match self {
            TriggerError::Denied { trigger, .. } => AuthenticationException::single(
                trigger,
                FailureCause::new(failure_kind::UNAUTHORIZED_AUTHENTICATION, message.clone()),
                message,
            ),
            TriggerError::Unevaluable { trigger, .. } => AuthenticationException::single(
                trigger,
                FailureCause::new(failure_kind::POLICY_EVALUATION, message.clone()),
                message,
            ),
            TriggerError::UnknownProvider { trigger, .. } => AuthenticationException::single(
                trigger,
                FailureCause::new(failure_kind::PROVIDER_ABSENT, message.clone()),
                message,
            ),
        }
    }
}

/// Errors produced while building engine components from configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document is not valid JSON for the expected shape.
    #[error("invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),

    /// A configured pattern is not a valid regular expression.
    #[error("invalid pattern for '{field}': {source}")]
    Pattern {
        /// Configuration field holding the pattern
        field: String,
        /// Underlying regex error
        #[source]
        source: regex::Error,
    },

    /// A configuration value refers to something that does not exist.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn pattern(field: impl Into<String>, source: regex::Error) -> Self {
        ConfigError::Pattern {
            field: field.into(),
            source,
        }
    }
}

/// The underlying cause recorded for one authentication handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureCause {
    /// Kind name of the failure, e.g. `UnauthorizedAuthenticationException`
    pub kind: String,
    /// Human-readable message
    pub message: String,
}

impl FailureCause {
    /// Creates a new failure cause.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Well-known failure kind names.
pub mod failure_kind {
    /// The adaptive risk policy rejected the request.
    pub const UNAUTHORIZED_AUTHENTICATION: &str = "UnauthorizedAuthenticationException";
    /// The registered service does not allow access.
    pub const UNAUTHORIZED_SERVICE: &str = "UnauthorizedServiceException";
    /// The ticket-granting ticket is unknown or expired.
    pub const INVALID_TICKET: &str = "InvalidTicketException";
    /// No authentication attempt was made for the request.
    pub const AUTHENTICATION_REQUIRED: &str = "AuthenticationRequiredException";
    /// A scripted policy could not be evaluated and the engine fails closed.
    pub const POLICY_EVALUATION: &str = "PolicyEvaluationException";
    /// An activated provider is not registered with the deployment.
    pub const PROVIDER_ABSENT: &str = "MultifactorAuthenticationProviderAbsentException";
}

/// Why an authentication attempt or resolution produced a failure outcome.
///
/// Carries a mapping from handler name to the underlying cause. This value is
/// never returned as an `Err`; it is attached to a failure event under the
/// `error` attribute.
///
/// # Examples
///
/// ```
/// use outcome_core::{AuthenticationException, FailureCause};
///
/// let error = AuthenticationException::single(
///     "UnauthorizedAuthenticationException",
///     FailureCause::new("UnauthorizedAuthenticationException", "denied"),
///     "denied",
/// );
/// assert!(error.handler_errors().contains_key("UnauthorizedAuthenticationException"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message}")]
pub struct AuthenticationException {
    message: String,
    handler_errors: BTreeMap<String, FailureCause>,
}

impl AuthenticationException {
    /// Creates an exception from a full handler → cause mapping.
    pub fn new(message: impl Into<String>, handler_errors: BTreeMap<String, FailureCause>) -> Self {
        Self {
            message: message.into(),
            handler_errors,
        }
    }

    /// Creates an exception carrying a single handler failure.
    pub fn single(
        handler: impl Into<String>,
        cause: FailureCause,
        message: impl Into<String>,
    ) -> Self {
        let mut handler_errors = BTreeMap::new();
        handler_errors.insert(handler.into(), cause);
        Self::new(message, handler_errors)
    }

    /// Creates an exception whose handler key and cause kind are the same name.
    pub fn of_kind(kind: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::single(kind, FailureCause::new(kind, message.clone()), message)
    }

    /// Returns the exception message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the handler → cause mapping.
    pub fn handler_errors(&self) -> &BTreeMap<String, FailureCause> {
        &self.handler_errors
    }

    /// Returns true if any handler failed with the given cause kind.
    pub fn has_cause_kind(&self, kind: &str) -> bool {
        self.handler_errors.values().any(|c| c.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn misconfigured_transition_names_provider() {
        let err = ResolutionError::MisconfiguredTransition {
            provider_id: "mfa-unknown".to_string(),
        };
        assert!(err.to_string().contains("mfa-unknown"));
    }

    #[test]
    fn hook_error_converts_into_resolution_error() {
        let err: ResolutionError = HookError::new("audit", "success", "disk full").into();
        assert!(matches!(err, ResolutionError::Hook(_)));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn exception_of_kind_uses_kind_as_handler() {
        let ex = AuthenticationException::of_kind(failure_kind::INVALID_TICKET, "gone");
        assert_eq!(ex.message(), "gone");
        assert!(ex.handler_errors().contains_key(failure_kind::INVALID_TICKET));
        assert!(ex.has_cause_kind(failure_kind::INVALID_TICKET));
        assert!(!ex.has_cause_kind(failure_kind::UNAUTHORIZED_SERVICE));
    }

    #[test]
    fn unevaluable_trigger_maps_to_policy_evaluation_cause() {
        let ex = TriggerError::Unevaluable {
            trigger: "scripted".to_string(),
            fault: PolicyFault("boom".to_string()),
        }
        .into_exception();
        assert!(ex.has_cause_kind(failure_kind::POLICY_EVALUATION));
        assert!(ex.handler_errors().contains_key("scripted"));
        assert!(ex.message().contains("boom"));
    }

    #[test]
    fn unknown_provider_names_trigger_and_id() {
        let err = TriggerError::unknown_provider("registered-service", "mfa-bogus");
        assert_eq!(
            err.to_string(),
            "trigger 'registered-service' activated unknown provider 'mfa-bogus'"
        );
        assert!(err.into_exception().has_cause_kind(failure_kind::PROVIDER_ABSENT));
    }

    #[test]
    fn exception_display_is_message() {
        let ex = AuthenticationException::of_kind("X", "bad credentials");
        assert_eq!(ex.to_string(), "bad credentials");
    }
}
