//! Audit event schema.

use std::fmt;

use crate::event::OutcomeEvent;
use crate::hooks::HookKind;
use crate::request::RequestContext;

/// Outcome class recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    /// Login completed
    Success,
    /// Login completed through an existing session; user is warned
    Warn,
    /// Resolution could not proceed
    Error,
}

impl From<HookKind> for AuditOutcome {
    fn from(kind: HookKind) -> Self {
        match kind {
            HookKind::Success => AuditOutcome::Success,
            HookKind::Warn => AuditOutcome::Warn,
            HookKind::Error => AuditOutcome::Error,
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::Warn => write!(f, "warn"),
            AuditOutcome::Error => write!(f, "error"),
        }
    }
}

/// A structured audit record of one resolved outcome.
///
/// # Example
///
/// ```
/// use outcome_core::audit::{AuditEvent, AuditOutcome};
///
/// let event = AuditEvent::new("req-123", Some("casuser"), "success", AuditOutcome::Success)
///     .with_service("https://app.example.org");
///
/// assert_eq!(event.request_id(), "req-123");
/// assert_eq!(event.principal(), Some("casuser"));
/// assert_eq!(event.service(), Some("https://app.example.org"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// Request identifier for correlation
    request_id: String,
    /// Principal id; None for unauthenticated requests
    principal: Option<String>,
    /// The resolved event id
    event_id: String,
    /// Outcome class
    outcome: AuditOutcome,
    /// Target service id
    service: Option<String>,
    /// Failure kinds attached to the event
    failure_kinds: Vec<String>,
}

impl AuditEvent {
    /// Creates an audit event with required fields.
    pub fn new(
        request_id: impl Into<String>,
        principal: Option<impl Into<String>>,
        event_id: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            principal: principal.map(Into::into),
            event_id: event_id.into(),
            outcome,
            service: None,
            failure_kinds: Vec::new(),
        }
    }

    /// Builds the audit record for a resolved event.
    pub(crate) fn from_outcome(event: &OutcomeEvent, ctx: &RequestContext, outcome: AuditOutcome) -> Self {
        let mut audit = Self::new(
            ctx.request_id(),
            ctx.principal().map(|p| p.id.as_str()),
            event.id(),
            outcome,
        );
        if let Some(service) = ctx.service() {
            audit = audit.with_service(service.id.as_str());
        }
        if let Some(error) = event.error_attribute() {
            audit.failure_kinds = error.handler_errors().values().map(|c| c.kind.clone()).collect();
        }
        audit
    }

    /// Sets the target service.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Returns the request identifier.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns the principal id, if authenticated.
    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    /// Returns the resolved event id.
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Returns the outcome class.
    pub fn outcome(&self) -> AuditOutcome {
        self.outcome
    }

    /// Returns the target service, if any.
    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    /// Returns the failure kinds attached to the event.
    pub fn failure_kinds(&self) -> &[String] {
        &self.failure_kinds
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AuditEvent[outcome={}, event={}, request_id={}, principal={}",
            self.outcome,
            self.event_id,
            self.request_id,
            self.principal.as_deref().unwrap_or("<none>")
        )?;

        if let Some(service) = &self.service {
            write!(f, ", service={}", service)?;
        }
        if !self.failure_kinds.is_empty() {
            write!(f, ", failures={}", self.failure_kinds.join(","))?;
        }

        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthenticationException;
    use crate::request::{Authentication, Credential, Principal, Service};

    #[test]
    fn audit_outcome_display() {
        assert_eq!(AuditOutcome::Success.to_string(), "success");
        assert_eq!(AuditOutcome::Warn.to_string(), "warn");
        assert_eq!(AuditOutcome::Error.to_string(), "error");
    }

    #[test]
    fn from_outcome_copies_request_facts() {
        let ctx = RequestContext::builder("req-9")
            .authenticated(Authentication::new(Principal::new("casuser")))
            .service(Service::new("https://app.example.org"))
            .credential(Credential::new("casuser", "Mellon"))
            .build();
        let audit = AuditEvent::from_outcome(&OutcomeEvent::success(), &ctx, AuditOutcome::Success);

        assert_eq!(audit.request_id(), "req-9");
        assert_eq!(audit.principal(), Some("casuser"));
        assert_eq!(audit.service(), Some("https://app.example.org"));
        assert!(audit.failure_kinds().is_empty());
        assert!(!audit.to_string().contains("Mellon"));
    }

    #[test]
    fn from_outcome_records_failure_kinds() {
        let ctx = RequestContext::builder("req-err").build();
        let event = OutcomeEvent::error(AuthenticationException::of_kind(
            "AuthenticationRequiredException",
            "missing",
        ));
        let audit = AuditEvent::from_outcome(&event, &ctx, AuditOutcome::Error);

        assert_eq!(audit.failure_kinds(), ["AuthenticationRequiredException".to_string()]);
        let display = audit.to_string();
        assert!(display.contains("<none>"));
        assert!(display.contains("failures=AuthenticationRequiredException"));
    }
}
