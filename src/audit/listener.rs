//! Outcome listener writing the audit trail.

use std::sync::Arc;

use super::{AuditEvent, AuditOutcome, AuditTrail};
use crate::error::HookError;
use crate::event::OutcomeEvent;
use crate::hooks::{HookKind, OutcomeListener};
use crate::request::RequestContext;

/// Records every hooked outcome as an [`AuditEvent`].
///
/// Each record is emitted on the `outcome_audit` tracing target and, when a
/// trail is attached, appended to it.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use outcome_core::audit::{AuditListener, AuditTrail};
/// use outcome_core::{HookDispatcher, OutcomeEvent, RequestContext};
///
/// let trail = Arc::new(AuditTrail::new());
/// let hooks = HookDispatcher::new().with_listener(Arc::new(AuditListener::with_trail(trail.clone())));
///
/// hooks.dispatch(&OutcomeEvent::success(), &RequestContext::builder("req-1").build()).unwrap();
/// assert_eq!(trail.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct AuditListener {
    trail: Option<Arc<AuditTrail>>,
}

impl AuditListener {
    /// Creates a listener that only emits through tracing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a listener that also records into `trail`.
    pub fn with_trail(trail: Arc<AuditTrail>) -> Self {
        Self { trail: Some(trail) }
    }

    fn audit(&self, kind: HookKind, event: &OutcomeEvent, ctx: &RequestContext) {
        let audit = AuditEvent::from_outcome(event, ctx, AuditOutcome::from(kind));

        tracing::info!(
            target: "outcome_audit",
            request_id = %audit.request_id(),
            principal = ?audit.principal(),
            event_id = %audit.event_id(),
            outcome = %audit.outcome(),
            service = ?audit.service(),
            failures = ?audit.failure_kinds(),
            "outcome resolved"
        );

        if let Some(trail) = &self.trail {
            trail.record(audit);
        }
    }
}

impl OutcomeListener for AuditListener {
    fn name(&self) -> &str {
        "audit"
    }

    fn on_success(&self, event: &OutcomeEvent, ctx: &RequestContext) -> Result<(), HookError> {
        self.audit(HookKind::Success, event, ctx);
        Ok(())
    }

    fn on_warn(&self, event: &OutcomeEvent, ctx: &RequestContext) -> Result<(), HookError> {
        self.audit(HookKind::Warn, event, ctx);
        Ok(())
    }

    fn on_error(&self, event: &OutcomeEvent, ctx: &RequestContext) -> Result<(), HookError> {
        self.audit(HookKind::Error, event, ctx);
        Ok(())
    }
}
