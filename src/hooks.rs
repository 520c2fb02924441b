//! Lifecycle hooks fired after an outcome is resolved.
//!
//! Exactly one of [`OutcomeListener::on_success`], [`OutcomeListener::on_warn`]
//! and [`OutcomeListener::on_error`] runs for the `success`, `warn` and
//! `error` transitions. Provider events, `authenticationFailure` and any other
//! id fire nothing.

use std::sync::Arc;

use crate::error::HookError;
use crate::event::{transition, OutcomeEvent};
use crate::request::RequestContext;

/// Extension point notified of resolved outcomes.
///
/// All methods default to no-ops; implement the ones you need.
pub trait OutcomeListener: Send + Sync {
    /// Name used in errors.
    fn name(&self) -> &str {
        "listener"
    }

    /// Called for `success` events.
    ///
    /// # Errors
    ///
    /// A returned error aborts the resolution.
    fn on_success(&self, _event: &OutcomeEvent, _ctx: &RequestContext) -> Result<(), HookError> {
        Ok(())
    }

    /// Called for `warn` events.
    ///
    /// # Errors
    ///
    /// A returned error aborts the resolution.
    fn on_warn(&self, _event: &OutcomeEvent, _ctx: &RequestContext) -> Result<(), HookError> {
        Ok(())
    }

    /// Called for `error` events.
    ///
    /// # Errors
    ///
    /// A returned error aborts the resolution.
    fn on_error(&self, _event: &OutcomeEvent, _ctx: &RequestContext) -> Result<(), HookError> {
        Ok(())
    }
}

/// Which hook an event id selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// `on_success`
    Success,
    /// `on_warn`
    Warn,
    /// `on_error`
    Error,
}

impl HookKind {
    /// Maps an event id to its hook by exact match.
    pub fn for_event_id(id: &str) -> Option<Self> {
        match id {
            transition::SUCCESS => Some(HookKind::Success),
            transition::WARN => Some(HookKind::Warn),
            transition::ERROR => Some(HookKind::Error),
            _ => None,
        }
    }
}

/// Ordered set of listeners.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use outcome_core::{HookDispatcher, HookError, OutcomeEvent, OutcomeListener, RequestContext};
///
/// #[derive(Default)]
/// struct Counter(AtomicUsize);
///
/// impl OutcomeListener for Counter {
///     fn on_success(&self, _: &OutcomeEvent, _: &RequestContext) -> Result<(), HookError> {
///         self.0.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     }
/// }
///
/// let counter = Arc::new(Counter::default());
/// let hooks = HookDispatcher::new().with_listener(counter.clone());
/// let ctx = RequestContext::builder("req-1").build();
///
/// hooks.dispatch(&OutcomeEvent::success(), &ctx).unwrap();
/// hooks.dispatch(&OutcomeEvent::new("mfa-duo"), &ctx).unwrap();
/// assert_eq!(counter.0.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone, Default)]
pub struct HookDispatcher {
    listeners: Vec<Arc<dyn OutcomeListener>>,
}

impl HookDispatcher {
    /// Creates a dispatcher without listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener; listeners run in registration order.
    pub fn with_listener(mut self, listener: Arc<dyn OutcomeListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Returns the number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns true if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Fires the hook matching `event` on every listener.
    ///
    /// Returns the hook kind that fired, if any.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first listener error.
    pub fn dispatch(
        &self,
        event: &OutcomeEvent,
        ctx: &RequestContext,
    ) -> Result<Option<HookKind>, HookError> {
        let Some(kind) = HookKind::for_event_id(event.id()) else {
            return Ok(None);
        };

        for listener in &self.listeners {
            match kind {
                HookKind::Success => listener.on_success(event, ctx)?,
                HookKind::Warn => listener.on_warn(event, ctx)?,
                HookKind::Error => listener.on_error(event, ctx)?,
            }
        }
        Ok(Some(kind))
    }
}

impl std::fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.listeners.iter().map(|l| l.name()).collect();
        f.debug_struct("HookDispatcher")
            .field("listeners", &names)
            .finish()
    }
}
