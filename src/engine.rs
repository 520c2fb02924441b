//! The resolution chain and the engine that serves it.
//!
//! ```text
//! RequestContext
//!   ↓
//! risk gate ──deny──▶ authenticationFailure
//!   ↓
//! service-ticket short-circuit ──event──▶ hooks ──▶ event
//!   ↓
//! initial authentication (triggers, else success) ──▶ hooks ──▶ event
//! ```

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::{failure_kind, AuthenticationException, ResolutionError};
use crate::event::OutcomeEvent;
use crate::hooks::HookDispatcher;
use crate::logging::ResolutionLog;
use crate::request::RequestContext;
use crate::resolver::{EventResolver, InitialAuthenticationResolver};
use crate::risk::{AdaptivePolicy, AllowAll};

/// An immutable, fully wired resolution pipeline.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use outcome_core::{
///     Authentication, InMemoryServiceRegistry, InitialAuthenticationResolver, Principal,
///     RequestContext, ResolutionChain, transition,
/// };
///
/// let services = Arc::new(InMemoryServiceRegistry::new(Vec::new()).unwrap());
/// let chain = ResolutionChain::builder(InitialAuthenticationResolver::new(services)).build();
///
/// let ctx = RequestContext::builder("req-1")
///     .authenticated(Authentication::new(Principal::new("casuser")))
///     .build();
/// assert_eq!(chain.resolve(&ctx).unwrap().id(), transition::SUCCESS);
/// ```
pub struct ResolutionChain {
    adaptive_policy: Arc<dyn AdaptivePolicy>,
    short_circuit: Option<Arc<dyn EventResolver>>,
    initial: InitialAuthenticationResolver,
    hooks: HookDispatcher,
}

impl ResolutionChain {
    /// Starts building a chain around its fallback resolver.
    pub fn builder(initial: InitialAuthenticationResolver) -> ResolutionChainBuilder {
        ResolutionChainBuilder {
            adaptive_policy: Arc::new(AllowAll),
            short_circuit: None,
            initial,
            hooks: HookDispatcher::new(),
        }
    }

    /// Resolves a request to exactly one outcome event.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] for misconfigured transitions, failing
    /// hooks and failing resolvers. Authentication failures and policy
    /// denials are returned as events.
    pub fn resolve(&self, ctx: &RequestContext) -> Result<OutcomeEvent, ResolutionError> {
        let span = tracing::info_span!("resolve_outcome", request_id = %ctx.request_id());
        let _entered = span.enter();
        let log = ResolutionLog::for_request(ctx);

        if let Some(denied) = self.apply_risk_gate(ctx, &log) {
            return Ok(denied);
        }

        if let Some(short_circuit) = &self.short_circuit {
            if let Some(event) = short_circuit.resolve(ctx)? {
                log.debug(format_args!(
                    "resolver [{}] short-circuited with [{}]",
                    short_circuit.name(),
                    event.id()
                ));
                self.hooks.dispatch(&event, ctx)?;
                return Ok(event);
            }
        }

        let event = self.initial.resolve_single(ctx)?;
        self.hooks.dispatch(&event, ctx)?;
        log.info(format_args!("resolved outcome [{}]", event.id()));
        Ok(event)
    }

    /// Runs the adaptive policy when both signals are present.
    fn apply_risk_gate(&self, ctx: &RequestContext, log: &ResolutionLog<'_>) -> Option<OutcomeEvent> {
        let (Some(agent), Some(location)) = (ctx.user_agent(), ctx.geo_location()) else {
            log.debug(format_args!("no user agent or geolocation; adaptive policy skipped"));
            return None;
        };

        if self.adaptive_policy.apply(agent, location) {
            return None;
        }

        let message = format!(
            "Adaptive authentication policy does not allow this request for {} and {}",
            agent, location
        );
        log.warn(format_args!("{}", message));
        Some(OutcomeEvent::failure(AuthenticationException::of_kind(
            failure_kind::UNAUTHORIZED_AUTHENTICATION,
            message,
        )))
    }
}

impl std::fmt::Debug for ResolutionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionChain")
            .field("short_circuit", &self.short_circuit.as_ref().map(|r| r.name()))
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ResolutionChain`].
pub struct ResolutionChainBuilder {
    adaptive_policy: Arc<dyn AdaptivePolicy>,
    short_circuit: Option<Arc<dyn EventResolver>>,
    initial: InitialAuthenticationResolver,
    hooks: HookDispatcher,
}

impl ResolutionChainBuilder {
    /// Sets the risk gate policy; defaults to admitting everything.
    pub fn adaptive_policy(mut self, policy: Arc<dyn AdaptivePolicy>) -> Self {
        self.adaptive_policy = policy;
        self
    }

    /// Sets the resolver that may short-circuit before initial resolution.
    pub fn short_circuit(mut self, resolver: Arc<dyn EventResolver>) -> Self {
        self.short_circuit = Some(resolver);
        self
    }

    /// Sets the hook dispatcher.
    pub fn hooks(mut self, hooks: HookDispatcher) -> Self {
        self.hooks = hooks;
        self
    }

    /// Finishes the chain.
    pub fn build(self) -> ResolutionChain {
        ResolutionChain {
            adaptive_policy: self.adaptive_policy,
            short_circuit: self.short_circuit,
            initial: self.initial,
            hooks: self.hooks,
        }
    }
}

/// Shared entry point holding the active chain.
///
/// Each resolution loads the chain once and uses that snapshot until it
/// returns; [`replace_chain`](OutcomeEngine::replace_chain) swaps in a new
/// snapshot atomically without disturbing in-flight resolutions.
pub struct OutcomeEngine {
    chain: ArcSwap<ResolutionChain>,
}

impl OutcomeEngine {
    /// Creates an engine serving `chain`.
    pub fn new(chain: ResolutionChain) -> Self {
        Self {
            chain: ArcSwap::from_pointee(chain),
        }
    }

    /// Resolves a request with the active chain.
    ///
    /// # Errors
    ///
    /// See [`ResolutionChain::resolve`].
    pub fn resolve(&self, ctx: &RequestContext) -> Result<OutcomeEvent, ResolutionError> {
        let chain = self.chain.load_full();
        chain.resolve(ctx)
    }

    /// Atomically replaces the active chain.
    pub fn replace_chain(&self, chain: ResolutionChain) {
        self.chain.store(Arc::new(chain));
        tracing::info!("resolution chain replaced");
    }

    /// Returns the active chain.
    pub fn chain(&self) -> Arc<ResolutionChain> {
        self.chain.load_full()
    }
}

impl std::fmt::Debug for OutcomeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeEngine")
            .field("chain", &*self.chain.load())
            .finish()
    }
}
