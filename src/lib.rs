//! Authentication-outcome resolution for single sign-on logins.
//!
//! After a credential check, the engine decides what happens next: deny the
//! request on risk grounds, reuse an existing session for a service ticket,
//! require a second factor, or finish the login. Every resolution yields
//! exactly one [`OutcomeEvent`] whose id names the next flow transition.
//!
//! # Phases
//!
//! 1. **Risk gate**: an [`AdaptivePolicy`] judges the user agent and
//!    geolocation. It only runs when both are present; a denial becomes
//!    `authenticationFailure` and nothing else runs.
//! 2. **Service-ticket short-circuit**: a renew request for a service with a
//!    live session resolves to `warn` immediately.
//! 3. **Initial authentication**: failed attempts become
//!    `authenticationFailure`, multifactor triggers may name a provider, and
//!    otherwise the login succeeds.
//! 4. **Hooks**: [`OutcomeListener`]s are notified of `success`, `warn` and
//!    `error` events.
//!
//! # Core Types
//!
//! - [`OutcomeEngine`]: shared entry point over an atomically swappable chain
//! - [`ResolutionChain`]: the wired phases
//! - [`RequestContext`]: request-scoped facts
//! - [`MultifactorTrigger`]: predicate that may require a provider
//! - [`ReloadablePolicy`]: hot-reloadable scripted policy
//! - [`EngineConfig`]: JSON configuration snapshot
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use outcome_core::{
//!     Authentication, Collaborators, EngineConfig, InMemoryServiceRegistry, OutcomeEngine,
//!     Principal, RegisteredService, RequestContext, Service,
//! };
//!
//! let config = EngineConfig::from_json(
//!     r#"{
//!         "providers": [{"id": "mfa-duo", "rank": 1}],
//!         "triggers": {"global_provider": "mfa-duo"}
//!     }"#,
//! )
//! .unwrap();
//!
//! let services = InMemoryServiceRegistry::new(vec![RegisteredService::new(
//!     1,
//!     "Payroll",
//!     "^https://payroll\\..*",
//! )])
//! .unwrap();
//!
//! let built = config.build_chain(Collaborators::new(Arc::new(services))).unwrap();
//! let engine = OutcomeEngine::new(built.chain);
//!
//! let ctx = RequestContext::builder("req-123")
//!     .authenticated(Authentication::new(Principal::new("casuser")))
//!     .service(Service::new("https://payroll.example.org"))
//!     .build();
//!
//! let event = engine.resolve(&ctx).unwrap();
//! assert_eq!(event.id(), "mfa-duo");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
mod config;
mod engine;
mod error;
mod event;
mod hooks;
mod logging;
mod provider;
mod registry;
mod request;
mod resolver;
mod risk;
mod script;
mod trigger;

pub use config::{
    Collaborators, ConfiguredChain, EngineConfig, PrincipalAttributeRule, RiskConfig,
    ScriptedConfig, TriggerConfig,
};
pub use engine::{OutcomeEngine, ResolutionChain, ResolutionChainBuilder};
pub use error::{
    failure_kind, AuthenticationException, ConfigError, FailureCause, HookError, PolicyFault,
    ResolutionError, TriggerError,
};
pub use event::{attribute, transition, AttributeValue, OutcomeEvent, TransitionTable};
pub use hooks::{HookDispatcher, HookKind, OutcomeListener};
pub use logging::ResolutionLog;
pub use provider::{Provider, ProviderRegistry, ProviderSelector, RankedProviderSelector};
pub use registry::{InMemoryServiceRegistry, InMemoryTicketRegistry, ServiceRegistry, TicketRegistry};
pub use request::{
    Authentication, AuthenticationAttempt, Credential, GeoLocationRequest, Principal,
    RegisteredService, RequestContext, RequestContextBuilder, Service,
};
pub use resolver::{
    EventResolver, InitialAuthenticationResolver, MultifactorEventResolver,
    ServiceTicketRequestResolver, RENEW_PARAMETER,
};
pub use risk::{
    AdaptivePolicy, AllowAll, DefaultAdaptivePolicy, GeoLocationResponse, GeoLocator, NoGeoLocator,
};
pub use script::{
    PolicyEvaluator, PolicySnapshot, ReloadablePolicy, RulePolicy, ScriptFailureMode,
    ScriptedTrigger,
};
pub use trigger::{
    CompositeTrigger, CompositionMode, GlobalTrigger, MultifactorTrigger, PrincipalAttributeTrigger,
    RegisteredServiceTrigger, RequestParameterTrigger, TriggerInput, DEFAULT_AUTHN_METHOD_PARAMETER,
};
