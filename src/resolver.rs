//! Event resolvers: the building blocks of the resolution chain.
//!
//! An [`EventResolver`] may yield nothing, letting the next phase run. The
//! [`InitialAuthenticationResolver`] is the fallback and always yields an
//! event.

use std::sync::Arc;

use crate::error::{failure_kind, AuthenticationException, ResolutionError, TriggerError};
use crate::event::{attribute, transition, AttributeValue, OutcomeEvent, TransitionTable};
use crate::logging::ResolutionLog;
use crate::registry::{ServiceRegistry, TicketRegistry};
use crate::request::{AuthenticationAttempt, RequestContext};
use crate::trigger::{MultifactorTrigger, TriggerInput};

/// Request parameter asking to re-authenticate against an existing session.
pub const RENEW_PARAMETER: &str = "renew";

/// A pluggable step that may resolve a request to an outcome.
pub trait EventResolver: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Resolves the request, or yields `None` to defer to later phases.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] for configuration mistakes or collaborator
    /// failures; authentication outcomes are always `Ok`.
    fn resolve(&self, ctx: &RequestContext) -> Result<Option<OutcomeEvent>, ResolutionError>;
}

/// Resolves a request to a multifactor provider event via a trigger.
///
/// Yields nothing when the request has no authentication, no target service,
/// no matching registered service, or when no trigger activates.
pub struct MultifactorEventResolver {
    services: Arc<dyn ServiceRegistry>,
    trigger: Arc<dyn MultifactorTrigger>,
    transitions: Arc<TransitionTable>,
}

impl MultifactorEventResolver {
    /// Creates the resolver.
    pub fn new(
        services: Arc<dyn ServiceRegistry>,
        trigger: Arc<dyn MultifactorTrigger>,
        transitions: Arc<TransitionTable>,
    ) -> Self {
        Self {
            services,
            trigger,
            transitions,
        }
    }
}

impl EventResolver for MultifactorEventResolver {
    fn name(&self) -> &str {
        "multifactor"
    }

    fn resolve(&self, ctx: &RequestContext) -> Result<Option<OutcomeEvent>, ResolutionError> {
        let log = ResolutionLog::for_request(ctx);

        let (Some(authentication), Some(service)) = (ctx.authentication(), ctx.service()) else {
            log.debug(format_args!("no authentication or service; multifactor triggers skipped"));
            return Ok(None);
        };
        let Some(registered_service) = self.services.find(service) else {
            log.debug(format_args!("service [{}] is not registered; multifactor triggers skipped", service.id));
            return Ok(None);
        };

        let input = TriggerInput {
            authentication,
            registered_service: &registered_service,
            request: ctx,
            service,
            transitions: self.transitions.as_ref(),
        };

        let provider = match self.trigger.is_activated(&input) {
            Ok(Some(provider)) => provider,
            Ok(None) => return Ok(None),
            Err(TriggerError::UnknownProvider { trigger, provider_id }) => {
                log.warn(format_args!(
                    "trigger [{}] activated provider [{}] with no transition in this flow",
                    trigger, provider_id
                ));
                return Err(ResolutionError::MisconfiguredTransition { provider_id });
            }
            Err(e) => {
                log.warn(format_args!("{}", e));
                return Ok(Some(OutcomeEvent::failure(e.into_exception())));
            }
        };

        log.debug(format_args!(
            "building event for provider [{}] and service [{}]",
            provider.id, registered_service.name
        ));
        self.transitions.validate(&provider.id)?;

        let event = OutcomeEvent::new(provider.id.clone())
            .with_attribute(
                attribute::PRINCIPAL,
                AttributeValue::Principal(authentication.principal.clone()),
            )
            .with_attribute(
                attribute::REGISTERED_SERVICE,
                AttributeValue::RegisteredService(registered_service),
            )
            .with_attribute(attribute::PROVIDER, AttributeValue::Provider(provider));
        Ok(Some(event))
    }
}

/// Reuses an existing SSO session when the client asks to renew it for a
/// service.
///
/// Applies only when the request carries a non-blank `renew` parameter, a
/// ticket-granting ticket id and a target service.
pub struct ServiceTicketRequestResolver {
    tickets: Arc<dyn TicketRegistry>,
}

impl ServiceTicketRequestResolver {
    /// Creates the resolver.
    pub fn new(tickets: Arc<dyn TicketRegistry>) -> Self {
        Self { tickets }
    }

    fn is_requesting_service_ticket(ctx: &RequestContext) -> bool {
        let renew = ctx
            .parameter(RENEW_PARAMETER)
            .is_some_and(|v| !v.trim().is_empty());
        renew && ctx.ticket_granting_ticket_id().is_some() && ctx.service().is_some()
    }
}

impl EventResolver for ServiceTicketRequestResolver {
    fn name(&self) -> &str {
        "service-ticket-request"
    }

    fn resolve(&self, ctx: &RequestContext) -> Result<Option<OutcomeEvent>, ResolutionError> {
        if !Self::is_requesting_service_ticket(ctx) {
            return Ok(None);
        }
        let Some(ticket_id) = ctx.ticket_granting_ticket_id() else {
            return Ok(None);
        };

        let log = ResolutionLog::for_request(ctx);
        match self.tickets.authentication_for(ticket_id) {
            Some(authentication) => {
                log.debug(format_args!(
                    "reusing session of [{}] for service ticket request",
                    authentication.principal.id
                ));
                Ok(Some(OutcomeEvent::new(transition::WARN).with_attribute(
                    attribute::AUTHENTICATION,
                    AttributeValue::Authentication(authentication),
                )))
            }
            None => {
                log.warn(format_args!("ticket-granting ticket is unknown or expired"));
                Ok(Some(OutcomeEvent::failure(AuthenticationException::of_kind(
                    failure_kind::INVALID_TICKET,
                    format!("Ticket-granting ticket [{}] is invalid", ticket_id),
                ))))
            }
        }
    }
}

/// Fallback phase: turns the authentication attempt into a final event.
///
/// - a failed attempt becomes `authenticationFailure` carrying the failure;
/// - a missing attempt becomes `error`;
/// - a registered service that does not allow access becomes
///   `authenticationFailure`;
/// - otherwise the multifactor resolvers are asked in order and the first
///   event wins, else `success`.
pub struct InitialAuthenticationResolver {
    services: Arc<dyn ServiceRegistry>,
    resolvers: Vec<Arc<dyn EventResolver>>,
}

impl InitialAuthenticationResolver {
    /// Creates the resolver without multifactor resolvers.
    pub fn new(services: Arc<dyn ServiceRegistry>) -> Self {
        Self {
            services,
            resolvers: Vec::new(),
        }
    }

    /// Appends a multifactor resolver; resolvers run in the order added.
    pub fn with_resolver(mut self, resolver: Arc<dyn EventResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    /// Resolves the request to exactly one event.
    ///
    /// # Errors
    ///
    /// Propagates errors of the multifactor resolvers.
    pub fn resolve_single(&self, ctx: &RequestContext) -> Result<OutcomeEvent, ResolutionError> {
        let log = ResolutionLog::for_request(ctx);

        let authentication = match ctx.attempt() {
            AuthenticationAttempt::Succeeded(authentication) => authentication,
            AuthenticationAttempt::Failed(error) => {
                log.debug(format_args!("authentication attempt failed: {}", error));
                return Ok(OutcomeEvent::failure(error.clone()));
            }
            AuthenticationAttempt::NotAttempted => {
                return Ok(OutcomeEvent::error(AuthenticationException::of_kind(
                    failure_kind::AUTHENTICATION_REQUIRED,
                    "No authentication attempt is available for this request",
                )));
            }
        };

        if let Some(service) = ctx.service() {
            if let Some(registered) = self.services.find(service) {
                if !registered.access_allowed {
                    log.warn(format_args!("service [{}] does not allow access", registered.name));
                    return Ok(OutcomeEvent::failure(AuthenticationException::of_kind(
                        failure_kind::UNAUTHORIZED_SERVICE,
                        format!("Service [{}] is not allowed to use the login service", service.id),
                    )));
                }
            }
        }

        for resolver in &self.resolvers {
            if let Some(event) = resolver.resolve(ctx)? {
                log.debug(format_args!("resolver [{}] produced [{}]", resolver.name(), event.id()));
                return Ok(event);
            }
        }

        Ok(OutcomeEvent::success().with_attribute(
            attribute::PRINCIPAL,
            AttributeValue::Principal(authentication.principal.clone()),
        ))
    }
}

impl EventResolver for InitialAuthenticationResolver {
    fn name(&self) -> &str {
        "initial-authentication"
    }

    fn resolve(&self, ctx: &RequestContext) -> Result<Option<OutcomeEvent>, ResolutionError> {
        self.resolve_single(ctx).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Provider, ProviderRegistry};
    use crate::registry::{InMemoryServiceRegistry, InMemoryTicketRegistry};
    use crate::request::{Authentication, Principal, RegisteredService, Service};
    use crate::trigger::{GlobalTrigger, RequestParameterTrigger};

    fn services() -> Arc<dyn ServiceRegistry> {
        Arc::new(
            InMemoryServiceRegistry::new(vec![
                RegisteredService::new(1, "App", "^https://app\\..*"),
                RegisteredService::new(2, "Closed", "^https://closed\\..*").disabled(),
            ])
            .unwrap(),
        )
    }

    fn transitions() -> Arc<TransitionTable> {
        Arc::new(TransitionTable::for_providers(&ProviderRegistry::new(vec![
            Provider::new("mfa-duo", 1),
        ])))
    }

    fn authenticated(service: &str) -> RequestContext {
        RequestContext::builder("req")
            .authenticated(Authentication::new(Principal::new("casuser")))
            .service(Service::new(service))
            .build()
    }

    struct Refusing;

    impl MultifactorTrigger for Refusing {
        fn name(&self) -> &str {
            "refusing"
        }

        fn is_activated(
            &self,
            _input: &TriggerInput<'_>,
        ) -> Result<Option<Provider>, TriggerError> {
            Err(TriggerError::Denied {
                trigger: "refusing".to_string(),
                reason: "blocked".to_string(),
            })
        }
    }

    #[test]
    fn multifactor_event_carries_attributes() {
        let resolver = MultifactorEventResolver::new(
            services(),
            Arc::new(GlobalTrigger::new(Provider::new("mfa-duo", 1))),
            transitions(),
        );
        let event = resolver.resolve(&authenticated("https://app.example.org")).unwrap().unwrap();

        assert_eq!(event.id(), "mfa-duo");
        assert!(event.attribute(attribute::PRINCIPAL).is_some());
        assert!(event.attribute(attribute::REGISTERED_SERVICE).is_some());
        assert_eq!(event.provider_attribute().unwrap().rank, 1);
    }

    #[test]
    fn multifactor_unknown_provider_is_fatal() {
        let resolver = MultifactorEventResolver::new(
            services(),
            Arc::new(GlobalTrigger::new(Provider::new("mfa-unknown", 9))),
            transitions(),
        );
        let result = resolver.resolve(&authenticated("https://app.example.org"));
        assert!(matches!(result, Err(ResolutionError::MisconfiguredTransition { .. })));
    }

    #[test]
    fn multifactor_unregistered_requested_provider_is_fatal() {
        let registry = Arc::new(ProviderRegistry::new(vec![Provider::new("mfa-duo", 1)]));
        let resolver = MultifactorEventResolver::new(
            services(),
            Arc::new(RequestParameterTrigger::new(registry)),
            transitions(),
        );
        let ctx = RequestContext::builder("req")
            .authenticated(Authentication::new(Principal::new("casuser")))
            .service(Service::new("https://app.example.org"))
            .parameter("authn_method", "mfa-bogus")
            .build();

        assert!(matches!(
            resolver.resolve(&ctx),
            Err(ResolutionError::MisconfiguredTransition { provider_id }) if provider_id == "mfa-bogus"
        ));
    }

    #[test]
    fn multifactor_builtin_id_as_provider_is_fatal() {
        let resolver = MultifactorEventResolver::new(
            services(),
            Arc::new(GlobalTrigger::new(Provider::new(transition::WARN, 1))),
            transitions(),
        );
        let result = resolver.resolve(&authenticated("https://app.example.org"));
        assert!(matches!(
            result,
            Err(ResolutionError::MisconfiguredTransition { provider_id }) if provider_id == "warn"
        ));
    }

    #[test]
    fn multifactor_skips_unregistered_service() {
        let resolver = MultifactorEventResolver::new(
            services(),
            Arc::new(GlobalTrigger::new(Provider::new("mfa-duo", 1))),
            transitions(),
        );
        assert!(resolver.resolve(&authenticated("https://unknown.org")).unwrap().is_none());
        let anonymous = RequestContext::builder("req").service(Service::new("https://app.x")).build();
        assert!(resolver.resolve(&anonymous).unwrap().is_none());
    }

    #[test]
    fn multifactor_denial_becomes_failure_event() {
        let resolver = MultifactorEventResolver::new(services(), Arc::new(Refusing), transitions());
        let event = resolver.resolve(&authenticated("https://app.example.org")).unwrap().unwrap();
        assert!(event.is(transition::AUTHENTICATION_FAILURE));
        assert!(event
            .error_attribute()
            .unwrap()
            .has_cause_kind(failure_kind::UNAUTHORIZED_AUTHENTICATION));
    }

    #[test]
    fn service_ticket_requires_renew_ticket_and_service() {
        let resolver = ServiceTicketRequestResolver::new(Arc::new(InMemoryTicketRegistry::new()));
        let no_renew = RequestContext::builder("req")
            .ticket_granting_ticket("TGT-1")
            .service(Service::new("https://app.example.org"))
            .build();
        assert!(resolver.resolve(&no_renew).unwrap().is_none());
    }

    #[test]
    fn service_ticket_reuses_live_session() {
        let tickets = InMemoryTicketRegistry::new()
            .with_ticket("TGT-1", Authentication::new(Principal::new("casuser")));
        let resolver = ServiceTicketRequestResolver::new(Arc::new(tickets));
        let ctx = RequestContext::builder("req")
            .parameter(RENEW_PARAMETER, "true")
            .ticket_granting_ticket("TGT-1")
            .service(Service::new("https://app.example.org"))
            .build();

        let event = resolver.resolve(&ctx).unwrap().unwrap();
        assert!(event.is(transition::WARN));
        assert!(event.attribute(attribute::AUTHENTICATION).is_some());
    }

    #[test]
    fn service_ticket_with_unknown_session_fails() {
        let resolver = ServiceTicketRequestResolver::new(Arc::new(InMemoryTicketRegistry::new()));
        let ctx = RequestContext::builder("req")
            .parameter(RENEW_PARAMETER, "true")
            .ticket_granting_ticket("TGT-gone")
            .service(Service::new("https://app.example.org"))
            .build();

        let event = resolver.resolve(&ctx).unwrap().unwrap();
        assert!(event.is(transition::AUTHENTICATION_FAILURE));
        assert!(event.error_attribute().unwrap().has_cause_kind(failure_kind::INVALID_TICKET));
    }

    #[test]
    fn initial_failed_attempt_is_failure() {
        let resolver = InitialAuthenticationResolver::new(services());
        let ctx = RequestContext::builder("req")
            .failed(AuthenticationException::of_kind("AccountLockedException", "locked"))
            .build();
        let event = resolver.resolve_single(&ctx).unwrap();
        assert!(event.is(transition::AUTHENTICATION_FAILURE));
        assert!(event.error_attribute().unwrap().has_cause_kind("AccountLockedException"));
    }

    #[test]
    fn initial_without_attempt_is_error() {
        let resolver = InitialAuthenticationResolver::new(services());
        let event = resolver.resolve_single(&RequestContext::builder("req").build()).unwrap();
        assert!(event.is(transition::ERROR));
    }

    #[test]
    fn initial_disabled_service_is_failure() {
        let resolver = InitialAuthenticationResolver::new(services());
        let event = resolver.resolve_single(&authenticated("https://closed.example.org")).unwrap();
        assert!(event
            .error_attribute()
            .unwrap()
            .has_cause_kind(failure_kind::UNAUTHORIZED_SERVICE));
    }

    #[test]
    fn initial_falls_back_to_success() {
        let resolver = InitialAuthenticationResolver::new(services());
        let event = resolver.resolve_single(&authenticated("https://app.example.org")).unwrap();
        assert!(event.is(transition::SUCCESS));
        assert!(event.attribute(attribute::PRINCIPAL).is_some());
    }

    #[test]
    fn initial_first_multifactor_event_wins() {
        let first: Arc<dyn EventResolver> = Arc::new(MultifactorEventResolver::new(
            services(),
            Arc::new(GlobalTrigger::new(Provider::new("mfa-duo", 1))),
            transitions(),
        ));
        let resolver = InitialAuthenticationResolver::new(services()).with_resolver(first);
        let event = resolver.resolve_single(&authenticated("https://app.example.org")).unwrap();
        assert_eq!(event.id(), "mfa-duo");
    }
}
