//! Integration property tests for outcome-core.
//!
//! These tests validate cross-module invariants of the resolution chain
//! using property-based testing.

use std::sync::Arc;

use outcome_core::{
    transition, Authentication, AuthenticationException, CompositeTrigger, CompositionMode,
    GeoLocationRequest, GlobalTrigger, InMemoryServiceRegistry, InitialAuthenticationResolver,
    MultifactorEventResolver, Principal, Provider, ProviderRegistry, ProviderSelector,
    RankedProviderSelector, RegisteredService, RequestContext, ResolutionChain, Service,
    TransitionTable,
};
use proptest::prelude::*;

fn services() -> Arc<InMemoryServiceRegistry> {
    Arc::new(InMemoryServiceRegistry::new(vec![RegisteredService::new(1, "App", "^https://app\\..*")]).unwrap())
}

fn deny_all_chain() -> ResolutionChain {
    ResolutionChain::builder(InitialAuthenticationResolver::new(services()))
        .adaptive_policy(Arc::new(|_: &str, _: &GeoLocationRequest| false))
        .build()
}

// Strategy: Generate a set of providers with unique ids
fn arb_providers() -> impl Strategy<Value = Vec<Provider>> {
    prop::collection::btree_map("mfa-[a-z]{2,8}", 0u32..5, 1..6)
        .prop_map(|m| m.into_iter().map(|(id, rank)| Provider::new(id, rank)).collect())
}

// Strategy: Generate the three kinds of authentication attempt
fn arb_attempt() -> impl Strategy<Value = u8> {
    0u8..3
}

fn with_attempt(builder: outcome_core::RequestContextBuilder, attempt: u8) -> outcome_core::RequestContextBuilder {
    match attempt {
        0 => builder.authenticated(Authentication::new(Principal::new("casuser"))),
        1 => builder.failed(AuthenticationException::of_kind("FailedLoginException", "bad")),
        _ => builder,
    }
}

proptest! {
    /// Property: Blank user agents never reach the risk gate
    #[test]
    fn proptest_blank_agent_fails_open(
        blank in "[ \t]{0,4}",
        lat in -90.0f64..90.0,
        lon in -180.0f64..180.0,
    ) {
        let ctx = RequestContext::builder("req")
            .authenticated(Authentication::new(Principal::new("casuser")))
            .user_agent(blank)
            .geo_location(GeoLocationRequest::new(lat, lon))
            .build();

        let event = deny_all_chain().resolve(&ctx).unwrap();
        prop_assert_eq!(event.id(), transition::SUCCESS);
    }

    /// Property: Requests without geolocation never reach the risk gate
    #[test]
    fn proptest_missing_geo_fails_open(agent in "[A-Za-z0-9/ .();]{1,40}") {
        let ctx = RequestContext::builder("req")
            .authenticated(Authentication::new(Principal::new("casuser")))
            .user_agent(agent)
            .build();

        let event = deny_all_chain().resolve(&ctx).unwrap();
        prop_assert_eq!(event.id(), transition::SUCCESS);
    }

    /// Property: Any denial is a failure event, whatever the attempt was
    #[test]
    fn proptest_denial_overrides_attempt(
        agent in "[A-Za-z]{1,20}",
        attempt in arb_attempt(),
    ) {
        let builder = RequestContext::builder("req")
            .user_agent(agent)
            .geo_location(GeoLocationRequest::new(0.0, 0.0));
        let ctx = with_attempt(builder, attempt).build();

        let event = deny_all_chain().resolve(&ctx).unwrap();
        prop_assert_eq!(event.id(), transition::AUTHENTICATION_FAILURE);
    }

    /// Property: The selector ignores input order
    #[test]
    fn proptest_selector_is_order_independent(
        (providers, shuffled) in arb_providers()
            .prop_flat_map(|p| (Just(p.clone()), Just(p).prop_shuffle()))
    ) {
        let selector = RankedProviderSelector;
        let expected = selector.select(&providers, None);
        prop_assert_eq!(selector.select(&shuffled, None), expected.clone());

        let min_rank = providers.iter().map(|p| p.rank).min();
        prop_assert_eq!(expected.map(|p| p.rank), min_rank);
    }

    /// Property: Ranked composition picks the same provider as the selector
    #[test]
    fn proptest_ranked_composite_matches_selector(providers in arb_providers()) {
        let registry = ProviderRegistry::new(providers.clone());
        let mut trigger = CompositeTrigger::new(CompositionMode::Ranked, Arc::new(RankedProviderSelector));
        for provider in &providers {
            trigger.push(Box::new(GlobalTrigger::new(provider.clone())));
        }
        let initial = InitialAuthenticationResolver::new(services()).with_resolver(Arc::new(
            MultifactorEventResolver::new(
                services(),
                Arc::new(trigger),
                Arc::new(TransitionTable::for_providers(&registry)),
            ),
        ));
        let chain = ResolutionChain::builder(initial).build();

        let ctx = RequestContext::builder("req")
            .authenticated(Authentication::new(Principal::new("casuser")))
            .service(Service::new("https://app.example.org"))
            .build();
        let event = chain.resolve(&ctx).unwrap();

        let expected = RankedProviderSelector.select(&providers, None).unwrap();
        prop_assert_eq!(event.id(), expected.id.as_str());
    }

    /// Property: Every resolution yields exactly one well-known or provider event
    #[test]
    fn proptest_exactly_one_event(
        attempt in arb_attempt(),
        service in prop::option::of(prop_oneof![
            Just("https://app.example.org"),
            Just("https://other.example.org"),
        ]),
    ) {
        let mut builder = with_attempt(RequestContext::builder("req"), attempt);
        if let Some(service) = service {
            builder = builder.service(Service::new(service));
        }
        let ctx = builder.build();

        let chain = ResolutionChain::builder(InitialAuthenticationResolver::new(services())).build();
        let event = chain.resolve(&ctx).unwrap();

        let expected = match attempt {
            0 => transition::SUCCESS,
            1 => transition::AUTHENTICATION_FAILURE,
            _ => transition::ERROR,
        };
        prop_assert_eq!(event.id(), expected);
    }
}
