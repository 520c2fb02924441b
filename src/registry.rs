//! Read-only lookup collaborators: registered services and SSO sessions.

use std::collections::HashMap;

use regex::Regex;

use crate::error::ConfigError;
use crate::request::{Authentication, RegisteredService, Service};

/// Finds the registered definition of a target service.
pub trait ServiceRegistry: Send + Sync {
    /// Returns the matching definition, if any.
    fn find(&self, service: &Service) -> Option<RegisteredService>;
}

/// Looks up the authentication carried by an SSO session.
pub trait TicketRegistry: Send + Sync {
    /// Returns the authentication of a live ticket-granting ticket.
    fn authentication_for(&self, ticket_granting_ticket_id: &str) -> Option<Authentication>;
}

/// In-memory service registry matching by pattern in evaluation order.
///
/// # Examples
///
/// ```
/// use outcome_core::{InMemoryServiceRegistry, RegisteredService, Service, ServiceRegistry};
///
/// let registry = InMemoryServiceRegistry::new(vec![
///     RegisteredService::new(2, "Catch-all", ".*").with_evaluation_order(100),
///     RegisteredService::new(1, "Payroll", "^https://payroll\\.example\\.org/.*"),
/// ])
/// .unwrap();
///
/// let found = registry.find(&Service::new("https://payroll.example.org/login")).unwrap();
/// assert_eq!(found.name, "Payroll");
/// ```
#[derive(Debug)]
pub struct InMemoryServiceRegistry {
    services: Vec<(Regex, RegisteredService)>,
}

impl InMemoryServiceRegistry {
    /// Creates the registry, compiling each service pattern.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Pattern`] for an invalid service pattern.
    pub fn new(services: impl IntoIterator<Item = RegisteredService>) -> Result<Self, ConfigError> {
        let mut services = services
            .into_iter()
            .map(|s| {
                let pattern = Regex::new(&s.service_id)
                    .map_err(|e| ConfigError::pattern(format!("service {}", s.id), e))?;
                Ok((pattern, s))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        services.sort_by(|(_, a), (_, b)| {
            a.evaluation_order
                .cmp(&b.evaluation_order)
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(Self { services })
    }

    /// Returns the number of registered services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns true if no service is registered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl ServiceRegistry for InMemoryServiceRegistry {
    fn find(&self, service: &Service) -> Option<RegisteredService> {
        self.services
            .iter()
            .find(|(pattern, _)| pattern.is_match(&service.id))
            .map(|(_, registered)| registered.clone())
    }
}

/// In-memory ticket registry, fixed at construction.
#[derive(Debug, Default)]
pub struct InMemoryTicketRegistry {
    tickets: HashMap<String, Authentication>,
}

impl InMemoryTicketRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a live ticket.
    pub fn with_ticket(mut self, id: impl Into<String>, authentication: Authentication) -> Self {
        self.tickets.insert(id.into(), authentication);
        self
    }
}

impl TicketRegistry for InMemoryTicketRegistry {
    fn authentication_for(&self, ticket_granting_ticket_id: &str) -> Option<Authentication> {
        self.tickets.get(ticket_granting_ticket_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Principal;

    #[test]
    fn lower_evaluation_order_matches_first() {
        let registry = InMemoryServiceRegistry::new(vec![
            RegisteredService::new(1, "Broad", "^https://.*").with_evaluation_order(10),
            RegisteredService::new(2, "Narrow", "^https://app\\.example\\.org.*").with_evaluation_order(1),
        ])
        .unwrap();

        assert_eq!(registry.find(&Service::new("https://app.example.org/x")).unwrap().name, "Narrow");
        assert_eq!(registry.find(&Service::new("https://other.org")).unwrap().name, "Broad");
        assert!(registry.find(&Service::new("ftp://nope")).is_none());
    }

    #[test]
    fn invalid_service_pattern_is_rejected() {
        let result = InMemoryServiceRegistry::new(vec![RegisteredService::new(9, "Bad", "(")]);
        assert!(matches!(result, Err(ConfigError::Pattern { field, .. }) if field == "service 9"));
    }

    #[test]
    fn ticket_lookup() {
        let registry = InMemoryTicketRegistry::new()
            .with_ticket("TGT-1", Authentication::new(Principal::new("casuser")));
        assert_eq!(registry.authentication_for("TGT-1").unwrap().principal.id, "casuser");
        assert!(registry.authentication_for("TGT-2").is_none());
    }
}
