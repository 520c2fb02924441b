//! Request-scoped inputs to outcome resolution.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::AuthenticationException;

/// An authenticated user or service principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    /// Unique identifier for this principal
    pub id: String,
    /// Multi-valued principal attributes (e.g. `memberOf`, `mail`)
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl Principal {
    /// Creates a principal without attributes.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds a value to the named attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Returns the values of the named attribute, if any.
    pub fn attribute(&self, name: &str) -> Option<&[String]> {
        self.attributes.get(name).map(Vec::as_slice)
    }
}

/// The result of a successful authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Authentication {
    /// The resolved principal
    pub principal: Principal,
    /// Authentication-level attributes (e.g. `authenticationMethod`)
    pub attributes: BTreeMap<String, Vec<String>>,
    /// Names of the handlers that validated a credential
    pub successful_handlers: Vec<String>,
}

impl Authentication {
    /// Creates an authentication for the given principal.
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            attributes: BTreeMap::new(),
            successful_handlers: Vec::new(),
        }
    }

    /// Records a handler that validated a credential.
    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.successful_handlers.push(handler.into());
        self
    }

    /// Adds a value to the named authentication attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }
}

/// What credential validation produced before resolution runs.
#[derive(Debug, Clone, Default)]
pub enum AuthenticationAttempt {
    /// No credentials were validated for this request
    #[default]
    NotAttempted,
    /// Credentials were validated and produced an authentication
    Succeeded(Authentication),
    /// Credential validation failed
    Failed(AuthenticationException),
}

/// The service a client is trying to log in to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    /// Service identifier, usually the callback URL
    pub id: String,
}

impl Service {
    /// Creates a service from its identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A service definition known to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredService {
    /// Numeric identifier
    pub id: u64,
    /// Display name
    pub name: String,
    /// Regex pattern matched against [`Service::id`]
    pub service_id: String,
    /// Lower values are matched first
    pub evaluation_order: i32,
    /// Whether the service may receive logins at all
    pub access_allowed: bool,
    /// Multifactor provider ids this service requires
    pub multifactor_providers: Vec<String>,
}

impl RegisteredService {
    /// Creates an enabled service definition with no multifactor requirements.
    pub fn new(id: u64, name: impl Into<String>, service_id: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            service_id: service_id.into(),
            evaluation_order: 0,
            access_allowed: true,
            multifactor_providers: Vec::new(),
        }
    }

    /// Sets the evaluation order.
    pub fn with_evaluation_order(mut self, order: i32) -> Self {
        self.evaluation_order = order;
        self
    }

    /// Requires the given multifactor provider for this service.
    pub fn with_multifactor_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.multifactor_providers.push(provider_id.into());
        self
    }

    /// Disables access to the service.
    pub fn disabled(mut self) -> Self {
        self.access_allowed = false;
        self
    }
}

/// Client-reported geolocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoLocationRequest {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Accuracy radius in meters, if reported
    pub accuracy: Option<f64>,
    /// Client timestamp of the reading, if reported
    pub timestamp: Option<String>,
}

impl GeoLocationRequest {
    /// Creates a geolocation reading without accuracy or timestamp.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            timestamp: None,
        }
    }

    /// Sets the accuracy radius.
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }
}

impl fmt::Display for GeoLocationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GeoLocationRequest(latitude={}, longitude={}",
            self.latitude, self.longitude
        )?;
        if let Some(accuracy) = self.accuracy {
            write!(f, ", accuracy={}", accuracy)?;
        }
        if let Some(timestamp) = &self.timestamp {
            write!(f, ", timestamp={}", timestamp)?;
        }
        write!(f, ")")
    }
}

/// A raw credential as submitted by the client.
///
/// The secret part is never printed.
#[derive(Clone)]
pub struct Credential {
    /// Credential identifier, e.g. the username
    pub id: String,
    secret: String,
}

impl Credential {
    /// Creates a credential.
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
        }
    }

    /// Exposes the secret part.
    pub fn expose_secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Facts about one in-flight login request.
///
/// Built by the hosting request layer with [`RequestContext::builder`] and
/// borrowed by the engine for the duration of a single resolution.
///
/// # Examples
///
/// ```
/// use outcome_core::{Authentication, Principal, RequestContext, Service};
///
/// let ctx = RequestContext::builder("req-1")
///     .authenticated(Authentication::new(Principal::new("casuser")))
///     .service(Service::new("https://app.example.org"))
///     .user_agent("Mozilla/5.0")
///     .parameter("renew", "true")
///     .build();
///
/// assert_eq!(ctx.request_id(), "req-1");
/// assert_eq!(ctx.principal().map(|p| p.id.as_str()), Some("casuser"));
/// assert_eq!(ctx.parameter("renew"), Some("true"));
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    attempt: AuthenticationAttempt,
    service: Option<Service>,
    user_agent: Option<String>,
    geo_location: Option<GeoLocationRequest>,
    client_ip: Option<String>,
    credentials: Vec<Credential>,
    parameters: BTreeMap<String, String>,
    // keys are stored lowercased
    headers: BTreeMap<String, String>,
    ticket_granting_ticket_id: Option<String>,
}

impl RequestContext {
    /// Starts building a context for the given request id.
    pub fn builder(request_id: impl Into<String>) -> RequestContextBuilder {
        RequestContextBuilder {
            ctx: RequestContext {
                request_id: request_id.into(),
                attempt: AuthenticationAttempt::NotAttempted,
                service: None,
                user_agent: None,
                geo_location: None,
                client_ip: None,
                credentials: Vec::new(),
                parameters: BTreeMap::new(),
                headers: BTreeMap::new(),
                ticket_granting_ticket_id: None,
            },
        }
    }

    /// Returns the request ID used for log correlation.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns the outcome of credential validation.
    pub fn attempt(&self) -> &AuthenticationAttempt {
        &self.attempt
    }

    /// Returns the authentication if credential validation succeeded.
    pub fn authentication(&self) -> Option<&Authentication> {
        match &self.attempt {
            AuthenticationAttempt::Succeeded(authn) => Some(authn),
            _ => None,
        }
    }

    /// Returns the resolved principal, if authenticated.
    pub fn principal(&self) -> Option<&Principal> {
        self.authentication().map(|a| &a.principal)
    }

    /// Returns the target service, if any.
    pub fn service(&self) -> Option<&Service> {
        self.service.as_ref()
    }

    /// Returns the user agent when it is present and not blank.
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent
            .as_deref()
            .filter(|agent| !agent.trim().is_empty())
    }

    /// Returns the client geolocation, if reported.
    pub fn geo_location(&self) -> Option<&GeoLocationRequest> {
        self.geo_location.as_ref()
    }

    /// Returns the client IP address, if known.
    pub fn client_ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }

    /// Returns the submitted credentials.
    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    /// Returns a request parameter.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Returns a request header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Returns the ticket-granting ticket id of the SSO session, if any.
    pub fn ticket_granting_ticket_id(&self) -> Option<&str> {
        self.ticket_granting_ticket_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }
}

/// Builder for [`RequestContext`].
#[derive(Debug)]
pub struct RequestContextBuilder {
    ctx: RequestContext,
}

impl RequestContextBuilder {
    /// Records a successful authentication.
    pub fn authenticated(mut self, authentication: Authentication) -> Self {
        self.ctx.attempt = AuthenticationAttempt::Succeeded(authentication);
        self
    }

    /// Records a failed authentication attempt.
    pub fn failed(mut self, error: AuthenticationException) -> Self {
        self.ctx.attempt = AuthenticationAttempt::Failed(error);
        self
    }

    /// Sets the target service.
    pub fn service(mut self, service: Service) -> Self {
        self.ctx.service = Some(service);
        self
    }

    /// Sets the client user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.ctx.user_agent = Some(agent.into());
        self
    }

    /// Sets the client geolocation.
    pub fn geo_location(mut self, geo: GeoLocationRequest) -> Self {
        self.ctx.geo_location = Some(geo);
        self
    }

    /// Sets the client IP address.
    pub fn client_ip(mut self, ip: impl Into<String>) -> Self {
        self.ctx.client_ip = Some(ip.into());
        self
    }

    /// Adds a submitted credential.
    pub fn credential(mut self, credential: Credential) -> Self {
        self.ctx.credentials.push(credential);
        self
    }

    /// Adds a request parameter.
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.parameters.insert(name.into(), value.into());
        self
    }

    /// Adds a request header; a later header differing only in case replaces it.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut name = name.into();
        name.make_ascii_lowercase();
        self.ctx.headers.insert(name, value.into());
        self
    }

    /// Sets the ticket-granting ticket id of the SSO session.
    pub fn ticket_granting_ticket(mut self, id: impl Into<String>) -> Self {
        self.ctx.ticket_granting_ticket_id = Some(id.into());
        self
    }

    /// Finishes the context.
    pub fn build(self) -> RequestContext {
        self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_user_agent_is_absent() {
        let ctx = RequestContext::builder("r").user_agent("   ").build();
        assert!(ctx.user_agent().is_none());
    }

    #[test]
    fn principal_requires_successful_attempt() {
        let failed = RequestContext::builder("r")
            .failed(AuthenticationException::of_kind("X", "nope"))
            .build();
        assert!(failed.principal().is_none());

        let ok = RequestContext::builder("r")
            .authenticated(Authentication::new(Principal::new("alice")))
            .build();
        assert_eq!(ok.principal().unwrap().id, "alice");
    }

    #[test]
    fn headers_are_case_insensitive() {
        let ctx = RequestContext::builder("r")
            .header("User-Agent", "curl")
            .build();
        assert_eq!(ctx.header("user-agent"), Some("curl"));
        assert_eq!(ctx.header("USER-AGENT"), Some("curl"));
    }

    #[test]
    fn header_names_differing_in_case_collapse_to_last_value() {
        let ctx = RequestContext::builder("r")
            .header("X-Authn-Method", "mfa-gauth")
            .header("x-authn-method", "mfa-duo")
            .build();
        assert_eq!(ctx.header("X-AUTHN-METHOD"), Some("mfa-duo"));
    }

    #[test]
    fn credential_debug_redacts_secret() {
        let credential = Credential::new("casuser", "Mellon");
        let debug = format!("{:?}", credential);
        assert!(debug.contains("casuser"));
        assert!(!debug.contains("Mellon"));
        assert_eq!(credential.expose_secret(), "Mellon");
    }

    #[test]
    fn geo_display_includes_coordinates() {
        let geo = GeoLocationRequest::new(37.4, -122.1).with_accuracy(50.0);
        let shown = geo.to_string();
        assert!(shown.contains("latitude=37.4"));
        assert!(shown.contains("accuracy=50"));
    }

    #[test]
    fn principal_attribute_accumulates_values() {
        let p = Principal::new("bob")
            .with_attribute("memberOf", "staff")
            .with_attribute("memberOf", "admins");
        assert_eq!(p.attribute("memberOf").unwrap().len(), 2);
        assert!(p.attribute("mail").is_none());
    }
}
