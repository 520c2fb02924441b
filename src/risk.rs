//! Adaptive risk policy evaluated before any factor resolution.
//!
//! The gate is opportunistic: it only runs when the client reported both a
//! non-blank user agent and a geolocation. Without either signal the request
//! passes.

use std::sync::Arc;

use regex::Regex;

use crate::error::ConfigError;
use crate::request::GeoLocationRequest;

/// Binary admit/deny check over contextual signals.
pub trait AdaptivePolicy: Send + Sync {
    /// Returns `false` to deny the request.
    fn apply(&self, user_agent: &str, location: &GeoLocationRequest) -> bool;
}

impl<F> AdaptivePolicy for F
where
    F: Fn(&str, &GeoLocationRequest) -> bool + Send + Sync,
{
    fn apply(&self, user_agent: &str, location: &GeoLocationRequest) -> bool {
        self(user_agent, location)
    }
}

/// Admits every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AdaptivePolicy for AllowAll {
    fn apply(&self, _user_agent: &str, _location: &GeoLocationRequest) -> bool {
        true
    }
}

/// A resolved location for a set of coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoLocationResponse {
    /// Human-readable address lines, e.g. `Mountain View, California, US`
    pub addresses: Vec<String>,
}

impl GeoLocationResponse {
    /// Creates a response from address lines.
    pub fn new(addresses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }
}

/// Reverse-geocoding collaborator.
///
/// Implementations may call remote services; the engine holds no lock while
/// calling them.
pub trait GeoLocator: Send + Sync {
    /// Resolves coordinates to addresses, or `None` when unknown.
    fn locate(&self, location: &GeoLocationRequest) -> Option<GeoLocationResponse>;
}

/// A locator that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeoLocator;

impl GeoLocator for NoGeoLocator {
    fn locate(&self, _location: &GeoLocationRequest) -> Option<GeoLocationResponse> {
        None
    }
}

/// Rule-based adaptive policy.
///
/// Denies when the user agent matches `reject_browsers`, or when any address
/// the locator resolves matches `reject_locations`. Coordinates the locator
/// cannot resolve never cause a denial.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use outcome_core::{AdaptivePolicy, DefaultAdaptivePolicy, GeoLocationRequest, NoGeoLocator};
///
/// let policy = DefaultAdaptivePolicy::new(Arc::new(NoGeoLocator))
///     .reject_browsers("(?i)msie")
///     .unwrap();
///
/// let geo = GeoLocationRequest::new(40.7, -74.0);
/// assert!(!policy.apply("Mozilla/4.0 (compatible; MSIE 6.0)", &geo));
/// assert!(policy.apply("Mozilla/5.0 (X11; Linux x86_64)", &geo));
/// ```
pub struct DefaultAdaptivePolicy {
    locator: Arc<dyn GeoLocator>,
    reject_browsers: Option<Regex>,
    reject_locations: Option<Regex>,
}

impl DefaultAdaptivePolicy {
    /// Creates a policy with no rules.
    pub fn new(locator: Arc<dyn GeoLocator>) -> Self {
        Self {
            locator,
            reject_browsers: None,
            reject_locations: None,
        }
    }

    /// Denies user agents matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Pattern`] if the pattern does not compile.
    pub fn reject_browsers(mut self, pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern).map_err(|e| ConfigError::pattern("reject_browsers", e))?;
        self.reject_browsers = Some(regex);
        Ok(self)
    }

    /// Denies locations whose resolved address matches `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Pattern`] if the pattern does not compile.
    pub fn reject_locations(mut self, pattern: &str) -> Result<Self, ConfigError> {
        let regex =
            Regex::new(pattern).map_err(|e| ConfigError::pattern("reject_locations", e))?;
        self.reject_locations = Some(regex);
        Ok(self)
    }
}

impl AdaptivePolicy for DefaultAdaptivePolicy {
    fn apply(&self, user_agent: &str, location: &GeoLocationRequest) -> bool {
        if let Some(browsers) = &self.reject_browsers {
            if browsers.is_match(user_agent) {
                tracing::warn!(user_agent, "user agent is rejected by adaptive policy");
                return false;
            }
        }

        if let Some(locations) = &self.reject_locations {
            match self.locator.locate(location) {
                Some(response) => {
                    if let Some(address) =
                        response.addresses.iter().find(|a| locations.is_match(a))
                    {
                        tracing::warn!(%address, "location is rejected by adaptive policy");
                        return false;
                    }
                }
                None => {
                    tracing::debug!(%location, "location could not be resolved; not enforcing location rules");
                }
            }
        }

        true
    }
}

impl std::fmt::Debug for DefaultAdaptivePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultAdaptivePolicy")
            .field("reject_browsers", &self.reject_browsers.as_ref().map(Regex::as_str))
            .field("reject_locations", &self.reject_locations.as_ref().map(Regex::as_str))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLocator(Vec<&'static str>);

    impl GeoLocator for FixedLocator {
        fn locate(&self, _location: &GeoLocationRequest) -> Option<GeoLocationResponse> {
            Some(GeoLocationResponse::new(self.0.iter().copied()))
        }
    }

    fn geo() -> GeoLocationRequest {
        GeoLocationRequest::new(37.42, -122.08)
    }

    #[test]
    fn no_rules_admits() {
        let policy = DefaultAdaptivePolicy::new(Arc::new(NoGeoLocator));
        assert!(policy.apply("Mozilla/5.0", &geo()));
    }

    #[test]
    fn rejected_location_denies() {
        let policy = DefaultAdaptivePolicy::new(Arc::new(FixedLocator(vec![
            "Mountain View, California, US",
        ])))
        .reject_locations("California")
        .unwrap();
        assert!(!policy.apply("Mozilla/5.0", &geo()));
    }

    #[test]
    fn unresolved_location_admits() {
        let policy = DefaultAdaptivePolicy::new(Arc::new(NoGeoLocator))
            .reject_locations(".*")
            .unwrap();
        assert!(policy.apply("Mozilla/5.0", &geo()));
    }

    #[test]
    fn other_location_admits() {
        let policy = DefaultAdaptivePolicy::new(Arc::new(FixedLocator(vec!["Paris, France"])))
            .reject_locations("California")
            .unwrap();
        assert!(policy.apply("Mozilla/5.0", &geo()));
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        let result = DefaultAdaptivePolicy::new(Arc::new(NoGeoLocator)).reject_browsers("(");
        assert!(matches!(result, Err(ConfigError::Pattern { field, .. }) if field == "reject_browsers"));
    }

    #[test]
    fn closures_are_policies() {
        let deny_all = |_: &str, _: &GeoLocationRequest| false;
        assert!(!deny_all.apply("agent", &geo()));
        assert!(AllowAll.apply("agent", &geo()));
    }
}
