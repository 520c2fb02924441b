//! Multifactor providers and deterministic provider selection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::request::RegisteredService;

/// A concrete secondary-factor mechanism.
///
/// `id` becomes the resolved event id; `rank` breaks ties when several
/// providers activate for the same request (lower wins).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provider {
    /// Provider identifier, e.g. `mfa-duo`
    pub id: String,
    /// Selection rank, lower wins
    pub rank: u32,
}

impl Provider {
    /// Creates a provider.
    pub fn new(id: impl Into<String>, rank: u32) -> Self {
        Self {
            id: id.into(),
            rank,
        }
    }
}

/// The providers configured for a deployment, looked up by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Provider>,
}

impl ProviderRegistry {
    /// Creates a registry; later entries replace earlier ones with the same id.
    pub fn new(providers: impl IntoIterator<Item = Provider>) -> Self {
        Self {
            providers: providers.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    /// Returns the provider registered under `id`.
    pub fn get(&self, id: &str) -> Option<&Provider> {
        self.providers.get(id)
    }

    /// Iterates registered providers in id order.
    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.providers.values()
    }

    /// Returns the number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns true if no provider is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Picks one provider when several activate.
///
/// Implementations must be deterministic for a given set of providers: the
/// order of `providers` carries no meaning.
pub trait ProviderSelector: Send + Sync {
    /// Selects one provider; `None` only when `providers` is empty.
    fn select(
        &self,
        providers: &[Provider],
        service: Option<&RegisteredService>,
    ) -> Option<Provider>;
}

/// Default selector: lowest rank wins, ties broken by id.
///
/// # Examples
///
/// ```
/// use outcome_core::{Provider, ProviderSelector, RankedProviderSelector};
///
/// let picked = RankedProviderSelector
///     .select(&[Provider::new("mfa-gauth", 2), Provider::new("mfa-duo", 1)], None)
///     .unwrap();
/// assert_eq!(picked.id, "mfa-duo");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RankedProviderSelector;

impl ProviderSelector for RankedProviderSelector {
    fn select(
        &self,
        providers: &[Provider],
        _service: Option<&RegisteredService>,
    ) -> Option<Provider> {
        providers
            .iter()
            .min_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.id.cmp(&b.id)))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_rank_wins() {
        let picked = RankedProviderSelector
            .select(
                &[
                    Provider::new("mfa-u2f", 3),
                    Provider::new("mfa-duo", 1),
                    Provider::new("mfa-gauth", 2),
                ],
                None,
            )
            .unwrap();
        assert_eq!(picked.id, "mfa-duo");
    }

    #[test]
    fn equal_ranks_break_by_id() {
        let a = [Provider::new("mfa-yubikey", 1), Provider::new("mfa-duo", 1)];
        let b = [Provider::new("mfa-duo", 1), Provider::new("mfa-yubikey", 1)];
        assert_eq!(RankedProviderSelector.select(&a, None).unwrap().id, "mfa-duo");
        assert_eq!(RankedProviderSelector.select(&b, None).unwrap().id, "mfa-duo");
    }

    #[test]
    fn empty_input_selects_nothing() {
        assert!(RankedProviderSelector.select(&[], None).is_none());
    }

    #[test]
    fn registry_has_no_entry_for_unknown_ids() {
        let registry = ProviderRegistry::new(vec![Provider::new("mfa-duo", 1)]);
        assert_eq!(registry.get("mfa-duo").map(|p| p.rank), Some(1));
        assert!(registry.get("mfa-other").is_none());
        assert_eq!(registry.len(), 1);
    }
}
