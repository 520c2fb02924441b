//! Scripted multifactor policy with atomic hot reload.
//!
//! A policy is any [`PolicyEvaluator`]. The deployable form is a JSON rule
//! document compiled into a [`RulePolicy`]; [`ReloadablePolicy`] holds the
//! active evaluator behind an [`ArcSwap`] so a reload never exposes a
//! half-applied document to an in-flight resolution.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use regex::Regex;
use serde::Deserialize;

use crate::error::{ConfigError, PolicyFault, TriggerError};
use crate::provider::{Provider, ProviderRegistry};
use crate::trigger::{MultifactorTrigger, TriggerInput};

/// Decides a provider from the trigger input.
pub trait PolicyEvaluator: Send + Sync {
    /// Returns the provider to activate, `None` for no activation.
    ///
    /// # Errors
    ///
    /// Returns a [`PolicyFault`] when the policy cannot be evaluated.
    fn evaluate(&self, input: &TriggerInput<'_>) -> Result<Option<Provider>, PolicyFault>;
}

impl<F> PolicyEvaluator for F
where
    F: Fn(&TriggerInput<'_>) -> Result<Option<Provider>, PolicyFault> + Send + Sync,
{
    fn evaluate(&self, input: &TriggerInput<'_>) -> Result<Option<Provider>, PolicyFault> {
        self(input)
    }
}

/// What a scripted trigger does when its policy faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptFailureMode {
    /// Treat the fault as "not activated"
    #[default]
    FailOpen,
    /// Deny the request
    FailClosed,
}

#[derive(Debug, Deserialize)]
struct RuleDocument {
    #[serde(default)]
    rules: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    #[serde(default)]
    when: Vec<RawCondition>,
    provider: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawCondition {
    PrincipalAttribute { name: String, matches: String },
    AuthenticationAttribute { name: String, matches: String },
    ServiceName(String),
    ServiceId(String),
    Parameter { name: String, matches: String },
}

#[derive(Debug)]
enum Condition {
    PrincipalAttribute { name: String, pattern: Regex },
    AuthenticationAttribute { name: String, pattern: Regex },
    ServiceName(Regex),
    ServiceId(Regex),
    Parameter { name: String, pattern: Regex },
}

fn compile_pattern(field: &str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::pattern(field, e))
}

fn any_match(values: Option<&Vec<String>>, pattern: &Regex) -> bool {
    values.is_some_and(|vs| vs.iter().any(|v| pattern.is_match(v)))
}

impl Condition {
    fn compile(raw: RawCondition) -> Result<Self, ConfigError> {
        Ok(match raw {
            RawCondition::PrincipalAttribute { name, matches } => Condition::PrincipalAttribute {
                pattern: compile_pattern("principal_attribute", &matches)?,
                name,
            },
            RawCondition::AuthenticationAttribute { name, matches } => {
                Condition::AuthenticationAttribute {
                    pattern: compile_pattern("authentication_attribute", &matches)?,
                    name,
                }
            }
            RawCondition::ServiceName(p) => Condition::ServiceName(compile_pattern("service_name", &p)?),
            RawCondition::ServiceId(p) => Condition::ServiceId(compile_pattern("service_id", &p)?),
            RawCondition::Parameter { name, matches } => Condition::Parameter {
                pattern: compile_pattern("parameter", &matches)?,
                name,
            },
        })
    }

    fn holds(&self, input: &TriggerInput<'_>) -> bool {
        match self {
            Condition::PrincipalAttribute { name, pattern } => any_match(
                input.authentication.principal.attributes.get(name),
                pattern,
            ),
            Condition::AuthenticationAttribute { name, pattern } => {
                any_match(input.authentication.attributes.get(name), pattern)
            }
            Condition::ServiceName(pattern) => pattern.is_match(&input.registered_service.name),
            Condition::ServiceId(pattern) => pattern.is_match(&input.service.id),
            Condition::Parameter { name, pattern } => input
                .request
                .parameter(name)
                .is_some_and(|v| pattern.is_match(v)),
        }
    }
}

#[derive(Debug)]
struct Rule {
    conditions: Vec<Condition>,
    provider: Provider,
}

/// Declarative policy: the first rule whose conditions all hold names the
/// provider.
///
/// # Examples
///
/// ```
/// use outcome_core::{Provider, ProviderRegistry, RulePolicy};
///
/// let registry = ProviderRegistry::new(vec![Provider::new("mfa-duo", 1)]);
/// let policy = RulePolicy::from_json(
///     r#"{"rules": [{"when": [{"service_name": "^Payroll"}], "provider": "mfa-duo"}]}"#,
///     registry,
/// )
/// .unwrap();
/// assert_eq!(policy.len(), 1);
/// ```
#[derive(Debug)]
pub struct RulePolicy {
    rules: Vec<Rule>,
}

impl RulePolicy {
    /// Parses and compiles a rule document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed JSON, invalid patterns, or a rule
    /// naming a provider that `registry` does not hold.
    pub fn from_json(document: &str, registry: ProviderRegistry) -> Result<Self, ConfigError> {
        Self::compile(serde_json::from_str(document)?, registry)
    }

    /// Compiles a rule document already parsed into a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed documents, invalid patterns, or
    /// unregistered providers.
    pub fn from_value(document: serde_json::Value, registry: ProviderRegistry) -> Result<Self, ConfigError> {
        Self::compile(serde_json::from_value(document)?, registry)
    }

    fn compile(doc: RuleDocument, registry: ProviderRegistry) -> Result<Self, ConfigError> {
        let rules = doc
            .rules
            .into_iter()
            .map(|raw| {
                let conditions = raw
                    .when
                    .into_iter()
                    .map(Condition::compile)
                    .collect::<Result<Vec<_>, _>>()?;
                let provider = registry.get(&raw.provider).cloned().ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "policy rule names unregistered provider '{}'",
                        raw.provider
                    ))
                })?;
                Ok(Rule {
                    conditions,
                    provider,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self { rules })
    }

    /// Returns the number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if the document holds no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl PolicyEvaluator for RulePolicy {
    fn evaluate(&self, input: &TriggerInput<'_>) -> Result<Option<Provider>, PolicyFault> {
        Ok(self
            .rules
            .iter()
            .find(|rule| rule.conditions.iter().all(|c| c.holds(input)))
            .map(|rule| rule.provider.clone()))
    }
}

/// The evaluator active at some point in time.
pub struct PolicySnapshot {
    revision: u64,
    evaluator: Box<dyn PolicyEvaluator>,
}

impl PolicySnapshot {
    /// Monotonic revision number, starting at 1.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Evaluates this snapshot's policy.
    ///
    /// # Errors
    ///
    /// Propagates the evaluator's [`PolicyFault`].
    pub fn evaluate(&self, input: &TriggerInput<'_>) -> Result<Option<Provider>, PolicyFault> {
        self.evaluator.evaluate(input)
    }
}

impl fmt::Debug for PolicySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicySnapshot")
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

/// Hot-reloadable holder of the active policy evaluator.
pub struct ReloadablePolicy {
    current: ArcSwap<PolicySnapshot>,
    revisions: AtomicU64,
}

impl ReloadablePolicy {
    /// Creates a holder with an initial evaluator at revision 1.
    pub fn new(evaluator: impl PolicyEvaluator + 'static) -> Self {
        Self {
            current: ArcSwap::from_pointee(PolicySnapshot {
                revision: 1,
                evaluator: Box::new(evaluator),
            }),
            revisions: AtomicU64::new(1),
        }
    }

    /// Returns the active snapshot.
    ///
    /// The returned `Arc` stays valid for as long as the caller holds it,
    /// regardless of later reloads.
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.current.load_full()
    }

    /// Atomically replaces the active evaluator and returns the new revision.
    pub fn replace(&self, evaluator: impl PolicyEvaluator + 'static) -> u64 {
        let revision = self.revisions.fetch_add(1, Ordering::SeqCst) + 1;
        self.current.store(Arc::new(PolicySnapshot {
            revision,
            evaluator: Box::new(evaluator),
        }));
        tracing::info!(revision, "scripted multifactor policy replaced");
        revision
    }

    /// Compiles a rule document and swaps it in.
    ///
    /// The active policy is left untouched if the document is invalid.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed documents.
    pub fn reload_json(&self, document: &str, registry: ProviderRegistry) -> Result<u64, ConfigError> {
        match RulePolicy::from_json(document, registry) {
            Ok(policy) => Ok(self.replace(policy)),
            Err(e) => {
                tracing::warn!(error = %e, "rejected scripted policy reload; keeping active policy");
                Err(e)
            }
        }
    }
}

impl fmt::Debug for ReloadablePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReloadablePolicy")
            .field("revision", &self.current.load().revision)
            .finish()
    }
}

/// Trigger delegating activation to a [`ReloadablePolicy`].
pub struct ScriptedTrigger {
    policy: Arc<ReloadablePolicy>,
    failure_mode: ScriptFailureMode,
}

impl ScriptedTrigger {
    /// Creates the trigger.
    pub fn new(policy: Arc<ReloadablePolicy>, failure_mode: ScriptFailureMode) -> Self {
        Self {
            policy,
            failure_mode,
        }
    }
}

impl MultifactorTrigger for ScriptedTrigger {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_activated(&self, input: &TriggerInput<'_>) -> Result<Option<Provider>, TriggerError> {
        let snapshot = self.policy.snapshot();
        match snapshot.evaluate(input) {
            Ok(provider) => Ok(provider),
            Err(fault) => {
                tracing::warn!(
                    revision = snapshot.revision(),
                    principal = %input.authentication.principal.id,
                    error = %fault,
                    mode = ?self.failure_mode,
                    "scripted multifactor policy failed to evaluate"
                );
                match self.failure_mode {
                    ScriptFailureMode::FailOpen => Ok(None),
                    ScriptFailureMode::FailClosed => Err(TriggerError::Unevaluable {
                        trigger: self.name().to_string(),
                        fault,
                    }),
                }
            }
        }
    }
}
