//! Rule evaluation over a cache snapshot
//!
//! Rules are evaluated in rule set order. A rule whose signal is absent from
//! the snapshot is skipped. A rule with an update period (its own, or the
//! engine default) whose value is older than that period yields a stale
//! warning instead of a value check.

use crate::cache::{CacheEntry, CacheSnapshot};
use crate::validation::rules::{Rule, RuleKind, RuleSet};
use crate::validation::{Severity, Violation, ViolationKind};
use std::sync::Arc;
use std::time::Duration;

/// Relative slack on numeric bounds. A scaled value such as `7 * 0.1` lands a
/// rounding step above `0.7` and must still match a bound written as `0.7`.
const BOUND_EPSILON: f64 = 1e-9;

/// Evaluate a rule set with no default staleness period
pub fn evaluate(ruleset: &RuleSet, snapshot: &CacheSnapshot) -> Vec<Violation> {
    evaluate_rules(ruleset, snapshot, None)
}

/// Rule set plus evaluation options, shared across ticks
#[derive(Debug, Clone)]
pub struct ValidationEngine {
    rules: Arc<RuleSet>,
    default_period: Option<Duration>,
}

impl ValidationEngine {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self {
            rules,
            default_period: None,
        }
    }

    /// Builder method: staleness period for rules without `period_ms`
    pub fn with_default_period(mut self, period: Duration) -> Self {
        self.default_period = Some(period);
        self
    }

    pub fn rules(&self) -> &Arc<RuleSet> {
        &self.rules
    }

    pub fn default_period(&self) -> Option<Duration> {
        self.default_period
    }

    /// Evaluate every rule against one snapshot
    pub fn evaluate(&self, snapshot: &CacheSnapshot) -> Vec<Violation> {
        evaluate_rules(&self.rules, snapshot, self.default_period)
    }
}

fn evaluate_rules(
    ruleset: &RuleSet,
    snapshot: &CacheSnapshot,
    default_period: Option<Duration>,
) -> Vec<Violation> {
    let violations: Vec<Violation> = ruleset
        .iter()
        .filter_map(|rule| {
            let entry = snapshot.get(&rule.signal)?;
            match rule.period.or(default_period) {
                Some(period) => match stale_for(snapshot, entry, period) {
                    Some(age) => Some(stale(rule, entry, age, period)),
                    None => check(rule, entry),
                },
                None => check(rule, entry),
            }
        })
        .collect();

    log::trace!(
        "Evaluated {} rules, {} violations",
        ruleset.len(),
        violations.len()
    );
    violations
}

/// Age of the entry if it exceeds the period
fn stale_for(snapshot: &CacheSnapshot, entry: &CacheEntry, period: Duration) -> Option<Duration> {
    // Entries newer than the snapshot (clock skew) are fresh
    let age = (snapshot.taken_at - entry.updated_at).to_std().ok()?;
    (age > period).then_some(age)
}

fn stale(rule: &Rule, entry: &CacheEntry, age: Duration, period: Duration) -> Violation {
    Violation {
        signal: rule.signal.clone(),
        prefix: rule.prefix.clone(),
        severity: Severity::Warning,
        kind: ViolationKind::StaleSignal,
        message: format!(
            "{} has not updated for {} ms (expected every {} ms)",
            rule.signal,
            age.as_millis(),
            period.as_millis()
        ),
        value: entry.value,
    }
}

/// Inclusive range check with [`BOUND_EPSILON`] slack at either end
fn within_bounds(value: f64, min: f64, max: f64) -> bool {
    let slack = |bound: f64| BOUND_EPSILON * bound.abs().max(1.0);
    value >= min - slack(min) && value <= max + slack(max)
}

/// Check the value itself
fn check(rule: &Rule, entry: &CacheEntry) -> Option<Violation> {
    let (severity, kind, message, value) = match &rule.kind {
        RuleKind::Numeric { min, max } => {
            if within_bounds(entry.value, *min, *max) {
                return None;
            }
            (
                Severity::Warning,
                ViolationKind::ValueOutOfRange,
                format!(
                    "{} ({}) is out of range: [{}, {}]",
                    rule.signal, entry.value, min, max
                ),
                entry.value,
            )
        }
        RuleKind::Boolean { expected } => {
            let actual = entry.value != 0.0;
            if actual == *expected {
                return None;
            }
            (
                Severity::Fault,
                ViolationKind::BooleanMismatch,
                format!("{} = {}, but expected {}", rule.signal, actual, expected),
                entry.value,
            )
        }
        RuleKind::MappedError { codes, typical } => {
            if entry.raw_value == *typical {
                return None;
            }
            (
                Severity::Fault,
                ViolationKind::FaultCodeActive,
                format!("{}: {}", rule.signal, codes.describe(entry.raw_value)),
                entry.raw_value as f64,
            )
        }
    };

    Some(Violation {
        signal: rule.signal.clone(),
        prefix: rule.prefix.clone(),
        severity,
        kind,
        message,
        value,
    })
}
