//! Active violation tracking across evaluation ticks
//!
//! The engine reports every violation on every tick. The tracker turns that
//! into edges: a violation is raised the first tick it appears and cleared
//! the first tick it is gone, so consumers are not flooded with repeats.

use crate::validation::{Severity, Violation, ViolationKind};
use std::collections::BTreeMap;

/// Violations that started or ended on one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transitions {
    pub raised: Vec<Violation>,
    pub cleared: Vec<Violation>,
}

impl Transitions {
    pub fn is_empty(&self) -> bool {
        self.raised.is_empty() && self.cleared.is_empty()
    }
}

/// Currently active violations, keyed by signal name
#[derive(Debug, Default)]
pub struct ViolationTracker {
    active: BTreeMap<String, Violation>,
}

impl ViolationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one tick's violations into the active set.
    ///
    /// A signal already active with the same condition is not raised again;
    /// its stored violation is refreshed with the latest value. A different
    /// condition on the same signal (another kind, or another fault code)
    /// counts as a new raise.
    pub fn update(&mut self, violations: &[Violation]) -> Transitions {
        let mut transitions = Transitions::default();
        let mut current: BTreeMap<String, Violation> = BTreeMap::new();

        for violation in violations {
            let is_new = match self.active.get(&violation.signal) {
                Some(previous) => !same_condition(previous, violation),
                None => true,
            };
            if is_new {
                match violation.severity {
                    Severity::Fault => log::error!("{}", violation),
                    Severity::Warning => log::warn!("{}", violation),
                }
                transitions.raised.push(violation.clone());
            }
            current.insert(violation.signal.clone(), violation.clone());
        }

        for (signal, previous) in std::mem::take(&mut self.active) {
            if !current.contains_key(&signal) {
                log::info!("Cleared: {}", previous);
                transitions.cleared.push(previous);
            }
        }

        self.active = current;
        transitions
    }

    /// Active violations, ordered by signal name
    pub fn active(&self) -> impl Iterator<Item = &Violation> {
        self.active.values()
    }

    pub fn is_active(&self, signal: &str) -> bool {
        self.active.contains_key(signal)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

fn same_condition(a: &Violation, b: &Violation) -> bool {
    a.kind == b.kind && (a.kind != ViolationKind::FaultCodeActive || a.value == b.value)
}
