//! Validation of cached signal values against a rule set
//!
//! - [`rules`]: rule set loading (JSON with comments)
//! - [`engine`]: evaluation of a rule set over a cache snapshot
//! - [`fault`]: fault code descriptions for `mappedError` rules
//! - [`tracker`]: raise/clear transitions across evaluation ticks
//!
//! Violations are domain findings, not errors: evaluation itself cannot fail.

pub mod engine;
pub mod fault;
pub mod rules;
pub mod tracker;

pub use engine::{evaluate, ValidationEngine};
pub use fault::FaultCodeTable;
pub use rules::{Rule, RuleKind, RuleSet, UnresolvedRule};
pub use tracker::{Transitions, ViolationTracker};

use serde::Serialize;
use std::fmt;

/// How urgent a violation is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Fault,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "WARNING"),
            Severity::Fault => write!(f, "FAULT"),
        }
    }
}

/// Which check produced a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ViolationKind {
    ValueOutOfRange,
    BooleanMismatch,
    FaultCodeActive,
    StaleSignal,
}

/// A rule that did not hold for the current snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub signal: String,
    /// Subsystem tag from the rule
    pub prefix: Option<String>,
    pub severity: Severity,
    pub kind: ViolationKind,
    /// Human-readable description
    pub message: String,
    /// Observed physical value (raw code for fault codes)
    pub value: f64,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "[{}] {}: {}", prefix, self.severity, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}
