//! Rule set loading
//!
//! A rule set is a JSON object keyed by signal name:
//!
//! ```text
//! {
//!     // motor controller
//!     "ControllerTemp": { "type": "numeric", "min": 0, "max": 100, "prefix": "MC" },
//!     "DriveEnabled":   { "type": "boolean", "expected": true },
//!     "FAULT": {
//!         "type": "mappedError",
//!         "typical": "0x0",
//!         "codes": { "0x1": "Overvoltage", "0x2": "Undervoltage" },
//!         "period_ms": 500
//!     }
//! }
//! ```
//!
//! `//` and `/* */` comments are allowed outside string literals. Rules keep
//! their file order, which is also the order violations are reported in.

use crate::signals::Catalog;
use crate::types::{DecoderError, Result, RuleError};
use crate::validation::fault::{parse_code, FaultCodeTable};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// What a rule checks
#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    /// Inclusive bounds; a missing bound is unbounded
    Numeric { min: f64, max: f64 },
    /// Nonzero physical value reads as `true`
    Boolean { expected: bool },
    /// Raw value other than `typical` is an active fault
    MappedError { codes: FaultCodeTable, typical: i64 },
}

/// One validation rule
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Signal the rule applies to
    pub signal: String,
    pub kind: RuleKind,
    /// Subsystem tag (`MC`, `AMS`, ...)
    pub prefix: Option<String>,
    /// Expected update period; older values are reported stale
    pub period: Option<Duration>,
}

/// A rule naming a signal no catalog message carries
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rule for '{signal}' references a signal that is not in the catalog")]
pub struct UnresolvedRule {
    pub signal: String,
}

/// Ordered, immutable set of rules
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

/// Rule fields as written in the file
#[derive(Debug, Deserialize)]
struct RawRule {
    #[serde(rename = "type")]
    kind: String,
    min: Option<f64>,
    max: Option<f64>,
    expected: Option<bool>,
    codes: Option<BTreeMap<String, String>>,
    typical: Option<CodeLiteral>,
    prefix: Option<String>,
    period_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CodeLiteral {
    Int(i64),
    Text(String),
}

impl RuleSet {
    /// Parse rule set source text
    pub fn parse(source: &str) -> std::result::Result<Self, RuleError> {
        let value: Value = serde_json::from_str(&strip_comments(source))?;
        let Value::Object(entries) = value else {
            return Err(RuleError::NotAnObject);
        };
        Self::from_map(entries)
    }

    /// Load a rule set file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading rule set: {:?}", path);

        let source = std::fs::read_to_string(path)?;
        let rules = Self::parse(&source).map_err(|source| DecoderError::RuleSetError {
            path: path.to_path_buf(),
            source,
        })?;

        log::info!("Loaded {} rules from {:?}", rules.len(), path);
        Ok(rules)
    }

    fn from_map(entries: Map<String, Value>) -> std::result::Result<Self, RuleError> {
        let mut rules = Vec::with_capacity(entries.len());
        for (signal, value) in entries {
            if let Some(rule) = parse_rule(signal, value)? {
                rules.push(rule);
            }
        }
        Ok(Self { rules })
    }

    /// Rules in file order
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn get(&self, signal: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.signal == signal)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Check every rule against the catalog. Unresolved rules are logged and
    /// returned; they stay in the set and are skipped at evaluation because
    /// their signal never reaches the cache.
    pub fn resolve(&self, catalog: &Catalog) -> Vec<UnresolvedRule> {
        self.rules
            .iter()
            .filter(|rule| !catalog.contains_signal(&rule.signal))
            .map(|rule| {
                let unresolved = UnresolvedRule {
                    signal: rule.signal.clone(),
                };
                log::warn!("{}", unresolved);
                unresolved
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<T: IntoIterator<Item = Rule>>(iter: T) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

/// Parse one entry. A rule of unknown type is skipped with a warning.
fn parse_rule(signal: String, value: Value) -> std::result::Result<Option<Rule>, RuleError> {
    let invalid = |reason: String| RuleError::InvalidRule {
        signal: signal.clone(),
        reason,
    };

    let raw: RawRule = serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;

    let kind = match raw.kind.as_str() {
        "numeric" => {
            let min = raw.min.unwrap_or(f64::NEG_INFINITY);
            let max = raw.max.unwrap_or(f64::INFINITY);
            if min > max {
                return Err(invalid(format!("min {} is greater than max {}", min, max)));
            }
            RuleKind::Numeric { min, max }
        }
        "boolean" => RuleKind::Boolean {
            expected: raw
                .expected
                .ok_or_else(|| invalid("boolean rule needs 'expected'".to_string()))?,
        },
        "mappedError" => {
            let typical = match raw.typical {
                None => 0,
                Some(CodeLiteral::Int(code)) => code,
                Some(CodeLiteral::Text(text)) => parse_code(&text)
                    .ok_or_else(|| invalid(format!("invalid typical code '{}'", text)))?,
            };
            let mut codes = FaultCodeTable::new();
            for (code, description) in raw.codes.unwrap_or_default() {
                let code = parse_code(&code)
                    .ok_or_else(|| invalid(format!("invalid fault code '{}'", code)))?;
                codes.insert(code, description);
            }
            RuleKind::MappedError { codes, typical }
        }
        other => {
            log::warn!("Skipping rule for '{}': unknown rule type '{}'", signal, other);
            return Ok(None);
        }
    };

    Ok(Some(Rule {
        signal,
        kind,
        prefix: raw.prefix,
        period: raw.period_ms.map(Duration::from_millis),
    }))
}

/// Remove `//` and `/* */` comments that are not inside string literals
pub fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut in_string = false;

    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            match ch {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (ch, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(ch);
            }
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    // Keep line numbers of serde_json errors meaningful
                    if c == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            _ => out.push(ch),
        }
    }

    out
}
