//! Message catalog
//!
//! The immutable, validated set of message and signal definitions the frame
//! decoder works from. Messages are keyed by their canonical (29-bit) id.

use crate::signals::{dbc, layout};
use crate::types::{canonical_id, ParseError};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

/// A complete CAN message definition
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDefinition {
    /// Canonical CAN message ID (low 29 bits)
    pub id: u32,
    /// Identifier as written in the source, extended flag included
    pub raw_id: u32,
    /// Message name
    pub name: String,
    /// Declared payload size in bytes
    pub size: usize,
    /// Sender ECU name (optional)
    pub sender: Option<String>,
    /// All signals in this message, in definition order
    pub signals: Vec<SignalDefinition>,
    /// Free-text comment from `CM_ BO_`
    pub comment: Option<String>,
    /// Custom attributes (defaults merged with explicit assignments)
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl MessageDefinition {
    pub fn new(raw_id: u32, name: impl Into<String>, size: usize) -> Self {
        Self {
            id: canonical_id(raw_id),
            raw_id,
            name: name.into(),
            size,
            sender: None,
            signals: Vec::new(),
            comment: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder method: append a signal
    pub fn with_signal(mut self, signal: SignalDefinition) -> Self {
        self.signals.push(signal);
        self
    }

    /// Find a signal by name
    pub fn signal(&self, name: &str) -> Option<&SignalDefinition> {
        self.signals.iter().find(|s| s.name == name)
    }

    /// The multiplexer switch signal, if any
    pub fn multiplexer_signal(&self) -> Option<&SignalDefinition> {
        self.signals
            .iter()
            .find(|s| s.multiplexer == Some(Multiplexer::Switch))
    }

    /// True if any signal is multiplexed
    pub fn is_multiplexed(&self) -> bool {
        self.signals.iter().any(|s| s.multiplexer.is_some())
    }
}

/// A CAN signal definition
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDefinition {
    /// Signal name
    pub name: String,
    /// Start bit in the CAN frame (MSB for Motorola, LSB for Intel)
    pub start_bit: u16,
    /// Length in bits
    pub length: u16,
    /// Byte order
    pub byte_order: ByteOrder,
    /// Value type (signed/unsigned)
    pub value_type: ValueType,
    /// Physical conversion, or the reserved marker
    pub kind: SignalKind,
    /// Engineering unit (e.g., "km/h", "°C", "V")
    pub unit: Option<String>,
    /// Receiving nodes
    pub receivers: Vec<String>,
    /// Free-text comment from `CM_ SG_`
    pub comment: Option<String>,
    /// Value table for enum-like values (raw_value -> description)
    pub value_table: Option<BTreeMap<i64, String>>,
    /// Multiplexer role (None if not multiplexed)
    pub multiplexer: Option<Multiplexer>,
    /// Custom attributes (defaults merged with explicit assignments)
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl SignalDefinition {
    pub fn new(
        name: impl Into<String>,
        start_bit: u16,
        length: u16,
        byte_order: ByteOrder,
        value_type: ValueType,
        kind: SignalKind,
    ) -> Self {
        Self {
            name: name.into(),
            start_bit,
            length,
            byte_order,
            value_type,
            kind,
            unit: None,
            receivers: Vec::new(),
            comment: None,
            value_table: None,
            multiplexer: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder method: set the unit
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn is_reserved(&self) -> bool {
        matches!(self.kind, SignalKind::Reserved)
    }

    /// Convert a raw value to its physical value; `None` for reserved fields
    pub fn physical_value(&self, raw: i64) -> Option<f64> {
        match self.kind {
            SignalKind::Physical { scale, offset, .. } => Some(raw as f64 * scale + offset),
            SignalKind::Reserved => None,
        }
    }

    /// Inverse conversion, rounded to the nearest raw integer
    pub fn raw_value(&self, physical: f64) -> Option<i64> {
        match self.kind {
            SignalKind::Physical { scale, offset, .. } => {
                Some(((physical - offset) / scale).round() as i64)
            }
            SignalKind::Reserved => None,
        }
    }

    /// Value description for a raw value, if the signal has a value table
    pub fn describe(&self, raw: i64) -> Option<&str> {
        self.value_table
            .as_ref()
            .and_then(|table| table.get(&raw))
            .map(String::as_str)
    }
}

/// How a signal's bits map to a value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignalKind {
    /// A physical quantity: `raw * scale + offset`, documented range `[min, max]`
    Physical {
        scale: f64,
        offset: f64,
        min: f64,
        max: f64,
    },
    /// Padding/filler; decoded for integrity checks but never reported
    Reserved,
}

impl SignalKind {
    /// Classify a parsed conversion. `scale = 0` with `min = max = 0` marks
    /// a reserved field.
    pub fn physical(scale: f64, offset: f64, min: f64, max: f64) -> Self {
        if scale == 0.0 && min == 0.0 && max == 0.0 {
            SignalKind::Reserved
        } else {
            SignalKind::Physical {
                scale,
                offset,
                min,
                max,
            }
        }
    }
}

/// Byte order for signal extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian (Intel format, `@1`)
    LittleEndian,
    /// Big-endian (Motorola format, `@0`)
    BigEndian,
}

/// Value type for signal interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Signed integer
    Signed,
    /// Unsigned integer
    Unsigned,
}

/// Multiplexer role of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplexer {
    /// The switch (`M`) selecting which multiplexed signals are present
    Switch,
    /// Present only when the switch equals this value (`mN`)
    Multiplexed(u64),
}

/// A custom attribute value (`BA_` / `BA_DEF_DEF_`)
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::Str(v) => write!(f, "{}", v),
        }
    }
}

/// Non-fatal findings while building a catalog
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadIssue {
    /// A signal's bit span leaves the frame; the message is rejected
    #[error("message '{message}' (0x{id:X}) rejected: signal '{signal}' does not fit in {size} bytes")]
    OutOfFrame {
        message: String,
        id: u32,
        signal: String,
        size: usize,
    },

    /// Two physical signals share bits; the message is rejected
    #[error("message '{message}' (0x{id:X}) rejected: signals '{first}' and '{second}' overlap")]
    OverlappingSignals {
        message: String,
        id: u32,
        first: String,
        second: String,
    },

    /// A physical signal has a zero scale; the message is rejected
    #[error("message '{message}' (0x{id:X}) rejected: signal '{signal}' has zero scale")]
    ZeroScale {
        message: String,
        id: u32,
        signal: String,
    },

    /// Frame length, signal length or multiplexing is unusable; the message is rejected
    #[error("message '{message}' (0x{id:X}) rejected: {reason}")]
    InvalidMessage {
        message: String,
        id: u32,
        reason: String,
    },

    /// A second definition of an id already in the catalog; it is rejected
    #[error("message '{message}' (0x{id:X}) rejected: id already defined by '{existing}'")]
    DuplicateMessage {
        message: String,
        id: u32,
        existing: String,
    },

    /// A comment, attribute or value table names an unknown message/signal
    #[error("line {line}: {keyword} refers to unknown {target}")]
    UnmatchedReference {
        line: usize,
        keyword: String,
        target: String,
    },
}

impl LoadIssue {
    /// True if this issue removed a message from the catalog
    pub fn rejects_message(&self) -> bool {
        !matches!(self, LoadIssue::UnmatchedReference { .. })
    }
}

/// The message catalog
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Message definitions by canonical CAN ID
    messages: HashMap<u32, MessageDefinition>,

    /// Canonical ids in definition order
    order: Vec<u32>,

    /// Signal name lookup: signal name -> (canonical id, signal index)
    signal_lookup: HashMap<String, Vec<(u32, usize)>>,

    /// Everything reported while loading
    issues: Vec<LoadIssue>,

    /// Node names from `BU_`
    pub(crate) nodes: Vec<String>,

    /// `VERSION` string
    pub(crate) version: Option<String>,
}

impl Catalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from already-parsed definitions.
    ///
    /// Each message is validated on insertion; rejected messages are recorded
    /// in [`Catalog::issues`] and left out.
    pub fn from_messages(messages: impl IntoIterator<Item = MessageDefinition>) -> Self {
        let mut catalog = Self::new();
        for message in messages {
            catalog.add_message(message);
        }
        catalog
    }

    /// Parse DBC source text
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        dbc::parse_dbc(source)
    }

    /// Load a DBC file (UTF-8, falling back to Latin-1)
    pub fn from_file(path: impl AsRef<Path>) -> crate::types::Result<Self> {
        dbc::parse_dbc_file(path.as_ref())
    }

    /// Fold another catalog into this one.
    ///
    /// Messages go through the same validation as at load, so an id already
    /// present here is reported as a duplicate and the incoming definition is
    /// dropped.
    pub fn merge(&mut self, other: Catalog) {
        let Catalog {
            mut messages,
            order,
            issues,
            nodes,
            version,
            ..
        } = other;

        self.issues.extend(issues);
        for node in nodes {
            if !self.nodes.contains(&node) {
                self.nodes.push(node);
            }
        }
        if self.version.is_none() {
            self.version = version;
        }
        for id in order {
            if let Some(message) = messages.remove(&id) {
                self.add_message(message);
            }
        }
    }

    /// Validate and insert a message. Returns false if it was rejected.
    pub(crate) fn add_message(&mut self, mut message: MessageDefinition) -> bool {
        message.id = canonical_id(message.raw_id);

        if let Some(existing) = self.messages.get(&message.id) {
            let issue = LoadIssue::DuplicateMessage {
                message: message.name,
                id: message.id,
                existing: existing.name.clone(),
            };
            self.report(issue);
            return false;
        }

        if let Err(issue) = validate_message(&message) {
            self.report(issue);
            return false;
        }

        for (sig_idx, signal) in message.signals.iter().enumerate() {
            self.signal_lookup
                .entry(signal.name.clone())
                .or_default()
                .push((message.id, sig_idx));
        }

        self.order.push(message.id);
        self.messages.insert(message.id, message);
        true
    }

    pub(crate) fn report(&mut self, issue: LoadIssue) {
        log::warn!("{}", issue);
        self.issues.push(issue);
    }

    /// Look up a message by identifier. The id is canonicalized first, so
    /// both `0x8000223A` and `0x223A` find the same message.
    pub fn lookup(&self, id: u32) -> Option<&MessageDefinition> {
        self.messages.get(&canonical_id(id))
    }

    /// All messages in definition order
    pub fn messages(&self) -> impl Iterator<Item = &MessageDefinition> {
        self.order.iter().filter_map(|id| self.messages.get(id))
    }

    /// Find all messages containing a specific signal name
    pub fn find_signal(&self, signal_name: &str) -> Vec<(u32, &SignalDefinition)> {
        self.signal_lookup
            .get(signal_name)
            .map(|locations| {
                locations
                    .iter()
                    .filter_map(|(can_id, sig_idx)| {
                        self.messages
                            .get(can_id)
                            .and_then(|msg| msg.signals.get(*sig_idx))
                            .map(|sig| (*can_id, sig))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// True if any loaded message defines this signal
    pub fn contains_signal(&self, signal_name: &str) -> bool {
        self.signal_lookup.contains_key(signal_name)
    }

    /// Issues found while loading
    pub fn issues(&self) -> &[LoadIssue] {
        &self.issues
    }

    /// Node names declared in `BU_`
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// `VERSION` string, if declared
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Get catalog statistics
    pub fn stats(&self) -> DatabaseStats {
        let num_messages = self.messages.len();
        let num_signals = self.messages.values().map(|m| m.signals.len()).sum();
        let num_reserved = self
            .messages
            .values()
            .flat_map(|m| m.signals.iter())
            .filter(|s| s.is_reserved())
            .count();
        let num_rejected = self.issues.iter().filter(|i| i.rejects_message()).count();

        DatabaseStats {
            num_messages,
            num_signals,
            num_reserved,
            num_rejected,
        }
    }
}

/// Check the layout invariants of one message
fn validate_message(message: &MessageDefinition) -> Result<(), LoadIssue> {
    let invalid = |reason: String| LoadIssue::InvalidMessage {
        message: message.name.clone(),
        id: message.id,
        reason,
    };

    if message.size > 64 {
        return Err(invalid(format!("length {} exceeds 64 bytes", message.size)));
    }
    if let Some(signal) = message
        .signals
        .iter()
        .find(|s| s.length == 0 || s.length > 64)
    {
        return Err(invalid(format!(
            "signal '{}' has length {} bits",
            signal.name, signal.length
        )));
    }
    if message.multiplexer_signal().is_none() {
        let orphan = message
            .signals
            .iter()
            .find(|s| matches!(s.multiplexer, Some(Multiplexer::Multiplexed(_))));
        if let Some(signal) = orphan {
            return Err(invalid(format!(
                "multiplexed signal '{}' but no multiplexer switch",
                signal.name
            )));
        }
    }

    for signal in &message.signals {
        if !layout::fits_in_frame(signal, message.size) {
            return Err(LoadIssue::OutOfFrame {
                message: message.name.clone(),
                id: message.id,
                signal: signal.name.clone(),
                size: message.size,
            });
        }
        if let SignalKind::Physical { scale, .. } = signal.kind {
            if scale == 0.0 {
                return Err(LoadIssue::ZeroScale {
                    message: message.name.clone(),
                    id: message.id,
                    signal: signal.name.clone(),
                });
            }
        }
    }

    let masks: Vec<Vec<u64>> = message
        .signals
        .iter()
        .map(|s| layout::occupancy(s, message.size))
        .collect();

    for (i, first) in message.signals.iter().enumerate() {
        for (j, second) in message.signals.iter().enumerate().skip(i + 1) {
            if first.is_reserved() || second.is_reserved() {
                continue;
            }
            if exclusive_multiplex(first, second) {
                continue;
            }
            if layout::overlaps(&masks[i], &masks[j]) {
                return Err(LoadIssue::OverlappingSignals {
                    message: message.name.clone(),
                    id: message.id,
                    first: first.name.clone(),
                    second: second.name.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Multiplexed signals on different switch values never appear together
fn exclusive_multiplex(a: &SignalDefinition, b: &SignalDefinition) -> bool {
    match (a.multiplexer, b.multiplexer) {
        (Some(Multiplexer::Multiplexed(x)), Some(Multiplexer::Multiplexed(y))) => x != y,
        _ => false,
    }
}

/// Catalog statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Number of accepted message definitions
    pub num_messages: usize,
    /// Number of signal definitions (reserved included)
    pub num_signals: usize,
    /// Number of reserved/padding signals
    pub num_reserved: usize,
    /// Number of message definitions rejected at load
    pub num_rejected: usize,
}
