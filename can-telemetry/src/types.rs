//! Core types for the CAN telemetry library
//!
//! This module defines the frames the pipeline consumes, the decoded values it
//! emits, and the error types shared by the catalog loader, frame decoder and
//! rule set loader.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;

/// Timestamp type used throughout the pipeline
pub type Timestamp = DateTime<Utc>;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Mask selecting the 29 identifier bits of an extended CAN id
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF;

/// Extended-frame flag as it appears in DBC identifiers (bit 31)
pub const CAN_EFF_FLAG: u32 = 0x8000_0000;

/// Maximum payload of a classic CAN frame
pub const MAX_PAYLOAD_LEN: usize = 8;

/// Canonicalize a CAN identifier by masking it to the low 29 bits.
///
/// DBC files mark extended identifiers by setting bit 31, while most
/// transports deliver the bare 29-bit id. Every catalog insertion and every
/// frame lookup goes through this function so both spellings of the same
/// logical id resolve to one message.
#[inline]
pub fn canonical_id(id: u32) -> u32 {
    id & CAN_EFF_MASK
}

/// Raw CAN frame delivered by a transport
#[derive(Debug, Clone, PartialEq)]
pub struct CanFrame {
    /// Timestamp in nanoseconds since epoch
    pub timestamp_ns: u64,
    /// CAN message ID (11-bit or 29-bit, with or without the extended flag)
    pub can_id: u32,
    /// Frame data bytes (0-8 bytes)
    pub data: Vec<u8>,
    /// True if this is an extended (29-bit) CAN ID
    pub is_extended: bool,
    /// True if this is an error frame
    pub is_error_frame: bool,
    /// True if this is a remote frame
    pub is_remote_frame: bool,
}

impl CanFrame {
    /// Create a data frame
    pub fn new(timestamp_ns: u64, can_id: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp_ns,
            can_id,
            data: data.into(),
            is_extended: can_id > 0x7FF,
            is_error_frame: false,
            is_remote_frame: false,
        }
    }

    /// Convert timestamp from nanoseconds to DateTime<Utc>
    pub fn timestamp(&self) -> Timestamp {
        let secs = (self.timestamp_ns / 1_000_000_000) as i64;
        let nsecs = (self.timestamp_ns % 1_000_000_000) as u32;
        DateTime::from_timestamp(secs, nsecs).unwrap_or_else(Utc::now)
    }

    /// Get the data length code (DLC) - number of data bytes
    pub fn dlc(&self) -> usize {
        self.data.len()
    }

    /// The identifier used for catalog lookup
    pub fn canonical_id(&self) -> u32 {
        canonical_id(self.can_id)
    }
}

/// Malformed catalog grammar
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {reason}")]
pub struct ParseError {
    /// 1-based line where the offending statement starts
    pub line: usize,
    /// What was wrong
    pub reason: String,
}

impl ParseError {
    pub fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

/// Per-frame decode failures. None of these stop the frame stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Unknown message: CAN ID 0x{0:X}")]
    UnknownMessage(u32),

    #[error("Payload of {len} bytes for CAN ID 0x{id:X} exceeds 8 bytes")]
    PayloadTooLong { id: u32, len: usize },

    #[error("Signal '{signal}' of CAN ID 0x{id:X} needs {required} bytes but frame has {actual}")]
    TruncatedPayload {
        id: u32,
        signal: String,
        required: usize,
        actual: usize,
    },
}

/// Malformed rule set source
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rule set must be a JSON object keyed by signal name")]
    NotAnObject,

    #[error("rule '{signal}': {reason}")]
    InvalidRule { signal: String, reason: String },
}

/// Errors surfaced by file-level loaders and the pipeline
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Failed to parse DBC file {path:?}: {source}")]
    DbcParseError {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("Failed to load rule set {path:?}: {source}")]
    RuleSetError {
        path: PathBuf,
        #[source]
        source: RuleError,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A decoded physical signal
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSignal {
    /// Signal name from the catalog
    pub name: String,
    /// Physical value (`raw * scale + offset`)
    pub value: f64,
    /// Raw value after sign extension, before scaling
    pub raw_value: i64,
    /// Engineering unit (e.g., "°C", "V")
    pub unit: Option<String>,
    /// Value description from `VAL_` tables (e.g., "Undervoltage")
    pub value_description: Option<String>,
}

/// Raw content of a reserved/padding field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedField {
    pub name: String,
    pub raw_value: u64,
}

/// All signals of one frame, assembled before anything is published
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Canonical (29-bit) CAN id
    pub can_id: u32,
    /// Message name from the catalog
    pub message_name: String,
    /// Physical signals in catalog order
    pub signals: Vec<DecodedSignal>,
    /// Raw reserved fields (empty unless requested in the decoder config)
    pub reserved: Vec<ReservedField>,
    /// Active multiplexer value (if the message is multiplexed)
    pub multiplexer_value: Option<u64>,
}

impl DecodedFrame {
    /// Find a decoded signal by name
    pub fn get(&self, name: &str) -> Option<&DecodedSignal> {
        self.signals.iter().find(|s| s.name == name)
    }

    /// Physical value of a signal, if it was decoded from this frame
    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).map(|s| s.value)
    }
}

impl fmt::Display for DecodedSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {:.3}", self.name, self.value)?;
        if let Some(unit) = &self.unit {
            write!(f, " {}", unit)?;
        }
        if let Some(desc) = &self.value_description {
            write!(f, " ({})", desc)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_id_masks_extended_flag() {
        assert_eq!(canonical_id(2147492410), 0x223A);
        assert_eq!(canonical_id(0x223A), 0x223A);
        assert_eq!(canonical_id(CAN_EFF_FLAG | 0x1806E5F4), 0x1806E5F4);
    }

    #[test]
    fn test_frame_timestamp_conversion() {
        let frame = CanFrame::new(1_500_000_000, 0x123, vec![1, 2, 3]);
        assert_eq!(frame.timestamp().timestamp(), 1);
        assert_eq!(frame.timestamp().timestamp_subsec_millis(), 500);
        assert_eq!(frame.dlc(), 3);
        assert!(!frame.is_extended);
    }

    #[test]
    fn test_decoded_signal_display() {
        let signal = DecodedSignal {
            name: "ControllerTemp".to_string(),
            value: 30.0,
            raw_value: 300,
            unit: Some("C".to_string()),
            value_description: None,
        };
        assert_eq!(signal.to_string(), "ControllerTemp = 30.000 C");
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new(12, "expected ':'");
        assert_eq!(err.to_string(), "line 12: expected ':'");
    }
}
