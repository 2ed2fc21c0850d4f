//! CAN Telemetry Library
//!
//! Decodes raw CAN frames into physically scaled signal values using a DBC
//! catalog, keeps the latest value of every signal in a shared cache, and
//! validates cached values against a rule set.
//!
//! # Architecture
//!
//! - [`Catalog`]: immutable message/signal definitions parsed from DBC text
//! - [`message_decoder`]: pure frame decoding (Motorola and Intel layouts,
//!   sign extension, multiplexing, reserved fields)
//! - [`Decoder`]: pipeline entry point; decodes frames and publishes them to
//!   the [`SignalCache`] as complete batches
//! - [`validation`]: rule set loading, evaluation, fault code mapping and
//!   violation tracking
//!
//! The library does NOT:
//! - Open a CAN bus or any other transport
//! - Persist decoded data
//! - Decide how violations are presented
//!
//! Reading captures and reporting are in the application layer
//! (can-telemetry-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use can_telemetry::{CanFrame, Decoder, RuleSet, ValidationEngine};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! // Load the catalog and rules
//! let decoder = Decoder::from_dbc_files(&[Path::new("hv500.dbc")]).unwrap();
//! let rules = Arc::new(RuleSet::from_file("rules.json").unwrap());
//! rules.resolve(decoder.catalog());
//! let engine = ValidationEngine::new(rules);
//!
//! // Feed frames from a transport
//! let frame = CanFrame::new(0, 0x223A, vec![0x01, 0x2C, 0, 0, 0, 0, 0, 0]);
//! if let Err(e) = decoder.process_frame(&frame) {
//!     eprintln!("Decode error: {}", e);
//! }
//!
//! // Evaluate on a tick
//! for violation in engine.evaluate(&decoder.cache().snapshot()) {
//!     println!("{}", violation);
//! }
//! ```

// Public modules
pub mod cache;
pub mod config;
pub mod decoder;
pub mod message_decoder;
pub mod signals;
pub mod types;
pub mod validation;

// Re-export main types for convenience
pub use cache::{CacheEntry, CacheSnapshot, SignalCache};
pub use config::DecoderConfig;
pub use decoder::{Decoder, FrameStats};
pub use message_decoder::{decode, decode_with};
pub use signals::{Catalog, DatabaseStats, LoadIssue};
pub use types::{
    canonical_id, CanFrame, DecodeError, DecodedFrame, DecodedSignal, DecoderError, ParseError,
    ReservedField, Result, RuleError, Timestamp,
};
pub use validation::{
    evaluate, RuleSet, Severity, Transitions, UnresolvedRule, ValidationEngine, Violation,
    ViolationKind, ViolationTracker,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
