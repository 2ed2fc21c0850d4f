//! Message catalog and DBC parser
//!
//! This module contains the DBC parser, the bit layout rules shared with the
//! frame decoder, and the validated catalog both produce.

pub mod database;
pub mod dbc;
pub mod layout;

// Re-export key types for convenience
pub use database::{
    AttributeValue, ByteOrder, Catalog, DatabaseStats, LoadIssue, MessageDefinition, Multiplexer,
    SignalDefinition, SignalKind, ValueType,
};
