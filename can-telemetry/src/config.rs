//! Decoder configuration types
//!
//! This module defines the options the frame decoder honours. Monitoring
//! options (evaluation cadence, staleness defaults) live in the application
//! layer.

use crate::types::canonical_id;
use serde::{Deserialize, Serialize};

/// Configuration for the frame decoder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Include raw reserved/padding fields in decoded frames
    #[serde(default)]
    pub include_reserved_fields: bool,

    /// Optional: only decode these CAN message IDs (either id spelling)
    #[serde(default)]
    pub message_filter: Option<Vec<u32>>,
}

impl DecoderConfig {
    /// Create a new decoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: report raw reserved fields alongside physical signals
    pub fn with_reserved_fields(mut self, enabled: bool) -> Self {
        self.include_reserved_fields = enabled;
        self
    }

    /// Builder method: set message filter
    pub fn with_message_filter(mut self, messages: Vec<u32>) -> Self {
        self.message_filter = Some(messages);
        self
    }

    /// Check if a message ID should be processed
    pub fn should_process_message(&self, can_id: u32) -> bool {
        match &self.message_filter {
            Some(messages) => {
                let id = canonical_id(can_id);
                messages.iter().any(|m| canonical_id(*m) == id)
            }
            None => true,
        }
    }
}
