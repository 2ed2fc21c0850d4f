//! Main decoder API
//!
//! This module provides the pipeline entry point. The [`Decoder`] owns shared
//! handles to the catalog and the signal cache, decodes each frame a
//! transport delivers, and publishes complete frames into the cache.

use crate::cache::SignalCache;
use crate::config::DecoderConfig;
use crate::message_decoder;
use crate::signals::{Catalog, DatabaseStats};
use crate::types::{CanFrame, DecodeError, DecodedFrame, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The main decoder struct - decodes frames and publishes them to the cache.
///
/// `Decoder` is `Send + Sync`; one instance can be shared between the
/// transport thread(s) and whoever reads the counters.
#[derive(Debug)]
pub struct Decoder {
    catalog: Arc<Catalog>,
    cache: Arc<SignalCache>,
    config: DecoderConfig,
    counters: FrameCounters,
}

impl Decoder {
    /// Create a decoder with its own empty cache
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::with_cache(catalog, Arc::new(SignalCache::new()))
    }

    /// Create a decoder that publishes into an existing cache
    pub fn with_cache(catalog: Arc<Catalog>, cache: Arc<SignalCache>) -> Self {
        Self {
            catalog,
            cache,
            config: DecoderConfig::default(),
            counters: FrameCounters::default(),
        }
    }

    /// Load one or more DBC files into a single catalog
    ///
    /// # Example
    /// ```no_run
    /// use can_telemetry::Decoder;
    /// use std::path::Path;
    ///
    /// let paths = [Path::new("hv500.dbc"), Path::new("ams.dbc")];
    /// let decoder = Decoder::from_dbc_files(&paths).unwrap();
    /// println!("{} messages", decoder.database_stats().num_messages);
    /// ```
    pub fn from_dbc_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut catalog = Catalog::new();
        for path in paths {
            log::info!("Loading DBC file: {:?}", path.as_ref());
            catalog.merge(Catalog::from_file(path)?);
        }
        Ok(Self::new(Arc::new(catalog)))
    }

    /// Builder method: set decoder options
    pub fn with_config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Decode one frame and publish its signals.
    ///
    /// # Returns
    /// * `Ok(Some(frame))` - decoded and published
    /// * `Ok(None)` - error/remote frame, or filtered out by configuration
    /// * `Err(_)` - unknown id or undecodable payload; nothing was published
    pub fn process_frame(
        &self,
        frame: &CanFrame,
    ) -> std::result::Result<Option<DecodedFrame>, DecodeError> {
        self.counters.seen.fetch_add(1, Ordering::Relaxed);

        if frame.is_error_frame || frame.is_remote_frame {
            log::trace!("Skipping non-data frame 0x{:X}", frame.can_id);
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        if !self.config.should_process_message(frame.can_id) {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        match message_decoder::decode_with(&self.catalog, frame.can_id, &frame.data, &self.config) {
            Ok(decoded) => {
                self.cache.publish(&decoded, frame.timestamp());
                self.counters.decoded.fetch_add(1, Ordering::Relaxed);
                Ok(Some(decoded))
            }
            Err(err @ DecodeError::UnknownMessage(_)) => {
                log::trace!("{}", err);
                self.counters.unknown.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
            Err(err) => {
                log::debug!("Rejected frame: {}", err);
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn cache(&self) -> &Arc<SignalCache> {
        &self.cache
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Get statistics about the loaded catalog
    pub fn database_stats(&self) -> DatabaseStats {
        self.catalog.stats()
    }

    /// Frame counters since construction
    pub fn frame_stats(&self) -> FrameStats {
        FrameStats {
            frames_seen: self.counters.seen.load(Ordering::Relaxed),
            frames_decoded: self.counters.decoded.load(Ordering::Relaxed),
            unknown_messages: self.counters.unknown.load(Ordering::Relaxed),
            rejected_frames: self.counters.rejected.load(Ordering::Relaxed),
            skipped_frames: self.counters.skipped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
struct FrameCounters {
    seen: AtomicU64,
    decoded: AtomicU64,
    unknown: AtomicU64,
    rejected: AtomicU64,
    skipped: AtomicU64,
}

/// Frame processing statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    pub frames_seen: u64,
    pub frames_decoded: u64,
    /// Frames whose id is not in the catalog
    pub unknown_messages: u64,
    /// Frames of known messages that could not be decoded
    pub rejected_frames: u64,
    /// Error/remote frames and frames excluded by the message filter
    pub skipped_frames: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{ByteOrder, MessageDefinition, SignalDefinition, SignalKind, ValueType};

    fn decoder() -> Decoder {
        let message = MessageDefinition::new(0x8000_0100, "Status", 2).with_signal(
            SignalDefinition::new(
                "Speed",
                7,
                16,
                ByteOrder::BigEndian,
                ValueType::Unsigned,
                SignalKind::physical(0.5, 0.0, 0.0, 200.0),
            ),
        );
        Decoder::new(Arc::new(Catalog::from_messages([message])))
    }

    #[test]
    fn test_process_frame_publishes_to_cache() {
        let decoder = decoder();
        let frame = CanFrame::new(2_000_000_000, 0x100, vec![0x00, 0x64]);

        let decoded = decoder.process_frame(&frame).unwrap().unwrap();
        assert_eq!(decoded.value("Speed"), Some(50.0));

        let entry = decoder.cache().get("Speed").unwrap();
        assert_eq!(entry.value, 50.0);
        assert_eq!(entry.updated_at, frame.timestamp());
        assert_eq!(entry.message_id, 0x100);
    }

    #[test]
    fn test_counters_track_outcomes() {
        let decoder = decoder();
        assert!(decoder.process_frame(&CanFrame::new(0, 0x999, vec![0; 8])).is_err());
        assert!(decoder.process_frame(&CanFrame::new(0, 0x100, vec![0x01])).is_err());
        assert!(decoder.process_frame(&CanFrame::new(0, 0x100, vec![0, 1])).unwrap().is_some());

        let mut remote = CanFrame::new(0, 0x100, vec![]);
        remote.is_remote_frame = true;
        assert!(decoder.process_frame(&remote).unwrap().is_none());

        assert_eq!(
            decoder.frame_stats(),
            FrameStats {
                frames_seen: 4,
                frames_decoded: 1,
                unknown_messages: 1,
                rejected_frames: 1,
                skipped_frames: 1,
            }
        );
    }

    #[test]
    fn test_rejected_frame_leaves_cache_untouched() {
        let decoder = decoder();
        decoder
            .process_frame(&CanFrame::new(0, 0x100, vec![0x00, 0x64]))
            .unwrap();
        let _ = decoder.process_frame(&CanFrame::new(1, 0x100, vec![0xFF]));
        assert_eq!(decoder.cache().get("Speed").unwrap().value, 50.0);
    }

    #[test]
    fn test_message_filter_skips_frames() {
        let decoder = decoder().with_config(DecoderConfig::new().with_message_filter(vec![0x200]));
        assert!(decoder
            .process_frame(&CanFrame::new(0, 0x100, vec![0, 1]))
            .unwrap()
            .is_none());
        assert!(decoder.cache().is_empty());
    }

    #[test]
    fn test_decoder_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Decoder>();
    }
}
