//! Message Decoding Engine
//!
//! Extracts signal values from raw CAN frames based on signal definitions
//! from the catalog. Handles bit extraction, endianness, sign extension,
//! multiplexing, and physical value conversion.
//!
//! Every signal of a message is decoded before a [`DecodedFrame`] is
//! returned. A frame that cannot be decoded in full yields an error and no
//! values at all.

use crate::config::DecoderConfig;
use crate::signals::database::{
    ByteOrder, Catalog, MessageDefinition, Multiplexer, SignalDefinition, SignalKind, ValueType,
};
use crate::signals::layout;
use crate::types::{
    canonical_id, DecodeError, DecodedFrame, DecodedSignal, ReservedField, MAX_PAYLOAD_LEN,
};

/// Decode a frame with the default configuration
pub fn decode(catalog: &Catalog, frame_id: u32, data: &[u8]) -> Result<DecodedFrame, DecodeError> {
    decode_with(catalog, frame_id, data, &DecoderConfig::default())
}

/// Decode a frame: resolve the message by canonical id, then decode it
pub fn decode_with(
    catalog: &Catalog,
    frame_id: u32,
    data: &[u8],
    config: &DecoderConfig,
) -> Result<DecodedFrame, DecodeError> {
    let id = canonical_id(frame_id);
    if data.len() > MAX_PAYLOAD_LEN {
        return Err(DecodeError::PayloadTooLong {
            id,
            len: data.len(),
        });
    }

    let message_def = catalog
        .lookup(id)
        .ok_or(DecodeError::UnknownMessage(id))?;

    MessageDecoder::decode(message_def, data, config)
}

/// Message decoder - extracts signals from CAN frames
pub struct MessageDecoder;

impl MessageDecoder {
    /// Decode a CAN payload against its message definition
    ///
    /// # Arguments
    /// * `message_def` - Message definition from the catalog
    /// * `data` - Raw payload bytes
    /// * `config` - Decoder options (reserved field reporting)
    ///
    /// # Returns
    /// * `Ok(DecodedFrame)` with every active signal of the message
    /// * `Err(DecodeError::TruncatedPayload)` if any active signal lies past
    ///   the end of the payload
    pub fn decode(
        message_def: &MessageDefinition,
        data: &[u8],
        config: &DecoderConfig,
    ) -> Result<DecodedFrame, DecodeError> {
        // For multiplexed messages, first extract the multiplexer signal value
        let multiplexer_value = match message_def.multiplexer_signal() {
            Some(mux_signal) => {
                Self::check_fits(message_def, mux_signal, data)?;
                Some(Self::extract_raw_bits(data, mux_signal))
            }
            None => None,
        };

        let mut signals = Vec::with_capacity(message_def.signals.len());
        let mut reserved = Vec::new();

        for signal in &message_def.signals {
            // Check if signal should be decoded based on multiplexer
            if let Some(Multiplexer::Multiplexed(value)) = signal.multiplexer {
                if multiplexer_value != Some(value) {
                    continue;
                }
            }

            Self::check_fits(message_def, signal, data)?;

            match signal.kind {
                SignalKind::Physical { .. } => signals.push(Self::decode_signal(data, signal)),
                SignalKind::Reserved => {
                    if config.include_reserved_fields {
                        reserved.push(ReservedField {
                            name: signal.name.clone(),
                            raw_value: Self::extract_raw_bits(data, signal),
                        });
                    }
                }
            }
        }

        log::debug!(
            "Decoded message: {} (ID 0x{:X}), {} signals",
            message_def.name,
            message_def.id,
            signals.len()
        );

        Ok(DecodedFrame {
            can_id: message_def.id,
            message_name: message_def.name.clone(),
            signals,
            reserved,
            multiplexer_value,
        })
    }

    /// Reject payloads that end before the signal does
    fn check_fits(
        message_def: &MessageDefinition,
        signal: &SignalDefinition,
        data: &[u8],
    ) -> Result<(), DecodeError> {
        // Layout was validated against the declared size at load
        debug_assert!(
            layout::fits_in_frame(signal, message_def.size),
            "signal '{}' escaped catalog validation",
            signal.name
        );

        let required = layout::required_bytes(signal);
        if required > data.len() {
            return Err(DecodeError::TruncatedPayload {
                id: message_def.id,
                signal: signal.name.clone(),
                required,
                actual: data.len(),
            });
        }
        Ok(())
    }

    /// Decode a single physical signal from CAN frame data
    fn decode_signal(data: &[u8], signal: &SignalDefinition) -> DecodedSignal {
        let bits = Self::extract_raw_bits(data, signal);
        let length = signal.length as usize;

        // Apply sign extension if needed
        let (raw_value, raw_as_f64) = match signal.value_type {
            ValueType::Unsigned => (bits as i64, bits as f64),
            ValueType::Signed => {
                let signed = Self::sign_extend(bits, length);
                (signed, signed as f64)
            }
        };

        // Apply physical value conversion (scale and offset)
        let value = match signal.kind {
            SignalKind::Physical { scale, offset, .. } => raw_as_f64 * scale + offset,
            SignalKind::Reserved => raw_as_f64,
        };

        DecodedSignal {
            name: signal.name.clone(),
            value,
            raw_value,
            unit: signal.unit.clone(),
            value_description: signal.describe(raw_value).map(str::to_string),
        }
    }

    /// Extract the unsigned bit pattern of a signal
    fn extract_raw_bits(data: &[u8], signal: &SignalDefinition) -> u64 {
        let start_bit = signal.start_bit as usize;
        let length = signal.length as usize;

        match signal.byte_order {
            ByteOrder::LittleEndian => Self::extract_little_endian(data, start_bit, length),
            ByteOrder::BigEndian => Self::extract_big_endian(data, start_bit, length),
        }
    }

    /// Extract signal with little-endian (Intel) byte order
    ///
    /// Little-endian format:
    /// - Start bit points to the LSB (least significant bit)
    /// - Bits are numbered from LSB to MSB within each byte
    /// - Byte 0 is the first byte in the CAN frame
    fn extract_little_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
        let mut result: u64 = 0;

        for i in 0..length {
            let bit_pos = start_bit + i;
            let byte_idx = bit_pos / 8;
            let bit_in_byte = bit_pos % 8;

            if byte_idx < data.len() {
                let bit_value = (data[byte_idx] >> bit_in_byte) & 0x01;
                result |= (bit_value as u64) << i;
            }
        }

        result
    }

    /// Extract signal with big-endian (Motorola) byte order
    ///
    /// Big-endian format in CAN:
    /// - Start bit points to the MSB of the signal, in DBC numbering
    ///   (bit 7 = MSB of byte 0)
    /// - The signal continues toward lower bit numbers and wraps to bit 7 of
    ///   the next byte after bit 0
    /// - Bits are assembled MSB first, preserving wire order
    fn extract_big_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
        let mut result: u64 = 0;
        let msb = layout::motorola_msb_index(start_bit);

        for index in msb..msb + length {
            let bit_pos = layout::sawtooth_to_bit(index);
            let byte_idx = bit_pos / 8;
            let bit_in_byte = bit_pos % 8;

            let bit_value = data
                .get(byte_idx)
                .map(|byte| (byte >> bit_in_byte) & 0x01)
                .unwrap_or(0);
            result = (result << 1) | bit_value as u64;
        }

        result
    }

    /// Sign-extend a value from N bits to 64 bits
    ///
    /// If the value's MSB is 1, fill the upper bits with 1s.
    /// This converts unsigned representation to proper signed value.
    fn sign_extend(value: u64, bit_length: usize) -> i64 {
        if bit_length >= 64 {
            return value as i64;
        }

        let sign_bit = 1u64 << (bit_length - 1);
        if (value & sign_bit) != 0 {
            // Negative value - sign extend
            let mask = !0u64 << bit_length;
            (value | mask) as i64
        } else {
            // Positive value
            value as i64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        let mode = SignalDefinition::new(
            "Mode",
            7,
            8,
            ByteOrder::BigEndian,
            ValueType::Unsigned,
            SignalKind::physical(1.0, 0.0, 0.0, 3.0),
        );
        let mut voltage = SignalDefinition::new(
            "Voltage",
            15,
            16,
            ByteOrder::BigEndian,
            ValueType::Unsigned,
            SignalKind::physical(0.1, 0.0, 0.0, 1000.0),
        );
        voltage.multiplexer = Some(Multiplexer::Multiplexed(1));
        let mut current = SignalDefinition::new(
            "Current",
            15,
            16,
            ByteOrder::BigEndian,
            ValueType::Signed,
            SignalKind::physical(0.01, 0.0, -300.0, 300.0),
        );
        current.multiplexer = Some(Multiplexer::Multiplexed(2));
        let mut switch = mode.clone();
        switch.multiplexer = Some(Multiplexer::Switch);

        let muxed = MessageDefinition::new(0x300, "Muxed", 8)
            .with_signal(switch)
            .with_signal(voltage)
            .with_signal(current);

        let padded = MessageDefinition::new(0x301, "Padded", 4)
            .with_signal(SignalDefinition::new(
                "Level",
                7,
                8,
                ByteOrder::BigEndian,
                ValueType::Unsigned,
                SignalKind::physical(1.0, 0.0, 0.0, 255.0),
            ))
            .with_signal(SignalDefinition::new(
                "Pad",
                15,
                24,
                ByteOrder::BigEndian,
                ValueType::Unsigned,
                SignalKind::Reserved,
            ));

        Catalog::from_messages([muxed, padded])
    }

    #[test]
    fn test_extract_little_endian_simple() {
        // Signal: 8 bits starting at bit 0 (byte 0)
        let data = vec![0xAB, 0xCD, 0xEF, 0x12];
        let value = MessageDecoder::extract_little_endian(&data, 0, 8);
        assert_eq!(value, 0xAB);
    }

    #[test]
    fn test_extract_little_endian_cross_byte() {
        // Signal: 16 bits starting at bit 0 (bytes 0-1)
        let data = vec![0xAB, 0xCD, 0xEF, 0x12];
        let value = MessageDecoder::extract_little_endian(&data, 0, 16);
        assert_eq!(value, 0xCDAB); // Little-endian byte order
    }

    #[test]
    fn test_extract_big_endian_simple() {
        // Signal: 8 bits starting at bit 7 (byte 0)
        let data = vec![0xAB, 0xCD, 0xEF, 0x12];
        let value = MessageDecoder::extract_big_endian(&data, 7, 8);
        assert_eq!(value, 0xAB);
    }

    #[test]
    fn test_extract_big_endian_cross_byte() {
        let data = vec![0xAB, 0xCD, 0xEF, 0x12];
        // 16 bits from the MSB of byte 0
        assert_eq!(MessageDecoder::extract_big_endian(&data, 7, 16), 0xABCD);
        // 12 bits from bit 3 of byte 0: low nibble of byte 0, all of byte 1
        assert_eq!(MessageDecoder::extract_big_endian(&data, 3, 12), 0xBCD);
        // 4 bits from bit 3: low nibble of byte 0 only
        assert_eq!(MessageDecoder::extract_big_endian(&data, 3, 4), 0xB);
    }

    #[test]
    fn test_sign_extend_positive() {
        // 8-bit value 0x7F (127) should remain positive
        let value = MessageDecoder::sign_extend(0x7F, 8);
        assert_eq!(value, 127);
    }

    #[test]
    fn test_sign_extend_negative() {
        // 8-bit value 0xFF (-1 in two's complement) should become -1
        let value = MessageDecoder::sign_extend(0xFF, 8);
        assert_eq!(value, -1);
    }

    #[test]
    fn test_sign_extend_negative_16bit() {
        // 16-bit value 0x8000 (-32768 in two's complement)
        let value = MessageDecoder::sign_extend(0x8000, 16);
        assert_eq!(value, -32768);
    }

    #[test]
    fn test_multiplexed_signals_follow_switch() {
        let catalog = catalog();

        let frame = decode(&catalog, 0x300, &[1, 0x01, 0xF4, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(frame.multiplexer_value, Some(1));
        assert!(frame.get("Current").is_none());
        assert!((frame.value("Voltage").unwrap() - 50.0).abs() < 1e-9);

        let frame = decode(&catalog, 0x300, &[2, 0xFF, 0x38, 0, 0, 0, 0, 0]).unwrap();
        assert!(frame.get("Voltage").is_none());
        assert!((frame.value("Current").unwrap() + 2.0).abs() < 1e-9);

        let frame = decode(&catalog, 0x300, &[3, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(frame.signals.len(), 1);
        assert_eq!(frame.signals[0].name, "Mode");
    }

    #[test]
    fn test_reserved_fields_only_on_request() {
        let catalog = catalog();
        let data = [0x10, 0xAA, 0xBB, 0xCC];

        let frame = decode(&catalog, 0x301, &data).unwrap();
        assert_eq!(frame.signals.len(), 1);
        assert!(frame.reserved.is_empty());

        let config = DecoderConfig::new().with_reserved_fields(true);
        let frame = decode_with(&catalog, 0x301, &data, &config).unwrap();
        assert_eq!(
            frame.reserved,
            vec![ReservedField {
                name: "Pad".to_string(),
                raw_value: 0xAABBCC,
            }]
        );
    }

    #[test]
    fn test_truncated_payload_rejects_whole_frame() {
        let catalog = catalog();
        let err = decode(&catalog, 0x301, &[0x10, 0xAA]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TruncatedPayload {
                id: 0x301,
                signal: "Pad".to_string(),
                required: 4,
                actual: 2,
            }
        );
    }

    #[test]
    fn test_payload_too_long_and_unknown_id() {
        let catalog = catalog();
        assert_eq!(
            decode(&catalog, 0x300, &[0; 9]).unwrap_err(),
            DecodeError::PayloadTooLong { id: 0x300, len: 9 }
        );
        assert_eq!(
            decode(&catalog, 0x8000_0999, &[0; 8]).unwrap_err(),
            DecodeError::UnknownMessage(0x999)
        );
    }
}
