//! Text CAN capture reader
//!
//! One frame per line, as written by the vehicle's serial CAN adapter. If the
//! line is CSV only the first column is used.
//!
//! ```text
//! t0A8807D00000000000006F7F
//! x0000223A8012C000002000000001A
//! ```
//!
//! `t` is followed by a 3-digit (11-bit) id, `x` by an 8-digit (29-bit) id.
//! Then come one length digit, the data bytes in hex, and a 4-digit hex
//! millisecond timestamp that wraps at 60000.

use anyhow::{bail, Context, Result};
use can_telemetry::CanFrame;
use std::io::BufRead;

/// Adapter timestamps count milliseconds modulo one minute
const TIMESTAMP_WRAP_MS: u64 = 60_000;

/// Fields of one capture line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub can_id: u32,
    pub is_extended: bool,
    pub data: Vec<u8>,
    /// Adapter timestamp in ms (0..60000)
    pub timestamp_ms: u16,
}

/// Parse one capture line
pub fn parse_line(line: &str) -> Result<LogLine> {
    let field = line.split(',').next().unwrap_or("").trim();

    let (is_extended, id_len) = match field.chars().next() {
        Some('t') => (false, 3),
        Some('x') => (true, 8),
        Some(other) => bail!("unknown frame type '{}'", other),
        None => bail!("empty line"),
    };

    let body = &field[1..];
    if !body.is_ascii() || body.len() < id_len + 1 + 4 {
        bail!("line too short: '{}'", field);
    }

    let can_id = u32::from_str_radix(&body[..id_len], 16)
        .with_context(|| format!("invalid id '{}'", &body[..id_len]))?;
    let dlc = body[id_len..id_len + 1]
        .parse::<usize>()
        .with_context(|| format!("invalid length '{}'", &body[id_len..id_len + 1]))?;

    let data_hex = &body[id_len + 1..body.len() - 4];
    if data_hex.len() != dlc * 2 {
        bail!(
            "length {} does not match {} data digits",
            dlc,
            data_hex.len()
        );
    }
    let data = (0..dlc)
        .map(|i| u8::from_str_radix(&data_hex[i * 2..i * 2 + 2], 16))
        .collect::<std::result::Result<Vec<u8>, _>>()
        .with_context(|| format!("invalid data '{}'", data_hex))?;

    let ts_hex = &body[body.len() - 4..];
    let timestamp_ms = u16::from_str_radix(ts_hex, 16)
        .with_context(|| format!("invalid timestamp '{}'", ts_hex))?;

    Ok(LogLine {
        can_id,
        is_extended,
        data,
        timestamp_ms,
    })
}

/// Iterator over the frames of a capture.
///
/// Malformed lines are logged, counted and skipped. Wrapping adapter
/// timestamps are unrolled into a monotonic time base.
pub struct LogReader<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
    malformed: usize,
    last_ms: Option<u64>,
    epoch_ms: u64,
}

impl<R: BufRead> LogReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            malformed: 0,
            last_ms: None,
            epoch_ms: 0,
        }
    }

    /// Number of lines skipped so far
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    fn unwrap_timestamp(&mut self, ms: u16) -> u64 {
        let ms = ms as u64;
        if let Some(last) = self.last_ms {
            if ms < last {
                self.epoch_ms += TIMESTAMP_WRAP_MS;
            }
        }
        self.last_ms = Some(ms);
        self.epoch_ms + ms
    }
}

impl<R: BufRead> Iterator for LogReader<R> {
    type Item = Result<CanFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(anyhow::Error::new(e).context("failed to read log"))),
            };
            self.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }

            match parse_line(&line) {
                Ok(parsed) => {
                    let time_ms = self.unwrap_timestamp(parsed.timestamp_ms);
                    let mut frame =
                        CanFrame::new(time_ms * 1_000_000, parsed.can_id, parsed.data);
                    frame.is_extended = parsed.is_extended;
                    return Some(Ok(frame));
                }
                Err(e) => {
                    log::debug!("Skipping line {}: {:#}", self.line_no, e);
                    self.malformed += 1;
                }
            }
        }
    }
}
