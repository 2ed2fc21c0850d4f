//! Replay output
//!
//! Text mode prints a readable line per raised/cleared violation and a final
//! summary. JSON mode prints one object per line (JSON Lines).

use crate::config::OutputFormat;
use anyhow::Result;
use can_telemetry::{DatabaseStats, FrameStats, Timestamp, Transitions, Violation};
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct TransitionRecord<'a> {
    event: &'static str,
    time: Timestamp,
    #[serde(flatten)]
    violation: &'a Violation,
}

#[derive(Serialize)]
struct SummaryRecord<'a> {
    event: &'static str,
    catalog: CatalogSummary,
    frames: &'a FrameStats,
    malformed_lines: usize,
    active: Vec<&'a Violation>,
}

#[derive(Serialize)]
struct CatalogSummary {
    messages: usize,
    signals: usize,
    reserved: usize,
    rejected: usize,
}

impl From<DatabaseStats> for CatalogSummary {
    fn from(stats: DatabaseStats) -> Self {
        Self {
            messages: stats.num_messages,
            signals: stats.num_signals,
            reserved: stats.num_reserved,
            rejected: stats.num_rejected,
        }
    }
}

/// Writes replay results in the configured format
pub struct Reporter<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    /// Report the violations raised and cleared on one evaluation tick
    pub fn transitions(&mut self, time: Timestamp, transitions: &Transitions) -> Result<()> {
        let events = transitions
            .raised
            .iter()
            .map(|v| ("raised", v))
            .chain(transitions.cleared.iter().map(|v| ("cleared", v)));

        for (event, violation) in events {
            match self.format {
                OutputFormat::Text => {
                    let marker = if event == "raised" { "+" } else { "-" };
                    writeln!(
                        self.out,
                        "{} {} {}",
                        time.format("%H:%M:%S%.3f"),
                        marker,
                        violation
                    )?;
                }
                OutputFormat::Json => {
                    let record = TransitionRecord {
                        event,
                        time,
                        violation,
                    };
                    serde_json::to_writer(&mut self.out, &record)?;
                    writeln!(self.out)?;
                }
            }
        }
        Ok(())
    }

    /// Final statistics and the violations still active at the end
    pub fn summary<'a>(
        &mut self,
        catalog: DatabaseStats,
        frames: &FrameStats,
        malformed_lines: usize,
        active: impl IntoIterator<Item = &'a Violation>,
    ) -> Result<()> {
        let active: Vec<&Violation> = active.into_iter().collect();

        match self.format {
            OutputFormat::Text => {
                writeln!(self.out)?;
                writeln!(self.out, "Summary")?;
                writeln!(self.out, "───────────────────────────────────────────────")?;
                writeln!(
                    self.out,
                    "  Catalog:   {} messages, {} signals ({} reserved), {} rejected",
                    catalog.num_messages,
                    catalog.num_signals,
                    catalog.num_reserved,
                    catalog.num_rejected
                )?;
                writeln!(
                    self.out,
                    "  Frames:    {} read, {} decoded, {} unknown id, {} rejected, {} skipped",
                    frames.frames_seen,
                    frames.frames_decoded,
                    frames.unknown_messages,
                    frames.rejected_frames,
                    frames.skipped_frames
                )?;
                writeln!(self.out, "  Malformed: {} lines", malformed_lines)?;
                if active.is_empty() {
                    writeln!(self.out, "  Active violations: none")?;
                } else {
                    writeln!(self.out, "  Active violations:")?;
                    for violation in &active {
                        writeln!(self.out, "    {}", violation)?;
                    }
                }
            }
            OutputFormat::Json => {
                let record = SummaryRecord {
                    event: "summary",
                    catalog: catalog.into(),
                    frames,
                    malformed_lines,
                    active,
                };
                serde_json::to_writer(&mut self.out, &record)?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_telemetry::{Severity, ViolationKind};
    use chrono::{TimeZone, Utc};

    fn violation() -> Violation {
        Violation {
            signal: "FAULT".to_string(),
            prefix: Some("MC".to_string()),
            severity: Severity::Fault,
            kind: ViolationKind::FaultCodeActive,
            message: "FAULT: Undervoltage".to_string(),
            value: 2.0,
        }
    }

    #[test]
    fn test_text_transitions() {
        let time = Utc.timestamp_opt(61, 500_000_000).unwrap();
        let transitions = Transitions {
            raised: vec![violation()],
            cleared: vec![],
        };

        let mut reporter = Reporter::new(Vec::new(), OutputFormat::Text);
        reporter.transitions(time, &transitions).unwrap();
        let text = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(text, "00:01:01.500 + [MC] FAULT: FAULT: Undervoltage\n");
    }

    #[test]
    fn test_json_lines() {
        let time = Utc.timestamp_opt(0, 0).unwrap();
        let transitions = Transitions {
            raised: vec![],
            cleared: vec![violation()],
        };

        let mut reporter = Reporter::new(Vec::new(), OutputFormat::Json);
        reporter.transitions(time, &transitions).unwrap();
        reporter
            .summary(
                DatabaseStats {
                    num_messages: 2,
                    num_signals: 7,
                    num_reserved: 1,
                    num_rejected: 0,
                },
                &FrameStats::default(),
                3,
                std::iter::empty(),
            )
            .unwrap();

        let text = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "cleared");
        assert_eq!(lines[0]["signal"], "FAULT");
        assert_eq!(lines[0]["severity"], "fault");
        assert_eq!(lines[1]["event"], "summary");
        assert_eq!(lines[1]["catalog"]["messages"], 2);
        assert_eq!(lines[1]["malformed_lines"], 3);
    }
}
