use thiserror::Error;
use tracing::trace;

/// Terminates every record on the wire: `<angle>,<distance>.`
pub const FRAME_DELIMITER: u8 = b'.';
pub const FIELD_SEPARATOR: char = ',';

/// One sensor sample. Angle in degrees (0..180 from the sweep servo), distance in cm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reading {
    pub angle_deg: i32,
    pub distance_cm: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected 2 fields, got {0}")]
    FieldCount(usize),
    #[error("field is not an integer: {0:?}")]
    BadInteger(String),
    #[error("record is not valid text")]
    NotText,
}

/// Parse a record payload (the bytes between two delimiters).
pub fn parse_record(payload: &[u8]) -> Result<Reading, ParseError> {
    let text = std::str::from_utf8(payload).map_err(|_| ParseError::NotText)?;
    let fields: Vec<&str> = text.split(FIELD_SEPARATOR).collect();
    if fields.len() != 2 {
        return Err(ParseError::FieldCount(fields.len()));
    }
    let angle_deg = parse_field(fields[0])?;
    let distance_cm = parse_field(fields[1])?;
    Ok(Reading { angle_deg, distance_cm })
}

fn parse_field(field: &str) -> Result<i32, ParseError> {
    let field = field.trim();
    field.parse().map_err(|_| ParseError::BadInteger(field.to_string()))
}

/// Byte-at-a-time record assembler.
///
/// Bytes accumulate until [`FRAME_DELIMITER`]; the buffered payload is then
/// parsed and the buffer cleared whether or not the record was valid.
/// Malformed records are expected on a lossy link and are dropped silently
/// (counted in [`FrameParser::discarded`]).
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: Vec<u8>,
    max_len: Option<usize>,
    discarded: u64,
}

impl FrameParser {
    /// Parser with no bound on the pending record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser that drops the pending record once it exceeds `max_len` bytes
    /// without seeing a delimiter.
    pub fn with_max_len(max_len: usize) -> Self {
        Self { max_len: Some(max_len), ..Self::default() }
    }

    pub fn feed(&mut self, byte: u8) -> Option<Reading> {
        if byte != FRAME_DELIMITER {
            self.buf.push(byte);
            if let Some(max) = self.max_len {
                if self.buf.len() > max {
                    trace!(len = self.buf.len(), "frame: no delimiter within cap, dropping");
                    self.buf.clear();
                    self.discarded += 1;
                }
            }
            return None;
        }

        let result = parse_record(&self.buf);
        self.buf.clear();
        match result {
            Ok(reading) => Some(reading),
            Err(e) => {
                trace!("frame: discarding malformed record: {}", e);
                self.discarded += 1;
                None
            }
        }
    }

    /// Feed a chunk; returns the last reading it completed, if any.
    pub fn feed_all(&mut self, bytes: &[u8]) -> Option<Reading> {
        bytes.iter().fold(None, |last, b| self.feed(*b).or(last))
    }

    /// Bytes waiting for a delimiter.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Drop any partial record (e.g. after switching ports).
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn feed_str(p: &mut FrameParser, s: &str) -> Vec<Reading> {
        s.bytes().filter_map(|b| p.feed(b)).collect()
    }

    #[test]
    fn single_record() {
        let mut p = FrameParser::new();
        let out = feed_str(&mut p, "90,45.");
        assert_eq!(out, vec![Reading { angle_deg: 90, distance_cm: 45 }]);
        assert!(p.pending().is_empty());
    }

    #[test]
    fn bad_integer_is_dropped_and_buffer_cleared() {
        let mut p = FrameParser::new();
        assert!(feed_str(&mut p, "90,abc.").is_empty());
        assert!(p.pending().is_empty());
        assert_eq!(p.discarded(), 1);
        // next record is unaffected
        assert_eq!(feed_str(&mut p, "10,20.").len(), 1);
    }

    #[test]
    fn wrong_field_count_is_dropped() {
        let mut p = FrameParser::new();
        assert!(feed_str(&mut p, "1,2,3.").is_empty());
        assert!(feed_str(&mut p, "12.").is_empty());
        assert!(feed_str(&mut p, ".").is_empty());
        assert!(feed_str(&mut p, "90,.").is_empty());
        assert_eq!(p.discarded(), 4);
    }

    #[test]
    fn whitespace_and_line_noise_around_fields() {
        let mut p = FrameParser::new();
        let out = feed_str(&mut p, "\r\n 15 , 7 .-3,\t120.");
        assert_eq!(
            out,
            vec![
                Reading { angle_deg: 15, distance_cm: 7 },
                Reading { angle_deg: -3, distance_cm: 120 },
            ]
        );
    }

    #[test]
    fn record_split_across_chunks() {
        let mut p = FrameParser::new();
        assert_eq!(p.feed_all(b"17"), None);
        assert_eq!(p.feed_all(b"5,3"), None);
        assert_eq!(p.feed_all(b"0.1"), Some(Reading { angle_deg: 175, distance_cm: 30 }));
        assert_eq!(p.pending(), b"1");
    }

    #[test]
    fn feed_all_returns_last_reading() {
        let mut p = FrameParser::new();
        let last = p.feed_all(b"1,1.2,2.3,3.");
        assert_eq!(last, Some(Reading { angle_deg: 3, distance_cm: 3 }));
    }

    #[test]
    fn unbounded_by_default() {
        let mut p = FrameParser::new();
        for _ in 0..10_000 {
            p.feed(b'9');
        }
        assert_eq!(p.pending().len(), 10_000);
    }

    #[test]
    fn cap_drops_runaway_record() {
        let mut p = FrameParser::with_max_len(8);
        assert!(feed_str(&mut p, "123456789").is_empty());
        assert!(p.pending().is_empty());
        assert_eq!(p.discarded(), 1);
        assert_eq!(feed_str(&mut p, "4,5."), vec![Reading { angle_deg: 4, distance_cm: 5 }]);
    }

    #[test]
    fn invalid_utf8_is_dropped() {
        let mut p = FrameParser::new();
        assert_eq!(p.feed_all(&[0xff, b',', b'1', b'.']), None);
        assert_eq!(p.discarded(), 1);
    }

    proptest! {
        #[test]
        fn well_formed_records_parse(
            angle in any::<i32>(),
            distance in any::<i32>(),
            pad in "[ \t]{0,3}",
        ) {
            let mut p = FrameParser::new();
            let line = format!("{pad}{angle}{pad},{pad}{distance}{pad}.");
            let out = feed_str(&mut p, &line);
            prop_assert_eq!(out, vec![Reading { angle_deg: angle, distance_cm: distance }]);
            prop_assert!(p.pending().is_empty());
        }

        #[test]
        fn malformed_payloads_emit_nothing(payload in "[a-z ,0-9-]{0,16}") {
            prop_assume!(parse_record(payload.as_bytes()).is_err());
            let mut p = FrameParser::new();
            let line = format!("{payload}.");
            prop_assert!(feed_str(&mut p, &line).is_empty());
            prop_assert!(p.pending().is_empty());
        }
    }
}
