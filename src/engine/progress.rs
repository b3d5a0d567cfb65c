//! Progress parsing for the engine's console output.
//!
//! The engine prints the input's total length once (`Duration: 00:01:40.00, start: ...`)
//! and then keeps rewriting a status line carrying the encoded position
//! (`frame=  120 fps= 30 ... time=00:00:04.00 bitrate=...`).

use tracing::trace;

const DURATION_MARKER: &str = "Duration: ";
const POSITION_MARKER: &str = "time=";

/// Incremental parser turning engine output lines into a 0-100 percentage.
#[derive(Debug, Clone, Default)]
pub struct ProgressParser {
    total_secs: Option<f64>,
    last: Option<u8>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one output line.
    ///
    /// Returns the new progress value when the line carried a usable position,
    /// `None` for every other line (including malformed ones and positions
    /// arriving before the total duration is known).
    pub fn feed(&mut self, line: &str) -> Option<u8> {
        if self.total_secs.is_none()
            && let Some(rest) = after_marker(line, DURATION_MARKER)
        {
            let field = rest.split(',').next().unwrap_or_default();
            match parse_timestamp(field) {
                Some(secs) if secs > 0.0 => self.total_secs = Some(secs),
                _ => trace!(line, "Skipping unparsable duration line"),
            }
        }

        let total = self.total_secs?;
        let rest = after_marker(line, POSITION_MARKER)?;
        let field = rest.split(char::is_whitespace).next().unwrap_or_default();
        let Some(elapsed) = parse_timestamp(field) else {
            trace!(line, "Skipping unparsable position line");
            return None;
        };

        // high-water mark: the engine may briefly report a smaller position
        let progress = percentage(elapsed, total).max(self.last.unwrap_or(0));
        self.last = Some(progress);
        Some(progress)
    }
}

fn after_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.find(marker).map(|at| &line[at + marker.len()..])
}

/// Parse `HH:MM:SS(.fraction)` into seconds.
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let mut parts = value.trim().split(':');
    let (Some(h), Some(m), Some(s), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let hours = h.trim().parse::<i64>().ok()?;
    let minutes = m.trim().parse::<i64>().ok()?;
    let seconds = s.trim().parse::<f64>().ok()?;
    let total = (hours * 3600 + minutes * 60) as f64 + seconds;
    total.is_finite().then_some(total)
}

/// `floor(elapsed / total * 100)`, clamped to `0..=100`.
pub fn percentage(elapsed: f64, total: f64) -> u8 {
    if total <= 0.0 {
        return 0;
    }
    ((elapsed / total) * 100.0).floor().clamp(0.0, 100.0) as u8
}
