//! Data structures representing cluster spots.

use chrono::NaiveTime;
use std::fmt;

use crate::band;

/// A spot announcement parsed from a DX cluster line.
///
/// A raw line like:
/// ```text
/// DX de K1ABC:     14025.0  W1XYZ        CQ CQ DX                     1234Z
/// ```
///
/// parses into:
/// - `spotter`: "K1ABC"
/// - `frequency_khz`: 14025.0
/// - `dx_call`: "W1XYZ"
/// - `comment`: "CQ CQ DX"
/// - `timestamp`: "1234Z"
/// - `qrt`: false
#[derive(Debug, Clone, PartialEq)]
pub struct SpotEvent {
    /// The callsign of the station reporting the spot.
    pub spotter: String,

    /// The frequency in kHz as announced by the cluster.
    pub frequency_khz: f64,

    /// The callsign of the station being spotted.
    pub dx_call: String,

    /// Free-form comment, possibly empty.
    pub comment: String,

    /// The `HHMMZ` timestamp as announced, which may not be a valid time of
    /// day; see [`SpotEvent::time`].
    pub timestamp: String,

    /// Whether the comment carries a QRT marker.
    pub qrt: bool,
}

impl SpotEvent {
    /// Returns the band label for this spot's frequency.
    pub fn band(&self) -> &'static str {
        band::classify(self.frequency_khz)
    }

    /// Returns the frequency in MHz, the unit the radio expects.
    pub fn frequency_mhz(&self) -> f64 {
        self.frequency_khz / 1000.0
    }

    /// The UTC time of the spot, if the timestamp is a valid time of day.
    pub fn time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.timestamp, "%H%MZ").ok()
    }
}

impl fmt::Display for SpotEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DX de {}: {:>8.1} {} {} {}",
            self.spotter,
            self.frequency_khz,
            self.dx_call,
            self.comment,
            self.timestamp
        )
    }
}

/// Check whether `comment` contains `QRT` as a whole word, ignoring case.
///
/// Word boundaries follow the usual regex definition: ASCII letters, digits and
/// underscore are word characters, everything else separates words.
pub fn is_qrt(comment: &str) -> bool {
    comment
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|word| word.eq_ignore_ascii_case("QRT"))
}
