//! Parser for lines received from a DX cluster.
//!
//! This module uses the `nom` parsing library to recognize spot
//! announcements in the cluster's telnet feed. Every line falls into one of
//! three kinds: a spot, a prompt change, or plain text.
//!
//! # Spot Format
//!
//! Cluster spots follow this general format:
//! ```text
//! DX de SPOTTER:  FREQ  CALLSIGN  COMMENT...  TIMEZ
//! ```
//!
//! Example:
//! ```text
//! DX de K1ABC:     14025.0  W1XYZ        CQ CQ DX                     1234Z
//! ```
//!
//! The comment is everything between the DX callsign and the first
//! `HHMMZ` timestamp, minus surrounding whitespace. Anything after the
//! timestamp (some clusters append a locator) is ignored.

use nom::{
    IResult, Parser,
    bytes::complete::{tag_no_case, take_while_m_n, take_while1},
    character::complete::{anychar, char, multispace0, multispace1},
    combinator::{opt, peek, recognize, value},
    multi::many_till,
    sequence::terminated,
};
use thiserror::Error;

use crate::spot::{SpotEvent, is_qrt};

/// Line endings that mark a line as an interactive prompt.
///
/// Checked in order; the first match wins.
pub const PROMPT_SUFFIXES: &[&str] = &[">", "> ", ":", ": "];

/// Errors that can occur during parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid spot format: {0}")]
    InvalidFormat(String),

    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// A classified line from the cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterLine {
    /// A spot announcement.
    Spot(SpotEvent),

    /// The host changed its interactive prompt; carries the new prompt text
    /// without its terminator.
    Prompt(String),

    /// Anything else, to be echoed verbatim.
    Text(String),
}

/// Spot fields as they appear on the wire, before numeric conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RawSpot<'a> {
    spotter: &'a str,
    frequency: &'a str,
    dx_call: &'a str,
    comment: &'a str,
    time: &'a str,
}

/// Parse the "DX de " prefix that starts every spot line.
fn parse_dx_de_prefix(input: &str) -> IResult<&str, ()> {
    value(
        (),
        (
            tag_no_case("DX"),
            multispace1,
            tag_no_case("de"),
            multispace1,
        ),
    )
    .parse(input)
}

/// Parse the spotter callsign and its optional trailing colon.
fn parse_spotter(input: &str) -> IResult<&str, &str> {
    terminated(
        take_while1(|c: char| !c.is_whitespace() && c != ':'),
        (opt(char(':')), multispace0),
    )
    .parse(input)
}

/// Recognize the frequency text. Numeric conversion happens later so that a
/// line shaped like a spot but carrying garbage like `14.0.25` is reported
/// as malformed instead of being treated as plain text.
fn parse_frequency_text(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_digit() || c == '.').parse(input)
}

/// Parse a callsign (anything up to the next whitespace).
fn parse_callsign(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace()).parse(input)
}

/// Recognize a 4-digit UTC time like "1234Z".
fn parse_time_text(input: &str) -> IResult<&str, &str> {
    recognize((
        take_while_m_n(4, 4, |c: char| c.is_ascii_digit()),
        tag_no_case("Z"),
    ))
    .parse(input)
}

/// Parse the comment: the shortest run of text that is followed by optional
/// whitespace and a timestamp.
fn parse_comment(input: &str) -> IResult<&str, &str> {
    recognize(many_till(anychar, peek((multispace0, parse_time_text)))).parse(input)
}

fn parse_raw_spot(input: &str) -> IResult<&str, RawSpot<'_>> {
    let (input, _) = parse_dx_de_prefix(input)?;
    let (input, spotter) = parse_spotter(input)?;
    let (input, frequency) = parse_frequency_text(input)?;
    let (input, _) = multispace1(input)?;
    let (input, dx_call) = parse_callsign(input)?;
    let (input, _) = multispace1(input)?;
    let (input, comment) = parse_comment(input)?;
    let (input, _) = multispace0(input)?;
    let (input, time) = parse_time_text(input)?;

    Ok((
        input,
        RawSpot {
            spotter,
            frequency,
            dx_call,
            comment,
            time,
        },
    ))
}

impl RawSpot<'_> {
    fn into_event(self) -> ParseResult<SpotEvent> {
        let frequency_khz: f64 = self
            .frequency
            .parse()
            .map_err(|_| ParseError::InvalidFrequency(self.frequency.to_string()))?;

        Ok(SpotEvent {
            spotter: self.spotter.to_string(),
            frequency_khz,
            dx_call: self.dx_call.to_string(),
            comment: self.comment.to_string(),
            timestamp: self.time.to_ascii_uppercase(),
            qrt: is_qrt(self.comment),
        })
    }
}

/// Parse a complete cluster spot line.
///
/// # Example
///
/// ```
/// use cluster_spots::parser::parse_spot;
///
/// let line = "DX de K1ABC:     14025.0  W1XYZ        CQ CQ DX      1234Z";
/// let spot = parse_spot(line).unwrap();
/// assert_eq!(spot.spotter, "K1ABC");
/// assert_eq!(spot.dx_call, "W1XYZ");
/// assert_eq!(spot.comment, "CQ CQ DX");
/// ```
pub fn parse_spot(input: &str) -> ParseResult<SpotEvent> {
    match parse_raw_spot(input) {
        Ok((_, raw)) => raw.into_event(),
        Err(e) => Err(ParseError::InvalidFormat(format!("{:?}", e))),
    }
}

/// Classify a line received from the cluster.
///
/// Returns an error only for lines that have the shape of a spot but carry
/// an unusable frequency; such lines must be discarded.
pub fn parse_line(line: &str) -> ParseResult<ClusterLine> {
    if let Ok((_, raw)) = parse_raw_spot(line) {
        return raw.into_event().map(ClusterLine::Spot);
    }

    for suffix in PROMPT_SUFFIXES {
        if let Some(prompt) = line.strip_suffix(suffix) {
            return Ok(ClusterLine::Prompt(prompt.to_string()));
        }
    }

    Ok(ClusterLine::Text(line.to_string()))
}
