//! LibFuzzer progress-line parser.
//!
//! LibFuzzer reports progress as whitespace-separated lines of the shape
//! `#<N> <KEYWORD> cov: <C> ft: <F> ...`. Only lines carrying one of the
//! [`EventKind`] keywords become [`Event`]s; everything else the engine prints
//! (banners, sanitizer output, stack traces) is not an event.
//!
//! See <https://llvm.org/docs/LibFuzzer.html#output> for the format.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Marker token preceding the coverage count.
pub const COVERAGE_MARKER: &str = "cov:";

/// Marker token preceding the feature count.
pub const FEATURES_MARKER: &str = "ft:";

/// Kind of libFuzzer progress report.
///
/// Declaration order is the match priority: a line containing several
/// keyword tokens is classified by the first kind in [`EventKind::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum EventKind {
    /// `READ`: the engine finished loading the input corpus.
    Read,
    /// `INITED`: the engine finished executing the initial corpus.
    Inited,
    /// `NEW`: a new interesting input was added to the corpus.
    NewPath,
    /// `REDUCE`: an existing corpus input was replaced by a smaller one.
    Reduce,
    /// `pulse`: periodic heartbeat.
    Pulse,
    /// `DONE`: the engine hit its run limit.
    Done,
    /// `RELOAD`: the engine reloaded the corpus directory.
    Reload,
}

impl EventKind {
    /// All kinds in match-priority order.
    pub const ALL: [EventKind; 7] = [
        EventKind::Read,
        EventKind::Inited,
        EventKind::NewPath,
        EventKind::Reduce,
        EventKind::Pulse,
        EventKind::Done,
        EventKind::Reload,
    ];

    /// The exact token libFuzzer prints for this kind.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            EventKind::Read => "READ",
            EventKind::Inited => "INITED",
            EventKind::NewPath => "NEW",
            EventKind::Reduce => "REDUCE",
            EventKind::Pulse => "pulse",
            EventKind::Done => "DONE",
            EventKind::Reload => "RELOAD",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// One structured progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Event {
    /// What the engine reported.
    pub kind: EventKind,
    /// Executed-input counter from the leading `#<N>` token, or 0.
    pub iteration_count: u64,
    /// Value following `cov:`, if the marker is present.
    pub coverage: Option<u64>,
    /// Value following `ft:`, if the marker is present.
    pub features: Option<u64>,
}

impl Event {
    /// Creates an event from its parts.
    #[must_use]
    pub const fn new(
        kind: EventKind,
        iteration_count: u64,
        coverage: Option<u64>,
        features: Option<u64>,
    ) -> Self {
        Self { kind, iteration_count, coverage, features }
    }

    /// Parses a line, treating malformed progress lines as non-events.
    ///
    /// Use [`parse_line`] to tell the two cases apart.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        parse_line(line).ok().flatten()
    }
}

/// Parses one line of engine output.
///
/// Returns `Ok(None)` for lines without a keyword token, which is the common
/// case.
///
/// # Errors
/// Returns [`CoreError::MalformedMetric`] when a keyword is present and a
/// `cov:`/`ft:` marker is followed by something other than a decimal integer.
pub fn parse_line(line: &str) -> Result<Option<Event>, CoreError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    let Some(kind) = EventKind::ALL
        .into_iter()
        .find(|kind| tokens.contains(&kind.keyword()))
    else {
        return Ok(None);
    };

    let iteration_count = tokens
        .first()
        .and_then(|token| token.strip_prefix('#'))
        .and_then(parse_decimal)
        .unwrap_or(0);

    let coverage = metric_after(&tokens, COVERAGE_MARKER)?;
    let features = metric_after(&tokens, FEATURES_MARKER)?;

    Ok(Some(Event { kind, iteration_count, coverage, features }))
}

/// Reads the token after the first occurrence of `marker`.
fn metric_after(tokens: &[&str], marker: &'static str) -> Result<Option<u64>, CoreError> {
    let Some(pos) = tokens.iter().position(|token| *token == marker) else {
        return Ok(None);
    };
    let next = tokens.get(pos + 1).copied();
    match next.and_then(parse_decimal) {
        Some(value) => Ok(Some(value)),
        None => Err(CoreError::MalformedMetric {
            marker,
            token: next.map(str::to_owned),
        }),
    }
}

/// Strict base-10: digits only, no sign, no overflow.
fn parse_decimal(token: &str) -> Option<u64> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}
