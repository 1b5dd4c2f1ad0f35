//! Core logic for the fuzzwarden supervisor.
//!
//! Parses libFuzzer progress lines into [`Event`]s and tracks them in an
//! [`Evaluator`] that decides when a run has explored enough. Nothing in this
//! crate performs I/O.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod criteria;
pub mod error;
pub mod evaluator;
pub mod event;
pub mod id;

pub use criteria::{StopCriteria, DEFAULT_MIN_ITERATIONS, DEFAULT_STAGNATION};
pub use error::CoreError;
pub use evaluator::{Evaluator, EvaluatorSnapshot, EvaluatorState};
pub use event::{parse_line, Event, EventKind};
pub use id::RunId;
