/// Errors produced by the `warden-core` crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A metric marker (`cov:` or `ft:`) was present but not followed by a
    /// base-10 integer.
    #[error("malformed metric after '{marker}': {token:?}")]
    MalformedMetric {
        /// The marker token, e.g. `"cov:"`.
        marker: &'static str,
        /// The token that followed the marker, or `None` at end of line.
        token: Option<String>,
    },
}
