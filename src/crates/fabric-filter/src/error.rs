//! Error types for filter construction and evaluation.

use thiserror::Error;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, FilterError>;

/// Errors raised while building or evaluating a filter chain.
///
/// These are all construction-time (bad regex, bad spec) or internal
/// logic errors — evaluation itself is total over well-formed filters, per
/// the engine's purity guarantee (it never fails on a record, only ever
/// accepts or drops it).
#[derive(Error, Debug)]
pub enum FilterError {
    /// A `matches` condition's pattern failed to compile as a regex.
    #[error("invalid regex pattern {pattern:?} in condition: {source}")]
    InvalidPattern {
        /// The offending pattern string.
        pattern: String,
        /// Underlying regex compile error.
        #[source]
        source: regex::Error,
    },
}
