//! tdigest_oxide: adaptive t-digest quantile sketch
//!
//! A single-pass summary of a stream of real-valued observations that
//! answers CDF and quantile queries with accuracy concentrated at the
//! distribution tails, using a bounded number of weighted centroids kept
//! in an order-statistics tree.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod common;
pub mod quantiles;

// Re-export core types for convenience
pub use common::{Result, SketchError};
pub use quantiles::{Centroid, TreeDigest};

/// Error types and result aliases for sketch operations
pub mod error {
    pub use crate::common::{Result, SketchError};
}
