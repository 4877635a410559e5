//! Quantile estimation over streaming data.
//!
//! This module provides an adaptive t-digest for estimating quantiles
//! (percentiles) and cumulative probabilities from a stream in a single
//! pass.
//!
//! # Characteristics
//!
//! - Relative accuracy concentrated at the tails: part-per-million error
//!   near p0/p100, sub-percent error in the middle
//! - Space bounded by the compression parameter, independent of stream
//!   length
//! - Mergeable: sketches built on disjoint shards combine into one
//! - Two wire formats: verbose (fixed-width) and compact (delta + varint)
//!
//! # Examples
//!
//! ```
//! use tdigest_oxide::quantiles::TreeDigest;
//!
//! let mut td = TreeDigest::new(100.0).unwrap();
//! for i in 1..=1_000 {
//!     td.add(f64::from(i), 1).unwrap();
//! }
//!
//! let p99 = td.quantile(0.99).unwrap();
//! assert!((p99 - 990.0).abs() < 20.0);
//! assert!(td.cdf(500.0) > 0.45 && td.cdf(500.0) < 0.55);
//! ```

mod avl_tree;
mod centroid;
mod codec;
mod tree_digest;

pub use centroid::Centroid;
pub use tree_digest::TreeDigest;
