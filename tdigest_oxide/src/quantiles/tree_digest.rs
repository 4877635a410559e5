//! Tree-based t-digest: adaptive quantile estimation over a stream.
//!
//! The digest keeps a bounded set of weighted centroids in an
//! order-statistics tree. Each incoming observation is either absorbed by
//! a nearby centroid or becomes a new one, governed by a rank-dependent
//! size bound: a centroid near rank fraction q may hold at most
//! `4·N·q·(1−q)/compression` weight. The bound collapses to O(1) at the
//! tails and grows to O(N/compression) in the middle, so extreme
//! percentiles (p99, p99.9) stay sharp while the bulk merges aggressively.
//!
//! # Time Complexity
//!
//! - Update: O(log n) amortized (tree lookups plus rank queries)
//! - Quantile / CDF: O(n) over the centroids, n ≤ 100·compression
//! - Merge: O(m log m) over the combined centroid count
//!
//! # Space Complexity
//!
//! O(compression) centroids
//!
//! # References
//!
//! - Dunning & Ertl "Computing Extremely Accurate Quantiles Using t-Digests"
//! - https://github.com/tdunning/t-digest
//!
//! # Examples
//!
//! ```
//! use tdigest_oxide::quantiles::TreeDigest;
//!
//! let mut td = TreeDigest::with_seed(100.0, 42).unwrap();
//! for i in 0..10_000 {
//!     td.add(i as f64, 1).unwrap();
//! }
//! let median = td.quantile(0.5).unwrap();
//! assert!((median - 5_000.0).abs() < 500.0);
//! ```

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::common::{validation, Result, SketchError};

use super::avl_tree::{CentroidTree, NodeKey};
use super::centroid::Centroid;
use super::codec;

/// Adaptive quantile sketch with a bounded number of weighted centroids.
///
/// A digest is a single-writer object: updates, compression, and codec
/// calls must not run concurrently with anything else on the same value.
/// All randomized decisions draw from one RNG owned by the digest, so a
/// seeded digest replays identically.
///
/// # Examples
///
/// ```
/// use tdigest_oxide::quantiles::TreeDigest;
///
/// let mut td = TreeDigest::new(100.0).unwrap();
/// td.add(1.0, 1).unwrap();
/// td.add(2.0, 1).unwrap();
/// assert_eq!(td.size(), 2);
/// assert_eq!(td.cdf(0.5), 0.0);
/// ```
#[derive(Clone, Debug)]
pub struct TreeDigest {
    /// Accuracy parameter (higher = more centroids = more accurate)
    compression: f64,
    /// Ordered centroid index
    tree: CentroidTree,
    /// Sum of centroid counts
    total_weight: u64,
    /// When true, every observation is also attached raw to its centroid
    record_all: bool,
    /// Next centroid id; ids are never reused
    next_id: u64,
    /// Sole randomness source for tie-breaks and shuffles
    rng: SmallRng,
}

impl TreeDigest {
    /// Default compression parameter
    pub const DEFAULT_COMPRESSION: f64 = 100.0;

    /// The index may hold at most `compression` times this many centroids;
    /// crossing the limit triggers a compression pass.
    const SIZE_LIMIT_FACTOR: f64 = 100.0;

    /// Creates an empty digest with the given compression parameter.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `compression` is not finite and positive.
    pub fn new(compression: f64) -> Result<Self> {
        validation::validate_compression(compression)?;
        Ok(TreeDigest {
            compression,
            tree: CentroidTree::new(),
            total_weight: 0,
            record_all: false,
            next_id: 1,
            rng: SmallRng::from_os_rng(),
        })
    }

    /// Creates an empty digest with a seeded RNG for reproducible runs.
    ///
    /// Two digests built with the same seed and fed the same stream hold
    /// identical centroids.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `compression` is not finite and positive.
    pub fn with_seed(compression: f64, seed: u64) -> Result<Self> {
        validation::validate_compression(compression)?;
        Ok(TreeDigest {
            compression,
            tree: CentroidTree::new(),
            total_weight: 0,
            record_all: false,
            next_id: 1,
            rng: SmallRng::seed_from_u64(seed),
        })
    }

    /// Enables raw-sample recording: every observation is also appended to
    /// the sample list of the centroid that absorbs it. Pure diagnostics;
    /// estimates are unaffected.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the digest already holds observations.
    pub fn record_all_data(mut self) -> Result<Self> {
        if !self.is_empty() {
            return Err(SketchError::InvalidInput {
                param: "record_all".to_string(),
                value: self.total_weight.to_string(),
                constraint: "recording can only be enabled on an empty sketch".to_string(),
            });
        }
        self.record_all = true;
        Ok(self)
    }

    /// Returns the compression parameter.
    pub fn compression(&self) -> f64 {
        self.compression
    }

    /// Returns the total weight of all absorbed observations.
    pub fn size(&self) -> u64 {
        self.total_weight
    }

    /// Returns `true` if no observations have been absorbed.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of centroids currently held.
    pub fn centroid_count(&self) -> usize {
        self.tree.size()
    }

    /// Returns `true` if raw-sample recording is enabled.
    pub fn is_recording(&self) -> bool {
        self.record_all
    }

    /// Iterates the centroids in `(mean, id)` order. The iterator borrows
    /// the digest and cannot outlive the next mutating call.
    pub fn centroids(&self) -> impl Iterator<Item = &Centroid> {
        self.tree.iter()
    }

    /// Incorporates an observation with value `x` and weight `w`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `x` is NaN or infinite, or if `w` is 0.
    pub fn add(&mut self, x: f64, w: u64) -> Result<()> {
        validation::validate_observation(x)?;
        validation::validate_weight(w)?;
        let history = if self.record_all { Some(vec![x]) } else { None };
        self.insert_observation(x, w, history);
        self.maybe_compress();
        Ok(())
    }

    fn maybe_compress(&mut self) {
        if self.tree.size() as f64 > Self::SIZE_LIMIT_FACTOR * self.compression {
            self.compress();
        }
    }

    /// The update rule. `history` carries raw samples to attach to the
    /// destination centroid (a singleton for a live observation, the
    /// accumulated list when replaying a centroid through compression or
    /// merge, `None` when recording is off).
    fn insert_observation(&mut self, x: f64, w: u64, history: Option<Vec<f64>>) {
        let probe = NodeKey::probe(x);
        let start = self
            .tree
            .floor(probe)
            .or_else(|| self.tree.ceiling(probe))
            .map(NodeKey::of);
        let Some(mut start_key) = start else {
            self.create_centroid(x, w, history);
            self.total_weight += w;
            return;
        };

        // Distance to x along the sorted means is V-shaped: walk forward
        // from the floor and stop at the first strict increase. The run of
        // centroids at minimum distance is the tie pool.
        let mut min_distance = f64::INFINITY;
        let mut end_key = None;
        for c in self.tree.iter_from(start_key) {
            let z = (c.mean() - x).abs();
            if z < min_distance {
                min_distance = z;
                start_key = NodeKey::of(c);
            } else if z > min_distance {
                end_key = Some(NodeKey::of(c));
                break;
            }
        }

        // Second pass over the tie pool: a neighbor qualifies if its
        // rank-dependent size bound admits the new weight. One qualifier
        // is kept uniformly at random (size-1 reservoir).
        let total = self.total_weight as f64;
        let mut sum = self.tree.head_sum(start_key) as f64;
        let mut chosen = None;
        let mut candidates = 0u64;
        for c in self.tree.iter_from(start_key) {
            let key = NodeKey::of(c);
            if end_key == Some(key) {
                break;
            }
            let q = (sum + c.count() as f64 / 2.0) / total;
            let bound = 4.0 * total * q * (1.0 - q) / self.compression;
            if (c.mean() - x).abs() == min_distance && (c.count() + w) as f64 <= bound {
                candidates += 1;
                if self.rng.random::<f64>() < 1.0 / candidates as f64 {
                    chosen = Some(key);
                }
            }
            sum += c.count() as f64;
        }

        match chosen {
            None => self.create_centroid(x, w, history),
            Some(key) => {
                // The updated mean may change the centroid's sort position,
                // so it is pulled out of the index and re-inserted.
                if let Some(mut c) = self.tree.remove(key) {
                    c.add(x, w);
                    if let Some(values) = &history {
                        c.push_samples(values);
                    }
                    self.tree.insert(c);
                } else {
                    debug_assert!(false, "chosen centroid missing from the index");
                }
            }
        }
        self.total_weight += w;
    }

    fn create_centroid(&mut self, x: f64, w: u64, history: Option<Vec<f64>>) {
        let id = self.next_id;
        self.next_id += 1;
        let mut c = Centroid::new(x, w, id);
        if let Some(values) = history {
            c.push_samples(&values);
        }
        self.tree.insert(c);
    }

    /// Rebuilds the digest by replaying its centroids in random order.
    ///
    /// The update rule is sensitive to insertion order when inputs arrive
    /// sorted (it keeps splitting rather than merging); a shuffled replay
    /// restores near-optimal packing.
    pub fn compress(&mut self) {
        if self.tree.size() <= 1 {
            return;
        }
        let mut snapshot: Vec<Centroid> = self.tree.iter().cloned().collect();
        snapshot.shuffle(&mut self.rng);
        self.tree = CentroidTree::new();
        self.total_weight = 0;
        for c in snapshot {
            let (mean, count, samples) = c.into_parts();
            self.insert_observation(mean, count, samples);
        }
        debug_assert_eq!(self.total_weight, self.tree.total_weight());
        debug_assert_eq!(
            self.tree.head_count(NodeKey::probe(f64::INFINITY)),
            self.tree.size()
        );
    }

    /// Builds a new digest at the requested compression from the centroids
    /// of all inputs, replayed in an order shuffled by `rng`. The supplied
    /// RNG becomes the new digest's randomness source.
    ///
    /// The output records raw samples if any input does; recorded samples
    /// travel with their centroid into whichever destination centroid
    /// absorbs it, so non-recording inputs contribute no samples.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `compression` is not finite and positive.
    pub fn merge(compression: f64, digests: &[TreeDigest], rng: SmallRng) -> Result<TreeDigest> {
        validation::validate_compression(compression)?;
        let mut merged = TreeDigest {
            compression,
            tree: CentroidTree::new(),
            total_weight: 0,
            record_all: digests.iter().any(|d| d.record_all),
            next_id: 1,
            rng,
        };
        let mut snapshot: Vec<Centroid> = digests
            .iter()
            .flat_map(|d| d.tree.iter())
            .cloned()
            .collect();
        snapshot.shuffle(&mut merged.rng);
        for c in snapshot {
            let (mean, count, samples) = c.into_parts();
            merged.insert_observation(mean, count, samples);
            merged.maybe_compress();
        }
        Ok(merged)
    }

    /// Estimates Pr[X ≤ x]. Returns NaN on an empty digest.
    ///
    /// Each centroid covers an interval reaching halfway to each neighbor;
    /// weight is interpolated linearly across it. The two outermost
    /// centroids mirror their inner half-width outward.
    pub fn cdf(&self, x: f64) -> f64 {
        if self.tree.size() == 1 {
            // Step function at the sole centroid's mean.
            return match self.tree.first() {
                Some(c) if x < c.mean() => 0.0,
                Some(_) => 1.0,
                None => f64::NAN,
            };
        }
        let mut it = self.tree.iter();
        let (Some(mut a), Some(mut b)) = (it.next(), it.next()) else {
            return f64::NAN;
        };
        let total = self.total_weight as f64;
        let mut r = 0.0;
        let mut left = (b.mean() - a.mean()) / 2.0;
        let mut right = left;
        loop {
            if x < a.mean() + right {
                let t = interpolate(x, a.mean() - left, a.mean() + right);
                return (r + a.count() as f64 * t) / total;
            }
            r += a.count() as f64;
            a = b;
            left = right;
            match it.next() {
                Some(next) => {
                    b = next;
                    right = (b.mean() - a.mean()) / 2.0;
                }
                None => {
                    // Symmetric tail: the last centroid mirrors the final
                    // half-width on both sides.
                    right = left;
                    if x < a.mean() + right {
                        let t = interpolate(x, a.mean() - left, a.mean() + right);
                        return (r + a.count() as f64 * t) / total;
                    }
                    return 1.0;
                }
            }
        }
    }

    /// Estimates the value at rank fraction `q`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `q` is outside [0, 1] or the digest holds
    /// fewer than 2 centroids.
    pub fn quantile(&self, q: f64) -> Result<f64> {
        validation::validate_quantile_fraction(q)?;
        let mut it = self.tree.iter();
        let (Some(first), Some(second)) = (it.next(), it.next()) else {
            return Err(SketchError::InvalidInput {
                param: "centroids".to_string(),
                value: self.tree.size().to_string(),
                constraint: "quantile requires at least 2 centroids".to_string(),
            });
        };

        if self.tree.size() == 2 {
            // With two centroids each interval holds half the weight;
            // the interpolation collapses to a closed form.
            let diff = (second.mean() - first.mean()) / 2.0;
            return Ok(if q > 0.75 {
                second.mean() + diff * (4.0 * q - 3.0)
            } else {
                first.mean() + diff * (4.0 * q - 1.0)
            });
        }

        let target = q * self.total_weight as f64;
        let mut a = first;
        let mut b = second;
        let mut right = (b.mean() - a.mean()) / 2.0;
        let mut left = right;

        if target <= a.count() as f64 {
            let count = a.count() as f64;
            return Ok(a.mean() + left * (2.0 * target - count) / count);
        }
        let mut t = a.count() as f64;
        loop {
            let count = b.count() as f64;
            if t + count / 2.0 >= target {
                return Ok(b.mean() - left * 2.0 * (t + count / 2.0 - target) / count);
            }
            if t + count >= target {
                return Ok(b.mean() + right * 2.0 * (target - t - count / 2.0) / count);
            }
            t += count;
            a = b;
            match it.next() {
                Some(next) => {
                    b = next;
                    left = right;
                    right = (b.mean() - a.mean()) / 2.0;
                }
                None => return Ok(b.mean() + right),
            }
        }
    }

    /// Upper bound in bytes of the verbose encoding.
    pub fn byte_size(&self) -> usize {
        codec::VERBOSE_OVERHEAD + codec::VERBOSE_CENTROID_BYTES * self.centroid_count()
    }

    /// Exact size in bytes of the compact encoding, measured by encoding
    /// into a scratch buffer and reading the final position.
    ///
    /// # Errors
    ///
    /// Returns `Overflow` if any centroid count does not fit a varint.
    pub fn small_byte_size(&self) -> Result<usize> {
        codec::compact_size(self)
    }

    /// Appends the verbose encoding to `buf`.
    ///
    /// # Errors
    ///
    /// Returns `Overflow` if any centroid count does not fit the format.
    pub fn to_bytes(&self, buf: &mut Vec<u8>) -> Result<()> {
        codec::write_verbose(self, buf)
    }

    /// Appends the compact encoding to `buf`.
    ///
    /// # Errors
    ///
    /// Returns `Overflow` if any centroid count does not fit a varint.
    pub fn to_small_bytes(&self, buf: &mut Vec<u8>) -> Result<()> {
        codec::write_compact(self, buf)
    }

    /// Reconstructs a digest from either wire format.
    ///
    /// Decoding replays the stored centroids through the update rule, so
    /// the result is statistically equivalent to the encoded digest rather
    /// than bit-identical.
    ///
    /// # Errors
    ///
    /// Returns `UnknownFormat` for an unrecognized tag, `Truncated` if the
    /// buffer ends early, `Overflow` on a corrupt varint, and
    /// `InvalidInput` for corrupt field values.
    pub fn from_bytes(buf: &[u8]) -> Result<TreeDigest> {
        codec::read(buf)
    }
}

impl Default for TreeDigest {
    fn default() -> Self {
        TreeDigest {
            compression: Self::DEFAULT_COMPRESSION,
            tree: CentroidTree::new(),
            total_weight: 0,
            record_all: false,
            next_id: 1,
            rng: SmallRng::from_os_rng(),
        }
    }
}

fn interpolate(x: f64, x0: f64, x1: f64) -> f64 {
    ((x - x0) / (x1 - x0)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_digest() {
        let td = TreeDigest::new(100.0).unwrap();
        assert!(td.is_empty());
        assert_eq!(td.compression(), 100.0);
        assert_eq!(td.centroid_count(), 0);
    }

    #[test]
    fn test_invalid_compression() {
        assert!(TreeDigest::new(0.0).is_err());
        assert!(TreeDigest::new(-1.0).is_err());
        assert!(TreeDigest::new(f64::NAN).is_err());
    }

    #[test]
    fn test_add_rejects_bad_input() {
        let mut td = TreeDigest::new(100.0).unwrap();
        assert!(td.add(f64::NAN, 1).is_err());
        assert!(td.add(f64::INFINITY, 1).is_err());
        assert!(td.add(1.0, 0).is_err());
        assert!(td.is_empty());
    }

    #[test]
    fn test_total_weight_tracks_adds() {
        let mut td = TreeDigest::with_seed(100.0, 1).unwrap();
        td.add(1.0, 3).unwrap();
        td.add(2.0, 4).unwrap();
        assert_eq!(td.size(), 7);
        let counted: u64 = td.centroids().map(|c| c.count()).sum();
        assert_eq!(counted, 7);
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let mut a = TreeDigest::with_seed(50.0, 99).unwrap();
        let mut b = TreeDigest::with_seed(50.0, 99).unwrap();
        let mut x = 0.5f64;
        for _ in 0..5_000 {
            x = (x * 1103515245.0 + 12345.0) % 1000.0;
            a.add(x, 1).unwrap();
            b.add(x, 1).unwrap();
        }
        let means_a: Vec<f64> = a.centroids().map(|c| c.mean()).collect();
        let means_b: Vec<f64> = b.centroids().map(|c| c.mean()).collect();
        assert_eq!(means_a, means_b);
        assert_eq!(a.quantile(0.9).unwrap(), b.quantile(0.9).unwrap());
    }

    #[test]
    fn test_record_all_keeps_samples() {
        let mut td = TreeDigest::with_seed(10.0, 7)
            .unwrap()
            .record_all_data()
            .unwrap();
        assert!(td.is_recording());
        for i in 0..500 {
            td.add((i % 13) as f64, 1).unwrap();
        }
        let recorded: usize = td.centroids().map(|c| c.samples().map_or(0, <[f64]>::len)).sum();
        assert_eq!(recorded, 500);
    }

    #[test]
    fn test_record_all_rejected_when_nonempty() {
        let mut td = TreeDigest::new(100.0).unwrap();
        td.add(1.0, 1).unwrap();
        assert!(td.record_all_data().is_err());
    }

    #[test]
    fn test_compress_preserves_weight() {
        let mut td = TreeDigest::with_seed(20.0, 3).unwrap();
        for i in 0..10_000 {
            td.add(i as f64, 1).unwrap();
        }
        let before = td.size();
        td.compress();
        assert_eq!(td.size(), before);
        let counted: u64 = td.centroids().map(|c| c.count()).sum();
        assert_eq!(counted, before);
    }
}
