//! Wire formats for the digest.
//!
//! Two encodings behind a leading big-endian i32 tag: a verbose layout
//! with fixed-width fields, and a compact layout that delta-encodes means
//! as f32 and counts as base-128 varints. Fixed-width fields are
//! big-endian; varints are little-endian within the number. Decoding
//! replays the stored centroids through the update rule, so a decoded
//! digest is statistically equivalent to the encoded one rather than
//! bit-identical.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};

use crate::common::{validation, Result, SketchError};

use super::tree_digest::TreeDigest;

/// Fixed-width format: `tag | compression:f64 | n:i32 | means:f64 | counts:i32`
const VERBOSE_TAG: i32 = 1;
/// Compact format: `tag | compression:f64 | n:i32 | deltas:f32 | counts:varint`
const COMPACT_TAG: i32 = 2;

/// Bytes of `tag + compression + n` shared by both formats.
pub(crate) const VERBOSE_OVERHEAD: usize = 4 + 8 + 4;
/// Bytes per centroid in the verbose format (f64 mean + i32 count).
pub(crate) const VERBOSE_CENTROID_BYTES: usize = 8 + 4;

/// A varint carries at most 5 payload bytes (35 bits of count).
const MAX_VARINT_BYTES: usize = 5;

pub(crate) fn write_verbose(digest: &TreeDigest, buf: &mut Vec<u8>) -> Result<()> {
    buf.reserve(digest.byte_size());
    buf.extend_from_slice(&VERBOSE_TAG.to_be_bytes());
    buf.extend_from_slice(&digest.compression().to_be_bytes());
    buf.extend_from_slice(&(digest.centroid_count() as i32).to_be_bytes());
    for c in digest.centroids() {
        buf.extend_from_slice(&c.mean().to_be_bytes());
    }
    for c in digest.centroids() {
        let count = i32::try_from(c.count()).map_err(|_| {
            SketchError::Overflow(format!(
                "count {} does not fit the verbose format",
                c.count()
            ))
        })?;
        buf.extend_from_slice(&count.to_be_bytes());
    }
    Ok(())
}

pub(crate) fn write_compact(digest: &TreeDigest, buf: &mut Vec<u8>) -> Result<()> {
    buf.extend_from_slice(&COMPACT_TAG.to_be_bytes());
    buf.extend_from_slice(&digest.compression().to_be_bytes());
    buf.extend_from_slice(&(digest.centroid_count() as i32).to_be_bytes());
    let mut prev = 0.0f64;
    for c in digest.centroids() {
        let delta = (c.mean() - prev) as f32;
        prev = c.mean();
        buf.extend_from_slice(&delta.to_be_bytes());
    }
    for c in digest.centroids() {
        write_varint(buf, c.count())?;
    }
    Ok(())
}

/// Exact compact size, measured by encoding into a scratch buffer.
pub(crate) fn compact_size(digest: &TreeDigest) -> Result<usize> {
    let mut buf =
        Vec::with_capacity(VERBOSE_OVERHEAD + (4 + MAX_VARINT_BYTES) * digest.centroid_count());
    write_compact(digest, &mut buf)?;
    Ok(buf.len())
}

pub(crate) fn read(bytes: &[u8]) -> Result<TreeDigest> {
    validation::validate_min_size(bytes.len(), VERBOSE_OVERHEAD)?;
    let mut cur = Cursor::new(bytes);
    let tag = read_i32(&mut cur)?;
    if tag != VERBOSE_TAG && tag != COMPACT_TAG {
        return Err(SketchError::UnknownFormat(tag));
    }
    let compression = read_f64(&mut cur)?;
    let n = read_i32(&mut cur)?;
    if n < 0 {
        return Err(SketchError::InvalidInput {
            param: "centroids".to_string(),
            value: n.to_string(),
            constraint: "declared centroid count must not be negative".to_string(),
        });
    }
    let n = n as usize;
    let mut digest = TreeDigest::new(compression)?;
    if tag == VERBOSE_TAG {
        let mut means = Vec::with_capacity(n);
        for _ in 0..n {
            means.push(read_f64(&mut cur)?);
        }
        for &mean in &means {
            let count = read_i32(&mut cur)?;
            if count <= 0 {
                return Err(SketchError::InvalidInput {
                    param: "count".to_string(),
                    value: count.to_string(),
                    constraint: "stored centroid count must be positive".to_string(),
                });
            }
            digest.add(mean, count as u64)?;
        }
    } else {
        let mut means = Vec::with_capacity(n);
        let mut prev = 0.0f64;
        for _ in 0..n {
            prev += f64::from(read_f32(&mut cur)?);
            means.push(prev);
        }
        for &mean in &means {
            let count = read_varint(&mut cur)?;
            digest.add(mean, count)?;
        }
    }
    Ok(digest)
}

/// Unsigned base-128 varint, least-significant group first, 0x80 as the
/// continuation bit. Five payload bytes carry at most 35 bits.
fn write_varint(buf: &mut Vec<u8>, mut n: u64) -> Result<()> {
    let original = n;
    let mut written = 0;
    while n > 0x7f {
        if written == MAX_VARINT_BYTES - 1 {
            return Err(SketchError::Overflow(format!(
                "count {} needs more than {} varint bytes",
                original, MAX_VARINT_BYTES
            )));
        }
        buf.push(0x80 | (n & 0x7f) as u8);
        n >>= 7;
        written += 1;
    }
    buf.push(n as u8);
    Ok(())
}

fn read_varint(cur: &mut Cursor<&[u8]>) -> Result<u64> {
    let mut byte = read_u8(cur)?;
    let mut value = u64::from(byte & 0x7f);
    let mut shift = 7;
    while byte & 0x80 != 0 {
        if shift > 28 {
            return Err(SketchError::Overflow(
                "varint continues past the shift ceiling of 28".to_string(),
            ));
        }
        byte = read_u8(cur)?;
        value += u64::from(byte & 0x7f) << shift;
        shift += 7;
    }
    Ok(value)
}

fn remaining(cur: &Cursor<&[u8]>) -> usize {
    cur.get_ref().len().saturating_sub(cur.position() as usize)
}

fn truncated(cur: &Cursor<&[u8]>, needed: usize) -> SketchError {
    SketchError::Truncated {
        needed,
        available: remaining(cur),
    }
}

fn read_u8(cur: &mut Cursor<&[u8]>) -> Result<u8> {
    let err = truncated(cur, 1);
    cur.read_u8().map_err(|_| err)
}

fn read_i32(cur: &mut Cursor<&[u8]>) -> Result<i32> {
    let err = truncated(cur, 4);
    cur.read_i32::<BigEndian>().map_err(|_| err)
}

fn read_f32(cur: &mut Cursor<&[u8]>) -> Result<f32> {
    let err = truncated(cur, 4);
    cur.read_f32::<BigEndian>().map_err(|_| err)
}

fn read_f64(cur: &mut Cursor<&[u8]>) -> Result<f64> {
    let err = truncated(cur, 8);
    cur.read_f64::<BigEndian>().map_err(|_| err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_varint(n: u64) -> u64 {
        let mut buf = Vec::new();
        write_varint(&mut buf, n).unwrap();
        read_varint(&mut Cursor::new(buf.as_slice())).unwrap()
    }

    #[test]
    fn test_varint_roundtrip() {
        for n in [0, 1, 127, 128, 300, 16_383, 16_384, (1 << 35) - 1] {
            assert_eq!(roundtrip_varint(n), n);
        }
    }

    #[test]
    fn test_varint_sizes() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 127).unwrap();
        assert_eq!(buf.len(), 1);
        buf.clear();
        write_varint(&mut buf, 128).unwrap();
        assert_eq!(buf.len(), 2);
        buf.clear();
        write_varint(&mut buf, (1 << 35) - 1).unwrap();
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_varint_encode_overflow() {
        let mut buf = Vec::new();
        assert!(matches!(
            write_varint(&mut buf, 1 << 35),
            Err(SketchError::Overflow(_))
        ));
        assert!(matches!(
            write_varint(&mut buf, u64::MAX),
            Err(SketchError::Overflow(_))
        ));
    }

    #[test]
    fn test_varint_decode_overflow() {
        // Six continuation bytes: the decoder's shift would pass 28.
        let corrupt = [0x80u8, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert!(matches!(
            read_varint(&mut Cursor::new(&corrupt[..])),
            Err(SketchError::Overflow(_))
        ));
    }

    #[test]
    fn test_varint_decode_truncated() {
        let cut = [0x80u8, 0x80];
        assert!(matches!(
            read_varint(&mut Cursor::new(&cut[..])),
            Err(SketchError::Truncated { .. })
        ));
    }
}
