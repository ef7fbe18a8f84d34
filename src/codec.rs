//! Codec dispatch (§4.4): given an algorithm tag and a compressed byte
//! slice, returns the decompressed bytes. Zstandard is mandatory; the
//! remaining recognised tags are accepted but rejected with
//! [`SldyError::Unsupported`] if actually used, matching §4.4's "other tags
//! are accepted but may be signalled as Unsupported on actual use". A tag
//! outside the recognised range is a different failure — the algorithm
//! itself is unknown, not merely unimplemented — and is reported as
//! [`SldyError::Format`] (§7: "unknown compression algorithm" vs.
//! "compression tag recognised but not implemented").

use crate::error::SldyError;

/// A recognised compression algorithm tag (the NPY header's minor version).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    None,
    Zstd,
    Zlib,
    Lz4,
    JetRaw,
    Rle,
}

impl Algorithm {
    pub fn from_tag(tag: u8) -> Result<Algorithm, SldyError> {
        match tag {
            0 => Ok(Algorithm::None),
            1 => Ok(Algorithm::Zstd),
            2 => Ok(Algorithm::Zlib),
            3 => Ok(Algorithm::Lz4),
            4 => Ok(Algorithm::JetRaw),
            5 => Ok(Algorithm::Rle),
            other => Err(SldyError::format(format!(
                "unknown compression algorithm tag {}",
                other
            ))),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Algorithm::None => 0,
            Algorithm::Zstd => 1,
            Algorithm::Zlib => 2,
            Algorithm::Lz4 => 3,
            Algorithm::JetRaw => 4,
            Algorithm::Rle => 5,
        }
    }
}

/// Decompresses `bytes`, which must expand to exactly `expected_len` bytes.
/// A length mismatch is logged but the buffer is still returned (§4.3:
/// "Read a block" — mismatches are logged, not fatal).
pub fn decode(algorithm: Algorithm, bytes: &[u8], expected_len: usize) -> Result<Vec<u8>, SldyError> {
    let decoded = match algorithm {
        Algorithm::None => bytes.to_vec(),
        Algorithm::Zstd => zstd::stream::decode_all(bytes).map_err(|source| SldyError::Io { source })?,
        Algorithm::Zlib | Algorithm::Lz4 | Algorithm::JetRaw | Algorithm::Rle => {
            return Err(SldyError::Unsupported {
                tag: algorithm.tag(),
            })
        }
    };

    if decoded.len() != expected_len {
        log::warn!(
            "decompressed block is {} bytes, expected {}",
            decoded.len(),
            expected_len
        );
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_a_pass_through() {
        let bytes = vec![1, 2, 3, 4];
        let decoded = decode(Algorithm::None, &bytes, 4).unwrap();
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn zstd_round_trips() {
        let original = vec![9u8; 256];
        let compressed = zstd::stream::encode_all(&original[..], 0).unwrap();
        let decoded = decode(Algorithm::Zstd, &compressed, original.len()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn lz4_tag_recognised_but_unsupported_on_use() {
        let algorithm = Algorithm::from_tag(3).unwrap();
        assert_eq!(algorithm, Algorithm::Lz4);
        assert!(matches!(
            decode(algorithm, &[0, 1, 2], 3),
            Err(SldyError::Unsupported { tag: 3 })
        ));
    }

    #[test]
    fn unknown_tag_rejected_at_parse_time() {
        assert!(matches!(Algorithm::from_tag(9), Err(SldyError::Format { .. })));
    }
}
