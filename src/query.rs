//! Query preparation (§4.6): hex-candidate decoding, fingerprinting, and the 4 MiB
//! size cap, grounded on `spec.md`'s "move decoding into a well-defined preparation
//! step" re-architecture note (`original_source/liboracle.h`'s `rcl_query_t`).

use crate::error::{Error, Result};
use crate::hash::{fingerprint, Fingerprint};

const MAX_PREPARED_QUERY_BYTES: usize = 4 * 1024 * 1024;

/// Caller-supplied query: a block range plus optional address/topic candidate filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub from: u64,
    pub to: u64,
    /// Hex-encoded candidate addresses (20 bytes each), optionally `0x`-prefixed.
    pub addresses: Vec<String>,
    /// Per topic position (0..3), hex-encoded candidate topics (32 bytes each).
    pub topics: [Vec<String>; 4],
    /// `0` means unlimited.
    pub limit: u64,
}

impl Query {
    pub fn new(from: u64, to: u64) -> Self {
        Self {
            from,
            to,
            addresses: Vec::new(),
            topics: Default::default(),
            limit: 0,
        }
    }
}

/// One decoded candidate: its raw bytes (needed for the block-level bloom gate, which
/// operates on raw bytes exactly like the insert path) and its fingerprint (needed for
/// the row-level equality scan).
pub struct Candidate {
    pub raw: Vec<u8>,
    pub fingerprint: Fingerprint,
}

/// Decoded and fingerprinted candidates, ready to drive a scan. This is the
/// "prepared form" the engine actually traverses.
pub struct PreparedQuery {
    pub from: u64,
    pub to: u64,
    pub limit: u64,
    pub addresses: Vec<Candidate>,
    pub topics: [Vec<Candidate>; 4],
    pub has_addresses: bool,
    pub has_topics: bool,
}

impl PreparedQuery {
    pub fn prepare(query: &Query) -> Result<Self> {
        let addresses = decode_candidates(&query.addresses, 20)?;
        let topics = [
            decode_candidates(&query.topics[0], 32)?,
            decode_candidates(&query.topics[1], 32)?,
            decode_candidates(&query.topics[2], 32)?,
            decode_candidates(&query.topics[3], 32)?,
        ];

        let has_addresses = !addresses.is_empty();
        let has_topics = topics.iter().any(|t| !t.is_empty());

        let serialized_size: usize = addresses.iter().map(|c| c.raw.len() + 8).sum::<usize>()
            + topics
                .iter()
                .map(|t| t.iter().map(|c| c.raw.len() + 8).sum::<usize>())
                .sum::<usize>();
        if serialized_size > MAX_PREPARED_QUERY_BYTES {
            return Err(Error::TooLargeQuery);
        }

        Ok(Self {
            from: query.from,
            to: query.to,
            limit: query.limit,
            addresses,
            topics,
            has_addresses,
            has_topics,
        })
    }

    pub fn has_predicates(&self) -> bool {
        self.has_addresses || self.has_topics
    }
}

fn decode_candidates(hex_strings: &[String], expected_len: usize) -> Result<Vec<Candidate>> {
    hex_strings
        .iter()
        .map(|s| {
            decode_hex_bytes(s, expected_len).map(|raw| Candidate {
                fingerprint: fingerprint(&raw),
                raw,
            })
        })
        .collect()
}

/// Decodes an optionally `0x`-prefixed, case-insensitive hex string into exactly
/// `expected_len` raw bytes.
fn decode_hex_bytes(s: &str, expected_len: usize) -> Result<Vec<u8>> {
    let trimmed = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    let bytes = hex::decode(trimmed)
        .map_err(|err| Error::LibraryError(format!("invalid hex candidate {s:?}: {err}")))?;
    if bytes.len() != expected_len {
        return Err(Error::LibraryError(format!(
            "candidate {s:?} decodes to {} bytes, expected {expected_len}",
            bytes.len()
        )));
    }
    Ok(bytes)
}
