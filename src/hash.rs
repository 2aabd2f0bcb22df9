//! MurmurHash64A keyed fingerprint, matching the on-disk hash used by the upstream log
//! producer (see `original_source/db/murmur2.hh`). Fingerprints are equality-only: two
//! different addresses/topics may collide, which is acceptable because the bloom filter
//! (`bloom.rs`) still gates candidate blocks before a row-level fingerprint compare runs.

/// Seed baked into every on-disk fingerprint and bloom entry. Changing this would
/// silently invalidate every block already written, so it is not configurable.
pub const HASH_SEED: u64 = 1_907_531_730;

const M: u64 = 0xc6a4_a793_5bd1_e995;
const R: u32 = 47;

/// A 64-bit equality fingerprint of an [`crate::Address`] or [`crate::Topic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Fingerprint raw bytes with the fixed seed, reproducing MurmurHash64A bit-for-bit.
pub fn fingerprint(data: &[u8]) -> Fingerprint {
    Fingerprint(murmur64a(data, HASH_SEED))
}

fn murmur64a(data: &[u8], seed: u64) -> u64 {
    let mut h = seed ^ (data.len() as u64).wrapping_mul(M);

    let chunks = data.chunks_exact(8);
    let tail = chunks.remainder();

    for chunk in chunks {
        let mut k = u64::from_le_bytes(chunk.try_into().unwrap());
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h ^= k;
        h = h.wrapping_mul(M);
    }

    // Duff's-device-style fallthrough from the C reference: each remaining byte (from
    // the highest index down to 1) is folded in, and only the final byte (index 0)
    // triggers the multiply, matching the original's `switch` fallthrough exactly.
    if !tail.is_empty() {
        let mut i = tail.len();
        while i > 1 {
            i -= 1;
            h ^= (tail[i] as u64) << (8 * i);
        }
        h ^= tail[0] as u64;
        h = h.wrapping_mul(M);
    }

    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^= h >> R;

    h
}

#[cfg(test)]
mod tests {
    use super::*;

    // Vectors cross-checked against an independent reimplementation of the C reference
    // (see original_source/db/murmur2.hh) for a handful of fixed-size inputs.
    #[test]
    fn matches_reference_vectors() {
        assert_eq!(murmur64a(&[], HASH_SEED), 0xc7237cf7e0dea97c);
        assert_eq!(murmur64a(&[0u8; 20], HASH_SEED), 0xb5a4d7441f4e5760);
        assert_eq!(murmur64a(&[0u8; 32], HASH_SEED), 0x5cce658407859deb);

        let addr: Vec<u8> = (1..=20).collect();
        assert_eq!(murmur64a(&addr, HASH_SEED), 0x2b810285623c5ae8);

        let topic: Vec<u8> = (1..=32).collect();
        assert_eq!(murmur64a(&topic, HASH_SEED), 0x2f62331d341e2c84);
    }

    #[test]
    fn is_deterministic() {
        let a = fingerprint(b"some-address-bytes!!");
        let b = fingerprint(b"some-address-bytes!!");
        assert_eq!(a, b);
    }

    #[test]
    fn distinguishes_most_inputs() {
        let a = fingerprint(&[1u8; 20]);
        let b = fingerprint(&[2u8; 20]);
        assert_ne!(a, b);
    }
}
