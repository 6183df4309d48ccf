//! Stable 64-bit FNV-1a hashing of names into seeds.
//!
//! `std`'s `DefaultHasher` may change between Rust releases, which would
//! silently change every split and replica of an existing runcard.

const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const PRIME: u64 = 0x0000_0100_0000_01b3;

pub fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(OFFSET_BASIS, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}
