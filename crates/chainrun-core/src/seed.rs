//! Deterministic per-chain seed derivation.

use std::collections::BTreeSet;
use std::hash::Hasher;

use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;

/// Base seed used when the caller does not supply one.
pub const DEFAULT_BASE_SEED: u32 = 0x5EED_5EED;

/// Rule mapping `(base_seed, chain_index)` to the seed handed to a chain.
///
/// Seeds are `u32` because that is the range accepted by the sampler's
/// `random seed=` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeedScheme {
    /// `base_seed + chain_index`, wrapping at `u32::MAX`.
    #[default]
    Offset,
    /// SipHash-1-3 with zero keys over `(base_seed, chain_index)`, folded to 32 bits.
    Substream,
}

/// Derives the deterministic seed for a specific substream.
pub fn derive_substream_seed(master_seed: u64, substream: u64) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write_u64(master_seed);
    hasher.write_u64(substream);
    hasher.finish()
}

fn fold(value: u64) -> u32 {
    (value ^ (value >> 32)) as u32
}

/// Returns the seed for a single chain under `scheme`.
pub fn chain_seed(base_seed: u32, chain_index: usize, scheme: SeedScheme) -> u32 {
    match scheme {
        SeedScheme::Offset => base_seed.wrapping_add(chain_index as u32),
        SeedScheme::Substream => fold(derive_substream_seed(
            u64::from(base_seed),
            chain_index as u64,
        )),
    }
}

/// Returns `chains` pairwise distinct seeds, one per chain index.
///
/// Collisions can only occur under [`SeedScheme::Substream`]; they are resolved
/// by re-deriving from a salted substream until the value is unused, which keeps
/// the output a pure function of the inputs.
pub fn chain_seeds(base_seed: u32, chains: usize, scheme: SeedScheme) -> Vec<u32> {
    let mut used = BTreeSet::new();
    let mut seeds = Vec::with_capacity(chains);
    for index in 0..chains {
        let mut seed = chain_seed(base_seed, index, scheme);
        let mut salt = 0u64;
        while !used.insert(seed) {
            salt += 1;
            seed = fold(derive_substream_seed(
                u64::from(seed) ^ (salt << 32),
                index as u64,
            ));
        }
        seeds.push(seed);
    }
    seeds
}
