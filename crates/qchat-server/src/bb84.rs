//! Deterministic BB84 simulation.
//!
//! Every random draw comes from a `StdRng` seeded with SHA-256 of the
//! conversation seed, so both members (and any later reopen) get the same
//! sifted key for the same `(seed, n_bits, eavesdrop)`. Educational only.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

pub const MIN_BITS: u32 = 128;
pub const MAX_BITS: u32 = 65_536;

/// Channel noise on matched bases.
pub const FLIP_PROB: f64 = 0.02;

/// Extra disturbance on matched bases when an eavesdropper is simulated.
pub const EAVESDROP_PROB: f64 = 0.10;

#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    /// Agreeing bits on matched bases, packed MSB first.
    pub sifted_key: Vec<u8>,
    pub qber: f64,
    pub kept: u32,
    pub discarded: u32,
}

pub fn simulate(seed: &[u8], n_bits: u32, eavesdrop: bool) -> Simulation {
    let mut rng = StdRng::from_seed(Sha256::digest(seed).into());
    let n = n_bits as usize;

    let photon_bits: Vec<bool> = (0..n).map(|_| rng.random()).collect();
    let alice_bases: Vec<bool> = (0..n).map(|_| rng.random()).collect();
    let bob_bases: Vec<bool> = (0..n).map(|_| rng.random()).collect();

    let mut kept = 0u32;
    let mut mismatches = 0u32;
    let mut key_bits = Vec::with_capacity(n / 2);

    for i in 0..n {
        if alice_bases[i] != bob_bases[i] {
            // Bob's outcome is random; drawn anyway so the stream stays aligned.
            let _: bool = rng.random();
            continue;
        }

        let mut measured = photon_bits[i];
        if eavesdrop && rng.random_bool(EAVESDROP_PROB) {
            measured = !measured;
        }
        if rng.random_bool(FLIP_PROB) {
            measured = !measured;
        }

        kept += 1;
        if measured == photon_bits[i] {
            key_bits.push(measured);
        } else {
            mismatches += 1;
        }
    }

    let qber = if kept == 0 {
        0.0
    } else {
        f64::from(mismatches) / f64::from(kept)
    };

    Simulation {
        sifted_key: pack_bits(&key_bits),
        qber,
        kept,
        discarded: n_bits - kept,
    }
}

fn pack_bits(bits: &[bool]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &bit)| acc | (u8::from(bit) << (7 - i)))
        })
        .collect()
}
