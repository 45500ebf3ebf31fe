//! Provably fair outcome generation.
//!
//! Commit-reveal protocol: the operator publishes `sha256(server_seed)`
//! before play and reveals the seed afterwards, so any player can check
//! the outcome was fixed before their bet. The outcome itself is a pure
//! function of (server seed, client seed, nonce):
//!
//! ```text
//! hash = HMAC-SHA256(key = server_seed, msg = client_seed ":" nonce)
//! ```
//!
//! Sub-values are read from successive 4-byte segments of the hash; when
//! the segments run out, the stream re-hashes `hash ":" index` and keeps
//! going. No hidden RNG state exists anywhere in the pipeline.

use crate::games::types::SeedPair;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const SEED_BYTES: usize = 32;
const SEGMENT_BYTES: usize = 4;

/// Generates seed material and verifies revealed seeds.
pub struct FairnessEngine;

impl FairnessEngine {
    /// Fresh high-entropy server seed, hex encoded.
    pub fn generate_server_seed() -> String {
        let mut bytes = [0u8; SEED_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Fresh client seed for players that do not supply one.
    pub fn generate_client_seed() -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// The pre-play commitment: hex sha256 of the seed string.
    pub fn commitment(server_seed: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(server_seed.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Build a committed seed pair, generating the client seed if absent.
    pub fn new_seed_pair(client_seed: Option<String>) -> SeedPair {
        let server_seed = Self::generate_server_seed();
        let server_seed_hash = Self::commitment(&server_seed);
        SeedPair {
            server_seed,
            server_seed_hash,
            client_seed: client_seed.unwrap_or_else(Self::generate_client_seed),
        }
    }

    /// True iff the revealed seed hashes to the pre-committed value.
    pub fn verify_seed(server_seed: &str, server_seed_hash: &str) -> bool {
        Self::commitment(server_seed) == server_seed_hash
    }
}

/// Deterministic value stream for one (server seed, client seed, nonce).
pub struct OutcomeStream {
    current: [u8; 32],
    offset: usize,
    rehash_index: u32,
}

impl OutcomeStream {
    pub fn new(server_seed: &str, client_seed: &str, nonce: u64) -> Self {
        // Keyed with the server seed; the message is what the player controls.
        let mut mac = HmacSha256::new_from_slice(server_seed.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(client_seed.as_bytes());
        mac.update(b":");
        mac.update(nonce.to_string().as_bytes());

        Self {
            current: mac.finalize().into_bytes().into(),
            offset: 0,
            rehash_index: 0,
        }
    }

    pub fn from_seeds(seeds: &SeedPair, nonce: u64) -> Self {
        Self::new(&seeds.server_seed, &seeds.client_seed, nonce)
    }

    fn next_segment(&mut self) -> [u8; SEGMENT_BYTES] {
        if self.offset + SEGMENT_BYTES > self.current.len() {
            let mut hasher = Sha256::new();
            hasher.update(self.current);
            hasher.update(b":");
            hasher.update(self.rehash_index.to_string().as_bytes());
            self.current = hasher.finalize().into();
            self.offset = 0;
            self.rehash_index += 1;
        }

        let mut segment = [0u8; SEGMENT_BYTES];
        segment.copy_from_slice(&self.current[self.offset..self.offset + SEGMENT_BYTES]);
        self.offset += SEGMENT_BYTES;
        segment
    }

    /// Next float in [0, 1): a 4-byte unsigned integer over 2^32.
    pub fn next_float(&mut self) -> f64 {
        let raw = u32::from_be_bytes(self.next_segment());
        raw as f64 / (u32::MAX as f64 + 1.0)
    }

    /// Next integer in [min, max], scale-and-floor over the float.
    pub fn next_int(&mut self, min: u32, max: u32) -> u32 {
        debug_assert!(min <= max);
        let span = (max - min + 1) as f64;
        min + (self.next_float() * span) as u32
    }

    /// Draw `count` unique values in [0, bound) with a bounded retry
    /// budget, then fill deterministically from the low end so the draw
    /// always completes.
    pub fn draw_unique(&mut self, count: usize, bound: u32, retry_budget: usize) -> Vec<u8> {
        let mut drawn: Vec<u8> = Vec::with_capacity(count);
        let mut attempts = 0;

        while drawn.len() < count && attempts < retry_budget {
            let candidate = self.next_int(0, bound - 1) as u8;
            if !drawn.contains(&candidate) {
                drawn.push(candidate);
            }
            attempts += 1;
        }

        if drawn.len() < count {
            for candidate in 0..bound as u8 {
                if !drawn.contains(&candidate) {
                    drawn.push(candidate);
                    if drawn.len() == count {
                        break;
                    }
                }
            }
        }

        drawn
    }
}
