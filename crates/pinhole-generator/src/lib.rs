//! Deterministic short-code derivation.
//!
//! A code is the first few base58 characters of the SHA-256 digest of the
//! original URL. When a candidate is already occupied the generator re-hashes
//! with a round-dependent salt, so the sequence of candidates for a URL is a
//! pure function of the URL and the round number.

pub mod error;

pub use error::GeneratorError;

use pinhole_core::ShortCode;
use sha2::{Digest, Sha256};
use std::future::Future;
use typed_builder::TypedBuilder;

/// Length of generated codes unless configured otherwise.
pub const DEFAULT_CODE_LENGTH: usize = 6;
/// Candidates tried before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 32;

// base58 of a 32-byte digest is at least 43 characters long.
const MAX_CODE_LENGTH: usize = 32;

#[derive(Debug, Clone, TypedBuilder)]
pub struct HashGenerator {
    #[builder(default = DEFAULT_CODE_LENGTH)]
    length: usize,
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,
}

impl Default for HashGenerator {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl HashGenerator {
    pub fn length(&self) -> usize {
        self.length.clamp(1, MAX_CODE_LENGTH)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Derives the candidate for `url` at the given retry round.
    ///
    /// Round 0 hashes the URL alone; round `n` hashes the URL followed by a
    /// zero byte and `n` as big-endian `u32`.
    pub fn candidate(&self, url: &str, round: u32) -> ShortCode {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        if round > 0 {
            hasher.update([0u8]);
            hasher.update(round.to_be_bytes());
        }
        let digest = hasher.finalize();

        let mut encoded = bs58::encode(digest.as_slice()).into_string();
        encoded.truncate(self.length());
        ShortCode::new_unchecked(encoded)
    }

    /// Iterates over the candidates for `url` in retry order.
    pub fn candidates<'a>(&'a self, url: &'a str) -> impl Iterator<Item = ShortCode> + 'a {
        (0..self.max_attempts()).map(move |round| self.candidate(url, round))
    }

    /// Returns the first candidate for `url` that `occupied` reports free.
    ///
    /// `occupied` is asked about each candidate in retry order, so the result
    /// depends only on the URL and on which candidates are taken. An error
    /// from the check aborts the search.
    pub async fn generate<F, Fut, E>(&self, url: &str, mut occupied: F) -> Result<ShortCode, E>
    where
        F: FnMut(ShortCode) -> Fut,
        Fut: Future<Output = Result<bool, E>>,
        E: From<GeneratorError>,
    {
        for candidate in self.candidates(url) {
            if !occupied(candidate.clone()).await? {
                return Ok(candidate);
            }
        }

        Err(GeneratorError::Exhausted {
            attempts: self.max_attempts(),
        }
        .into())
    }

    /// Returns the round-0 candidate without any collision check.
    ///
    /// Used by the bulk import path. The result is NOT guaranteed to be
    /// unique against the live store: if another URL already holds the same
    /// code, saving this one overwrites it.
    pub fn generate_without_check(&self, url: &str) -> ShortCode {
        self.candidate(url, 0)
    }
}
