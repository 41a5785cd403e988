//! Linking codes.
//!
//! A companion displays a short numeric code; the user types it into the
//! controller, which redeems it to form a link.  Codes are generated once per
//! companion lifetime and stay stable until the server restarts.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of decimal digits in a linking code.
pub const LINKING_CODE_DIGITS: usize = 6;

/// Exclusive upper bound of the numeric code space (10^6).
const CODE_SPACE: u32 = 1_000_000;

/// Upper bound on collision retries before giving up.
const MAX_GENERATION_ATTEMPTS: usize = 10_000;

/// A short human-presentable code identifying one companion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkingCode(String);

impl LinkingCode {
    /// Wraps a code typed by a user, trimming surrounding whitespace.
    ///
    /// Returns `None` when nothing is left after trimming.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generates a random six-digit code that `is_taken` does not reject.
    ///
    /// Returns `None` only if no free code was found after many attempts,
    /// which requires the code space to be almost exhausted.
    pub fn generate_unique(is_taken: impl Fn(&LinkingCode) -> bool) -> Option<Self> {
        Self::generate_with(&mut rand::rng(), is_taken)
    }

    /// Same as [`LinkingCode::generate_unique`] with a caller-supplied RNG.
    pub fn generate_with<R: Rng + ?Sized>(
        rng: &mut R,
        is_taken: impl Fn(&LinkingCode) -> bool,
    ) -> Option<Self> {
        for attempt in 0..MAX_GENERATION_ATTEMPTS {
            let n = rng.random_range(0..CODE_SPACE);
            let candidate = Self(format!("{n:0width$}", width = LINKING_CODE_DIGITS));
            if !is_taken(&candidate) {
                return Some(candidate);
            }
            debug!("linking code collision on attempt {attempt}; retrying");
        }
        None
    }
}

impl fmt::Display for LinkingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
