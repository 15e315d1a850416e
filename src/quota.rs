//! Build authorization.
//!
//! The builder asks a [`QuotaGate`] once, with the uncompressed corpus size, before it
//! serializes anything. How the answer is reached is up to the implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

const GIB: u64 = 1024 * 1024 * 1024;

/// Tokens a fresh license starts with.
pub const DEFAULT_TOKENS: u64 = 100;

pub trait QuotaGate: Send + Sync {
    fn authorize(&self, uncompressed_bytes: u64) -> bool;
}

/// Grants every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlimitedQuota;

impl QuotaGate for UnlimitedQuota {
    fn authorize(&self, _uncompressed_bytes: u64) -> bool {
        true
    }
}

/// Token balance: one token per started GiB, at least one per build.
#[derive(Debug)]
pub struct TokenQuota {
    remaining: AtomicU64,
}

impl Default for TokenQuota {
    fn default() -> Self {
        Self::new(DEFAULT_TOKENS)
    }
}

impl TokenQuota {
    pub fn new(tokens: u64) -> Self {
        Self {
            remaining: AtomicU64::new(tokens),
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn tokens_needed(uncompressed_bytes: u64) -> u64 {
        uncompressed_bytes.div_ceil(GIB).max(1)
    }
}

impl QuotaGate for TokenQuota {
    fn authorize(&self, uncompressed_bytes: u64) -> bool {
        let needed = Self::tokens_needed(uncompressed_bytes);
        let granted = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| left.checked_sub(needed))
            .is_ok();

        if granted {
            info!(needed, remaining = self.remaining(), "quota granted");
        } else {
            warn!(needed, remaining = self.remaining(), "quota denied");
        }
        granted
    }
}
