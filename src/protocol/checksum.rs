//! LRC checksum strategies.
//!
//! The port agent checksum is a running XOR over bytes. It takes a seed so a
//! header and payload can be folded in sequence without concatenating them.
//!
//! Two strategies produce identical results:
//! - [`BytewiseLrc`] folds one byte at a time.
//! - [`WideLrc`] folds eight bytes per step in a `u64` and collapses the
//!   lanes at the end.
//!
//! The process-wide strategy is chosen once, either explicitly with
//! [`install`] or lazily on first use (defaults to [`WideLrc`]).

use std::fmt;
use std::sync::OnceLock;

/// A checksum strategy.
pub trait LrcStrategy: Send + Sync + fmt::Debug {
    /// XOR-fold `data` into `seed`.
    fn fold(&self, data: &[u8], seed: u8) -> u8;
}

/// Byte-at-a-time fold.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseLrc;

impl LrcStrategy for BytewiseLrc {
    #[inline]
    fn fold(&self, data: &[u8], seed: u8) -> u8 {
        data.iter().fold(seed, |acc, b| acc ^ b)
    }
}

/// Word-at-a-time fold.
#[derive(Debug, Clone, Copy, Default)]
pub struct WideLrc;

impl LrcStrategy for WideLrc {
    fn fold(&self, data: &[u8], seed: u8) -> u8 {
        let mut chunks = data.chunks_exact(8);
        let mut wide = 0u64;
        for chunk in &mut chunks {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            wide ^= u64::from_ne_bytes(word);
        }

        let lanes = wide
            .to_ne_bytes()
            .iter()
            .fold(seed, |acc, b| acc ^ b);
        BytewiseLrc.fold(chunks.remainder(), lanes)
    }
}

static BYTEWISE: BytewiseLrc = BytewiseLrc;
static WIDE: WideLrc = WideLrc;

static ACTIVE: OnceLock<&'static dyn LrcStrategy> = OnceLock::new();

/// Select the process-wide strategy.
///
/// Returns `false` if a strategy was already selected (explicitly or by a
/// prior checksum computation); the existing choice is kept.
pub fn install(strategy: &'static dyn LrcStrategy) -> bool {
    ACTIVE.set(strategy).is_ok()
}

/// Select the byte-at-a-time strategy.
pub fn install_bytewise() -> bool {
    install(&BYTEWISE)
}

/// The strategy in use.
pub fn active() -> &'static dyn LrcStrategy {
    *ACTIVE.get_or_init(|| {
        tracing::debug!("Using word-at-a-time LRC");
        &WIDE
    })
}

/// XOR-fold `data` into `seed` with the active strategy.
#[inline]
pub fn lrc(data: &[u8], seed: u8) -> u8 {
    active().fold(data, seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_vector() {
        assert_eq!(BytewiseLrc.fold(b"this is a test", 0), 0x4B);
        assert_eq!(WideLrc.fold(b"this is a test", 0), 0x4B);
    }

    #[test]
    fn test_empty_returns_seed() {
        assert_eq!(BytewiseLrc.fold(&[], 0x5A), 0x5A);
        assert_eq!(WideLrc.fold(&[], 0x5A), 0x5A);
    }

    #[test]
    fn test_seed_chains_across_slices() {
        let data = b"header and payload folded separately";
        let (a, b) = data.split_at(11);
        assert_eq!(WideLrc.fold(b, WideLrc.fold(a, 0)), WideLrc.fold(data, 0));
    }

    #[test]
    fn test_fold_with_own_checksum_cancels() {
        let data = b"cancel me out".to_vec();
        let sum = BytewiseLrc.fold(&data, 0);
        assert_eq!(BytewiseLrc.fold(&[sum], BytewiseLrc.fold(&data, 0)), 0);
    }

    #[test]
    fn test_active_is_stable() {
        let first = active().fold(b"abc", 0);
        assert_eq!(lrc(b"abc", 0), first);
        // Selection is fixed once a checksum has been computed.
        assert!(!install_bytewise());
    }

    proptest! {
        #[test]
        fn prop_strategies_agree(data in prop::collection::vec(any::<u8>(), 0..4096), seed in any::<u8>()) {
            prop_assert_eq!(BytewiseLrc.fold(&data, seed), WideLrc.fold(&data, seed));
        }
    }
}
