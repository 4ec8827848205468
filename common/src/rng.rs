//! Deterministic synthetic data generator
//!
//! A linear-congruential generator used both to fill generated test files and to seed the
//! in-memory bandwidth simulation. The byte stream is a pure function of
//! `(seed, multiplier, increment, length)`, so identical parameters always reproduce identical
//! files and identical benchmark inputs across runs.

/// Default initial state.
pub const DEFAULT_SEED: u64 = 0x0123456789ABCDEF;
/// Default multiplier (Knuth's MMIX constant).
pub const DEFAULT_MULTIPLIER: u64 = 6364136223846793005;
/// Default increment.
pub const DEFAULT_INCREMENT: u64 = 1;

/// Generator parameters: `state = state * multiplier + increment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Lcg {
    pub seed: u64,
    pub multiplier: u64,
    pub increment: u64,
}

impl Default for Lcg {
    fn default() -> Self {
        Self::new(DEFAULT_SEED, DEFAULT_MULTIPLIER, DEFAULT_INCREMENT)
    }
}

impl Lcg {
    pub fn new(seed: u64, multiplier: u64, increment: u64) -> Self {
        Self {
            seed,
            multiplier,
            increment,
        }
    }

    /// Advances the state and returns the new value.
    pub fn next_word(&mut self) -> u64 {
        self.seed = self
            .seed
            .wrapping_mul(self.multiplier)
            .wrapping_add(self.increment);
        self.seed
    }

    /// Fills `buffer` with consecutive 64-bit words in native byte order.
    ///
    /// Only `buffer.len() / 8` whole words are written; a trailing partial word is left untouched.
    /// A sequentially-consistent fence is issued before returning so the fill is visible to any
    /// reader that treats the buffer as real data.
    pub fn fill(&mut self, buffer: &mut [u8]) {
        let mut words = buffer.chunks_exact_mut(std::mem::size_of::<u64>());
        for word in &mut words {
            word.copy_from_slice(&self.next_word().to_ne_bytes());
        }
        std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
    }
}
