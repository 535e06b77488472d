//! Randomness port
//!
//! Card numbers, CVVs and transaction references draw from an injected
//! source so tests can replay exact sequences.

pub trait RandomSource: Send + Sync {
    /// Uniform integer in `0..bound` (`bound` > 0)
    fn next_below(&self, bound: u32) -> u32;

    /// Fill `dest` with random bytes
    fn fill_bytes(&self, dest: &mut [u8]);
}
