//! Sources of initial sequence numbers and ephemeral ports.
//!
//! The stack never needs cryptographic randomness; it needs values that
//! differ between connections and that tests can pin down.

/// Supplies fresh 32-bit values for TCP initial sequence numbers and ports.
pub trait SequenceSource {
    /// Next value.
    fn next_u32(&mut self) -> u32;

    /// An ephemeral port in the dynamic range 49152..=65535.
    fn next_port(&mut self) -> u16 {
        49_152 + (self.next_u32() % 16_384) as u16
    }
}

/// Middle-square Weyl sequence generator.
///
/// Squares a 64-bit state, adds a Weyl sequence to keep it from collapsing,
/// and keeps the middle bits. Deterministic for a given seed.
#[derive(Debug, Clone)]
pub struct MiddleSquare {
    x: u64,
    w: u64,
    s: u64,
}

impl MiddleSquare {
    const WEYL: u64 = 0xB5AD_4ECE_DA1C_E2A9;

    /// Create a generator from a seed, e.g. a free-running timer value.
    pub fn new(seed: u64) -> Self {
        MiddleSquare {
            x: seed,
            w: 0,
            s: Self::WEYL | 1,
        }
    }
}

impl Default for MiddleSquare {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SequenceSource for MiddleSquare {
    fn next_u32(&mut self) -> u32 {
        self.x = self.x.wrapping_mul(self.x);
        self.w = self.w.wrapping_add(self.s);
        self.x = self.x.wrapping_add(self.w);
        self.x = self.x.rotate_right(32);
        self.x as u32
    }
}

/// Replays a fixed list of values, cycling when exhausted.
///
/// Useful wherever a reproducible sequence number is wanted.
#[derive(Debug, Clone)]
pub struct FixedSequence<const N: usize> {
    values: [u32; N],
    index: usize,
}

impl<const N: usize> FixedSequence<N> {
    /// Create a source that yields `values` in order.
    pub const fn new(values: [u32; N]) -> Self {
        FixedSequence { values, index: 0 }
    }
}

impl<const N: usize> SequenceSource for FixedSequence<N> {
    fn next_u32(&mut self) -> u32 {
        if N == 0 {
            return 0;
        }
        let value = self.values[self.index % N];
        self.index = (self.index + 1) % N;
        value
    }
}
