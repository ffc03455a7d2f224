//! SplitMix64 as a plain value.
//!
//! Every call that consumes randomness takes the generator by value and
//! returns the advanced one, so the state stored in a checkpoint is exactly
//! the state the next draw will use.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    pub fn seeded(seed: u64) -> Self {
        Self { state: seed }
    }

    #[must_use]
    pub fn next_u64(self) -> (u64, Self) {
        let state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        (z ^ (z >> 31), Self { state })
    }

    /// Uniform value in `0..bound`; `bound` must be non-zero.
    #[must_use]
    pub fn below(self, bound: u64) -> (u64, Self) {
        debug_assert!(bound > 0);
        // Rejection sampling keeps the draw unbiased.
        let zone = u64::MAX - u64::MAX % bound;
        let mut rng = self;
        loop {
            let (value, next) = rng.next_u64();
            rng = next;
            if value < zone {
                return (value % bound, rng);
            }
        }
    }
}

/// Fisher-Yates shuffle driven by an explicit generator.
#[must_use]
pub fn shuffle<T>(items: &mut [T], rng: SplitMix64) -> SplitMix64 {
    let mut rng = rng;
    for i in (1..items.len()).rev() {
        let (j, next) = rng.below(i as u64 + 1);
        rng = next;
        items.swap(i, j as usize);
    }
    rng
}
