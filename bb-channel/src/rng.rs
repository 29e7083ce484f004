//! Deterministic PRNG for channel impairment decisions.
//!
//! xorshift64\*, seeded from the channel configuration. A seed of `0`
//! resolves to a fixed nonzero constant so the generator is never run with
//! an all-zero state (which is a fixed point of xorshift). With identical
//! seeds and identical call sequences, impairment decisions are
//! bit-for-bit reproducible across runs — this is what lets the end-to-end
//! scenarios in the spec fix a `seed` and get a deterministic retransmit
//! count.

/// Fallback seed used when the configured seed is `0`.
const ZERO_SEED_FALLBACK: u64 = 0x9E3779B97F4A7C15;

pub struct Rng {
	state: u64,
}

impl Rng {
	pub fn new(seed: u64) -> Self {
		Self { state: if seed == 0 { ZERO_SEED_FALLBACK } else { seed } }
	}

	/// Next raw 64-bit output.
	pub fn next_u64(&mut self) -> u64 {
		let mut x = self.state;
		x ^= x >> 12;
		x ^= x << 25;
		x ^= x >> 27;
		self.state = x;
		x.wrapping_mul(0x2545_F491_4F6C_DD1D)
	}

	/// Uniform double in `[0, 1)`, taken from the top 53 bits of a single
	/// generator output.
	pub fn next_f64(&mut self) -> f64 {
		let top53 = self.next_u64() >> 11;
		top53 as f64 / (1u64 << 53) as f64
	}

	/// `true` with probability `pct / 100`. `pct` is clamped to `[0, 100]`.
	pub fn chance(&mut self, pct: u8) -> bool {
		self.next_f64() * 100.0 < pct.min(100) as f64
	}

	/// Uniform double in `[lo, hi)`.
	pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
		lo + self.next_f64() * (hi - lo)
	}
}
