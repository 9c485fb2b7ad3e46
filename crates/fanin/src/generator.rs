//! Payload generation strategies.
//!
//! Each producer owns its generator outright, so random strategies carry
//! their own seeded RNG instead of sharing a process-wide one.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::GeneratorError;

/// Default exclusive upper bound for [`RandomPayload`].
pub const DEFAULT_PAYLOAD_BOUND: i64 = 100;

/// Produces the payload for one work item.
pub trait ValueGenerator: Send + 'static {
	fn generate(&mut self, sequence: u64) -> Result<i64, GeneratorError>;
}

impl<F> ValueGenerator for F
where
	F: FnMut(u64) -> Result<i64, GeneratorError> + Send + 'static,
{
	fn generate(&mut self, sequence: u64) -> Result<i64, GeneratorError> {
		self(sequence)
	}
}

/// Uniform payloads in `[0, bound)`.
#[derive(Debug, Clone)]
pub struct RandomPayload {
	bound: i64,
	rng: StdRng,
}

impl RandomPayload {
	/// # Panics
	///
	/// Panics if `bound` is not positive.
	pub fn new(bound: i64, seed: u64) -> Self {
		assert!(bound > 0, "payload bound must be > 0");
		Self {
			bound,
			rng: StdRng::seed_from_u64(seed),
		}
	}

	pub fn with_seed(seed: u64) -> Self {
		Self::new(DEFAULT_PAYLOAD_BOUND, seed)
	}
}

impl ValueGenerator for RandomPayload {
	fn generate(&mut self, _sequence: u64) -> Result<i64, GeneratorError> {
		Ok(self.rng.random_range(0..self.bound))
	}
}

/// Always yields the same payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantPayload(pub i64);

impl ValueGenerator for ConstantPayload {
	fn generate(&mut self, _sequence: u64) -> Result<i64, GeneratorError> {
		Ok(self.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn take(generator: &mut impl ValueGenerator, n: u64) -> Vec<i64> {
		(0..n).map(|seq| generator.generate(seq).unwrap()).collect()
	}

	#[test]
	fn same_seed_same_sequence() {
		let a = take(&mut RandomPayload::with_seed(7), 32);
		let b = take(&mut RandomPayload::with_seed(7), 32);
		assert_eq!(a, b);
	}

	#[test]
	fn random_payloads_stay_in_bounds() {
		let values = take(&mut RandomPayload::new(5, 99), 256);
		assert!(values.iter().all(|v| (0..5).contains(v)), "{values:?}");
	}

	#[test]
	fn closures_are_generators() {
		let mut doubling = |seq: u64| -> Result<i64, GeneratorError> { Ok(seq as i64 * 2) };
		assert_eq!(take(&mut doubling, 4), vec![0, 2, 4, 6]);

		let mut failing = |seq: u64| -> Result<i64, GeneratorError> {
			if seq == 1 { Err(GeneratorError::new("odd one out")) } else { Ok(0) }
		};
		assert_eq!(failing.generate(1), Err(GeneratorError::new("odd one out")));
	}

	#[test]
	fn constant_ignores_sequence() {
		assert_eq!(take(&mut ConstantPayload(30), 3), vec![30, 30, 30]);
	}
}
