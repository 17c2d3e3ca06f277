//! Scalar dead-zone quantization of wavelet coefficients.

use crate::error::{CodecError, Result};

/// Maps float coefficients to signed integer indices and back.
///
/// The dead zone widens the bin around zero: a coefficient with magnitude at
/// or below `dead_zone_offset * step_size` quantizes to 0. Reconstruction
/// places dequantized values at `(|index| + r) * step_size` with `r = 0.5` by
/// default; zero always reconstructs to exactly zero and signs are preserved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quantizer {
	step_size: f32,
	dead_zone_offset: f32,
	reconstruction: f32,
	reversible: bool,
}

impl Quantizer {
	pub fn new(step_size: f32, dead_zone_offset: f32) -> Result<Self> {
		if step_size <= 0.0 || !step_size.is_finite() {
			return Err(CodecError::InvalidConfiguration(format!(
				"step size must be positive, got {step_size}"
			)));
		}
		if !(0.0..=1.0).contains(&dead_zone_offset) {
			return Err(CodecError::InvalidConfiguration(format!(
				"dead zone offset must be in [0, 1], got {dead_zone_offset}"
			)));
		}
		Ok(Self {
			step_size,
			dead_zone_offset,
			reconstruction: 0.5,
			reversible: false,
		})
	}

	/// Unit step size, no dead zone: the identity on integer coefficients.
	#[must_use]
	pub fn reversible() -> Self {
		Self {
			step_size: 1.0,
			dead_zone_offset: 0.0,
			reconstruction: 0.0,
			reversible: true,
		}
	}

	/// Overrides the reconstruction offset `r ∈ [0, 1)`.
	pub fn with_reconstruction(mut self, reconstruction: f32) -> Result<Self> {
		if !(0.0..1.0).contains(&reconstruction) {
			return Err(CodecError::InvalidConfiguration(format!(
				"reconstruction offset must be in [0, 1), got {reconstruction}"
			)));
		}
		self.reconstruction = reconstruction;
		Ok(self)
	}

	#[must_use]
	pub fn is_reversible(&self) -> bool {
		self.reversible
	}

	#[must_use]
	pub fn step_size(&self) -> f32 {
		self.step_size
	}

	#[must_use]
	pub fn quantize(&self, coefficient: f32) -> i32 {
		if self.reversible {
			return coefficient.round() as i32;
		}
		let magnitude = coefficient.abs();
		let threshold = self.dead_zone_offset * self.step_size;
		if magnitude <= threshold {
			return 0;
		}
		let index = ((magnitude - threshold) / self.step_size).floor() as i32;
		if coefficient < 0.0 { -index } else { index }
	}

	#[must_use]
	pub fn dequantize(&self, index: i32) -> f32 {
		if self.reversible {
			return index as f32;
		}
		if index == 0 {
			return 0.0;
		}
		let magnitude = (index.unsigned_abs() as f32 + self.reconstruction) * self.step_size;
		if index < 0 { -magnitude } else { magnitude }
	}

	pub fn quantize_all(&self, coefficients: &[f32], out: &mut Vec<i32>) {
		out.clear();
		out.extend(coefficients.iter().map(|&c| self.quantize(c)));
	}

	pub fn dequantize_all(&self, indices: &[i32], out: &mut Vec<f32>) {
		out.clear();
		out.extend(indices.iter().map(|&v| self.dequantize(v)));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[test]
	fn construction_validates() {
		assert!(Quantizer::new(0.0, 0.0).is_err());
		assert!(Quantizer::new(-1.0, 0.0).is_err());
		assert!(Quantizer::new(1.0, 1.5).is_err());
		assert!(Quantizer::new(0.5, 0.5).is_ok());
	}

	#[rstest]
	#[case(0.0, 0)]
	#[case(0.4, 0)] // inside the dead zone
	#[case(-0.4, 0)]
	#[case(1.6, 1)]
	#[case(-1.6, -1)]
	#[case(10.3, 9)]
	fn quantize_with_dead_zone(#[case] coefficient: f32, #[case] expected: i32) {
		let quantizer = Quantizer::new(1.0, 0.5).unwrap();
		assert_eq!(quantizer.quantize(coefficient), expected);
	}

	#[test]
	fn zero_maps_to_zero_exactly() {
		let quantizer = Quantizer::new(0.75, 0.25).unwrap();
		assert_eq!(quantizer.quantize(0.0), 0);
		assert_eq!(quantizer.dequantize(0), 0.0);
	}

	#[test]
	fn sign_preserved() {
		let quantizer = Quantizer::new(0.5, 0.3).unwrap();
		for value in [-7.3f32, -1.0, 2.4, 19.0] {
			let index = quantizer.quantize(value);
			let restored = quantizer.dequantize(index);
			if index != 0 {
				assert_eq!(value < 0.0, index < 0);
				assert_eq!(value < 0.0, restored < 0.0);
			}
			assert_eq!(index == 0, restored == 0.0);
		}
	}

	#[test]
	fn default_reconstruction_is_midpoint() {
		let quantizer = Quantizer::new(2.0, 0.0).unwrap();
		assert_eq!(quantizer.dequantize(3), 7.0);
		assert_eq!(quantizer.dequantize(-3), -7.0);
	}

	#[test]
	fn reversible_is_identity_on_integers() {
		let quantizer = Quantizer::reversible();
		assert!(quantizer.is_reversible());
		for value in [-1000i32, -1, 0, 1, 65535] {
			assert_eq!(quantizer.quantize(value as f32), value);
			assert_eq!(quantizer.dequantize(value), value as f32);
		}
	}

	#[test]
	fn batch_roundtrip_is_bounded() {
		let quantizer = Quantizer::new(0.5, 0.25).unwrap();
		let coefficients = [0.0f32, 3.3, -8.8, 127.0, -0.1];
		let mut indices = Vec::new();
		let mut restored = Vec::new();
		quantizer.quantize_all(&coefficients, &mut indices);
		quantizer.dequantize_all(&indices, &mut restored);
		for (original, reconstructed) in coefficients.iter().zip(restored.iter()) {
			assert!((original - reconstructed).abs() <= 0.5 * (1.0 + 0.25) + f32::EPSILON);
		}
	}
}
