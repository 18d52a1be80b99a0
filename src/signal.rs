//! Numeric element type carried along connections.
//!
//! Every weight, buffer and activation in a [`Graph`](crate::Graph) is a
//! [`Signal`]. The trait is implemented for `f32` and `f64`; its width also
//! fixes the width of the weight/buffer fields in the binary file format.

use std::fmt::{Debug, Display};
use std::ops::{Add, Mul};

/// Scalar used for weights, connection buffers and node activations.
///
/// Node activations are squashed through [`Signal::activate`] (hyperbolic
/// tangent), which keeps recurrent loops bounded to `(-1, 1)` no matter how
/// large the weights grow.
pub trait Signal:
    Copy
    + Default
    + PartialEq
    + PartialOrd
    + Debug
    + Display
    + Send
    + Sync
    + Add<Output = Self>
    + Mul<Output = Self>
    + 'static
{
    /// Size in bytes of the native binary representation.
    const BYTES: usize;

    /// Additive identity.
    const ZERO: Self;

    /// Apply the node nonlinearity: `tanh(self)`.
    ///
    /// NaN propagates; `±inf` saturates to `±1`.
    #[must_use]
    fn activate(self) -> Self;

    /// Convert from `f64`, rounding when the target is narrower.
    #[must_use]
    fn from_f64(value: f64) -> Self;

    /// Append the native-endian bytes of this value.
    fn extend_ne_bytes(self, out: &mut Vec<u8>);

    /// Decode a value from native-endian bytes.
    ///
    /// # Panics
    ///
    /// Panics if `bytes.len() != Self::BYTES`.
    #[must_use]
    fn from_ne_slice(bytes: &[u8]) -> Self;
}

macro_rules! impl_signal {
    ($ty:ty, $width:expr) => {
        impl Signal for $ty {
            const BYTES: usize = $width;
            const ZERO: Self = 0.0;

            #[inline]
            fn activate(self) -> Self {
                self.tanh()
            }

            #[inline]
            #[allow(clippy::cast_possible_truncation)]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            #[inline]
            fn extend_ne_bytes(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_ne_bytes());
            }

            #[inline]
            fn from_ne_slice(bytes: &[u8]) -> Self {
                let mut raw = [0u8; $width];
                raw.copy_from_slice(bytes);
                <$ty>::from_ne_bytes(raw)
            }
        }
    };
}

impl_signal!(f32, 4);
impl_signal!(f64, 8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activate_is_tanh() {
        assert!(0.0f32.activate().abs() < 1e-6);
        assert!((1.0f64.activate() - 1.0f64.tanh()).abs() < 1e-12);
        assert!(20.0f32.activate() > 0.999);
        assert!((-20.0f64).activate() < -0.999);
    }

    #[test]
    fn test_activate_saturates_infinity() {
        assert_eq!(f32::INFINITY.activate(), 1.0);
        assert_eq!(f64::NEG_INFINITY.activate(), -1.0);
        assert!(f32::NAN.activate().is_nan());
    }

    #[test]
    fn test_byte_width_matches_encoding() {
        let mut out = Vec::new();
        1.5f32.extend_ne_bytes(&mut out);
        assert_eq!(out.len(), <f32 as Signal>::BYTES);

        out.clear();
        (-0.25f64).extend_ne_bytes(&mut out);
        assert_eq!(out.len(), <f64 as Signal>::BYTES);
        assert_eq!(f64::from_ne_slice(&out), -0.25);
    }

    #[test]
    fn test_from_f64_narrows() {
        let narrowed = f32::from_f64(0.1);
        assert!((f64::from(narrowed) - 0.1).abs() < 1e-7);
    }
}
