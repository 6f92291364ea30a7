//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float,
{
    target_range.0
        + ((value - source_range.0)
        * (target_range.1 - target_range.0)
        / (source_range.1 - source_range.0))
}

/// Return the sign of a value as `1.0` or `-1.0`.
///
/// Zero maps to `1.0`, which keeps `x.abs() * sign(x) == x` for all non-NaN
/// inputs except `-0.0`.
pub fn sign<T>(value: T) -> T
where
    T: Float,
{
    if value < T::from(0.0).unwrap() {
        T::from(-1.0).unwrap()
    }
    else {
        T::from(1.0).unwrap()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lin_map() {
        // Forward and inverse of the same mapping must round trip
        assert_eq!(lin_map((0f64, 1f64), (0f64, 10f64), 0.5), 5.0);
        assert_eq!(lin_map((0f64, 10f64), (0f64, 1f64), 5.0), 0.5);

        // Mapping across zero
        assert_eq!(lin_map((-1f64, 1f64), (0f64, 1f64), 0.0), 0.5);
    }

    #[test]
    fn test_sign() {
        assert_eq!(sign(3.2f64), 1.0);
        assert_eq!(sign(-0.001f64), -1.0);
        assert_eq!(sign(0.0f64), 1.0);
    }
}
