//! Numeric sentinels and physical constants.

/// Value stored in property maps for cells without data.
///
/// Every computation that reads an undefined input degrades to this
/// same sentinel instead of producing a wrong number.
pub const UNDEFINED: f64 = 99999.0;

/// Gravitational acceleration in m/s².
pub const GRAVITY: f64 = 9.81;

/// Conversion factor from pascal to megapascal.
pub const PA_TO_MPA: f64 = 1.0e-6;

/// Absolute tolerance for depth and sentinel comparisons.
pub const NUMERICAL_TOLERANCE: f64 = 1.0e-4;

/// Returns `true` if `value` is the [`UNDEFINED`] sentinel.
pub fn is_undefined(value: f64) -> bool {
    (value - UNDEFINED).abs() < NUMERICAL_TOLERANCE
}
