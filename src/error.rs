//! Value extraction error variants

use thiserror::Error;

/// User-input errors produced while interpreting a string object as a number.
///
/// Programmer contract violations (wrong type in a type-specialized function,
/// reference-count underflow) are not represented here; those trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ObjectError {
    /// The object bytes do not spell an exact signed 64-bit integer.
    #[error("value is not an integer or out of range")]
    NotAnInteger,
    /// The object bytes do not spell a finite floating point number.
    #[error("value is not a valid float")]
    NotAFloat,
}
