//! Error types returned by page field construction and secure allocation.

use crate::util::TOTAL_SLOTS;
use thiserror::Error;

/// Invalid secure allocation configuration.
///
/// Returned when building a [`PageField`](crate::PageField) or when a secure
/// allocation is started with settings that could never terminate successfully.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Slot range is reversed, empty, or reaches past the last slot.
    #[error("Invalid slot range [{begin}, {end}) for {n} slots", n = TOTAL_SLOTS)]
    InvalidRange {
        /// First slot of the range
        begin: usize,
        /// One past the last slot of the range
        end: usize,
    },
    /// A single slot index lies outside the field.
    #[error("Slot {0} out of range for {n} slots", n = TOTAL_SLOTS)]
    SlotOutOfRange(usize),
    /// Requested number of random secure slots cannot be satisfied.
    #[error("Cannot choose {0} secure slots out of {n}", n = TOTAL_SLOTS)]
    InvalidSlotCount(usize),
    /// The page field has no secure slot, so no placement can ever be accepted.
    #[error("Page field has no secure slots")]
    EmptyField,
    /// The attempt bound is zero, so no allocation would ever be made.
    #[error("Attempt bound must be at least 1")]
    ZeroAttemptBound,
}

/// Errors that can occur during a secure allocation.
#[derive(Debug, Error)]
pub enum SecureAllocError<E: std::error::Error + 'static> {
    /// The page field or attempt bound is invalid. No allocation was attempted.
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    /// No secure placement was found within the attempt bound.
    #[error("Secure alloc reached max try after {attempts} attempts")]
    Exhausted {
        /// Number of allocations made before giving up
        attempts: usize,
    },
    /// The wrapped allocation probe failed.
    #[error(transparent)]
    Probe(E),
}

impl<E: std::error::Error + 'static> SecureAllocError<E> {
    /// Returns `true` for configuration errors.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SecureAllocError::Configuration(_))
    }

    /// Returns `true` if the attempt bound was exhausted.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, SecureAllocError::Exhausted { .. })
    }
}
