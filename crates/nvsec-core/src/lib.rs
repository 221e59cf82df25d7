//! # nvsec Core
//!
//! `nvsec-core` restricts where allocations inside a large, persistently addressed
//! pool may land. An allocator's default placement policy is predictable, so the
//! layout of allocations can leak information over time. Instead of trusting the
//! allocator, nvsec repeatedly allocates until the placement falls into a chosen
//! subset of secure page slots.
//!
//! ## Main Components
//!
//! - [`PageField`] - An immutable bit-field over [`util::TOTAL_SLOTS`] page slots.
//!   A byte offset belongs to slot `(offset >> PAGE_SHIFT) % TOTAL_SLOTS`.
//!
//! - [`probe::AllocationProbe`] - The interface of the wrapped allocation operation.
//!   Every call performs one real allocation; rejected allocations are handed back
//!   through [`probe::AllocationProbe::reclaim`].
//!
//! - [`secure_alloc`] / [`secure_alloc_with`] / [`SecureAllocator`] - Bounded rejection
//!   sampling of the probe against a page field.
//!
//! - [`diagnostics`] module - The process-wide diagnostics switch and the
//!   [`diagnostics::Reporter`] receiving statistics of accepted allocations.
//!
//! ## Errors
//!
//! Secure allocation fails with [`SecureAllocError::Configuration`] before touching
//! the probe if the page field is empty, with [`SecureAllocError::Exhausted`] once
//! the attempt bound is reached, and with [`SecureAllocError::Probe`] if the probe
//! itself fails. There is no fallback and no widening of the page field.

#![warn(missing_docs)]

pub mod diagnostics;
mod error;
mod page_field;
pub mod probe;
mod secure_alloc;
pub mod util;

pub use crate::diagnostics::{is_diagnostics_enabled, set_diagnostics};
pub use crate::error::{ConfigurationError, SecureAllocError};
pub use crate::page_field::PageField;
pub use crate::probe::{AllocationProbe, Placement};

pub use secure_alloc::{SecureAlloc, SecureAllocConfig, SecureAllocator, secure_alloc, secure_alloc_with};
