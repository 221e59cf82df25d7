//! # nvsec
//!
//! nvsec restricts the placements an allocator may hand out inside a large memory
//! pool to a chosen subset of page slots. It wraps an arbitrary allocation
//! operation and keeps allocating until the placement is secure, up to a bounded
//! number of attempts.
//!
//! ## Modules
//!
//! - `PageField`: the set of secure page slots a placement is checked against.
//! - `probe`: the allocation operation wrapped by the secure allocator.
//! - `secure_alloc`: bounded rejection sampling of a probe against a page field.
//! - `diagnostics`: reporting of attempt counts and accepted placements.
//! - `util`: page constants, sizes and a seedable RNG.
//! - `pool` (feature `pool`): an mmap-backed chunk pool usable as a probe.
//!
//! ## Example
//!
//! ```
//! use nvsec::{PageField, secure_alloc};
//! use nvsec::pool::{Pool, PoolConfig};
//!
//! let mut pool = Pool::mmap(PoolConfig::default())?;
//! let field = PageField::default();
//! let accepted = secure_alloc(&mut pool, &field)?;
//! assert!(field.is_secure(accepted.offset()));
//! pool.free(accepted.into_inner())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## External Crates
//!
//! - `log`: Used for logging throughout the crate.

pub use nvsec_core::*;

#[cfg(feature = "pool")]
pub use nvsec_pool as pool;
