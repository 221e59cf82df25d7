//! Chunk pool allocator for nvsec.
//!
//! This crate provides [`Pool`], a pool of fixed-size chunks backed by an anonymous
//! memory mapping. It stands in for the pool allocator wrapped by secure allocation
//! and shows how a probe returns rejected allocations to its pool.
//!
//! Implements the [`nvsec_core::AllocationProbe`] trait.
//!
//! # Placement
//!
//! The [`PlacementStrategy`] decides which free chunk is handed out next. Note that
//! with [`PlacementStrategy::FirstFit`] a reclaimed chunk is handed out again on the
//! next attempt, so a secure allocation only succeeds if the lowest free chunk is
//! already secure.

#![warn(missing_docs)]

mod pool;

pub use pool::{Chunk, Error, PlacementStrategy, Pool, PoolConfig};
