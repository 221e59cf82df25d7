//! Allocation probes wrapped by the secure allocator.
//!
//! This module defines the [`AllocationProbe`] trait that every allocation operation
//! must implement to be driven by [`secure_alloc`](crate::secure_alloc), and the
//! [`Placement`] trait that exposes where an allocation landed.

use std::convert::Infallible;

/// Anything that was placed at a numeric offset inside a pool.
pub trait Placement {
    /// Offset of the allocation in bytes, relative to the start of the pool.
    fn offset(&self) -> u64;
}

impl Placement for u64 {
    fn offset(&self) -> u64 {
        *self
    }
}

impl Placement for usize {
    fn offset(&self) -> u64 {
        *self as u64
    }
}

/// Trait for allocation operations that can be retried until their placement is accepted.
///
/// Each call to [`allocate()`](AllocationProbe::allocate) performs a real allocation with
/// whatever side effects the underlying allocator has. Arguments of the allocation are
/// owned by the probe and are identical on every attempt.
///
/// # Associated Types
///
/// * `Allocation` - The allocation handle, exposing its [`Placement`].
/// * `Error` - The error type returned by allocation operations. Must implement [`std::error::Error`].
///
/// # Rejected allocations
///
/// An allocation whose placement is not secure is passed to
/// [`reclaim()`](AllocationProbe::reclaim) before the next attempt. The default
/// implementation only drops the handle, which is right for probes whose side effects
/// cannot be undone. Probes backed by a pool should return the memory to the pool.
pub trait AllocationProbe {
    /// The allocation handle returned on every attempt.
    type Allocation: Placement;
    /// The error type returned by allocation operations.
    type Error: std::error::Error + 'static;

    /// Performs one allocation.
    ///
    /// # Errors
    ///
    /// Returns the allocator's error. A failing attempt aborts the secure allocation.
    fn allocate(&mut self) -> Result<Self::Allocation, Self::Error>;

    /// Takes back an allocation whose placement was rejected.
    ///
    /// # Errors
    ///
    /// Returns the allocator's error if the allocation could not be released.
    fn reclaim(&mut self, rejected: Self::Allocation) -> Result<(), Self::Error> {
        drop(rejected);
        Ok(())
    }
}

impl<P: AllocationProbe + ?Sized> AllocationProbe for &mut P {
    type Allocation = P::Allocation;
    type Error = P::Error;

    fn allocate(&mut self) -> Result<Self::Allocation, Self::Error> {
        (**self).allocate()
    }

    fn reclaim(&mut self, rejected: Self::Allocation) -> Result<(), Self::Error> {
        (**self).reclaim(rejected)
    }
}

/// Probe created by [`from_fn`].
#[derive(Clone)]
pub struct FromFn<F>(F);

/// Turns an infallible closure into an [`AllocationProbe`].
///
/// The closure is called once per attempt. Rejected results are dropped.
///
/// # Examples
///
/// ```
/// use nvsec_core::{PageField, probe, secure_alloc};
///
/// let mut page = 0u64;
/// let mut probe = probe::from_fn(|| {
///     page += 1;
///     page << 12
/// });
/// let field = PageField::from_range(3, 4)?;
/// let accepted = secure_alloc(&mut probe, &field)?;
/// assert_eq!(accepted.attempts, 3);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn from_fn<F, T>(f: F) -> FromFn<F>
where
    F: FnMut() -> T,
    T: Placement,
{
    FromFn(f)
}

impl<F, T> AllocationProbe for FromFn<F>
where
    F: FnMut() -> T,
    T: Placement,
{
    type Allocation = T;
    type Error = Infallible;

    fn allocate(&mut self) -> Result<T, Infallible> {
        Ok((self.0)())
    }
}

/// Probe created by [`try_from_fn`].
#[derive(Clone)]
pub struct TryFromFn<F>(F);

/// Turns a fallible closure into an [`AllocationProbe`].
///
/// An `Err` returned by the closure aborts the secure allocation.
pub fn try_from_fn<F, T, E>(f: F) -> TryFromFn<F>
where
    F: FnMut() -> Result<T, E>,
    T: Placement,
    E: std::error::Error + 'static,
{
    TryFromFn(f)
}

impl<F, T, E> AllocationProbe for TryFromFn<F>
where
    F: FnMut() -> Result<T, E>,
    T: Placement,
    E: std::error::Error + 'static,
{
    type Allocation = T;
    type Error = E;

    fn allocate(&mut self) -> Result<T, E> {
        (self.0)()
    }
}
