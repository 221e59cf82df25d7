//! Bounded rejection sampling over an [`AllocationProbe`].
//!
//! The probe is invoked until it returns an allocation whose placement is secure
//! according to a [`PageField`]. Rejected allocations are reclaimed through the
//! probe before the next attempt. After [`SecureAllocConfig::max_attempts`]
//! rejected attempts the allocation fails with [`SecureAllocError::Exhausted`].

use crate::diagnostics::{AllocStats, LogReporter, Reporter, is_diagnostics_enabled};
use crate::error::{ConfigurationError, SecureAllocError};
use crate::page_field::PageField;
use crate::probe::{AllocationProbe, Placement};
use crate::util::MAX_SECURE_ALLOC_TRIES;
use log::{debug, trace, warn};

/// Configuration of a secure allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecureAllocConfig {
    /// Maximum number of allocations before giving up
    pub max_attempts: usize,
    /// Report statistics of every successful allocation
    pub diagnostics: bool,
}

/// Uses [`MAX_SECURE_ALLOC_TRIES`] and the current state of the process-wide
/// diagnostics switch.
impl Default for SecureAllocConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_SECURE_ALLOC_TRIES,
            diagnostics: is_diagnostics_enabled(),
        }
    }
}

impl SecureAllocConfig {
    /// Replaces the attempt bound.
    pub fn with_max_attempts(self, max_attempts: usize) -> Self {
        Self {
            max_attempts,
            ..self
        }
    }

    /// Enables or disables reporting.
    pub fn with_diagnostics(self, diagnostics: bool) -> Self {
        Self {
            diagnostics,
            ..self
        }
    }
}

/// An allocation accepted by the secure allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureAlloc<T> {
    /// The accepted allocation
    pub allocation: T,
    /// Number of allocations made, including the accepted one
    pub attempts: usize,
    /// Number of rejected allocations handed back to the probe
    pub reclaimed: usize,
}

impl<T> SecureAlloc<T> {
    /// Returns the accepted allocation.
    pub fn into_inner(self) -> T {
        self.allocation
    }
}

impl<T: Placement> SecureAlloc<T> {
    /// Offset of the accepted allocation.
    pub fn offset(&self) -> u64 {
        self.allocation.offset()
    }

    /// Statistics as passed to the [`Reporter`].
    pub fn stats(&self) -> AllocStats {
        AllocStats::new(self.attempts, self.offset(), self.reclaimed)
    }
}

/// Allocates from `probe` until the placement is secure in `pf`.
///
/// Uses [`SecureAllocConfig::default()`] and reports through [`LogReporter`].
///
/// # Errors
///
/// See [`secure_alloc_with`].
pub fn secure_alloc<P>(
    probe: &mut P,
    pf: &PageField,
) -> Result<SecureAlloc<P::Allocation>, SecureAllocError<P::Error>>
where
    P: AllocationProbe + ?Sized,
{
    secure_alloc_with(probe, pf, &SecureAllocConfig::default(), &LogReporter)
}

/// Allocates from `probe` until the placement is secure in `pf`.
///
/// Acceptance is first fit: the first secure placement is returned together with
/// the number of attempts it took. Every rejected allocation is passed to
/// [`AllocationProbe::reclaim`] before the next attempt. If `config.diagnostics`
/// is set, `reporter` receives exactly one report on success and none on failure.
///
/// # Errors
///
/// * [`SecureAllocError::Configuration`] if `pf` has no secure slot or the attempt
///   bound is zero. The probe is not invoked.
/// * [`SecureAllocError::Exhausted`] after `config.max_attempts` rejected attempts.
/// * [`SecureAllocError::Probe`] if allocating or reclaiming fails.
pub fn secure_alloc_with<P, R>(
    probe: &mut P,
    pf: &PageField,
    config: &SecureAllocConfig,
    reporter: &R,
) -> Result<SecureAlloc<P::Allocation>, SecureAllocError<P::Error>>
where
    P: AllocationProbe + ?Sized,
    R: Reporter + ?Sized,
{
    pf.validate()?;
    if config.max_attempts == 0 {
        return Err(ConfigurationError::ZeroAttemptBound.into());
    }
    debug!(
        "secure_alloc: {} secure slots, at most {} attempts",
        pf.secure_slots(),
        config.max_attempts
    );

    let mut reclaimed = 0;
    for attempts in 1..=config.max_attempts {
        let allocation = probe.allocate().map_err(SecureAllocError::Probe)?;
        let offset = allocation.offset();
        if pf.is_secure(offset) {
            let accepted = SecureAlloc {
                allocation,
                attempts,
                reclaimed,
            };
            if config.diagnostics {
                reporter.report(&accepted.stats());
            }
            return Ok(accepted);
        }
        trace!(
            "Rejected placement 0x{:x} in slot {}",
            offset,
            PageField::slot_of(offset)
        );
        probe.reclaim(allocation).map_err(SecureAllocError::Probe)?;
        reclaimed += 1;
    }

    warn!(
        "secure_alloc: no secure placement after {} attempts",
        config.max_attempts
    );
    Err(SecureAllocError::Exhausted {
        attempts: config.max_attempts,
    })
}

/// Secure allocator owning its probe, page field, config and reporter.
///
/// # Examples
///
/// ```
/// use nvsec_core::{PageField, SecureAllocator, probe};
///
/// let mut next = 0u64;
/// let mut allocator = SecureAllocator::new(
///     probe::from_fn(move || {
///         next += 0x1000;
///         next
///     }),
///     PageField::from_range(8, 16)?,
/// );
/// let accepted = allocator.alloc()?;
/// assert_eq!(accepted.offset(), 8 * 0x1000);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct SecureAllocator<P: AllocationProbe, R: Reporter = LogReporter> {
    probe: P,
    field: PageField,
    config: SecureAllocConfig,
    reporter: R,
}

impl<P: AllocationProbe> SecureAllocator<P> {
    /// Creates a secure allocator with the default config, reporting to the log.
    pub fn new(probe: P, field: PageField) -> Self {
        SecureAllocator {
            probe,
            field,
            config: SecureAllocConfig::default(),
            reporter: LogReporter,
        }
    }
}

impl<P: AllocationProbe, R: Reporter> SecureAllocator<P, R> {
    /// Replaces the config.
    pub fn with_config(self, config: SecureAllocConfig) -> Self {
        Self { config, ..self }
    }

    /// Replaces the reporter.
    pub fn with_reporter<R2: Reporter>(self, reporter: R2) -> SecureAllocator<P, R2> {
        SecureAllocator {
            probe: self.probe,
            field: self.field,
            config: self.config,
            reporter,
        }
    }

    /// Performs one secure allocation.
    ///
    /// # Errors
    ///
    /// See [`secure_alloc_with`].
    pub fn alloc(&mut self) -> Result<SecureAlloc<P::Allocation>, SecureAllocError<P::Error>> {
        secure_alloc_with(&mut self.probe, &self.field, &self.config, &self.reporter)
    }

    /// The page field placements are checked against.
    pub fn field(&self) -> &PageField {
        &self.field
    }

    /// The config used for every allocation.
    pub fn config(&self) -> &SecureAllocConfig {
        &self.config
    }

    /// Mutable access to the wrapped probe, e.g. to free accepted allocations.
    pub fn probe_mut(&mut self) -> &mut P {
        &mut self.probe
    }

    /// Returns the wrapped probe.
    pub fn into_inner(self) -> P {
        self.probe
    }
}
