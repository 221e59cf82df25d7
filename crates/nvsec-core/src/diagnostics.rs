//! Reporting of secure allocation statistics.
//!
//! The process-wide switch only provides the default for
//! [`SecureAllocConfig::diagnostics`](crate::SecureAllocConfig). A running secure
//! allocation reads its own config, never the switch.

use crate::page_field::PageField;
use log::info;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

static DIAGNOSTICS: AtomicBool = AtomicBool::new(false);

/// Enables or disables reporting for secure allocations configured after this call.
pub fn set_diagnostics(enabled: bool) {
    DIAGNOSTICS.store(enabled, Ordering::Relaxed);
}

/// Returns the current state of the process-wide diagnostics switch.
pub fn is_diagnostics_enabled() -> bool {
    DIAGNOSTICS.load(Ordering::Relaxed)
}

/// Statistics of one successful secure allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AllocStats {
    /// Number of allocations made, including the accepted one
    pub attempts: usize,
    /// Offset of the accepted allocation
    pub offset: u64,
    /// Secure slot the accepted allocation falls into
    pub slot: usize,
    /// Number of rejected allocations handed back to the probe
    pub reclaimed: usize,
}

impl AllocStats {
    pub(crate) fn new(attempts: usize, offset: u64, reclaimed: usize) -> Self {
        AllocStats {
            attempts,
            offset,
            slot: PageField::slot_of(offset),
            reclaimed,
        }
    }
}

/// Sink for secure allocation reports.
///
/// Called exactly once per successful secure allocation with diagnostics enabled.
pub trait Reporter {
    /// Reports the statistics of an accepted allocation.
    fn report(&self, stats: &AllocStats);
}

impl<R: Reporter + ?Sized> Reporter for &R {
    fn report(&self, stats: &AllocStats) {
        (**self).report(stats)
    }
}

/// Reporter writing one `info` record per report to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, stats: &AllocStats) {
        info!(
            target: "nvsec::secure_alloc",
            "secure_alloc: tried [{}] allocs, finalized at: [0x{:x}] (slot {}, {} reclaimed)",
            stats.attempts,
            stats.offset,
            stats.slot,
            stats.reclaimed
        );
    }
}

/// Reporter that discards all reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReporter;

impl Reporter for NoReporter {
    fn report(&self, _stats: &AllocStats) {}
}
