use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::SourceError;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResolutionSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (resolution failed).
    Error,
    /// Critical error (storage I/O failures).
    Critical,
}

impl ResolutionSeverity {
    /// Severity of a resolution failure: `Critical` for I/O, `Error` for everything else.
    pub fn of(error: &SourceError) -> Self {
        match error {
            SourceError::Io(_) => Self::Critical,
            SourceError::Csv(e) if matches!(e.kind(), ::csv::ErrorKind::Io(_)) => Self::Critical,
            _ => Self::Error,
        }
    }
}

/// Context about a resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionContext {
    /// Number of configured readers.
    pub readers: usize,
}

/// Stats reported on successful resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionStats {
    /// Blobs returned by the storage listing.
    pub blobs_listed: usize,
    /// Blobs assigned to at least one table.
    pub blobs_mapped: usize,
    /// Tables produced.
    pub tables: usize,
}

/// Observer interface for resolution outcomes.
pub trait ResolutionObserver: Send + Sync {
    /// Called when resolution succeeds.
    fn on_success(&self, _ctx: &ResolutionContext, _stats: ResolutionStats) {}

    /// Called when resolution fails.
    fn on_failure(&self, _ctx: &ResolutionContext, _severity: ResolutionSeverity, _error: &SourceError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &ResolutionContext, severity: ResolutionSeverity, error: &SourceError) {
        self.on_failure(ctx, severity, error)
    }
}

/// Fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn ResolutionObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn ResolutionObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl ResolutionObserver for CompositeObserver {
    fn on_success(&self, ctx: &ResolutionContext, stats: ResolutionStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &ResolutionContext, severity: ResolutionSeverity, error: &SourceError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &ResolutionContext, severity: ResolutionSeverity, error: &SourceError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Emits resolution events as `tracing` events.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl ResolutionObserver for TracingObserver {
    fn on_success(&self, ctx: &ResolutionContext, stats: ResolutionStats) {
        info!(
            readers = ctx.readers,
            blobs_listed = stats.blobs_listed,
            blobs_mapped = stats.blobs_mapped,
            tables = stats.tables,
            "resolved tables"
        );
    }

    fn on_failure(&self, ctx: &ResolutionContext, severity: ResolutionSeverity, error: &SourceError) {
        warn!(readers = ctx.readers, ?severity, %error, "resolution failed");
    }

    fn on_alert(&self, ctx: &ResolutionContext, severity: ResolutionSeverity, error: &SourceError) {
        error!(readers = ctx.readers, ?severity, %error, "resolution alert");
    }
}
