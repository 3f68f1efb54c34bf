// =============================================================================
// Cycle Observers — completion/error notification seam
// =============================================================================
//
// The scan engine never reaches into presentation state. Anything that
// wants to react to a finished cycle (logging, a UI push, metrics export)
// registers an observer and receives the report.

use tracing::{error, info};

use crate::scanner::CycleReport;

pub trait CycleObserver: Send + Sync {
    fn on_cycle_complete(&self, report: &CycleReport);
    fn on_cycle_error(&self, error: &anyhow::Error);
}

/// Default observer: one structured log line per cycle outcome.
pub struct LogObserver;

impl CycleObserver for LogObserver {
    fn on_cycle_complete(&self, report: &CycleReport) {
        info!(
            cycle_id = %report.cycle_id,
            total = report.total,
            updated = report.updated,
            failed = report.failed,
            elapsed_ms = report.elapsed_ms,
            "scan cycle complete"
        );
    }

    fn on_cycle_error(&self, error: &anyhow::Error) {
        error!(error = %error, "scan cycle failed");
    }
}
