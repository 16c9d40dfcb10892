//! SIGINT/SIGTERM handling for the batch drivers.
//!
//! Rows bound for the valid log pass through `PendingRows` on their way to
//! disk. The buffer is shared with the signal handler thread, which flushes
//! whatever is left to the valid log and exits with status 0.

use std::sync::{Arc, Mutex};

use crate::ledger::CsvLedger;
use crate::logging::{self, Source};
use crate::model::{GeotagError, OutputRow};

/// Rows accepted for the valid log but not yet written.
#[derive(Debug, Clone, Default)]
pub struct PendingRows {
    rows: Arc<Mutex<Vec<OutputRow>>>,
}

impl PendingRows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, row: OutputRow) {
        if let Ok(mut rows) = self.rows.lock() {
            rows.push(row);
        }
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write every buffered row to `ledger` and empty the buffer.
    ///
    /// The lock is held for the whole write, so a concurrent flush from the
    /// signal handler either sees the rows or sees them already written.
    /// Returns how many rows were written.
    pub fn flush_to(&self, ledger: &CsvLedger) -> Result<usize, GeotagError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| GeotagError::IoError("pending row buffer poisoned".to_string()))?;

        if rows.is_empty() {
            return Ok(0);
        }
        ledger.append(&rows)?;
        let written = rows.len();
        rows.clear();
        Ok(written)
    }
}

/// What the signal handler does before exiting: flush pending rows to
/// `ledger` when there is one. Returns how many rows were written.
pub fn on_interrupt(pending: &PendingRows, ledger: Option<&CsvLedger>) -> usize {
    let Some(ledger) = ledger else {
        logging::info(Source::System, None, "Script interrupted. Exiting...");
        return 0;
    };

    logging::info(Source::System, None, "Script interrupted. Saving logs...");
    match pending.flush_to(ledger) {
        Ok(n) => {
            if n > 0 {
                logging::info(
                    Source::Ledger,
                    None,
                    &format!("Flushed {} pending rows to {}", n, ledger.path().display()),
                );
            }
            n
        }
        Err(e) => {
            logging::error(Source::Ledger, None, &format!("Flush on interrupt failed: {}", e));
            0
        }
    }
}

/// Install the process-wide SIGINT/SIGTERM handler.
///
/// Runs `on_interrupt` and exits with status 0. Can only be installed once
/// per process.
pub fn install_handler(pending: PendingRows, ledger: Option<CsvLedger>) -> Result<(), GeotagError> {
    ctrlc::set_handler(move || {
        on_interrupt(&pending, ledger.as_ref());
        std::process::exit(0);
    })
    .map_err(|e| GeotagError::ConfigError(format!("cannot install signal handler: {}", e)))
}
