//! Asynchronous fault delivery
//!
//! Operations that fail after successful submission cannot report through
//! the call that submitted them. They land here instead, and callers drain
//! the sink at every synchronization point. A fault recorded between two
//! waits is never silently dropped: the next `check` surfaces it.

use parking_lot::Mutex;

use crate::error::{Result, UsmError};

/// One failed queued operation.
#[derive(Debug, Clone)]
pub struct Fault {
    /// Name of the queue operation that failed.
    pub op: String,
    /// Human-readable failure description.
    pub reason: String,
}

/// Collects faults from queued operations until the next sync point.
#[derive(Debug, Default)]
pub struct FaultSink {
    faults: Mutex<Vec<Fault>>,
}

impl FaultSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a post-submission failure.
    pub fn push(&self, fault: Fault) {
        self.faults.lock().push(fault);
    }

    /// Remove and return all recorded faults.
    pub fn drain(&self) -> Vec<Fault> {
        std::mem::take(&mut *self.faults.lock())
    }

    /// Whether any fault is pending.
    pub fn is_empty(&self) -> bool {
        self.faults.lock().is_empty()
    }

    /// Drain the sink, converting pending faults into a hard error.
    ///
    /// The first fault becomes the error; any further ones are logged so
    /// they are not lost.
    pub fn check(&self) -> Result<()> {
        let mut faults = self.drain();
        if faults.is_empty() {
            return Ok(());
        }
        for extra in faults.iter().skip(1) {
            tracing::warn!(op = %extra.op, reason = %extra.reason, "additional queued fault");
        }
        let first = faults.swap_remove(0);
        Err(UsmError::AsyncTransfer {
            op: first.op,
            reason: first.reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sink_checks_clean() {
        let sink = FaultSink::new();
        assert!(sink.is_empty());
        assert!(sink.check().is_ok());
    }

    #[test]
    fn test_check_surfaces_first_fault() {
        let sink = FaultSink::new();
        sink.push(Fault {
            op: "copy".to_string(),
            reason: "bus error".to_string(),
        });
        sink.push(Fault {
            op: "dispatch".to_string(),
            reason: "late".to_string(),
        });

        let err = sink.check().unwrap_err();
        match err {
            UsmError::AsyncTransfer { op, reason } => {
                assert_eq!(op, "copy");
                assert_eq!(reason, "bus error");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Drained: a second check is clean.
        assert!(sink.check().is_ok());
    }

    #[test]
    fn test_drain_empties_sink() {
        let sink = FaultSink::new();
        sink.push(Fault {
            op: "copy".to_string(),
            reason: "x".to_string(),
        });
        assert_eq!(sink.drain().len(), 1);
        assert!(sink.is_empty());
    }
}
