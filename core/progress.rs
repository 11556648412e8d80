//! Best-effort progress reporting and cooperative cancellation for scans.
//!
//! Progress events travel through a bounded queue. The producer never blocks:
//! when the queue is full the event is dropped, so consumers see approximate
//! progress while the scan keeps its pace.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Estimating,
    Scanning,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanPhase::Estimating => write!(f, "estimating"),
            ScanPhase::Scanning => write!(f, "scanning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub current_path: PathBuf,
    pub processed: usize,
    pub estimated_total: usize,
    pub phase: ScanPhase,
    pub elapsed: Duration,
}

/// How a scanner hands progress events to its consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressDelivery {
    /// Events are not produced at all.
    Disabled,
    /// Events go through a queue of `capacity` slots; overflow is dropped.
    Bounded { capacity: usize },
}

impl Default for ProgressDelivery {
    fn default() -> Self {
        ProgressDelivery::Bounded {
            capacity: crate::config::DEFAULT_PROGRESS_CAPACITY,
        }
    }
}

/// Producer half of the progress queue.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    sender: Option<SyncSender<Progress>>,
    dropped: Arc<AtomicU64>,
}

impl ProgressSink {
    /// Creates a sink and, unless delivery is disabled, the matching receiver.
    pub fn channel(delivery: ProgressDelivery) -> (Self, Option<Receiver<Progress>>) {
        match delivery {
            ProgressDelivery::Disabled => (Self::disabled(), None),
            ProgressDelivery::Bounded { capacity } => {
                let (tx, rx) = mpsc::sync_channel(capacity.max(1));
                (
                    Self {
                        sender: Some(tx),
                        dropped: Arc::new(AtomicU64::new(0)),
                    },
                    Some(rx),
                )
            }
        }
    }

    pub fn disabled() -> Self {
        Self {
            sender: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Offers an event without blocking. Full or disconnected queues drop it.
    pub fn emit(&self, progress: Progress) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(progress) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Number of events discarded so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Shared cancellation flag. Cloning shares the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: usize) -> Progress {
        Progress {
            current_path: PathBuf::from(format!("file_{n}")),
            processed: n,
            estimated_total: 10,
            phase: ScanPhase::Scanning,
            elapsed: Duration::from_millis(n as u64),
        }
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (sink, rx) = ProgressSink::channel(ProgressDelivery::Bounded { capacity: 2 });
        let rx = rx.unwrap();
        for n in 0..5 {
            sink.emit(event(n));
        }
        assert_eq!(sink.dropped(), 3);
        let received: Vec<usize> = rx.try_iter().map(|p| p.processed).collect();
        assert_eq!(received, vec![0, 1]);
    }

    #[test]
    fn disabled_delivery_has_no_receiver() {
        let (sink, rx) = ProgressSink::channel(ProgressDelivery::Disabled);
        assert!(rx.is_none());
        sink.emit(event(1));
        assert_eq!(sink.dropped(), 0);
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }
}
