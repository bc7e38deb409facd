use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

/// Result of a bounded stop.
///
/// `Lingering` means the thread had not exited when the grace period ran
/// out. It keeps running until it next observes its stop signal, and any
/// resource it owns is released only then.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    Lingering,
}

/// A named worker thread that can be joined with a deadline.
///
/// Completion is observed through a channel whose only sender lives in the
/// thread body, so it disconnects on normal return and on unwind alike.
/// Joining takes `&self`, so a shared handle can be waited on from any thread.
pub struct GracefulThread {
    name: String,
    handle: Mutex<Option<JoinHandle<()>>>,
    done_rx: Receiver<()>,
}

impl GracefulThread {
    pub fn spawn<F>(name: impl Into<String>, body: F) -> std::io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _done = done_tx;
                body();
            })?;
        Ok(Self {
            name,
            handle: Mutex::new(Some(handle)),
            done_rx,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the thread body has returned or unwound.
    pub fn is_finished(&self) -> bool {
        matches!(self.done_rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Waits up to `grace` for the thread to exit, joining it if it did.
    pub fn join_within(&self, grace: Duration) -> StopOutcome {
        match self.done_rx.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let handle = self
                    .handle
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .take();
                if let Some(handle) = handle {
                    if handle.join().is_err() {
                        log::error!("Thread {} panicked", self.name);
                    }
                }
                StopOutcome::Stopped
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Thread {} still running after {}ms grace period",
                    self.name,
                    grace.as_millis()
                );
                StopOutcome::Lingering
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_join_within_returns_stopped_for_finished_thread() {
        let t = GracefulThread::spawn("quick", || {}).unwrap();
        assert_eq!(t.join_within(Duration::from_secs(2)), StopOutcome::Stopped);
        assert!(t.is_finished());
    }

    #[test]
    fn test_join_within_reports_lingering_then_stops() {
        let release = Arc::new(AtomicBool::new(false));
        let flag = release.clone();
        let t = GracefulThread::spawn("slow", move || {
            while !flag.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();

        assert_eq!(
            t.join_within(Duration::from_millis(30)),
            StopOutcome::Lingering
        );
        assert!(!t.is_finished());

        release.store(true, Ordering::SeqCst);
        assert_eq!(t.join_within(Duration::from_secs(2)), StopOutcome::Stopped);
    }

    #[test]
    fn test_panicking_thread_counts_as_stopped() {
        let t = GracefulThread::spawn("boom", || panic!("expected")).unwrap();
        assert_eq!(t.join_within(Duration::from_secs(2)), StopOutcome::Stopped);
    }

    #[test]
    fn test_shared_handle_joins_from_another_thread() {
        let t = Arc::new(GracefulThread::spawn("shared", || {
            std::thread::sleep(Duration::from_millis(20));
        })
        .unwrap());
        let waiter = {
            let t = t.clone();
            std::thread::spawn(move || t.join_within(Duration::from_secs(2)))
        };
        assert_eq!(waiter.join().unwrap(), StopOutcome::Stopped);
        assert!(t.is_finished());
        assert_eq!(t.join_within(Duration::ZERO), StopOutcome::Stopped);
    }

    #[test]
    fn test_thread_carries_name() {
        let t = GracefulThread::spawn("camera-7", || {}).unwrap();
        assert_eq!(t.name(), "camera-7");
    }
}
