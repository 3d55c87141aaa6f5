use std::sync::Weak;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{Shared, TimerRegistry};

/// Background thread running the expiration sweep.
///
/// Stops when [`stop`](Self::stop) is called, when dropped, or once the
/// registry it sweeps has been dropped.
#[derive(Debug)]
pub struct Sweeper {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    pub(super) fn spawn(shared: Weak<Shared>, period: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("timebar-sweeper".to_string())
            .spawn(move || {
                tracing::debug!(?period, "Sweeper started");
                loop {
                    match stop_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let Some(shared) = shared.upgrade() else {
                        break;
                    };
                    TimerRegistry { shared }.sweep();
                }
                tracing::debug!("Sweeper stopped");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop ticking and wait for the thread to finish
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Sweeper thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
