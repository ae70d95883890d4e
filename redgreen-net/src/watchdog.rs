use super::client::Backend;
use super::wire::TimeoutStatus;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Polls `/check_timeout` on its own thread until the backend reports the
/// session expired or the watchdog is dropped.
pub struct TimeoutWatchdog {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl TimeoutWatchdog {
    pub fn spawn<B, F>(
        backend: B,
        session_id: String,
        interval: Duration,
        on_timeout: F,
    ) -> std::io::Result<Self>
    where
        B: Backend,
        F: FnOnce(DateTime<Utc>) + Send + 'static,
    {
        let (stop, stopped) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("redgreen-timeout".into())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                    match backend.check_timeout(&session_id) {
                        Ok(TimeoutStatus::Active) => debug!("session {session_id} active"),
                        Ok(TimeoutStatus::TimedOut { at }) => {
                            info!("session {session_id} timed out at {}", at.to_rfc3339());
                            on_timeout(at);
                            return;
                        }
                        // Transient failures keep the session alive.
                        Err(e) => warn!("timeout check failed: {e}"),
                    }
                }
                debug!("timeout watchdog stopped");
            })?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for TimeoutWatchdog {
    fn drop(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("timeout watchdog panicked");
            }
        }
    }
}
