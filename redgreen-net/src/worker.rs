use super::client::Backend;
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Sender};
use redgreen_core::{LoadOutcome, TrialResult};
use redgreen_timing::Timer;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Work handed to the background network thread.
#[derive(Debug)]
pub enum NetJob {
    LoadScene {
        session_id: String,
        resume_from_trial: Option<u32>,
    },
    /// Waits `delay` before posting, so the last frame settles on screen.
    Save {
        delay: Duration,
        session_id: String,
        result: TrialResult,
    },
    Shutdown,
}

/// Completions delivered back to the UI thread.
#[derive(Debug, Clone, PartialEq)]
pub enum NetReply {
    SceneLoaded(LoadOutcome),
    SceneLoadFailed { reason: String },
    Saved { unique_trial_id: i64, score: f64 },
    SaveFailed { unique_trial_id: i64, reason: String },
    TimedOut { at: DateTime<Utc> },
}

pub struct NetWorker {
    jobs: Sender<NetJob>,
    handle: Option<JoinHandle<()>>,
}

impl NetWorker {
    pub fn spawn<B, T, F>(backend: B, timer: T, reply: F) -> std::io::Result<Self>
    where
        B: Backend,
        T: Timer + 'static,
        F: Fn(NetReply) + Send + 'static,
    {
        let (jobs, rx) = unbounded::<NetJob>();
        let handle = thread::Builder::new()
            .name("redgreen-net".into())
            .spawn(move || {
                for job in rx.iter() {
                    match run_job(&backend, &timer, job) {
                        Some(r) => reply(r),
                        None => break,
                    }
                }
                debug!("network worker stopped");
            })?;
        Ok(Self {
            jobs,
            handle: Some(handle),
        })
    }

    /// Queues a job. Returns false once the worker has gone away.
    pub fn submit(&self, job: NetJob) -> bool {
        self.jobs.send(job).is_ok()
    }
}

impl Drop for NetWorker {
    fn drop(&mut self) {
        let _ = self.jobs.send(NetJob::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("network worker panicked");
            }
        }
    }
}

fn run_job<B: Backend, T: Timer>(backend: &B, timer: &T, job: NetJob) -> Option<NetReply> {
    let reply = match job {
        NetJob::LoadScene {
            session_id,
            resume_from_trial,
        } => match backend.load_next_scene(&session_id, resume_from_trial) {
            Ok(outcome) => NetReply::SceneLoaded(outcome),
            Err(e) => {
                warn!("scene load failed: {e}");
                NetReply::SceneLoadFailed {
                    reason: e.to_string(),
                }
            }
        },
        NetJob::Save {
            delay,
            session_id,
            result,
        } => {
            timer.sleep(delay);
            let unique_trial_id = result.info.unique_trial_id;
            match backend.save_data(&session_id, &result) {
                Ok(score) => {
                    info!(
                        "saved trial {unique_trial_id} ({} records), score {score:.1}",
                        result.records.len()
                    );
                    NetReply::Saved {
                        unique_trial_id,
                        score,
                    }
                }
                Err(e) => {
                    warn!("save of trial {unique_trial_id} failed: {e}");
                    NetReply::SaveFailed {
                        unique_trial_id,
                        reason: e.to_string(),
                    }
                }
            }
        }
        NetJob::Shutdown => return None,
    };
    Some(reply)
}
