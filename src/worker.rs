//! Polling worker threads and their shared stop signal.
//!
//! Each sensor subsystem runs its own loop on a dedicated thread: call the
//! step, sleep for the pause it returns, repeat until the stop signal is set.
//! A panicking step is logged and the loop carries on.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::error::Result;

const POLL_SLICE: Duration = Duration::from_millis(100);
/// Pause after a step panicked
const PANIC_PAUSE: Duration = Duration::from_secs(1);

/// Cooperative cancellation flag shared by all workers.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration`, waking early once stop is requested.
    pub fn sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.is_stopped() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(POLL_SLICE.min(deadline - now));
        }
    }
}

pub struct Worker {
    name: String,
    signal: StopSignal,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Starts a thread calling `step` until `stop` is set. `step` returns the pause before its next call.
    pub fn spawn<F>(name: &str, stop: StopSignal, mut step: F) -> Result<Self>
    where
        F: FnMut() -> Duration + Send + 'static,
    {
        let thread_name = name.to_string();
        let signal = stop.clone();
        let handle = thread::Builder::new().name(format!("worker-{}", name)).spawn(move || {
            info!("Worker {} started", thread_name);
            while !stop.is_stopped() {
                let pause = match panic::catch_unwind(AssertUnwindSafe(&mut step)) {
                    Ok(pause) => pause,
                    Err(_) => {
                        error!("Worker {} step panicked, continuing", thread_name);
                        PANIC_PAUSE
                    }
                };
                stop.sleep(pause);
            }
            info!("Worker {} stopped", thread_name);
        })?;
        Ok(Self {
            name: name.to_string(),
            signal,
            handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Requests a stop and waits up to `timeout` for the thread to exit.
    ///
    /// Returns false, and leaves the thread detached, when it did not exit in time.
    pub fn stop(self, timeout: Duration) -> bool {
        self.signal.stop();
        let deadline = Instant::now() + timeout;
        while !self.handle.is_finished() && Instant::now() < deadline {
            thread::sleep(POLL_SLICE.min(timeout));
        }
        if !self.handle.is_finished() {
            warn!("Worker {} did not exit within {:?}", self.name, timeout);
            return false;
        }
        if self.handle.join().is_err() {
            warn!("Worker {} exited with a panic", self.name);
        }
        true
    }
}
