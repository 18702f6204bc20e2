//! Forwarding of termination signals to the job's child process.
//!
//! While `jobmutex run` holds a lock, SIGINT, SIGTERM, SIGHUP and SIGQUIT no
//! longer kill jobmutex itself. They are passed on to the child, and the lock
//! is released once the child has exited.

use jobmutex::error::{MutexError, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

#[cfg(unix)]
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};

#[derive(Debug, Default)]
struct ForwardState {
    child: Option<u32>,
    received: Option<i32>,
}

/// Listens for termination signals and relays them to the attached child.
///
/// Dropping the forwarder stops the listener thread.
pub struct SignalForwarder {
    state: Arc<Mutex<ForwardState>>,
    #[cfg(unix)]
    handle: signal_hook::iterator::Handle,
    listener: Option<JoinHandle<()>>,
}

impl SignalForwarder {
    /// Register the signal listeners and start the relay thread.
    #[cfg(unix)]
    pub fn install() -> Result<Self> {
        let mut signals = signal_hook::iterator::Signals::new([SIGINT, SIGTERM, SIGHUP, SIGQUIT])
            .map_err(|e| {
                MutexError::JobError(format!("failed to register signal listeners: {}", e))
            })?;
        let handle = signals.handle();
        let state = Arc::new(Mutex::new(ForwardState::default()));

        let relay_state = Arc::clone(&state);
        let listener = thread::Builder::new()
            .name("jobmutex-signals".to_string())
            .spawn(move || {
                for signal in signals.forever() {
                    let mut state = lock_state(&relay_state);
                    state.received = Some(signal);
                    match state.child {
                        Some(pid) => {
                            info!(signal, pid, "forwarding signal to job command");
                            send_signal(pid, signal);
                        }
                        None => info!(signal, "received signal before the job command started"),
                    }
                }
            })
            .map_err(|e| {
                MutexError::JobError(format!("failed to start signal listener thread: {}", e))
            })?;

        Ok(Self {
            state,
            handle,
            listener: Some(listener),
        })
    }

    /// Signal forwarding is only available on unix.
    #[cfg(not(unix))]
    pub fn install() -> Result<Self> {
        Ok(Self {
            state: Arc::new(Mutex::new(ForwardState::default())),
            listener: None,
        })
    }

    /// First signal received so far, if any.
    pub fn received(&self) -> Option<i32> {
        lock_state(&self.state).received
    }

    /// Relay future signals to `pid`. A signal that arrived while the child
    /// was starting is delivered now.
    pub fn attach(&self, pid: u32) {
        let mut state = lock_state(&self.state);
        state.child = Some(pid);
        if let Some(signal) = state.received {
            info!(signal, pid, "forwarding pending signal to job command");
            send_signal(pid, signal);
        }
    }

    /// Stop relaying to the child. Call once it has been waited for.
    pub fn detach(&self) {
        lock_state(&self.state).child = None;
    }
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        #[cfg(unix)]
        self.handle.close();

        if let Some(listener) = self.listener.take()
            && listener.join().is_err()
        {
            warn!("signal listener thread panicked");
        }
    }
}

fn lock_state(state: &Mutex<ForwardState>) -> MutexGuard<'_, ForwardState> {
    state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: i32) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers and touches no memory of ours.
    let rc = unsafe { libc::kill(pid, signal) };
    if rc != 0 {
        warn!(
            pid,
            signal,
            error = %std::io::Error::last_os_error(),
            "failed to forward signal to job command"
        );
    }
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _signal: i32) {}
