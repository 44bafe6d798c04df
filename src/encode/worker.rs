use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::foundation::error::{MontageError, MontageResult};

#[derive(Debug, Default)]
struct Flags {
    ready: bool,
    running: bool,
}

/// Startup handshake and liveness flag shared between an encoder and its worker thread.
#[derive(Debug, Default)]
pub struct WorkerGate {
    flags: Mutex<Flags>,
    cond: Condvar,
}

impl WorkerGate {
    pub fn is_running(&self) -> bool {
        self.flags.lock().map(|f| f.running).unwrap_or(false)
    }

    fn signal_ready(&self) {
        if let Ok(mut f) = self.flags.lock() {
            f.ready = true;
            self.cond.notify_all();
        }
    }

    fn mark_exited(&self) {
        if let Ok(mut f) = self.flags.lock() {
            f.ready = false;
            f.running = false;
        }
    }
}

/// Spawn `body` on a named thread and block until it has started.
///
/// The gate reports running from the moment this returns until `body` returns.
pub fn spawn_worker<F>(name: &str, body: F) -> MontageResult<(Arc<WorkerGate>, JoinHandle<()>)>
where
    F: FnOnce() + Send + 'static,
{
    let gate = Arc::new(WorkerGate::default());
    {
        let mut f = gate
            .flags
            .lock()
            .map_err(|_| MontageError::setup("worker gate poisoned"))?;
        f.running = true;
    }

    let thread_gate = gate.clone();
    let handle = std::thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || {
            thread_gate.signal_ready();
            body();
            thread_gate.mark_exited();
        })
        .map_err(|e| MontageError::setup(format!("failed to spawn {name} thread: {e}")))?;

    let mut f = gate
        .flags
        .lock()
        .map_err(|_| MontageError::setup("worker gate poisoned"))?;
    while !f.ready && f.running {
        f = gate
            .cond
            .wait(f)
            .map_err(|_| MontageError::setup("worker gate poisoned"))?;
    }
    drop(f);
    Ok((gate, handle))
}
