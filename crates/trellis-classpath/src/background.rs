use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Outstanding {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Outstanding {
    fn start(&self) {
        *self.count.lock() += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count > 0 {
            if self.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}

/// A single named thread draining a job queue.
///
/// Jobs never run on the submitting thread unless the worker could not be spawned.
pub(crate) struct BackgroundWorker {
    sender: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
    outstanding: Arc<Outstanding>,
}

impl BackgroundWorker {
    pub(crate) fn spawn(name: &str) -> Self {
        let (sender, receiver) = unbounded::<Job>();
        let outstanding = Arc::new(Outstanding::default());
        let for_thread = Arc::clone(&outstanding);

        let spawned = thread::Builder::new().name(name.to_string()).spawn(move || {
            for job in receiver {
                if std::panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::warn!(target = "trellis.classpath", "background job panicked");
                }
                for_thread.finish();
            }
        });

        match spawned {
            Ok(handle) => Self {
                sender: Some(sender),
                handle: Some(handle),
                outstanding,
            },
            Err(err) => {
                tracing::warn!(
                    target = "trellis.classpath",
                    error = %err,
                    "failed to spawn background worker; jobs will run inline"
                );
                Self {
                    sender: None,
                    handle: None,
                    outstanding,
                }
            }
        }
    }

    pub(crate) fn submit(&self, job: impl FnOnce() + Send + 'static) {
        self.outstanding.start();
        let job: Job = Box::new(job);
        let job = match &self.sender {
            Some(sender) => match sender.send(job) {
                Ok(()) => return,
                Err(err) => err.into_inner(),
            },
            None => job,
        };
        job();
        self.outstanding.finish();
    }

    /// Wait until every submitted job has finished. Returns `false` on timeout.
    pub(crate) fn wait_idle(&self, timeout: Duration) -> bool {
        self.outstanding.wait_idle(timeout)
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop once queued jobs are drained.
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            // The last owner may be a job running on the worker itself.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}
