//! Serialized execution of repository-mutating work.
//!
//! libgit2 does not coordinate concurrent writers to the same index or
//! working tree, so every mutation goes through one worker thread that runs
//! submitted tasks strictly in submission order.

use crate::error::{Result, SyncError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error};

const WORKER_NAME: &str = "git-operations";

type Task = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

enum Message {
    Run { label: String, task: Task },
    Flush(mpsc::Sender<()>),
}

/// Single-worker FIFO task queue.
///
/// A task that fails or panics is logged and the worker moves on to the
/// next one.
pub struct OperationScheduler {
    sender: Option<mpsc::Sender<Message>>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl OperationScheduler {
    /// Start the worker thread.
    pub fn new() -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let worker = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || run_worker(receiver))?;

        Ok(Self {
            sender: Some(sender),
            worker_id: worker.thread().id(),
            worker: Some(worker),
        })
    }

    /// Queue `task` behind everything already submitted. Never blocks.
    pub fn schedule<F>(&self, label: impl Into<String>, task: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let label = label.into();
        debug!(task = %label, "scheduling git task");
        self.send(Message::Run {
            label,
            task: Box::new(task),
        })
    }

    /// Block until every task submitted before this call has finished.
    ///
    /// Returns immediately when called from the worker itself.
    pub fn flush(&self) -> Result<()> {
        if self.on_worker() {
            return Ok(());
        }
        let (done, wait) = mpsc::channel();
        self.send(Message::Flush(done))?;
        wait.recv().map_err(|_| SyncError::SchedulerStopped)
    }

    /// True when the caller is running inside a task of this scheduler.
    pub fn on_worker(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    fn send(&self, message: Message) -> Result<()> {
        self.sender
            .as_ref()
            .ok_or(SyncError::SchedulerStopped)?
            .send(message)
            .map_err(|_| SyncError::SchedulerStopped)
    }
}

impl Drop for OperationScheduler {
    fn drop(&mut self) {
        // closing the channel lets the worker drain the queue and exit
        self.sender.take();
        if let Some(worker) = self.worker.take()
            && !self.on_worker()
        {
            let _ = worker.join();
        }
    }
}

fn run_worker(receiver: mpsc::Receiver<Message>) {
    for message in receiver {
        match message {
            Message::Run { label, task } => run_task(&label, task),
            Message::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("git task worker stopped");
}

fn run_task(label: &str, task: Task) {
    match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(())) => debug!(task = %label, "git task finished"),
        Ok(Err(e)) => error!(task = %label, error = %e, "git task failed"),
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(task = %label, %reason, "git task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn test_tasks_run_in_submission_order() {
        let scheduler = OperationScheduler::new().unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        // the first task is the slowest; order must still hold
        for (id, delay) in [(1, 30), (2, 0), (3, 10)] {
            let order = Arc::clone(&order);
            scheduler
                .schedule(format!("T{}", id), move || {
                    thread::sleep(Duration::from_millis(delay));
                    order.lock().unwrap().push(id);
                    Ok(())
                })
                .unwrap();
        }

        scheduler.flush().unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_no_two_tasks_overlap() {
        let scheduler = Arc::new(OperationScheduler::new().unwrap());
        let running = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let submitters: Vec<_> = (0..4)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                let running = Arc::clone(&running);
                let overlaps = Arc::clone(&overlaps);
                thread::spawn(move || {
                    for _ in 0..5 {
                        let running = Arc::clone(&running);
                        let overlaps = Arc::clone(&overlaps);
                        scheduler
                            .schedule("overlap check", move || {
                                if running.swap(true, Ordering::SeqCst) {
                                    overlaps.fetch_add(1, Ordering::SeqCst);
                                }
                                thread::sleep(Duration::from_millis(1));
                                running.store(false, Ordering::SeqCst);
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for submitter in submitters {
            submitter.join().unwrap();
        }

        scheduler.flush().unwrap();
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_schedule_does_not_wait_for_running_task() {
        let scheduler = OperationScheduler::new().unwrap();
        let (release, gate) = mpsc::channel::<()>();

        scheduler
            .schedule("blocked", move || {
                let _ = gate.recv();
                Ok(())
            })
            .unwrap();

        // returns while the first task is still blocked
        scheduler.schedule("queued", || Ok(())).unwrap();
        release.send(()).unwrap();
        scheduler.flush().unwrap();
    }

    #[test]
    fn test_failures_do_not_stop_the_worker() {
        let scheduler = OperationScheduler::new().unwrap();
        let ran = Arc::new(AtomicBool::new(false));

        scheduler
            .schedule("fails", || Err(SyncError::state("detached HEAD")))
            .unwrap();
        scheduler
            .schedule("panics", || panic!("task blew up"))
            .unwrap();
        let flag = Arc::clone(&ran);
        scheduler
            .schedule("after", move || {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        scheduler.flush().unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_tasks_run_on_worker_thread() {
        let scheduler = Arc::new(OperationScheduler::new().unwrap());
        let other = OperationScheduler::new().unwrap();
        let on_worker = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&on_worker);
        let this = Arc::clone(&scheduler);

        scheduler
            .schedule("where", move || {
                flag.store(this.on_worker(), Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        scheduler.flush().unwrap();

        assert!(on_worker.load(Ordering::SeqCst));
        assert!(!scheduler.on_worker());
        assert!(!other.on_worker());
    }

    #[test]
    fn test_flush_of_another_scheduler_waits_from_a_task() {
        let first = OperationScheduler::new().unwrap();
        let second = Arc::new(OperationScheduler::new().unwrap());
        let slow_done = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&slow_done);
        second
            .schedule("slow", move || {
                thread::sleep(Duration::from_millis(50));
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        let observed = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&observed);
        let target = Arc::clone(&second);
        let flag = Arc::clone(&slow_done);
        first
            .schedule("wait for second", move || {
                target.flush()?;
                seen.store(flag.load(Ordering::SeqCst), Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        first.flush().unwrap();

        assert!(observed.load(Ordering::SeqCst));
    }
}
