//! Bounded work queue with fixed parallelism and aggregated errors.
//!
//! Every multi-item lifecycle phase enqueues its tasks and then joins
//! before the next phase. A failing task stores its error and returns; the
//! join itself never fails. Callers check [`WorkQueue::has_errors`] after
//! each barrier and abort the batch.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use tracing::error;

type Task = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

struct Shared {
    pending: Mutex<usize>,
    drained: Condvar,
    errors: Mutex<Vec<anyhow::Error>>,
}

pub struct WorkQueue {
    sender: Option<Sender<Task>>,
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkQueue {
    /// A queue holding at most `depth` queued tasks, executed by
    /// `parallelism` worker threads (at least one). Enqueueing blocks while
    /// the queue is full.
    pub fn new(depth: usize, parallelism: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded::<Task>(depth.max(1));
        let shared = Arc::new(Shared {
            pending: Mutex::new(0),
            drained: Condvar::new(),
            errors: Mutex::new(Vec::new()),
        });

        let workers = (0..parallelism.max(1))
            .map(|index| {
                let receiver: Receiver<Task> = receiver.clone();
                let shared = Arc::clone(&shared);

                std::thread::Builder::new()
                    .name(format!("workqueue-{index}"))
                    .spawn(move || {
                        while let Ok(task) = receiver.recv() {
                            if let Err(err) = task() {
                                shared.errors.lock().unwrap().push(err);
                            }

                            let mut pending = shared.pending.lock().unwrap();
                            *pending -= 1;
                            if *pending == 0 {
                                shared.drained.notify_all();
                            }
                        }
                    })
                    .expect("failed to spawn work queue worker")
            })
            .collect();

        Self {
            sender: Some(sender),
            shared,
            workers,
        }
    }

    pub fn enqueue(&self, task: impl FnOnce() -> anyhow::Result<()> + Send + 'static) {
        *self.shared.pending.lock().unwrap() += 1;

        self.sender
            .as_ref()
            .expect("work queue already shut down")
            .send(Box::new(task))
            .expect("work queue workers exited");
    }

    /// Block until every enqueued task has finished.
    pub fn join(&self) {
        let mut pending = self.shared.pending.lock().unwrap();
        while *pending > 0 {
            pending = self.shared.drained.wait(pending).unwrap();
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.shared.errors.lock().unwrap().is_empty()
    }

    /// Log and drain every stored error, so the queue can be reused for
    /// the next batch.
    pub fn report_errors(&self, category: &str) {
        let errors: Vec<anyhow::Error> = self.shared.errors.lock().unwrap().drain(..).collect();

        for err in errors {
            error!("Error while processing {category} task: {err:#}");
        }
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.sender.take();

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
