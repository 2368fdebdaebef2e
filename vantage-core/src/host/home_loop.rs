//! Home Loop
//!
//! A minimal home-thread executor. The thread that creates the loop becomes
//! its home thread; any thread may submit tasks, and the home thread runs
//! them by calling [`HomeLoop::run_pending`] from its own event loop.
//!
//! Tasks travel over an unbounded tokio channel, so submitting never blocks
//! the producing thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

use super::{HostScheduler, Task};
use crate::error::HostError;

/// Task queue bound to one home thread.
pub struct HomeLoop {
    home: ThreadId,
    sender: UnboundedSender<Task>,
    receiver: Mutex<UnboundedReceiver<Task>>,
    closed: AtomicBool,
}

impl HomeLoop {
    /// Create a loop whose home thread is the calling thread.
    pub fn new() -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        Arc::new(Self {
            home: thread::current().id(),
            sender,
            receiver: Mutex::new(receiver),
            closed: AtomicBool::new(false),
        })
    }

    /// The thread this loop is bound to.
    pub fn home_thread(&self) -> ThreadId {
        self.home
    }

    /// Run the tasks queued so far. Tasks submitted while they run wait for
    /// the next call, like a single turn of an event loop. Returns the number
    /// of tasks run.
    pub fn run_pending(&self) -> Result<usize, HostError> {
        if !self.is_home_thread() {
            return Err(HostError::NotHomeThread);
        }

        // The receiver lock is released before any task runs so tasks can
        // submit follow-up work.
        let batch: Vec<Task> = {
            let mut receiver = self.receiver.lock();
            std::iter::from_fn(|| receiver.try_recv().ok()).collect()
        };

        let ran = batch.len();
        for task in batch {
            task();
        }

        if ran > 0 {
            trace!(ran, "home loop turn");
        }
        Ok(ran)
    }

    /// Keep running turns until no task is left.
    pub fn run_until_idle(&self) -> Result<usize, HostError> {
        let mut total = 0;
        loop {
            match self.run_pending()? {
                0 => return Ok(total),
                ran => total += ran,
            }
        }
    }

    /// Refuse all further submissions. Already-queued tasks can still be run.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("home loop closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn submit(&self, task: Task) -> Result<(), HostError> {
        if self.is_closed() {
            return Err(HostError::Closed);
        }
        self.sender.send(task).map_err(|_| HostError::Closed)
    }
}

impl HostScheduler for HomeLoop {
    fn is_home_thread(&self) -> bool {
        thread::current().id() == self.home
    }

    fn run_on_home_thread(&self, task: Task) -> Result<(), HostError> {
        self.submit(task)
    }

    fn schedule_once(&self, task: Task) -> Result<(), HostError> {
        if !self.is_home_thread() {
            return Err(HostError::NotHomeThread);
        }
        self.submit(task)
    }
}

impl std::fmt::Debug for HomeLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeLoop")
            .field("home", &self.home)
            .field("closed", &self.is_closed())
            .finish()
    }
}
