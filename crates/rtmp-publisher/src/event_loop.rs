//! # Event Loop
//!
//! A dedicated thread that runs deferred tasks one at a time in FIFO order.
//! All session I/O (handshake, sends, close) is marshaled onto this thread;
//! callers on other threads only enqueue closures.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use anyhow::{anyhow, bail};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, trace};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

enum LoopMessage {
    Run(Task),
    Shutdown,
}

/// Cloneable handle for posting tasks to an [`EventLoop`].
#[derive(Clone)]
pub struct TaskScheduler {
    tx: Sender<LoopMessage>,
    stopped: Arc<AtomicBool>,
}

impl TaskScheduler {
    /// Enqueues `task` to run on the loop thread after everything queued
    /// before it. Returns immediately.
    pub fn add_trigger_event<F>(&self, task: F) -> anyhow::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.stopped.load(Ordering::Acquire) {
            bail!("event loop has shut down");
        }
        self.tx
            .send(LoopMessage::Run(Box::new(task)))
            .map_err(|_| anyhow!("event loop thread has exited"))
    }
}

/// Owns the loop thread.
///
/// Dropping the loop runs every task already queued, then joins the thread.
pub struct EventLoop {
    scheduler: TaskScheduler,
    handle: Option<thread::JoinHandle<()>>,
    thread_id: ThreadId,
}

impl EventLoop {
    pub fn new() -> io::Result<Self> {
        Self::with_name("rtmp-event-loop")
    }

    /// Spawns the loop on a thread with the given name.
    pub fn with_name(name: &str) -> io::Result<Self> {
        let (tx, rx) = unbounded();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop_worker(rx))?;
        let thread_id = handle.thread().id();

        Ok(Self {
            scheduler: TaskScheduler {
                tx,
                stopped: Arc::new(AtomicBool::new(false)),
            },
            handle: Some(handle),
            thread_id,
        })
    }

    /// Handle for posting tasks from other threads.
    pub fn scheduler(&self) -> TaskScheduler {
        self.scheduler.clone()
    }

    pub fn add_trigger_event<F>(&self, task: F) -> anyhow::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.scheduler.add_trigger_event(task)
    }

    /// Blocks until every task queued before this call has run.
    ///
    /// Fails when called from the loop thread itself, which would deadlock.
    pub fn drain(&self) -> anyhow::Result<()> {
        if thread::current().id() == self.thread_id {
            bail!("drain called from the event loop thread");
        }
        let (done_tx, done_rx) = bounded(1);
        self.add_trigger_event(move || {
            let _ = done_tx.send(());
        })?;
        done_rx
            .recv()
            .map_err(|_| anyhow!("event loop exited before draining"))
    }

    /// Runs the remaining queue and stops the thread. Idempotent.
    ///
    /// Tasks posted concurrently with shutdown may be dropped unrun.
    pub fn shutdown(&mut self) {
        self.scheduler.stopped.store(true, Ordering::Release);
        let _ = self.scheduler.tx.send(LoopMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn loop_worker(rx: Receiver<LoopMessage>) {
    let mut executed: u64 = 0;
    for msg in rx.iter() {
        match msg {
            LoopMessage::Run(task) => {
                task();
                executed += 1;
                trace!(executed, "task complete");
            }
            LoopMessage::Shutdown => break,
        }
    }
    debug!(executed, "event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn tasks_run_in_fifo_order() {
        let ev = EventLoop::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..100 {
            let seen = seen.clone();
            ev.add_trigger_event(move || seen.lock().unwrap().push(i))
                .unwrap();
        }
        ev.drain().unwrap();
        assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn tasks_run_on_the_loop_thread() {
        let ev = EventLoop::with_name("loop-under-test").unwrap();
        let name = Arc::new(Mutex::new(None));
        let name_clone = name.clone();
        ev.add_trigger_event(move || {
            *name_clone.lock().unwrap() = thread::current().name().map(str::to_string);
        })
        .unwrap();
        ev.drain().unwrap();
        assert_eq!(name.lock().unwrap().as_deref(), Some("loop-under-test"));
    }

    #[test]
    fn scheduler_from_another_thread() {
        let ev = EventLoop::new().unwrap();
        let scheduler = ev.scheduler();
        let hits = Arc::new(Mutex::new(0));
        let hits_clone = hits.clone();
        thread::spawn(move || {
            for _ in 0..10 {
                let hits = hits_clone.clone();
                scheduler
                    .add_trigger_event(move || *hits.lock().unwrap() += 1)
                    .unwrap();
            }
        })
        .join()
        .unwrap();
        ev.drain().unwrap();
        assert_eq!(*hits.lock().unwrap(), 10);
    }

    #[test]
    fn shutdown_runs_queued_tasks_first() {
        let mut ev = EventLoop::new().unwrap();
        let hits = Arc::new(Mutex::new(0));
        for _ in 0..5 {
            let hits = hits.clone();
            ev.add_trigger_event(move || *hits.lock().unwrap() += 1)
                .unwrap();
        }
        ev.shutdown();
        assert_eq!(*hits.lock().unwrap(), 5);
    }

    #[test]
    fn post_after_shutdown_fails() {
        let mut ev = EventLoop::new().unwrap();
        let scheduler = ev.scheduler();
        ev.shutdown();
        ev.shutdown();
        assert!(scheduler.add_trigger_event(|| {}).is_err());
    }

    #[test]
    fn drain_from_loop_thread_is_refused() {
        let ev = Arc::new(EventLoop::new().unwrap());
        let result = Arc::new(Mutex::new(None));
        let (ev_clone, result_clone) = (ev.clone(), result.clone());
        ev.add_trigger_event(move || {
            *result_clone.lock().unwrap() = Some(ev_clone.drain().is_err());
        })
        .unwrap();
        ev.drain().unwrap();
        assert_eq!(*result.lock().unwrap(), Some(true));
    }
}
