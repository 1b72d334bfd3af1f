// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::VecDeque,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Condvar, Mutex},
    thread::JoinHandle,
};

use anyhow::{Result, anyhow};

type Task = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

struct State {
    queue: VecDeque<Task>,
    valid: bool,
    shutdown: bool,
    running: usize,
    error: Option<anyhow::Error>,
}

struct Shared {
    state: Mutex<State>,
    task_available: Condvar,
    all_done: Condvar,
}

/// FIFO worker pool executing whole-event tasks.
///
/// Tasks are pulled in submission order, but completion order is only
/// guaranteed with a single worker. The first error (or panic) raised by any
/// task invalidates the queue: pending tasks are dropped, running tasks
/// finish, and the error is rethrown on the submitting thread from
/// [`ThreadPool::wait_all`].
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawns `num_workers` worker threads (at least one).
    pub fn new(num_workers: usize) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                valid: true,
                shutdown: false,
                running: 0,
                error: None,
            }),
            task_available: Condvar::new(),
            all_done: Condvar::new(),
        });

        let workers = (0..num_workers.max(1))
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || worker(&shared))
            })
            .collect();

        Self { shared, workers }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Enqueues a task. Submissions after an error or shutdown are dropped
    /// silently so no further work starts.
    pub fn submit<F>(&self, task: F)
    where F: FnOnce() -> Result<()> + Send + 'static {
        let mut state = self.shared.state.lock().expect("pool lock poisoned");
        if !state.valid || state.shutdown {
            return;
        }
        state.queue.push_back(Box::new(task));
        self.shared.task_available.notify_one();
    }

    /// Blocks until the queue has drained and every running task finished,
    /// then rethrows the first captured error, if any.
    pub fn wait_all(&self) -> Result<()> {
        let mut state = self.shared.state.lock().expect("pool lock poisoned");
        while !(state.queue.is_empty() && state.running == 0) {
            state = self
                .shared
                .all_done
                .wait(state)
                .expect("pool lock poisoned");
        }
        match state.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().expect("pool lock poisoned");
            state.shutdown = true;
        }
        self.shared.task_available.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker(shared: &Shared) {
    loop {
        let task = {
            let mut state = shared.state.lock().expect("pool lock poisoned");
            loop {
                if let Some(task) = state.queue.pop_front() {
                    state.running += 1;
                    break task;
                }
                if state.shutdown {
                    return;
                }
                state = shared
                    .task_available
                    .wait(state)
                    .expect("pool lock poisoned");
            }
        };

        let result = catch_unwind(AssertUnwindSafe(task));

        let mut state = shared.state.lock().expect("pool lock poisoned");
        match result {
            Ok(Ok(())) => {},
            Ok(Err(err)) => record_error(&mut state, err),
            Err(panic) => record_error(&mut state, anyhow!(panic_message(&panic))),
        }
        state.running -= 1;
        if state.queue.is_empty() && state.running == 0 {
            shared.all_done.notify_all();
        }
    }
}

/// Stores the first error and invalidates the queue; pending tasks never
/// start.
fn record_error(state: &mut State, err: anyhow::Error) {
    if state.error.is_none() {
        state.error = Some(err);
        state.valid = false;
    }
    state.queue.clear();
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_string()
    }
}
