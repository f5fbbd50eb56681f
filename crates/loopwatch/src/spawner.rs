//! Detector thread creation.
//!
//! The controller never calls `std::thread` directly; it goes through a
//! [`ThreadSpawner`] so tests can count or instrument worker threads.

use std::fmt;
use std::io;
use std::thread::{self, JoinHandle};

/// Work executed on a spawned detector thread.
pub type WorkerFn = Box<dyn FnOnce() + Send + 'static>;

/// Creates named OS threads.
pub trait ThreadSpawner: Send + Sync + fmt::Debug {
    /// Spawn `work` on a new thread called `name`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be created.
    fn spawn(&self, name: &str, work: WorkerFn) -> io::Result<JoinHandle<()>>;
}

/// Spawner backed by [`std::thread::Builder`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StdThreadSpawner;

impl ThreadSpawner for StdThreadSpawner {
    fn spawn(&self, name: &str, work: WorkerFn) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().name(name.to_string()).spawn(work)
    }
}
