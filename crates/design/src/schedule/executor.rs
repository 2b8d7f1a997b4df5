//! Where blocking background work runs.

use std::fmt;
use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};

/// Runs blocking closures off the owner thread.
///
/// Inside a tokio context the ambient runtime's blocking pool is used;
/// otherwise a small private runtime is started. `Inline` runs the closure
/// immediately on the caller's thread.
#[derive(Clone)]
pub enum Executor {
    Runtime(Arc<Runtime>),
    Handle(Handle),
    Inline,
}

impl Executor {
    pub fn new() -> Self {
        if let Ok(handle) = Handle::try_current() {
            return Executor::Handle(handle);
        }
        match Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("design-scene-worker")
            .build()
        {
            Ok(runtime) => Executor::Runtime(Arc::new(runtime)),
            Err(e) => {
                tracing::warn!("failed to start background runtime, running inline: {}", e);
                Executor::Inline
            }
        }
    }

    pub fn spawn_blocking<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            Executor::Runtime(runtime) => {
                runtime.spawn_blocking(f);
            }
            Executor::Handle(handle) => {
                handle.spawn_blocking(f);
            }
            Executor::Inline => f(),
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Executor::Runtime(_) => "Runtime",
            Executor::Handle(_) => "Handle",
            Executor::Inline => "Inline",
        };
        f.write_str(name)
    }
}
