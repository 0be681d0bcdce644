//! Periodic background work owned by the control surface.
//!
//! Each registered task gets its own loop on the runtime that created the
//! scheduler. A loop sleeps one full interval before its first run, never
//! queues up missed runs, and stops at the next await point once shutdown is
//! signalled.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Handed to a task on each run.
pub struct Context {
    pub task_name: &'static str,
    /// 1 for the first run.
    pub run_id: u64,
    /// Fires when the scheduler shuts down, for tasks that run long.
    pub shutdown: broadcast::Receiver<()>,
}

#[async_trait::async_trait]
pub trait BackgroundTask: Send + Sync {
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    async fn execute(&self, ctx: Context) -> Result<()>;
}

pub struct Scheduler {
    runtime: Handle,
    loops: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    stop: broadcast::Sender<()>,
}

impl Scheduler {
    /// Binds the scheduler to the current tokio runtime.
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Runtime(format!("scheduler needs a tokio runtime: {}", e)))?;
        let (stop, _) = broadcast::channel(1);
        Ok(Self {
            runtime,
            loops: Mutex::new(Vec::new()),
            stop,
        })
    }

    /// Starts running `task` every `task.interval()`.
    pub fn register<T: BackgroundTask + 'static>(&self, task: Arc<T>) -> Result<&Self> {
        let interval = task.interval();
        if interval.is_zero() {
            return Err(Error::InvalidConfig(format!(
                "task {} has a zero interval",
                task.name()
            )));
        }

        let name = task.name();
        let handle = self
            .runtime
            .spawn(run_periodic(task, interval, self.stop.subscribe()));
        self.loops.lock()?.push((name, handle));
        debug!(task = name, ?interval, "registered background task");
        Ok(self)
    }

    /// Number of registered task loops.
    pub fn len(&self) -> usize {
        self.loops.lock().map_or(0, |loops| loops.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops every loop and waits for each to exit.
    pub async fn shutdown(self) -> Result<()> {
        // No receivers left just means every loop already exited.
        let _ = self.stop.send(());

        let loops = std::mem::take(&mut *self.loops.lock()?);
        for (name, handle) in loops {
            if let Err(e) = handle.await {
                warn!(task = name, error = %e, "background task did not exit cleanly");
            }
        }
        Ok(())
    }
}

async fn run_periodic<T: BackgroundTask + ?Sized>(
    task: Arc<T>,
    interval: Duration,
    mut stop: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    for run_id in 1.. {
        tokio::select! {
            biased;
            _ = stop.recv() => break,
            _ = ticker.tick() => {}
        }

        let ctx = Context {
            task_name: task.name(),
            run_id,
            shutdown: stop.resubscribe(),
        };
        if let Err(e) = task.execute(ctx).await {
            warn!(task = task.name(), run_id, error = %e, "background task run failed");
        }
    }
    debug!(task = task.name(), "background task stopped");
}
