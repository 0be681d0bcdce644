use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::binding::BindingStats;
use crate::error::Result;
use crate::pool::RequestPool;
use crate::registry::Registry;
use crate::scheduler::{BackgroundTask, Context};

/// Collect per-binding stats and log them
pub fn collect_metrics(registry: &Registry, pool: &RequestPool) -> Result<Vec<BindingStats>> {
    let stats = registry
        .bindings()?
        .iter()
        .map(|binding| binding.stats())
        .collect::<Result<Vec<_>>>()?;

    for s in &stats {
        tracing::info!(
            device = %s.name,
            backing = %s.backing,
            index = %s.index,
            entries = s.entries,
            log_tail = s.log_tail,
            "binding metrics"
        );
    }

    tracing::info!(
        bindings = stats.len(),
        pool_available = pool.available(),
        pool_capacity = pool.capacity(),
        "engine metrics"
    );

    Ok(stats)
}

/// Logs binding metrics every `stats_interval` and keeps the latest report.
pub struct StatsTask {
    registry: Arc<Registry>,
    pool: RequestPool,
    latest: Mutex<Vec<BindingStats>>,
    runs: AtomicU64,
}

impl StatsTask {
    pub fn new(registry: Arc<Registry>, pool: RequestPool) -> Self {
        Self {
            registry,
            pool,
            latest: Mutex::new(Vec::new()),
            runs: AtomicU64::new(0),
        }
    }

    /// Stats from the most recent run; empty before the first one.
    pub fn latest(&self) -> Result<Vec<BindingStats>> {
        Ok(self.latest.lock()?.clone())
    }

    /// Completed runs so far.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl BackgroundTask for StatsTask {
    fn name(&self) -> &'static str {
        "stats"
    }

    fn interval(&self) -> Duration {
        self.registry.config().stats_interval
    }

    async fn execute(&self, _ctx: Context) -> Result<()> {
        let stats = collect_metrics(&self.registry, &self.pool)?;
        *self.latest.lock()? = stats;
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
