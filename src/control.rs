//! Administrative control surface.
//!
//! Text in, text out, mirroring what an operator types at a parameter file:
//! choose the index backend for new bindings, create a binding over a device
//! path, list bindings, and destroy them by position or name.
//!
//! A control also owns the engine's background work: binding stats are
//! collected every `stats_interval` until [`Control::shutdown`].

use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::binding::{BindingStats, DeviceBinding};
use crate::config::EngineConfig;
use crate::device::{BackingDevice, FileDevice};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::index::IndexKind;
use crate::metrics::StatsTask;
use crate::pool::RequestPool;
use crate::registry::Registry;
use crate::scheduler::Scheduler;

pub struct Control {
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
    selected: RwLock<IndexKind>,
    scheduler: Scheduler,
    stats: Arc<StatsTask>,
}

impl Control {
    /// Validates `config` and starts stats collection. Must be called from
    /// within a tokio runtime.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let selected = config.index.kind;
        let pool = RequestPool::new(config.pool_capacity);
        let registry = Arc::new(Registry::new(config)?);

        let stats = Arc::new(StatsTask::new(registry.clone(), pool.clone()));
        let scheduler = Scheduler::new()?;
        scheduler.register(stats.clone())?;

        Ok(Self {
            dispatcher: Dispatcher::new(registry.clone(), pool),
            registry,
            selected: RwLock::new(selected),
            scheduler,
            stats,
        })
    }

    /// Stops background work and refuses further sub-requests. Bindings stay
    /// in the registry; requests already past the pool run to completion.
    pub async fn shutdown(self) -> Result<()> {
        self.dispatcher.pool().close();
        self.scheduler.shutdown().await?;
        info!(bindings = self.registry.len(), "control shut down");
        Ok(())
    }

    /// Binding stats from the last background collection.
    pub fn latest_stats(&self) -> Result<Vec<BindingStats>> {
        self.stats.latest()
    }

    /// Background stats collections completed so far.
    pub fn stats_runs(&self) -> u64 {
        self.stats.runs()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Selects the backend for bindings created from now on. Accepts a name
    /// or a two-letter tag; surrounding whitespace is ignored. Existing
    /// bindings keep their backend.
    pub fn set_index(&self, name: &str) -> Result<IndexKind> {
        let kind: IndexKind = name.parse()?;
        *self.selected.write()? = kind;
        info!(index = %kind, "selected index backend");
        Ok(kind)
    }

    pub fn selected_index(&self) -> Result<IndexKind> {
        Ok(*self.selected.read()?)
    }

    /// Numbered list of available backends, one per line.
    pub fn index_kinds(&self) -> String {
        let mut out = String::new();
        for (i, kind) in IndexKind::ALL.iter().enumerate() {
            let _ = writeln!(out, "{}. {} ({})", i + 1, kind.name(), kind.tag());
        }
        out
    }

    /// Parses `"<number> <path>"` and binds `<prefix><number>` to the device
    /// at `<path>`.
    pub fn create_from_str(&self, input: &str) -> Result<Arc<DeviceBinding>> {
        let mut parts = input.split_whitespace();
        let (Some(number), Some(path), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::InvalidRequest(format!(
                "expected \"<number> <path>\", got {:?}",
                input.trim()
            )));
        };
        let number: u32 = number
            .parse()
            .map_err(|_| Error::InvalidRequest(format!("bad device number {:?}", number)))?;
        self.create(number, path)
    }

    /// Opens `path` and binds it as `<prefix><number>` with the selected backend.
    pub fn create(&self, number: u32, path: impl AsRef<Path>) -> Result<Arc<DeviceBinding>> {
        let device = FileDevice::open(path)?;
        let name = format!("{}{}", self.registry.config().name_prefix, number);
        self.attach(name, Arc::new(device))
    }

    /// Binds an already opened backing device under `name`.
    pub fn attach(
        &self,
        name: impl Into<String>,
        backing: Arc<dyn BackingDevice>,
    ) -> Result<Arc<DeviceBinding>> {
        let kind = self.selected_index()?;
        self.registry.bind(name, backing, kind)
    }

    /// Numbered `virtual -> backing` lines in creation order.
    pub fn list(&self) -> Result<String> {
        let mut out = String::new();
        for (i, (name, backing)) in self.registry.list()?.iter().enumerate() {
            let _ = writeln!(out, "{}. {} -> {}", i + 1, name, backing);
        }
        Ok(out)
    }

    /// Destroys the binding at 1-based `position` of [`list`](Self::list).
    /// Returns the removed device name; out-of-range positions remove nothing.
    pub fn destroy(&self, position: usize) -> Result<Option<String>> {
        Ok(self
            .registry
            .unbind_at(position)?
            .map(|binding| binding.name().to_string()))
    }

    /// Parses a 1-based position and destroys that binding.
    pub fn destroy_from_str(&self, input: &str) -> Result<Option<String>> {
        let position = input.trim().parse().map_err(|_| {
            Error::InvalidRequest(format!("bad position {:?}", input.trim()))
        })?;
        self.destroy(position)
    }

    pub fn destroy_by_name(&self, name: &str) -> Result<bool> {
        Ok(self.registry.unbind(name)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemDevice;
    use crate::dispatch::Request;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn control() -> Control {
        Control::new(EngineConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        assert!(matches!(
            Control::new(EngineConfig::new().pool_capacity(0)),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Control::new(EngineConfig::new().stats_interval(Duration::ZERO)),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_new_outside_runtime_is_an_error() {
        assert!(matches!(
            Control::new(EngineConfig::default()),
            Err(Error::Runtime(_))
        ));
    }

    #[tokio::test]
    async fn test_set_index_applies_to_new_bindings_only() {
        let control = control();
        let first = control.attach("a", Arc::new(MemDevice::new("m0"))).unwrap();

        assert_eq!(control.set_index(" hm\n").unwrap(), IndexKind::HashTable);
        let second = control.attach("b", Arc::new(MemDevice::new("m1"))).unwrap();

        assert_eq!(first.stats().unwrap().index, IndexKind::BalancedTree);
        assert_eq!(second.stats().unwrap().index, IndexKind::HashTable);

        assert!(matches!(control.set_index("splay"), Err(Error::UnsupportedIndex(_))));
        assert_eq!(control.selected_index().unwrap(), IndexKind::HashTable);
    }

    #[tokio::test]
    async fn test_index_kinds_listing() {
        assert_eq!(
            control().index_kinds(),
            "1. balanced-tree (rb)\n2. multiway-tree (bt)\n3. skiplist (sl)\n4. hash-table (hm)\n"
        );
    }

    #[tokio::test]
    async fn test_create_list_destroy() {
        let control = control();
        let disk = NamedTempFile::new().unwrap();
        let disk_name = disk.path().file_name().unwrap().to_string_lossy().into_owned();

        let input = format!("1 {}", disk.path().display());
        let binding = control.create_from_str(&input).unwrap();
        assert_eq!(binding.name(), "lsvbd1");
        control.attach("lsvbd2", Arc::new(MemDevice::new("ram0"))).unwrap();

        assert_eq!(
            control.list().unwrap(),
            format!("1. lsvbd1 -> {}\n2. lsvbd2 -> ram0\n", disk_name)
        );

        assert_eq!(control.destroy_from_str("1\n").unwrap(), Some("lsvbd1".to_string()));
        assert_eq!(control.destroy(5).unwrap(), None);
        assert_eq!(control.list().unwrap(), "1. lsvbd2 -> ram0\n");

        assert!(control.destroy_by_name("lsvbd2").unwrap());
        assert!(!control.destroy_by_name("lsvbd2").unwrap());
        assert_eq!(control.list().unwrap(), "");
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let control = control();
        assert!(matches!(
            control.create_from_str("1"),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            control.create_from_str("x /dev/null"),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            control.create(1, "/nonexistent/lsbdd-disk"),
            Err(Error::IoError(_))
        ));
        assert!(control.registry().is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_through_file_backed_binding() {
        let control = control();
        let disk = NamedTempFile::new().unwrap();
        control.create(3, disk.path()).unwrap();

        let payload: Vec<u8> = (0..2048u32).map(|i| (i % 251) as u8).collect();
        control
            .dispatcher()
            .submit(Request::write("lsvbd3", 10, payload.clone()))
            .await
            .unwrap();
        let data = control
            .dispatcher()
            .submit(Request::read("lsvbd3", 10, 2048))
            .await
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(data, payload);

        control.destroy_by_name("lsvbd3").unwrap();
        assert!(matches!(
            control
                .dispatcher()
                .submit(Request::read("lsvbd3", 10, 2048))
                .await,
            Err(Error::BindingNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stats_collected_in_background_until_shutdown() {
        let config = EngineConfig::new().stats_interval(Duration::from_millis(5));
        let control = Control::new(config).unwrap();
        assert!(control.latest_stats().unwrap().is_empty());

        control.attach("lsvbd1", Arc::new(MemDevice::new("ram0"))).unwrap();
        control
            .dispatcher()
            .submit(Request::write("lsvbd1", 0, vec![7; 1024]))
            .await
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        let stats = loop {
            let stats = control.latest_stats().unwrap();
            if stats.first().map_or(false, |s| s.entries == 1) {
                break stats;
            }
            assert!(tokio::time::Instant::now() < deadline, "no stats collected");
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        assert_eq!(stats[0].name, "lsvbd1");
        assert_eq!(stats[0].log_tail, 34);
        assert!(control.stats_runs() >= 1);

        let dispatcher = control.dispatcher().clone();
        control.shutdown().await.unwrap();
        assert!(matches!(
            dispatcher.submit(Request::read("lsvbd1", 0, 1024)).await,
            Err(Error::AllocationFailure(_))
        ));
    }
}
