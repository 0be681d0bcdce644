use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::index::IndexKind;

/// Configuration for the remapping engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sector size in bytes (default: 512)
    pub sector_size: u32,

    /// Sectors reserved for metadata at the start of the virtual address
    /// space; added to every client sector (default: 32)
    pub reserved_sectors: u64,

    /// First physical sector handed out by the log (default: reserved_sectors)
    pub log_start: u64,

    /// Maximum number of backing sub-requests in flight across all bindings (default: 50)
    pub pool_capacity: usize,

    /// Prefix for virtual device names created by the control surface (default: "lsvbd")
    pub name_prefix: String,

    /// How often the stats task reports binding metrics (default: 30s)
    pub stats_interval: Duration,

    /// Sector index configuration
    pub index: IndexConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Backend used for new bindings (default: balanced tree)
    pub kind: IndexKind,

    /// Sectors per bucket for the hash table backend (default: 2048)
    pub hash_chunk_size: u64,

    /// Entry budget per index; inserting past it is an allocation failure (default: unbounded)
    pub max_entries: Option<usize>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            kind: IndexKind::BalancedTree,
            hash_chunk_size: 1024 * 2,
            max_entries: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sector_size: 512,
            reserved_sectors: 32,
            log_start: 32,
            pool_capacity: 50,
            name_prefix: "lsvbd".to_string(),
            stats_interval: Duration::from_secs(30),
            index: IndexConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set sector size
    pub fn sector_size(mut self, size: u32) -> Self {
        self.sector_size = size;
        self
    }

    /// Set the reserved region; moves the log start along with it if the log
    /// would otherwise begin inside the reserved region
    pub fn reserved_sectors(mut self, sectors: u64) -> Self {
        self.reserved_sectors = sectors;
        if self.log_start < sectors {
            self.log_start = sectors;
        }
        self
    }

    /// Set the first physical sector of the log
    pub fn log_start(mut self, sector: u64) -> Self {
        self.log_start = sector;
        self
    }

    /// Set the sub-request pool capacity
    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// Set the virtual device name prefix
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Set stats reporting interval
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Configure the sector index
    pub fn index(mut self, config: IndexConfig) -> Self {
        self.index = config;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sector_size == 0 {
            return Err(Error::InvalidConfig("sector size must be non-zero".into()));
        }
        if self.pool_capacity == 0 {
            return Err(Error::InvalidConfig("pool capacity must be non-zero".into()));
        }
        if self.stats_interval.is_zero() {
            return Err(Error::InvalidConfig("stats interval must be non-zero".into()));
        }
        if self.log_start < self.reserved_sectors {
            return Err(Error::InvalidConfig(format!(
                "log start {} lies inside the reserved region of {} sectors",
                self.log_start, self.reserved_sectors
            )));
        }
        self.index.validate()
    }
}

impl IndexConfig {
    pub fn new(kind: IndexKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Set the backend
    pub fn kind(mut self, kind: IndexKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the hash bucket width in sectors
    pub fn hash_chunk_size(mut self, chunk: u64) -> Self {
        self.hash_chunk_size = chunk;
        self
    }

    /// Bound the number of entries
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.hash_chunk_size == 0 {
            return Err(Error::InvalidConfig("hash chunk size must be non-zero".into()));
        }
        Ok(())
    }
}
