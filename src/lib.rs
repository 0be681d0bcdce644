pub mod binding;
pub mod config;
pub mod control;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod index;
pub mod metrics;
pub mod pool;
pub mod registry;
pub mod scheduler;
pub mod translate;

pub use binding::{BindingStats, DeviceBinding};
pub use config::{EngineConfig, IndexConfig};
pub use control::Control;
pub use device::{BackingDevice, FileDevice, MemDevice};
pub use dispatch::{Dispatcher, Op, Reply, Request};
pub use error::{Error, Result};
pub use index::{IndexKind, MappingRecord, SectorIndex};
pub use registry::Registry;
