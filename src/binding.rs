use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::config::{EngineConfig, IndexConfig};
use crate::device::BackingDevice;
use crate::error::Result;
use crate::index::{new_index, IndexKind, SectorIndex};
use crate::translate::{self, Geometry, PhysicalWrite, Segment};

/// Mutable mapping state of one binding. Guarded as a unit: the tail only
/// moves together with the index entry that consumed it.
pub struct BindingState {
    pub index: Box<dyn SectorIndex>,
    /// Next free physical sector.
    pub log_tail: u64,
}

/// A virtual device attached to a backing device through its own index.
pub struct DeviceBinding {
    name: String,
    backing: Arc<dyn BackingDevice>,
    geometry: Geometry,
    state: RwLock<BindingState>,
}

/// Point-in-time view of a binding for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingStats {
    pub name: String,
    pub backing: String,
    pub index: IndexKind,
    pub entries: usize,
    pub log_tail: u64,
}

impl DeviceBinding {
    pub(crate) fn new(
        name: impl Into<String>,
        backing: Arc<dyn BackingDevice>,
        config: &EngineConfig,
        index: &IndexConfig,
    ) -> Self {
        Self {
            name: name.into(),
            backing,
            geometry: Geometry::from_config(config),
            state: RwLock::new(BindingState {
                index: new_index(index),
                log_tail: config.log_start,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backing(&self) -> &Arc<dyn BackingDevice> {
        &self.backing
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Allocates the physical extent for a write and records it.
    ///
    /// Concurrent writers on the same binding serialize here; readers never
    /// see the index between the tail read and the tail advance.
    pub fn map_write(&self, sector: u64, len: u32) -> Result<PhysicalWrite> {
        let mut state = self.state.write()?;
        let BindingState { index, log_tail } = &mut *state;
        translate::translate_write(index.as_mut(), log_tail, self.geometry, sector, len)
    }

    /// Splits a read into segments against the current index.
    pub fn map_read(&self, sector: u64, len: u32) -> Result<Vec<Segment>> {
        let state = self.state.read()?;
        translate::resolve(state.index.as_ref(), self.geometry, sector, len)
    }

    pub fn stats(&self) -> Result<BindingStats> {
        let state = self.state.read()?;
        Ok(BindingStats {
            name: self.name.clone(),
            backing: self.backing.name().to_string(),
            index: state.index.kind(),
            entries: state.index.len(),
            log_tail: state.log_tail,
        })
    }
}
