use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Bounded pool of in-flight backing sub-requests, shared by every binding.
///
/// A full pool makes callers wait for a slot. Only a closed pool refuses them.
#[derive(Clone)]
pub struct RequestPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// One sub-request slot. Dropping it returns the slot.
pub struct PoolSlot {
    _permit: OwnedSemaphorePermit,
}

impl RequestPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Takes one slot, waiting until another sub-request returns one if the
    /// pool is full.
    pub async fn acquire(&self) -> Result<PoolSlot> {
        if self.permits.available_permits() == 0 {
            debug!(capacity = self.capacity, "sub-request pool full, waiting");
        }

        match self.permits.clone().acquire_owned().await {
            Ok(permit) => Ok(PoolSlot { _permit: permit }),
            Err(_) => {
                warn!(capacity = self.capacity, "sub-request pool closed");
                Err(Error::AllocationFailure("sub-request pool closed"))
            }
        }
    }

    /// Refuses every later `acquire`, including ones already waiting.
    /// Slots already handed out stay valid until dropped.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
