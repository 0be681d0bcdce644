//! Request dispatch: the path from a client request to backing I/O.
//!
//! A request names a virtual device. The dispatcher finds its binding, runs
//! the matching translation, and turns the result into sub-requests:
//!
//! - a write becomes exactly one sub-request at the extent the log handed out
//! - a read becomes one sub-request per mapped or passthrough segment; zero
//!   segments are filled locally and never reach the device
//!
//! Every sub-request holds a slot from the shared [`RequestPool`] while it
//! runs. A slot is taken just before its sub-request is spawned, waiting if
//! the pool is full, so a read with more segments than the pool holds simply
//! runs them in waves. A closed pool fails the request.
//!
//! Sub-requests run as their own tasks. The parent waits for all of them and
//! completes with the first error it sees; siblings already submitted when
//! that happens still run to completion, their results discarded.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::binding::DeviceBinding;
use crate::error::{Error, Result};
use crate::pool::RequestPool;
use crate::registry::Registry;
use crate::translate::PhysicalWrite;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Read,
    Write,
}

/// A client request against a virtual device.
#[derive(Debug, Clone)]
pub struct Request {
    pub device: String,
    pub op: Op,
    /// First client sector.
    pub sector: u64,
    /// Length in bytes.
    pub len: u32,
    /// Bytes to write; empty for reads.
    pub payload: Vec<u8>,
}

impl Request {
    pub fn read(device: impl Into<String>, sector: u64, len: u32) -> Self {
        Self {
            device: device.into(),
            op: Op::Read,
            sector,
            len,
            payload: Vec::new(),
        }
    }

    pub fn write(device: impl Into<String>, sector: u64, payload: Vec<u8>) -> Self {
        Self {
            device: device.into(),
            op: Op::Write,
            sector,
            len: u32::try_from(payload.len()).unwrap_or(u32::MAX),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Read(Vec<u8>),
    Written(PhysicalWrite),
}

impl Reply {
    pub fn into_data(self) -> Option<Vec<u8>> {
        match self {
            Reply::Read(data) => Some(data),
            Reply::Written(_) => None,
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    pool: RequestPool,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, pool: RequestPool) -> Self {
        Self { registry, pool }
    }

    pub fn pool(&self) -> &RequestPool {
        &self.pool
    }

    /// Runs a request to completion.
    pub async fn submit(&self, request: Request) -> Result<Reply> {
        debug!(
            device = %request.device,
            op = ?request.op,
            sector = request.sector,
            len = request.len,
            "submit"
        );

        let binding = self
            .registry
            .lookup(&request.device)?
            .ok_or_else(|| Error::BindingNotFound(request.device.clone()))?;

        let result = match request.op {
            Op::Write => self.write(&binding, request.sector, request.len, request.payload).await,
            Op::Read => self.read(&binding, request.sector, request.len).await,
        };

        if let Err(e) = &result {
            warn!(device = binding.name(), error = %e, "request failed");
        }
        result
    }

    /// Runs a request on its own task and hands the outcome to `on_complete`.
    pub fn submit_with<F>(&self, request: Request, on_complete: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<Reply>) + Send + 'static,
    {
        let dispatcher = self.clone();
        tokio::spawn(async move { on_complete(dispatcher.submit(request).await) })
    }

    async fn write(
        &self,
        binding: &DeviceBinding,
        sector: u64,
        len: u32,
        payload: Vec<u8>,
    ) -> Result<Reply> {
        if payload.len() != len as usize {
            return Err(Error::InvalidRequest(format!(
                "payload of {} bytes for a {} byte write",
                payload.len(),
                len
            )));
        }

        let backing = binding.backing().clone();
        let block_size = backing.block_size();
        let geometry = binding.geometry();
        // Extents start on sector boundaries, so a sector size the device can
        // split on plus an aligned length is enough to know the write fits.
        check_split(u64::from(geometry.sector_size), len, block_size)?;

        // Take the slot first so a closed pool leaves the index untouched.
        let slot = self.pool.acquire().await?;
        let write = binding.map_write(sector, len)?;
        let offset = geometry.bytes(write.sector);

        let handle = tokio::spawn(async move {
            let _slot = slot;
            backing.write_at(offset, payload).await
        });
        join(handle).await?;

        Ok(Reply::Written(write))
    }

    async fn read(&self, binding: &DeviceBinding, sector: u64, len: u32) -> Result<Reply> {
        let segments = binding.map_read(sector, len)?;
        let backing = binding.backing();
        let block_size = backing.block_size();

        let io: Vec<_> = segments
            .iter()
            .filter_map(|s| s.physical().map(|at| (s.offset, s.len, at)))
            .collect();
        for &(_, seg_len, at) in &io {
            check_split(at, seg_len, block_size)?;
        }

        let mut buf = vec![0u8; len as usize];
        let mut pending = Vec::with_capacity(io.len());

        for (offset, seg_len, at) in io {
            let slot = self.pool.acquire().await?;
            let backing = backing.clone();
            let handle = tokio::spawn(async move {
                let _slot = slot;
                backing.read_at(at, seg_len).await
            });
            pending.push((offset as usize, seg_len as usize, handle));
        }

        for (offset, seg_len, handle) in pending {
            let data = join(handle).await?;
            let n = data.len().min(seg_len);
            buf[offset..offset + n].copy_from_slice(&data[..n]);
        }

        Ok(Reply::Read(buf))
    }
}

fn check_split(offset: u64, len: u32, block_size: u32) -> Result<()> {
    let block = u64::from(block_size.max(1));
    if offset % block != 0 || u64::from(len) % block != 0 {
        return Err(Error::SplitFailure {
            offset,
            len,
            block_size,
        });
    }
    Ok(())
}

async fn join<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    match handle.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(Error::BackingIo(msg))) => Err(Error::BackingIo(msg)),
        Ok(Err(e)) => Err(Error::BackingIo(e.to_string())),
        Err(e) => Err(Error::BackingIo(format!("sub-request task: {}", e))),
    }
}
