use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use super::BackingDevice;
use crate::error::{Error, Result};

/// In-memory backing device.
///
/// Storage grows on demand. Reads and writes can be made to fail and can be
/// slowed down, which lets callers exercise error and ordering paths.
pub struct MemDevice {
    name: String,
    block_size: u32,
    data: RwLock<Vec<u8>>,
    latency: Option<Duration>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            block_size: 1,
            data: RwLock::new(Vec::new()),
            latency: None,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// Delay every I/O by `latency` before touching storage.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Reads submitted so far, including failed ones.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Writes submitted so far, including failed ones.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Copies stored bytes without going through the I/O path.
    pub fn snapshot(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let data = self.data.read()?;
        Ok(copy_out(&data, offset, len))
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn copy_out(data: &[u8], offset: u64, len: usize) -> Vec<u8> {
    let mut out = vec![0; len];
    let start = offset.min(data.len() as u64) as usize;
    let end = (start + len).min(data.len());
    out[..end - start].copy_from_slice(&data[start..end]);
    out
}

#[async_trait::async_trait]
impl BackingDevice for MemDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn block_size(&self) -> u32 {
        self.block_size
    }

    async fn read_at(&self, offset: u64, len: u32) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::BackingIo(format!(
                "{}: read of {} bytes at {} failed",
                self.name, len, offset
            )));
        }

        let data = self.data.read()?;
        Ok(copy_out(&data, offset, len as usize))
    }

    async fn write_at(&self, offset: u64, payload: Vec<u8>) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::BackingIo(format!(
                "{}: write of {} bytes at {} failed",
                self.name,
                payload.len(),
                offset
            )));
        }

        let start = usize::try_from(offset)
            .map_err(|_| Error::BackingIo(format!("{}: offset {} too large", self.name, offset)))?;
        let end = start + payload.len();

        let mut data = self.data.write()?;
        if data.len() < end {
            let extra = end - data.len();
            data.try_reserve(extra)
                .map_err(|_| Error::AllocationFailure("memory device storage"))?;
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(&payload);
        Ok(())
    }
}
