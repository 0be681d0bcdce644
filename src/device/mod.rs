//! Backing devices that translated sub-requests are submitted to.

pub mod file;
pub mod mem;

pub use file::FileDevice;
pub use mem::MemDevice;

use crate::error::Result;

/// Byte-addressed storage beneath a binding.
///
/// Every offset and length handed to a device is a multiple of
/// [`block_size`](BackingDevice::block_size); the dispatcher rejects
/// sub-requests that are not before they are submitted.
#[async_trait::async_trait]
pub trait BackingDevice: Send + Sync + 'static {
    /// Identifier shown in binding listings.
    fn name(&self) -> &str;

    /// Smallest unit of I/O in bytes.
    fn block_size(&self) -> u32 {
        1
    }

    /// Reads `len` bytes at `offset`. Bytes never written read as zero.
    async fn read_at(&self, offset: u64, len: u32) -> Result<Vec<u8>>;

    async fn write_at(&self, offset: u64, data: Vec<u8>) -> Result<()>;
}
