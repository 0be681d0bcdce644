use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    IoError(io::Error),
    /// Memory or pool exhaustion while mutating an index or building sub-requests.
    AllocationFailure(&'static str),
    /// The request targets a virtual device with no active binding.
    BindingNotFound(String),
    AlreadyBound(String),
    /// A sub-request boundary the backing device cannot accept.
    SplitFailure {
        offset: u64,
        len: u32,
        block_size: u32,
    },
    /// A sub-request failed on the backing device.
    BackingIo(String),
    UnsupportedIndex(String),
    InvalidRequest(String),
    InvalidConfig(String),
    /// Background work was started without a tokio runtime to run on.
    Runtime(String),
    MutexPoisoned,
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err)
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Error::MutexPoisoned
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::AllocationFailure(what) => write!(f, "Allocation failed: {}", what),
            Error::BindingNotFound(name) => write!(f, "No binding for device {}", name),
            Error::AlreadyBound(name) => write!(f, "Device {} is already bound", name),
            Error::SplitFailure {
                offset,
                len,
                block_size,
            } => write!(
                f,
                "Cannot split at offset {} len {}: backing block size is {}",
                offset, len, block_size
            ),
            Error::BackingIo(msg) => write!(f, "Backing device I/O failed: {}", msg),
            Error::UnsupportedIndex(name) => write!(f, "Unsupported index: {}", name),
            Error::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Error::InvalidConfig(msg) => write!(f, "Invalid config: {}", msg),
            Error::Runtime(msg) => write!(f, "Runtime error: {}", msg),
            Error::MutexPoisoned => write!(f, "Mutex was poisoned"),
        }
    }
}

impl std::error::Error for Error {}
