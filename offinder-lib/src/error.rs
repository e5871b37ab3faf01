use std::io;
use std::num;
use std::string;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("bad file format: {0}")]
    BadFileFormat(&'static str),
    #[error(transparent)]
    ParseIntError(#[from] num::ParseIntError),
    #[error(transparent)]
    FromUtf8Error(#[from] string::FromUtf8Error),
    #[error("{0}")]
    ArgumentError(String),
    #[error("No OpenCL platforms found. Check OpenCL installation!")]
    NoPlatforms,
    #[error("No {0} devices found.")]
    NoDevices(String),
    #[error("kernel build failed on device '{device}': {log}")]
    KernelBuild { device: String, log: String },
    /// The device cannot hold even a single base plus the fixed pattern buffers.
    #[error("device '{device}' allows {max_alloc} byte allocations, too small for a pattern of length {pattern_len}")]
    InsufficientDeviceMemory {
        device: String,
        max_alloc: u64,
        pattern_len: usize,
    },
    #[error("device error: {0}")]
    Device(String),
    #[error("device worker {0} stopped unexpectedly")]
    WorkerDisconnected(usize),
}
pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(feature = "opencl")]
impl From<opencl3::error_codes::ClError> for SearchError {
    fn from(error: opencl3::error_codes::ClError) -> Self {
        SearchError::Device(error.to_string())
    }
}

impl SearchError {
    pub fn argument(msg: impl Into<String>) -> Self {
        SearchError::ArgumentError(msg.into())
    }
}
