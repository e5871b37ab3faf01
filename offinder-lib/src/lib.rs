mod bit4ops;
mod device;
mod error;
mod genome;
mod host_device;
mod ocl_kernel;
#[cfg(feature = "opencl")]
mod opencl_device;
mod output;
mod pattern;
mod read_2bit;
mod read_fasta;
mod schedule;
mod search;

pub use crate::bit4ops::*;
pub use crate::device::*;
pub use crate::error::*;
pub use crate::genome::*;
pub use crate::host_device::*;
pub use crate::ocl_kernel::*;
#[cfg(feature = "opencl")]
pub use crate::opencl_device::*;
pub use crate::output::*;
pub use crate::pattern::*;
pub use crate::read_2bit::*;
pub use crate::read_fasta::*;
pub use crate::schedule::*;
pub use crate::search::*;
