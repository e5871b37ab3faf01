//! Compute devices and the pool they are discovered into.
//!
//! A device runs two kernels. `finder` scans every position of a chunk
//! against the header pattern and appends candidate loci through an atomic
//! entry counter. `comparer` re-scores the candidates against one query and
//! appends the ones within its mismatch threshold through the same counter.
//! [`ComputeDevice`] is the dispatch interface the pipeline drives; the
//! host and OpenCL devices implement it.

use std::fmt;

use crate::error::{Result, SearchError};
use crate::pattern::EncodedPattern;

/// Strand bit written by the finder when the forward half matched.
pub const FLAG_FORWARD: u8 = 0x1;
/// Strand bit written by the finder when the reverse complement half matched.
pub const FLAG_REVERSE: u8 = 0x2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Cpu,
    Gpu,
    Accelerator,
    All,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Cpu => write!(f, "CPU"),
            DeviceClass::Gpu => write!(f, "GPU"),
            DeviceClass::Accelerator => write!(f, "ACCELERATOR"),
            DeviceClass::All => write!(f, "OpenCL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: String,
    pub class: DeviceClass,
    /// largest single buffer the device accepts, in bytes
    pub max_alloc_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn symbol(self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        }
    }
    pub fn from_symbol(c: u8) -> Option<Strand> {
        match c {
            b'+' => Some(Strand::Forward),
            b'-' => Some(Strand::Reverse),
            _ => None,
        }
    }
}

/// One accepted comparer entry, locus relative to the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparerHit {
    pub locus: u32,
    pub strand: Strand,
    pub mismatches: u16,
}

/// Zips a device's comparer output buffers into hits. A direction byte other
/// than `+` or `-` means the readback is corrupt.
pub fn decode_hits(
    device: &str,
    loci: &[u32],
    mismatches: &[u16],
    directions: &[u8],
) -> Result<Vec<ComparerHit>> {
    loci.iter()
        .zip(mismatches.iter())
        .zip(directions.iter())
        .map(|((locus, mm), dir)| {
            let strand = Strand::from_symbol(*dir).ok_or_else(|| {
                SearchError::Device(format!(
                    "{}: invalid strand byte {:#04x} in comparer output",
                    device, dir
                ))
            })?;
            Ok(ComparerHit {
                locus: *locus,
                strand,
                mismatches: *mm,
            })
        })
        .collect()
}

pub trait ComputeDevice: Send {
    /// Comparer output buffers sized for one chunk's candidates; dropping it releases them.
    type Scratch: Send;

    fn descriptor(&self) -> &DeviceDescriptor;

    /// Allocates the chunk, flag and loci buffers for chunks of up to
    /// `dice_size` bases and uploads the header pattern. Called once per run.
    fn prepare(&mut self, pattern: &EncodedPattern, dice_size: usize) -> Result<()>;

    /// Uploads `chunk` (`work_size + L - 1` bytes), runs the finder over
    /// `work_size` positions and returns the number of candidates.
    fn find(&mut self, chunk: &[u8], work_size: usize) -> Result<u32>;

    /// Allocates comparer buffers with room for `2 * candidate_count` entries.
    fn allocate_scratch(&mut self, candidate_count: u32) -> Result<Self::Scratch>;

    /// Runs the comparer over the current candidates for one query and reads
    /// back the accepted entries.
    fn compare(
        &mut self,
        scratch: &mut Self::Scratch,
        candidate_count: u32,
        query: &EncodedPattern,
        threshold: u16,
    ) -> Result<Vec<ComparerHit>>;
}

/// The ordered set of devices a run is spread over.
pub struct DevicePool<D> {
    devices: Vec<D>,
}

impl<D: ComputeDevice> DevicePool<D> {
    pub fn new(devices: Vec<D>) -> Result<DevicePool<D>> {
        if devices.is_empty() {
            return Err(SearchError::NoDevices(String::from("compute")));
        }
        log::info!("Total {} device(s) found.", devices.len());
        for dev in devices.iter() {
            let desc = dev.descriptor();
            log::debug!(
                "Type: {}, '{}', max allocation {} bytes",
                desc.class,
                desc.name,
                desc.max_alloc_size
            );
        }
        Ok(DevicePool { devices })
    }
    pub fn len(&self) -> usize {
        self.devices.len()
    }
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
    pub fn descriptors(&self) -> Vec<DeviceDescriptor> {
        self.devices.iter().map(|d| d.descriptor().clone()).collect()
    }
    /// Keeps only the devices at `ids`, in the order given.
    pub fn select(self, ids: &[usize]) -> Result<DevicePool<D>> {
        if ids.is_empty() {
            return Ok(self);
        }
        let n_devices = self.devices.len();
        if let Some(bad) = ids.iter().find(|id| **id >= n_devices) {
            return Err(SearchError::argument(format!(
                "device id {} out of range, {} device(s) available",
                bad, n_devices
            )));
        }
        let mut slots: Vec<Option<D>> = self.devices.into_iter().map(Some).collect();
        let mut selected: Vec<D> = Vec::with_capacity(ids.len());
        for id in ids.iter() {
            let dev = slots[*id]
                .take()
                .ok_or_else(|| SearchError::argument(format!("device id {} given twice", id)))?;
            selected.push(dev);
        }
        Ok(DevicePool { devices: selected })
    }
    pub fn into_devices(self) -> Vec<D> {
        self.devices
    }
}
