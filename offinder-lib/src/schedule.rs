//! Splitting the genome into device sized chunks.
//!
//! Each device gets a "dice size": the most bases it can analyze in one pass
//! while every buffer of that pass stays under its maximum allocation size.
//! Chunks are handed out front to back; every chunk carries `L - 1` extra
//! trailing bytes so a window starting at its last position is complete.

use crate::device::DeviceDescriptor;
use crate::error::{Result, SearchError};

const CHAR: u64 = 1;
const UINT: u64 = 4;
const USHORT: u64 = 2;

/// Bytes needed per analyzed base: chunk byte, flag byte, mismatch
/// direction bytes, locus and mismatch locus words, mismatch counts.
pub const PER_LOCUS_OVERHEAD: u64 = 4 * CHAR + 3 * UINT + 2 * USHORT;

/// Bytes that do not scale with chunk size: pattern and compare buffers,
/// their significant position tables, the entry counter and the threshold.
pub fn fixed_overhead(pattern_len: usize) -> u64 {
    let l = pattern_len as u64;
    CHAR * (3 * l).saturating_sub(1) + UINT * (2 * l + 3) + USHORT
}

/// Buffer sizes, in bytes, a device allocates for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationSizes {
    pub chunk: u64,
    pub flags: u64,
    pub loci: u64,
    pub pattern: u64,
    pub pattern_index: u64,
    pub mismatch_loci: u64,
    pub mismatch_counts: u64,
    pub directions: u64,
}

impl AllocationSizes {
    pub fn largest(&self) -> u64 {
        [
            self.chunk,
            self.flags,
            self.loci,
            self.pattern,
            self.pattern_index,
            self.mismatch_loci,
            self.mismatch_counts,
            self.directions,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    dice_sizes: Vec<usize>,
    pattern_len: usize,
}

impl ChunkPlan {
    pub fn new(
        devices: &[DeviceDescriptor],
        pattern_len: usize,
        genome_size: usize,
    ) -> Result<ChunkPlan> {
        if devices.is_empty() {
            return Err(SearchError::NoDevices(String::from("compute")));
        }
        let n_devices = devices.len() as u64;
        let even_split = (genome_size as u64 + n_devices - 1) / n_devices;
        let mut dice_sizes = Vec::with_capacity(devices.len());
        for dev in devices.iter() {
            let by_memory = dev.max_alloc_size.saturating_sub(fixed_overhead(pattern_len))
                / PER_LOCUS_OVERHEAD;
            // loci are 32 bit on the device
            let dice = by_memory.min(even_split).min(u32::MAX as u64) as usize;
            if dice == 0 && genome_size > 0 {
                return Err(SearchError::InsufficientDeviceMemory {
                    device: dev.name.clone(),
                    max_alloc: dev.max_alloc_size,
                    pattern_len,
                });
            }
            log::debug!("Dicesize of '{}': {}", dev.name, dice);
            dice_sizes.push(dice);
        }
        Ok(ChunkPlan {
            dice_sizes,
            pattern_len,
        })
    }
    pub fn from_dice_sizes(dice_sizes: Vec<usize>, pattern_len: usize) -> ChunkPlan {
        ChunkPlan {
            dice_sizes,
            pattern_len,
        }
    }
    pub fn dice_sizes(&self) -> &[usize] {
        &self.dice_sizes
    }
    pub fn dice_size(&self, device: usize) -> usize {
        self.dice_sizes[device]
    }
    pub fn pattern_len(&self) -> usize {
        self.pattern_len
    }
    pub fn num_devices(&self) -> usize {
        self.dice_sizes.len()
    }
    /// Worst case buffer sizes of `device`: every analyzed base a candidate
    /// that is accepted on both strands.
    pub fn allocation_sizes(&self, device: usize) -> AllocationSizes {
        let dice = self.dice_sizes[device] as u64;
        let l = self.pattern_len as u64;
        AllocationSizes {
            chunk: CHAR * (dice + l.saturating_sub(1)),
            flags: CHAR * dice,
            loci: UINT * dice,
            pattern: CHAR * 2 * l,
            pattern_index: UINT * 2 * l,
            mismatch_loci: UINT * 2 * dice,
            mismatch_counts: USHORT * 2 * dice,
            directions: CHAR * 2 * dice,
        }
    }
}

/// The slice of the genome one device analyzes in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAssignment {
    pub device: usize,
    /// absolute offset of the first analyzed base
    pub start: usize,
    /// number of analyzed (owned) bases
    pub len: usize,
}

impl ChunkAssignment {
    /// Bytes transferred to the device, including the trailing overlap.
    pub fn transfer_len(&self, pattern_len: usize) -> usize {
        self.len + pattern_len - 1
    }
}

pub struct ChunkScheduler<'a> {
    plan: &'a ChunkPlan,
    genome_size: usize,
    analyzed: usize,
}

impl<'a> ChunkScheduler<'a> {
    pub fn new(plan: &'a ChunkPlan, genome_size: usize) -> ChunkScheduler<'a> {
        ChunkScheduler {
            plan,
            genome_size,
            analyzed: 0,
        }
    }
    /// Bases handed out so far.
    pub fn analyzed(&self) -> usize {
        self.analyzed
    }
    pub fn is_exhausted(&self) -> bool {
        self.analyzed == self.genome_size
    }
    /// Hands the next round of chunks to the devices in order, or `None`
    /// once the whole genome has been handed out. Devices with a zero dice
    /// size get nothing; if no device can take work the scheduler stops
    /// without exhausting the genome.
    pub fn load_next_chunk(&mut self) -> Option<Vec<ChunkAssignment>> {
        if self.is_exhausted() {
            return None;
        }
        let mut assignments = Vec::with_capacity(self.plan.num_devices());
        for (device, dice) in self.plan.dice_sizes().iter().copied().enumerate() {
            if dice == 0 {
                continue;
            }
            let tailsize = self.genome_size - self.analyzed;
            let len = std::cmp::min(tailsize, dice);
            assignments.push(ChunkAssignment {
                device,
                start: self.analyzed,
                len,
            });
            self.analyzed += len;
            log::debug!("Worksize: {}, Tailsize: {}", len, tailsize);
            if tailsize <= dice {
                break;
            }
        }
        if assignments.is_empty() {
            return None;
        }
        Some(assignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceClass;

    fn desc(name: &str, max_alloc_size: u64) -> DeviceDescriptor {
        DeviceDescriptor {
            name: name.to_string(),
            class: DeviceClass::Cpu,
            max_alloc_size,
        }
    }
    fn ceiling_for(dice: u64, pattern_len: usize) -> u64 {
        fixed_overhead(pattern_len) + dice * PER_LOCUS_OVERHEAD
    }
    fn drain(plan: &ChunkPlan, genome_size: usize) -> Vec<Vec<ChunkAssignment>> {
        let mut sched = ChunkScheduler::new(plan, genome_size);
        let mut rounds = Vec::new();
        while let Some(round) = sched.load_next_chunk() {
            rounds.push(round);
        }
        rounds
    }

    #[test]
    fn test_overheads() {
        assert_eq!(PER_LOCUS_OVERHEAD, 20);
        // (3*23-1) + 4*(2*23+3) + 2
        assert_eq!(fixed_overhead(23), 68 + 196 + 2);
    }
    #[test]
    fn test_dice_size_capped_by_memory() {
        let plan = ChunkPlan::new(&[desc("a", ceiling_for(100, 6))], 6, 1_000_000).unwrap();
        assert_eq!(plan.dice_sizes(), &[100]);
    }
    #[test]
    fn test_dice_size_capped_by_even_split() {
        let devs = [desc("a", 1 << 30), desc("b", 1 << 30), desc("c", 1 << 30)];
        let plan = ChunkPlan::new(&devs, 6, 10).unwrap();
        assert_eq!(plan.dice_sizes(), &[4, 4, 4]);
    }
    #[test]
    fn test_tiny_device_is_fatal() {
        let res = ChunkPlan::new(&[desc("tiny", 10)], 20, 100);
        assert!(matches!(
            res,
            Err(SearchError::InsufficientDeviceMemory { .. })
        ));
    }
    #[test]
    fn test_two_devices_five_and_seven() {
        let plan = ChunkPlan::from_dice_sizes(vec![5, 7], 3);
        let mut sched = ChunkScheduler::new(&plan, 10);
        let round = sched.load_next_chunk().unwrap();
        assert_eq!(
            round,
            vec![
                ChunkAssignment { device: 0, start: 0, len: 5 },
                ChunkAssignment { device: 1, start: 5, len: 5 },
            ]
        );
        assert_eq!(round[0].transfer_len(3), 7);
        assert_eq!(sched.analyzed(), 10);
        assert!(sched.load_next_chunk().is_none());
    }
    #[test]
    fn test_computed_five_and_seven() {
        let devs = [desc("a", ceiling_for(5, 4)), desc("b", ceiling_for(7, 4))];
        let plan = ChunkPlan::new(&devs, 4, 10).unwrap();
        assert_eq!(plan.dice_sizes(), &[5, 5]);
        let rounds = drain(&plan, 10);
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].iter().map(|a| a.len).sum::<usize>(), 10);
    }
    #[test]
    fn test_first_device_takes_small_tail() {
        let plan = ChunkPlan::from_dice_sizes(vec![5, 7], 3);
        let rounds = drain(&plan, 3);
        assert_eq!(rounds, vec![vec![ChunkAssignment { device: 0, start: 0, len: 3 }]]);
    }
    #[test]
    fn test_exhausted_stays_exhausted() {
        let plan = ChunkPlan::from_dice_sizes(vec![4], 3);
        let mut sched = ChunkScheduler::new(&plan, 8);
        assert!(sched.load_next_chunk().is_some());
        assert!(sched.load_next_chunk().is_some());
        assert!(sched.load_next_chunk().is_none());
        assert!(sched.load_next_chunk().is_none());
        assert_eq!(sched.analyzed(), 8);
    }
    #[test]
    fn test_empty_genome() {
        let plan = ChunkPlan::new(&[desc("a", 1 << 20)], 5, 0).unwrap();
        assert!(drain(&plan, 0).is_empty());
    }
    #[test]
    fn test_owned_regions_tile_genome() {
        let plan = ChunkPlan::from_dice_sizes(vec![7, 3, 11], 5);
        for genome_size in [1, 6, 7, 21, 22, 100, 257] {
            let mut next = 0;
            for round in drain(&plan, genome_size) {
                for a in round {
                    assert_eq!(a.start, next);
                    assert!(a.len > 0 && a.len <= plan.dice_size(a.device));
                    next += a.len;
                }
            }
            assert_eq!(next, genome_size);
        }
    }
    #[test]
    fn test_allocations_within_ceiling() {
        let pattern_len = 23;
        let ceilings = [ceiling_for(1, pattern_len), 4096, 1 << 20, 3 << 30];
        for ceiling in ceilings {
            let dice = (ceiling - fixed_overhead(pattern_len)) / PER_LOCUS_OVERHEAD;
            for genome_size in [dice as usize, dice as usize + 1, 1 << 40] {
                let devs = [desc("a", ceiling), desc("b", ceiling / 2 + 1024)];
                let plan = ChunkPlan::new(&devs, pattern_len, genome_size).unwrap();
                for (i, dev) in devs.iter().enumerate() {
                    let sizes = plan.allocation_sizes(i);
                    assert!(sizes.largest() <= dev.max_alloc_size);
                    let total = sizes.chunk
                        + sizes.flags
                        + sizes.loci
                        + sizes.mismatch_loci
                        + sizes.mismatch_counts
                        + sizes.directions;
                    assert!(total <= dev.max_alloc_size);
                }
            }
        }
    }
    #[test]
    fn test_zero_dice_sizes_never_spin() {
        let plan = ChunkPlan::from_dice_sizes(vec![0], 4);
        let mut sched = ChunkScheduler::new(&plan, 8);
        assert!(sched.load_next_chunk().is_none());
        assert!(!sched.is_exhausted());

        let plan = ChunkPlan::from_dice_sizes(vec![0, 5], 4);
        let rounds = drain(&plan, 8);
        assert_eq!(
            rounds,
            vec![
                vec![ChunkAssignment { device: 1, start: 0, len: 5 }],
                vec![ChunkAssignment { device: 1, start: 5, len: 3 }],
            ]
        );
    }
    #[test]
    fn test_genome_equal_to_dice_size() {
        let plan = ChunkPlan::from_dice_sizes(vec![8], 4);
        let rounds = drain(&plan, 8);
        assert_eq!(rounds, vec![vec![ChunkAssignment { device: 0, start: 0, len: 8 }]]);
        let rounds = drain(&plan, 9);
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[1], vec![ChunkAssignment { device: 0, start: 8, len: 1 }]);
    }
}
