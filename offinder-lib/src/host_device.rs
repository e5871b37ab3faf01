use std::sync::atomic::{AtomicU32, Ordering};

use crate::bit4ops::cmp_chars;
use crate::device::{
    decode_hits, ComparerHit, ComputeDevice, DeviceClass, DeviceDescriptor, DevicePool,
    FLAG_FORWARD, FLAG_REVERSE,
};
use crate::error::{Result, SearchError};
use crate::pattern::{EncodedPattern, SIGNIFICANT_END};

/// Allocation ceiling reported by host devices when none is given.
pub const DEFAULT_HOST_MAX_ALLOC: u64 = 256 << 20;

/// A compute device that runs the finder and comparer kernels on its
/// worker thread. Buffers are plain vectors but are held to the same
/// allocation ceiling a real device would enforce.
pub struct HostDevice {
    descriptor: DeviceDescriptor,
    pattern: EncodedPattern,
    chunk: Vec<u8>,
    flags: Vec<u8>,
    loci: Vec<u32>,
    entry_count: AtomicU32,
}

pub struct HostScratch {
    mm_loci: Vec<u32>,
    mm_counts: Vec<u16>,
    directions: Vec<u8>,
}

struct FinderArgs<'a> {
    chr: &'a [u8],
    pat: &'a [u8],
    pat_index: &'a [i32],
    patternlen: usize,
    flags: &'a mut [u8],
    entrycount: &'a AtomicU32,
    loci: &'a mut [u32],
}

struct ComparerArgs<'a> {
    chr: &'a [u8],
    loci: &'a [u32],
    mm_loci: &'a mut [u32],
    comp: &'a [u8],
    comp_index: &'a [i32],
    patternlen: usize,
    threshold: u16,
    flags: &'a [u8],
    mm_count: &'a mut [u16],
    direction: &'a mut [u8],
    entrycount: &'a AtomicU32,
}

fn matches_half(chr: &[u8], pat: &[u8], significant: &[i32]) -> bool {
    for &k in significant {
        if k == SIGNIFICANT_END {
            break;
        }
        let k = k as usize;
        if !cmp_chars(chr[k], pat[k]) {
            return false;
        }
    }
    true
}

// stops counting once the threshold is passed
fn count_mismatches(chr: &[u8], comp: &[u8], significant: &[i32], threshold: u16) -> u16 {
    let mut mismatches: u16 = 0;
    for &k in significant {
        if k == SIGNIFICANT_END {
            break;
        }
        let k = k as usize;
        if !cmp_chars(chr[k], comp[k]) {
            mismatches = mismatches.saturating_add(1);
            if mismatches > threshold {
                break;
            }
        }
    }
    mismatches
}

fn finder(gid: usize, args: &mut FinderArgs) {
    let len = args.patternlen;
    let chr = &args.chr[gid..gid + len];
    let mut flag = 0_u8;
    if matches_half(chr, &args.pat[..len], &args.pat_index[..len]) {
        flag |= FLAG_FORWARD;
    }
    if matches_half(chr, &args.pat[len..], &args.pat_index[len..]) {
        flag |= FLAG_REVERSE;
    }
    if flag != 0 {
        let idx = args.entrycount.fetch_add(1, Ordering::Relaxed) as usize;
        args.flags[idx] = flag;
        args.loci[idx] = gid as u32;
    }
}

fn comparer(gid: usize, args: &mut ComparerArgs) {
    let len = args.patternlen;
    let locus = args.loci[gid];
    let chr = &args.chr[locus as usize..locus as usize + len];
    let flag = args.flags[gid];
    let halves = [
        (FLAG_FORWARD, 0, b'+'),
        (FLAG_REVERSE, len, b'-'),
    ];
    for (bit, offset, symbol) in halves {
        if flag & bit == 0 {
            continue;
        }
        let mismatches = count_mismatches(
            chr,
            &args.comp[offset..offset + len],
            &args.comp_index[offset..offset + len],
            args.threshold,
        );
        if mismatches <= args.threshold {
            let idx = args.entrycount.fetch_add(1, Ordering::Relaxed) as usize;
            args.mm_loci[idx] = locus;
            args.mm_count[idx] = mismatches;
            args.direction[idx] = symbol;
        }
    }
}

impl HostDevice {
    pub fn new(name: &str, max_alloc_size: u64) -> HostDevice {
        HostDevice {
            descriptor: DeviceDescriptor {
                name: name.to_string(),
                class: DeviceClass::Cpu,
                max_alloc_size,
            },
            pattern: EncodedPattern {
                bytes: Vec::new(),
                significant: Vec::new(),
            },
            chunk: Vec::new(),
            flags: Vec::new(),
            loci: Vec::new(),
            entry_count: AtomicU32::new(0),
        }
    }

    fn check_alloc(&self, what: &str, bytes: usize) -> Result<()> {
        if bytes as u64 > self.descriptor.max_alloc_size {
            return Err(SearchError::Device(format!(
                "{}: {} buffer of {} bytes exceeds the {} byte allocation limit",
                self.descriptor.name, what, bytes, self.descriptor.max_alloc_size
            )));
        }
        Ok(())
    }
}

impl ComputeDevice for HostDevice {
    type Scratch = HostScratch;

    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn prepare(&mut self, pattern: &EncodedPattern, dice_size: usize) -> Result<()> {
        if pattern.is_empty() {
            return Err(SearchError::argument("Search pattern must not be empty"));
        }
        let chunk_bytes = dice_size + pattern.len() - 1;
        self.check_alloc("chunk", chunk_bytes)?;
        self.check_alloc("flag", dice_size)?;
        self.check_alloc("loci", dice_size * std::mem::size_of::<u32>())?;
        self.pattern = pattern.clone();
        self.chunk = vec![0_u8; chunk_bytes];
        self.flags = vec![0_u8; dice_size];
        self.loci = vec![0_u32; dice_size];
        Ok(())
    }

    fn find(&mut self, chunk: &[u8], work_size: usize) -> Result<u32> {
        let patternlen = self.pattern.len();
        if work_size > self.flags.len() || chunk.len() != work_size + patternlen - 1 {
            return Err(SearchError::Device(format!(
                "{}: chunk of {} bytes for {} positions does not fit the prepared buffers",
                self.descriptor.name,
                chunk.len(),
                work_size
            )));
        }
        self.chunk[..chunk.len()].copy_from_slice(chunk);
        self.entry_count.store(0, Ordering::Relaxed);
        let mut args = FinderArgs {
            chr: &self.chunk,
            pat: &self.pattern.bytes,
            pat_index: &self.pattern.significant,
            patternlen,
            flags: &mut self.flags,
            entrycount: &self.entry_count,
            loci: &mut self.loci,
        };
        for gid in 0..work_size {
            finder(gid, &mut args);
        }
        Ok(self.entry_count.load(Ordering::Acquire))
    }

    fn allocate_scratch(&mut self, candidate_count: u32) -> Result<HostScratch> {
        let capacity = candidate_count as usize * 2;
        self.check_alloc("mismatch loci", capacity * std::mem::size_of::<u32>())?;
        Ok(HostScratch {
            mm_loci: vec![0_u32; capacity],
            mm_counts: vec![0_u16; capacity],
            directions: vec![0_u8; capacity],
        })
    }

    fn compare(
        &mut self,
        scratch: &mut HostScratch,
        candidate_count: u32,
        query: &EncodedPattern,
        threshold: u16,
    ) -> Result<Vec<ComparerHit>> {
        if query.len() != self.pattern.len() {
            return Err(SearchError::argument(
                "All patterns must have the same length as the search pattern",
            ));
        }
        self.entry_count.store(0, Ordering::Relaxed);
        let mut args = ComparerArgs {
            chr: &self.chunk,
            loci: &self.loci,
            mm_loci: &mut scratch.mm_loci,
            comp: &query.bytes,
            comp_index: &query.significant,
            patternlen: query.len(),
            threshold,
            flags: &self.flags,
            mm_count: &mut scratch.mm_counts,
            direction: &mut scratch.directions,
            entrycount: &self.entry_count,
        };
        for gid in 0..candidate_count as usize {
            comparer(gid, &mut args);
        }
        let cnt = self.entry_count.load(Ordering::Acquire) as usize;
        decode_hits(
            &self.descriptor.name,
            &scratch.mm_loci[..cnt],
            &scratch.mm_counts[..cnt],
            &scratch.directions[..cnt],
        )
    }
}

impl DevicePool<HostDevice> {
    /// `n_devices` host devices, each with its own allocation ceiling of `max_alloc_size`.
    pub fn host(n_devices: usize, max_alloc_size: u64) -> Result<DevicePool<HostDevice>> {
        let devices = (0..n_devices)
            .map(|i| HostDevice::new(&format!("Rust host device {}", i), max_alloc_size))
            .collect();
        DevicePool::new(devices)
    }
}
