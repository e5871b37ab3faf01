use std::ptr;

use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::device::{
    Device, CL_DEVICE_TYPE_ACCELERATOR, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_CPU,
    CL_DEVICE_TYPE_GPU,
};
use opencl3::kernel::{ExecuteKernel, Kernel};
use opencl3::memory::{Buffer, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE, CL_MEM_WRITE_ONLY};
use opencl3::platform;
use opencl3::program::Program;
use opencl3::types::{cl_device_type, cl_int, cl_uint, cl_ushort, CL_BLOCKING};

use crate::device::{
    decode_hits, ComparerHit, ComputeDevice, DeviceClass, DeviceDescriptor, DevicePool,
};
use crate::error::{Result, SearchError};
use crate::ocl_kernel::{COMPARER_KERNEL, FINDER_KERNEL, KERNEL_CONTENTS};
use crate::pattern::EncodedPattern;

fn to_system_type(class: DeviceClass) -> cl_device_type {
    match class {
        DeviceClass::Cpu => CL_DEVICE_TYPE_CPU,
        DeviceClass::Gpu => CL_DEVICE_TYPE_GPU,
        DeviceClass::Accelerator => CL_DEVICE_TYPE_ACCELERATOR,
        DeviceClass::All => CL_DEVICE_TYPE_ALL,
    }
}

fn from_system_type(ty: cl_device_type) -> DeviceClass {
    if ty & CL_DEVICE_TYPE_GPU != 0 {
        DeviceClass::Gpu
    } else if ty & CL_DEVICE_TYPE_ACCELERATOR != 0 {
        DeviceClass::Accelerator
    } else {
        DeviceClass::Cpu
    }
}

fn avail_devices(class: DeviceClass) -> Result<Vec<Device>> {
    let platforms = platform::get_platforms().map_err(|_| SearchError::NoPlatforms)?;
    if platforms.is_empty() {
        return Err(SearchError::NoPlatforms);
    }
    let sys_ty = to_system_type(class);
    let mut devices = Vec::new();
    for plat in platforms.iter() {
        // platforms without a device of this type report an error, not an empty list
        let ids = plat.get_devices(sys_ty).unwrap_or_default();
        devices.extend(ids.into_iter().map(Device::new));
    }
    Ok(devices)
}

/// Names of every OpenCL device on the system, for the usage text.
pub fn describe_devices() -> Vec<String> {
    match avail_devices(DeviceClass::All) {
        Ok(devices) => devices
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let name = d.name().unwrap_or_else(|_| String::from("unknown"));
                let class = d.dev_type().map(from_system_type).unwrap_or(DeviceClass::All);
                format!("{}: {} ({})", i, name, class)
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

struct OclBuffers {
    chunk: Buffer<u8>,
    pattern: Buffer<u8>,
    pattern_index: Buffer<cl_int>,
    query: Buffer<u8>,
    query_index: Buffer<cl_int>,
    flags: Buffer<u8>,
    loci: Buffer<cl_uint>,
    entrycount: Buffer<cl_uint>,
}

pub struct OclScratch {
    mm_loci: Buffer<cl_uint>,
    mm_counts: Buffer<cl_ushort>,
    directions: Buffer<u8>,
}

// SAFETY: OpenCL objects are reference counted handles that may be used
// from any thread; each device and its scratch buffers are only ever
// touched by the one worker thread that owns them.
unsafe impl Send for OclScratch {}

/// One OpenCL device with its own context, queue and compiled kernels.
pub struct OclDevice {
    descriptor: DeviceDescriptor,
    context: Context,
    queue: CommandQueue,
    finder: Kernel,
    comparer: Kernel,
    pattern_len: usize,
    dice_size: usize,
    buffers: Option<OclBuffers>,
}

// SAFETY: see OclScratch
unsafe impl Send for OclDevice {}

impl OclDevice {
    pub fn new(device: Device) -> Result<OclDevice> {
        let name = device.name()?;
        let descriptor = DeviceDescriptor {
            name: name.clone(),
            class: from_system_type(device.dev_type()?),
            max_alloc_size: device.max_mem_alloc_size()?,
        };
        let context = Context::from_device(&device)?;
        #[allow(deprecated)]
        let queue = CommandQueue::create_default(&context, 0)?;
        let program = Program::create_and_build_from_source(&context, KERNEL_CONTENTS, "")
            .map_err(|log| SearchError::KernelBuild {
                device: name.clone(),
                log,
            })?;
        let finder = Kernel::create(&program, FINDER_KERNEL)?;
        let comparer = Kernel::create(&program, COMPARER_KERNEL)?;
        Ok(OclDevice {
            descriptor,
            context,
            queue,
            finder,
            comparer,
            pattern_len: 0,
            dice_size: 0,
            buffers: None,
        })
    }

    fn take_buffers(&mut self) -> Result<OclBuffers> {
        self.buffers.take().ok_or_else(|| {
            SearchError::Device(format!("{}: device used before prepare", self.descriptor.name))
        })
    }

    fn create_buffer<T>(&self, flags: u64, count: usize) -> Result<Buffer<T>> {
        // zero sized buffers are invalid
        let buf = unsafe { Buffer::<T>::create(&self.context, flags, count.max(1), ptr::null_mut())? };
        Ok(buf)
    }

    fn write_buffer<T>(&self, buf: &mut Buffer<T>, data: &[T]) -> Result<()> {
        let event = unsafe { self.queue.enqueue_write_buffer(buf, CL_BLOCKING, 0, data, &[])? };
        event.wait()?;
        Ok(())
    }

    fn read_buffer<T>(&self, buf: &Buffer<T>, data: &mut [T]) -> Result<()> {
        let event = unsafe { self.queue.enqueue_read_buffer(buf, CL_BLOCKING, 0, data, &[])? };
        event.wait()?;
        Ok(())
    }
}

impl ComputeDevice for OclDevice {
    type Scratch = OclScratch;

    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn prepare(&mut self, pattern: &EncodedPattern, dice_size: usize) -> Result<()> {
        let l = pattern.len();
        if l == 0 {
            return Err(SearchError::argument("Search pattern must not be empty"));
        }
        let pattern_index: Vec<cl_int> = pattern.significant.iter().map(|k| *k as cl_int).collect();
        let mut buffers = OclBuffers {
            chunk: self.create_buffer(CL_MEM_READ_ONLY, dice_size + l - 1)?,
            pattern: self.create_buffer(CL_MEM_READ_ONLY, 2 * l)?,
            pattern_index: self.create_buffer(CL_MEM_READ_ONLY, 2 * l)?,
            query: self.create_buffer(CL_MEM_READ_ONLY, 2 * l)?,
            query_index: self.create_buffer(CL_MEM_READ_ONLY, 2 * l)?,
            flags: self.create_buffer(CL_MEM_READ_WRITE, dice_size)?,
            loci: self.create_buffer(CL_MEM_READ_WRITE, dice_size)?,
            entrycount: self.create_buffer(CL_MEM_READ_WRITE, 1)?,
        };
        self.write_buffer(&mut buffers.pattern, &pattern.bytes)?;
        self.write_buffer(&mut buffers.pattern_index, &pattern_index)?;
        self.pattern_len = l;
        self.dice_size = dice_size;
        self.buffers = Some(buffers);
        Ok(())
    }

    fn find(&mut self, chunk: &[u8], work_size: usize) -> Result<u32> {
        let l = self.pattern_len;
        if work_size > self.dice_size || chunk.len() + 1 != work_size + l {
            return Err(SearchError::Device(format!(
                "{}: chunk of {} bytes for {} positions does not fit the prepared buffers",
                self.descriptor.name,
                chunk.len(),
                work_size
            )));
        }
        let mut buffers = self.take_buffers()?;
        let res = self.run_finder(&mut buffers, chunk, work_size);
        self.buffers = Some(buffers);
        res
    }

    fn allocate_scratch(&mut self, candidate_count: u32) -> Result<OclScratch> {
        // one entry per strand per candidate
        let capacity = candidate_count as usize * 2;
        Ok(OclScratch {
            mm_loci: self.create_buffer(CL_MEM_WRITE_ONLY, capacity)?,
            mm_counts: self.create_buffer(CL_MEM_WRITE_ONLY, capacity)?,
            directions: self.create_buffer(CL_MEM_WRITE_ONLY, capacity)?,
        })
    }

    fn compare(
        &mut self,
        scratch: &mut OclScratch,
        candidate_count: u32,
        query: &EncodedPattern,
        threshold: u16,
    ) -> Result<Vec<ComparerHit>> {
        if query.len() != self.pattern_len {
            return Err(SearchError::argument(
                "All patterns must have the same length as the search pattern",
            ));
        }
        let mut buffers = self.take_buffers()?;
        let res = self.run_comparer(&mut buffers, scratch, candidate_count, query, threshold);
        self.buffers = Some(buffers);
        res
    }
}

impl OclDevice {
    fn run_finder(&self, buffers: &mut OclBuffers, chunk: &[u8], work_size: usize) -> Result<u32> {
        self.write_buffer(&mut buffers.chunk, chunk)?;
        self.write_buffer(&mut buffers.entrycount, &[0])?;
        if work_size == 0 {
            return Ok(0);
        }
        let patternlen = self.pattern_len as cl_uint;
        let kernel_event = unsafe {
            ExecuteKernel::new(&self.finder)
                .set_arg(&buffers.chunk)
                .set_arg(&buffers.pattern)
                .set_arg(&buffers.pattern_index)
                .set_arg(&patternlen)
                .set_arg(&buffers.flags)
                .set_arg(&buffers.entrycount)
                .set_arg(&buffers.loci)
                .set_arg_local_buffer(self.pattern_len * 2)
                .set_arg_local_buffer(self.pattern_len * 2 * std::mem::size_of::<cl_int>())
                .set_global_work_size(work_size)
                .enqueue_nd_range(&self.queue)?
        };
        kernel_event.wait()?;
        let mut count = [0 as cl_uint; 1];
        self.read_buffer(&buffers.entrycount, &mut count)?;
        Ok(count[0])
    }

    fn run_comparer(
        &self,
        buffers: &mut OclBuffers,
        scratch: &mut OclScratch,
        candidate_count: u32,
        query: &EncodedPattern,
        threshold: u16,
    ) -> Result<Vec<ComparerHit>> {
        if candidate_count == 0 {
            return Ok(Vec::new());
        }
        let query_index: Vec<cl_int> = query.significant.iter().map(|k| *k as cl_int).collect();
        self.write_buffer(&mut buffers.query, &query.bytes)?;
        self.write_buffer(&mut buffers.query_index, &query_index)?;
        self.write_buffer(&mut buffers.entrycount, &[0])?;
        let patternlen = self.pattern_len as cl_uint;
        let threshold = threshold as cl_ushort;
        let kernel_event = unsafe {
            ExecuteKernel::new(&self.comparer)
                .set_arg(&buffers.chunk)
                .set_arg(&buffers.loci)
                .set_arg(&scratch.mm_loci)
                .set_arg(&buffers.query)
                .set_arg(&buffers.query_index)
                .set_arg(&patternlen)
                .set_arg(&threshold)
                .set_arg(&buffers.flags)
                .set_arg(&scratch.mm_counts)
                .set_arg(&scratch.directions)
                .set_arg(&buffers.entrycount)
                .set_arg_local_buffer(self.pattern_len * 2)
                .set_arg_local_buffer(self.pattern_len * 2 * std::mem::size_of::<cl_int>())
                .set_global_work_size(candidate_count as usize)
                .enqueue_nd_range(&self.queue)?
        };
        kernel_event.wait()?;

        let mut count = [0 as cl_uint; 1];
        self.read_buffer(&buffers.entrycount, &mut count)?;
        let cnt = count[0] as usize;
        if cnt == 0 {
            return Ok(Vec::new());
        }
        let mut mm_loci = vec![0 as cl_uint; cnt];
        let mut mm_counts = vec![0 as cl_ushort; cnt];
        let mut directions = vec![0_u8; cnt];
        self.read_buffer(&scratch.mm_loci, &mut mm_loci)?;
        self.read_buffer(&scratch.mm_counts, &mut mm_counts)?;
        self.read_buffer(&scratch.directions, &mut directions)?;
        decode_hits(&self.descriptor.name, &mm_loci, &mm_counts, &directions)
    }
}

impl DevicePool<OclDevice> {
    /// Every OpenCL device of `class` across all platforms, each with its own
    /// context and compiled kernels. No fallback to another class.
    pub fn discover(class: DeviceClass) -> Result<DevicePool<OclDevice>> {
        let devices = avail_devices(class)?;
        if devices.is_empty() {
            return Err(SearchError::NoDevices(class.to_string()));
        }
        let devices = devices
            .into_iter()
            .map(OclDevice::new)
            .collect::<Result<Vec<OclDevice>>>()?;
        DevicePool::new(devices)
    }
}
