use crate::device::{ComparerHit, ComputeDevice, DevicePool};
use crate::error::{Result, SearchError};
use crate::genome::GenomeBuffer;
use crate::output::MatchWriter;
use crate::pattern::{encode, EncodedPattern, Query, SearchConfig};
use crate::schedule::{ChunkAssignment, ChunkPlan, ChunkScheduler};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::borrow::Cow;
use std::io::Write;
use std::thread;

enum Command {
    // upload a chunk and run the finder over it
    Chunk(ChunkAssignment),
    // score the current candidates against one query
    Compare(usize),
}

enum Reply {
    Found(u32),
    Compared(Vec<ComparerHit>),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SearchSummary {
    /// scheduler rounds, each one chunk per active device
    pub rounds: usize,
    pub candidates: u64,
    pub matches: u64,
}

/// Candidate state of one device for one chunk. Dropping the session
/// releases the comparer buffers.
struct ChunkSession<S> {
    candidate_count: u32,
    scratch: Option<S>,
}

impl<S> ChunkSession<S> {
    fn open<D>(device: &mut D, chunk: &[u8], work_size: usize) -> Result<ChunkSession<S>>
    where
        D: ComputeDevice<Scratch = S>,
    {
        let candidate_count = device.find(chunk, work_size)?;
        // nothing found, no comparer buffers for this chunk
        let scratch = if candidate_count > 0 {
            Some(device.allocate_scratch(candidate_count)?)
        } else {
            None
        };
        Ok(ChunkSession {
            candidate_count,
            scratch,
        })
    }

    fn compare<D>(
        &mut self,
        device: &mut D,
        query: &EncodedPattern,
        threshold: u16,
    ) -> Result<Vec<ComparerHit>>
    where
        D: ComputeDevice<Scratch = S>,
    {
        let Some(scratch) = self.scratch.as_mut() else {
            return Ok(Vec::new());
        };
        let mut hits = device.compare(scratch, self.candidate_count, query, threshold)?;
        hits.retain(|h| h.mismatches <= threshold);
        // device atomics hand out slots in any order
        hits.sort_by_key(|h| (h.locus, h.strand));
        Ok(hits)
    }
}

/// Bytes `assignment` transfers to its device, padded with `N` past the genome end.
fn chunk_bytes<'g>(genome: &'g [u8], assignment: &ChunkAssignment, pattern_len: usize) -> Cow<'g, [u8]> {
    let start = assignment.start;
    let end = start + assignment.transfer_len(pattern_len);
    if end <= genome.len() {
        Cow::Borrowed(&genome[start..end])
    } else {
        let mut buf = genome[start..].to_vec();
        buf.resize(end - start, b'N');
        Cow::Owned(buf)
    }
}

fn device_worker<D: ComputeDevice>(
    mut device: D,
    genome: &GenomeBuffer,
    queries: &[(EncodedPattern, u16)],
    pattern_len: usize,
    commands: Receiver<Command>,
    replies: Sender<Result<Reply>>,
) {
    let mut session: Option<ChunkSession<D::Scratch>> = None;
    for cmd in commands.iter() {
        let reply = match cmd {
            Command::Chunk(assignment) => {
                // previous chunk's buffers go before the next upload
                session = None;
                let chunk = chunk_bytes(genome.data(), &assignment, pattern_len);
                match ChunkSession::open(&mut device, &chunk, assignment.len) {
                    Ok(opened) => {
                        let count = opened.candidate_count;
                        session = Some(opened);
                        Ok(Reply::Found(count))
                    }
                    Err(err) => Err(err),
                }
            }
            Command::Compare(query_idx) => {
                let (query, threshold) = &queries[query_idx];
                match session.as_mut() {
                    Some(s) => s.compare(&mut device, query, *threshold).map(Reply::Compared),
                    None => Ok(Reply::Compared(Vec::new())),
                }
            }
        };
        if replies.send(reply).is_err() {
            break;
        }
    }
}

struct WorkerHandle {
    index: usize,
    commands: Sender<Command>,
    replies: Receiver<Result<Reply>>,
}

impl WorkerHandle {
    fn send(&self, cmd: Command) -> Result<()> {
        self.commands
            .send(cmd)
            .map_err(|_| SearchError::WorkerDisconnected(self.index))
    }
    fn recv(&self) -> Result<Reply> {
        self.replies
            .recv()
            .map_err(|_| SearchError::WorkerDisconnected(self.index))?
    }
    fn recv_found(&self) -> Result<u32> {
        match self.recv()? {
            Reply::Found(count) => Ok(count),
            Reply::Compared(_) => Err(SearchError::Device(format!(
                "device {} answered a chunk upload with comparer results",
                self.index
            ))),
        }
    }
    fn recv_compared(&self) -> Result<Vec<ComparerHit>> {
        match self.recv()? {
            Reply::Compared(hits) => Ok(hits),
            Reply::Found(_) => Err(SearchError::Device(format!(
                "device {} answered a compare with finder results",
                self.index
            ))),
        }
    }
}

fn drive<W: Write>(
    workers: &[WorkerHandle],
    plan: &ChunkPlan,
    genome: &GenomeBuffer,
    queries: &[Query],
    writer: &mut MatchWriter<W>,
) -> Result<SearchSummary> {
    let mut summary = SearchSummary::default();
    let mut scheduler = ChunkScheduler::new(plan, genome.len());
    while let Some(assignments) = scheduler.load_next_chunk() {
        log::info!("{} devices selected to analyze...", assignments.len());
        // every device starts its finder before any result is waited on
        for a in assignments.iter() {
            workers[a.device].send(Command::Chunk(*a))?;
        }
        let mut active: Vec<ChunkAssignment> = Vec::with_capacity(assignments.len());
        for a in assignments.iter() {
            let count = workers[a.device].recv_found()?;
            log::debug!("device {}: {} candidate(s)", a.device, count);
            summary.candidates += count as u64;
            if count > 0 {
                active.push(*a);
            }
        }
        for (query_idx, query) in queries.iter().enumerate() {
            for a in active.iter() {
                workers[a.device].send(Command::Compare(query_idx))?;
            }
            // device order, not genome order
            for a in active.iter() {
                let hits = workers[a.device].recv_compared()?;
                summary.matches += writer.emit(genome, query, a.start as u64, &hits)?;
            }
        }
        summary.rounds += 1;
    }
    writer.flush()?;
    Ok(summary)
}

/// Runs the search with dice sizes derived from each device's allocation ceiling.
pub fn search<D: ComputeDevice, W: Write>(
    pool: DevicePool<D>,
    genome: &GenomeBuffer,
    config: &SearchConfig,
    writer: &mut MatchWriter<W>,
) -> Result<SearchSummary> {
    config.validate()?;
    let plan = ChunkPlan::new(&pool.descriptors(), config.pattern_len(), genome.len())?;
    search_with_plan(pool, &plan, genome, config, writer)
}

/// Runs the search with an explicit chunk plan, one dice size per pool device.
pub fn search_with_plan<D: ComputeDevice, W: Write>(
    pool: DevicePool<D>,
    plan: &ChunkPlan,
    genome: &GenomeBuffer,
    config: &SearchConfig,
    writer: &mut MatchWriter<W>,
) -> Result<SearchSummary> {
    config.validate()?;
    let pattern_len = config.pattern_len();
    if plan.num_devices() != pool.len() || plan.pattern_len() != pattern_len {
        return Err(SearchError::argument(
            "chunk plan does not match the device pool and pattern",
        ));
    }
    if !genome.is_empty() {
        if let Some(i) = plan.dice_sizes().iter().position(|dice| *dice == 0) {
            let desc = pool.descriptors().swap_remove(i);
            return Err(SearchError::InsufficientDeviceMemory {
                device: desc.name,
                max_alloc: desc.max_alloc_size,
                pattern_len,
            });
        }
    }
    let header = encode(config.pattern.as_bytes());
    let queries: Vec<(EncodedPattern, u16)> = config
        .queries
        .iter()
        .map(|q| (q.encode(), q.threshold))
        .collect();
    let mut devices = pool.into_devices();
    for (i, dev) in devices.iter_mut().enumerate() {
        dev.prepare(&header, plan.dice_size(i))?;
    }

    let summary = thread::scope(|scope| {
        let queries = &queries;
        let mut workers: Vec<WorkerHandle> = Vec::with_capacity(devices.len());
        for (index, dev) in devices.into_iter().enumerate() {
            let (cmd_send, cmd_recv) = bounded(1);
            let (reply_send, reply_recv) = bounded(1);
            scope.spawn(move || {
                device_worker(dev, genome, queries, pattern_len, cmd_recv, reply_send)
            });
            workers.push(WorkerHandle {
                index,
                commands: cmd_send,
                replies: reply_recv,
            });
        }
        // dropping the handles on return stops the workers
        drive(&workers, plan, genome, &config.queries, writer)
    })?;
    log::info!(
        "{} candidate(s), {} match(es) in {} round(s)",
        summary.candidates,
        summary.matches,
        summary.rounds
    );
    Ok(summary)
}
