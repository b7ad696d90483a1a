// Parallel analysis with ordered output.
//
// Node ranges are handed to a thread pool in ascending order. Every job owns a
// slot in a FIFO; the writer only ever takes the front slot, so findings reach
// the sink in node order no matter which worker finishes first. The number of
// jobs in flight is bounded by the worker count.

use crate::routing_common::road_network::{EdgeAttributes, NodeId, RoadNetwork};
use crate::topology::detector::{AuditContext, UnconnectedFinder};
use crate::topology::error::{DetectorError, PipelineError};
use crate::topology::findings::Finding;
use std::any::Any;
use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use threadpool::ThreadPool;
use tracing::{debug, info};

/// Receives findings in node order.
pub trait FindingSink {
    fn write_findings(&mut self, findings: &[Finding]) -> io::Result<()>;
}

impl FindingSink for Vec<Finding> {
    fn write_findings(&mut self, findings: &[Finding]) -> io::Result<()> {
        self.extend_from_slice(findings);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub jobs: usize,
    pub nodes: u32,
    pub missing_connections: usize,
    pub duplicated_edges: usize,
}

impl PipelineSummary {
    fn count(&mut self, findings: &[Finding]) {
        for finding in findings {
            match finding {
                Finding::MissingConnection(_) => self.missing_connections += 1,
                Finding::DuplicatedEdge(_) => self.duplicated_edges += 1,
            }
        }
    }
}

type Outcome = Result<Vec<Finding>, PipelineError>;

struct Slot {
    seq: usize,
    start: NodeId,
    end: NodeId,
    outcome: Option<Outcome>,
}

struct JobQueue {
    slots: Mutex<VecDeque<Slot>>,
    completed: Condvar,
    aborted: AtomicBool,
}

impl JobQueue {
    fn new() -> Self {
        JobQueue {
            slots: Mutex::new(VecDeque::new()),
            completed: Condvar::new(),
            aborted: AtomicBool::new(false),
        }
    }

    // jobs catch their own panics, a poisoned lock still holds consistent slots
    fn lock(&self) -> MutexGuard<'_, VecDeque<Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, seq: usize, start: NodeId, end: NodeId) {
        self.lock().push_back(Slot {
            seq,
            start,
            end,
            outcome: None,
        });
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn complete(&self, seq: usize, outcome: Outcome) {
        let mut slots = self.lock();
        let Some(front) = slots.front().map(|s| s.seq) else {
            return;
        };
        if let Some(slot) = seq.checked_sub(front).and_then(|i| slots.get_mut(i)) {
            slot.outcome = Some(outcome);
        }
        drop(slots);
        self.completed.notify_all();
    }

    /// Block until the oldest job is done and take it. `None` once the
    /// queue is empty.
    fn pop_front(&self) -> Option<Slot> {
        let mut slots = self.lock();
        loop {
            match slots.front() {
                None => return None,
                Some(slot) if slot.outcome.is_some() => return slots.pop_front(),
                Some(_) => {
                    slots = self
                        .completed
                        .wait(slots)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
        self.lock().clear();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

struct Writer<'s, S: FindingSink + ?Sized> {
    sink: &'s mut S,
    summary: PipelineSummary,
    node_count: u32,
    next_report: u32,
    report_step: u32,
}

impl<S: FindingSink + ?Sized> Writer<'_, S> {
    fn write(&mut self, slot: Slot) -> Result<(), PipelineError> {
        let findings = match slot.outcome {
            Some(Ok(findings)) => findings,
            Some(Err(e)) => return Err(e),
            None => Vec::new(),
        };
        self.sink
            .write_findings(&findings)
            .map_err(PipelineError::Sink)?;
        self.summary.count(&findings);
        self.summary.jobs += 1;
        self.summary.nodes += slot.end - slot.start;

        if slot.end >= self.next_report && slot.end < self.node_count {
            info!(
                "Checked {}/{} nodes, {} missing connections and {} duplicated edges so far",
                slot.end,
                self.node_count,
                self.summary.missing_connections,
                self.summary.duplicated_edges
            );
            while self.next_report <= slot.end {
                self.next_report += self.report_step;
            }
        }
        Ok(())
    }
}

/// Run `job` over `0..node_count` in batches of `batch_size` nodes on
/// `workers` threads and feed the results to `sink` in node order.
///
/// The first failing job stops the run; jobs still in flight finish but
/// their output is discarded.
pub fn run_pipeline<F, S>(
    node_count: u32,
    batch_size: u32,
    workers: usize,
    job: Arc<F>,
    sink: &mut S,
) -> Result<PipelineSummary, PipelineError>
where
    F: Fn(NodeId, NodeId) -> Result<Vec<Finding>, DetectorError> + Send + Sync + 'static,
    S: FindingSink + ?Sized,
{
    let workers = workers.max(1);
    let batch_size = batch_size.max(1);
    let pool = ThreadPool::with_name("topology-worker".to_string(), workers);
    let queue = Arc::new(JobQueue::new());
    let report_step = (node_count / 8).max(1);
    let mut writer = Writer {
        sink,
        summary: PipelineSummary::default(),
        node_count,
        next_report: report_step,
        report_step,
    };

    debug!(
        "Starting analysis of {} nodes with {} workers, {} nodes per job",
        node_count, workers, batch_size
    );

    let mut seq = 0usize;
    let mut start: NodeId = 0;
    while start < node_count {
        let end = start.saturating_add(batch_size).min(node_count);
        queue.push(seq, start, end);

        let queue_for_job = Arc::clone(&queue);
        let job = Arc::clone(&job);
        pool.execute(move || {
            if queue_for_job.aborted.load(Ordering::Relaxed) {
                return;
            }
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| job(start, end))) {
                Ok(Ok(findings)) => Ok(findings),
                Ok(Err(source)) => Err(PipelineError::JobFailed { start, end, source }),
                Err(payload) => Err(PipelineError::WorkerPanicked {
                    start,
                    end,
                    message: panic_message(payload.as_ref()),
                }),
            };
            queue_for_job.complete(seq, outcome);
        });
        seq += 1;
        start = end;

        while queue.len() > workers - 1 {
            let Some(slot) = queue.pop_front() else {
                break;
            };
            if let Err(e) = writer.write(slot) {
                queue.abort();
                return Err(e);
            }
        }
    }

    while let Some(slot) = queue.pop_front() {
        if let Err(e) = writer.write(slot) {
            queue.abort();
            return Err(e);
        }
    }
    pool.join();

    let summary = writer.summary;
    info!(
        "Checked {} nodes in {} jobs: {} missing connections, {} duplicated edges",
        summary.nodes, summary.jobs, summary.missing_connections, summary.duplicated_edges
    );
    Ok(summary)
}

/// Check every node of `ctx.graph` with the configured worker count and
/// batch size.
pub fn audit<G, S>(ctx: Arc<AuditContext<G>>, sink: &mut S) -> Result<PipelineSummary, PipelineError>
where
    G: RoadNetwork + EdgeAttributes + 'static,
    S: FindingSink + ?Sized,
{
    let node_count = ctx.graph.node_count();
    let batch_size = ctx.config.batch_size;
    let workers = ctx.config.worker_threads;
    let job = Arc::new(move |start: NodeId, end: NodeId| {
        UnconnectedFinder::new(&*ctx).check_range(start, end)
    });
    run_pipeline(node_count, batch_size, workers, job, sink)
}
