//! Request sequencing: turns a bursty request stream into ordered state
//! transitions with at most one computation in flight.
//!
//! The [`Sequencer`] is sans-IO. A transport feeds it requests with
//! [`submit`](Sequencer::submit), asks for work with
//! [`next_job`](Sequencer::next_job), runs the returned [`Job`] wherever
//! it likes, and reports back with [`complete`](Sequencer::complete).
//!
//! # Policy
//!
//! - `Init` and `Reset` apply immediately, are never superseded, and
//!   flush every pending filter request.
//! - While a job is in flight, filter requests wait in a pending list
//!   that holds at most one request per [`FilterKind`]. A newer request
//!   of the same kind replaces the older one (which is never computed)
//!   and moves to the back of the list.
//! - Every `Init`/`Reset` advances an epoch. A job started in an older
//!   epoch still runs to completion, but its output is discarded rather
//!   than stored or emitted.

use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::engine;
use crate::protocol::{FilterResult, Request, Response};
use crate::state::ImageState;
use crate::types::{FilterConfig, FilterError, FilterOp, PixelBuffer};

/// Whether a computation is currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// No job in flight.
    Idle,
    /// A job was handed out and has not completed yet.
    Busy,
}

/// Identifies a handed-out job when it is completed or aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    id: u64,
    epoch: u64,
    op: FilterOp,
}

impl Ticket {
    /// The operation the job computes.
    #[must_use]
    pub const fn op(self) -> FilterOp {
        self.op
    }
}

/// A unit of filter work with its base buffer already resolved.
///
/// The job shares the base immutably with the image state; running it
/// never touches the state.
#[derive(Debug, Clone)]
pub struct Job {
    ticket: Ticket,
    base: Arc<PixelBuffer>,
}

impl Job {
    /// Ticket to pass to [`Sequencer::complete`] or [`Sequencer::abort`].
    #[must_use]
    pub const fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// The operation to compute.
    #[must_use]
    pub const fn op(&self) -> FilterOp {
        self.ticket.op
    }

    /// The buffer the operation reads.
    #[must_use]
    pub fn base(&self) -> &PixelBuffer {
        &self.base
    }

    /// Compute the job's output.
    #[must_use = "returns the filtered image"]
    pub fn run(&self, config: &FilterConfig) -> PixelBuffer {
        engine::compute(self.ticket.op, &self.base, config)
    }
}

/// Counters describing what happened to submitted requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerStats {
    /// Requests passed to `submit`.
    pub accepted: u64,
    /// Filter jobs whose output was stored and emitted.
    pub computed: u64,
    /// Pending filter requests dropped in favour of a newer one, or
    /// flushed by `Init`/`Reset`.
    pub superseded: u64,
    /// Completed jobs discarded because an `Init`/`Reset` arrived while
    /// they ran.
    pub stale: u64,
    /// Requests answered with an error.
    pub rejected: u64,
}

/// Drives an [`ImageState`] from a stream of [`Request`]s.
#[derive(Debug)]
pub struct Sequencer {
    config: FilterConfig,
    state: ImageState,
    pending: Vec<FilterOp>,
    in_flight: Option<Ticket>,
    epoch: u64,
    next_id: u64,
    stats: SequencerStats,
}

impl Sequencer {
    /// Create a sequencer with an empty image state.
    #[must_use]
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            state: ImageState::new(),
            pending: Vec::with_capacity(2),
            in_flight: None,
            epoch: 0,
            next_id: 0,
            stats: SequencerStats::default(),
        }
    }

    /// Kernel configuration used by [`drain`](Self::drain).
    #[must_use]
    pub const fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Replace the kernel configuration. Takes effect from the next job
    /// handed out; the image state is kept.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidConfig`] and keeps the current
    /// configuration if `config` does not validate.
    pub fn set_config(&mut self, config: FilterConfig) -> Result<(), FilterError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Read access to the image state.
    #[must_use]
    pub const fn image_state(&self) -> &ImageState {
        &self.state
    }

    /// Current state of the machine.
    #[must_use]
    pub const fn state(&self) -> SequencerState {
        if self.in_flight.is_some() {
            SequencerState::Busy
        } else {
            SequencerState::Idle
        }
    }

    /// Filter operations waiting to run, oldest first.
    #[must_use]
    pub fn pending(&self) -> &[FilterOp] {
        &self.pending
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> SequencerStats {
        self.stats
    }

    /// Accept a request.
    ///
    /// Returns a response that must be emitted right away: an error, or
    /// the restored original after a `Reset`. Filter requests are only
    /// queued here; their results come from [`complete`](Self::complete).
    pub fn submit(&mut self, request: Request) -> Option<Response> {
        self.stats.accepted += 1;
        match request {
            Request::Init {
                pixel_bytes,
                width,
                height,
            } => match self.state.init(pixel_bytes, width, height) {
                Ok(()) => {
                    debug!("loaded {width}x{height} image");
                    self.invalidate();
                    None
                }
                Err(e) => {
                    warn!("rejected init: {e}");
                    Some(self.reject(e))
                }
            },
            Request::Reset => {
                self.invalidate();
                self.state.reset();
                self.state.original().ok().map(|original| {
                    Response::Result(FilterResult {
                        op: None,
                        output: (*original).clone(),
                    })
                })
            }
            Request::Blur { .. } | Request::EdgeDetect => {
                // Both variants carry an op; the fallback is unreachable.
                let op = request.filter_op()?;
                self.enqueue(op)
            }
        }
    }

    /// Hand out the next job, moving to [`SequencerState::Busy`].
    ///
    /// Returns `None` while a job is in flight or when nothing is
    /// pending.
    pub fn next_job(&mut self) -> Option<Job> {
        if self.in_flight.is_some() {
            return None;
        }
        while !self.pending.is_empty() {
            let op = self.pending.remove(0);
            let base = match engine::base_for(op, &self.state) {
                Ok(base) => base,
                Err(e) => {
                    warn!("dropping pending {op}: {e}");
                    continue;
                }
            };
            let ticket = Ticket {
                id: self.next_id,
                epoch: self.epoch,
                op,
            };
            self.next_id += 1;
            self.in_flight = Some(ticket);
            debug!("starting {op} (job {})", ticket.id);
            return Some(Job { ticket, base });
        }
        None
    }

    /// Report the output of a job handed out by
    /// [`next_job`](Self::next_job).
    ///
    /// Stores the output as the new derived buffer and returns the result
    /// to emit, or `None` if the job went stale or `ticket` is unknown.
    pub fn complete(&mut self, ticket: Ticket, output: PixelBuffer) -> Option<Response> {
        if !self.finish(ticket) {
            return None;
        }
        let output = Arc::new(output);
        if !self.state.set_derived(Arc::clone(&output)) {
            let e = FilterError::ComputationFailed(format!(
                "{} produced a buffer with mismatched dimensions",
                ticket.op
            ));
            warn!("{e}");
            return Some(self.reject(e));
        }
        self.stats.computed += 1;
        Some(Response::Result(FilterResult {
            op: Some(ticket.op),
            output: (*output).clone(),
        }))
    }

    /// Report that a job failed without output. The image state is left
    /// as it was.
    pub fn abort(&mut self, ticket: Ticket, reason: &str) -> Option<Response> {
        if !self.finish(ticket) {
            return None;
        }
        warn!("{} failed: {reason}", ticket.op);
        Some(self.reject(FilterError::ComputationFailed(reason.to_string())))
    }

    /// Run every pending job on the calling thread and collect the
    /// responses.
    pub fn drain(&mut self) -> Vec<Response> {
        let mut responses = Vec::new();
        while let Some(job) = self.next_job() {
            let output = job.run(&self.config);
            responses.extend(self.complete(job.ticket(), output));
        }
        responses
    }

    /// Submit `request` and drain. Convenient for callers without a
    /// separate compute thread.
    pub fn handle(&mut self, request: Request) -> Vec<Response> {
        let mut responses: Vec<Response> = self.submit(request).into_iter().collect();
        responses.extend(self.drain());
        responses
    }

    /// Leave the busy state for `ticket`. Returns `true` if its output
    /// should be applied.
    fn finish(&mut self, ticket: Ticket) -> bool {
        if self.in_flight != Some(ticket) {
            warn!("ignoring completion for unknown job {}", ticket.id);
            return false;
        }
        self.in_flight = None;
        if ticket.epoch != self.epoch {
            self.stats.stale += 1;
            debug!("discarding stale {} (job {})", ticket.op, ticket.id);
            return false;
        }
        true
    }

    fn enqueue(&mut self, op: FilterOp) -> Option<Response> {
        if !self.state.is_loaded() {
            return Some(self.reject(FilterError::NoImageLoaded));
        }
        if let Some(pos) = self.pending.iter().position(|p| p.kind() == op.kind()) {
            let older = self.pending.remove(pos);
            self.stats.superseded += 1;
            debug!("{older} superseded by {op}");
        }
        self.pending.push(op);
        None
    }

    /// Start a new epoch: pending work and any in-flight result belong
    /// to the previous image state.
    fn invalidate(&mut self) {
        self.epoch += 1;
        let flushed = self.pending.len() as u64;
        if flushed > 0 {
            debug!("flushing {flushed} pending request(s)");
            self.stats.superseded += flushed;
            self.pending.clear();
        }
    }

    fn reject(&mut self, error: FilterError) -> Response {
        self.stats.rejected += 1;
        Response::error(error)
    }
}
