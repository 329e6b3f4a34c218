//! sfumato-filter: Image filtering engine (sans-IO).
//!
//! Holds a source image, repeatedly applies Gaussian blur or Sobel edge
//! detection to it on request, and sequences overlapping requests so
//! that the latest one wins without corrupting state.
//!
//! - [`blur`] and [`edge`]: pure kernels over RGBA8 [`PixelBuffer`]s.
//! - [`state`]: the original/derived buffer store.
//! - [`engine`]: which buffer each operation reads, and the dispatch to
//!   its kernel.
//! - [`sequencer`]: the request state machine.
//! - [`protocol`]: request/response messages.
//!
//! This crate has **no I/O dependencies**. Threads and browser message
//! ports live in `sfumato-host` and `sfumato-worker`.

pub mod blur;
pub mod diagnostics;
pub mod edge;
pub mod engine;
pub mod protocol;
pub mod sequencer;
pub mod state;
pub mod types;

pub use diagnostics::{Clock, FilterDiagnostics, SessionDiagnostics, WebClock};
pub use protocol::{FilterResult, Request, Response};
pub use sequencer::{Job, Sequencer, SequencerState, SequencerStats, Ticket};
pub use state::ImageState;
pub use types::{
    BlurFactor, Dimensions, FilterConfig, FilterError, FilterKind, FilterOp, PixelBuffer,
};

/// Apply a whole request sequence on the calling thread, collecting
/// every response in emission order.
///
/// Each request is fully processed before the next one is submitted, so
/// nothing is superseded. Useful for scripted runs and tests.
pub fn process_all(
    config: FilterConfig,
    requests: impl IntoIterator<Item = Request>,
) -> Vec<Response> {
    let mut sequencer = Sequencer::new(config);
    requests
        .into_iter()
        .flat_map(|request| sequencer.handle(request))
        .collect()
}

/// Like [`process_all`], also timing every computation with `clock`.
pub fn process_all_with_diagnostics<C: Clock>(
    config: FilterConfig,
    requests: impl IntoIterator<Item = Request>,
    clock: &C,
) -> (Vec<Response>, SessionDiagnostics) {
    let mut sequencer = Sequencer::new(config);
    let mut responses = Vec::new();
    let mut session = SessionDiagnostics::default();

    for request in requests {
        responses.extend(sequencer.submit(request));
        while let Some(job) = sequencer.next_job() {
            let (output, diagnostics) =
                diagnostics::run_job_with_diagnostics(&job, sequencer.config(), clock);
            session.computations.push(diagnostics);
            responses.extend(sequencer.complete(job.ticket(), output));
        }
    }

    session.stats = sequencer.stats();
    (responses, session)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn init(width: u32, height: u32) -> Request {
        Request::Init {
            pixel_bytes: vec![200; (width * height * 4) as usize],
            width,
            height,
        }
    }

    #[test]
    fn process_all_emits_one_result_per_filter() {
        let responses = process_all(
            FilterConfig::default(),
            [
                init(4, 4),
                Request::Blur { blur_factor: 10 },
                Request::EdgeDetect,
                Request::Reset,
            ],
        );
        let ops: Vec<_> = responses
            .iter()
            .map(|r| r.as_result().unwrap().op)
            .collect();
        assert_eq!(
            ops,
            vec![
                Some(FilterOp::Blur(BlurFactor::new(10))),
                Some(FilterOp::EdgeDetect),
                None,
            ]
        );
    }

    #[test]
    fn process_all_with_diagnostics_times_each_computation() {
        let (responses, session) = process_all_with_diagnostics(
            FilterConfig::default(),
            [init(3, 3), Request::EdgeDetect, Request::Blur { blur_factor: 4 }],
            &WebClock,
        );
        assert_eq!(responses.len(), 2);
        assert_eq!(session.computations.len(), 2);
        assert_eq!(session.stats.computed, 2);
        assert_eq!(session.stats.accepted, 3);
    }
}
