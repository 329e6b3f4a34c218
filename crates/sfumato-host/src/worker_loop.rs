use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use log::debug;
use sfumato_filter::diagnostics::run_job_with_diagnostics;
use sfumato_filter::{FilterConfig, Request, Response, Sequencer, SessionDiagnostics, WebClock};

/// Body of the worker thread. Returns when the request channel closes
/// and nothing is left pending.
pub(crate) fn run(
    config: FilterConfig,
    requests: &Receiver<Request>,
    responses: &Sender<Response>,
) -> SessionDiagnostics {
    let mut sequencer = Sequencer::new(config);
    let mut session = SessionDiagnostics::default();
    let mut connected = true;

    while connected {
        // Idle: park until the next request.
        match requests.recv() {
            Ok(request) => submit(&mut sequencer, request, responses),
            Err(_) => break,
        }
        connected = absorb(&mut sequencer, requests, responses);

        while let Some(job) = sequencer.next_job() {
            let config = sequencer.config().clone();
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                run_job_with_diagnostics(&job, &config, &WebClock)
            }));

            // Requests that queued up during the computation take effect
            // before its result is committed, so an Init/Reset among them
            // marks the result stale and newer filters supersede pending
            // ones.
            connected &= absorb(&mut sequencer, requests, responses);

            let response = match outcome {
                Ok((output, diagnostics)) => {
                    debug!(
                        "{} took {:.3}ms",
                        diagnostics.op,
                        diagnostics.duration.as_secs_f64() * 1000.0
                    );
                    session.computations.push(diagnostics);
                    sequencer.complete(job.ticket(), output)
                }
                Err(payload) => sequencer.abort(job.ticket(), &panic_message(payload.as_ref())),
            };
            emit(responses, response);
        }
    }

    session.stats = sequencer.stats();
    debug!("filter worker exiting");
    session
}

/// Submit everything already waiting in the channel without blocking.
/// Returns `false` once the channel is closed.
fn absorb(
    sequencer: &mut Sequencer,
    requests: &Receiver<Request>,
    responses: &Sender<Response>,
) -> bool {
    loop {
        match requests.try_recv() {
            Ok(request) => submit(sequencer, request, responses),
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}

fn submit(sequencer: &mut Sequencer, request: Request, responses: &Sender<Response>) {
    debug!("received {}", request.name());
    emit(responses, sequencer.submit(request));
}

fn emit(responses: &Sender<Response>, response: Option<Response>) {
    if let Some(response) = response
        && responses.send(response).is_err()
    {
        debug!("response dropped: receiver closed");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "computation panicked".to_string())
}
