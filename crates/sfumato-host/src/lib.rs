//! sfumato-host: Native transport for the sfumato filtering engine.
//!
//! [`FilterWorker`] owns a dedicated thread that holds the image state
//! and runs one filter computation at a time. Callers hand requests over
//! by value through a channel and receive responses on another, so
//! sending never waits on a computation. [`FilterWorker::shutdown`] and
//! dropping the handle do.
//!
//! Requests that arrive while a computation is running are absorbed
//! before the computation's result is committed, which is what lets a
//! burst of slider updates collapse into the latest one.

pub mod codec;
mod worker_loop;

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use sfumato_filter::{FilterConfig, FilterError, Request, Response, SessionDiagnostics};

/// Errors from talking to a [`FilterWorker`].
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The supplied configuration was rejected.
    #[error(transparent)]
    Config(#[from] FilterError),

    /// The worker thread has exited.
    #[error("worker has shut down")]
    Disconnected,

    /// No response arrived within the timeout.
    #[error("timed out waiting for a worker response")]
    Timeout,

    /// The worker thread panicked outside a computation.
    #[error("worker thread panicked")]
    Panicked,
}

/// Handle to a filtering worker thread.
///
/// Dropping the handle closes the request channel and joins the thread,
/// so the drop blocks until the running computation and everything
/// still pending have finished. Their responses are discarded. Call
/// [`shutdown`](Self::shutdown) to keep them and the diagnostics, and
/// avoid dropping the handle on a thread that must stay responsive.
pub struct FilterWorker {
    requests: Option<Sender<Request>>,
    responses: Receiver<Response>,
    join: Option<JoinHandle<SessionDiagnostics>>,
}

impl FilterWorker {
    /// Start a worker thread with an empty image state.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Config`] if `config` is invalid, or
    /// [`HostError::Spawn`] if the OS refuses the thread.
    pub fn spawn(config: FilterConfig) -> Result<Self, HostError> {
        config.validate()?;

        let (request_tx, request_rx) = crossbeam_channel::unbounded::<Request>();
        let (response_tx, response_rx) = crossbeam_channel::unbounded::<Response>();
        let join = std::thread::Builder::new()
            .name("sfumato-filter-worker".to_string())
            .spawn(move || worker_loop::run(config, &request_rx, &response_tx))?;

        Ok(Self {
            requests: Some(request_tx),
            responses: response_rx,
            join: Some(join),
        })
    }

    /// Hand a request to the worker. Never waits for a computation.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Disconnected`] if the worker has exited.
    pub fn send(&self, request: Request) -> Result<(), HostError> {
        self.requests
            .as_ref()
            .ok_or(HostError::Disconnected)?
            .send(request)
            .map_err(|_| HostError::Disconnected)
    }

    /// Decode a JSON request and hand it to the worker.
    ///
    /// Messages with an unknown or malformed tag are logged and
    /// ignored; the worker keeps running.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Disconnected`] if the worker has exited.
    pub fn send_json(&self, json: &str) -> Result<(), HostError> {
        match codec::decode_request(json) {
            Ok(request) => self.send(request),
            Err(e) => {
                log::warn!("ignoring message: {e}");
                Ok(())
            }
        }
    }

    /// The response channel, for callers that want to `select!` on it.
    #[must_use]
    pub const fn responses(&self) -> &Receiver<Response> {
        &self.responses
    }

    /// A response, if one is ready.
    #[must_use]
    pub fn try_recv(&self) -> Option<Response> {
        self.responses.try_recv().ok()
    }

    /// Wait up to `timeout` for the next response.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Timeout`] if nothing arrives in time, or
    /// [`HostError::Disconnected`] if the worker exited with nothing left
    /// to deliver.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Response, HostError> {
        self.responses.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => HostError::Timeout,
            RecvTimeoutError::Disconnected => HostError::Disconnected,
        })
    }

    /// Close the request channel, wait for pending work to finish, and
    /// return the worker's diagnostics.
    ///
    /// Responses produced while shutting down remain readable through
    /// the returned receiver.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Panicked`] if the worker thread panicked.
    pub fn shutdown(mut self) -> Result<(SessionDiagnostics, Receiver<Response>), HostError> {
        self.requests = None;
        let diagnostics = match self.join.take() {
            Some(join) => join.join().map_err(|_| HostError::Panicked)?,
            None => SessionDiagnostics::default(),
        };
        Ok((diagnostics, self.responses.clone()))
    }
}

impl Drop for FilterWorker {
    fn drop(&mut self) {
        self.requests = None;
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            log::warn!("filter worker thread panicked");
        }
    }
}
