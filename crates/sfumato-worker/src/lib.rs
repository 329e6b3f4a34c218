//! Web worker entry point for sfumato image filtering.
//!
//! This crate compiles to a standalone WASM module that runs inside a
//! dedicated `Worker`. The worker owns the image state; the page hands
//! it pixels and filter requests via `postMessage` and receives filtered
//! RGBA buffers back.
//!
//! Message protocol, page to worker:
//! - `{ type: "init", pixelBytes, width, height, configJson? }` where
//!   `pixelBytes` is a `Uint8Array` or `Uint8ClampedArray` of RGBA8
//!   data and `configJson` an optional JSON `FilterConfig`
//! - `{ type: "blur", blurFactor }`
//! - `{ type: "edgeDetect" }`
//! - `{ type: "reset" }` (also accepted as `resetOriginalImage` and
//!   `undoEdgeDetect`)
//!
//! Worker to page, on success:
//! - `ok`: `true`
//! - `op`: `"blur"`, `"edgeDetect"` or `"reset"`
//! - `blurFactor`: `number`, for blur results only
//! - `width`, `height`: `number`
//! - `output`: `Uint8ClampedArray`, its buffer transferred
//!
//! On error:
//! - `ok`: `false`
//! - `errorJson`: `String`, a JSON-serialized `FilterError`
//!
//! The message handler never computes. It only submits to the
//! [`Sequencer`] and schedules a tick with `setTimeout(0)`; each tick
//! runs one job. Messages that arrive while a job runs are therefore
//! submitted before the next job is picked, so a burst of slider
//! updates collapses into the latest one.

mod console_log;

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, warn};
use sfumato_filter::diagnostics::run_job_with_diagnostics;
use sfumato_filter::{
    FilterConfig, FilterError, FilterOp, FilterResult, Request, Response, Sequencer, WebClock,
};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// Worker-lifetime state shared between the message handler and ticks.
struct WorkerState {
    sequencer: Sequencer,
    tick_scheduled: bool,
}

type Shared = Rc<RefCell<WorkerState>>;

/// A decoded page message.
struct Incoming {
    request: Request,
    config: Option<FilterConfig>,
}

/// Worker entry point, run when the module is instantiated.
#[wasm_bindgen(start)]
pub fn worker_main() {
    console_error_panic_hook::set_once();
    console_log::init(log::LevelFilter::Info);

    let shared: Shared = Rc::new(RefCell::new(WorkerState {
        sequencer: Sequencer::new(FilterConfig::default()),
        tick_scheduled: false,
    }));

    let onmessage =
        Closure::<dyn FnMut(web_sys::MessageEvent)>::new(move |event: web_sys::MessageEvent| {
            handle_message(&shared, &event.data());
        });
    worker_scope().set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget(); // leak: lives for the worker lifetime
}

fn worker_scope() -> web_sys::DedicatedWorkerGlobalScope {
    js_sys::global()
        .dyn_into()
        .expect_throw("not running in a DedicatedWorkerGlobalScope")
}

/// Submit one page message. Never runs a filter.
fn handle_message(shared: &Shared, data: &JsValue) {
    let Incoming { request, config } = match decode_message(data) {
        Ok(incoming) => incoming,
        Err(FilterError::UnknownRequestType(detail)) => {
            warn!("ignoring message: {detail}");
            return;
        }
        Err(e) => {
            post_error(&e);
            return;
        }
    };
    debug!("received {}", request.name());

    let mut state = shared.borrow_mut();
    let immediate = submit_with_config(&mut state.sequencer, request, config);
    let schedule = claim_tick(&mut state);
    drop(state);

    if let Some(response) = immediate {
        post_response(&response);
    }
    if schedule {
        schedule_tick(shared);
    }
}

/// Submit `request`, switching to `config` only if the request is
/// accepted. An invalid config rejects the whole message.
fn submit_with_config(
    sequencer: &mut Sequencer,
    request: Request,
    config: Option<FilterConfig>,
) -> Option<Response> {
    if let Some(Err(e)) = config.as_ref().map(FilterConfig::validate) {
        return Some(Response::error(e));
    }
    let immediate = sequencer.submit(request);
    if immediate.is_none()
        && let Some(config) = config
        && let Err(e) = sequencer.set_config(config)
    {
        return Some(Response::error(e));
    }
    immediate
}

/// Mark a tick as scheduled if there is work and none is scheduled yet.
fn claim_tick(state: &mut WorkerState) -> bool {
    if state.tick_scheduled || state.sequencer.pending().is_empty() {
        return false;
    }
    state.tick_scheduled = true;
    true
}

fn schedule_tick(shared: &Shared) {
    let shared = Rc::clone(shared);
    let callback = Closure::once_into_js(move || tick(&shared));
    if let Err(e) = worker_scope()
        .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), 0)
    {
        warn!("failed to schedule filter tick: {e:?}");
    }
}

/// Run the next job, post its result, and reschedule if more is pending.
fn tick(shared: &Shared) {
    let next = {
        let mut state = shared.borrow_mut();
        state.tick_scheduled = false;
        state
            .sequencer
            .next_job()
            .map(|job| (job, state.sequencer.config().clone()))
    };
    let Some((job, config)) = next else {
        return;
    };

    let (output, diagnostics) = run_job_with_diagnostics(&job, &config, &WebClock);
    debug!(
        "{} took {:.3}ms",
        diagnostics.op,
        diagnostics.duration.as_secs_f64() * 1000.0
    );

    let mut state = shared.borrow_mut();
    let response = state.sequencer.complete(job.ticket(), output);
    let schedule = claim_tick(&mut state);
    drop(state);

    if let Some(response) = response {
        post_response(&response);
    }
    if schedule {
        schedule_tick(shared);
    }
}

fn decode_message(data: &JsValue) -> Result<Incoming, FilterError> {
    let kind = get(data, "type")
        .as_string()
        .ok_or_else(|| FilterError::UnknownRequestType("message has no string `type`".into()))?;

    let request = match kind.as_str() {
        "init" => {
            let config = match get(data, "configJson").as_string() {
                Some(json) => Some(
                    serde_json::from_str::<FilterConfig>(&json)
                        .map_err(|e| FilterError::InvalidConfig(e.to_string()))?,
                ),
                None => None,
            };
            let request = Request::Init {
                pixel_bytes: pixel_bytes(&get(data, "pixelBytes"))?,
                width: number_field(data, "width")?,
                height: number_field(data, "height")?,
            };
            return Ok(Incoming { request, config });
        }
        "blur" => Request::Blur {
            blur_factor: number_field(data, "blurFactor")?,
        },
        "edgeDetect" => Request::EdgeDetect,
        "reset" | "resetOriginalImage" | "undoEdgeDetect" => Request::Reset,
        other => return Err(FilterError::UnknownRequestType(other.to_string())),
    };
    Ok(Incoming {
        request,
        config: None,
    })
}

fn get(data: &JsValue, key: &str) -> JsValue {
    js_sys::Reflect::get(data, &JsValue::from_str(key)).unwrap_or(JsValue::UNDEFINED)
}

fn pixel_bytes(value: &JsValue) -> Result<Vec<u8>, FilterError> {
    if let Some(bytes) = value.dyn_ref::<js_sys::Uint8ClampedArray>() {
        return Ok(bytes.to_vec());
    }
    if let Some(bytes) = value.dyn_ref::<js_sys::Uint8Array>() {
        return Ok(bytes.to_vec());
    }
    Err(FilterError::UnknownRequestType(
        "init: pixelBytes is not a byte array".into(),
    ))
}

/// A non-negative integer field, saturating at `u32::MAX`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn number_field(data: &JsValue, key: &str) -> Result<u32, FilterError> {
    let value = get(data, key)
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FilterError::UnknownRequestType(format!("`{key}` is not a number")))?;
    Ok(value.clamp(0.0, f64::from(u32::MAX)) as u32)
}

fn post_response(response: &Response) {
    match response {
        Response::Result(result) => post_result(result),
        Response::Error { error } => post_error(error),
    }
}

/// Post a filtered buffer, transferring its memory to the page.
fn post_result(result: &FilterResult) {
    let response = js_sys::Object::new();
    let set = |key: &str, val: &JsValue| {
        js_sys::Reflect::set(&response, &JsValue::from_str(key), val)
            .expect_throw("failed to set response field");
    };

    let op = match result.op {
        Some(FilterOp::Blur(factor)) => {
            set("blurFactor", &JsValue::from_f64(f64::from(factor.get())));
            "blur"
        }
        Some(FilterOp::EdgeDetect) => "edgeDetect",
        None => "reset",
    };
    let output = js_sys::Uint8ClampedArray::from(result.output.as_bytes());

    set("ok", &JsValue::from_bool(true));
    set("op", &JsValue::from_str(op));
    set("width", &JsValue::from_f64(f64::from(result.output.width())));
    set("height", &JsValue::from_f64(f64::from(result.output.height())));
    set("output", &output);

    let transfer = js_sys::Array::of1(&output.buffer());
    if let Err(e) = worker_scope().post_message_with_transfer(&response, &transfer) {
        warn!("failed to post {op} result: {e:?}");
    }
}

fn post_error(error: &FilterError) {
    let error_json = serde_json::to_string(error)
        .unwrap_or_else(|ser_err| format!("\"serialization error: {ser_err}\""));

    let response = js_sys::Object::new();
    let _ = js_sys::Reflect::set(
        &response,
        &JsValue::from_str("ok"),
        &JsValue::from_bool(false),
    );
    let _ = js_sys::Reflect::set(
        &response,
        &JsValue::from_str("errorJson"),
        &JsValue::from_str(&error_json),
    );

    if let Err(e) = worker_scope().post_message(&response) {
        warn!("failed to post error: {e:?}");
    }
}
