//! Request and response messages exchanged with a filtering worker.
//!
//! [`Request`] is a closed sum type so every transport handles all four
//! operations exhaustively. The serde representation is internally
//! tagged by `"type"` with camelCase tags (`init`, `blur`, `edgeDetect`,
//! `reset`). `resetOriginalImage` and `undoEdgeDetect` are accepted as
//! aliases of `reset`.

use serde::{Deserialize, Serialize};

use crate::types::{BlurFactor, Dimensions, FilterError, FilterOp, PixelBuffer};

/// A message sent to the worker.
///
/// Requests are taken by value: the sender gives up its pixel bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    /// Replace the original image and discard all filtering.
    Init {
        /// RGBA8 bytes, row-major, top-left origin.
        pixel_bytes: Vec<u8>,
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },
    /// Blur the original image. Factors outside 1..=100 are clamped.
    Blur {
        /// Blur strength.
        blur_factor: u32,
    },
    /// Detect edges in the current base buffer.
    EdgeDetect,
    /// Discard all filtering and return to the original image.
    #[serde(alias = "resetOriginalImage", alias = "undoEdgeDetect")]
    Reset,
}

impl Request {
    /// The filter computation this request asks for, if any.
    #[must_use]
    pub fn filter_op(&self) -> Option<FilterOp> {
        match self {
            Self::Blur { blur_factor } => Some(FilterOp::Blur(BlurFactor::new(*blur_factor))),
            Self::EdgeDetect => Some(FilterOp::EdgeDetect),
            Self::Init { .. } | Self::Reset => None,
        }
    }

    /// Short name for log lines; never includes pixel data.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Blur { .. } => "blur",
            Self::EdgeDetect => "edgeDetect",
            Self::Reset => "reset",
        }
    }
}

/// A freshly computed buffer handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterResult {
    /// The filter that produced `output`, or `None` when this answers a
    /// reset with a copy of the original image.
    pub op: Option<FilterOp>,
    /// The computed pixels. Owned by the receiver; the worker keeps no
    /// alias to them.
    pub output: PixelBuffer,
}

impl FilterResult {
    /// Dimensions of [`output`](Self::output).
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.output.dimensions()
    }
}

/// A message emitted by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Response {
    /// A computed (or restored) image.
    Result(FilterResult),
    /// The request failed; the worker keeps running.
    Error {
        /// What went wrong.
        error: FilterError,
    },
}

impl Response {
    /// Wrap an error.
    #[must_use]
    pub const fn error(error: FilterError) -> Self {
        Self::Error { error }
    }

    /// The result, if this is one.
    #[must_use]
    pub const fn as_result(&self) -> Option<&FilterResult> {
        match self {
            Self::Result(result) => Some(result),
            Self::Error { .. } => None,
        }
    }
}
