//! Filter engine: binds each [`FilterOp`] to its kernel and its base
//! buffer.
//!
//! A blur always starts from the original image, since the slider value
//! is absolute rather than cumulative. Edge detection reads the current
//! base, so edges of a blurred image are available without the caller
//! resending pixels.

use std::sync::Arc;

use crate::blur;
use crate::edge;
use crate::state::ImageState;
use crate::types::{FilterConfig, FilterError, FilterOp, PixelBuffer};

/// Select the buffer `op` reads from.
///
/// # Errors
///
/// Returns [`FilterError::NoImageLoaded`] before the first `init`.
pub fn base_for(op: FilterOp, state: &ImageState) -> Result<Arc<PixelBuffer>, FilterError> {
    match op {
        FilterOp::Blur(_) => state.original(),
        FilterOp::EdgeDetect => state.current_base(),
    }
}

/// Run `op` over `base`. Pure; safe to call from any thread.
#[must_use = "returns the filtered image"]
pub fn compute(op: FilterOp, base: &PixelBuffer, config: &FilterConfig) -> PixelBuffer {
    match op {
        FilterOp::Blur(factor) => blur::gaussian_blur(base, factor, config),
        FilterOp::EdgeDetect => edge::sobel_edge_detect(base),
    }
}

/// Apply `op` to `state` synchronously: select the base, compute, and
/// store the output as the new derived buffer.
///
/// Returns an owned copy of the output; the state keeps its own.
///
/// # Errors
///
/// Returns [`FilterError::NoImageLoaded`] before the first `init`.
pub fn apply(
    op: FilterOp,
    state: &mut ImageState,
    config: &FilterConfig,
) -> Result<PixelBuffer, FilterError> {
    let base = base_for(op, state)?;
    let output = compute(op, &base, config);
    state.set_derived(Arc::new(output.clone()));
    Ok(output)
}
