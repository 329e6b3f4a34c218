//! The image state held by a filtering worker.
//!
//! [`ImageState`] owns the original image, the most recent filter
//! output (the "derived" buffer) and their shared dimensions. Buffers are
//! stored behind [`Arc`] so a running job can read its base without a
//! copy while the state stays the only writer.

use std::sync::Arc;

use crate::types::{Dimensions, FilterError, PixelBuffer};

/// Per-worker pixel state. Starts empty.
#[derive(Debug, Default)]
pub struct ImageState {
    original: Option<Arc<PixelBuffer>>,
    derived: Option<Arc<PixelBuffer>>,
}

impl ImageState {
    /// Create an empty state with no image loaded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a new original image and drop any derived buffer.
    ///
    /// This is the only operation that changes the dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidBuffer`] if `pixels.len()` is not
    /// `width * height * 4`; the existing state is left untouched.
    pub fn init(&mut self, pixels: Vec<u8>, width: u32, height: u32) -> Result<(), FilterError> {
        let buffer = PixelBuffer::new(pixels, width, height)?;
        self.original = Some(Arc::new(buffer));
        self.derived = None;
        Ok(())
    }

    /// Whether an original image has been loaded.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.original.is_some()
    }

    /// Dimensions shared by the original and derived buffers.
    #[must_use]
    pub fn dimensions(&self) -> Option<Dimensions> {
        self.original.as_deref().map(PixelBuffer::dimensions)
    }

    /// The original image.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::NoImageLoaded`] before the first `init`.
    pub fn original(&self) -> Result<Arc<PixelBuffer>, FilterError> {
        self.original.clone().ok_or(FilterError::NoImageLoaded)
    }

    /// The buffer the next chained operation reads: the derived buffer
    /// if one exists, otherwise the original.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::NoImageLoaded`] before the first `init`.
    pub fn current_base(&self) -> Result<Arc<PixelBuffer>, FilterError> {
        self.derived
            .clone()
            .or_else(|| self.original.clone())
            .ok_or(FilterError::NoImageLoaded)
    }

    /// Whether a derived buffer is currently stored.
    #[must_use]
    pub const fn has_derived(&self) -> bool {
        self.derived.is_some()
    }

    /// Store a filter result as the base for subsequent chained
    /// operations.
    ///
    /// Returns `false` (and stores nothing) when no image is loaded or
    /// the buffer's dimensions differ from the original's.
    pub fn set_derived(&mut self, buffer: Arc<PixelBuffer>) -> bool {
        if self.dimensions() != Some(buffer.dimensions()) {
            return false;
        }
        self.derived = Some(buffer);
        true
    }

    /// Discard all filtering so [`current_base`](Self::current_base)
    /// returns the original again. A no-op when nothing is loaded.
    pub fn reset(&mut self) {
        self.derived = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> PixelBuffer {
        PixelBuffer::from_fn(width, height, |_, _| rgba).unwrap()
    }

    #[test]
    fn empty_state_has_no_base() {
        let state = ImageState::new();
        assert!(!state.is_loaded());
        assert_eq!(state.current_base().unwrap_err(), FilterError::NoImageLoaded);
        assert_eq!(state.dimensions(), None);
    }

    #[test]
    fn init_sets_original_and_dimensions() {
        let mut state = ImageState::new();
        state.init(vec![1; 2 * 3 * 4], 2, 3).unwrap();
        assert_eq!(state.dimensions(), Some(Dimensions { width: 2, height: 3 }));
        assert_eq!(state.current_base().unwrap().as_bytes(), &[1; 24]);
    }

    #[test]
    fn invalid_init_leaves_prior_state() {
        let mut state = ImageState::new();
        state.init(vec![5; 4], 1, 1).unwrap();
        let err = state.init(vec![0; 7], 2, 1).unwrap_err();
        assert!(matches!(err, FilterError::InvalidBuffer { .. }));
        assert_eq!(state.dimensions(), Some(Dimensions { width: 1, height: 1 }));
        assert_eq!(state.current_base().unwrap().as_bytes(), &[5; 4]);
    }

    #[test]
    fn derived_becomes_base_until_reset() {
        let mut state = ImageState::new();
        state.init(vec![0; 16], 2, 2).unwrap();
        assert!(state.set_derived(Arc::new(solid(2, 2, [9, 9, 9, 9]))));
        assert!(state.has_derived());
        assert_eq!(state.current_base().unwrap().pixel(0, 0), Some([9, 9, 9, 9]));

        state.reset();
        assert!(!state.has_derived());
        assert_eq!(state.current_base().unwrap().pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn init_clears_derived() {
        let mut state = ImageState::new();
        state.init(vec![0; 16], 2, 2).unwrap();
        state.set_derived(Arc::new(solid(2, 2, [9, 9, 9, 9])));
        state.init(vec![3; 4], 1, 1).unwrap();
        assert!(!state.has_derived());
        assert_eq!(state.current_base().unwrap().as_bytes(), &[3; 4]);
    }

    #[test]
    fn set_derived_rejects_mismatched_dimensions() {
        let mut state = ImageState::new();
        assert!(!state.set_derived(Arc::new(solid(1, 1, [0; 4]))));

        state.init(vec![0; 16], 2, 2).unwrap();
        assert!(!state.set_derived(Arc::new(solid(3, 3, [0; 4]))));
        assert!(!state.has_derived());
    }

    #[test]
    fn reset_without_image_is_noop() {
        let mut state = ImageState::new();
        state.reset();
        assert!(!state.is_loaded());
    }

    #[test]
    fn original_never_mutated_by_derived() {
        let mut state = ImageState::new();
        state.init(vec![7; 16], 2, 2).unwrap();
        state.set_derived(Arc::new(solid(2, 2, [1, 1, 1, 1])));
        assert_eq!(state.original().unwrap().as_bytes(), &[7; 16]);
    }
}
