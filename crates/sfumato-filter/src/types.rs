//! Shared types for the sfumato filtering engine.

use serde::{Deserialize, Serialize};

/// Re-export `RgbaImage` so downstream crates can convert pixel buffers
/// without depending on `image` directly.
pub use image::RgbaImage;

/// Number of interleaved channels per pixel (R, G, B, A).
pub const CHANNELS: usize = 4;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Number of bytes an RGBA8 buffer with these dimensions occupies.
    ///
    /// Returns `None` when either side is zero or the product does not
    /// fit in `usize`.
    #[must_use]
    pub fn rgba_len(self) -> Option<usize> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        usize::try_from(self.width)
            .ok()?
            .checked_mul(usize::try_from(self.height).ok()?)?
            .checked_mul(CHANNELS)
    }

    /// Width as `usize` for indexing.
    #[must_use]
    pub const fn cols(self) -> usize {
        self.width as usize
    }

    /// Height as `usize` for indexing.
    #[must_use]
    pub const fn rows(self) -> usize {
        self.height as usize
    }
}

/// An owned RGBA8 pixel buffer, row-major with a top-left origin.
///
/// The byte length always equals `width * height * 4`; the only way to
/// build one is through [`PixelBuffer::new`] (or the conversions that
/// call it), which rejects anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    dimensions: Dimensions,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw RGBA bytes, validating the length invariant.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidBuffer`] if either dimension is zero,
    /// if `width * height * 4` overflows, or if `data.len()` differs from it.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FilterError> {
        let dimensions = Dimensions { width, height };
        match dimensions.rgba_len() {
            Some(expected) if expected == data.len() => Ok(Self { dimensions, data }),
            _ => Err(FilterError::InvalidBuffer {
                width,
                height,
                len: data.len(),
            }),
        }
    }

    /// Wrap kernel output whose length was computed from `dimensions`.
    pub(crate) fn from_kernel_output(dimensions: Dimensions, data: Vec<u8>) -> Self {
        debug_assert_eq!(dimensions.rgba_len(), Some(data.len()));
        Self { dimensions, data }
    }

    /// Build a buffer by evaluating `f` for every pixel.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidBuffer`] for zero or overflowing
    /// dimensions.
    pub fn from_fn(
        width: u32,
        height: u32,
        mut f: impl FnMut(u32, u32) -> [u8; 4],
    ) -> Result<Self, FilterError> {
        let dimensions = Dimensions { width, height };
        let len = dimensions.rgba_len().ok_or(FilterError::InvalidBuffer {
            width,
            height,
            len: 0,
        })?;
        let mut data = Vec::with_capacity(len);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        Ok(Self { dimensions, data })
    }

    /// Dimensions of the buffer.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.dimensions.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.dimensions.height
    }

    /// The raw RGBA bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer and return the raw RGBA bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// The RGBA value at `(x, y)`, or `None` when out of bounds.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let idx = (y as usize * self.dimensions.cols() + x as usize) * CHANNELS;
        let px = self.data.get(idx..idx + CHANNELS)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

impl TryFrom<RgbaImage> for PixelBuffer {
    type Error = FilterError;

    fn try_from(image: RgbaImage) -> Result<Self, Self::Error> {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height)
    }
}

impl From<PixelBuffer> for RgbaImage {
    fn from(buffer: PixelBuffer) -> Self {
        let Dimensions { width, height } = buffer.dimensions;
        // The length invariant makes `from_raw` infallible here; the
        // fallback keeps the conversion total without panicking.
        Self::from_raw(width, height, buffer.data).unwrap_or_else(|| Self::new(width, height))
    }
}

/// Serde proxy: `PixelBuffer` validates its invariant on deserialize.
#[derive(Serialize, Deserialize)]
struct PixelBufferProxy {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Serialize for PixelBuffer {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("PixelBufferProxy", 3)?;
        state.serialize_field("width", &self.dimensions.width)?;
        state.serialize_field("height", &self.dimensions.height)?;
        state.serialize_field("data", &self.data)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for PixelBuffer {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PixelBufferProxy::deserialize(deserializer)?;
        Self::new(proxy.data, proxy.width, proxy.height).map_err(serde::de::Error::custom)
    }
}

/// Blur strength chosen by the user, always within
/// [`BlurFactor::MIN`]..=[`BlurFactor::MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct BlurFactor(u32);

impl BlurFactor {
    /// Weakest blur; treated as an identity pass.
    pub const MIN: Self = Self(1);
    /// Strongest blur.
    pub const MAX: Self = Self(100);

    /// Create a blur factor, clamping `value` into the supported range.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Self(value.clamp(Self::MIN.0, Self::MAX.0))
    }

    /// The clamped factor.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Gaussian sigma for this factor under `config`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sigma(self, config: &FilterConfig) -> f32 {
        self.0 as f32 * config.sigma_per_factor
    }
}

impl From<u32> for BlurFactor {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<BlurFactor> for u32 {
    fn from(factor: BlurFactor) -> Self {
        factor.0
    }
}

/// A filter computation the engine can run against the image state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOp {
    /// Gaussian blur of the original image.
    Blur(BlurFactor),
    /// Sobel edge detection of the current base buffer.
    EdgeDetect,
}

impl FilterOp {
    /// The payload-less kind, used to decide which pending requests a
    /// newer request supersedes.
    #[must_use]
    pub const fn kind(self) -> FilterKind {
        match self {
            Self::Blur(_) => FilterKind::Blur,
            Self::EdgeDetect => FilterKind::EdgeDetect,
        }
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blur(factor) => write!(f, "blur({})", factor.get()),
            Self::EdgeDetect => f.write_str("edge-detect"),
        }
    }
}

/// Discriminant of [`FilterOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterKind {
    /// See [`FilterOp::Blur`].
    Blur,
    /// See [`FilterOp::EdgeDetect`].
    EdgeDetect,
}

/// Tunable numeric parameters of the filter kernels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Gaussian sigma contributed by each unit of blur factor.
    pub sigma_per_factor: f32,
}

impl FilterConfig {
    /// Default for [`sigma_per_factor`](Self::sigma_per_factor):
    /// factor 5 blurs with sigma 1.
    pub const DEFAULT_SIGMA_PER_FACTOR: f32 = 0.2;

    /// Check that `sigma_per_factor` is finite and positive.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidConfig`] describing the bad value.
    pub fn validate(&self) -> Result<(), FilterError> {
        let value = self.sigma_per_factor;
        if !value.is_finite() || value <= 0.0 {
            return Err(FilterError::InvalidConfig(format!(
                "sigma_per_factor must be finite and positive, got {value}"
            )));
        }
        Ok(())
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            sigma_per_factor: Self::DEFAULT_SIGMA_PER_FACTOR,
        }
    }
}

/// Errors surfaced by a single request/response cycle.
///
/// None of these terminate the worker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum FilterError {
    /// The pixel byte length does not equal `width * height * 4`, or a
    /// dimension is zero.
    #[error("pixel buffer of {len} bytes does not match a {width}x{height} RGBA image")]
    InvalidBuffer {
        /// Claimed width.
        width: u32,
        /// Claimed height.
        height: u32,
        /// Actual byte length supplied.
        len: usize,
    },

    /// A filter request arrived before any image was loaded.
    #[error("no image loaded; send an init request first")]
    NoImageLoaded,

    /// The transport received a message it could not decode.
    #[error("unknown request type: {0}")]
    UnknownRequestType(String),

    /// Filter configuration is invalid.
    #[error("invalid filter configuration: {0}")]
    InvalidConfig(String),

    /// A computation failed unexpectedly. Only that request is lost.
    #[error("filter computation failed: {0}")]
    ComputationFailed(String),
}
