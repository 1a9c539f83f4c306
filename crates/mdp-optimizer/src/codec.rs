//! Image codec capability
//!
//! Pixel work lives behind [`ImageCodec`]. Implementations are synchronous and
//! run on the blocking pool.

use crate::format::ImageFormat;
use mdp_model::{ErrorKind, Failure};
use serde::{Deserialize, Serialize};

/// Parameters of one transform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformParams {
    /// Output encoding
    pub format: ImageFormat,
    /// Encoder quality, 1..=100
    pub quality: u8,
    /// Width bound (aspect ratio preserved)
    pub max_width: Option<u32>,
    /// Height bound (aspect ratio preserved)
    pub max_height: Option<u32>,
}

impl TransformParams {
    /// Re-encode without resizing
    #[must_use]
    pub fn new(format: ImageFormat, quality: u8) -> Self {
        Self {
            format,
            quality,
            max_width: None,
            max_height: None,
        }
    }

    /// Bound the longer side
    #[inline]
    #[must_use]
    pub fn with_max_dimension(mut self, max: u32) -> Self {
        self.max_width = Some(max);
        self.max_height = Some(max);
        self
    }

    /// Fit into a box
    #[inline]
    #[must_use]
    pub fn with_bounds(mut self, width: u32, height: u32) -> Self {
        self.max_width = Some(width);
        self.max_height = Some(height);
        self
    }
}

/// Encoded output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Encoded bytes
    pub bytes: Vec<u8>,
    /// Output width in pixels (0 when unknown)
    pub width: u32,
    /// Output height in pixels (0 when unknown)
    pub height: u32,
}

/// Codec failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Input could not be decoded
    #[error("cannot decode image: {0}")]
    Decode(String),

    /// Output could not be encoded
    #[error("cannot encode image: {0}")]
    Encode(String),

    /// Parameters rejected before any work
    #[error("invalid transform parameters: {0}")]
    InvalidParams(String),
}

impl CodecError {
    /// Failure classification
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::LocalInput
    }

    /// Convert into the shared failure record
    #[must_use]
    pub fn to_failure(&self) -> Failure {
        Failure::new(self.kind(), self.to_string())
    }
}

/// Pixel transform
pub trait ImageCodec: Send + Sync {
    /// Decode `input`, apply `params`, encode
    ///
    /// # Errors
    /// [`CodecError`] when the input is not an image or cannot be encoded
    fn transform(&self, input: &[u8], params: &TransformParams) -> Result<EncodedImage, CodecError>;
}

/// Codec that passes bytes through untouched
///
/// Lets the pipeline run where no encoder is wired in. Dimensions are
/// reported as unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl ImageCodec for IdentityCodec {
    fn transform(&self, input: &[u8], _params: &TransformParams) -> Result<EncodedImage, CodecError> {
        if input.is_empty() {
            return Err(CodecError::Decode("empty input".to_string()));
        }
        Ok(EncodedImage {
            bytes: input.to_vec(),
            width: 0,
            height: 0,
        })
    }
}
