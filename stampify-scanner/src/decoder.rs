//! Frame and image decoding
//!
//! One decode attempt looks for at most one QR code. "No code visible" is the
//! normal steady state while scanning and is reported as `None`, never as an
//! error. Only undecodable image files (upload mode) produce `DecodeError`.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

/// 8-bit greyscale frame, row-major, `width * height` bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: usize,
    height: usize,
    luma: Vec<u8>,
}

impl Frame {
    /// Wrap a luma buffer; fails if the buffer size does not match the dimensions
    pub fn from_luma(width: usize, height: usize, luma: Vec<u8>) -> Result<Self, DecodeError> {
        if width == 0 || height == 0 {
            return Err(DecodeError::InvalidFrame(format!(
                "empty frame {}x{}",
                width, height
            )));
        }
        let expected = width
            .checked_mul(height)
            .ok_or_else(|| DecodeError::InvalidFrame("frame dimensions overflow".to_string()))?;
        if luma.len() != expected {
            return Err(DecodeError::InvalidFrame(format!(
                "expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                luma.len()
            )));
        }
        Ok(Self {
            width,
            height,
            luma,
        })
    }

    /// Decode an uploaded PNG/JPEG into a greyscale frame
    pub fn from_image_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| DecodeError::UnreadableImage(e.to_string()))?
            .to_luma8();
        let (width, height) = image.dimensions();
        Self::from_luma(width as usize, height as usize, image.into_raw())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn pixel(&self, x: usize, y: usize) -> u8 {
        self.luma[y * self.width + x]
    }
}

/// Pixel coordinate in frame space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Successful decode: payload text plus the code's corner points
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedCode {
    pub text: String,
    pub corners: [Point; 4],
}

impl DecodedCode {
    pub fn corner_tuples(&self) -> [(i32, i32); 4] {
        self.corners.map(|p| (p.x, p.y))
    }
}

/// Decode failures that are not "no code in view"
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Unreadable image: {0}")]
    UnreadableImage(String),

    #[error("Decoder worker failed: {0}")]
    Worker(String),
}

/// Locates and decodes one machine-readable code per call
pub trait CodeDecoder: Send + Sync {
    fn decode(&self, frame: &Frame) -> Option<DecodedCode>;
}

/// QR decoder backed by `rqrr`
#[derive(Debug, Default, Clone, Copy)]
pub struct QrDecoder;

impl QrDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl CodeDecoder for QrDecoder {
    fn decode(&self, frame: &Frame) -> Option<DecodedCode> {
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(frame.width, frame.height, |x, y| {
                frame.pixel(x, y)
            });

        let grids = prepared.detect_grids();
        trace!(grids = grids.len(), "QR grid detection");

        // first grid that decodes wins; damaged grids are skipped
        grids.iter().find_map(|grid| match grid.decode() {
            Ok((_meta, text)) => Some(DecodedCode {
                text,
                corners: grid.bounds.map(|p| Point { x: p.x, y: p.y }),
            }),
            Err(e) => {
                debug!("QR grid found but not decodable: {:?}", e);
                None
            }
        })
    }
}

/// Upload mode: decode one static image
///
/// `Ok(None)` means the image was readable but holds no code; the caller
/// reports "no code detected" and stops.
pub fn decode_image(
    decoder: &dyn CodeDecoder,
    bytes: &[u8],
) -> Result<Option<DecodedCode>, DecodeError> {
    let frame = Frame::from_image_bytes(bytes)?;
    Ok(decoder.decode(&frame))
}
