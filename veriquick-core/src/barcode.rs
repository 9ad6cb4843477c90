//! QR symbol encoding and decoding.
//!
//! Encoding goes through `qrcode` and is rendered by hand so that module
//! size and quiet-zone width are both caller controlled. Decoding uses
//! `rqrr` on a greyscale copy of the frame. Oversized frames are tried
//! downscaled first and at full resolution when that finds nothing.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::{Color, QrCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{Result, VeriquickError};

/// Frames larger than this (either side) are first decoded downscaled.
pub const DEFAULT_MAX_DECODE_DIMENSION: u32 = 1280;

/// QR error-correction level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EcLevel {
    /// ~7% recovery
    #[default]
    L,
    /// ~15% recovery
    M,
    /// ~25% recovery
    Q,
    /// ~30% recovery
    H,
}

impl EcLevel {
    /// Byte-mode capacity of a version 40 symbol at this level.
    pub const fn max_payload_bytes(self) -> usize {
        match self {
            Self::L => 2953,
            Self::M => 2331,
            Self::Q => 1663,
            Self::H => 1273,
        }
    }

    /// Fails with `PayloadTooLarge` when `size` bytes cannot fit.
    pub fn check_capacity(self, size: usize) -> Result<()> {
        let max = self.max_payload_bytes();
        if size > max {
            return Err(VeriquickError::PayloadTooLarge {
                size,
                max,
                level: self,
            });
        }
        Ok(())
    }

    fn to_qrcode(self) -> qrcode::EcLevel {
        match self {
            Self::L => qrcode::EcLevel::L,
            Self::M => qrcode::EcLevel::M,
            Self::Q => qrcode::EcLevel::Q,
            Self::H => qrcode::EcLevel::H,
        }
    }
}

impl fmt::Display for EcLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::L => "L",
            Self::M => "M",
            Self::Q => "Q",
            Self::H => "H",
        };
        f.write_str(s)
    }
}

impl FromStr for EcLevel {
    type Err = VeriquickError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L" | "LOW" => Ok(Self::L),
            "M" | "MEDIUM" => Ok(Self::M),
            "Q" | "QUARTILE" => Ok(Self::Q),
            "H" | "HIGH" => Ok(Self::H),
            other => Err(VeriquickError::Image(format!(
                "Unknown error-correction level '{other}' (expected L, M, Q or H)"
            ))),
        }
    }
}

/// Rendering parameters for generated symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarcodeOptions {
    pub level: EcLevel,
    /// Pixels per module
    pub module_size: u32,
    /// Quiet zone width in modules
    pub border: u32,
}

impl Default for BarcodeOptions {
    fn default() -> Self {
        Self {
            level: EcLevel::L,
            module_size: 10,
            border: 4,
        }
    }
}

/// Encodes payloads into QR images and reads them back from frames.
#[derive(Debug, Clone)]
pub struct BarcodeCodec {
    options: BarcodeOptions,
    max_decode_dimension: u32,
}

impl Default for BarcodeCodec {
    fn default() -> Self {
        Self::new(BarcodeOptions::default())
    }
}

impl BarcodeCodec {
    pub fn new(options: BarcodeOptions) -> Self {
        Self {
            options,
            max_decode_dimension: DEFAULT_MAX_DECODE_DIMENSION,
        }
    }

    pub fn with_max_decode_dimension(mut self, dimension: u32) -> Self {
        self.max_decode_dimension = dimension.max(64);
        self
    }

    pub fn options(&self) -> BarcodeOptions {
        self.options
    }

    /// Render `payload` with this codec's options.
    pub fn encode(&self, payload: &str) -> Result<GrayImage> {
        encode(
            payload,
            self.options.level,
            self.options.module_size,
            self.options.border,
        )
    }

    /// Render `payload` and return PNG bytes.
    pub fn encode_png(&self, payload: &str) -> Result<Vec<u8>> {
        let image = self.encode(payload)?;
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(image)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| VeriquickError::Image(format!("Failed to write PNG: {e}")))?;
        Ok(buf)
    }

    /// First complete symbol found in the frame, or `None`.
    #[instrument(level = "debug", skip_all, fields(width = frame.width(), height = frame.height()))]
    pub fn decode(&self, frame: &DynamicImage) -> Option<String> {
        let max = self.max_decode_dimension;
        if frame.width() > max || frame.height() > max {
            let scaled = frame.resize(max, max, FilterType::Triangle).to_luma8();
            if let Some(content) = decode_luma(&scaled) {
                return Some(content);
            }
            // Dense symbols lose their modules when shrunk
            debug!("Nothing found downscaled, retrying at full resolution");
        }
        decode_luma(&frame.to_luma8())
    }

    /// Decode from encoded image bytes (PNG, JPEG).
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<Option<String>> {
        let frame = image::load_from_memory(bytes)
            .map_err(|e| VeriquickError::Image(format!("Failed to read image: {e}")))?;
        Ok(self.decode(&frame))
    }
}

fn decode_luma(luma: &GrayImage) -> Option<String> {
    let (w, h) = luma.dimensions();
    let mut prepared =
        rqrr::PreparedImage::prepare_from_greyscale(w as usize, h as usize, |x, y| {
            luma.get_pixel(x as u32, y as u32).0[0]
        });

    for grid in prepared.detect_grids() {
        match grid.decode() {
            Ok((_meta, content)) => return Some(content),
            Err(e) => debug!(error = %e, "Symbol found but not decodable"),
        }
    }
    None
}

/// Render `payload` as a QR symbol.
///
/// Capacity is checked before the symbol is built, so an oversized payload
/// fails with `PayloadTooLarge` without producing any pixels.
pub fn encode(payload: &str, level: EcLevel, module_size: u32, border: u32) -> Result<GrayImage> {
    level.check_capacity(payload.len())?;
    if module_size == 0 {
        return Err(VeriquickError::Image("module size must be at least 1".into()));
    }

    let code = QrCode::with_error_correction_level(payload.as_bytes(), level.to_qrcode())
        .map_err(|e| match e {
            qrcode::types::QrError::DataTooLong => VeriquickError::PayloadTooLarge {
                size: payload.len(),
                max: level.max_payload_bytes(),
                level,
            },
            other => VeriquickError::Image(format!("QR generation failed: {other}")),
        })?;

    let modules = code.width() as u32;
    let colors = code.to_colors();
    let side = (modules + 2 * border) * module_size;

    let image = GrayImage::from_fn(side, side, |px, py| {
        let mx = (px / module_size) as i64 - border as i64;
        let my = (py / module_size) as i64 - border as i64;
        let inside = mx >= 0 && my >= 0 && (mx as u32) < modules && (my as u32) < modules;
        if inside && colors[my as usize * modules as usize + mx as usize] == Color::Dark {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    });

    debug!(
        payload_bytes = payload.len(),
        modules,
        side,
        level = %level,
        "Rendered QR symbol"
    );
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_codec(level: EcLevel) -> BarcodeCodec {
        BarcodeCodec::new(BarcodeOptions {
            level,
            module_size: 4,
            border: 4,
        })
    }

    #[test]
    fn encode_then_decode_returns_payload() {
        let payload = r#"{"files":[{"document_url":"https://x/a","document_type":"Aadhaar","aadhaar_numbers":["1234 5678 9123"],"pan_numbers":[]}]}"#;
        let codec = small_codec(EcLevel::M);
        let image = codec.encode(payload).unwrap();
        let decoded = codec.decode(&DynamicImage::ImageLuma8(image));
        assert_eq!(decoded.as_deref(), Some(payload));
    }

    #[test]
    fn png_round_trip() {
        let codec = small_codec(EcLevel::L);
        let png = codec.encode_png("hello veriquick").unwrap();
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
        assert_eq!(
            codec.decode_bytes(&png).unwrap().as_deref(),
            Some("hello veriquick")
        );
    }

    #[test]
    fn image_size_follows_module_and_border() {
        let image = encode("abc", EcLevel::L, 3, 2).unwrap();
        // "abc" fits a version 1 symbol: 21 modules
        assert_eq!(image.width(), (21 + 4) * 3);
        assert_eq!(image.get_pixel(0, 0).0[0], 255);
        // top-left finder pattern starts right after the quiet zone
        assert_eq!(image.get_pixel(2 * 3, 2 * 3).0[0], 0);
    }

    #[test]
    fn oversized_payload_is_rejected_before_rendering() {
        let payload = "x".repeat(EcLevel::H.max_payload_bytes() + 1);
        let err = encode(&payload, EcLevel::H, 10, 4).unwrap_err();
        match err {
            VeriquickError::PayloadTooLarge { size, max, level } => {
                assert_eq!(size, 1274);
                assert_eq!(max, 1273);
                assert_eq!(level, EcLevel::H);
            }
            other => panic!("unexpected error: {other}"),
        }
        // The same payload fits at level L
        assert!(EcLevel::L.check_capacity(payload.len()).is_ok());
    }

    #[test]
    fn blank_frame_has_no_payload() {
        let frame = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 200, Luma([255])));
        assert_eq!(BarcodeCodec::default().decode(&frame), None);
    }

    #[test]
    fn large_frames_are_downscaled_before_decoding() {
        let codec = BarcodeCodec::new(BarcodeOptions {
            level: EcLevel::L,
            module_size: 40,
            border: 4,
        })
        .with_max_decode_dimension(400);
        let image = codec.encode("scaled").unwrap();
        assert!(image.width() > 400);
        assert_eq!(
            codec.decode(&DynamicImage::ImageLuma8(image)).as_deref(),
            Some("scaled")
        );
    }

    #[test]
    fn default_codec_reads_near_capacity_symbols_at_every_level() {
        let reader = BarcodeCodec::default();
        for level in [EcLevel::L, EcLevel::M, EcLevel::Q, EcLevel::H] {
            let len = level.max_payload_bytes() - 8;
            let payload: String = "veriquick-manifest-0123456789"
                .chars()
                .cycle()
                .take(len)
                .collect();
            let writer = BarcodeCodec::new(BarcodeOptions {
                level,
                ..Default::default()
            });
            let png = writer.encode_png(&payload).unwrap();
            assert_eq!(
                reader.decode_bytes(&png).unwrap().as_deref(),
                Some(payload.as_str()),
                "level {level}"
            );
        }
    }

    #[test]
    fn parses_levels() {
        assert_eq!("q".parse::<EcLevel>().unwrap(), EcLevel::Q);
        assert_eq!("High".parse::<EcLevel>().unwrap(), EcLevel::H);
        assert!("Z".parse::<EcLevel>().is_err());
    }

    #[test]
    fn zero_module_size_is_an_error() {
        assert!(matches!(
            encode("abc", EcLevel::L, 0, 4),
            Err(VeriquickError::Image(_))
        ));
    }
}
