//! Plain-text extraction from uploaded documents.
//!
//! PDFs are read page by page with `lopdf`. PNG and JPEG scans, and any
//! other binary content, yield no text since there is no OCR stage.
//! Everything else is decoded as lossy UTF-8. Extraction never fails the
//! pipeline: on total failure the extractor returns an empty string and
//! logs the cause.

use lopdf::Document;
use tracing::{debug, warn};

use crate::error::{Result, VeriquickError};

const PDF_MAGIC: &[u8] = b"%PDF-";
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];

/// Bytes inspected when deciding whether content is text.
const SNIFF_LEN: usize = 4096;

/// Returns `true` when the bytes or the MIME hint identify a PDF.
pub fn is_pdf(bytes: &[u8], mime_hint: Option<&str>) -> bool {
    let hinted = mime_hint
        .map(|m| m.trim().eq_ignore_ascii_case("application/pdf"))
        .unwrap_or(false);
    hinted || bytes.starts_with(PDF_MAGIC)
}

/// Returns `true` when the bytes start with a PNG or JPEG signature.
pub fn is_image(bytes: &[u8]) -> bool {
    bytes.starts_with(PNG_MAGIC) || bytes.starts_with(JPEG_MAGIC)
}

/// Compressed or encoded data is dense in control bytes; text has almost none.
fn looks_binary(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(SNIFF_LEN)];
    let control = sample
        .iter()
        .filter(|&&b| (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c)) || b == 0x7f)
        .count();
    control * 50 > sample.len()
}

/// Extracts text from a document byte stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Best-effort extraction. Returns `""` when nothing can be read.
    pub fn extract(&self, bytes: &[u8], mime_hint: Option<&str>) -> String {
        if is_pdf(bytes, mime_hint) {
            match self.extract_pdf(bytes) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "PDF extraction failed, continuing with empty text");
                    String::new()
                }
            }
        } else if is_image(bytes) || looks_binary(bytes) {
            debug!(bytes = bytes.len(), hint = ?mime_hint, "Binary content, no text to extract");
            String::new()
        } else {
            decode_lossy(bytes)
        }
    }

    /// Concatenates per-page text in page order.
    ///
    /// A page without extractable text contributes an empty string; only a
    /// document that cannot be parsed at all is an error.
    pub fn extract_pdf(&self, bytes: &[u8]) -> Result<String> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| VeriquickError::ExtractionFailure(format!("Failed to load PDF: {e}")))?;

        // get_pages() is a BTreeMap keyed by page number, so iteration is ordered
        let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
        debug!(pages = pages.len(), "Loaded PDF");

        let texts: Vec<String> = pages
            .iter()
            .map(|&page| match doc.extract_text(&[page]) {
                Ok(text) => text,
                Err(e) => {
                    debug!(page, error = %e, "No extractable text on page");
                    String::new()
                }
            })
            .collect();

        Ok(texts.join("\n"))
    }
}

/// Permissive decode: invalid sequences become U+FFFD, NULs are dropped.
fn decode_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| *c != '\0')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a PDF with one page per entry in `pages`.
    fn make_test_pdf(pages: &[&str]) -> Vec<u8> {
        use lopdf::dictionary;
        use lopdf::{Object, Stream};

        let mut doc = Document::with_version("1.4");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = if text.is_empty() {
                String::new()
            } else {
                format!("BT /F1 12 Tf 100 700 Td ({text}) Tj ET")
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn extracts_text_from_digital_pdf() {
        let pdf = make_test_pdf(&["Aadhaar 1234 5678 9123"]);
        let text = TextExtractor::new().extract(&pdf, Some("application/pdf"));
        assert!(text.contains("1234 5678 9123"), "got: {text}");
    }

    #[test]
    fn pages_are_concatenated_in_order() {
        let pdf = make_test_pdf(&["first page", "second page"]);
        let text = TextExtractor::new().extract_pdf(&pdf).unwrap();
        let first = text.find("first").expect("first page text");
        let second = text.find("second").expect("second page text");
        assert!(first < second);
    }

    #[test]
    fn blank_page_does_not_fail_extraction() {
        let pdf = make_test_pdf(&["", "ABCDE1234F"]);
        let text = TextExtractor::new().extract_pdf(&pdf).unwrap();
        assert!(text.contains("ABCDE1234F"));
    }

    #[test]
    fn magic_bytes_detect_pdf_without_hint() {
        assert!(is_pdf(b"%PDF-1.7\n...", None));
        assert!(is_pdf(b"anything", Some("Application/PDF")));
        assert!(!is_pdf(b"plain text", Some("text/plain")));
    }

    #[test]
    fn corrupt_pdf_degrades_to_empty_text() {
        let text = TextExtractor::new().extract(b"%PDF-1.4 garbage", None);
        assert_eq!(text, "");
    }

    fn encoded(format: image::ImageFormat) -> Vec<u8> {
        let img = image::RgbImage::from_fn(120, 80, |x, y| {
            image::Rgb([(x * 2) as u8, (y * 3) as u8, ((x ^ y) * 5) as u8])
        });
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), format)
            .unwrap();
        buf
    }

    #[test]
    fn image_scans_yield_no_text() {
        let png = encoded(image::ImageFormat::Png);
        let jpeg = encoded(image::ImageFormat::Jpeg);
        assert!(is_image(&png) && is_image(&jpeg));

        let extractor = TextExtractor::new();
        assert_eq!(extractor.extract(&png, Some("image/png")), "");
        assert_eq!(extractor.extract(&jpeg, None), "");
    }

    #[test]
    fn unsignatured_binary_yields_no_text() {
        let noise: Vec<u8> = (0..2048u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
        assert_eq!(TextExtractor::new().extract(&noise, Some("image/jpeg")), "");
    }

    #[test]
    fn non_pdf_bytes_are_decoded_lossily() {
        let bytes = b"Name: X\n1234 5678 9123\n\xff\xfe";
        let text = TextExtractor::new().extract(bytes, Some("image/png"));
        assert!(text.starts_with("Name: X\n1234 5678 9123\n"));
        assert!(text.contains('\u{FFFD}'));
    }
}
