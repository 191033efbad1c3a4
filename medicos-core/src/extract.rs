//! Plain-text extraction from uploaded reports.
//!
//! Workflow per format:
//! * PDF: structural text extraction; scanned PDFs without a text layer are
//!   rendered to page images and sent through OCR.
//! * Image: decoded, re-encoded as PNG, sent through OCR.
//! * Anything else: read verbatim as UTF-8.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use pdf2image::{PDF, Pages};
use tracing::{info, warn};

use crate::error::ExtractionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
}

/// Format of an uploaded document, resolved before extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Image(ImageKind),
    PlainText,
}

impl DocumentFormat {
    /// Resolves the format from the declared content type, falling back to
    /// the file extension. Unknown formats are treated as plain text.
    pub fn resolve(path: &Path, content_type: Option<&str>) -> Self {
        content_type
            .and_then(Self::from_content_type)
            .or_else(|| Self::from_extension(path))
            .unwrap_or(Self::PlainText)
    }

    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/pdf" => Some(Self::Pdf),
            "image/png" => Some(Self::Image(ImageKind::Png)),
            "image/jpeg" | "image/jpg" => Some(Self::Image(ImageKind::Jpeg)),
            _ => None,
        }
    }

    pub fn from_extension(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "png" => Some(Self::Image(ImageKind::Png)),
            "jpg" | "jpeg" => Some(Self::Image(ImageKind::Jpeg)),
            _ => None,
        }
    }
}

/// PNG-encoded page handed to an OCR engine.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub png: Vec<u8>,
}

impl PageImage {
    pub fn from_image(image: &DynamicImage) -> Result<Self, ExtractionError> {
        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| ExtractionError::Image(format!("failed to encode image: {e}")))?;
        Ok(Self { png: buffer })
    }

    pub fn mime_type(&self) -> &'static str {
        "image/png"
    }
}

/// Best-effort optical character recognition over one or more page images.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, pages: &[PageImage]) -> anyhow::Result<String>;
}

/// Single-shot text extractor; no retries or partial recovery.
#[derive(Clone)]
pub struct TextExtractor {
    ocr: Arc<dyn OcrEngine>,
}

impl TextExtractor {
    pub fn new(ocr: Arc<dyn OcrEngine>) -> Self {
        Self { ocr }
    }

    pub async fn extract(
        &self,
        path: &Path,
        format: DocumentFormat,
    ) -> Result<String, ExtractionError> {
        info!(path = %path.display(), ?format, "Extracting report text");

        match format {
            DocumentFormat::Pdf => self.extract_pdf(path).await,
            DocumentFormat::Image(_) => self.extract_image(path).await,
            DocumentFormat::PlainText => read_plain_text(path).await,
        }
    }

    async fn extract_pdf(&self, path: &Path) -> Result<String, ExtractionError> {
        let bytes = tokio::fs::read(path).await?;

        let text = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|e| ExtractionError::PdfParsing(e.to_string()))
        })
        .await
        .map_err(|e| ExtractionError::Task(e.to_string()))??;

        if !text.trim().is_empty() {
            info!(chars = text.len(), "Extracted PDF text layer");
            return Ok(text);
        }

        warn!(path = %path.display(), "PDF has no text layer, falling back to OCR");
        let pages = render_pdf_pages(path.to_path_buf()).await?;
        self.recognize(&pages).await
    }

    async fn extract_image(&self, path: &Path) -> Result<String, ExtractionError> {
        let bytes = tokio::fs::read(path).await?;

        let page = tokio::task::spawn_blocking(move || {
            let image = image::load_from_memory(&bytes)
                .map_err(|e| ExtractionError::Image(e.to_string()))?;
            PageImage::from_image(&image)
        })
        .await
        .map_err(|e| ExtractionError::Task(e.to_string()))??;

        self.recognize(&[page]).await
    }

    async fn recognize(&self, pages: &[PageImage]) -> Result<String, ExtractionError> {
        let text = self
            .ocr
            .recognize(pages)
            .await
            .map_err(|e| ExtractionError::Ocr(e.to_string()))?;
        info!(pages = pages.len(), chars = text.len(), "OCR completed");
        Ok(text)
    }
}

async fn read_plain_text(path: &Path) -> Result<String, ExtractionError> {
    let bytes = tokio::fs::read(path).await?;
    String::from_utf8(bytes).map_err(|e| ExtractionError::Encoding(e.to_string()))
}

async fn render_pdf_pages(path: PathBuf) -> Result<Vec<PageImage>, ExtractionError> {
    tokio::task::spawn_blocking(move || {
        let pdf = PDF::from_file(&path).map_err(|e| ExtractionError::PdfRender(e.to_string()))?;
        let rendered = pdf
            .render(Pages::All, None)
            .map_err(|e| ExtractionError::PdfRender(e.to_string()))?;

        info!(pages = rendered.len(), "Rendered PDF pages for OCR");
        rendered.iter().map(PageImage::from_image).collect()
    })
    .await
    .map_err(|e| ExtractionError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubOcr;
    use image::{ImageBuffer, Rgb};
    use std::io::Write;

    fn write_temp(suffix: &str, bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn content_type_takes_precedence_over_extension() {
        let path = Path::new("scan.txt");
        assert_eq!(
            DocumentFormat::resolve(path, Some("application/pdf")),
            DocumentFormat::Pdf
        );
        assert_eq!(
            DocumentFormat::resolve(Path::new("scan.JPG"), Some("application/octet-stream")),
            DocumentFormat::Image(ImageKind::Jpeg)
        );
        assert_eq!(
            DocumentFormat::resolve(Path::new("x.bin"), Some("image/png; charset=binary")),
            DocumentFormat::Image(ImageKind::Png)
        );
    }

    #[test]
    fn unknown_formats_are_plain_text() {
        assert_eq!(
            DocumentFormat::resolve(Path::new("notes.md"), None),
            DocumentFormat::PlainText
        );
        assert_eq!(
            DocumentFormat::resolve(Path::new("no_extension"), None),
            DocumentFormat::PlainText
        );
    }

    #[tokio::test]
    async fn reads_plain_text_verbatim() {
        let file = write_temp(".txt", "Hemoglobin: 13.5 g/dL\nWBC: 6.1".as_bytes());
        let extractor = TextExtractor::new(Arc::new(StubOcr::new("unused")));

        let text = extractor
            .extract(file.path(), DocumentFormat::PlainText)
            .await
            .unwrap();
        assert_eq!(text, "Hemoglobin: 13.5 g/dL\nWBC: 6.1");
    }

    #[tokio::test]
    async fn invalid_utf8_is_an_encoding_error() {
        let file = write_temp(".txt", &[0xff, 0xfe, 0x00, 0xc3]);
        let extractor = TextExtractor::new(Arc::new(StubOcr::new("unused")));

        let err = extractor
            .extract(file.path(), DocumentFormat::PlainText)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Encoding(_)));
    }

    #[tokio::test]
    async fn images_go_through_ocr() {
        let file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        let image: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::new(8, 8);
        image.save(file.path()).unwrap();

        let ocr = Arc::new(StubOcr::new("Glucose 98 mg/dL"));
        let extractor = TextExtractor::new(ocr.clone());

        let text = extractor
            .extract(file.path(), DocumentFormat::Image(ImageKind::Png))
            .await
            .unwrap();
        assert_eq!(text, "Glucose 98 mg/dL");
        assert_eq!(ocr.pages_seen(), vec![1]);
    }

    #[tokio::test]
    async fn corrupt_image_fails_before_ocr() {
        let file = write_temp(".png", b"definitely not a png");
        let ocr = Arc::new(StubOcr::new("unused"));
        let extractor = TextExtractor::new(ocr.clone());

        let err = extractor
            .extract(file.path(), DocumentFormat::Image(ImageKind::Png))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Image(_)));
        assert!(ocr.pages_seen().is_empty());
    }

    #[tokio::test]
    async fn ocr_failure_is_reported() {
        let file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        let image: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::new(4, 4);
        image.save(file.path()).unwrap();

        let extractor = TextExtractor::new(Arc::new(StubOcr::failing("vision model offline")));
        let err = extractor
            .extract(file.path(), DocumentFormat::Image(ImageKind::Png))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Ocr(ref m) if m.contains("offline")));
    }

    /// Single-page PDF with one line of Helvetica text and a valid xref table.
    fn one_page_pdf(text: &str) -> Vec<u8> {
        let content = format!("BT /F1 24 Tf 72 720 Td ({text}) Tj ET");
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
             /Resources << /Font << /F1 5 0 R >> >> >>"
                .to_string(),
            format!(
                "<< /Length {} >>\nstream\n{content}\nendstream",
                content.len()
            ),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (index, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", index + 1).as_bytes());
        }

        let xref_offset = pdf.len();
        let mut tail = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in offsets {
            tail.push_str(&format!("{offset:010} 00000 n \n"));
        }
        tail.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            objects.len() + 1
        ));
        pdf.extend_from_slice(tail.as_bytes());
        pdf
    }

    #[tokio::test]
    async fn pdf_text_layer_is_used_without_ocr() {
        let file = write_temp(".pdf", &one_page_pdf("Hemoglobin 13.5"));
        let ocr = Arc::new(StubOcr::new("unused"));
        let extractor = TextExtractor::new(ocr.clone());

        let text = extractor
            .extract(file.path(), DocumentFormat::Pdf)
            .await
            .unwrap();
        assert!(text.contains("Hemoglobin 13.5"), "got {text:?}");
        assert!(ocr.pages_seen().is_empty());
    }

    #[tokio::test]
    async fn corrupt_pdf_is_an_error() {
        let file = write_temp(".pdf", b"not a pdf");
        let ocr = Arc::new(StubOcr::new("unused"));
        let extractor = TextExtractor::new(ocr.clone());

        let err = extractor
            .extract(file.path(), DocumentFormat::Pdf)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::PdfParsing(_) | ExtractionError::Task(_)
        ));
        assert!(ocr.pages_seen().is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let extractor = TextExtractor::new(Arc::new(StubOcr::new("unused")));
        let err = extractor
            .extract(Path::new("/nonexistent/report.txt"), DocumentFormat::PlainText)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Io(_)));
    }
}
