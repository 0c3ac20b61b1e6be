use anyhow::anyhow;
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{info, warn};

use super::classifier::{TumorLabel, display_tumor_name};
use super::segmentation::SegmentationService;

// A4 in points, with 10mm margins and 10mm line height.
const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 28.35;
const LINE_HEIGHT: f32 = 28.35;
const IMAGE_WIDTH: f32 = 283.5;
// Lines longer than this are wrapped at word boundaries (12pt Helvetica across the text width).
const WRAP_COLUMNS: usize = 90;

/// Renders a downloadable classification report.
///
/// `confidence` is a percentage and is printed as given.
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render(
        &self,
        image: &[u8],
        media_type: &str,
        tumor_type: &str,
        confidence: f64,
    ) -> anyhow::Result<Vec<u8>>;
}

/// One-page PDF report with the segmented scan embedded as JPEG.
pub struct PdfReportRenderer {
    segmenter: Arc<dyn SegmentationService>,
}

impl PdfReportRenderer {
    pub fn new(segmenter: Arc<dyn SegmentationService>) -> Self {
        Self { segmenter }
    }
}

#[async_trait]
impl ReportRenderer for PdfReportRenderer {
    async fn render(
        &self,
        image: &[u8],
        media_type: &str,
        tumor_type: &str,
        confidence: f64,
    ) -> anyhow::Result<Vec<u8>> {
        let embedded = match self.segmenter.segment(image, media_type).await {
            Ok(segmented) => tokio::task::spawn_blocking(move || to_jpeg(&segmented)).await?,
            Err(e) => Err(e),
        };
        if let Err(e) = &embedded {
            warn!("Report image could not be embedded: {}", e);
        }

        let pdf = build_report(tumor_type, confidence, embedded)?;
        info!("Rendered report for {} ({} bytes)", tumor_type, pdf.len());
        Ok(pdf)
    }
}

fn advice(tumor_type: &str) -> [&'static str; 2] {
    if TumorLabel::parse(tumor_type) == Some(TumorLabel::NoTumor) {
        [
            "No signs of tumor detected.",
            "Maintain a healthy lifestyle and go for regular check-ups.",
        ]
    } else {
        [
            "Tumor detected.",
            "Please consult a neurologist for further evaluation and treatment options.",
        ]
    }
}

pub(crate) fn build_report(
    tumor_type: &str,
    confidence: f64,
    image: anyhow::Result<JpegImage>,
) -> anyhow::Result<Vec<u8>> {
    let mut page = PageLayout::new();

    page.centered_text(16.0, "Brain Tumor Classification Report");
    page.line_break();
    page.text(
        12.0,
        &format!("Tumor Type: {}", display_tumor_name(tumor_type)),
    );
    page.text(12.0, &format!("Confidence: {:.2}%", confidence));
    page.line_break();
    for line in advice(tumor_type) {
        page.text(12.0, line);
    }
    page.line_break();
    page.text(12.0, "Segmented Tumor Image:");

    let image = match image {
        Ok(jpeg) => {
            page.image(&jpeg);
            Some(jpeg)
        }
        Err(e) => {
            page.text(12.0, &format!("(Image could not be embedded: {})", e));
            None
        }
    };

    page.finish(image)
}

pub(crate) struct JpegImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

fn to_jpeg(bytes: &[u8]) -> anyhow::Result<JpegImage> {
    let rgb = image::load_from_memory(bytes)
        .map_err(|e| anyhow!("Failed to decode segmented image: {}", e))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut data = Vec::new();
    DynamicImage::ImageRgb8(rgb)
        .write_to(&mut Cursor::new(&mut data), ImageFormat::Jpeg)
        .map_err(|e| anyhow!("Failed to encode JPEG: {}", e))?;

    Ok(JpegImage {
        data,
        width,
        height,
    })
}

/// Top-down cursor collecting the operations of a single page.
struct PageLayout {
    operations: Vec<Operation>,
    cursor: f32,
}

impl PageLayout {
    fn new() -> Self {
        Self {
            operations: Vec::new(),
            cursor: PAGE_HEIGHT - MARGIN,
        }
    }

    fn text(&mut self, size: f32, text: &str) {
        for line in wrap(text, WRAP_COLUMNS) {
            self.text_at(MARGIN, size, &line);
        }
    }

    fn centered_text(&mut self, size: f32, text: &str) {
        // Approximate: Helvetica averages about half an em per glyph.
        let width = text.chars().count() as f32 * size * 0.5;
        self.text_at(((PAGE_WIDTH - width) / 2.0).max(MARGIN), size, text);
    }

    fn text_at(&mut self, x: f32, size: f32, text: &str) {
        self.cursor -= LINE_HEIGHT;
        let y = self.cursor + (LINE_HEIGHT - size) / 2.0;
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), size.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::string_literal(win_ansi(text))]),
            Operation::new("ET", vec![]),
        ]);
    }

    fn line_break(&mut self) {
        self.cursor -= LINE_HEIGHT;
    }

    fn image(&mut self, jpeg: &JpegImage) {
        let height = IMAGE_WIDTH * jpeg.height as f32 / jpeg.width.max(1) as f32;
        let height = height.min(self.cursor - MARGIN).max(0.0);
        self.cursor -= height;
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    IMAGE_WIDTH.into(),
                    0.into(),
                    0.into(),
                    height.into(),
                    MARGIN.into(),
                    self.cursor.into(),
                ],
            ),
            Operation::new("Do", vec!["Im1".into()]),
            Operation::new("Q", vec![]),
        ]);
    }

    fn finish(self, image: Option<JpegImage>) -> anyhow::Result<Vec<u8>> {
        let mut doc = Document::with_version("1.4");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let mut resources = dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        };
        if let Some(jpeg) = image {
            let image_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => jpeg.width as i64,
                    "Height" => jpeg.height as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                jpeg.data,
            ));
            resources.set("XObject", dictionary! { "Im1" => image_id });
        }
        let resources_id = doc.add_object(resources);

        let content = Content {
            operations: self.operations,
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut pdf = Vec::new();
        doc.save_to(&mut pdf)?;
        Ok(pdf)
    }
}

/// Encode for the WinAnsi font encoding; characters outside Latin-1 become `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u8::try_from(u32::from(c)) {
            Ok(byte) if !c.is_control() => byte,
            _ => b'?',
        })
        .collect()
}

fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > columns {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    struct FixedSegmenter(anyhow::Result<Vec<u8>>);

    #[async_trait]
    impl SegmentationService for FixedSegmenter {
        async fn segment(&self, _image: &[u8], _media_type: &str) -> anyhow::Result<Vec<u8>> {
            match &self.0 {
                Ok(bytes) => Ok(bytes.clone()),
                Err(e) => Err(anyhow!("{}", e)),
            }
        }
    }

    fn png() -> Vec<u8> {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 10, Rgb([200, 0, 0])))
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    /// Text shown by each `Tj` operation of the first page, in drawing order.
    fn page_lines(pdf: &[u8]) -> Vec<String> {
        let doc = Document::load_mem(pdf).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        content
            .operations
            .iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| op.operands.first()?.as_str().ok())
            .map(|bytes| bytes.iter().map(|&b| char::from(b)).collect())
            .collect()
    }

    fn embedded_images(pdf: &[u8]) -> Vec<(i64, i64)> {
        let doc = Document::load_mem(pdf).unwrap();
        doc.objects
            .values()
            .filter_map(|object| object.as_stream().ok())
            .filter(|stream| {
                matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(name)) if name == b"Image")
            })
            .map(|stream| {
                (
                    stream.dict.get(b"Width").unwrap().as_i64().unwrap(),
                    stream.dict.get(b"Height").unwrap().as_i64().unwrap(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn report_embeds_segmented_image() {
        let renderer = PdfReportRenderer::new(Arc::new(FixedSegmenter(Ok(png()))));

        let pdf = renderer
            .render(b"original", "image/png", "glioma", 87.5)
            .await
            .unwrap();

        assert!(pdf.starts_with(b"%PDF-1.4"));
        let lines = page_lines(&pdf);
        assert_eq!(lines[0], "Brain Tumor Classification Report");
        assert!(lines.contains(&"Tumor Type: Glioma Tumor".to_string()));
        assert!(lines.contains(&"Confidence: 87.50%".to_string()));
        assert!(lines.iter().any(|l| l.starts_with("Please consult a neurologist")));
        assert_eq!(embedded_images(&pdf), vec![(20, 10)]);
    }

    #[tokio::test]
    async fn report_notes_missing_image() {
        let renderer =
            PdfReportRenderer::new(Arc::new(FixedSegmenter(Err(anyhow!("Segmentation failed")))));

        let pdf = renderer
            .render(b"original", "image/png", "notumor", 99.0)
            .await
            .unwrap();

        let lines = page_lines(&pdf);
        assert!(lines.contains(&"Tumor Type: No Tumor".to_string()));
        assert!(lines.contains(&"No signs of tumor detected.".to_string()));
        assert!(lines.contains(&"(Image could not be embedded: Segmentation failed)".to_string()));
        assert!(embedded_images(&pdf).is_empty());
    }

    #[test]
    fn confidence_is_printed_as_given() {
        let pdf = build_report("pituitary", 1.0, Err(anyhow!("none"))).unwrap();
        assert!(page_lines(&pdf).contains(&"Confidence: 1.00%".to_string()));
    }

    #[test]
    fn latin1_text_survives_encoding() {
        let pdf = build_report("méningiome", 50.0, Err(anyhow!("none"))).unwrap();
        assert!(page_lines(&pdf).contains(&"Tumor Type: Méningiome".to_string()));
        assert_eq!(win_ansi("a→b"), b"a?b");
    }

    #[test]
    fn long_lines_wrap_at_words() {
        let text = "word ".repeat(40);
        let lines = wrap(&text, 20);

        assert!(lines.len() > 1);
        assert!(lines.iter().all(|line| line.chars().count() <= 20));
        assert_eq!(lines.join(" ").split_whitespace().count(), 40);
    }
}
