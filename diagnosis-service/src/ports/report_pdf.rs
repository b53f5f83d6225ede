use async_trait::async_trait;
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

use super::{PortError, ReportRenderer};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 18.0;
const BULLET_INDENT: f32 = 5.0;
const PT_TO_MM: f32 = 0.3528;
const BODY_SIZE: f32 = 11.0;

/// Writes synthesized reports as A4 PDFs under `output_dir`
pub struct PdfReportRenderer {
    output_dir: PathBuf,
}

impl PdfReportRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl ReportRenderer for PdfReportRenderer {
    async fn render(&self, markdown: &str) -> Result<String, PortError> {
        let markdown = markdown.to_string();
        let rendered = tokio::task::spawn_blocking(move || render_pdf(&markdown))
            .await
            .map_err(|e| PortError::Rendering(e.to_string()))??;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| PortError::Rendering(format!("cannot create report directory: {e}")))?;
        let path = self.output_dir.join(format!("summary-{}.pdf", Uuid::new_v4()));
        tokio::fs::write(&path, &rendered.bytes)
            .await
            .map_err(|e| PortError::Rendering(format!("cannot write report: {e}")))?;

        let path = path.to_string_lossy().into_owned();
        info!(path = %path, pages = rendered.pages, "Report rendered");
        Ok(path)
    }
}

/// The subset of Markdown the report prompt produces
#[derive(Debug, Clone, PartialEq)]
enum Block {
    Heading { level: usize, text: String },
    Bullet(String),
    Paragraph(String),
    Rule,
}

fn parse_markdown(markdown: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();

    fn flush(paragraph: &mut Vec<&str>, blocks: &mut Vec<Block>) {
        if !paragraph.is_empty() {
            blocks.push(Block::Paragraph(strip_inline(&paragraph.join(" "))));
            paragraph.clear();
        }
    }

    for line in markdown.lines().map(str::trim) {
        if line.is_empty() {
            flush(&mut paragraph, &mut blocks);
        } else if line.starts_with('#') {
            flush(&mut paragraph, &mut blocks);
            let level = line.chars().take_while(|c| *c == '#').count().min(3);
            let text = line.trim_start_matches('#').trim();
            blocks.push(Block::Heading {
                level,
                text: strip_inline(text),
            });
        } else if let Some(item) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::Bullet(strip_inline(item)));
        } else if line.chars().all(|c| matches!(c, '-' | '*' | '_')) && line.len() >= 3 {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::Rule);
        } else {
            paragraph.push(line);
        }
    }
    flush(&mut paragraph, &mut blocks);
    blocks
}

fn strip_inline(text: &str) -> String {
    text.replace("**", "").replace("__", "").replace('`', "")
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Rough Helvetica capacity of a line at `size` points
fn max_chars(size: f32, width: f32) -> usize {
    (width / (size * 0.5 * PT_TO_MM)) as usize
}

struct RenderedPdf {
    bytes: Vec<u8>,
    pages: usize,
}

/// Top-down text cursor that starts a new page when the current one is full
struct PageCursor<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
    pages: usize,
}

impl PageCursor<'_> {
    fn skip(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn line(&mut self, text: &str, size: f32, x: f32, font: &IndirectFontRef) {
        let height = size * PT_TO_MM * 1.5;
        if self.y - height < MARGIN {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - MARGIN;
            self.pages += 1;
        }
        self.y -= height;
        self.layer.use_text(text, size, Mm(x), Mm(self.y), font);
    }
}

/// Lay the report out page by page; returns the page count
fn layout(
    doc: &PdfDocumentReference,
    layer: PdfLayerReference,
    markdown: &str,
    regular: &IndirectFontRef,
    bold: &IndirectFontRef,
) -> usize {
    let text_width = PAGE_WIDTH - 2.0 * MARGIN;
    let mut cursor = PageCursor {
        doc,
        layer,
        y: PAGE_HEIGHT - MARGIN,
        pages: 1,
    };

    for block in parse_markdown(markdown) {
        match block {
            Block::Heading { level, text } => {
                let size = match level {
                    1 => 20.0,
                    2 => 15.0,
                    _ => 12.5,
                };
                cursor.skip(if level == 1 { 0.0 } else { 4.0 });
                for line in wrap_text(&text, max_chars(size, text_width)) {
                    cursor.line(&line, size, MARGIN, bold);
                }
                cursor.skip(1.5);
            }
            Block::Bullet(text) => {
                let width = text_width - BULLET_INDENT;
                for (i, line) in wrap_text(&text, max_chars(BODY_SIZE, width)).iter().enumerate() {
                    if i == 0 {
                        cursor.line(&format!("- {line}"), BODY_SIZE, MARGIN + BULLET_INDENT - 3.0, regular);
                    } else {
                        cursor.line(line, BODY_SIZE, MARGIN + BULLET_INDENT, regular);
                    }
                }
                cursor.skip(1.0);
            }
            Block::Paragraph(text) => {
                for line in wrap_text(&text, max_chars(BODY_SIZE, text_width)) {
                    cursor.line(&line, BODY_SIZE, MARGIN, regular);
                }
                cursor.skip(3.0);
            }
            Block::Rule => cursor.skip(4.0),
        }
    }

    cursor.pages
}

fn render_pdf(markdown: &str) -> Result<RenderedPdf, PortError> {
    let (doc, page, layer) = PdfDocument::new(
        "Diagnostic Summary Report",
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| PortError::Rendering(format!("PDF font error: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| PortError::Rendering(format!("PDF font error: {e}")))?;

    let pages = layout(&doc, doc.get_page(page).get_layer(layer), markdown, &regular, &bold);
    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| PortError::Rendering(format!("PDF save error: {e}")))?;
    let bytes = buf
        .into_inner()
        .map_err(|e| PortError::Rendering(format!("PDF buffer error: {e}")))?;

    Ok(RenderedPdf { bytes, pages })
}
