use pdf::content::{Op, TextDrawAdjusted};
use pdf::error::PdfError;
use pdf::file::FileOptions;
use thiserror::Error;

use crate::layout::TextFragment;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("The document rejected the supplied password")]
    InvalidPassword,
    #[error("The document could not be parsed: {0}")]
    CorruptDocument(String),
    #[error("The document has no extractable text layer")]
    UnsupportedDocument,
}

/// Text fragments of one page, in drawing order.
pub type RawPage = Vec<TextFragment>;

/// Abstraction over the PDF engine: decrypt the document and return positioned text per page.
pub trait DocumentBackend: Send + Sync {
    fn open(&self, bytes: &[u8], password: &str) -> Result<Vec<RawPage>, ExtractError>;
}

// ── pdf-rs backend ────────────────────────────────────────────────────────────

/// Decrypts and reads content streams with the `pdf` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfRsBackend;

impl DocumentBackend for PdfRsBackend {
    fn open(&self, bytes: &[u8], password: &str) -> Result<Vec<RawPage>, ExtractError> {
        if !has_pdf_header(bytes) {
            return Err(ExtractError::CorruptDocument("missing %PDF header".to_string()));
        }

        let file = FileOptions::cached()
            .password(password.as_bytes())
            .load(bytes.to_vec())
            .map_err(open_error)?;

        let mut pages = Vec::new();
        for (idx, page) in file.pages().enumerate() {
            let page = page.map_err(|e| page_error(idx, e))?;
            let fragments = match &page.contents {
                Some(content) => {
                    let ops = content.operations(&file).map_err(|e| page_error(idx, e))?;
                    fragments_from_ops(&ops)
                }
                None => Vec::new(),
            };
            pages.push(fragments);
        }
        Ok(pages)
    }
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    // Some writers put junk before the header; readers accept it within the first 1 KiB.
    let head = &bytes[..bytes.len().min(1024)];
    head.windows(5).any(|w| w == b"%PDF-")
}

fn open_error(e: PdfError) -> ExtractError {
    if is_invalid_password(&e) {
        ExtractError::InvalidPassword
    } else {
        ExtractError::CorruptDocument(e.to_string())
    }
}

/// The decryptor's verdict usually arrives wrapped in `Try` frames.
fn is_invalid_password(e: &PdfError) -> bool {
    match e {
        PdfError::InvalidPassword => true,
        PdfError::Try { source, .. } => is_invalid_password(source),
        _ => false,
    }
}

fn page_error(idx: usize, e: PdfError) -> ExtractError {
    ExtractError::CorruptDocument(format!("page {}: {e}", idx + 1))
}

/// Tracks the text and line matrices' translation so every draw gets a position.
#[derive(Default)]
struct TextState {
    line_x: f32,
    line_y: f32,
    x: f32,
    y: f32,
    leading: f32,
}

impl TextState {
    fn move_line(&mut self, dx: f32, dy: f32) {
        self.line_x += dx;
        self.line_y += dy;
        self.x = self.line_x;
        self.y = self.line_y;
    }

    fn draw(&mut self, text: String, out: &mut Vec<TextFragment>) {
        let frag = TextFragment::new(self.x, self.y, text);
        // No font metrics here; advance by an estimate so later draws on the line sort after.
        self.x += frag.text.chars().count() as f32 * 4.5;
        out.push(frag);
    }
}

fn fragments_from_ops(ops: &[Op]) -> Vec<TextFragment> {
    let mut state = TextState::default();
    let mut out = Vec::new();

    for op in ops {
        match op {
            Op::BeginText => state = TextState { leading: state.leading, ..TextState::default() },
            Op::SetTextMatrix { matrix } => {
                state.line_x = matrix.e;
                state.line_y = matrix.f;
                state.x = matrix.e;
                state.y = matrix.f;
            }
            Op::MoveTextPosition { translation } => state.move_line(translation.x, translation.y),
            Op::Leading { leading } => state.leading = *leading,
            Op::TextNewline => state.move_line(0.0, -state.leading),
            Op::TextDraw { text } => {
                state.draw(String::from_utf8_lossy(text.as_bytes()).into_owned(), &mut out);
            }
            Op::TextDrawAdjusted { array } => {
                let mut joined = String::new();
                for part in array {
                    match part {
                        TextDrawAdjusted::Text(s) => {
                            joined.push_str(&String::from_utf8_lossy(s.as_bytes()));
                        }
                        // Large negative kerning is how many writers encode a word space.
                        TextDrawAdjusted::Spacing(adj) if *adj < -200.0 => joined.push(' '),
                        TextDrawAdjusted::Spacing(_) => {}
                    }
                }
                state.draw(joined, &mut out);
            }
            _ => {}
        }
    }
    out
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns preset pages or a preset error, so the pipeline can be tested without PDF files.
#[derive(Debug, Clone)]
pub struct MockBackend {
    result: Result<Vec<RawPage>, ExtractError>,
    password: Option<String>,
}

impl MockBackend {
    /// Each page is given as text lines; columns are separated by two or more spaces.
    pub fn from_text(pages: &[&str]) -> Self {
        let pages = pages
            .iter()
            .map(|page| {
                page.lines()
                    .enumerate()
                    .flat_map(|(i, line)| {
                        let y = 800.0 - 12.0 * i as f32;
                        column_fragments(line, y)
                    })
                    .collect()
            })
            .collect();
        Self { result: Ok(pages), password: None }
    }

    pub fn failing(error: ExtractError) -> Self {
        Self { result: Err(error), password: None }
    }

    /// Reject every password except `password`, like an encrypted document would.
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }
}

fn column_fragments(line: &str, y: f32) -> Vec<TextFragment> {
    let mut out = Vec::new();
    let mut x = 20.0;
    for cell in line.split("  ").map(str::trim).filter(|c| !c.is_empty()) {
        out.push(TextFragment::new(x, y, cell));
        x += cell.chars().count() as f32 * 4.5 + 40.0;
    }
    out
}

impl DocumentBackend for MockBackend {
    fn open(&self, _bytes: &[u8], password: &str) -> Result<Vec<RawPage>, ExtractError> {
        if let Some(expected) = &self.password {
            if expected != password {
                return Err(ExtractError::InvalidPassword);
            }
        }
        self.result.clone()
    }
}
