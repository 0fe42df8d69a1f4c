use serde::{Deserialize, Serialize};

/// Rough advance of one glyph in text-space units. Statements print in a ~9pt font.
const CHAR_WIDTH: f32 = 4.5;
/// Fragments whose baselines differ by less than this share a physical line.
const LINE_TOLERANCE: f32 = 2.0;
/// A horizontal gap at least this wide starts a new cell.
const COLUMN_GAP: f32 = 3.0 * CHAR_WIDTH;
/// Lines with at least this many cells count as table rows.
const MIN_TABLE_CELLS: usize = 3;
/// Narrow lines (wrapped descriptions) allowed inside one table region.
const MAX_TABLE_GAP: usize = 2;

/// One run of text drawn at a position on the page (PDF user space, origin bottom-left).
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub x: f32,
    pub y: f32,
    pub text: String,
}

impl TextFragment {
    pub fn new(x: f32, y: f32, text: impl Into<String>) -> Self {
        Self { x, y, text: text.into() }
    }

    fn end_x(&self) -> f32 {
        self.x + self.text.chars().count() as f32 * CHAR_WIDTH
    }
}

/// A physical line of text, split into cells at wide horizontal gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextLine {
    pub cells: Vec<String>,
}

impl TextLine {
    pub fn text(&self) -> String {
        self.cells.join(" ")
    }
}

/// Lines `start..end` of a page that look like a table, with the widest row's cell count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRegion {
    pub start: usize,
    pub end: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based page number.
    pub number: usize,
    pub lines: Vec<TextLine>,
    pub tables: Vec<TableRegion>,
}

impl PageText {
    /// Builds a page from already-separated lines. Runs of two or more spaces separate cells.
    pub fn from_lines<S: AsRef<str>>(number: usize, lines: &[S]) -> Self {
        let lines: Vec<TextLine> = lines
            .iter()
            .map(|l| TextLine {
                cells: l
                    .as_ref()
                    .split("  ")
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect(),
            })
            .filter(|l| !l.cells.is_empty())
            .collect();
        let tables = detect_tables(&lines);
        PageText { number, lines, tables }
    }

    pub fn is_blank(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn text(&self) -> String {
        self.lines.iter().map(TextLine::text).collect::<Vec<_>>().join("\n")
    }
}

/// Groups positioned fragments into top-to-bottom lines of left-to-right cells.
pub fn layout_page(number: usize, fragments: Vec<TextFragment>) -> PageText {
    let mut fragments: Vec<TextFragment> = fragments
        .into_iter()
        .filter(|f| !f.text.trim().is_empty())
        .collect();
    // Top of the page first; PDF y grows upwards.
    fragments.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut rows: Vec<Vec<TextFragment>> = Vec::new();
    for frag in fragments {
        match rows.last_mut() {
            Some(row) if (row[0].y - frag.y).abs() < LINE_TOLERANCE => row.push(frag),
            _ => rows.push(vec![frag]),
        }
    }

    let lines: Vec<TextLine> = rows
        .into_iter()
        .map(|mut row| {
            row.sort_by(|a, b| a.x.total_cmp(&b.x));
            cells_of(&row)
        })
        .collect();
    let tables = detect_tables(&lines);
    PageText { number, lines, tables }
}

fn cells_of(row: &[TextFragment]) -> TextLine {
    let mut cells: Vec<String> = Vec::new();
    let mut prev_end: Option<f32> = None;
    for frag in row {
        let text = frag.text.trim();
        match (prev_end, cells.last_mut()) {
            (Some(end), Some(cell)) if frag.x - end < COLUMN_GAP => {
                if frag.x - end >= CHAR_WIDTH / 2.0 {
                    cell.push(' ');
                }
                cell.push_str(text);
            }
            _ => cells.push(text.to_string()),
        }
        prev_end = Some(frag.end_x());
    }
    TextLine { cells }
}

fn detect_tables(lines: &[TextLine]) -> Vec<TableRegion> {
    let wide: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.cells.len() >= MIN_TABLE_CELLS)
        .map(|(i, _)| i)
        .collect();

    let mut regions = Vec::new();
    let mut group: Vec<usize> = Vec::new();
    for idx in wide {
        if let Some(&last) = group.last() {
            if idx - last > MAX_TABLE_GAP + 1 {
                push_region(&mut regions, &group, lines);
                group.clear();
            }
        }
        group.push(idx);
    }
    push_region(&mut regions, &group, lines);
    regions
}

fn push_region(regions: &mut Vec<TableRegion>, group: &[usize], lines: &[TextLine]) {
    if group.len() < 2 {
        return;
    }
    let start = group[0];
    let end = group[group.len() - 1] + 1;
    let columns = lines[start..end].iter().map(|l| l.cells.len()).max().unwrap_or(0);
    regions.push(TableRegion { start, end, columns });
}
