//! Layout-based table detection over a page's content stream.
//!
//! Text show operations are turned into positioned spans, spans are grouped
//! into lines by baseline, and runs of consecutive multi-cell lines whose
//! cells line up with the first line's columns are reported as tables.

use lopdf::content::Operation;
use lopdf::Object;

/// Rows of one detected table; the first row holds the headers.
/// `None` marks a column with no text in that row.
pub type TableRows = Vec<Vec<Option<String>>>;

const LINE_TOLERANCE: f32 = 2.0;
const COLUMN_TOLERANCE: f32 = 10.0;
const AVERAGE_GLYPH_WIDTH: f32 = 0.5;
const KERNING_SPACE_THRESHOLD: f32 = -200.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    pub text: String,
}

impl TextSpan {
    fn estimated_end(&self) -> f32 {
        self.x + self.text.chars().count() as f32 * self.font_size * AVERAGE_GLYPH_WIDTH
    }
}

#[derive(Debug, Clone, Copy)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translated(&self, tx: f32, ty: f32) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        Matrix([a, b, c, d, e + tx * a + ty * c, f + tx * b + ty * d])
    }

    /// `self × other`, the PDF order for concatenating a matrix onto a CTM.
    fn then(&self, other: &Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }

    fn scale(&self) -> f32 {
        let [a, b, ..] = self.0;
        (a * a + b * b).sqrt()
    }
}

struct TextState {
    ctm: Matrix,
    saved: Vec<Matrix>,
    matrix: Matrix,
    line_matrix: Matrix,
    leading: f32,
    font_size: f32,
    moved: bool,
}

impl TextState {
    fn new() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            saved: Vec::new(),
            matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            leading: 0.0,
            font_size: 12.0,
            moved: true,
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = self.line_matrix.translated(tx, ty);
        self.matrix = self.line_matrix;
        self.moved = true;
    }

    fn next_line(&mut self) {
        let leading = self.leading;
        self.move_line(0.0, -leading);
    }
}

/// Recovers positioned text spans from decoded content-stream operations.
///
/// Positions are in page space: the graphics state's `cm` transforms are
/// applied, so flipped or offset coordinate systems still read top-down.
/// Consecutive show operations with no repositioning in between extend the
/// same span.
pub fn spans_from_operations(operations: &[Operation]) -> Vec<TextSpan> {
    let mut spans: Vec<TextSpan> = Vec::new();
    let mut state = TextState::new();

    for op in operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "q" => state.saved.push(state.ctm),
            "Q" => {
                if let Some(ctm) = state.saved.pop() {
                    state.ctm = ctm;
                }
            }
            "cm" => {
                let values: Vec<f32> = operands.iter().filter_map(as_number).collect();
                if let Ok(values) = <[f32; 6]>::try_from(values.as_slice()) {
                    state.ctm = Matrix(values).then(&state.ctm);
                }
            }
            "BT" => {
                state.matrix = Matrix::IDENTITY;
                state.line_matrix = Matrix::IDENTITY;
                state.moved = true;
            }
            "Tf" => {
                if let Some(size) = operands.get(1).and_then(as_number) {
                    state.font_size = size;
                }
            }
            "TL" => {
                if let Some(leading) = operands.first().and_then(as_number) {
                    state.leading = leading;
                }
            }
            "Td" | "TD" => {
                let tx = operands.first().and_then(as_number).unwrap_or(0.0);
                let ty = operands.get(1).and_then(as_number).unwrap_or(0.0);
                if op.operator == "TD" {
                    state.leading = -ty;
                }
                state.move_line(tx, ty);
            }
            "Tm" => {
                let values: Vec<f32> = operands.iter().filter_map(as_number).collect();
                if let Ok(values) = <[f32; 6]>::try_from(values.as_slice()) {
                    state.line_matrix = Matrix(values);
                    state.matrix = state.line_matrix;
                    state.moved = true;
                }
            }
            "T*" => state.next_line(),
            "Tj" => show_text(&mut spans, &mut state, operands.first()),
            "'" => {
                state.next_line();
                show_text(&mut spans, &mut state, operands.first());
            }
            "\"" => {
                state.next_line();
                show_text(&mut spans, &mut state, operands.get(2));
            }
            "TJ" => show_text(&mut spans, &mut state, operands.first()),
            _ => {}
        }
    }

    spans.retain(|span| !span.text.trim().is_empty());
    for span in &mut spans {
        span.text = span.text.trim().to_string();
    }
    spans
}

fn show_text(spans: &mut Vec<TextSpan>, state: &mut TextState, operand: Option<&Object>) {
    let Some(text) = operand.map(decode_text_operand) else {
        return;
    };
    if text.is_empty() {
        return;
    }

    match spans.last_mut() {
        Some(last) if !state.moved => last.text.push_str(&text),
        _ => {
            let placement = state.matrix.then(&state.ctm);
            let [_, _, _, _, x, y] = placement.0;
            spans.push(TextSpan {
                x,
                y,
                font_size: state.font_size * placement.scale(),
                text,
            });
        }
    }
    state.moved = false;
}

fn decode_text_operand(object: &Object) -> String {
    match object {
        Object::String(bytes, _) => decode_pdf_bytes(bytes),
        Object::Array(items) => {
            let mut text = String::new();
            for item in items {
                match item {
                    Object::String(bytes, _) => text.push_str(&decode_pdf_bytes(bytes)),
                    other => {
                        if as_number(other).is_some_and(|kern| kern <= KERNING_SPACE_THRESHOLD)
                            && !text.ends_with(' ')
                        {
                            text.push(' ');
                        }
                    }
                }
            }
            text
        }
        _ => String::new(),
    }
}

/// UTF-16BE when the BOM is present, otherwise one char per byte.
fn decode_pdf_bytes(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&byte| byte as char).collect()
}

fn as_number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

#[derive(Debug)]
struct Line {
    y: f32,
    cells: Vec<TextSpan>,
}

/// Groups spans into top-to-bottom lines, merging spans that touch.
fn group_lines(mut spans: Vec<TextSpan>) -> Vec<Line> {
    spans.sort_by(|left, right| right.y.total_cmp(&left.y).then(left.x.total_cmp(&right.x)));

    let mut lines: Vec<Line> = Vec::new();
    for span in spans {
        match lines.last_mut() {
            Some(line) if (line.y - span.y).abs() <= LINE_TOLERANCE => line.cells.push(span),
            _ => lines.push(Line {
                y: span.y,
                cells: vec![span],
            }),
        }
    }

    for line in &mut lines {
        line.cells.sort_by(|left, right| left.x.total_cmp(&right.x));
        let mut merged: Vec<TextSpan> = Vec::with_capacity(line.cells.len());
        for cell in line.cells.drain(..) {
            match merged.last_mut() {
                Some(previous) if cell.x - previous.estimated_end() < previous.font_size => {
                    previous.text.push(' ');
                    previous.text.push_str(&cell.text);
                }
                _ => merged.push(cell),
            }
        }
        line.cells = merged;
    }

    lines
}

fn column_for(anchors: &[f32], x: f32) -> Option<usize> {
    anchors
        .iter()
        .enumerate()
        .map(|(column, anchor)| (column, (anchor - x).abs()))
        .filter(|(_, distance)| *distance <= COLUMN_TOLERANCE)
        .min_by(|left, right| left.1.total_cmp(&right.1))
        .map(|(column, _)| column)
}

fn aligned_row(anchors: &[f32], line: &Line) -> Option<Vec<Option<String>>> {
    if line.cells.len() < 2 {
        return None;
    }

    let mut row: Vec<Option<String>> = vec![None; anchors.len()];
    for cell in &line.cells {
        let column = column_for(anchors, cell.x)?;
        match &mut row[column] {
            Some(existing) => {
                existing.push(' ');
                existing.push_str(&cell.text);
            }
            slot => *slot = Some(cell.text.clone()),
        }
    }
    Some(row)
}

/// Finds tables among the spans of a single page, in top-to-bottom order.
pub fn detect_tables(spans: Vec<TextSpan>) -> Vec<TableRows> {
    let lines = group_lines(spans);
    let mut tables = Vec::new();
    let mut cursor = 0;

    while cursor < lines.len() {
        let header = &lines[cursor];
        if header.cells.len() < 2 {
            cursor += 1;
            continue;
        }

        let anchors: Vec<f32> = header.cells.iter().map(|cell| cell.x).collect();
        let mut rows: TableRows = vec![header
            .cells
            .iter()
            .map(|cell| Some(cell.text.clone()))
            .collect()];

        let mut next = cursor + 1;
        while let Some(row) = lines.get(next).and_then(|line| aligned_row(&anchors, line)) {
            rows.push(row);
            next += 1;
        }

        if rows.len() >= 2 {
            tables.push(rows);
            cursor = next;
        } else {
            cursor += 1;
        }
    }

    tables
}

/// Renders a table as a header line followed by one `" | "`-joined line per row.
///
/// Empty header names are left out of the header line; empty cells render
/// as empty strings. Rows are not checked against the header width.
pub fn render_table(rows: &[Vec<Option<String>>]) -> String {
    let Some((headers, body)) = rows.split_first() else {
        return String::new();
    };

    let header_names = headers
        .iter()
        .filter_map(|header| header.as_deref().filter(|name| !name.is_empty()))
        .collect::<Vec<_>>()
        .join(", ");

    let mut rendered = format!("Table with columns: {header_names}\n\n");
    for row in body {
        let line = row
            .iter()
            .map(|cell| cell.as_deref().unwrap_or_default())
            .collect::<Vec<_>>()
            .join(" | ");
        rendered.push_str(&line);
        rendered.push('\n');
    }
    rendered
}
