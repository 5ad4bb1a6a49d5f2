//! Paginated renderer: a single-page PDF with fixed text positions.
//!
//! The layout mirrors a printed rate sheet: title near the top edge, the
//! column header pair below it, then one line per currency at a constant
//! downward step. The writer emits the PDF objects directly; text is limited
//! to printable ASCII, which covers every currency code and decimal rate.

use std::fmt::Write as _;

use bytes::Bytes;

use crate::domain::rates::{RateSnapshot, format_rate};

use super::{
    DOCUMENT_TITLE, DocumentFormat, DocumentRenderer, HEADER_CURRENCY, HEADER_RATE, RenderError,
    RenderedArtifact, suggested_filename,
};

// US letter, 1/72 inch units.
const PAGE_WIDTH: u32 = 612;
const PAGE_HEIGHT: u32 = 792;

const LEFT_COLUMN_X: i32 = 100;
const RIGHT_COLUMN_X: i32 = 300;
const TITLE_Y: i32 = PAGE_HEIGHT as i32 - 40;
const HEADER_Y: i32 = PAGE_HEIGHT as i32 - 60;
const FIRST_ROW_Y: i32 = PAGE_HEIGHT as i32 - 80;
const ROW_STEP: i32 = 20;
const FONT_SIZE: u32 = 12;

pub struct PdfRenderer;

impl DocumentRenderer for PdfRenderer {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    fn render(&self, snapshot: &RateSnapshot) -> Result<RenderedArtifact, RenderError> {
        let content = content_stream(snapshot)?;
        let bytes = assemble_document(&content);
        Ok(RenderedArtifact {
            format: DocumentFormat::Pdf,
            bytes,
            suggested_filename: suggested_filename(DocumentFormat::Pdf),
        })
    }
}

fn content_stream(snapshot: &RateSnapshot) -> Result<String, RenderError> {
    let mut content = String::with_capacity(256 + snapshot.len() * 96);
    draw_string(&mut content, LEFT_COLUMN_X, TITLE_Y, DOCUMENT_TITLE)?;
    draw_string(&mut content, LEFT_COLUMN_X, HEADER_Y, HEADER_CURRENCY)?;
    draw_string(&mut content, RIGHT_COLUMN_X, HEADER_Y, HEADER_RATE)?;

    let mut y = FIRST_ROW_Y;
    for entry in snapshot.entries() {
        draw_string(&mut content, LEFT_COLUMN_X, y, &entry.code)?;
        draw_string(&mut content, RIGHT_COLUMN_X, y, &format_rate(entry.rate))?;
        y -= ROW_STEP;
    }

    Ok(content)
}

fn draw_string(content: &mut String, x: i32, y: i32, text: &str) -> Result<(), RenderError> {
    let escaped = escape_text(text)?;
    let _ = writeln!(content, "BT /F1 {FONT_SIZE} Tf {x} {y} Td ({escaped}) Tj ET");
    Ok(())
}

fn escape_text(text: &str) -> Result<String, RenderError> {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if !(' '..='~').contains(&ch) {
            return Err(RenderError::encoding(format!(
                "character {ch:?} cannot be encoded in a literal string"
            )));
        }
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '(' => escaped.push_str("\\("),
            ')' => escaped.push_str("\\)"),
            _ => escaped.push(ch),
        }
    }
    Ok(escaped)
}

fn assemble_document(content: &str) -> Bytes {
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
             /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!(
            "<< /Length {} >>\nstream\n{content}endstream",
            content.len()
        ),
    ];

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        let _ = write!(out, "{} 0 obj\n{body}\nendobj\n", index + 1);
    }

    let xref_offset = out.len();
    let _ = write!(out, "xref\n0 {}\n", objects.len() + 1);
    out.push_str("0000000000 65535 f \n");
    for offset in &offsets {
        let _ = write!(out, "{offset:010} 00000 n \n");
    }
    let _ = write!(
        out,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        objects.len() + 1
    );

    Bytes::from(out.into_bytes())
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;

    fn snapshot(pairs: &[(&str, f64)]) -> RateSnapshot {
        let targets: Vec<String> = pairs.iter().map(|(code, _)| code.to_string()).collect();
        RateSnapshot::from_quotes(
            "USD",
            OffsetDateTime::UNIX_EPOCH,
            pairs
                .iter()
                .map(|(code, rate)| (code.to_string(), *rate))
                .collect::<Vec<_>>(),
            &targets,
        )
        .expect("valid snapshot")
    }

    fn rendered_text(pairs: &[(&str, f64)]) -> String {
        let artifact = PdfRenderer.render(&snapshot(pairs)).expect("render");
        String::from_utf8(artifact.bytes.to_vec()).expect("ascii document")
    }

    fn y_of(document: &str, text: &str) -> i32 {
        let needle = format!("({text}) Tj");
        let line = document
            .lines()
            .find(|line| line.ends_with(&format!("{needle} ET")) || line.contains(&needle))
            .unwrap_or_else(|| panic!("no draw command for {text}"));
        let mut parts = line.split_whitespace();
        // BT /F1 12 Tf x y Td (...) Tj ET
        let y = parts.nth(5).expect("y operand");
        y.parse().expect("numeric y operand")
    }

    #[test]
    fn starts_with_pdf_header_and_ends_with_eof() {
        let document = rendered_text(&[("RUB", 90.5)]);
        assert!(document.starts_with("%PDF-1.4"));
        assert!(document.trim_end().ends_with("%%EOF"));
    }

    #[test]
    fn rows_descend_in_snapshot_order() {
        let document = rendered_text(&[("RUB", 90.5), ("EUR", 1.08)]);
        let rub_y = y_of(&document, "RUB");
        let eur_y = y_of(&document, "EUR");
        assert!(rub_y > eur_y, "RUB must sit above EUR");
        assert_eq!(rub_y - eur_y, ROW_STEP);

        let rub_pos = document.find("(RUB) Tj").expect("RUB drawn");
        let eur_pos = document.find("(EUR) Tj").expect("EUR drawn");
        assert!(rub_pos < eur_pos);
    }

    #[test]
    fn header_lines_sit_between_title_and_first_row() {
        let document = rendered_text(&[("RUB", 90.5)]);
        assert_eq!(y_of(&document, DOCUMENT_TITLE), TITLE_Y);
        assert_eq!(y_of(&document, HEADER_CURRENCY), HEADER_Y);
        assert_eq!(y_of(&document, HEADER_RATE), HEADER_Y);
        assert_eq!(y_of(&document, "RUB"), FIRST_ROW_Y);
    }

    #[test]
    fn empty_snapshot_renders_title_and_headers_only() {
        let document = rendered_text(&[]);
        assert_eq!(document.matches(" Tj ET").count(), 3);
    }

    #[test]
    fn non_ascii_text_is_an_encoding_fault() {
        assert!(matches!(
            escape_text("caf\u{e9}"),
            Err(RenderError::Encoding { .. })
        ));
        assert_eq!(escape_text("(USD)").expect("escaped"), "\\(USD\\)");
    }
}
