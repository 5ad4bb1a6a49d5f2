//! Tabular renderer: a minimal WordprocessingML package.
//!
//! The output is a plain OOXML container (zip) holding the content-types
//! manifest, the package relationships, and a single document part with one
//! heading and a two-column table. No styles part is emitted; consumers fall
//! back to their defaults.

use std::io::{Cursor, Write};

use bytes::Bytes;
use zip::{CompressionMethod, ZipWriter, write::FileOptions};

use crate::domain::rates::{RateSnapshot, format_rate};

use super::{
    DOCUMENT_TITLE, DocumentFormat, DocumentRenderer, HEADER_CURRENCY, HEADER_RATE, RenderError,
    RenderedArtifact, suggested_filename,
};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

pub struct DocxRenderer;

impl DocumentRenderer for DocxRenderer {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Docx
    }

    fn render(&self, snapshot: &RateSnapshot) -> Result<RenderedArtifact, RenderError> {
        let document = document_part(snapshot);
        let bytes = write_package(&document)?;
        Ok(RenderedArtifact {
            format: DocumentFormat::Docx,
            bytes,
            suggested_filename: suggested_filename(DocumentFormat::Docx),
        })
    }
}

fn write_package(document: &str) -> Result<Bytes, RenderError> {
    let mut archive = ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        FileOptions::<'_, ()>::default().compression_method(CompressionMethod::Deflated);

    for (name, body) in [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", PACKAGE_RELS),
        ("word/document.xml", document),
    ] {
        archive
            .start_file(name, options)
            .map_err(RenderError::encoding)?;
        archive
            .write_all(body.as_bytes())
            .map_err(RenderError::encoding)?;
    }

    let cursor = archive.finish().map_err(RenderError::encoding)?;
    Ok(Bytes::from(cursor.into_inner()))
}

fn document_part(snapshot: &RateSnapshot) -> String {
    let mut body = String::with_capacity(1024 + snapshot.len() * 160);
    body.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    body.push_str(
        r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#,
    );

    body.push_str(r#"<w:p><w:pPr><w:pStyle w:val="Title"/></w:pPr><w:r><w:t>"#);
    body.push_str(DOCUMENT_TITLE);
    body.push_str("</w:t></w:r></w:p>");

    body.push_str(r#"<w:tbl><w:tblPr><w:tblW w:w="0" w:type="auto"/></w:tblPr>"#);
    body.push_str(r#"<w:tblGrid><w:gridCol w:w="2400"/><w:gridCol w:w="2400"/></w:tblGrid>"#);

    push_row(&mut body, HEADER_CURRENCY, HEADER_RATE);
    for entry in snapshot.entries() {
        push_row(&mut body, &entry.code, &format_rate(entry.rate));
    }

    body.push_str("</w:tbl></w:body></w:document>");
    body
}

fn push_row(body: &mut String, left: &str, right: &str) {
    body.push_str("<w:tr>");
    for text in [left, right] {
        body.push_str("<w:tc><w:p><w:r><w:t>");
        body.push_str(&xml_escape(text));
        body.push_str("</w:t></w:r></w:p></w:tc>");
    }
    body.push_str("</w:tr>");
}

fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use time::OffsetDateTime;
    use zip::ZipArchive;

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

    fn extract_document(artifact: &RenderedArtifact) -> String {
        let mut archive =
            ZipArchive::new(Cursor::new(artifact.bytes.to_vec())).expect("valid zip container");
        let mut part = archive
            .by_name("word/document.xml")
            .expect("document part present");
        let mut xml = String::new();
        part.read_to_string(&mut xml).expect("utf-8 document part");
        xml
    }

    #[test]
    fn table_has_header_plus_one_row_per_entry_in_order() {
        let artifact = DocxRenderer
            .render(&snapshot(&[("RUB", 90.5), ("EUR", 1.08)]))
            .expect("render");
        let xml = extract_document(&artifact);

        assert_eq!(xml.matches("<w:tr>").count(), 3);
        let rub = xml.find("<w:t>RUB</w:t>").expect("RUB row");
        let eur = xml.find("<w:t>EUR</w:t>").expect("EUR row");
        assert!(rub < eur, "RUB row must precede EUR row");
        assert!(xml.contains("<w:t>90.5</w:t>"));
        assert!(xml.contains("<w:t>1.08</w:t>"));
    }

    #[test]
    fn empty_snapshot_renders_a_header_only_table() {
        let artifact = DocxRenderer.render(&snapshot(&[])).expect("render");
        let xml = extract_document(&artifact);
        assert_eq!(xml.matches("<w:tr>").count(), 1);
        assert!(xml.contains(&format!("<w:t>{HEADER_CURRENCY}</w:t>")));
        assert!(xml.contains(&format!("<w:t>{HEADER_RATE}</w:t>")));
    }

    #[test]
    fn package_contains_the_required_parts() {
        let artifact = DocxRenderer.render(&snapshot(&[("RUB", 90.5)])).expect("render");
        let mut archive =
            ZipArchive::new(Cursor::new(artifact.bytes.to_vec())).expect("valid zip container");
        for name in ["[Content_Types].xml", "_rels/.rels", "word/document.xml"] {
            assert!(archive.by_name(name).is_ok(), "missing part {name}");
        }
        assert_eq!(artifact.suggested_filename, "exchange_rates.docx");
    }
}
