//! Workbook ingestion: extract currency/rate rows from an uploaded XLSX file.
//!
//! An XLSX file is a zip container of SpreadsheetML parts. Only the slice of
//! the format this service accepts is read here: the first worksheet, its
//! shared-strings table, and plain `<row>`/`<c>`/`<v>` markup. The first row
//! is treated as a header; every following row must hold exactly one currency
//! cell and one numeric rate cell or the whole workbook is rejected.

use std::io::{Cursor, Read};

use thiserror::Error;
use zip::ZipArchive;

const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const DEFAULT_SHEET_PART: &str = "xl/worksheets/sheet1.xml";
const SHEET_PART_PREFIX: &str = "xl/worksheets/";

#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("upload is not a valid workbook: {detail}")]
    InvalidArchive { detail: String },
    #[error("workbook has no worksheet part")]
    MissingSheet,
    #[error("worksheet row {row} has {cells} cells, expected exactly 2")]
    MalformedRow { row: usize, cells: usize },
    #[error("worksheet row {row} has a non-numeric rate")]
    InvalidNumber { row: usize },
}

impl WorkbookError {
    fn invalid(detail: impl ToString) -> Self {
        Self::InvalidArchive {
            detail: detail.to_string(),
        }
    }
}

/// Parse the first worksheet into `(currency, rate)` pairs, skipping the
/// header row. Fails as a whole on the first malformed row; no partial
/// mapping is ever returned.
pub fn parse_workbook(payload: &[u8]) -> Result<Vec<(String, f64)>, WorkbookError> {
    let mut archive =
        ZipArchive::new(Cursor::new(payload)).map_err(WorkbookError::invalid)?;

    let shared = match read_part(&mut archive, SHARED_STRINGS_PART)? {
        Some(xml) => parse_shared_strings(&xml),
        None => Vec::new(),
    };

    let sheet_xml = match read_part(&mut archive, DEFAULT_SHEET_PART)? {
        Some(xml) => xml,
        None => {
            let fallback = first_sheet_name(&archive).ok_or(WorkbookError::MissingSheet)?;
            read_part(&mut archive, &fallback)?.ok_or(WorkbookError::MissingSheet)?
        }
    };

    parse_rows(&sheet_xml, &shared)
}

fn read_part(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<String>, WorkbookError> {
    let mut part = match archive.by_name(name) {
        Ok(part) => part,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(WorkbookError::invalid(err)),
    };
    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(WorkbookError::invalid)?;
    Ok(Some(xml))
}

fn first_sheet_name(archive: &ZipArchive<Cursor<&[u8]>>) -> Option<String> {
    let mut names: Vec<&str> = archive
        .file_names()
        .filter(|name| name.starts_with(SHEET_PART_PREFIX) && name.ends_with(".xml"))
        .collect();
    names.sort_unstable();
    names.first().map(|name| name.to_string())
}

fn parse_rows(sheet_xml: &str, shared: &[String]) -> Result<Vec<(String, f64)>, WorkbookError> {
    let mut pairs = Vec::new();

    for (index, (_, row_body)) in blocks(sheet_xml, "row").into_iter().enumerate() {
        let row_number = index + 1;
        if row_number == 1 {
            // Header row.
            continue;
        }

        let cells = blocks(row_body.unwrap_or(""), "c");
        if cells.len() != 2 {
            return Err(WorkbookError::MalformedRow {
                row: row_number,
                cells: cells.len(),
            });
        }

        let currency = cell_text(cells[0], shared)?;
        let rate = cell_number(cells[1], shared, row_number)?;
        pairs.push((currency, rate));
    }

    Ok(pairs)
}

fn cell_text(
    cell: (&str, Option<&str>),
    shared: &[String],
) -> Result<String, WorkbookError> {
    let (attrs, body) = cell;
    let body = body.unwrap_or("");
    match attr(attrs, "t").unwrap_or("n") {
        "s" => {
            let raw = value_text(body).unwrap_or_default();
            let index: usize = raw
                .trim()
                .parse()
                .map_err(|_| WorkbookError::invalid(format!("bad shared-string index `{raw}`")))?;
            shared.get(index).cloned().ok_or_else(|| {
                WorkbookError::invalid(format!("shared-string index {index} out of range"))
            })
        }
        "inlineStr" => Ok(inline_text(body)),
        _ => Ok(value_text(body).unwrap_or_default()),
    }
}

fn cell_number(
    cell: (&str, Option<&str>),
    shared: &[String],
    row: usize,
) -> Result<f64, WorkbookError> {
    let text = cell_text(cell, shared)?;
    text.trim()
        .parse()
        .map_err(|_| WorkbookError::InvalidNumber { row })
}

fn value_text(body: &str) -> Option<String> {
    blocks(body, "v")
        .into_iter()
        .next()
        .map(|(_, value)| unescape(value.unwrap_or("")))
}

fn inline_text(body: &str) -> String {
    blocks(body, "t")
        .into_iter()
        .map(|(_, value)| unescape(value.unwrap_or("")))
        .collect()
}

fn parse_shared_strings(xml: &str) -> Vec<String> {
    blocks(xml, "si")
        .into_iter()
        .map(|(_, body)| inline_text(body.unwrap_or("")))
        .collect()
}

/// Collect `(attributes, body)` for every `<name ...>body</name>` or
/// `<name .../>` occurrence. The markup this reader accepts never nests
/// same-named elements, so the first matching close tag ends a block.
fn blocks<'a>(xml: &'a str, name: &str) -> Vec<(&'a str, Option<&'a str>)> {
    let open = format!("<{name}");
    let close = format!("</{name}>");
    let mut found = Vec::new();
    let mut rest = xml;

    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        if !after.starts_with([' ', '\t', '\r', '\n', '>', '/']) {
            // Matched a longer element name, e.g. `<cols>` while scanning `<c>`.
            rest = after;
            continue;
        }
        let Some(tag_end) = after.find('>') else {
            break;
        };
        let tag_text = after[..tag_end].trim_end();
        let self_closing = tag_text.ends_with('/');
        let attrs = tag_text.trim_end_matches('/');
        let after_tag = &after[tag_end + 1..];

        if self_closing {
            found.push((attrs, None));
            rest = after_tag;
        } else if let Some(body_end) = after_tag.find(&close) {
            found.push((attrs, Some(&after_tag[..body_end])));
            rest = &after_tag[body_end + close.len()..];
        } else {
            break;
        }
    }

    found
}

fn attr<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!(" {name}=\"");
    let padded_start = attrs.find(&needle).map(|pos| pos + needle.len());
    let start = match padded_start {
        Some(start) => start,
        None => {
            let head = format!("{name}=\"");
            if attrs.starts_with(&head) {
                head.len()
            } else {
                return None;
            }
        }
    };
    let rest = &attrs[start..];
    rest.find('"').map(|end| &rest[..end])
}

fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::{CompressionMethod, ZipWriter, write::FileOptions};

    use super::*;

    fn build_workbook(shared: &[&str], sheet_rows: &str) -> Vec<u8> {
        let mut archive = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            FileOptions::<'_, ()>::default().compression_method(CompressionMethod::Deflated);

        if !shared.is_empty() {
            let items: String = shared
                .iter()
                .map(|text| format!("<si><t>{text}</t></si>"))
                .collect();
            let body = format!(
                r#"<?xml version="1.0"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">{items}</sst>"#
            );
            archive
                .start_file(SHARED_STRINGS_PART, options)
                .expect("start shared strings");
            archive.write_all(body.as_bytes()).expect("write shared strings");
        }

        let sheet = format!(
            r#"<?xml version="1.0"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{sheet_rows}</sheetData></worksheet>"#
        );
        archive
            .start_file(DEFAULT_SHEET_PART, options)
            .expect("start sheet");
        archive.write_all(sheet.as_bytes()).expect("write sheet");

        archive.finish().expect("finish archive").into_inner()
    }

    #[test]
    fn parses_shared_string_and_numeric_cells() {
        let payload = build_workbook(
            &["Currency", "Rate", "RUB", "EUR"],
            concat!(
                r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>"#,
                r#"<row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><v>90.5</v></c></row>"#,
                r#"<row r="3"><c r="A3" t="s"><v>3</v></c><c r="B3"><v>1.08</v></c></row>"#,
            ),
        );

        let pairs = parse_workbook(&payload).expect("parse");
        assert_eq!(
            pairs,
            vec![("RUB".to_string(), 90.5), ("EUR".to_string(), 1.08)]
        );
    }

    #[test]
    fn parses_inline_string_cells() {
        let payload = build_workbook(
            &[],
            concat!(
                r#"<row r="1"><c r="A1" t="inlineStr"><is><t>Currency</t></is></c><c r="B1" t="inlineStr"><is><t>Rate</t></is></c></row>"#,
                r#"<row r="2"><c r="A2" t="inlineStr"><is><t>GBP</t></is></c><c r="B2"><v>0.79</v></c></row>"#,
            ),
        );

        let pairs = parse_workbook(&payload).expect("parse");
        assert_eq!(pairs, vec![("GBP".to_string(), 0.79)]);
    }

    #[test]
    fn row_with_three_cells_rejects_the_workbook() {
        let payload = build_workbook(
            &[],
            concat!(
                r#"<row r="1"><c t="inlineStr"><is><t>Currency</t></is></c><c><v>0</v></c></row>"#,
                r#"<row r="2"><c t="inlineStr"><is><t>RUB</t></is></c><c><v>90.5</v></c><c><v>9</v></c></row>"#,
            ),
        );

        let result = parse_workbook(&payload);
        assert!(matches!(
            result,
            Err(WorkbookError::MalformedRow { row: 2, cells: 3 })
        ));
    }

    #[test]
    fn row_with_one_cell_rejects_the_workbook() {
        let payload = build_workbook(
            &[],
            concat!(
                r#"<row r="1"><c t="inlineStr"><is><t>Currency</t></is></c><c><v>0</v></c></row>"#,
                r#"<row r="2"><c t="inlineStr"><is><t>RUB</t></is></c></row>"#,
            ),
        );

        assert!(matches!(
            parse_workbook(&payload),
            Err(WorkbookError::MalformedRow { row: 2, cells: 1 })
        ));
    }

    #[test]
    fn non_numeric_rate_rejects_the_workbook() {
        let payload = build_workbook(
            &[],
            concat!(
                r#"<row r="1"><c t="inlineStr"><is><t>Currency</t></is></c><c t="inlineStr"><is><t>Rate</t></is></c></row>"#,
                r#"<row r="2"><c t="inlineStr"><is><t>RUB</t></is></c><c t="inlineStr"><is><t>many</t></is></c></row>"#,
            ),
        );

        assert!(matches!(
            parse_workbook(&payload),
            Err(WorkbookError::InvalidNumber { row: 2 })
        ));
    }

    #[test]
    fn header_only_workbook_yields_no_pairs() {
        let payload = build_workbook(
            &["Currency", "Rate"],
            r#"<row r="1"><c t="s"><v>0</v></c><c t="s"><v>1</v></c></row>"#,
        );
        assert!(parse_workbook(&payload).expect("parse").is_empty());
    }

    #[test]
    fn garbage_payload_is_not_a_workbook() {
        assert!(matches!(
            parse_workbook(b"not a zip container"),
            Err(WorkbookError::InvalidArchive { .. })
        ));
    }

    #[test]
    fn escaped_entities_are_decoded() {
        assert_eq!(unescape("A &amp; B &lt;C&gt;"), "A & B <C>");
    }
}
