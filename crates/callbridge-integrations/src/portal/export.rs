use std::io::Cursor;

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use callbridge_core::error::{BridgeError, Result};
use callbridge_core::types::RawRows;

/// Parse an XLSX payload into rows of cell text. Only the first sheet is read.
///
/// Cells are re-anchored at column A so fixed column positions hold even when
/// the sheet's used range starts further right.
pub fn parse_workbook(bytes: Vec<u8>) -> Result<RawRows> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e| BridgeError::Export(format!("report payload is not a spreadsheet: {e}")))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| BridgeError::Export("report workbook has no sheets".to_string()))?
        .map_err(|e| BridgeError::Export(format!("failed to read report sheet: {e}")))?;

    let first_col = range.start().map(|(_, col)| col as usize).unwrap_or(0);

    Ok(range
        .rows()
        .map(|row| {
            std::iter::repeat(String::new())
                .take(first_col)
                .chain(row.iter().map(cell_to_string))
                .collect()
        })
        .collect())
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(n) => n.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| dt.to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR({e:?})"),
    }
}

/// Assemble a minimal single-sheet XLSX in memory. Numeric-looking cells are
/// written as numbers, everything else as inline strings.
#[cfg(test)]
pub(crate) fn build_xlsx(rows: &[Vec<&str>]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
    const REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
    const DOC_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

    let mut sheet = format!(r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="{MAIN_NS}"><sheetData>"#);
    for (r, row) in rows.iter().enumerate() {
        sheet.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, value) in row.iter().enumerate() {
            let cell_ref = format!("{}{}", (b'A' + c as u8) as char, r + 1);
            if value.is_empty() {
                continue;
            }
            if value.parse::<f64>().is_ok() {
                sheet.push_str(&format!(r#"<c r="{cell_ref}"><v>{value}</v></c>"#));
            } else {
                sheet.push_str(&format!(
                    r#"<c r="{cell_ref}" t="inlineStr"><is><t>{value}</t></is></c>"#
                ));
            }
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    let files = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#.to_string(),
        ),
        (
            "_rels/.rels",
            format!(r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{DOC_REL}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#),
        ),
        (
            "xl/workbook.xml",
            format!(r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="{MAIN_NS}" xmlns:r="{DOC_REL}"><sheets><sheet name="Report" sheetId="1" r:id="rId1"/></sheets></workbook>"#),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            format!(r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{DOC_REL}/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#),
        ),
        ("xl/worksheets/sheet1.xml", sheet),
    ];

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        zip.start_file(name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_first_sheet_with_header() {
        let bytes = build_xlsx(&[
            vec!["Caller", "Date", "Time"],
            vec!["0811", "2025-07-01", "09:00:00"],
            vec!["0812", "2025-07-01", "09:05:00"],
        ]);
        let rows = parse_workbook(bytes).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], "Caller");
        assert_eq!(rows[2][2], "09:05:00");
    }

    #[test]
    fn test_numbers_render_without_fraction() {
        let bytes = build_xlsx(&[vec!["Duration", "Ratio"], vec!["42", "0.5"]]);
        let rows = parse_workbook(bytes).unwrap();
        assert_eq!(rows[1], vec!["42".to_string(), "0.5".to_string()]);
    }

    #[test]
    fn test_html_payload_is_export_error() {
        let err = parse_workbook(b"<html>login</html>".to_vec()).unwrap_err();
        assert!(matches!(err, BridgeError::Export(_)));
    }
}
