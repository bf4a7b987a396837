//! CSV export of all sales
//!
//! Output is UTF-8 with CRLF line endings. A field is quoted only when it
//! contains a comma, a double quote, CR or LF; embedded quotes are doubled.

use raffle_core::domain::Sale;

/// Suggested file name for the download
pub const EXPORT_FILENAME: &str = "sales_export.csv";

/// `Content-Disposition` value that triggers a download as [`EXPORT_FILENAME`]
pub const CONTENT_DISPOSITION: &str = "attachment; filename=sales_export.csv";

/// MIME type of the export body
pub const CONTENT_TYPE: &str = "text/csv; charset=utf-8";

const HEADER: [&str; 2] = ["number", "buyer_name"];

/// A rendered export, ready to be written to a file or a response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    pub filename: &'static str,
    pub content_disposition: &'static str,
    pub content_type: &'static str,
    pub body: String,
    /// Data rows, excluding the header
    pub rows: usize,
}

/// Render `number,buyer_name` rows in the order given
pub fn render_sales(sales: &[Sale]) -> CsvExport {
    let mut body = String::with_capacity(16 + sales.len() * 24);
    write_record(&mut body, HEADER.iter().copied());
    for sale in sales {
        let number = sale.number.to_string();
        write_record(&mut body, [number.as_str(), sale.buyer.name()]);
    }

    CsvExport {
        filename: EXPORT_FILENAME,
        content_disposition: CONTENT_DISPOSITION,
        content_type: CONTENT_TYPE,
        body,
        rows: sales.len(),
    }
}

fn write_record<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_field(out, field);
    }
    out.push_str("\r\n");
}

fn write_field(out: &mut String, field: &str) {
    if !field.contains([',', '"', '\r', '\n']) {
        out.push_str(field);
        return;
    }
    out.push('"');
    for ch in field.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use raffle_core::domain::{Buyer, TicketNumber, UserId};

    use super::*;

    fn sale(number: i64, name: &str) -> Sale {
        Sale {
            id: number,
            number: TicketNumber::new(number, 100_000).unwrap(),
            seller_id: UserId::new(1),
            buyer: Buyer::new(name, "555").unwrap(),
            sold_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_header_only_when_empty() {
        let export = render_sales(&[]);
        assert_eq!(export.body, "number,buyer_name\r\n");
        assert_eq!(export.rows, 0);
    }

    #[test]
    fn test_plain_rows() {
        let export = render_sales(&[sale(3, "Ana"), sale(12, "Bob Smith")]);
        assert_eq!(export.body, "number,buyer_name\r\n3,Ana\r\n12,Bob Smith\r\n");
        assert_eq!(export.rows, 2);
    }

    #[test]
    fn test_quoting() {
        let export = render_sales(&[sale(1, "Smith, John"), sale(2, "The \"Boss\"")]);
        let lines: Vec<&str> = export.body.split("\r\n").collect();
        assert_eq!(lines[1], "1,\"Smith, John\"");
        assert_eq!(lines[2], "2,\"The \"\"Boss\"\"\"");
    }

    #[test]
    fn test_non_ascii_passes_through() {
        let export = render_sales(&[sale(7, "José Müller")]);
        assert!(export.body.ends_with("7,José Müller\r\n"));
    }

    #[test]
    fn test_download_hints() {
        let export = render_sales(&[]);
        assert_eq!(export.filename, "sales_export.csv");
        assert_eq!(
            export.content_disposition,
            format!("attachment; filename={}", EXPORT_FILENAME)
        );
    }
}
