use serde::Serialize;

use crate::error::{CoreError, Result};

/// In-memory tabular data: one header row plus string-valued cells.
///
/// Every row is normalized to the header width at parse time, so consumers
/// can index cells without bounds anxiety.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Push a row, padding or truncating it to the header width
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.columns.len(), String::new());
        self.rows.push(row);
    }

    /// Index of a named column
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Zero-based page of rows for previewing
    pub fn page(&self, page: usize, page_size: usize) -> &[Vec<String>] {
        let start = page.saturating_mul(page_size).min(self.rows.len());
        let end = start.saturating_add(page_size).min(self.rows.len());
        &self.rows[start..end]
    }

    /// Parse delimiter-separated text. `header_row` records are skipped, the
    /// next record becomes the header, everything after it becomes data.
    ///
    /// Quoting follows the usual CSV rules: fields may be wrapped in double
    /// quotes, embedded quotes double up, and quoted fields may contain the
    /// delimiter and line breaks.
    pub fn parse_delimited(input: &str, delimiter: char, header_row: usize) -> Result<Table> {
        let mut records = parse_records(input, delimiter)?;
        if records.len() <= header_row {
            return Err(CoreError::MalformedCsv {
                message: format!(
                    "header row {header_row} requested but input has only {} record(s)",
                    records.len()
                ),
            });
        }

        let mut remainder = records.split_off(header_row);
        let columns = remainder.remove(0);
        let mut table = Table::new(columns);
        for row in remainder {
            // Trailing blank record from a final newline
            if row.len() == 1 && row[0].is_empty() {
                continue;
            }
            table.push_row(row);
        }
        Ok(table)
    }

    /// Serialize to delimiter-separated text with a trailing newline
    pub fn to_delimited(&self, delimiter: char) -> String {
        let mut out = String::new();
        write_record(&mut out, &self.columns, delimiter);
        for row in &self.rows {
            write_record(&mut out, row, delimiter);
        }
        out
    }
}

fn write_record(out: &mut String, record: &[String], delimiter: char) {
    for (i, field) in record.iter().enumerate() {
        if i > 0 {
            out.push(delimiter);
        }
        let needs_quoting = field.contains(delimiter)
            || field.contains('"')
            || field.contains('\n')
            || field.contains('\r');
        if needs_quoting {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
}

fn parse_records(input: &str, delimiter: char) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            c if c == delimiter => record.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(CoreError::MalformedCsv {
            message: "unterminated quoted field".to_string(),
        });
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_csv() {
        let table = Table::parse_delimited("name,qty\napple,3\npear,5\n", ',', 0).unwrap();
        assert_eq!(table.columns, vec!["name", "qty"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0], vec!["apple", "3"]);
    }

    #[test]
    fn respects_header_row_offset() {
        let input = "exported 2026-08-01\nname,qty\napple,3\n";
        let table = Table::parse_delimited(input, ',', 1).unwrap();
        assert_eq!(table.columns, vec!["name", "qty"]);
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn handles_quoted_fields_and_embedded_delimiters() {
        let input = "name,note\n\"Smith, Jane\",\"said \"\"hi\"\"\"\n\"multi\nline\",x\n";
        let table = Table::parse_delimited(input, ',', 0).unwrap();
        assert_eq!(table.rows[0][0], "Smith, Jane");
        assert_eq!(table.rows[0][1], "said \"hi\"");
        assert_eq!(table.rows[1][0], "multi\nline");
    }

    #[test]
    fn short_rows_are_padded_to_header_width() {
        let table = Table::parse_delimited("a,b,c\n1,2\n", ',', 0).unwrap();
        assert_eq!(table.rows[0], vec!["1", "2", ""]);
    }

    #[test]
    fn unterminated_quote_is_malformed() {
        let result = Table::parse_delimited("a,b\n\"open,2\n", ',', 0);
        assert!(matches!(result, Err(CoreError::MalformedCsv { .. })));
    }

    #[test]
    fn round_trips_through_serialization() {
        let input = "name,note\n\"Smith, Jane\",plain\n";
        let table = Table::parse_delimited(input, ',', 0).unwrap();
        let rendered = table.to_delimited(',');
        let reparsed = Table::parse_delimited(&rendered, ',', 0).unwrap();
        assert_eq!(table, reparsed);
    }

    #[test]
    fn paging_clamps_to_available_rows() {
        let table = Table::parse_delimited("a\n1\n2\n3\n", ',', 0).unwrap();
        assert_eq!(table.page(0, 2).len(), 2);
        assert_eq!(table.page(1, 2).len(), 1);
        assert_eq!(table.page(2, 2).len(), 0);
    }
}
