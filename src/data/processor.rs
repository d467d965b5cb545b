//! Cleaning, merging, and extraction passes over in-memory tables.
//!
//! The processor is a per-run object: `process` resets its counters, applies
//! the configured passes in a fixed order (merge, column configuration,
//! empty-row removal, numeric cleaning, date parsing, deduplication,
//! fixed-cell extraction), and reports a summary of what it did.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use super::table::Table;
use crate::error::{CoreError, Result};

/// Column name added to the merged result identifying each row's source file
pub const SOURCE_COLUMN: &str = "source_file";

const COMMON_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y%m%d",
];

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '¥', '￥', '£', '₹', '₽'];

/// How multiple tables are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Union of all columns; missing cells become empty
    #[default]
    Outer,
    /// Only columns present in every input
    Inner,
}

/// Which of a set of duplicate rows survives deduplication
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepStrategy {
    #[default]
    First,
    Last,
}

/// Rule extracting one cell from a source file into a constant result column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedCellRule {
    /// Source name of the table the cell is read from
    pub source_name: String,
    /// Zero-based row index into the source table's data rows
    pub row: usize,
    /// Zero-based column index into the source table
    pub column: usize,
    /// Name of the new result column
    pub target_column: String,
}

/// Cleaning options submitted alongside a merge request
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CleaningOptions {
    pub merge_strategy: MergeStrategy,
    /// Rename map applied to merged columns (old name → new name)
    pub rename_columns: HashMap<String, String>,
    /// If non-empty, restrict and reorder the output to these columns
    pub column_order: Vec<String>,
    pub remove_empty_rows: bool,
    /// Columns that define "empty" for row removal; empty means all columns
    pub key_columns: Vec<String>,
    pub clean_numeric: bool,
    /// Columns to clean numerically; empty means none
    pub numeric_columns: Vec<String>,
    pub parse_dates: bool,
    /// Columns to normalize as dates; empty means none
    pub date_columns: Vec<String>,
    pub remove_duplicates: bool,
    /// Columns that define duplicate identity; empty means all columns
    pub duplicate_columns: Vec<String>,
    pub keep_strategy: KeepStrategy,
    pub fixed_cells_rules: Vec<FixedCellRule>,
}

/// Counters accumulated across one processing run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingSummary {
    pub input_rows: usize,
    pub output_rows: usize,
    pub output_columns: usize,
    pub sources_merged: usize,
    pub empty_rows_removed: usize,
    pub duplicates_removed: usize,
    pub numeric_cells_cleaned: usize,
    pub dates_parsed: usize,
}

#[derive(Debug, Default)]
pub struct DataProcessor {
    summary: ProcessingSummary,
}

impl DataProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the full pipeline over `(table, source_name)` pairs
    pub fn process(
        &mut self,
        tables: Vec<(Table, String)>,
        options: &CleaningOptions,
    ) -> Result<Table> {
        self.summary = ProcessingSummary::default();

        if tables.is_empty() {
            return Err(CoreError::MalformedCsv {
                message: "no input tables to process".to_string(),
            });
        }

        // Fixed-cell rules read from the raw inputs, so capture them before
        // the originals are consumed by the merge.
        let fixed_cells = self.collect_fixed_cells(&tables, &options.fixed_cells_rules)?;

        let mut result = self.merge(tables, options.merge_strategy)?;

        result = apply_column_configuration(result, options);

        if options.remove_empty_rows {
            result = self.remove_empty_rows(result, &options.key_columns);
        }
        if options.clean_numeric {
            result = self.clean_numeric(result, &options.numeric_columns);
        }
        if options.parse_dates {
            result = self.parse_dates(result, &options.date_columns);
        }
        if options.remove_duplicates {
            result = self.remove_duplicates(result, &options.duplicate_columns, options.keep_strategy);
        }

        for (target_column, value) in fixed_cells {
            let width = result.column_count();
            result.columns.push(target_column);
            for row in &mut result.rows {
                row.resize(width + 1, String::new());
                row[width] = value.clone();
            }
        }

        self.summary.output_rows = result.row_count();
        self.summary.output_columns = result.column_count();

        info!(
            input_rows = self.summary.input_rows,
            output_rows = self.summary.output_rows,
            duplicates_removed = self.summary.duplicates_removed,
            empty_rows_removed = self.summary.empty_rows_removed,
            "data processing finished"
        );

        Ok(result)
    }

    /// Summary of the most recent `process` run
    pub fn summary(&self) -> &ProcessingSummary {
        &self.summary
    }

    /// Combine tables under a union (outer) or intersection (inner) of
    /// columns, appending a source column identifying each row's origin.
    fn merge(&mut self, tables: Vec<(Table, String)>, strategy: MergeStrategy) -> Result<Table> {
        self.summary.sources_merged = tables.len();

        let standardized: Vec<(Table, String)> = tables
            .into_iter()
            .map(|(table, source)| (standardize_column_names(table), source))
            .collect();

        let mut columns: Vec<String> = Vec::new();
        match strategy {
            MergeStrategy::Outer => {
                for (table, _) in &standardized {
                    for column in &table.columns {
                        if !columns.contains(column) {
                            columns.push(column.clone());
                        }
                    }
                }
            }
            MergeStrategy::Inner => {
                columns = standardized[0].0.columns.clone();
                for (table, _) in &standardized[1..] {
                    columns.retain(|c| table.columns.contains(c));
                }
                if columns.is_empty() {
                    return Err(CoreError::MalformedCsv {
                        message: "inner merge produced no common columns".to_string(),
                    });
                }
            }
        }
        columns.push(SOURCE_COLUMN.to_string());

        let mut merged = Table::new(columns);
        for (table, source) in standardized {
            self.summary.input_rows += table.row_count();
            let index_map: Vec<Option<usize>> = merged
                .columns
                .iter()
                .map(|column| table.column_index(column))
                .collect();
            for row in &table.rows {
                let mut out_row: Vec<String> = index_map
                    .iter()
                    .map(|slot| slot.map(|i| row[i].clone()).unwrap_or_default())
                    .collect();
                // Last slot is the source column
                if let Some(last) = out_row.last_mut() {
                    *last = source.clone();
                }
                merged.rows.push(out_row);
            }
        }

        debug!(
            sources = self.summary.sources_merged,
            rows = merged.row_count(),
            columns = merged.column_count(),
            "tables merged"
        );
        Ok(merged)
    }

    fn remove_empty_rows(&mut self, mut table: Table, key_columns: &[String]) -> Table {
        let indices: Vec<usize> = if key_columns.is_empty() {
            // Everything except the source column we appended ourselves
            table
                .columns
                .iter()
                .enumerate()
                .filter(|(_, name)| name.as_str() != SOURCE_COLUMN)
                .map(|(i, _)| i)
                .collect()
        } else {
            key_columns
                .iter()
                .filter_map(|name| table.column_index(name))
                .collect()
        };

        if indices.is_empty() {
            return table;
        }

        let before = table.row_count();
        table
            .rows
            .retain(|row| indices.iter().any(|&i| !row[i].trim().is_empty()));
        self.summary.empty_rows_removed += before - table.row_count();
        table
    }

    /// Strip currency symbols and thousands separators from numeric columns
    fn clean_numeric(&mut self, mut table: Table, numeric_columns: &[String]) -> Table {
        let indices: Vec<usize> = numeric_columns
            .iter()
            .filter_map(|name| table.column_index(name))
            .collect();

        for row in &mut table.rows {
            for &i in &indices {
                if let Some(cleaned) = clean_numeric_value(&row[i]) {
                    if cleaned != row[i] {
                        self.summary.numeric_cells_cleaned += 1;
                        row[i] = cleaned;
                    }
                }
            }
        }
        table
    }

    /// Normalize recognizable date values to ISO `%Y-%m-%d`
    fn parse_dates(&mut self, mut table: Table, date_columns: &[String]) -> Table {
        let indices: Vec<usize> = date_columns
            .iter()
            .filter_map(|name| table.column_index(name))
            .collect();

        for row in &mut table.rows {
            for &i in &indices {
                if let Some(date) = parse_date_value(&row[i]) {
                    let rendered = date.format("%Y-%m-%d").to_string();
                    if rendered != row[i] {
                        self.summary.dates_parsed += 1;
                        row[i] = rendered;
                    }
                }
            }
        }
        table
    }

    fn remove_duplicates(
        &mut self,
        mut table: Table,
        duplicate_columns: &[String],
        keep: KeepStrategy,
    ) -> Table {
        let indices: Vec<usize> = if duplicate_columns.is_empty() {
            (0..table.column_count()).collect()
        } else {
            duplicate_columns
                .iter()
                .filter_map(|name| table.column_index(name))
                .collect()
        };
        if indices.is_empty() {
            return table;
        }

        let before = table.row_count();
        let key_of = |row: &Vec<String>| -> Vec<String> {
            indices.iter().map(|&i| row[i].clone()).collect()
        };

        let mut seen: std::collections::HashSet<Vec<String>> = std::collections::HashSet::new();
        match keep {
            KeepStrategy::First => {
                table.rows.retain(|row| seen.insert(key_of(row)));
            }
            KeepStrategy::Last => {
                let mut kept: Vec<Vec<String>> = Vec::new();
                for row in table.rows.into_iter().rev() {
                    if seen.insert(key_of(&row)) {
                        kept.push(row);
                    }
                }
                kept.reverse();
                table.rows = kept;
            }
        }
        self.summary.duplicates_removed += before - table.row_count();
        table
    }

    fn collect_fixed_cells(
        &self,
        tables: &[(Table, String)],
        rules: &[FixedCellRule],
    ) -> Result<Vec<(String, String)>> {
        let mut cells = Vec::with_capacity(rules.len());
        for rule in rules {
            let (table, _) = tables
                .iter()
                .find(|(_, source)| *source == rule.source_name)
                .ok_or_else(|| CoreError::MalformedCsv {
                    message: format!("fixed-cell rule references unknown source {}", rule.source_name),
                })?;
            let value = table
                .rows
                .get(rule.row)
                .and_then(|row| row.get(rule.column))
                .cloned()
                .unwrap_or_default();
            cells.push((rule.target_column.clone(), value));
        }
        Ok(cells)
    }
}

/// Trim whitespace, collapse internal runs, and disambiguate repeated names
fn standardize_column_names(mut table: Table) -> Table {
    let mut seen: HashMap<String, usize> = HashMap::new();
    table.columns = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let mut name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
            if name.is_empty() {
                name = format!("column_{}", i + 1);
            }
            let count = seen.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                format!("{name}_{count}")
            } else {
                name
            }
        })
        .collect();
    table
}

fn apply_column_configuration(mut table: Table, options: &CleaningOptions) -> Table {
    if !options.rename_columns.is_empty() {
        for column in &mut table.columns {
            if let Some(new_name) = options.rename_columns.get(column) {
                *column = new_name.clone();
            }
        }
    }

    if options.column_order.is_empty() {
        return table;
    }

    // Restrict and reorder; the source column tags along at the end unless
    // explicitly placed.
    let mut wanted: Vec<String> = options.column_order.clone();
    if !wanted.iter().any(|c| c == SOURCE_COLUMN) && table.column_index(SOURCE_COLUMN).is_some() {
        wanted.push(SOURCE_COLUMN.to_string());
    }

    let indices: Vec<usize> = wanted
        .iter()
        .filter_map(|name| table.column_index(name))
        .collect();
    let columns: Vec<String> = indices.iter().map(|&i| table.columns[i].clone()).collect();
    let rows = table
        .rows
        .iter()
        .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
        .collect();

    Table { columns, rows }
}

fn clean_numeric_value(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let stripped: String = trimmed
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c) && *c != ',' && !c.is_whitespace())
        .collect();
    stripped.parse::<f64>().ok().map(|_| stripped)
}

fn parse_date_value(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in COMMON_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    // Datetime values reduce to their date part
    for format in ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(datetime) = chrono::NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(datetime.date());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        let mut t = Table::new(columns.iter().map(|s| s.to_string()).collect());
        for row in rows {
            t.push_row(row.iter().map(|s| s.to_string()).collect());
        }
        t
    }

    #[test]
    fn outer_merge_unions_columns_and_tags_sources() {
        let a = table(&["name", "qty"], &[&["apple", "3"]]);
        let b = table(&["name", "price"], &[&["pear", "1.50"]]);

        let mut processor = DataProcessor::new();
        let result = processor
            .process(
                vec![(a, "north.csv".to_string()), (b, "south.csv".to_string())],
                &CleaningOptions::default(),
            )
            .unwrap();

        assert_eq!(result.columns, vec!["name", "qty", "price", SOURCE_COLUMN]);
        assert_eq!(result.rows[0], vec!["apple", "3", "", "north.csv"]);
        assert_eq!(result.rows[1], vec!["pear", "", "1.50", "south.csv"]);
        assert_eq!(processor.summary().sources_merged, 2);
        assert_eq!(processor.summary().input_rows, 2);
    }

    #[test]
    fn inner_merge_keeps_only_common_columns() {
        let a = table(&["name", "qty"], &[&["apple", "3"]]);
        let b = table(&["name", "price"], &[&["pear", "1.50"]]);

        let options = CleaningOptions {
            merge_strategy: MergeStrategy::Inner,
            ..Default::default()
        };
        let mut processor = DataProcessor::new();
        let result = processor
            .process(
                vec![(a, "a".to_string()), (b, "b".to_string())],
                &options,
            )
            .unwrap();

        assert_eq!(result.columns, vec!["name", SOURCE_COLUMN]);
    }

    #[test]
    fn empty_rows_are_removed_by_key_columns() {
        let input = table(
            &["name", "qty"],
            &[&["apple", "3"], &["", ""], &["  ", "2"]],
        );
        let options = CleaningOptions {
            remove_empty_rows: true,
            key_columns: vec!["name".to_string()],
            ..Default::default()
        };
        let mut processor = DataProcessor::new();
        let result = processor
            .process(vec![(input, "x".to_string())], &options)
            .unwrap();

        assert_eq!(result.row_count(), 1);
        assert_eq!(processor.summary().empty_rows_removed, 2);
    }

    #[test]
    fn duplicates_removed_keeping_first() {
        let input = table(
            &["name", "qty"],
            &[&["apple", "3"], &["apple", "3"], &["pear", "1"]],
        );
        let options = CleaningOptions {
            remove_duplicates: true,
            duplicate_columns: vec!["name".to_string()],
            ..Default::default()
        };
        let mut processor = DataProcessor::new();
        let result = processor
            .process(vec![(input, "x".to_string())], &options)
            .unwrap();

        assert_eq!(result.row_count(), 2);
        assert_eq!(processor.summary().duplicates_removed, 1);
    }

    #[test]
    fn numeric_and_date_cleaning() {
        let input = table(
            &["amount", "day"],
            &[&["$1,234.50", "2026/08/01"], &["not a number", "unknown"]],
        );
        let options = CleaningOptions {
            clean_numeric: true,
            numeric_columns: vec!["amount".to_string()],
            parse_dates: true,
            date_columns: vec!["day".to_string()],
            ..Default::default()
        };
        let mut processor = DataProcessor::new();
        let result = processor
            .process(vec![(input, "x".to_string())], &options)
            .unwrap();

        assert_eq!(result.rows[0][0], "1234.50");
        assert_eq!(result.rows[0][1], "2026-08-01");
        // Unparseable cells are left alone
        assert_eq!(result.rows[1][0], "not a number");
        assert_eq!(result.rows[1][1], "unknown");
        assert_eq!(processor.summary().numeric_cells_cleaned, 1);
        assert_eq!(processor.summary().dates_parsed, 1);
    }

    #[test]
    fn fixed_cells_become_constant_columns() {
        let input = table(&["name"], &[&["apple"], &["pear"]]);
        let options = CleaningOptions {
            fixed_cells_rules: vec![FixedCellRule {
                source_name: "report.csv".to_string(),
                row: 0,
                column: 0,
                target_column: "report_title".to_string(),
            }],
            ..Default::default()
        };
        let mut processor = DataProcessor::new();
        let result = processor
            .process(vec![(input, "report.csv".to_string())], &options)
            .unwrap();

        assert_eq!(result.columns.last().unwrap(), "report_title");
        assert_eq!(result.rows[0].last().unwrap(), "apple");
        assert_eq!(result.rows[1].last().unwrap(), "apple");
    }

    #[test]
    fn duplicate_column_names_are_disambiguated() {
        let input = table(&["name", " name "], &[&["a", "b"]]);
        let mut processor = DataProcessor::new();
        let result = processor
            .process(vec![(input, "x".to_string())], &CleaningOptions::default())
            .unwrap();
        assert_eq!(result.columns, vec!["name", "name_2", SOURCE_COLUMN]);
    }

    #[test]
    fn rename_and_reorder_columns() {
        let input = table(&["name", "qty"], &[&["apple", "3"]]);
        let mut rename = HashMap::new();
        rename.insert("qty".to_string(), "quantity".to_string());
        let options = CleaningOptions {
            rename_columns: rename,
            column_order: vec!["quantity".to_string(), "name".to_string()],
            ..Default::default()
        };
        let mut processor = DataProcessor::new();
        let result = processor
            .process(vec![(input, "x".to_string())], &options)
            .unwrap();

        assert_eq!(
            result.columns,
            vec!["quantity", "name", SOURCE_COLUMN]
        );
        assert_eq!(result.rows[0], vec!["3", "apple", "x"]);
    }

    #[test]
    fn empty_input_is_rejected() {
        let mut processor = DataProcessor::new();
        assert!(processor
            .process(Vec::new(), &CleaningOptions::default())
            .is_err());
    }
}
