//! Merge job construction
//!
//! Builds the work function for a file-merge task: read the configured
//! uploads, run the processing pipeline, export the result, and return a
//! JSON description of what was produced. Progress is reported in the
//! stages the web layer displays: reading 10→40, processing 40→80,
//! exporting 80→95, done 100.

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use super::processor::{CleaningOptions, DataProcessor};
use super::table::Table;
use crate::files::FileManager;
use crate::task::{work_fn, WorkFn};

/// One input file in a merge request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeFileConfig {
    pub file_id: String,
    /// Records to skip before the header row
    #[serde(default)]
    pub header_row: usize,
    /// Display name used for the source column; defaults to the original
    /// upload name
    #[serde(default)]
    pub source_name: Option<String>,
}

/// Export settings for the merged result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Output extension; `csv` or `tsv`
    pub format: String,
    pub filename: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: "csv".to_string(),
            filename: "merged_data".to_string(),
        }
    }
}

/// A complete merge request as submitted by the web layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub file_configs: Vec<MergeFileConfig>,
    #[serde(default)]
    pub cleaning_options: CleaningOptions,
    #[serde(default)]
    pub export_options: ExportOptions,
}

/// Task type label used for merge submissions
pub const MERGE_TASK_TYPE: &str = "merge";

/// Build the boxed work function for a merge request.
///
/// The returned closure is what gets submitted to the task core; it owns
/// everything it needs and talks back only through its return value and the
/// progress reporter.
pub fn merge_job(files: Arc<FileManager>, request: MergeRequest) -> WorkFn {
    work_fn(move |progress| {
        Box::pin(async move {
            if request.file_configs.is_empty() {
                return Err(anyhow!("no input files specified"));
            }
            let format = request.export_options.format.to_ascii_lowercase();
            if format != "csv" && format != "tsv" {
                return Err(anyhow!("unsupported export format: {format}"));
            }

            progress.update(10, "reading input files");

            let total = request.file_configs.len();
            let mut tables: Vec<(Table, String)> = Vec::with_capacity(total);
            for (i, file_config) in request.file_configs.iter().enumerate() {
                let stored = files
                    .get_file(&file_config.file_id)
                    .await
                    .with_context(|| format!("looking up file {}", file_config.file_id))?;
                let source_name = file_config
                    .source_name
                    .clone()
                    .unwrap_or_else(|| stored.original_name.clone());
                let table = files
                    .read_table(&file_config.file_id, file_config.header_row)
                    .await
                    .with_context(|| format!("reading {source_name}"))?;
                tables.push((table, source_name.clone()));
                progress.update(
                    (10 + (i + 1) * 30 / total) as u8,
                    format!("read {source_name}"),
                );
            }

            progress.update(40, "processing data");
            let mut processor = DataProcessor::new();
            let result = processor.process(tables, &request.cleaning_options)?;
            let summary = processor.summary().clone();

            progress.update(80, "exporting result");
            let result_path = files
                .save_result(&result, &request.export_options.filename, &format)
                .await
                .context("writing result file")?;

            progress.update(95, "generating processing report");
            let result_file = result_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            progress.update(100, "done");
            Ok(json!({
                "result_file": result_file,
                "result_path": result_path.to_string_lossy(),
                "export_format": format,
                "total_rows": result.row_count(),
                "total_columns": result.column_count(),
                "summary": summary,
            }))
        })
    })
}
