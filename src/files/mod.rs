//! # File Management
//!
//! The file-management collaborator the core schedules work against:
//! uploads with extension/size validation and a JSON metadata sidecar,
//! paged previews, result-file export, listing, deletion, and age-based
//! cleanup.
//!
//! Stored names are uuid-derived and result names carry a timestamp, so two
//! concurrent tasks can never target the same output path.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::FileStorageConfig;
use crate::data::table::Table;
use crate::error::{CoreError, Result};

/// Metadata recorded for each stored upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub file_id: String,
    pub original_name: String,
    pub stored_name: String,
    pub extension: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// One page of preview rows from an uploaded file
#[derive(Debug, Clone, Serialize)]
pub struct PreviewPage {
    pub file_id: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub page: usize,
    pub page_size: usize,
    pub total_rows: usize,
}

/// A produced result file, as listed for download
#[derive(Debug, Clone, Serialize)]
pub struct ResultFile {
    pub filename: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

/// Counts reported by the cleanup sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub uploads_removed: usize,
    pub results_removed: usize,
}

pub struct FileManager {
    config: FileStorageConfig,
}

impl FileManager {
    /// Create the manager, ensuring the storage directories exist
    pub async fn new(config: FileStorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.upload_dir).await?;
        fs::create_dir_all(&config.results_dir).await?;
        info!(
            upload_dir = %config.upload_dir.display(),
            results_dir = %config.results_dir.display(),
            "file manager ready"
        );
        Ok(Self { config })
    }

    pub fn config(&self) -> &FileStorageConfig {
        &self.config
    }

    /// Persist an upload, returning its metadata.
    ///
    /// Rejects disallowed extensions and over-limit sizes before anything
    /// touches disk.
    pub async fn save_upload(&self, original_name: &str, contents: &[u8]) -> Result<StoredFile> {
        let extension = extension_of(original_name)?;
        if !self.config.extension_allowed(&extension) {
            return Err(CoreError::UnsupportedFileType { extension });
        }
        let size_bytes = contents.len() as u64;
        if size_bytes > self.config.max_file_size_bytes {
            return Err(CoreError::FileTooLarge {
                size_bytes,
                limit_bytes: self.config.max_file_size_bytes,
            });
        }

        let file_id = Uuid::new_v4().to_string();
        let stored_name = format!("{file_id}.{extension}");
        let stored = StoredFile {
            file_id: file_id.clone(),
            original_name: original_name.to_string(),
            stored_name: stored_name.clone(),
            extension,
            size_bytes,
            uploaded_at: Utc::now(),
        };

        fs::write(self.config.upload_dir.join(&stored_name), contents).await?;
        let metadata = serde_json::to_vec_pretty(&stored)?;
        fs::write(self.metadata_path(&file_id), metadata).await?;

        info!(
            file_id = %stored.file_id,
            original_name = %stored.original_name,
            size_bytes,
            "upload saved"
        );
        Ok(stored)
    }

    /// Look up a stored upload's metadata
    pub async fn get_file(&self, file_id: &str) -> Result<StoredFile> {
        let raw = fs::read(self.metadata_path(file_id))
            .await
            .map_err(|_| CoreError::FileNotFound {
                file_id: file_id.to_string(),
            })?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Parse a stored upload into a table, skipping `header_row` records
    pub async fn read_table(&self, file_id: &str, header_row: usize) -> Result<Table> {
        let stored = self.get_file(file_id).await?;
        let path = self.config.upload_dir.join(&stored.stored_name);
        let raw = fs::read(&path).await.map_err(|_| CoreError::FileNotFound {
            file_id: file_id.to_string(),
        })?;
        let text = String::from_utf8_lossy(&raw);
        Table::parse_delimited(&text, delimiter_for(&stored.extension), header_row)
    }

    /// Paged preview of an uploaded file. Page size is clamped to the
    /// configured maximum.
    pub async fn read_preview(
        &self,
        file_id: &str,
        header_row: usize,
        page: usize,
        page_size: usize,
    ) -> Result<PreviewPage> {
        let page_size = page_size.clamp(1, self.config.max_preview_rows);
        let table = self.read_table(file_id, header_row).await?;
        Ok(PreviewPage {
            file_id: file_id.to_string(),
            columns: table.columns.clone(),
            rows: table.page(page, page_size).to_vec(),
            page,
            page_size,
            total_rows: table.row_count(),
        })
    }

    /// Export a table under a sanitized, timestamped name in the results
    /// directory. Returns the full path of the written file.
    pub async fn save_result(
        &self,
        table: &Table,
        filename: &str,
        extension: &str,
    ) -> Result<PathBuf> {
        let base = sanitize_filename(filename);
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let result_name = format!("{base}_{timestamp}.{extension}");
        let path = self.config.results_dir.join(&result_name);

        let rendered = table.to_delimited(delimiter_for(extension));
        fs::write(&path, rendered.as_bytes()).await?;

        info!(result = %path.display(), rows = table.row_count(), "result file written");
        Ok(path)
    }

    /// All stored uploads, newest first
    pub async fn list_files(&self) -> Result<Vec<StoredFile>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.config.upload_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read(&path).await {
                Ok(raw) => match serde_json::from_slice::<StoredFile>(&raw) {
                    Ok(stored) => files.push(stored),
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping bad metadata"),
                },
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable metadata"),
            }
        }
        files.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(files)
    }

    /// All exported result files, newest first
    pub async fn list_results(&self) -> Result<Vec<ResultFile>> {
        let mut results = Vec::new();
        let mut entries = fs::read_dir(&self.config.results_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let modified_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            results.push(ResultFile {
                filename: entry.file_name().to_string_lossy().to_string(),
                size_bytes: metadata.len(),
                modified_at,
            });
        }
        results.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(results)
    }

    /// Delete an upload and its metadata sidecar
    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        let stored = self.get_file(file_id).await?;
        fs::remove_file(self.config.upload_dir.join(&stored.stored_name)).await?;
        fs::remove_file(self.metadata_path(file_id)).await?;
        info!(file_id, original_name = %stored.original_name, "upload deleted");
        Ok(())
    }

    /// Remove uploads and results older than the retention window
    pub async fn cleanup_old_files(&self, older_than: Duration) -> Result<CleanupReport> {
        let cutoff = Utc::now() - older_than;
        let mut report = CleanupReport::default();

        for stored in self.list_files().await? {
            if stored.uploaded_at < cutoff {
                if self.delete_file(&stored.file_id).await.is_ok() {
                    report.uploads_removed += 1;
                }
            }
        }
        for result in self.list_results().await? {
            if result.modified_at < cutoff {
                let path = self.config.results_dir.join(&result.filename);
                if fs::remove_file(&path).await.is_ok() {
                    report.results_removed += 1;
                }
            }
        }

        if report.uploads_removed > 0 || report.results_removed > 0 {
            info!(
                uploads_removed = report.uploads_removed,
                results_removed = report.results_removed,
                "expired files cleaned up"
            );
        } else {
            debug!("cleanup sweep found nothing to remove");
        }
        Ok(report)
    }

    fn metadata_path(&self, file_id: &str) -> PathBuf {
        self.config.upload_dir.join(format!("{file_id}.meta.json"))
    }
}

fn extension_of(filename: &str) -> Result<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| CoreError::UnsupportedFileType {
            extension: String::new(),
        })
}

fn delimiter_for(extension: &str) -> char {
    match extension {
        "tsv" => '\t',
        _ => ',',
    }
}

/// Keep letters, digits, dash, underscore, and dot; everything else becomes
/// an underscore. An empty result falls back to a default base name.
fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_').to_string();
    if trimmed.is_empty() {
        "merged_data".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_hostile_filenames() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("report 2026!.csv"), "report_2026_.csv");
        assert_eq!(sanitize_filename("...."), "merged_data");
    }

    #[test]
    fn extension_detection() {
        assert_eq!(extension_of("data.CSV").unwrap(), "csv");
        assert!(extension_of("no_extension").is_err());
    }
}
