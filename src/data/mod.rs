//! Tabular data processing
//!
//! The work the core schedules: an in-memory table model with a small
//! delimiter-separated codec, the cleaning/merging pipeline, and the merge
//! job builder that turns a request into a submittable work function.

pub mod merge;
pub mod processor;
pub mod table;

pub use merge::{merge_job, ExportOptions, MergeFileConfig, MergeRequest, MERGE_TASK_TYPE};
pub use processor::{
    CleaningOptions, DataProcessor, FixedCellRule, KeepStrategy, MergeStrategy, ProcessingSummary,
    SOURCE_COLUMN,
};
pub use table::Table;
