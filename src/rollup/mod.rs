//! Per-label rollup of tabular traffic rows.
pub mod labels;

pub use labels::{rollup_by_label, rollup_file, write_rollup, default_output_path, LabelSummary, LabelTotals, RollupError};
