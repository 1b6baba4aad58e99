pub mod batch;
pub mod session;

pub use batch::{analyse_batch, collect_captures, report_path, BatchError, BatchOutcome};
pub use session::{analyse_capture, FlowAnalysis};
