//! Several captures in one run. Each file is analysed on its own and gets its
//! own report; no flow state is shared between files.
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;
use crate::analysis::session::{analyse_capture, FlowAnalysis};
use crate::capture::CaptureError;
use crate::config::Config;
use crate::report::{ReportError, ReportFormat};

const CAPTURE_EXTENSIONS: &[&str] = &["pcap", "pcapng"];

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Cannot list captures in '{}': {source}", .path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Cannot create report '{}': {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Writing report '{}' failed: {source}", .path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: ReportError,
    },

    #[error("'{}' and '{}' would both be reported to '{}'", .first.display(), .second.display(), .report.display())]
    DuplicateReport {
        first: PathBuf,
        second: PathBuf,
        report: PathBuf,
    },
}

/// Result of one capture in a batch.
#[derive(Debug)]
pub struct BatchOutcome {
    pub capture: PathBuf,
    pub report: PathBuf,
    pub analysis: FlowAnalysis,
}

fn is_capture_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| CAPTURE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
            .unwrap_or(false)
}

/// Expands directories into the capture files they hold (sorted by path).
/// Other inputs are passed through unchanged, in order.
pub fn collect_captures(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, BatchError> {
    let mut captures = Vec::new();

    for input in inputs {
        if !input.is_dir() {
            captures.push(input.clone());
            continue;
        }

        let entries = fs::read_dir(input).map_err(|source| BatchError::Scan {
            path: input.clone(),
            source,
        })?;
        let mut found: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| is_capture_file(path))
            .collect();
        found.sort();

        log::info!("{} captures in {}", found.len(), input.display());
        captures.extend(found);
    }

    Ok(captures)
}

pub fn report_extension(format: ReportFormat) -> &'static str {
    match format {
        ReportFormat::Text => "txt",
        ReportFormat::Csv | ReportFormat::Hosts => "csv",
        ReportFormat::Json => "json",
    }
}

/// `<out_dir>/<capture stem>.<ext>`
pub fn report_path(capture: &Path, out_dir: &Path, format: ReportFormat) -> PathBuf {
    let stem = capture
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "capture".to_string());
    out_dir.join(format!("{}.{}", stem, report_extension(format)))
}

/// Analyses every capture with a fresh flow table and writes one report per
/// file into `out_dir`. `on_done` is called after each file.
///
/// Stops at the first capture that cannot be read or reported.
pub fn analyse_batch<F>(
    captures: &[PathBuf],
    config: &Config,
    out_dir: &Path,
    mut on_done: F,
) -> Result<Vec<BatchOutcome>, BatchError>
where
    F: FnMut(&BatchOutcome),
{
    let mut reports: HashSet<PathBuf> = HashSet::new();
    let mut outcomes: Vec<BatchOutcome> = Vec::with_capacity(captures.len());

    for capture in captures {
        let report = report_path(capture, out_dir, config.report.format);
        if !reports.insert(report.clone()) {
            let first = outcomes
                .iter()
                .find(|outcome| outcome.report == report)
                .map(|outcome| outcome.capture.clone())
                .unwrap_or_default();
            return Err(BatchError::DuplicateReport {
                first,
                second: capture.clone(),
                report,
            });
        }

        let analysis = analyse_capture(capture, config)?;

        let file = File::create(&report).map_err(|source| BatchError::Create {
            path: report.clone(),
            source,
        })?;
        analysis
            .write_report(BufWriter::new(file), &config.report)
            .map_err(|source| BatchError::Report {
                path: report.clone(),
                source,
            })?;
        log::info!("{} -> {}", capture.display(), report.display());

        let outcome = BatchOutcome {
            capture: capture.clone(),
            report,
            analysis,
        };
        on_done(&outcome);
        outcomes.push(outcome);
    }

    Ok(outcomes)
}
