use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use crate::utils::{format_megabytes, parse_volume};

#[derive(Error, Debug)]
pub enum RollupError {
    #[error("Cannot open '{}': {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed traffic table: {0}")]
    Csv(#[from] csv::Error),

    #[error("Row {row}: cannot parse {column} volume '{value}'")]
    InvalidVolume {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("Writing rollup failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One row of a per-host traffic table, as produced by a capture report.
#[derive(Debug, Deserialize)]
struct TrafficRow {
    label: String,
    packets: u64,
    bytes: u64,
    volume: String,
    upstream_packets: u64,
    upstream_bytes: u64,
    upstream_volume: String,
    downstream_packets: u64,
    downstream_bytes: u64,
    downstream_volume: String,
    #[serde(default)]
    location: String,
}

/// Per-label sums. Volumes are kept in bytes; megabytes only appear on output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTotals {
    pub packets: u64,
    pub bytes: u64,
    pub volume: u64,
    pub upstream_packets: u64,
    pub upstream_bytes: u64,
    pub upstream_volume: u64,
    pub downstream_packets: u64,
    pub downstream_bytes: u64,
    pub downstream_volume: u64,
    pub locations: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSummary {
    pub label: String,
    pub totals: LabelTotals,
}

#[derive(Serialize)]
struct RollupRow<'a> {
    label: &'a str,
    packets: u64,
    bytes: u64,
    volume_mb: String,
    upstream_packets: u64,
    upstream_bytes: u64,
    upstream_volume_mb: String,
    downstream_packets: u64,
    downstream_bytes: u64,
    downstream_volume_mb: String,
    locations: String,
}

fn volume_of(row: usize, column: &'static str, value: &str) -> Result<u64, RollupError> {
    parse_volume(value).ok_or_else(|| RollupError::InvalidVolume {
        row,
        column,
        value: value.to_string(),
    })
}

/// Sums traffic rows per label, largest total bytes first.
///
/// Rows without a label are skipped. Ties are ordered by label. A leading
/// UTF-8 BOM, as written by the host report, is ignored.
pub fn rollup_by_label<R: Read>(mut reader: R) -> Result<Vec<LabelSummary>, RollupError> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(content.as_str());

    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let mut labels: HashMap<String, LabelTotals> = HashMap::new();

    for (index, result) in csv_reader.deserialize::<TrafficRow>().enumerate() {
        let row = result?;
        // Header is line 1
        let line = index + 2;

        if row.label.is_empty() {
            log::debug!("Row {}: no label, skipping", line);
            continue;
        }

        let volume = volume_of(line, "total", &row.volume)?;
        let upstream_volume = volume_of(line, "upstream", &row.upstream_volume)?;
        let downstream_volume = volume_of(line, "downstream", &row.downstream_volume)?;

        let totals = labels.entry(row.label).or_default();
        totals.packets += row.packets;
        totals.bytes += row.bytes;
        totals.volume += volume;
        totals.upstream_packets += row.upstream_packets;
        totals.upstream_bytes += row.upstream_bytes;
        totals.upstream_volume += upstream_volume;
        totals.downstream_packets += row.downstream_packets;
        totals.downstream_bytes += row.downstream_bytes;
        totals.downstream_volume += downstream_volume;
        if !row.location.is_empty() {
            totals.locations.insert(row.location);
        }
    }

    let mut summaries: Vec<LabelSummary> = labels
        .into_iter()
        .map(|(label, totals)| LabelSummary { label, totals })
        .collect();
    summaries.sort_by(|a, b| {
        b.totals.bytes
            .cmp(&a.totals.bytes)
            .then_with(|| a.label.cmp(&b.label))
    });

    Ok(summaries)
}

pub fn write_rollup<W: Write>(writer: W, summaries: &[LabelSummary]) -> Result<(), RollupError> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    for summary in summaries {
        let totals = &summary.totals;
        csv_writer.serialize(RollupRow {
            label: &summary.label,
            packets: totals.packets,
            bytes: totals.bytes,
            volume_mb: format_megabytes(totals.volume),
            upstream_packets: totals.upstream_packets,
            upstream_bytes: totals.upstream_bytes,
            upstream_volume_mb: format_megabytes(totals.upstream_volume),
            downstream_packets: totals.downstream_packets,
            downstream_bytes: totals.downstream_bytes,
            downstream_volume_mb: format_megabytes(totals.downstream_volume),
            locations: totals.locations.iter().cloned().collect::<Vec<_>>().join(";"),
        })?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// `<dir>/<stem>_by_label.csv` next to the input table.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "traffic".to_string());
    input.with_file_name(format!("{}_by_label.csv", stem))
}

/// Reads `input`, rolls it up and writes the result to `output`.
pub fn rollup_file(input: &Path, output: &Path) -> Result<usize, RollupError> {
    let file = File::open(input).map_err(|source| RollupError::Open {
        path: input.to_path_buf(),
        source,
    })?;
    let summaries = rollup_by_label(file)?;

    let out = File::create(output).map_err(|source| RollupError::Open {
        path: output.to_path_buf(),
        source,
    })?;
    write_rollup(BufWriter::new(out), &summaries)?;

    log::info!("Rolled up {} labels into {}", summaries.len(), output.display());
    Ok(summaries.len())
}
