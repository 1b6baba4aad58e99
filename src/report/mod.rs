//! Ordering, filtering and rendering of flow summaries.
pub mod hosts;
pub mod writers;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use crate::flow::FlowSummary;

pub use hosts::{host_traffic, is_local_address, select_hosts, write_hosts, HostTraffic};
pub use writers::{render_text, write_csv, write_json, write_report, ReportError, ReportOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Text,
    Csv,
    Json,
    /// Per remote host CSV, readable by the label rollup
    Hosts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Total bytes, largest first
    Bytes,
    /// Packet count, largest first
    Packets,
    /// Canonical flow key order
    Key,
}

/// Sorts in place. Ties fall back to key order so output is deterministic.
pub fn sort_flows(flows: &mut [FlowSummary], order: SortOrder) {
    match order {
        SortOrder::Bytes => flows.sort_by_key(|flow| (Reverse(flow.metrics.bytes), flow.key)),
        SortOrder::Packets => flows.sort_by_key(|flow| (Reverse(flow.metrics.packets), flow.key)),
        SortOrder::Key => flows.sort_by_key(|flow| flow.key),
    }
}

/// Applies the report selection: drop small flows, sort, keep the first `top`.
pub fn select_flows(
    mut flows: Vec<FlowSummary>,
    order: SortOrder,
    min_bytes: u64,
    top: Option<usize>,
) -> Vec<FlowSummary> {
    flows.retain(|flow| flow.metrics.bytes >= min_bytes);
    sort_flows(&mut flows, order);
    if let Some(limit) = top {
        flows.truncate(limit);
    }
    flows
}
