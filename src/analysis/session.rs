use std::io::Write;
use std::path::Path;
use crate::capture::{CaptureError, CaptureStats, PcapFileSource};
use crate::config::{Config, ReportConfig};
use crate::flow::{aggregate_partitioned, FlowAggregator, FlowSummary, PacketRecord};
use crate::report::{self, HostTraffic, ReportError, ReportFormat, ReportOptions};

/// Flow table and capture counters for one input file.
#[derive(Debug)]
pub struct FlowAnalysis {
    pub aggregator: FlowAggregator,
    pub stats: CaptureStats,
}

impl FlowAnalysis {
    /// Aggregates already-decoded packets, bypassing capture I/O.
    pub fn from_packets<I>(packets: I, partitions: usize) -> Self
    where
        I: IntoIterator<Item = PacketRecord>,
    {
        let mut decoded = 0u64;
        let counted = packets.into_iter().inspect(|_| decoded += 1);
        let aggregator = aggregate_partitioned(counted, partitions);

        FlowAnalysis {
            aggregator,
            stats: CaptureStats {
                frames: decoded,
                decoded,
                ..CaptureStats::default()
            },
        }
    }

    /// Flows selected and ordered according to the report settings.
    pub fn flows(&self, settings: &ReportConfig) -> Vec<FlowSummary> {
        report::select_flows(
            self.aggregator.summarize(),
            settings.sort,
            settings.min_bytes,
            settings.top,
        )
    }

    /// Per remote host totals, with the report's size and count limits applied
    /// to hosts rather than flows.
    pub fn hosts(&self, settings: &ReportConfig) -> Vec<HostTraffic> {
        let hosts = report::host_traffic(&self.aggregator.summarize(), &settings.local_networks);
        report::select_hosts(hosts, settings.min_bytes, settings.top)
    }

    pub fn write_report<W: Write>(&self, writer: W, settings: &ReportConfig) -> Result<(), ReportError> {
        if settings.format == ReportFormat::Hosts {
            return report::write_hosts(writer, &self.hosts(settings));
        }

        let flows = self.flows(settings);
        let options = ReportOptions {
            human_units: settings.human_units,
            local_networks: &settings.local_networks,
        };
        report::write_report(writer, settings.format, &flows, &self.aggregator.totals(), options)
    }
}

/// Reads `path` and builds its flow table.
///
/// Every capture gets a fresh aggregator; nothing carries over between files.
pub fn analyse_capture(path: &Path, config: &Config) -> Result<FlowAnalysis, CaptureError> {
    let mut source = PcapFileSource::open(path, config.capture.bpf_filter.as_deref())?
        .with_ignore_networks(config.capture.ignore_networks.clone());

    let mut failure = None;
    let packets = source.by_ref().map_while(|result| match result {
        Ok(packet) => Some(packet),
        Err(err) => {
            failure = Some(err);
            None
        },
    });
    let aggregator = aggregate_partitioned(packets, config.aggregation.partitions);

    if let Some(err) = failure {
        return Err(err);
    }

    log::info!("{} flows in {}", aggregator.len(), source.path().display());
    Ok(FlowAnalysis {
        aggregator,
        stats: source.stats(),
    })
}
