use ipnetwork::IpNetwork;
use serde::Serialize;
use std::io::Write;
use thiserror::Error;
use crate::flow::{FlowMetrics, FlowSummary};
use crate::report::hosts::{host_traffic, write_hosts};
use crate::report::ReportFormat;
use crate::utils::format_bytes;

/// Lets spreadsheet tools detect UTF-8 when opening the CSV.
pub(crate) const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Writing report failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Writing CSV report failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Writing JSON report failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions<'a> {
    /// Print byte counters as KB/MB/GB in the text report.
    pub human_units: bool,
    /// Networks whose endpoints count as the local side in the host report.
    pub local_networks: &'a [IpNetwork],
}

#[derive(Serialize)]
struct CsvRow {
    endpoint_a: String,
    endpoint_b: String,
    protocol: &'static str,
    packets: u64,
    bytes: u64,
    upstream_packets: u64,
    upstream_bytes: u64,
    downstream_packets: u64,
    downstream_bytes: u64,
}

impl From<&FlowSummary> for CsvRow {
    fn from(flow: &FlowSummary) -> Self {
        CsvRow {
            endpoint_a: flow.key.reference().to_string(),
            endpoint_b: flow.key.peer().to_string(),
            protocol: flow.key.protocol().as_str(),
            packets: flow.metrics.packets,
            bytes: flow.metrics.bytes,
            upstream_packets: flow.metrics.upstream_packets,
            upstream_bytes: flow.metrics.upstream_bytes,
            downstream_packets: flow.metrics.downstream_packets,
            downstream_bytes: flow.metrics.downstream_bytes,
        }
    }
}

fn volume(bytes: u64, options: ReportOptions<'_>) -> String {
    if options.human_units {
        format_bytes(bytes)
    } else {
        bytes.to_string()
    }
}

/// One line per flow, then a totals line over the whole capture.
pub fn render_text(flows: &[FlowSummary], totals: &FlowMetrics, options: ReportOptions<'_>) -> String {
    let mut out = String::new();

    for flow in flows {
        out.push_str(&format!(
            "flow={}: packets={}, bytes={}, upstream={}, downstream={}\n",
            flow.key,
            flow.metrics.packets,
            volume(flow.metrics.bytes, options),
            volume(flow.metrics.upstream_bytes, options),
            volume(flow.metrics.downstream_bytes, options),
        ));
    }

    out.push_str(&format!(
        "total: flows={}, packets={}, bytes={}, upstream={}, downstream={}\n",
        flows.len(),
        totals.packets,
        volume(totals.bytes, options),
        volume(totals.upstream_bytes, options),
        volume(totals.downstream_bytes, options),
    ));

    out
}

pub fn write_csv<W: Write>(mut writer: W, flows: &[FlowSummary]) -> Result<(), ReportError> {
    writer.write_all(UTF8_BOM)?;

    let mut csv_writer = csv::Writer::from_writer(writer);
    for flow in flows {
        csv_writer.serialize(CsvRow::from(flow))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_json<W: Write>(writer: W, flows: &[FlowSummary]) -> Result<(), ReportError> {
    let mut writer = writer;
    serde_json::to_writer_pretty(&mut writer, flows)?;
    writeln!(writer)?;
    Ok(())
}

/// Writes `flows` in `format`. `totals` only feeds the text footer; the host
/// format groups `flows` by remote host.
pub fn write_report<W: Write>(
    mut writer: W,
    format: ReportFormat,
    flows: &[FlowSummary],
    totals: &FlowMetrics,
    options: ReportOptions<'_>,
) -> Result<(), ReportError> {
    match format {
        ReportFormat::Text => {
            writer.write_all(render_text(flows, totals, options).as_bytes())?;
            writer.flush()?;
            Ok(())
        },
        ReportFormat::Csv => write_csv(writer, flows),
        ReportFormat::Json => write_json(writer, flows),
        ReportFormat::Hosts => write_hosts(writer, &host_traffic(flows, options.local_networks)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{FlowAggregator, PacketRecord, TransportProtocol};

    fn scenario() -> FlowAggregator {
        let forward = PacketRecord {
            src_addr: "1.1.1.1".parse().unwrap(),
            dst_addr: "2.2.2.2".parse().unwrap(),
            src_port: 5000,
            dst_port: 80,
            protocol: TransportProtocol::Tcp,
            length: 100,
        };
        let reply = PacketRecord {
            src_addr: forward.dst_addr,
            dst_addr: forward.src_addr,
            src_port: 80,
            dst_port: 5000,
            length: 2048,
            ..forward
        };
        vec![forward, reply].into_iter().collect()
    }

    #[test]
    fn test_render_text() {
        let aggregator = scenario();
        let text = render_text(&aggregator.summarize(), &aggregator.totals(), ReportOptions::default());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "flow={1.1.1.1:5000, 2.2.2.2:80, TCP}: packets=2, bytes=2148, upstream=100, downstream=2048"
        );
        assert_eq!(
            lines[1],
            "total: flows=1, packets=2, bytes=2148, upstream=100, downstream=2048"
        );
    }

    #[test]
    fn test_render_text_human_units() {
        let aggregator = scenario();
        let options = ReportOptions {
            human_units: true,
            ..ReportOptions::default()
        };
        let text = render_text(&aggregator.summarize(), &aggregator.totals(), options);
        assert!(text.starts_with(
            "flow={1.1.1.1:5000, 2.2.2.2:80, TCP}: packets=2, bytes=2.10 KB, upstream=100 B, downstream=2.00 KB"
        ));
    }

    #[test]
    fn test_write_csv() {
        let mut buffer = Vec::new();
        write_csv(&mut buffer, &scenario().summarize()).unwrap();

        assert!(buffer.starts_with(UTF8_BOM));
        let text = String::from_utf8(buffer[UTF8_BOM.len()..].to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "endpoint_a,endpoint_b,protocol,packets,bytes,upstream_packets,upstream_bytes,downstream_packets,downstream_bytes"
        );
        assert_eq!(lines[1], "1.1.1.1:5000,2.2.2.2:80,TCP,2,2148,1,100,1,2048");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_write_json() {
        let mut buffer = Vec::new();
        write_json(&mut buffer, &scenario().summarize()).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        let flow = &value[0];
        assert_eq!(flow["key"]["reference"]["addr"], "1.1.1.1");
        assert_eq!(flow["key"]["peer"]["port"], 80);
        assert_eq!(flow["key"]["protocol"], "TCP");
        assert_eq!(flow["metrics"]["upstream_bytes"], 100);
        assert_eq!(flow["metrics"]["downstream_bytes"], 2048);
    }

    #[test]
    fn test_write_report_dispatches_on_format() {
        let aggregator = scenario();
        let flows = aggregator.summarize();

        let mut text = Vec::new();
        write_report(&mut text, ReportFormat::Text, &flows, &aggregator.totals(), ReportOptions::default()).unwrap();
        assert!(String::from_utf8(text).unwrap().starts_with("flow="));

        let mut csv = Vec::new();
        write_report(&mut csv, ReportFormat::Csv, &flows, &aggregator.totals(), ReportOptions::default()).unwrap();
        assert!(csv.starts_with(UTF8_BOM));

        let local: Vec<IpNetwork> = vec!["1.1.1.0/24".parse().unwrap()];
        let options = ReportOptions {
            local_networks: &local,
            ..ReportOptions::default()
        };
        let mut hosts = Vec::new();
        write_report(&mut hosts, ReportFormat::Hosts, &flows, &aggregator.totals(), options).unwrap();
        let text = String::from_utf8(hosts[UTF8_BOM.len()..].to_vec()).unwrap();
        assert_eq!(text.lines().nth(1), Some("2.2.2.2,2,2148,2.10 KB,1,100,100 B,1,2048,2.00 KB,"));
    }
}
