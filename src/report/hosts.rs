//! Per-host traffic table: flows grouped by the remote endpoint's address.
//!
//! The local side of a flow is the endpoint inside one of the configured local
//! networks. Upstream counts what the local side sent to the host.
use ipnetwork::IpNetwork;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::io::Write;
use std::net::IpAddr;
use crate::flow::{FlowMetrics, FlowSummary};
use crate::report::writers::{ReportError, UTF8_BOM};
use crate::utils::format_bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostTraffic {
    pub host: IpAddr,
    pub metrics: FlowMetrics,
}

/// Columns read back by the label rollup.
#[derive(Serialize)]
struct HostRow {
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
    location: String,
}

impl From<&HostTraffic> for HostRow {
    fn from(traffic: &HostTraffic) -> Self {
        let metrics = &traffic.metrics;
        HostRow {
            label: traffic.host.to_string(),
            packets: metrics.packets,
            bytes: metrics.bytes,
            volume: format_bytes(metrics.bytes),
            upstream_packets: metrics.upstream_packets,
            upstream_bytes: metrics.upstream_bytes,
            upstream_volume: format_bytes(metrics.upstream_bytes),
            downstream_packets: metrics.downstream_packets,
            downstream_bytes: metrics.downstream_bytes,
            downstream_volume: format_bytes(metrics.downstream_bytes),
            location: String::new(),
        }
    }
}

pub fn is_local_address(addr: &IpAddr, local_networks: &[IpNetwork]) -> bool {
    local_networks.iter().any(|network| network.contains(*addr))
}

/// Groups `flows` by remote host, most packets first (ties by address).
///
/// Flows with both or neither endpoint local have no remote host and are left
/// out.
pub fn host_traffic(flows: &[FlowSummary], local_networks: &[IpNetwork]) -> Vec<HostTraffic> {
    let mut hosts: BTreeMap<IpAddr, FlowMetrics> = BTreeMap::new();
    let mut skipped = 0usize;

    for flow in flows {
        let reference = flow.key.reference();
        let peer = flow.key.peer();

        let (host, metrics) = match (
            is_local_address(&reference.addr, local_networks),
            is_local_address(&peer.addr, local_networks),
        ) {
            (true, false) => (peer.addr, flow.metrics),
            (false, true) => (reference.addr, flow.metrics.reversed()),
            _ => {
                skipped += 1;
                continue;
            },
        };

        *hosts.entry(host).or_default() += metrics;
    }

    if skipped > 0 {
        log::debug!("{} flows without exactly one local endpoint left out of the host table", skipped);
    }

    let mut traffic: Vec<HostTraffic> = hosts
        .into_iter()
        .map(|(host, metrics)| HostTraffic { host, metrics })
        .collect();
    traffic.sort_by_key(|entry| (Reverse(entry.metrics.packets), entry.host));
    traffic
}

/// Drops hosts below `min_bytes` and keeps the first `top`.
pub fn select_hosts(mut hosts: Vec<HostTraffic>, min_bytes: u64, top: Option<usize>) -> Vec<HostTraffic> {
    hosts.retain(|entry| entry.metrics.bytes >= min_bytes);
    if let Some(limit) = top {
        hosts.truncate(limit);
    }
    hosts
}

pub fn write_hosts<W: Write>(mut writer: W, hosts: &[HostTraffic]) -> Result<(), ReportError> {
    writer.write_all(UTF8_BOM)?;

    let mut csv_writer = csv::Writer::from_writer(writer);
    for entry in hosts {
        csv_writer.serialize(HostRow::from(entry))?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{FlowAggregator, PacketRecord, TransportProtocol};
    use crate::rollup::rollup_by_label;

    fn local_networks() -> Vec<IpNetwork> {
        vec!["192.168.1.0/24".parse().unwrap()]
    }

    fn packet(src: &str, src_port: u16, dst: &str, dst_port: u16, length: u64) -> PacketRecord {
        PacketRecord {
            src_addr: src.parse().unwrap(),
            dst_addr: dst.parse().unwrap(),
            src_port,
            dst_port,
            protocol: TransportProtocol::Tcp,
            length,
        }
    }

    fn flows() -> Vec<FlowSummary> {
        let aggregator: FlowAggregator = vec![
            // 8.8.8.8 sorts before the local address, so its flow is reversed
            packet("192.168.1.20", 40000, "8.8.8.8", 443, 1000),
            packet("8.8.8.8", 443, "192.168.1.20", 40000, 3000),
            packet("8.8.8.8", 443, "192.168.1.20", 40000, 2000),
            // second flow to the same host
            packet("192.168.1.21", 40001, "8.8.8.8", 443, 500),
            // local peer sorts first
            packet("192.168.1.20", 50000, "203.0.113.5", 80, 700),
            packet("203.0.113.5", 80, "192.168.1.20", 50000, 100),
            // internal and transit traffic have no remote host
            packet("192.168.1.20", 22, "192.168.1.30", 60000, 4000),
            packet("198.51.100.1", 1, "198.51.100.2", 2, 4000),
        ]
        .into_iter()
        .collect();
        aggregator.summarize()
    }

    #[test]
    fn test_host_traffic_uses_local_side_for_direction() {
        let hosts = host_traffic(&flows(), &local_networks());
        assert_eq!(hosts.len(), 2);

        let google = &hosts[0];
        assert_eq!(google.host, "8.8.8.8".parse::<IpAddr>().unwrap());
        assert_eq!(google.metrics.packets, 4);
        assert_eq!(google.metrics.upstream_packets, 2);
        assert_eq!(google.metrics.upstream_bytes, 1500);
        assert_eq!(google.metrics.downstream_bytes, 5000);
        assert!(google.metrics.is_consistent());

        let web = &hosts[1];
        assert_eq!(web.host, "203.0.113.5".parse::<IpAddr>().unwrap());
        assert_eq!(web.metrics.upstream_bytes, 700);
        assert_eq!(web.metrics.downstream_bytes, 100);
    }

    #[test]
    fn test_no_local_networks_means_no_hosts() {
        assert!(host_traffic(&flows(), &[]).is_empty());
    }

    #[test]
    fn test_select_hosts() {
        let hosts = host_traffic(&flows(), &local_networks());
        let selected = select_hosts(hosts.clone(), 1000, None);
        assert_eq!(selected.len(), 1);
        assert_eq!(select_hosts(hosts, 0, Some(1)).len(), 1);
    }

    #[test]
    fn test_write_hosts_columns() {
        let mut buffer = Vec::new();
        write_hosts(&mut buffer, &host_traffic(&flows(), &local_networks())).unwrap();

        assert!(buffer.starts_with(UTF8_BOM));
        let text = String::from_utf8(buffer[UTF8_BOM.len()..].to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "label,packets,bytes,volume,upstream_packets,upstream_bytes,upstream_volume,downstream_packets,downstream_bytes,downstream_volume,location"
        );
        assert_eq!(lines[1], "8.8.8.8,4,6500,6.35 KB,2,1500,1.46 KB,2,5000,4.88 KB,");
        assert_eq!(lines[2], "203.0.113.5,2,800,800 B,1,700,700 B,1,100,100 B,");
    }

    #[test]
    fn test_host_report_feeds_label_rollup() {
        let mut buffer = Vec::new();
        write_hosts(&mut buffer, &host_traffic(&flows(), &local_networks())).unwrap();

        let summaries = rollup_by_label(buffer.as_slice()).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].label, "8.8.8.8");
        assert_eq!(summaries[0].totals.packets, 4);
        assert_eq!(summaries[0].totals.bytes, 6500);
        assert_eq!(summaries[0].totals.upstream_bytes, 1500);
        assert_eq!(summaries[0].totals.downstream_packets, 2);
        assert!(summaries[0].totals.locations.is_empty());
        assert_eq!(summaries[1].label, "203.0.113.5");
        assert_eq!(summaries[1].totals.volume, 800);
    }
}
