use ipnetwork::IpNetwork;
use pcap::{Capture, Linktype, Offline};
use std::path::{Path, PathBuf};
use thiserror::Error;
use crate::capture::decode::{decode_frame, LinkLayer};
use crate::flow::PacketRecord;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Cannot open capture file '{}': {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: pcap::Error,
    },

    #[error("Unsupported link type {} in '{}'", .linktype.0, .path.display())]
    UnsupportedLinkType { linktype: Linktype, path: PathBuf },

    #[error("Invalid capture filter '{filter}': {source}")]
    Filter {
        filter: String,
        #[source]
        source: pcap::Error,
    },

    #[error("Reading capture failed after {frames} frames: {source}")]
    Read {
        frames: u64,
        #[source]
        source: pcap::Error,
    },
}

/// Counters for one pass over a capture file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames: u64,
    /// Frames turned into TCP/UDP packet records.
    pub decoded: u64,
    /// Frames that were not TCP/UDP over IP, or were truncated.
    pub skipped: u64,
    /// Decoded packets dropped by `ignore_networks`.
    pub ignored: u64,
}

/// Reads a pcap/pcapng file and yields flow-eligible packet records.
///
/// Frames that do not decode to TCP or UDP are skipped silently and counted
/// in [`CaptureStats::skipped`]. The iterator ends at the end of the file, or
/// after yielding the first read error.
pub struct PcapFileSource {
    capture: Capture<Offline>,
    link: LinkLayer,
    path: PathBuf,
    ignore_networks: Vec<IpNetwork>,
    stats: CaptureStats,
    finished: bool,
}

impl PcapFileSource {
    pub fn open(path: impl AsRef<Path>, bpf_filter: Option<&str>) -> Result<Self, CaptureError> {
        let path = path.as_ref().to_path_buf();
        let mut capture = Capture::from_file(&path).map_err(|source| CaptureError::Open {
            path: path.clone(),
            source,
        })?;

        let linktype = capture.get_datalink();
        let link = Self::link_layer(linktype)
            .ok_or_else(|| CaptureError::UnsupportedLinkType { linktype, path: path.clone() })?;

        if let Some(filter) = bpf_filter {
            capture.filter(filter, true).map_err(|source| CaptureError::Filter {
                filter: filter.to_string(),
                source,
            })?;
            log::info!("Applied capture filter: {}", filter);
        }

        log::info!("Reading {} ({:?} framing)", path.display(), link);

        Ok(PcapFileSource {
            capture,
            link,
            path,
            ignore_networks: Vec::new(),
            stats: CaptureStats::default(),
            finished: false,
        })
    }

    /// Drops packets with either endpoint inside one of `networks`.
    pub fn with_ignore_networks(mut self, networks: Vec<IpNetwork>) -> Self {
        self.ignore_networks = networks;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    fn link_layer(linktype: Linktype) -> Option<LinkLayer> {
        match linktype {
            Linktype::ETHERNET => Some(LinkLayer::Ethernet),
            Linktype::LINUX_SLL => Some(LinkLayer::LinuxCooked),
            // DLT_RAW is 12 or 14 depending on the platform that wrote the file
            Linktype::RAW | Linktype::IPV4 | Linktype::IPV6 | Linktype(12) | Linktype(14) => Some(LinkLayer::RawIp),
            _ => None,
        }
    }

    fn is_ignored(&self, record: &PacketRecord) -> bool {
        self.ignore_networks
            .iter()
            .any(|network| network.contains(record.src_addr) || network.contains(record.dst_addr))
    }
}

impl Iterator for PcapFileSource {
    type Item = Result<PacketRecord, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let packet = match self.capture.next_packet() {
                Ok(packet) => packet,
                Err(pcap::Error::NoMorePackets) => {
                    self.finished = true;
                    log::info!(
                        "Finished {}: {} frames, {} decoded, {} skipped, {} ignored",
                        self.path.display(),
                        self.stats.frames,
                        self.stats.decoded,
                        self.stats.skipped,
                        self.stats.ignored,
                    );
                    break;
                },
                Err(source) => {
                    self.finished = true;
                    return Some(Err(CaptureError::Read { frames: self.stats.frames, source }));
                },
            };

            self.stats.frames += 1;
            let frame_number = self.stats.frames;

            match decode_frame(self.link, packet.data, u64::from(packet.header.len)) {
                Some(record) => {
                    self.stats.decoded += 1;
                    if self.is_ignored(&record) {
                        self.stats.ignored += 1;
                        continue;
                    }
                    return Some(Ok(record));
                },
                None => {
                    self.stats.skipped += 1;
                    log::debug!("Skipping frame {}: not TCP/UDP over IP", frame_number);
                },
            }
        }
        None
    }
}
