use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Transport protocols that take part in flow reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportProtocol {
    Tcp,
    Udp,
}

impl TransportProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Tcp => "TCP",
            TransportProtocol::Udp => "UDP",
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One network-layer address plus transport port.
///
/// Ordering compares the address first (every IPv4 address sorts before any
/// IPv6 address), then the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub addr: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(addr: IpAddr, port: u16) -> Self {
        Self { addr, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addr {
            IpAddr::V4(addr) => write!(f, "{}:{}", addr, self.port),
            IpAddr::V6(addr) => write!(f, "[{}]:{}", addr, self.port),
        }
    }
}

/// A decoded TCP or UDP packet, as handed over by the capture layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketRecord {
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: TransportProtocol,
    /// Full frame length in bytes.
    pub length: u64,
}

impl PacketRecord {
    pub fn source(&self) -> Endpoint {
        Endpoint::new(self.src_addr, self.src_port)
    }

    pub fn destination(&self) -> Endpoint {
        Endpoint::new(self.dst_addr, self.dst_port)
    }
}
