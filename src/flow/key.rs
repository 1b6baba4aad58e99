use serde::Serialize;
use std::fmt;
use crate::flow::record::{Endpoint, PacketRecord, TransportProtocol};

/// Direction-independent identity of a flow.
///
/// The two endpoints are stored in canonical order, so a packet and its
/// reply produce the same key. The smaller endpoint is the flow's reference
/// endpoint: bytes it sends count as upstream, bytes it receives as
/// downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FlowKey {
    #[serde(rename = "reference")]
    lower: Endpoint,
    #[serde(rename = "peer")]
    upper: Endpoint,
    protocol: TransportProtocol,
}

impl FlowKey {
    pub fn new(a: Endpoint, b: Endpoint, protocol: TransportProtocol) -> Self {
        let (lower, upper) = if a <= b { (a, b) } else { (b, a) };
        Self { lower, upper, protocol }
    }

    pub fn from_record(packet: &PacketRecord) -> Self {
        Self::new(packet.source(), packet.destination(), packet.protocol)
    }

    pub fn reference(&self) -> Endpoint {
        self.lower
    }

    pub fn peer(&self) -> Endpoint {
        self.upper
    }

    pub fn protocol(&self) -> TransportProtocol {
        self.protocol
    }

    /// True when traffic from `source` travels away from the reference endpoint.
    /// A self-flow has identical endpoints and is always upstream.
    pub fn is_upstream(&self, source: &Endpoint) -> bool {
        *source == self.lower
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}, {}, {}}}", self.lower, self.upper, self.protocol)
    }
}
