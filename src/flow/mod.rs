//! Bidirectional flow reconstruction over decoded packet records.
pub mod record;
pub mod key;
pub mod aggregator;

pub use record::{PacketRecord, Endpoint, TransportProtocol};
pub use key::FlowKey;
pub use aggregator::{FlowAggregator, FlowMetrics, FlowSummary, aggregate_partitioned, effective_partitions};
