// Library exports for flowstat
pub mod analysis;
pub mod capture;
pub mod config;
pub mod flow;
pub mod report;
pub mod rollup;
pub mod utils;

pub use analysis::{analyse_capture, FlowAnalysis};
pub use capture::{pcap_engine, decode};
pub use config::settings;
pub use flow::{FlowAggregator, FlowKey, FlowMetrics, FlowSummary, PacketRecord, TransportProtocol};
pub use utils::formatting;

// Error types
pub use anyhow::{Error, Result};
