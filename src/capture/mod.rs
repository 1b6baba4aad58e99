pub mod decode;
pub mod pcap_engine;
#[cfg(test)]
pub(crate) mod test_frames;

pub use decode::{decode_frame, LinkLayer};
pub use pcap_engine::{PcapFileSource, CaptureStats, CaptureError};
