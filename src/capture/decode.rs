use pnet::packet::ethernet::{EtherType, EtherTypes, EthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::sll::SLLPacket;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use pnet::packet::vlan::VlanPacket;
use pnet::packet::Packet;
use std::net::IpAddr;
use crate::flow::{PacketRecord, TransportProtocol};

/// Framing of the frames stored in a capture file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayer {
    Ethernet,
    /// Bare IPv4/IPv6 datagrams, version taken from the first nibble.
    RawIp,
    LinuxCooked,
}

/// Decodes one captured frame into a flow-eligible packet record.
///
/// Returns `None` for anything that is not TCP or UDP over IPv4/IPv6, and for
/// truncated headers. `wire_length` is the original frame size and becomes
/// the record length.
pub fn decode_frame(link: LinkLayer, data: &[u8], wire_length: u64) -> Option<PacketRecord> {
    match link {
        LinkLayer::Ethernet => {
            let ethernet = EthernetPacket::new(data)?;
            decode_ethertype(ethernet.get_ethertype(), ethernet.payload(), wire_length)
        },
        LinkLayer::LinuxCooked => {
            let cooked = SLLPacket::new(data)?;
            decode_ethertype(cooked.get_protocol(), cooked.payload(), wire_length)
        },
        LinkLayer::RawIp => match data.first()? >> 4 {
            4 => decode_ipv4(data, wire_length),
            6 => decode_ipv6(data, wire_length),
            _ => None,
        },
    }
}

fn decode_ethertype(ethertype: EtherType, payload: &[u8], wire_length: u64) -> Option<PacketRecord> {
    match ethertype {
        EtherTypes::Ipv4 => decode_ipv4(payload, wire_length),
        EtherTypes::Ipv6 => decode_ipv6(payload, wire_length),
        // 802.1Q and QinQ tags, possibly stacked
        EtherTypes::Vlan | EtherTypes::PBridge | EtherTypes::QinQ => {
            let vlan = VlanPacket::new(payload)?;
            decode_ethertype(vlan.get_ethertype(), vlan.payload(), wire_length)
        },
        _ => None,
    }
}

fn decode_ipv4(data: &[u8], wire_length: u64) -> Option<PacketRecord> {
    let ipv4 = Ipv4Packet::new(data)?;
    // Only the first fragment carries the transport header
    if ipv4.get_fragment_offset() != 0 {
        return None;
    }
    decode_transport(
        IpAddr::V4(ipv4.get_source()),
        IpAddr::V4(ipv4.get_destination()),
        ipv4.get_next_level_protocol(),
        ipv4.payload(),
        wire_length,
    )
}

fn decode_ipv6(data: &[u8], wire_length: u64) -> Option<PacketRecord> {
    let ipv6 = Ipv6Packet::new(data)?;
    decode_transport(
        IpAddr::V6(ipv6.get_source()),
        IpAddr::V6(ipv6.get_destination()),
        ipv6.get_next_header(),
        ipv6.payload(),
        wire_length,
    )
}

fn decode_transport(
    src_addr: IpAddr,
    dst_addr: IpAddr,
    next_header: IpNextHeaderProtocol,
    payload: &[u8],
    wire_length: u64,
) -> Option<PacketRecord> {
    let (protocol, src_port, dst_port) = match next_header {
        IpNextHeaderProtocols::Tcp => {
            let tcp = TcpPacket::new(payload)?;
            (TransportProtocol::Tcp, tcp.get_source(), tcp.get_destination())
        },
        IpNextHeaderProtocols::Udp => {
            let udp = UdpPacket::new(payload)?;
            (TransportProtocol::Udp, udp.get_source(), udp.get_destination())
        },
        _ => return None,
    };

    Some(PacketRecord {
        src_addr,
        dst_addr,
        src_port,
        dst_port,
        protocol,
        length: wire_length,
    })
}
