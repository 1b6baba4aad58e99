//! Frame and capture-file builders shared by the capture and analysis tests.
use pnet::packet::ethernet::{EtherType, MutableEthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ipv4::MutableIpv4Packet;
use pnet::packet::ipv6::MutableIpv6Packet;
use pnet::packet::sll::MutableSLLPacket;
use pnet::packet::tcp::MutableTcpPacket;
use pnet::packet::udp::MutableUdpPacket;
use pnet::packet::vlan::MutableVlanPacket;
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;

pub const ETHERNET_HEADER: usize = 14;
pub const VLAN_TAG: usize = 4;
pub const SLL_HEADER: usize = 16;
pub const IPV4_HEADER: usize = 20;
pub const IPV6_HEADER: usize = 40;
pub const TCP_HEADER: usize = 20;
pub const UDP_HEADER: usize = 8;

/// pcap link type for Ethernet frames
pub const LINKTYPE_ETHERNET: u32 = 1;

pub fn tcp_segment(src_port: u16, dst_port: u16) -> Vec<u8> {
    let mut buffer = vec![0u8; TCP_HEADER];
    let mut tcp = MutableTcpPacket::new(&mut buffer).unwrap();
    tcp.set_source(src_port);
    tcp.set_destination(dst_port);
    tcp.set_data_offset(5);
    buffer
}

pub fn udp_datagram(src_port: u16, dst_port: u16) -> Vec<u8> {
    let mut buffer = vec![0u8; UDP_HEADER];
    let mut udp = MutableUdpPacket::new(&mut buffer).unwrap();
    udp.set_source(src_port);
    udp.set_destination(dst_port);
    udp.set_length(UDP_HEADER as u16);
    buffer
}

pub fn ipv4_datagram(src: Ipv4Addr, dst: Ipv4Addr, protocol: IpNextHeaderProtocol, payload: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0u8; IPV4_HEADER + payload.len()];
    let mut ipv4 = MutableIpv4Packet::new(&mut buffer).unwrap();
    ipv4.set_version(4);
    ipv4.set_header_length(5);
    ipv4.set_total_length((IPV4_HEADER + payload.len()) as u16);
    ipv4.set_ttl(64);
    ipv4.set_next_level_protocol(protocol);
    ipv4.set_source(src);
    ipv4.set_destination(dst);
    ipv4.set_payload(payload);
    buffer
}

pub fn ipv6_datagram(src: Ipv6Addr, dst: Ipv6Addr, next_header: IpNextHeaderProtocol, payload: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0u8; IPV6_HEADER + payload.len()];
    let mut ipv6 = MutableIpv6Packet::new(&mut buffer).unwrap();
    ipv6.set_version(6);
    ipv6.set_payload_length(payload.len() as u16);
    ipv6.set_next_header(next_header);
    ipv6.set_hop_limit(64);
    ipv6.set_source(src);
    ipv6.set_destination(dst);
    ipv6.set_payload(payload);
    buffer
}

pub fn ethernet_frame(ethertype: EtherType, payload: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0u8; ETHERNET_HEADER + payload.len()];
    let mut ethernet = MutableEthernetPacket::new(&mut buffer).unwrap();
    ethernet.set_ethertype(ethertype);
    ethernet.set_payload(payload);
    buffer
}

/// One 802.1Q tag wrapping `payload`, which carries `inner` as its ethertype.
pub fn vlan_tag(vlan_id: u16, inner: EtherType, payload: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0u8; VLAN_TAG + payload.len()];
    let mut vlan = MutableVlanPacket::new(&mut buffer).unwrap();
    vlan.set_vlan_identifier(vlan_id);
    vlan.set_ethertype(inner);
    vlan.set_payload(payload);
    buffer
}

pub fn sll_frame(protocol: EtherType, payload: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0u8; SLL_HEADER + payload.len()];
    let mut sll = MutableSLLPacket::new(&mut buffer).unwrap();
    sll.set_link_layer_address_type(1);
    sll.set_link_layer_address_len(6);
    sll.set_protocol(protocol);
    sll.set_payload(payload);
    buffer
}

/// Ethernet/IPv4/TCP frame, padded out to `length` bytes.
pub fn tcp_frame(src: Ipv4Addr, src_port: u16, dst: Ipv4Addr, dst_port: u16, length: usize) -> Vec<u8> {
    let segment = tcp_segment(src_port, dst_port);
    let datagram = ipv4_datagram(src, dst, pnet::packet::ip::IpNextHeaderProtocols::Tcp, &segment);
    let mut frame = ethernet_frame(pnet::packet::ethernet::EtherTypes::Ipv4, &datagram);
    if frame.len() < length {
        frame.resize(length, 0);
    }
    frame
}

/// Writes a classic little-endian pcap file holding `frames`.
pub fn write_pcap(path: &Path, linktype: u32, frames: &[Vec<u8>]) {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&4u16.to_le_bytes());
    bytes.extend_from_slice(&0i32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&65535u32.to_le_bytes());
    bytes.extend_from_slice(&linktype.to_le_bytes());

    for (index, frame) in frames.iter().enumerate() {
        bytes.extend_from_slice(&(1_700_000_000u32 + index as u32).to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        bytes.extend_from_slice(frame);
    }

    fs::write(path, bytes).unwrap();
}
