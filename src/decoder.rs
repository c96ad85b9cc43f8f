//! Frame decoding: Ethernet → IPv4 → transport ports.
//!
//! Everything that is not an Ethernet frame carrying a sane IPv4 packet is
//! dropped. Dropping is a filtering policy, so the decoder returns
//! `Err(DropReason)` for bookkeeping rather than a pipeline error.

use std::fmt;

use log::trace;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;

use crate::capture::{LinkType, RawFrame};

pub const ETHERNET_HEADER_LEN: usize = 14;
const IPV4_MIN_HEADER_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp { src_port: u16, dst_port: u16 },
    Udp { src_port: u16, dst_port: u16 },
    Other { protocol: u8 },
}

impl Transport {
    pub fn ports(&self) -> (u16, u16) {
        match *self {
            Transport::Tcp { src_port, dst_port } | Transport::Udp { src_port, dst_port } => {
                (src_port, dst_port)
            }
            Transport::Other { .. } => (0, 0),
        }
    }

    pub fn is_tcp(&self) -> bool {
        matches!(self, Transport::Tcp { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Summary {
    /// IHL × 4.
    pub header_len: u16,
    pub total_length: u16,
    pub protocol: u8,
}

/// An accepted frame, detached from the capture buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub link_header: Vec<u8>,
    pub ipv4: Ipv4Summary,
    pub transport: Transport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DropReason {
    UnsupportedLinkType,
    TruncatedEthernet,
    NotIpv4,
    MalformedIpv4,
    TruncatedTransport,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DropReason::UnsupportedLinkType => "unsupported link type",
            DropReason::TruncatedEthernet => "truncated ethernet header",
            DropReason::NotIpv4 => "not ipv4",
            DropReason::MalformedIpv4 => "malformed ipv4 header",
            DropReason::TruncatedTransport => "truncated transport header",
        };
        f.write_str(text)
    }
}

pub fn decode_frame(frame: &RawFrame) -> Result<DecodedFrame, DropReason> {
    if frame.link_type != LinkType::Ethernet {
        return Err(DropReason::UnsupportedLinkType);
    }
    decode_ethernet(&frame.data)
}

pub fn decode_ethernet(data: &[u8]) -> Result<DecodedFrame, DropReason> {
    let ethernet = EthernetPacket::new(data).ok_or(DropReason::TruncatedEthernet)?;
    if ethernet.get_ethertype() != EtherTypes::Ipv4 {
        return Err(DropReason::NotIpv4);
    }

    let ip_bytes = ethernet.payload();
    let ipv4 = Ipv4Packet::new(ip_bytes).ok_or(DropReason::MalformedIpv4)?;
    let summary = check_ipv4(&ipv4, ip_bytes.len())?;
    let transport = decode_transport(ipv4.get_next_level_protocol(), ipv4.payload())?;

    Ok(DecodedFrame {
        link_header: data[..ETHERNET_HEADER_LEN].to_vec(),
        ipv4: summary,
        transport,
    })
}

fn check_ipv4(ipv4: &Ipv4Packet, available: usize) -> Result<Ipv4Summary, DropReason> {
    let header_len = ipv4.get_header_length() as usize * 4;
    let total_length = ipv4.get_total_length() as usize;

    if ipv4.get_version() != 4
        || header_len < IPV4_MIN_HEADER_LEN
        || header_len > available
        || total_length < header_len
    {
        trace!(
            "Rejecting ipv4 header: version {} ihl {} total {} available {}",
            ipv4.get_version(),
            header_len,
            total_length,
            available
        );
        return Err(DropReason::MalformedIpv4);
    }

    Ok(Ipv4Summary {
        header_len: header_len as u16,
        total_length: total_length as u16,
        protocol: ipv4.get_next_level_protocol().0,
    })
}

fn decode_transport(protocol: IpNextHeaderProtocol, payload: &[u8]) -> Result<Transport, DropReason> {
    match protocol {
        IpNextHeaderProtocols::Tcp => {
            let tcp = TcpPacket::new(payload).ok_or(DropReason::TruncatedTransport)?;
            Ok(Transport::Tcp {
                src_port: tcp.get_source(),
                dst_port: tcp.get_destination(),
            })
        }
        IpNextHeaderProtocols::Udp => {
            let udp = UdpPacket::new(payload).ok_or(DropReason::TruncatedTransport)?;
            Ok(Transport::Udp {
                src_port: udp.get_source(),
                dst_port: udp.get_destination(),
            })
        }
        other => Ok(Transport::Other { protocol: other.0 }),
    }
}
