use serde::{Deserialize, Serialize};

use crate::decoder::DecodedFrame;

/// Per-packet record built from an accepted frame. Never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPacket {
    pub is_tcp: bool,
    pub src_port: u16,
    pub dst_port: u16,
    pub header_size: f32,
    pub total_packet_size: f32,
    /// Upper-case hex of the Ethernet header, used as a categorical token.
    pub payload: String,
}

impl ParsedPacket {
    pub fn from_decoded(frame: &DecodedFrame) -> Self {
        let (src_port, dst_port) = frame.transport.ports();
        Self {
            is_tcp: frame.transport.is_tcp(),
            src_port,
            dst_port,
            header_size: f32::from(frame.ipv4.header_len),
            total_packet_size: f32::from(frame.ipv4.total_length),
            payload: hex::encode_upper(&frame.link_header),
        }
    }
}

/// Flat classifier row. Field order is the feature file's column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketData {
    pub is_tcp: bool,
    pub src_port: u16,
    pub dst_port: u16,
    pub header_size: f32,
    pub total_packet_length: f32,
    pub payload: String,
}

impl From<&ParsedPacket> for PacketData {
    fn from(packet: &ParsedPacket) -> Self {
        PacketData {
            is_tcp: packet.is_tcp,
            src_port: packet.src_port,
            dst_port: packet.dst_port,
            header_size: packet.header_size,
            total_packet_length: packet.total_packet_size,
            payload: packet.payload.clone(),
        }
    }
}

/// Input columns of a [`PacketData`] row, addressable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Column {
    IsTcp,
    SrcPort,
    DstPort,
    HeaderSize,
    TotalPacketLength,
    Payload,
}

impl Column {
    pub const ALL: [Column; 6] = [
        Column::IsTcp,
        Column::SrcPort,
        Column::DstPort,
        Column::HeaderSize,
        Column::TotalPacketLength,
        Column::Payload,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Column::IsTcp => "isTCP",
            Column::SrcPort => "srcPort",
            Column::DstPort => "dstPort",
            Column::HeaderSize => "headerSize",
            Column::TotalPacketLength => "totalPacketLength",
            Column::Payload => "payload",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
    Vector(Vec<f64>),
}

impl PacketData {
    pub fn value(&self, column: Column) -> Value {
        match column {
            Column::IsTcp => Value::Bool(self.is_tcp),
            Column::SrcPort => Value::Number(f64::from(self.src_port)),
            Column::DstPort => Value::Number(f64::from(self.dst_port)),
            Column::HeaderSize => Value::Number(f64::from(self.header_size)),
            Column::TotalPacketLength => Value::Number(f64::from(self.total_packet_length)),
            Column::Payload => Value::Text(self.payload.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode_ethernet;
    use crate::tests::fixtures;

    #[test]
    fn test_extracts_tcp_fields() {
        let frame = fixtures::tcp_frame(40000, 80);
        let packet = ParsedPacket::from_decoded(&decode_ethernet(&frame).unwrap());

        assert!(packet.is_tcp);
        assert_eq!((packet.src_port, packet.dst_port), (40000, 80));
        assert_eq!(packet.header_size, 20.0);
        assert_eq!(packet.total_packet_size, 40.0);
        assert_eq!(packet.payload, hex::encode_upper(&frame[..14]));
        assert_eq!(packet.payload.len(), 28);
        assert!(packet.payload.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_udp_and_other_are_not_tcp() {
        let udp = ParsedPacket::from_decoded(&decode_ethernet(&fixtures::udp_frame(5353, 53)).unwrap());
        let icmp = ParsedPacket::from_decoded(&decode_ethernet(&fixtures::icmp_frame()).unwrap());

        assert!(!udp.is_tcp);
        assert_eq!(udp.total_packet_size, 28.0);
        assert!(!icmp.is_tcp);
        assert_eq!((icmp.src_port, icmp.dst_port), (0, 0));
    }

    #[test]
    fn test_encoder_preserves_every_field() {
        let packet = ParsedPacket {
            is_tcp: true,
            src_port: 65535,
            dst_port: 1,
            header_size: 24.0,
            total_packet_size: 1500.0,
            payload: "00AABB".to_string(),
        };
        let row = PacketData::from(&packet);

        assert_eq!(row.is_tcp, packet.is_tcp);
        assert_eq!(row.src_port, packet.src_port);
        assert_eq!(row.dst_port, packet.dst_port);
        assert_eq!(row.header_size, packet.header_size);
        assert_eq!(row.total_packet_length, packet.total_packet_size);
        assert_eq!(row.payload, packet.payload);
    }

    #[test]
    fn test_column_values() {
        let row = PacketData {
            is_tcp: false,
            src_port: 53,
            dst_port: 1024,
            header_size: 20.0,
            total_packet_length: 60.0,
            payload: "FF".to_string(),
        };
        assert_eq!(row.value(Column::IsTcp), Value::Bool(false));
        assert_eq!(row.value(Column::DstPort), Value::Number(1024.0));
        assert_eq!(row.value(Column::Payload), Value::Text("FF".to_string()));
        assert_eq!(Column::ALL.len(), 6);
        assert_eq!(Column::TotalPacketLength.name(), "totalPacketLength");
    }
}
