//! Offline trace reading.
//!
//! The trace is memory-mapped, drained into owned [`RawFrame`]s and released
//! before anything downstream runs. Classic pcap and pcapng are both accepted;
//! the link type travels with every frame so the decoder can filter on it.

use std::fs::File;
use std::path::Path;

use log::{debug, info, warn};
use memmap2::Mmap;
use pcap_file::pcap::PcapReader;
use pcap_file::pcapng::{Block, PcapNgReader};
use pcap_file::DataLink;

use crate::error::{ClassifierError, Result};

const PCAPNG_MAGIC: [u8; 4] = [0x0A, 0x0D, 0x0D, 0x0A];
const PCAP_MAGICS: [[u8; 4]; 4] = [
    [0xA1, 0xB2, 0xC3, 0xD4],
    [0xD4, 0xC3, 0xB2, 0xA1],
    [0xA1, 0xB2, 0x3C, 0x4D],
    [0x4D, 0x3C, 0xB2, 0xA1],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    Other(u32),
}

impl From<DataLink> for LinkType {
    fn from(link: DataLink) -> Self {
        match link {
            DataLink::ETHERNET => LinkType::Ethernet,
            other => LinkType::Other(u32::from(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub link_type: LinkType,
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn ethernet(data: Vec<u8>) -> Self {
        Self {
            link_type: LinkType::Ethernet,
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceFormat {
    Pcap,
    PcapNg,
}

impl TraceFormat {
    pub fn detect(bytes: &[u8]) -> Result<Self> {
        let magic: [u8; 4] = bytes
            .get(..4)
            .and_then(|m| m.try_into().ok())
            .ok_or_else(|| ClassifierError::CaptureError("trace is shorter than a file header".to_string()))?;

        if magic == PCAPNG_MAGIC {
            Ok(TraceFormat::PcapNg)
        } else if PCAP_MAGICS.contains(&magic) {
            Ok(TraceFormat::Pcap)
        } else {
            Err(ClassifierError::CaptureError(format!(
                "unrecognised trace magic {}",
                hex::encode(magic)
            )))
        }
    }
}

/// Reads every frame of a recorded trace, in file order.
///
/// Opening, mapping or header errors are fatal. A damaged record in the
/// middle of the file ends the replay with a warning; frames read so far are kept.
pub fn read_trace(path: &Path) -> Result<Vec<RawFrame>> {
    let file = File::open(path).map_err(|e| {
        ClassifierError::CaptureError(format!("cannot open {}: {}", path.display(), e))
    })?;
    // The mapping is read-only and lives only for the duration of this call.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
        ClassifierError::CaptureError(format!("cannot map {}: {}", path.display(), e))
    })?;

    let format = TraceFormat::detect(&mmap)?;
    info!("Reading {:?} trace {} ({} bytes)", format, path.display(), mmap.len());

    let frames = match format {
        TraceFormat::Pcap => read_pcap(&mmap)?,
        TraceFormat::PcapNg => read_pcapng(&mmap)?,
    };

    info!("Trace drained: {} frames", frames.len());
    Ok(frames)
}

fn read_pcap(bytes: &[u8]) -> Result<Vec<RawFrame>> {
    let mut reader = PcapReader::new(bytes)?;
    let link_type = LinkType::from(reader.header().datalink);
    debug!("pcap link type {:?}", link_type);

    let mut frames = Vec::new();
    while let Some(packet) = reader.next_packet() {
        match packet {
            Ok(packet) => frames.push(RawFrame {
                link_type,
                data: packet.data.into_owned(),
            }),
            Err(e) => {
                warn!("Stopping replay after {} frames: {}", frames.len(), e);
                break;
            }
        }
    }
    Ok(frames)
}

fn read_pcapng(bytes: &[u8]) -> Result<Vec<RawFrame>> {
    let mut reader = PcapNgReader::new(bytes)?;
    let mut interfaces: Vec<LinkType> = Vec::new();
    let mut frames = Vec::new();

    while let Some(block) = reader.next_block() {
        let block = match block {
            Ok(block) => block,
            Err(e) => {
                warn!("Stopping replay after {} frames: {}", frames.len(), e);
                break;
            }
        };

        match block {
            // Interface ids are scoped to their section.
            Block::SectionHeader(_) => interfaces.clear(),
            Block::InterfaceDescription(idb) => interfaces.push(LinkType::from(idb.linktype)),
            Block::EnhancedPacket(epb) => match interfaces.get(epb.interface_id as usize) {
                Some(&link_type) => frames.push(RawFrame {
                    link_type,
                    data: epb.data.into_owned(),
                }),
                None => warn!("Packet references unknown interface {}", epb.interface_id),
            },
            Block::SimplePacket(spb) => match interfaces.first() {
                Some(&link_type) => frames.push(RawFrame {
                    link_type,
                    data: spb.data.into_owned(),
                }),
                None => warn!("Simple packet block before any interface description"),
            },
            _ => {}
        }
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures;
    use pcap_file::pcap::{PcapHeader, PcapPacket, PcapWriter};
    use std::borrow::Cow;
    use std::time::Duration;

    #[test]
    fn test_detect_formats() {
        assert_eq!(TraceFormat::detect(&[0xD4, 0xC3, 0xB2, 0xA1, 0, 0]).unwrap(), TraceFormat::Pcap);
        assert_eq!(TraceFormat::detect(&PCAPNG_MAGIC).unwrap(), TraceFormat::PcapNg);
        assert!(TraceFormat::detect(b"GIF89a").is_err());
        assert!(TraceFormat::detect(&[0xD4]).is_err());
    }

    #[test]
    fn test_missing_trace_is_capture_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_trace(&dir.path().join("absent.pcap"));
        assert!(matches!(result, Err(ClassifierError::CaptureError(_))));
    }

    #[test]
    fn test_garbage_trace_is_capture_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.pcap");
        std::fs::write(&path, b"definitely not a capture file").unwrap();
        assert!(matches!(read_trace(&path), Err(ClassifierError::CaptureError(_))));
    }

    #[test]
    fn test_reads_pcap_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.pcap");
        let frames = vec![
            fixtures::tcp_frame(1000, 80),
            fixtures::udp_frame(5353, 53),
            fixtures::arp_frame(),
        ];
        fixtures::write_pcap(&path, &frames);

        let read = read_trace(&path).unwrap();
        assert_eq!(read.len(), 3);
        for (raw, original) in read.iter().zip(&frames) {
            assert_eq!(raw.link_type, LinkType::Ethernet);
            assert_eq!(&raw.data, original);
        }
    }

    #[test]
    fn test_truncated_last_record_keeps_earlier_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.pcap");
        let frames = vec![
            fixtures::tcp_frame(1000, 80),
            fixtures::udp_frame(5353, 53),
            fixtures::tcp_frame(1001, 443),
        ];
        fixtures::write_pcap(&path, &frames);

        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        let len = file.metadata().unwrap().len();
        file.set_len(len - 10).unwrap();
        drop(file);

        let read = read_trace(&path).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].data, frames[0]);
        assert_eq!(read[1].data, frames[1]);
    }

    #[test]
    fn test_pcap_link_type_is_carried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.pcap");
        let file = File::create(&path).unwrap();
        let header = PcapHeader {
            datalink: DataLink::RAW,
            ..Default::default()
        };
        let mut writer = PcapWriter::with_header(file, header).unwrap();
        let data = fixtures::tcp_frame(1, 2);
        writer
            .write_packet(&PcapPacket::new(Duration::ZERO, data.len() as u32, &data))
            .unwrap();
        drop(writer);

        let read = read_trace(&path).unwrap();
        assert_eq!(read.len(), 1);
        assert_ne!(read[0].link_type, LinkType::Ethernet);
    }

    #[test]
    fn test_reads_pcapng_packets() {
        use pcap_file::pcapng::blocks::enhanced_packet::EnhancedPacketBlock;
        use pcap_file::pcapng::blocks::interface_description::InterfaceDescriptionBlock;
        use pcap_file::pcapng::PcapNgWriter;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.pcapng");
        let data = fixtures::udp_frame(40000, 53);
        {
            let file = File::create(&path).unwrap();
            let mut writer = PcapNgWriter::new(file).unwrap();
            let idb = InterfaceDescriptionBlock {
                linktype: DataLink::ETHERNET,
                snaplen: 0xFFFF,
                options: vec![],
            };
            writer.write_block(&Block::InterfaceDescription(idb)).unwrap();
            let epb = EnhancedPacketBlock {
                interface_id: 0,
                timestamp: Duration::from_secs(1),
                original_len: data.len() as u32,
                data: Cow::Borrowed(&data),
                options: vec![],
            };
            writer.write_block(&Block::EnhancedPacket(epb)).unwrap();
        }

        let read = read_trace(&path).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].link_type, LinkType::Ethernet);
        assert_eq!(read[0].data, data);
    }
}
