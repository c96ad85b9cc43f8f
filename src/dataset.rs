//! Packet accumulation, the tab-separated feature file and the holdout split.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::capture::RawFrame;
use crate::decoder::{decode_frame, DropReason};
use crate::error::{ClassifierError, Result};
use crate::features::{PacketData, ParsedPacket};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecodeStats {
    pub frames: usize,
    pub accepted: usize,
    pub dropped: BTreeMap<DropReason, usize>,
}

impl DecodeStats {
    pub fn dropped_total(&self) -> usize {
        self.dropped.values().sum()
    }

    fn record(&mut self, outcome: &std::result::Result<ParsedPacket, DropReason>) {
        self.frames += 1;
        match outcome {
            Ok(_) => self.accepted += 1,
            Err(reason) => *self.dropped.entry(*reason).or_insert(0) += 1,
        }
    }
}

/// Ordered, append-only packet sequence for one trace.
#[derive(Debug, Default, Clone)]
pub struct Dataset {
    packets: Vec<ParsedPacket>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes every frame and keeps the accepted ones in arrival order.
    ///
    /// With `parallel` set the frames are decoded on the rayon pool; the
    /// indexed collect keeps the result identical to the sequential path.
    pub fn from_frames(frames: &[RawFrame], parallel: bool) -> (Self, DecodeStats) {
        let decode = |frame: &RawFrame| {
            decode_frame(frame).map(|decoded| ParsedPacket::from_decoded(&decoded))
        };
        let outcomes: Vec<_> = if parallel {
            frames.par_iter().map(decode).collect()
        } else {
            frames.iter().map(decode).collect()
        };

        let mut stats = DecodeStats::default();
        let mut dataset = Dataset::new();
        for outcome in outcomes {
            stats.record(&outcome);
            if let Ok(packet) = outcome {
                dataset.append(packet);
            }
        }

        info!(
            "Decoded {} frames: {} accepted, {} dropped",
            stats.frames,
            stats.accepted,
            stats.dropped_total()
        );
        for (reason, count) in &stats.dropped {
            debug!("  dropped {} ({})", count, reason);
        }
        (dataset, stats)
    }

    pub fn append(&mut self, packet: ParsedPacket) {
        self.packets.push(packet);
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn packets(&self) -> &[ParsedPacket] {
        &self.packets
    }

    pub fn tcp_count(&self) -> usize {
        self.packets.iter().filter(|p| p.is_tcp).count()
    }

    /// Writes one tab-separated line per packet, replacing any existing file.
    pub fn write_feature_file(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(BufWriter::new(file));

        for packet in &self.packets {
            writer.serialize(PacketData::from(packet))?;
        }
        writer.flush()?;

        info!("Wrote {} rows to {}", self.packets.len(), path.display());
        Ok(())
    }
}

/// Loads feature file rows in file order.
pub fn read_feature_file(path: &Path) -> Result<Vec<PacketData>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)?;

    let mut rows = Vec::new();
    for (line, record) in reader.deserialize::<PacketData>().enumerate() {
        let row = record.map_err(|e| {
            ClassifierError::ParseError(format!("{} line {}: {}", path.display(), line + 1, e))
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Seeded holdout split.
///
/// The held-out size is `round(n * fraction)` clamped so that both sides get
/// at least one row. Both partitions keep the input order.
pub fn split<T: Clone>(rows: &[T], fraction: f64, seed: u64) -> Result<(Vec<T>, Vec<T>)> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(ClassifierError::ConfigError(format!(
            "test fraction must be in (0, 1), got {}",
            fraction
        )));
    }
    let n = rows.len();
    if n < 2 {
        return Err(ClassifierError::DatasetError(format!(
            "need at least 2 rows to split, got {}",
            n
        )));
    }

    let test_len = ((n as f64 * fraction).round() as usize).clamp(1, n - 1);

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let mut held_out = vec![false; n];
    for &index in &indices[..test_len] {
        held_out[index] = true;
    }

    let (mut train, mut test) = (Vec::with_capacity(n - test_len), Vec::with_capacity(test_len));
    for (row, is_test) in rows.iter().zip(held_out) {
        if is_test {
            test.push(row.clone());
        } else {
            train.push(row.clone());
        }
    }
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::LinkType;
    use crate::tests::fixtures;

    #[test]
    fn test_from_frames_filters_and_counts() {
        let mut frames = vec![
            RawFrame::ethernet(fixtures::tcp_frame(1000, 80)),
            RawFrame::ethernet(fixtures::arp_frame()),
            RawFrame::ethernet(fixtures::udp_frame(5000, 53)),
            RawFrame::ethernet(fixtures::tcp_frame(1000, 80)[..30].to_vec()),
        ];
        frames.push(RawFrame {
            link_type: LinkType::Other(101),
            ..RawFrame::ethernet(fixtures::udp_frame(1, 2))
        });

        let (dataset, stats) = Dataset::from_frames(&frames, false);
        assert_eq!(dataset.len(), 2);
        assert!(dataset.len() < frames.len());
        assert_eq!(stats.frames, 5);
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.dropped_total(), 3);
        assert_eq!(stats.dropped.get(&DropReason::NotIpv4), Some(&1));
        assert_eq!(stats.dropped.get(&DropReason::UnsupportedLinkType), Some(&1));
        assert!(dataset.packets()[0].is_tcp);
        assert!(!dataset.packets()[1].is_tcp);
    }

    #[test]
    fn test_parallel_decode_preserves_order() {
        let frames: Vec<RawFrame> = (0..200u16)
            .map(|i| {
                if i % 3 == 0 {
                    RawFrame::ethernet(fixtures::udp_frame(i, 53))
                } else if i % 7 == 0 {
                    RawFrame::ethernet(fixtures::arp_frame())
                } else {
                    RawFrame::ethernet(fixtures::tcp_frame(i, 443))
                }
            })
            .collect();

        let (sequential, seq_stats) = Dataset::from_frames(&frames, false);
        let (parallel, par_stats) = Dataset::from_frames(&frames, true);
        assert_eq!(sequential.packets(), parallel.packets());
        assert_eq!(seq_stats, par_stats);
    }

    #[test]
    fn test_feature_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("packets.tsv");
        let dataset = fixtures::mixed_dataset(6, 4);

        dataset.write_feature_file(&path).unwrap();
        let rows = read_feature_file(&path).unwrap();

        assert_eq!(rows.len(), dataset.len());
        for (row, packet) in rows.iter().zip(dataset.packets()) {
            assert_eq!(row, &PacketData::from(packet));
        }
    }

    #[test]
    fn test_feature_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("packets.tsv");
        let mut dataset = Dataset::new();
        dataset.append(ParsedPacket {
            is_tcp: true,
            src_port: 1234,
            dst_port: 80,
            header_size: 20.0,
            total_packet_size: 40.0,
            payload: "AABB".to_string(),
        });

        dataset.write_feature_file(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let fields: Vec<&str> = text.trim_end().split('\t').collect();
        assert_eq!(fields, vec!["true", "1234", "80", "20.0", "40.0", "AABB"]);
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_feature_file_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("packets.tsv");
        fixtures::mixed_dataset(6, 4).write_feature_file(&path).unwrap();
        fixtures::mixed_dataset(1, 1).write_feature_file(&path).unwrap();
        assert_eq!(read_feature_file(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_malformed_feature_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.tsv");
        std::fs::write(&path, "maybe\t1\t2\t20\t40\tAA\n").unwrap();
        assert!(matches!(read_feature_file(&path), Err(ClassifierError::ParseError(_))));
    }

    #[test]
    fn test_split_is_deterministic() {
        let rows: Vec<u32> = (0..50).collect();
        let first = split(&rows, 0.2, 1).unwrap();
        let second = split(&rows, 0.2, 1).unwrap();
        assert_eq!(first, second);

        let (train, test) = first;
        assert_eq!(test.len(), 10);
        assert_eq!(train.len(), 40);
        assert!(train.windows(2).all(|w| w[0] < w[1]));
        assert!(test.windows(2).all(|w| w[0] < w[1]));

        let mut all: Vec<u32> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, rows);
    }

    #[test]
    fn test_split_seed_changes_partition() {
        let rows: Vec<u32> = (0..50).collect();
        let (_, a) = split(&rows, 0.2, 1).unwrap();
        let (_, b) = split(&rows, 0.2, 2).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_split_small_inputs() {
        let (train, test) = split(&[1, 2], 0.2, 1).unwrap();
        assert_eq!((train.len(), test.len()), (1, 1));
        assert!(matches!(split(&[1], 0.2, 1), Err(ClassifierError::DatasetError(_))));
        assert!(matches!(split::<u8>(&[], 0.2, 1), Err(ClassifierError::DatasetError(_))));
        assert!(split(&[1, 2, 3], 1.5, 1).is_err());
    }
}
