//! Persisted model: the fitted transform pipeline plus the classifier.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{ClassifierError, Result};
use crate::features::PacketData;
use crate::ml::{BinaryClassifier, LogisticModel, Prediction};
use crate::pipeline::{FittedPipeline, Schema};

const FORMAT_VERSION: u32 = 1;
/// Upper bound on any artifact read or written; length prefixes beyond it are rejected.
const MAX_ARTIFACT_BYTES: usize = 64 * 1024 * 1024;

fn codec() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<MAX_ARTIFACT_BYTES>()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    format_version: u32,
    pub created_at: DateTime<Utc>,
    pub training_rows: usize,
    pub pipeline: FittedPipeline,
    pub model: LogisticModel,
}

impl ModelArtifact {
    pub fn new(pipeline: FittedPipeline, model: LogisticModel, training_rows: usize) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            created_at: Utc::now(),
            training_rows,
            pipeline,
            model,
        }
    }

    pub fn input_schema(&self) -> &Schema {
        self.pipeline.input_schema()
    }

    /// Runs one row through the stored pipeline and classifier.
    pub fn score(&self, data: &PacketData) -> Result<(bool, Prediction)> {
        let (actual, features) = self.pipeline.transform(data)?;
        let prediction = self.model.predict(features.view())?;
        Ok((actual, prediction))
    }

    /// Writes to a sibling temp file and renames it into place, so `path`
    /// only ever holds a complete artifact.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = temp_path(path);
        let written = (|| -> Result<()> {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            bincode::serde::encode_into_std_write(self, &mut writer, codec())?;
            writer.flush()?;
            Ok(())
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, path)?;
        info!("Model saved to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            ClassifierError::ModelError(format!("cannot open {}: {}", path.display(), e))
        })?;
        let mut reader = BufReader::new(file);
        let artifact: Self = bincode::serde::decode_from_std_read(&mut reader, codec())?;

        if artifact.format_version != FORMAT_VERSION {
            return Err(ClassifierError::ModelError(format!(
                "{} has format version {}, expected {}",
                path.display(),
                artifact.format_version,
                FORMAT_VERSION
            )));
        }
        if artifact.input_schema() != &Schema::packet_data() {
            return Err(ClassifierError::SchemaError(format!(
                "{} was trained on a different row schema",
                path.display()
            )));
        }
        Ok(artifact)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineSpec;

    fn rows() -> Vec<PacketData> {
        (0..8u16)
            .map(|i| PacketData {
                is_tcp: i % 2 == 0,
                src_port: 1000 + i,
                dst_port: if i % 2 == 0 { 80 } else { 53 },
                header_size: 20.0,
                total_packet_length: 40.0,
                payload: format!("{:02X}", i % 3),
            })
            .collect()
    }

    fn artifact() -> ModelArtifact {
        let pipeline = PipelineSpec::standard().fit(&rows()).unwrap();
        let width = pipeline.vocabulary_size() + 1 + 3;
        let model = LogisticModel { weights: vec![0.25; width], bias: -0.1 };
        ModelArtifact::new(pipeline, model, 8)
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let original = artifact();

        original.save(&path).unwrap();
        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded, original);
        assert!(!temp_path(&path).exists());
        assert_eq!(loaded.created_at, original.created_at);
        assert!((Utc::now() - loaded.created_at).num_seconds() < 60);

        for row in rows() {
            assert_eq!(loaded.score(&row).unwrap(), original.score(&row).unwrap());
        }
    }

    #[test]
    fn test_missing_model_is_model_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ModelArtifact::load(&dir.path().join("absent.bin"));
        assert!(matches!(result, Err(ClassifierError::ModelError(_))));
    }

    #[test]
    fn test_corrupt_model_is_model_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        std::fs::write(&path, [0xFFu8; 16]).unwrap();
        assert!(matches!(ModelArtifact::load(&path), Err(ClassifierError::ModelError(_))));
    }

    #[test]
    fn test_oversized_length_prefix_is_model_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        // Valid version, timestamp and row count, then a column name claiming 2^44 bytes.
        let created = b"2026-10-16T00:00:00Z";
        let mut bytes = vec![1u8, created.len() as u8];
        bytes.extend_from_slice(created);
        bytes.extend_from_slice(&[0, 1, 253]);
        bytes.extend_from_slice(&(1u64 << 44).to_le_bytes());
        bytes.extend_from_slice(b"isTCP");
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(ModelArtifact::load(&path), Err(ClassifierError::ModelError(_))));
    }

    #[test]
    fn test_save_into_missing_directory_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("model.bin");
        assert!(artifact().save(&path).is_err());
        assert!(!path.exists());
    }
}
