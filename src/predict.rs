//! Re-scores every packet of the current trace with a persisted model.

use std::path::Path;

use log::{debug, info};

use crate::dataset::Dataset;
use crate::error::{ClassifierError, Result};
use crate::features::PacketData;
use crate::model::ModelArtifact;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mismatch {
    /// Position of the packet in the dataset.
    pub index: usize,
    pub predicted: bool,
    pub actual: bool,
    pub probability: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionReport {
    pub total: usize,
    pub correct: usize,
    pub mismatches: Vec<Mismatch>,
}

impl PredictionReport {
    /// `correct / total`, counted once per scored packet.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    fn record(&mut self, index: usize, predicted: bool, actual: bool, probability: f64) {
        self.total += 1;
        if predicted == actual {
            self.correct += 1;
        } else {
            debug!("packet {} predicted {} actual {}", index, predicted, actual);
            self.mismatches.push(Mismatch {
                index,
                predicted,
                actual,
                probability,
            });
        }
    }
}

pub fn run(model_file: &Path, dataset: &Dataset) -> Result<PredictionReport> {
    let artifact = ModelArtifact::load(model_file)?;
    info!(
        "Loaded model from {} (trained {} on {} rows, {} payload tokens)",
        model_file.display(),
        artifact.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        artifact.training_rows,
        artifact.pipeline.vocabulary_size()
    );
    score_dataset(&artifact, dataset)
}

pub fn score_dataset(artifact: &ModelArtifact, dataset: &Dataset) -> Result<PredictionReport> {
    if dataset.is_empty() {
        return Err(ClassifierError::DatasetError("no packets to score".to_string()));
    }

    let mut report = PredictionReport::default();
    for (index, packet) in dataset.packets().iter().enumerate() {
        let row = PacketData::from(packet);
        let (actual, prediction) = artifact.score(&row)?;
        report.record(index, prediction.label, actual, prediction.probability);
    }

    info!(
        "Scored {} packets: {} correct, {} mismatched",
        report.total,
        report.correct,
        report.mismatches.len()
    );
    Ok(report)
}
