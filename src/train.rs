//! Training run: feature file in, persisted model and held-out metrics out.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use log::{info, warn};

use crate::config::PipelineConfig;
use crate::dataset::{read_feature_file, split};
use crate::error::{ClassifierError, Result};
use crate::features::PacketData;
use crate::ml::{evaluate, LogisticRegression, Metrics, Trainer};
use crate::model::ModelArtifact;
use crate::pipeline::PipelineSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingStage {
    LoadRows,
    SplitTrainTest,
    BuildTransformPipeline,
    Fit,
    PersistModel,
    Evaluate,
    ReportMetrics,
}

impl fmt::Display for TrainingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub train_rows: usize,
    pub test_rows: usize,
    pub vocabulary_size: usize,
    pub metrics: Metrics,
    pub model_file: PathBuf,
}

/// Runs every stage in order; the first failure aborts the run.
pub fn run(config: &PipelineConfig) -> Result<TrainingReport> {
    use TrainingStage::*;

    info!("[{}] {}", LoadRows, config.feature_file.display());
    let rows = read_feature_file(&config.feature_file).map_err(|e| e.in_stage(LoadRows))?;
    if rows.is_empty() {
        return Err(ClassifierError::DatasetError(format!(
            "{} contains no rows",
            config.feature_file.display()
        ))
        .in_stage(LoadRows));
    }

    let (train_rows, test_rows) =
        split(&rows, config.test_fraction, config.seed).map_err(|e| e.in_stage(SplitTrainTest))?;
    info!(
        "[{}] {} train / {} test (fraction {}, seed {})",
        SplitTrainTest,
        train_rows.len(),
        test_rows.len(),
        config.test_fraction,
        config.seed
    );

    let spec = PipelineSpec::standard();
    let pipeline = spec.fit(&train_rows).map_err(|e| e.in_stage(BuildTransformPipeline))?;
    info!(
        "[{}] {} steps, {} payload tokens",
        BuildTransformPipeline,
        spec.steps.len(),
        pipeline.vocabulary_size()
    );

    let (train_features, train_labels) = pipeline
        .transform_batch(&train_rows)
        .map_err(|e| e.in_stage(Fit))?;
    let trainer = LogisticRegression::from(&config.trainer);
    let model = trainer
        .fit(&train_features, &train_labels)
        .map_err(|e| e.in_stage(Fit))?;
    info!("[{}] {} features, {} examples", Fit, train_features.ncols(), train_features.nrows());

    let artifact = ModelArtifact::new(pipeline, model, train_rows.len());
    artifact.save(&config.model_file).map_err(|e| e.in_stage(PersistModel))?;
    info!("[{}] {}", PersistModel, config.model_file.display());

    let metrics = match held_out_metrics(&artifact, &test_rows) {
        Ok(metrics) => metrics,
        Err(e) => {
            if let Err(remove_err) = fs::remove_file(&config.model_file) {
                warn!("Could not remove {}: {}", config.model_file.display(), remove_err);
            }
            return Err(e.in_stage(Evaluate));
        }
    };

    info!(
        "[{}] accuracy {:.4} f1 {:.4}",
        ReportMetrics, metrics.accuracy, metrics.f1_score
    );
    Ok(TrainingReport {
        train_rows: train_rows.len(),
        test_rows: test_rows.len(),
        vocabulary_size: artifact.pipeline.vocabulary_size(),
        metrics,
        model_file: config.model_file.clone(),
    })
}

fn held_out_metrics(artifact: &ModelArtifact, test_rows: &[PacketData]) -> Result<Metrics> {
    let (features, labels) = artifact.pipeline.transform_batch(test_rows)?;
    evaluate(&artifact.model, &features, &labels)
}
