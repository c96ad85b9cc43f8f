//! Feature transform pipeline.
//!
//! A pipeline is an ordered list of [`TransformStep`] values. Each step maps
//! one [`Schema`] to the next, so the whole chain can be checked before any
//! data is touched. Fitting learns per-step state (vocabulary, normalizer
//! statistics) from the training rows only; the resulting [`FittedPipeline`]
//! is stored with the model and replayed unchanged at prediction time.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::debug;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{ClassifierError, Result};
use crate::features::{Column, PacketData, Value};
use crate::stats::SimdStats;

pub const LABEL_COLUMN: &str = "Label";
pub const FEATURES_COLUMN: &str = "Features";
pub const PAYLOAD_ENCODED_COLUMN: &str = "payloadEncoded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Bool,
    Number,
    Text,
    Vector,
}

impl ColumnKind {
    fn of(value: &Value) -> Self {
        match value {
            Value::Bool(_) => ColumnKind::Bool,
            Value::Number(_) => ColumnKind::Number,
            Value::Text(_) => ColumnKind::Text,
            Value::Vector(_) => ColumnKind::Vector,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<(String, ColumnKind)>,
}

impl Schema {
    /// Schema of a feature file row.
    pub fn packet_data() -> Self {
        let columns = Column::ALL
            .iter()
            .map(|column| {
                let kind = match column {
                    Column::IsTcp => ColumnKind::Bool,
                    Column::Payload => ColumnKind::Text,
                    _ => ColumnKind::Number,
                };
                (column.name().to_string(), kind)
            })
            .collect();
        Schema { columns }
    }

    pub fn kind(&self, name: &str) -> Option<ColumnKind> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, kind)| *kind)
    }

    fn require(&self, name: &str, allowed: &[ColumnKind], step: &TransformStep) -> Result<ColumnKind> {
        match self.kind(name) {
            Some(kind) if allowed.contains(&kind) => Ok(kind),
            Some(kind) => Err(ClassifierError::SchemaError(format!(
                "{}: column '{}' is {:?}, expected one of {:?}",
                step, name, kind, allowed
            ))),
            None => Err(ClassifierError::SchemaError(format!(
                "{}: column '{}' does not exist",
                step, name
            ))),
        }
    }

    fn with(mut self, name: &str, kind: ColumnKind) -> Self {
        match self.columns.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = kind,
            None => self.columns.push((name.to_string(), kind)),
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransformStep {
    CopyColumn { input: String, output: String },
    OneHotEncode { input: String, output: String },
    NormalizeMeanVariance { column: String },
    Concatenate { inputs: Vec<String>, output: String },
}

impl fmt::Display for TransformStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformStep::CopyColumn { input, output } => write!(f, "CopyColumn({} -> {})", input, output),
            TransformStep::OneHotEncode { input, output } => write!(f, "OneHotEncode({} -> {})", input, output),
            TransformStep::NormalizeMeanVariance { column } => write!(f, "NormalizeMeanVariance({})", column),
            TransformStep::Concatenate { inputs, output } => {
                write!(f, "Concatenate({} -> {})", inputs.join(", "), output)
            }
        }
    }
}

impl TransformStep {
    pub fn output_schema(&self, input: &Schema) -> Result<Schema> {
        match self {
            TransformStep::CopyColumn { input: source, output } => {
                let kind = input.require(source, &[ColumnKind::Bool, ColumnKind::Number, ColumnKind::Text, ColumnKind::Vector], self)?;
                Ok(input.clone().with(output, kind))
            }
            TransformStep::OneHotEncode { input: source, output } => {
                input.require(source, &[ColumnKind::Text], self)?;
                Ok(input.clone().with(output, ColumnKind::Vector))
            }
            TransformStep::NormalizeMeanVariance { column } => {
                input.require(column, &[ColumnKind::Number], self)?;
                Ok(input.clone())
            }
            TransformStep::Concatenate { inputs, output } => {
                if inputs.is_empty() {
                    return Err(ClassifierError::SchemaError(format!("{}: no inputs", self)));
                }
                for source in inputs {
                    input.require(source, &[ColumnKind::Number, ColumnKind::Vector], self)?;
                }
                Ok(input.clone().with(output, ColumnKind::Vector))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub steps: Vec<TransformStep>,
}

impl PipelineSpec {
    /// Label copy, payload one-hot, port/header normalization, concatenation.
    pub fn standard() -> Self {
        let normalized = [Column::SrcPort, Column::DstPort, Column::HeaderSize];

        let mut steps = vec![
            TransformStep::CopyColumn {
                input: Column::IsTcp.name().to_string(),
                output: LABEL_COLUMN.to_string(),
            },
            TransformStep::OneHotEncode {
                input: Column::Payload.name().to_string(),
                output: PAYLOAD_ENCODED_COLUMN.to_string(),
            },
        ];
        steps.extend(normalized.iter().map(|column| TransformStep::NormalizeMeanVariance {
            column: column.name().to_string(),
        }));

        let mut inputs = vec![PAYLOAD_ENCODED_COLUMN.to_string()];
        inputs.extend(normalized.iter().map(|c| c.name().to_string()));
        steps.push(TransformStep::Concatenate {
            inputs,
            output: FEATURES_COLUMN.to_string(),
        });

        PipelineSpec { steps }
    }

    /// Folds every step over `input`, failing on the first inconsistency.
    pub fn output_schema(&self, input: &Schema) -> Result<Schema> {
        let schema = self
            .steps
            .iter()
            .try_fold(input.clone(), |schema, step| step.output_schema(&schema))?;

        if schema.kind(LABEL_COLUMN) != Some(ColumnKind::Bool) {
            return Err(ClassifierError::SchemaError(format!(
                "pipeline must produce a Bool '{}' column",
                LABEL_COLUMN
            )));
        }
        if schema.kind(FEATURES_COLUMN) != Some(ColumnKind::Vector) {
            return Err(ClassifierError::SchemaError(format!(
                "pipeline must produce a Vector '{}' column",
                FEATURES_COLUMN
            )));
        }
        Ok(schema)
    }

    pub fn fit(&self, rows: &[PacketData]) -> Result<FittedPipeline> {
        let input_schema = Schema::packet_data();
        self.output_schema(&input_schema)?;
        if rows.is_empty() {
            return Err(ClassifierError::DatasetError("cannot fit a pipeline on zero rows".to_string()));
        }

        let mut frames: Vec<Row> = rows.iter().map(Row::from).collect();
        let mut fitted = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let fitted_step = FittedStep::fit(step, &frames)?;
            for frame in frames.iter_mut() {
                fitted_step.apply(frame)?;
            }
            debug!("Fitted {}", step);
            fitted.push(fitted_step);
        }

        Ok(FittedPipeline {
            input_schema,
            steps: fitted,
        })
    }
}

/// Working row: named values flowing through the steps.
#[derive(Debug, Clone, PartialEq)]
struct Row(BTreeMap<String, Value>);

impl From<&PacketData> for Row {
    fn from(data: &PacketData) -> Self {
        Row(Column::ALL
            .iter()
            .map(|column| (column.name().to_string(), data.value(*column)))
            .collect())
    }
}

impl Row {
    fn get(&self, name: &str) -> Result<&Value> {
        self.0
            .get(name)
            .ok_or_else(|| ClassifierError::SchemaError(format!("row has no column '{}'", name)))
    }

    fn number(&self, name: &str) -> Result<f64> {
        match self.get(name)? {
            Value::Number(n) => Ok(*n),
            other => Err(kind_mismatch(name, ColumnKind::Number, other)),
        }
    }

    fn text(&self, name: &str) -> Result<&str> {
        match self.get(name)? {
            Value::Text(t) => Ok(t),
            other => Err(kind_mismatch(name, ColumnKind::Text, other)),
        }
    }

    fn set(&mut self, name: &str, value: Value) {
        self.0.insert(name.to_string(), value);
    }
}

fn kind_mismatch(name: &str, expected: ColumnKind, found: &Value) -> ClassifierError {
    ClassifierError::SchemaError(format!(
        "column '{}' holds {:?}, expected {:?}",
        name,
        ColumnKind::of(found),
        expected
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum FittedStep {
    CopyColumn { input: String, output: String },
    /// Vector width is `vocabulary.len() + 1`; the last slot is the unknown bucket.
    OneHotEncode { input: String, output: String, vocabulary: BTreeMap<String, usize> },
    NormalizeMeanVariance { column: String, mean: f64, scale: f64 },
    Concatenate { inputs: Vec<String>, output: String },
}

impl FittedStep {
    fn fit(step: &TransformStep, frames: &[Row]) -> Result<Self> {
        Ok(match step {
            TransformStep::CopyColumn { input, output } => FittedStep::CopyColumn {
                input: input.clone(),
                output: output.clone(),
            },
            TransformStep::OneHotEncode { input, output } => {
                let tokens = frames
                    .iter()
                    .map(|frame| frame.text(input))
                    .collect::<Result<BTreeSet<&str>>>()?;
                let vocabulary = tokens
                    .into_iter()
                    .enumerate()
                    .map(|(index, token)| (token.to_string(), index))
                    .collect();
                FittedStep::OneHotEncode {
                    input: input.clone(),
                    output: output.clone(),
                    vocabulary,
                }
            }
            TransformStep::NormalizeMeanVariance { column } => {
                let values = frames
                    .iter()
                    .map(|frame| frame.number(column))
                    .collect::<Result<Vec<f64>>>()?;
                let mean = SimdStats::mean(&values);
                let std_dev = SimdStats::std_dev(&values, mean);
                FittedStep::NormalizeMeanVariance {
                    column: column.clone(),
                    mean,
                    scale: if std_dev > 0.0 { std_dev } else { 1.0 },
                }
            }
            TransformStep::Concatenate { inputs, output } => FittedStep::Concatenate {
                inputs: inputs.clone(),
                output: output.clone(),
            },
        })
    }

    fn apply(&self, row: &mut Row) -> Result<()> {
        match self {
            FittedStep::CopyColumn { input, output } => {
                let value = row.get(input)?.clone();
                row.set(output, value);
            }
            FittedStep::OneHotEncode { input, output, vocabulary } => {
                let mut encoded = vec![0.0; vocabulary.len() + 1];
                let slot = vocabulary.get(row.text(input)?).copied().unwrap_or(vocabulary.len());
                encoded[slot] = 1.0;
                row.set(output, Value::Vector(encoded));
            }
            FittedStep::NormalizeMeanVariance { column, mean, scale } => {
                let value = row.number(column)?;
                row.set(column, Value::Number((value - mean) / scale));
            }
            FittedStep::Concatenate { inputs, output } => {
                let mut joined = Vec::new();
                for input in inputs {
                    match row.get(input)? {
                        Value::Number(n) => joined.push(*n),
                        Value::Vector(v) => joined.extend_from_slice(v),
                        other => return Err(kind_mismatch(input, ColumnKind::Vector, other)),
                    }
                }
                row.set(output, Value::Vector(joined));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    input_schema: Schema,
    steps: Vec<FittedStep>,
}

impl FittedPipeline {
    pub fn input_schema(&self) -> &Schema {
        &self.input_schema
    }

    /// Number of distinct payload tokens seen while fitting.
    pub fn vocabulary_size(&self) -> usize {
        self.steps
            .iter()
            .map(|step| match step {
                FittedStep::OneHotEncode { vocabulary, .. } => vocabulary.len(),
                _ => 0,
            })
            .sum()
    }

    pub fn transform(&self, data: &PacketData) -> Result<(bool, Array1<f64>)> {
        let mut row = Row::from(data);
        for step in &self.steps {
            step.apply(&mut row)?;
        }

        let label = match row.get(LABEL_COLUMN)? {
            Value::Bool(b) => *b,
            other => return Err(kind_mismatch(LABEL_COLUMN, ColumnKind::Bool, other)),
        };
        let features = match row.get(FEATURES_COLUMN)? {
            Value::Vector(v) => Array1::from(v.clone()),
            other => return Err(kind_mismatch(FEATURES_COLUMN, ColumnKind::Vector, other)),
        };
        Ok((label, features))
    }

    /// Transforms a batch into a feature matrix (one row per input) and labels.
    pub fn transform_batch(&self, rows: &[PacketData]) -> Result<(Array2<f64>, Vec<bool>)> {
        let mut labels = Vec::with_capacity(rows.len());
        let mut flat = Vec::new();
        let mut width = None;

        for data in rows {
            let (label, features) = self.transform(data)?;
            match width {
                None => width = Some(features.len()),
                Some(w) if w != features.len() => {
                    return Err(ClassifierError::SchemaError(format!(
                        "feature width changed from {} to {}",
                        w,
                        features.len()
                    )))
                }
                Some(_) => {}
            }
            labels.push(label);
            flat.extend(features.iter());
        }

        let matrix = Array2::from_shape_vec((rows.len(), width.unwrap_or(0)), flat)
            .map_err(|e| ClassifierError::SchemaError(e.to_string()))?;
        Ok((matrix, labels))
    }
}
