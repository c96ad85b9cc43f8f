use std::fmt;

#[derive(Debug)]
pub enum ClassifierError {
    CaptureError(String),
    DatasetError(String),
    SchemaError(String),
    TrainingError(String),
    ModelError(String),
    ConfigError(String),
    IoError(String),
    ParseError(String),
}

impl ClassifierError {
    /// Prefixes the message with the orchestration stage that produced it.
    /// The variant is kept.
    pub fn in_stage(self, stage: impl fmt::Display) -> Self {
        use ClassifierError::*;
        let tag = |msg: String| format!("{} failed: {}", stage, msg);
        match self {
            CaptureError(msg) => CaptureError(tag(msg)),
            DatasetError(msg) => DatasetError(tag(msg)),
            SchemaError(msg) => SchemaError(tag(msg)),
            TrainingError(msg) => TrainingError(tag(msg)),
            ModelError(msg) => ModelError(tag(msg)),
            ConfigError(msg) => ConfigError(tag(msg)),
            IoError(msg) => IoError(tag(msg)),
            ParseError(msg) => ParseError(tag(msg)),
        }
    }
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierError::CaptureError(msg) => write!(f, "Capture error: {}", msg),
            ClassifierError::DatasetError(msg) => write!(f, "Dataset error: {}", msg),
            ClassifierError::SchemaError(msg) => write!(f, "Schema error: {}", msg),
            ClassifierError::TrainingError(msg) => write!(f, "Training error: {}", msg),
            ClassifierError::ModelError(msg) => write!(f, "Model error: {}", msg),
            ClassifierError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            ClassifierError::IoError(msg) => write!(f, "IO error: {}", msg),
            ClassifierError::ParseError(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for ClassifierError {}

impl From<std::io::Error> for ClassifierError {
    fn from(err: std::io::Error) -> Self {
        ClassifierError::IoError(err.to_string())
    }
}

impl From<csv::Error> for ClassifierError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            ClassifierError::IoError(err.to_string())
        } else {
            ClassifierError::ParseError(err.to_string())
        }
    }
}

impl From<pcap_file::PcapError> for ClassifierError {
    fn from(err: pcap_file::PcapError) -> Self {
        ClassifierError::CaptureError(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for ClassifierError {
    fn from(err: bincode::error::EncodeError) -> Self {
        ClassifierError::ModelError(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for ClassifierError {
    fn from(err: bincode::error::DecodeError) -> Self {
        ClassifierError::ModelError(err.to_string())
    }
}

impl From<&str> for ClassifierError {
    fn from(msg: &str) -> Self {
        ClassifierError::ConfigError(msg.to_string())
    }
}

impl From<String> for ClassifierError {
    fn from(msg: String) -> Self {
        ClassifierError::ConfigError(msg)
    }
}

pub type Result<T> = std::result::Result<T, ClassifierError>;
