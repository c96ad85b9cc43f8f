use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{info, warn};

use packet_classifier::capture;
use packet_classifier::config::PipelineConfig;
use packet_classifier::dataset::Dataset;
use packet_classifier::{predict, report, train, ClassifierError, Result};

/// Learns to tell TCP from non-TCP packets in a recorded trace
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// pcap/pcapng file to replay
    trace: PathBuf,

    /// `train` or `predict`; any other value does nothing
    mode: String,

    /// Feature file to write (tab-separated)
    #[arg(long)]
    features: Option<PathBuf>,

    /// Model file to write in train mode or read in predict mode
    #[arg(long)]
    model: Option<PathBuf>,

    /// Seed for the train/test split
    #[arg(long)]
    seed: Option<u64>,

    /// Fraction of rows held out for evaluation
    #[arg(long)]
    test_fraction: Option<f64>,

    /// Gradient descent epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Gradient descent step size
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Decode frames on all cores (output order is unchanged)
    #[arg(long)]
    parallel: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Train,
    Predict,
}

impl Mode {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "train" => Some(Mode::Train),
            "predict" => Some(Mode::Predict),
            _ => None,
        }
    }
}

impl Args {
    fn config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::default();
        if let Some(path) = &self.features {
            config.feature_file = path.clone();
        }
        if let Some(path) = &self.model {
            config.model_file = path.clone();
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(fraction) = self.test_fraction {
            config.test_fraction = fraction;
        }
        if let Some(epochs) = self.epochs {
            config.trainer.epochs = epochs;
        }
        if let Some(rate) = self.learning_rate {
            config.trainer.learning_rate = rate;
        }
        config.parallel_decode = self.parallel;
        config.validate()?;
        Ok(config)
    }
}

fn run(args: &Args) -> Result<()> {
    let Some(mode) = Mode::from_arg(&args.mode) else {
        warn!("Unknown mode '{}', nothing to do (expected train or predict)", args.mode);
        return Ok(());
    };
    let config = args.config()?;

    // The trace is fully drained and released before mode dispatch.
    let (dataset, stats) = {
        let frames = capture::read_trace(&args.trace)?;
        Dataset::from_frames(&frames, config.parallel_decode)
    };
    report::print_capture_summary(&dataset, &stats);

    if dataset.is_empty() {
        return Err(ClassifierError::DatasetError(format!(
            "{} contains no Ethernet/IPv4 packets",
            args.trace.display()
        )));
    }
    dataset.write_feature_file(&config.feature_file)?;

    match mode {
        Mode::Train => {
            info!("Training from {}", config.feature_file.display());
            let training = train::run(&config)?;
            report::print_training_report(&training);
        }
        Mode::Predict => {
            info!("Predicting with {}", config.model_file.display());
            let prediction = predict::run(&config.model_file, &dataset)?;
            report::print_prediction_report(&prediction);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}
