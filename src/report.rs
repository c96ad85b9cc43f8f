use crate::dataset::{Dataset, DecodeStats};
use crate::predict::PredictionReport;
use crate::train::TrainingReport;

/// Mismatch lines printed before the list is summarised.
const MISMATCH_PRINT_LIMIT: usize = 50;

pub fn print_capture_summary(dataset: &Dataset, stats: &DecodeStats) {
    println!("\n\x1b[36m=== Trace Summary ===\x1b[0m");
    println!("Frames read:     \x1b[33m{}\x1b[0m", stats.frames);
    println!("Packets kept:    \x1b[33m{}\x1b[0m", dataset.len());
    println!(
        "TCP / other:     \x1b[33m{} / {}\x1b[0m",
        dataset.tcp_count(),
        dataset.len() - dataset.tcp_count()
    );
    for (reason, count) in &stats.dropped {
        println!("Dropped ({}): {}", reason, count);
    }
}

pub fn print_training_report(report: &TrainingReport) {
    let m = &report.metrics;
    println!("\n\x1b[36m=== Evaluation (held-out split) ===\x1b[0m");
    println!("Train / test rows:  {} / {}", report.train_rows, report.test_rows);
    println!("Payload tokens:     {}", report.vocabulary_size);
    println!("Accuracy:           \x1b[33m{:.4}\x1b[0m", m.accuracy);
    println!("F1 score:           \x1b[33m{:.4}\x1b[0m", m.f1_score);
    println!("Positive recall:    \x1b[33m{:.4}\x1b[0m", m.positive_recall);
    println!("Negative recall:    \x1b[33m{:.4}\x1b[0m", m.negative_recall);
    println!("Positive precision: {:.4}", m.positive_precision);
    println!("Negative precision: {:.4}", m.negative_precision);
    println!(
        "Confusion (tp fp tn fn): {} {} {} {}",
        m.confusion.true_positive,
        m.confusion.false_positive,
        m.confusion.true_negative,
        m.confusion.false_negative
    );
    println!("Model written to {}", report.model_file.display());
}

pub fn print_prediction_report(report: &PredictionReport) {
    println!("\n\x1b[36m=== Prediction ===\x1b[0m");
    for mismatch in report.mismatches.iter().take(MISMATCH_PRINT_LIMIT) {
        println!(
            "\x1b[31mMISMATCH\x1b[0m packet {}: predicted {} actual {} (p={:.3})",
            mismatch.index,
            label_name(mismatch.predicted),
            label_name(mismatch.actual),
            mismatch.probability
        );
    }
    if report.mismatches.len() > MISMATCH_PRINT_LIMIT {
        println!("... and {} more", report.mismatches.len() - MISMATCH_PRINT_LIMIT);
    }
    println!(
        "Accuracy: \x1b[33m{:.4}\x1b[0m ({} / {})",
        report.accuracy(),
        report.correct,
        report.total
    );
}

fn label_name(is_tcp: bool) -> &'static str {
    if is_tcp {
        "TCP"
    } else {
        "non-TCP"
    }
}
