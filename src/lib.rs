//! Trains and scores a TCP vs non-TCP packet classifier from a recorded trace.
//!
//! Frames are decoded into [`features::ParsedPacket`]s, written to a
//! tab-separated feature file, and either used to fit a logistic model
//! (`train`) or re-scored against a previously saved one (`predict`).

pub mod capture;
pub mod config;
pub mod dataset;
pub mod decoder;
pub mod error;
pub mod features;
pub mod ml;
pub mod model;
pub mod pipeline;
pub mod predict;
pub mod report;
pub mod stats;
pub mod train;


pub use error::{ClassifierError, Result};
