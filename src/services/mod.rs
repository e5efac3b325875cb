//! Service layer for separating concerns
//!
//! This module contains services that separate I/O, encoding, progress
//! reporting and upload handling from the segmentation pipeline, making the
//! system more modular and testable.

pub mod encoding;
pub mod io;
pub mod layering;
pub mod progress;

pub use encoding::MaskEncoder;
pub use io::ImageIOService;
pub use layering::{ImageUpload, LayerResponse, LayerService};
pub use progress::{
    ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressUpdate,
};
