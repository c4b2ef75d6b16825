//! Shared types for HR-Mel: configuration, band partition, compression
//! curves, errors and the waveform container.

pub mod compression;
pub mod config;
pub mod error;
pub mod waveform;

pub use compression::Compression;
pub use config::{AnalysisConfig, Band, BandPartition, BandSpec, FilterNorm, MelScale, StftParams};
pub use error::{HrMelError, HrMelResult};
pub use waveform::Waveform;
