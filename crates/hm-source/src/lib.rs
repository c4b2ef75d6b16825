//! Waveform sources for HR-Mel (decoded files, synthetic signals).

pub mod audio;
pub mod folder_batch;

#[cfg(feature = "procedural")]
pub mod procedural;
