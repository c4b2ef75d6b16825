//! Persistence: JSON analysis reports, compressed HR-Mel archives and batch
//! aggregates.

pub mod archive;
pub mod batch;
pub mod report;

pub use archive::{ExtractSummary, HrMelMeta, compressed_size_bytes, load_hr_mel, save_hr_mel};
pub use batch::{BatchReport, BatchSettings, FailedTrack, MeanStd, mean_std};
pub use report::{AnalysisSummary, RepresentationReport, Status, write_json};
