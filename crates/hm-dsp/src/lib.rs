//! Signal processing core: STFT power, Mel filterbanks, HR-Mel and baseline
//! encoders, pseudo-inverse and reconstruction-error analysis.

pub mod encoder;
pub mod filterbank;
pub mod pinv;
pub mod recon;
pub mod stft;

pub use encoder::{EncodedRepresentation, Encoder, LinearMap, RepresentationKind, Segment};
pub use filterbank::{Filterbank, FilterbankCache, FilterbankKey};
pub use recon::{Analysis, ReconstructionAnalyzer, ReconstructionOutcome, RegionError};
pub use stft::{PowerSpectrogram, power_spectrogram};
