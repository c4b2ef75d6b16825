//! Error taxonomy shared by every HR-Mel crate.

use thiserror::Error;

/// Result alias for core and DSP operations.
pub type HrMelResult<T> = Result<T, HrMelError>;

/// Errors raised while configuring, encoding or analyzing a representation.
///
/// Zero-energy input is deliberately absent: the analyzer reports it as an
/// undefined outcome so the remaining representations still complete.
#[derive(Debug, Error)]
pub enum HrMelError {
    /// Invalid band partition, STFT geometry or analyzer setting.
    #[error("configuration error: {message}")]
    Config {
        /// Human readable reason.
        message: String,
    },

    /// Empty, too short or undecodable waveform.
    #[error("input error: {message}")]
    Input {
        /// Human readable reason.
        message: String,
    },

    /// A compression received a value outside its domain.
    #[error("{compression} is undefined for negative input {value}")]
    Domain {
        /// Compression name.
        compression: &'static str,
        /// Offending value.
        value: f64,
    },

    /// Matrix dimensions do not line up.
    #[error("shape mismatch in {context}: expected {expected}, found {found}")]
    Shape {
        /// Operation that detected the mismatch.
        context: &'static str,
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Failure reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HrMelError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an input error.
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
        }
    }

    /// Creates a shape error.
    #[must_use]
    pub fn shape(context: &'static str, expected: usize, found: usize) -> Self {
        Self::Shape {
            context,
            expected,
            found,
        }
    }

    /// True for errors that must stop the run before any computation.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_category() {
        assert_eq!(
            HrMelError::config("hop is zero").to_string(),
            "configuration error: hop is zero"
        );
        assert_eq!(
            HrMelError::shape("decode", 96, 80).to_string(),
            "shape mismatch in decode: expected 96, found 80"
        );
        assert!(HrMelError::config("x").is_config());
        assert!(!HrMelError::input("x").is_config());
    }
}
