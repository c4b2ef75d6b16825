//! Per-band dynamic range compression.
//!
//! Every variant declares its inverse so a decoder can undo whichever curve
//! a band was encoded with.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HrMelError, HrMelResult};

const POW075_EXPONENT: f64 = 0.75;

/// Elementwise compression applied to linear band energy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// `ln(1 + x)`.
    #[default]
    Log1p,
    /// `sqrt(ln(1 + x))`, stronger squashing for sparse high bands.
    SqrtLog1p,
    /// `x^0.75`.
    Pow075,
    /// Linear passthrough (plain Mel power).
    None,
}

impl Compression {
    /// Stable name used in reports and archives.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Log1p => "log1p",
            Self::SqrtLog1p => "sqrt_log1p",
            Self::Pow075 => "pow075",
            Self::None => "none",
        }
    }

    /// Compress one linear value.
    ///
    /// # Errors
    /// Returns [`HrMelError::Domain`] for negative (or NaN) input.
    pub fn forward(self, x: f64) -> HrMelResult<f64> {
        if self == Self::None {
            return Ok(x);
        }
        if x.is_nan() || x < 0.0 {
            return Err(HrMelError::Domain {
                compression: self.name(),
                value: x,
            });
        }
        Ok(match self {
            Self::Log1p => x.ln_1p(),
            Self::SqrtLog1p => x.ln_1p().sqrt(),
            Self::Pow075 => x.powf(POW075_EXPONENT),
            Self::None => x,
        })
    }

    /// Undo [`Compression::forward`].
    #[must_use]
    #[inline]
    pub fn inverse(self, y: f64) -> f64 {
        match self {
            Self::Log1p => y.exp_m1(),
            Self::SqrtLog1p => (y * y).exp_m1(),
            Self::Pow075 => y.max(0.0).powf(1.0 / POW075_EXPONENT),
            Self::None => y,
        }
    }

    /// Compress a buffer in place, stopping at the first domain violation.
    ///
    /// # Errors
    /// Returns [`HrMelError::Domain`] if any value is negative.
    pub fn forward_in_place<'a>(
        self,
        values: impl IntoIterator<Item = &'a mut f64>,
    ) -> HrMelResult<()> {
        if self == Self::None {
            return Ok(());
        }
        for v in values {
            *v = self.forward(*v)?;
        }
        Ok(())
    }

    /// Decompress a buffer in place.
    pub fn inverse_in_place<'a>(self, values: impl IntoIterator<Item = &'a mut f64>) {
        if self == Self::None {
            return;
        }
        for v in values {
            *v = self.inverse(*v);
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
