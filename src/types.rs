//! Core enums shared across the crate.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The lifecycle state of a point's evidence integral.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum IntegralStatus {
    /// Integration has not finished yet.
    Pending,
    /// The relative standard error fell below the configured tolerance.
    Converged,
    /// The likelihood produced no usable weight; the point is excluded
    /// from refinement but kept in the record.
    Failed,
    /// The sample or time budget ran out before the tolerance was met.
    LowConfidence,
}

impl IntegralStatus {
    /// Returns `true` once integration has finished, whatever the outcome.
    #[must_use]
    pub fn is_resolved(self) -> bool {
        self != Self::Pending
    }

    /// Returns `true` if the result may feed the refinement surface.
    #[must_use]
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Converged | Self::LowConfidence)
    }

    /// Short lowercase label, used in exports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Converged => "converged",
            Self::Failed => "failed",
            Self::LowConfidence => "low-confidence",
        }
    }
}

impl core::fmt::Display for IntegralStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which points a newly proposed point must keep its distance from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DedupScope {
    /// Only points of the generation being built.
    Generation,
    /// Every point in the run's cumulative history.
    #[default]
    History,
}

/// How the first generation is laid out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InitialDesign {
    /// Independent uniform draws from the intrinsic bounds.
    #[default]
    Random,
    /// Scrambled Sobol low-discrepancy sequence.
    #[cfg(feature = "sobol")]
    Sobol,
}

/// Why the scheduler stopped issuing generations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StopReason {
    /// The aggregate evidence changed by less than the tolerance.
    EvidenceConverged,
    /// The configured generation cap was reached.
    MaxGenerations,
    /// Deduplication left no room for a single new point.
    GridExhausted,
    /// The run's cancel token fired.
    Cancelled,
}
