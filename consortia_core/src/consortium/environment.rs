//! Environmental fitness of a species at a target site
//!
//! Each dimension is scored in [0, 1]. Inside the tolerated range the score is a triangle
//! peaking at the optimum (or the centre of the range when no usable optimum is known),
//! outside it decays by a factor of ten per peak to bound distance. Dimensions without data
//! are skipped and the remaining weights renormalized.
use serde::{Deserialize, Serialize};

use crate::configuration::EnvironmentWeights;

/// Score of an oxygen category which matches the site
pub const OXYGEN_MATCH: f64 = 1.0;
/// Score when the species' oxygen category is unknown
pub const OXYGEN_UNKNOWN: f64 = 0.5;
/// Score of an oxygen category which doesn't match the site
pub const OXYGEN_MISMATCH: f64 = 0.2;

/// Oxygen category of a species, or the category a site requires
///
/// Aerobic sites require `Tolerant` species, anaerobic and anoxic sites `NotTolerant` ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OxygenTolerance {
    Tolerant,
    NotTolerant,
}

/// A tolerated interval with an optional optimum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceRange {
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub optimum: Option<f64>,
}

impl ToleranceRange {
    pub fn new(min: f64, max: f64, optimum: Option<f64>) -> Self {
        ToleranceRange { min, max, optimum }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }

    /// Peak of the membership function, the optimum if it lies in the range, else the centre
    fn peak(&self) -> f64 {
        self.optimum
            .filter(|opt| self.contains(*opt))
            .unwrap_or((self.min + self.max) / 2.)
    }

    /// Triangular membership inside the range, exponential tail outside
    ///
    /// Each side of the peak ramps linearly from 0 at its bound to 1 at the peak. Outside the
    /// range the score falls tenfold for every peak to bound distance travelled past the bound.
    ///
    /// # Returns
    /// `None` if the range is empty or inverted, or the value isn't a number
    pub fn score(&self, value: f64) -> Option<f64> {
        let width = self.max - self.min;
        if value.is_nan() || !width.is_finite() || width <= 0. {
            return None;
        }
        let peak = self.peak();
        let ramp = |distance: f64, span: f64| {
            if span <= 0. {
                1.
            } else {
                (distance / span).clamp(0., 1.)
            }
        };
        let tail = |distance: f64, span: f64| {
            let span = if span > 0. { span } else { 1. };
            (-std::f64::consts::LN_10 * distance / span).exp()
        };
        let score = if value < self.min {
            tail(self.min - value, peak - self.min)
        } else if value > self.max {
            tail(value - self.max, self.max - peak)
        } else if value < peak {
            ramp(value - self.min, peak - self.min)
        } else if value > peak {
            ramp(self.max - value, self.max - peak)
        } else {
            1.
        };
        Some(score)
    }
}

/// Environmental tolerances reported for a species
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentTolerance {
    /// Temperature in degrees Celsius
    pub temperature: Option<ToleranceRange>,
    pub ph: Option<ToleranceRange>,
    /// Highest tolerated salinity, % NaCl
    pub salinity_max: Option<f64>,
    pub oxygen: Option<OxygenTolerance>,
}

/// Conditions at the site the consortium is designed for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConditions {
    pub temperature: Option<f64>,
    pub ph: Option<f64>,
    pub salinity: Option<f64>,
    pub oxygen: Option<OxygenTolerance>,
}

/// Soft score and hard filter result of one species
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnvironmentAssessment {
    pub soft_score: f64,
    pub pass_filter: bool,
}

/// One sided salinity score, full marks up to the tolerated maximum
pub fn salinity_score(salinity: f64, max: f64) -> Option<f64> {
    if salinity.is_nan() || max.is_nan() {
        return None;
    }
    if salinity <= max {
        return Some(1.);
    }
    Some((-std::f64::consts::LN_10 * (salinity - max) / max.max(1.)).exp())
}

pub fn oxygen_score(species: Option<OxygenTolerance>, site: OxygenTolerance) -> f64 {
    match species {
        Some(tolerance) if tolerance == site => OXYGEN_MATCH,
        Some(_) => OXYGEN_MISMATCH,
        None => OXYGEN_UNKNOWN,
    }
}

/// Score a species against the site
///
/// A dimension takes part when both the site value and the species tolerance are known. The
/// hard filter passes when every taking part dimension is within range and the oxygen
/// category isn't a mismatch. A species without any usable dimension scores 0 and passes.
pub fn assess(
    tolerance: &EnvironmentTolerance,
    site: &SiteConditions,
    weights: &EnvironmentWeights,
) -> EnvironmentAssessment {
    let mut weighted = 0.;
    let mut total_weight = 0.;
    let mut pass_filter = true;

    let mut include = |score: Option<f64>, weight: f64| {
        if let Some(score) = score {
            weighted += score * weight;
            total_weight += weight;
        }
    };

    if let (Some(value), Some(range)) = (site.temperature, tolerance.temperature) {
        include(range.score(value), weights.temperature);
        pass_filter &= range.contains(value);
    }
    if let (Some(value), Some(range)) = (site.ph, tolerance.ph) {
        include(range.score(value), weights.ph);
        pass_filter &= range.contains(value);
    }
    if let (Some(value), Some(max)) = (site.salinity, tolerance.salinity_max) {
        include(salinity_score(value, max), weights.salinity);
        pass_filter &= value <= max;
    }
    if let Some(required) = site.oxygen {
        let score = oxygen_score(tolerance.oxygen, required);
        include(Some(score), weights.oxygen);
        pass_filter &= score > OXYGEN_MISMATCH;
    }

    let soft_score = if total_weight > 0. {
        weighted / total_weight
    } else {
        0.
    };
    EnvironmentAssessment {
        soft_score,
        pass_filter,
    }
}
