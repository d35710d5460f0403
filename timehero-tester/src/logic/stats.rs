use serde::{Deserialize, Serialize};

/// z-score for a two-sided 95% interval.
pub const Z_95: f64 = 1.96;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p10: f64,
    pub p25: f64,
    pub p75: f64,
    pub p90: f64,
}

/// Summary statistics over one metric across completed runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub percentiles: Percentiles,
}

impl Distribution {
    /// `None` for an empty sample. Non-finite values are ignored.
    #[must_use]
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);
        let count = sorted.len();
        let n = count_f64(count);
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            count,
            mean,
            median: sorted[count / 2],
            min: sorted[0],
            max: sorted[count - 1],
            std_dev: variance.sqrt(),
            percentiles: Percentiles {
                p10: percentile(&sorted, 0.10),
                p25: percentile(&sorted, 0.25),
                p75: percentile(&sorted, 0.75),
                p90: percentile(&sorted, 0.90),
            },
        })
    }

    /// Coefficient of variation; zero when the mean is zero.
    #[must_use]
    pub fn coefficient_of_variation(&self) -> f64 {
        if self.mean.abs() < f64::EPSILON {
            0.0
        } else {
            self.std_dev / self.mean.abs()
        }
    }

    #[must_use]
    pub fn confidence_interval(&self, z: f64) -> ConfidenceInterval {
        let margin = z * self.std_dev / count_f64(self.count).sqrt();
        ConfidenceInterval {
            lower: self.mean - margin,
            upper: self.mean + margin,
            margin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    pub margin: f64,
}

/// Nearest-rank percentile at `sorted[floor(n * p)]`, clamped to the last element.
#[must_use]
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = (count_f64(sorted.len()) * p).floor();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let index = (rank.max(0.0) as usize).min(sorted.len() - 1);
    sorted[index]
}

/// Two-sided z-score for a confidence level in (0, 1).
#[must_use]
pub fn z_for_confidence(level: f64) -> f64 {
    inverse_normal_cdf(0.5 + level / 2.0)
}

/// Acklam's rational approximation of the standard normal quantile,
/// accurate to about 1.15e-9 over (0, 1).
#[must_use]
pub fn inverse_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.024_25;

    if !(p > 0.0 && p < 1.0) {
        return f64::NAN;
    }
    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -inverse_normal_cdf(1.0 - p)
    }
}

#[allow(clippy::cast_precision_loss)]
pub fn count_f64(count: usize) -> f64 {
    count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution_matches_hand_computation() {
        let dist = Distribution::from_samples(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(dist.count, 4);
        assert!((dist.mean - 2.5).abs() < 1e-12);
        // sorted[n/2] is the upper median for even samples.
        assert!((dist.median - 3.0).abs() < 1e-12);
        assert!((dist.min - 1.0).abs() < 1e-12);
        assert!((dist.max - 4.0).abs() < 1e-12);
        assert!((dist.std_dev - 1.25_f64.sqrt()).abs() < 1e-12);
        assert!((dist.percentiles.p10 - 1.0).abs() < 1e-12);
        assert!((dist.percentiles.p25 - 2.0).abs() < 1e-12);
        assert!((dist.percentiles.p75 - 4.0).abs() < 1e-12);
        assert!((dist.percentiles.p90 - 4.0).abs() < 1e-12);
    }

    #[test]
    fn empty_and_non_finite_samples() {
        assert!(Distribution::from_samples(&[]).is_none());
        assert!(Distribution::from_samples(&[f64::NAN]).is_none());
        let dist = Distribution::from_samples(&[f64::INFINITY, 2.0]).unwrap();
        assert_eq!(dist.count, 1);
    }

    #[test]
    fn confidence_interval_uses_standard_error() {
        let dist = Distribution::from_samples(&[10.0, 12.0, 14.0, 16.0]).unwrap();
        let ci = dist.confidence_interval(Z_95);
        let expected = 1.96 * 5.0_f64.sqrt() / 2.0;
        assert!((ci.margin - expected).abs() < 1e-12);
        assert!((ci.lower - (13.0 - expected)).abs() < 1e-12);
        assert!((ci.upper - (13.0 + expected)).abs() < 1e-12);
    }

    #[test]
    fn single_sample_has_zero_spread() {
        let dist = Distribution::from_samples(&[7.0]).unwrap();
        assert!(dist.std_dev.abs() < f64::EPSILON);
        assert!(dist.coefficient_of_variation().abs() < f64::EPSILON);
        assert!((percentile(&[7.0], 0.9) - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn known_confidence_levels() {
        assert!((z_for_confidence(0.95) - 1.959_964).abs() < 1e-5);
        assert!((z_for_confidence(0.90) - 1.644_854).abs() < 1e-5);
        assert!((z_for_confidence(0.99) - 2.575_829).abs() < 1e-5);
    }

    #[test]
    fn untabulated_levels_get_their_own_z() {
        assert!((z_for_confidence(0.80) - 1.281_552).abs() < 1e-5);
        assert!((z_for_confidence(0.5) - 0.674_490).abs() < 1e-5);
        assert!((z_for_confidence(0.999) - 3.290_527).abs() < 1e-5);
        assert!(z_for_confidence(0.80) < z_for_confidence(0.95));
    }

    #[test]
    fn inverse_cdf_is_symmetric() {
        assert!(inverse_normal_cdf(0.5).abs() < 1e-9);
        assert!((inverse_normal_cdf(0.01) + inverse_normal_cdf(0.99)).abs() < 1e-9);
        assert!(inverse_normal_cdf(0.0).is_nan());
        assert!(inverse_normal_cdf(1.0).is_nan());
    }
}
