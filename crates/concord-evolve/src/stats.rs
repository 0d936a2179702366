//! Statistics for the acceptance gates.
//!
//! Shadow-trial scores are heavy-tailed and low-sample, so acceptance uses a
//! variance-aware lower confidence bound plus a non-parametric two-sample
//! test. A plain mean comparison admits regressions under heavy tails; a
//! t-test's normality assumption fails at these sample sizes.

/// Arithmetic mean; zero for empty input.
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population standard deviation; zero for empty input.
pub fn population_stddev(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let m = mean(xs);
    let variance = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64;
    variance.sqrt()
}

/// `mean − λ · stddev`: the pessimistic estimate a variant must clear.
pub fn lower_confidence_bound(xs: &[f64], lambda: f64) -> f64 {
    mean(xs) - lambda * population_stddev(xs)
}

/// Result of a two-sample Mann-Whitney U test.
#[derive(Debug, Clone, Copy)]
pub struct MannWhitneyOutcome {
    /// The smaller of the two U statistics.
    pub u: f64,
    /// Two-sided p-value from the large-sample normal approximation.
    pub p_value: f64,
}

/// Two-sample Mann-Whitney U (rank-sum) test with tie correction.
///
/// Uses the large-sample normal approximation with a 0.5 continuity
/// correction. Degenerate inputs — either sample of size ≤ 1, or all
/// observations tied — yield `p = 1`: no evidence either way.
pub fn mann_whitney_u_test(a: &[f64], b: &[f64]) -> MannWhitneyOutcome {
    let n1 = a.len();
    let n2 = b.len();
    if n1 <= 1 || n2 <= 1 {
        return MannWhitneyOutcome { u: 0.0, p_value: 1.0 };
    }

    // Pool, sort, and assign average ranks to ties.
    let mut pooled: Vec<(f64, usize)> = a
        .iter()
        .map(|&x| (x, 0usize))
        .chain(b.iter().map(|&x| (x, 1usize)))
        .collect();
    pooled.sort_by(|x, y| x.0.total_cmp(&y.0));

    let n = pooled.len();
    let mut ranks = vec![0.0f64; n];
    let mut tie_term = 0.0f64;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && pooled[j + 1].0 == pooled[i].0 {
            j += 1;
        }
        // Positions i..=j share the average rank.
        let avg_rank = (i + j + 2) as f64 / 2.0;
        for rank in ranks.iter_mut().take(j + 1).skip(i) {
            *rank = avg_rank;
        }
        let t = (j - i + 1) as f64;
        tie_term += t.powi(3) - t;
        i = j + 1;
    }

    let r1: f64 = pooled
        .iter()
        .zip(&ranks)
        .filter(|((_, group), _)| *group == 0)
        .map(|(_, rank)| rank)
        .sum();

    let n1f = n1 as f64;
    let n2f = n2 as f64;
    let nf = n as f64;

    let u1 = r1 - n1f * (n1f + 1.0) / 2.0;
    let u2 = n1f * n2f - u1;
    let u = u1.min(u2);

    let mean_u = n1f * n2f / 2.0;
    let variance =
        n1f * n2f / 12.0 * ((nf + 1.0) - tie_term / (nf * (nf - 1.0)));
    if variance <= 0.0 {
        // Every observation tied: the samples are indistinguishable.
        return MannWhitneyOutcome { u, p_value: 1.0 };
    }

    let z = (u - mean_u + 0.5) / variance.sqrt();
    let p_value = (2.0 * normal_cdf(z)).clamp(0.0, 1.0);

    MannWhitneyOutcome { u, p_value }
}

/// Standard normal CDF via the Abramowitz & Stegun erf approximation
/// (formula 7.1.26, max absolute error 1.5e-7).
fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();

    sign * y
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn mean_and_stddev_on_known_values() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&xs) - 5.0).abs() < 1e-12);
        // Textbook population stddev of this sample is exactly 2.
        assert!((population_stddev(&xs) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn lcb_penalizes_variance() {
        let stable = [3.0, 3.0, 3.0, 3.0];
        let volatile = [9.0, -3.0, 9.0, -3.0];
        // Same mean, but the volatile sample's LCB is far lower.
        assert_eq!(mean(&stable), mean(&volatile));
        assert!(
            lower_confidence_bound(&volatile, 1.0) < lower_confidence_bound(&stable, 1.0)
        );
        assert_eq!(lower_confidence_bound(&stable, 1.0), 3.0);
    }

    #[test]
    fn undersized_samples_yield_p_one() {
        assert_eq!(mann_whitney_u_test(&[1.0], &[2.0, 3.0]).p_value, 1.0);
        assert_eq!(mann_whitney_u_test(&[], &[2.0]).p_value, 1.0);
    }

    #[test]
    fn identical_samples_are_indistinguishable() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let outcome = mann_whitney_u_test(&xs, &xs);
        assert!(outcome.p_value > 0.8, "p was {}", outcome.p_value);
    }

    #[test]
    fn fully_tied_samples_yield_p_one() {
        let outcome = mann_whitney_u_test(&[5.0, 5.0, 5.0], &[5.0, 5.0, 5.0]);
        assert_eq!(outcome.p_value, 1.0);
    }

    #[test]
    fn clearly_separated_samples_are_significant() {
        let low: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let high: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let outcome = mann_whitney_u_test(&low, &high);
        assert_eq!(outcome.u, 0.0);
        assert!(outcome.p_value < 0.01, "p was {}", outcome.p_value);
    }

    #[test]
    fn overlapping_samples_are_not_significant() {
        let a = [1.0, 3.0, 5.0, 7.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        let outcome = mann_whitney_u_test(&a, &b);
        assert!(outcome.p_value > 0.3, "p was {}", outcome.p_value);
    }

    #[test]
    fn tie_correction_shrinks_the_variance() {
        // With heavy ties the corrected test must still be well-defined and
        // bounded.
        let a = [1.0, 1.0, 2.0, 2.0, 2.0];
        let b = [2.0, 2.0, 3.0, 3.0, 1.0];
        let outcome = mann_whitney_u_test(&a, &b);
        assert!((0.0..=1.0).contains(&outcome.p_value));
    }
}
