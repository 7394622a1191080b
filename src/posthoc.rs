//! All-pairwise post-hoc tests which produce the significance decisions that letters summarize.
//!
//! Two tests are provided:
//!
//! - Tukey's honestly significant difference, for roughly normal data with similar variances.
//!   P-values come from the studentized range distribution, integrated numerically following
//!   Copenhaver & Holland, [Computation of the distribution of the maximum studentized range
//!   statistic with application to multiple significance testing of simple effects][ch88], 1988.
//! - Dunn's rank-based test, with a correction for ties and Holm's step-down adjustment for
//!   multiple comparisons.
//!
//! [ch88]: https://doi.org/10.1080/00949658808811082

use crate::comparisons::Comparisons;
use crate::Error;
use statrs::function::erf::erfc;
use statrs::function::gamma::ln_gamma;
use std::collections::HashMap;
use std::f64::consts::{LN_2, SQRT_2};
use std::hash::Hash;
use std::str::FromStr;

/// Which post-hoc test to run.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PostHoc {
    /// Tukey's honestly significant difference test.
    #[default]
    Tukey,
    /// Dunn's test with Holm-adjusted p-values.
    Dunn,
}

impl FromStr for PostHoc {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tukey" => Ok(PostHoc::Tukey),
            "dunn" => Ok(PostHoc::Dunn),
            _ => Err(Error::MalformedInput(format!("unknown post-hoc test {:?}", s))),
        }
    }
}

/// Observations collected per group.
///
/// Groups are kept in the order they were first seen.
#[derive(Clone, Debug)]
pub struct Samples<G> {
    groups: Vec<G>,
    index: HashMap<G, usize>,
    values: Vec<Vec<f64>>,
}

impl<G: Clone + Eq + Hash> Default for Samples<G> {
    fn default() -> Self {
        Samples::new()
    }
}

impl<G: Clone + Eq + Hash> Samples<G> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Samples {
            groups: Vec::new(),
            index: HashMap::new(),
            values: Vec::new(),
        }
    }

    /// Records one observation for `group`. Values must be finite.
    pub fn add(&mut self, group: G, value: f64) -> Result<&mut Self, Error> {
        if !value.is_finite() {
            return Err(Error::MalformedInput(format!(
                "observation {} is not finite",
                value
            )));
        }
        let row = match self.index.get(&group) {
            Some(&row) => row,
            None => {
                let row = self.groups.len();
                self.index.insert(group.clone(), row);
                self.groups.push(group);
                self.values.push(Vec::new());
                row
            }
        };
        self.values[row].push(value);
        Ok(self)
    }

    /// Every group, in the order first seen.
    pub fn groups(&self) -> &[G] {
        &self.groups
    }

    /// The observations recorded for `group`.
    pub fn values(&self, group: &G) -> Option<&[f64]> {
        self.index.get(group).map(|&row| &*self.values[row])
    }

    /// Total number of observations.
    pub fn len(&self) -> usize {
        self.values.iter().map(Vec::len).sum()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// The median of `group`'s observations.
    ///
    /// ```
    /// use piepho::Samples;
    ///
    /// let mut samples = Samples::new();
    /// samples.add("a", 3.0)?.add("a", 1.0)?.add("a", 2.0)?;
    /// samples.add("b", 4.0)?.add("b", 1.0)?;
    /// assert_eq!(samples.median(&"a"), Some(2.0));
    /// assert_eq!(samples.median(&"b"), Some(2.5));
    /// assert_eq!(samples.median(&"c"), None);
    /// # Ok::<(), piepho::Error>(())
    /// ```
    pub fn median(&self, group: &G) -> Option<f64> {
        let mut sorted = self.values(group)?.to_vec();
        sorted.sort_unstable_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.is_empty() {
            None
        } else if sorted.len() % 2 == 1 {
            Some(sorted[mid])
        } else {
            Some((sorted[mid - 1] + sorted[mid]) * 0.5)
        }
    }

    /// The median of every group, for ordering letters by group location.
    pub fn medians(&self) -> HashMap<G, f64> {
        self.groups
            .iter()
            .filter_map(|group| Some((group.clone(), self.median(group)?)))
            .collect()
    }
}

/// One pairwise test outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct PairwiseResult<G> {
    /// One side of the pair.
    pub group1: G,
    /// The other side of the pair.
    pub group2: G,
    /// The test statistic: the studentized range for Tukey, the absolute z score for Dunn.
    pub statistic: f64,
    /// The (adjusted, for Dunn) p-value.
    pub p_value: f64,
}

impl PostHoc {
    /// Runs this test on every pair of groups in `samples`, in group order.
    ///
    /// Fails with [`Error::MalformedInput`] if there are fewer than two groups, or for Tukey's
    /// test, fewer than two residual degrees of freedom.
    pub fn pairwise<G: Clone + Eq + Hash>(
        &self,
        samples: &Samples<G>,
    ) -> Result<Vec<PairwiseResult<G>>, Error> {
        if samples.groups.len() < 2 {
            return Err(Error::MalformedInput(
                "post-hoc tests need at least two groups".into(),
            ));
        }
        let stats = match self {
            PostHoc::Tukey => tukey(&samples.values)?,
            PostHoc::Dunn => dunn(&samples.values),
        };
        Ok(stats
            .into_iter()
            .map(|(a, b, statistic, p_value)| PairwiseResult {
                group1: samples.groups[a].clone(),
                group2: samples.groups[b].clone(),
                statistic,
                p_value,
            })
            .collect())
    }

    /// Runs this test and turns the p-values into decisions, rejecting when `p <= alpha`.
    ///
    /// ```
    /// use piepho::{PostHoc, Samples};
    ///
    /// let mut samples = Samples::new();
    /// for (group, offset) in [("low", 0.0), ("same", 0.1), ("high", 10.0)] {
    ///     for x in [1.0, 2.0, 3.0, 4.0, 5.0] {
    ///         samples.add(group, x + offset)?;
    ///     }
    /// }
    ///
    /// let comparisons = PostHoc::Tukey.compare(&samples, 0.05)?;
    /// let rejected: Vec<_> = comparisons.iter().map(|c| c.reject).collect();
    /// assert_eq!(rejected, vec![false, true, true]);
    /// # Ok::<(), piepho::Error>(())
    /// ```
    pub fn compare<G: Clone + Eq + Hash>(
        &self,
        samples: &Samples<G>,
        alpha: f64,
    ) -> Result<Comparisons<G>, Error> {
        let results = self.pairwise(samples)?;
        Comparisons::from_p_values(
            results
                .into_iter()
                .map(|result| (result.group1, result.group2, result.p_value)),
            alpha,
        )
    }
}

type RawResult = (usize, usize, f64, f64);

fn pairs(groups: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..groups).flat_map(move |a| (a + 1..groups).map(move |b| (a, b)))
}

fn tukey(values: &[Vec<f64>]) -> Result<Vec<RawResult>, Error> {
    let observations: usize = values.iter().map(Vec::len).sum();
    if values.iter().any(Vec::is_empty) {
        return Err(Error::MalformedInput("a group has no observations".into()));
    }
    let df = observations.saturating_sub(values.len());
    if df < 2 {
        return Err(Error::MalformedInput(format!(
            "Tukey's test needs at least two residual degrees of freedom, got {}",
            df
        )));
    }

    let means: Vec<f64> = values
        .iter()
        .map(|group| group.iter().sum::<f64>() / group.len() as f64)
        .collect();
    let sse: f64 = values
        .iter()
        .zip(&means)
        .map(|(group, mean)| group.iter().map(|x| (x - mean).powi(2)).sum::<f64>())
        .sum();
    let mse = sse / df as f64;

    Ok(pairs(values.len())
        .map(|(a, b)| {
            let diff = (means[a] - means[b]).abs();
            let se = (mse * 0.5 * (1.0 / values[a].len() as f64 + 1.0 / values[b].len() as f64))
                .sqrt();
            let q = if se > 0.0 {
                diff / se
            } else if diff > 0.0 {
                f64::INFINITY
            } else {
                0.0
            };
            let p = 1.0 - studentized_range_cdf(q, values.len(), df as f64);
            (a, b, q, p.max(0.0))
        })
        .collect())
}

fn dunn(values: &[Vec<f64>]) -> Vec<RawResult> {
    let mut all: Vec<(f64, usize)> = values
        .iter()
        .enumerate()
        .flat_map(|(group, xs)| xs.iter().map(move |&x| (x, group)))
        .collect();
    all.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

    // Average ranks across ties, and accumulate the tie correction term as we go.
    let n = all.len() as f64;
    let mut rank_sums = vec![0.0; values.len()];
    let mut ties = 0.0;
    let mut start = 0;
    while start < all.len() {
        let end = start + all[start..].iter().take_while(|(x, _)| *x == all[start].0).count();
        let tied = (end - start) as f64;
        let rank = (start + end + 1) as f64 * 0.5;
        for &(_, group) in &all[start..end] {
            rank_sums[group] += rank;
        }
        ties += tied.powi(3) - tied;
        start = end;
    }

    let variance = n * (n + 1.0) / 12.0
        - if n > 1.0 {
            ties / (12.0 * (n - 1.0))
        } else {
            0.0
        };
    let mean_ranks: Vec<f64> = rank_sums
        .iter()
        .zip(values)
        .map(|(sum, xs)| sum / xs.len() as f64)
        .collect();

    let raw: Vec<RawResult> = pairs(values.len())
        .map(|(a, b)| {
            let se = (variance * (1.0 / values[a].len() as f64 + 1.0 / values[b].len() as f64))
                .sqrt();
            let diff = (mean_ranks[a] - mean_ranks[b]).abs();
            let z = if se > 0.0 && diff.is_finite() {
                diff / se
            } else {
                0.0
            };
            (a, b, z, 2.0 * standard_normal_cdf(-z))
        })
        .collect();

    let adjusted = holm(&raw.iter().map(|r| r.3).collect::<Vec<_>>());
    raw.into_iter()
        .zip(adjusted)
        .map(|((a, b, z, _), p)| (a, b, z, p))
        .collect()
}

/// Holm's step-down adjustment of a family of p-values.
///
/// ```
/// let adjusted = piepho::posthoc::holm(&[0.01, 0.04, 0.03]);
/// assert_eq!(adjusted, vec![0.03, 0.06, 0.06]);
/// ```
pub fn holm(p_values: &[f64]) -> Vec<f64> {
    let m = p_values.len();
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let mut adjusted = vec![0.0; m];
    let mut running: f64 = 0.0;
    for (rank, &idx) in order.iter().enumerate() {
        running = running.max(((m - rank) as f64 * p_values[idx]).min(1.0));
        adjusted[idx] = running;
    }
    adjusted
}

fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

// Gauss-Legendre nodes and weights on [-1, 1], positive half only.
const LEGENDRE_12_NODES: [f64; 6] = [
    0.981560634246719250690549090149,
    0.904117256370474856678465866119,
    0.769902674194304687036893833213,
    0.587317954286617447296702418941,
    0.367831498998180193752691536644,
    0.125233408511468915472441369464,
];
const LEGENDRE_12_WEIGHTS: [f64; 6] = [
    0.047175336386511827194615961485,
    0.106939325995318430960254718194,
    0.160078328543346226334652529543,
    0.203167426723065921749064455810,
    0.233492536538354808760849898925,
    0.249147045813402785000562436043,
];
const LEGENDRE_16_NODES: [f64; 8] = [
    0.989400934991649932596154173450,
    0.944575023073232576077988415535,
    0.865631202387831743880467897712,
    0.755404408355003033895101194847,
    0.617876244402643748446671764049,
    0.458016777657227386342419442984,
    0.281603550779258913230460501460,
    0.950125098376374401853193354250e-1,
];
const LEGENDRE_16_WEIGHTS: [f64; 8] = [
    0.271524594117540948517805724560e-1,
    0.622535239386478928628438369944e-1,
    0.951585116824927848099251076022e-1,
    0.124628971255533872052476282192,
    0.149595988816576732081501730547,
    0.169156519395002538189312079030,
    0.182603415044923588866763667969,
    0.189450610455068496285396723208,
];

/// Probability that the range of `groups` standard normal variables is below `w`.
fn range_cdf(w: f64, groups: f64) -> f64 {
    let half = w * 0.5;
    // Beyond this the integral is 1 to within 1e-14.
    if half >= 8.0 {
        return 1.0;
    }

    // First term of Hartley's form: (2 * Phi(w / 2) - 1) ^ groups.
    let mut pr = 2.0 * standard_normal_cdf(half) - 1.0;
    pr = if pr >= (-50.0 / groups).exp() {
        pr.powf(groups)
    } else {
        0.0
    };

    // Second term, integrated over (w / 2, 8) in two or three equal intervals.
    let intervals = if w > 3.0 { 2 } else { 3 };
    let width = (8.0 - half) / intervals as f64;
    let mut lower = half;
    let mut total = 0.0;
    for _ in 0..intervals {
        let upper = lower + width;
        let mid = 0.5 * (upper + lower);
        let radius = 0.5 * (upper - lower);

        let mut sum = 0.0;
        let nodes = LEGENDRE_12_NODES
            .iter()
            .zip(&LEGENDRE_12_WEIGHTS)
            .map(|(&x, &weight)| (-x, weight))
            .chain(
                LEGENDRE_12_NODES
                    .iter()
                    .zip(&LEGENDRE_12_WEIGHTS)
                    .rev()
                    .map(|(&x, &weight)| (x, weight)),
            );
        for (x, weight) in nodes {
            let at = mid + radius * x;
            let exponent = at * at;
            // Nodes are in increasing order, so everything past here is negligible too.
            if exponent > 60.0 {
                break;
            }
            let inner = standard_normal_cdf(at) - standard_normal_cdf(at - w);
            if inner >= (-30.0 / (groups - 1.0)).exp() {
                sum += weight * (-0.5 * exponent).exp() * inner.powf(groups - 1.0);
            }
        }
        total += sum * (2.0 * radius * groups) / (2.0 * std::f64::consts::PI).sqrt();
        lower = upper;
    }

    pr += total;
    if pr <= (-30.0f64).exp() {
        return 0.0;
    }
    pr.min(1.0)
}

/// The cumulative distribution function of the studentized range statistic for `groups` means
/// and `df` degrees of freedom.
///
/// With two groups, the studentized range is just `sqrt(2)` times the absolute value of a
/// Student's t statistic:
///
/// ```
/// use piepho::posthoc::studentized_range_cdf;
/// use statrs::distribution::{StudentsT, Univariate};
///
/// let t = StudentsT::new(0.0, 1.0, 10.0).unwrap();
/// let expected = 2.0 * t.cdf(3.0 / 2f64.sqrt()) - 1.0;
/// assert!((studentized_range_cdf(3.0, 2, 10.0) - expected).abs() < 1e-4);
/// ```
pub fn studentized_range_cdf(q: f64, groups: usize, df: f64) -> f64 {
    if q.is_nan() || groups < 2 || df.is_nan() || df < 2.0 {
        return f64::NAN;
    }
    if q <= 0.0 {
        return 0.0;
    }
    if q.is_infinite() {
        return 1.0;
    }
    let groups = groups as f64;
    if df > 25000.0 {
        return range_cdf(q, groups);
    }

    // Integrate the range distribution against the chi distribution of the standard error. The
    // integral is split into intervals whose width shrinks as the chi density sharpens.
    let f2 = df * 0.5;
    let f21 = f2 - 1.0;
    let ff4 = df * 0.25;
    let width = if df <= 100.0 {
        1.0
    } else if df <= 800.0 {
        0.5
    } else if df <= 5000.0 {
        0.25
    } else {
        0.125
    };
    let leading = f2 * df.ln() - df * LN_2 - ln_gamma(f2) + f64::ln(width);

    let mut total = 0.0;
    for interval in 1..=50 {
        let center = (2 * interval - 1) as f64 * width;
        let mut sum = 0.0;
        let nodes = LEGENDRE_16_NODES
            .iter()
            .zip(&LEGENDRE_16_WEIGHTS)
            .map(|(&x, &weight)| (-x, weight))
            .chain(
                LEGENDRE_16_NODES
                    .iter()
                    .zip(&LEGENDRE_16_WEIGHTS)
                    .map(|(&x, &weight)| (x, weight)),
            );
        for (x, weight) in nodes {
            let at = center + x * width;
            let log_density = leading + f21 * at.ln() - at * ff4;
            if log_density >= -30.0 {
                let scaled = q * (at * 0.5).sqrt();
                sum += range_cdf(scaled, groups) * weight * log_density.exp();
            }
        }

        // At least the first unit of the integral is always covered, so a tiny left tail
        // can't stop it early.
        if interval as f64 * width >= 1.0 && sum <= 1e-14 {
            break;
        }
        total += sum;
    }
    total.min(1.0)
}
