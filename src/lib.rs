#![warn(missing_docs)]
#![doc(test(no_crate_inject))]
#![doc(test(attr(deny(unused, future_incompatible))))]

//! This crate provides an implementation of the letter-based representation of all-pairwise
//! comparisons described by this paper:
//!
//! - Piepho, [An Algorithm for a Letter-Based Representation of All-Pairwise
//!   Comparisons][piepho], 2004
//!
//! [piepho]: https://doi.org/10.1198/1061860043515
//!
//! Given which pairs of groups are significantly different, every group is assigned one or more
//! letters such that two groups share a letter exactly when they are *not* significantly
//! different. These are the letters usually drawn above the boxes of a box plot.
//!
//! The algorithm runs in three stages over a [`LetterMatrix`]: "insert" builds a valid but
//! redundant assignment, "absorb" drops letters whose groups are covered by another letter, and
//! "sweep" removes individual letters in random order as long as the assignment stays valid. The
//! sweep is repeated several times and the most compact result, by a chosen [`Metric`], wins.
//! [`assign_letters`] absorbs during insertion as well, since otherwise the number of letters
//! can double with every significant difference.
//!
//! ```
//! use piepho::{assign_letters, Comparisons, LetterConfig};
//!
//! let mut comparisons = Comparisons::new();
//! comparisons
//!     .add("control", "low dose", false)?
//!     .add("control", "high dose", true)?
//!     .add("low dose", "high dose", false)?;
//!
//! let letters = assign_letters(&comparisons, None, &LetterConfig::default().with_seed(1))?;
//! assert_eq!(letters.share_letter(&"control", &"high dose"), Some(false));
//! assert_eq!(letters.share_letter(&"low dose", &"high dose"), Some(true));
//! assert_eq!(letters.get(&"low dose"), Some("ab"));
//! # Ok::<(), piepho::Error>(())
//! ```
//!
//! Significance decisions can come from anywhere, but the [`posthoc`] module can compute them
//! from raw observations with Tukey's HSD or Dunn's test.

pub mod comparisons;
pub mod letters;
pub mod matrix;
pub mod posthoc;
pub mod sweep;

pub use comparisons::{Comparison, Comparisons};
pub use letters::Letters;
pub use matrix::{Fitness, LetterMatrix, Members, Metric};
pub use posthoc::{PairwiseResult, PostHoc, Samples};

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tracing::debug;

/// The significance threshold used when none is given.
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Everything that can go wrong while assigning letters.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The comparisons or observations are incomplete or inconsistent.
    #[error("malformed input: {0}")]
    MalformedInput(String),
    /// A stage produced a letter table that doesn't represent the comparisons. This is a bug.
    #[error("no valid letter representation: {0}")]
    InfeasibleRepresentation(String),
    /// There are more letters than glyphs to draw them with.
    #[error("{classes} letters are needed but only {available} glyphs are available")]
    TooManyClasses {
        /// Letters needed.
        classes: usize,
        /// Glyphs configured.
        available: usize,
    },
}

/// Options for [`assign_letters`].
#[derive(Clone, Debug)]
pub struct LetterConfig {
    /// Number of independent sweeps to try. Must be at least 1.
    pub monte_carlo_cycles: usize,
    /// Which size measure the best sweep minimizes.
    pub metric: Metric,
    /// Placed between a group's letters.
    pub separator: String,
    /// Glyphs for the letters, handed out in order.
    pub glyphs: Vec<char>,
    /// Seed for the sweep's random order. Unseeded runs draw from the operating system.
    pub seed: Option<u64>,
    /// Stop starting new sweeps after this long. The first sweep always runs.
    pub time_limit: Option<Duration>,
    /// Run sweeps on the rayon thread pool. Needs the `parallel` feature.
    pub parallel: bool,
}

impl Default for LetterConfig {
    fn default() -> Self {
        LetterConfig {
            monte_carlo_cycles: 5,
            metric: Metric::default(),
            separator: String::new(),
            glyphs: letters::default_glyphs(),
            seed: None,
            time_limit: None,
            parallel: false,
        }
    }
}

impl LetterConfig {
    /// Sets the number of sweeps.
    pub fn with_cycles(mut self, cycles: usize) -> Self {
        self.monte_carlo_cycles = cycles;
        self
    }

    /// Sets the measure to minimize.
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Sets the string placed between letters.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Sets the glyphs letters are drawn with.
    pub fn with_glyphs(mut self, glyphs: Vec<char>) -> Self {
        self.glyphs = glyphs;
        self
    }

    /// Makes the sweeps reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Bounds how long new sweeps may be started.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Runs sweeps in parallel.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Assigns letters to every group in `comparisons`.
///
/// If `ordering` is given (say, each group's median), letters are handed out starting from the
/// class whose groups have the highest mean value. It only affects which glyph each class gets.
///
/// ```
/// use piepho::{assign_letters, Comparisons, LetterConfig};
/// use std::collections::HashMap;
///
/// let mut comparisons = Comparisons::new();
/// comparisons.add("A", "B", false)?.add("A", "C", true)?.add("B", "C", true)?;
///
/// let medians: HashMap<_, _> = vec![("A", 1.0), ("B", 1.5), ("C", 8.0)].into_iter().collect();
/// let config = LetterConfig::default().with_seed(3);
/// let letters = assign_letters(&comparisons, Some(&medians), &config)?;
/// assert_eq!(letters.get(&"A"), Some("b"));
/// assert_eq!(letters.get(&"B"), Some("b"));
/// assert_eq!(letters.get(&"C"), Some("a"));
/// # Ok::<(), piepho::Error>(())
/// ```
pub fn assign_letters<G: Clone + Eq + Hash>(
    comparisons: &Comparisons<G>,
    ordering: Option<&HashMap<G, f64>>,
    config: &LetterConfig,
) -> Result<Letters<G>, Error> {
    if config.monte_carlo_cycles == 0 {
        return Err(Error::MalformedInput(
            "at least one Monte Carlo cycle is required".into(),
        ));
    }

    let mut matrix = LetterMatrix::insert_absorbing(comparisons);
    debug!(
        groups = matrix.groups(),
        classes = matrix.class_count(),
        "insert stage"
    );

    let absorbed = matrix.absorb();
    debug!(absorbed, classes = matrix.class_count(), "absorb stage");
    if !matrix.is_valid(comparisons) {
        return Err(Error::InfeasibleRepresentation(
            "insert and absorb produced an invalid letter table".into(),
        ));
    }

    let best = sweep::monte_carlo(&matrix, comparisons, config)?;
    Letters::new(
        &best.matrix,
        comparisons.groups(),
        ordering,
        &config.separator,
        &config.glyphs,
    )
}
