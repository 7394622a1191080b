//! The "sweep" stage: randomized removal of redundant letters, repeated over several independent
//! trials.

use crate::comparisons::Comparisons;
use crate::matrix::{Fitness, LetterMatrix};
use crate::{Error, LetterConfig};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::hash::Hash;
use std::time::Instant;
use tracing::{debug, trace};

/// The pairs each group must keep sharing a class with.
///
/// Removing a letter can't make two groups share a class, so rejected pairs never need to be
/// re-checked during a sweep. Only the non-rejected partners of the affected group matter.
#[derive(Clone, Debug)]
pub struct Constraints {
    partners: Vec<Vec<usize>>,
}

impl Constraints {
    /// Collects the non-rejected partners of every group in `comparisons`.
    pub fn new<G: Clone + Eq + Hash>(comparisons: &Comparisons<G>) -> Self {
        let mut partners = vec![Vec::new(); comparisons.groups().len()];
        for pair in comparisons.pairs().iter().filter(|pair| !pair.reject) {
            partners[pair.first].push(pair.second);
            partners[pair.second].push(pair.first);
        }
        Constraints { partners }
    }

    /// Given a valid `matrix` from which cell `(row, class)` has just been cleared, returns
    /// `true` if the matrix is still valid.
    fn allows_clear(&self, matrix: &LetterMatrix, row: usize, class: usize) -> bool {
        if matrix.classes_of(row).next().is_none() {
            return false;
        }
        // Partners outside the cleared class were never relying on it.
        self.partners[row]
            .iter()
            .filter(|&&partner| matrix.contains(partner, class))
            .all(|&partner| matrix.share_class(row, partner))
    }
}

/// Runs one sweep over `baseline`: every letter is visited once in a random order and removed if
/// the matrix stays a valid representation without it. Classes left empty are dropped.
///
/// ```
/// use piepho::{sweep, Comparisons, LetterMatrix};
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
///
/// let mut comparisons = Comparisons::new();
/// comparisons.add("a", "b", false)?.add("a", "c", true)?.add("b", "c", false)?;
///
/// let mut baseline = LetterMatrix::insert(&comparisons);
/// baseline.absorb();
///
/// let constraints = sweep::Constraints::new(&comparisons);
/// let swept = sweep::sweep_once(&baseline, &constraints, &mut StdRng::seed_from_u64(7));
/// assert!(swept.is_valid(&comparisons));
/// assert!(swept.fitness().total <= baseline.fitness().total);
/// # Ok::<(), piepho::Error>(())
/// ```
pub fn sweep_once<R: Rng + ?Sized>(
    baseline: &LetterMatrix,
    constraints: &Constraints,
    rng: &mut R,
) -> LetterMatrix {
    let mut matrix = baseline.clone();
    let mut cells: Vec<(usize, usize)> = matrix.cells().collect();
    cells.shuffle(rng);

    for (row, class) in cells {
        matrix.clear(row, class);
        if !constraints.allows_clear(&matrix, row, class) {
            matrix.set(row, class);
        }
    }

    matrix.drop_empty_classes();
    matrix
}

/// The outcome of a Monte Carlo search.
#[derive(Clone, Debug)]
pub struct Trial {
    /// The best letter table found.
    pub matrix: LetterMatrix,
    /// Its size measures.
    pub fitness: Fitness,
    /// Which trial, counting from zero, produced it.
    pub index: usize,
    /// How many trials actually ran.
    pub completed: usize,
}

/// Runs up to `config.monte_carlo_cycles` independent sweeps of `baseline` and keeps the best one
/// according to `config.metric`.
///
/// The first trial is always kept; each later trial replaces the best so far only if it
/// [improves on][Fitness::improves_on] it. Trials are compared in the order they were seeded, so
/// a fixed `config.seed` gives the same answer whether or not `config.parallel` is set.
///
/// Trials only run concurrently when the crate is built with the `parallel` feature; otherwise
/// `config.parallel` is ignored.
///
/// If `config.time_limit` runs out, trials which haven't started yet are skipped, but at least
/// one trial always runs.
pub fn monte_carlo<G: Clone + Eq + Hash>(
    baseline: &LetterMatrix,
    comparisons: &Comparisons<G>,
    config: &LetterConfig,
) -> Result<Trial, Error> {
    if config.monte_carlo_cycles == 0 {
        return Err(Error::MalformedInput(
            "at least one Monte Carlo cycle is required".into(),
        ));
    }

    let constraints = Constraints::new(comparisons);
    let mut master = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let seeds: Vec<u64> = (0..config.monte_carlo_cycles)
        .map(|_| master.gen())
        .collect();

    let started = Instant::now();
    let out_of_time = |index: usize| {
        index > 0
            && config
                .time_limit
                .map_or(false, |limit| started.elapsed() >= limit)
    };
    let run = |index: usize, seed: u64| {
        if out_of_time(index) {
            return None;
        }
        let matrix = sweep_once(baseline, &constraints, &mut StdRng::seed_from_u64(seed));
        let fitness = matrix.fitness();
        trace!(trial = index, ?fitness, "sweep finished");
        Some((matrix, fitness))
    };

    #[cfg(feature = "parallel")]
    let trials = if config.parallel {
        use rayon::prelude::*;
        seeds
            .par_iter()
            .enumerate()
            .map(|(index, &seed)| run(index, seed))
            .collect()
    } else {
        run_in_order(&seeds, run)
    };
    #[cfg(not(feature = "parallel"))]
    let trials = run_in_order(&seeds, run);

    let mut best: Option<Trial> = None;
    let mut completed = 0;
    for (index, (matrix, fitness)) in trials
        .into_iter()
        .enumerate()
        .filter_map(|(index, trial)| Some((index, trial?)))
    {
        completed += 1;
        if !matrix.is_valid(comparisons) {
            return Err(Error::InfeasibleRepresentation(format!(
                "sweep trial {} produced an invalid letter table",
                index
            )));
        }
        let better = match &best {
            None => true,
            Some(current) => fitness.improves_on(&current.fitness, config.metric),
        };
        if better {
            best = Some(Trial {
                matrix,
                fitness,
                index,
                completed: 0,
            });
        }
    }

    let mut best = best.ok_or_else(|| {
        Error::InfeasibleRepresentation("no Monte Carlo trial completed".into())
    })?;
    best.completed = completed;
    debug!(
        trial = best.index,
        completed,
        classes = best.fitness.classes,
        max_per_group = best.fitness.max_per_group,
        total = best.fitness.total,
        "sweep stage"
    );
    Ok(best)
}

/// Runs trials one after another, stopping at the first one that was skipped.
fn run_in_order<F>(seeds: &[u64], run: F) -> Vec<Option<(LetterMatrix, Fitness)>>
where
    F: Fn(usize, u64) -> Option<(LetterMatrix, Fitness)>,
{
    let mut trials = Vec::with_capacity(seeds.len());
    for (index, &seed) in seeds.iter().enumerate() {
        let trial = run(index, seed);
        let stop = trial.is_none();
        trials.push(trial);
        if stop {
            break;
        }
    }
    trials
}
