//! Canonical pairwise significance decisions, built from comparison records, p-values, or a
//! square matrix of pairwise statistics.

use crate::Error;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;

/// One pairwise significance decision: whether "no difference between `group1` and `group2`" was
/// rejected.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Comparison<G> {
    /// One side of the pair.
    pub group1: G,
    /// The other side of the pair.
    pub group2: G,
    /// `true` if the two groups are significantly different.
    pub reject: bool,
}

/// A compared pair, by row index into [`Comparisons::groups`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Pair {
    pub first: usize,
    pub second: usize,
    pub reject: bool,
}

/// A set of unordered, non-conflicting pairwise decisions over a universe of groups.
///
/// Groups are numbered in the order they are first mentioned; that numbering is the row order
/// used by [`LetterMatrix`][crate::LetterMatrix].
#[derive(Clone, Debug)]
pub struct Comparisons<G> {
    groups: Vec<G>,
    index: HashMap<G, usize>,
    pairs: Vec<Pair>,
    seen: HashMap<(usize, usize), bool>,
}

impl<G: Clone + Eq + Hash> Default for Comparisons<G> {
    fn default() -> Self {
        Comparisons::new()
    }
}

impl<G: Clone + Eq + Hash> Comparisons<G> {
    /// Creates an empty comparison set.
    pub fn new() -> Self {
        Comparisons {
            groups: Vec::new(),
            index: HashMap::new(),
            pairs: Vec::new(),
            seen: HashMap::new(),
        }
    }

    fn intern(&mut self, group: G) -> usize {
        match self.index.entry(group) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let row = self.groups.len();
                self.groups.push(entry.key().clone());
                entry.insert(row);
                row
            }
        }
    }

    /// Records the decision for one pair of groups.
    ///
    /// Adding the same pair again, in either direction, is accepted if the decision agrees and
    /// ignored. A conflicting decision, or comparing a group with itself, is
    /// [`Error::MalformedInput`].
    ///
    /// ```
    /// use piepho::{Comparisons, Error};
    ///
    /// let mut comparisons = Comparisons::new();
    /// comparisons.add("x", "y", true)?.add("y", "x", true)?;
    /// assert_eq!(comparisons.len(), 1);
    ///
    /// assert!(matches!(comparisons.add("y", "x", false), Err(Error::MalformedInput(_))));
    /// assert!(matches!(comparisons.add("z", "z", false), Err(Error::MalformedInput(_))));
    /// # Ok::<(), Error>(())
    /// ```
    pub fn add(&mut self, group1: G, group2: G, reject: bool) -> Result<&mut Self, Error> {
        if group1 == group2 {
            return Err(Error::MalformedInput(
                "a group is compared with itself".into(),
            ));
        }

        let first = self.intern(group1);
        let second = self.intern(group2);
        let key = (first.min(second), first.max(second));
        match self.seen.entry(key) {
            Entry::Occupied(entry) => {
                if *entry.get() != reject {
                    return Err(Error::MalformedInput(format!(
                        "groups {} and {} have conflicting decisions",
                        key.0, key.1
                    )));
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(reject);
                self.pairs.push(Pair {
                    first,
                    second,
                    reject,
                });
            }
        }
        Ok(self)
    }

    /// Builds a comparison set from comparison records.
    pub fn from_records<I>(records: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = Comparison<G>>,
    {
        let mut comparisons = Comparisons::new();
        for record in records {
            comparisons.add(record.group1, record.group2, record.reject)?;
        }
        Ok(comparisons)
    }

    /// Builds a comparison set from `(group1, group2, p)` triples, rejecting when `p <= alpha`.
    ///
    /// ```
    /// use piepho::Comparisons;
    ///
    /// let comparisons = Comparisons::from_p_values(
    ///     vec![("a", "b", 0.2), ("a", "c", 0.05), ("b", "c", 0.001)],
    ///     0.05,
    /// )?;
    /// let rejected: Vec<_> = comparisons.iter().map(|c| c.reject).collect();
    /// assert_eq!(rejected, vec![false, true, true]);
    /// # Ok::<(), piepho::Error>(())
    /// ```
    pub fn from_p_values<I>(results: I, alpha: f64) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (G, G, f64)>,
    {
        let mut comparisons = Comparisons::new();
        for (group1, group2, p) in results {
            if p.is_nan() {
                return Err(Error::MalformedInput("p-value is not a number".into()));
            }
            comparisons.add(group1, group2, p <= alpha)?;
        }
        Ok(comparisons)
    }

    /// Builds a comparison set from a square matrix of pairwise values (such as p-values) whose
    /// rows and columns are both labelled by `groups`.
    ///
    /// The diagonal is ignored. Each unordered pair is read from both `values[i][j]` and
    /// `values[j][i]`; NaN marks a missing cell, and if both cells are present they must lead to
    /// the same decision. A pair is rejected when its value is at most `threshold`.
    ///
    /// Every label becomes part of the group universe, even if all of its cells are missing.
    ///
    /// ```
    /// use piepho::Comparisons;
    ///
    /// let nan = f64::NAN;
    /// let comparisons = Comparisons::from_matrix(
    ///     &["a", "b", "c"],
    ///     &[
    ///         vec![1.0, 0.3, 0.01],
    ///         vec![0.3, 1.0, nan],
    ///         vec![0.01, 0.02, 1.0],
    ///     ],
    ///     0.05,
    /// )?;
    /// assert_eq!(comparisons.len(), 3);
    /// assert!(comparisons.require_complete().is_ok());
    /// # Ok::<(), piepho::Error>(())
    /// ```
    pub fn from_matrix<R: AsRef<[f64]>>(
        groups: &[G],
        values: &[R],
        threshold: f64,
    ) -> Result<Self, Error> {
        if values.len() != groups.len() {
            return Err(Error::MalformedInput(format!(
                "{} labels for a matrix with {} rows",
                groups.len(),
                values.len()
            )));
        }
        if let Some(row) = values.iter().position(|row| row.as_ref().len() != groups.len()) {
            return Err(Error::MalformedInput(format!(
                "matrix row {} has {} columns, expected {}",
                row,
                values[row].as_ref().len(),
                groups.len()
            )));
        }

        let mut comparisons = Comparisons::new();
        for group in groups {
            let before = comparisons.groups.len();
            if comparisons.intern(group.clone()) != before {
                return Err(Error::MalformedInput(format!(
                    "matrix label {} is duplicated",
                    before
                )));
            }
        }

        for i in 0..groups.len() {
            for j in i + 1..groups.len() {
                let upper = values[i].as_ref()[j];
                let lower = values[j].as_ref()[i];
                let reject = match (upper.is_nan(), lower.is_nan()) {
                    (true, true) => continue,
                    (false, true) => upper <= threshold,
                    (true, false) => lower <= threshold,
                    (false, false) => {
                        let reject = upper <= threshold;
                        if reject != (lower <= threshold) {
                            return Err(Error::MalformedInput(format!(
                                "matrix cells ({0}, {1}) and ({1}, {0}) disagree",
                                i, j
                            )));
                        }
                        reject
                    }
                };
                comparisons.add(groups[i].clone(), groups[j].clone(), reject)?;
            }
        }
        Ok(comparisons)
    }

    /// Checks that every pair of groups has been compared.
    ///
    /// ```
    /// use piepho::{Comparisons, Error};
    ///
    /// let mut comparisons = Comparisons::new();
    /// comparisons.add(1, 2, true)?.add(2, 3, false)?;
    /// assert!(matches!(comparisons.require_complete(), Err(Error::MalformedInput(_))));
    ///
    /// comparisons.add(3, 1, true)?;
    /// assert!(comparisons.require_complete().is_ok());
    /// # Ok::<(), Error>(())
    /// ```
    pub fn require_complete(&self) -> Result<(), Error> {
        match self.missing_pair() {
            None => Ok(()),
            Some((a, b)) => Err(Error::MalformedInput(format!(
                "groups {} and {} were never compared",
                a, b
            ))),
        }
    }

    /// The row indices of the first pair of groups that has not been compared, if any.
    pub fn missing_pair(&self) -> Option<(usize, usize)> {
        let n = self.groups.len();
        if self.pairs.len() == n * n.saturating_sub(1) / 2 {
            return None;
        }
        (0..n)
            .flat_map(|a| (a + 1..n).map(move |b| (a, b)))
            .find(|key| !self.seen.contains_key(key))
    }

    /// The group universe, in row order.
    pub fn groups(&self) -> &[G] {
        &self.groups
    }

    /// The row index of `group`, if it has been mentioned.
    pub fn index_of(&self, group: &G) -> Option<usize> {
        self.index.get(group).copied()
    }

    /// Number of distinct compared pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` if no pair has been compared.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterates over the decisions in the order their pairs were first added.
    pub fn iter(&self) -> impl Iterator<Item = Comparison<&G>> + '_ {
        self.pairs.iter().map(move |pair| Comparison {
            group1: &self.groups[pair.first],
            group2: &self.groups[pair.second],
            reject: pair.reject,
        })
    }

    pub(crate) fn pairs(&self) -> &[Pair] {
        &self.pairs
    }
}
