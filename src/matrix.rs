//! The group-by-class membership table which every stage of the letter algorithm works on.

use crate::comparisons::{Comparisons, Pair};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::hash::Hash;
use std::iter;
use std::str::FromStr;

const WORD: usize = u64::BITS as usize;

/// A fixed-width set of row (or class) indices.
///
/// Membership is stored as a bitmap. Sets over 128 or fewer indices don't allocate, which covers
/// every realistic number of groups in a box plot.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Members(SmallVec<[u64; 2]>);

impl Members {
    /// Creates a set able to hold indices below `width`, with none of them present.
    pub fn empty(width: usize) -> Self {
        Members(iter::repeat(0).take((width + WORD - 1) / WORD).collect())
    }

    /// Creates a set holding every index below `width`.
    ///
    /// ```
    /// use piepho::Members;
    ///
    /// let all = Members::full(70);
    /// assert_eq!(all.len(), 70);
    /// assert!(all.contains(69));
    /// assert!(!all.contains(70));
    /// ```
    pub fn full(width: usize) -> Self {
        let mut members = Members::empty(width);
        for (idx, word) in members.0.iter_mut().enumerate() {
            let remaining = width - idx * WORD;
            *word = if remaining >= WORD {
                !0
            } else {
                (1 << remaining) - 1
            };
        }
        members
    }

    /// Returns `true` if `index` is in the set.
    pub fn contains(&self, index: usize) -> bool {
        self.0
            .get(index / WORD)
            .map_or(false, |word| word & (1 << (index % WORD)) != 0)
    }

    /// Adds `index` to the set.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below the width this set was created with.
    pub fn insert(&mut self, index: usize) {
        self.0[index / WORD] |= 1 << (index % WORD);
    }

    /// Removes `index` from the set, if present.
    pub fn remove(&mut self, index: usize) {
        if let Some(word) = self.0.get_mut(index / WORD) {
            *word &= !(1 << (index % WORD));
        }
    }

    /// The number of indices in the set.
    pub fn len(&self) -> usize {
        self.0.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Returns `true` if no index is in the set.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&word| word == 0)
    }

    /// Returns `true` if `other` contains every index that `self` does.
    ///
    /// ```
    /// use piepho::Members;
    ///
    /// let mut a = Members::empty(4);
    /// a.insert(1);
    /// let mut ab = a.clone();
    /// ab.insert(3);
    ///
    /// assert!(a.is_subset(&ab));
    /// assert!(a.is_subset(&a));
    /// assert!(!ab.is_subset(&a));
    /// assert!(Members::empty(4).is_subset(&a));
    /// ```
    pub fn is_subset(&self, other: &Self) -> bool {
        self.0
            .iter()
            .zip(other.0.iter().chain(iter::repeat(&0)))
            .all(|(&mine, &theirs)| mine & !theirs == 0)
    }

    /// Returns an iterator over the indices in this set, in ascending order.
    ///
    /// ```
    /// use piepho::Members;
    ///
    /// let mut set = Members::empty(200);
    /// set.insert(130);
    /// set.insert(2);
    /// set.insert(64);
    /// assert_eq!(set.iter().collect::<Vec<_>>(), vec![2, 64, 130]);
    /// ```
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(idx, &word)| {
            let mut rest = word;
            iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(idx * WORD + bit)
            })
        })
    }
}

impl std::fmt::Debug for Members {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Which [`Fitness`] measure to minimize when picking among Monte Carlo trials.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Metric {
    /// Fewest distinct letters.
    #[default]
    Classes,
    /// Fewest letters on the most-lettered group.
    MaxPerGroup,
    /// Fewest letters summed over all groups.
    Total,
}

impl FromStr for Metric {
    type Err = crate::Error;

    /// Parses `classes-count`, `max-per-row`, or `letter-total`, or the shorter `classes`,
    /// `max-per-group`, and `total`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classes-count" | "classes" => Ok(Metric::Classes),
            "max-per-row" | "max-per-group" => Ok(Metric::MaxPerGroup),
            "letter-total" | "total" => Ok(Metric::Total),
            _ => Err(crate::Error::MalformedInput(format!(
                "unknown optimisation metric {:?}",
                s
            ))),
        }
    }
}

/// Size measures of a letter assignment. Smaller is better for all of them.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub struct Fitness {
    /// Number of classes with at least one member.
    pub classes: usize,
    /// Largest number of classes any single group belongs to.
    pub max_per_group: usize,
    /// Number of group/class memberships overall.
    pub total: usize,
}

impl Fitness {
    /// The value of the chosen measure.
    pub fn get(&self, metric: Metric) -> usize {
        match metric {
            Metric::Classes => self.classes,
            Metric::MaxPerGroup => self.max_per_group,
            Metric::Total => self.total,
        }
    }

    /// All three measures added together, used to break ties on the primary measure.
    pub fn sum(&self) -> usize {
        self.classes + self.max_per_group + self.total
    }

    /// Returns `true` if `self` should replace `best` when optimizing for `metric`.
    ///
    /// A lower primary measure always wins. On a tie, the lower sum of all measures wins, and an
    /// exact tie keeps `best`.
    ///
    /// ```
    /// use piepho::{Fitness, Metric};
    ///
    /// let mut best = Fitness::default();
    /// best.classes = 3;
    /// best.max_per_group = 2;
    /// best.total = 7;
    ///
    /// let mut tied = best;
    /// tied.total = 6;
    /// assert!(tied.improves_on(&best, Metric::Classes));
    /// assert!(!best.improves_on(&best, Metric::Classes));
    ///
    /// let mut fewer_classes = best;
    /// fewer_classes.classes = 2;
    /// fewer_classes.total = 9;
    /// assert!(fewer_classes.improves_on(&best, Metric::Classes));
    /// assert!(!fewer_classes.improves_on(&best, Metric::Total));
    /// ```
    pub fn improves_on(&self, best: &Fitness, metric: Metric) -> bool {
        match self.get(metric).cmp(&best.get(metric)) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => self.sum() < best.sum(),
        }
    }
}

/// A 0/1 table with one row per group and one column per class (letter).
///
/// Rows are addressed by the group's index in its [`Comparisons`]; classes are addressed by
/// their position in [`classes`][LetterMatrix::classes], which is only stable between stages.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LetterMatrix {
    groups: usize,
    classes: Vec<Members>,
}

impl LetterMatrix {
    /// Builds a table directly from class memberships over `groups` rows.
    ///
    /// # Panics
    ///
    /// Panics if any class refers to a row outside `groups`.
    pub fn from_classes(groups: usize, classes: Vec<Members>) -> Self {
        assert!(classes
            .iter()
            .all(|class| class.iter().all(|row| row < groups)));
        let classes = classes
            .into_iter()
            .map(|class| {
                let mut resized = Members::empty(groups);
                for row in class.iter() {
                    resized.insert(row);
                }
                resized
            })
            .collect();
        LetterMatrix { groups, classes }
    }

    /// The "insert" stage: starts from one class holding every group, then splits classes until
    /// no significantly different pair shares one.
    ///
    /// Rejections are processed in the order they were added. Whenever both groups of a
    /// rejected pair are in some class, that class is duplicated; the first group leaves the
    /// original and the second group leaves the copy. The result is a valid representation, but
    /// usually a very redundant one, and the number of classes can double with every rejection.
    /// [`insert_absorbing`][LetterMatrix::insert_absorbing] keeps it in check.
    ///
    /// ```
    /// use piepho::{Comparisons, LetterMatrix};
    ///
    /// let mut comparisons = Comparisons::new();
    /// comparisons.add("A", "B", false)?;
    /// comparisons.add("A", "C", true)?;
    /// comparisons.add("B", "C", true)?;
    ///
    /// let mut matrix = LetterMatrix::insert(&comparisons);
    /// assert!(matrix.is_valid(&comparisons));
    /// assert_eq!(matrix.class_count(), 3);
    /// assert_eq!(matrix.absorb(), 1);
    /// # Ok::<(), piepho::Error>(())
    /// ```
    pub fn insert<G: Clone + Eq + Hash>(comparisons: &Comparisons<G>) -> Self {
        let mut matrix = LetterMatrix::single_class(comparisons.groups().len());
        for pair in comparisons.pairs().iter().filter(|pair| pair.reject) {
            matrix.split(pair);
        }

        debug_assert!(matrix.is_valid(comparisons));
        matrix
    }

    /// Like [`insert`][LetterMatrix::insert], but [absorbs][LetterMatrix::absorb] redundant
    /// classes after every rejection that split anything, so the number of classes stays close
    /// to the number of groups instead of growing exponentially.
    ///
    /// ```
    /// use piepho::{Comparisons, LetterMatrix};
    ///
    /// let mut comparisons = Comparisons::new();
    /// comparisons.add("A", "B", false)?;
    /// comparisons.add("A", "C", true)?;
    /// comparisons.add("B", "C", true)?;
    ///
    /// let mut matrix = LetterMatrix::insert_absorbing(&comparisons);
    /// assert!(matrix.is_valid(&comparisons));
    /// assert_eq!(matrix.class_count(), 2);
    /// assert_eq!(matrix.absorb(), 0);
    /// # Ok::<(), piepho::Error>(())
    /// ```
    pub fn insert_absorbing<G: Clone + Eq + Hash>(comparisons: &Comparisons<G>) -> Self {
        let mut matrix = LetterMatrix::single_class(comparisons.groups().len());
        for pair in comparisons.pairs().iter().filter(|pair| pair.reject) {
            if matrix.split(pair) {
                matrix.absorb();
            }
        }

        debug_assert!(matrix.is_valid(comparisons));
        matrix
    }

    fn single_class(groups: usize) -> Self {
        let mut classes = Vec::new();
        if groups > 0 {
            classes.push(Members::full(groups));
        }
        LetterMatrix { groups, classes }
    }

    /// Splits every class holding both groups of `pair`. Returns whether anything was split.
    fn split(&mut self, pair: &Pair) -> bool {
        // Each half lacks one of the pair, so the new copies never need to be revisited.
        let existing = self.classes.len();
        for class in 0..existing {
            let members = &mut self.classes[class];
            if members.contains(pair.first) && members.contains(pair.second) {
                let mut copy = members.clone();
                members.remove(pair.first);
                copy.remove(pair.second);
                self.classes.push(copy);
            }
        }
        self.classes.len() > existing
    }

    /// The "absorb" stage: removes every class whose members are all in some other class.
    ///
    /// Classes are visited in order and removed as soon as they're found to be redundant, so of
    /// two identical classes only the first is removed. Removing classes can never give a
    /// surviving class a new superset, so a single pass leaves nothing further to absorb.
    ///
    /// Returns the number of classes removed.
    ///
    /// ```
    /// use piepho::{LetterMatrix, Members};
    ///
    /// let mut ab = Members::empty(3);
    /// ab.insert(0);
    /// ab.insert(1);
    /// let mut b = Members::empty(3);
    /// b.insert(1);
    /// let mut c = Members::empty(3);
    /// c.insert(2);
    ///
    /// let mut matrix = LetterMatrix::from_classes(3, vec![b, ab.clone(), c.clone(), ab.clone()]);
    /// assert_eq!(matrix.absorb(), 2);
    /// assert_eq!(matrix.classes(), &[c, ab][..]);
    /// assert_eq!(matrix.absorb(), 0);
    /// ```
    pub fn absorb(&mut self) -> usize {
        let mut live = Members::full(self.classes.len());
        for class in 0..self.classes.len() {
            let absorbed = live
                .iter()
                .any(|other| other != class && self.classes[class].is_subset(&self.classes[other]));
            if absorbed {
                live.remove(class);
            }
        }

        let removed = self.classes.len() - live.len();
        let mut slot = 0;
        self.classes.retain(|_| {
            slot += 1;
            live.contains(slot - 1)
        });
        removed
    }

    /// Returns `true` if this table represents `comparisons` exactly: every group has at least
    /// one class, significantly different pairs never share a class, and every other compared
    /// pair shares at least one.
    pub fn is_valid<G: Clone + Eq + Hash>(&self, comparisons: &Comparisons<G>) -> bool {
        if self.groups != comparisons.groups().len() {
            return false;
        }
        if (0..self.groups).any(|row| !self.classes.iter().any(|class| class.contains(row))) {
            return false;
        }
        comparisons
            .pairs()
            .iter()
            .all(|pair| self.share_class(pair.first, pair.second) != pair.reject)
    }

    /// Number of groups (rows).
    pub fn groups(&self) -> usize {
        self.groups
    }

    /// Number of classes (columns), including any which are currently empty.
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// The members of every class, in column order.
    pub fn classes(&self) -> &[Members] {
        &self.classes
    }

    /// Returns `true` if group `row` belongs to class `class`.
    pub fn contains(&self, row: usize, class: usize) -> bool {
        self.classes[class].contains(row)
    }

    /// The classes that group `row` belongs to, in column order.
    pub fn classes_of(&self, row: usize) -> impl Iterator<Item = usize> + '_ {
        self.classes
            .iter()
            .enumerate()
            .filter(move |(_, class)| class.contains(row))
            .map(|(idx, _)| idx)
    }

    /// Returns `true` if groups `a` and `b` have at least one class in common.
    pub fn share_class(&self, a: usize, b: usize) -> bool {
        self.classes
            .iter()
            .any(|class| class.contains(a) && class.contains(b))
    }

    /// Every `(row, class)` cell that is set, class by class.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.classes
            .iter()
            .enumerate()
            .flat_map(|(class, members)| members.iter().map(move |row| (row, class)))
    }

    pub(crate) fn set(&mut self, row: usize, class: usize) {
        self.classes[class].insert(row);
    }

    pub(crate) fn clear(&mut self, row: usize, class: usize) {
        self.classes[class].remove(row);
    }

    /// Removes classes which have no members left.
    pub fn drop_empty_classes(&mut self) {
        self.classes.retain(|class| !class.is_empty());
    }

    /// Computes the size measures of this table, ignoring empty classes.
    ///
    /// ```
    /// use piepho::{LetterMatrix, Members};
    ///
    /// let mut ab = Members::empty(3);
    /// ab.insert(0);
    /// ab.insert(1);
    /// let mut bc = Members::empty(3);
    /// bc.insert(1);
    /// bc.insert(2);
    ///
    /// let fitness = LetterMatrix::from_classes(3, vec![ab, bc, Members::empty(3)]).fitness();
    /// assert_eq!(fitness.classes, 2);
    /// assert_eq!(fitness.max_per_group, 2);
    /// assert_eq!(fitness.total, 4);
    /// ```
    pub fn fitness(&self) -> Fitness {
        let max_per_group = (0..self.groups)
            .map(|row| self.classes_of(row).count())
            .max()
            .unwrap_or(0);
        Fitness {
            classes: self.classes.iter().filter(|class| !class.is_empty()).count(),
            max_per_group,
            total: self.classes.iter().map(Members::len).sum(),
        }
    }
}
