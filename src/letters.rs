//! Turning a letter table into per-group letter strings.

use crate::matrix::{Fitness, LetterMatrix};
use crate::Error;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;

/// The glyphs used when no others are configured: `a` through `z`.
pub fn default_glyphs() -> Vec<char> {
    ('a'..='z').collect()
}

/// A larger glyph set for very fragmented comparisons: `a` through `z`, then `A` through `Z`.
pub fn extended_glyphs() -> Vec<char> {
    ('a'..='z').chain('A'..='Z').collect()
}

/// The final letter assignment for every group.
#[derive(Clone, Debug)]
pub struct Letters<G> {
    groups: Vec<G>,
    index: HashMap<G, usize>,
    letters: Vec<SmallVec<[char; 4]>>,
    strings: Vec<String>,
    classes: usize,
    fitness: Fitness,
}

impl<G: Clone + Eq + Hash> Letters<G> {
    /// Labels the classes of `matrix` with `glyphs` and renders each group's letters, joined by
    /// `separator`.
    ///
    /// Without an `ordering` key, classes are lettered in column order. With one, each class is
    /// scored by the mean key of its members (members without a key don't count), and the class
    /// with the highest mean gets the first glyph. Classes with equal means keep their column
    /// order, and classes with no keyed members come last.
    ///
    /// Fails with [`Error::TooManyClasses`] if there are more non-empty classes than glyphs.
    ///
    /// ```
    /// use piepho::{letters, LetterMatrix, Letters, Members};
    /// use std::collections::HashMap;
    ///
    /// let mut low = Members::empty(3);
    /// low.insert(0);
    /// low.insert(1);
    /// let mut high = Members::empty(3);
    /// high.insert(1);
    /// high.insert(2);
    /// let matrix = LetterMatrix::from_classes(3, vec![low, high]);
    ///
    /// let medians: HashMap<_, _> = vec![("x", 1.0), ("y", 2.0), ("z", 9.0)].into_iter().collect();
    /// let letters = Letters::new(
    ///     &matrix,
    ///     &["x", "y", "z"],
    ///     Some(&medians),
    ///     ",",
    ///     &letters::default_glyphs(),
    /// )?;
    /// assert_eq!(letters.get(&"x"), Some("b"));
    /// assert_eq!(letters.get(&"y"), Some("a,b"));
    /// assert_eq!(letters.get(&"z"), Some("a"));
    /// # Ok::<(), piepho::Error>(())
    /// ```
    pub fn new(
        matrix: &LetterMatrix,
        groups: &[G],
        ordering: Option<&HashMap<G, f64>>,
        separator: &str,
        glyphs: &[char],
    ) -> Result<Self, Error> {
        if groups.len() != matrix.groups() {
            return Err(Error::InfeasibleRepresentation(format!(
                "{} group labels for a letter table with {} rows",
                groups.len(),
                matrix.groups()
            )));
        }

        let mut order: Vec<usize> = (0..matrix.class_count())
            .filter(|&class| !matrix.classes()[class].is_empty())
            .collect();
        if order.len() > glyphs.len() {
            return Err(Error::TooManyClasses {
                classes: order.len(),
                available: glyphs.len(),
            });
        }

        if let Some(ordering) = ordering {
            let means: Vec<Option<f64>> = matrix
                .classes()
                .iter()
                .map(|members| {
                    let (sum, count) = members
                        .iter()
                        .filter_map(|row| ordering.get(&groups[row]))
                        .filter(|key| !key.is_nan())
                        .fold((0.0, 0usize), |(sum, count), key| (sum + key, count + 1));
                    if count > 0 {
                        Some(sum / count as f64)
                    } else {
                        None
                    }
                })
                .collect();
            // Stable, so equal means keep their column order.
            order.sort_by(|&a, &b| match (means[a], means[b]) {
                (Some(a), Some(b)) => b.total_cmp(&a),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            });
        }

        let mut letters: Vec<SmallVec<[char; 4]>> = vec![SmallVec::new(); groups.len()];
        for (&class, &glyph) in order.iter().zip(glyphs) {
            for row in matrix.classes()[class].iter() {
                letters[row].push(glyph);
            }
        }

        let strings = letters
            .iter()
            .map(|glyphs| {
                let mut rendered = String::new();
                for (idx, &glyph) in glyphs.iter().enumerate() {
                    if idx > 0 {
                        rendered.push_str(separator);
                    }
                    rendered.push(glyph);
                }
                rendered
            })
            .collect();

        Ok(Letters {
            groups: groups.to_vec(),
            index: groups
                .iter()
                .enumerate()
                .map(|(row, group)| (group.clone(), row))
                .collect(),
            letters,
            strings,
            classes: order.len(),
            fitness: matrix.fitness(),
        })
    }

    /// The rendered letter string of `group`.
    pub fn get(&self, group: &G) -> Option<&str> {
        self.index.get(group).map(|&row| &*self.strings[row])
    }

    /// The individual letters of `group`, in glyph order.
    pub fn letters_of(&self, group: &G) -> Option<&[char]> {
        self.index.get(group).map(|&row| &*self.letters[row])
    }

    /// Returns `true` if the two groups have a letter in common, or `None` if either is unknown.
    ///
    /// Groups share a letter exactly when they were not found to be significantly different.
    pub fn share_letter(&self, a: &G, b: &G) -> Option<bool> {
        let a = self.letters_of(a)?;
        let b = self.letters_of(b)?;
        Some(a.iter().any(|letter| b.contains(letter)))
    }

    /// Iterates over every group and its letter string, in group order.
    pub fn iter(&self) -> impl Iterator<Item = (&G, &str)> + '_ {
        self.groups
            .iter()
            .zip(self.strings.iter().map(|s| &**s))
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns `true` if there are no groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of distinct letters in use.
    pub fn classes(&self) -> usize {
        self.classes
    }

    /// Size measures of the underlying letter table.
    pub fn fitness(&self) -> Fitness {
        self.fitness
    }
}
