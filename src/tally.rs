//! Token frequency tallies and the order-independent aggregator that merges them.

use rayon::prelude::*;
use rustc_hash::FxHashMap;

/// Mapping from token to its number of occurrences.
///
/// A tally is owned by exactly one scanner while it accumulates and is handed over by value to
/// the aggregator afterwards; there is never shared mutable access to a tally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    counts: FxHashMap<String, u64>,
}

impl Tally {
    /// Creates an empty tally.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `count` occurrences of `token`.
    pub fn add(&mut self, token: &str, count: u64) {
        if count == 0 {
            return;
        }
        if let Some(existing) = self.counts.get_mut(token) {
            *existing += count;
        } else {
            self.counts.insert(token.to_owned(), count);
        }
    }

    /// Counts every character of decoded `text` except whitespace.
    ///
    /// Whitespace is Unicode `White_Space` plus the information separators U+001C..=U+001F.
    pub fn add_text(&mut self, text: &str) {
        let mut buf = [0u8; 4];
        for ch in text.chars().filter(|&ch| !is_separator(ch)) {
            self.add(ch.encode_utf8(&mut buf), 1);
        }
    }

    /// Returns the count recorded for `token` (zero when absent).
    #[must_use]
    pub fn get(&self, token: &str) -> u64 {
        self.counts.get(token).copied().unwrap_or(0)
    }

    /// Number of distinct tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns `true` when no token has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all token counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Iterates over `(token, count)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.counts.iter().map(|(token, &count)| (token.as_str(), count))
    }

    /// Merges `other` into `self`, summing counts per token.
    ///
    /// The smaller map is folded into the larger one; the result does not depend on which
    /// operand is which.
    #[must_use]
    pub fn merge(self, other: Tally) -> Tally {
        let (mut larger, smaller) = if self.counts.len() >= other.counts.len() {
            (self, other)
        } else {
            (other, self)
        };
        for (token, count) in smaller.counts {
            *larger.counts.entry(token).or_insert(0) += count;
        }
        larger
    }
}

impl IntoIterator for Tally {
    type Item = (String, u64);
    type IntoIter = std::collections::hash_map::IntoIter<String, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.counts.into_iter()
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for Tally {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        let mut tally = Tally::new();
        for (token, count) in iter {
            if count > 0 {
                *tally.counts.entry(token.into()).or_insert(0) += count;
            }
        }
        tally
    }
}

fn is_separator(ch: char) -> bool {
    ch.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&ch)
}

/// Folds any number of partial tallies into one, left to right.
#[must_use]
pub fn merge_all<I>(partials: I) -> Tally
where
    I: IntoIterator<Item = Tally>,
{
    partials.into_iter().fold(Tally::new(), Tally::merge)
}

/// Merges partial tallies on the rayon pool as a reduction tree.
///
/// Completion order of the workers is irrelevant because [`Tally::merge`] is associative and
/// commutative.
#[must_use]
pub fn aggregate(partials: Vec<Tally>) -> Tally {
    match partials.len() {
        0 => Tally::new(),
        1 => partials.into_iter().next().unwrap_or_default(),
        _ => partials.into_par_iter().reduce(Tally::new, Tally::merge),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(pairs: &[(&str, u64)]) -> Tally {
        pairs.iter().map(|&(token, count)| (token, count)).collect()
    }

    #[test]
    fn add_text_skips_unicode_whitespace() {
        let mut counts = Tally::new();
        counts.add_text("a b\tc\u{3000}a\r\n");
        assert_eq!(counts.get("a"), 2);
        assert_eq!(counts.get("b"), 1);
        assert_eq!(counts.get("c"), 1);
        assert_eq!(counts.len(), 3);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn add_text_skips_information_separators() {
        let mut counts = Tally::new();
        counts.add_text("a\u{1f}b\u{1c}\u{1d}\u{1e}a\u{1b}");
        assert_eq!(counts.get("a"), 2);
        assert_eq!(counts.get("b"), 1);
        assert_eq!(counts.get("\u{1b}"), 1);
        assert_eq!(counts.len(), 3);
    }

    #[test]
    fn multibyte_characters_are_single_tokens() {
        let mut counts = Tally::new();
        counts.add_text("你好你\n");
        assert_eq!(counts.get("你"), 2);
        assert_eq!(counts.get("好"), 1);
    }

    #[test]
    fn merge_sums_counts() {
        let merged = tally(&[("a", 1), ("b", 2)]).merge(tally(&[("b", 3), ("c", 4)]));
        assert_eq!(merged, tally(&[("a", 1), ("b", 5), ("c", 4)]));
    }

    #[test]
    fn merge_is_order_independent() {
        let a = tally(&[("x", 1), ("y", 7)]);
        let b = tally(&[("y", 2)]);
        let c = tally(&[("z", 9), ("x", 3)]);

        let left = a.clone().merge(b.clone()).merge(c.clone());
        let right = a.clone().merge(b.clone().merge(c.clone()));
        let swapped = b.clone().merge(a.clone().merge(c.clone()));
        assert_eq!(left, right);
        assert_eq!(left, swapped);
        assert_eq!(aggregate(vec![c, b, a]), left);
    }

    #[test]
    fn aggregate_handles_empty_and_single_inputs() {
        assert!(aggregate(Vec::new()).is_empty());
        let single = tally(&[("q", 4)]);
        assert_eq!(aggregate(vec![single.clone()]), single);
        assert_eq!(merge_all(vec![single.clone(), Tally::new()]), single);
    }

    #[test]
    fn zero_counts_are_not_recorded() {
        let mut counts = Tally::new();
        counts.add("a", 0);
        assert!(counts.is_empty());
        assert!(tally(&[("a", 0)]).is_empty());
    }
}
