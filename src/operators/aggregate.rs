//! Aggregates derived from `reduce`: count, sum, extrema, and friends.
//!
//! Each aggregate reduces a key's consolidated value list to a single output
//! row, so downstream always sees one row per key, maintained by retraction
//! and re-insertion as the key's values change.
//!
//! The order-sensitive aggregates (`min`, `max`, `median`, `mode`) require
//! every accumulated multiplicity to be non-negative: "the third-smallest
//! value" has no meaning in a collection that retracts more than it inserted.
//! They fail the run with [`Error::InvalidAggregate`] otherwise.

use num_rational::Rational64;

use crate::error::{Error, Result};
use crate::stream::Stream;
use crate::{Data, Diff};

fn checked_nonnegative<V: Data>(input: &[(V, Diff)], context: &'static str) -> Result<()> {
    if input.iter().any(|(_, multiplicity)| *multiplicity < 0) {
        return Err(Error::InvalidAggregate(context));
    }
    Ok(())
}

impl<K: Data, V: Data> Stream<(K, V)> {
    /// Counts the values of each key, multiplicities included.
    pub fn count(&self) -> Stream<(K, Diff)> {
        self.reduce(|input| {
            vec![(input.iter().map(|(_, multiplicity)| multiplicity).sum(), 1)]
        })
    }

    /// Sums `extract` of each value, weighted by multiplicity.
    pub fn sum(&self, extract: impl Fn(&V) -> i64 + 'static) -> Stream<(K, i64)> {
        self.reduce(move |input| {
            vec![(
                input
                    .iter()
                    .map(|(value, multiplicity)| extract(value) * *multiplicity as i64)
                    .sum(),
                1,
            )]
        })
    }

    /// Keeps the smallest value of each key.
    pub fn min(&self) -> Stream<(K, V)> {
        self.reduce_core(|input| {
            checked_nonnegative(input, "min over negative multiplicities")?;
            Ok(input.iter().map(|(value, _)| (value.clone(), 1)).min().into_iter().collect())
        })
    }

    /// Keeps the largest value of each key.
    pub fn max(&self) -> Stream<(K, V)> {
        self.reduce_core(|input| {
            checked_nonnegative(input, "max over negative multiplicities")?;
            Ok(input.iter().map(|(value, _)| (value.clone(), 1)).max().into_iter().collect())
        })
    }

    /// Keeps the value minimising `extract`, breaking ties towards the
    /// smaller value.
    pub fn min_by_key<S: Ord>(&self, extract: impl Fn(&V) -> S + 'static) -> Stream<(K, V)> {
        self.reduce_core(move |input| {
            checked_nonnegative(input, "min over negative multiplicities")?;
            Ok(input
                .iter()
                .min_by_key(|(value, _)| (extract(value), value.clone()))
                .map(|(value, _)| (value.clone(), 1))
                .into_iter()
                .collect())
        })
    }

    /// Keeps the value maximising `extract`, breaking ties towards the
    /// larger value.
    pub fn max_by_key<S: Ord>(&self, extract: impl Fn(&V) -> S + 'static) -> Stream<(K, V)> {
        self.reduce_core(move |input| {
            checked_nonnegative(input, "max over negative multiplicities")?;
            Ok(input
                .iter()
                .max_by_key(|(value, _)| (extract(value), value.clone()))
                .map(|(value, _)| (value.clone(), 1))
                .into_iter()
                .collect())
        })
    }

    /// Averages `extract` of each key's values, weighted by multiplicity.
    ///
    /// The result is exact: a rational of the weighted sum over the count.
    /// Keys whose multiplicities accumulate to a non-positive count fail
    /// with [`Error::InvalidAggregate`].
    pub fn avg(&self, extract: impl Fn(&V) -> i64 + 'static) -> Stream<(K, Rational64)> {
        self.reduce_core(move |input| {
            checked_nonnegative(input, "avg over negative multiplicities")?;
            let count: Diff = input.iter().map(|(_, multiplicity)| multiplicity).sum();
            if count == 0 {
                return Ok(Vec::new());
            }
            let total: i64 = input
                .iter()
                .map(|(value, multiplicity)| extract(value) * *multiplicity as i64)
                .sum();
            Ok(vec![(Rational64::new(total, count as i64), 1)])
        })
    }

    /// Keeps the median value of each key, counting multiplicities; the
    /// lower of the two middle values when the count is even.
    pub fn median(&self) -> Stream<(K, V)> {
        self.reduce_core(|input| {
            checked_nonnegative(input, "median over negative multiplicities")?;
            let count: Diff = input.iter().map(|(_, multiplicity)| multiplicity).sum();
            if count == 0 {
                return Ok(Vec::new());
            }
            // The input is sorted by value; walk the cumulative counts to the
            // lower middle position.
            let target = (count - 1) / 2;
            let mut seen = 0;
            for (value, multiplicity) in input {
                seen += multiplicity;
                if seen > target {
                    return Ok(vec![(value.clone(), 1)]);
                }
            }
            unreachable!("cumulative multiplicities reach their own sum");
        })
    }

    /// Keeps the most frequent value of each key, breaking ties towards the
    /// smaller value.
    pub fn mode(&self) -> Stream<(K, V)> {
        self.reduce_core(|input| {
            checked_nonnegative(input, "mode over negative multiplicities")?;
            Ok(input
                .iter()
                .max_by_key(|(value, multiplicity)| (*multiplicity, std::cmp::Reverse(value.clone())))
                .map(|(value, _)| (value.clone(), 1))
                .into_iter()
                .collect())
        })
    }

    /// Drops the key of each record, keeping the value; the inverse of
    /// [`key_by`](Stream::key_by).
    pub fn unkey(&self) -> Stream<V> {
        self.map(|(_, value)| value)
    }
}

impl<T: Data> Stream<T> {
    /// Keys the stream by `key` of each value, preserving the value.
    pub fn key_by<K: Data>(&self, key: impl Fn(&T) -> K + 'static) -> Stream<(K, T)> {
        self.map(move |value| (key(&value), value))
    }

    /// Re-keys the stream by `key` and reduces each group with `logic`.
    ///
    /// The aggregate record is whatever `logic` builds — commonly a tuple of
    /// the composed aggregates over the group's consolidated value list.
    pub fn group_by<K: Data, R: Data>(
        &self,
        key: impl Fn(&T) -> K + 'static,
        logic: impl FnMut(&[(T, Diff)]) -> Vec<(R, Diff)> + 'static,
    ) -> Stream<(K, R)> {
        self.key_by(key).reduce(logic)
    }
}
