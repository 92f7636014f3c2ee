//! Reduces the multiplicities of each key's values.

use crate::error::Error;
use crate::stream::Stream;
use crate::{Data, Diff};

impl<K: Data, V: Data> Stream<(K, V)> {
    /// Replaces each value's accumulated multiplicity with `logic` of it,
    /// dropping values whose replacement is zero.
    ///
    /// `threshold` trusts its caller: negative accumulations are handed to
    /// `logic` as they are.
    pub fn threshold(&self, logic: impl Fn(&V, Diff) -> Diff + 'static) -> Stream<(K, V)> {
        self.reduce_core(move |input| {
            Ok(input
                .iter()
                .map(|(value, multiplicity)| (value.clone(), logic(value, *multiplicity)))
                .filter(|(_, multiplicity)| *multiplicity != 0)
                .collect())
        })
    }

    /// Keeps each of a key's present values exactly once.
    ///
    /// A value whose multiplicity accumulates to a negative count fails the
    /// run with [`Error::InvalidAggregate`].
    pub fn distinct(&self) -> Stream<(K, V)> {
        self.reduce_core(|input| {
            if input.iter().any(|(_, multiplicity)| *multiplicity < 0) {
                return Err(Error::InvalidAggregate("distinct over negative multiplicities"));
            }
            Ok(input.iter().map(|(value, _)| (value.clone(), 1)).collect())
        })
    }
}
