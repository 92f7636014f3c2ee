//! Operators that transform difference streams.
//!
//! Stateless operators (`map`, `filter`, `negate`, `concat`, `inspect`,
//! `debug`, `output`) transform each data message as it passes and forward
//! frontiers unchanged. Stateful operators (`consolidate`, `reduce` and its
//! aggregate derivatives, `distinct`, the joins, and top-K) hold versioned
//! state and release results only once their input frontier proves a version
//! complete.
//!
//! All operators live as methods on [`Stream`](crate::stream::Stream); a
//! pipeline is assembled by chaining them.

pub mod aggregate;
pub mod consolidate;
pub mod distinct;
pub mod join;
pub mod linear;
pub mod reduce;
pub mod topk;

pub use linear::Capture;
pub use topk::TopKOptions;

use std::collections::BTreeMap;

use fnv::FnvHashSet;

use crate::antichain::Antichain;
use crate::error::{Error, Result};
use crate::order::{PartialOrder, Version};
use crate::Data;

/// Replaces `current` with `incoming` after checking monotonicity.
///
/// Returns true if the frontier actually advanced; re-announcing an unchanged
/// frontier is legal and reports false.
pub(crate) fn apply_frontier(current: &mut Antichain, incoming: Antichain) -> Result<bool> {
    if !current.less_equal(&incoming) {
        return Err(Error::InvalidFrontier(format!(
            "frontier {:?} does not dominate {:?}",
            incoming.elements(),
            current.elements()
        )));
    }
    if *current == incoming {
        return Ok(false);
    }
    *current = incoming;
    Ok(true)
}

/// Keys awaiting recomputation, organised by the version that made them
/// interesting.
///
/// Stateful operators register a key here whenever a change lands at a
/// version — and at the joins of that version with the key's existing
/// versions, since in partially ordered time those joins are where the
/// change combines with older ones. [`release`](PendingWork::release) hands
/// back every version no longer covered by the frontier, in an order that
/// extends the version order, so recomputations see a consistent history.
pub(crate) struct PendingWork<K> {
    pending: BTreeMap<Version, FnvHashSet<K>>,
}

impl<K: Data> PendingWork<K> {
    pub(crate) fn new() -> Self {
        Self { pending: BTreeMap::new() }
    }

    pub(crate) fn register(&mut self, version: Version, key: K) {
        self.pending.entry(version).or_default().insert(key);
    }

    /// Removes and returns the versions no longer covered by `frontier`,
    /// ascending, each with its keys in sorted order.
    pub(crate) fn release(&mut self, frontier: &Antichain) -> Vec<(Version, Vec<K>)> {
        let ready: Vec<Version> = self
            .pending
            .keys()
            .filter(|version| !frontier.less_equal_version(version))
            .cloned()
            .collect();
        ready
            .into_iter()
            .map(|version| {
                let mut keys: Vec<K> =
                    self.pending.remove(&version).unwrap_or_default().into_iter().collect();
                keys.sort();
                (version, keys)
            })
            .collect()
    }
}
