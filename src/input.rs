//! Input handles: the boundary between callers and a running graph.
//!
//! An [`Input`] owns the writer of one input stream. Callers push batches of
//! changes with [`send_data`](Input::send_data) and promise progress with
//! [`send_frontier`](Input::send_frontier); a subsequent
//! [`run`](crate::graph::Graph::run) drains whatever those messages imply.
//!
//! The handle validates what the operators downstream rely on: the graph is
//! finalized, versions have the graph's dimension, data arrives only at
//! versions the current frontier still covers, and frontiers never regress.

use crate::antichain::Antichain;
use crate::error::{Error, Result};
use crate::graph::GraphHandle;
use crate::multiset::MultiSet;
use crate::order::{PartialOrder, Version};
use crate::stream::StreamWriter;
use crate::Data;

/// A handle for sending data and frontier updates into a graph.
pub struct Input<T> {
    graph: GraphHandle,
    writer: StreamWriter<T>,
    frontier: Antichain,
}

impl<T: Data> Input<T> {
    pub(crate) fn new(graph: GraphHandle, writer: StreamWriter<T>) -> Self {
        let frontier = graph.borrow().initial_frontier.clone();
        Self { graph, writer, frontier }
    }

    /// The input's current frontier.
    pub fn frontier(&self) -> &Antichain {
        &self.frontier
    }

    /// Sends a multiset of changes at `version`.
    ///
    /// Fails with [`Error::GraphNotFinalized`] before finalization, with
    /// [`Error::Configuration`] if the version has the wrong dimension, and
    /// with [`Error::InvalidVersion`] if the input's frontier no longer
    /// covers the version.
    pub fn send_data(&mut self, version: Version, data: MultiSet<T>) -> Result<()> {
        self.check_version(&version)?;
        if !self.frontier.less_equal_version(&version) {
            return Err(Error::InvalidVersion(format!(
                "version {version:?} is not covered by the input frontier {:?}",
                self.frontier.elements()
            )));
        }
        self.writer.send_data(version, data);
        Ok(())
    }

    /// Advances the input's frontier and announces it downstream.
    ///
    /// Fails with [`Error::InvalidFrontier`] unless the new frontier is at or
    /// beyond the current one.
    pub fn send_frontier(&mut self, frontier: Antichain) -> Result<()> {
        for version in frontier.elements() {
            self.check_version(version)?;
        }
        if !self.frontier.less_equal(&frontier) {
            return Err(Error::InvalidFrontier(format!(
                "frontier {:?} does not dominate the current frontier {:?}",
                frontier.elements(),
                self.frontier.elements()
            )));
        }
        self.frontier = frontier.clone();
        self.writer.send_frontier(frontier);
        Ok(())
    }

    fn check_version(&self, version: &Version) -> Result<()> {
        let graph = self.graph.borrow();
        if !graph.finalized {
            return Err(Error::GraphNotFinalized);
        }
        if version.dimensions() != graph.dimensions {
            return Err(Error::Configuration(format!(
                "version {version:?} has dimension {}, the graph uses {}",
                version.dimensions(),
                graph.dimensions
            )));
        }
        Ok(())
    }
}
