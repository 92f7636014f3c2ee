//! Delta dataflow is a single-threaded incremental view maintenance engine.
//!
//! Computations are written in a collection-oriented style: multisets of
//! records flow through operators such as `map`, `filter`, `join`, `reduce`,
//! and `top_k`, assembled into a dataflow graph. Once the graph is built you
//! feed it batches of changes — insertions as positive multiplicities,
//! retractions as negative ones — and the engine updates every derived
//! collection by emitting only the differences needed to keep it consistent.
//!
//! Progress is tracked with partially ordered versions and antichain
//! frontiers, so a graph can work multi-temporally; the common case of a
//! single u64 version behaves like an ordinary batch counter. Scheduling is
//! cooperative and deterministic: a [`run`](graph::Graph::run) steps
//! operators in construction order until nothing is left to do.
//!
//! # Examples
//!
//! ```
//! use delta_dataflow::{Antichain, GraphBuilder, MultiSet, Version};
//!
//! let builder = GraphBuilder::new(Antichain::from_elem(Version::from(0))).unwrap();
//! let (mut input, words) = builder.new_input::<String>();
//!
//! // Count words, keeping only the printable changes.
//! let counts = words.key_by(|word| word.clone()).count().consolidate().capture();
//!
//! let mut graph = builder.finalize();
//! input
//!     .send_data(
//!         Version::from(0),
//!         MultiSet::from_values(["so".to_owned(), "it".to_owned(), "goes".to_owned(), "so".to_owned()]),
//!     )
//!     .unwrap();
//! input.send_frontier(Antichain::from_elem(Version::from(1))).unwrap();
//! graph.run().unwrap();
//!
//! let changes = counts.extract_data();
//! assert_eq!(changes.len(), 1);
//! assert!(changes[0].1.contains(&(("so".to_owned(), 2), 1)));
//! ```
//!
//! Topology construction panics on misuse that the API cannot express
//! otherwise, such as connecting streams of two different graphs; everything
//! at and after the data boundary — sending, running, compacting — reports
//! through [`Error`] instead.

#![forbid(missing_docs)]

use std::fmt::Debug;
use std::hash::Hash;

/// A change in multiplicity: positive insertions, negative retractions.
pub type Diff = isize;

/// A composite trait for record types usable in dataflow collections.
///
/// The `Ord` and `Hash` requirements give operators a deterministic way to
/// group, sort, and index records; `Clone` lets collections and indexes own
/// their entries.
pub trait Data: Clone + Ord + Eq + Hash + Debug + 'static {}
impl<T: Clone + Ord + Eq + Hash + Debug + 'static> Data for T {}

pub mod antichain;
pub mod consolidation;
pub mod error;
pub mod fractional;
pub mod graph;
pub mod hashable;
pub mod index;
pub mod input;
pub mod multiset;
pub mod operators;
pub mod order;
pub mod stream;

pub use antichain::Antichain;
pub use error::Error;
pub use graph::{Graph, GraphBuilder};
pub use hashable::Hashable;
pub use index::Index;
pub use input::Input;
pub use multiset::MultiSet;
pub use operators::{Capture, TopKOptions};
pub use order::{PartialOrder, Version};
pub use stream::{Message, Stream};
