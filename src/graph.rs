//! The dataflow graph and its cooperative scheduler.
//!
//! A graph owns a set of operators connected by difference streams. Operator
//! ids are assigned in construction order, which is also a topological order
//! of the (acyclic) dataflow, and the scheduler steps operators in exactly
//! that order. A step lets one operator drain its pending input and emit
//! whatever follows from it; a [`run`](Graph::run) repeats passes over all
//! operators until a full pass performs no work, at which point every message
//! sent before the run has been processed by every downstream operator.
//!
//! Construction happens on a [`GraphBuilder`]; [`finalize`](GraphBuilder::finalize)
//! freezes the topology and yields the runnable [`Graph`]. Inputs reject data
//! until then.

use std::cell::RefCell;
use std::rc::Rc;

use crate::antichain::Antichain;
use crate::error::{Error, Result};
use crate::input::Input;
use crate::stream::Stream;
use crate::Data;

/// One node of the dataflow: drains pending input, updates state, and emits.
///
/// `step` reports whether any work was performed, which is what the scheduler
/// uses to detect quiescence. A step must process everything available to it;
/// there are no suspension points inside a step.
pub(crate) trait Operator {
    fn step(&mut self) -> Result<bool>;
}

pub(crate) struct GraphState {
    pub(crate) initial_frontier: Antichain,
    pub(crate) dimensions: usize,
    pub(crate) finalized: bool,
    operators: Vec<Box<dyn Operator>>,
}

pub(crate) type GraphHandle = Rc<RefCell<GraphState>>;

impl GraphState {
    pub(crate) fn add_operator(&mut self, operator: Box<dyn Operator>) {
        assert!(!self.finalized, "operators cannot be added to a finalized graph");
        self.operators.push(operator);
    }
}

/// A dataflow graph under construction.
pub struct GraphBuilder {
    handle: GraphHandle,
}

impl GraphBuilder {
    /// Creates a graph whose inputs start at `initial_frontier`.
    ///
    /// The frontier must be non-empty and its elements must agree on their
    /// dimension; that dimension becomes the graph's, and every version
    /// entering the graph is validated against it.
    pub fn new(initial_frontier: Antichain) -> Result<Self> {
        let mut elements = initial_frontier.elements().iter();
        let Some(first) = elements.next() else {
            return Err(Error::Configuration(
                "a graph requires a non-empty initial frontier".to_owned(),
            ));
        };
        let dimensions = first.dimensions();
        if elements.any(|v| v.dimensions() != dimensions) {
            return Err(Error::Configuration(
                "initial frontier mixes version dimensions".to_owned(),
            ));
        }
        let state = GraphState {
            initial_frontier,
            dimensions,
            finalized: false,
            operators: Vec::new(),
        };
        Ok(Self { handle: Rc::new(RefCell::new(state)) })
    }

    /// Allocates an input: a handle for the caller to send data and frontier
    /// updates through, and the stream those messages appear on.
    pub fn new_input<T: Data>(&self) -> (Input<T>, Stream<T>) {
        let stream = Stream::new(self.handle.clone());
        let input = Input::new(self.handle.clone(), stream.writer());
        (input, stream)
    }

    /// Freezes the topology. Once finalized the graph accepts input and can
    /// be run; no further operators can be attached.
    pub fn finalize(self) -> Graph {
        self.handle.borrow_mut().finalized = true;
        Graph { handle: self.handle }
    }
}

/// A finalized dataflow graph, ready to process input.
pub struct Graph {
    handle: GraphHandle,
}

impl Graph {
    /// Drives the graph to quiescence.
    ///
    /// Operators are stepped in id order, repeatedly, until a pass performs
    /// no work. Any operator error aborts the run and surfaces to the caller;
    /// the graph should be considered poisoned afterwards.
    pub fn run(&mut self) -> Result<()> {
        let state = &mut *self.handle.borrow_mut();
        let mut passes = 0usize;
        loop {
            let mut worked = false;
            for operator in &mut state.operators {
                worked |= operator.step()?;
            }
            passes += 1;
            if !worked {
                log::trace!("graph quiescent after {passes} passes");
                return Ok(());
            }
        }
    }
}
