//! Difference streams: single-writer, many-reader message channels.
//!
//! Operators communicate exclusively through streams. A stream has one
//! writer — the operator (or input) producing it — and any number of readers,
//! each with an independent queue: a message sent on the stream is delivered
//! to every reader, in the order the writer emitted it.
//!
//! Messages are either [`Message::Data`], a multiset of changes at one
//! version, or [`Message::Frontier`], the writer's promise that all future
//! data versions will be covered by the given antichain.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::antichain::Antichain;
use crate::graph::GraphHandle;
use crate::multiset::MultiSet;
use crate::order::Version;
use crate::Data;

/// A message carried by a difference stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message<T> {
    /// A multiset of changes at one version.
    Data {
        /// The version the changes occur at.
        version: Version,
        /// The changes themselves.
        data: MultiSet<T>,
    },
    /// A lower bound on the versions of all future data messages.
    Frontier {
        /// The antichain of minimal future versions.
        frontier: Antichain,
    },
}

pub(crate) struct StreamState<T> {
    queues: Vec<VecDeque<Message<T>>>,
}

/// The writing end of a stream, held by the producing operator.
pub(crate) struct StreamWriter<T> {
    state: Rc<RefCell<StreamState<T>>>,
}

impl<T: Data> StreamWriter<T> {
    pub(crate) fn send(&self, message: Message<T>) {
        let mut state = self.state.borrow_mut();
        let queues = &mut state.queues;
        if let Some((last, rest)) = queues.split_last_mut() {
            for queue in rest {
                queue.push_back(message.clone());
            }
            last.push_back(message);
        }
    }

    pub(crate) fn send_data(&self, version: Version, data: MultiSet<T>) {
        self.send(Message::Data { version, data });
    }

    pub(crate) fn send_frontier(&self, frontier: Antichain) {
        self.send(Message::Frontier { frontier });
    }
}

/// The reading end of a stream, held by a consuming operator.
pub(crate) struct StreamReader<T> {
    state: Rc<RefCell<StreamState<T>>>,
    queue: usize,
}

impl<T: Data> StreamReader<T> {
    pub(crate) fn pop(&mut self) -> Option<Message<T>> {
        self.state.borrow_mut().queues[self.queue].pop_front()
    }
}

/// A handle to a stream under construction.
///
/// The handle is how dataflows are assembled: operator methods such as
/// [`map`](Stream::map) and [`join`](Stream::join) read one or more handles
/// and yield the handle of their output stream. Handles are only useful
/// before the graph is finalized; afterwards the operators they connected do
/// the work.
pub struct Stream<T> {
    state: Rc<RefCell<StreamState<T>>>,
    graph: GraphHandle,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self { state: self.state.clone(), graph: self.graph.clone() }
    }
}

impl<T: Data> Stream<T> {
    pub(crate) fn new(graph: GraphHandle) -> Self {
        Self { state: Rc::new(RefCell::new(StreamState { queues: Vec::new() })), graph }
    }

    pub(crate) fn writer(&self) -> StreamWriter<T> {
        StreamWriter { state: self.state.clone() }
    }

    pub(crate) fn reader(&self) -> StreamReader<T> {
        let mut state = self.state.borrow_mut();
        state.queues.push(VecDeque::new());
        StreamReader { state: self.state.clone(), queue: state.queues.len() - 1 }
    }

    pub(crate) fn graph(&self) -> &GraphHandle {
        &self.graph
    }

    /// Panics unless the two handles belong to the same graph; operators can
    /// only connect streams of one graph.
    pub(crate) fn expect_same_graph<U>(&self, other: &Stream<U>) {
        assert!(
            Rc::ptr_eq(&self.graph, &other.graph),
            "cannot connect streams from different graphs"
        );
    }
}
