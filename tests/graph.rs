//! Graph construction, scheduling, and stateless operator behaviour.

use delta_dataflow::{
    Antichain, Error, GraphBuilder, Message, MultiSet, PartialOrder, Version,
};

fn singleton(version: u64) -> Antichain {
    Antichain::from_elem(Version::from(version))
}

#[test]
fn map_filter_negate() {
    let builder = GraphBuilder::new(singleton(0)).unwrap();
    let (mut input, numbers) = builder.new_input::<u64>();

    let doubled = numbers.map(|x| x * 2).filter(|x| *x > 4).negate().capture();

    let mut graph = builder.finalize();
    input.send_data(Version::from(1), MultiSet::from_values([1, 2, 3, 4])).unwrap();
    input.send_frontier(singleton(2)).unwrap();
    graph.run().unwrap();

    assert_eq!(
        doubled.extract_data(),
        vec![(Version::from(1), vec![(6, -1), (8, -1)])]
    );
}

#[test]
fn concat_merges_versions() {
    let builder = GraphBuilder::new(singleton(0)).unwrap();
    let (mut left, a) = builder.new_input::<&'static str>();
    let (mut right, b) = builder.new_input::<&'static str>();

    let both = a.concat(&b).capture();

    let mut graph = builder.finalize();
    left.send_data(Version::from(1), MultiSet::from_values(["l"])).unwrap();
    right.send_data(Version::from(1), MultiSet::from_values(["r"])).unwrap();
    right.send_data(Version::from(2), MultiSet::from_values(["late"])).unwrap();
    left.send_frontier(singleton(3)).unwrap();
    right.send_frontier(singleton(3)).unwrap();
    graph.run().unwrap();

    assert_eq!(
        both.extract_data(),
        vec![
            (Version::from(1), vec![("l", 1), ("r", 1)]),
            (Version::from(2), vec![("late", 1)]),
        ]
    );
}

#[test]
fn negate_concat_cancellation() {
    let builder = GraphBuilder::new(singleton(0)).unwrap();
    let (mut input, stream) = builder.new_input::<u64>();

    let cancelled = stream.concat(&stream.negate()).consolidate().capture();

    let mut graph = builder.finalize();
    input.send_data(Version::from(0), MultiSet::from_values([1, 2, 3])).unwrap();
    input.send_frontier(singleton(1)).unwrap();
    graph.run().unwrap();

    assert_eq!(cancelled.extract_data(), vec![]);
}

#[test]
fn consolidate_cancels_within_a_version() {
    let builder = GraphBuilder::new(singleton(0)).unwrap();
    let (mut input, stream) = builder.new_input::<&'static str>();
    let consolidated = stream.consolidate().capture();

    let mut graph = builder.finalize();
    input.send_data(Version::from(1), MultiSet::from(vec![("x", 1)])).unwrap();
    input.send_data(Version::from(1), MultiSet::from(vec![("x", -1), ("y", 2)])).unwrap();
    input.send_frontier(singleton(2)).unwrap();
    graph.run().unwrap();

    assert_eq!(consolidated.extract_data(), vec![(Version::from(1), vec![("y", 2)])]);
}

#[test]
fn empty_inputs_emit_only_frontiers() {
    let builder = GraphBuilder::new(singleton(0)).unwrap();
    let (mut input, stream) = builder.new_input::<u64>();
    let observed = stream.map(|x| x + 1).consolidate().capture();

    let mut graph = builder.finalize();
    input.send_frontier(singleton(5)).unwrap();
    graph.run().unwrap();

    let messages = observed.extract();
    assert!(messages
        .iter()
        .all(|message| matches!(message, Message::Frontier { .. })));
    assert!(!messages.is_empty());
}

#[test]
fn frontiers_are_monotonic_on_every_stream() {
    let builder = GraphBuilder::new(singleton(0)).unwrap();
    let (mut input, stream) = builder.new_input::<u64>();
    let counted = stream.key_by(|x| x % 2).count().consolidate().capture();

    let mut graph = builder.finalize();
    for round in 0..5u64 {
        input.send_data(Version::from(round), MultiSet::from_values([round, round + 1])).unwrap();
        input.send_frontier(singleton(round + 1)).unwrap();
        graph.run().unwrap();
    }

    let mut last: Option<Antichain> = None;
    for message in counted.extract() {
        if let Message::Frontier { frontier } = message {
            if let Some(previous) = &last {
                assert!(previous.less_equal(&frontier));
            }
            last = Some(frontier);
        }
    }
    assert_eq!(last, Some(singleton(5)));
}

#[test]
fn run_drains_to_quiescence() {
    let builder = GraphBuilder::new(singleton(0)).unwrap();
    let (mut input, stream) = builder.new_input::<u64>();

    // A diamond: both sides of the split rejoin through concat.
    let evens = stream.filter(|x| x % 2 == 0);
    let odds = stream.filter(|x| x % 2 == 1).map(|x| x + 1);
    let merged = evens.concat(&odds).consolidate().capture();

    let mut graph = builder.finalize();
    input.send_data(Version::from(0), MultiSet::from_values([1, 2, 3])).unwrap();
    input.send_frontier(singleton(1)).unwrap();
    graph.run().unwrap();

    // Everything sent before the run has been processed by every operator;
    // a further run finds no work and emits nothing new.
    let first = merged.extract_data();
    assert_eq!(first, vec![(Version::from(0), vec![(2, 2), (4, 1)])]);
    graph.run().unwrap();
    assert_eq!(merged.extract(), vec![]);
}

#[test]
fn inputs_validate_their_use() {
    let builder = GraphBuilder::new(singleton(0)).unwrap();
    let (mut input, stream) = builder.new_input::<u64>();
    stream.output(|_| {});

    // The graph is not finalized yet.
    assert_eq!(
        input.send_data(Version::from(0), MultiSet::from_values([1])),
        Err(Error::GraphNotFinalized)
    );

    let mut graph = builder.finalize();

    // Wrong dimension.
    assert!(matches!(
        input.send_data(Version::from([0, 0]), MultiSet::from_values([1])),
        Err(Error::Configuration(_))
    ));

    // Frontiers cannot regress, and data cannot arrive below the frontier.
    input.send_frontier(singleton(3)).unwrap();
    assert!(matches!(input.send_frontier(singleton(2)), Err(Error::InvalidFrontier(_))));
    assert!(matches!(
        input.send_data(Version::from(2), MultiSet::from_values([1])),
        Err(Error::InvalidVersion(_))
    ));

    input.send_data(Version::from(3), MultiSet::from_values([1])).unwrap();
    graph.run().unwrap();
}

#[test]
fn graphs_require_a_uniform_initial_frontier() {
    assert!(matches!(
        GraphBuilder::new(Antichain::new()),
        Err(Error::Configuration(_))
    ));

    let mut mixed = Antichain::new();
    mixed.insert(Version::from(1));
    mixed.insert(Version::from([0, 0]));
    assert!(matches!(GraphBuilder::new(mixed), Err(Error::Configuration(_))));
}

#[test]
fn inspect_and_debug_pass_through() {
    let _ = env_logger::builder().is_test(true).try_init();

    let builder = GraphBuilder::new(singleton(0)).unwrap();
    let (mut input, stream) = builder.new_input::<u64>();

    let seen = std::rc::Rc::new(std::cell::RefCell::new(0usize));
    let seen_inner = seen.clone();
    let observed = stream
        .inspect(move |_, data| *seen_inner.borrow_mut() += data.len())
        .debug("squares")
        .map(|x| x * x)
        .capture();

    let mut graph = builder.finalize();
    input.send_data(Version::from(1), MultiSet::from_values([2, 3])).unwrap();
    input.send_frontier(singleton(2)).unwrap();
    graph.run().unwrap();

    assert_eq!(*seen.borrow(), 2);
    assert_eq!(observed.extract_data(), vec![(Version::from(1), vec![(4, 1), (9, 1)])]);
}

#[test]
fn messages_serialize_to_the_wire_contract() {
    let data: Message<&'static str> = Message::Data {
        version: Version::from([1, 0]),
        data: MultiSet::from(vec![("a", 1), ("b", -2)]),
    };
    assert_eq!(
        serde_json::to_string(&data).unwrap(),
        r#"{"version":[1,0],"data":[["a",1],["b",-2]]}"#
    );

    let frontier: Message<&'static str> = Message::Frontier {
        frontier: Antichain::from(vec![Version::from([1, 0]), Version::from([0, 1])]),
    };
    assert_eq!(
        serde_json::to_string(&frontier).unwrap(),
        r#"{"frontier":[[1,0],[0,1]]}"#
    );

    let roundtrip: Message<String> = serde_json::from_str(
        r#"{"version":[2],"data":[["x",3]]}"#,
    )
    .unwrap();
    assert_eq!(
        roundtrip,
        Message::Data { version: Version::from(2), data: MultiSet::from(vec![("x".to_owned(), 3)]) }
    );
}
