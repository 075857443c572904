use trace_replay::apply::apply_delays;
use trace_replay::tree_builder::export_rendered;
use trace_replay::visitor::preorder;
use trace_replay::{
    build_tree, compute_delays, ReplayConfig, ReplaySession, SpanRecord, TraceNode, TraceTree,
};

use test_helpers::{assert_normalized, index, rendered, ScenarioBuilder, TimeInterval};

fn child_ids(tree: &TraceTree, id: &str) -> Vec<String> {
    tree.node(index(tree, id))
        .children
        .iter()
        .map(|&child| tree.node(child).id.clone())
        .collect()
}

fn root_ids(tree: &TraceTree) -> Vec<String> {
    tree.roots()
        .iter()
        .map(|&root| tree.node(root).id.clone())
        .collect()
}

#[test]
fn test_parent_chain_and_entities() {
    let mut builder = ScenarioBuilder::new();
    builder.add_span("root", None, TimeInterval::new(0.0, 100.0));
    builder.add_span("mid", Some("root"), TimeInterval::new(10.0, 50.0));
    builder.add_span("leaf", Some("mid"), TimeInterval::instant(20.0));
    let tree = builder.build();

    assert_eq!(root_ids(&tree), vec!["root"]);
    let leaf = tree.node(index(&tree, "leaf"));
    assert_eq!(leaf.ancestors, vec![index(&tree, "mid"), index(&tree, "root")]);
    assert_eq!(leaf.parent(), Some(index(&tree, "mid")));
    assert!(leaf.is_leaf());
    assert!(tree.node(index(&tree, "root")).ancestors.is_empty());

    // Calls originate in the caller's entity, top-level calls in their own
    assert_eq!(leaf.source_id, "class_mid");
    assert_eq!(leaf.target_id, "class_leaf");
    let root = tree.node_by_id("root").expect("root exists");
    assert_eq!(root.source_id, "class_root");

    // Nothing is rendered differently before normalization
    assert_eq!((leaf.rendered_start, leaf.rendered_end), (20.0, 20.0));
}

#[test]
fn test_children_keep_input_order() {
    let mut builder = ScenarioBuilder::new();
    // Children listed before their parent and out of chronological order
    builder.add_span("late", Some("root"), TimeInterval::new(50.0, 60.0));
    builder.add_span("early", Some("root"), TimeInterval::new(10.0, 20.0));
    builder.add_span("root", None, TimeInterval::new(0.0, 100.0));
    let tree = builder.build();

    assert_eq!(root_ids(&tree), vec!["root"]);
    assert_eq!(child_ids(&tree, "root"), vec!["late", "early"]);
}

#[test]
fn test_orphans_become_top_level() {
    let mut builder = ScenarioBuilder::new();
    builder.add_span("root", None, TimeInterval::new(0.0, 10.0));
    builder.add_span("orphan", Some("not_exported"), TimeInterval::new(2.0, 3.0));
    let tree = builder.build();

    assert_eq!(root_ids(&tree), vec!["root", "orphan"]);
    let orphan = tree.node(index(&tree, "orphan"));
    assert_eq!(orphan.parent(), None);
    assert_eq!(orphan.source_id, "class_orphan");
}

#[test]
fn test_duplicate_ids_keep_first_span() {
    let mut builder = ScenarioBuilder::new();
    builder.add_span("a", None, TimeInterval::new(0.0, 10.0));
    builder.add_span("a", None, TimeInterval::new(5.0, 6.0));
    builder.add_span("b", Some("a"), TimeInterval::new(1.0, 2.0));
    let tree = builder.build();

    assert_eq!(tree.node_count(), 2);
    assert_eq!(root_ids(&tree), vec!["a"]);
    assert_eq!(tree.node(index(&tree, "a")).end, 10.0);
    assert_eq!(child_ids(&tree, "a"), vec!["b"]);
}

#[test]
fn test_parent_loops_are_broken() {
    let mut builder = ScenarioBuilder::new();
    builder.add_span("a", Some("b"), TimeInterval::new(0.0, 10.0));
    builder.add_span("b", Some("a"), TimeInterval::new(0.0, 10.0));
    builder.add_span("c", Some("a"), TimeInterval::new(1.0, 2.0));
    builder.add_span("self", Some("self"), TimeInterval::new(3.0, 4.0));
    let tree = builder.build();

    assert_eq!(tree.node_count(), 4);
    assert_eq!(root_ids(&tree), vec!["a", "b", "self"]);
    // Spans hanging off the loop stay where they are
    assert_eq!(child_ids(&tree, "a"), vec!["c"]);
    assert!(tree.node(index(&tree, "self")).children.is_empty());
}

#[test]
fn test_reversed_interval_is_clamped() {
    let mut builder = ScenarioBuilder::new();
    builder.add_span("backwards", None, TimeInterval::new(10.0, 5.0));
    let tree = builder.build();

    let node = tree.node(index(&tree, "backwards"));
    assert_eq!((node.start, node.end), (10.0, 10.0));
    assert_eq!((node.rendered_start, node.rendered_end), (10.0, 10.0));
}

#[test]
fn test_span_record_from_json() {
    let json = r#"[
        {"id": "root", "start": 0.0, "end": 10.0, "target_id": "Service"},
        {"id": "call", "parent_id": "root", "start": 1.0, "end": 2.0, "method_ref": "Service.get"}
    ]"#;
    let spans: Vec<SpanRecord> = serde_json::from_str(json).expect("Valid span list");
    let tree = build_tree(&spans);

    let call = tree.node(index(&tree, "call"));
    assert_eq!(call.method_ref, "Service.get");
    assert_eq!(call.source_id, "Service");
    assert_eq!(call.target_id, "");
}

#[test]
fn test_preorder_visits_each_node_once() {
    let mut builder = ScenarioBuilder::new();
    builder.add_span("root", None, TimeInterval::new(0.0, 100.0));
    builder.add_span("mid", Some("root"), TimeInterval::new(10.0, 50.0));
    builder.add_span("leaf", Some("mid"), TimeInterval::instant(20.0));
    builder.add_span("second", None, TimeInterval::new(200.0, 300.0));
    let mut tree = builder.build();

    let ids = |tree: &TraceTree| -> Vec<String> {
        preorder(tree)
            .into_iter()
            .map(|i| tree.node(i).id.clone())
            .collect()
    };
    assert_eq!(ids(&tree), vec!["root", "mid", "leaf", "second"]);

    // A child edge back to the top doesn't make the traversal revisit anything
    tree.link_child(index(&tree, "leaf"), index(&tree, "root"));
    assert_eq!(ids(&tree), vec!["root", "mid", "leaf", "second"]);
}

#[test]
fn test_time_bounds() {
    assert_eq!(TraceTree::new().time_bounds(), None);

    let mut builder = ScenarioBuilder::new();
    builder.add_span("first", None, TimeInterval::new(5.0, 20.0));
    builder.add_span("first.a", Some("first"), TimeInterval::with_duration(15.0, 3.0));
    builder.add_span("second", None, TimeInterval::new(30.0, 50.0));
    assert_eq!(builder.build().time_bounds(), Some((5.0, 50.0)));
}

/// Callees whose clock disagrees with their caller's are cut down to the caller's interval.
#[test]
fn test_children_are_clamped_into_parent() {
    let mut builder = ScenarioBuilder::new();
    builder.add_span("root", None, TimeInterval::new(0.0, 10.0));
    builder.add_span("outlives", Some("root"), TimeInterval::new(5.0, 20.0));
    builder.add_span("early", Some("root"), TimeInterval::new(-3.0, 2.0));
    builder.add_span("after", Some("root"), TimeInterval::new(12.0, 15.0));
    builder.add_span("nested", Some("outlives"), TimeInterval::new(8.0, 30.0));
    let tree = builder.build();

    let interval = |id: &str| {
        let node = tree.node(index(&tree, id));
        (node.start, node.end)
    };
    assert_eq!(interval("root"), (0.0, 10.0));
    assert_eq!(interval("outlives"), (5.0, 10.0));
    assert_eq!(interval("early"), (0.0, 2.0));
    assert_eq!(interval("after"), (10.0, 10.0));
    assert_eq!(interval("nested"), (8.0, 10.0));

    let session = ReplaySession::new(tree, ReplayConfig::default()).expect("Valid config");
    assert!(!session.status().is_degraded());
    assert_normalized(session.tree(), 1);
    let (root_start, root_end) = rendered(session.tree(), "root");
    let (child_start, child_end) = rendered(session.tree(), "outlives");
    assert!(root_start <= child_start && child_end <= root_end);
}

#[test]
fn test_delayed_timestamps() {
    let mut node = TraceNode::new("a", "A", "B", "B.run", 10.0, 12.0);
    node.start_delay = 2;
    node.end_delay = 3;

    assert_eq!(node.delayed_start(5.0), 20.0);
    assert_eq!(node.delayed_end(5.0), 27.0);
}

#[test]
fn test_export_rendered() {
    let mut builder = ScenarioBuilder::new();
    builder.add_span("root", None, TimeInterval::new(0.0, 100.0));
    builder.add_span("a", Some("root"), TimeInterval::instant(10.0));
    let mut tree = builder.build();

    compute_delays(&mut tree, 1).expect("No cycles");
    apply_delays(&mut tree, 1);
    let exported = export_rendered(&tree);

    assert_eq!(exported.len(), 2);
    assert_eq!(exported[0].id, "root");
    assert_eq!(exported[0].parent_id, None);
    assert_eq!((exported[0].start, exported[0].end), (0.0, 102.0));
    assert_eq!(exported[1].id, "a");
    assert_eq!(exported[1].parent_id.as_deref(), Some("root"));
    assert_eq!((exported[1].start, exported[1].end), (10.0, 11.0));
    assert_eq!(exported[1].method_ref, "a");
    assert_eq!(exported[1].target_id, "class_a");
}
