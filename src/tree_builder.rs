//! Turns a flat list of spans into a [TraceTree].

use std::collections::HashMap;

use crate::types::{NodeIndex, TimePoint, TraceNode, TraceTree};
use crate::visitor;

/// One timed operation as delivered by the trace source.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SpanRecord {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub start: TimePoint,
    pub end: TimePoint,
    #[serde(default)]
    pub method_ref: String,
    /// Entity (class, service) the span executes in.
    #[serde(default)]
    pub target_id: String,
}

impl SpanRecord {
    pub fn new(id: &str, parent_id: Option<&str>, start: TimePoint, end: TimePoint) -> SpanRecord {
        SpanRecord {
            id: id.to_string(),
            parent_id: parent_id.map(str::to_string),
            start,
            end,
            method_ref: id.to_string(),
            target_id: String::new(),
        }
    }
}

const UNVISITED: u8 = 0;
const IN_PROGRESS: u8 = 1;
const DONE: u8 = 2;

/// Builds the call tree. Spans whose parent is not part of the input become top-level nodes,
/// children keep the order in which they appear in `spans` and are clamped into their parent's
/// interval.
pub fn build_tree(spans: &[SpanRecord]) -> TraceTree {
    let mut records: Vec<SpanRecord> = Vec::with_capacity(spans.len());
    let mut record_by_id: HashMap<&str, usize> = HashMap::new();
    for span in spans {
        if record_by_id.contains_key(span.id.as_str()) {
            log::warn!("Dropping duplicate span with id {}", span.id);
            continue;
        }
        record_by_id.insert(span.id.as_str(), records.len());

        let mut record = span.clone();
        if record.end < record.start {
            log::warn!(
                "Span {} ends before it starts ({} < {}), clamping its end",
                record.id,
                record.end,
                record.start
            );
            record.end = record.start;
        }
        records.push(record);
    }

    let mut parents: Vec<Option<usize>> = records
        .iter()
        .map(|record| {
            record
                .parent_id
                .as_deref()
                .and_then(|parent_id| record_by_id.get(parent_id).copied())
                .filter(|&parent| records[parent].id != record.id)
        })
        .collect();
    break_parent_loops(&records, &mut parents);

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    let mut top_level = Vec::new();
    for (i, parent) in parents.iter().enumerate() {
        match parent {
            Some(parent) => children[*parent].push(i),
            None => top_level.push(i),
        }
    }

    let mut tree = TraceTree::new();
    // (record, parent node)
    let mut stack: Vec<(usize, Option<NodeIndex>)> =
        top_level.iter().rev().map(|&i| (i, None)).collect();
    while let Some((i, parent_node)) = stack.pop() {
        let record = &records[i];
        let (source_id, start, end) = match parent_node {
            Some(parent) => {
                let parent = tree.node(parent);
                let (start, end) = clamp_into_parent(record, parent);
                (parent.target_id.clone(), start, end)
            }
            None => (record.target_id.clone(), record.start, record.end),
        };
        let node = TraceNode::new(
            record.id.clone(),
            source_id,
            record.target_id.clone(),
            record.method_ref.clone(),
            start,
            end,
        );
        let index = tree.add_node(node, parent_node);
        stack.extend(children[i].iter().rev().map(|&child| (child, Some(index))));
    }

    log::debug!(
        "Built trace tree with {} nodes ({} top-level)",
        tree.node_count(),
        tree.roots().len()
    );
    tree
}

/// Clock skew between services can make a callee start before or end after its caller.
/// Such spans are cut down to the caller's interval.
fn clamp_into_parent(record: &SpanRecord, parent: &TraceNode) -> (TimePoint, TimePoint) {
    let start = record.start.max(parent.start).min(parent.end);
    let end = record.end.max(start).min(parent.end);
    if start != record.start || end != record.end {
        log::warn!(
            "Span {} [{}, {}] is not inside its parent {} [{}, {}], clamping it to [{}, {}]",
            record.id,
            record.start,
            record.end,
            parent.id,
            parent.start,
            parent.end,
            start,
            end
        );
    }
    (start, end)
}

/// Spans lying on a loop of parent ids are detached from their parent and become top-level.
fn break_parent_loops(records: &[SpanRecord], parents: &mut [Option<usize>]) {
    let mut state = vec![UNVISITED; parents.len()];
    for start in 0..parents.len() {
        let mut path: Vec<usize> = Vec::new();
        let mut current = Some(start);
        while let Some(i) = current {
            match state[i] {
                DONE => break,
                IN_PROGRESS => {
                    // `i` closes a loop, everything on the path from `i` onwards is part of it
                    let loop_begin = path.iter().position(|&p| p == i).unwrap_or(0);
                    for &member in &path[loop_begin..] {
                        log::warn!(
                            "Span {} is part of a parent id loop, treating it as top-level",
                            records[member].id
                        );
                        parents[member] = None;
                    }
                    break;
                }
                _ => {
                    state[i] = IN_PROGRESS;
                    path.push(i);
                    current = parents[i];
                }
            }
        }
        for i in path {
            state[i] = DONE;
        }
    }
}

/// Every reachable node with its rendered timestamps, in traversal order.
pub fn export_rendered(tree: &TraceTree) -> Vec<SpanRecord> {
    let mut records = Vec::with_capacity(tree.node_count());
    visitor::accept(tree, |_, node| {
        records.push(SpanRecord {
            id: node.id.clone(),
            parent_id: node.parent().map(|parent| tree.node(parent).id.clone()),
            start: node.rendered_start,
            end: node.rendered_end,
            method_ref: node.method_ref.clone(),
            target_id: node.target_id.clone(),
        });
    });
    records
}
