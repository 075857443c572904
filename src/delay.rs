//! Computes per-node delay counts which stretch every call long enough to be visible.
//!
//! Two passes run one after another:
//! - [top_down_pass] sweeps the whole tree in chronological order. Whenever the current node (or
//!   one of its children) would be drawn shorter than one delay unit, everything that hasn't been
//!   processed yet is pushed one unit later and the current node's end is pushed with it.
//! - [bottom_up_pass] walks from the deepest nodes towards the top-level nodes and makes sure
//!   every ancestor ends at least one unit after each of its descendants.
//!
//! The passes only touch `start_delay`/`end_delay`, turning them into timestamps is done by
//! [crate::apply].

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::types::{NodeIndex, TimePoint, TraceNode, TraceTree};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DelayStats {
    /// Nodes processed by the top-down pass.
    pub visited: usize,
    pub leaves: usize,
    /// Nodes that end more delay units later than they start.
    pub stretched: usize,
    pub max_end_delay: u64,
}

/// A node was reached twice during the top-down sweep, the input isn't a tree.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error(
    "cycle detected: node {node_id} was reached twice, delays were computed for {} of the nodes only",
    stats.visited
)]
pub struct CycleDetected {
    pub node_id: String,
    pub index: NodeIndex,
    pub stats: DelayStats,
}

#[derive(Debug, Clone, Default)]
pub struct TopDownOutcome {
    /// Leaves in the order in which they were processed, seed for the bottom-up pass.
    pub leaves: Vec<NodeIndex>,
    pub visited: usize,
    pub cycle: Option<(NodeIndex, String)>,
}

/// Node waiting in the frontier, together with the delays it had when it was pushed.
///
/// Instead of incrementing every queued node when the sweep pushes the rest of the trace later,
/// the sweep bumps a global shift counter. A queued node's actual delay is the pushed delay plus
/// however much the counter grew since the push.
#[derive(Debug)]
struct FrontierEntry {
    index: NodeIndex,
    start: TimePoint,
    end: TimePoint,
    id: String,
    start_delay: u64,
    end_delay: u64,
    shift_at_push: u64,
}

impl FrontierEntry {
    fn new(
        index: NodeIndex,
        node: &TraceNode,
        start_delay: u64,
        end_delay: u64,
        shift: u64,
    ) -> Self {
        FrontierEntry {
            index,
            start: node.start,
            end: node.end,
            id: node.id.clone(),
            start_delay,
            end_delay,
            shift_at_push: shift,
        }
    }

    fn delays(&self, shift: u64) -> (u64, u64) {
        let lag = shift - self.shift_at_push;
        (self.start_delay + lag, self.end_delay + lag)
    }

    /// Ascending (start, end, id), index as the final tie-break.
    fn key_cmp(&self, other: &Self) -> Ordering {
        self.start
            .total_cmp(&other.start)
            .then_with(|| self.end.total_cmp(&other.end))
            .then_with(|| self.id.cmp(&other.id))
            .then_with(|| self.index.cmp(&other.index))
    }
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key_cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierEntry {}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierEntry {
    // Reversed, BinaryHeap is a max-heap and the earliest node has to come out first
    fn cmp(&self, other: &Self) -> Ordering {
        other.key_cmp(self)
    }
}

fn unit_length(unit: u32) -> TimePoint {
    TimePoint::from(unit)
}

fn delayed(time: TimePoint, delay: u64, unit: TimePoint) -> TimePoint {
    time + delay as f64 * unit
}

/// Chronological sweep over the whole tree, see the module docs.
///
/// Stops as soon as a node is reached a second time. Nodes that were never processed keep the
/// delays they had accumulated in the frontier up to that point.
pub fn top_down_pass(tree: &mut TraceTree, unit: u32) -> TopDownOutcome {
    let unit = unit_length(unit);
    let mut outcome = TopDownOutcome::default();

    let mut visited = vec![false; tree.node_count()];
    let mut shift: u64 = 0;
    let mut frontier = BinaryHeap::new();
    for &root in tree.roots() {
        let node = tree.node(root);
        frontier.push(FrontierEntry::new(
            root,
            node,
            node.start_delay,
            node.end_delay,
            shift,
        ));
    }

    while let Some(entry) = frontier.pop() {
        let head = entry.index;
        if visited[head] {
            let id = tree.node(head).id.clone();
            log::warn!("Node {} reached twice, aborting the top-down pass", id);
            outcome.cycle = Some((head, id));
            break;
        }
        visited[head] = true;
        outcome.visited += 1;

        let (start_delay, mut end_delay) = entry.delays(shift);
        let head_node = tree.node(head);
        let head_start = delayed(head_node.start, start_delay, unit);

        // Children inherit the head's stretching and join the frontier
        let children_shift = shift;
        let inherited_end_delay = end_delay;
        for &child in &head_node.children {
            frontier.push(FrontierEntry::new(
                child,
                tree.node(child),
                start_delay,
                inherited_end_delay,
                children_shift,
            ));
        }
        if head_node.is_leaf() {
            outcome.leaves.push(head);
        }

        if delayed(head_node.end, end_delay, unit) - head_start < unit {
            shift += 1;
            end_delay += 1;
        }

        // Children must not touch the head's boundaries
        for &child in &head_node.children {
            let child_node = tree.node(child);
            let lag = shift - children_shift;
            let child_start = delayed(child_node.start, start_delay + lag, unit);
            let child_end = delayed(child_node.end, inherited_end_delay + lag, unit);
            let head_end = delayed(head_node.end, end_delay, unit);
            if child_start - head_start < unit || head_end - child_end < unit {
                shift += 1;
                end_delay += 1;
            }
        }

        let head_node = tree.node_mut(head);
        head_node.start_delay = start_delay;
        head_node.end_delay = end_delay;
    }

    if outcome.cycle.is_some() {
        // Keep whatever the unvisited nodes accumulated while waiting
        for entry in frontier.into_vec() {
            if visited[entry.index] {
                continue;
            }
            let (start_delay, end_delay) = entry.delays(shift);
            let node = tree.node_mut(entry.index);
            node.start_delay = node.start_delay.max(start_delay);
            node.end_delay = node.end_delay.max(end_delay);
        }
    }

    outcome
}

/// Makes every ancestor of the given leaves end at least one unit after its descendants.
///
/// Only the leaves and their ancestors take part. They are settled deepest first, so by the time
/// a node raises its parent its own end delay is final and every node is handled once.
pub fn bottom_up_pass(tree: &mut TraceTree, leaves: &[NodeIndex]) {
    let mut included = vec![false; tree.node_count()];
    let mut order: Vec<NodeIndex> = Vec::new();
    for &leaf in leaves {
        if included[leaf] {
            continue;
        }
        included[leaf] = true;
        order.push(leaf);

        // Everything above an included node is already included
        for &ancestor in &tree.node(leaf).ancestors {
            if included[ancestor] {
                break;
            }
            included[ancestor] = true;
            order.push(ancestor);
        }
    }

    order.sort_by_key(|&index| (Reverse(tree.node(index).ancestors.len()), index));

    for index in order {
        let node = tree.node(index);
        let Some(parent) = node.parent() else {
            continue;
        };
        let required_end_delay = node.end_delay + 1;

        let parent_node = tree.node_mut(parent);
        parent_node.end_delay = parent_node.end_delay.max(required_end_delay);
    }
}

/// Resets all delays and runs both passes.
///
/// A detected cycle doesn't stop the bottom-up pass, it runs on the leaves found before the
/// sweep was aborted, the tree is left in a degraded but usable state.
pub fn compute_delays(tree: &mut TraceTree, unit: u32) -> Result<DelayStats, CycleDetected> {
    tree.reset_delays();

    let outcome = top_down_pass(tree, unit);
    bottom_up_pass(tree, &outcome.leaves);

    let mut stats = DelayStats {
        visited: outcome.visited,
        leaves: outcome.leaves.len(),
        ..Default::default()
    };
    crate::visitor::accept(tree, |_, node| {
        if node.end_delay > node.start_delay {
            stats.stretched += 1;
        }
        stats.max_end_delay = stats.max_end_delay.max(node.end_delay);
    });

    match outcome.cycle {
        Some((index, node_id)) => Err(CycleDetected {
            node_id,
            index,
            stats,
        }),
        None => Ok(stats),
    }
}
