use std::collections::HashMap;

/// Milliseconds since epoch
pub type TimePoint = f64;

pub const NANOSECONDS_PER_MILLISECOND: f64 = 1_000_000.0;

pub fn time_point_from_unix_nano(unix_nano: u64) -> TimePoint {
    unix_nano as f64 / NANOSECONDS_PER_MILLISECOND
}

pub fn time_point_to_utc_string(time: TimePoint) -> String {
    let date_time = chrono::DateTime::from_timestamp_nanos((time * NANOSECONDS_PER_MILLISECOND) as i64);
    date_time.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Position of a node in the arena owned by [TraceTree].
pub type NodeIndex = usize;

#[derive(Debug, Clone)]
pub struct TraceNode {
    pub id: String,
    /// Entity that issued the call (the caller's class/service).
    pub source_id: String,
    /// Entity the call executes in.
    pub target_id: String,
    pub method_ref: String,

    // Original timestamps, never touched after construction
    pub start: TimePoint,
    pub end: TimePoint,

    /// Number of delay units added to `start`
    pub start_delay: u64,
    /// Number of delay units added to `end`
    pub end_delay: u64,

    // Written by the delay applicator, equal to start/end until then
    pub rendered_start: TimePoint,
    pub rendered_end: TimePoint,

    pub children: Vec<NodeIndex>,
    /// Immediate parent first, top-level node last.
    pub ancestors: Vec<NodeIndex>,
}

impl TraceNode {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        method_ref: impl Into<String>,
        start: TimePoint,
        end: TimePoint,
    ) -> TraceNode {
        TraceNode {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            method_ref: method_ref.into(),
            start,
            end,
            start_delay: 0,
            end_delay: 0,
            rendered_start: start,
            rendered_end: end,
            children: Vec::new(),
            ancestors: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn parent(&self) -> Option<NodeIndex> {
        self.ancestors.first().copied()
    }

    /// Start shifted by the current delay count.
    pub fn delayed_start(&self, unit: TimePoint) -> TimePoint {
        self.start + self.start_delay as f64 * unit
    }

    /// End shifted by the current delay count.
    pub fn delayed_end(&self, unit: TimePoint) -> TimePoint {
        self.end + self.end_delay as f64 * unit
    }
}

/// The synthetic root of a trace. Nodes are stored in a flat arena and reference each other by
/// [NodeIndex], `roots` holds the top-level nodes.
#[derive(Debug, Clone, Default)]
pub struct TraceTree {
    nodes: Vec<TraceNode>,
    roots: Vec<NodeIndex>,
    index_by_id: HashMap<String, NodeIndex>,
}

impl TraceTree {
    pub fn new() -> TraceTree {
        TraceTree::default()
    }

    /// Adds a node to the arena. `parent == None` makes it a top-level node, otherwise the node is
    /// appended to the parent's children and inherits the parent's ancestor chain.
    pub fn add_node(&mut self, mut node: TraceNode, parent: Option<NodeIndex>) -> NodeIndex {
        let index = self.nodes.len();
        match parent {
            Some(parent_index) => {
                let parent_node = &mut self.nodes[parent_index];
                parent_node.children.push(index);
                node.ancestors = std::iter::once(parent_index)
                    .chain(parent_node.ancestors.iter().copied())
                    .collect();
            }
            None => {
                node.ancestors.clear();
                self.roots.push(index);
            }
        }
        self.index_by_id.entry(node.id.clone()).or_insert(index);
        self.nodes.push(node);
        index
    }

    /// Appends a child edge without updating any ancestor chain.
    /// Only useful for feeding deliberately malformed input (e.g. loops) to the algorithms.
    pub fn link_child(&mut self, parent: NodeIndex, child: NodeIndex) {
        self.nodes[parent].children.push(child);
    }

    pub fn roots(&self) -> &[NodeIndex] {
        &self.roots
    }

    pub fn roots_mut(&mut self) -> &mut Vec<NodeIndex> {
        &mut self.roots
    }

    pub fn node(&self, index: NodeIndex) -> &TraceNode {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: NodeIndex) -> &mut TraceNode {
        &mut self.nodes[index]
    }

    pub fn get(&self, index: NodeIndex) -> Option<&TraceNode> {
        self.nodes.get(index)
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index_by_id.get(id).copied()
    }

    pub fn node_by_id(&self, id: &str) -> Option<&TraceNode> {
        self.index_of(id).map(|index| &self.nodes[index])
    }

    /// Number of nodes in the arena, including nodes no longer reachable after pruning.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn nodes(&self) -> &[TraceNode] {
        &self.nodes
    }

    pub fn reset_delays(&mut self) {
        for node in &mut self.nodes {
            node.start_delay = 0;
            node.end_delay = 0;
            node.rendered_start = node.start;
            node.rendered_end = node.end;
        }
    }

    /// Earliest rendered start and latest rendered end over all reachable nodes.
    pub fn time_bounds(&self) -> Option<(TimePoint, TimePoint)> {
        let mut min_max: Option<(TimePoint, TimePoint)> = None;

        crate::visitor::accept(self, |_, node| match &mut min_max {
            Some((min_time, max_time)) => {
                *min_time = min_time.min(node.rendered_start);
                *max_time = max_time.max(node.rendered_end);
            }
            None => {
                min_max = Some((node.rendered_start, node.rendered_end));
            }
        });

        min_max
    }
}
