use crate::types::{NodeIndex, TimePoint, TraceNode, TraceTree};

/// Time range selected by the user, only calls lying completely inside it are replayed.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SelectionWindow {
    pub start: TimePoint,
    pub end: TimePoint,
}

impl SelectionWindow {
    pub fn new(start: TimePoint, end: TimePoint) -> SelectionWindow {
        SelectionWindow { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start.is_finite() && self.end.is_finite() && self.start <= self.end
    }

    pub fn contains(&self, node: &TraceNode) -> bool {
        self.start <= node.start && node.end <= self.end
    }
}

/// Drops every call (with its whole subtree) whose original interval isn't inside `window`.
/// Has to run on a tree without delays applied. Returns the number of removed child edges.
pub fn prune(tree: &mut TraceTree, window: &SelectionWindow) -> usize {
    let mut removed = 0;

    let mut roots = std::mem::take(tree.roots_mut());
    roots.retain(|&root| {
        let keep = window.contains(tree.node(root));
        if !keep {
            removed += 1;
        }
        keep
    });
    *tree.roots_mut() = roots;

    // Children are cut before descending, so removed subtrees are never walked
    let mut seen = vec![false; tree.node_count()];
    let mut stack: Vec<NodeIndex> = tree.roots().to_vec();
    while let Some(index) = stack.pop() {
        if seen[index] {
            continue;
        }
        seen[index] = true;

        let mut children = std::mem::take(&mut tree.node_mut(index).children);
        let before = children.len();
        children.retain(|&child| window.contains(tree.node(child)));
        removed += before - children.len();
        stack.extend(children.iter().copied());
        tree.node_mut(index).children = children;
    }

    log::debug!(
        "Pruned {} subtrees outside of [{}, {}]",
        removed,
        window.start,
        window.end
    );
    removed
}
