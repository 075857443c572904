//! Pre-order traversal over a [TraceTree].
//!
//! Every reachable node is handed to the callback exactly once, a parent always before its
//! children. Child edges that loop back to an already visited node are skipped, the delay
//! computation is the place where such loops are reported.

use crate::types::{NodeIndex, TraceNode, TraceTree};

pub fn accept<F>(tree: &TraceTree, mut visit: F)
where
    F: FnMut(NodeIndex, &TraceNode),
{
    for index in preorder(tree) {
        visit(index, tree.node(index));
    }
}

pub fn accept_mut<F>(tree: &mut TraceTree, mut visit: F)
where
    F: FnMut(NodeIndex, &mut TraceNode),
{
    for index in preorder(tree) {
        visit(index, tree.node_mut(index));
    }
}

/// Indexes of all reachable nodes in visiting order.
pub fn preorder(tree: &TraceTree) -> Vec<NodeIndex> {
    let mut seen = vec![false; tree.node_count()];
    let mut order = Vec::with_capacity(tree.node_count());

    // Reversed so that the first root/child is popped first
    let mut stack: Vec<NodeIndex> = tree.roots().iter().rev().copied().collect();
    while let Some(index) = stack.pop() {
        if seen[index] {
            continue;
        }
        seen[index] = true;
        order.push(index);
        stack.extend(tree.node(index).children.iter().rev().copied());
    }

    order
}
