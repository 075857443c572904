use crate::types::TraceTree;
use crate::visitor;

/// Turns delay counts into the timestamps used for playback:
/// `rendered = original + delay * unit` for both ends of every reachable node.
///
/// With `unit == 0` every rendered interval goes back to the original timestamps, whatever the
/// delay counts are.
pub fn apply_delays(tree: &mut TraceTree, unit: u32) {
    let unit = f64::from(unit);
    visitor::accept_mut(tree, |_, node| {
        node.rendered_start = node.delayed_start(unit);
        node.rendered_end = node.delayed_end(unit);
    });
}
