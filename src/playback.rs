//! Frame-driven cursor over a normalized trace.
//!
//! The host calls [Playback::tick] once per animation frame. Each refresh recomputes which calls
//! are running at the cursor and how far along their animation they are, the renderer draws
//! whatever [Playback::active_nodes] returns.

use crate::types::{NodeIndex, TimePoint, TraceNode, TraceTree};
use crate::visitor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum PlaybackMode {
    #[default]
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PlaybackState {
    pub cursor: TimePoint,
    pub mode: PlaybackMode,
    /// Multiplier applied to the frame time, 0.1 - 1.0.
    pub speed: f64,
    /// A call finishes its animation as soon as its first callee starts.
    pub eager_expansion: bool,
    /// Only read by the renderer: keep finished calls drawn.
    pub keep_afterimage: bool,
}

/// Rendered time range covered by the trace.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Timeline {
    pub start: TimePoint,
    pub end: TimePoint,
}

impl Timeline {
    pub fn from_tree(tree: &TraceTree) -> Option<Timeline> {
        tree.time_bounds().map(|(start, end)| Timeline { start, end })
    }

    pub fn length(&self) -> TimePoint {
        self.end - self.start
    }
}

/// What the renderer needs to draw one running call.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ActiveNode {
    pub index: NodeIndex,
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    /// 0.0 when the call starts, 1.0 when it has finished.
    pub progress: f64,
}

/// End of the node's animation. With eager expansion a call hands off to its earliest callee.
pub fn effective_end(tree: &TraceTree, node: &TraceNode, eager_expansion: bool) -> TimePoint {
    if !eager_expansion {
        return node.rendered_end;
    }
    node.children
        .iter()
        .map(|&child| tree.node(child).rendered_start)
        .reduce(f64::min)
        .unwrap_or(node.rendered_end)
}

/// Position of `cursor` inside `[start, end]`, clamped to `[0, 1]`.
/// Zero-length intervals count as done once the cursor reaches them.
pub fn progress(cursor: TimePoint, start: TimePoint, end: TimePoint) -> f64 {
    if end <= start {
        return if cursor >= start { 1.0 } else { 0.0 };
    }
    ((cursor - start) / (end - start)).clamp(0.0, 1.0)
}

/// All nodes running at `cursor`, in traversal order.
pub fn active_nodes_at(
    tree: &TraceTree,
    cursor: TimePoint,
    eager_expansion: bool,
) -> Vec<ActiveNode> {
    let mut active = Vec::new();
    visitor::accept(tree, |index, node| {
        let start = node.rendered_start;
        let end = effective_end(tree, node, eager_expansion);
        if start <= cursor && cursor <= end {
            active.push(ActiveNode {
                index,
                id: node.id.clone(),
                source_id: node.source_id.clone(),
                target_id: node.target_id.clone(),
                progress: progress(cursor, start, end),
            });
        }
    });
    active
}

#[derive(Debug, Clone)]
pub struct Playback {
    state: PlaybackState,
    timeline: Option<Timeline>,
    /// Active nodes of the last refreshed frame.
    active: Vec<ActiveNode>,
}

impl Playback {
    pub fn new(
        tree: &TraceTree,
        speed: f64,
        eager_expansion: bool,
        keep_afterimage: bool,
    ) -> Playback {
        let timeline = Timeline::from_tree(tree);
        Playback {
            state: PlaybackState {
                cursor: timeline.map(|t| t.start).unwrap_or(0.0),
                mode: PlaybackMode::Stopped,
                speed,
                eager_expansion,
                keep_afterimage,
            },
            timeline,
            active: Vec::new(),
        }
    }

    /// Picks up the bounds of a recomputed tree. Stops playback.
    pub fn reset_timeline(&mut self, tree: &TraceTree) {
        self.timeline = Timeline::from_tree(tree);
        self.stop();
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn mode(&self) -> PlaybackMode {
        self.state.mode
    }

    pub fn cursor(&self) -> TimePoint {
        self.state.cursor
    }

    pub fn timeline(&self) -> Option<Timeline> {
        self.timeline
    }

    pub fn active_nodes(&self) -> &[ActiveNode] {
        &self.active
    }

    pub fn play(&mut self) {
        let Some(timeline) = self.timeline else {
            log::debug!("Nothing to play, the trace is empty");
            return;
        };
        if self.state.cursor >= timeline.end {
            self.state.cursor = timeline.start;
        }
        self.state.mode = PlaybackMode::Playing;
    }

    pub fn pause(&mut self) {
        if self.state.mode == PlaybackMode::Playing {
            self.state.mode = PlaybackMode::Paused;
        }
    }

    /// Allowed from any state. Rewinds and forgets everything that was active.
    pub fn stop(&mut self) {
        self.state.mode = PlaybackMode::Stopped;
        self.state.cursor = self.timeline.map(|t| t.start).unwrap_or(0.0);
        self.active.clear();
    }

    /// Advances the cursor by `delta_time * speed` while playing. Reaching the end of the
    /// timeline pauses playback there.
    pub fn tick(&mut self, delta_time: TimePoint, tree: &TraceTree) {
        if self.state.mode != PlaybackMode::Playing || delta_time.is_nan() || delta_time <= 0.0 {
            return;
        }
        self.state.cursor += delta_time * self.state.speed;

        if let Some(timeline) = self.timeline {
            if self.state.cursor >= timeline.end {
                self.state.cursor = timeline.end;
                self.state.mode = PlaybackMode::Paused;
            }
        }
        self.refresh(tree);
    }

    /// Moves the cursor without changing the mode.
    pub fn scrub(&mut self, time: TimePoint, tree: &TraceTree) {
        if !time.is_finite() {
            log::warn!("Ignoring scrub to non-finite time {}", time);
            return;
        }
        self.state.cursor = time;
        self.refresh(tree);
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.state.speed = speed;
    }

    pub fn set_eager_expansion(&mut self, eager_expansion: bool, tree: &TraceTree) {
        self.state.eager_expansion = eager_expansion;
        if self.state.mode != PlaybackMode::Stopped || !self.active.is_empty() {
            self.refresh(tree);
        }
    }

    pub fn set_keep_afterimage(&mut self, keep_afterimage: bool) {
        self.state.keep_afterimage = keep_afterimage;
    }

    fn refresh(&mut self, tree: &TraceTree) {
        self.active = active_nodes_at(tree, self.state.cursor, self.state.eager_expansion);
    }
}
