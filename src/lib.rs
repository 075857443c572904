pub mod apply;
pub mod config;
pub mod delay;
pub mod otlp;
pub mod playback;
pub mod prune;
pub mod session;
pub mod task_timer;
pub mod tree_builder;
pub mod types;
pub mod visitor;

pub use config::{ConfigError, ReplayConfig};
pub use delay::{compute_delays, CycleDetected, DelayStats};
pub use playback::{ActiveNode, PlaybackMode, PlaybackState};
pub use session::{NormalizationStatus, ReplaySession};
pub use tree_builder::{build_tree, SpanRecord};
pub use types::{NodeIndex, TimePoint, TraceNode, TraceTree};
