//! One replay of one trace: owns the tree, the settings and the playback cursor, and reruns the
//! normalization pipeline whenever a setting that affects timing changes.

use crate::apply::apply_delays;
use crate::config::{
    validate_delay_unit, validate_speed, validate_window, ConfigError, ReplayConfig,
};
use crate::delay::{compute_delays, CycleDetected, DelayStats};
use crate::playback::{ActiveNode, Playback, PlaybackState};
use crate::prune::{prune, SelectionWindow};
use crate::task_timer::TaskTimer;
use crate::types::{TimePoint, TraceTree};

/// Outcome of the last normalization. A degraded replay still plays, but the renderer should
/// warn that some calls may be too short or overlap their parents.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizationStatus {
    Normalized(DelayStats),
    Degraded(CycleDetected),
}

impl NormalizationStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, NormalizationStatus::Degraded(_))
    }

    pub fn stats(&self) -> &DelayStats {
        match self {
            NormalizationStatus::Normalized(stats) => stats,
            NormalizationStatus::Degraded(cycle) => &cycle.stats,
        }
    }
}

#[derive(Debug)]
pub struct ReplaySession {
    /// Tree as delivered by the tree builder, pruning always starts from here.
    source: TraceTree,
    tree: TraceTree,
    config: ReplayConfig,
    playback: Playback,
    status: NormalizationStatus,
}

impl ReplaySession {
    pub fn new(source: TraceTree, config: ReplayConfig) -> Result<ReplaySession, ConfigError> {
        config.validate()?;

        let mut session = ReplaySession {
            tree: source.clone(),
            playback: Playback::new(
                &source,
                config.speed,
                config.eager_expansion,
                config.keep_afterimage,
            ),
            source,
            config,
            status: NormalizationStatus::Normalized(DelayStats::default()),
        };
        session.recompute();
        Ok(session)
    }

    /// Prune, compute delays, apply them and rewind playback to the new timeline.
    fn recompute(&mut self) {
        let t = TaskTimer::new("Normalizing trace timing");

        let mut tree = self.source.clone();
        if let Some(window) = &self.config.selection_window {
            prune(&mut tree, window);
        }

        self.status = match compute_delays(&mut tree, self.config.delay_unit) {
            Ok(stats) => {
                log::info!(
                    "Normalized {} calls, {} of them stretched",
                    stats.visited,
                    stats.stretched
                );
                NormalizationStatus::Normalized(stats)
            }
            Err(cycle) => {
                log::warn!("Trace timing is degraded: {}", cycle);
                NormalizationStatus::Degraded(cycle)
            }
        };
        apply_delays(&mut tree, self.config.delay_unit);

        self.tree = tree;
        self.playback.reset_timeline(&self.tree);

        t.stop();
    }

    pub fn tree(&self) -> &TraceTree {
        &self.tree
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    pub fn status(&self) -> &NormalizationStatus {
        &self.status
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    pub fn state(&self) -> &PlaybackState {
        self.playback.state()
    }

    pub fn active_nodes(&self) -> &[ActiveNode] {
        self.playback.active_nodes()
    }

    pub fn play(&mut self) {
        self.playback.play();
    }

    pub fn pause(&mut self) {
        self.playback.pause();
    }

    pub fn stop(&mut self) {
        self.playback.stop();
    }

    pub fn tick(&mut self, delta_time: TimePoint) {
        self.playback.tick(delta_time, &self.tree);
    }

    pub fn scrub(&mut self, time: TimePoint) {
        self.playback.scrub(time, &self.tree);
    }

    /// Changes the delay unit and recomputes the timing. Stops playback.
    pub fn set_unit(&mut self, delay_unit: u32) -> Result<(), ConfigError> {
        self.config.delay_unit = validate_delay_unit(delay_unit)?;
        self.recompute();
        Ok(())
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<(), ConfigError> {
        self.config.speed = validate_speed(speed)?;
        self.playback.set_speed(speed);
        Ok(())
    }

    pub fn set_eager_expansion(&mut self, eager_expansion: bool) {
        self.config.eager_expansion = eager_expansion;
        self.playback.set_eager_expansion(eager_expansion, &self.tree);
    }

    pub fn set_afterimage(&mut self, keep_afterimage: bool) {
        self.config.keep_afterimage = keep_afterimage;
        self.playback.set_keep_afterimage(keep_afterimage);
    }

    /// Restricts the replay to calls inside `window` (or lifts the restriction with `None`).
    /// Recomputes the timing and stops playback.
    pub fn set_selection_window(
        &mut self,
        window: Option<SelectionWindow>,
    ) -> Result<(), ConfigError> {
        if let Some(window) = &window {
            validate_window(window)?;
        }
        self.config.selection_window = window;
        self.recompute();
        Ok(())
    }
}
