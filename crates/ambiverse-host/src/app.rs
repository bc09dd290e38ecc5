//! Application driver.
//!
//! Wires a simulated audio engine to the runtime, plays a soundscape's cue
//! timeline and ticks at a fixed rate until the configured duration.

use std::collections::BTreeMap;
use std::sync::Arc;

use ambiverse_core::{event_channel, Ambiverse, LifecycleEvent, SimulatedEngine, TickReport, VoiceState};
use anyhow::Result;
use glam::Vec3;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::HostConfig;
use crate::soundscape::{CueAction, Soundscape};
use crate::timing::TickClock;

/// Totals gathered over a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Ticks run
    pub ticks: u64,
    /// Simulated seconds
    pub seconds: f64,
    /// Candidates admitted
    pub admitted: usize,
    /// Candidates rejected
    pub rejected: usize,
    /// Rejections by reason
    pub rejections: BTreeMap<String, usize>,
    /// Terminal transitions by state
    pub terminal: BTreeMap<String, usize>,
    /// Highest concurrent voice count
    pub peak_voices: usize,
    /// Voices held at the end
    pub final_voices: usize,
    /// Requests the engine received
    pub engine_requests: usize,
    /// Cues that could not be applied
    pub failed_cues: usize,
}

impl RunSummary {
    fn record(&mut self, report: &TickReport, voices: usize) {
        self.ticks = report.tick;
        self.seconds = report.now;
        self.admitted += report.admitted.len();
        self.rejected += report.rejected.len();
        for (_, reason) in &report.rejected {
            *self.rejections.entry(rejection_kind(reason).to_string()).or_default() += 1;
        }
        self.record_transitions(&report.lifecycle);
        self.peak_voices = self.peak_voices.max(voices);
        self.final_voices = voices;
    }

    fn record_transitions(&mut self, events: &[LifecycleEvent]) {
        for event in events.iter().filter(|e| e.state.is_terminal()) {
            *self.terminal.entry(format!("{:?}", event.state)).or_default() += 1;
        }
    }

    /// Terminal transitions into a state.
    #[must_use]
    pub fn terminal_count(&self, state: VoiceState) -> usize {
        self.terminal.get(&format!("{state:?}")).copied().unwrap_or(0)
    }
}

fn rejection_kind(reason: &ambiverse_core::AdmissionRejected) -> &'static str {
    use ambiverse_core::AdmissionRejected as R;
    match reason {
        R::SceneNotAccepting { .. } => "scene_not_accepting",
        R::UnknownScene { .. } => "unknown_scene",
        R::UnknownElement { .. } => "unknown_element",
        R::SystemCapReached { .. } => "system_cap",
        R::SceneCapReached { .. } => "scene_cap",
        R::CategoryCapReached { .. } => "category_cap",
        R::ElementAlreadyActive { .. } => "element_active",
    }
}

/// Host state: runtime, engine and the cue cursor.
pub struct App {
    config: HostConfig,
    soundscape: Soundscape,
    ambiverse: Ambiverse,
    engine: Arc<SimulatedEngine>,
    next_cue: usize,
    summary: RunSummary,
}

impl App {
    /// Build the runtime and register the soundscape's parameters.
    pub fn new(config: HostConfig, soundscape: Soundscape) -> Result<Self> {
        let (sender, events) = event_channel();
        let engine = Arc::new(SimulatedEngine::new(sender, config.simulation.clone()));
        let mut ambiverse = Ambiverse::new(config.runtime.clone(), engine.clone(), events);

        for parameter in &soundscape.parameters {
            ambiverse.register_parameter(parameter.clone())?;
        }

        Ok(Self {
            config,
            soundscape,
            ambiverse,
            engine,
            next_cue: 0,
            summary: RunSummary::default(),
        })
    }

    /// The runtime.
    #[must_use]
    pub fn ambiverse(&self) -> &Ambiverse {
        &self.ambiverse
    }

    /// Apply due cues, advance the engine and run one tick.
    pub fn step(&mut self, dt: f64) -> TickReport {
        self.apply_cues(self.ambiverse.now());
        self.engine.advance(dt);
        let report = self.ambiverse.advance(dt);

        if self.config.log_transitions {
            for event in &report.lifecycle {
                info!(
                    t = format_args!("{:.2}", event.at),
                    voice = %event.voice,
                    scene = %event.scene,
                    element = %event.element,
                    state = ?event.state,
                    cause = ?event.cause,
                    "Voice"
                );
            }
        }
        for scene in &report.activated {
            info!(scene = %scene, t = report.now, "Scene active");
        }
        for scene in &report.deactivated {
            info!(scene = %scene, t = report.now, "Scene ended");
        }

        self.summary.record(&report, self.ambiverse.active_voice_count());
        self.summary.engine_requests = self.engine.requests().len();
        report
    }

    fn apply_cues(&mut self, now: f64) {
        while let Some(cue) = self.soundscape.cues.get(self.next_cue) {
            if cue.at > now {
                break;
            }
            let action = cue.action.clone();
            self.next_cue += 1;
            match self.apply(&action) {
                Ok(events) => self.summary.record_transitions(&events),
                Err(e) => {
                    warn!(at = now, ?action, "Cue failed: {e}");
                    self.summary.failed_cues += 1;
                },
            }
        }
    }

    fn apply(&mut self, action: &CueAction) -> Result<Vec<LifecycleEvent>> {
        debug!(?action, "Cue");
        let events = match action {
            CueAction::Activate { scene } => {
                let descriptor = self
                    .soundscape
                    .scene(*scene)
                    .ok_or_else(|| anyhow::anyhow!("no scene {scene} in soundscape"))?;
                self.ambiverse.activate_scene(descriptor.clone())?;
                Vec::new()
            },
            CueAction::Deactivate { scene } => self.ambiverse.deactivate_scene(*scene)?,
            CueAction::PushComposite { name } => {
                let composite = self
                    .soundscape
                    .composite(name)
                    .ok_or_else(|| anyhow::anyhow!("no composite {name:?} in soundscape"))?;
                self.ambiverse.push_composite(composite)?
            },
            CueAction::PopComposite { name } => {
                let composite = self
                    .soundscape
                    .composite(name)
                    .ok_or_else(|| anyhow::anyhow!("no composite {name:?} in soundscape"))?;
                self.ambiverse.pop_composite(composite)
            },
            CueAction::SetParameter { parameter, value } => {
                let normalized = self.ambiverse.set_parameter(parameter.clone(), *value)?;
                info!(parameter = %parameter, raw = value, normalized, "Parameter set");
                Vec::new()
            },
            CueAction::Retrigger { scene, element } => {
                self.ambiverse.retrigger(*scene, *element)?;
                Vec::new()
            },
            CueAction::MoveListener { position } => {
                self.ambiverse.set_listener(Vec3::from_array(*position));
                Vec::new()
            },
        };
        Ok(events)
    }

    /// Run to the configured duration.
    pub fn run(&mut self) -> RunSummary {
        let total = self.config.tick_count();
        let dt = self.config.tick_dt();
        info!(ticks = total, dt, realtime = self.config.realtime, "Running soundscape");

        if self.config.realtime {
            let mut clock = TickClock::new(self.config.tick_rate);
            clock.reset();
            while self.ambiverse.tick_count() < total {
                let elapsed = clock.delta_time();
                let due = clock.accumulate(elapsed);
                for _ in 0..due {
                    if self.ambiverse.tick_count() >= total {
                        break;
                    }
                    self.step(clock.fixed_dt());
                }
                clock.sleep_remainder();
            }
        } else {
            for _ in 0..total {
                self.step(dt);
            }
        }

        self.summary.clone()
    }
}

/// Load the soundscape named by the config (or the demo) and run it.
pub fn run(config: HostConfig) -> Result<RunSummary> {
    let soundscape = match &config.soundscape {
        Some(path) => Soundscape::load_from(path)?,
        None => {
            info!("No soundscape configured, using built-in demo");
            Soundscape::demo()
        },
    };

    let mut app = App::new(config, soundscape)?;
    let summary = app.run();

    info!(
        ticks = summary.ticks,
        seconds = format_args!("{:.1}", summary.seconds),
        admitted = summary.admitted,
        rejected = summary.rejected,
        completed = summary.terminal_count(VoiceState::Completed),
        cut_off = summary.terminal_count(VoiceState::Cutoff),
        failed = summary.terminal_count(VoiceState::Failed),
        peak_voices = summary.peak_voices,
        final_voices = summary.final_voices,
        scenes = ?app.ambiverse().scene_ids(),
        "Run complete"
    );
    info!("Summary: {}", serde_json::to_string(&summary)?);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambiverse_assets::{IntervalRange, SceneDescriptor, SoundElement};
    use ambiverse_common::SceneId;

    use crate::soundscape::Cue;

    fn config(duration: f64) -> HostConfig {
        HostConfig {
            duration,
            tick_rate: 10,
            ..HostConfig::default()
        }
    }

    #[test]
    fn test_demo_runs_clean() {
        let mut app = App::new(config(70.0), Soundscape::demo()).expect("app");
        let summary = app.run();

        assert_eq!(summary.ticks, 700);
        assert_eq!(summary.failed_cues, 0);
        assert!(summary.admitted > 0);
        assert!(summary.peak_voices <= app.ambiverse().config().max_voices);
        // Storm front replaced the forest, then the forest came back
        assert!(summary.terminal_count(VoiceState::Cutoff) > 0);
        assert_eq!(app.ambiverse().scene_ids(), vec![SceneId::new(1)]);
    }

    #[test]
    fn test_same_config_same_summary() {
        let first = App::new(config(30.0), Soundscape::demo()).expect("app").run();
        let second = App::new(config(30.0), Soundscape::demo()).expect("app").run();
        assert_eq!(first, second);
    }

    #[test]
    fn test_failed_cue_is_counted() {
        let scene = SceneDescriptor::new(SceneId::new(7), 2)
            .with_element(SoundElement::one_shot(1, IntervalRange::new(1.0, 2.0), "misc"));
        let soundscape = Soundscape {
            scenes: vec![scene],
            cues: vec![
                Cue {
                    at: 0.0,
                    action: CueAction::Activate { scene: SceneId::new(7) },
                },
                Cue {
                    at: 0.5,
                    action: CueAction::Activate { scene: SceneId::new(7) },
                },
                Cue {
                    at: 1.0,
                    action: CueAction::Deactivate { scene: SceneId::new(99) },
                },
            ],
            ..Soundscape::default()
        };

        let mut app = App::new(config(2.0), soundscape).expect("app");
        let summary = app.run();
        assert_eq!(summary.failed_cues, 2);
    }

    #[test]
    fn test_listener_cue() {
        let soundscape = Soundscape {
            cues: vec![Cue {
                at: 0.0,
                action: CueAction::MoveListener {
                    position: [1.0, 2.0, 3.0],
                },
            }],
            ..Soundscape::default()
        };
        let mut app = App::new(config(0.1), soundscape).expect("app");
        app.run();
        assert_eq!(app.ambiverse().listener(), Vec3::new(1.0, 2.0, 3.0));
    }
}
