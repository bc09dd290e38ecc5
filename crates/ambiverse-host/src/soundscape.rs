//! Soundscape definitions driven by the host.
//!
//! A soundscape bundles parameters, scenes, composites and a timeline of
//! cues (activations, parameter changes, listener moves). It is read from
//! JSON or built in.

use std::fs;
use std::path::Path;

use ambiverse_assets::{
    Composite, DistributionData, IntervalRange, Parameter, ParameterModifier, SceneDescriptor, SoundElement,
    TriggerPolicy,
};
use ambiverse_common::{ElementId, ParameterId, SceneId};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Something the host does to the runtime at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CueAction {
    /// Activate a scene by ID.
    Activate {
        /// Scene to activate
        scene: SceneId,
    },
    /// Deactivate a scene.
    Deactivate {
        /// Scene to deactivate
        scene: SceneId,
    },
    /// Push a composite by name.
    PushComposite {
        /// Composite name
        name: String,
    },
    /// Pop a composite by name.
    PopComposite {
        /// Composite name
        name: String,
    },
    /// Set a parameter's raw value.
    SetParameter {
        /// Parameter
        parameter: ParameterId,
        /// Raw value
        value: f32,
    },
    /// Restart an element.
    Retrigger {
        /// Owning scene
        scene: SceneId,
        /// Element
        element: ElementId,
    },
    /// Move the listener.
    MoveListener {
        /// New position
        position: [f32; 3],
    },
}

/// A timed cue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// Seconds from the start of the run.
    pub at: f64,
    /// What to do.
    #[serde(flatten)]
    pub action: CueAction,
}

/// Everything the host needs to run a soundscape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Soundscape {
    /// Parameters registered before the first tick.
    pub parameters: Vec<Parameter>,
    /// Scene library, addressable by cues.
    pub scenes: Vec<SceneDescriptor>,
    /// Composite library, addressable by name.
    pub composites: Vec<Composite>,
    /// Timeline.
    pub cues: Vec<Cue>,
}

impl Soundscape {
    /// Load a soundscape from a JSON file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let mut soundscape: Self =
            serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        soundscape.sort_cues();
        info!(
            scenes = soundscape.scenes.len(),
            composites = soundscape.composites.len(),
            cues = soundscape.cues.len(),
            "Loaded soundscape from {}",
            path.display()
        );
        Ok(soundscape)
    }

    /// Save as pretty JSON.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Scene by ID.
    #[must_use]
    pub fn scene(&self, id: SceneId) -> Option<&SceneDescriptor> {
        self.scenes.iter().find(|s| s.id == id)
    }

    /// Composite by name.
    #[must_use]
    pub fn composite(&self, name: &str) -> Option<&Composite> {
        self.composites.iter().find(|c| c.name == name)
    }

    /// Order cues by time, keeping authoring order for ties.
    pub fn sort_cues(&mut self) {
        self.cues.sort_by(|a, b| a.at.total_cmp(&b.at));
    }

    /// Built-in forest soundscape: wind bed, birds, a creaking loop and a
    /// storm composite that takes over halfway through.
    #[must_use]
    pub fn demo() -> Self {
        let wind = ParameterId::new("wind");
        let rain = ParameterId::new("rain");

        let forest = SceneDescriptor::new(SceneId::new(1), 6)
            .with_name("forest")
            .with_category_cap("birds", 3)
            .with_parameter(ParameterModifier::new(wind.clone()).with_volume_range(0.6, 1.0))
            .with_element(
                SoundElement::continuous(1, "bed")
                    .with_name("wind bed")
                    .with_priority(10)
                    .with_sound("wind_loop.ogg", 1),
            )
            .with_element(
                SoundElement::one_shot(2, IntervalRange::new(2.0, 6.0), "birds")
                    .with_name("songbird")
                    .with_polyphonic(true)
                    .with_priority(2)
                    .with_expected_duration(1.5)
                    .with_sound("bird_a.ogg", 3)
                    .with_sound("bird_b.ogg", 1)
                    .with_distribution(DistributionData::new(20.0, 20.0).with_vertical_range(6.0).with_vertical_offset(4.0)),
            )
            .with_element(
                SoundElement::one_shot(3, IntervalRange::new(0.0, 0.0), "birds")
                    .with_name("woodpecker")
                    .with_trigger(TriggerPolicy::Chance {
                        probability: 0.5,
                        window: 10.0,
                    })
                    .with_priority(1)
                    .with_sound("woodpecker.ogg", 1)
                    .with_distribution(DistributionData::new(30.0, 30.0)),
            )
            .with_element(
                SoundElement::looping(4, IntervalRange::new(8.0, 14.0), "creaks")
                    .with_name("creaking branch")
                    .with_sound("creak_loop.ogg", 1)
                    .with_volume(0.5),
            );

        let storm = SceneDescriptor::new(SceneId::new(2), 4)
            .with_name("storm")
            .with_density(1.5)
            .with_parameter(
                ParameterModifier::new(rain.clone())
                    .with_volume_range(0.3, 1.0)
                    .with_density_range(0.25, 2.0),
            )
            .with_element(
                SoundElement::continuous(1, "bed")
                    .with_name("rain bed")
                    .with_priority(10)
                    .with_sound("rain_loop.ogg", 1),
            )
            .with_element(
                SoundElement::one_shot(2, IntervalRange::new(6.0, 12.0), "thunder")
                    .with_name("thunder")
                    .with_priority(5)
                    .with_expected_duration(4.0)
                    .with_sound("thunder_near.ogg", 1)
                    .with_sound("thunder_far.ogg", 2)
                    .with_distribution(DistributionData::new(200.0, 200.0).with_vertical_range(50.0)),
            );

        let storm_front = Composite::new("storm front")
            .with_scene(storm.clone())
            .with_stop_non_composite(true);

        let cues = vec![
            Cue {
                at: 0.0,
                action: CueAction::Activate { scene: forest.id },
            },
            Cue {
                at: 10.0,
                action: CueAction::SetParameter {
                    parameter: wind.clone(),
                    value: 0.8,
                },
            },
            Cue {
                at: 15.0,
                action: CueAction::MoveListener {
                    position: [12.0, 0.0, -4.0],
                },
            },
            Cue {
                at: 20.0,
                action: CueAction::Retrigger {
                    scene: forest.id,
                    element: ElementId::new(4),
                },
            },
            Cue {
                at: 30.0,
                action: CueAction::PushComposite {
                    name: storm_front.name.clone(),
                },
            },
            Cue {
                at: 40.0,
                action: CueAction::SetParameter {
                    parameter: rain.clone(),
                    value: 1.0,
                },
            },
            Cue {
                at: 55.0,
                action: CueAction::PopComposite {
                    name: storm_front.name.clone(),
                },
            },
            Cue {
                at: 55.0,
                action: CueAction::Activate { scene: forest.id },
            },
        ];

        Self {
            parameters: vec![
                Parameter::new(wind, 0.0, 1.0).with_default(0.2),
                Parameter::new(rain, 0.0, 1.0).with_default(0.3),
            ],
            scenes: vec![forest, storm],
            composites: vec![storm_front],
            cues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_demo_is_valid() {
        let demo = Soundscape::demo();
        for scene in &demo.scenes {
            scene.validate().expect("demo scene validates");
        }
        for composite in &demo.composites {
            composite.validate().expect("demo composite validates");
        }
        for parameter in &demo.parameters {
            parameter.validate().expect("demo parameter validates");
        }
        assert!(demo.cues.windows(2).all(|w| w[0].at <= w[1].at));
    }

    #[test]
    fn test_demo_cues_resolve() {
        let demo = Soundscape::demo();
        for cue in &demo.cues {
            match &cue.action {
                CueAction::Activate { scene } | CueAction::Deactivate { scene } => {
                    assert!(demo.scene(*scene).is_some(), "unknown scene {scene}");
                },
                CueAction::PushComposite { name } | CueAction::PopComposite { name } => {
                    assert!(demo.composite(name).is_some(), "unknown composite {name}");
                },
                CueAction::SetParameter { parameter, .. } => {
                    assert!(demo.parameters.iter().any(|p| &p.id == parameter));
                },
                CueAction::Retrigger { scene, element } => {
                    let scene = demo.scene(*scene).expect("scene");
                    assert!(scene.element(*element).is_some());
                },
                CueAction::MoveListener { .. } => {},
            }
        }
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("forest.json");

        let demo = Soundscape::demo();
        demo.save_to(&path).expect("save");
        let loaded = Soundscape::load_from(&path).expect("load");
        assert_eq!(loaded, demo);
    }

    #[test]
    fn test_load_sorts_cues() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("cues.json");
        fs::write(
            &path,
            r#"{
                "cues": [
                    { "at": 5.0, "action": "deactivate", "scene": 1 },
                    { "at": 1.0, "action": "move_listener", "position": [1.0, 2.0, 3.0] }
                ]
            }"#,
        )
        .expect("write");

        let loaded = Soundscape::load_from(&path).expect("load");
        assert!(loaded.scenes.is_empty());
        assert_eq!(loaded.cues.len(), 2);
        assert!((loaded.cues[0].at - 1.0).abs() < f64::EPSILON);
        assert_eq!(loaded.cues[1].action, CueAction::Deactivate { scene: SceneId::new(1) });
    }

    #[test]
    fn test_load_missing_file_is_error() {
        assert!(Soundscape::load_from("/nonexistent/soundscape.json").is_err());
    }
}
