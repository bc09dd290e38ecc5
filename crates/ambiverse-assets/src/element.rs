//! Sound element descriptors.
//!
//! A sound element is one configured unit of potential playback: what to
//! play, how it is triggered, and which concurrency class it counts against.

use std::collections::BTreeMap;

use ambiverse_common::{Category, ElementId};
use serde::{Deserialize, Serialize};

use crate::distribution::DistributionData;
use crate::error::{DescriptorError, DescriptorResult};
use crate::sound::WeightedSound;

/// How a triggered element plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackMode {
    /// Plays once and completes on its own.
    OneShot,
    /// Loops until cut off or restarted by its trigger policy.
    Looping,
    /// Held for as long as the scene is active.
    Continuous,
}

impl PlaybackMode {
    /// Whether the engine should loop the sound.
    #[must_use]
    pub const fn loops(self) -> bool {
        matches!(self, Self::Looping | Self::Continuous)
    }
}

/// Closed interval in seconds, sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalRange {
    /// Shortest wait.
    pub min: f64,
    /// Longest wait.
    pub max: f64,
}

impl IntervalRange {
    /// Create an interval range.
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Fixed interval.
    #[must_use]
    pub const fn fixed(seconds: f64) -> Self {
        Self::new(seconds, seconds)
    }

    /// Sample a wait uniformly from `[min, max]`.
    pub fn sample(&self, rng: &mut fastrand::Rng) -> f64 {
        self.min + (self.max - self.min) * rng.f64()
    }

    fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min >= 0.0 && self.min <= self.max
    }
}

/// When an element fires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TriggerPolicy {
    /// Fire whenever the randomized interval elapses.
    Interval(IntervalRange),
    /// Fire with `probability` per `window` seconds, evaluated every tick.
    Chance {
        /// Probability of firing over one window.
        probability: f64,
        /// Window length in seconds.
        window: f64,
    },
    /// Keep exactly one instance alive while the scene is active.
    AlwaysActive,
}

impl TriggerPolicy {
    /// Short name used in diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Interval(_) => "interval",
            Self::Chance { .. } => "chance",
            Self::AlwaysActive => "always-active",
        }
    }
}

/// Hints passed through to the audio engine. The scheduler does not
/// interpret these beyond picking a sound and a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementHints {
    /// Interchangeable sounds and their weights.
    pub sounds: Vec<WeightedSound>,
    /// Element volume multiplier.
    pub volume: f32,
    /// Placement around the listener. `None` plays unpositioned.
    pub distribution: Option<DistributionData>,
    /// Opaque engine parameters.
    pub params: BTreeMap<String, f32>,
}

impl Default for ElementHints {
    fn default() -> Self {
        Self {
            sounds: Vec::new(),
            volume: 1.0,
            distribution: None,
            params: BTreeMap::new(),
        }
    }
}

/// Immutable playback rules for one sound element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundElement {
    /// Stable ID, unique within the scene.
    pub id: ElementId,
    /// Designer-facing name.
    #[serde(default)]
    pub name: String,
    /// Playback mode.
    pub mode: PlaybackMode,
    /// Trigger policy.
    pub trigger: TriggerPolicy,
    /// Concurrency class.
    pub category: Category,
    /// Admission priority; higher wins.
    #[serde(default)]
    pub priority: i32,
    /// Allow more than one concurrent instance.
    #[serde(default)]
    pub polyphonic: bool,
    /// Expected playback length of a one-shot, used to detect stale voices.
    #[serde(default)]
    pub expected_duration: Option<f64>,
    /// Engine pass-through data.
    #[serde(default)]
    pub hints: ElementHints,
}

impl SoundElement {
    /// Create an element.
    #[must_use]
    pub fn new(id: ElementId, mode: PlaybackMode, trigger: TriggerPolicy, category: impl Into<Category>) -> Self {
        Self {
            id,
            name: String::new(),
            mode,
            trigger,
            category: category.into(),
            priority: 0,
            polyphonic: false,
            expected_duration: None,
            hints: ElementHints::default(),
        }
    }

    /// One-shot element fired on a randomized interval.
    #[must_use]
    pub fn one_shot(id: u32, interval: IntervalRange, category: impl Into<Category>) -> Self {
        Self::new(ElementId::new(id), PlaybackMode::OneShot, TriggerPolicy::Interval(interval), category)
    }

    /// Continuous layer held while the scene is active.
    #[must_use]
    pub fn continuous(id: u32, category: impl Into<Category>) -> Self {
        Self::new(ElementId::new(id), PlaybackMode::Continuous, TriggerPolicy::AlwaysActive, category)
    }

    /// Looping element restarted on a randomized interval.
    #[must_use]
    pub fn looping(id: u32, restart: IntervalRange, category: impl Into<Category>) -> Self {
        Self::new(ElementId::new(id), PlaybackMode::Looping, TriggerPolicy::Interval(restart), category)
    }

    /// With name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// With priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// With polyphony.
    #[must_use]
    pub fn with_polyphonic(mut self, polyphonic: bool) -> Self {
        self.polyphonic = polyphonic;
        self
    }

    /// With trigger policy.
    #[must_use]
    pub fn with_trigger(mut self, trigger: TriggerPolicy) -> Self {
        self.trigger = trigger;
        self
    }

    /// With expected duration (seconds).
    #[must_use]
    pub fn with_expected_duration(mut self, seconds: f64) -> Self {
        self.expected_duration = Some(seconds);
        self
    }

    /// Add a weighted sound.
    #[must_use]
    pub fn with_sound(mut self, sound: &str, weight: u32) -> Self {
        self.hints.sounds.push(WeightedSound::new(sound, weight));
        self
    }

    /// With volume multiplier.
    #[must_use]
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.hints.volume = volume;
        self
    }

    /// With distribution data.
    #[must_use]
    pub fn with_distribution(mut self, distribution: DistributionData) -> Self {
        self.hints.distribution = Some(distribution);
        self
    }

    /// With an opaque engine parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: f32) -> Self {
        self.hints.params.insert(key.into(), value);
        self
    }

    /// Validate the element's rules.
    pub fn validate(&self) -> DescriptorResult<()> {
        let allowed = match (self.mode, &self.trigger) {
            (PlaybackMode::OneShot | PlaybackMode::Looping, TriggerPolicy::AlwaysActive) => false,
            (PlaybackMode::Continuous, policy) => matches!(policy, TriggerPolicy::AlwaysActive),
            _ => true,
        };
        if !allowed {
            return Err(DescriptorError::TriggerModeMismatch {
                element: self.id,
                mode: self.mode,
                trigger: self.trigger.name(),
            });
        }

        match self.trigger {
            TriggerPolicy::Interval(range) if !range.is_valid() => {
                return Err(DescriptorError::InvalidInterval {
                    element: self.id,
                    min: range.min,
                    max: range.max,
                });
            },
            TriggerPolicy::Chance { probability, window }
                if !(0.0..=1.0).contains(&probability) || !(window > 0.0 && window.is_finite()) =>
            {
                return Err(DescriptorError::InvalidChance {
                    element: self.id,
                    probability,
                    window,
                });
            },
            _ => {},
        }

        if let Some(zero) = self.hints.sounds.iter().find(|s| s.weight == 0) {
            return Err(DescriptorError::ZeroWeight {
                element: self.id,
                sound: zero.sound.as_str().to_string(),
            });
        }

        if !(self.hints.volume >= 0.0 && self.hints.volume.is_finite()) {
            return Err(DescriptorError::InvalidVolume {
                element: self.id,
                volume: self.hints.volume,
            });
        }

        if let Some(duration) = self.expected_duration {
            if !(duration > 0.0 && duration.is_finite()) {
                return Err(DescriptorError::InvalidDuration {
                    element: self.id,
                    duration,
                });
            }
        }

        Ok(())
    }
}
