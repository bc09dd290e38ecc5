//! Turns admitted candidates into engine requests.

use ambiverse_assets::{select_weighted, SceneDescriptor, SoundElement};
use ambiverse_common::VoiceId;
use glam::Vec3;
use tracing::warn;

use crate::engine::PlaybackRequest;
use crate::parameters::Scalars;

/// Picks sounds and positions for admitted voices.
pub struct RequestBuilder {
    rng: fastrand::Rng,
    listener: Vec3,
}

impl RequestBuilder {
    /// Create a builder with its own random stream.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
            listener: Vec3::ZERO,
        }
    }

    /// Listener position used as the distribution origin.
    #[must_use]
    pub fn listener(&self) -> Vec3 {
        self.listener
    }

    /// Move the listener.
    pub fn set_listener(&mut self, position: Vec3) {
        self.listener = position;
    }

    /// Build the request for one voice.
    pub fn build(
        &mut self,
        voice: VoiceId,
        scene: &SceneDescriptor,
        element: &SoundElement,
        scalars: Scalars,
    ) -> PlaybackRequest {
        let sound = select_weighted(&element.hints.sounds, &mut self.rng).cloned();
        if sound.is_none() && !element.hints.sounds.is_empty() {
            warn!(scene = %scene.id, element = %element.id, "No selectable sound");
        }

        let position = element
            .hints
            .distribution
            .as_ref()
            .map(|distribution| distribution.sample_around(self.listener, &mut self.rng));

        PlaybackRequest {
            voice,
            scene: scene.id,
            element: element.id,
            sound,
            volume: element.hints.volume * scalars.volume,
            position,
            looping: element.mode.loops(),
            params: element.hints.params.clone(),
        }
    }
}
