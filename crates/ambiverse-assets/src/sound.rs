//! Weighted sound lists.
//!
//! An element can carry several interchangeable sounds. Each trigger picks
//! one of them at random, proportionally to its weight.

use serde::{Deserialize, Serialize};
use tracing::error;

/// Reference to a sound asset understood by the audio engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SoundRef(String);

impl SoundRef {
    /// Create a sound reference from an asset path or name.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Asset path or name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SoundRef {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// A sound together with its selection weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedSound {
    /// The sound asset.
    pub sound: SoundRef,
    /// Relative selection weight (at least 1).
    pub weight: u32,
}

impl WeightedSound {
    /// Create a weighted sound.
    #[must_use]
    pub fn new(sound: impl Into<SoundRef>, weight: u32) -> Self {
        Self {
            sound: sound.into(),
            weight,
        }
    }
}

/// Pick a sound from a weighted list.
///
/// Returns `None` when the list is empty or all weights are zero.
pub fn select_weighted<'a>(sounds: &'a [WeightedSound], rng: &mut fastrand::Rng) -> Option<&'a SoundRef> {
    if sounds.is_empty() {
        return None;
    }

    let total: u64 = sounds.iter().map(|s| u64::from(s.weight)).sum();
    if total == 0 {
        error!("select_weighted: total weight is zero");
        return None;
    }

    let roll = rng.u64(0..total);
    let mut accumulated = 0u64;
    for entry in sounds {
        accumulated += u64::from(entry.weight);
        if accumulated > roll {
            return Some(&entry.sound);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_weighted_empty() {
        let mut rng = fastrand::Rng::with_seed(1);
        assert!(select_weighted(&[], &mut rng).is_none());
    }

    #[test]
    fn test_select_weighted_zero_weights() {
        let mut rng = fastrand::Rng::with_seed(1);
        let sounds = [WeightedSound::new("a.ogg", 0), WeightedSound::new("b.ogg", 0)];
        assert!(select_weighted(&sounds, &mut rng).is_none());
    }

    #[test]
    fn test_select_weighted_skips_zero_weight_entries() {
        let mut rng = fastrand::Rng::with_seed(7);
        let sounds = [WeightedSound::new("never.ogg", 0), WeightedSound::new("always.ogg", 3)];
        for _ in 0..100 {
            let picked = select_weighted(&sounds, &mut rng).map(SoundRef::as_str);
            assert_eq!(picked, Some("always.ogg"));
        }
    }

    #[test]
    fn test_select_weighted_follows_weights() {
        let mut rng = fastrand::Rng::with_seed(42);
        let sounds = [WeightedSound::new("rare.ogg", 1), WeightedSound::new("common.ogg", 9)];

        let common = (0..10_000)
            .filter(|_| select_weighted(&sounds, &mut rng).map(SoundRef::as_str) == Some("common.ogg"))
            .count();

        // ~90% expected
        assert!(common > 8_500 && common < 9_500, "common picked {common} times");
    }
}
