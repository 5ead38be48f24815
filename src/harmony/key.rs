//! Global key by correlation with rotated Krumhansl-Schmuckler profiles.

use crate::analysis::result::Scale;
use crate::audio::chroma::{self, PitchClassVector, PITCH_CLASSES, PITCH_CLASS_NAMES};

/// Krumhansl-Schmuckler major profile, index 0 = tonic.
const MAJOR_PROFILE: [f32; PITCH_CLASSES] =
    [6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88];

/// Krumhansl-Schmuckler minor profile, index 0 = tonic.
const MINOR_PROFILE: [f32; PITCH_CLASSES] =
    [6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyEstimate {
    pub tonic: usize,
    pub scale: Scale,
}

impl KeyEstimate {
    pub fn name(&self) -> &'static str {
        PITCH_CLASS_NAMES[self.tonic % PITCH_CLASSES]
    }
}

impl Default for KeyEstimate {
    fn default() -> Self {
        Self {
            tonic: 0,
            scale: Scale::Major,
        }
    }
}

/// Profile shifted so that its tonic sits on `tonic`.
fn rotate(profile: &[f32; PITCH_CLASSES], tonic: usize) -> PitchClassVector {
    let mut out = [0.0f32; PITCH_CLASSES];
    for (i, &w) in profile.iter().enumerate() {
        out[(i + tonic) % PITCH_CLASSES] = w;
    }
    out
}

/// Best of 24 candidates; tonic 0..11, major before minor, first maximum wins.
pub fn estimate_key(features: &[PitchClassVector]) -> KeyEstimate {
    let mean = chroma::mean(features);
    if mean.iter().sum::<f32>() == 0.0 {
        return KeyEstimate::default();
    }

    let mut best_score = f32::NEG_INFINITY;
    let mut best = KeyEstimate::default();
    for tonic in 0..PITCH_CLASSES {
        for (profile, scale) in [(&MAJOR_PROFILE, Scale::Major), (&MINOR_PROFILE, Scale::Minor)] {
            let score = chroma::dot(&mean, &rotate(profile, tonic));
            if score > best_score {
                best_score = score;
                best = KeyEstimate { tonic, scale };
            }
        }
    }

    log::debug!("Key: {} {}", best.name(), best.scale.as_str());
    best
}
