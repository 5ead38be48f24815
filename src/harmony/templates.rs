//! Chord template bank: 12 roots x 11 qualities of unit pitch-class vectors.

use std::sync::OnceLock;

use crate::audio::chroma::{dot, normalize, PitchClassVector, PITCH_CLASSES, PITCH_CLASS_NAMES};

const OCTAVE_WEIGHT: f32 = 0.1;
const FIFTH_WEIGHT: f32 = 0.05;
const ROOT_WEIGHT: f32 = 0.2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChordQuality {
    Major,
    Minor,
    Dominant7,
    Major7,
    Minor7,
    Diminished,
    Augmented,
    Sus2,
    Sus4,
    Sixth,
    MinorSixth,
}

impl ChordQuality {
    pub const ALL: [ChordQuality; 11] = [
        ChordQuality::Major,
        ChordQuality::Minor,
        ChordQuality::Dominant7,
        ChordQuality::Major7,
        ChordQuality::Minor7,
        ChordQuality::Diminished,
        ChordQuality::Augmented,
        ChordQuality::Sus2,
        ChordQuality::Sus4,
        ChordQuality::Sixth,
        ChordQuality::MinorSixth,
    ];

    /// Semitone offsets from the root.
    pub fn intervals(self) -> &'static [usize] {
        match self {
            ChordQuality::Major => &[0, 4, 7],
            ChordQuality::Minor => &[0, 3, 7],
            ChordQuality::Dominant7 => &[0, 4, 7, 10],
            ChordQuality::Major7 => &[0, 4, 7, 11],
            ChordQuality::Minor7 => &[0, 3, 7, 10],
            ChordQuality::Diminished => &[0, 3, 6],
            ChordQuality::Augmented => &[0, 4, 8],
            ChordQuality::Sus2 => &[0, 2, 7],
            ChordQuality::Sus4 => &[0, 5, 7],
            ChordQuality::Sixth => &[0, 4, 7, 9],
            ChordQuality::MinorSixth => &[0, 3, 7, 9],
        }
    }

    /// Label suffix appended to the root name; major is the bare root.
    pub fn suffix(self) -> &'static str {
        match self {
            ChordQuality::Major => "",
            ChordQuality::Minor => "min",
            ChordQuality::Dominant7 => "7",
            ChordQuality::Major7 => "maj7",
            ChordQuality::Minor7 => "min7",
            ChordQuality::Diminished => "dim",
            ChordQuality::Augmented => "aug",
            ChordQuality::Sus2 => "sus2",
            ChordQuality::Sus4 => "sus4",
            ChordQuality::Sixth => "6",
            ChordQuality::MinorSixth => "m6",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChordTemplate {
    pub name: String,
    pub root: usize,
    pub quality: ChordQuality,
    pub vector: PitchClassVector,
}

impl ChordTemplate {
    pub fn new(root: usize, quality: ChordQuality) -> Self {
        let root = root % PITCH_CLASSES;
        let mut vector = [0.0f32; PITCH_CLASSES];
        for &interval in quality.intervals() {
            let pc = (root + interval) % PITCH_CLASSES;
            vector[pc] = 1.0;
            // octave and fifth overtones
            vector[pc] += OCTAVE_WEIGHT;
            vector[(pc + 7) % PITCH_CLASSES] += FIFTH_WEIGHT;
        }
        vector[root] += ROOT_WEIGHT;
        normalize(&mut vector);

        Self {
            name: chord_name(root, quality),
            root,
            quality,
            vector,
        }
    }

    pub fn score(&self, chroma: &PitchClassVector) -> f32 {
        dot(&self.vector, chroma)
    }
}

pub fn chord_name(root: usize, quality: ChordQuality) -> String {
    format!("{}{}", PITCH_CLASS_NAMES[root % PITCH_CLASSES], quality.suffix())
}

/// Immutable bank in root-major, then quality, order.
#[derive(Debug)]
pub struct TemplateBank {
    templates: Vec<ChordTemplate>,
}

impl TemplateBank {
    pub fn build() -> Self {
        let templates = (0..PITCH_CLASSES)
            .flat_map(|root| {
                ChordQuality::ALL
                    .iter()
                    .map(move |&quality| ChordTemplate::new(root, quality))
            })
            .collect();
        Self { templates }
    }

    /// Process-wide bank, built on first use.
    pub fn global() -> &'static TemplateBank {
        static BANK: OnceLock<TemplateBank> = OnceLock::new();
        BANK.get_or_init(|| {
            let bank = TemplateBank::build();
            log::debug!("Built chord template bank: {} templates", bank.len());
            bank
        })
    }

    pub fn templates(&self) -> &[ChordTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ChordTemplate> {
        self.templates.get(index)
    }

    pub fn lookup(&self, root: usize, quality: ChordQuality) -> &ChordTemplate {
        let q = ChordQuality::ALL
            .iter()
            .position(|&candidate| candidate == quality)
            .unwrap_or(0);
        &self.templates[(root % PITCH_CLASSES) * ChordQuality::ALL.len() + q]
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.templates.iter().position(|t| t.name == name)
    }
}
