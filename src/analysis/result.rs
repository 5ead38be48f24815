use serde::{Deserialize, Serialize};

pub const NO_CHORD: &str = "N.C.";

/// One labeled time span of the chord timeline, in seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChordSegment {
    pub start: f32,
    pub end: f32,
    pub chord: String,
    pub confidence: f32,
}

impl ChordSegment {
    pub fn new(start: f32, end: f32, chord: impl Into<String>, confidence: f32) -> Self {
        Self {
            start,
            end,
            chord: chord.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn no_chord(start: f32, end: f32) -> Self {
        Self::new(start, end, NO_CHORD, 0.0)
    }

    pub fn duration(&self) -> f32 {
        self.end - self.start
    }

    /// Seconds shared with `[start, end)`.
    pub fn overlap(&self, start: f32, end: f32) -> f32 {
        (self.end.min(end) - self.start.max(start)).max(0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Major,
    Minor,
}

impl Scale {
    pub fn as_str(self) -> &'static str {
        match self {
            Scale::Major => "major",
            Scale::Minor => "minor",
        }
    }
}

/// Output contract shared by the precise and fast paths.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub tempo: f32,
    pub meter: u8,
    pub key: String,
    pub scale: Scale,
    pub chords: Vec<ChordSegment>,
    pub simple_chords: Vec<ChordSegment>,
    /// Set when vocal separation preceded analysis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrumental_path: Option<String>,
}

impl Default for AnalysisResult {
    /// Result for empty or silent audio.
    fn default() -> Self {
        Self {
            tempo: 0.0,
            meter: 4,
            key: "C".to_string(),
            scale: Scale::Major,
            chords: Vec::new(),
            simple_chords: Vec::new(),
            instrumental_path: None,
        }
    }
}
