//! Cached path: external pre-trained detectors behind a content-keyed cache.

use std::path::Path;

use crate::analysis::result::{AnalysisResult, ChordSegment};
use crate::cache::{fingerprint, DetectionCache};
use crate::detector::{parse_key, DetectorSuite, RawChord};
use crate::error::Result;
use crate::harmony::meter::COMMON;
use crate::harmony::simplify::simplify;
use crate::harmony::smooth::merge_consecutive;

/// Confidence reported for every detector-produced segment.
pub const DETECTOR_CONFIDENCE: f32 = 0.95;
pub const FALLBACK_TEMPO: f32 = 120.0;
const FALLBACK_KEY: &str = "C major";
const TEMPO_FLOOR: f32 = 70.0;
const TEMPO_CEILING: f32 = 190.0;

/// Double or halve into 70..=190 bpm and round to a whole bpm.
pub fn normalize_tempo(tempo: f32) -> f32 {
    if !tempo.is_finite() || tempo <= 0.0 {
        return FALLBACK_TEMPO;
    }
    let mut tempo = tempo;
    while tempo < TEMPO_FLOOR {
        tempo *= 2.0;
    }
    while tempo > TEMPO_CEILING {
        tempo /= 2.0;
    }
    tempo.round()
}

pub struct FastAnalyzer<D: DetectorSuite> {
    detector: D,
    cache: DetectionCache,
}

impl<D: DetectorSuite> FastAnalyzer<D> {
    pub fn new(detector: D, cache: DetectionCache) -> Self {
        Self { detector, cache }
    }

    pub fn is_available(&self) -> bool {
        self.detector.is_available()
    }

    pub fn analyze(&self, path: &Path) -> Result<AnalysisResult> {
        let fp = fingerprint(path);
        log::info!("Fast analysis of {} (fingerprint {})", path.display(), &fp[..12.min(fp.len())]);

        let raw = self.chords(path, &fp)?;
        let (key, scale) = parse_key(&self.key(path, &fp));
        let tempo = self.tempo(path, &fp);

        let chords: Vec<ChordSegment> = raw
            .iter()
            .filter(|(start, end, _)| end > start)
            .map(|(start, end, label)| ChordSegment::new(*start, *end, label.as_str(), DETECTOR_CONFIDENCE))
            .collect();
        let simplified: Vec<ChordSegment> = chords
            .iter()
            .map(|s| ChordSegment::new(s.start, s.end, simplify(&s.chord), s.confidence))
            .collect();

        Ok(AnalysisResult {
            tempo,
            meter: COMMON,
            key,
            scale,
            chords: merge_consecutive(&chords),
            simple_chords: merge_consecutive(&simplified),
            instrumental_path: None,
        })
    }

    /// Chord detection failures are real failures; there is no sensible default.
    fn chords(&self, path: &Path, fp: &str) -> Result<Vec<RawChord>> {
        if let Some(chords) = self.cache.read_chords(fp) {
            log::debug!("Chord cache hit");
            return Ok(chords);
        }
        let chords = self.detector.detect_chords(path)?;
        self.cache.write_chords(fp, &chords);
        Ok(chords)
    }

    fn key(&self, path: &Path, fp: &str) -> String {
        if let Some(key) = self.cache.read_key(fp) {
            log::debug!("Key cache hit");
            return key;
        }
        match self.detector.detect_key(path) {
            Ok(key) => {
                self.cache.write_key(fp, &key);
                key
            }
            Err(err) => {
                log::warn!("Key detection failed ({}); using {}", err, FALLBACK_KEY);
                FALLBACK_KEY.to_string()
            }
        }
    }

    fn tempo(&self, path: &Path, fp: &str) -> f32 {
        if let Some(tempo) = self.cache.read_tempo(fp) {
            log::debug!("Tempo cache hit");
            return tempo;
        }
        match self.detector.detect_tempo(path) {
            Ok(raw) => {
                let tempo = normalize_tempo(raw);
                self.cache.write_tempo(fp, tempo);
                tempo
            }
            Err(err) => {
                log::warn!("Tempo detection failed ({}); using {}", err, FALLBACK_TEMPO);
                FALLBACK_TEMPO
            }
        }
    }
}
