use std::collections::VecDeque;

use crate::audio::chroma::{self, ChromaConfig};
use crate::audio::decode::AudioData;
use crate::config::StreamConfig;
use crate::harmony::classify::classify_window;
use crate::harmony::templates::TemplateBank;

use super::protocol::ServerMessage;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Buffer empty.
    Connected,
    /// Some audio, not yet enough to classify.
    Accumulating,
    /// Enough audio; every chunk produces a chord event.
    Emitting,
    Disconnected,
}

/// Incremental analyzer over a rolling window of the latest samples.
pub struct StreamSession {
    id: String,
    sample_rate: u32,
    capacity: usize,
    min_samples: usize,
    buffer: VecDeque<f32>,
    state: SessionState,
    last_chord: Option<String>,
    chroma: ChromaConfig,
}

impl StreamSession {
    pub fn new(id: impl Into<String>, config: &StreamConfig) -> Self {
        let capacity = ((config.window_secs * config.sample_rate as f32) as usize).max(1);
        let min_samples = ((config.min_secs * config.sample_rate as f32) as usize).clamp(1, capacity);
        Self {
            id: id.into(),
            sample_rate: config.sample_rate,
            capacity,
            min_samples,
            buffer: VecDeque::with_capacity(capacity),
            state: SessionState::Connected,
            last_chord: None,
            // short windows: no HPSS, no temporal median
            chroma: ChromaConfig {
                median_window: 1,
                separate_harmonic: false,
                ..ChromaConfig::default()
            },
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn last_chord(&self) -> Option<&str> {
        self.last_chord.as_deref()
    }

    /// Append samples, dropping the oldest past the window, and classify once enough is buffered.
    pub fn push(&mut self, samples: &[f32], timestamp: f64) -> Option<ServerMessage> {
        if self.state == SessionState::Disconnected {
            return None;
        }

        self.buffer.extend(samples.iter().copied());
        let excess = self.buffer.len().saturating_sub(self.capacity);
        self.buffer.drain(..excess);

        if self.buffer.is_empty() {
            self.state = SessionState::Connected;
            return None;
        }
        if self.buffer.len() < self.min_samples {
            self.state = SessionState::Accumulating;
            return None;
        }
        self.state = SessionState::Emitting;

        let audio = AudioData::new(self.buffer.iter().copied().collect(), self.sample_rate);
        let features = chroma::extract(&audio, &self.chroma);
        let result = classify_window(&features, TemplateBank::global());
        log::debug!(
            "Session {}: {} at {:.2}s ({:.2})",
            self.id,
            result.label,
            timestamp,
            result.confidence
        );

        self.last_chord = Some(result.label.clone());
        Some(ServerMessage::Chord {
            chord: result.label,
            confidence: result.confidence,
            timestamp,
        })
    }

    pub fn clear(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.buffer.clear();
        self.last_chord = None;
        self.state = SessionState::Connected;
    }

    pub fn close(&mut self) {
        self.buffer.clear();
        self.state = SessionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::result::NO_CHORD;
    use std::f32::consts::PI;

    const SR: u32 = 22050;

    fn triad(secs: f32, offset: usize) -> Vec<f32> {
        // A major: A3, C#4, E4
        let n = (secs * SR as f32) as usize;
        (offset..offset + n)
            .map(|i| {
                let t = i as f32 / SR as f32;
                [220.0f32, 277.18, 329.63]
                    .iter()
                    .map(|f| (2.0 * PI * f * t).sin())
                    .sum::<f32>()
                    / 3.0
            })
            .collect()
    }

    #[test]
    fn walks_through_states() {
        let mut session = StreamSession::new("s1", &StreamConfig::default());
        assert_eq!(session.state(), SessionState::Connected);

        assert!(session.push(&triad(0.25, 0), 0.25).is_none());
        assert_eq!(session.state(), SessionState::Accumulating);

        let event = session.push(&triad(0.3, 5512), 0.55).unwrap();
        assert_eq!(session.state(), SessionState::Emitting);
        match event {
            ServerMessage::Chord { chord, confidence, timestamp } => {
                assert_eq!(chord, "A");
                assert!(confidence > 0.5 && confidence <= 1.0);
                assert_eq!(timestamp, 0.55);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(session.last_chord(), Some("A"));
    }

    #[test]
    fn buffer_is_capped_to_window() {
        let mut session = StreamSession::new("s1", &StreamConfig::default());
        for i in 0..6 {
            session.push(&vec![0.0; 11025], i as f64 * 0.5);
        }
        assert_eq!(session.buffered(), 22050);
    }

    #[test]
    fn silence_emits_no_chord() {
        let mut session = StreamSession::new("s1", &StreamConfig::default());
        match session.push(&vec![0.0; 22050], 1.0) {
            Some(ServerMessage::Chord { chord, confidence, .. }) => {
                assert_eq!(chord, NO_CHORD);
                assert_eq!(confidence, 0.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn clear_and_close() {
        let mut session = StreamSession::new("s1", &StreamConfig::default());
        session.push(&vec![0.1; 22050], 1.0);
        session.clear();
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.buffered(), 0);
        assert!(session.last_chord().is_none());

        session.close();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.push(&vec![0.1; 22050], 2.0).is_none());
        session.clear();
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}
