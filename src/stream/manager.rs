use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::config::StreamConfig;

use super::protocol::{decode_pcm16, parse_client_message, ClientMessage, ServerMessage};
use super::session::StreamSession;

/// Live sessions keyed by connection id.
///
/// The map lock is only held to find, insert or remove a session, never while
/// audio is analyzed. Each session has its own lock.
pub struct SessionManager {
    config: StreamConfig,
    sessions: RwLock<HashMap<String, Arc<Mutex<StreamSession>>>>,
}

impl SessionManager {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register `id`, replacing any previous session with the same id.
    pub fn connect(&self, id: &str) {
        let session = Arc::new(Mutex::new(StreamSession::new(id, &self.config)));
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.insert(id.to_string(), session);
            log::info!("Stream session {} connected ({} active)", id, sessions.len());
        }
    }

    pub fn disconnect(&self, id: &str) -> bool {
        let removed = match self.sessions.write() {
            Ok(mut sessions) => sessions.remove(id),
            Err(_) => return false,
        };
        match removed {
            Some(session) => {
                if let Ok(mut session) = session.lock() {
                    session.close();
                }
                log::info!("Stream session {} disconnected", id);
                true
            }
            None => false,
        }
    }

    fn session(&self, id: &str) -> Option<Arc<Mutex<StreamSession>>> {
        self.sessions.read().ok()?.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handle one raw JSON message. Malformed or unknown messages yield nothing.
    pub fn handle(&self, id: &str, raw: &str) -> Vec<ServerMessage> {
        match parse_client_message(raw) {
            Ok(message) => self.handle_message(id, message),
            Err(err) => {
                log::warn!("Session {}: ignoring message ({})", id, err);
                Vec::new()
            }
        }
    }

    pub fn handle_message(&self, id: &str, message: ClientMessage) -> Vec<ServerMessage> {
        if let ClientMessage::Ping = message {
            return vec![ServerMessage::Pong];
        }

        let Some(session) = self.session(id) else {
            log::warn!("Message for unknown session {}", id);
            return Vec::new();
        };
        let Ok(mut session) = session.lock() else {
            log::warn!("Session {} is poisoned", id);
            return Vec::new();
        };

        match message {
            ClientMessage::Ping => vec![ServerMessage::Pong],
            ClientMessage::Clear => {
                session.clear();
                vec![ServerMessage::Cleared]
            }
            ClientMessage::AudioChunk { data, timestamp } => match decode_pcm16(&data) {
                Ok(samples) => session.push(&samples, timestamp).into_iter().collect(),
                Err(err) => {
                    log::warn!("Session {}: dropping chunk at {:.2}s ({})", id, timestamp, err);
                    Vec::new()
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::protocol::encode_pcm16;
    use crate::stream::session::SessionState;

    fn chunk(samples: &[f32], timestamp: f64) -> String {
        serde_json::json!({
            "type": "audio_chunk",
            "data": encode_pcm16(samples),
            "timestamp": timestamp,
        })
        .to_string()
    }

    fn state(manager: &SessionManager, id: &str) -> SessionState {
        manager.session(id).unwrap().lock().unwrap().state()
    }

    #[test]
    fn control_messages() {
        let manager = SessionManager::new(StreamConfig::default());
        manager.connect("a");
        assert_eq!(manager.handle("a", r#"{"type":"ping"}"#), vec![ServerMessage::Pong]);
        assert_eq!(manager.handle("a", r#"{"type":"clear"}"#), vec![ServerMessage::Cleared]);
        assert!(manager.handle("a", r#"{"type":"dance"}"#).is_empty());
        assert!(manager.handle("a", "{").is_empty());
    }

    #[test]
    fn chunks_accumulate_then_emit() {
        let manager = SessionManager::new(StreamConfig::default());
        manager.connect("a");

        assert!(manager.handle("a", &chunk(&vec![0.0; 4410], 0.2)).is_empty());
        assert_eq!(state(&manager, "a"), SessionState::Accumulating);

        let out = manager.handle("a", &chunk(&vec![0.0; 8820], 0.6));
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], ServerMessage::Chord { timestamp, .. } if *timestamp == 0.6));
        assert_eq!(state(&manager, "a"), SessionState::Emitting);

        manager.handle("a", r#"{"type":"clear"}"#);
        assert_eq!(state(&manager, "a"), SessionState::Connected);
    }

    #[test]
    fn bad_chunk_keeps_session_alive() {
        let manager = SessionManager::new(StreamConfig::default());
        manager.connect("a");
        let bad = r#"{"type":"audio_chunk","data":"***","timestamp":1.0}"#;
        assert!(manager.handle("a", bad).is_empty());
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.handle("a", r#"{"type":"ping"}"#), vec![ServerMessage::Pong]);
    }

    #[test]
    fn sessions_are_independent() {
        let manager = SessionManager::new(StreamConfig::default());
        manager.connect("a");
        manager.connect("b");
        assert_eq!(manager.len(), 2);

        manager.handle("a", &chunk(&vec![0.0; 4410], 0.2));
        assert_eq!(state(&manager, "a"), SessionState::Accumulating);
        assert_eq!(state(&manager, "b"), SessionState::Connected);

        assert!(manager.disconnect("a"));
        assert!(!manager.disconnect("a"));
        assert_eq!(manager.len(), 1);
        assert!(manager.handle("a", &chunk(&vec![0.0; 22050], 1.0)).is_empty());
    }

    #[test]
    fn concurrent_connects() {
        let manager = std::sync::Arc::new(SessionManager::new(StreamConfig::default()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let manager = manager.clone();
                std::thread::spawn(move || manager.connect(&format!("c{}", i)))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(manager.len(), 8);
    }

    #[test]
    fn busy_session_does_not_block_the_map() {
        let manager = Arc::new(SessionManager::new(StreamConfig::default()));
        manager.connect("busy");

        // hold the session as a long analysis would
        let busy = manager.session("busy").unwrap();
        let guard = busy.lock().unwrap();

        let worker = {
            let manager = manager.clone();
            std::thread::spawn(move || manager.handle("busy", &chunk(&vec![0.0; 22050], 1.0)))
        };
        std::thread::sleep(std::time::Duration::from_millis(50));

        manager.connect("newcomer");
        assert_eq!(manager.handle("newcomer", r#"{"type":"clear"}"#), vec![ServerMessage::Cleared]);
        assert!(manager.disconnect("newcomer"));
        assert_eq!(manager.len(), 1);

        drop(guard);
        assert_eq!(worker.join().unwrap().len(), 1);
        assert_eq!(state(&manager, "busy"), SessionState::Emitting);
    }

    #[test]
    fn disconnect_during_analysis_closes_session() {
        let manager = Arc::new(SessionManager::new(StreamConfig::default()));
        manager.connect("a");
        let held = manager.session("a").unwrap();
        let guard = held.lock().unwrap();

        // removal does not wait for the session lock holder
        let disconnecter = {
            let manager = manager.clone();
            std::thread::spawn(move || manager.disconnect("a"))
        };
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while !manager.is_empty() {
            assert!(std::time::Instant::now() < deadline, "session was not removed");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        drop(guard);
        assert!(disconnecter.join().unwrap());
        assert_eq!(held.lock().unwrap().state(), SessionState::Disconnected);
    }
}
