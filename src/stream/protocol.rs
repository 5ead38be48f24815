use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Client to server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    AudioChunk {
        /// Base64 of mono little-endian 16-bit PCM.
        data: String,
        #[serde(default)]
        timestamp: f64,
    },
    Ping,
    Clear,
}

/// Server to client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Chord {
        chord: String,
        confidence: f32,
        timestamp: f64,
    },
    Pong,
    Cleared,
}

pub fn parse_client_message(raw: &str) -> Result<ClientMessage> {
    serde_json::from_str(raw).map_err(|e| AnalysisError::Protocol(e.to_string()))
}

/// Decode a base64 PCM16 payload to samples in `[-1, 1)`. A trailing odd byte is dropped.
pub fn decode_pcm16(data: &str) -> Result<Vec<f32>> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| AnalysisError::Protocol(format!("bad base64: {}", e)))?;
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

pub fn encode_pcm16(samples: &[f32]) -> String {
    let bytes: Vec<u8> = samples
        .iter()
        .flat_map(|&s| ((s.clamp(-1.0, 1.0) * 32767.0) as i16).to_le_bytes())
        .collect();
    STANDARD.encode(bytes)
}
