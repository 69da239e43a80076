//! codec.rs
//! Turns one framed payload (UTF-8 JSON) into a typed telemetry sample.
//! - the expected JSON shape is fixed by the receiver's Role, never inferred per message
//! - `frame_data` (base64 image) is decoded here; an undecodable image is dropped, positions are kept
//! - malformed payloads surface as DecodeError; the caller drops the message and carries on
//!
//! Head role:  `{"head_position": {"normalized_x": f, "normalized_y": f} | null, "frame_data": b64 | null}`
//! Hands role: `{"hand_positions": {"left": {..} | null, "right": {..} | null} | null, "frame_data": ..}`

use std::{fmt, str::FromStr};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Which body part(s) a receiver instance tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Head,
    Hands,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Head => "head",
            Role::Hands => "hands",
        }
    }

    /// Points a sample of this role can carry.
    pub fn tracked_points(&self) -> &'static [TrackedPoint] {
        match self {
            Role::Head => &[TrackedPoint::Head],
            Role::Hands => &[TrackedPoint::LeftHand, TrackedPoint::RightHand],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "head" => Ok(Role::Head),
            "hands" => Ok(Role::Hands),
            other => Err(format!("unknown role '{}' (expected 'head' or 'hands')", other)),
        }
    }
}

/// A single tracked point, as reported to the position consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackedPoint {
    Head,
    LeftHand,
    RightHand,
}

impl TrackedPoint {
    pub fn name(&self) -> &'static str {
        match self {
            TrackedPoint::Head => "head",
            TrackedPoint::LeftHand => "left_hand",
            TrackedPoint::RightHand => "right_hand",
        }
    }
}

/// Normalized screen coordinate. Conceptually in [0,1] but the producer does not guarantee it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedPoint {
    #[serde(rename = "normalized_x")]
    pub x: f32,
    #[serde(rename = "normalized_y")]
    pub y: f32,
}

impl NormalizedPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn clamped(self) -> Self {
        Self {
            x: self.x.clamp(0.0, 1.0),
            y: self.y.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeadSample {
    pub position: Option<NormalizedPoint>,
    /// Encoded image bytes (PNG/JPEG), already base64-decoded.
    pub frame: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HandsSample {
    pub left: Option<NormalizedPoint>,
    pub right: Option<NormalizedPoint>,
    pub frame: Option<Vec<u8>>,
}

/// One decoded telemetry reading.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetrySample {
    Head(HeadSample),
    Hands(HandsSample),
}

impl TelemetrySample {
    pub fn role(&self) -> Role {
        match self {
            TelemetrySample::Head(_) => Role::Head,
            TelemetrySample::Hands(_) => Role::Hands,
        }
    }

    pub fn frame(&self) -> Option<&[u8]> {
        match self {
            TelemetrySample::Head(s) => s.frame.as_deref(),
            TelemetrySample::Hands(s) => s.frame.as_deref(),
        }
    }

    /// Moves the image bytes out, leaving the positions in place.
    pub fn take_frame(&mut self) -> Option<Vec<u8>> {
        match self {
            TelemetrySample::Head(s) => s.frame.take(),
            TelemetrySample::Hands(s) => s.frame.take(),
        }
    }

    /// Points present in this sample (absent ones are skipped).
    pub fn positions(&self) -> Vec<(TrackedPoint, NormalizedPoint)> {
        match self {
            TelemetrySample::Head(s) => s
                .position
                .map(|p| vec![(TrackedPoint::Head, p)])
                .unwrap_or_default(),
            TelemetrySample::Hands(s) => [
                (TrackedPoint::LeftHand, s.left),
                (TrackedPoint::RightHand, s.right),
            ]
            .into_iter()
            .filter_map(|(point, pos)| pos.map(|p| (point, p)))
            .collect(),
        }
    }
}

// ============================================================================
// Wire shapes (private): mirror the producer's JSON exactly
// ============================================================================

#[derive(Deserialize)]
struct HeadMessage {
    head_position: Option<NormalizedPoint>,
    frame_data: Option<String>,
}

#[derive(Deserialize)]
struct HandsMessage {
    hand_positions: Option<HandPositions>,
    frame_data: Option<String>,
}

#[derive(Deserialize)]
struct HandPositions {
    left: Option<NormalizedPoint>,
    right: Option<NormalizedPoint>,
}

/// Role-bound payload decoder.
#[derive(Debug, Clone, Copy)]
pub struct MessageCodec {
    role: Role,
}

impl MessageCodec {
    pub fn new(role: Role) -> Self {
        Self { role }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn decode(&self, payload: &[u8]) -> Result<TelemetrySample, DecodeError> {
        let text = std::str::from_utf8(payload)?;
        let sample = match self.role {
            Role::Head => {
                let msg: HeadMessage = serde_json::from_str(text)?;
                TelemetrySample::Head(HeadSample {
                    position: msg.head_position,
                    frame: decode_frame_data(msg.frame_data),
                })
            }
            Role::Hands => {
                let msg: HandsMessage = serde_json::from_str(text)?;
                let (left, right) = msg
                    .hand_positions
                    .map(|h| (h.left, h.right))
                    .unwrap_or((None, None));
                TelemetrySample::Hands(HandsSample {
                    left,
                    right,
                    frame: decode_frame_data(msg.frame_data),
                })
            }
        };
        Ok(sample)
    }
}

/// Empty or missing `frame_data` means "no new frame".
fn decode_frame_data(frame_data: Option<String>) -> Option<Vec<u8>> {
    let encoded = frame_data.filter(|s| !s.is_empty())?;
    match BASE64.decode(encoded.as_bytes()) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("[Codec] dropping undecodable frame_data ({} chars): {}", encoded.len(), e);
            None
        }
    }
}
