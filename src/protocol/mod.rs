//! Wire protocol: readiness handshake, length-prefixed framing and JSON message decoding.

pub mod codec;
pub mod framing;
pub mod handshake;

pub use codec::{MessageCodec, NormalizedPoint, Role, TelemetrySample, TrackedPoint};
pub use framing::{FrameDecoder, encode_frame};
pub use handshake::{Handshake, HandshakeConfig};
