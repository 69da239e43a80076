//! Consumer side: what the host application does with samples once per tick.
//!
//! - **PositionSink:** receives one clamped target per tracked point, every tick.
//! - **FrameSink:** receives a decoded camera image when a new one arrived.
//! - **TickDispatcher:** polls the mailbox and drives both sinks.
//! - **Viewport:** maps normalized coordinates into a host rectangle.

pub mod dispatcher;
pub mod viewport;

use image::DynamicImage;

use crate::protocol::codec::{NormalizedPoint, TrackedPoint};

pub trait PositionSink {
    fn on_position(&mut self, point: TrackedPoint, position: NormalizedPoint);
}

pub trait FrameSink {
    fn on_frame(&mut self, frame: DynamicImage);
}

impl<F: FnMut(TrackedPoint, NormalizedPoint)> PositionSink for F {
    fn on_position(&mut self, point: TrackedPoint, position: NormalizedPoint) {
        self(point, position)
    }
}

impl<F: FnMut(DynamicImage)> FrameSink for F {
    fn on_frame(&mut self, frame: DynamicImage) {
        self(frame)
    }
}

pub use dispatcher::{TickDispatcher, TickReport};
pub use viewport::Viewport;
