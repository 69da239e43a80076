//! dispatcher.rs
//! Per-tick consumer step: take the latest sample (if any), decode its image, replay positions.
//! - never blocks on the network: a tick is one mailbox swap plus sink calls
//! - an image that fails to decode is skipped; positions from the same sample still apply
//! - every known target is re-sent each tick (clamped), so sinks can smooth towards it
//! - a point missing from a message keeps its previous target

use log::{trace, warn};

use crate::consumer::{FrameSink, PositionSink};
use crate::protocol::codec::{NormalizedPoint, Role, TrackedPoint};
use crate::receiver::mailbox::LatestSamplePublisher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub new_sample: bool,
    pub frame_updated: bool,
    pub positions_dispatched: usize,
}

#[derive(Debug)]
pub struct TickDispatcher {
    role: Role,
    targets: Vec<(TrackedPoint, Option<NormalizedPoint>)>,
    frames_decoded: u64,
    frames_rejected: u64,
}

impl TickDispatcher {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            targets: role.tracked_points().iter().map(|&p| (p, None)).collect(),
            frames_decoded: 0,
            frames_rejected: 0,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Last known target for `point`, unclamped.
    pub fn target(&self, point: TrackedPoint) -> Option<NormalizedPoint> {
        self.targets
            .iter()
            .find(|(p, _)| *p == point)
            .and_then(|(_, t)| *t)
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected
    }

    pub fn tick<P, F>(&mut self, mailbox: &LatestSamplePublisher, positions: &mut P, frames: &mut F) -> TickReport
    where
        P: PositionSink + ?Sized,
        F: FrameSink + ?Sized,
    {
        let mut report = TickReport::default();

        if let Some(mut sample) = mailbox.take() {
            report.new_sample = true;

            if let Some(bytes) = sample.take_frame() {
                match image::load_from_memory(&bytes) {
                    Ok(img) => {
                        self.frames_decoded += 1;
                        frames.on_frame(img);
                        report.frame_updated = true;
                    }
                    Err(e) => {
                        self.frames_rejected += 1;
                        warn!("[Tick] skipping {}-byte frame: {}", bytes.len(), e);
                    }
                }
            }

            for (point, pos) in sample.positions() {
                if let Some(slot) = self.targets.iter_mut().find(|(p, _)| *p == point) {
                    slot.1 = Some(pos);
                }
            }
        }

        for (point, target) in &self.targets {
            if let Some(pos) = target {
                positions.on_position(*point, pos.clamped());
                report.positions_dispatched += 1;
            }
        }

        trace!("[Tick] {:?}", report);
        report
    }
}
