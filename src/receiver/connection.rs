//! connection.rs
//! Supervised connect cycle: connect → handshake → stream, retried with backoff.
//! - a failed connect or handshake counts toward `max_attempts`; a successful handshake resets the count
//! - a lost stream restarts the cycle when `reconnect_on_loss` is set
//! - every wait goes through the Clock and observes the ShutdownToken
//! - no thread is ever killed: shutdown is noticed at the next read deadline or wait

use std::{sync::Arc, time::Duration};

use log::{Level, debug, error, info, log, warn};

use crate::config::ReceiverConfig;
use crate::error::ReceiverError;
use crate::protocol::handshake::Handshake;
use crate::receiver::{
    mailbox::LatestSamplePublisher,
    receive_loop::ReceiveLoop,
    status::{ConnectionState, SharedStatus},
    transport::Connector,
};
use crate::utils::{
    clock::Clock,
    events::{EventRecorder, ReceiverEvent},
    shutdown::ShutdownToken,
};

/// Retry delay: starts at `initial`, multiplied per consecutive failure, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    multiplier: f64,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            initial,
            multiplier: multiplier.max(1.0),
            max,
            current: initial.min(max),
        }
    }

    pub fn from_config(config: &ReceiverConfig) -> Self {
        Self::new(config.retry_backoff(), config.backoff_multiplier, config.max_backoff())
    }

    /// Delay to wait now; advances the schedule for the next failure.
    /// A product too large for `Duration` saturates at `max`.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .map_or(self.max, |next| next.min(self.max));
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial.min(self.max);
    }
}

enum Outcome {
    /// Shutdown requested mid-cycle.
    Stopped,
    /// Connection was established and later lost.
    StreamLost(ReceiverError),
    /// Could not get to the streaming phase.
    SetupFailed(ReceiverError),
}

pub struct ConnectionManager<C: Connector, K: Clock + ?Sized> {
    config: ReceiverConfig,
    connector: C,
    clock: Arc<K>,
    mailbox: Arc<LatestSamplePublisher>,
    status: Arc<SharedStatus>,
    shutdown: ShutdownToken,
    recorder: Option<Arc<EventRecorder>>,
    backoff: Backoff,
}

impl<C: Connector, K: Clock + ?Sized> ConnectionManager<C, K> {
    pub fn new(
        config: ReceiverConfig,
        connector: C,
        clock: Arc<K>,
        mailbox: Arc<LatestSamplePublisher>,
        status: Arc<SharedStatus>,
        shutdown: ShutdownToken,
    ) -> Self {
        let backoff = Backoff::from_config(&config);
        Self {
            config,
            connector,
            clock,
            mailbox,
            status,
            shutdown,
            recorder: None,
            backoff,
        }
    }

    pub fn with_recorder(mut self, recorder: Option<Arc<EventRecorder>>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Runs the retry loop until shutdown, retries are exhausted or a lost stream is not to be resumed.
    pub fn run(mut self) {
        let target = self.connector.describe();
        let mut failures = 0u32;

        info!("[ConnectionManager] receiving {} data from {}", self.config.role, target);

        while !self.shutdown.is_triggered() {
            let attempt = self.status.begin_attempt();
            self.record(ReceiverEvent::AttemptStarted { attempt });
            debug!("[ConnectionManager] attempt #{} to {}", attempt, target);

            match self.attempt(attempt) {
                Outcome::Stopped => break,
                Outcome::StreamLost(err) => {
                    warn!("[ConnectionManager] stream from {} lost: {}", target, err);
                    self.record(ReceiverEvent::ConnectionLost {
                        reason: err.to_string(),
                    });
                    self.status.record_failure(&err);
                    failures = 0;
                    self.backoff.reset();
                    if !self.config.reconnect_on_loss {
                        info!("[ConnectionManager] reconnect disabled, stopping");
                        break;
                    }
                }
                Outcome::SetupFailed(err) => {
                    failures += 1;
                    log!(
                        self.failure_level(failures),
                        "[ConnectionManager] attempt #{} failed: {}",
                        attempt,
                        err
                    );
                    self.record(ReceiverEvent::ConnectionLost {
                        reason: err.to_string(),
                    });
                    self.status.record_failure(&err);

                    if let Some(max) = self.config.max_attempts {
                        if failures >= max {
                            let exhausted = ReceiverError::RetriesExhausted { attempts: failures };
                            error!("[ConnectionManager] {}", exhausted);
                            self.status.record_failure(&exhausted);
                            self.record(ReceiverEvent::Stopped);
                            return;
                        }
                    }
                }
            }

            let delay = self.backoff.next_delay();
            debug!("[ConnectionManager] retrying in {:?}", delay);
            if !self.clock.wait(delay, &self.shutdown) {
                break;
            }
        }

        self.status.transition(ConnectionState::Disconnected);
        self.record(ReceiverEvent::Stopped);
        info!("[ConnectionManager] stopped after {} attempt(s)", self.status.snapshot(&self.mailbox).attempts);
    }

    /// Retryable failures are warnings; only the one that ends the cycle is an error.
    fn failure_level(&self, failures: u32) -> Level {
        match self.config.max_attempts {
            Some(max) if failures >= max => Level::Error,
            _ => Level::Warn,
        }
    }

    fn attempt(&mut self, attempt: u32) -> Outcome {
        let mut stream = match self.connector.connect() {
            Ok(stream) => stream,
            Err(e) => return Outcome::SetupFailed(e.into()),
        };
        self.record(ReceiverEvent::Connected { attempt });
        self.status.transition(ConnectionState::AwaitingHandshake);

        let started = self.clock.now();
        let handshake = self.config.handshake();
        let leftover = match Handshake::new(&mut stream, &*self.clock, &self.shutdown, &handshake).run() {
            Ok(leftover) => leftover,
            Err(ReceiverError::Shutdown) => return Outcome::Stopped,
            Err(e) => return Outcome::SetupFailed(e),
        };
        let elapsed = self.clock.now().saturating_duration_since(started);
        self.record(ReceiverEvent::HandshakeComplete {
            elapsed_us: elapsed.as_micros() as u64,
            leftover_bytes: leftover.len(),
        });

        self.status.transition(ConnectionState::Streaming);
        info!("[ConnectionManager] streaming from {} (handshake {:?})", self.connector.describe(), elapsed);

        let mut receive = ReceiveLoop::new(
            stream,
            &self.config,
            self.mailbox.clone(),
            self.status.clone(),
            self.shutdown.clone(),
        )
        .with_recorder(self.recorder.clone());
        receive.seed(&leftover);

        match receive.run() {
            Ok(()) => Outcome::Stopped,
            Err(e) => Outcome::StreamLost(e),
        }
    }

    #[inline]
    fn record(&self, event: ReceiverEvent) {
        if let Some(recorder) = &self.recorder {
            recorder.record(event);
        }
    }
}
