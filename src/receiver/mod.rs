//! Background receiver: owns one worker thread running the connection cycle and
//! exposes the latest-sample mailbox to the consumer.
//!
//! ```no_run
//! use tracking_receiver::{ReceiverConfig, Role, TrackingReceiver};
//!
//! let receiver = TrackingReceiver::new(ReceiverConfig::for_role(Role::Head));
//! receiver.connect()?;
//! if let Some(sample) = receiver.take_sample() {
//!     println!("{:?}", sample.positions());
//! }
//! receiver.shutdown();
//! # Ok::<(), std::io::Error>(())
//! ```

pub mod connection;
pub mod mailbox;
pub mod receive_loop;
pub mod status;
pub mod transport;

use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::config::ReceiverConfig;
use crate::protocol::codec::TelemetrySample;
use crate::utils::{
    clock::{Clock, SystemClock},
    events::EventRecorder,
    shutdown::ShutdownToken,
};

use connection::ConnectionManager;
use mailbox::LatestSamplePublisher;
use status::{ConnectionState, SharedStatus, StatusSnapshot};
use transport::{Connector, TcpConnector};

struct Worker {
    shutdown: ShutdownToken,
    handle: JoinHandle<()>,
    recorder: Option<Arc<EventRecorder>>,
    exporter: Option<JoinHandle<()>>,
}

impl Worker {
    /// Signals shutdown and joins the worker, then the exporter so the trace is flushed.
    fn stop(self) {
        self.shutdown.trigger();
        if self.handle.join().is_err() {
            warn!("[TrackingReceiver] worker thread panicked");
        }

        if let Some(recorder) = &self.recorder {
            recorder.stop_exporter();
        }
        if let Some(exporter) = self.exporter {
            if exporter.join().is_err() {
                warn!("[TrackingReceiver] event exporter panicked");
            }
        }
    }
}

pub struct TrackingReceiver {
    config: ReceiverConfig,
    mailbox: Arc<LatestSamplePublisher>,
    status: Arc<SharedStatus>,
    worker: Mutex<Option<Worker>>,
}

impl TrackingReceiver {
    pub fn new(config: ReceiverConfig) -> Self {
        Self {
            config,
            mailbox: Arc::new(LatestSamplePublisher::new()),
            status: Arc::new(SharedStatus::new()),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Starts the background connection cycle over TCP. Returns immediately.
    pub fn connect(&self) -> io::Result<()> {
        self.connect_with(TcpConnector::from_config(&self.config), Arc::new(SystemClock))
    }

    /// Starts the cycle over any transport. A no-op while a worker is already running.
    pub fn connect_with<C, K>(&self, connector: C, clock: Arc<K>) -> io::Result<()>
    where
        C: Connector,
        K: Clock + 'static,
    {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            debug!("[TrackingReceiver] connect() ignored, worker already running");
            return Ok(());
        }
        // A worker that gave up on its own is reaped before starting over.
        if let Some(stale) = worker.take() {
            stale.stop();
        }

        let (recorder, exporter) = match &self.config.event_log {
            Some(path) => {
                let recorder = Arc::new(EventRecorder::new());
                let exporter = recorder.start_exporter(path.clone())?;
                info!("[TrackingReceiver] tracing events to {}", path.display());
                (Some(recorder), Some(exporter))
            }
            None => (None, None),
        };

        let shutdown = ShutdownToken::new();
        let manager = ConnectionManager::new(
            self.config.clone(),
            connector,
            clock,
            self.mailbox.clone(),
            self.status.clone(),
            shutdown.clone(),
        )
        .with_recorder(recorder.clone());

        let spawned = thread::Builder::new()
            .name(format!("{}-receiver", self.config.role))
            .spawn(move || manager.run());
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                if let Some(recorder) = &recorder {
                    recorder.stop_exporter();
                }
                return Err(e);
            }
        };

        *worker = Some(Worker {
            shutdown,
            handle,
            recorder,
            exporter,
        });
        Ok(())
    }

    /// Latest unread sample, if any. Never blocks on the network.
    pub fn take_sample(&self) -> Option<TelemetrySample> {
        self.mailbox.take()
    }

    pub fn mailbox(&self) -> &Arc<LatestSamplePublisher> {
        &self.mailbox
    }

    pub fn state(&self) -> ConnectionState {
        self.status.state()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot(&self.mailbox)
    }

    /// Whether the worker thread is still alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Stops the worker and waits for it. Safe to call repeatedly.
    /// The blocked read wakes within one read deadline.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        worker.stop();

        // Release any unread frame bytes.
        self.mailbox.clear();
        self.status.transition(ConnectionState::Disconnected);
        info!("[TrackingReceiver] shut down");
    }
}

impl Drop for TrackingReceiver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
