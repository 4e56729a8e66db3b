//! Polling driver
//!
//! Runs [`Reconciler::run_cycle`] back-to-back with an interruptible sleep in
//! between. The driver alone decides when the loop ends: cycle failures are
//! logged and absorbed, and only the [`ShutdownSignal`] stops it.
//!
//! ```text
//! ┌────────────┐   run_cycle   ┌────────────┐
//! │  Driver    │──────────────▶│ Reconciler │
//! └────────────┘               └────────────┘
//!       │  wait_timeout(interval)
//!       ▼
//! ┌────────────────┐
//! │ ShutdownSignal │◀── trigger() from the signal task
//! └────────────────┘
//! ```
//!
//! There is no per-cycle deadline: a collaborator that hangs stalls the loop.

use crate::config::ReconcileConfig;
use crate::engine::{CycleOutcome, Reconciler};
use crate::error::Result;
use crate::shutdown::ShutdownSignal;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, trace, warn};

/// Default capacity of the driver event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Events emitted by the PollingDriver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// Driver started
    Started {
        /// Device being managed
        device: String,
        /// Hostname being tracked
        hostname: String,
    },

    /// A cycle finished
    CycleCompleted {
        /// 1-based cycle counter
        cycle: u64,
        /// How the cycle ended
        outcome: CycleOutcome,
    },

    /// Driver stopped
    Stopped {
        /// Cycles run before stopping
        cycles: u64,
    },
}

/// Polling loop around a [`Reconciler`]
pub struct PollingDriver {
    /// Engine running each cycle
    reconciler: Reconciler,

    /// Immutable configuration snapshot
    config: ReconcileConfig,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<DriverEvent>,

    /// Events dropped because the receiver fell behind
    dropped_events: AtomicU64,
}

impl PollingDriver {
    /// Create a new polling driver
    ///
    /// # Returns
    ///
    /// A tuple of (driver, event_receiver). Dropping the receiver is fine;
    /// events are then discarded.
    pub fn new(
        reconciler: Reconciler,
        config: ReconcileConfig,
    ) -> Result<(Self, mpsc::Receiver<DriverEvent>)> {
        Self::with_event_capacity(reconciler, config, DEFAULT_EVENT_CAPACITY)
    }

    /// Create a driver nobody observes
    ///
    /// The receiver is dropped right away, so events are discarded silently
    /// instead of piling up in the channel.
    pub fn without_events(reconciler: Reconciler, config: ReconcileConfig) -> Result<Self> {
        let (driver, _) = Self::with_event_capacity(reconciler, config, 1)?;
        Ok(driver)
    }

    /// Create a driver with a custom event channel capacity
    pub fn with_event_capacity(
        reconciler: Reconciler,
        config: ReconcileConfig,
        capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<DriverEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(capacity.max(1));

        Ok((
            Self {
                reconciler,
                config,
                event_tx: tx,
                dropped_events: AtomicU64::new(0),
            },
            rx,
        ))
    }

    /// Run until `shutdown` fires
    ///
    /// A signal that fired before the call returns without running a cycle.
    pub async fn run(&self, shutdown: &ShutdownSignal) -> Result<()> {
        info!("Starting resolve and update task...");
        info!(
            "Target WireGuard device {}, peer key {}, target hostname {}, target port {}, preference {}, interval {}ms",
            self.config.device,
            self.config.peer_key,
            self.config.hostname,
            self.config.port,
            self.config.preference,
            self.config.interval_ms
        );

        self.emit_event(DriverEvent::Started {
            device: self.config.device.clone(),
            hostname: self.config.hostname.clone(),
        });

        let interval = self.config.interval();
        let mut cycles: u64 = 0;

        while !shutdown.is_triggered() {
            cycles += 1;
            let outcome = self.reconciler.run_cycle(&self.config).await;
            trace!("Cycle {} finished: {:?}", cycles, outcome);

            self.emit_event(DriverEvent::CycleCompleted {
                cycle: cycles,
                outcome,
            });

            if shutdown.wait_timeout(interval).await {
                debug!("Shutdown requested during wait");
                break;
            }
        }

        info!("Exiting resolve and update task after {} cycle(s)", cycles);
        self.emit_event(DriverEvent::Stopped { cycles });

        Ok(())
    }

    /// Number of events dropped on a full channel so far
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Emit a driver event
    ///
    /// A receiver that stops reading is warned about once, not every cycle.
    fn emit_event(&self, event: DriverEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                if self.dropped_events.fetch_add(1, Ordering::Relaxed) == 0 {
                    warn!("Event channel full, dropping driver events");
                } else {
                    trace!("Event channel still full, event dropped");
                }
            }
            // Nobody is listening.
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
