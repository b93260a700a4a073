//! Heartbeat loop and acknowledgement tracking
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  Heartbeat Task     │
//! │  (Tokio spawn)      │
//! │                     │
//! │  Every interval:    │
//! │  1. Wait for tick   │
//! │  2. Check shutdown  │
//! │  3. Socket beat() ──┼──> registry lock ──> Transport::write
//! └─────────────────────┘
//! ```
//!
//! One task per established connection. It only holds a weak reference to
//! the socket, and exits when the socket is gone, the connection is gone, or
//! its handle is dropped.

use crate::socket::SocketInner;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Owns a running heartbeat task; dropping it stops the task at its next tick
pub(crate) struct HeartbeatHandle {
    shutdown_tx: Sender<()>,
    _handle: tokio::task::JoinHandle<()>,
}

impl HeartbeatHandle {
    pub(crate) fn stop(self) {
        let _ = self.shutdown_tx.try_send(());
    }
}

/// Spawn the heartbeat loop for one connection
pub(crate) fn spawn_heartbeat(socket: Weak<SocketInner>, interval: Duration) -> HeartbeatHandle {
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    let handle = tokio::spawn(heartbeat_task(socket, interval, shutdown_rx));
    HeartbeatHandle {
        shutdown_tx,
        _handle: handle,
    }
}

async fn heartbeat_task(socket: Weak<SocketInner>, interval: Duration, shutdown_rx: Receiver<()>) {
    let mut ticker = tokio::time::interval(interval);
    // First tick completes immediately; the first beat is one interval in
    ticker.tick().await;
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!("Heartbeat task started with interval: {:?}", interval);

    loop {
        ticker.tick().await;

        match shutdown_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => {
                debug!("Heartbeat task received shutdown signal");
                break;
            }
            Err(TryRecvError::Empty) => {}
        }

        let Some(socket) = socket.upgrade() else {
            debug!("Socket dropped, heartbeat task exiting");
            break;
        };
        if !socket.beat() {
            break;
        }
    }

    debug!("Heartbeat task exiting");
}

/// Tracks heartbeat sends and acknowledgements
///
/// Timestamps are stored as milliseconds since an internal epoch, offset by
/// one so that zero always means "never".
#[derive(Debug)]
pub struct HeartbeatTracker {
    epoch: Instant,
    last_sent_ms: AtomicU64,
    last_ack_ms: AtomicU64,
    timeout: Option<Duration>,
}

impl HeartbeatTracker {
    /// `timeout` of `None` disables the health check
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            epoch: Instant::now(),
            last_sent_ms: AtomicU64::new(0),
            last_ack_ms: AtomicU64::new(0),
            timeout,
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64 + 1
    }

    /// Record a send. While a heartbeat is outstanding the oldest send is kept.
    pub fn record_sent(&self) {
        let sent = self.last_sent_ms.load(Ordering::Acquire);
        let ack = self.last_ack_ms.load(Ordering::Acquire);
        if sent == 0 || ack >= sent {
            self.last_sent_ms.store(self.now_ms(), Ordering::Release);
        }
    }

    pub fn record_ack(&self) {
        self.last_ack_ms.store(self.now_ms(), Ordering::Release);
    }

    /// False only when a heartbeat is outstanding for longer than the timeout
    pub fn is_healthy(&self) -> bool {
        let Some(timeout) = self.timeout else {
            return true;
        };
        let sent = self.last_sent_ms.load(Ordering::Acquire);
        let ack = self.last_ack_ms.load(Ordering::Acquire);

        if sent == 0 || ack >= sent {
            return true;
        }
        self.now_ms().saturating_sub(sent) < timeout.as_millis() as u64
    }

    /// Time since the last acknowledgement, if any arrived
    pub fn time_since_last_ack(&self) -> Option<Duration> {
        let ack = self.last_ack_ms.load(Ordering::Acquire);
        (ack != 0).then(|| Duration::from_millis(self.now_ms().saturating_sub(ack)))
    }

    /// Forget previous heartbeats (new connection)
    pub fn reset(&self) {
        self.last_sent_ms.store(0, Ordering::Release);
        self.last_ack_ms.store(0, Ordering::Release);
    }
}
