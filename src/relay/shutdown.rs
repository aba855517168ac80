//! Shutdown coordination
//!
//! A signal listener task raises a shared flag; the relay engine checks it
//! before each fetch and wakes from its sleep when it flips. `main` then
//! drains in-flight forwards and exits 0.
//!
//! The first trigger fixes a single deadline, one grace period away. Both the
//! wait for a running iteration and the forward drain end at that deadline.

use super::inflight::InflightForwards;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const DEFAULT_GRACE: Duration = Duration::from_secs(10);

/// Cheap, cloneable view of the shutdown flag for the engine
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    rx: watch::Receiver<bool>,
}

impl ShutdownHandle {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        // Err means the coordinator is gone; nothing can trigger us anymore
        if rx.wait_for(|flag| *flag).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Debug)]
pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
    grace: Duration,
    deadline: OnceLock<Instant>,
    signals_seen: AtomicUsize,
}

impl ShutdownCoordinator {
    pub fn new(grace: Duration) -> Arc<Self> {
        let (tx, _rx) = watch::channel(false);
        Arc::new(Self {
            tx,
            grace,
            deadline: OnceLock::new(),
            signals_seen: AtomicUsize::new(0),
        })
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            rx: self.tx.subscribe(),
        }
    }

    /// When the grace period runs out; `None` until shutdown is requested
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.get().copied()
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn signals_seen(&self) -> usize {
        self.signals_seen.load(Ordering::Relaxed)
    }

    /// Request shutdown. Safe to call any number of times.
    pub fn trigger(&self, reason: &str) {
        let seen = self.signals_seen.fetch_add(1, Ordering::Relaxed);
        let deadline = *self.deadline.get_or_init(|| Instant::now() + self.grace);
        if seen == 0 {
            log::info!(
                "🛑 {} trapped, finishing up any existing work (up to {:?})...",
                reason,
                deadline.saturating_duration_since(Instant::now())
            );
        } else {
            log::warn!("🛑 {} trapped again, shutdown already in progress", reason);
        }
        self.tx.send_replace(true);
    }

    /// Resolves at the shutdown deadline.
    ///
    /// Used to abandon an iteration that is stuck (e.g. a hanging fetch).
    pub async fn expired(&self) {
        self.handle().triggered().await;
        tokio::time::sleep_until(self.drain_deadline()).await;
    }

    /// Wait, until the shutdown deadline at the latest, for outstanding forwards
    pub async fn drain(&self, inflight: &InflightForwards) -> bool {
        let deadline = self.drain_deadline();
        let pending = inflight.count();
        if pending > 0 {
            log::info!(
                "⏳ Waiting up to {:?} for {} in-flight forward(s)",
                deadline.saturating_duration_since(Instant::now()),
                pending
            );
        }

        let finished = inflight
            .wait_idle_timeout(deadline.saturating_duration_since(Instant::now()))
            .await;
        if finished {
            log::info!("✅ done");
        } else {
            log::warn!(
                "⚠️  Grace period elapsed with {} forward(s) still in flight",
                inflight.count()
            );
        }
        finished
    }

    fn drain_deadline(&self) -> Instant {
        self.deadline().unwrap_or_else(|| Instant::now() + self.grace)
    }

    /// Spawn the OS signal listener
    pub fn listen(self: &Arc<Self>) -> std::io::Result<JoinHandle<()>> {
        spawn_signal_listener(self.clone())
    }
}

#[cfg(unix)]
fn spawn_signal_listener(coordinator: Arc<ShutdownCoordinator>) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                Some(_) = interrupt.recv() => "SIGINT",
                Some(_) = terminate.recv() => "SIGTERM",
                Some(_) = quit.recv() => "SIGQUIT",
                else => break,
            };
            coordinator.trigger(name);
        }
    }))
}

#[cfg(not(unix))]
fn spawn_signal_listener(coordinator: Arc<ShutdownCoordinator>) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            coordinator.trigger("Ctrl-C");
        }
    }))
}
