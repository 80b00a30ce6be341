//! Background driver for the monitor and the settlement sweep.
//!
//! Two independent interval loops share one engine behind an async mutex.
//! Neither assumes anything about the other's timing; each tick takes the
//! lock, runs one pass, and releases it.

use crate::config::EngineConfig;
use crate::engine::Engine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub type SharedEngine = Arc<Mutex<Engine>>;

pub fn shared(engine: Engine) -> SharedEngine {
    Arc::new(Mutex::new(engine))
}

/// Handle to the running loops.
pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Start both loops with the intervals from `config`.
    pub fn spawn(engine: SharedEngine, config: &EngineConfig) -> Self {
        Self::spawn_with(
            engine,
            Duration::from_millis(config.monitor.interval_ms),
            Duration::from_millis(config.settlement.sweep_interval_ms),
        )
    }

    pub fn spawn_with(engine: SharedEngine, monitor_every: Duration, sweep_every: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let monitor = tokio::spawn(run_loop(
            "monitor",
            engine.clone(),
            monitor_every,
            shutdown_rx.clone(),
            |engine| {
                let report = engine.run_monitor_cycle();
                if !report.closed.is_empty() {
                    info!(closed = report.closed.len(), "Monitor auto-closed positions");
                }
                for warning in &report.warnings {
                    warn!(?warning, "Monitor degraded");
                }
            },
        ));

        let sweeper = tokio::spawn(run_loop(
            "settlement",
            engine,
            sweep_every,
            shutdown_rx,
            |engine| {
                let report = engine.sweep_bets();
                if !report.settled.is_empty() || !report.deferred.is_empty() {
                    debug!(
                        settled = report.settled.len(),
                        deferred = report.deferred.len(),
                        "Sweep complete"
                    );
                }
                for warning in &report.warnings {
                    warn!(?warning, "Settlement degraded");
                }
            },
        ));

        info!(?monitor_every, ?sweep_every, "Scheduler started");
        Self {
            shutdown_tx,
            handles: vec![monitor, sweeper],
        }
    }

    /// Stop both loops and wait for any in-flight pass to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Scheduler task ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }
}

async fn run_loop<F>(
    name: &'static str,
    engine: SharedEngine,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    pass: F,
) where
    F: Fn(&mut Engine) + Send + 'static,
{
    let mut ticker = tokio::time::interval(period);
    // a slow pass pushes the schedule back rather than bursting to catch up
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut guard = engine.lock().await;
                pass(&mut *guard);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!(loop_name = name, "Loop exited");
}
