//! Background poll driver.
//!
//! Hosts with their own frame or tick loop call
//! [`Registry::poll_conditions`](crate::Registry::poll_conditions) directly.
//! Hosts without one can hand the registry to a [`PollDriver`], which polls it
//! from a dedicated worker thread at a fixed interval. Predicate subscribers
//! that take a payload are only reached through
//! [`PollDriver::spawn_with_payload`].

use std::any::Any;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DispatchError, DispatchResult};
use crate::key::EventKey;
use crate::registry::Registry;

/// Poll driver configuration.
#[derive(Debug, Clone)]
pub struct PollDriverConfig {
    /// Time between polls. Clamped to at least one millisecond.
    pub interval: Duration,
    /// Stop on its own after this many polls.
    pub max_ticks: Option<u64>,
    /// Worker thread name.
    pub thread_name: String,
}

impl Default for PollDriverConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(16),
            max_ticks: None,
            thread_name: "eventgate-poll".to_string(),
        }
    }
}

/// Totals accumulated by a driver over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollDriverStats {
    /// Polls performed.
    pub ticks: u64,
    /// Predicate firings across all polls.
    pub fired: u64,
    /// Handler invocations across all polls.
    pub invoked: u64,
}

/// Handle to a running poll worker.
///
/// Dropping the handle signals the worker to stop but does not wait for it.
#[derive(Debug)]
pub struct PollDriver {
    shutdown_tx: Option<Sender<()>>,
    join: Option<JoinHandle<DispatchResult<PollDriverStats>>>,
}

impl PollDriver {
    /// Start polling `registry` on a new thread, without payload data.
    pub fn spawn<K, P>(registry: Arc<Registry<K, P>>, cfg: PollDriverConfig) -> DispatchResult<Self>
    where
        K: EventKey,
        P: Send + Sync + 'static,
    {
        Self::spawn_with_payload(registry, cfg, || None)
    }

    /// Start polling `registry` on a new thread, asking `payload` for data
    /// before every poll.
    ///
    /// A `Some` value is handed to
    /// [`Registry::poll_conditions_with`](crate::Registry::poll_conditions_with)
    /// and reaches the payload subscribers of predicates that fire.
    pub fn spawn_with_payload<K, P, F>(
        registry: Arc<Registry<K, P>>,
        cfg: PollDriverConfig,
        payload: F,
    ) -> DispatchResult<Self>
    where
        K: EventKey,
        P: Send + Sync + 'static,
        F: FnMut() -> Option<P> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let name = cfg.thread_name.clone();

        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(registry, cfg, payload, shutdown_rx))
            .map_err(|e| DispatchError::Spawn {
                message: e.to_string(),
            })?;

        debug!(thread = %name, "Poll driver started");

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            join: Some(join),
        })
    }

    /// True once the worker has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signal the worker to stop and wait for it.
    ///
    /// A panic raised by a predicate or handler on the worker is returned as
    /// [`DispatchError::PollWorkerPanicked`].
    pub fn stop(mut self) -> DispatchResult<PollDriverStats> {
        self.shutdown_tx.take();
        self.wait()
    }

    /// Wait for the worker to exit on its own, which only happens when
    /// `max_ticks` is set or a poll fails.
    pub fn join(mut self) -> DispatchResult<PollDriverStats> {
        self.wait()
    }

    fn wait(&mut self) -> DispatchResult<PollDriverStats> {
        let Some(handle) = self.join.take() else {
            return Err(DispatchError::internal("poll driver already joined"));
        };
        let stats = handle
            .join()
            .map_err(|payload| DispatchError::PollWorkerPanicked {
                message: panic_message(payload.as_ref()),
            })??;
        debug!(ticks = stats.ticks, fired = stats.fired, "Poll driver stopped");
        Ok(stats)
    }
}

impl Drop for PollDriver {
    fn drop(&mut self) {
        // Closing the channel ends the worker's select loop; the thread is detached.
        self.shutdown_tx.take();
    }
}

#[allow(clippy::needless_pass_by_value)]
fn worker_loop<K, P, F>(
    registry: Arc<Registry<K, P>>,
    cfg: PollDriverConfig,
    mut payload: F,
    shutdown_rx: Receiver<()>,
) -> DispatchResult<PollDriverStats>
where
    K: EventKey,
    P: Send + Sync + 'static,
    F: FnMut() -> Option<P>,
{
    let ticker = tick(cfg.interval.max(Duration::from_millis(1)));
    let mut stats = PollDriverStats::default();

    loop {
        if cfg.max_ticks.is_some_and(|max| stats.ticks >= max) {
            break;
        }
        select! {
            recv(shutdown_rx) -> _ => break,
            recv(ticker) -> _ => {
                let data = payload();
                let report = registry.poll_conditions_with(data.as_ref())?;
                stats.ticks += 1;
                stats.fired += report.fired as u64;
                stats.invoked += report.invoked as u64;
            }
        }
    }

    Ok(stats)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
