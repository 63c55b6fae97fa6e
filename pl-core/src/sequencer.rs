//! Priority sequencer
//!
//! Brings the registry up band by band, lowest priority first. Components in
//! a band initialize concurrently, bounded by a worker pool and by per-bus
//! locks: two components sharing a bus controller never run at the same time.
//! A task takes its bus locks (ascending bus order) before a worker permit, so
//! a permit is only ever held by a task that can run.
//!
//! A band starts only after every component in the previous band is in a
//! terminal state, including components whose initialization was started
//! outside the sequencer.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::component::{Component, InitOutcome};
use crate::constants::bringup;
use crate::data::{BandReport, BringupReport, ComponentState, FailureEntry};
use crate::error::{ErrorKind, PlinthError, Result};
use crate::registry::{Band, Registry};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequencerConfig {
    /// Concurrent initializations per band. `None` uses the number of
    /// distinct bus controllers in the band.
    pub max_workers: Option<usize>,
}

/// Shared stop request, honored between bands
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How one init task settled
enum TaskResult {
    Settled(InitOutcome),
    /// Component was not `Uninitialized` once the task got to it
    Refused(PlinthError),
    Panicked(String),
}

/// One async lock per bus controller, created on first use
#[derive(Debug, Default)]
struct BusLocks {
    locks: parking_lot::Mutex<HashMap<u16, Arc<AsyncMutex<()>>>>,
}

impl BusLocks {
    /// Locks for `buses`, in the order given
    fn for_buses(&self, buses: &[u16]) -> Vec<Arc<AsyncMutex<()>>> {
        let mut locks = self.locks.lock();
        buses
            .iter()
            .map(|bus| locks.entry(*bus).or_default().clone())
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct Sequencer {
    config: SequencerConfig,
    bus_locks: BusLocks,
}

impl Sequencer {
    pub fn new(config: SequencerConfig) -> Self {
        Self {
            config,
            bus_locks: BusLocks::default(),
        }
    }

    pub fn config(&self) -> SequencerConfig {
        self.config
    }

    fn workers_for(&self, candidates: &[Arc<Component>]) -> usize {
        let workers = self.config.max_workers.unwrap_or_else(|| {
            candidates
                .iter()
                .flat_map(|c| c.buses())
                .collect::<BTreeSet<u16>>()
                .len()
        });
        workers.max(1)
    }

    /// Run one bring-up pass over `registry`.
    ///
    /// Returns `Err` only on structural faults (a task lost for a reason
    /// other than a panic). Hardware failures are reported, never returned.
    pub async fn run(&self, registry: &Registry, cancel: &CancelFlag) -> Result<BringupReport> {
        let started = Instant::now();
        let mut report = BringupReport::default();
        let mut bands = registry.all_by_priority();

        while let Some(band) = bands.next() {
            if cancel.is_cancelled() {
                info!("Bring-up cancelled before {} band", band.priority);
                report.cancelled = true;
                for band in std::iter::once(band).chain(bands.by_ref()) {
                    for component in &band.components {
                        if component.state() == ComponentState::Uninitialized {
                            report.not_attempted += 1;
                        } else {
                            report.skipped += 1;
                        }
                    }
                }
                break;
            }
            self.run_band(band, &mut report).await?;
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "Bring-up finished in {} ms: {} healthy, {} degraded, {} failed, {} skipped, {} not attempted",
            report.elapsed_ms, report.healthy, report.degraded, report.failed, report.skipped, report.not_attempted
        );
        Ok(report)
    }

    async fn run_band(&self, band: Band, report: &mut BringupReport) -> Result<()> {
        let (candidates, others): (Vec<Arc<Component>>, Vec<Arc<Component>>) = band
            .components
            .iter()
            .cloned()
            .partition(|c| c.state() == ComponentState::Uninitialized);
        let (in_flight, settled): (Vec<Arc<Component>>, Vec<Arc<Component>>) = others
            .into_iter()
            .partition(|c| c.state() == ComponentState::Initializing);

        for component in &settled {
            debug!("Skipping {} ({})", component.key(), component.state());
        }
        report.skipped += settled.len() + in_flight.len();
        report.bands.push(BandReport {
            priority: band.priority,
            components: band.components.iter().map(|c| c.key().to_string()).collect(),
        });

        if candidates.is_empty() {
            wait_all_settled(&in_flight).await;
            return Ok(());
        }

        let workers = self.workers_for(&candidates);
        info!(
            "Band {}: initializing {} component(s) with {} worker(s)",
            band.priority,
            candidates.len(),
            workers
        );
        let pool = Arc::new(Semaphore::new(workers));

        let mut handles = Vec::with_capacity(candidates.len());
        for component in &candidates {
            let locks = self.bus_locks.for_buses(&component.buses());
            let pool = pool.clone();
            let component = component.clone();
            handles.push(tokio::spawn(async move {
                let mut guards = Vec::with_capacity(locks.len());
                for lock in locks {
                    guards.push(lock.lock_owned().await);
                }
                let _permit = pool
                    .acquire_owned()
                    .await
                    .map_err(|e| PlinthError::internal(format!("worker pool closed: {}", e)))?;
                let joined = tokio::task::spawn_blocking(move || component.initialize()).await;
                drop(guards);
                settle(joined)
            }));
        }
        report.attempted += candidates.len();

        // Barrier: every task of the band settles before the next band starts
        for (component, handle) in candidates.iter().zip(handles) {
            let result = match handle.await {
                Ok(result) => result?,
                Err(e) => settle(Err(e))?,
            };
            if matches!(result, TaskResult::Refused(_)) {
                wait_settled(component).await;
            }
            record(component, result, report);
        }
        wait_all_settled(&in_flight).await;
        Ok(())
    }
}

/// Wait until an initialization this pass did not start has finished
async fn wait_settled(component: &Component) {
    while component.state() == ComponentState::Initializing {
        tokio::time::sleep(bringup::SETTLE_POLL_INTERVAL).await;
    }
}

async fn wait_all_settled(components: &[Arc<Component>]) {
    for component in components {
        wait_settled(component).await;
        debug!("{} settled outside this pass ({})", component.key(), component.state());
    }
}

fn settle(joined: std::result::Result<Result<InitOutcome>, JoinError>) -> Result<TaskResult> {
    match joined {
        Ok(Ok(outcome)) => Ok(TaskResult::Settled(outcome)),
        Ok(Err(e)) => Ok(TaskResult::Refused(e)),
        Err(e) if e.is_panic() => Ok(TaskResult::Panicked(e.to_string())),
        Err(e) => Err(PlinthError::internal(format!("init task lost: {}", e))),
    }
}

fn record(component: &Component, result: TaskResult, report: &mut BringupReport) {
    let key = component.key().to_string();
    match result {
        TaskResult::Settled(outcome) => {
            match outcome.state {
                ComponentState::Healthy => report.healthy += 1,
                ComponentState::Degraded => report.degraded += 1,
                ComponentState::Failed => report.failed += 1,
                ComponentState::Uninitialized | ComponentState::Initializing => {}
            }
            report.failures.extend(outcome.failures.into_iter().map(|f| FailureEntry {
                component: key.clone(),
                driver: Some(f.index),
                driver_kind: Some(f.driver),
                kind: f.error.kind(),
                message: f.error.to_string(),
            }));
        }
        TaskResult::Refused(e) => {
            debug!("{} was initialized elsewhere: {}", key, e);
            report.attempted -= 1;
            report.skipped += 1;
        }
        TaskResult::Panicked(message) => {
            let reason = format!("initialization panicked: {}", message);
            component.mark_failed(&reason);
            warn!("{}: {}", key, reason);
            report.failed += 1;
            report.failures.push(FailureEntry {
                component: key,
                driver: None,
                driver_kind: None,
                kind: ErrorKind::Internal,
                message: reason,
            });
        }
    }
}
