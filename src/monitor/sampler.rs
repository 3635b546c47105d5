use log::{debug, error, info, warn};
use rand::seq::SliceRandom;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::models::config::MonitorConfig;
use crate::models::interface::ProbePair;
use crate::monitor::collectors::{CounterReader, ProbeRunner, Topology};
use crate::monitor::counters::CounterDeltaTracker;
use crate::monitor::store::LiveStatsStore;
use crate::utils::error::{AppError, AppResult};

/// Lifecycle of a sampling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Idle,
    Running,
    Stopping,
}

/// Everything one cycle needs, cloned into the blocking pool
#[derive(Clone)]
struct CycleContext {
    config: MonitorConfig,
    topology: Arc<dyn Topology>,
    store: Arc<LiveStatsStore>,
    reader: Arc<dyn CounterReader>,
    prober: Arc<dyn ProbeRunner>,
}

/// Periodic driver sampling interface counters and running probes
pub struct SamplingLoop {
    /// Collaborators and timing of every cycle
    context: CycleContext,

    /// Current lifecycle state
    state: LoopState,

    /// Cleared to ask the background task to finish
    is_running: Arc<AtomicBool>,

    /// Wakes the background task out of its inter-cycle sleep
    wake: Arc<Notify>,

    /// Cycles completed in the current session
    cycles: Arc<AtomicU64>,

    /// Handle to the background sampling task
    task: Option<JoinHandle<()>>,
}

impl SamplingLoop {
    pub fn new(
        config: MonitorConfig,
        topology: Arc<dyn Topology>,
        store: Arc<LiveStatsStore>,
        reader: Arc<dyn CounterReader>,
        prober: Arc<dyn ProbeRunner>,
    ) -> Self {
        Self {
            context: CycleContext {
                config,
                topology,
                store,
                reader,
                prober,
            },
            state: LoopState::Idle,
            is_running: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            cycles: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// Spawn the background sampling task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> AppResult<()> {
        if self.task.is_some() {
            return Err(AppError::MonitorError(
                "Monitoring is already running".to_string(),
            ));
        }
        self.context.config.validate()?;

        let interfaces = self.context.topology.interfaces();
        if interfaces.is_empty() {
            return Err(AppError::ConfigError(
                "no interfaces to monitor".to_string(),
            ));
        }
        info!(
            "Starting sampling loop: {} interfaces, {} probe pairs, every {:?}",
            interfaces.len(),
            self.context.topology.probe_pairs().len(),
            self.context.config.sample_period
        );

        // fresh handles per session, so a task detached by an abandoned stop() winds down
        // on its own and a wakeup left over from it is not consumed
        self.is_running = Arc::new(AtomicBool::new(true));
        self.wake = Arc::new(Notify::new());
        self.cycles = Arc::new(AtomicU64::new(0));

        self.task = Some(tokio::spawn(Self::run(
            self.context.clone(),
            self.is_running.clone(),
            self.wake.clone(),
            self.cycles.clone(),
        )));
        self.state = LoopState::Running;
        Ok(())
    }

    /// Stop the background task and wait for its current cycle to finish.
    ///
    /// Does nothing if the loop is not running. If this future is dropped before it
    /// completes, the task is already told to finish and the loop counts as idle.
    pub async fn stop(&mut self) {
        let task = match self.task.take() {
            Some(task) => task,
            None => {
                debug!("Sampling loop is not running, nothing to stop");
                return;
            }
        };

        info!("Stopping sampling loop");
        self.state = LoopState::Stopping;
        self.is_running.store(false, Ordering::SeqCst);
        self.wake.notify_one();

        if let Err(e) = task.await {
            error!("Sampling task ended abnormally: {}", e);
        }

        self.state = LoopState::Idle;
        info!(
            "Sampling loop stopped after {} cycles",
            self.cycles.load(Ordering::SeqCst)
        );
    }

    pub fn state(&self) -> LoopState {
        match self.task {
            Some(_) => self.state,
            None => LoopState::Idle,
        }
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.context.config
    }

    pub fn store(&self) -> Arc<LiveStatsStore> {
        self.context.store.clone()
    }

    async fn run(
        context: CycleContext,
        is_running: Arc<AtomicBool>,
        wake: Arc<Notify>,
        cycles: Arc<AtomicU64>,
    ) {
        let mut tracker = CounterDeltaTracker::new();

        while is_running.load(Ordering::SeqCst) {
            let cycle_context = context.clone();
            let mut cycle_tracker = std::mem::take(&mut tracker);

            let outcome = tokio::task::spawn_blocking(move || {
                cycle_context.run_cycle(&mut cycle_tracker);
                cycle_tracker
            })
            .await;

            match outcome {
                Ok(returned) => {
                    tracker = returned;
                    let done = cycles.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!("Sampling cycle {} complete", done);
                }
                Err(e) => {
                    // baselines went down with the cycle; the next one starts fresh
                    error!("Sampling cycle failed: {}", e);
                }
            }

            if !is_running.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(context.config.sample_period) => {}
                _ = wake.notified() => {
                    debug!("Sampling loop woken for shutdown");
                }
            }
        }

        info!("Sampling task exiting");
    }
}

impl CycleContext {
    fn run_cycle(&self, tracker: &mut CounterDeltaTracker) {
        self.sample_interfaces(tracker);
        for pair in self.sample_pairs() {
            self.probe(&pair);
        }
    }

    fn sample_interfaces(&self, tracker: &mut CounterDeltaTracker) {
        for iface in self.topology.interfaces() {
            let snapshot = match self.reader.read(&iface.name) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Skipping interface {} this cycle: {}", iface.name, e);
                    tracker.forget(&iface.name);
                    continue;
                }
            };

            let delta = tracker.delta(&iface.name, snapshot);
            self.store.update_counters(
                &iface.node,
                &iface.peer,
                to_signed(delta.tx_bytes),
                to_signed(delta.rx_bytes),
                to_signed(delta.tx_packets),
                to_signed(delta.rx_packets),
            );
        }
    }

    /// Probe pairs measured this cycle
    fn sample_pairs(&self) -> Vec<ProbePair> {
        let pairs = self.topology.probe_pairs();
        match self.config.max_probe_pairs {
            Some(max) if pairs.len() > max => pairs
                .choose_multiple(&mut rand::thread_rng(), max)
                .cloned()
                .collect(),
            _ => pairs,
        }
    }

    fn probe(&self, pair: &ProbePair) {
        let (source, target) = (pair.source.as_str(), pair.target.as_str());

        if let Err(e) = self.prober.start_responder(target) {
            warn!("Could not start responder on {}: {}", target, e);
        }
        thread::sleep(self.config.settle_delay);

        let mbps = match self
            .prober
            .measure_bandwidth(source, target, self.config.probe_duration)
        {
            Ok(mbps) => mbps,
            Err(e) => {
                warn!("Bandwidth probe {} -> {} failed: {}", source, target, e);
                0.0
            }
        };
        self.store.record_bandwidth(source, target, mbps);

        if let Err(e) = self.prober.stop_responder(target) {
            warn!("Could not stop responder on {}: {}", target, e);
        }
        thread::sleep(self.config.probe_gap);

        let ms = match self.prober.measure_latency(source, target) {
            Ok(ms) => ms,
            Err(e) => {
                warn!("Latency probe {} -> {} failed: {}", source, target, e);
                0.0
            }
        };
        self.store.record_latency(source, target, ms);
    }
}

fn to_signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
