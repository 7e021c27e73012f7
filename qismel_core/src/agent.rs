//! Bounded, cancellable perceive → select → act → update loop.
//!
//! The loop runs on the caller's thread. Each cycle is one synchronous
//! step; cancellation is observed between cycles only, so a stop never
//! leaves a half-applied update behind. The first error halts the loop and
//! is returned to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::config::AgentConfig;
use crate::engine::{QismelEngine, UpdateReport};
use crate::error::{CoreError, CoreResult};
use crate::logging::{CycleLogEntry, CycleLogger};
use crate::signals::SignalSet;
use crate::state::StateTensor;

/// The world the agent acts in.
///
/// `perceive` and `act` may block on I/O or an external model; the engine
/// treats their results as opaque.
pub trait Environment {
    /// Produce the current state snapshot.
    fn perceive(&mut self) -> Result<StateTensor>;

    /// Actions available in `state`, in priority order for tie-breaking.
    fn actions(&self, state: &StateTensor) -> Vec<String>;

    /// Apply `action` and return the scalar reward.
    fn act(&mut self, action: &str) -> Result<f64>;

    /// Population handed to the evolutionary signal
    fn population(&self) -> Vec<StateTensor> {
        Vec::new()
    }
}

/// Shared stop switch, checked between cycles.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    MaxCycles,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub cycles: usize,
    pub total_reward: f64,
    pub stop_reason: StopReason,
}

pub struct AgentLoop<E: Environment> {
    engine: QismelEngine,
    environment: E,
    signals: SignalSet,
    config: AgentConfig,
    logger: CycleLogger,
    cancel: CancellationFlag,
    completed_cycles: usize,
}

impl<E: Environment> AgentLoop<E> {
    pub fn new(engine: QismelEngine, environment: E, signals: SignalSet, config: AgentConfig) -> Self {
        let logger = CycleLogger::new(config.log_dir.clone(), config.log_every);
        Self {
            engine,
            environment,
            signals,
            config,
            logger,
            cancel: CancellationFlag::new(),
            completed_cycles: 0,
        }
    }

    /// Handle that stops the loop before its next cycle.
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn engine(&self) -> &QismelEngine {
        &self.engine
    }

    pub fn environment(&self) -> &E {
        &self.environment
    }

    /// Journal entries of the most recent [`AgentLoop::run`].
    pub fn cycle_log(&self) -> &[CycleLogEntry] {
        self.logger.entries()
    }

    /// Cycles completed over every run of this loop.
    pub fn completed_cycles(&self) -> usize {
        self.completed_cycles
    }

    /// Runs until `max_cycles` cycles complete or the flag is cancelled.
    ///
    /// Journal cycle numbers continue from the previous run.
    pub fn run(&mut self) -> CoreResult<RunSummary> {
        tracing::info!(
            max_cycles = self.config.max_cycles,
            "agent loop starting with signals {:?}",
            self.signals
        );

        self.logger.clear();
        let mut state = self
            .environment
            .perceive()
            .map_err(|err| CoreError::perception(format!("{err:#}")))?;
        let mut total_reward = 0.0;
        let mut cycles = 0;
        let mut stop_reason = StopReason::MaxCycles;

        while cycles < self.config.max_cycles {
            if self.cancel.is_cancelled() {
                stop_reason = StopReason::Cancelled;
                break;
            }

            let (next, reward, report) = match self.cycle(&state) {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!("agent loop halted at cycle {cycles}: {err}");
                    return Err(err);
                }
            };

            let table_size = self.engine.table().lock().len();
            let entry =
                CycleLogEntry::from_report(self.completed_cycles, reward, &report, table_size);
            if let Err(err) = self.logger.record(entry) {
                tracing::warn!("failed to write cycle journal: {err}");
            }

            state = next;
            total_reward += reward;
            cycles += 1;
            self.completed_cycles += 1;

            let delay = self.config.cycle_delay();
            if !delay.is_zero() && cycles < self.config.max_cycles {
                std::thread::sleep(delay);
            }
        }

        tracing::info!(cycles, total_reward, "agent loop stopped: {:?}", stop_reason);
        Ok(RunSummary {
            cycles,
            total_reward,
            stop_reason,
        })
    }

    fn cycle(&mut self, state: &StateTensor) -> CoreResult<(StateTensor, f64, UpdateReport)> {
        let actions = self.environment.actions(state);
        let action = self.engine.select_action(state, &actions)?.clone();

        let reward = self
            .environment
            .act(&action)
            .map_err(|err| CoreError::perception(format!("act '{action}': {err:#}")))?;
        let next = self
            .environment
            .perceive()
            .map_err(|err| CoreError::perception(format!("{err:#}")))?;
        let population = self.environment.population();

        let report = self.engine.update_with_population(
            state,
            &action,
            reward,
            &next,
            &actions,
            &self.signals,
            &population,
        )?;
        Ok((next, reward, report))
    }
}
