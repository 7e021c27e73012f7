//! Greedy action selection and the weighted multi-signal value update.
//!
//! ## Update rule
//!
//! ```text
//! Q(s, a) ← Q(s, a)
//!         + α · [r + γ · max_a' Q(s', a') − Q(s, a)]
//!         + β · intrinsic(s, a)
//!         + δ · symbolic(s)
//!         + ε · meta_learning(task, env)
//!         + ζ · evolutionary(population)
//!         + η · latent(s)
//! ```
//!
//! With β = δ = ε = ζ = η = 0 this is classical tabular Q-learning. The five
//! auxiliary terms are added linearly on top of the TD step, so the result is
//! not a Bellman backup in general.
//!
//! ## Lifecycle
//!
//! `Idle → Selecting → Idle` for [`QismelEngine::select_action`] and
//! `Idle → Updating → Idle` for [`QismelEngine::update`]. An update is one
//! synchronous step: signals are evaluated first, then the table is locked
//! once for the `max Q(s', ·)` lookup and the read-modify-write. Any error
//! leaves the table untouched.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::fingerprint::fingerprint;
use crate::signals::{SignalContext, SignalSet, SignalValues};
use crate::state::StateTensor;
use crate::value_table::{SharedValueTable, ValueTable};

/// The six update weights.
///
/// Conventionally in `[0, 1]` but not range-checked; they only need to be
/// finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QismelWeights {
    /// Learning rate α
    pub alpha: f64,
    /// Discount factor γ
    pub gamma: f64,
    /// Intrinsic reward weight β
    pub beta: f64,
    /// Symbolic score weight δ
    pub delta: f64,
    /// Meta-learning adjustment weight ε
    pub epsilon: f64,
    /// Evolutionary fitness weight ζ
    pub zeta: f64,
    /// Latent score weight η
    pub eta: f64,
}

impl Default for QismelWeights {
    fn default() -> Self {
        Self::q_learning(0.1, 0.9)
    }
}

impl QismelWeights {
    /// Weights that reduce the update to classical Q-learning.
    pub fn q_learning(alpha: f64, gamma: f64) -> Self {
        Self {
            alpha,
            gamma,
            beta: 0.0,
            delta: 0.0,
            epsilon: 0.0,
            zeta: 0.0,
            eta: 0.0,
        }
    }

    pub fn with_auxiliary(mut self, beta: f64, delta: f64, epsilon: f64, zeta: f64, eta: f64) -> Self {
        self.beta = beta;
        self.delta = delta;
        self.epsilon = epsilon;
        self.zeta = zeta;
        self.eta = eta;
        self
    }

    pub fn validate(&self) -> CoreResult<()> {
        let named = [
            ("alpha", self.alpha),
            ("gamma", self.gamma),
            ("beta", self.beta),
            ("delta", self.delta),
            ("epsilon", self.epsilon),
            ("zeta", self.zeta),
            ("eta", self.eta),
        ];
        for (name, value) in named {
            if !value.is_finite() {
                return Err(CoreError::config(name, format!("must be finite, got {value}")));
            }
        }
        Ok(())
    }

    /// Weighted sum of the five auxiliary signals.
    pub fn auxiliary_term(&self, signals: &SignalValues) -> f64 {
        self.beta * signals.intrinsic
            + self.delta * signals.symbolic
            + self.epsilon * signals.meta_learning
            + self.zeta * signals.evolutionary
            + self.eta * signals.latent
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EnginePhase {
    Idle,
    Selecting,
    Updating,
}

/// Breakdown of a single applied update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateReport {
    pub action: String,
    /// Log preview of the updated key
    pub fingerprint: String,
    pub previous: f64,
    pub max_next: f64,
    pub td_target: f64,
    pub td_error: f64,
    pub signals: SignalValues,
    pub auxiliary: f64,
    pub new_value: f64,
}

pub struct QismelEngine {
    weights: QismelWeights,
    table: SharedValueTable,
    phase: EnginePhase,
}

impl QismelEngine {
    /// Creates an engine with a private, unbounded value table.
    pub fn new(weights: QismelWeights) -> CoreResult<Self> {
        Self::with_table(weights, ValueTable::new().shared())
    }

    /// Creates an engine over an existing, possibly shared, table.
    pub fn with_table(weights: QismelWeights, table: SharedValueTable) -> CoreResult<Self> {
        weights.validate()?;
        Ok(Self {
            weights,
            table,
            phase: EnginePhase::Idle,
        })
    }

    pub fn weights(&self) -> &QismelWeights {
        &self.weights
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    /// Handle to the underlying table, for sharing or checkpointing.
    pub fn table(&self) -> SharedValueTable {
        SharedValueTable::clone(&self.table)
    }

    /// Current estimate for `(state, action)`, `0.0` if never written.
    pub fn value_of(&self, state: &StateTensor, action: &str) -> f64 {
        self.table.lock().peek(&fingerprint(state, action))
    }

    /// Returns the action with the highest estimate.
    ///
    /// Ties go to the earliest action in `action_set`, so an empty table
    /// always selects the first action.
    ///
    /// # Errors
    ///
    /// [`CoreError::Config`] if `action_set` is empty.
    pub fn select_action<'s, S: AsRef<str>>(
        &mut self,
        state: &StateTensor,
        action_set: &'s [S],
    ) -> CoreResult<&'s S> {
        self.phase = EnginePhase::Selecting;
        let result = self.greedy(state, action_set);
        self.phase = EnginePhase::Idle;
        result
    }

    fn greedy<'s, S: AsRef<str>>(
        &self,
        state: &StateTensor,
        action_set: &'s [S],
    ) -> CoreResult<&'s S> {
        let first = action_set
            .first()
            .ok_or_else(|| CoreError::config("action_set", "must not be empty"))?;

        let keys: Vec<_> = action_set
            .iter()
            .map(|action| fingerprint(state, action.as_ref()))
            .collect();

        let mut table = self.table.lock();
        let mut best = first;
        let mut best_value = f64::NEG_INFINITY;
        for (action, key) in action_set.iter().zip(&keys) {
            let value = table.get(key);
            if value > best_value {
                best = action;
                best_value = value;
            }
        }
        Ok(best)
    }

    /// Applies one update with an empty population.
    pub fn update<S: AsRef<str>>(
        &mut self,
        state: &StateTensor,
        action: &str,
        reward: f64,
        next_state: &StateTensor,
        action_set: &[S],
        signals: &SignalSet,
    ) -> CoreResult<UpdateReport> {
        self.update_with_population(state, action, reward, next_state, action_set, signals, &[])
    }

    /// Applies one update, handing `population` to the evolutionary signal.
    ///
    /// # Errors
    ///
    /// * [`CoreError::Config`] if `action_set` is empty or `reward` is not finite
    /// * [`CoreError::Signal`] if a provider fails, returns a non-finite value,
    ///   or the combined result is not finite
    ///
    /// The table is unchanged whenever an error is returned.
    #[allow(clippy::too_many_arguments)]
    pub fn update_with_population<S: AsRef<str>>(
        &mut self,
        state: &StateTensor,
        action: &str,
        reward: f64,
        next_state: &StateTensor,
        action_set: &[S],
        signals: &SignalSet,
        population: &[StateTensor],
    ) -> CoreResult<UpdateReport> {
        self.phase = EnginePhase::Updating;
        let result = self.apply_update(
            state, action, reward, next_state, action_set, signals, population,
        );
        self.phase = EnginePhase::Idle;

        match &result {
            Ok(report) => tracing::debug!(
                action = %report.action,
                fingerprint = %report.fingerprint,
                previous = report.previous,
                new_value = report.new_value,
                td_error = report.td_error,
                "value updated"
            ),
            Err(err) => tracing::warn!("update for action '{action}' rejected: {err}"),
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_update<S: AsRef<str>>(
        &self,
        state: &StateTensor,
        action: &str,
        reward: f64,
        next_state: &StateTensor,
        action_set: &[S],
        signals: &SignalSet,
        population: &[StateTensor],
    ) -> CoreResult<UpdateReport> {
        if action_set.is_empty() {
            return Err(CoreError::config("action_set", "must not be empty"));
        }
        if !reward.is_finite() {
            return Err(CoreError::config("reward", format!("must be finite, got {reward}")));
        }

        let key = fingerprint(state, action);
        let next_keys: Vec<_> = action_set
            .iter()
            .map(|candidate| fingerprint(next_state, candidate.as_ref()))
            .collect();

        let ctx = SignalContext::new(state, action, next_state, population);
        let signal_values = signals.evaluate_all(&ctx)?;
        let auxiliary = self.weights.auxiliary_term(&signal_values);
        let weights = self.weights;
        let preview = key.preview();

        let mut table = self.table.lock();
        let max_next = next_keys
            .iter()
            .map(|next_key| table.get(next_key))
            .fold(f64::NEG_INFINITY, f64::max);
        let td_target = reward + weights.gamma * max_next;

        let (previous, new_value) = table.update_with(key, |current| {
            let next = current + weights.alpha * (td_target - current) + auxiliary;
            if next.is_finite() {
                Ok(next)
            } else {
                Err(CoreError::signal(
                    "update",
                    format!("combined value is not finite ({next})"),
                ))
            }
        })?;

        Ok(UpdateReport {
            action: action.to_string(),
            fingerprint: preview,
            previous,
            max_next,
            td_target,
            td_error: td_target - previous,
            signals: signal_values,
            auxiliary,
            new_value,
        })
    }
}

impl std::fmt::Debug for QismelEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QismelEngine")
            .field("weights", &self.weights)
            .field("phase", &self.phase)
            .field("table", &*self.table.lock())
            .finish()
    }
}
