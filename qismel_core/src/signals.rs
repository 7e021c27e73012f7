//! Auxiliary signal providers consumed by the value update
//!
//! Each of the five auxiliary terms of the update is supplied by an opaque
//! [`SignalProvider`]. The engine never inspects how a value was produced,
//! never validates its range and never assumes two calls with the same
//! arguments agree. It does require a finite number: a provider error or a
//! NaN/infinite value aborts the update.
use std::collections::HashMap;
use std::fmt;

use anyhow::Result;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{CoreError, CoreResult};
use crate::fingerprint::{fingerprint, Fingerprint};
use crate::state::StateTensor;

/// The five auxiliary terms, in update order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Curiosity-style bonus for taking `action` in `state`
    Intrinsic,
    /// Score from a symbolic reasoner over `state`
    Symbolic,
    /// Adjustment derived from the (task, environment) context pair
    MetaLearning,
    /// Fitness of the current population
    Evolutionary,
    /// Score from a latent model of `state`
    Latent,
}

impl SignalKind {
    pub const ALL: [SignalKind; 5] = [
        SignalKind::Intrinsic,
        SignalKind::Symbolic,
        SignalKind::MetaLearning,
        SignalKind::Evolutionary,
        SignalKind::Latent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Intrinsic => "intrinsic",
            SignalKind::Symbolic => "symbolic",
            SignalKind::MetaLearning => "meta_learning",
            SignalKind::Evolutionary => "evolutionary",
            SignalKind::Latent => "latent",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a provider may look at for one update.
///
/// By convention intrinsic reads `(state, action)`, symbolic and latent
/// read `state`, meta-learning reads the context pair and evolutionary
/// reads `population`.
#[derive(Debug, Clone, Copy)]
pub struct SignalContext<'a> {
    pub state: &'a StateTensor,
    pub action: &'a str,
    pub next_state: &'a StateTensor,
    pub task_context: Option<&'a str>,
    pub env_context: Option<&'a str>,
    pub population: &'a [StateTensor],
}

impl<'a> SignalContext<'a> {
    /// Builds a context whose task/environment pair is read from `state`.
    pub fn new(
        state: &'a StateTensor,
        action: &'a str,
        next_state: &'a StateTensor,
        population: &'a [StateTensor],
    ) -> Self {
        Self {
            state,
            action,
            next_state,
            task_context: state.task_context(),
            env_context: state.env_context(),
            population,
        }
    }
}

/// A scalar generator for one auxiliary term.
///
/// Wrap a closure with [`from_fn`] to use it as a provider.
pub trait SignalProvider: Send + Sync {
    fn evaluate(&self, ctx: &SignalContext<'_>) -> Result<f64>;

    /// Name used in logs and error messages
    fn name(&self) -> &str {
        "UnnamedSignal"
    }
}

/// A named closure provider, built by [`from_fn`].
pub struct FnSignal<F> {
    name: String,
    f: F,
}

/// Turns a closure into a named [`SignalProvider`].
///
/// # Examples
///
/// ```
/// use qismel_core::signals::{from_fn, SignalKind, SignalSet};
///
/// let signals = SignalSet::zero().with(
///     SignalKind::Symbolic,
///     from_fn("feature-count", |ctx| Ok(ctx.state.features().len() as f64)),
/// );
/// assert_eq!(signals.provider(SignalKind::Symbolic).name(), "feature-count");
/// ```
pub fn from_fn<F>(name: impl Into<String>, f: F) -> FnSignal<F>
where
    F: Fn(&SignalContext<'_>) -> Result<f64> + Send + Sync,
{
    FnSignal {
        name: name.into(),
        f,
    }
}

impl<F> SignalProvider for FnSignal<F>
where
    F: Fn(&SignalContext<'_>) -> Result<f64> + Send + Sync,
{
    fn evaluate(&self, ctx: &SignalContext<'_>) -> Result<f64> {
        (self.f)(ctx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Always returns the same value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantSignal(pub f64);

impl SignalProvider for ConstantSignal {
    fn evaluate(&self, _ctx: &SignalContext<'_>) -> Result<f64> {
        Ok(self.0)
    }

    fn name(&self) -> &str {
        "ConstantSignal"
    }
}

/// Count-based novelty bonus `scale / sqrt(n)` where `n` counts how often
/// the (state, action) pair has been evaluated, this call included.
///
/// Repeated calls with identical arguments return decreasing values.
#[derive(Debug)]
pub struct NoveltySignal {
    scale: f64,
    visits: Mutex<HashMap<Fingerprint, u64>>,
}

impl NoveltySignal {
    pub fn new(scale: f64) -> Self {
        Self {
            scale,
            visits: Mutex::new(HashMap::new()),
        }
    }

    pub fn visits(&self, state: &StateTensor, action: &str) -> u64 {
        self.visits
            .lock()
            .get(&fingerprint(state, action))
            .copied()
            .unwrap_or(0)
    }
}

impl SignalProvider for NoveltySignal {
    fn evaluate(&self, ctx: &SignalContext<'_>) -> Result<f64> {
        let key = fingerprint(ctx.state, ctx.action);
        let mut visits = self.visits.lock();
        let count = visits.entry(key).or_insert(0);
        *count += 1;
        Ok(self.scale / (*count as f64).sqrt())
    }

    fn name(&self) -> &str {
        "NoveltySignal"
    }
}

/// One value per auxiliary term, as produced for a single update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SignalValues {
    pub intrinsic: f64,
    pub symbolic: f64,
    pub meta_learning: f64,
    pub evolutionary: f64,
    pub latent: f64,
}

impl SignalValues {
    pub fn get(&self, kind: SignalKind) -> f64 {
        match kind {
            SignalKind::Intrinsic => self.intrinsic,
            SignalKind::Symbolic => self.symbolic,
            SignalKind::MetaLearning => self.meta_learning,
            SignalKind::Evolutionary => self.evolutionary,
            SignalKind::Latent => self.latent,
        }
    }

    fn set(&mut self, kind: SignalKind, value: f64) {
        match kind {
            SignalKind::Intrinsic => self.intrinsic = value,
            SignalKind::Symbolic => self.symbolic = value,
            SignalKind::MetaLearning => self.meta_learning = value,
            SignalKind::Evolutionary => self.evolutionary = value,
            SignalKind::Latent => self.latent = value,
        }
    }
}

/// The capability set of five providers handed to every update.
pub struct SignalSet {
    intrinsic: Box<dyn SignalProvider>,
    symbolic: Box<dyn SignalProvider>,
    meta_learning: Box<dyn SignalProvider>,
    evolutionary: Box<dyn SignalProvider>,
    latent: Box<dyn SignalProvider>,
}

impl SignalSet {
    /// Every provider returns `0.0`.
    pub fn zero() -> Self {
        Self {
            intrinsic: Box::new(ConstantSignal(0.0)),
            symbolic: Box::new(ConstantSignal(0.0)),
            meta_learning: Box::new(ConstantSignal(0.0)),
            evolutionary: Box::new(ConstantSignal(0.0)),
            latent: Box::new(ConstantSignal(0.0)),
        }
    }

    pub fn with(mut self, kind: SignalKind, provider: impl SignalProvider + 'static) -> Self {
        let boxed: Box<dyn SignalProvider> = Box::new(provider);
        match kind {
            SignalKind::Intrinsic => self.intrinsic = boxed,
            SignalKind::Symbolic => self.symbolic = boxed,
            SignalKind::MetaLearning => self.meta_learning = boxed,
            SignalKind::Evolutionary => self.evolutionary = boxed,
            SignalKind::Latent => self.latent = boxed,
        }
        self
    }

    pub fn provider(&self, kind: SignalKind) -> &dyn SignalProvider {
        match kind {
            SignalKind::Intrinsic => self.intrinsic.as_ref(),
            SignalKind::Symbolic => self.symbolic.as_ref(),
            SignalKind::MetaLearning => self.meta_learning.as_ref(),
            SignalKind::Evolutionary => self.evolutionary.as_ref(),
            SignalKind::Latent => self.latent.as_ref(),
        }
    }

    /// Calls every provider exactly once, in [`SignalKind::ALL`] order.
    ///
    /// Stops at the first provider that fails or returns a non-finite value
    /// and reports it as [`CoreError::Signal`].
    pub fn evaluate_all(&self, ctx: &SignalContext<'_>) -> CoreResult<SignalValues> {
        let mut values = SignalValues::default();
        for kind in SignalKind::ALL {
            let provider = self.provider(kind);
            let label = format!("{} ({})", kind, provider.name());
            let value = provider
                .evaluate(ctx)
                .map_err(|err| CoreError::signal(label.clone(), format!("{err:#}")))?;
            if !value.is_finite() {
                return Err(CoreError::signal(
                    label,
                    format!("returned non-finite value {value}"),
                ));
            }
            values.set(kind, value);
        }
        Ok(values)
    }
}

impl Default for SignalSet {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for SignalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalSet")
            .field("intrinsic", &self.intrinsic.name())
            .field("symbolic", &self.symbolic.name())
            .field("meta_learning", &self.meta_learning.name())
            .field("evolutionary", &self.evolutionary.name())
            .field("latent", &self.latent.name())
            .finish()
    }
}
