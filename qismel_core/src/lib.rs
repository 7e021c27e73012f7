//! # QISMEL Core
//!
//! Multimodal state tensors and a tabular action-value learner whose update
//! blends the usual temporal-difference step with five weighted auxiliary
//! signals: intrinsic, symbolic, meta-learning, evolutionary and latent.
//!
//! ## Quick Start
//!
//! ```rust
//! use qismel_core::signals::{ConstantSignal, SignalKind, SignalSet};
//! use qismel_core::{QismelEngine, QismelWeights, StateTensor};
//!
//! let weights = QismelWeights::q_learning(0.1, 0.9).with_auxiliary(0.05, 0.0, 0.0, 0.0, 0.0);
//! let mut engine = QismelEngine::new(weights).unwrap();
//! let signals = SignalSet::zero().with(SignalKind::Intrinsic, ConstantSignal(1.0));
//!
//! let state = StateTensor::from_vec(&[2, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap();
//! let next = StateTensor::from_vec(&[2, 2], vec![0.0, 1.0, 1.0, 0.0]).unwrap();
//! let actions = ["move", "grab"];
//!
//! let action = *engine.select_action(&state, &actions).unwrap();
//! let report = engine
//!     .update(&state, action, 1.0, &next, &actions, &signals)
//!     .unwrap();
//! assert!((report.new_value - 0.15).abs() < 1e-12);
//! ```
//!
//! ## Core Modules
//!
//! - [`tensor`] - N-dimensional numeric buffers and logged operations
//! - [`state`] - State snapshots with symbolic, multimodal and context data
//! - [`fingerprint`] - Deterministic `(state, action)` keys
//! - [`value_table`] - Action-value storage and checkpoints
//! - [`signals`] - Auxiliary signal providers
//! - [`engine`] - Action selection and the weighted update
//! - [`agent`] - Cancellable perceive/act/update loop
//! - [`config`] - Engine configuration via TOML
//! - [`logging`] - JSON line-delimited logging

pub mod agent;
pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod signals;
pub mod state;
pub mod tensor;
pub mod value_table;

pub use agent::{AgentLoop, CancellationFlag, Environment, RunSummary, StopReason};
pub use checkpoint::{CheckpointError, Checkpointable};
pub use config::{AgentConfig, ConfigError, EngineConfig};
pub use engine::{EnginePhase, QismelEngine, QismelWeights, UpdateReport};
pub use error::{CoreError, CoreResult};
pub use fingerprint::{fingerprint, Fingerprint};
pub use signals::{SignalContext, SignalKind, SignalProvider, SignalSet, SignalValues};
pub use state::{DataType, StateMetadata, StateTensor, StateTensorBuilder, SymbolicFeature};
pub use tensor::operations::{add, concatenate, multiply, OperationLog};
pub use tensor::{TensorBuffer, TensorStatistics};
pub use value_table::{SharedValueTable, ValueTable, ValueTableSnapshot};
