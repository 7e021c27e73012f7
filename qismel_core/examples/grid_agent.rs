//! Grid Agent - a QISMEL learner walking to a goal on a small grid
//!
//! Loads `config/engine.toml` when present, runs the agent loop with a
//! novelty bonus and a symbolic distance score, then checkpoints the table.
//!
//! Run with: RUST_LOG=info cargo run --example grid_agent

use anyhow::{Context, Result};
use qismel_core::signals::{from_fn, NoveltySignal, SignalKind, SignalSet};
use qismel_core::{AgentLoop, Checkpointable, EngineConfig, Environment, StateTensor, TensorBuffer};
use tracing_subscriber::EnvFilter;

const SIZE: usize = 5;
const GOAL: (usize, usize) = (SIZE - 1, SIZE - 1);

struct Grid {
    position: (usize, usize),
    episodes: usize,
}

impl Grid {
    fn new() -> Self {
        Self {
            position: (0, 0),
            episodes: 0,
        }
    }
}

impl Environment for Grid {
    fn perceive(&mut self) -> Result<StateTensor> {
        let mut buffer = TensorBuffer::zeros(&[SIZE, SIZE])?;
        buffer.set(&[self.position.0, self.position.1], 1.0)?;
        let state = StateTensor::builder(buffer)
            .feature("agent", vec![self.position.0, self.position.1], "object")
            .feature("goal", vec![GOAL.0, GOAL.1], "goal")
            .source("grid")
            .task_context("reach-goal")
            .env_context("grid-5x5")
            .build()?;
        Ok(state)
    }

    fn actions(&self, _state: &StateTensor) -> Vec<String> {
        ["north", "south", "east", "west"]
            .iter()
            .map(|action| action.to_string())
            .collect()
    }

    fn act(&mut self, action: &str) -> Result<f64> {
        let (row, col) = self.position;
        self.position = match action {
            "north" => (row.saturating_sub(1), col),
            "south" => ((row + 1).min(SIZE - 1), col),
            "east" => (row, (col + 1).min(SIZE - 1)),
            "west" => (row, col.saturating_sub(1)),
            other => anyhow::bail!("unknown action '{other}'"),
        };
        if self.position == GOAL {
            self.position = (0, 0);
            self.episodes += 1;
            Ok(10.0)
        } else {
            Ok(-0.1)
        }
    }
}

/// Negative Manhattan distance between the agent and goal features.
fn goal_distance(state: &StateTensor) -> Result<f64> {
    let find = |kind: &str| {
        state
            .features()
            .iter()
            .find(|feature| feature.kind == kind)
            .map(|feature| feature.coords.clone())
            .with_context(|| format!("state has no '{kind}' feature"))
    };
    let agent = find("object")?;
    let goal = find("goal")?;
    let distance: usize = agent.iter().zip(&goal).map(|(a, g)| a.abs_diff(*g)).sum();
    Ok(-(distance as f64) / (2 * (SIZE - 1)) as f64)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("QISMEL grid agent");
    println!("=================\n");

    let config = EngineConfig::load_from_file("config/engine.toml").unwrap_or_else(|err| {
        println!("Using default configuration ({err})");
        EngineConfig::default()
    });
    println!("Weights: {:?}", config.weights);

    let engine = config.build_engine()?;
    let signals = SignalSet::zero()
        .with(SignalKind::Intrinsic, NoveltySignal::new(1.0))
        .with(
            SignalKind::Symbolic,
            from_fn("goal-distance", |ctx| goal_distance(ctx.next_state)),
        );

    let mut agent = AgentLoop::new(engine, Grid::new(), signals, config.agent.clone());
    let summary = agent.run()?;

    println!("\nCycles:        {}", summary.cycles);
    println!("Stop reason:   {:?}", summary.stop_reason);
    println!("Total reward:  {:.2}", summary.total_reward);
    println!("Goals reached: {}", agent.environment().episodes);

    let table = agent.engine().table();
    let table = table.lock();
    println!(
        "Table entries: {} (hit rate {:.1}%)",
        table.len(),
        table.hit_rate() * 100.0
    );

    let path = std::path::Path::new("out").join("grid_agent_table.bin");
    table
        .save_checkpoint(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    println!("Checkpoint:    {}", path.display());
    Ok(())
}
