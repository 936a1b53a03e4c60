//! Stochastic workload model for benchmarking blockchain state databases.
//!
//! Instead of replaying a recorded chain, a benchmark drives the database
//! under test with a synthetic operation stream whose statistics match a
//! recording: which operation follows which, how often keys recur and how
//! recently they were touched.
//!
//! # Architecture
//!
//! The model is organised as a pipeline:
//!
//! ```text
//!   trace ──▶ EventRegistry ──▶ events.json ──▶ EstimationModel ──▶ simulation.json
//!                 ▲                                                     │
//!            EventProxy                                                 ▼
//!                 ▲                                                  Replay ──▶ StateBackend
//!                 └──────────────── (optional re-recording) ────────────┘
//! ```
//!
//! - **Recording**: [`registry::EventRegistry`] classifies each argument as
//!   zero, new, previous, recent or random and counts operation transitions.
//! - **Estimation**: [`estimation::EstimationModel`] turns counts into a
//!   stochastic matrix and fits an exponential distribution to every key kind.
//! - **Replay**: [`replay::Replay`] walks the Markov chain and draws concrete
//!   indices from the index generators in [`generator`].
//!
//! # Quick Start
//!
//! ```
//! use db_stochastic::{
//!     generate::{uniform_registry, UniformConfig},
//!     replay::{self, ReplayConfig},
//!     EstimationModel, MemoryBackend,
//! };
//!
//! // Build a recording with uniform statistics
//! let registry = uniform_registry(&UniformConfig::default());
//!
//! // Estimate the simulation model
//! let model = EstimationModel::from_registry(&registry.to_json()).unwrap();
//!
//! // Replay it against the in-memory backend
//! let mut backend = MemoryBackend::new(7);
//! let config = ReplayConfig { length: 5_000, ..Default::default() };
//! let summary = replay::run(&model, config, &mut backend).unwrap();
//!
//! println!("Transactions: {}", summary.transactions);
//! ```

pub mod backend;
pub mod error;
pub mod estimation;
pub mod exponential;
pub mod generate;
pub mod generator;
pub mod logger;
pub mod markov;
pub mod operation;
pub mod registry;
pub mod replay;
pub mod report;
pub mod statistics;
pub mod workload;

// ============================================================================
// Re-exports
// ============================================================================

pub use backend::{EventProxy, MemoryBackend, ReplayStep, StateBackend};
pub use error::{Result, StochasticError};
pub use estimation::{EstimationModel, KindStats};
pub use operation::{ArgOp, Operation};
pub use registry::{EventRegistry, EventRegistryJson};
pub use replay::{Replay, ReplayConfig, ReplaySummary};
pub use statistics::{AccessClass, AccessStats};
