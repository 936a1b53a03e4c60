//! Error type shared by recording, estimation and replay.

use thiserror::Error;

use crate::operation::Operation;
use crate::statistics::{AccessClass, MIN_CARDINALITY};

/// An error raised by the stochastic workload model.
///
/// Contract violations (bad operation ids, arity mismatches, index-set floor
/// violations) are reported through this type instead of aborting, so the
/// model can be embedded in a host process. None of them is transient:
/// repeating the call reproduces the failure.
#[derive(Error, Debug)]
pub enum StochasticError {
    /// A raw operation id outside the operation enumeration.
    #[error("invalid operation id {0}")]
    InvalidOperation(usize),

    /// The argument classes do not match the operation's arity.
    #[error("invalid argument classes ({address}, {key}, {value}) for operation {op}")]
    InvalidArgOp {
        op: Operation,
        address: AccessClass,
        key: AccessClass,
        value: AccessClass,
    },

    /// An operation registered through the entry point of another arity.
    #[error("operation {op} takes {expected} arguments, got {found}")]
    ArityMismatch {
        op: Operation,
        expected: usize,
        found: usize,
    },

    /// An encoded operation outside `[0, NUM_ARG_OPS)`.
    #[error("encoded operation {0} is out of range")]
    ArgOpOutOfRange(usize),

    /// An opcode string with an unknown mnemonic, unknown class letter or wrong length.
    #[error("invalid opcode {0:?}")]
    InvalidOpcode(String),

    /// An index set would shrink below the sampling floor.
    #[error("index set cardinality {0} is below the minimum of {MIN_CARDINALITY}")]
    CardinalityTooLow(u64),

    /// Index 0 is the protocol-level zero account/slot and cannot be deleted.
    #[error("index 0 is reserved for the zero value")]
    ZeroIndex,

    /// An index beyond the current cardinality.
    #[error("index {index} is out of range (cardinality {cardinality})")]
    IndexOutOfRange { index: u64, cardinality: u64 },

    /// A logical identifier that was never issued or has already been deleted.
    #[error("unknown index {0}")]
    UnknownIndex(u64),

    /// The index space is exhausted.
    #[error("index space exhausted")]
    IndexSpaceExhausted,

    /// Newton-Raphson did not reach the residual bound within the iteration budget.
    #[error("lambda estimation did not converge after {iterations} iterations (residual {residual})")]
    NoConvergence { iterations: usize, residual: f64 },

    /// An empirical distribution with too few points to integrate.
    #[error("empirical distribution has {0} points, at least 2 are required")]
    EmptyDistribution(usize),

    /// The transition matrix has no eigenvalue within epsilon of 1.
    #[error("stochastic matrix has no eigenvalue within epsilon of 1")]
    NoUnitEigenvalue,

    /// The eigenvector for eigenvalue 1 is not a probability vector.
    #[error("stationary vector is not a probability distribution")]
    InvalidStationaryVector,

    /// A registry or model whose shape is inconsistent.
    #[error("malformed model: {0}")]
    MalformedModel(String),

    /// A file carrying another file id.
    #[error("unexpected file id {found:?}, expected {expected:?}")]
    WrongFileId { expected: &'static str, found: String },

    /// The bootstrap opcode was never observed in the recording.
    #[error("initial opcode {0} is not part of the model")]
    MissingInitialState(String),

    /// A visited transition row does not sum up to the drawn probability.
    #[error("transition row {0} is not stochastic")]
    MalformedChain(usize),

    /// A recent access was requested but the recency distribution has no mass beyond the head.
    #[error("recency distribution of {0} has no mass beyond the previous position")]
    EmptyRecencyDistribution(&'static str),

    /// The state backend reported a failure.
    #[error("state backend failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type Result<T, E = StochasticError> = std::result::Result<T, E>;
