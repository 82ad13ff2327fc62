use thiserror::Error;

use crate::types::{Float, PhaseId};

/// Startup configuration errors. These never reach the control loop.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{matrix} of objective '{objective}' is not finite")]
    NonFiniteMatrix { objective: String, matrix: &'static str },

    #[error("{matrix} of objective '{objective}' is not symmetric")]
    AsymmetricMatrix { objective: String, matrix: &'static str },

    #[error("{matrix} of objective '{objective}' has negative eigenvalue {eigenvalue}")]
    NotPositiveSemidefinite {
        objective: String,
        matrix: &'static str,
        eigenvalue: Float,
    },

    #[error("{what} has dimension {got}, expected {expected}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        got: usize,
    },

    #[error("objective name '{0}' is used more than once")]
    DuplicateObjective(String),

    #[error("contact name '{0}' is used more than once in phase {1}")]
    DuplicateContact(String, PhaseId),

    #[error("unknown body '{0}'")]
    UnknownBody(String),

    #[error("unknown joint '{0}'")]
    UnknownJoint(String),

    #[error("invalid friction coefficient {0} (must be finite and > 0)")]
    InvalidFriction(Float),

    #[error("linear friction cone needs at least 3 facets, got {0}")]
    TooFewFacets(usize),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("contact '{0}' uses a conic friction cone but the solver has no second-order cone support")]
    ConeNotSupported(String),
}

/// Errors reported by the rigid-body dynamics evaluator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("unknown body '{0}'")]
    UnknownBody(String),

    #[error("unknown joint '{0}'")]
    UnknownJoint(String),

    #[error("{what} is {got_rows}x{got_cols}, expected {rows}x{cols}")]
    Shape {
        what: String,
        rows: usize,
        cols: usize,
        got_rows: usize,
        got_cols: usize,
    },

    #[error("{what} has {got} columns, expected one per velocity ({expected})")]
    JacobianColumns {
        what: String,
        expected: usize,
        got: usize,
    },

    #[error("model returned non-finite {0}")]
    NonFinite(&'static str),

    #[error("{got} effort limits for {expected} actuators")]
    EffortLimits { expected: usize, got: usize },

    #[error("state dimension mismatch: expected (nq={nq}, nv={nv}), got (nq={got_nq}, nv={got_nv})")]
    StateDimension {
        nq: usize,
        nv: usize,
        got_nq: usize,
        got_nv: usize,
    },
}

/// Per-tick upstream input problems. A tick hitting one of these is skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("no robot state for this tick")]
    MissingState,

    #[error("no gait phase for this tick")]
    MissingPhase,

    #[error("no desired trajectory sample for objective '{0}'")]
    MissingSample(String),

    #[error("sample for objective '{objective}' has {field} of length {got}, expected {expected}")]
    SampleDimension {
        objective: String,
        field: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("non-finite {0} input")]
    NonFinite(&'static str),
}

/// QP solver failures. Recovered per tick by the fallback policy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("solver settings rejected: {0}")]
    Settings(String),

    #[error("solver setup rejected: {0}")]
    Setup(String),

    #[error("solver did not converge: {status}")]
    NotConverged { status: String },

    #[error("solver returned {got} values for {expected} variables")]
    SolutionDimension { expected: usize, got: usize },

    #[error("solver returned a non-finite solution")]
    NonFinite,
}

/// Anything that can go wrong inside one control tick.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OscError {
    #[error("input error: {0}")]
    Input(#[from] InputError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("solver error: {0}")]
    Solver(#[from] SolverError),
}
