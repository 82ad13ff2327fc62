//! The quadratic program solved every tick.

pub mod builder;
pub mod layout;
pub mod problem;
pub mod solver;

pub use builder::{QpBuilder, TickContext};
pub use layout::VariableLayout;
pub use problem::{ConeBlock, ConeKind, ConstraintStack, QpProblem};
pub use solver::{ClarabelSolver, QpSolver, SolverBudget};
