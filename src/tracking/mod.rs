//! Task-space tracking objectives.
//!
//! Each objective maps a desired trajectory sample and the current state to
//! an acceleration-space cost term ([`TaskTerm`]) that the QP builder sums
//! into the Hessian and linear term.

pub mod binding;
pub mod gains;
pub mod objective;
pub mod rotation;

pub use binding::{ActiveWindow, PhaseBinding};
pub use gains::FeedbackGains;
pub use objective::{DesiredSource, ObjectiveKind, ResolvedTarget, TaskTerm, TrackingObjective};
