//! Contact points per gait phase and their friction-cone constraints.

pub mod friction;
pub mod set;

pub use friction::{ConeModel, ConeRows, ContactFrame, Friction};
pub use set::{ContactPoint, ContactSet};
