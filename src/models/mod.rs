//! Small reference robots implementing [`DynamicsEvaluator`], used by the
//! demos and tests. Real robots plug in their own evaluator.
//!
//! [`DynamicsEvaluator`]: crate::dynamics::DynamicsEvaluator

pub mod floating_body;
pub mod point_mass;

pub use floating_body::FloatingBodyModel;
pub use point_mass::PointMassModel;
