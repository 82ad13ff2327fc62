#![allow(non_snake_case)]

use types::Float;
pub extern crate nalgebra as na;

pub mod config;
pub mod contact;
pub mod dynamics;
pub mod error;
pub mod models;
pub mod osc;
pub mod qp;
pub mod relaxation;
pub mod tracking;
pub mod types;
pub mod util;

pub use config::{OscConfig, OscSettings};
pub use error::{ConfigError, InputError, ModelError, OscError, SolverError};
pub use osc::{CommandStatus, OscCore, OscDiagnostics, OscSolution, TickInputs, TorqueCommand};
pub use types::{GaitPhase, GeneralizedState, PhaseId, TrajectorySample};

pub const GRAVITY: Float = 9.81;

pub const PI: Float = std::f64::consts::PI;
