//! The controller: one QP per tick, from state and desired trajectories to
//! joint torques.

use std::{
    collections::{HashMap, HashSet},
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use na::{DVector, Vector3};

use crate::{
    config::{FallbackPolicy, OscConfig},
    dynamics::DynamicsEvaluator,
    error::{ConfigError, InputError, ModelError, OscError, SolverError},
    qp::{QpBuilder, QpProblem, QpSolver, TickContext},
    tracking::TaskTerm,
    types::{Float, GaitPhase, GeneralizedState, PhaseId, TrajectorySample},
};

/// Everything the controller receives for one tick. A missing state or
/// phase means the upstream estimator or state machine dropped out.
pub struct TickInputs<'a> {
    pub time: Float,
    pub state: Option<&'a GeneralizedState>,
    pub phase: Option<GaitPhase>,
    /// Desired trajectory sample per objective name
    pub samples: &'a HashMap<String, TrajectorySample>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandStatus {
    /// Torques of this tick's QP solution
    Solved,
    /// The solve failed; torques follow the fallback policy
    Fallback,
    /// Inputs were missing or invalid; the previous command is held
    Skipped,
}

/// One torque per actuator, in the actuator order of the model.
#[derive(Clone, Debug, PartialEq)]
pub struct TorqueCommand {
    pub time: Float,
    pub torques: DVector<Float>,
    pub status: CommandStatus,
}

/// Full solution of one tick's QP.
#[derive(Clone, Debug)]
pub struct OscSolution {
    pub phase: PhaseId,
    pub accelerations: DVector<Float>,
    /// World-frame force of each active contact, in contact-set order
    pub contact_forces: Vec<(String, Vector3<Float>)>,
    pub loop_forces: DVector<Float>,
    pub inputs: DVector<Float>,
    pub contact_slack: DVector<Float>,
    pub loop_slack: DVector<Float>,
    /// Cost terms of the objectives that were active
    pub terms: Vec<TaskTerm>,
    pub cost: Float,
    /// Largest constraint violation of the returned point
    pub violation: Float,
    pub solve_time: Duration,
}

impl OscSolution {
    pub fn contact_force(&self, name: &str) -> Option<&Vector3<Float>> {
        self.contact_forces
            .iter()
            .find(|(contact, _)| contact == name)
            .map(|(_, force)| force)
    }

    pub fn term(&self, name: &str) -> Option<&TaskTerm> {
        self.terms.iter().find(|term| term.name == name)
    }
}

/// Running counters of what the controller has done.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OscDiagnostics {
    pub ticks: u64,
    pub solves: u64,
    pub failures: u64,
    pub skipped: u64,
    pub last_failure: Option<String>,
    pub last_solve_time: Option<Duration>,
}

/// Whole-body operational space controller.
///
/// Holds the immutable configuration, the robot model and the QP solver.
/// Every tick resolves the active objectives and contacts from the gait
/// phase, assembles a fresh QP, solves it and emits the actuator torques.
/// [`tick`](OscCore::tick) always returns a finite command.
pub struct OscCore {
    config: OscConfig,
    model: Box<dyn DynamicsEvaluator>,
    solver: Box<dyn QpSolver>,
    builder: QpBuilder,
    last_command: Option<DVector<Float>>,
    last_solution: Option<OscSolution>,
    diagnostics: OscDiagnostics,
}

impl OscCore {
    pub fn new(
        config: OscConfig,
        model: Box<dyn DynamicsEvaluator>,
        solver: Box<dyn QpSolver>,
    ) -> Result<Self, ConfigError> {
        let settings = &config.settings;
        settings.validate()?;

        let nv = model.num_velocities();
        let nu = model.num_actuators();
        let B = model.actuation_matrix();
        if B.nrows() != nv || B.ncols() != nu {
            return Err(ConfigError::DimensionMismatch {
                what: "actuation matrix".to_string(),
                expected: nv * nu,
                got: B.nrows() * B.ncols(),
            });
        }
        if let Some(limits) = model.effort_limits() {
            if limits.len() != nu {
                return Err(ConfigError::DimensionMismatch {
                    what: "effort limits".to_string(),
                    expected: nu,
                    got: limits.len(),
                });
            }
            if limits.iter().any(|l| !l.is_finite() || *l < 0.) {
                return Err(ConfigError::InvalidValue {
                    field: "effort limits".to_string(),
                    message: "must be finite and >= 0".to_string(),
                });
            }
        }

        let mut names = HashSet::new();
        for objective in &config.objectives {
            if !names.insert(objective.name()) {
                return Err(ConfigError::DuplicateObjective(objective.name().to_string()));
            }
            objective.validate_against(model.as_ref())?;
        }

        config.contacts.validate(
            model.as_ref(),
            settings.default_friction,
            settings.default_cone,
            solver.supports_second_order_cones(),
        )?;

        let builder = QpBuilder::new(settings, model.as_ref())?;

        info!(
            "OSC configured: nv={}, nu={}, {} objectives, contacts in {} phases",
            nv,
            nu,
            config.objectives.len(),
            config.contacts.phases().count()
        );

        Ok(OscCore {
            config,
            model,
            solver,
            builder,
            last_command: None,
            last_solution: None,
            diagnostics: OscDiagnostics::default(),
        })
    }

    pub fn config(&self) -> &OscConfig {
        &self.config
    }

    pub fn model(&self) -> &dyn DynamicsEvaluator {
        self.model.as_ref()
    }

    pub fn diagnostics(&self) -> &OscDiagnostics {
        &self.diagnostics
    }

    pub fn last_command(&self) -> Option<&DVector<Float>> {
        self.last_command.as_ref()
    }

    /// Solution behind the last command, if that tick was solved.
    pub fn last_solution(&self) -> Option<&OscSolution> {
        self.last_solution.as_ref()
    }

    /// QP of this tick, without solving it.
    pub fn problem(&self, inputs: &TickInputs) -> Result<QpProblem, OscError> {
        self.prepare(inputs).map(|(problem, _, _)| problem)
    }

    fn prepare(
        &self,
        inputs: &TickInputs,
    ) -> Result<(QpProblem, Vec<TaskTerm>, PhaseId), OscError> {
        let state = inputs.state.ok_or(InputError::MissingState)?;
        let phase = inputs.phase.ok_or(InputError::MissingPhase)?;
        if !inputs.time.is_finite() || !phase.transition_time.is_finite() {
            return Err(InputError::NonFinite("time").into());
        }
        if !state.is_finite() {
            return Err(InputError::NonFinite("state").into());
        }
        let model = self.model.as_ref();
        model.check_state(state)?;

        let time_in_phase = phase.time_in_phase(inputs.time);
        let mut terms = vec![];
        for objective in &self.config.objectives {
            let sample = inputs.samples.get(objective.name());
            if let Some(term) = objective.evaluate(model, state, phase.id, time_in_phase, sample)? {
                terms.push(term);
            }
        }

        let contacts = self.config.contacts.active(phase.id);
        let problem = self.builder.build(&TickContext {
            model,
            state,
            terms: &terms,
            contacts,
        })?;
        if !problem.is_finite() {
            return Err(ModelError::NonFinite("QP data").into());
        }
        Ok((problem, terms, phase.id))
    }

    /// Solve this tick's QP and return the full solution.
    pub fn solve(&mut self, inputs: &TickInputs) -> Result<OscSolution, OscError> {
        let (problem, terms, phase) = self.prepare(inputs)?;

        let start = Instant::now();
        let x = self.solver.solve(&problem, &self.config.settings.solver)?;
        let solve_time = start.elapsed();

        if x.len() != problem.num_variables() {
            return Err(SolverError::SolutionDimension {
                expected: problem.num_variables(),
                got: x.len(),
            }
            .into());
        }
        if !x.iter().all(|v| v.is_finite()) {
            return Err(SolverError::NonFinite.into());
        }

        self.diagnostics.solves += 1;
        self.diagnostics.last_solve_time = Some(solve_time);
        let violation = problem.max_violation(&x);
        debug!(
            "t={:.4} phase={} QP {} vars x {} rows ({} objectives, {} contacts) in {:?}, viol {:.1e}",
            inputs.time,
            phase,
            problem.num_variables(),
            problem.num_constraints(),
            terms.len(),
            problem.layout.num_contacts(),
            solve_time,
            violation
        );

        let layout = &problem.layout;
        let contact_forces = self
            .config
            .contacts
            .active(phase)
            .iter()
            .enumerate()
            .map(|(i, contact)| {
                let columns = layout.contact(i);
                (
                    contact.name.clone(),
                    Vector3::new(x[columns.start], x[columns.start + 1], x[columns.start + 2]),
                )
            })
            .collect();
        let block = |range: &std::ops::Range<usize>| x.rows(range.start, range.len()).into_owned();

        Ok(OscSolution {
            phase,
            accelerations: block(&layout.accelerations),
            contact_forces,
            loop_forces: block(&layout.loop_forces),
            inputs: block(&layout.inputs),
            contact_slack: block(&layout.contact_slack),
            loop_slack: block(&layout.loop_slack),
            terms,
            cost: problem.cost(&x),
            violation,
            solve_time,
        })
    }

    /// Run one control tick. Never fails and never emits non-finite torques:
    /// input problems hold the previous command, model and solver failures
    /// apply the fallback policy.
    pub fn tick(&mut self, inputs: &TickInputs) -> TorqueCommand {
        self.diagnostics.ticks += 1;
        self.last_solution = None;
        let (torques, status) = match self.solve(inputs) {
            Ok(solution) => {
                let torques = solution.inputs.clone();
                self.last_solution = Some(solution);
                (torques, CommandStatus::Solved)
            }
            Err(OscError::Input(e)) => {
                warn!("t={:.4}: skipping tick, {}", inputs.time, e);
                self.diagnostics.skipped += 1;
                self.diagnostics.last_failure = Some(e.to_string());
                (self.previous_or_zero(), CommandStatus::Skipped)
            }
            Err(e) => {
                warn!(
                    "t={:.4}: {}, falling back to {:?}",
                    inputs.time, e, self.config.settings.fallback
                );
                self.diagnostics.failures += 1;
                self.diagnostics.last_failure = Some(e.to_string());
                let torques = match self.config.settings.fallback {
                    FallbackPolicy::HoldPrevious => self.previous_or_zero(),
                    FallbackPolicy::Zero => DVector::zeros(self.model.num_actuators()),
                };
                (torques, CommandStatus::Fallback)
            }
        };
        self.last_command = Some(torques.clone());
        TorqueCommand {
            time: inputs.time,
            torques,
            status,
        }
    }

    fn previous_or_zero(&self) -> DVector<Float> {
        self.last_command
            .clone()
            .unwrap_or_else(|| DVector::zeros(self.model.num_actuators()))
    }
}
