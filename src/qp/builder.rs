use std::ops::Range;

use na::{DMatrix, DVector};

use super::{
    layout::VariableLayout,
    problem::{ConeKind, ConstraintStack, QpProblem},
};
use crate::{
    config::OscSettings,
    contact::{
        friction::{friction_cone_rows, min_normal_row},
        ConeRows, ContactPoint,
    },
    dynamics::{DynamicsEvaluator, PointKinematics},
    error::{ConfigError, ModelError},
    relaxation::{add_slack_penalty, holonomic_rows, ConstraintMode},
    tracking::TaskTerm,
    types::{Float, GeneralizedState},
};

/// Everything that changes from one tick to the next.
pub struct TickContext<'a> {
    pub model: &'a dyn DynamicsEvaluator,
    pub state: &'a GeneralizedState,
    /// Cost terms of the objectives active this tick
    pub terms: &'a [TaskTerm],
    /// Contacts active this tick, in force-column order
    pub contacts: &'a [ContactPoint],
}

/// Assembles the QP of one tick:
///
/// ```text
///     minimize    Σ W_i ‖J_i v_dot + J_dot_i v - ddy_cmd_i‖²
///                 + w_acc ‖v_dot‖² + Σ_j w_j v_dot_j² + w_u ‖u‖² + w_λ ‖λ‖²
///                 + w_c ‖s_c‖² + w_h ‖s_h‖²
///     subject to  M v_dot + c = B u + J_cᵀ λ_c + J_hᵀ λ_h
///                 J_c v_dot + J_dot_c v = s_c     (s_c = 0 when hard)
///                 J_h v_dot + J_dot_h v = s_h     (s_h = 0 when hard)
///                 λ_c in the friction cone, n·λ_c >= λ_min
///                 |u| <= u_max
/// ```
///
/// Nothing is cached between ticks.
pub struct QpBuilder {
    settings: OscSettings,
    /// (velocity index, weight) of each extra joint acceleration cost
    joint_costs: Vec<(usize, Float)>,
}

impl QpBuilder {
    pub fn new(settings: &OscSettings, model: &dyn DynamicsEvaluator) -> Result<Self, ConfigError> {
        let joint_costs = settings
            .joint_acceleration_costs
            .iter()
            .map(|(joint, weight)| {
                model
                    .joint_index(joint)
                    .map(|index| (index.velocity, *weight))
                    .ok_or_else(|| ConfigError::UnknownJoint(joint.clone()))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(QpBuilder {
            settings: settings.clone(),
            joint_costs,
        })
    }

    pub fn build(&self, ctx: &TickContext) -> Result<QpProblem, ModelError> {
        let model = ctx.model;
        let state = ctx.state;
        model.check_state(state)?;
        let nv = model.num_velocities();
        let nu = model.num_actuators();

        let M = model.mass_matrix(state)?;
        check_shape("mass matrix", M.shape(), (nv, nv))?;
        let bias = model.dynamics_bias(state)?;
        check_shape("dynamics bias", bias.shape(), (nv, 1))?;
        let B = model.actuation_matrix();
        check_shape("actuation matrix", B.shape(), (nv, nu))?;

        let contact_kinematics = ctx
            .contacts
            .iter()
            .map(|contact| -> Result<PointKinematics, ModelError> {
                let kin = model.point(state, &contact.point)?;
                check_columns(
                    &format!("jacobian of contact '{}'", contact.name),
                    kin.jacobian.ncols(),
                    nv,
                )?;
                Ok(kin)
            })
            .collect::<Result<Vec<PointKinematics>, ModelError>>()?;

        let loops = model.loop_constraints(state)?;
        if let Some(loops) = &loops {
            check_columns("loop constraint jacobian", loops.jacobian.ncols(), nv)?;
            check_shape("loop constraint bias", loops.jdot_v.shape(), (loops.rows(), 1))?;
        }
        let num_loop_rows = loops.as_ref().map_or(0, |l| l.rows());

        let layout = VariableLayout::new(
            nv,
            ctx.contacts.len(),
            num_loop_rows,
            nu,
            &self.settings.contact_mode,
            &self.settings.loop_mode,
        );
        let n = layout.num_variables();

        // Cost
        let mut P = DMatrix::zeros(n, n);
        let mut q = DVector::zeros(n);
        for term in ctx.terms {
            term.add_cost(&mut P, &mut q);
        }
        add_diagonal(&mut P, &layout.accelerations, self.settings.acceleration_regularization);
        for &(index, weight) in &self.joint_costs {
            P[(index, index)] += 2. * weight;
        }
        add_diagonal(&mut P, &layout.inputs, self.settings.input_regularization);
        add_diagonal(
            &mut P,
            &layout.contact_forces,
            self.settings.contact_force_regularization,
        );
        if let ConstraintMode::Soft { weight } = self.settings.contact_mode {
            add_slack_penalty(&mut P, &layout.contact_slack, weight);
        }
        if let ConstraintMode::Soft { weight } = self.settings.loop_mode {
            add_slack_penalty(&mut P, &layout.loop_slack, weight);
        }

        let mut constraints = ConstraintStack::new(n);

        // Dynamics: M v_dot - J_cᵀ λ_c - J_hᵀ λ_h - B u = -c
        let mut A_dynamics = DMatrix::zeros(nv, n);
        A_dynamics
            .view_mut((0, layout.accelerations.start), (nv, nv))
            .copy_from(&M);
        for (i, kin) in contact_kinematics.iter().enumerate() {
            A_dynamics
                .view_mut((0, layout.contact(i).start), (nv, 3))
                .copy_from(&-kin.jacobian.transpose());
        }
        if let Some(loops) = &loops {
            A_dynamics
                .view_mut((0, layout.loop_forces.start), (nv, num_loop_rows))
                .copy_from(&-loops.jacobian.transpose());
        }
        A_dynamics
            .view_mut((0, layout.inputs.start), (nv, nu))
            .copy_from(&-&B);
        constraints.push(ConeKind::Zero, A_dynamics, -bias);

        // Contact no-slip
        for (i, kin) in contact_kinematics.iter().enumerate() {
            let J = DMatrix::from_column_slice(3, nv, kin.jacobian.as_slice());
            let jdot_v = DVector::from_column_slice(kin.jdot_v.as_slice());
            let slack = layout.contact_slack(i);
            let (A, b) = holonomic_rows(&J, &jdot_v, &layout.accelerations, slack.as_ref(), n);
            constraints.push(ConeKind::Zero, A, b);
        }

        // Closed kinematic loops
        if let Some(loops) = &loops {
            let slack = layout.loop_slack();
            let (A, b) = holonomic_rows(
                &loops.jacobian,
                &loops.jdot_v,
                &layout.accelerations,
                slack.as_ref(),
                n,
            );
            constraints.push(ConeKind::Zero, A, b);
        }

        // Minimum normal force and friction cones
        let cones: Vec<ConeRows> = ctx
            .contacts
            .iter()
            .map(|contact| {
                friction_cone_rows(
                    &contact.frame(),
                    &contact.friction_or(self.settings.default_friction),
                    &contact.cone_or(self.settings.default_cone),
                )
            })
            .collect();
        for (i, contact) in ctx.contacts.iter().enumerate() {
            let columns = layout.contact(i);
            let (row, bound) = min_normal_row(&contact.frame(), self.settings.min_normal_force);
            let mut A = DMatrix::zeros(1, n);
            A.view_mut((0, columns.start), (1, 3)).copy_from(&row);
            constraints.push(ConeKind::Nonnegative, A, DVector::from_element(1, bound));

            if let ConeRows::Polyhedral(G) = &cones[i] {
                let rows = G.nrows();
                let mut A = DMatrix::zeros(rows, n);
                A.view_mut((0, columns.start), (rows, 3)).copy_from(G);
                constraints.push(ConeKind::Nonnegative, A, DVector::zeros(rows));
            }
        }

        // Effort limits: u <= u_max, -u <= u_max
        if let Some(limits) = model.effort_limits() {
            if limits.len() != nu {
                return Err(ModelError::EffortLimits {
                    expected: nu,
                    got: limits.len(),
                });
            }
            let mut A = DMatrix::zeros(2 * nu, n);
            let mut b = DVector::zeros(2 * nu);
            for k in 0..nu {
                A[(k, layout.inputs.start + k)] = 1.;
                A[(nu + k, layout.inputs.start + k)] = -1.;
                b[k] = limits[k];
                b[nu + k] = limits[k];
            }
            constraints.push(ConeKind::Nonnegative, A, b);
        }

        // Second-order cones go last, one block per contact
        for (i, cone) in cones.iter().enumerate() {
            if let ConeRows::SecondOrder(S) = cone {
                let mut A = DMatrix::zeros(3, n);
                A.view_mut((0, layout.contact(i).start), (3, 3))
                    .copy_from(&-S);
                constraints.push(ConeKind::SecondOrder, A, DVector::zeros(3));
            }
        }

        let (A, b, cones) = constraints.finish();
        Ok(QpProblem {
            P,
            q,
            A,
            b,
            cones,
            layout,
        })
    }
}

fn check_columns(what: &str, got: usize, expected: usize) -> Result<(), ModelError> {
    if got != expected {
        return Err(ModelError::JacobianColumns {
            what: what.to_string(),
            expected,
            got,
        });
    }
    Ok(())
}

fn check_shape(
    what: &str,
    (got_rows, got_cols): (usize, usize),
    (rows, cols): (usize, usize),
) -> Result<(), ModelError> {
    if (got_rows, got_cols) != (rows, cols) {
        return Err(ModelError::Shape {
            what: what.to_string(),
            rows,
            cols,
            got_rows,
            got_cols,
        });
    }
    Ok(())
}

/// Adds w ‖x_range‖² to the cost ½ xᵀPx + qᵀx.
fn add_diagonal(P: &mut DMatrix<Float>, range: &Range<usize>, weight: Float) {
    if weight == 0. {
        return;
    }
    for i in range.clone() {
        P[(i, i)] += 2. * weight;
    }
}

#[cfg(test)]
mod builder_tests {
    use na::{dvector, vector, UnitQuaternion};

    use super::*;
    use crate::{
        assert_close,
        contact::{ConeModel, Friction},
        models::{FloatingBodyModel, PointMassModel},
        util::asymmetry,
        GRAVITY,
    };

    fn feet() -> Vec<ContactPoint> {
        vec![
            ContactPoint::new("toe_left", "pelvis", vector![0.1, 0.1, -0.25]),
            ContactPoint::new("heel_left", "pelvis", vector![-0.1, 0.1, -0.25]),
            ContactPoint::new("toe_right", "pelvis", vector![0.1, -0.1, -0.25]),
            ContactPoint::new("heel_right", "pelvis", vector![-0.1, -0.1, -0.25])
                .with_cone(ConeModel::Conic),
        ]
    }

    #[test]
    fn dynamics_only_problem() {
        // Arrange
        let model = PointMassModel::new(2., GRAVITY);
        let state = GeneralizedState::new(dvector![0., 0., 1.], dvector![0., 0., 0.]);
        let builder = QpBuilder::new(&OscSettings::default(), &model).unwrap();

        // Act
        let qp = builder
            .build(&TickContext {
                model: &model,
                state: &state,
                terms: &[],
                contacts: &[],
            })
            .unwrap();

        // Assert: 3 accelerations, 3 dynamics rows, strictly convex cost
        assert_eq!(qp.num_variables(), 3);
        assert_eq!(qp.num_constraints(), 3);
        assert_eq!(qp.cones.len(), 1);
        assert_eq!(qp.P, DMatrix::identity(3, 3) * 2e-4);
        assert_close!(qp.b[2], -2. * GRAVITY, 1e-12);
    }

    #[test]
    fn double_stance_layout_and_rows() {
        // Arrange
        let model = FloatingBodyModel::cuboid("pelvis", 10., vector![0.3, 0.2, 0.5], GRAVITY)
            .with_base_actuation()
            .with_effort_limit(100.);
        let state = model.rest_state(vector![0., 0., 0.25], UnitQuaternion::identity());
        let settings = OscSettings {
            default_friction: Friction::Isotropic(0.5),
            default_cone: ConeModel::Linear { facets: 4 },
            min_normal_force: 5.,
            ..OscSettings::default()
        };
        let builder = QpBuilder::new(&settings, &model).unwrap();
        let contacts = feet();

        // Act
        let qp = builder
            .build(&TickContext {
                model: &model,
                state: &state,
                terms: &[],
                contacts: &contacts,
            })
            .unwrap();

        // Assert
        let layout = &qp.layout;
        assert_eq!(layout.contact_forces, 6..18);
        assert_eq!(layout.inputs, 18..24);
        assert_eq!(layout.contact_slack, 24..36);
        assert_eq!(qp.num_variables(), 36);

        // 6 dynamics + 12 no-slip equalities; 4 min-normal + 3 x 4 facets +
        // 12 effort rows; one 3-dim second-order cone
        let kinds: Vec<(ConeKind, usize)> = qp.cones.iter().map(|c| (c.kind, c.dim)).collect();
        assert_eq!(
            kinds,
            vec![
                (ConeKind::Zero, 18),
                (ConeKind::Nonnegative, 28),
                (ConeKind::SecondOrder, 3),
            ]
        );
        assert_eq!(qp.num_constraints(), 49);
        assert_eq!(asymmetry(&qp.P), 0.);
        assert!(qp.is_finite());

        // Every contact has a min normal force row with the configured bound
        let min_normal_rows = (18..qp.num_constraints())
            .filter(|&r| qp.b[r] == -5.)
            .count();
        assert_eq!(min_normal_rows, 4);
    }

    #[test]
    fn unknown_joint_cost_rejected() {
        let model = PointMassModel::new(1., GRAVITY);
        let mut settings = OscSettings::default();
        settings.joint_acceleration_costs.insert("knee".to_string(), 1.);
        assert!(matches!(
            QpBuilder::new(&settings, &model),
            Err(ConfigError::UnknownJoint(_))
        ));
    }

    #[test]
    fn state_dimension_checked() {
        let model = PointMassModel::new(1., GRAVITY);
        let builder = QpBuilder::new(&OscSettings::default(), &model).unwrap();
        let state = GeneralizedState::new(DVector::zeros(2), DVector::zeros(3));
        let result = builder.build(&TickContext {
            model: &model,
            state: &state,
            terms: &[],
            contacts: &[],
        });
        assert!(matches!(result, Err(ModelError::StateDimension { .. })));
    }

    #[test]
    fn loop_bias_length_checked() {
        // Arrange: two loop rows but a one-entry bias
        let model = FloatingBodyModel::cuboid("pelvis", 5., vector![0.3, 0.2, 0.2], GRAVITY)
            .with_joint("knee", 0.1)
            .with_loop_constraints(DMatrix::zeros(2, 7), dvector![0.]);
        let state = model.rest_state(vector![0., 0., 1.], UnitQuaternion::identity());
        let builder = QpBuilder::new(&OscSettings::default(), &model).unwrap();

        // Act
        let result = builder.build(&TickContext {
            model: &model,
            state: &state,
            terms: &[],
            contacts: &[],
        });

        // Assert
        assert_eq!(
            result.unwrap_err(),
            ModelError::Shape {
                what: "loop constraint bias".to_string(),
                rows: 2,
                cols: 1,
                got_rows: 1,
                got_cols: 1,
            }
        );
    }
}
