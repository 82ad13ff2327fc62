use std::collections::HashMap;

use gorilla_osc::{
    models::FloatingBodyModel,
    na::{vector, UnitQuaternion},
    qp::ClarabelSolver,
    types::Float,
    CommandStatus, GaitPhase, OscConfig, OscCore, PhaseId, TickInputs, GRAVITY,
};
use log::info;

const CONFIG: &str = r#"
[settings]
min_normal_force = 5.0
input_regularization = 1e-4
contact_force_regularization = 1e-5
default_friction = 0.6
default_cone = { model = "linear", facets = 8 }

[settings.joint_acceleration_costs]
hip_left = 0.01
hip_right = 0.01

[[objectives]]
name = "com"
kind = "center_of_mass"
kp = [50.0, 50.0, 100.0]
kd = [10.0, 10.0, 20.0]
weight = [10.0, 10.0, 100.0]
constant = { value = [0.0, 0.0, 0.5] }

[[objectives]]
name = "pelvis_orientation"
kind = "rotational_frame"
kp = 100.0
kd = 20.0
weight = 10.0
target = { body = "pelvis" }
constant = { value = [1.0, 0.0, 0.0, 0.0] }

[[objectives]]
name = "swing_hip_left"
kind = "joint_space"
kp = 200.0
kd = 25.0
weight = 1.0
phases.right_stance = { joint = "hip_left" }
window = [0.05, 0.25]
constant = { value = [0.3] }

[[objectives]]
name = "swing_hip_right"
kind = "joint_space"
kp = 200.0
kd = 25.0
weight = 1.0
phases.left_stance = { joint = "hip_right" }
window = [0.05, 0.25]
constant = { value = [0.3] }

[[contacts]]
name = "toe_left"
body = "pelvis"
offset = [0.1, 0.1, -0.5]
phases = ["left_stance", "double_stance"]

[[contacts]]
name = "heel_left"
body = "pelvis"
offset = [-0.1, 0.1, -0.5]
phases = ["left_stance", "double_stance"]

[[contacts]]
name = "toe_right"
body = "pelvis"
offset = [0.1, -0.1, -0.5]
phases = ["right_stance", "double_stance"]
cone = { model = "conic" }

[[contacts]]
name = "heel_right"
body = "pelvis"
offset = [-0.1, -0.1, -0.5]
phases = ["right_stance", "double_stance"]
cone = { model = "conic" }
"#;

fn robot() -> FloatingBodyModel {
    FloatingBodyModel::cuboid("pelvis", 30., vector![0.3, 0.35, 1.0], GRAVITY)
        .with_base_actuation()
        .with_joint("hip_left", 0.05)
        .with_joint("hip_right", 0.05)
        .with_effort_limit(400.)
}

/// Double stance, left stance, double stance, right stance, 0.3 s each.
fn gait_phase(t: Float) -> GaitPhase {
    let period = 0.3;
    let index = (t / period).floor();
    let id = match index as u64 % 4 {
        1 => PhaseId::LEFT_STANCE,
        3 => PhaseId::RIGHT_STANCE,
        _ => PhaseId::DOUBLE_STANCE,
    };
    GaitPhase::new(id, index * period)
}

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = OscConfig::from_toml_str(CONFIG)?;
    let mut osc = OscCore::new(config, Box::new(robot()), Box::new(ClarabelSolver::new()))?;

    let model = robot();
    let mut state = model.rest_state(
        vector![0.02, -0.01, 0.48],
        UnitQuaternion::from_euler_angles(0.05, 0., 0.1),
    );
    let samples = HashMap::new();

    let final_time = 1.2;
    let dt = 1. / 500.;
    let num_steps = (final_time / dt) as usize;
    for s in 0..num_steps {
        let t = s as Float * dt;
        let command = osc.tick(&TickInputs {
            time: t,
            state: Some(&state),
            phase: Some(gait_phase(t)),
            samples: &samples,
        });
        if command.status != CommandStatus::Solved {
            continue;
        }
        if let Some(solution) = osc.last_solution() {
            if s % 50 == 0 {
                info!(
                    "t={:.2} phase={} com z={:.4} torques={:.2}",
                    t,
                    solution.phase,
                    state.q[2],
                    command.torques.transpose()
                );
            }
            state = model.integrate(&state, &solution.accelerations, dt);
        }
    }

    let diagnostics = osc.diagnostics();
    info!(
        "{} ticks, {} solves, {} failures, {} skipped, last solve {:?}",
        diagnostics.ticks,
        diagnostics.solves,
        diagnostics.failures,
        diagnostics.skipped,
        diagnostics.last_solve_time
    );
    Ok(())
}
