use std::ops::Range;

use crate::relaxation::ConstraintMode;

/// Column ranges of the decision vector of one tick's QP:
///     x = [v_dot | λ_contact | λ_loop | u | s_contact | s_loop]
///
/// Sizes change with the number of active contacts, so a fresh layout is
/// built every tick and never reused across phase changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableLayout {
    pub accelerations: Range<usize>,
    pub contact_forces: Range<usize>,
    pub loop_forces: Range<usize>,
    pub inputs: Range<usize>,
    pub contact_slack: Range<usize>,
    pub loop_slack: Range<usize>,
}

impl VariableLayout {
    pub fn new(
        num_velocities: usize,
        num_contacts: usize,
        num_loop_rows: usize,
        num_actuators: usize,
        contact_mode: &ConstraintMode,
        loop_mode: &ConstraintMode,
    ) -> Self {
        let mut offset = 0;
        let mut next = |len: usize| {
            let range = offset..offset + len;
            offset += len;
            range
        };
        let accelerations = next(num_velocities);
        let contact_forces = next(3 * num_contacts);
        let loop_forces = next(num_loop_rows);
        let inputs = next(num_actuators);
        let contact_slack = next(contact_mode.slack_rows(3 * num_contacts));
        let loop_slack = next(loop_mode.slack_rows(num_loop_rows));
        VariableLayout {
            accelerations,
            contact_forces,
            loop_forces,
            inputs,
            contact_slack,
            loop_slack,
        }
    }

    pub fn num_variables(&self) -> usize {
        self.loop_slack.end
    }

    pub fn num_contacts(&self) -> usize {
        self.contact_forces.len() / 3
    }

    /// Force columns of the i-th active contact.
    pub fn contact(&self, i: usize) -> Range<usize> {
        let start = self.contact_forces.start + 3 * i;
        start..start + 3
    }

    /// Slack columns of the i-th active contact, if contacts are soft.
    pub fn contact_slack(&self, i: usize) -> Option<Range<usize>> {
        if self.contact_slack.is_empty() {
            return None;
        }
        let start = self.contact_slack.start + 3 * i;
        Some(start..start + 3)
    }

    pub fn loop_slack(&self) -> Option<Range<usize>> {
        if self.loop_slack.is_empty() {
            None
        } else {
            Some(self.loop_slack.clone())
        }
    }
}
