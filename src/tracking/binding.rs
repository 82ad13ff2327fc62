use std::collections::BTreeMap;

use itertools::Either;

use crate::types::{Float, PhaseId};

/// What an objective tracks, as a pure function of the gait phase.
///
/// `Always` tracks the same target in every phase. `PerPhase` tracks a
/// different target in each listed phase (e.g. whichever foot is swinging) and
/// nothing in the phases it does not list.
#[derive(Clone, Debug, PartialEq)]
pub enum PhaseBinding<T> {
    Always(T),
    PerPhase(BTreeMap<PhaseId, T>),
}

impl<T> PhaseBinding<T> {
    pub fn per_phase(bindings: impl IntoIterator<Item = (PhaseId, T)>) -> Self {
        PhaseBinding::PerPhase(bindings.into_iter().collect())
    }

    pub fn resolve(&self, phase: PhaseId) -> Option<&T> {
        match self {
            PhaseBinding::Always(target) => Some(target),
            PhaseBinding::PerPhase(map) => map.get(&phase),
        }
    }

    /// Every target this binding can ever resolve to.
    pub fn targets(&self) -> impl Iterator<Item = &T> {
        match self {
            PhaseBinding::Always(target) => Either::Left(std::iter::once(target)),
            PhaseBinding::PerPhase(map) => Either::Right(map.values()),
        }
    }
}

/// Interval of phase time, in seconds since the last phase transition, during
/// which an objective is allowed to be active. Both ends are inclusive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActiveWindow {
    pub start: Float,
    pub end: Float,
}

impl ActiveWindow {
    pub fn contains(&self, time_in_phase: Float) -> bool {
        self.start <= time_in_phase && time_in_phase <= self.end
    }
}
