//! Global progression phases and their disjunctive transition thresholds.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::BalanceTable;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Tutorial,
    Early,
    Mid,
    Late,
    Endgame,
}

impl Phase {
    pub const ALL: [Self; 5] = [
        Self::Tutorial,
        Self::Early,
        Self::Mid,
        Self::Late,
        Self::Endgame,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Tutorial => 0,
            Self::Early => 1,
            Self::Mid => 2,
            Self::Late => 3,
            Self::Endgame => 4,
        }
    }

    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Tutorial => Some(Self::Early),
            Self::Early => Some(Self::Mid),
            Self::Mid => Some(Self::Late),
            Self::Late => Some(Self::Endgame),
            Self::Endgame => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tutorial => "tutorial",
            Self::Early => "early",
            Self::Mid => "mid",
            Self::Late => "late",
            Self::Endgame => "endgame",
        }
    }

    /// Phase a player is expected to have reached by `day`.
    #[must_use]
    pub const fn expected_for_day(day: u32) -> Self {
        match day {
            0..=1 => Self::Tutorial,
            2..=5 => Self::Early,
            6..=12 => Self::Mid,
            13..=20 => Self::Late,
            _ => Self::Endgame,
        }
    }

    /// The single forward step due this tick, if any.
    ///
    /// Exiting phase `i` requires `active_plots >= plot_thresholds[i]` or
    /// `day >= day_thresholds[i]`. Never skips a phase even when several
    /// thresholds are already met.
    #[must_use]
    pub fn due_transition(self, active_plots: u32, day: u32, balance: &BalanceTable) -> Option<Self> {
        let next = self.next()?;
        let idx = self.index();
        let plots_met = active_plots >= balance.phase_plot_thresholds[idx];
        let day_met = day >= balance.phase_day_thresholds[idx];
        (plots_met || day_met).then_some(next)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded forward step of the phase machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    pub day: u32,
    pub tick: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_index() {
        for pair in Phase::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].index() + 1, pair[1].index());
            assert_eq!(pair[0].next(), Some(pair[1]));
        }
        assert_eq!(Phase::Endgame.next(), None);
    }

    #[test]
    fn tutorial_exits_on_day_one() {
        let balance = BalanceTable::default();
        assert_eq!(
            Phase::Tutorial.due_transition(0, 1, &balance),
            Some(Phase::Early)
        );
    }

    #[test]
    fn transitions_step_one_phase_at_a_time() {
        let balance = BalanceTable::default();
        // Every threshold is exceeded, yet only one step is due.
        assert_eq!(
            Phase::Early.due_transition(100, 30, &balance),
            Some(Phase::Mid)
        );
        assert_eq!(Phase::Early.due_transition(9, 2, &balance), None);
        assert_eq!(Phase::Mid.due_transition(25, 2, &balance), Some(Phase::Late));
        assert_eq!(Phase::Late.due_transition(0, 15, &balance), Some(Phase::Endgame));
        assert_eq!(Phase::Endgame.due_transition(999, 999, &balance), None);
    }

    #[test]
    fn expected_phase_by_day() {
        assert_eq!(Phase::expected_for_day(1), Phase::Tutorial);
        assert_eq!(Phase::expected_for_day(5), Phase::Early);
        assert_eq!(Phase::expected_for_day(12), Phase::Mid);
        assert_eq!(Phase::expected_for_day(20), Phase::Late);
        assert_eq!(Phase::expected_for_day(21), Phase::Endgame);
    }
}
