//! The immutable product of a finished run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analyzer::Bottleneck;
use crate::engine::RunStatus;
use crate::helpers::HelperKind;
use crate::phase::Phase;
use crate::state::{GameState, StateSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    seed: u64,
    status: RunStatus,
    catalog_fingerprint: u64,
    final_state: GameState,
    snapshots: Vec<StateSnapshot>,
    bottlenecks: Vec<Bottleneck>,
}

impl RunResult {
    #[must_use]
    pub(crate) const fn new(
        seed: u64,
        status: RunStatus,
        catalog_fingerprint: u64,
        final_state: GameState,
        snapshots: Vec<StateSnapshot>,
        bottlenecks: Vec<Bottleneck>,
    ) -> Self {
        Self {
            seed,
            status,
            catalog_fingerprint,
            final_state,
            snapshots,
            bottlenecks,
        }
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub const fn status(&self) -> &RunStatus {
        &self.status
    }

    /// Fingerprint of the catalog the run was played against.
    #[must_use]
    pub const fn catalog_fingerprint(&self) -> u64 {
        self.catalog_fingerprint
    }

    #[must_use]
    pub const fn final_state(&self) -> &GameState {
        &self.final_state
    }

    #[must_use]
    pub fn snapshots(&self) -> &[StateSnapshot] {
        &self.snapshots
    }

    /// Bottlenecks detected when the run closed.
    #[must_use]
    pub fn bottlenecks(&self) -> &[Bottleneck] {
        &self.bottlenecks
    }

    /// Day on which `phase` was entered, if it was reached.
    #[must_use]
    pub fn phase_entry_day(&self, phase: Phase) -> Option<u32> {
        self.final_state.metrics.phase_entry_day(phase)
    }

    /// Day the first helper of `kind` was found.
    #[must_use]
    pub fn helper_discovery_day(&self, kind: HelperKind) -> Option<u32> {
        self.final_state
            .metrics
            .helper_discoveries
            .iter()
            .find(|d| d.kind == kind)
            .map(|d| d.day)
    }

    /// Final resources keyed by name: `energy`, `gold`, then each material.
    #[must_use]
    pub fn final_resources(&self) -> BTreeMap<String, f64> {
        let resources = &self.final_state.resources;
        let mut out = BTreeMap::new();
        out.insert("energy".to_string(), resources.energy());
        out.insert(
            "gold".to_string(),
            crate::numbers::u64_to_f64(resources.gold()),
        );
        for (name, amount) in resources.materials() {
            out.insert(name.clone(), crate::numbers::u64_to_f64(*amount));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::GameConfiguration;
    use crate::clock::FixedClock;
    use crate::engine::{Simulation, SimulationSettings};
    use crate::profile::PlayerProfile;
    use std::sync::Arc;

    #[test]
    fn finished_run_exposes_its_history() {
        let catalog = Arc::new(GameConfiguration::builtin().unwrap());
        let fingerprint = catalog.fingerprint();
        let mut sim = Simulation::new(
            catalog,
            PlayerProfile::default(),
            SimulationSettings::default().with_max_days(2),
            99,
        )
        .with_session_clock(FixedClock::idle());
        sim.run_to_completion();
        let result = sim.finish().unwrap();
        assert_eq!(result.seed(), 99);
        assert_eq!(*result.status(), RunStatus::Completed);
        assert_eq!(result.catalog_fingerprint(), fingerprint);
        assert_eq!(result.phase_entry_day(Phase::Early), Some(1));
        assert_eq!(result.phase_entry_day(Phase::Endgame), None);
        assert!(result.snapshots().len() > 24);
        assert_eq!(result.final_resources()["gold"], 0.0);
        assert_eq!(
            result.bottlenecks(),
            crate::analyzer::detect_bottlenecks(result.final_state()).as_slice()
        );
    }
}
