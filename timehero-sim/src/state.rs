//! The mutable simulation subject and its accumulated metrics.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::actions::{ActionSource, HeroAction, HeroState, Location};
use crate::catalog::GameConfiguration;
use crate::clock::GameClock;
use crate::constants::{START_DAY, START_HOUR, START_PLOTS};
use crate::events::{EventCategory, EventLog, EventSeverity};
use crate::farm::{Farm, FarmStage, Plot};
use crate::helpers::{Helper, HelperKind};
use crate::ledger::{Pool, Resources};
use crate::phase::{Phase, PhaseTransition};
use crate::policy::ActiveSession;
use crate::prerequisites::Holdings;
use crate::upgrades::OwnedUpgrades;

/// Counts of things the player and helpers did (or tried to do).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityCounters {
    /// All plantings; `helper_plantings` is the helper-driven subset.
    pub plantings: u64,
    pub helper_plantings: u64,
    pub harvests: u64,
    pub helper_harvests: u64,
    pub adventures_started: u64,
    pub adventures_completed: u64,
    pub mining_started: u64,
    pub mining_completed: u64,
    pub sessions: u64,
    pub session_passes: u64,
    pub upgrades_purchased: u64,
    pub rejected_operations: u64,
}

impl ActivityCounters {
    pub fn record_planting(&mut self, source: ActionSource) {
        self.plantings += 1;
        if source == ActionSource::Helper {
            self.helper_plantings += 1;
        }
    }

    pub fn record_harvest(&mut self, source: ActionSource) {
        self.harvests += 1;
        if source == ActionSource::Helper {
            self.helper_harvests += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperDiscovery {
    pub kind: HelperKind,
    pub day: u32,
    pub tick: u64,
}

/// Write-only accumulators read by the analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Ticks spent in each phase that has been exited.
    pub phase_durations: BTreeMap<Phase, u64>,
    pub phase_transitions: Vec<PhaseTransition>,
    pub location_minutes: BTreeMap<Location, u64>,
    pub helper_discoveries: Vec<HelperDiscovery>,
    pub gold_earned: u64,
    pub counters: ActivityCounters,
}

impl Metrics {
    pub fn record_helper(&mut self, kind: HelperKind, day: u32, tick: u64) {
        self.helper_discoveries
            .push(HelperDiscovery { kind, day, tick });
    }

    pub fn record_location(&mut self, location: Location) {
        *self.location_minutes.entry(location).or_insert(0) += 1;
    }

    #[must_use]
    pub fn total_location_minutes(&self) -> u64 {
        self.location_minutes.values().sum()
    }

    /// First day a phase was entered, if it ever was.
    #[must_use]
    pub fn phase_entry_day(&self, phase: Phase) -> Option<u32> {
        self.phase_transitions
            .iter()
            .find(|t| t.to == phase)
            .map(|t| t.day)
    }
}

/// Everything one run mutates. Owned exclusively by its `Simulation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub clock: GameClock,
    /// Elapsed simulated minutes.
    pub tick: u64,
    pub resources: Resources,
    pub farm: Farm,
    pub hero: HeroState,
    pub helpers: Vec<Helper>,
    pub upgrades: OwnedUpgrades,
    /// Tool, weapon and building tokens granted by upgrades.
    pub unlocks: BTreeSet<String>,
    pub phase: Phase,
    pub phase_started_at: u64,
    pub session: Option<ActiveSession>,
    pub metrics: Metrics,
    pub events: EventLog,
    pub last_overflow_warning: Option<u64>,
}

impl GameState {
    /// Fresh state: day 1 08:00, three empty plots, empty ledger.
    #[must_use]
    pub fn new(catalog: &GameConfiguration, max_log_entries: usize) -> Self {
        Self {
            clock: GameClock::new(START_DAY, START_HOUR, 0),
            tick: 0,
            resources: Resources::new(&catalog.materials),
            farm: Farm::new(START_PLOTS),
            hero: HeroState::default(),
            helpers: Vec::new(),
            upgrades: OwnedUpgrades::default(),
            unlocks: BTreeSet::new(),
            phase: Phase::Tutorial,
            phase_started_at: 0,
            session: None,
            metrics: Metrics::default(),
            events: EventLog::with_capacity(max_log_entries),
            last_overflow_warning: None,
        }
    }

    pub fn log(&mut self, category: EventCategory, severity: EventSeverity, message: impl Into<String>) {
        self.events
            .push(self.tick, self.clock, category, severity, message.into());
    }

    pub fn log_with_payload(
        &mut self,
        category: EventCategory,
        severity: EventSeverity,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) {
        self.events.push_with_payload(
            self.tick,
            self.clock,
            category,
            severity,
            message.into(),
            payload,
        );
    }

    /// Record a rejected operation as a warning.
    pub fn reject(&mut self, category: EventCategory, message: impl Into<String>) {
        self.metrics.counters.rejected_operations += 1;
        self.log(category, EventSeverity::Warning, message);
    }

    /// Broken structural invariants, described. Empty when the state is sound.
    #[must_use]
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let energy = self.resources.energy_pool();
        if energy.current > energy.cap {
            violations.push(format!(
                "energy {:.2} exceeds cap {:.2}",
                energy.current, energy.cap
            ));
        }
        if energy.current < 0.0 {
            violations.push(format!("energy {:.2} is negative", energy.current));
        }
        for plot in self.farm.plots() {
            if !plot.is_consistent() {
                violations.push(format!("plot {} is inconsistent", plot.id()));
            }
        }
        if let Some(helper) = self
            .helpers
            .iter()
            .find(|h| h.efficiency <= 0.0 || h.efficiency > 1.0)
        {
            violations.push(format!(
                "helper {} efficiency {} outside (0, 1]",
                helper.id, helper.efficiency
            ));
        }
        violations
    }

    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            tick: self.tick,
            clock: self.clock,
            phase: self.phase,
            energy: self.resources.energy_pool(),
            water: self.resources.water_pool(),
            gold: self.resources.gold(),
            materials: self.resources.materials().clone(),
            plots: self.farm.plots().to_vec(),
            action: self.hero.action.clone(),
            helpers: self.helpers.clone(),
            upgrades_owned: self.upgrades.len(),
        }
    }
}

impl Holdings for GameState {
    fn owns_upgrade(&self, id: &str) -> bool {
        self.upgrades.contains(id)
    }

    fn farm_stage(&self) -> FarmStage {
        self.farm.stage()
    }

    fn has_unlock(&self, token: &str) -> bool {
        self.unlocks.contains(token)
    }
}

/// Periodic read-only view for live monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub tick: u64,
    pub clock: GameClock,
    pub phase: Phase,
    pub energy: Pool,
    pub water: Pool,
    pub gold: u64,
    pub materials: BTreeMap<String, u64>,
    pub plots: Vec<Plot>,
    pub action: Option<HeroAction>,
    pub helpers: Vec<Helper>,
    pub upgrades_owned: usize,
}
