//! Bottleneck detection and run reports.
//!
//! Everything here is a pure function of a finished (or paused) state, so a
//! report can be re-derived from a [`RunResult`] at any time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::actions::Location;
use crate::constants::{
    FULL_PLOT_RATIO, HELPERLESS_DAY, HELPERLESS_PLOTS, LOW_ENERGY_PERCENT, LOW_MATERIAL_AMOUNT,
    LOW_MATERIAL_DAY, LOW_MATERIAL_TYPES, MINUTES_PER_DAY, MINUTES_PER_HOUR, SPARE_GOLD,
    SPARE_PLOT_RATIO, WASTE_RATIO_LIMIT,
};
use crate::helpers::HelperKind;
use crate::ledger::{Pool, ResourceFlows};
use crate::numbers::{u64_to_f64, usize_to_f64};
use crate::phase::Phase;
use crate::result::RunResult;
use crate::state::{GameState, Metrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckKind {
    EnergyStorage,
    EnergyGeneration,
    PlotExpansion,
    MaterialShortage,
    HelperDiscovery,
    PhaseProgression,
}

impl BottleneckKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EnergyStorage => "energy_storage",
            Self::EnergyGeneration => "energy_generation",
            Self::PlotExpansion => "plot_expansion",
            Self::MaterialShortage => "material_shortage",
            Self::HelperDiscovery => "helper_discovery",
            Self::PhaseProgression => "phase_progression",
        }
    }
}

impl fmt::Display for BottleneckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub kind: BottleneckKind,
    pub severity: Severity,
    pub description: String,
    pub suggestion: String,
    pub metric: f64,
}

/// Threshold checks over the current state, in a fixed order.
#[must_use]
pub fn detect_bottlenecks(state: &GameState) -> Vec<Bottleneck> {
    let mut found = Vec::new();
    let energy = state.resources.energy_pool();
    let flows = state.resources.flows();
    let energy_percent = energy.fill_ratio() * 100.0;
    let waste_ratio = flows.energy_wasted / (flows.energy_generated + 1.0);
    let active = f64::from(state.farm.active_count());
    let total_plots = usize_to_f64(state.farm.len());
    let day = state.clock.day;

    if waste_ratio > WASTE_RATIO_LIMIT {
        found.push(Bottleneck {
            kind: BottleneckKind::EnergyStorage,
            severity: Severity::High,
            description: format!(
                "Energy waste: {:.1}% of generated energy wasted",
                waste_ratio * 100.0
            ),
            suggestion: "Upgrade energy storage or spend more energy on adventures and mining"
                .to_string(),
            metric: waste_ratio,
        });
    }

    if energy_percent < LOW_ENERGY_PERCENT && active < total_plots * SPARE_PLOT_RATIO {
        found.push(Bottleneck {
            kind: BottleneckKind::EnergyGeneration,
            severity: Severity::Medium,
            description: format!("Low energy ({energy_percent:.1}%) with unused plots available"),
            suggestion: "Plant more crops to increase energy generation".to_string(),
            metric: energy_percent,
        });
    }

    if total_plots > 0.0
        && active >= total_plots * FULL_PLOT_RATIO
        && state.resources.gold() > SPARE_GOLD
    {
        found.push(Bottleneck {
            kind: BottleneckKind::PlotExpansion,
            severity: Severity::Medium,
            description: "Farm at capacity but gold available for expansion".to_string(),
            suggestion: "Expand the farm to add more plots".to_string(),
            metric: active / total_plots,
        });
    }

    if day > LOW_MATERIAL_DAY {
        let low = state
            .resources
            .materials()
            .values()
            .filter(|amount| **amount < LOW_MATERIAL_AMOUNT)
            .count();
        if low > LOW_MATERIAL_TYPES {
            found.push(Bottleneck {
                kind: BottleneckKind::MaterialShortage,
                severity: Severity::Low,
                description: format!("Low on {low} material types"),
                suggestion: "Focus on mining or adventures that provide materials".to_string(),
                metric: usize_to_f64(low),
            });
        }
    }

    if state.helpers.is_empty() && active > usize_to_f64(HELPERLESS_PLOTS) && day > HELPERLESS_DAY
    {
        found.push(Bottleneck {
            kind: BottleneckKind::HelperDiscovery,
            severity: Severity::High,
            description: "No helpers found despite sufficient plots and time".to_string(),
            suggestion: "Keep farming; helper discovery grows with active plots and days"
                .to_string(),
            metric: active,
        });
    }

    let expected = Phase::expected_for_day(day);
    if state.phase < expected {
        let behind = expected.index() - state.phase.index();
        found.push(Bottleneck {
            kind: BottleneckKind::PhaseProgression,
            severity: Severity::Medium,
            description: format!(
                "Behind expected progression: {} vs expected {expected}",
                state.phase
            ),
            suggestion: "Focus on plot expansion and helper discovery to advance phases"
                .to_string(),
            metric: usize_to_f64(behind),
        });
    }

    found
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Hours,
    Days,
}

impl TimeUnit {
    const fn minutes(self) -> u32 {
        match self {
            Self::Hours => MINUTES_PER_HOUR,
            Self::Days => MINUTES_PER_DAY,
        }
    }
}

/// Intended length of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseTarget {
    pub min: f64,
    pub max: f64,
    pub unit: TimeUnit,
}

impl PhaseTarget {
    #[must_use]
    pub const fn for_phase(phase: Phase) -> Self {
        let (min, max, unit) = match phase {
            Phase::Tutorial => (1.0, 4.0, TimeUnit::Hours),
            Phase::Early => (1.0, 5.0, TimeUnit::Days),
            Phase::Mid => (3.0, 8.0, TimeUnit::Days),
            Phase::Late => (5.0, 12.0, TimeUnit::Days),
            Phase::Endgame => (10.0, 25.0, TimeUnit::Days),
        };
        Self { min, max, unit }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingStatus {
    TooFast,
    Normal,
    TooSlow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub phase: Phase,
    /// Duration in the target's unit.
    pub actual: f64,
    pub target: PhaseTarget,
    pub status: TimingStatus,
    /// Percent beyond the violated bound; zero when normal.
    pub deviation_percent: f64,
    /// Still the current phase, so it can only run long, not short.
    pub ongoing: bool,
}

/// Compare each phase's duration against its target band.
///
/// Exited phases use their recorded duration. The current phase is included
/// as ongoing and is only ever judged too slow.
#[must_use]
pub fn phase_timing(state: &GameState) -> Vec<PhaseTiming> {
    let mut durations: Vec<(Phase, u64, bool)> = state
        .metrics
        .phase_durations
        .iter()
        .map(|(phase, minutes)| (*phase, *minutes, false))
        .collect();
    if !state.metrics.phase_durations.contains_key(&state.phase) {
        let ongoing = state.tick.saturating_sub(state.phase_started_at);
        durations.push((state.phase, ongoing, true));
    }
    durations
        .into_iter()
        .map(|(phase, minutes, ongoing)| {
            let target = PhaseTarget::for_phase(phase);
            let actual = u64_to_f64(minutes) / f64::from(target.unit.minutes());
            let (status, deviation_percent) = if actual < target.min && !ongoing {
                (
                    TimingStatus::TooFast,
                    (target.min - actual) / target.min * 100.0,
                )
            } else if actual > target.max {
                (
                    TimingStatus::TooSlow,
                    (actual - target.max) / target.max * 100.0,
                )
            } else {
                (TimingStatus::Normal, 0.0)
            };
            PhaseTiming {
                phase,
                actual,
                target,
                status,
                deviation_percent,
                ongoing,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    Underutilized,
    Balanced,
    Overutilized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenTimeShare {
    pub location: Location,
    pub minutes: u64,
    pub percentage: f64,
    pub band: (f64, f64),
    pub status: UsageStatus,
}

/// Healthy share of total time, in percent, per location.
#[must_use]
pub const fn screen_time_band(location: Location) -> (f64, f64) {
    match location {
        Location::Home => (25.0, 45.0),
        Location::Adventure => (20.0, 45.0),
        Location::Mine | Location::Town => (5.0, 20.0),
        Location::Forge | Location::Tower => (3.0, 15.0),
    }
}

#[must_use]
pub fn screen_time(metrics: &Metrics) -> Vec<ScreenTimeShare> {
    let total = u64_to_f64(metrics.total_location_minutes());
    Location::ALL
        .iter()
        .map(|location| {
            let minutes = metrics
                .location_minutes
                .get(location)
                .copied()
                .unwrap_or(0);
            let percentage = if total > 0.0 {
                u64_to_f64(minutes) / total * 100.0
            } else {
                0.0
            };
            let band = screen_time_band(*location);
            let status = if percentage < band.0 {
                UsageStatus::Underutilized
            } else if percentage > band.1 {
                UsageStatus::Overutilized
            } else {
                UsageStatus::Balanced
            };
            ScreenTimeShare {
                location: *location,
                minutes,
                percentage,
                band,
                status,
            }
        })
        .collect()
}

const fn phase_guidance(phase: Phase) -> &'static str {
    match phase {
        Phase::Tutorial => "Focus on planting your first 3 plots and learning the basics",
        Phase::Early => "Expand to 10+ plots and prepare for the first helper discovery",
        Phase::Mid => "Scale to 25+ plots and discover your first helper",
        Phase::Late => "Optimize with helpers and reach 50+ plots",
        Phase::Endgame => "Master the endgame with multiple helpers and 90+ plots",
    }
}

#[must_use]
pub fn recommendations(phase: Phase, bottlenecks: &[Bottleneck]) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(high) = bottlenecks.iter().find(|b| b.severity == Severity::High) {
        out.push(format!("HIGH PRIORITY: {}", high.suggestion));
    }
    out.push(phase_guidance(phase).to_string());
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateSummary {
    pub day: u32,
    pub phase: Phase,
    pub total_minutes: u64,
    pub active_plots: u32,
    pub total_plots: usize,
    pub helpers: usize,
    pub upgrades: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub energy: Pool,
    pub flows: ResourceFlows,
    /// Spent over generated, in percent.
    pub energy_efficiency: f64,
    pub gold: u64,
    pub gold_earned: u64,
    pub materials: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperSummary {
    pub id: String,
    pub kind: HelperKind,
    pub name: String,
    pub day: u32,
    pub abilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionSummary {
    pub phase_durations: BTreeMap<Phase, u64>,
    pub phase_entry_days: BTreeMap<Phase, u32>,
    pub upgrade_days: BTreeMap<String, u32>,
    pub helpers: Vec<HelperSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub game_state: GameStateSummary,
    pub resources: ResourceSummary,
    pub progression: ProgressionSummary,
    pub bottlenecks: Vec<Bottleneck>,
    pub phase_timing: Vec<PhaseTiming>,
    pub screen_time: Vec<ScreenTimeShare>,
    pub recommendations: Vec<String>,
}

#[must_use]
pub fn generate_report(result: &RunResult) -> SimulationReport {
    let state = result.final_state();
    let flows = *state.resources.flows();
    let bottlenecks = detect_bottlenecks(state);
    SimulationReport {
        seed: result.seed(),
        game_state: GameStateSummary {
            day: state.clock.day,
            phase: state.phase,
            total_minutes: state.tick,
            active_plots: state.farm.active_count(),
            total_plots: state.farm.len(),
            helpers: state.helpers.len(),
            upgrades: state.upgrades.len(),
        },
        resources: ResourceSummary {
            energy: state.resources.energy_pool(),
            flows,
            energy_efficiency: flows.energy_spent / (flows.energy_generated + 1.0) * 100.0,
            gold: state.resources.gold(),
            gold_earned: state.metrics.gold_earned,
            materials: state.resources.materials().clone(),
        },
        progression: ProgressionSummary {
            phase_durations: state.metrics.phase_durations.clone(),
            phase_entry_days: state
                .metrics
                .phase_transitions
                .iter()
                .map(|t| (t.to, t.day))
                .collect(),
            upgrade_days: state
                .upgrades
                .acquisitions()
                .iter()
                .map(|a| (a.id.clone(), a.day))
                .collect(),
            helpers: state
                .helpers
                .iter()
                .map(|h| HelperSummary {
                    id: h.id.clone(),
                    kind: h.kind,
                    name: h.name.clone(),
                    day: h.discovered_day,
                    abilities: h.abilities.iter().map(|a| a.as_str().to_string()).collect(),
                })
                .collect(),
        },
        recommendations: recommendations(state.phase, &bottlenecks),
        bottlenecks,
        phase_timing: phase_timing(state),
        screen_time: screen_time(&state.metrics),
    }
}
