//! The hero's mutually exclusive long-running actions: adventures and mining.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::catalog::{DurationTier, GameConfiguration, MiningTable};
use crate::constants::{START_CARRY_CAPACITY, START_TOWER_FLOORS};
use crate::engine::SimError;
use crate::events::{EventCategory, EventSeverity};
use crate::ledger::ResourceKind;
use crate::numbers::{floor_f64_to_u64, u64_to_f64};
use crate::rng::roll_chance;
use crate::state::GameState;

/// Who initiated an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    Player,
    Helper,
}

impl fmt::Display for ActionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Player => "Player",
            Self::Helper => "Helper",
        })
    }
}

/// Where the hero spends a given minute; drives screen-time accounting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    #[default]
    Home,
    Adventure,
    Mine,
    Forge,
    Tower,
    Town,
}

impl Location {
    pub const ALL: [Self; 6] = [
        Self::Home,
        Self::Adventure,
        Self::Mine,
        Self::Forge,
        Self::Tower,
        Self::Town,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Adventure => "adventure",
            Self::Mine => "mine",
            Self::Forge => "forge",
            Self::Tower => "tower",
            Self::Town => "town",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    Adventure {
        adventure_id: String,
        tier: DurationTier,
    },
    Mining {
        depth: u32,
    },
}

impl ActionKind {
    #[must_use]
    pub const fn location(&self) -> Location {
        match self {
            Self::Adventure { .. } => Location::Adventure,
            Self::Mining { .. } => Location::Mine,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adventure { adventure_id, tier } => {
                write!(f, "{} adventure `{adventure_id}`", tier.as_str())
            }
            Self::Mining { depth } => write!(f, "mining at depth {depth}"),
        }
    }
}

/// The single in-flight hero action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeroAction {
    pub kind: ActionKind,
    pub remaining: u32,
    pub duration: u32,
    pub spent_energy: f64,
    pub started_at: u64,
    pub source: ActionSource,
}

/// A short visit to a vendor after a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Errand {
    pub location: Location,
    pub until: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeroState {
    pub action: Option<HeroAction>,
    /// Raised by `carry_N_crops` upgrades.
    pub carry_capacity: u32,
    pub tower_floors: u32,
    pub errand: Option<Errand>,
}

impl HeroState {
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.action.is_none()
    }

    /// Location for the minute at `tick`.
    #[must_use]
    pub fn location(&self, tick: u64) -> Location {
        if let Some(action) = &self.action {
            return action.kind.location();
        }
        match self.errand {
            Some(errand) if tick < errand.until => errand.location,
            _ => Location::Home,
        }
    }
}

impl Default for HeroState {
    fn default() -> Self {
        Self {
            action: None,
            carry_capacity: START_CARRY_CAPACITY,
            tower_floors: START_TOWER_FLOORS,
            errand: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionRejection {
    #[error("the hero is already busy")]
    Busy,
    #[error("unlocks on day {unlock_day} (currently day {day})")]
    Locked { unlock_day: u32, day: u32 },
    #[error("adventure `{0}` is not in the catalog")]
    UnknownAdventure(String),
    #[error("depth {depth} is outside 1..={max_depth}")]
    InvalidDepth { depth: u32, max_depth: u32 },
    #[error("needs {needed:.0} energy but only {available:.1} is stored")]
    InsufficientEnergy { needed: f64, available: f64 },
}

/// Rewards handed out when an action resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub kind: ActionKind,
    pub gold: u64,
    pub materials: Vec<(String, u64)>,
}

/// Send the hero on an adventure, paying its energy up front.
///
/// # Errors
///
/// Rejects when busy, locked, unknown, or unaffordable; the rejection is
/// also logged as a warning.
pub fn start_adventure(
    state: &mut GameState,
    catalog: &GameConfiguration,
    adventure_id: &str,
    tier: DurationTier,
    source: ActionSource,
) -> Result<(), ActionRejection> {
    let checked = check_adventure(state, catalog, adventure_id, tier);
    let (energy, duration) = match checked {
        Ok(cost) => cost,
        Err(rejection) => {
            state.reject(
                EventCategory::Adventure,
                format!("Cannot start adventure `{adventure_id}`: {rejection}"),
            );
            return Err(rejection);
        }
    };
    let kind = ActionKind::Adventure {
        adventure_id: adventure_id.to_string(),
        tier,
    };
    begin(state, kind, energy, duration, source);
    state.metrics.counters.adventures_started += 1;
    Ok(())
}

fn check_adventure(
    state: &GameState,
    catalog: &GameConfiguration,
    adventure_id: &str,
    tier: DurationTier,
) -> Result<(f64, u32), ActionRejection> {
    if !state.hero.is_idle() {
        return Err(ActionRejection::Busy);
    }
    let adventure = catalog
        .adventure(adventure_id)
        .ok_or_else(|| ActionRejection::UnknownAdventure(adventure_id.to_string()))?;
    if state.clock.day < adventure.unlock_day {
        return Err(ActionRejection::Locked {
            unlock_day: adventure.unlock_day,
            day: state.clock.day,
        });
    }
    let stats = adventure.tier(tier);
    check_energy(state, stats.energy)?;
    Ok((stats.energy, stats.duration))
}

/// Send the hero mining at `depth` for `duration` minutes.
///
/// # Errors
///
/// Rejects when busy, locked, out of depth range, or unaffordable.
pub fn start_mining(
    state: &mut GameState,
    catalog: &GameConfiguration,
    depth: u32,
    duration: u32,
    source: ActionSource,
) -> Result<(), ActionRejection> {
    let energy = match check_mining(state, &catalog.mining, depth) {
        Ok(energy) => energy,
        Err(rejection) => {
            state.reject(
                EventCategory::Mining,
                format!("Cannot start mining at depth {depth}: {rejection}"),
            );
            return Err(rejection);
        }
    };
    begin(
        state,
        ActionKind::Mining { depth },
        energy,
        duration.max(1),
        source,
    );
    state.metrics.counters.mining_started += 1;
    Ok(())
}

fn check_mining(state: &GameState, mining: &MiningTable, depth: u32) -> Result<f64, ActionRejection> {
    if !state.hero.is_idle() {
        return Err(ActionRejection::Busy);
    }
    if state.clock.day < mining.unlock_day {
        return Err(ActionRejection::Locked {
            unlock_day: mining.unlock_day,
            day: state.clock.day,
        });
    }
    if depth == 0 || depth > mining.max_depth {
        return Err(ActionRejection::InvalidDepth {
            depth,
            max_depth: mining.max_depth,
        });
    }
    let energy = mining.energy_cost(depth);
    check_energy(state, energy)?;
    Ok(energy)
}

fn check_energy(state: &GameState, needed: f64) -> Result<(), ActionRejection> {
    let available = state.resources.energy();
    if available < needed {
        return Err(ActionRejection::InsufficientEnergy { needed, available });
    }
    Ok(())
}

fn begin(state: &mut GameState, kind: ActionKind, energy: f64, duration: u32, source: ActionSource) {
    // Affordability was checked against the same ledger a moment ago.
    if !state.resources.spend_resource(&ResourceKind::Energy, energy) {
        return;
    }
    let category = match kind {
        ActionKind::Adventure { .. } => EventCategory::Adventure,
        ActionKind::Mining { .. } => EventCategory::Mining,
    };
    let message = format!("{source} started {kind} ({duration} min, -{energy:.0} energy)");
    state.hero.errand = None;
    state.hero.action = Some(HeroAction {
        kind,
        remaining: duration,
        duration,
        spent_energy: energy,
        started_at: state.tick,
        source,
    });
    state.log(category, EventSeverity::Info, message);
}

/// Count down the in-flight action and resolve it when it reaches zero.
///
/// # Errors
///
/// Returns `SimError::MissingAdventure` if the running adventure has
/// vanished from the catalog.
pub fn progress_action<R: Rng + ?Sized>(
    state: &mut GameState,
    catalog: &GameConfiguration,
    rng: &mut R,
) -> Result<Option<ActionOutcome>, SimError> {
    let Some(action) = state.hero.action.as_mut() else {
        return Ok(None);
    };
    action.remaining = action.remaining.saturating_sub(1);
    if action.remaining > 0 {
        return Ok(None);
    }
    let outcome = match &action.kind {
        ActionKind::Adventure { adventure_id, tier } => {
            resolve_adventure(catalog, adventure_id, *tier, rng)?
        }
        ActionKind::Mining { depth } => resolve_mining(catalog, *depth, rng),
    };
    state.hero.action = None;
    apply_outcome(state, &outcome);
    Ok(Some(outcome))
}

fn resolve_adventure<R: Rng + ?Sized>(
    catalog: &GameConfiguration,
    adventure_id: &str,
    tier: DurationTier,
    rng: &mut R,
) -> Result<ActionOutcome, SimError> {
    let adventure = catalog
        .adventure(adventure_id)
        .ok_or_else(|| SimError::MissingAdventure(adventure_id.to_string()))?;
    let balance = &catalog.balance;
    let mut materials = vec![(
        adventure.common.material.clone(),
        adventure.common.amount,
    )];
    if tier.rolls_rare()
        && let Some(rare) = &adventure.rare
        && roll_chance(rng, balance.rare_drop_chance)
    {
        materials.push((rare.material.clone(), rare.amount));
    }
    if tier.rolls_boss()
        && let Some(boss) = &adventure.boss
        && roll_chance(rng, balance.boss_drop_chance)
    {
        materials.push((boss.material.clone(), boss.amount));
    }
    Ok(ActionOutcome {
        kind: ActionKind::Adventure {
            adventure_id: adventure_id.to_string(),
            tier,
        },
        gold: floor_f64_to_u64(adventure.gold_reward),
        materials,
    })
}

fn resolve_mining<R: Rng + ?Sized>(
    catalog: &GameConfiguration,
    depth: u32,
    rng: &mut R,
) -> ActionOutcome {
    let mining = &catalog.mining;
    let balance = &catalog.balance;
    let mut materials = vec![("stone".to_string(), mining.stone_yield(depth))];
    if depth >= balance.copper_min_depth && roll_chance(rng, balance.copper_chance) {
        materials.push(("copper".to_string(), MiningTable::copper_yield(depth)));
    }
    if depth >= balance.iron_min_depth && roll_chance(rng, balance.iron_chance) {
        materials.push(("iron".to_string(), MiningTable::iron_yield(depth)));
    }
    ActionOutcome {
        kind: ActionKind::Mining { depth },
        gold: mining.gold_yield(depth),
        materials,
    }
}

fn apply_outcome(state: &mut GameState, outcome: &ActionOutcome) {
    state
        .resources
        .add_resource(&ResourceKind::Gold, u64_to_f64(outcome.gold));
    for (material, amount) in &outcome.materials {
        state
            .resources
            .add_resource(&ResourceKind::material(material.as_str()), u64_to_f64(*amount));
    }
    let (category, counter) = match outcome.kind {
        ActionKind::Adventure { .. } => (
            EventCategory::Adventure,
            &mut state.metrics.counters.adventures_completed,
        ),
        ActionKind::Mining { .. } => (
            EventCategory::Mining,
            &mut state.metrics.counters.mining_completed,
        ),
    };
    *counter += 1;
    state.metrics.gold_earned = state.metrics.gold_earned.saturating_add(outcome.gold);
    let loot: Vec<String> = outcome
        .materials
        .iter()
        .map(|(material, amount)| format!("{amount} {material}"))
        .collect();
    let message = format!(
        "Completed {}: +{} gold, {}",
        outcome.kind,
        outcome.gold,
        if loot.is_empty() {
            "no materials".to_string()
        } else {
            loot.join(", ")
        }
    );
    let payload = serde_json::to_value(outcome).unwrap_or_default();
    state.log_with_payload(category, EventSeverity::Info, message, payload);
}
