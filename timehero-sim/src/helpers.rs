//! Helper discovery (pity-adjusted) and per-tick helper automation.

use rand::Rng;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::fmt;

use crate::actions::{self, ActionSource};
use crate::catalog::{BalanceTable, GameConfiguration};
use crate::constants::{
    AUTO_ADVENTURE_CHOICE_FACTOR, AUTO_ADVENTURE_FACTOR, AUTO_ADVENTURE_MIN_ENERGY,
    AUTO_MINE_FACTOR, AUTO_MINE_MAX_DEPTH, AUTO_MINE_MIN_ENERGY, AUTO_PLANT_FACTOR,
    HELPER_BASE_EFFICIENCY, HELPER_EFFICIENCY_STEP, HELPER_MINING_DURATION,
};
use crate::engine::SimError;
use crate::events::{EventCategory, EventSeverity};
use crate::farm;
use crate::numbers::usize_to_f64;
use crate::policy;
use crate::profile::PlayerProfile;
use crate::rng::{RngBundle, roll_chance};
use crate::state::GameState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HelperKind {
    Gnome,
    Golem,
    Sprite,
    Dragon,
    Phoenix,
}

const LATE_HELPER_CYCLE: [HelperKind; 3] = [HelperKind::Sprite, HelperKind::Dragon, HelperKind::Phoenix];

impl HelperKind {
    pub const ALL: [Self; 5] = [
        Self::Gnome,
        Self::Golem,
        Self::Sprite,
        Self::Dragon,
        Self::Phoenix,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gnome => "gnome",
            Self::Golem => "golem",
            Self::Sprite => "sprite",
            Self::Dragon => "dragon",
            Self::Phoenix => "phoenix",
        }
    }

    /// Kind granted to the helper found at `ordinal` (0-based). The third
    /// and later helpers cycle through sprite, dragon, phoenix.
    #[must_use]
    pub const fn for_ordinal(ordinal: usize) -> Self {
        match ordinal {
            0 => Self::Gnome,
            1 => Self::Golem,
            n => LATE_HELPER_CYCLE[(n - 2) % LATE_HELPER_CYCLE.len()],
        }
    }

    fn default_name(self) -> &'static str {
        match self {
            Self::Gnome => "Gnome",
            Self::Golem => "Stone Golem",
            Self::Sprite => "Sprite",
            Self::Dragon => "Dragon",
            Self::Phoenix => "Phoenix",
        }
    }

    fn default_abilities(self) -> AbilitySet {
        match self {
            Self::Gnome => smallvec![HelperAbility::AutoHarvest],
            Self::Golem => smallvec![HelperAbility::AutoPlant, HelperAbility::AutoWater],
            Self::Sprite | Self::Dragon | Self::Phoenix => {
                smallvec![HelperAbility::AutoAdventure, HelperAbility::AutoMine]
            }
        }
    }
}

impl fmt::Display for HelperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HelperAbility {
    AutoHarvest,
    AutoPlant,
    AutoWater,
    AutoAdventure,
    AutoMine,
}

impl HelperAbility {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AutoHarvest => "auto_harvest",
            Self::AutoPlant => "auto_plant",
            Self::AutoWater => "auto_water",
            Self::AutoAdventure => "auto_adventure",
            Self::AutoMine => "auto_mine",
        }
    }
}

/// Abilities carried by a single helper; never more than a couple.
pub type AbilitySet = SmallVec<[HelperAbility; 2]>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Helper {
    pub id: String,
    pub kind: HelperKind,
    pub name: String,
    pub abilities: AbilitySet,
    /// Probability scale for every automation gate, in `(0, 1]`.
    pub efficiency: f64,
    pub discovered_at: u64,
    pub discovered_day: u32,
}

impl Helper {
    /// Build the helper found at `ordinal`, taking its name and abilities
    /// from the catalog archetype when one exists.
    #[must_use]
    pub fn for_ordinal(ordinal: usize, catalog: &GameConfiguration, tick: u64, day: u32) -> Self {
        let kind = HelperKind::for_ordinal(ordinal);
        let (name, abilities) = catalog.helper_archetype(kind).map_or_else(
            || (kind.default_name().to_string(), kind.default_abilities()),
            |archetype| {
                (
                    archetype.name.clone(),
                    archetype.abilities.iter().copied().collect(),
                )
            },
        );
        let efficiency =
            (HELPER_BASE_EFFICIENCY + HELPER_EFFICIENCY_STEP * usize_to_f64(ordinal)).min(1.0);
        Self {
            id: format!("helper_{}", ordinal + 1),
            kind,
            name,
            abilities,
            efficiency,
            discovered_at: tick,
            discovered_day: day,
        }
    }

    #[must_use]
    pub fn has(&self, ability: HelperAbility) -> bool {
        self.abilities.contains(&ability)
    }
}

/// Pity-adjusted chance of finding the next helper.
///
/// Thresholds, rates and caps are indexed by how many helpers are already
/// found, with the last entry reused beyond the table.
#[must_use]
pub fn discovery_chance(
    helpers_found: usize,
    active_plots: u32,
    days_passed: u32,
    balance: &BalanceTable,
) -> f64 {
    let k = helpers_found.min(balance.discovery_caps.len() - 1);
    let plot_excess = active_plots.saturating_sub(balance.discovery_plot_thresholds[k]);
    let day_excess = days_passed.saturating_sub(balance.discovery_day_thresholds[k]);
    let plot_bonus = f64::from(plot_excess) * balance.discovery_plot_rates[k];
    let pity_bonus = f64::from(day_excess) * balance.discovery_day_rates[k];
    let chance = balance.discovery_caps[k].min(plot_bonus + pity_bonus);
    (chance * balance.discovery_scale).clamp(0.0, 1.0)
}

/// One discovery roll. Appends the helper and logs a major event on success.
pub(crate) fn roll_discovery<R: Rng + ?Sized>(
    state: &mut GameState,
    catalog: &GameConfiguration,
    rng: &mut R,
) -> Option<HelperKind> {
    let chance = discovery_chance(
        state.helpers.len(),
        state.farm.active_count(),
        state.clock.days_passed(),
        &catalog.balance,
    );
    if !roll_chance(rng, chance) {
        return None;
    }
    let helper = Helper::for_ordinal(state.helpers.len(), catalog, state.tick, state.clock.day);
    let kind = helper.kind;
    log::debug!(
        "helper {} ({}) discovered on day {} at tick {}",
        helper.id,
        kind,
        state.clock.day,
        state.tick
    );
    let abilities: Vec<&str> = helper.abilities.iter().map(|a| a.as_str()).collect();
    let message = format!(
        "Helper discovered: {} ({})",
        helper.name,
        abilities.join(", ")
    );
    let payload = serde_json::json!({
        "helper": helper.id,
        "kind": kind,
        "efficiency": helper.efficiency,
    });
    state.metrics.record_helper(kind, state.clock.day, state.tick);
    state.helpers.push(helper);
    state.log_with_payload(
        EventCategory::Helper,
        EventSeverity::Major,
        message,
        payload,
    );
    Some(kind)
}

/// Run every helper's abilities once. Gates draw from the helper stream;
/// reward resolution stays on the reward stream.
pub(crate) fn run_automation(
    state: &mut GameState,
    catalog: &GameConfiguration,
    profile: &PlayerProfile,
    rngs: &RngBundle,
) -> Result<(), SimError> {
    let crew: Vec<(f64, AbilitySet)> = state
        .helpers
        .iter()
        .map(|helper| (helper.efficiency, helper.abilities.clone()))
        .collect();
    for (efficiency, abilities) in crew {
        for ability in abilities {
            let mut rng = rngs.helpers();
            match ability {
                HelperAbility::AutoHarvest => auto_harvest(state, catalog, efficiency, &mut *rng)?,
                HelperAbility::AutoPlant => auto_plant(state, catalog, efficiency, &mut *rng),
                HelperAbility::AutoWater => state.farm.water_all(),
                HelperAbility::AutoAdventure => {
                    auto_adventure(state, catalog, profile, efficiency, &mut *rng);
                }
                HelperAbility::AutoMine => auto_mine(state, catalog, efficiency, &mut *rng),
            }
        }
    }
    Ok(())
}

fn auto_harvest<R: Rng + ?Sized>(
    state: &mut GameState,
    catalog: &GameConfiguration,
    efficiency: f64,
    rng: &mut R,
) -> Result<(), SimError> {
    for plot_id in state.farm.ready_plot_ids() {
        if roll_chance(rng, efficiency) {
            let _ = farm::harvest_crop(state, catalog, plot_id, ActionSource::Helper)?;
        }
    }
    Ok(())
}

fn auto_plant<R: Rng + ?Sized>(
    state: &mut GameState,
    catalog: &GameConfiguration,
    efficiency: f64,
    rng: &mut R,
) {
    for plot_id in state.farm.empty_plot_ids() {
        if !roll_chance(rng, efficiency * AUTO_PLANT_FACTOR) {
            continue;
        }
        let Some(crop_id) = policy::choose_crop(catalog, state.phase, efficiency, rng) else {
            return;
        };
        // Rejections are logged by the farm; the helper simply moves on.
        let _ = farm::plant_crop(state, catalog, plot_id, &crop_id, ActionSource::Helper);
    }
}

fn auto_adventure<R: Rng + ?Sized>(
    state: &mut GameState,
    catalog: &GameConfiguration,
    profile: &PlayerProfile,
    efficiency: f64,
    rng: &mut R,
) {
    if !state.hero.is_idle() || state.resources.energy() < AUTO_ADVENTURE_MIN_ENERGY {
        return;
    }
    if !roll_chance(rng, efficiency * AUTO_ADVENTURE_FACTOR) {
        return;
    }
    let choice = policy::choose_adventure(
        catalog,
        state.clock.day,
        state.resources.energy(),
        profile.adventure_preference,
        efficiency * AUTO_ADVENTURE_CHOICE_FACTOR,
        rng,
    );
    if let Some((adventure_id, tier)) = choice {
        let _ = actions::start_adventure(state, catalog, &adventure_id, tier, ActionSource::Helper);
    }
}

fn auto_mine<R: Rng + ?Sized>(
    state: &mut GameState,
    catalog: &GameConfiguration,
    efficiency: f64,
    rng: &mut R,
) {
    if !state.hero.is_idle() || state.resources.energy() < AUTO_MINE_MIN_ENERGY {
        return;
    }
    if !roll_chance(rng, efficiency * AUTO_MINE_FACTOR) {
        return;
    }
    let depth = AUTO_MINE_MAX_DEPTH.min(state.clock.day / 5 + 1);
    let _ = actions::start_mining(
        state,
        catalog,
        depth,
        HELPER_MINING_DURATION,
        ActionSource::Helper,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pity_chance_is_capped() {
        let balance = BalanceTable::default();
        let chance = discovery_chance(0, 20, 10, &balance);
        assert!((chance - 0.15).abs() < 1e-12);
    }

    #[test]
    fn plot_bonus_alone_below_cap() {
        let balance = BalanceTable::default();
        // 3 plots above 15 at 2% each, no pity yet.
        let chance = discovery_chance(0, 18, 3, &balance);
        assert!((chance - 0.06).abs() < 1e-12);
        assert!(discovery_chance(0, 15, 3, &balance).abs() < f64::EPSILON);
    }

    #[test]
    fn later_helpers_use_stricter_thresholds() {
        let balance = BalanceTable::default();
        assert!(discovery_chance(1, 20, 10, &balance).abs() < f64::EPSILON);
        let second = discovery_chance(1, 45, 12, &balance);
        assert!((second - 0.08).abs() < 1e-12);
        let late = discovery_chance(7, 80, 25, &balance);
        assert!((late - 0.03).abs() < 1e-12);
    }

    #[test]
    fn discovery_scale_multiplies_chance() {
        let balance = BalanceTable {
            discovery_scale: 0.5,
            ..BalanceTable::default()
        };
        let chance = discovery_chance(0, 20, 10, &balance);
        assert!((chance - 0.075).abs() < 1e-12);
    }

    #[test]
    fn kinds_cycle_after_golem() {
        let kinds: Vec<_> = (0..7).map(HelperKind::for_ordinal).collect();
        assert_eq!(
            kinds,
            vec![
                HelperKind::Gnome,
                HelperKind::Golem,
                HelperKind::Sprite,
                HelperKind::Dragon,
                HelperKind::Phoenix,
                HelperKind::Sprite,
                HelperKind::Dragon,
            ]
        );
    }

    #[test]
    fn efficiency_grows_then_clamps() {
        let catalog = GameConfiguration::builtin().unwrap();
        let first = Helper::for_ordinal(0, &catalog, 10, 2);
        let second = Helper::for_ordinal(1, &catalog, 20, 3);
        let fifth = Helper::for_ordinal(4, &catalog, 30, 9);
        assert!((first.efficiency - 0.8).abs() < 1e-12);
        assert!((second.efficiency - 0.9).abs() < 1e-12);
        assert!((fifth.efficiency - 1.0).abs() < f64::EPSILON);
        assert_eq!(first.id, "helper_1");
        assert!(first.has(HelperAbility::AutoHarvest));
        assert!(second.has(HelperAbility::AutoPlant) && second.has(HelperAbility::AutoWater));
        assert_eq!(first.name, "Garden Gnome");
    }

    #[test]
    fn missing_archetype_falls_back_to_defaults() {
        let mut catalog = GameConfiguration::builtin().unwrap();
        catalog.helpers.clear();
        let helper = Helper::for_ordinal(2, &catalog, 0, 1);
        assert_eq!(helper.kind, HelperKind::Sprite);
        assert_eq!(helper.name, "Sprite");
        assert!(helper.has(HelperAbility::AutoMine));
    }
}
