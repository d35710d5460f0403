//! Upgrade eligibility, purchase, effect application, and autonomous ranking.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use crate::actions::{Errand, Location};
use crate::catalog::{GameConfiguration, UpgradeCategory, UpgradeDef};
use crate::constants::{
    UPGRADE_BASE_PRIORITY, UPGRADE_COST_WEIGHT, UPGRADE_ERRAND_MINUTES, UPGRADE_PURCHASE_FACTOR,
};
use crate::events::{EventCategory, EventSeverity};
use crate::farm::FarmStage;
use crate::numbers::u64_to_f64;
use crate::prerequisites::{PrerequisiteKind, check_prerequisites};
use crate::profile::UpgradeStrategy;
use crate::rng::roll_chance;
use crate::state::GameState;

/// Parsed form of an upgrade's effect token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", content = "value", rename_all = "snake_case")]
pub enum UpgradeEffect {
    EnergyCap(f64),
    WaterCap(f64),
    CarryCapacity(u32),
    TowerFloor(u32),
    FarmPlots(u32),
    FarmStage(FarmStage),
    Grant(String),
    None,
    Unknown(String),
}

impl UpgradeEffect {
    #[must_use]
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        if token.is_empty() || token == "none" {
            return Self::None;
        }
        let parsed = if let Some(value) = token.strip_prefix("energy_cap_") {
            value.parse().ok().map(Self::EnergyCap)
        } else if let Some(value) = token.strip_prefix("water_cap_") {
            value.parse().ok().map(Self::WaterCap)
        } else if let Some(value) = token
            .strip_prefix("carry_")
            .and_then(|rest| rest.strip_suffix("_crops"))
        {
            value.parse().ok().map(Self::CarryCapacity)
        } else if let Some(value) = token.strip_prefix("tower_floor_") {
            value.parse().ok().map(Self::TowerFloor)
        } else if let Some(value) = token.strip_prefix("farm_plots_") {
            value.parse().ok().map(Self::FarmPlots)
        } else if let Some(stage) = token.strip_prefix("farm_stage_") {
            FarmStage::from_token(stage).map(Self::FarmStage)
        } else if let Some(grant) = token.strip_prefix("grant_") {
            (!grant.is_empty()).then(|| Self::Grant(grant.to_string()))
        } else {
            None
        };
        parsed.unwrap_or_else(|| Self::Unknown(token.to_string()))
    }
}

impl fmt::Display for UpgradeEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnergyCap(cap) => write!(f, "energy cap {cap:.0}"),
            Self::WaterCap(cap) => write!(f, "water cap {cap:.0}"),
            Self::CarryCapacity(n) => write!(f, "carry {n} crops"),
            Self::TowerFloor(n) => write!(f, "tower floor {n}"),
            Self::FarmPlots(n) => write!(f, "{n} farm plots"),
            Self::FarmStage(stage) => write!(f, "farm stage {stage}"),
            Self::Grant(token) => write!(f, "unlock {token}"),
            Self::None => f.write_str("no effect"),
            Self::Unknown(token) => write!(f, "unknown effect `{token}`"),
        }
    }
}

/// When an upgrade was bought.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acquisition {
    pub id: String,
    pub day: u32,
    pub tick: u64,
}

/// Append-only record of owned upgrades.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedUpgrades {
    ids: BTreeSet<String>,
    acquisitions: Vec<Acquisition>,
}

impl OwnedUpgrades {
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.acquisitions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.acquisitions.is_empty()
    }

    /// Acquisitions in purchase order.
    #[must_use]
    pub fn acquisitions(&self) -> &[Acquisition] {
        &self.acquisitions
    }

    #[must_use]
    pub fn acquisition(&self, id: &str) -> Option<&Acquisition> {
        self.acquisitions.iter().find(|a| a.id == id)
    }

    fn insert(&mut self, id: &str, day: u32, tick: u64) -> bool {
        if !self.ids.insert(id.to_string()) {
            return false;
        }
        self.acquisitions.push(Acquisition {
            id: id.to_string(),
            day,
            tick,
        });
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PurchaseRejection {
    #[error("upgrade `{0}` is not in the catalog")]
    UnknownUpgrade(String),
    #[error("already owned")]
    AlreadyOwned,
    #[error("unlocks on day {unlock_day} (currently day {day})")]
    Locked { unlock_day: u32, day: u32 },
    #[error("requires {kind} `{requirement}`")]
    PrerequisiteMissing {
        kind: PrerequisiteKind,
        requirement: String,
    },
    #[error("cannot afford the cost")]
    Unaffordable,
}

/// Not owned and the unlock day has been reached.
#[must_use]
pub fn is_available(state: &GameState, upgrade: &UpgradeDef) -> bool {
    !state.upgrades.contains(&upgrade.id) && state.clock.day >= upgrade.unlock_day
}

/// Gold, energy and every material are covered simultaneously.
#[must_use]
pub fn can_afford(state: &GameState, upgrade: &UpgradeDef) -> bool {
    state.resources.can_afford(&upgrade.cost)
}

fn check_purchase(state: &GameState, upgrade: &UpgradeDef) -> Result<(), PurchaseRejection> {
    if state.upgrades.contains(&upgrade.id) {
        return Err(PurchaseRejection::AlreadyOwned);
    }
    if state.clock.day < upgrade.unlock_day {
        return Err(PurchaseRejection::Locked {
            unlock_day: upgrade.unlock_day,
            day: state.clock.day,
        });
    }
    let status = check_prerequisites(upgrade, state);
    if let (Some(kind), Some(requirement)) = (status.blocking, status.next_requirement) {
        return Err(PurchaseRejection::PrerequisiteMissing { kind, requirement });
    }
    if !can_afford(state, upgrade) {
        return Err(PurchaseRejection::Unaffordable);
    }
    Ok(())
}

/// Buy `id`: charge its whole cost, record it, and apply its effect.
///
/// # Errors
///
/// Returns the reason nothing was bought; a warning event is logged too.
pub fn purchase(
    state: &mut GameState,
    catalog: &GameConfiguration,
    id: &str,
) -> Result<UpgradeEffect, PurchaseRejection> {
    let checked = catalog
        .upgrade(id)
        .ok_or_else(|| PurchaseRejection::UnknownUpgrade(id.to_string()))
        .and_then(|upgrade| check_purchase(state, upgrade).map(|()| upgrade));
    let upgrade = match checked {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            state.reject(
                EventCategory::Upgrade,
                format!("Cannot purchase `{id}`: {rejection}"),
            );
            return Err(rejection);
        }
    };
    if !state.resources.spend_cost(&upgrade.cost) {
        state.reject(
            EventCategory::Upgrade,
            format!("Cannot purchase `{id}`: {}", PurchaseRejection::Unaffordable),
        );
        return Err(PurchaseRejection::Unaffordable);
    }
    state.upgrades.insert(id, state.clock.day, state.tick);
    state.metrics.counters.upgrades_purchased += 1;
    let effect = UpgradeEffect::parse(&upgrade.effect);
    log::debug!("purchased upgrade {id} on day {} ({effect})", state.clock.day);
    state.log_with_payload(
        EventCategory::Upgrade,
        EventSeverity::Major,
        format!("Purchased {} ({effect})", upgrade.name),
        serde_json::json!({ "upgrade": id, "gold": upgrade.cost.gold }),
    );
    apply_effect(state, &effect);
    if state.hero.is_idle() {
        state.hero.errand = Some(Errand {
            location: vendor_location(upgrade.category),
            until: state.tick + UPGRADE_ERRAND_MINUTES,
        });
    }
    Ok(effect)
}

const fn vendor_location(category: UpgradeCategory) -> Location {
    match category {
        UpgradeCategory::Tool => Location::Forge,
        UpgradeCategory::Tower => Location::Tower,
        _ => Location::Town,
    }
}

/// Apply an effect to the ledger, farm, or hero. Unknown tokens warn and
/// change nothing.
pub fn apply_effect(state: &mut GameState, effect: &UpgradeEffect) {
    match effect {
        UpgradeEffect::EnergyCap(cap) => state.resources.raise_energy_cap(*cap),
        UpgradeEffect::WaterCap(cap) => state.resources.raise_water_cap(*cap),
        UpgradeEffect::CarryCapacity(n) => {
            state.hero.carry_capacity = state.hero.carry_capacity.max(*n);
        }
        UpgradeEffect::TowerFloor(n) => state.hero.tower_floors = state.hero.tower_floors.max(*n),
        UpgradeEffect::FarmPlots(n) => {
            let added = state.farm.expand_to(*n);
            if added > 0 {
                state.log(
                    EventCategory::Farm,
                    EventSeverity::Info,
                    format!("Farm expanded by {added} plots ({} total)", state.farm.len()),
                );
            }
        }
        UpgradeEffect::FarmStage(stage) => state.farm.reach_stage(*stage),
        UpgradeEffect::Grant(token) => {
            state.unlocks.insert(token.clone());
        }
        UpgradeEffect::None => {}
        UpgradeEffect::Unknown(token) => {
            log::warn!("ignoring unknown upgrade effect `{token}`");
            state.log(
                EventCategory::Upgrade,
                EventSeverity::Warning,
                format!("Unknown upgrade effect `{token}` ignored"),
            );
        }
    }
}

/// Ranking key: lower is bought first.
#[must_use]
pub fn priority_key(upgrade: &UpgradeDef, strategy: UpgradeStrategy) -> f64 {
    UPGRADE_BASE_PRIORITY
        + strategy.category_weight(upgrade.category)
        + UPGRADE_COST_WEIGHT * (u64_to_f64(upgrade.cost.gold) + 1.0).log10()
}

/// Available, unlocked and affordable upgrades, best first.
#[must_use]
pub fn ranked_candidates<'a>(
    state: &GameState,
    catalog: &'a GameConfiguration,
    strategy: UpgradeStrategy,
) -> Vec<&'a UpgradeDef> {
    let mut candidates: Vec<&UpgradeDef> = catalog
        .upgrades
        .iter()
        .filter(|upgrade| check_purchase(state, upgrade).is_ok())
        .collect();
    candidates.sort_by(|a, b| priority_key(a, strategy).total_cmp(&priority_key(b, strategy)));
    candidates
}

/// Maybe buy the top-ranked candidate, with probability `0.8 * efficiency`.
pub fn consider_upgrade<R: Rng + ?Sized>(
    state: &mut GameState,
    catalog: &GameConfiguration,
    strategy: UpgradeStrategy,
    efficiency: f64,
    rng: &mut R,
) -> Option<String> {
    let best = ranked_candidates(state, catalog, strategy)
        .first()
        .map(|upgrade| upgrade.id.clone())?;
    if !roll_chance(rng, efficiency * UPGRADE_PURCHASE_FACTOR) {
        return None;
    }
    purchase(state, catalog, &best).ok().map(|_| best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ResourceKind;
    use crate::rng::RngBundle;

    fn fixture() -> (GameState, GameConfiguration) {
        let catalog = GameConfiguration::builtin().unwrap();
        let state = GameState::new(&catalog, 1_000);
        (state, catalog)
    }

    fn grant(state: &mut GameState, gold: f64, stone: f64) {
        state.resources.add_resource(&ResourceKind::Gold, gold);
        state
            .resources
            .add_resource(&ResourceKind::material("stone"), stone);
    }

    #[test]
    fn effect_tokens_parse() {
        assert_eq!(UpgradeEffect::parse("energy_cap_1500"), UpgradeEffect::EnergyCap(1500.0));
        assert_eq!(UpgradeEffect::parse("carry_8_crops"), UpgradeEffect::CarryCapacity(8));
        assert_eq!(UpgradeEffect::parse("tower_floor_3"), UpgradeEffect::TowerFloor(3));
        assert_eq!(
            UpgradeEffect::parse("farm_stage_manor_grounds"),
            UpgradeEffect::FarmStage(FarmStage::ManorGrounds)
        );
        assert_eq!(
            UpgradeEffect::parse("grant_copper_tool"),
            UpgradeEffect::Grant("copper_tool".to_string())
        );
        assert_eq!(UpgradeEffect::parse("none"), UpgradeEffect::None);
        assert_eq!(
            UpgradeEffect::parse("energy_cap_lots"),
            UpgradeEffect::Unknown("energy_cap_lots".to_string())
        );
        assert_eq!(
            UpgradeEffect::parse("summon_dragon"),
            UpgradeEffect::Unknown("summon_dragon".to_string())
        );
    }

    #[test]
    fn purchase_charges_cost_and_applies_effect() {
        let (mut state, catalog) = fixture();
        grant(&mut state, 60.0, 5.0);
        let effect = purchase(&mut state, &catalog, "storage_1").unwrap();
        assert_eq!(effect, UpgradeEffect::EnergyCap(150.0));
        assert_eq!(state.resources.gold(), 10);
        assert_eq!(state.resources.material("stone"), 0);
        assert!((state.resources.energy_pool().cap - 150.0).abs() < f64::EPSILON);
        assert!(state.upgrades.contains("storage_1"));
        assert_eq!(state.upgrades.acquisition("storage_1").unwrap().day, 1);
        let logged = state
            .events
            .iter()
            .find(|e| e.message.starts_with("Purchased"))
            .unwrap();
        assert_eq!(logged.category, EventCategory::Upgrade);
        assert_eq!(logged.severity, EventSeverity::Major);
        assert_eq!(state.hero.location(state.tick), Location::Town);
        assert_eq!(
            purchase(&mut state, &catalog, "storage_1"),
            Err(PurchaseRejection::AlreadyOwned)
        );
    }

    #[test]
    fn unaffordable_purchase_leaves_state_intact() {
        let (mut state, catalog) = fixture();
        grant(&mut state, 60.0, 4.0);
        assert_eq!(
            purchase(&mut state, &catalog, "storage_1"),
            Err(PurchaseRejection::Unaffordable)
        );
        assert_eq!(state.resources.gold(), 60);
        assert_eq!(state.resources.material("stone"), 4);
        assert!(state.upgrades.is_empty());
        assert_eq!(state.metrics.counters.rejected_operations, 1);
    }

    #[test]
    fn prerequisites_gate_purchase() {
        let (mut state, catalog) = fixture();
        state.clock.day = 5;
        grant(&mut state, 10_000.0, 100.0);
        let err = purchase(&mut state, &catalog, "storage_2").unwrap_err();
        assert_eq!(
            err,
            PurchaseRejection::PrerequisiteMissing {
                kind: PrerequisiteKind::Upgrade,
                requirement: "storage_1".to_string()
            }
        );
        assert!(matches!(
            purchase(&mut state, &catalog, "storage_6"),
            Err(PurchaseRejection::Locked { unlock_day: 18, .. })
        ));
    }

    #[test]
    fn farm_expansion_and_grants_apply() {
        let (mut state, _) = fixture();
        apply_effect(&mut state, &UpgradeEffect::FarmPlots(8));
        assert_eq!(state.farm.len(), 8);
        apply_effect(&mut state, &UpgradeEffect::Grant("copper_tool".to_string()));
        assert!(state.unlocks.contains("copper_tool"));
        apply_effect(&mut state, &UpgradeEffect::Unknown("x".to_string()));
        assert_eq!(state.events.count_severity(EventSeverity::Warning), 1);
    }

    #[test]
    fn ranking_prefers_strategy_categories_then_cheaper() {
        let (mut state, catalog) = fixture();
        grant(&mut state, 1_000.0, 100.0);
        let storage_first = ranked_candidates(&state, &catalog, UpgradeStrategy::StorageFocused);
        assert_eq!(storage_first[0].id, "storage_1");
        let production = ranked_candidates(&state, &catalog, UpgradeStrategy::ProductionFocused);
        assert_eq!(production[0].id, "backpack_1");
        let keys: Vec<f64> = production
            .iter()
            .map(|u| priority_key(u, UpgradeStrategy::ProductionFocused))
            .collect();
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        assert!(production.iter().all(|u| u.unlock_day <= 1));
    }

    #[test]
    fn consider_upgrade_never_buys_at_zero_efficiency() {
        let (mut state, catalog) = fixture();
        grant(&mut state, 1_000.0, 100.0);
        let bundle = RngBundle::from_user_seed(11);
        for _ in 0..50 {
            assert!(
                consider_upgrade(
                    &mut state,
                    &catalog,
                    UpgradeStrategy::Balanced,
                    0.0,
                    &mut *bundle.policy()
                )
                .is_none()
            );
        }
        let bought = consider_upgrade(
            &mut state,
            &catalog,
            UpgradeStrategy::Balanced,
            1.0 / UPGRADE_PURCHASE_FACTOR,
            &mut *bundle.policy(),
        );
        assert_eq!(bought.as_deref(), Some("storage_1"));
    }
}
