//! Resource ledger: capped energy and water pools, uncapped gold and materials.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::catalog::UpgradeCost;
use crate::constants::{START_ENERGY_CAP, START_WATER};
use crate::numbers::{ceil_f64_to_u64, floor_f64_to_u64};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Energy,
    Water,
    Gold,
    Material(String),
}

impl ResourceKind {
    #[must_use]
    pub fn material(name: impl Into<String>) -> Self {
        Self::Material(name.into())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Energy => f.write_str("energy"),
            Self::Water => f.write_str("water"),
            Self::Gold => f.write_str("gold"),
            Self::Material(name) => f.write_str(name),
        }
    }
}

/// A capped pool. `current` may exceed `cap` only between a grant and the
/// next settlement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub current: f64,
    pub cap: f64,
}

impl Pool {
    #[must_use]
    pub const fn new(current: f64, cap: f64) -> Self {
        Self { current, cap }
    }

    /// Clamp to the cap and return the excess.
    fn settle(&mut self) -> f64 {
        let overflow = (self.current - self.cap).max(0.0);
        if overflow > 0.0 {
            self.current = self.cap;
        }
        overflow
    }

    #[must_use]
    pub fn fill_ratio(&self) -> f64 {
        if self.cap > 0.0 {
            self.current / self.cap
        } else {
            0.0
        }
    }
}

/// Cumulative energy and water accounting.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceFlows {
    pub energy_generated: f64,
    pub energy_spent: f64,
    pub energy_wasted: f64,
    pub water_wasted: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    energy: Pool,
    water: Pool,
    gold: u64,
    materials: BTreeMap<String, u64>,
    flows: ResourceFlows,
}

impl Resources {
    /// Starting ledger with every listed material at zero.
    #[must_use]
    pub fn new<'a>(materials: impl IntoIterator<Item = &'a String>) -> Self {
        Self {
            energy: Pool::new(0.0, START_ENERGY_CAP),
            water: Pool::new(START_WATER, START_WATER),
            gold: 0,
            materials: materials.into_iter().map(|m| (m.clone(), 0)).collect(),
            flows: ResourceFlows::default(),
        }
    }

    #[must_use]
    pub const fn energy(&self) -> f64 {
        self.energy.current
    }

    #[must_use]
    pub const fn energy_pool(&self) -> Pool {
        self.energy
    }

    #[must_use]
    pub const fn water_pool(&self) -> Pool {
        self.water
    }

    #[must_use]
    pub const fn gold(&self) -> u64 {
        self.gold
    }

    #[must_use]
    pub fn material(&self, name: &str) -> u64 {
        self.materials.get(name).copied().unwrap_or(0)
    }

    #[must_use]
    pub const fn materials(&self) -> &BTreeMap<String, u64> {
        &self.materials
    }

    #[must_use]
    pub const fn flows(&self) -> &ResourceFlows {
        &self.flows
    }

    /// Current amount of `kind`, as a float for uniform comparisons.
    #[must_use]
    pub fn amount(&self, kind: &ResourceKind) -> f64 {
        match kind {
            ResourceKind::Energy => self.energy.current,
            ResourceKind::Water => self.water.current,
            ResourceKind::Gold => crate::numbers::u64_to_f64(self.gold),
            ResourceKind::Material(name) => crate::numbers::u64_to_f64(self.material(name)),
        }
    }

    /// Grant `amount` of `kind`. Energy and water may overshoot their caps
    /// until [`Resources::enforce_caps`] runs. Integer kinds take the floor.
    pub fn add_resource(&mut self, kind: &ResourceKind, amount: f64) {
        if !amount.is_finite() || amount <= 0.0 {
            return;
        }
        match kind {
            ResourceKind::Energy => {
                self.energy.current += amount;
                self.flows.energy_generated += amount;
            }
            ResourceKind::Water => self.water.current += amount,
            ResourceKind::Gold => {
                self.gold = self.gold.saturating_add(floor_f64_to_u64(amount));
            }
            ResourceKind::Material(name) => {
                let entry = self.materials.entry(name.clone()).or_insert(0);
                *entry = entry.saturating_add(floor_f64_to_u64(amount));
            }
        }
    }

    /// Spend `amount` of `kind` if available. Returns false and leaves the
    /// ledger untouched otherwise. Integer kinds charge the ceiling.
    pub fn spend_resource(&mut self, kind: &ResourceKind, amount: f64) -> bool {
        if !amount.is_finite() || amount < 0.0 {
            return false;
        }
        match kind {
            ResourceKind::Energy => {
                if self.energy.current < amount {
                    return false;
                }
                self.energy.current -= amount;
                self.flows.energy_spent += amount;
                true
            }
            ResourceKind::Water => {
                if self.water.current < amount {
                    return false;
                }
                self.water.current -= amount;
                true
            }
            ResourceKind::Gold => {
                let charge = ceil_f64_to_u64(amount);
                let Some(left) = self.gold.checked_sub(charge) else {
                    return false;
                };
                self.gold = left;
                true
            }
            ResourceKind::Material(name) => {
                let charge = ceil_f64_to_u64(amount);
                if charge == 0 {
                    return true;
                }
                let Some(held) = self.materials.get_mut(name) else {
                    return false;
                };
                let Some(left) = held.checked_sub(charge) else {
                    return false;
                };
                *held = left;
                true
            }
        }
    }

    /// True when gold, energy and every material in `cost` are covered at once.
    #[must_use]
    pub fn can_afford(&self, cost: &UpgradeCost) -> bool {
        self.gold >= cost.gold
            && self.energy.current >= cost.energy
            && cost
                .materials
                .iter()
                .all(|(name, amount)| self.material(name) >= *amount)
    }

    /// Charge a whole cost in one step, or nothing at all.
    pub fn spend_cost(&mut self, cost: &UpgradeCost) -> bool {
        if !self.can_afford(cost) {
            return false;
        }
        self.gold -= cost.gold;
        if cost.energy > 0.0 {
            self.energy.current -= cost.energy;
            self.flows.energy_spent += cost.energy;
        }
        for (name, amount) in &cost.materials {
            if let Some(held) = self.materials.get_mut(name) {
                *held -= *amount;
            }
        }
        true
    }

    /// Clamp energy and water to their caps. Returns the energy overflow,
    /// which is also added to `energy_wasted`.
    pub fn enforce_caps(&mut self) -> f64 {
        let energy_overflow = self.energy.settle();
        self.flows.energy_wasted += energy_overflow;
        self.flows.water_wasted += self.water.settle();
        energy_overflow
    }

    /// Raise the energy cap; caps never shrink.
    pub fn raise_energy_cap(&mut self, cap: f64) {
        self.energy.cap = self.energy.cap.max(cap);
    }

    /// Raise the water cap and top the tank up to it.
    pub fn raise_water_cap(&mut self, cap: f64) {
        self.water.cap = self.water.cap.max(cap);
        self.water.current = self.water.cap;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> Resources {
        let materials = vec!["stone".to_string(), "copper".to_string()];
        Resources::new(&materials)
    }

    #[test]
    fn starts_with_empty_energy_and_full_water() {
        let resources = ledger();
        assert!(resources.energy().abs() < f64::EPSILON);
        assert!((resources.energy_pool().cap - 50.0).abs() < f64::EPSILON);
        assert!((resources.water_pool().current - 20.0).abs() < f64::EPSILON);
        assert_eq!(resources.material("stone"), 0);
    }

    #[test]
    fn overflow_is_counted_as_waste() {
        let mut resources = ledger();
        resources.add_resource(&ResourceKind::Energy, 70.0);
        let overflow = resources.enforce_caps();
        assert!((overflow - 20.0).abs() < 1e-9);
        assert!((resources.energy() - 50.0).abs() < 1e-9);
        assert!((resources.flows().energy_wasted - 20.0).abs() < 1e-9);
        assert!((resources.flows().energy_generated - 70.0).abs() < 1e-9);
    }

    #[test]
    fn insufficient_spend_is_rejected_without_mutation() {
        let mut resources = ledger();
        resources.add_resource(&ResourceKind::Energy, 30.0);
        assert!(!resources.spend_resource(&ResourceKind::Energy, 31.0));
        assert!((resources.energy() - 30.0).abs() < 1e-9);
        assert!(resources.spend_resource(&ResourceKind::Energy, 30.0));
        assert!(resources.energy().abs() < 1e-9);
        assert!(!resources.spend_resource(&ResourceKind::material("iron"), 1.0));
    }

    #[test]
    fn integer_kinds_grant_floor_and_charge_ceiling() {
        let mut resources = ledger();
        resources.add_resource(&ResourceKind::Gold, 10.9);
        assert_eq!(resources.gold(), 10);
        assert!(!resources.spend_resource(&ResourceKind::Gold, 10.1));
        assert!(resources.spend_resource(&ResourceKind::Gold, 9.5));
        assert_eq!(resources.gold(), 0);
    }

    #[test]
    fn negative_and_nan_amounts_are_ignored() {
        let mut resources = ledger();
        resources.add_resource(&ResourceKind::Energy, -5.0);
        resources.add_resource(&ResourceKind::Energy, f64::NAN);
        assert!(resources.energy().abs() < f64::EPSILON);
        assert!(!resources.spend_resource(&ResourceKind::Energy, -1.0));
    }

    #[test]
    fn cost_is_all_or_nothing() {
        let mut resources = ledger();
        resources.add_resource(&ResourceKind::Gold, 100.0);
        resources.add_resource(&ResourceKind::material("stone"), 3.0);
        let mut cost = UpgradeCost {
            gold: 50,
            energy: 0.0,
            materials: BTreeMap::new(),
        };
        cost.materials.insert("stone".to_string(), 5);
        assert!(!resources.spend_cost(&cost));
        assert_eq!(resources.gold(), 100);
        assert_eq!(resources.material("stone"), 3);
        cost.materials.insert("stone".to_string(), 3);
        assert!(resources.spend_cost(&cost));
        assert_eq!(resources.gold(), 50);
        assert_eq!(resources.material("stone"), 0);
    }

    #[test]
    fn caps_only_grow() {
        let mut resources = ledger();
        resources.raise_energy_cap(150.0);
        resources.raise_energy_cap(100.0);
        assert!((resources.energy_pool().cap - 150.0).abs() < f64::EPSILON);
        resources.raise_water_cap(60.0);
        assert!((resources.water_pool().current - 60.0).abs() < f64::EPSILON);
    }
}
