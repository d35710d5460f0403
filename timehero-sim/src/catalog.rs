//! Typed game catalog: crops, adventures, mining, upgrades, helper archetypes.
//!
//! A catalog is validated once at load time and shared immutably (behind an
//! `Arc`) by every simulation built from it. Variants are produced by cloning
//! and perturbing a catalog, never by mutating a shared one.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::hash::Hasher;
use std::path::Path;
use thiserror::Error;
use twox_hash::XxHash64;

use crate::constants::{
    BOSS_DROP_CHANCE, COPPER_CHANCE, COPPER_MIN_DEPTH, DISCOVERY_CAPS, DISCOVERY_DAY_RATES,
    DISCOVERY_DAY_THRESHOLDS, DISCOVERY_PLOT_RATES, DISCOVERY_PLOT_THRESHOLDS, IRON_CHANCE,
    IRON_MIN_DEPTH, MINING_BASE_COST, MINING_COST_EXPONENT, MINING_GOLD_EXPONENT,
    MINING_GOLD_FACTOR, MINING_MAX_DEPTH, MINING_STONE_PER_DEPTH, PHASE_DAY_THRESHOLDS,
    PHASE_PLOT_THRESHOLDS, RARE_DROP_CHANCE,
};
use crate::helpers::{HelperAbility, HelperKind};
use crate::numbers::floor_f64_to_u64;
use crate::phase::Phase;

const BUILTIN_CATALOG: &str = include_str!("../assets/catalog.json");

/// Errors raised while loading or validating a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog JSON could not be parsed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("catalog table `{table}` must not be empty")]
    EmptyTable { table: &'static str },
    #[error("duplicate id `{id}` in catalog table `{table}`")]
    DuplicateId { table: &'static str, id: String },
    #[error("{field} must be at least {min:.2} (got {value:.2})")]
    MinViolation { field: String, min: f64, value: f64 },
    #[error("{field} must be between {min:.2} and {max:.2} (got {value:.2})")]
    RangeViolation {
        field: String,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("material `{material}` referenced by `{owner}` is not listed in the catalog")]
    UnknownMaterial { owner: String, material: String },
}

fn check_min(field: impl Into<String>, min: f64, value: f64) -> Result<(), CatalogError> {
    if value.is_finite() && value >= min {
        return Ok(());
    }
    Err(CatalogError::MinViolation {
        field: field.into(),
        min,
        value,
    })
}

fn check_probability(field: impl Into<String>, value: f64) -> Result<(), CatalogError> {
    if (0.0..=1.0).contains(&value) {
        return Ok(());
    }
    Err(CatalogError::RangeViolation {
        field: field.into(),
        min: 0.0,
        max: 1.0,
        value,
    })
}

fn check_unique<'a>(
    table: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(CatalogError::DuplicateId {
                table,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

/// Crop availability tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropTier {
    Early,
    Mid,
    Late,
    Endgame,
}

impl CropTier {
    /// Whether crops of this tier may be planted during `phase`.
    #[must_use]
    pub const fn available_in(self, phase: Phase) -> bool {
        match phase {
            Phase::Tutorial | Phase::Early => matches!(self, Self::Early),
            Phase::Mid => matches!(self, Self::Early | Self::Mid),
            Phase::Late => !matches!(self, Self::Endgame),
            Phase::Endgame => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crop {
    pub id: String,
    pub name: String,
    pub tier: CropTier,
    /// Energy granted on harvest.
    pub energy: f64,
    /// Minutes from planting to maturity.
    pub growth_time: f64,
}

impl Crop {
    /// Energy per simulated minute, used both for ranking and for the
    /// trickle a mature, unharvested plot keeps producing.
    #[must_use]
    pub fn energy_rate(&self) -> f64 {
        if self.growth_time > 0.0 {
            self.energy / self.growth_time
        } else {
            0.0
        }
    }
}

/// Adventure length selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationTier {
    Short,
    Medium,
    Long,
}

impl DurationTier {
    pub const ALL: [Self; 3] = [Self::Short, Self::Medium, Self::Long];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }

    /// Rare drops roll on medium and long runs only.
    #[must_use]
    pub const fn rolls_rare(self) -> bool {
        matches!(self, Self::Medium | Self::Long)
    }

    /// Boss drops roll on long runs only.
    #[must_use]
    pub const fn rolls_boss(self) -> bool {
        matches!(self, Self::Long)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdventureTier {
    pub energy: f64,
    /// Minutes away from home.
    pub duration: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialDrop {
    pub material: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adventure {
    pub id: String,
    pub name: String,
    #[serde(default = "Adventure::default_unlock_day")]
    pub unlock_day: u32,
    pub short: AdventureTier,
    pub medium: AdventureTier,
    pub long: AdventureTier,
    pub gold_reward: f64,
    pub common: MaterialDrop,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rare: Option<MaterialDrop>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boss: Option<MaterialDrop>,
}

impl Adventure {
    const fn default_unlock_day() -> u32 {
        1
    }

    #[must_use]
    pub const fn tier(&self, tier: DurationTier) -> &AdventureTier {
        match tier {
            DurationTier::Short => &self.short,
            DurationTier::Medium => &self.medium,
            DurationTier::Long => &self.long,
        }
    }

    fn drops(&self) -> impl Iterator<Item = &MaterialDrop> {
        std::iter::once(&self.common)
            .chain(self.rare.as_ref())
            .chain(self.boss.as_ref())
    }
}

/// Depth-scaled mining costs and yields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningTable {
    #[serde(default = "MiningTable::default_base_cost")]
    pub base_cost: f64,
    #[serde(default = "MiningTable::default_cost_exponent")]
    pub cost_exponent: f64,
    #[serde(default = "MiningTable::default_gold_factor")]
    pub gold_factor: f64,
    #[serde(default = "MiningTable::default_gold_exponent")]
    pub gold_exponent: f64,
    #[serde(default = "MiningTable::default_stone_per_depth")]
    pub stone_per_depth: f64,
    #[serde(default = "MiningTable::default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "MiningTable::default_unlock_day")]
    pub unlock_day: u32,
}

impl MiningTable {
    const fn default_base_cost() -> f64 {
        MINING_BASE_COST
    }

    const fn default_cost_exponent() -> f64 {
        MINING_COST_EXPONENT
    }

    const fn default_gold_factor() -> f64 {
        MINING_GOLD_FACTOR
    }

    const fn default_gold_exponent() -> f64 {
        MINING_GOLD_EXPONENT
    }

    const fn default_stone_per_depth() -> f64 {
        MINING_STONE_PER_DEPTH
    }

    const fn default_max_depth() -> u32 {
        MINING_MAX_DEPTH
    }

    const fn default_unlock_day() -> u32 {
        1
    }

    /// Energy needed to mine at `depth`: `floor(base * depth^exp)`.
    #[must_use]
    pub fn energy_cost(&self, depth: u32) -> f64 {
        (self.base_cost * f64::from(depth).powf(self.cost_exponent)).floor()
    }

    #[must_use]
    pub fn gold_yield(&self, depth: u32) -> u64 {
        floor_f64_to_u64(self.gold_factor * f64::from(depth).powf(self.gold_exponent))
    }

    #[must_use]
    pub fn stone_yield(&self, depth: u32) -> u64 {
        floor_f64_to_u64(self.stone_per_depth * f64::from(depth))
    }

    #[must_use]
    pub fn copper_yield(depth: u32) -> u64 {
        u64::from(depth / 2)
    }

    #[must_use]
    pub fn iron_yield(depth: u32) -> u64 {
        u64::from(depth / 5)
    }
}

impl Default for MiningTable {
    fn default() -> Self {
        Self {
            base_cost: Self::default_base_cost(),
            cost_exponent: Self::default_cost_exponent(),
            gold_factor: Self::default_gold_factor(),
            gold_exponent: Self::default_gold_exponent(),
            stone_per_depth: Self::default_stone_per_depth(),
            max_depth: Self::default_max_depth(),
            unlock_day: Self::default_unlock_day(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeCategory {
    Storage,
    Water,
    Hero,
    Tower,
    Farm,
    Tool,
    Other,
}

impl UpgradeCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Water => "water",
            Self::Hero => "hero",
            Self::Tower => "tower",
            Self::Farm => "farm",
            Self::Tool => "tool",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UpgradeCost {
    #[serde(default)]
    pub gold: u64,
    #[serde(default)]
    pub energy: f64,
    #[serde(default)]
    pub materials: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeDef {
    pub id: String,
    pub name: String,
    pub category: UpgradeCategory,
    #[serde(default = "UpgradeDef::default_unlock_day")]
    pub unlock_day: u32,
    #[serde(default)]
    pub cost: UpgradeCost,
    /// Effect token such as `energy_cap_1500`; parsed at purchase time.
    #[serde(default = "UpgradeDef::default_effect")]
    pub effect: String,
    /// Semicolon-delimited prerequisite expression.
    #[serde(default)]
    pub prerequisite: String,
}

impl UpgradeDef {
    const fn default_unlock_day() -> u32 {
        1
    }

    fn default_effect() -> String {
        "none".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperArchetype {
    pub kind: HelperKind,
    pub name: String,
    pub abilities: Vec<HelperAbility>,
}

/// Externalized balance gates. Defaults reproduce the stock tuning exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceTable {
    #[serde(default = "BalanceTable::default_rare_drop_chance")]
    pub rare_drop_chance: f64,
    #[serde(default = "BalanceTable::default_boss_drop_chance")]
    pub boss_drop_chance: f64,
    #[serde(default = "BalanceTable::default_copper_chance")]
    pub copper_chance: f64,
    #[serde(default = "BalanceTable::default_copper_min_depth")]
    pub copper_min_depth: u32,
    #[serde(default = "BalanceTable::default_iron_chance")]
    pub iron_chance: f64,
    #[serde(default = "BalanceTable::default_iron_min_depth")]
    pub iron_min_depth: u32,
    /// Active plots needed to leave tutorial, early, mid, late.
    #[serde(default = "BalanceTable::default_phase_plot_thresholds")]
    pub phase_plot_thresholds: [u32; 4],
    /// Day needed to leave tutorial, early, mid, late.
    #[serde(default = "BalanceTable::default_phase_day_thresholds")]
    pub phase_day_thresholds: [u32; 4],
    #[serde(default = "BalanceTable::default_discovery_plot_thresholds")]
    pub discovery_plot_thresholds: [u32; 3],
    #[serde(default = "BalanceTable::default_discovery_plot_rates")]
    pub discovery_plot_rates: [f64; 3],
    #[serde(default = "BalanceTable::default_discovery_day_thresholds")]
    pub discovery_day_thresholds: [u32; 3],
    #[serde(default = "BalanceTable::default_discovery_day_rates")]
    pub discovery_day_rates: [f64; 3],
    #[serde(default = "BalanceTable::default_discovery_caps")]
    pub discovery_caps: [f64; 3],
    /// Multiplier applied to every discovery chance.
    #[serde(default = "BalanceTable::default_discovery_scale")]
    pub discovery_scale: f64,
}

impl BalanceTable {
    const fn default_rare_drop_chance() -> f64 {
        RARE_DROP_CHANCE
    }

    const fn default_boss_drop_chance() -> f64 {
        BOSS_DROP_CHANCE
    }

    const fn default_copper_chance() -> f64 {
        COPPER_CHANCE
    }

    const fn default_copper_min_depth() -> u32 {
        COPPER_MIN_DEPTH
    }

    const fn default_iron_chance() -> f64 {
        IRON_CHANCE
    }

    const fn default_iron_min_depth() -> u32 {
        IRON_MIN_DEPTH
    }

    const fn default_phase_plot_thresholds() -> [u32; 4] {
        PHASE_PLOT_THRESHOLDS
    }

    const fn default_phase_day_thresholds() -> [u32; 4] {
        PHASE_DAY_THRESHOLDS
    }

    const fn default_discovery_plot_thresholds() -> [u32; 3] {
        DISCOVERY_PLOT_THRESHOLDS
    }

    const fn default_discovery_plot_rates() -> [f64; 3] {
        DISCOVERY_PLOT_RATES
    }

    const fn default_discovery_day_thresholds() -> [u32; 3] {
        DISCOVERY_DAY_THRESHOLDS
    }

    const fn default_discovery_day_rates() -> [f64; 3] {
        DISCOVERY_DAY_RATES
    }

    const fn default_discovery_caps() -> [f64; 3] {
        DISCOVERY_CAPS
    }

    const fn default_discovery_scale() -> f64 {
        1.0
    }

    /// # Errors
    ///
    /// Returns `CatalogError` when a probability leaves `[0, 1]` or the
    /// discovery scale is negative.
    pub fn validate(&self) -> Result<(), CatalogError> {
        check_probability("balance.rare_drop_chance", self.rare_drop_chance)?;
        check_probability("balance.boss_drop_chance", self.boss_drop_chance)?;
        check_probability("balance.copper_chance", self.copper_chance)?;
        check_probability("balance.iron_chance", self.iron_chance)?;
        for (idx, rate) in self.discovery_plot_rates.iter().enumerate() {
            check_probability(format!("balance.discovery_plot_rates[{idx}]"), *rate)?;
        }
        for (idx, rate) in self.discovery_day_rates.iter().enumerate() {
            check_probability(format!("balance.discovery_day_rates[{idx}]"), *rate)?;
        }
        for (idx, cap) in self.discovery_caps.iter().enumerate() {
            check_probability(format!("balance.discovery_caps[{idx}]"), *cap)?;
        }
        check_min("balance.discovery_scale", 0.0, self.discovery_scale)
    }
}

impl Default for BalanceTable {
    fn default() -> Self {
        Self {
            rare_drop_chance: Self::default_rare_drop_chance(),
            boss_drop_chance: Self::default_boss_drop_chance(),
            copper_chance: Self::default_copper_chance(),
            copper_min_depth: Self::default_copper_min_depth(),
            iron_chance: Self::default_iron_chance(),
            iron_min_depth: Self::default_iron_min_depth(),
            phase_plot_thresholds: Self::default_phase_plot_thresholds(),
            phase_day_thresholds: Self::default_phase_day_thresholds(),
            discovery_plot_thresholds: Self::default_discovery_plot_thresholds(),
            discovery_plot_rates: Self::default_discovery_plot_rates(),
            discovery_day_thresholds: Self::default_discovery_day_thresholds(),
            discovery_day_rates: Self::default_discovery_day_rates(),
            discovery_caps: Self::default_discovery_caps(),
            discovery_scale: Self::default_discovery_scale(),
        }
    }
}

/// Immutable game catalog consumed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfiguration {
    pub materials: Vec<String>,
    pub crops: Vec<Crop>,
    #[serde(default)]
    pub adventures: Vec<Adventure>,
    #[serde(default)]
    pub mining: MiningTable,
    #[serde(default)]
    pub upgrades: Vec<UpgradeDef>,
    #[serde(default)]
    pub helpers: Vec<HelperArchetype>,
    #[serde(default)]
    pub balance: BalanceTable,
}

impl GameConfiguration {
    /// The catalog bundled with the crate.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the bundled JSON fails to parse or validate.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    /// Parse and validate a catalog from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` on malformed JSON or any invariant violation.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog from a JSON file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not hold a valid catalog.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("validating catalog {}", path.display()))
    }

    /// Check every table for duplicate ids, non-positive timings, and
    /// references to undeclared materials.
    ///
    /// # Errors
    ///
    /// Returns the first `CatalogError` encountered.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.crops.is_empty() {
            return Err(CatalogError::EmptyTable { table: "crops" });
        }
        check_unique("crops", self.crops.iter().map(|c| c.id.as_str()))?;
        check_unique("adventures", self.adventures.iter().map(|a| a.id.as_str()))?;
        check_unique("upgrades", self.upgrades.iter().map(|u| u.id.as_str()))?;
        check_unique("materials", self.materials.iter().map(String::as_str))?;

        for crop in &self.crops {
            check_min(format!("crops.{}.growth_time", crop.id), 1.0, crop.growth_time)?;
            check_min(format!("crops.{}.energy", crop.id), 0.0, crop.energy)?;
        }
        for adventure in &self.adventures {
            for tier in DurationTier::ALL {
                let stats = adventure.tier(tier);
                let prefix = format!("adventures.{}.{}", adventure.id, tier.as_str());
                check_min(format!("{prefix}.energy"), 0.0, stats.energy)?;
                check_min(format!("{prefix}.duration"), 1.0, f64::from(stats.duration))?;
            }
            check_min(
                format!("adventures.{}.gold_reward", adventure.id),
                0.0,
                adventure.gold_reward,
            )?;
            for drop in adventure.drops() {
                self.require_material(&adventure.id, &drop.material)?;
            }
        }
        check_min("mining.base_cost", 0.0, self.mining.base_cost)?;
        check_min("mining.max_depth", 1.0, f64::from(self.mining.max_depth))?;
        for upgrade in &self.upgrades {
            check_min(
                format!("upgrades.{}.cost.energy", upgrade.id),
                0.0,
                upgrade.cost.energy,
            )?;
            for material in upgrade.cost.materials.keys() {
                self.require_material(&upgrade.id, material)?;
            }
        }
        self.balance.validate()
    }

    fn require_material(&self, owner: &str, material: &str) -> Result<(), CatalogError> {
        if self.materials.iter().any(|m| m == material) {
            return Ok(());
        }
        Err(CatalogError::UnknownMaterial {
            owner: owner.to_string(),
            material: material.to_string(),
        })
    }

    #[must_use]
    pub fn crop(&self, id: &str) -> Option<&Crop> {
        self.crops.iter().find(|crop| crop.id == id)
    }

    #[must_use]
    pub fn adventure(&self, id: &str) -> Option<&Adventure> {
        self.adventures.iter().find(|adventure| adventure.id == id)
    }

    #[must_use]
    pub fn upgrade(&self, id: &str) -> Option<&UpgradeDef> {
        self.upgrades.iter().find(|upgrade| upgrade.id == id)
    }

    #[must_use]
    pub fn helper_archetype(&self, kind: HelperKind) -> Option<&HelperArchetype> {
        self.helpers.iter().find(|archetype| archetype.kind == kind)
    }

    /// Crops plantable during `phase`, in catalog order.
    pub fn crops_for_phase(&self, phase: Phase) -> impl Iterator<Item = &Crop> {
        self.crops
            .iter()
            .filter(move |crop| crop.tier.available_in(phase))
    }

    /// xxHash64 over the canonical JSON encoding.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(&bytes);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_loads_and_validates() {
        let catalog = GameConfiguration::builtin().unwrap();
        let carrot = catalog.crop("carrot").unwrap();
        assert!((carrot.growth_time - 60.0).abs() < f64::EPSILON);
        assert!((carrot.energy - 10.0).abs() < f64::EPSILON);
        assert_eq!(catalog.materials.len(), 7);
        assert!(catalog.upgrade("storage_1").is_some());
        assert_eq!(catalog.balance, BalanceTable::default());
    }

    #[test]
    fn mining_costs_follow_power_curve() {
        let mining = MiningTable::default();
        assert!((mining.energy_cost(5) - 111.0).abs() < f64::EPSILON);
        assert!((mining.energy_cost(1) - 10.0).abs() < f64::EPSILON);
        assert_eq!(mining.gold_yield(1), 50);
        assert_eq!(mining.stone_yield(5), 10);
        assert_eq!(MiningTable::copper_yield(5), 2);
        assert_eq!(MiningTable::iron_yield(10), 2);
    }

    #[test]
    fn duplicate_crop_ids_are_rejected() {
        let mut catalog = GameConfiguration::builtin().unwrap();
        let copy = catalog.crops[0].clone();
        catalog.crops.push(copy);
        let err = catalog.validate().unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateId { table: "crops", .. }));
    }

    #[test]
    fn undeclared_materials_are_rejected() {
        let mut catalog = GameConfiguration::builtin().unwrap();
        catalog.upgrades[0]
            .cost
            .materials
            .insert("unobtainium".to_string(), 1);
        assert!(matches!(
            catalog.validate(),
            Err(CatalogError::UnknownMaterial { .. })
        ));
    }

    #[test]
    fn balance_probabilities_are_bounded() {
        let mut catalog = GameConfiguration::builtin().unwrap();
        catalog.balance.rare_drop_chance = 1.5;
        let err = catalog.validate().unwrap_err();
        assert!(err.to_string().contains("rare_drop_chance"));
    }

    #[test]
    fn crop_tiers_gate_by_phase() {
        let catalog = GameConfiguration::builtin().unwrap();
        let early: Vec<_> = catalog.crops_for_phase(Phase::Early).collect();
        assert!(early.iter().all(|c| c.tier == CropTier::Early));
        let late = catalog.crops_for_phase(Phase::Late).count();
        let all = catalog.crops_for_phase(Phase::Endgame).count();
        assert!(late < all);
        assert_eq!(all, catalog.crops.len());
    }

    #[test]
    fn fingerprint_tracks_content() {
        let catalog = GameConfiguration::builtin().unwrap();
        let mut tweaked = catalog.clone();
        assert_eq!(catalog.fingerprint(), tweaked.fingerprint());
        tweaked.crops[0].growth_time += 1.0;
        assert_ne!(catalog.fingerprint(), tweaked.fingerprint());
    }

    #[test]
    fn missing_optional_sections_fall_back_to_defaults() {
        let json = r#"{
            "materials": ["stone"],
            "crops": [{"id": "carrot", "name": "Carrot", "tier": "early", "energy": 10, "growth_time": 60}]
        }"#;
        let catalog = GameConfiguration::from_json(json).unwrap();
        assert_eq!(catalog.mining, MiningTable::default());
        assert!(catalog.upgrades.is_empty());
    }
}
