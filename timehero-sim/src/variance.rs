//! Seeded perturbation of catalogs and profiles for Monte Carlo variants.
//!
//! Every draw happens in a fixed order from a `ChaCha20Rng` derived from the
//! run seed, so the same seed always yields the same variant.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{GameConfiguration, MaterialDrop};
use crate::constants::MINUTES_PER_DAY;
use crate::numbers::{floor_f64_to_u32, floor_f64_to_u64, u64_to_f64};
use crate::phase::Phase;
use crate::profile::{PlayerProfile, SessionWindow};
use crate::rng::derive_stream_seed;

const MIN_EFFICIENCY: f64 = 0.1;
const MAX_EFFICIENCY: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VarianceError {
    #[error("{field} must be between 0 and 1 (got {value})")]
    RangeViolation { field: &'static str, value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerVariance {
    #[serde(default = "PlayerVariance::default_checkin_timing")]
    pub checkin_timing: f64,
    #[serde(default = "PlayerVariance::default_session_length")]
    pub session_length: f64,
    #[serde(default = "PlayerVariance::default_efficiency")]
    pub efficiency: f64,
}

impl PlayerVariance {
    const fn default_checkin_timing() -> f64 {
        0.2
    }

    const fn default_session_length() -> f64 {
        0.3
    }

    const fn default_efficiency() -> f64 {
        0.1
    }
}

impl Default for PlayerVariance {
    fn default() -> Self {
        Self {
            checkin_timing: Self::default_checkin_timing(),
            session_length: Self::default_session_length(),
            efficiency: Self::default_efficiency(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameVariance {
    #[serde(default = "GameVariance::default_crop_growth")]
    pub crop_growth: f64,
    #[serde(default = "GameVariance::default_helper_discovery")]
    pub helper_discovery: f64,
    #[serde(default = "GameVariance::default_material_drop")]
    pub material_drop: f64,
    #[serde(default = "GameVariance::default_adventure_reward")]
    pub adventure_reward: f64,
}

impl GameVariance {
    const fn default_crop_growth() -> f64 {
        0.1
    }

    const fn default_helper_discovery() -> f64 {
        0.3
    }

    const fn default_material_drop() -> f64 {
        0.2
    }

    const fn default_adventure_reward() -> f64 {
        0.15
    }
}

impl Default for GameVariance {
    fn default() -> Self {
        Self {
            crop_growth: Self::default_crop_growth(),
            helper_discovery: Self::default_helper_discovery(),
            material_drop: Self::default_material_drop(),
            adventure_reward: Self::default_adventure_reward(),
        }
    }
}

/// Relative spread applied to each perturbed field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VarianceConfig {
    #[serde(default)]
    pub player_behavior: PlayerVariance,
    #[serde(default)]
    pub game_rng: GameVariance,
}

impl VarianceConfig {
    /// No perturbation at all; variants equal their base.
    #[must_use]
    pub fn none() -> Self {
        Self {
            player_behavior: PlayerVariance {
                checkin_timing: 0.0,
                session_length: 0.0,
                efficiency: 0.0,
            },
            game_rng: GameVariance {
                crop_growth: 0.0,
                helper_discovery: 0.0,
                material_drop: 0.0,
                adventure_reward: 0.0,
            },
        }
    }

    /// # Errors
    ///
    /// Returns `VarianceError::RangeViolation` for a spread outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), VarianceError> {
        let fields = [
            ("player_behavior.checkin_timing", self.player_behavior.checkin_timing),
            ("player_behavior.session_length", self.player_behavior.session_length),
            ("player_behavior.efficiency", self.player_behavior.efficiency),
            ("game_rng.crop_growth", self.game_rng.crop_growth),
            ("game_rng.helper_discovery", self.game_rng.helper_discovery),
            ("game_rng.material_drop", self.game_rng.material_drop),
            ("game_rng.adventure_reward", self.game_rng.adventure_reward),
        ];
        for (field, value) in fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(VarianceError::RangeViolation { field, value });
            }
        }
        Ok(())
    }
}

/// `value * (1 + (u - 0.5) * 2 * variance)` for a uniform draw `u`.
pub fn perturb<R: Rng + ?Sized>(value: f64, variance: f64, rng: &mut R) -> f64 {
    let roll = rng.r#gen::<f64>();
    value * (1.0 + (roll - 0.5) * variance * 2.0)
}

fn perturb_drop<R: Rng + ?Sized>(drop: &mut MaterialDrop, variance: f64, rng: &mut R) {
    drop.amount = floor_f64_to_u64(perturb(u64_to_f64(drop.amount), variance, rng));
}

/// Deep-copied, perturbed catalog for one run.
#[must_use]
pub fn variant_catalog(
    base: &GameConfiguration,
    config: &VarianceConfig,
    seed: u64,
) -> GameConfiguration {
    let mut rng = ChaCha20Rng::seed_from_u64(derive_stream_seed(seed, b"variant.catalog"));
    let spread = &config.game_rng;
    let mut catalog = base.clone();
    for crop in &mut catalog.crops {
        crop.growth_time = perturb(crop.growth_time, spread.crop_growth, &mut rng).max(1.0);
    }
    for adventure in &mut catalog.adventures {
        adventure.gold_reward =
            perturb(adventure.gold_reward, spread.adventure_reward, &mut rng).max(0.0);
    }
    for adventure in &mut catalog.adventures {
        perturb_drop(&mut adventure.common, spread.material_drop, &mut rng);
        if let Some(rare) = adventure.rare.as_mut() {
            perturb_drop(rare, spread.material_drop, &mut rng);
        }
        if let Some(boss) = adventure.boss.as_mut() {
            perturb_drop(boss, spread.material_drop, &mut rng);
        }
    }
    catalog.balance.discovery_scale = perturb(
        catalog.balance.discovery_scale,
        spread.helper_discovery,
        &mut rng,
    )
    .max(0.0);
    catalog
}

fn shift_window<R: Rng + ?Sized>(window: &mut SessionWindow, variance: f64, rng: &mut R) {
    let minute = perturb(f64::from(window.start_minute), variance, rng);
    window.start_minute = floor_f64_to_u32(minute).min(MINUTES_PER_DAY - 1);
}

/// Perturbed copy of a player profile for one run.
#[must_use]
pub fn variant_profile(base: &PlayerProfile, config: &VarianceConfig, seed: u64) -> PlayerProfile {
    let mut rng = ChaCha20Rng::seed_from_u64(derive_stream_seed(seed, b"variant.profile"));
    let spread = &config.player_behavior;
    let mut profile = base.clone();
    for window in profile.weekday.iter_mut().chain(profile.weekend.iter_mut()) {
        shift_window(window, spread.checkin_timing, &mut rng);
    }
    for window in profile.weekday.iter_mut().chain(profile.weekend.iter_mut()) {
        let minutes = perturb(f64::from(window.duration_minutes), spread.session_length, &mut rng);
        window.duration_minutes = floor_f64_to_u32(minutes).max(1);
    }
    for phase in Phase::ALL {
        let slot = profile.efficiency.get_mut(phase);
        *slot = perturb(*slot, spread.efficiency, &mut rng).clamp(MIN_EFFICIENCY, MAX_EFFICIENCY);
    }
    profile
}

/// A catalog and profile pair derived from one seed.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub seed: u64,
    pub catalog: GameConfiguration,
    pub profile: PlayerProfile,
}

impl Variant {
    #[must_use]
    pub fn generate(
        catalog: &GameConfiguration,
        profile: &PlayerProfile,
        config: &VarianceConfig,
        seed: u64,
    ) -> Self {
        Self {
            seed,
            catalog: variant_catalog(catalog, config, seed),
            profile: variant_profile(profile, config, seed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_variant() {
        let catalog = GameConfiguration::builtin().unwrap();
        let profile = PlayerProfile::default();
        let config = VarianceConfig::default();
        let a = Variant::generate(&catalog, &profile, &config, 17);
        let b = Variant::generate(&catalog, &profile, &config, 17);
        assert_eq!(a, b);
        for (x, y) in a.catalog.crops.iter().zip(&b.catalog.crops) {
            assert_eq!(x.growth_time.to_bits(), y.growth_time.to_bits());
        }
        let c = Variant::generate(&catalog, &profile, &config, 18);
        assert_ne!(a.catalog.crops, c.catalog.crops);
    }

    #[test]
    fn zero_variance_is_identity() {
        let catalog = GameConfiguration::builtin().unwrap();
        let profile = PlayerProfile::default();
        let variant = Variant::generate(&catalog, &profile, &VarianceConfig::none(), 5);
        assert_eq!(variant.catalog, catalog);
        assert_eq!(variant.profile, profile);
    }

    #[test]
    fn perturbations_stay_in_bounds() {
        let catalog = GameConfiguration::builtin().unwrap();
        let profile = PlayerProfile::default();
        let mut config = VarianceConfig::default();
        config.player_behavior.efficiency = 1.0;
        config.game_rng.crop_growth = 1.0;
        for seed in 0..50 {
            let variant = Variant::generate(&catalog, &profile, &config, seed);
            assert!(variant.catalog.crops.iter().all(|c| c.growth_time >= 1.0));
            for phase in Phase::ALL {
                let eff = variant.profile.efficiency_for(phase);
                assert!((MIN_EFFICIENCY..=MAX_EFFICIENCY).contains(&eff));
            }
            for (orig, varied) in catalog.crops.iter().zip(&variant.catalog.crops) {
                assert!(varied.growth_time <= orig.growth_time * 2.0);
            }
        }
    }

    #[test]
    fn spreads_are_validated() {
        let mut config = VarianceConfig::default();
        assert!(config.validate().is_ok());
        config.game_rng.material_drop = 1.5;
        assert!(matches!(
            config.validate(),
            Err(VarianceError::RangeViolation {
                field: "game_rng.material_drop",
                ..
            })
        ));
    }
}
