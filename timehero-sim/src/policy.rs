//! The simulated player: session scheduling and per-pass decisions.
//!
//! Sessions start from the host's wall-clock hour (see [`SessionClock`]);
//! once active they live on the game state and take one action pass every
//! `ceil(1 / efficiency)` simulated minutes until idle or out of time.
//!
//! [`SessionClock`]: crate::clock::SessionClock

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::actions::{self, ActionSource};
use crate::catalog::{Crop, DurationTier, GameConfiguration};
use crate::clock::WallTime;
use crate::constants::{
    ADVENTURE_FACTOR, ADVENTURE_MIN_ENERGY, MINE_FACTOR, MINE_MIN_ENERGY, PLANT_FACTOR,
    PLAYER_MINE_MAX_DEPTH, PLAYER_MINING_DURATION, SESSION_HOUR_TOLERANCE,
    UPGRADE_CONSIDER_FACTOR,
};
use crate::engine::SimError;
use crate::events::{EventCategory, EventSeverity};
use crate::farm;
use crate::numbers::ceil_f64_to_u64;
use crate::phase::Phase;
use crate::profile::PlayerProfile;
use crate::rng::roll_chance;
use crate::state::GameState;
use crate::upgrades;

/// A check-in in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub started_at: u64,
    pub ends_at: u64,
    pub next_action_at: u64,
}

/// What one action pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub harvested: u32,
    pub planted: bool,
    pub adventure: bool,
    pub mining: bool,
    pub upgrade: bool,
}

impl PassReport {
    #[must_use]
    pub const fn acted(&self) -> bool {
        self.harvested > 0 || self.planted || self.adventure || self.mining || self.upgrade
    }
}

/// Try to open a session against the wall-clock schedule.
///
/// Windows within an hour of `wall.hour` each get one Bernoulli draw, in
/// schedule order; the first that passes starts the session.
pub fn try_start_session<R: Rng + ?Sized>(
    state: &mut GameState,
    profile: &PlayerProfile,
    wall: WallTime,
    rng: &mut R,
) -> bool {
    if state.session.is_some() {
        return false;
    }
    let window = profile.windows(wall.weekend).iter().find(|window| {
        wall.hour.abs_diff(window.hour()) <= SESSION_HOUR_TOLERANCE
            && roll_chance(rng, window.probability)
    });
    let Some(window) = window else {
        return false;
    };
    let duration = u64::from(window.duration_minutes);
    state.session = Some(ActiveSession {
        started_at: state.tick,
        ends_at: state.tick + duration,
        next_action_at: state.tick,
    });
    state.metrics.counters.sessions += 1;
    state.log(
        EventCategory::Session,
        EventSeverity::Info,
        format!("Player checked in for {duration} minutes"),
    );
    true
}

fn end_session(state: &mut GameState, reason: &str) {
    if let Some(session) = state.session.take() {
        let minutes = state.tick.saturating_sub(session.started_at);
        state.log(
            EventCategory::Session,
            EventSeverity::Info,
            format!("Session ended after {minutes} minutes ({reason})"),
        );
    }
}

/// Advance an active session by one tick.
///
/// # Errors
///
/// Propagates fatal errors from harvesting.
pub fn drive_session<R: Rng + ?Sized>(
    state: &mut GameState,
    catalog: &GameConfiguration,
    profile: &PlayerProfile,
    rng: &mut R,
) -> Result<Option<PassReport>, SimError> {
    let Some(session) = state.session else {
        return Ok(None);
    };
    if state.tick >= session.ends_at {
        end_session(state, "time up");
        return Ok(None);
    }
    if state.tick < session.next_action_at {
        return Ok(None);
    }
    let efficiency = profile.efficiency_for(state.phase);
    let report = action_pass(state, catalog, profile, efficiency, rng)?;
    state.metrics.counters.session_passes += 1;
    if report.acted() {
        let step = ceil_f64_to_u64(1.0 / efficiency.max(f64::EPSILON)).max(1);
        if let Some(active) = state.session.as_mut() {
            active.next_action_at = state.tick + step;
        }
    } else {
        end_session(state, "nothing to do");
    }
    Ok(Some(report))
}

fn action_pass<R: Rng + ?Sized>(
    state: &mut GameState,
    catalog: &GameConfiguration,
    profile: &PlayerProfile,
    efficiency: f64,
    rng: &mut R,
) -> Result<PassReport, SimError> {
    let mut report = PassReport::default();

    for plot_id in state.farm.ready_plot_ids() {
        if roll_chance(rng, efficiency)
            && farm::harvest_crop(state, catalog, plot_id, ActionSource::Player)?.is_ok()
        {
            report.harvested += 1;
        }
    }

    if let Some(&plot_id) = state.farm.empty_plot_ids().first()
        && roll_chance(rng, efficiency * PLANT_FACTOR)
        && let Some(crop_id) = choose_crop(catalog, state.phase, efficiency, rng)
    {
        report.planted =
            farm::plant_crop(state, catalog, plot_id, &crop_id, ActionSource::Player).is_ok();
    }

    if state.hero.is_idle()
        && state.resources.energy() > ADVENTURE_MIN_ENERGY
        && roll_chance(rng, efficiency * ADVENTURE_FACTOR)
        && let Some((adventure_id, tier)) = choose_adventure(
            catalog,
            state.clock.day,
            state.resources.energy(),
            profile.adventure_preference,
            efficiency,
            rng,
        )
    {
        report.adventure =
            actions::start_adventure(state, catalog, &adventure_id, tier, ActionSource::Player)
                .is_ok();
    }

    if state.hero.is_idle()
        && state.resources.energy() > MINE_MIN_ENERGY
        && roll_chance(rng, efficiency * MINE_FACTOR)
    {
        let depth = PLAYER_MINE_MAX_DEPTH.min(state.clock.day / 3 + 1);
        report.mining = actions::start_mining(
            state,
            catalog,
            depth,
            PLAYER_MINING_DURATION,
            ActionSource::Player,
        )
        .is_ok();
    }

    if roll_chance(rng, efficiency * UPGRADE_CONSIDER_FACTOR) {
        report.upgrade = upgrades::consider_upgrade(
            state,
            catalog,
            profile.upgrade_strategy,
            efficiency,
            rng,
        )
        .is_some();
    }

    Ok(report)
}

/// Pick a crop for `phase`: the best energy-per-minute crop with probability
/// `efficiency`, otherwise any eligible crop.
pub fn choose_crop<R: Rng + ?Sized>(
    catalog: &GameConfiguration,
    phase: Phase,
    efficiency: f64,
    rng: &mut R,
) -> Option<String> {
    let crops: Vec<&Crop> = catalog.crops_for_phase(phase).collect();
    if crops.is_empty() {
        return None;
    }
    let pick = if roll_chance(rng, efficiency) {
        crops
            .iter()
            .copied()
            .max_by(|a, b| a.energy_rate().total_cmp(&b.energy_rate()))
    } else {
        crops.get(rng.gen_range(0..crops.len())).copied()
    };
    pick.map(|crop| crop.id.clone())
}

/// Pick an adventure and tier, newest unlocked first.
///
/// The preferred tier is used when affordable, short otherwise; adventures
/// that cannot even afford short are skipped. The final pick is accepted
/// with probability `efficiency`.
pub fn choose_adventure<R: Rng + ?Sized>(
    catalog: &GameConfiguration,
    day: u32,
    energy: f64,
    preference: DurationTier,
    efficiency: f64,
    rng: &mut R,
) -> Option<(String, DurationTier)> {
    let (adventure, tier) = catalog
        .adventures
        .iter()
        .rev()
        .filter(|adventure| adventure.unlock_day <= day)
        .find_map(|adventure| {
            if adventure.tier(preference).energy <= energy {
                Some((adventure, preference))
            } else if adventure.tier(DurationTier::Short).energy <= energy {
                Some((adventure, DurationTier::Short))
            } else {
                None
            }
        })?;
    roll_chance(rng, efficiency).then(|| (adventure.id.clone(), tier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ResourceKind;
    use crate::profile::{PhaseEfficiency, SessionWindow};
    use crate::rng::RngBundle;

    fn fixture() -> (GameState, GameConfiguration) {
        let catalog = GameConfiguration::builtin().unwrap();
        let state = GameState::new(&catalog, 1_000);
        (state, catalog)
    }

    fn eager_profile(efficiency: f64) -> PlayerProfile {
        let mut profile = PlayerProfile::default();
        profile.efficiency = PhaseEfficiency::uniform(efficiency);
        profile.weekday = vec![SessionWindow::new(7 * 60, 10, 1.0)];
        profile
    }

    #[test]
    fn session_starts_only_near_a_window() {
        let (mut state, _) = fixture();
        let profile = eager_profile(1.0);
        let bundle = RngBundle::from_user_seed(3);
        let far = WallTime {
            hour: 11,
            weekend: false,
        };
        assert!(!try_start_session(&mut state, &profile, far, &mut *bundle.policy()));
        let near = WallTime {
            hour: 8,
            weekend: false,
        };
        assert!(try_start_session(&mut state, &profile, near, &mut *bundle.policy()));
        let session = state.session.unwrap();
        assert_eq!(session.ends_at - session.started_at, 10);
        assert_eq!(state.metrics.counters.sessions, 1);
        assert!(!try_start_session(&mut state, &profile, near, &mut *bundle.policy()));
    }

    #[test]
    fn pass_schedules_next_action_or_ends_session() {
        let (mut state, catalog) = fixture();
        let profile = eager_profile(1.0);
        let bundle = RngBundle::from_user_seed(5);
        state.session = Some(ActiveSession {
            started_at: 0,
            ends_at: 100,
            next_action_at: 0,
        });
        let report = drive_session(&mut state, &catalog, &profile, &mut *bundle.policy())
            .unwrap()
            .unwrap();
        assert_eq!(state.metrics.counters.session_passes, 1);
        // No energy and no gold: planting is the only thing a pass can do.
        if report.planted {
            assert_eq!(state.farm.active_count(), 1);
            assert_eq!(state.session.unwrap().next_action_at, 1);
        } else {
            assert!(!report.acted());
            assert!(state.session.is_none());
        }
    }

    #[test]
    fn session_closes_at_deadline() {
        let (mut state, catalog) = fixture();
        let profile = eager_profile(1.0);
        let bundle = RngBundle::from_user_seed(5);
        state.tick = 10;
        state.session = Some(ActiveSession {
            started_at: 0,
            ends_at: 10,
            next_action_at: 0,
        });
        let report = drive_session(&mut state, &catalog, &profile, &mut *bundle.policy()).unwrap();
        assert!(report.is_none());
        assert!(state.session.is_none());
    }

    #[test]
    fn full_efficiency_harvests_every_ready_plot() {
        let (mut state, catalog) = fixture();
        let carrot = catalog.crop("carrot").unwrap().clone();
        for plot in 1..=3 {
            state.farm.plant(plot, &carrot, 0).unwrap();
        }
        state.tick = 60;
        state.farm.advance_growth(60, &catalog).unwrap();
        assert_eq!(state.farm.ready_plot_ids().len(), 3);
        let profile = eager_profile(1.0);
        let bundle = RngBundle::from_user_seed(9);
        assert!(state.hero.carry_capacity < 3);
        let report = action_pass(&mut state, &catalog, &profile, 1.0, &mut *bundle.policy()).unwrap();
        assert_eq!(report.harvested, 3);
        assert_eq!(state.metrics.counters.harvests, 3);
        assert!(state.farm.ready_plot_ids().is_empty());
    }

    #[test]
    fn best_crop_wins_at_full_efficiency() {
        let catalog = GameConfiguration::builtin().unwrap();
        let bundle = RngBundle::from_user_seed(1);
        let best = catalog
            .crops_for_phase(Phase::Early)
            .max_by(|a, b| a.energy_rate().total_cmp(&b.energy_rate()))
            .unwrap()
            .id
            .clone();
        for _ in 0..20 {
            let pick = choose_crop(&catalog, Phase::Early, 1.0, &mut *bundle.policy());
            assert_eq!(pick.as_deref(), Some(best.as_str()));
        }
    }

    #[test]
    fn adventure_falls_back_to_short_tier() {
        let catalog = GameConfiguration::builtin().unwrap();
        let bundle = RngBundle::from_user_seed(1);
        let meadow = catalog.adventure("meadow_path").unwrap();
        let energy = meadow.short.energy;
        let pick = choose_adventure(
            &catalog,
            1,
            energy,
            DurationTier::Long,
            1.0,
            &mut *bundle.policy(),
        );
        assert_eq!(pick, Some(("meadow_path".to_string(), DurationTier::Short)));
        let none = choose_adventure(
            &catalog,
            1,
            energy - 1.0,
            DurationTier::Short,
            1.0,
            &mut *bundle.policy(),
        );
        assert!(none.is_none());
    }

    #[test]
    fn energy_gate_blocks_adventures() {
        let (mut state, catalog) = fixture();
        state
            .resources
            .add_resource(&ResourceKind::Energy, ADVENTURE_MIN_ENERGY);
        let profile = eager_profile(1.0);
        let bundle = RngBundle::from_user_seed(4);
        let report = action_pass(&mut state, &catalog, &profile, 1.0, &mut *bundle.policy()).unwrap();
        assert!(!report.adventure);
        assert!(state.hero.is_idle());
    }
}
