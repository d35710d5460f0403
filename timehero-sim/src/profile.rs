//! Player behavior profile: check-in schedule, per-phase efficiency, strategy.

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::catalog::{DurationTier, UpgradeCategory};
use crate::constants::MINUTES_PER_DAY;
use crate::phase::Phase;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile JSON could not be parsed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{field} must be between {min:.2} and {max:.2} (got {value:.2})")]
    RangeViolation {
        field: String,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("invalid time of day `{0}` (expected HH:MM)")]
    InvalidTime(String),
    #[error("{field} must be at least 1 minute")]
    EmptyDuration { field: String },
}

/// Parse `HH:MM` into minutes after midnight.
///
/// # Errors
///
/// Returns `ProfileError::InvalidTime` for anything outside `00:00..=23:59`.
pub fn parse_hhmm(text: &str) -> Result<u32, ProfileError> {
    let invalid = || ProfileError::InvalidTime(text.to_string());
    let (hours, minutes) = text.trim().split_once(':').ok_or_else(invalid)?;
    let hours: u32 = hours.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    if hours >= 24 || minutes >= 60 {
        return Err(invalid());
    }
    Ok(hours * 60 + minutes)
}

#[must_use]
pub fn format_hhmm(minute_of_day: u32) -> String {
    let minute_of_day = minute_of_day % MINUTES_PER_DAY;
    format!("{:02}:{:02}", minute_of_day / 60, minute_of_day % 60)
}

mod hhmm {
    use super::{Deserialize, Deserializer, Serializer, format_hhmm, parse_hhmm};

    pub fn serialize<S: Serializer>(minute: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_hhmm(*minute))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_hhmm(&text).map_err(serde::de::Error::custom)
    }
}

/// A scheduled check-in slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionWindow {
    /// Minutes after midnight, written as `HH:MM`.
    #[serde(rename = "time", with = "hhmm")]
    pub start_minute: u32,
    #[serde(rename = "duration")]
    pub duration_minutes: u32,
    pub probability: f64,
}

impl SessionWindow {
    #[must_use]
    pub const fn new(start_minute: u32, duration_minutes: u32, probability: f64) -> Self {
        Self {
            start_minute,
            duration_minutes,
            probability,
        }
    }

    #[must_use]
    pub const fn hour(&self) -> u32 {
        self.start_minute / 60
    }

    fn validate(&self, field: &str) -> Result<(), ProfileError> {
        check_unit(format!("{field}.probability"), self.probability)?;
        if self.duration_minutes == 0 {
            return Err(ProfileError::EmptyDuration {
                field: format!("{field}.duration"),
            });
        }
        if self.start_minute >= MINUTES_PER_DAY {
            return Err(ProfileError::InvalidTime(format_hhmm(self.start_minute)));
        }
        Ok(())
    }
}

fn check_unit(field: String, value: f64) -> Result<(), ProfileError> {
    if (0.0..=1.0).contains(&value) {
        return Ok(());
    }
    Err(ProfileError::RangeViolation {
        field,
        min: 0.0,
        max: 1.0,
        value,
    })
}

/// Probability of taking the optimal action, per phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseEfficiency {
    #[serde(default = "PhaseEfficiency::default_tutorial")]
    pub tutorial: f64,
    #[serde(default = "PhaseEfficiency::default_early")]
    pub early: f64,
    #[serde(default = "PhaseEfficiency::default_mid")]
    pub mid: f64,
    #[serde(default = "PhaseEfficiency::default_late")]
    pub late: f64,
    #[serde(default = "PhaseEfficiency::default_endgame")]
    pub endgame: f64,
}

impl PhaseEfficiency {
    const fn default_tutorial() -> f64 {
        0.65
    }

    const fn default_early() -> f64 {
        0.70
    }

    const fn default_mid() -> f64 {
        0.75
    }

    const fn default_late() -> f64 {
        0.80
    }

    const fn default_endgame() -> f64 {
        0.85
    }

    /// Same efficiency in every phase.
    #[must_use]
    pub const fn uniform(value: f64) -> Self {
        Self {
            tutorial: value,
            early: value,
            mid: value,
            late: value,
            endgame: value,
        }
    }

    #[must_use]
    pub const fn get(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Tutorial => self.tutorial,
            Phase::Early => self.early,
            Phase::Mid => self.mid,
            Phase::Late => self.late,
            Phase::Endgame => self.endgame,
        }
    }

    pub const fn get_mut(&mut self, phase: Phase) -> &mut f64 {
        match phase {
            Phase::Tutorial => &mut self.tutorial,
            Phase::Early => &mut self.early,
            Phase::Mid => &mut self.mid,
            Phase::Late => &mut self.late,
            Phase::Endgame => &mut self.endgame,
        }
    }
}

impl Default for PhaseEfficiency {
    fn default() -> Self {
        Self {
            tutorial: Self::default_tutorial(),
            early: Self::default_early(),
            mid: Self::default_mid(),
            late: Self::default_late(),
            endgame: Self::default_endgame(),
        }
    }
}

/// Which upgrade categories the autonomous buyer favors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeStrategy {
    #[default]
    Balanced,
    StorageFocused,
    ProductionFocused,
}

impl UpgradeStrategy {
    pub const ALL: [Self; 3] = [
        Self::Balanced,
        Self::StorageFocused,
        Self::ProductionFocused,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::StorageFocused => "storage_focused",
            Self::ProductionFocused => "production_focused",
        }
    }

    /// Rank adjustment for a category; lower ranks are bought first.
    #[must_use]
    pub const fn category_weight(self, category: UpgradeCategory) -> f64 {
        match (self, category) {
            (Self::StorageFocused, UpgradeCategory::Storage) => -50.0,
            (Self::StorageFocused, UpgradeCategory::Water) => -30.0,
            (Self::ProductionFocused, UpgradeCategory::Hero) => -40.0,
            (Self::ProductionFocused, UpgradeCategory::Tower) => -30.0,
            (Self::Balanced, UpgradeCategory::Storage) => -20.0,
            (Self::Balanced, UpgradeCategory::Hero) => -15.0,
            (Self::Balanced, UpgradeCategory::Water) => -10.0,
            _ => 0.0,
        }
    }
}

impl fmt::Display for UpgradeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behavioral parameters for the simulated player.
///
/// Replaced wholesale, never patched field by field during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    #[serde(default)]
    pub efficiency: PhaseEfficiency,
    #[serde(default = "PlayerProfile::default_weekday")]
    pub weekday: Vec<SessionWindow>,
    #[serde(default = "PlayerProfile::default_weekend")]
    pub weekend: Vec<SessionWindow>,
    #[serde(default)]
    pub upgrade_strategy: UpgradeStrategy,
    #[serde(default = "PlayerProfile::default_adventure_preference")]
    pub adventure_preference: DurationTier,
    /// Carried for reporting; no decision currently reads it.
    #[serde(default = "PlayerProfile::default_risk_tolerance")]
    pub risk_tolerance: f64,
}

impl PlayerProfile {
    fn default_weekday() -> Vec<SessionWindow> {
        vec![
            SessionWindow::new(7 * 60, 10, 0.8),
            SessionWindow::new(12 * 60, 5, 0.6),
            SessionWindow::new(18 * 60, 20, 0.9),
        ]
    }

    fn default_weekend() -> Vec<SessionWindow> {
        vec![
            SessionWindow::new(9 * 60, 30, 0.7),
            SessionWindow::new(14 * 60, 25, 0.6),
            SessionWindow::new(20 * 60, 45, 0.9),
        ]
    }

    const fn default_adventure_preference() -> DurationTier {
        DurationTier::Medium
    }

    const fn default_risk_tolerance() -> f64 {
        0.7
    }

    /// Parse and validate a profile from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError` on malformed JSON or out-of-range values.
    pub fn from_json(json: &str) -> Result<Self, ProfileError> {
        let profile: Self = serde_json::from_str(json)?;
        profile.validate()?;
        Ok(profile)
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or holds an invalid profile.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading profile {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("validating profile {}", path.display()))
    }

    /// # Errors
    ///
    /// Returns `ProfileError` when an efficiency or probability leaves `[0, 1]`,
    /// or a window has no duration.
    pub fn validate(&self) -> Result<(), ProfileError> {
        for phase in Phase::ALL {
            check_unit(
                format!("efficiency.{}", phase.as_str()),
                self.efficiency.get(phase),
            )?;
        }
        for (idx, window) in self.weekday.iter().enumerate() {
            window.validate(&format!("weekday[{idx}]"))?;
        }
        for (idx, window) in self.weekend.iter().enumerate() {
            window.validate(&format!("weekend[{idx}]"))?;
        }
        check_unit("risk_tolerance".to_string(), self.risk_tolerance)
    }

    #[must_use]
    pub const fn efficiency_for(&self, phase: Phase) -> f64 {
        self.efficiency.get(phase)
    }

    #[must_use]
    pub fn windows(&self, weekend: bool) -> &[SessionWindow] {
        if weekend { &self.weekend } else { &self.weekday }
    }
}

impl Default for PlayerProfile {
    fn default() -> Self {
        Self {
            efficiency: PhaseEfficiency::default(),
            weekday: Self::default_weekday(),
            weekend: Self::default_weekend(),
            upgrade_strategy: UpgradeStrategy::default(),
            adventure_preference: Self::default_adventure_preference(),
            risk_tolerance: Self::default_risk_tolerance(),
        }
    }
}
