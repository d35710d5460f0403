//! Farm plots: the empty → growing → ready → empty state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::actions::ActionSource;
use crate::catalog::{Crop, GameConfiguration};
use crate::constants::MAX_GROWTH_STAGE;
use crate::engine::SimError;
use crate::events::{EventCategory, EventSeverity};
use crate::ledger::ResourceKind;
use crate::numbers::{floor_f64_to_u64, u64_to_f64};
use crate::state::GameState;

/// Farm development stage, referenced by prerequisite expressions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FarmStage {
    #[default]
    Starter,
    Homestead,
    ManorGrounds,
    GreatEstate,
}

impl FarmStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Homestead => "homestead",
            Self::ManorGrounds => "manor_grounds",
            Self::GreatEstate => "great_estate",
        }
    }

    /// Parse one of the stage tokens usable in prerequisites. `starter` is
    /// implicit and never appears there.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "homestead" => Some(Self::Homestead),
            "manor_grounds" => Some(Self::ManorGrounds),
            "great_estate" => Some(Self::GreatEstate),
            _ => None,
        }
    }
}

impl fmt::Display for FarmStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One farm plot. Fields are private so an empty plot always has stage 0
/// and no planting tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plot {
    id: u32,
    crop: Option<String>,
    growth_stage: u8,
    watered: bool,
    planted_at: Option<u64>,
}

impl Plot {
    #[must_use]
    pub const fn empty(id: u32) -> Self {
        Self {
            id,
            crop: None,
            growth_stage: 0,
            watered: false,
            planted_at: None,
        }
    }

    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn crop(&self) -> Option<&str> {
        self.crop.as_deref()
    }

    #[must_use]
    pub const fn growth_stage(&self) -> u8 {
        self.growth_stage
    }

    #[must_use]
    pub const fn watered(&self) -> bool {
        self.watered
    }

    #[must_use]
    pub const fn planted_at(&self) -> Option<u64> {
        self.planted_at
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.crop.is_none()
    }

    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.crop.is_some() && self.growth_stage >= MAX_GROWTH_STAGE
    }

    #[must_use]
    pub const fn is_growing(&self) -> bool {
        self.crop.is_some() && self.growth_stage < MAX_GROWTH_STAGE
    }

    /// `crop == None` exactly when stage is 0 and no planting tick is set.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        match self.crop {
            None => self.growth_stage == 0 && self.planted_at.is_none() && !self.watered,
            Some(_) => self.planted_at.is_some() && self.growth_stage <= MAX_GROWTH_STAGE,
        }
    }

    fn clear(&mut self) {
        *self = Self::empty(self.id);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlantRejection {
    #[error("plot {0} does not exist")]
    UnknownPlot(u32),
    #[error("plot {0} is already occupied")]
    Occupied(u32),
    #[error("crop `{0}` is not in the catalog")]
    UnknownCrop(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarvestRejection {
    #[error("plot {0} does not exist")]
    UnknownPlot(u32),
    #[error("plot {0} has nothing planted")]
    Empty(u32),
    #[error("plot {plot} is not ready (stage {stage})")]
    NotReady { plot: u32, stage: u8 },
}

/// Result of a successful harvest.
#[derive(Debug, Clone, PartialEq)]
pub struct Harvest {
    pub plot: u32,
    pub crop: String,
    pub energy: f64,
}

/// Per-tick growth summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrowthReport {
    /// Plots that reached maturity this tick.
    pub matured: Vec<(u32, String)>,
    /// Energy trickled by mature plots this tick.
    pub trickle: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Farm {
    plots: Vec<Plot>,
    stage: FarmStage,
}

impl Farm {
    /// A starter farm with `count` empty plots numbered from 1.
    #[must_use]
    pub fn new(count: u32) -> Self {
        Self {
            plots: (1..=count).map(Plot::empty).collect(),
            stage: FarmStage::Starter,
        }
    }

    #[must_use]
    pub fn plots(&self) -> &[Plot] {
        &self.plots
    }

    #[must_use]
    pub fn plot(&self, id: u32) -> Option<&Plot> {
        self.plots.iter().find(|plot| plot.id == id)
    }

    #[must_use]
    pub const fn stage(&self) -> FarmStage {
        self.stage
    }

    /// Advance the farm stage; stages never regress.
    pub fn reach_stage(&mut self, stage: FarmStage) {
        self.stage = self.stage.max(stage);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plots.is_empty()
    }

    /// Plots that currently hold a crop, growing or ready.
    #[must_use]
    pub fn active_count(&self) -> u32 {
        crate::numbers::usize_to_u32(self.plots.iter().filter(|p| !p.is_empty()).count())
    }

    #[must_use]
    pub fn has_planted(&self) -> bool {
        self.plots.iter().any(|p| !p.is_empty())
    }

    #[must_use]
    pub fn empty_plot_ids(&self) -> Vec<u32> {
        self.plots
            .iter()
            .filter(|p| p.is_empty())
            .map(Plot::id)
            .collect()
    }

    #[must_use]
    pub fn ready_plot_ids(&self) -> Vec<u32> {
        self.plots
            .iter()
            .filter(|p| p.is_ready())
            .map(Plot::id)
            .collect()
    }

    /// Grow the farm to at least `count` plots. Returns how many were added.
    pub fn expand_to(&mut self, count: u32) -> u32 {
        let current = crate::numbers::usize_to_u32(self.plots.len());
        for id in current + 1..=count {
            self.plots.push(Plot::empty(id));
        }
        count.saturating_sub(current)
    }

    /// Plant `crop` on an empty plot at `tick`.
    ///
    /// # Errors
    ///
    /// Rejects unknown or occupied plots.
    pub fn plant(&mut self, plot_id: u32, crop: &Crop, tick: u64) -> Result<(), PlantRejection> {
        let plot = self
            .plots
            .iter_mut()
            .find(|plot| plot.id == plot_id)
            .ok_or(PlantRejection::UnknownPlot(plot_id))?;
        if !plot.is_empty() {
            return Err(PlantRejection::Occupied(plot_id));
        }
        plot.crop = Some(crop.id.clone());
        plot.growth_stage = 0;
        plot.watered = false;
        plot.planted_at = Some(tick);
        Ok(())
    }

    /// Clear a ready plot and report the energy it yields.
    ///
    /// # Errors
    ///
    /// Returns `Ok(Err(..))` for rejected harvests and `Err` when the plot
    /// holds a crop the catalog does not know.
    pub fn harvest(
        &mut self,
        plot_id: u32,
        catalog: &GameConfiguration,
    ) -> Result<Result<Harvest, HarvestRejection>, SimError> {
        let Some(plot) = self.plots.iter_mut().find(|plot| plot.id == plot_id) else {
            return Ok(Err(HarvestRejection::UnknownPlot(plot_id)));
        };
        let Some(crop_id) = plot.crop.clone() else {
            return Ok(Err(HarvestRejection::Empty(plot_id)));
        };
        if plot.growth_stage < MAX_GROWTH_STAGE {
            return Ok(Err(HarvestRejection::NotReady {
                plot: plot_id,
                stage: plot.growth_stage,
            }));
        }
        let crop = catalog
            .crop(&crop_id)
            .ok_or_else(|| SimError::MissingCrop {
                plot: plot_id,
                crop: crop_id.clone(),
            })?;
        plot.clear();
        Ok(Ok(Harvest {
            plot: plot_id,
            crop: crop_id,
            energy: crop.energy,
        }))
    }

    /// Recompute every planted plot's stage from elapsed time and total the
    /// trickle from mature plots.
    ///
    /// # Errors
    ///
    /// Returns `SimError::MissingCrop` if a plot references an unknown crop.
    pub fn advance_growth(
        &mut self,
        tick: u64,
        catalog: &GameConfiguration,
    ) -> Result<GrowthReport, SimError> {
        let mut report = GrowthReport::default();
        for plot in &mut self.plots {
            let (Some(crop_id), Some(planted_at)) = (plot.crop.as_deref(), plot.planted_at) else {
                continue;
            };
            let crop = catalog.crop(crop_id).ok_or_else(|| SimError::MissingCrop {
                plot: plot.id,
                crop: crop_id.to_string(),
            })?;
            let elapsed = u64_to_f64(tick.saturating_sub(planted_at));
            let progress = elapsed / crop.growth_time;
            let stage = floor_f64_to_u64(progress * f64::from(MAX_GROWTH_STAGE))
                .min(u64::from(MAX_GROWTH_STAGE));
            let stage = u8::try_from(stage).unwrap_or(MAX_GROWTH_STAGE);
            if stage > plot.growth_stage {
                plot.growth_stage = stage;
                if stage == MAX_GROWTH_STAGE {
                    report.matured.push((plot.id, crop.name.clone()));
                }
            }
            if plot.growth_stage == MAX_GROWTH_STAGE {
                report.trickle += crop.energy_rate();
            }
        }
        Ok(report)
    }

    /// Mark every growing plot as watered.
    pub fn water_all(&mut self) {
        for plot in self.plots.iter_mut().filter(|p| !p.is_empty()) {
            plot.watered = true;
        }
    }
}

/// Plant through the game state: resolves the crop, records metrics, and
/// logs the outcome. Rejections append a warning and leave state unchanged.
///
/// # Errors
///
/// Returns the `PlantRejection` describing why nothing was planted.
pub fn plant_crop(
    state: &mut GameState,
    catalog: &GameConfiguration,
    plot_id: u32,
    crop_id: &str,
    source: ActionSource,
) -> Result<(), PlantRejection> {
    let outcome = catalog
        .crop(crop_id)
        .ok_or_else(|| PlantRejection::UnknownCrop(crop_id.to_string()))
        .and_then(|crop| {
            state
                .farm
                .plant(plot_id, crop, state.tick)
                .map(|()| crop.name.clone())
        });
    match outcome {
        Ok(name) => {
            state.metrics.counters.record_planting(source);
            state.log(
                EventCategory::Farm,
                EventSeverity::Info,
                format!("{source} planted {name} on plot {plot_id}"),
            );
            Ok(())
        }
        Err(rejection) => {
            state.reject(EventCategory::Farm, format!("Cannot plant: {rejection}"));
            Err(rejection)
        }
    }
}

/// Harvest through the game state, crediting the crop's energy.
///
/// # Errors
///
/// `Ok(Err(..))` is a logged rejection; `Err` is a fatal catalog mismatch.
pub fn harvest_crop(
    state: &mut GameState,
    catalog: &GameConfiguration,
    plot_id: u32,
    source: ActionSource,
) -> Result<Result<Harvest, HarvestRejection>, SimError> {
    match state.farm.harvest(plot_id, catalog)? {
        Ok(harvest) => {
            state
                .resources
                .add_resource(&ResourceKind::Energy, harvest.energy);
            state.metrics.counters.record_harvest(source);
            state.log(
                EventCategory::Farm,
                EventSeverity::Info,
                format!(
                    "{source} harvested {} on plot {} (+{:.1} energy)",
                    harvest.crop, harvest.plot, harvest.energy
                ),
            );
            Ok(Ok(harvest))
        }
        Err(rejection) => {
            state.reject(EventCategory::Farm, format!("Cannot harvest: {rejection}"));
            Ok(Err(rejection))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CropTier;

    fn carrot() -> Crop {
        Crop {
            id: "carrot".to_string(),
            name: "Carrot".to_string(),
            tier: CropTier::Early,
            energy: 10.0,
            growth_time: 60.0,
        }
    }

    fn catalog() -> GameConfiguration {
        GameConfiguration::builtin().unwrap()
    }

    #[test]
    fn growth_is_time_proportional() {
        let catalog = catalog();
        let mut farm = Farm::new(3);
        farm.plant(1, &carrot(), 100).unwrap();
        let report = farm.advance_growth(114, &catalog).unwrap();
        assert_eq!(farm.plot(1).unwrap().growth_stage(), 0);
        assert!(report.matured.is_empty());
        farm.advance_growth(130, &catalog).unwrap();
        assert_eq!(farm.plot(1).unwrap().growth_stage(), 2);
        let report = farm.advance_growth(160, &catalog).unwrap();
        assert_eq!(farm.plot(1).unwrap().growth_stage(), 4);
        assert_eq!(report.matured, vec![(1, "Carrot".to_string())]);
        assert!((report.trickle - 10.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn occupied_and_unknown_plots_reject() {
        let mut farm = Farm::new(2);
        farm.plant(1, &carrot(), 0).unwrap();
        assert_eq!(
            farm.plant(1, &carrot(), 1),
            Err(PlantRejection::Occupied(1))
        );
        assert_eq!(
            farm.plant(9, &carrot(), 1),
            Err(PlantRejection::UnknownPlot(9))
        );
    }

    #[test]
    fn harvest_requires_maturity_and_resets_plot() {
        let catalog = catalog();
        let mut farm = Farm::new(1);
        farm.plant(1, &carrot(), 0).unwrap();
        farm.advance_growth(30, &catalog).unwrap();
        assert_eq!(
            farm.harvest(1, &catalog).unwrap(),
            Err(HarvestRejection::NotReady { plot: 1, stage: 2 })
        );
        farm.advance_growth(60, &catalog).unwrap();
        let harvest = farm.harvest(1, &catalog).unwrap().unwrap();
        assert!((harvest.energy - 10.0).abs() < f64::EPSILON);
        let plot = farm.plot(1).unwrap();
        assert!(plot.is_empty());
        assert!(plot.is_consistent());
        assert_eq!(plot.planted_at(), None);
    }

    #[test]
    fn unknown_crop_on_plot_is_fatal() {
        let catalog = catalog();
        let mut farm = Farm::new(1);
        let ghost = Crop {
            id: "ghost".to_string(),
            ..carrot()
        };
        farm.plant(1, &ghost, 0).unwrap();
        assert!(matches!(
            farm.advance_growth(5, &catalog),
            Err(SimError::MissingCrop { plot: 1, .. })
        ));
    }

    #[test]
    fn expansion_numbers_plots_consecutively() {
        let mut farm = Farm::new(3);
        assert_eq!(farm.expand_to(5), 2);
        assert_eq!(farm.expand_to(4), 0);
        let ids: Vec<u32> = farm.plots().iter().map(Plot::id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn farm_stage_tokens_parse() {
        assert_eq!(FarmStage::from_token("manor_grounds"), Some(FarmStage::ManorGrounds));
        assert_eq!(FarmStage::from_token("starter"), None);
        let mut farm = Farm::new(1);
        farm.reach_stage(FarmStage::ManorGrounds);
        farm.reach_stage(FarmStage::Homestead);
        assert_eq!(farm.stage(), FarmStage::ManorGrounds);
    }
}
