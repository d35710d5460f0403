//! Time Hero economy simulator
//!
//! Minute-resolution simulation of the Time Hero farm economy: a tick engine
//! over crops, energy, hero actions, helpers and upgrades, driven by a
//! simulated player, plus the analysis and variant generation used for
//! balance validation. Platform-agnostic and free of I/O beyond optional
//! JSON loading.

pub mod actions;
pub mod analyzer;
pub mod catalog;
pub mod clock;
pub(crate) mod constants;
pub mod engine;
pub mod events;
pub mod farm;
pub mod helpers;
pub mod ledger;
pub mod numbers;
pub mod phase;
pub mod policy;
pub mod prerequisites;
pub mod profile;
pub mod result;
pub mod rng;
pub mod state;
pub mod upgrades;
pub mod variance;

use std::path::PathBuf;
use std::sync::Arc;

// Re-export commonly used types
pub use actions::{ActionKind, ActionOutcome, ActionRejection, ActionSource, HeroState, Location};
pub use analyzer::{
    Bottleneck, BottleneckKind, PhaseTiming, ScreenTimeShare, Severity, SimulationReport,
    TimingStatus, detect_bottlenecks, generate_report,
};
pub use catalog::{
    Adventure, BalanceTable, CatalogError, Crop, CropTier, DurationTier, GameConfiguration,
    MiningTable, UpgradeCategory, UpgradeCost, UpgradeDef,
};
pub use clock::{FixedClock, GameClock, SessionClock, WallClock, WallTime};
pub use engine::{RunStatus, SettingsError, SimError, Simulation, SimulationSettings, TickOutcome};
pub use events::{Event, EventCategory, EventLog, EventSeverity};
pub use farm::{Farm, FarmStage, Plot};
pub use helpers::{Helper, HelperAbility, HelperKind, discovery_chance};
pub use ledger::{Pool, ResourceFlows, ResourceKind, Resources};
pub use phase::{Phase, PhaseTransition};
pub use prerequisites::{
    DependencyGraph, Holdings, HoldingsSnapshot, PrerequisiteKind, PrerequisiteSet,
    PrerequisiteStatus, UpgradeStatus, check_prerequisites, upgrade_status,
};
pub use profile::{PhaseEfficiency, PlayerProfile, ProfileError, SessionWindow, UpgradeStrategy};
pub use result::RunResult;
pub use rng::{RngBundle, derive_stream_seed};
pub use state::{GameState, Metrics, StateSnapshot};
pub use upgrades::{PurchaseRejection, UpgradeEffect};
pub use variance::{Variant, VarianceConfig, VarianceError, variant_catalog, variant_profile};

/// Where catalogs and player profiles come from.
pub trait CatalogLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load and validate the game catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read or fails validation.
    fn load_catalog(&self) -> Result<GameConfiguration, Self::Error>;

    /// Load the player profile; the stock profile unless overridden.
    ///
    /// # Errors
    ///
    /// Returns an error if a profile source exists but cannot be read.
    fn load_profile(&self) -> Result<PlayerProfile, Self::Error> {
        Ok(PlayerProfile::default())
    }
}

/// Serves the catalog compiled into the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinLoader;

impl CatalogLoader for BuiltinLoader {
    type Error = CatalogError;

    fn load_catalog(&self) -> Result<GameConfiguration, Self::Error> {
        GameConfiguration::builtin()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FileLoaderError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
}

/// Reads JSON files, falling back to built-ins for anything not given.
#[derive(Debug, Clone, Default)]
pub struct FileLoader {
    pub catalog: Option<PathBuf>,
    pub profile: Option<PathBuf>,
}

impl FileLoader {
    fn read(path: &PathBuf) -> Result<String, FileLoaderError> {
        std::fs::read_to_string(path).map_err(|source| FileLoaderError::Io {
            path: path.clone(),
            source,
        })
    }
}

impl CatalogLoader for FileLoader {
    type Error = FileLoaderError;

    fn load_catalog(&self) -> Result<GameConfiguration, Self::Error> {
        match &self.catalog {
            Some(path) => Ok(GameConfiguration::from_json(&Self::read(path)?)?),
            None => Ok(GameConfiguration::builtin()?),
        }
    }

    fn load_profile(&self) -> Result<PlayerProfile, Self::Error> {
        match &self.profile {
            Some(path) => Ok(PlayerProfile::from_json(&Self::read(path)?)?),
            None => Ok(PlayerProfile::default()),
        }
    }
}

/// Builds simulations from a catalog source.
pub struct GameEngine<L: CatalogLoader> {
    loader: L,
}

impl<L: CatalogLoader> GameEngine<L> {
    pub const fn new(loader: L) -> Self {
        Self { loader }
    }

    /// Load the catalog once for sharing across many runs.
    ///
    /// # Errors
    ///
    /// Returns the loader's error if the catalog cannot be loaded.
    pub fn shared_catalog(&self) -> Result<Arc<GameConfiguration>, L::Error> {
        self.loader.load_catalog().map(Arc::new)
    }

    /// # Errors
    ///
    /// Returns the loader's error if the profile cannot be loaded.
    pub fn profile(&self) -> Result<PlayerProfile, L::Error> {
        self.loader.load_profile()
    }

    /// Create a simulation with the loader's catalog and profile.
    ///
    /// # Errors
    ///
    /// Returns the loader's error if either source cannot be loaded.
    pub fn create_simulation(
        &self,
        seed: u64,
        settings: SimulationSettings,
    ) -> Result<Simulation, L::Error> {
        let catalog = self.shared_catalog()?;
        let profile = self.profile()?;
        Ok(Simulation::new(catalog, profile, settings, seed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    struct TinyLoader;

    impl CatalogLoader for TinyLoader {
        type Error = Infallible;

        fn load_catalog(&self) -> Result<GameConfiguration, Self::Error> {
            let mut catalog = GameConfiguration::builtin().unwrap();
            catalog.crops.truncate(1);
            Ok(catalog)
        }
    }

    #[test]
    fn engine_builds_simulations_from_its_loader() {
        let engine = GameEngine::new(TinyLoader);
        let sim = engine
            .create_simulation(1, SimulationSettings::default())
            .unwrap();
        assert_eq!(sim.catalog().crops.len(), 1);
        assert_eq!(sim.seed(), 1);
        assert_eq!(*sim.profile(), PlayerProfile::default());
    }

    #[test]
    fn file_loader_defaults_to_builtins() {
        let engine = GameEngine::new(FileLoader::default());
        let catalog = engine.shared_catalog().unwrap();
        assert_eq!(
            catalog.fingerprint(),
            GameConfiguration::builtin().unwrap().fingerprint()
        );
    }

    #[test]
    fn file_loader_reports_missing_files() {
        let loader = FileLoader {
            catalog: Some(PathBuf::from("/definitely/not/here.json")),
            profile: None,
        };
        assert!(matches!(
            loader.load_catalog(),
            Err(FileLoaderError::Io { .. })
        ));
    }
}
