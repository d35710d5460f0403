//! Centralized balance and tuning constants for the Time Hero economy.
//!
//! These values are the defaults behind [`crate::catalog::BalanceTable`].
//! Catalogs may override them, but the engine never reads a magic number
//! that is not listed here.

// Starting state ---------------------------------------------------------------
pub(crate) const START_DAY: u32 = 1;
pub(crate) const START_HOUR: u32 = 8;
pub(crate) const START_ENERGY_CAP: f64 = 50.0;
pub(crate) const START_WATER: f64 = 20.0;
pub(crate) const START_PLOTS: u32 = 3;
pub(crate) const START_CARRY_CAPACITY: u32 = 2;
pub(crate) const START_TOWER_FLOORS: u32 = 1;

// Clock ----------------------------------------------------------------------
pub(crate) const MINUTES_PER_HOUR: u32 = 60;
pub(crate) const HOURS_PER_DAY: u32 = 24;
pub(crate) const MINUTES_PER_DAY: u32 = MINUTES_PER_HOUR * HOURS_PER_DAY;

// Farm -----------------------------------------------------------------------
pub(crate) const MAX_GROWTH_STAGE: u8 = 4;

// Cadence (in simulated minutes) ----------------------------------------------
pub(crate) const DISCOVERY_CHECK_INTERVAL: u64 = 5;
pub(crate) const SESSION_CHECK_INTERVAL: u64 = 10;
pub(crate) const OVERFLOW_WARNING_INTERVAL: u64 = 10;

// Adventure drops ----------------------------------------------------------------
pub(crate) const RARE_DROP_CHANCE: f64 = 0.5;
pub(crate) const BOSS_DROP_CHANCE: f64 = 0.25;

// Mining ---------------------------------------------------------------------
pub(crate) const MINING_BASE_COST: f64 = 10.0;
pub(crate) const MINING_COST_EXPONENT: f64 = 1.5;
pub(crate) const MINING_GOLD_FACTOR: f64 = 50.0;
pub(crate) const MINING_GOLD_EXPONENT: f64 = 1.2;
pub(crate) const MINING_STONE_PER_DEPTH: f64 = 2.0;
pub(crate) const MINING_MAX_DEPTH: u32 = 50;
pub(crate) const COPPER_CHANCE: f64 = 0.3;
pub(crate) const COPPER_MIN_DEPTH: u32 = 5;
pub(crate) const IRON_CHANCE: f64 = 0.2;
pub(crate) const IRON_MIN_DEPTH: u32 = 10;
pub(crate) const PLAYER_MINING_DURATION: u32 = 30;
pub(crate) const HELPER_MINING_DURATION: u32 = 20;

// Phase thresholds (active plots, day) -------------------------------------------
pub(crate) const PHASE_PLOT_THRESHOLDS: [u32; 4] = [3, 10, 25, 50];
pub(crate) const PHASE_DAY_THRESHOLDS: [u32; 4] = [1, 3, 8, 15];

// Helper discovery, indexed by helpers already found (last entry repeats) ---------
pub(crate) const DISCOVERY_PLOT_THRESHOLDS: [u32; 3] = [15, 40, 70];
pub(crate) const DISCOVERY_PLOT_RATES: [f64; 3] = [0.02, 0.01, 0.005];
pub(crate) const DISCOVERY_DAY_THRESHOLDS: [u32; 3] = [3, 10, 20];
pub(crate) const DISCOVERY_DAY_RATES: [f64; 3] = [0.05, 0.02, 0.01];
pub(crate) const DISCOVERY_CAPS: [f64; 3] = [0.15, 0.08, 0.03];
pub(crate) const HELPER_BASE_EFFICIENCY: f64 = 0.8;
pub(crate) const HELPER_EFFICIENCY_STEP: f64 = 0.1;

// Helper automation gates ----------------------------------------------------------
pub(crate) const AUTO_PLANT_FACTOR: f64 = 0.3;
pub(crate) const AUTO_ADVENTURE_FACTOR: f64 = 0.1;
pub(crate) const AUTO_ADVENTURE_MIN_ENERGY: f64 = 200.0;
pub(crate) const AUTO_ADVENTURE_CHOICE_FACTOR: f64 = 0.8;
pub(crate) const AUTO_MINE_FACTOR: f64 = 0.05;
pub(crate) const AUTO_MINE_MIN_ENERGY: f64 = 300.0;
pub(crate) const AUTO_MINE_MAX_DEPTH: u32 = 3;

// Player session gates ---------------------------------------------------------------
pub(crate) const SESSION_HOUR_TOLERANCE: u32 = 1;
pub(crate) const PLANT_FACTOR: f64 = 0.8;
pub(crate) const ADVENTURE_FACTOR: f64 = 0.6;
pub(crate) const ADVENTURE_MIN_ENERGY: f64 = 50.0;
pub(crate) const MINE_FACTOR: f64 = 0.4;
pub(crate) const MINE_MIN_ENERGY: f64 = 100.0;
pub(crate) const PLAYER_MINE_MAX_DEPTH: u32 = 5;
pub(crate) const UPGRADE_CONSIDER_FACTOR: f64 = 0.3;

// Upgrade ranking ---------------------------------------------------------------
pub(crate) const UPGRADE_PURCHASE_FACTOR: f64 = 0.8;
pub(crate) const UPGRADE_BASE_PRIORITY: f64 = 100.0;
pub(crate) const UPGRADE_COST_WEIGHT: f64 = 5.0;
pub(crate) const UPGRADE_ERRAND_MINUTES: u64 = 5;

// Analyzer thresholds -------------------------------------------------------------
pub(crate) const WASTE_RATIO_LIMIT: f64 = 0.2;
pub(crate) const LOW_ENERGY_PERCENT: f64 = 10.0;
pub(crate) const SPARE_PLOT_RATIO: f64 = 0.8;
pub(crate) const FULL_PLOT_RATIO: f64 = 0.9;
pub(crate) const SPARE_GOLD: u64 = 1000;
pub(crate) const LOW_MATERIAL_AMOUNT: u64 = 5;
pub(crate) const LOW_MATERIAL_DAY: u32 = 7;
pub(crate) const LOW_MATERIAL_TYPES: usize = 2;
pub(crate) const HELPERLESS_PLOTS: usize = 15;
pub(crate) const HELPERLESS_DAY: u32 = 5;

// Engine defaults -----------------------------------------------------------------
pub(crate) const DEFAULT_MAX_DAYS: u32 = 35;
pub(crate) const DEFAULT_MAX_LOG_ENTRIES: usize = 10_000;
pub(crate) const DEFAULT_SNAPSHOT_INTERVAL: u32 = 60;
pub(crate) const DEFAULT_MAX_SNAPSHOTS: usize = 2_000;
