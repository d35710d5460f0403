//! Bounded-parallel Monte Carlo runner over seeded catalog/profile variants.
//!
//! Every run is isolated: it gets its own deep-copied variant and its own
//! `Simulation`, executes on the blocking pool, and reports back a
//! [`RunRecord`]. Only completed runs feed the aggregate statistics.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use timehero_sim::{
    FixedClock, GameConfiguration, HelperKind, Phase, PlayerProfile, RunResult, RunStatus,
    SimError, Simulation, SimulationSettings, Variant, VarianceConfig, VarianceError,
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

use super::seeds::DEFAULT_SEED;
use super::stats::{ConfidenceInterval, Distribution, count_f64, z_for_confidence};

const MAX_DEFAULT_WORKERS: usize = 8;
const HIGH_VARIANCE_CV: f64 = 0.5;
const TARGET_SUCCESS_RATE: f64 = 0.9;
const COMMON_BOTTLENECK_SHARE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MonteCarloConfigError {
    #[error("runs must be at least 1")]
    NoRuns,
    #[error("max_workers must be at least 1")]
    NoWorkers,
    #[error("simulation.max_days must be at least 1")]
    NoDays,
    #[error("simulation.timeout_per_run_secs must be positive (got {0})")]
    Timeout(f64),
    #[error("confidence_level must be strictly between 0 and 1 (got {0})")]
    ConfidenceLevel(f64),
    #[error(transparent)]
    Variance(#[from] VarianceError),
}

/// Per-run limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SimulationLimits {
    #[serde(default = "SimulationLimits::default_max_days")]
    pub max_days: u32,
    #[serde(default = "SimulationLimits::default_timeout_per_run_secs")]
    pub timeout_per_run_secs: f64,
}

impl SimulationLimits {
    const fn default_max_days() -> u32 {
        28
    }

    const fn default_timeout_per_run_secs() -> f64 {
        300.0
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_per_run_secs).unwrap_or(Duration::MAX)
    }
}

impl Default for SimulationLimits {
    fn default() -> Self {
        Self {
            max_days: Self::default_max_days(),
            timeout_per_run_secs: Self::default_timeout_per_run_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MonteCarloConfig {
    #[serde(default = "MonteCarloConfig::default_runs")]
    pub runs: usize,
    #[serde(default = "MonteCarloConfig::default_max_workers")]
    pub max_workers: usize,
    /// Run `i` plays seed `base_seed + i`.
    #[serde(default = "MonteCarloConfig::default_base_seed")]
    pub base_seed: u64,
    #[serde(default)]
    pub variance: VarianceConfig,
    #[serde(default)]
    pub simulation: SimulationLimits,
    #[serde(default = "MonteCarloConfig::default_confidence_level")]
    pub confidence_level: f64,
}

impl MonteCarloConfig {
    const fn default_runs() -> usize {
        100
    }

    fn default_max_workers() -> usize {
        std::thread::available_parallelism()
            .map_or(1, NonZeroUsize::get)
            .min(MAX_DEFAULT_WORKERS)
    }

    const fn default_base_seed() -> u64 {
        DEFAULT_SEED
    }

    const fn default_confidence_level() -> f64 {
        0.95
    }

    /// # Errors
    ///
    /// Returns the first field that is out of range.
    pub fn validate(&self) -> Result<(), MonteCarloConfigError> {
        if self.runs == 0 {
            return Err(MonteCarloConfigError::NoRuns);
        }
        if self.max_workers == 0 {
            return Err(MonteCarloConfigError::NoWorkers);
        }
        if self.simulation.max_days == 0 {
            return Err(MonteCarloConfigError::NoDays);
        }
        let timeout = self.simulation.timeout_per_run_secs;
        if !(timeout.is_finite() && timeout > 0.0) {
            return Err(MonteCarloConfigError::Timeout(timeout));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(MonteCarloConfigError::ConfidenceLevel(self.confidence_level));
        }
        self.variance.validate()?;
        Ok(())
    }

    #[must_use]
    pub fn seed_for(&self, index: usize) -> u64 {
        u64::try_from(index).map_or(self.base_seed, |offset| self.base_seed.wrapping_add(offset))
    }
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            runs: Self::default_runs(),
            max_workers: Self::default_max_workers(),
            base_seed: Self::default_base_seed(),
            variance: VarianceConfig::default(),
            simulation: SimulationLimits::default(),
            confidence_level: Self::default_confidence_level(),
        }
    }
}

/// How one run ended, from the orchestrator's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Failed { reason: String },
    TimedOut,
    Stopped,
}

impl RunOutcome {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
            Self::TimedOut => "timed_out",
            Self::Stopped => "stopped",
        }
    }

    fn from_status(status: &RunStatus) -> Self {
        match status {
            RunStatus::Completed => Self::Completed,
            RunStatus::Failed { reason } => Self::Failed {
                reason: reason.clone(),
            },
            RunStatus::Running | RunStatus::Stopped => Self::Stopped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub index: usize,
    pub seed: u64,
    #[serde(flatten)]
    pub outcome: RunOutcome,
    pub duration_ms: u64,
    /// SHA-256 over the variant catalog and profile actually played.
    pub variant_digest: Option<String>,
    pub metrics: BTreeMap<String, f64>,
    pub bottlenecks: Vec<String>,
}

impl RunRecord {
    fn skipped(index: usize, seed: u64) -> Self {
        Self {
            index,
            seed,
            outcome: RunOutcome::Stopped,
            duration_ms: 0,
            variant_digest: None,
            metrics: BTreeMap::new(),
            bottlenecks: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

/// Shared stop flag; runs halt at their next tick boundary once raised.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub total_runs: usize,
    pub completed_runs: usize,
    pub failed_runs: usize,
    pub timed_out_runs: usize,
    pub stopped_runs: usize,
    pub base_seed: u64,
    pub max_days: u32,
    pub catalog_fingerprint: u64,
    pub confidence_level: f64,
    pub wall_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub distribution: Distribution,
    pub confidence_interval: ConfidenceInterval,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub success_rate: f64,
    pub average_run_ms: f64,
    pub bottleneck_counts: BTreeMap<String, usize>,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloAnalysis {
    pub metadata: AnalysisMetadata,
    pub metrics: BTreeMap<String, MetricSummary>,
    pub runs: Vec<RunRecord>,
    pub summary: AnalysisSummary,
}

impl MonteCarloAnalysis {
    /// Aggregate finished records. Only completed runs contribute samples.
    #[must_use]
    pub fn from_records(
        config: &MonteCarloConfig,
        catalog_fingerprint: u64,
        mut runs: Vec<RunRecord>,
        wall_time: Duration,
    ) -> Self {
        runs.sort_by_key(|r| r.index);
        let count = |pred: fn(&RunOutcome) -> bool| runs.iter().filter(|r| pred(&r.outcome)).count();
        let completed_runs = count(|o| matches!(o, RunOutcome::Completed));
        let failed_runs = count(|o| matches!(o, RunOutcome::Failed { .. }));
        let timed_out_runs = count(|o| matches!(o, RunOutcome::TimedOut));
        let stopped_runs = count(|o| matches!(o, RunOutcome::Stopped));
        let metadata = AnalysisMetadata {
            total_runs: config.runs.max(runs.len()),
            completed_runs,
            failed_runs,
            timed_out_runs,
            stopped_runs,
            base_seed: config.base_seed,
            max_days: config.simulation.max_days,
            catalog_fingerprint,
            confidence_level: config.confidence_level,
            wall_time_ms: millis(wall_time),
        };

        let mut samples: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut bottleneck_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut run_ms = Vec::new();
        for run in runs.iter().filter(|r| r.is_completed()) {
            for (name, value) in &run.metrics {
                samples.entry(name.clone()).or_default().push(*value);
            }
            for kind in &run.bottlenecks {
                *bottleneck_counts.entry(kind.clone()).or_default() += 1;
            }
            run_ms.push(run.duration_ms);
        }

        let z = z_for_confidence(config.confidence_level);
        let metrics: BTreeMap<String, MetricSummary> = samples
            .into_iter()
            .filter_map(|(name, values)| {
                Distribution::from_samples(&values).map(|distribution| {
                    let confidence_interval = distribution.confidence_interval(z);
                    (
                        name,
                        MetricSummary {
                            distribution,
                            confidence_interval,
                        },
                    )
                })
            })
            .collect();

        let summary = summarize(&metadata, &metrics, bottleneck_counts, &run_ms);
        Self {
            metadata,
            metrics,
            runs,
            summary,
        }
    }
}

fn summarize(
    metadata: &AnalysisMetadata,
    metrics: &BTreeMap<String, MetricSummary>,
    bottleneck_counts: BTreeMap<String, usize>,
    run_ms: &[u64],
) -> AnalysisSummary {
    let success_rate = if metadata.total_runs == 0 {
        0.0
    } else {
        count_f64(metadata.completed_runs) / count_f64(metadata.total_runs)
    };
    let average_run_ms = if run_ms.is_empty() {
        0.0
    } else {
        run_ms.iter().copied().map(ms_f64).sum::<f64>() / count_f64(run_ms.len())
    };

    let mut insights = Vec::new();
    if metadata.completed_runs < metadata.total_runs {
        insights.push(format!(
            "{} of {} runs did not complete ({} failed, {} timed out, {} stopped)",
            metadata.total_runs - metadata.completed_runs,
            metadata.total_runs,
            metadata.failed_runs,
            metadata.timed_out_runs,
            metadata.stopped_runs
        ));
    }
    for (name, summary) in metrics {
        let cv = summary.distribution.coefficient_of_variation();
        if cv > HIGH_VARIANCE_CV {
            insights.push(format!(
                "High variance in {name}: coefficient of variation {cv:.2}"
            ));
        }
    }

    let mut recommendations = Vec::new();
    if metadata.timed_out_runs > 0 {
        recommendations.push(format!(
            "{} runs hit the per-run timeout; raise timeout_per_run_secs or lower max_days",
            metadata.timed_out_runs
        ));
    }
    if metadata.failed_runs > 0 && success_rate < TARGET_SUCCESS_RATE {
        recommendations.push(
            "Inspect failed runs; fatal errors usually mean the catalog references missing entries"
                .to_string(),
        );
    }
    if metadata.completed_runs > 0 {
        for (kind, hits) in &bottleneck_counts {
            let share = count_f64(*hits) / count_f64(metadata.completed_runs);
            if share > COMMON_BOTTLENECK_SHARE {
                recommendations.push(format!(
                    "{kind} bottleneck appears in {:.0}% of completed runs",
                    share * 100.0
                ));
            }
        }
        if !metrics.contains_key(&phase_metric(Phase::Endgame)) {
            recommendations.push(format!(
                "No completed run reached the endgame within {} days",
                metadata.max_days
            ));
        }
    }

    AnalysisSummary {
        success_rate,
        average_run_ms,
        bottleneck_counts,
        insights,
        recommendations,
    }
}

fn phase_metric(phase: Phase) -> String {
    format!("phase_day.{}", phase.as_str())
}

#[allow(clippy::cast_precision_loss)]
const fn ms_f64(ms: u64) -> f64 {
    ms as f64
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Metrics tracked per completed run, keyed by stable names.
#[must_use]
pub fn run_metrics(result: &RunResult) -> BTreeMap<String, f64> {
    let mut metrics = BTreeMap::new();
    for phase in Phase::ALL.into_iter().skip(1) {
        if let Some(day) = result.phase_entry_day(phase) {
            metrics.insert(phase_metric(phase), f64::from(day));
        }
    }
    for (name, amount) in result.final_resources() {
        metrics.insert(format!("resources.{name}"), amount);
    }
    for kind in HelperKind::ALL {
        if let Some(day) = result.helper_discovery_day(kind) {
            metrics.insert(format!("helper_day.{}", kind.as_str()), f64::from(day));
        }
    }
    let state = result.final_state();
    metrics.insert("helpers.found".to_string(), count_f64(state.helpers.len()));
    metrics.insert("upgrades.owned".to_string(), count_f64(state.upgrades.len()));
    metrics.insert(
        "energy.wasted".to_string(),
        state.resources.flows().energy_wasted,
    );
    metrics
}

/// Hex SHA-256 of a variant's catalog, profile and seed.
#[must_use]
pub fn variant_digest(variant: &Variant) -> String {
    let mut hasher = Sha256::new();
    if let Ok(json) = serde_json::to_vec(&variant.catalog) {
        hasher.update(json);
    }
    if let Ok(json) = serde_json::to_vec(&variant.profile) {
        hasher.update(json);
    }
    hasher.update(variant.seed.to_le_bytes());
    hasher
        .finalize()
        .iter()
        .fold(String::with_capacity(64), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
}

#[derive(Debug, Clone)]
struct RunJob {
    index: usize,
    seed: u64,
    catalog: Arc<GameConfiguration>,
    profile: Arc<PlayerProfile>,
    variance: Arc<VarianceConfig>,
    settings: SimulationSettings,
    session_clock: Option<FixedClock>,
}

fn simulate(
    job: &RunJob,
    stop: &StopHandle,
    abandon: &AtomicBool,
) -> (String, Result<RunResult, SimError>) {
    let variant = Variant::generate(&job.catalog, &job.profile, &job.variance, job.seed);
    let digest = variant_digest(&variant);
    let mut sim = Simulation::new(
        Arc::new(variant.catalog),
        variant.profile,
        job.settings.clone(),
        job.seed,
    );
    if let Some(clock) = job.session_clock {
        sim = sim.with_session_clock(clock);
    }
    sim.run_until(|_| stop.is_stopped() || abandon.load(Ordering::Relaxed));
    (digest, sim.finish())
}

/// The permit travels with the blocking run so an abandoned run keeps its
/// worker slot until its thread actually exits.
async fn execute(
    job: RunJob,
    timeout: Duration,
    stop: StopHandle,
    permit: OwnedSemaphorePermit,
) -> RunRecord {
    let (index, seed) = (job.index, job.seed);
    let abandon = Arc::new(AtomicBool::new(false));
    let worker_abandon = Arc::clone(&abandon);
    let started = Instant::now();
    log::debug!("run {index} (seed {seed}) starting");
    let handle = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        simulate(&job, &stop, &worker_abandon)
    });

    let mut record = RunRecord::skipped(index, seed);
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok((digest, Ok(result)))) => {
            record.outcome = RunOutcome::from_status(result.status());
            record.metrics = run_metrics(&result);
            record.bottlenecks = result
                .bottlenecks()
                .iter()
                .map(|b| b.kind.as_str().to_string())
                .collect();
            record.variant_digest = Some(digest);
        }
        Ok(Ok((digest, Err(err)))) => {
            record.outcome = RunOutcome::Failed {
                reason: err.to_string(),
            };
            record.variant_digest = Some(digest);
        }
        Ok(Err(join_err)) => {
            record.outcome = RunOutcome::Failed {
                reason: format!("run panicked: {join_err}"),
            };
        }
        Err(_) => {
            abandon.store(true, Ordering::Relaxed);
            log::info!("run {index} (seed {seed}) exceeded {timeout:?} and was abandoned");
            record.outcome = RunOutcome::TimedOut;
        }
    }
    record.duration_ms = millis(started.elapsed());
    log::debug!(
        "run {index} (seed {seed}) {} in {} ms",
        record.outcome.label(),
        record.duration_ms
    );
    record
}

/// Fans runs out over a bounded worker pool.
#[derive(Debug, Clone)]
pub struct MonteCarloRunner {
    catalog: Arc<GameConfiguration>,
    profile: Arc<PlayerProfile>,
    config: MonteCarloConfig,
    session_clock: Option<FixedClock>,
    stop: StopHandle,
}

impl MonteCarloRunner {
    #[must_use]
    pub fn new(
        catalog: Arc<GameConfiguration>,
        profile: PlayerProfile,
        config: MonteCarloConfig,
    ) -> Self {
        Self {
            catalog,
            profile: Arc::new(profile),
            config,
            session_clock: None,
            stop: StopHandle::default(),
        }
    }

    /// Pin session triggers to a fixed wall time for every run.
    #[must_use]
    pub fn with_session_clock(mut self, clock: FixedClock) -> Self {
        self.session_clock = Some(clock);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &MonteCarloConfig {
        &self.config
    }

    /// Handle that halts in-flight runs and skips the rest.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    fn job(&self, index: usize) -> RunJob {
        RunJob {
            index,
            seed: self.config.seed_for(index),
            catalog: Arc::clone(&self.catalog),
            profile: Arc::clone(&self.profile),
            variance: Arc::new(self.config.variance.clone()),
            settings: SimulationSettings::default().with_max_days(self.config.simulation.max_days),
            session_clock: self.session_clock,
        }
    }

    /// Execute every run and aggregate whatever completed.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration or if the worker pool closes.
    pub async fn run(&self) -> Result<MonteCarloAnalysis> {
        self.config
            .validate()
            .context("invalid Monte Carlo configuration")?;
        let started = Instant::now();
        let timeout = self.config.simulation.timeout();
        log::info!(
            "Monte Carlo: {} runs from seed {} on {} workers",
            self.config.runs,
            self.config.base_seed,
            self.config.max_workers
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let mut tasks = JoinSet::new();
        let mut records = Vec::with_capacity(self.config.runs);
        for index in 0..self.config.runs {
            if self.stop.is_stopped() {
                records.push(RunRecord::skipped(index, self.config.seed_for(index)));
                continue;
            }
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .context("worker pool closed")?;
            let job = self.job(index);
            let stop = self.stop.clone();
            tasks.spawn(execute(job, timeout, stop, permit));
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(record) => records.push(record),
                Err(err) => log::warn!("Monte Carlo task ended abnormally: {err}"),
            }
        }
        if self.stop.is_stopped() {
            log::info!("Monte Carlo stopped on request");
        }

        let analysis = MonteCarloAnalysis::from_records(
            &self.config,
            self.catalog.fingerprint(),
            records,
            started.elapsed(),
        );
        log::info!(
            "Monte Carlo finished: {}/{} runs completed in {} ms",
            analysis.metadata.completed_runs,
            analysis.metadata.total_runs,
            analysis.metadata.wall_time_ms
        );
        Ok(analysis)
    }
}
