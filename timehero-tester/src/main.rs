mod logic;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use timehero_sim::{
    FileLoader, FixedClock, GameConfiguration, GameEngine, PlayerProfile, Simulation,
    SimulationReport, SimulationSettings, UpgradeStrategy, VarianceConfig, generate_report,
};

use logic::{
    Archetype, MonteCarloAnalysis, MonteCarloConfig, MonteCarloRunner, ScenarioResult,
    ScenarioRunner, archetypes, find_archetype, random_seeds, resolve_seed_inputs,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TestMode {
    /// One simulation per seed with a full analyzer report
    Single,
    /// Many perturbed runs aggregated into distributions
    MonteCarlo,
    /// Player archetypes checked against progression expectations
    Scenarios,
}

#[derive(Debug, Parser)]
#[command(name = "timehero-tester", version = "0.3.0")]
#[command(about = "Balance testing for the Time Hero economy: single runs, Monte Carlo sweeps and archetype scenarios")]
struct Args {
    #[arg(long, value_enum, default_value_t = TestMode::Single)]
    mode: TestMode,

    /// Archetypes to run in scenario mode (comma-separated, or "all")
    #[arg(long, default_value = "all")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Seeds to run (comma-separated; ranges like 1..10 or 1..=10)
    #[arg(long, default_value = DEFAULT_SEEDS_ARG)]
    seeds: String,

    /// Draw this many fresh seeds instead of using --seeds
    #[arg(long)]
    random_seeds: Option<usize>,

    /// Monte Carlo run count
    #[arg(long)]
    runs: Option<usize>,

    /// Concurrent Monte Carlo workers
    #[arg(long)]
    workers: Option<usize>,

    /// Days to simulate per run
    #[arg(long)]
    max_days: Option<u32>,

    /// Wall-clock limit per Monte Carlo run, in seconds
    #[arg(long)]
    timeout_secs: Option<f64>,

    /// Confidence level for Monte Carlo intervals
    #[arg(long)]
    confidence: Option<f64>,

    /// Monte Carlo configuration JSON; flags override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Play every Monte Carlo run against the unperturbed catalog and profile
    #[arg(long)]
    no_variance: bool,

    /// Game catalog JSON (defaults to the built-in catalog)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Player profile JSON (defaults to the stock profile)
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Override the profile's upgrade strategy
    #[arg(long)]
    #[arg(value_parser = ["balanced", "storage_focused", "production_focused"])]
    strategy: Option<String>,

    /// Pin the check-in wall-clock hour instead of reading the host clock
    #[arg(long)]
    session_hour: Option<u32>,

    /// Pin the session schedule to the weekend windows
    #[arg(long)]
    weekend: bool,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console", "csv"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

const DEFAULT_SESSION_HOUR: u32 = 18;
const DEFAULT_SEEDS_ARG: &str = "1337";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    announce_banner();

    let start_time = Instant::now();
    let seeds = resolve_seeds(&args)?;
    let loader = FileLoader {
        catalog: args.catalog.clone(),
        profile: args.profile.clone(),
    };
    let engine = GameEngine::new(loader);
    let catalog = engine.shared_catalog().context("failed to load game catalog")?;
    let profile = apply_strategy(
        engine.profile().context("failed to load player profile")?,
        args.strategy.as_deref(),
    )?;
    log::info!(
        "catalog {:016x}, {} seeds, mode {:?}",
        catalog.fingerprint(),
        seeds.len(),
        args.mode
    );

    match args.mode {
        TestMode::Single => {
            let reports = run_single(&args, &catalog, &profile, &seeds);
            write_single_reports(&args, &reports, start_time)?;
        }
        TestMode::MonteCarlo => {
            let analysis = run_monte_carlo(&args, catalog, profile, &seeds).await?;
            write_monte_carlo_report(&args, &analysis, start_time)?;
        }
        TestMode::Scenarios => {
            let selected = select_archetypes(&args.scenarios);
            let results = run_scenarios(&args, catalog, &profile, &selected, &seeds);
            write_reports(&args, &results, start_time)?;
        }
    }

    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for archetype in archetypes() {
        writeln!(
            output_target.writer(),
            "  {:20} - {} (efficiency {:.2}, {} days)",
            archetype.id,
            archetype.description,
            archetype.efficiency,
            archetype.expectations.max_days
        )?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "⏳ Time Hero Balance Tester".bright_cyan().bold());
    println!("{}", "===========================".cyan());
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn resolve_seeds(args: &Args) -> Result<Vec<u64>> {
    if let Some(count) = args.random_seeds {
        if count == 0 {
            bail!("--random-seeds must be at least 1");
        }
        let seeds = random_seeds(count, &mut ChaCha20Rng::from_entropy());
        println!("🎲 Drew {count} random seeds, first {}", seeds[0]);
        return Ok(seeds);
    }
    resolve_seed_inputs(&split_csv(&args.seeds))
}

fn apply_strategy(mut profile: PlayerProfile, strategy: Option<&str>) -> Result<PlayerProfile> {
    if let Some(name) = strategy {
        profile.upgrade_strategy = UpgradeStrategy::ALL
            .into_iter()
            .find(|s| s.as_str() == name)
            .with_context(|| format!("unknown upgrade strategy {name}"))?;
    }
    Ok(profile)
}

/// `None` leaves the host's local clock in charge of session triggers.
fn session_clock(args: &Args) -> Option<FixedClock> {
    (args.session_hour.is_some() || args.weekend).then(|| {
        FixedClock::new(
            args.session_hour.unwrap_or(DEFAULT_SESSION_HOUR),
            args.weekend,
        )
    })
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s == "all") {
        scenarios.retain(|s| s != "all");
        for archetype in archetypes() {
            if !scenarios.iter().any(|s| s == archetype.id) {
                scenarios.push(archetype.id.to_string());
            }
        }
    }
    scenarios
}

fn select_archetypes(scenarios_arg: &str) -> Vec<Archetype> {
    expand_scenarios(scenarios_arg)
        .into_iter()
        .filter_map(|id| {
            let found = find_archetype(&id);
            if found.is_none() {
                eprintln!("⚠️  Unknown scenario: {}", id.yellow());
            }
            found
        })
        .collect()
}

fn run_single(
    args: &Args,
    catalog: &Arc<GameConfiguration>,
    profile: &PlayerProfile,
    seeds: &[u64],
) -> Vec<SimulationReport> {
    println!("{}", "🌱 Running Simulations".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let mut settings = SimulationSettings::default();
    if let Some(days) = args.max_days {
        settings = settings.with_max_days(days);
    }

    let mut reports = Vec::with_capacity(seeds.len());
    for &seed in seeds {
        let started = Instant::now();
        let mut sim = Simulation::new(Arc::clone(catalog), profile.clone(), settings.clone(), seed);
        if let Some(clock) = session_clock(args) {
            sim = sim.with_session_clock(clock);
        }
        sim.run_to_completion();
        match sim.finish() {
            Ok(result) => {
                if args.verbose {
                    println!(
                        "✅ seed {seed}: {} after {:?}",
                        result.status(),
                        started.elapsed()
                    );
                }
                reports.push(generate_report(&result));
            }
            Err(err) => eprintln!("❌ seed {seed}: simulation failed: {err}"),
        }
    }
    reports
}

async fn run_monte_carlo(
    args: &Args,
    catalog: Arc<GameConfiguration>,
    profile: PlayerProfile,
    seeds: &[u64],
) -> Result<MonteCarloAnalysis> {
    println!("{}", "🎲 Running Monte Carlo".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let config = build_monte_carlo_config(args, seeds)?;
    let mut runner = MonteCarloRunner::new(catalog, profile, config);
    if let Some(clock) = session_clock(args) {
        runner = runner.with_session_clock(clock);
    }

    let stop = runner.stop_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("⏹  Interrupted; finishing in-flight runs");
            stop.stop();
        }
    });
    let analysis = runner.run().await;
    interrupt.abort();
    analysis
}

fn build_monte_carlo_config(args: &Args, seeds: &[u64]) -> Result<MonteCarloConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => MonteCarloConfig::default(),
    };
    if let Some(runs) = args.runs {
        config.runs = runs;
    }
    if let Some(workers) = args.workers {
        config.max_workers = workers;
    }
    if let Some(days) = args.max_days {
        config.simulation.max_days = days;
    }
    if let Some(timeout) = args.timeout_secs {
        config.simulation.timeout_per_run_secs = timeout;
    }
    if let Some(level) = args.confidence {
        config.confidence_level = level;
    }
    if args.no_variance {
        config.variance = VarianceConfig::none();
    }
    // A config file keeps its base seed unless seeds were given explicitly.
    let seeds_given = args.random_seeds.is_some() || args.seeds != DEFAULT_SEEDS_ARG;
    if (args.config.is_none() || seeds_given)
        && let Some(&first) = seeds.first()
    {
        config.base_seed = first;
    }
    config.validate()?;
    Ok(config)
}

fn run_scenarios(
    args: &Args,
    catalog: Arc<GameConfiguration>,
    profile: &PlayerProfile,
    selected: &[Archetype],
    seeds: &[u64],
) -> Vec<ScenarioResult> {
    println!("{}", "🧪 Running Scenarios".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    ScenarioRunner::new(catalog, profile.clone(), args.verbose)
        .with_session_clock(session_clock(args))
        .run_all(selected, seeds)
}

fn write_single_reports(
    args: &Args,
    reports: &[SimulationReport],
    start_time: Instant,
) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;
    match args.report.as_str() {
        "json" => logic::reports::generate_simulation_json(&mut output_target, reports)?,
        "markdown" => {
            for report in reports {
                logic::reports::generate_simulation_markdown(&mut output_target, report)?;
            }
        }
        "csv" => logic::reports::generate_simulation_csv(&mut output_target, reports)?,
        _ => {
            if reports.is_empty() {
                writeln!(&mut output_target, "No simulations completed.")?;
            }
            for report in reports {
                logic::reports::generate_simulation_console(&mut output_target, report)?;
            }
            write_total_time(&mut output_target, start_time)?;
        }
    }
    output_target.flush_inner()?;
    Ok(())
}

fn write_monte_carlo_report(
    args: &Args,
    analysis: &MonteCarloAnalysis,
    start_time: Instant,
) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;
    match args.report.as_str() {
        "json" => logic::reports::generate_monte_carlo_json(&mut output_target, analysis)?,
        "markdown" => logic::reports::generate_monte_carlo_markdown(&mut output_target, analysis)?,
        "csv" => logic::reports::generate_monte_carlo_csv(&mut output_target, analysis)?,
        _ => {
            logic::reports::generate_monte_carlo_console(&mut output_target, analysis)?;
            write_total_time(&mut output_target, start_time)?;
        }
    }
    output_target.flush_inner()?;
    Ok(())
}

fn write_reports(args: &Args, results: &[ScenarioResult], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => logic::reports::generate_json_report(&mut output_target, results)?,
        "markdown" => {
            if results.is_empty() {
                writeln!(
                    &mut output_target,
                    "# Time Hero Scenario Results\n\n_No scenarios executed._"
                )?;
            } else {
                logic::reports::generate_markdown_report(&mut output_target, results)?;
            }
        }
        "csv" => logic::reports::generate_csv_report(&mut output_target, results)?,
        _ => {
            if results.is_empty() {
                writeln!(&mut output_target, "No scenarios executed.")?;
            } else {
                logic::reports::generate_console_report(
                    &mut output_target,
                    results,
                    start_time.elapsed(),
                )?;
            }
            write_total_time(&mut output_target, start_time)?;
        }
    }

    output_target.flush_inner()?;
    Ok(())
}

fn write_total_time(output_target: &mut OutputTarget, start_time: Instant) -> Result<()> {
    let duration = start_time.elapsed();
    writeln!(output_target)?;
    writeln!(output_target, "🏁 Total time: {duration:?}")?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn base_args() -> Args {
        Args {
            mode: TestMode::Single,
            scenarios: "all".to_string(),
            list_scenarios: false,
            seeds: "1337".to_string(),
            random_seeds: None,
            runs: None,
            workers: None,
            max_days: Some(1),
            timeout_secs: None,
            confidence: None,
            config: None,
            no_variance: false,
            catalog: None,
            profile: None,
            strategy: None,
            session_hour: Some(18),
            weekend: false,
            report: "json".to_string(),
            verbose: false,
            output: None,
        }
    }

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("timehero-{}-{name}", std::process::id()))
    }

    fn builtin() -> Arc<GameConfiguration> {
        Arc::new(GameConfiguration::builtin().unwrap())
    }

    fn sample_result(passed: bool) -> ScenarioResult {
        ScenarioResult {
            scenario_name: "Casual Player Progression".to_string(),
            passed,
            iterations_run: 1,
            successful_iterations: usize::from(passed),
            failures: Vec::new(),
            warnings: Vec::new(),
            average_duration: Duration::from_millis(10),
            performance_data: vec![Duration::from_millis(10)],
        }
    }

    #[test]
    fn expands_all_scenarios_keyword() {
        let expanded = expand_scenarios("casual,all");
        assert_eq!(expanded, vec!["casual", "speedrunner", "weekend-warrior"]);
    }

    #[test]
    fn unknown_scenarios_are_dropped() {
        let selected = select_archetypes("speedrunner,nope");
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "speedrunner");
    }

    #[test]
    fn seeds_resolve_from_tokens() {
        let args = Args {
            seeds: "3, 1..=2".to_string(),
            ..base_args()
        };
        assert_eq!(resolve_seeds(&args).unwrap(), vec![3, 1, 2]);
    }

    #[test]
    fn random_seed_count_is_honored() {
        let args = Args {
            random_seeds: Some(4),
            ..base_args()
        };
        assert_eq!(resolve_seeds(&args).unwrap().len(), 4);
        let zero = Args {
            random_seeds: Some(0),
            ..base_args()
        };
        assert!(resolve_seeds(&zero).is_err());
    }

    #[test]
    fn session_clock_is_pinned_only_on_request() {
        let unpinned = Args {
            session_hour: None,
            ..base_args()
        };
        assert!(session_clock(&unpinned).is_none());
        let weekend = Args {
            session_hour: None,
            weekend: true,
            ..base_args()
        };
        assert_eq!(
            session_clock(&weekend),
            Some(FixedClock::new(DEFAULT_SESSION_HOUR, true))
        );
    }

    #[test]
    fn strategy_override_applies() {
        let profile = apply_strategy(PlayerProfile::default(), Some("storage_focused")).unwrap();
        assert_eq!(profile.upgrade_strategy, UpgradeStrategy::StorageFocused);
        assert!(apply_strategy(PlayerProfile::default(), Some("hoarder")).is_err());
        let untouched = apply_strategy(PlayerProfile::default(), None).unwrap();
        assert_eq!(untouched, PlayerProfile::default());
    }

    #[test]
    fn monte_carlo_flags_override_defaults() {
        let args = Args {
            runs: Some(12),
            workers: Some(2),
            max_days: Some(3),
            timeout_secs: Some(5.0),
            no_variance: true,
            seeds: "99".to_string(),
            ..base_args()
        };
        let config = build_monte_carlo_config(&args, &[99]).unwrap();
        assert_eq!(config.runs, 12);
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.simulation.max_days, 3);
        assert_eq!(config.base_seed, 99);
        assert_eq!(config.variance, VarianceConfig::none());
    }

    #[test]
    fn monte_carlo_config_file_is_read() {
        let path = temp_file("mc-config.json");
        std::fs::write(&path, r#"{"runs": 7, "base_seed": 40}"#).unwrap();
        let args = Args {
            config: Some(path),
            max_days: None,
            ..base_args()
        };
        let config = build_monte_carlo_config(&args, &[1337]).unwrap();
        assert_eq!(config.runs, 7);
        assert_eq!(config.base_seed, 40);
    }

    #[test]
    fn invalid_monte_carlo_flags_fail() {
        let args = Args {
            runs: Some(0),
            ..base_args()
        };
        assert!(build_monte_carlo_config(&args, &[1]).is_err());
    }

    #[test]
    fn single_runs_produce_one_report_per_seed() {
        let args = base_args();
        let reports = run_single(&args, &builtin(), &PlayerProfile::default(), &[1, 2]);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].seed, 1);
        assert_eq!(reports[1].seed, 2);
    }

    #[test]
    fn single_json_report_is_written() {
        let path = temp_file("single.json");
        let args = Args {
            output: Some(path.clone()),
            ..base_args()
        };
        let reports = run_single(&args, &builtin(), &PlayerProfile::default(), &[5]);
        write_single_reports(&args, &reports, Instant::now()).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["report"][0]["seed"], 5);
    }

    #[test]
    fn monte_carlo_runs_through_the_cli_path() {
        let args = Args {
            mode: TestMode::MonteCarlo,
            runs: Some(3),
            workers: Some(2),
            ..base_args()
        };
        let analysis = tokio_test::block_on(run_monte_carlo(
            &args,
            builtin(),
            PlayerProfile::default(),
            &[10],
        ))
        .unwrap();
        assert_eq!(analysis.metadata.total_runs, 3);
        assert_eq!(analysis.metadata.base_seed, 10);
    }

    #[test]
    fn maybe_list_scenarios_writes_output() {
        let path = temp_file("scenarios.txt");
        let args = Args {
            list_scenarios: true,
            output: Some(path.clone()),
            ..base_args()
        };
        assert!(maybe_list_scenarios(&args).unwrap());
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("Available scenarios"));
        assert!(content.contains("weekend-warrior"));
    }

    #[test]
    fn maybe_list_scenarios_returns_false_when_disabled() {
        assert!(!maybe_list_scenarios(&base_args()).unwrap());
    }

    #[test]
    fn write_reports_markdown_empty_results() {
        let path = temp_file("empty.md");
        let args = Args {
            report: "markdown".to_string(),
            output: Some(path.clone()),
            ..base_args()
        };
        write_reports(&args, &[], Instant::now()).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("No scenarios executed"));
    }

    #[test]
    fn write_reports_emits_csv() {
        let path = temp_file("scenarios.csv");
        let args = Args {
            report: "csv".to_string(),
            output: Some(path.clone()),
            ..base_args()
        };
        write_reports(&args, &[sample_result(false)], Instant::now()).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with("Suite,Test,Status,Duration,Issues"));
        assert!(content.contains("Casual Player Progression,FAIL"));
    }

    #[test]
    fn write_reports_console_includes_total_time() {
        let path = temp_file("console.txt");
        let args = Args {
            report: "console".to_string(),
            output: Some(path.clone()),
            ..base_args()
        };
        write_reports(&args, &[sample_result(true)], Instant::now()).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("Total time"));
    }

    #[test]
    fn output_target_stdout_writes() {
        let mut target = OutputTarget::new(None).unwrap();
        target.write_all(b"ok").unwrap();
        target.flush().unwrap();
    }
}
