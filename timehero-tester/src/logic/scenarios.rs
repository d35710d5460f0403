use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use timehero_sim::{
    FixedClock, GameConfiguration, Phase, PhaseEfficiency, PlayerProfile, RunResult, Simulation,
    SimulationSettings,
};

const MINUTES_PER_DAY: f64 = 1440.0;

/// How much a failed check matters. Errors fail the scenario; warnings are
/// reported alongside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expectations {
    /// Endgame must be reached within this many days; also the run horizon.
    pub max_days: u32,
    pub min_helpers: usize,
    pub min_upgrades: usize,
    /// Longest acceptable stay in each phase, in days.
    pub phase_max_days: Vec<(Phase, u32)>,
}

/// A simulated player type and what the economy should let it achieve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Archetype {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub efficiency: f64,
    /// Wall time the archetype checks in at.
    pub session_hour: u32,
    pub weekend: bool,
    pub expectations: Expectations,
}

impl Archetype {
    /// Base profile with this archetype's efficiency in every phase.
    #[must_use]
    pub fn profile(&self, base: &PlayerProfile) -> PlayerProfile {
        PlayerProfile {
            efficiency: PhaseEfficiency::uniform(self.efficiency),
            ..base.clone()
        }
    }
}

#[must_use]
pub fn archetypes() -> Vec<Archetype> {
    vec![
        Archetype {
            id: "speedrunner",
            name: "Speedrunner Progression",
            description: "Optimal play, minimal idle time",
            efficiency: 0.95,
            session_hour: 18,
            weekend: false,
            expectations: Expectations {
                max_days: 25,
                min_helpers: 3,
                min_upgrades: 15,
                phase_max_days: vec![
                    (Phase::Tutorial, 1),
                    (Phase::Early, 5),
                    (Phase::Mid, 15),
                    (Phase::Late, 25),
                ],
            },
        },
        Archetype {
            id: "casual",
            name: "Casual Player Progression",
            description: "Moderate efficiency, some idle time",
            efficiency: 0.7,
            session_hour: 18,
            weekend: false,
            expectations: Expectations {
                max_days: 35,
                min_helpers: 2,
                min_upgrades: 10,
                phase_max_days: vec![
                    (Phase::Tutorial, 3),
                    (Phase::Early, 8),
                    (Phase::Mid, 20),
                    (Phase::Late, 35),
                ],
            },
        },
        Archetype {
            id: "weekend-warrior",
            name: "Weekend Warrior Progression",
            description: "Intermittent play with long idle stretches",
            efficiency: 0.6,
            session_hour: 14,
            weekend: true,
            expectations: Expectations {
                max_days: 50,
                min_helpers: 1,
                min_upgrades: 8,
                phase_max_days: vec![
                    (Phase::Tutorial, 5),
                    (Phase::Early, 12),
                    (Phase::Mid, 30),
                    (Phase::Late, 50),
                ],
            },
        },
    ]
}

#[must_use]
pub fn find_archetype(id: &str) -> Option<Archetype> {
    archetypes().into_iter().find(|a| a.id == id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub metric: String,
    pub passed: bool,
    pub severity: CheckSeverity,
    pub message: String,
}

impl Check {
    fn new(metric: impl Into<String>, passed: bool, severity: CheckSeverity, message: String) -> Self {
        Self {
            metric: metric.into(),
            passed,
            severity,
            message,
        }
    }
}

/// Days spent in `phase`, counting the ongoing phase up to the last tick.
fn phase_days(result: &RunResult, phase: Phase) -> Option<f64> {
    let state = result.final_state();
    let ticks = if state.phase == phase {
        state.tick.saturating_sub(state.phase_started_at)
    } else {
        *state.metrics.phase_durations.get(&phase)?
    };
    #[allow(clippy::cast_precision_loss)]
    Some(ticks as f64 / MINUTES_PER_DAY)
}

/// Compare one finished run against an archetype's expectations.
#[must_use]
pub fn evaluate(expectations: &Expectations, result: &RunResult) -> Vec<Check> {
    let state = result.final_state();
    let mut checks = Vec::new();

    let completion = result.phase_entry_day(Phase::Endgame);
    checks.push(match completion {
        Some(day) if day <= expectations.max_days => Check::new(
            "completion_day",
            true,
            CheckSeverity::Error,
            format!("Reached endgame on day {day} (≤ {})", expectations.max_days),
        ),
        Some(day) => Check::new(
            "completion_day",
            false,
            CheckSeverity::Error,
            format!("Reached endgame on day {day} (expected ≤ {})", expectations.max_days),
        ),
        None => Check::new(
            "completion_day",
            false,
            CheckSeverity::Error,
            format!(
                "Did not reach endgame within {} days (ended in {})",
                expectations.max_days, state.phase
            ),
        ),
    });

    let helpers = state.helpers.len();
    checks.push(Check::new(
        "min_helpers",
        helpers >= expectations.min_helpers,
        CheckSeverity::Warning,
        format!(
            "Discovered {helpers} helpers (expected ≥ {})",
            expectations.min_helpers
        ),
    ));

    let upgrades = state.upgrades.len();
    checks.push(Check::new(
        "min_upgrades",
        upgrades >= expectations.min_upgrades,
        CheckSeverity::Warning,
        format!(
            "Purchased {upgrades} upgrades (expected ≥ {})",
            expectations.min_upgrades
        ),
    ));

    for (phase, max) in &expectations.phase_max_days {
        let Some(days) = phase_days(result, *phase) else {
            continue;
        };
        checks.push(Check::new(
            format!("{phase}_phase_timing"),
            days <= f64::from(*max),
            CheckSeverity::Warning,
            format!("{phase} phase lasted {days:.1} days (expected ≤ {max})"),
        ));
    }
    checks
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
    #[serde(with = "duration_vec_serde")]
    pub performance_data: Vec<Duration>,
}

/// Plays each archetype once per seed against one catalog.
pub struct ScenarioRunner {
    catalog: Arc<GameConfiguration>,
    base_profile: PlayerProfile,
    session_clock: Option<FixedClock>,
    verbose: bool,
}

impl ScenarioRunner {
    #[must_use]
    pub const fn new(
        catalog: Arc<GameConfiguration>,
        base_profile: PlayerProfile,
        verbose: bool,
    ) -> Self {
        Self {
            catalog,
            base_profile,
            session_clock: None,
            verbose,
        }
    }

    /// Override every archetype's check-in time.
    #[must_use]
    pub fn with_session_clock(mut self, clock: Option<FixedClock>) -> Self {
        self.session_clock = clock;
        self
    }

    fn play(&self, archetype: &Archetype, seed: u64) -> Result<RunResult, timehero_sim::SimError> {
        let clock = self
            .session_clock
            .unwrap_or_else(|| FixedClock::new(archetype.session_hour, archetype.weekend));
        let mut sim = Simulation::new(
            Arc::clone(&self.catalog),
            archetype.profile(&self.base_profile),
            SimulationSettings::default().with_max_days(archetype.expectations.max_days),
            seed,
        )
        .with_session_clock(clock);
        sim.run_to_completion();
        sim.finish()
    }

    pub fn run(&self, archetype: &Archetype, seeds: &[u64]) -> ScenarioResult {
        let mut failures = Vec::new();
        let mut warnings = Vec::new();
        let mut performance_data = Vec::with_capacity(seeds.len());
        let mut successful_iterations = 0;

        for &seed in seeds {
            if self.verbose {
                println!(
                    "🧪 Testing scenario: {} (seed: {seed})",
                    archetype.name.bright_white()
                );
            }
            let started = Instant::now();
            let outcome = self.play(archetype, seed);
            performance_data.push(started.elapsed());

            let result = match outcome {
                Ok(result) => result,
                Err(err) => {
                    failures.push(format!("seed {seed}: run aborted: {err}"));
                    continue;
                }
            };
            let mut clean = true;
            for check in evaluate(&archetype.expectations, &result) {
                if check.passed {
                    continue;
                }
                let line = format!("seed {seed}: {}", check.message);
                match check.severity {
                    CheckSeverity::Error => {
                        clean = false;
                        failures.push(line);
                    }
                    CheckSeverity::Warning => warnings.push(line),
                }
            }
            if clean {
                successful_iterations += 1;
            }
        }

        let average_duration = if performance_data.is_empty() {
            Duration::ZERO
        } else {
            performance_data.iter().sum::<Duration>()
                / u32::try_from(performance_data.len()).unwrap_or(1)
        };

        ScenarioResult {
            scenario_name: archetype.name.to_string(),
            passed: failures.is_empty(),
            iterations_run: seeds.len(),
            successful_iterations,
            failures,
            warnings,
            average_duration,
            performance_data,
        }
    }

    pub fn run_all(&self, archetypes: &[Archetype], seeds: &[u64]) -> Vec<ScenarioResult> {
        archetypes.iter().map(|a| self.run(a, seeds)).collect()
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}

mod duration_vec_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis: Vec<u128> = durations.iter().map(Duration::as_millis).collect();
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Vec::<u128>::deserialize(deserializer)?;
        Ok(millis
            .into_iter()
            .map(|ms| Duration::from_millis(u64::try_from(ms).unwrap_or(0)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ScenarioRunner {
        ScenarioRunner::new(
            Arc::new(GameConfiguration::builtin().unwrap()),
            PlayerProfile::default(),
            false,
        )
    }

    fn short(archetype: &Archetype, days: u32) -> Archetype {
        let mut archetype = archetype.clone();
        archetype.expectations.max_days = days;
        archetype
    }

    #[test]
    fn archetype_table_matches_expectations() {
        let all = archetypes();
        let ids: Vec<_> = all.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["speedrunner", "casual", "weekend-warrior"]);
        let speed = find_archetype("speedrunner").unwrap();
        assert!((speed.efficiency - 0.95).abs() < f64::EPSILON);
        assert_eq!(speed.expectations.max_days, 25);
        assert_eq!(speed.expectations.min_helpers, 3);
        assert_eq!(speed.expectations.min_upgrades, 15);
        let weekend = find_archetype("weekend-warrior").unwrap();
        assert_eq!(weekend.expectations.min_upgrades, 8);
        assert!(find_archetype("nobody").is_none());
    }

    #[test]
    fn profile_applies_uniform_efficiency() {
        let casual = find_archetype("casual").unwrap();
        let profile = casual.profile(&PlayerProfile::default());
        for phase in Phase::ALL {
            assert!((profile.efficiency_for(phase) - 0.7).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn short_horizon_misses_endgame_and_fails() {
        let archetype = short(&find_archetype("speedrunner").unwrap(), 2);
        let result = runner().run(&archetype, &[1, 2]);
        assert!(!result.passed);
        assert_eq!(result.iterations_run, 2);
        assert_eq!(result.successful_iterations, 0);
        assert_eq!(result.performance_data.len(), 2);
        assert!(result.failures.iter().any(|f| f.contains("Did not reach endgame")));
        assert!(result.warnings.iter().any(|w| w.contains("helpers")));
    }

    #[test]
    fn evaluation_covers_each_expectation() {
        let archetype = short(&find_archetype("casual").unwrap(), 2);
        let catalog = Arc::new(GameConfiguration::builtin().unwrap());
        let mut sim = Simulation::new(
            catalog,
            archetype.profile(&PlayerProfile::default()),
            SimulationSettings::default().with_max_days(2),
            9,
        )
        .with_session_clock(FixedClock::idle());
        sim.run_to_completion();
        let result = sim.finish().unwrap();
        let checks = evaluate(&archetype.expectations, &result);
        let metrics: Vec<_> = checks.iter().map(|c| c.metric.as_str()).collect();
        assert!(metrics.contains(&"completion_day"));
        assert!(metrics.contains(&"min_helpers"));
        assert!(metrics.contains(&"min_upgrades"));
        assert!(metrics.contains(&"tutorial_phase_timing"));
        let tutorial = checks
            .iter()
            .find(|c| c.metric == "tutorial_phase_timing")
            .unwrap();
        assert!(tutorial.passed);
    }

    #[test]
    fn results_serialize_durations_as_millis() {
        let result = ScenarioResult {
            scenario_name: "Casual".to_string(),
            passed: true,
            iterations_run: 1,
            successful_iterations: 1,
            failures: Vec::new(),
            warnings: Vec::new(),
            average_duration: Duration::from_millis(12),
            performance_data: vec![Duration::from_millis(12)],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["average_duration"], 12);
        assert_eq!(json["performance_data"][0], 12);
    }
}
