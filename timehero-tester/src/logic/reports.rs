use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use serde::Serialize;
use std::io::Write;
use std::time::Duration;
use timehero_sim::SimulationReport;

use super::ScenarioResult;
use super::monte_carlo::MonteCarloAnalysis;
use super::stats::count_f64;

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    generated_at: String,
    report: &'a T,
}

fn write_envelope<T: Serialize>(writer: &mut dyn Write, report: &T) -> Result<()> {
    let envelope = Envelope {
        generated_at: Utc::now().to_rfc3339(),
        report,
    };
    serde_json::to_writer_pretty(&mut *writer, &envelope)?;
    writeln!(writer)?;
    Ok(())
}

fn pass_rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count_f64(passed) / count_f64(total) * 100.0
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

// Scenario results

pub fn generate_console_report(
    writer: &mut dyn Write,
    results: &[ScenarioResult],
    total_duration: Duration,
) -> Result<()> {
    writeln!(writer)?;
    writeln!(writer, "{}", "📊 Scenario Results Summary".bright_cyan().bold())?;
    writeln!(writer, "{}", "===========================".cyan())?;

    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();
    writeln!(writer, "Total scenarios: {total}")?;
    writeln!(writer, "Passed: {}", passed.to_string().green())?;
    writeln!(writer, "Failed: {}", (total - passed).to_string().red())?;
    writeln!(writer, "Success rate: {:.1}%", pass_rate(passed, total))?;
    writeln!(writer, "Total time: {total_duration:?}")?;
    writeln!(writer)?;

    for result in results {
        let status = if result.passed {
            "✅ PASS".green()
        } else {
            "❌ FAIL".red()
        };
        writeln!(writer, "{} {}", status, result.scenario_name.bold())?;
        writeln!(
            writer,
            "   Iterations: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(writer, "   Average time: {:?}", result.average_duration)?;
        if !result.failures.is_empty() {
            writeln!(writer, "   Failures:")?;
            for failure in &result.failures {
                writeln!(writer, "     • {}", failure.red())?;
            }
        }
        if !result.warnings.is_empty() {
            writeln!(writer, "   Warnings:")?;
            for warning in &result.warnings {
                writeln!(writer, "     • {}", warning.yellow())?;
            }
        }
        writeln!(writer)?;
    }

    let fastest = results.iter().min_by_key(|r| r.average_duration);
    let slowest = results.iter().max_by_key(|r| r.average_duration);
    if let (Some(fastest), Some(slowest)) = (fastest, slowest) {
        writeln!(writer, "{}", "⚡ Performance Summary".bright_yellow().bold())?;
        writeln!(writer, "{}", "=====================".yellow())?;
        writeln!(
            writer,
            "Fastest: {} ({:?})",
            fastest.scenario_name.green(),
            fastest.average_duration
        )?;
        writeln!(
            writer,
            "Slowest: {} ({:?})",
            slowest.scenario_name.yellow(),
            slowest.average_duration
        )?;
    }
    Ok(())
}

pub fn generate_json_report(writer: &mut dyn Write, results: &[ScenarioResult]) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, results)?;
    writeln!(writer)?;
    Ok(())
}

pub fn generate_markdown_report(writer: &mut dyn Write, results: &[ScenarioResult]) -> Result<()> {
    writeln!(writer, "# Time Hero Scenario Results\n")?;
    writeln!(writer, "_Generated {}_\n", Utc::now().to_rfc3339())?;

    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();
    writeln!(writer, "## Summary\n")?;
    writeln!(writer, "- **Total scenarios**: {total}")?;
    writeln!(writer, "- **Passed**: {passed}")?;
    writeln!(writer, "- **Failed**: {}", total - passed)?;
    writeln!(
        writer,
        "- **Success rate**: {:.1}%\n",
        pass_rate(passed, total)
    )?;

    writeln!(writer, "## Detailed Results\n")?;
    for result in results {
        let status = if result.passed { "✅" } else { "❌" };
        writeln!(writer, "### {status} {}\n", result.scenario_name)?;
        writeln!(
            writer,
            "- **Iterations**: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(writer, "- **Average time**: {:?}", result.average_duration)?;
        if !result.failures.is_empty() {
            writeln!(writer, "- **Failures**:")?;
            for failure in &result.failures {
                writeln!(writer, "  - {failure}")?;
            }
        }
        if !result.warnings.is_empty() {
            writeln!(writer, "- **Warnings**:")?;
            for warning in &result.warnings {
                writeln!(writer, "  - {warning}")?;
            }
        }
        writeln!(writer)?;
    }
    Ok(())
}

pub fn generate_csv_report(writer: &mut dyn Write, results: &[ScenarioResult]) -> Result<()> {
    writeln!(writer, "Suite,Test,Status,Duration,Issues")?;
    for result in results {
        let status = if result.passed { "PASS" } else { "FAIL" };
        let issues: Vec<&str> = result
            .failures
            .iter()
            .chain(&result.warnings)
            .map(String::as_str)
            .collect();
        writeln!(
            writer,
            "scenarios,{},{status},{},{}",
            csv_field(&result.scenario_name),
            result.average_duration.as_millis(),
            csv_field(&issues.join("; "))
        )?;
    }
    Ok(())
}

// Monte Carlo analysis

pub fn generate_monte_carlo_console(
    writer: &mut dyn Write,
    analysis: &MonteCarloAnalysis,
) -> Result<()> {
    let meta = &analysis.metadata;
    writeln!(writer)?;
    writeln!(writer, "{}", "🎲 Monte Carlo Summary".bright_cyan().bold())?;
    writeln!(writer, "{}", "======================".cyan())?;
    writeln!(
        writer,
        "Runs: {} completed / {} total",
        meta.completed_runs.to_string().green(),
        meta.total_runs
    )?;
    writeln!(
        writer,
        "Failed: {}  Timed out: {}  Stopped: {}",
        meta.failed_runs.to_string().red(),
        meta.timed_out_runs.to_string().yellow(),
        meta.stopped_runs
    )?;
    writeln!(
        writer,
        "Success rate: {:.1}%",
        analysis.summary.success_rate * 100.0
    )?;
    writeln!(
        writer,
        "Base seed: {}  Horizon: {} days  Catalog: {:016x}",
        meta.base_seed, meta.max_days, meta.catalog_fingerprint
    )?;
    writeln!(
        writer,
        "Average run: {:.1} ms  Wall time: {} ms",
        analysis.summary.average_run_ms, meta.wall_time_ms
    )?;
    writeln!(writer)?;

    if !analysis.metrics.is_empty() {
        writeln!(writer, "{}", "📈 Metrics".bright_yellow().bold())?;
        writeln!(
            writer,
            "{:<28} {:>6} {:>10} {:>10} {:>10} {:>22}",
            "metric", "n", "mean", "median", "std_dev", "CI"
        )?;
        for (name, summary) in &analysis.metrics {
            let d = &summary.distribution;
            let ci = &summary.confidence_interval;
            writeln!(
                writer,
                "{name:<28} {:>6} {:>10.2} {:>10.2} {:>10.2} {:>22}",
                d.count,
                d.mean,
                d.median,
                d.std_dev,
                format!("[{:.2}, {:.2}]", ci.lower, ci.upper)
            )?;
        }
        writeln!(writer)?;
    }

    if !analysis.summary.bottleneck_counts.is_empty() {
        writeln!(writer, "{}", "🚧 Bottlenecks".bright_yellow().bold())?;
        for (kind, hits) in &analysis.summary.bottleneck_counts {
            writeln!(writer, "  {kind}: {hits} runs")?;
        }
        writeln!(writer)?;
    }
    for insight in &analysis.summary.insights {
        writeln!(writer, "💡 {insight}")?;
    }
    for recommendation in &analysis.summary.recommendations {
        writeln!(writer, "👉 {}", recommendation.yellow())?;
    }
    Ok(())
}

pub fn generate_monte_carlo_json(writer: &mut dyn Write, analysis: &MonteCarloAnalysis) -> Result<()> {
    write_envelope(writer, analysis)
}

pub fn generate_monte_carlo_markdown(
    writer: &mut dyn Write,
    analysis: &MonteCarloAnalysis,
) -> Result<()> {
    let meta = &analysis.metadata;
    writeln!(writer, "# Time Hero Monte Carlo Analysis\n")?;
    writeln!(writer, "_Generated {}_\n", Utc::now().to_rfc3339())?;
    writeln!(writer, "## Summary\n")?;
    writeln!(writer, "- **Total runs**: {}", meta.total_runs)?;
    writeln!(writer, "- **Completed**: {}", meta.completed_runs)?;
    writeln!(writer, "- **Failed**: {}", meta.failed_runs)?;
    writeln!(writer, "- **Timed out**: {}", meta.timed_out_runs)?;
    writeln!(writer, "- **Stopped**: {}", meta.stopped_runs)?;
    writeln!(
        writer,
        "- **Success rate**: {:.1}%",
        analysis.summary.success_rate * 100.0
    )?;
    writeln!(writer, "- **Base seed**: {}", meta.base_seed)?;
    writeln!(writer, "- **Horizon**: {} days\n", meta.max_days)?;

    if !analysis.metrics.is_empty() {
        writeln!(writer, "## Metrics\n")?;
        writeln!(
            writer,
            "| Metric | n | Mean | Median | Std dev | P10 | P90 | CI low | CI high |"
        )?;
        writeln!(writer, "|---|---|---|---|---|---|---|---|---|")?;
        for (name, summary) in &analysis.metrics {
            let d = &summary.distribution;
            let ci = &summary.confidence_interval;
            writeln!(
                writer,
                "| {name} | {} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} |",
                d.count,
                d.mean,
                d.median,
                d.std_dev,
                d.percentiles.p10,
                d.percentiles.p90,
                ci.lower,
                ci.upper
            )?;
        }
        writeln!(writer)?;
    }

    if !analysis.summary.insights.is_empty() {
        writeln!(writer, "## Insights\n")?;
        for insight in &analysis.summary.insights {
            writeln!(writer, "- {insight}")?;
        }
        writeln!(writer)?;
    }
    if !analysis.summary.recommendations.is_empty() {
        writeln!(writer, "## Recommendations\n")?;
        for recommendation in &analysis.summary.recommendations {
            writeln!(writer, "- {recommendation}")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// One row per run; metric columns are the union across all runs.
pub fn generate_monte_carlo_csv(writer: &mut dyn Write, analysis: &MonteCarloAnalysis) -> Result<()> {
    let columns: std::collections::BTreeSet<&str> = analysis
        .runs
        .iter()
        .flat_map(|r| r.metrics.keys().map(String::as_str))
        .collect();
    write!(writer, "index,seed,outcome,duration_ms,bottlenecks")?;
    for column in &columns {
        write!(writer, ",{column}")?;
    }
    writeln!(writer)?;

    for run in &analysis.runs {
        write!(
            writer,
            "{},{},{},{},{}",
            run.index,
            run.seed,
            run.outcome.label(),
            run.duration_ms,
            csv_field(&run.bottlenecks.join(";"))
        )?;
        for column in &columns {
            match run.metrics.get(*column) {
                Some(value) => write!(writer, ",{value}")?,
                None => write!(writer, ",")?,
            }
        }
        writeln!(writer)?;
    }
    Ok(())
}

// Single run

pub fn generate_simulation_console(writer: &mut dyn Write, report: &SimulationReport) -> Result<()> {
    let state = &report.game_state;
    let resources = &report.resources;
    writeln!(writer)?;
    writeln!(writer, "{}", "🌱 Simulation Report".bright_cyan().bold())?;
    writeln!(writer, "{}", "====================".cyan())?;
    writeln!(writer, "Seed: {}", report.seed)?;
    writeln!(
        writer,
        "Day {}  Phase: {}  ({} minutes simulated)",
        state.day,
        state.phase.to_string().bold(),
        state.total_minutes
    )?;
    writeln!(
        writer,
        "Plots: {}/{} active  Helpers: {}  Upgrades: {}",
        state.active_plots, state.total_plots, state.helpers, state.upgrades
    )?;
    writeln!(
        writer,
        "Energy: {:.0}/{:.0}  Efficiency: {:.1}%  Wasted: {:.0}",
        resources.energy.current,
        resources.energy.cap,
        resources.energy_efficiency,
        resources.flows.energy_wasted
    )?;
    writeln!(
        writer,
        "Gold: {} (earned {})",
        resources.gold, resources.gold_earned
    )?;
    writeln!(writer)?;

    writeln!(writer, "{}", "⏱  Phase Timing".bright_yellow().bold())?;
    for timing in &report.phase_timing {
        let label = format!("{:?}", timing.status);
        let ongoing = if timing.ongoing { " (ongoing)" } else { "" };
        writeln!(
            writer,
            "  {:<9} {:>8.1} {:?} (target {:.0}-{:.0}) {}{ongoing}",
            timing.phase.to_string(),
            timing.actual,
            timing.target.unit,
            timing.target.min,
            timing.target.max,
            label
        )?;
    }
    writeln!(writer)?;

    if report.bottlenecks.is_empty() {
        writeln!(writer, "{}", "No bottlenecks detected".green())?;
    } else {
        writeln!(writer, "{}", "🚧 Bottlenecks".bright_yellow().bold())?;
        for bottleneck in &report.bottlenecks {
            writeln!(
                writer,
                "  [{:?}] {}: {}",
                bottleneck.severity,
                bottleneck.kind,
                bottleneck.description.red()
            )?;
            writeln!(writer, "      → {}", bottleneck.suggestion)?;
        }
    }
    for recommendation in &report.recommendations {
        writeln!(writer, "👉 {recommendation}")?;
    }
    Ok(())
}

pub fn generate_simulation_json(writer: &mut dyn Write, reports: &[SimulationReport]) -> Result<()> {
    write_envelope(writer, &reports)
}

pub fn generate_simulation_markdown(writer: &mut dyn Write, report: &SimulationReport) -> Result<()> {
    let state = &report.game_state;
    writeln!(writer, "# Time Hero Simulation Report\n")?;
    writeln!(writer, "_Generated {}_\n", Utc::now().to_rfc3339())?;
    writeln!(writer, "- **Seed**: {}", report.seed)?;
    writeln!(writer, "- **Day**: {}", state.day)?;
    writeln!(writer, "- **Phase**: {}", state.phase)?;
    writeln!(writer, "- **Helpers**: {}", state.helpers)?;
    writeln!(writer, "- **Upgrades**: {}\n", state.upgrades)?;

    writeln!(writer, "## Phase Timing\n")?;
    writeln!(writer, "| Phase | Actual | Unit | Target | Status |")?;
    writeln!(writer, "|---|---|---|---|---|")?;
    for timing in &report.phase_timing {
        writeln!(
            writer,
            "| {} | {:.1} | {:?} | {:.0}-{:.0} | {:?}{} |",
            timing.phase,
            timing.actual,
            timing.target.unit,
            timing.target.min,
            timing.target.max,
            timing.status,
            if timing.ongoing { " (ongoing)" } else { "" }
        )?;
    }
    writeln!(writer)?;

    writeln!(writer, "## Bottlenecks\n")?;
    if report.bottlenecks.is_empty() {
        writeln!(writer, "_None detected._\n")?;
    } else {
        for bottleneck in &report.bottlenecks {
            writeln!(
                writer,
                "- **{}** ({:?}): {} _{}_",
                bottleneck.kind, bottleneck.severity, bottleneck.description, bottleneck.suggestion
            )?;
        }
        writeln!(writer)?;
    }
    if !report.recommendations.is_empty() {
        writeln!(writer, "## Recommendations\n")?;
        for recommendation in &report.recommendations {
            writeln!(writer, "- {recommendation}")?;
        }
    }
    Ok(())
}

/// Flat `section,key,value` rows; each run starts with its seed row.
pub fn generate_simulation_csv(writer: &mut dyn Write, reports: &[SimulationReport]) -> Result<()> {
    writeln!(writer, "section,key,value")?;
    for report in reports {
        write_simulation_rows(writer, report)?;
    }
    Ok(())
}

fn write_simulation_rows(writer: &mut dyn Write, report: &SimulationReport) -> Result<()> {
    writeln!(writer, "run,seed,{}", report.seed)?;
    writeln!(writer, "run,day,{}", report.game_state.day)?;
    writeln!(writer, "run,phase,{}", report.game_state.phase)?;
    writeln!(writer, "run,helpers,{}", report.game_state.helpers)?;
    writeln!(writer, "run,upgrades,{}", report.game_state.upgrades)?;
    writeln!(writer, "resources,energy,{}", report.resources.energy.current)?;
    writeln!(writer, "resources,gold,{}", report.resources.gold)?;
    for (material, amount) in &report.resources.materials {
        writeln!(writer, "materials,{},{amount}", csv_field(material))?;
    }
    for (phase, day) in &report.progression.phase_entry_days {
        writeln!(writer, "phase_entry_day,{phase},{day}")?;
    }
    for bottleneck in &report.bottlenecks {
        writeln!(writer, "bottleneck,{},{}", bottleneck.kind, bottleneck.metric)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::monte_carlo::{MonteCarloConfig, RunOutcome, RunRecord};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use timehero_sim::{
        FixedClock, GameConfiguration, PlayerProfile, Simulation, SimulationSettings,
        generate_report,
    };

    fn sample_result(passed: bool) -> ScenarioResult {
        ScenarioResult {
            scenario_name: "Speedrunner, fast".to_string(),
            passed,
            iterations_run: 2,
            successful_iterations: usize::from(passed) * 2,
            failures: if passed {
                Vec::new()
            } else {
                vec!["seed 1: Did not reach endgame within 25 days".to_string()]
            },
            warnings: vec!["seed 1: Discovered 0 helpers (expected ≥ 3)".to_string()],
            average_duration: Duration::from_millis(40),
            performance_data: vec![Duration::from_millis(40)],
        }
    }

    fn sample_analysis() -> MonteCarloAnalysis {
        let config = MonteCarloConfig {
            runs: 2,
            ..MonteCarloConfig::default()
        };
        let records = vec![
            RunRecord {
                index: 0,
                seed: 1337,
                outcome: RunOutcome::Completed,
                duration_ms: 5,
                variant_digest: Some("ab".to_string()),
                metrics: BTreeMap::from([("helpers.found".to_string(), 2.0)]),
                bottlenecks: vec!["energy_storage".to_string()],
            },
            RunRecord {
                index: 1,
                seed: 1338,
                outcome: RunOutcome::TimedOut,
                duration_ms: 9,
                variant_digest: None,
                metrics: BTreeMap::new(),
                bottlenecks: Vec::new(),
            },
        ];
        MonteCarloAnalysis::from_records(&config, 7, records, Duration::from_millis(12))
    }

    fn sample_report() -> SimulationReport {
        let catalog = Arc::new(GameConfiguration::builtin().unwrap());
        let mut sim = Simulation::new(
            catalog,
            PlayerProfile::default(),
            SimulationSettings::default().with_max_days(1),
            3,
        )
        .with_session_clock(FixedClock::new(18, false));
        sim.run_to_completion();
        generate_report(&sim.finish().unwrap())
    }

    fn render(write: impl FnOnce(&mut dyn Write) -> Result<()>) -> String {
        let mut buffer = Vec::new();
        write(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn scenario_reports_mention_failures_and_warnings() {
        let results = [sample_result(true), sample_result(false)];
        let markdown = render(|w| generate_markdown_report(w, &results));
        assert!(markdown.contains("# Time Hero Scenario Results"));
        assert!(markdown.contains("- **Failed**: 1"));
        assert!(markdown.contains("Did not reach endgame"));
        assert!(markdown.contains("Discovered 0 helpers"));

        let console = render(|w| generate_console_report(w, &results, Duration::from_secs(1)));
        assert!(console.contains("Total scenarios: 2"));
        assert!(console.contains("Performance Summary"));
    }

    #[test]
    fn scenario_csv_quotes_commas() {
        let csv = render(|w| generate_csv_report(w, &[sample_result(false)]));
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("Suite,Test,Status,Duration,Issues"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("scenarios,\"Speedrunner, fast\",FAIL,40,"));
    }

    #[test]
    fn scenario_json_is_an_array() {
        let json = render(|w| generate_json_report(w, &[sample_result(true)]));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn monte_carlo_json_carries_timestamp_and_runs() {
        let json = render(|w| generate_monte_carlo_json(w, &sample_analysis()));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["generated_at"].is_string());
        assert_eq!(value["report"]["metadata"]["completed_runs"], 1);
        assert_eq!(value["report"]["runs"][1]["outcome"], "timed_out");
    }

    #[test]
    fn monte_carlo_csv_has_row_per_run() {
        let csv = render(|w| generate_monte_carlo_csv(w, &sample_analysis()));
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "index,seed,outcome,duration_ms,bottlenecks,helpers.found"
        );
        assert_eq!(lines[1], "0,1337,completed,5,energy_storage,2");
        assert_eq!(lines[2], "1,1338,timed_out,9,,");
    }

    #[test]
    fn monte_carlo_text_reports_list_metrics() {
        let analysis = sample_analysis();
        let markdown = render(|w| generate_monte_carlo_markdown(w, &analysis));
        assert!(markdown.contains("| helpers.found | 1 |"));
        assert!(markdown.contains("## Recommendations"));
        let console = render(|w| generate_monte_carlo_console(w, &analysis));
        assert!(console.contains("Monte Carlo Summary"));
        assert!(console.contains("helpers.found"));
    }

    #[test]
    fn simulation_reports_render_every_format() {
        let report = sample_report();
        let reports = [report.clone()];
        let json = render(|w| generate_simulation_json(w, &reports));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["report"][0]["seed"], 3);

        let markdown = render(|w| generate_simulation_markdown(w, &report));
        assert!(markdown.contains("## Phase Timing"));

        let console = render(|w| generate_simulation_console(w, &report));
        assert!(console.contains("Seed: 3"));

        let csv = render(|w| generate_simulation_csv(w, &reports));
        assert!(csv.starts_with("section,key,value\nrun,seed,3\n"));
    }
}
