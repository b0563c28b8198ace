//! CLI entrypoint for the filebuf conformance harness.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use filebuf_core::metrics::global_metrics;
use filebuf_harness::fixtures::UnitKind;
use filebuf_harness::runner::MODES;
use filebuf_harness::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};
use filebuf_harness::verify::VerificationSummary;
use filebuf_harness::{ConformanceReport, FixtureSet, TestRunner, roundtrip};

/// Conformance tooling for filebuf-core.
#[derive(Debug, Parser)]
#[command(name = "filebuf-harness")]
#[command(about = "Conformance testing harness for the buffered conversion engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run fixture scripts against the engine and compare transcripts.
    Verify {
        /// Directory containing fixture JSON files.
        #[arg(long)]
        fixture: PathBuf,
        /// Output report path (markdown; a JSON copy is written next to it).
        #[arg(long)]
        report: Option<PathBuf>,
        /// Structured JSONL run log path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Optional fixed timestamp string for deterministic report generation.
        #[arg(long)]
        timestamp: Option<String>,
    },
    /// Write generated units through a codec and read them back.
    Roundtrip {
        /// Codec name: identity, crlf, utf8 or shift.
        #[arg(long, default_value = "identity")]
        codec: String,
        /// Number of units to generate.
        #[arg(long, default_value_t = 4096)]
        units: usize,
        /// Unit type for the identity codec (u8, u16 or u32).
        #[arg(long, default_value = "u8")]
        unit: String,
        /// Generator seed.
        #[arg(long, default_value_t = 0x5EED)]
        seed: u64,
    },
    /// Print the engine counters as JSON, optionally after running fixtures.
    Metrics {
        /// Directory containing fixture JSON files to run first.
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
}

fn parse_unit(s: &str) -> Result<UnitKind, String> {
    match s {
        "u8" => Ok(UnitKind::U8),
        "u16" => Ok(UnitKind::U16),
        "u32" => Ok(UnitKind::U32),
        other => Err(format!("Unsupported unit '{other}', expected u8|u16|u32")),
    }
}

fn load_fixtures(dir: &Path) -> Result<Vec<FixtureSet>, Box<dyn std::error::Error>> {
    let mut fixture_paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    fixture_paths.sort();

    let mut fixture_sets = Vec::new();
    for path in fixture_paths {
        match FixtureSet::from_file(&path) {
            Ok(set) => fixture_sets.push(set),
            Err(err) => eprintln!("Skipping {}: {}", path.display(), err),
        }
    }
    if fixture_sets.is_empty() {
        return Err(format!("No fixture JSON files found in {}", dir.display()).into());
    }
    Ok(fixture_sets)
}

fn run_fixtures(
    fixture_sets: &[FixtureSet],
    mut log: Option<&mut LogEmitter>,
) -> Result<VerificationSummary, Box<dyn std::error::Error>> {
    let mut results = Vec::new();
    for mode in MODES {
        let runner = TestRunner::new("fixture-verify", mode);
        for set in fixture_sets {
            let started = Instant::now();
            let set_results = runner.run(set);
            let elapsed = started.elapsed().as_millis() as u64;
            if let Some(log) = log.as_deref_mut() {
                for r in &set_results {
                    let outcome = if r.passed { Outcome::Pass } else { Outcome::Fail };
                    let level = if r.passed { LogLevel::Info } else { LogLevel::Error };
                    let mut entry = LogEntry::new("", level, "case_result")
                        .with_mode(mode)
                        .with_case(&r.family, &r.case_name)
                        .with_outcome(outcome)
                        .with_duration_ms(elapsed);
                    if let Some(diff) = &r.diff {
                        entry = entry.with_details(serde_json::json!({ "diff": diff }));
                    }
                    log.emit_entry(entry)?;
                }
            }
            results.extend(set_results);
        }
    }
    Ok(VerificationSummary::from_results(results))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Verify {
            fixture,
            report,
            log,
            timestamp,
        } => {
            eprintln!("Verifying against fixtures in {}", fixture.display());
            let fixture_sets = load_fixtures(&fixture)?;

            let run_id = format!("run-{}", std::process::id());
            let mut emitter = match &log {
                Some(path) => Some(LogEmitter::to_file(path, "verify", &run_id)?),
                None => None,
            };
            if let Some(emitter) = emitter.as_mut() {
                emitter.emit(LogLevel::Info, "verify_start")?;
            }

            let summary = run_fixtures(&fixture_sets, emitter.as_mut())?;
            let mut report_doc = ConformanceReport::new(
                "filebuf Conformance Report",
                MODES.join("+"),
                timestamp.unwrap_or_else(|| format!("{:?}", std::time::SystemTime::now())),
                summary,
            )
            .with_metrics(&global_metrics().snapshot());
            for set in &fixture_sets {
                report_doc.fixture_digests.insert(set.family.clone(), set.digest()?);
            }

            eprintln!(
                "Verification complete: total={}, passed={}, failed={}",
                report_doc.summary.total, report_doc.summary.passed, report_doc.summary.failed
            );

            if let Some(report_path) = &report {
                eprintln!("Writing report to {}", report_path.display());
                std::fs::write(report_path, report_doc.to_markdown())?;
                let json_path = report_path.with_extension("json");
                std::fs::write(&json_path, report_doc.to_json())?;
            }

            if let Some(mut emitter) = emitter {
                let outcome = if report_doc.summary.all_passed() {
                    Outcome::Pass
                } else {
                    Outcome::Fail
                };
                let mut entry = LogEntry::new("", LogLevel::Info, "verify_end")
                    .with_outcome(outcome)
                    .with_details(serde_json::json!({
                        "total": report_doc.summary.total,
                        "failed": report_doc.summary.failed,
                    }));
                if let Some(report_path) = &report {
                    entry = entry.with_artifacts(vec![report_path.display().to_string()]);
                }
                emitter.emit_entry(entry)?;
                emitter.flush()?;
            }

            if !report_doc.summary.all_passed() {
                return Err("Conformance verification failed".into());
            }
        }
        Command::Roundtrip {
            codec,
            units,
            unit,
            seed,
        } => {
            let unit = parse_unit(&unit)?;
            let result = roundtrip::run(&codec, unit, units, seed)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.passed() {
                return Err(format!("Round trip through '{codec}' failed").into());
            }
        }
        Command::Metrics { fixture } => {
            if let Some(dir) = fixture {
                let fixture_sets = load_fixtures(&dir)?;
                let summary = run_fixtures(&fixture_sets, None)?;
                eprintln!("Ran {} fixture cases", summary.total);
            }
            let snapshot = global_metrics().snapshot();
            let counters: serde_json::Map<String, serde_json::Value> = snapshot
                .entries()
                .iter()
                .map(|&(name, value)| (name.to_string(), value.into()))
                .collect();
            println!("{}", serde_json::to_string_pretty(&counters)?);
        }
    }

    Ok(())
}
