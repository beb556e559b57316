use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use idvet_ingest::{
    FireAndForget, IdentityPipeline, IdentityReader, InMemoryMalformedRepository, MalformedEntry,
    PipelineReport, StatsLedger, StatsSummary,
};
use idvet_merge::{MergeEngine, MergeStats};
use idvet_throttle::SimulatedVerifier;
use idvet_types::IdGenerator;
use serde::Serialize;
use tracing::info;

use crate::cli::*;
use crate::config::AppConfig;
use crate::generate::{write_lines, GenerateOptions};

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(args, cli.format).await,
        Command::Generate(args) => cmd_generate(args),
        Command::Config(args) => cmd_config(args),
    }
}

/// Everything one ingest run produced.
#[derive(Debug, Serialize)]
pub struct RunOutcome {
    pub verifier: String,
    pub report: PipelineReport,
    pub merge: MergeStats,
    pub stats: StatsSummary,
    pub stored: usize,
    pub delegate_calls: u64,
    pub malformed: Vec<MalformedEntry>,
}

/// Build the verifier stack, engine, and sinks from `config`, then ingest
/// every line of `source`.
pub async fn ingest<R: BufRead>(config: &AppConfig, source: R) -> anyhow::Result<RunOutcome> {
    let simulated = Arc::new(SimulatedVerifier::new(config.simulated.latency()));
    let verifier = config.verifier.build(simulated.clone())?;
    let engine = Arc::new(MergeEngine::new(config.merge.clone()));
    let stats = Arc::new(StatsLedger::new());
    let repository = Arc::new(InMemoryMalformedRepository::new());
    let sink = Arc::new(FireAndForget::spawn(Arc::clone(&repository)));

    let pipeline = IdentityPipeline::new(
        Arc::clone(&verifier),
        Arc::clone(&engine),
        Arc::clone(&stats),
        sink.clone(),
        config.pipeline.clone(),
    )?;
    let reader = IdentityReader::new(source, config.pipeline.layout, Arc::new(IdGenerator::new()));
    info!(strategy = %config.verifier.strategy, layout = %config.pipeline.layout, "ingest starting");

    let processed = pipeline.process(reader).await;
    verifier.close().await;
    let delivered = sink.close().await;
    let report = processed?;
    info!(delivered, "malformed sink drained");

    Ok(RunOutcome {
        verifier: verifier.name().to_string(),
        report,
        merge: engine.stats(),
        stats: stats.summary(),
        stored: engine.len(),
        delegate_calls: simulated.calls(),
        malformed: repository.entries(),
    })
}

async fn cmd_run(args: RunArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut config = AppConfig::load_or_default(args.config.as_deref())?;
    if let Some(layout) = &args.layout {
        config.pipeline.layout = layout.parse()?;
    }
    if let Some(strategy) = &args.strategy {
        config.verifier.strategy = strategy.parse()?;
    }
    if let Some(latency_ms) = args.latency_ms {
        config.simulated.latency_ms = latency_ms;
    }

    let file = File::open(&args.input)
        .with_context(|| format!("opening {}", args.input.display()))?;
    let outcome = ingest(&config, BufReader::new(file)).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let report = &outcome.report;
    println!(
        "{} Ingested {} in {}ms (verifier: {})",
        "✓".green().bold(),
        args.input.display().to_string().bold(),
        report.elapsed_ms,
        outcome.verifier.cyan()
    );
    println!("  Read:      {}", report.read.to_string().bold());
    println!("  Accepted:  {}", report.accepted.to_string().green());
    println!("  Merged:    {}", report.merged.to_string().yellow());
    println!("  Malformed: {}", report.malformed.to_string().red());
    println!("  Rejected:  {}", report.rejected.to_string().red());
    println!(
        "  Stored identities: {} ({} verifier calls, {} contended merges)",
        outcome.stored,
        outcome.delegate_calls,
        outcome.merge.contended
    );
    println!(
        "  Distinct first names: {}, last names: {}, ages: {}",
        outcome.stats.distinct_first_names,
        outcome.stats.distinct_last_names,
        outcome.stats.distinct_ages
    );
    if let Some((name, count)) = &outcome.stats.most_common_first_name {
        println!("  Most common first name: {} ({count})", name.yellow());
    }
    if args.show_malformed {
        for entry in &outcome.malformed {
            println!("  {} {}: {}", "✗".red(), entry.source.dimmed(), entry.reason);
        }
    }
    Ok(())
}

fn cmd_generate(args: GenerateArgs) -> anyhow::Result<()> {
    let options = GenerateOptions {
        count: args.count,
        duplicates: args.duplicates,
        malformed: args.malformed,
        seed: args.seed,
    };
    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            let mut out = BufWriter::new(file);
            write_lines(&mut out, &options)?;
            out.flush()?;
            eprintln!("{} Wrote {} lines to {}", "✓".green().bold(), args.count, path.display());
        }
        None => {
            let mut out = io::stdout().lock();
            write_lines(&mut out, &options)?;
        }
    }
    Ok(())
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<()> {
    let config = AppConfig::load_or_default(args.config.as_deref())?;
    print!("{}", config.to_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use idvet_throttle::Strategy;

    use super::*;

    fn quiet_config(strategy: Strategy) -> AppConfig {
        let mut config = AppConfig::default();
        config.verifier.strategy = strategy;
        config.verifier.batch_size = 4;
        config.verifier.batch_timeout_ms = 10;
        config.simulated.latency_ms = 0;
        config
    }

    fn generated(count: usize, duplicates: f64) -> Vec<u8> {
        let mut out = Vec::new();
        let options = GenerateOptions {
            count,
            duplicates,
            malformed: 0.0,
            seed: 11,
        };
        write_lines(&mut out, &options).unwrap();
        out
    }

    // ================================================================
    // ingest
    // ================================================================

    #[tokio::test]
    async fn duplicates_merge_and_bad_lines_are_reported() {
        let input = "\
u1\tpw\tAda Lovelace\t555-0100\tada@example.com\t1 Main St\tLondon\tLN\t12345\t36
u2\tpw\tAda Lovelace\t\tADA@example.com\t2 Oak Ave\tLondon\tLN\t54321\t36
u3\tpw\tAlan Turing\t555-0199\talan@example.com\t3 Pine Rd\tWilmslow\tCH\tABCDE\t41
u4\tpw\tshort line
";
        let mut config = quiet_config(Strategy::Direct);
        config.pipeline.max_in_flight = 1;
        let outcome = ingest(&config, Cursor::new(input)).await.unwrap();

        assert_eq!(outcome.report.read, 4);
        assert_eq!(outcome.report.accepted, 1);
        assert_eq!(outcome.report.merged, 1);
        assert_eq!(outcome.report.rejected, 1);
        assert_eq!(outcome.report.malformed, 1);
        assert_eq!(outcome.stored, 1);
        assert_eq!(outcome.stats.records, 1);
        assert_eq!(outcome.malformed.len(), 2);
        assert!(outcome
            .malformed
            .iter()
            .any(|entry| entry.reason == "no valid addresses"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_strategy_accepts_distinct_records() {
        let input = generated(60, 0.0);
        for strategy in Strategy::ALL {
            let outcome = ingest(&quiet_config(strategy), Cursor::new(input.clone()))
                .await
                .unwrap();
            assert_eq!(outcome.report.read, 60, "{strategy}");
            assert_eq!(outcome.report.accepted, 60, "{strategy}");
            assert_eq!(outcome.stored, 60, "{strategy}");
            assert!(outcome.malformed.is_empty(), "{strategy}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn duplicates_are_either_merged_or_stored() {
        let input = generated(80, 0.5);
        let outcome = ingest(&quiet_config(Strategy::Admission), Cursor::new(input))
            .await
            .unwrap();
        assert_eq!(outcome.report.accepted + outcome.report.merged, 80);
        assert_eq!(outcome.stored as u64, outcome.report.accepted);
        assert_eq!(outcome.stats.records, outcome.report.accepted);
    }

    #[tokio::test]
    async fn batching_strategy_groups_delegate_calls() {
        let input = generated(40, 0.0);
        let outcome = ingest(&quiet_config(Strategy::Barrier), Cursor::new(input))
            .await
            .unwrap();
        assert_eq!(outcome.report.accepted, 40);
        assert!(outcome.delegate_calls < 40);
    }

    #[tokio::test]
    async fn invalid_throttle_settings_fail_before_reading() {
        let mut config = quiet_config(Strategy::Backpressure);
        config.verifier.workers = 0;
        assert!(ingest(&config, Cursor::new("")).await.is_err());
    }
}
