//! RetroLens - sprint retrospective metrics and insights
//!
//! A CLI tool that reads the CSV exports of a team's cycles and produces
//! a retrospective report: flow statistics, a comparison with the previous
//! cycle, alerts and a quarter-level rollup.
//!
//! Exit codes:
//!   0 - Success (no warnings, or no --fail-on-warning set)
//!   1 - Runtime error (missing directory, malformed data, config, etc.)
//!   2 - Warning alerts raised with --fail-on-warning

mod analysis;
mod cli;
mod config;
mod dataset;
mod error;
mod models;
mod report;

use analysis::{
    insights, ComparisonConfig, ComparisonEngine, InsightConfig, InsightGenerator,
    MetricsCalculator, MetricsConfig, QuarterAggregator,
};
use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, DEFAULT_CONFIG_FILE};
use dataset::CycleDirectory;
use futures::future::try_join_all;
use indicatif::{ProgressBar, ProgressStyle};
use models::{CycleMetrics, Metric, QuarterReport, ReportMetadata, RetroReport};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("RetroLens v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    let result = if args.quarter.is_some() {
        run_quarter(args).await
    } else {
        run_cycle(args).await
    };

    match result {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .retrolens.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize thresholds, excluded stages, and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// `RUST_LOG`, when set, takes precedence over --verbose/--quiet.
fn init_logging(args: &Args) {
    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let result = if std::env::var_os("RUST_LOG").is_some() {
        tracing::subscriber::set_global_default(
            builder.with_env_filter(EnvFilter::from_default_env()).finish(),
        )
    } else {
        tracing::subscriber::set_global_default(
            builder.with_max_level(args.log_level()).finish(),
        )
    };

    result.expect("Failed to set tracing subscriber");
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}

fn report_metadata(team: Option<String>, quarter: Option<String>) -> ReportMetadata {
    ReportMetadata {
        team,
        quarter,
        generated_at: Utc::now(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

/// Load one cycle and compute its metrics.
fn compute_cycle(dir: &CycleDirectory, calculator: &MetricsCalculator) -> Result<CycleMetrics> {
    let data = dir
        .load()
        .with_context(|| format!("Failed to load cycle {}", dir.path.display()))?;

    calculator
        .calculate(&data)
        .with_context(|| format!("Invalid data in cycle {}", dir.path.display()))
}

/// Run a cycle's pipeline on the blocking pool.
async fn spawn_pipeline(
    dir: CycleDirectory,
    calculator: MetricsCalculator,
) -> Result<CycleMetrics> {
    let label = dir.label();
    tokio::task::spawn_blocking(move || compute_cycle(&dir, &calculator))
        .await
        .with_context(|| format!("Pipeline for cycle {} did not complete", label))?
}

/// Compute the current cycle and, if any, its predecessor, then compare
/// them and evaluate the alert rules.
async fn build_retro_report(
    current: &CycleDirectory,
    previous: Option<CycleDirectory>,
    config: &Config,
) -> Result<RetroReport> {
    let calculator = MetricsCalculator::new(MetricsConfig::from(config));

    let current_task = spawn_pipeline(current.clone(), calculator.clone());
    let previous_task = async {
        match previous {
            Some(dir) => spawn_pipeline(dir, calculator.clone()).await.map(Some),
            None => Ok(None),
        }
    };
    let (metrics, previous_metrics) = tokio::try_join!(current_task, previous_task)?;

    let comparison = ComparisonEngine::new(ComparisonConfig::from(config))
        .compare(&metrics, previous_metrics.as_ref());
    let alerts =
        InsightGenerator::new(&InsightConfig::from(config)).generate(&metrics, comparison.as_ref());
    let recommendations = insights::recommendations(&alerts);

    Ok(RetroReport {
        metadata: report_metadata(current.team.clone(), current.quarter.clone()),
        metrics,
        comparison,
        alerts,
        recommendations,
    })
}

/// Compute every cycle in parallel, keeping input order.
async fn compute_quarter(
    cycles: Vec<CycleDirectory>,
    calculator: &MetricsCalculator,
    progress: &ProgressBar,
) -> Result<Vec<CycleMetrics>> {
    let tasks = cycles.into_iter().map(|dir| {
        let calculator = calculator.clone();
        let progress = progress.clone();
        async move {
            let metrics = spawn_pipeline(dir, calculator).await?;
            progress.inc(1);
            Ok::<_, anyhow::Error>(metrics)
        }
    });

    try_join_all(tasks).await
}

fn progress_bar(len: u64, quiet: bool) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }

    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} cycles")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn write_output(path: &str, content: &str) -> Result<()> {
    std::fs::write(path, content).with_context(|| format!("Failed to write report to {}", path))
}

/// Analyze one cycle. Returns exit code (0 or 2).
async fn run_cycle(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let cycle_path = args
        .cycle
        .as_deref()
        .context("--cycle is required without --quarter")?;
    let current = CycleDirectory::from_path(cycle_path)
        .with_context(|| format!("Cannot use {} as a cycle", cycle_path.display()))?;

    println!("📂 Analyzing cycle: {}", current.path.display());

    // Step 1: Resolve the previous cycle
    let previous = if args.no_compare {
        info!("Comparison disabled");
        None
    } else if let Some(ref path) = args.previous {
        Some(
            CycleDirectory::from_path(path)
                .with_context(|| format!("Cannot use {} as previous cycle", path.display()))?,
        )
    } else {
        dataset::resolve_previous(&current)
    };

    match previous {
        Some(ref dir) => println!("🔁 Comparing with: {}", dir.path.display()),
        None if !args.no_compare => println!("   No previous cycle found, comparison skipped."),
        None => {}
    }

    // Step 2: Compute metrics, comparison and alerts
    println!("🔬 Computing metrics...");
    let report = build_retro_report(&current, previous, &config).await?;

    // Step 3: Render and save the report
    println!("📝 Generating report...");
    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };
    write_output(&config.general.output, &output)?;

    // Print summary
    let metrics = &report.metrics;
    println!("\n📊 Cycle Summary:");
    println!("   WIP (average): {}", fmt_value(metrics.wip_average));
    println!(
        "   Throughput: {} per week",
        fmt_value(metrics.throughput.as_ref().map(|t| t.mean))
    );
    println!(
        "   Lead time p50/p90: {} / {} days",
        fmt_value(metrics.lead_time.as_ref().map(|l| l.p50)),
        fmt_value(metrics.lead_time.as_ref().map(|l| l.p90))
    );
    println!("   Tickets: {}", metrics.tickets.total);
    for alert in &report.alerts {
        println!("   {} {}", alert.severity.emoji(), alert.message);
    }
    println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());
    println!(
        "\n✅ Analysis complete! Report saved to: {}",
        config.general.output
    );

    let warnings = report.warning_count();
    if args.fail_on_warning && warnings > 0 {
        eprintln!(
            "\n⛔ {} warning alert(s) raised. Failing (exit code 2).",
            warnings
        );
        return Ok(2);
    }

    Ok(0)
}

/// Roll up every cycle of a quarter. Always returns exit code 0.
async fn run_quarter(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let quarter_path = args
        .quarter
        .as_deref()
        .context("--quarter is required without --cycle")?;

    // Step 1: Discover cycles
    let cycles = dataset::discover_cycles(quarter_path)
        .with_context(|| format!("Cannot list cycles in {}", quarter_path.display()))?;
    println!(
        "📂 Found {} cycles in {}",
        cycles.len(),
        quarter_path.display()
    );
    if cycles.is_empty() {
        warn!("No dated cycle directories under {}", quarter_path.display());
    }

    let team = cycles.first().and_then(|c| c.team.clone());
    let quarter = cycles.first().and_then(|c| c.quarter.clone()).or_else(|| {
        quarter_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
    });

    // Step 2: Compute every cycle
    println!("🔬 Computing cycle metrics...");
    let progress = progress_bar(cycles.len() as u64, args.quiet)?;
    let calculator = MetricsCalculator::new(MetricsConfig::from(&config));
    let metrics = compute_quarter(cycles, &calculator, &progress).await?;
    progress.finish_and_clear();

    // Step 3: Aggregate and render
    let rollup = QuarterAggregator::from(&config).aggregate(&metrics);
    let report = QuarterReport {
        metadata: report_metadata(team, quarter),
        rollup,
    };

    println!("📝 Generating report...");
    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_quarter_markdown_report(&report),
    };
    write_output(&config.general.output, &output)?;

    let rollup = &report.rollup;
    println!("\n📊 Quarter Summary:");
    println!("   Cycles: {}", rollup.cycles.len());
    println!(
        "   Throughput trend: {} {}",
        rollup.throughput_trend.trend.arrow(),
        rollup.throughput_trend.trend
    );
    println!(
        "   Lead time p50 trend: {} {}",
        rollup.p50_trend.trend.arrow(),
        rollup.p50_trend.trend
    );
    if let Some(top) = rollup.top_epics.first() {
        println!("   Top epic: {} ({} tickets)", top.epic, top.count);
    }
    println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());
    println!(
        "\n✅ Rollup complete! Report saved to: {}",
        config.general.output
    );

    Ok(0)
}

fn fmt_value(metric: Metric<f64>) -> String {
    match metric {
        Metric::Value(v) => format!("{:.1}", v),
        Metric::NotApplicable => "n/a".to_string(),
        Metric::InsufficientData => "insufficient data".to_string(),
    }
}
