//! readstat - Reading-Study Analytics
//!
//! A CLI tool that fetches reading-comprehension study results from a
//! hosted document store, reconciles the two storage shapes into one
//! canonical participant set, and writes aggregated statistics as
//! Markdown, JSON, or CSV.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (connection, config, invalid arguments, etc.)

mod analysis;
mod cli;
mod config;
mod models;
mod reconcile;
mod report;
mod store;

use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::Config;
use models::ParticipantSource;
use reconcile::{reconcile, sample_participants, Reconciled};
use report::Report;
use std::time::Instant;
use store::{DocumentStore, FetchedSources, HttpDocumentStore};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

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

    info!("readstat v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_report(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Run failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .readstat.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(".readstat.toml");

    if path.exists() {
        eprintln!("⚠️  .readstat.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .readstat.toml")?;

    println!("✅ Created .readstat.toml with default settings.");
    println!("   Edit it to customize the store URL, collections, and report sections.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete fetch → reconcile → aggregate → export workflow.
async fn run_report(args: Args) -> Result<()> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let options = config.reconcile.to_options();

    let reconciled = if args.offline {
        println!("📴 Offline mode: reporting on built-in sample data");
        Reconciled {
            participants: sample_participants(),
            source: ParticipantSource::SampleFallback,
            dropped_partial: 0,
            dropped_malformed: 0,
            dropped_filtered: 0,
        }
    } else {
        let store = HttpDocumentStore::new(&config.store)
            .context("Failed to create document-store client")?;

        // Record a manual entry first so the report reflects it
        if let Some(entry) = args.manual_entry() {
            println!("📝 Recording manual entry for {}...", entry.nickname);
            let session_id = store::submit_entry(&store, &config.store, &entry)
                .await
                .context("Failed to record manual entry")?;
            println!("   Stored as session {}", session_id);
        }

        println!("📥 Fetching study data from {}", config.store.base_url);
        let sources = fetch_or_fallback(&store, &config, !args.quiet).await;

        if args.dry_run {
            return handle_dry_run(&sources, &options);
        }

        reconcile(&sources.users, &sources.flat_results, &options)
    };

    if args.dry_run {
        // Offline dry run: nothing was fetched, just show the sample set.
        println!("\n🔍 Dry run: {} sample participants", reconciled.participants.len());
        return Ok(());
    }

    // Build the derived view and write it out
    println!("📝 Generating {} report...", format_name(args.format));

    let duration = start_time.elapsed().as_secs_f64();
    let report = Report::build(&reconciled, duration);

    let output = match args.format {
        OutputFormat::Markdown => report::generate_markdown_report(&report, &config.report),
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Csv => report::generate_csv(&report.participants)?,
    };

    let output_path = std::path::Path::new(&config.report.output);
    std::fs::write(output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    print_summary(&report);
    println!("\n✅ Done! Report saved to: {}", output_path.display());

    Ok(())
}

/// Fetch both sources, degrading to empty sources (and thus the sample
/// fallback) when the store is unreachable.
async fn fetch_or_fallback(
    store: &impl DocumentStore,
    config: &Config,
    show_progress: bool,
) -> FetchedSources {
    match store::fetch_sources(store, &config.store, show_progress).await {
        Ok(sources) => sources,
        Err(e) => {
            warn!("Store unavailable, report will use sample data: {}", e);
            println!("⚠️  Store unavailable ({}); continuing in demo mode", e);
            FetchedSources::default()
        }
    }
}

/// Handle --dry-run: print source record counts, write nothing.
fn handle_dry_run(
    sources: &FetchedSources,
    options: &reconcile::ReconcileOptions,
) -> Result<()> {
    println!("\n🔍 Dry run: source overview\n");
    println!("   Flat result records: {}", sources.flat_results.len());
    println!("   User documents:      {}", sources.users.len());
    println!(
        "   Complete users:      {}",
        sources.users.iter().filter(|u| u.is_complete()).count()
    );
    if sources.undecodable > 0 {
        println!("   Undecodable docs:    {}", sources.undecodable);
    }

    let reconciled = reconcile(&sources.users, &sources.flat_results, options);
    println!(
        "\n   Reconciled: {} participants from {}",
        reconciled.participants.len(),
        reconciled.source
    );

    println!("\n✅ Dry run complete. No report was written.");
    Ok(())
}

/// Print the analytics summary to stdout.
fn print_summary(report: &Report) {
    println!("\n📊 Study Summary:");
    println!(
        "   Participants: {} ({} speed reading, {} normal) — {}",
        report.overall.total_participants,
        report.overall.speed_reading_participants,
        report.overall.normal_reading_participants,
        report.metadata.data_source
    );
    println!(
        "   Mean reading time: {:.1}s → {:.1}s",
        report.overall.mean_phase1_time, report.overall.mean_phase2_time
    );
    println!(
        "   Mean score: {:.1} → {:.1}",
        report.overall.mean_phase1_score, report.overall.mean_phase2_score
    );
    println!(
        "   Average improvement: {:.1}%",
        report.overall.mean_improvement
    );
    for group in &report.groups {
        println!(
            "   - Group {}: {} participants, {:.1}% time improvement",
            group.test_group, group.participants, group.time_improvement
        );
    }
}

fn format_name(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Markdown => "Markdown",
        OutputFormat::Json => "JSON",
        OutputFormat::Csv => "CSV",
    }
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
            info!("Loaded default config from .readstat.toml");
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
