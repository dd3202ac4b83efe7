use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

use card_tracking::{
    AnalyticsReport, CardTrackingProcessor, ConfigRegistry, CustomerStore, ProcessingReport, ProviderType,
    SqliteStore,
};

#[derive(Debug, Parser)]
#[command(name = "card-tracking", version, about = "Card production and delivery tracking")]
struct Arguments {
    /// SQLite database holding customer documents
    #[arg(long, env = "CARD_TRACKING_DB", default_value = "card_tracking.db", global = true)]
    db: PathBuf,

    /// Provider configuration document
    #[arg(long, env = "CARD_TRACKING_CONFIG", default_value = "config/provider_config.json", global = true)]
    config: PathBuf,

    /// Debug logging (RUST_LOG still wins)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Merge a payload file into the store
    Process {
        input_file: PathBuf,
        #[arg(short = 't', long = "type")]
        provider_type: ProviderType,
    },
    /// Print statistics over every stored customer
    Analytics,
    /// Print one customer document as JSON
    Show { customer_id: String },
}

fn main() -> Result<()> {
    let args = Arguments::parse();

    let level = if args.debug { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let store = SqliteStore::open(&args.db)
        .with_context(|| format!("Failed to open database {}", args.db.display()))?;

    match args.command {
        Command::Process {
            input_file,
            provider_type,
        } => {
            let registry = ConfigRegistry::from_file(&args.config)
                .with_context(|| format!("Failed to load provider configuration {}", args.config.display()))?;
            let processor = CardTrackingProcessor::new(registry, store);
            let report = processor
                .process(&input_file, provider_type)
                .with_context(|| format!("Failed to process {}", input_file.display()))?;
            print_report(&report);
        }
        Command::Analytics => {
            let report = AnalyticsReport::from_store(&store).context("Failed to scan customers")?;
            print_analytics(&report);
        }
        Command::Show { customer_id } => match store.load(&customer_id)? {
            Some(customer) => println!("{}", serde_json::to_string_pretty(&customer)?),
            None => {
                eprintln!("❌ Customer {} not found", customer_id);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

fn print_report(report: &ProcessingReport) {
    println!("📦 Processing {} as {}", report.source, report.provider_type);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Records: {}", report.total);
    println!("✓ Succeeded: {} ({} new cards, {} duplicates)", report.succeeded, report.cards_created, report.duplicates);

    if report.errors.is_empty() {
        println!("✅ No failures");
        return;
    }

    println!("❌ Failed: {}", report.failed);
    for failure in &report.errors {
        println!("   {} {}: {}", failure.record_ref, failure.error_kind, failure.message);
    }
}

fn print_analytics(report: &AnalyticsReport) {
    println!("📊 Card Tracking Analytics");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Customers: {}", report.total_customers);
    println!("Cards: {}", report.total_cards);

    println!("\nBy status:");
    for (status, count) in &report.status_counts {
        println!("  {:<28} {}", status, count);
    }

    println!("\nBy stage:");
    for (stage, count) in &report.stage_counts {
        println!("  {:<28} {}", stage.as_str(), count);
    }

    println!("\nEvents by provider:");
    for (provider, count) in &report.provider_counts {
        println!("  {:<28} {}", provider.as_str(), count);
    }

    println!("\nBank performance:");
    for (bank, performance) in &report.bank_performance {
        println!(
            "  {:<28} {} cards, {} completed ({:.1}%)",
            bank,
            performance.total_cards,
            performance.completed_cards,
            performance.completion_rate() * 100.0
        );
    }
}
