// HDI Demographics - CLI
//
//   hdi-demographics import --file data.csv
//   hdi-demographics import --url https://ws.cso.ie/.../PEA27/CSV/1.0/en
//   hdi-demographics show --year 2023 --limit 20
//   hdi-demographics clean

use anyhow::Result;
use clap::{ArgGroup, Args, Parser, Subcommand};
use hdi_demographics::config::{init_logging, parse_timeout, AppConfig};
use hdi_demographics::{clear_statistics, open_database, DataSummary, DemographicsImporter, ImportReport};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

const SAMPLE_URL: &str =
    "https://ws.cso.ie/public/api.restful/PxStat.Data.Cube_API.ReadDataset/PEA27/CSV/1.0/en";

#[derive(Parser)]
#[command(name = "hdi-demographics")]
#[command(author, version, about = "Population statistics by age group, sex and HDI rating")]
struct Cli {
    /// SQLite database file (overrides DEMOGRAPHICS_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Remote fetch timeout in seconds (overrides DEMOGRAPHICS_FETCH_TIMEOUT_SECS)
    #[arg(long, global = true, value_parser = parse_timeout)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import demographic statistics from a CSV file or URL
    Import(ImportArgs),
    /// Display a summary of the imported data
    Show(ShowArgs),
    /// Remove every imported statistic (categories are kept)
    Clean,
}

#[derive(Args)]
#[command(group(ArgGroup::new("source").required(true).args(["file", "url"])))]
struct ImportArgs {
    /// Path to the CSV file to import
    #[arg(long)]
    file: Option<PathBuf>,

    /// URL of the CSV file to import
    #[arg(long)]
    url: Option<String>,
}

#[derive(Args)]
struct ShowArgs {
    /// Filter statistics by year
    #[arg(long)]
    year: Option<i64>,

    /// Number of records to display
    #[arg(long, default_value_t = 10)]
    limit: usize,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    if let Some(secs) = cli.timeout_secs {
        config.fetch_timeout = Duration::from_secs(secs);
    }
    init_logging(&config.rust_log);

    match cli.command {
        Commands::Import(args) => run_import(&config, args),
        Commands::Show(args) => run_show(&config, args),
        Commands::Clean => run_clean(&config),
    }
}

fn run_import(config: &AppConfig, args: ImportArgs) -> Result<ExitCode> {
    let started = Instant::now();
    let mut conn = open_database(&config.database_path)?;
    let importer = DemographicsImporter::with_timeout(config.fetch_timeout);

    let report = match (args.file, args.url) {
        (Some(file), _) => {
            println!("📂 Importing data from file: {}", file.display());
            importer.import_from_file(&mut conn, &file)
        }
        (None, Some(url)) => {
            println!("🌐 Importing data from URL: {}", url);
            importer.import_from_url(&mut conn, &url)
        }
        (None, None) => anyhow::bail!("Either --file or --url must be provided"),
    };

    print_report(&report);
    println!("\n⏱️  Import completed in {:.2} seconds", started.elapsed().as_secs_f64());

    Ok(if report.success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn print_report(report: &ImportReport) {
    if !report.success {
        eprintln!(
            "❌ Failed to import data: {}",
            report.error.as_deref().unwrap_or("Unknown error")
        );
        return;
    }

    println!("\n✅ Successfully imported demographic data:");
    println!("   - Total rows: {}", report.total_rows);
    println!("   - Skipped rows (aggregated): {}", report.skipped_rows);
    println!("   - Imported rows: {}", report.imported_rows);
    println!("   - Error rows: {}", report.error_rows.len());

    if !report.error_rows.is_empty() {
        let rows: Vec<String> = report.error_rows.iter().map(|r| r.to_string()).collect();
        println!("⚠️  Errors occurred in the following rows: {}", rows.join(", "));
    }
}

fn run_show(config: &AppConfig, args: ShowArgs) -> Result<ExitCode> {
    let conn = open_database(&config.database_path)?;
    let summary = DataSummary::load(&conn, args.year, args.limit)?;

    println!("📊 DATA SUMMARY");
    println!("{}", "=".repeat(50));
    println!("Age Groups: {}", summary.age_groups);
    println!("Sex Categories: {}", summary.sexes);
    println!("HD Index Categories: {}", summary.hd_indices);
    match summary.year {
        Some(year) => println!("Total Statistics (for year {}): {}", year, summary.total_statistics),
        None => println!("Total Statistics: {}", summary.total_statistics),
    }

    println!("\nYears in database:");
    for year in &summary.years {
        println!("  {}: {} records", year.year, year.count);
    }

    println!("\nSample Data (limited to {} records):", args.limit);
    println!("{}", "-".repeat(50));
    println!("{:<6} {:<15} {:<8} {:<30} {:<10}", "Year", "Age Group", "Sex", "HDI Category", "Value");
    println!("{}", "-".repeat(50));
    for stat in &summary.sample {
        println!(
            "{:<6} {:<15} {:<8} {:<30} {:<10}",
            stat.year, stat.age_group.name, stat.sex.name, stat.hd_index.name, stat.value
        );
    }

    if let Some(example) = &summary.example {
        println!("\n➕ Aggregation Example:");
        println!("\nFor {}, {}, {}:", example.year, example.age_group, example.hd_index);
        for (sex, value) in &example.breakdown {
            println!("  {}: {}", sex, value);
        }
        println!("  Total (both sexes): {}", example.total_both_sexes);
    }

    println!("\nTo import more data, use:");
    println!("  hdi-demographics import --file path/to/data.csv");
    println!("  or");
    println!("  hdi-demographics import --url {}", SAMPLE_URL);

    Ok(ExitCode::SUCCESS)
}

fn run_clean(config: &AppConfig) -> Result<ExitCode> {
    let conn = open_database(&config.database_path)?;
    let removed = clear_statistics(&conn, "cli")?;
    println!("🧹 Removed {} statistics from {}", removed, config.database_path.display());
    Ok(ExitCode::SUCCESS)
}
