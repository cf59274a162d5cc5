use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cloudward::catalog::Catalog;
use cloudward::collector::inventory::JsonInventory;
use cloudward::config::Config;
use cloudward::error::WardError;
use cloudward::model::ScanJobType;
use cloudward::output::{self, OutputFormat};
use cloudward::rules::RuleEngine;
use cloudward::{Engine, EngineOptions};

#[derive(Parser)]
#[command(
    name = "cloudward",
    about = "Cloud security scanning and compliance readiness engine",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full scan against an inventory snapshot
    Scan {
        /// Path to the JSON inventory snapshot
        #[arg(long, short = 'i')]
        inventory: PathBuf,

        /// Catalog seed file (defaults to the builtin SOC 2 seed)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Config file path
        #[arg(long, short = 'c', default_value = "cloudward.toml")]
        config: PathBuf,

        /// Output format (console, json)
        #[arg(long, short = 'f', default_value = "console")]
        format: String,

        /// Write output to file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// List the builtin compliance rules
    ListRules {
        /// Output format (table, json)
        #[arg(long, short = 'f', default_value = "table")]
        format: String,
    },

    /// Generate a starter cloudward.toml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scan {
            inventory,
            catalog,
            config,
            format,
            output,
        } => cmd_scan(inventory, catalog, config, format, output),
        Commands::ListRules { format } => cmd_list_rules(format),
        Commands::Init { force } => cmd_init(force),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn cmd_scan(
    inventory_path: PathBuf,
    catalog_path: Option<PathBuf>,
    config_path: PathBuf,
    format_str: String,
    output_path: Option<PathBuf>,
) -> Result<i32, WardError> {
    let format = OutputFormat::from_str_lenient(&format_str).unwrap_or_else(|| {
        eprintln!("Warning: unknown format '{}', using console", format_str);
        OutputFormat::Console
    });

    let config = Config::load(&config_path)?;
    let inventory = Arc::new(JsonInventory::from_file(&inventory_path)?);
    let catalog = catalog_path
        .map(|p| Catalog::from_json_file(&p))
        .transpose()?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let engine = Engine::new(
            inventory,
            EngineOptions {
                config,
                catalog,
                runner: None,
            },
        )
        .await?;

        let result = engine.run_scan(ScanJobType::Full).await?;
        let report = engine.report(result.job_id).await?;
        let rendered = output::render(&report, format)?;

        match output_path {
            Some(out) => std::fs::write(&out, &rendered)?,
            None => print!("{}", rendered),
        }

        // Exit code: 0 = clean, 1 = findings present
        Ok(if result.finding_count == 0 { 0 } else { 1 })
    })
}

fn cmd_list_rules(format_str: String) -> Result<i32, WardError> {
    let engine = RuleEngine::new();
    let rules = engine.list_rules();

    match format_str.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&rules)?;
            println!("{}", json);
        }
        _ => {
            println!(
                "{:<26} {:<52} {:<20} {:<10} CONTROLS",
                "CODE", "NAME", "RESOURCE TYPE", "SEVERITY"
            );
            println!("{}", "-".repeat(120));
            for rule in &rules {
                println!(
                    "{:<26} {:<52} {:<20} {:<10} {}",
                    rule.code,
                    rule.name,
                    rule.resource_type.to_string(),
                    rule.severity.to_string(),
                    rule.control_ids.join(", "),
                );
            }
        }
    }

    Ok(0)
}

fn cmd_init(force: bool) -> Result<i32, WardError> {
    let path = PathBuf::from("cloudward.toml");

    if path.exists() && !force {
        eprintln!("cloudward.toml already exists. Use --force to overwrite.");
        return Ok(1);
    }

    std::fs::write(&path, Config::starter_toml())?;
    println!("Created cloudward.toml");

    Ok(0)
}
